//! FloatingPointModePolicy tests

use fpc::fp::{
    EvalMethod, ExceptBehavior, FloatingPointModePolicy, FpContract, FpMode, FpPragma,
    PolicyError, RoundingMode, ScopeKind,
};
use proptest::prelude::*;

fn eval_method() -> impl Strategy<Value = EvalMethod> {
    prop_oneof![
        Just(EvalMethod::Source),
        Just(EvalMethod::Double),
        Just(EvalMethod::Extended),
    ]
}

fn except_behavior() -> impl Strategy<Value = ExceptBehavior> {
    prop_oneof![
        Just(ExceptBehavior::Ignore),
        Just(ExceptBehavior::MayTrap),
        Just(ExceptBehavior::Strict),
    ]
}

/// Directives that change the top entry without pushing or popping
fn in_place_pragma() -> impl Strategy<Value = FpPragma> {
    prop_oneof![
        any::<bool>().prop_map(|on| FpPragma::Precise { on, push: false }),
        any::<bool>().prop_map(|on| FpPragma::Except { on, push: false }),
        eval_method().prop_map(FpPragma::EvalMethod),
        prop_oneof![Just(FpContract::On), Just(FpContract::Off), Just(FpContract::Fast)]
            .prop_map(FpPragma::Contract),
        except_behavior().prop_map(FpPragma::Exceptions),
        any::<bool>().prop_map(FpPragma::FenvAccess),
    ]
}

/// Apply directives, ignoring the ones rejected in the current mode
fn apply_all(policy: &mut FloatingPointModePolicy, pragmas: &[FpPragma]) {
    for pragma in pragmas {
        let _ = policy.apply_pragma(pragma);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_push_then_pop_is_noop(
        before in prop::collection::vec(in_place_pragma(), 0..6),
        inside in prop::collection::vec(in_place_pragma(), 0..8),
    ) {
        let mut policy = FloatingPointModePolicy::default();
        apply_all(&mut policy, &before);
        let mode = policy.current();
        let depth = policy.depth();

        policy.apply_pragma(&FpPragma::Push).unwrap();
        apply_all(&mut policy, &inside);
        policy.apply_pragma(&FpPragma::Pop).unwrap();

        prop_assert_eq!(policy.current(), mode);
        prop_assert_eq!(policy.depth(), depth);
    }

    #[test]
    fn prop_block_exit_restores_mode(
        before in prop::collection::vec(in_place_pragma(), 0..6),
        inside in prop::collection::vec(in_place_pragma(), 0..8),
    ) {
        let mut policy = FloatingPointModePolicy::default();
        apply_all(&mut policy, &before);
        let mode = policy.current();

        policy.enter_scope(ScopeKind::Block);
        apply_all(&mut policy, &inside);
        prop_assert_eq!(policy.exit_scope(), Ok(ScopeKind::Block));

        prop_assert_eq!(policy.current(), mode);
    }

    #[test]
    fn prop_strictness_is_sticky(
        after in prop::collection::vec(in_place_pragma(), 0..10),
    ) {
        let mut policy = FloatingPointModePolicy::default();
        policy.enter_function(ScopeKind::Function);
        policy.apply_pragma(&FpPragma::Except { on: true, push: false }).unwrap();

        for pragma in &after {
            let _ = policy.apply_pragma(pragma);
            let mode = policy.query();
            prop_assert!(policy.function_is_strict());
            prop_assert_eq!(mode.except, ExceptBehavior::Strict);
        }

        let summary = policy.exit_function().unwrap();
        prop_assert!(summary.strict);
        prop_assert_eq!(summary.except, ExceptBehavior::Strict);
    }

    #[test]
    fn prop_rejected_pragma_leaves_mode_unchanged(pragma in in_place_pragma()) {
        let mut policy = FloatingPointModePolicy::default();
        let _ = policy.apply_pragma(&FpPragma::Precise { on: false, push: false });
        let mode = policy.current();
        if policy.apply_pragma(&pragma).is_err() {
            prop_assert_eq!(policy.current(), mode);
        }
    }
}

#[test]
fn test_default_mode() {
    let policy = FloatingPointModePolicy::default();
    assert_eq!(policy.current(), FpMode::default());
    assert_eq!(policy.depth(), 1);
}

#[test]
fn test_precise_off_in_nested_block_reverts() {
    let mut policy = FloatingPointModePolicy::default();
    policy.enter_function(ScopeKind::Function);
    policy.enter_scope(ScopeKind::Block);
    policy
        .apply_pragma(&FpPragma::Precise { on: false, push: false })
        .unwrap();
    assert!(policy.query().fast_math());
    policy.exit_scope().unwrap();
    assert!(!policy.query().fast_math());
}

#[test]
fn test_namespace_except_survives_until_pop() {
    let mut policy = FloatingPointModePolicy::default();
    policy.enter_scope(ScopeKind::Namespace);
    policy
        .apply_pragma(&FpPragma::Except { on: true, push: true })
        .unwrap();
    policy.exit_scope().unwrap();

    // exc_still_on
    assert_eq!(policy.current().except, ExceptBehavior::Strict);
    policy.enter_function(ScopeKind::Function);
    assert!(policy.function_is_strict());
    policy.exit_function().unwrap();

    policy.enter_scope(ScopeKind::Namespace);
    policy.apply_pragma(&FpPragma::Pop).unwrap();
    policy.exit_scope().unwrap();

    // exc_off
    assert_eq!(policy.current().except, ExceptBehavior::Ignore);
    policy.enter_function(ScopeKind::Function);
    assert!(!policy.function_is_strict());
}

#[test]
fn test_push_in_block_outlives_block_and_function() {
    let mut policy = FloatingPointModePolicy::default();
    policy.enter_function(ScopeKind::Function);
    policy.enter_scope(ScopeKind::Block);
    policy
        .apply_pragma(&FpPragma::Precise { on: false, push: true })
        .unwrap();
    policy.exit_scope().unwrap();
    assert!(!policy.current().precise);

    policy.exit_function().unwrap();
    assert!(!policy.current().precise);
    assert_eq!(policy.depth(), 2);

    assert_eq!(policy.apply_pragma(&FpPragma::Pop), Ok(()));
    assert!(policy.current().precise);
    assert_eq!(policy.current().contract, FpContract::On);
    assert_eq!(policy.depth(), 1);
}

#[test]
fn test_namespace_pragma_without_push_persists() {
    let mut policy = FloatingPointModePolicy::default();
    policy.enter_scope(ScopeKind::Namespace);
    policy
        .apply_pragma(&FpPragma::EvalMethod(EvalMethod::Double))
        .unwrap();
    policy.exit_scope().unwrap();
    assert_eq!(policy.current().eval_method, EvalMethod::Double);
}

#[test]
fn test_pop_without_push_is_underflow() {
    let mut policy = FloatingPointModePolicy::default();
    let before = policy.current();
    assert_eq!(policy.apply_pragma(&FpPragma::Pop), Err(PolicyError::Underflow));
    assert_eq!(policy.current(), before);
    assert_eq!(policy.depth(), 1);
}

#[test]
fn test_pop_across_block_is_underflow() {
    let mut policy = FloatingPointModePolicy::default();
    policy.apply_pragma(&FpPragma::Push).unwrap();
    policy.enter_scope(ScopeKind::Block);
    assert_eq!(policy.apply_pragma(&FpPragma::Pop), Err(PolicyError::Underflow));
    policy.exit_scope().unwrap();
    assert!(policy.apply_pragma(&FpPragma::Pop).is_ok());
}

#[test]
fn test_illegal_combinations() {
    let mut policy = FloatingPointModePolicy::default();
    policy
        .apply_pragma(&FpPragma::Except { on: true, push: false })
        .unwrap();
    assert_eq!(
        policy.apply_pragma(&FpPragma::Precise { on: false, push: true }),
        Err(PolicyError::PreciseOffWithExcept)
    );
    // Rejected directives do not push either
    assert_eq!(policy.depth(), 1);

    let mut policy = FloatingPointModePolicy::default();
    policy
        .apply_pragma(&FpPragma::Precise { on: false, push: false })
        .unwrap();
    assert_eq!(
        policy.apply_pragma(&FpPragma::Except { on: true, push: false }),
        Err(PolicyError::ExceptWithoutPrecise)
    );
    assert_eq!(
        policy.apply_pragma(&FpPragma::FenvAccess(true)),
        Err(PolicyError::ExceptWithoutPrecise)
    );
}

#[test]
fn test_except_on_then_off_keeps_function_strict() {
    let mut policy = FloatingPointModePolicy::default();
    policy.enter_function(ScopeKind::Function);
    policy
        .apply_pragma(&FpPragma::Except { on: true, push: false })
        .unwrap();
    let first = policy.query();
    policy
        .apply_pragma(&FpPragma::Except { on: false, push: false })
        .unwrap();
    let second = policy.query();

    assert_eq!(first.except, ExceptBehavior::Strict);
    assert_eq!(second.except, ExceptBehavior::Strict);
    assert!(policy.function_is_strict());
}

#[test]
fn test_fenv_access_sets_dynamic_rounding() {
    let mut policy = FloatingPointModePolicy::default();
    policy.enter_function(ScopeKind::Function);
    policy.apply_pragma(&FpPragma::FenvAccess(true)).unwrap();
    let mode = policy.query();
    assert_eq!(mode.rounding, RoundingMode::Dynamic);
    assert_eq!(mode.except, ExceptBehavior::Strict);
    assert!(policy.function_is_strict());
}

#[test]
fn test_function_boundary_resets_escalation() {
    let mut policy = FloatingPointModePolicy::default();
    policy.enter_function(ScopeKind::Function);
    policy
        .apply_pragma(&FpPragma::Except { on: true, push: false })
        .unwrap();
    assert!(policy.exit_function().unwrap().strict);

    policy.enter_function(ScopeKind::Function);
    assert!(!policy.function_is_strict());
    assert!(!policy.exit_function().unwrap().strict);
}

#[test]
fn test_strict_lambda_does_not_escalate_enclosing_function() {
    let mut policy = FloatingPointModePolicy::default();
    policy.enter_function(ScopeKind::Function);

    policy.enter_lambda();
    policy
        .apply_pragma(&FpPragma::Except { on: true, push: false })
        .unwrap();
    policy.query();
    assert!(policy.exit_function().unwrap().strict);

    assert!(!policy.function_is_strict());
    assert_eq!(policy.query().except, ExceptBehavior::Ignore);
    assert!(!policy.exit_function().unwrap().strict);
}

#[test]
fn test_lambda_inherits_enclosing_escalation() {
    let mut policy = FloatingPointModePolicy::default();
    policy.enter_function(ScopeKind::Function);
    policy.enter_scope(ScopeKind::Block);
    policy
        .apply_pragma(&FpPragma::Except { on: true, push: false })
        .unwrap();
    policy.exit_scope().unwrap();
    assert!(policy.function_is_strict());

    policy.enter_lambda();
    assert!(policy.function_is_strict());
    policy.exit_function().unwrap();
}

#[test]
fn test_instantiation_uses_captured_mode() {
    let mut policy = FloatingPointModePolicy::default();
    policy
        .apply_pragma(&FpPragma::Except { on: true, push: true })
        .unwrap();
    let captured = policy.capture();
    policy.apply_pragma(&FpPragma::Pop).unwrap();

    policy.enter_instantiation(captured);
    assert!(policy.function_is_strict());
    assert_eq!(policy.query().except, ExceptBehavior::Strict);
    policy.exit_function().unwrap();
    assert_eq!(policy.current().except, ExceptBehavior::Ignore);
}

#[test]
fn test_finish_reports_unmatched_pushes() {
    let mut policy = FloatingPointModePolicy::default();
    policy.apply_pragma(&FpPragma::Push).unwrap();
    policy
        .apply_pragma(&FpPragma::Precise { on: false, push: true })
        .unwrap();
    let report = policy.finish();
    assert_eq!(report.unmatched_pushes, 2);
    assert_eq!(report.open_scopes, 0);
    assert!(report.final_mode.fast_math());
}

#[test]
fn test_exit_scope_without_scope() {
    let mut policy = FloatingPointModePolicy::default();
    assert_eq!(policy.exit_scope(), Err(PolicyError::NoOpenScope));
}
