//! Scoped floating-point mode policy
//!
//! [`FloatingPointModePolicy`] owns the mode stack for one translation unit.
//! The lowering pass drives it with the same events a front end produces
//! while parsing: scopes opening and closing, pragmas, function boundaries,
//! and one [`query`](FloatingPointModePolicy::query) per arithmetic
//! operation.
//!
//! Two scoping rules coexist:
//!
//! - `precise`, the evaluation method and contraction are lexically scoped:
//!   a plain directive lasts until the closing brace of the scope it appears
//!   in, while `push`ed entries outlive blocks until an explicit `pop`.
//! - Exception strictness escalates to the whole function. Once anything in
//!   a function needs constrained lowering, every floating-point operation
//!   of that function is constrained, and later `except(off)` directives do
//!   not relax the reported exception behavior.

use super::mode::{ExceptBehavior, FpContract, FpMode, RoundingMode};
use super::pragma::FpPragma;
use thiserror::Error;

/// Kind of a mode stack entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// Base entry holding the command-line defaults
    TranslationUnit,
    /// `namespace { }`; pragmas inside remain in effect after it closes
    Namespace,
    Function,
    /// Lambda body, lowered as its own function
    Lambda,
    /// Compound statement
    Block,
    /// Entry created by a `push` directive
    Pushed,
}

impl ScopeKind {
    /// Scopes opened and closed by braces
    pub fn is_lexical(self) -> bool {
        matches!(
            self,
            ScopeKind::Namespace | ScopeKind::Function | ScopeKind::Lambda | ScopeKind::Block
        )
    }

    pub fn is_function(self) -> bool {
        matches!(self, ScopeKind::Function | ScopeKind::Lambda)
    }
}

/// Activation record for one scope or `push`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeScope {
    pub mode: FpMode,
    pub kind: ScopeKind,
}

/// Errors raised by policy mutations; all of them leave the stack unchanged
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("`float_control(pop)` without a matching `push`")]
    Underflow,
    #[error("no open scope to close")]
    NoOpenScope,
    #[error("`float_control(except, on)` is illegal while precise is disabled")]
    ExceptWithoutPrecise,
    #[error("`float_control(precise, off)` is illegal while except is enabled")]
    PreciseOffWithExcept,
}

/// Ordered stack of mode scopes, innermost last. Never empty.
#[derive(Debug, Clone)]
pub struct PolicyStack {
    scopes: Vec<ModeScope>,
}

impl PolicyStack {
    pub fn new(base: FpMode) -> Self {
        Self {
            scopes: vec![ModeScope {
                mode: base,
                kind: ScopeKind::TranslationUnit,
            }],
        }
    }

    pub fn top(&self) -> &ModeScope {
        // The base entry is never removed
        &self.scopes[self.scopes.len() - 1]
    }

    fn top_mut(&mut self) -> &mut ModeScope {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    fn push(&mut self, kind: ScopeKind) {
        let mode = self.top().mode;
        self.scopes.push(ModeScope { mode, kind });
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModeScope> {
        self.scopes.iter()
    }

    /// Number of `push` entries still open
    pub fn pushed(&self) -> usize {
        self.scopes
            .iter()
            .filter(|s| s.kind == ScopeKind::Pushed)
            .count()
    }
}

/// Per-function escalation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FunctionFrame {
    /// Every operation of the function uses the constrained form
    constrained: bool,
    /// Minimum exception behavior reported by queries
    floor: ExceptBehavior,
}

impl FunctionFrame {
    fn new() -> Self {
        Self {
            constrained: false,
            floor: ExceptBehavior::Ignore,
        }
    }

    /// Returns `true` if this call turned the frame constrained
    fn escalate(&mut self, mode: &FpMode) -> bool {
        if !mode.requires_constrained() {
            return false;
        }
        let newly = !self.constrained;
        self.constrained = true;
        self.floor = self.floor.max(mode.except);
        newly
    }
}

/// What a function boundary reports once its body has been lowered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionFpSummary {
    /// The function must be lowered entirely with constrained operations
    pub strict: bool,
    /// Strongest exception behavior any operation in it required
    pub except: ExceptBehavior,
}

/// State left over when a translation unit ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyReport {
    pub final_mode: FpMode,
    /// `push` entries never matched by a `pop`
    pub unmatched_pushes: usize,
    /// Lexical scopes never closed
    pub open_scopes: usize,
}

/// Floating-point mode policy for one translation unit
#[derive(Debug, Clone)]
pub struct FloatingPointModePolicy {
    stack: PolicyStack,
    frames: Vec<FunctionFrame>,
}

impl FloatingPointModePolicy {
    /// Create a policy whose base entry holds `default`
    pub fn new(default: FpMode) -> Self {
        Self {
            stack: PolicyStack::new(default),
            frames: Vec::new(),
        }
    }

    pub fn stack(&self) -> &PolicyStack {
        &self.stack
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Lexical mode at the top of the stack, without function escalation
    pub fn current(&self) -> FpMode {
        self.stack.top().mode
    }

    /// Open a lexical scope with a copy of the current mode
    pub fn enter_scope(&mut self, kind: ScopeKind) {
        debug_assert!(kind.is_lexical(), "{kind:?} is not a lexical scope");
        self.stack.push(kind);
        tracing::trace!(?kind, depth = self.stack.len(), "enter fp scope");
    }

    /// Close the innermost lexical scope.
    ///
    /// `push` entries opened inside it stay on the stack. A namespace hands
    /// the mode it ended with to the enclosing entry.
    pub fn exit_scope(&mut self) -> Result<ScopeKind, PolicyError> {
        let scopes = &mut self.stack.scopes;
        let idx = scopes
            .iter()
            .rposition(|s| s.kind.is_lexical())
            .ok_or(PolicyError::NoOpenScope)?;

        let removed = scopes.remove(idx);
        if removed.kind == ScopeKind::Namespace {
            scopes[idx - 1].mode = removed.mode;
        }

        let survivors = scopes.len() - idx;
        if survivors > 0 {
            tracing::debug!(
                kind = ?removed.kind,
                survivors,
                "pushed fp modes outlive their scope"
            );
        }
        tracing::trace!(kind = ?removed.kind, depth = scopes.len(), "exit fp scope");
        Ok(removed.kind)
    }

    /// Apply one directive. On error the stack is left untouched.
    pub fn apply_pragma(&mut self, pragma: &FpPragma) -> Result<(), PolicyError> {
        let current = self.current();
        match *pragma {
            FpPragma::Push => self.push(),
            FpPragma::Pop => self.pop()?,
            FpPragma::Precise { on, push } => {
                if !on && current.except != ExceptBehavior::Ignore {
                    return Err(PolicyError::PreciseOffWithExcept);
                }
                if push {
                    self.push();
                }
                let top = &mut self.stack.top_mut().mode;
                top.precise = on;
                top.contract = if on { FpContract::On } else { FpContract::Fast };
            }
            FpPragma::Except { on, push } => {
                if on && !current.precise {
                    return Err(PolicyError::ExceptWithoutPrecise);
                }
                if push {
                    self.push();
                }
                self.stack.top_mut().mode.except = if on {
                    ExceptBehavior::Strict
                } else {
                    ExceptBehavior::Ignore
                };
            }
            FpPragma::Exceptions(except) => {
                if except != ExceptBehavior::Ignore && !current.precise {
                    return Err(PolicyError::ExceptWithoutPrecise);
                }
                self.stack.top_mut().mode.except = except;
            }
            FpPragma::EvalMethod(method) => self.stack.top_mut().mode.eval_method = method,
            FpPragma::Contract(contract) => self.stack.top_mut().mode.contract = contract,
            FpPragma::FenvAccess(on) => {
                if on && !current.precise {
                    return Err(PolicyError::ExceptWithoutPrecise);
                }
                let top = &mut self.stack.top_mut().mode;
                if on {
                    top.except = ExceptBehavior::Strict;
                    top.rounding = RoundingMode::Dynamic;
                } else {
                    top.except = ExceptBehavior::Ignore;
                    top.rounding = RoundingMode::ToNearest;
                }
            }
        }

        let mode = self.current();
        self.escalate(&mode);
        tracing::debug!(?pragma, %mode, "applied fp pragma");
        Ok(())
    }

    fn push(&mut self) {
        self.stack.push(ScopeKind::Pushed);
    }

    /// Remove the nearest `push` entry. Only namespace scopes may sit above
    /// it; their modes revert together with the popped entry.
    fn pop(&mut self) -> Result<(), PolicyError> {
        let scopes = &mut self.stack.scopes;
        let mut idx = scopes.len() - 1;
        loop {
            match scopes[idx].kind {
                ScopeKind::Pushed => break,
                ScopeKind::Namespace if idx > 0 => idx -= 1,
                _ => return Err(PolicyError::Underflow),
            }
        }

        let restored = scopes[idx - 1].mode;
        scopes.remove(idx);
        for scope in &mut scopes[idx..] {
            scope.mode = restored;
        }
        Ok(())
    }

    fn escalate(&mut self, mode: &FpMode) {
        if let Some(frame) = self.frames.last_mut() {
            if frame.escalate(mode) {
                tracing::debug!(except = %mode.except, "function escalated to constrained fp");
            }
        }
    }

    /// Mode for one arithmetic operation.
    ///
    /// Inside an escalated function the exception behavior never drops
    /// below what the function has already required.
    pub fn query(&mut self) -> FpMode {
        let mut mode = self.current();
        self.escalate(&mode);
        if let Some(frame) = self.frames.last() {
            mode.except = mode.except.max(frame.floor);
        }
        mode
    }

    /// Whether the function being lowered uses constrained operations
    pub fn function_is_strict(&self) -> bool {
        self.frames.last().is_some_and(|f| f.constrained)
    }

    /// Start a fresh escalation frame for the function whose scope is on top.
    ///
    /// The frame starts escalated when the ambient mode is already strict. A
    /// lambda also inherits the escalation of the function enclosing it.
    pub fn reset_at_function_boundary(&mut self) {
        let mut frame = FunctionFrame::new();
        if self.stack.top().kind == ScopeKind::Lambda {
            if let Some(outer) = self.frames.last() {
                frame = *outer;
            }
        }
        frame.escalate(&self.current());
        self.frames.push(frame);
    }

    /// Enter a function (or lambda) body
    pub fn enter_function(&mut self, kind: ScopeKind) {
        debug_assert!(kind.is_function());
        self.enter_scope(kind);
        self.reset_at_function_boundary();
    }

    /// Enter a lambda body nested in the current function
    pub fn enter_lambda(&mut self) {
        self.enter_function(ScopeKind::Lambda);
    }

    /// Leave the current function body and report its strictness
    pub fn exit_function(&mut self) -> Result<FunctionFpSummary, PolicyError> {
        let frame = self.frames.pop().ok_or(PolicyError::NoOpenScope)?;
        let kind = self.exit_scope()?;
        debug_assert!(kind.is_function(), "closed {kind:?} as a function");
        Ok(FunctionFpSummary {
            strict: frame.constrained,
            except: frame.floor,
        })
    }

    /// Snapshot the lexical mode, e.g. at a template definition
    pub fn capture(&self) -> FpMode {
        self.current()
    }

    /// Enter a template instantiation with the mode captured at its
    /// definition, regardless of the mode at the point of instantiation
    pub fn enter_instantiation(&mut self, captured: FpMode) {
        self.stack.scopes.push(ModeScope {
            mode: captured,
            kind: ScopeKind::Function,
        });
        self.reset_at_function_boundary();
    }

    /// Close the translation unit
    pub fn finish(self) -> PolicyReport {
        PolicyReport {
            final_mode: self.current(),
            unmatched_pushes: self.stack.pushed(),
            open_scopes: self.stack.iter().filter(|s| s.kind.is_lexical()).count(),
        }
    }
}

impl Default for FloatingPointModePolicy {
    fn default() -> Self {
        Self::new(FpMode::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fp::mode::EvalMethod;

    const PRECISE_OFF: FpPragma = FpPragma::Precise {
        on: false,
        push: false,
    };
    const EXCEPT_ON: FpPragma = FpPragma::Except {
        on: true,
        push: false,
    };
    const EXCEPT_OFF: FpPragma = FpPragma::Except {
        on: false,
        push: false,
    };

    #[test]
    fn test_block_pragma_reverts_on_exit() {
        let mut policy = FloatingPointModePolicy::default();
        policy.enter_function(ScopeKind::Function);
        policy.enter_scope(ScopeKind::Block);
        policy.apply_pragma(&PRECISE_OFF).unwrap();
        assert!(policy.query().fast_math());
        policy.exit_scope().unwrap();
        assert!(policy.query().precise);
    }

    #[test]
    fn test_pop_without_push_underflows() {
        let mut policy = FloatingPointModePolicy::default();
        assert_eq!(policy.apply_pragma(&FpPragma::Pop), Err(PolicyError::Underflow));
        assert_eq!(policy.depth(), 1);
    }

    #[test]
    fn test_pop_does_not_cross_function_scope() {
        let mut policy = FloatingPointModePolicy::default();
        policy.apply_pragma(&FpPragma::Push).unwrap();
        policy.enter_function(ScopeKind::Function);
        assert_eq!(policy.apply_pragma(&FpPragma::Pop), Err(PolicyError::Underflow));
        policy.exit_function().unwrap();
        policy.apply_pragma(&FpPragma::Pop).unwrap();
    }

    #[test]
    fn test_escalation_is_sticky() {
        let mut policy = FloatingPointModePolicy::default();
        policy.enter_function(ScopeKind::Function);
        policy.apply_pragma(&EXCEPT_ON).unwrap();
        assert_eq!(policy.query().except, ExceptBehavior::Strict);
        policy.enter_scope(ScopeKind::Block);
        policy.apply_pragma(&EXCEPT_OFF).unwrap();
        assert_eq!(policy.current().except, ExceptBehavior::Ignore);
        assert_eq!(policy.query().except, ExceptBehavior::Strict);
        policy.exit_scope().unwrap();
        let summary = policy.exit_function().unwrap();
        assert!(summary.strict);
        assert_eq!(summary.except, ExceptBehavior::Strict);
    }

    #[test]
    fn test_empty_block_pragma_still_escalates() {
        let mut policy = FloatingPointModePolicy::default();
        policy.enter_function(ScopeKind::Function);
        policy.enter_scope(ScopeKind::Block);
        policy.apply_pragma(&EXCEPT_ON).unwrap();
        policy.exit_scope().unwrap();
        assert_eq!(policy.current().except, ExceptBehavior::Ignore);
        assert!(policy.function_is_strict());
        assert_eq!(policy.query().except, ExceptBehavior::Strict);
    }

    #[test]
    fn test_namespace_pragma_outlives_namespace() {
        let mut policy = FloatingPointModePolicy::default();
        policy.enter_scope(ScopeKind::Namespace);
        policy
            .apply_pragma(&FpPragma::EvalMethod(EvalMethod::Double))
            .unwrap();
        policy.exit_scope().unwrap();
        assert_eq!(policy.current().eval_method, EvalMethod::Double);
    }

    #[test]
    fn test_pop_reverts_through_namespace() {
        let mut policy = FloatingPointModePolicy::default();
        policy.apply_pragma(&FpPragma::Push).unwrap();
        policy.apply_pragma(&PRECISE_OFF).unwrap();
        policy.enter_scope(ScopeKind::Namespace);
        policy.apply_pragma(&FpPragma::Pop).unwrap();
        assert!(policy.current().precise);
        policy.exit_scope().unwrap();
        assert!(policy.current().precise);
        assert_eq!(policy.depth(), 1);
    }

    #[test]
    fn test_illegal_combinations_are_rejected() {
        let mut policy = FloatingPointModePolicy::default();
        policy.apply_pragma(&PRECISE_OFF).unwrap();
        assert_eq!(
            policy.apply_pragma(&EXCEPT_ON),
            Err(PolicyError::ExceptWithoutPrecise)
        );
        assert_eq!(policy.current().except, ExceptBehavior::Ignore);

        let mut policy = FloatingPointModePolicy::default();
        policy.apply_pragma(&EXCEPT_ON).unwrap();
        assert_eq!(
            policy.apply_pragma(&PRECISE_OFF),
            Err(PolicyError::PreciseOffWithExcept)
        );
        assert!(policy.current().precise);
    }

    #[test]
    fn test_rejected_push_variant_does_not_push() {
        let mut policy = FloatingPointModePolicy::default();
        policy.apply_pragma(&PRECISE_OFF).unwrap();
        let depth = policy.depth();
        let err = policy.apply_pragma(&FpPragma::Except { on: true, push: true });
        assert!(err.is_err());
        assert_eq!(policy.depth(), depth);
    }

    #[test]
    fn test_fenv_access_sets_dynamic_rounding() {
        let mut policy = FloatingPointModePolicy::default();
        policy.apply_pragma(&FpPragma::FenvAccess(true)).unwrap();
        policy.enter_function(ScopeKind::Function);
        assert!(policy.function_is_strict());
        let mode = policy.query();
        assert_eq!(mode.rounding, RoundingMode::Dynamic);
        assert_eq!(mode.except, ExceptBehavior::Strict);
    }

    #[test]
    fn test_finish_reports_unmatched_push() {
        let mut policy = FloatingPointModePolicy::default();
        policy.apply_pragma(&FpPragma::Push).unwrap();
        let report = policy.finish();
        assert_eq!(report.unmatched_pushes, 1);
        assert_eq!(report.open_scopes, 0);
    }
}
