//! Builders for FIR functions and modules

use super::ir::*;
use rustc_hash::FxHashMap;

/// Builds one function. FIR functions have a single `entry` block.
pub struct FunctionBuilder {
    id: FunctionId,
    name: String,
    params: Vec<FirParam>,
    return_type: FirType,
    block: FirBlock,
    terminated: bool,
    next_value: u32,
    strictfp: bool,
    value_types: FxHashMap<ValueId, FirType>,
    value_names: FxHashMap<ValueId, String>,
}

impl FunctionBuilder {
    pub fn new(id: FunctionId, name: impl Into<String>, return_type: FirType) -> Self {
        Self {
            id,
            name: name.into(),
            params: Vec::new(),
            return_type,
            block: FirBlock::new(BlockId::ENTRY, "entry"),
            terminated: false,
            next_value: 0,
            strictfp: false,
            value_types: FxHashMap::default(),
            value_names: FxHashMap::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn return_type(&self) -> FirType {
        self.return_type
    }

    /// Fix the return type once it is known, e.g. from a lambda's first `return`
    pub fn set_return_type(&mut self, ty: FirType) {
        self.return_type = ty;
    }

    fn fresh_value(&mut self, ty: FirType) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        self.value_types.insert(id, ty);
        id
    }

    pub fn add_param(&mut self, name: &str, ty: FirType) -> ValueId {
        let value = self.fresh_value(ty);
        self.value_names.insert(value, name.to_string());
        self.params.push(FirParam {
            value,
            name: name.to_string(),
            ty,
        });
        value
    }

    /// Type of an operand produced in this function
    pub fn operand_type(&self, operand: &Operand) -> FirType {
        match operand {
            Operand::Value(id) => self.value_types.get(id).copied().unwrap_or(FirType::Void),
            Operand::Float(_, kind) => FirType::Float(*kind),
            Operand::Int(_) => FirType::I32,
            Operand::Undef(ty) => *ty,
        }
    }

    /// Append an instruction producing a value of type `ty`.
    ///
    /// Instructions after the terminator are dead and are dropped; the
    /// returned operand is still usable so lowering can continue.
    pub fn emit(&mut self, op: Op, ty: FirType) -> Operand {
        if self.terminated {
            return Operand::Undef(ty);
        }
        let result = (ty != FirType::Void).then(|| self.fresh_value(ty));
        self.block.instructions.push(FirInstr { result, op, ty });
        match result {
            Some(id) => Operand::Value(id),
            None => Operand::Undef(FirType::Void),
        }
    }

    pub fn build_binary(
        &mut self,
        op: FloatOp,
        lhs: Operand,
        rhs: Operand,
        ty: FirType,
        fp: FpAttrs,
    ) -> Operand {
        self.emit(Op::Binary { op, lhs, rhs, fp }, ty)
    }

    pub fn build_muladd(
        &mut self,
        a: Operand,
        b: Operand,
        c: Operand,
        ty: FirType,
        fp: FpAttrs,
    ) -> Operand {
        self.emit(Op::MulAdd { a, b, c, fp }, ty)
    }

    pub fn build_fneg(&mut self, operand: Operand, ty: FirType, fp: FpAttrs) -> Operand {
        self.emit(Op::FNeg { operand, fp }, ty)
    }

    pub fn build_cast(&mut self, op: CastOp, value: Operand, to: FirType, fp: FpAttrs) -> Operand {
        let from = self.operand_type(&value);
        self.emit(Op::Cast { op, value, from, fp }, to)
    }

    pub fn build_call(
        &mut self,
        callee: impl Into<String>,
        args: Vec<(FirType, Operand)>,
        ret: FirType,
    ) -> Operand {
        self.emit(
            Op::Call {
                callee: callee.into(),
                args,
            },
            ret,
        )
    }

    pub fn build_return(&mut self, value: Option<(FirType, Operand)>) {
        if self.terminated {
            return;
        }
        self.block.terminator = FirTerminator::Return(value);
        self.terminated = true;
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Rewrite every floating-point instruction emitted so far into its
    /// constrained form, keeping the exception behavior each one recorded.
    /// Returns the number of instructions rewritten.
    pub fn constrain_all(&mut self) -> usize {
        let mut rewritten = 0;
        for instr in &mut self.block.instructions {
            if let Some(fp) = instr.op.fp_attrs_mut() {
                if !fp.constrained {
                    fp.constrained = true;
                    rewritten += 1;
                }
            }
        }
        rewritten
    }

    pub fn set_strictfp(&mut self, strictfp: bool) {
        self.strictfp = strictfp;
    }

    pub fn build(self) -> FirFunction {
        FirFunction {
            id: self.id,
            name: self.name,
            params: self.params,
            return_type: self.return_type,
            blocks: vec![self.block],
            strictfp: self.strictfp,
            value_names: self.value_names,
        }
    }
}

/// Builds a module, handing out function ids
pub struct ModuleBuilder {
    module: FirModule,
    next_func_id: u32,
}

impl ModuleBuilder {
    pub fn new(name: impl Into<String>, target_triple: impl Into<String>) -> Self {
        Self {
            module: FirModule::new(name, target_triple),
            next_func_id: 0,
        }
    }

    pub fn fresh_func_id(&mut self) -> FunctionId {
        let id = FunctionId(self.next_func_id);
        self.next_func_id += 1;
        id
    }

    pub fn add_function(&mut self, function: FirFunction) {
        self.module.functions.push(function);
    }

    pub fn build(self) -> FirModule {
        self.module
    }
}
