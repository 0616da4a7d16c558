//! Textual FIR
//!
//! The output follows LLVM assembly syntax: ordinary instructions carry
//! `fast` flags, constrained operations are calls to
//! `llvm.experimental.constrained.*` with rounding and exception metadata,
//! and every intrinsic used is declared at the end of the module.

use std::fmt::{self, Write};

use super::ir::*;
use indexmap::IndexSet;
use rustc_hash::FxHashMap;

/// Render a module as text
pub fn print_module(module: &FirModule) -> String {
    IrPrinter::new().generate(module)
}

/// FIR text generator
pub struct IrPrinter {
    output: String,
    /// Intrinsic declarations in first-use order
    declares: IndexSet<String>,
    /// Printed names of the values of the current function
    names: FxHashMap<ValueId, String>,
    next_temp: u32,
}

impl IrPrinter {
    pub fn new() -> Self {
        Self {
            output: String::new(),
            declares: IndexSet::new(),
            names: FxHashMap::default(),
            next_temp: 0,
        }
    }

    pub fn generate(mut self, module: &FirModule) -> String {
        // Formatting into a String cannot fail
        let _ = self.emit_module(module);
        self.output
    }

    fn emit_module(&mut self, module: &FirModule) -> fmt::Result {
        writeln!(self.output, "; ModuleID = '{}'", module.name)?;
        writeln!(self.output, "target triple = \"{}\"", module.target_triple)?;

        for function in &module.functions {
            writeln!(self.output)?;
            self.emit_function(function)?;
        }

        if !self.declares.is_empty() {
            writeln!(self.output)?;
            for declare in &self.declares {
                writeln!(self.output, "{declare}")?;
            }
        }
        Ok(())
    }

    fn emit_function(&mut self, function: &FirFunction) -> fmt::Result {
        self.names.clear();
        self.next_temp = 0;
        for (id, name) in &function.value_names {
            self.names.insert(*id, format!("%{name}"));
        }

        let params: Vec<String> = function
            .params
            .iter()
            .map(|p| format!("{} %{}", p.ty, p.name))
            .collect();
        write!(
            self.output,
            "define {} {}({})",
            function.return_type,
            global_name(&function.name),
            params.join(", ")
        )?;
        if function.strictfp {
            write!(self.output, " strictfp")?;
        }
        writeln!(self.output, " {{")?;

        for block in &function.blocks {
            writeln!(self.output, "{}:", block.label)?;
            for instr in &block.instructions {
                self.emit_instruction(instr, function.strictfp)?;
            }
            self.emit_terminator(&block.terminator)?;
        }
        writeln!(self.output, "}}")
    }

    fn emit_instruction(&mut self, instr: &FirInstr, strictfp: bool) -> fmt::Result {
        let body = self.instruction_text(instr, strictfp);
        match instr.result {
            Some(id) => {
                let name = format!("%{}", self.next_temp);
                self.next_temp += 1;
                writeln!(self.output, "  {name} = {body}")?;
                self.names.insert(id, name);
            }
            None => writeln!(self.output, "  {body}")?,
        }
        Ok(())
    }

    fn instruction_text(&mut self, instr: &FirInstr, strictfp: bool) -> String {
        let ty = instr.ty;
        match &instr.op {
            Op::Binary { op, lhs, rhs, fp } => {
                if fp.constrained {
                    let name = format!(
                        "llvm.experimental.constrained.{}.{}",
                        op.mnemonic(),
                        type_suffix(ty)
                    );
                    self.declare(&name, ty, &[ty, ty], true, true);
                    format!(
                        "call {ty} @{name}({ty} {}, {ty} {}, {}, {}) strictfp",
                        self.operand(lhs),
                        self.operand(rhs),
                        rounding_arg(fp),
                        except_arg(fp)
                    )
                } else {
                    format!(
                        "{}{} {ty} {}, {}",
                        op.mnemonic(),
                        fast_flag(fp),
                        self.operand(lhs),
                        self.operand(rhs)
                    )
                }
            }
            Op::MulAdd { a, b, c, fp } => {
                let (a, b, c) = (self.operand(a), self.operand(b), self.operand(c));
                if fp.constrained {
                    let name = format!("llvm.experimental.constrained.fmuladd.{}", type_suffix(ty));
                    self.declare(&name, ty, &[ty, ty, ty], true, true);
                    format!(
                        "call {ty} @{name}({ty} {a}, {ty} {b}, {ty} {c}, {}, {}) strictfp",
                        rounding_arg(fp),
                        except_arg(fp)
                    )
                } else {
                    let name = format!("llvm.fmuladd.{}", type_suffix(ty));
                    self.declare(&name, ty, &[ty, ty, ty], false, false);
                    format!("call{} {ty} @{name}({ty} {a}, {ty} {b}, {ty} {c})", fast_flag(fp))
                }
            }
            Op::FNeg { operand, fp } => {
                format!("fneg{} {ty} {}", fast_flag(fp), self.operand(operand))
            }
            Op::Cast {
                op,
                value,
                from,
                fp,
            } => {
                let value = self.operand(value);
                if fp.constrained {
                    let name = format!(
                        "llvm.experimental.constrained.{}.{}.{}",
                        op.mnemonic(),
                        type_suffix(ty),
                        type_suffix(*from)
                    );
                    self.declare(&name, ty, &[*from], op.rounds(), true);
                    let mut args = format!("{from} {value}");
                    if op.rounds() {
                        args.push_str(", ");
                        args.push_str(&rounding_arg(fp));
                    }
                    args.push_str(", ");
                    args.push_str(&except_arg(fp));
                    format!("call {ty} @{name}({args}) strictfp")
                } else {
                    format!("{} {from} {value} to {ty}", op.mnemonic())
                }
            }
            Op::Call { callee, args } => {
                let args: Vec<String> = args
                    .iter()
                    .map(|(ty, arg)| format!("{ty} {}", self.operand(arg)))
                    .collect();
                let attrs = if strictfp { " strictfp" } else { "" };
                format!(
                    "call {ty} {}({}){attrs}",
                    global_name(callee),
                    args.join(", ")
                )
            }
        }
    }

    fn emit_terminator(&mut self, terminator: &FirTerminator) -> fmt::Result {
        match terminator {
            FirTerminator::Return(None) => writeln!(self.output, "  ret void"),
            FirTerminator::Return(Some((ty, value))) => {
                let value = self.operand(value);
                writeln!(self.output, "  ret {ty} {value}")
            }
            FirTerminator::Unreachable => writeln!(self.output, "  unreachable"),
        }
    }

    fn operand(&self, operand: &Operand) -> String {
        match operand {
            Operand::Value(id) => self
                .names
                .get(id)
                .cloned()
                .unwrap_or_else(|| format!("%v{}", id.0)),
            Operand::Float(value, _) => format_float(*value),
            Operand::Int(value) => value.to_string(),
            Operand::Undef(_) => "undef".to_string(),
        }
    }

    fn declare(
        &mut self,
        name: &str,
        ret: FirType,
        params: &[FirType],
        rounding: bool,
        except: bool,
    ) {
        let mut args: Vec<String> = params.iter().map(ToString::to_string).collect();
        if rounding {
            args.push("metadata".to_string());
        }
        if except {
            args.push("metadata".to_string());
        }
        self.declares
            .insert(format!("declare {ret} @{name}({})", args.join(", ")));
    }
}

impl Default for IrPrinter {
    fn default() -> Self {
        Self::new()
    }
}

fn fast_flag(fp: &FpAttrs) -> &'static str {
    if fp.fast { " fast" } else { "" }
}

fn rounding_arg(fp: &FpAttrs) -> String {
    format!("metadata !\"{}\"", fp.rounding.metadata())
}

fn except_arg(fp: &FpAttrs) -> String {
    format!("metadata !\"{}\"", fp.except.metadata())
}

/// Overload suffix of a type in intrinsic names
fn type_suffix(ty: FirType) -> &'static str {
    match ty {
        FirType::Float(kind) => kind.intrinsic_suffix(),
        FirType::I32 => "i32",
        FirType::Void => "isVoid",
    }
}

/// `@name`, quoted when the name is not a plain identifier
fn global_name(name: &str) -> String {
    let plain = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$' | '-'));
    if plain {
        format!("@{name}")
    } else {
        format!("@\"{name}\"")
    }
}

/// Decimal when exact (`1.000000e+00`), otherwise the bit pattern
fn format_float(value: f64) -> String {
    let text = format!("{value:.6e}");
    if text.parse::<f64>().ok() != Some(value) {
        return format!("0x{:016X}", value.to_bits());
    }
    match text.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.abs())
        }
        None => text,
    }
}
