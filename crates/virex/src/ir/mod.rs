//! Three-address intermediate representation.
//!
//! The IR is linear: one [`Instr`] sequence per function, with typed
//! temporaries (`t0`, `t1`, ...), named variables, and label/jump control
//! flow. Operands of kind [`Operand::Var`] may hold composed C lvalue
//! strings (`point.x`, `row[i]`, `(*p)`) — the generator builds access
//! paths by string composition and the emitter prints them verbatim.
//!
//! Everything here is serde-serializable so `--emit-ir` can dump the
//! optimized program as JSON.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use strum::{Display, EnumString, IntoStaticStr};

pub mod r#gen;
pub mod opt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum Opcode {
    // Arithmetic
    #[strum(serialize = "ADD")]
    Add,
    #[strum(serialize = "SUB")]
    Sub,
    #[strum(serialize = "MUL")]
    Mul,
    #[strum(serialize = "DIV")]
    Div,
    #[strum(serialize = "MOD")]
    Mod,
    // Comparison
    #[strum(serialize = "EQ")]
    Eq,
    #[strum(serialize = "NE")]
    Ne,
    #[strum(serialize = "LT")]
    Lt,
    #[strum(serialize = "LE")]
    Le,
    #[strum(serialize = "GT")]
    Gt,
    #[strum(serialize = "GE")]
    Ge,
    // Logical
    #[strum(serialize = "AND")]
    And,
    #[strum(serialize = "OR")]
    Or,
    #[strum(serialize = "NOT")]
    Not,
    // Unary
    #[strum(serialize = "NEG")]
    Neg,
    #[strum(serialize = "ADDR")]
    Addr,
    #[strum(serialize = "DEREF")]
    Deref,
    // Data movement
    #[strum(serialize = "MOVE")]
    Move,
    #[strum(serialize = "LOAD")]
    Load,
    #[strum(serialize = "STORE")]
    Store,
    #[strum(serialize = "CAST")]
    Cast,
    // Control
    #[strum(serialize = "LABEL")]
    Label,
    #[strum(serialize = "JUMP")]
    Jump,
    #[strum(serialize = "BRANCH")]
    Branch,
    #[strum(serialize = "FAIL")]
    Fail,
    #[strum(serialize = "RETURN")]
    Return,
    // Calls
    #[strum(serialize = "CALL")]
    Call,
    #[strum(serialize = "NOP")]
    Nop,
}

impl Opcode {
    /// Pure binary arithmetic/comparison — the CSE candidate set.
    pub fn is_pure_binary(self) -> bool {
        matches!(
            self,
            Self::Add
                | Self::Sub
                | Self::Mul
                | Self::Div
                | Self::Mod
                | Self::Eq
                | Self::Ne
                | Self::Lt
                | Self::Le
                | Self::Gt
                | Self::Ge
        )
    }

    /// Binary ops the constant folder evaluates (adds the logical pair).
    pub fn is_foldable(self) -> bool {
        self.is_pure_binary() || matches!(self, Self::And | Self::Or)
    }

    /// Pure value-producing ops that LICM may hoist.
    pub fn is_hoistable(self) -> bool {
        self.is_foldable() || matches!(self, Self::Not | Self::Neg)
    }

    pub fn is_comparison(self) -> bool {
        matches!(self, Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Temp(u32),
    Const(i64),
    Float(f64),
    Var(String),
    Label(String),
    Str(String),
}

impl Operand {
    pub fn as_temp(&self) -> Option<u32> {
        match self {
            Self::Temp(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<&str> {
        match self {
            Self::Label(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Self::Const(_))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Temp(id) => write!(f, "t{id}"),
            Self::Const(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Var(name) | Self::Label(name) => write!(f, "{name}"),
            Self::Str(value) => write!(f, "{value:?}"),
        }
    }
}

pub type OperandList = SmallVec<[Operand; 4]>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instr {
    pub op: Opcode,
    pub dest: Option<Operand>,
    pub src1: Option<Operand>,
    pub src2: Option<Operand>,
    /// Call arguments.
    pub args: OperandList,
}

impl Instr {
    pub fn new(op: Opcode, dest: Option<Operand>, src1: Option<Operand>, src2: Option<Operand>) -> Self {
        Self {
            op,
            dest,
            src1,
            src2,
            args: OperandList::new(),
        }
    }

    pub fn call(dest: Option<Operand>, callee: Operand, args: OperandList) -> Self {
        Self {
            op: Opcode::Call,
            dest,
            src1: Some(callee),
            src2: None,
            args,
        }
    }

    pub fn label(name: &str) -> Self {
        Self::new(Opcode::Label, None, Some(Operand::Label(name.to_owned())), None)
    }

    pub fn jump(target: &str) -> Self {
        Self::new(Opcode::Jump, None, Some(Operand::Label(target.to_owned())), None)
    }

    pub fn branch(cond: Operand, target: &str) -> Self {
        Self::new(Opcode::Branch, None, Some(cond), Some(Operand::Label(target.to_owned())))
    }

    /// Rewrites this instruction into a no-op in place.
    pub fn make_nop(&mut self) {
        self.op = Opcode::Nop;
        self.dest = None;
        self.src1 = None;
        self.src2 = None;
        self.args.clear();
    }

    /// Rewrites this instruction into `MOVE dest, src` in place, keeping
    /// the destination.
    pub fn make_move(&mut self, src: Operand) {
        self.op = Opcode::Move;
        self.src1 = Some(src);
        self.src2 = None;
        self.args.clear();
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op)?;
        if let Some(dest) = &self.dest {
            write!(f, " {dest}")?;
        }
        if let Some(src1) = &self.src1 {
            write!(f, " {src1}")?;
        }
        if let Some(src2) = &self.src2 {
            write!(f, " {src2}")?;
        }
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrParam {
    pub name: String,
    pub c_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrLocal {
    pub name: String,
    pub c_type: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IrFunction {
    pub name: String,
    pub params: Vec<IrParam>,
    pub return_type: String,
    pub locals: Vec<IrLocal>,
    /// C type of each temporary, indexed by id.
    pub temp_types: Vec<String>,
    pub instrs: Vec<Instr>,
    pub label_count: u32,
}

impl IrFunction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            return_type: "void".to_owned(),
            ..Self::default()
        }
    }

    pub fn temp_count(&self) -> usize {
        self.temp_types.len()
    }

    pub fn push(&mut self, instr: Instr) {
        self.instrs.push(instr);
    }

    /// Checks the structural IR invariants: temporary ids stay in range
    /// with non-empty types, every jump/branch target is a label defined in
    /// this function, and label operands sit where control ops expect them.
    pub fn validate(&self) -> Result<(), String> {
        let labels: Vec<&str> = self
            .instrs
            .iter()
            .filter(|i| i.op == Opcode::Label)
            .filter_map(|i| i.src1.as_ref().and_then(Operand::as_label))
            .collect();

        let check_operand = |operand: &Operand| -> Result<(), String> {
            if let Operand::Temp(id) = operand {
                if *id as usize >= self.temp_count() {
                    return Err(format!("temporary t{id} out of range in {}", self.name));
                }
                if self.temp_types[*id as usize].is_empty() {
                    return Err(format!("temporary t{id} has no type in {}", self.name));
                }
            }
            Ok(())
        };

        for instr in &self.instrs {
            for operand in [&instr.dest, &instr.src1, &instr.src2].into_iter().flatten() {
                check_operand(operand)?;
            }
            for arg in &instr.args {
                check_operand(arg)?;
            }

            match instr.op {
                Opcode::Jump => {
                    let target = instr
                        .src1
                        .as_ref()
                        .and_then(Operand::as_label)
                        .ok_or_else(|| format!("JUMP without label operand in {}", self.name))?;
                    if !labels.contains(&target) {
                        return Err(format!("JUMP to undefined label {target} in {}", self.name));
                    }
                }
                Opcode::Branch => {
                    let target = instr
                        .src2
                        .as_ref()
                        .and_then(Operand::as_label)
                        .ok_or_else(|| format!("BRANCH without label operand in {}", self.name))?;
                    if !labels.contains(&target) {
                        return Err(format!("BRANCH to undefined label {target} in {}", self.name));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl fmt::Display for IrFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "func {}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", param.c_type, param.name)?;
        }
        writeln!(f, ") -> {} {{", self.return_type)?;
        for instr in &self.instrs {
            if instr.op == Opcode::Label {
                writeln!(f, "{instr}")?;
            } else {
                writeln!(f, "    {instr}")?;
            }
        }
        writeln!(f, "}}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrGlobal {
    pub name: String,
    pub c_type: String,
    pub init: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IrModule {
    pub globals: Vec<IrGlobal>,
    pub functions: Vec<IrFunction>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_catches_missing_labels() {
        let mut func = IrFunction::new("f");
        func.push(Instr::jump("L0"));
        assert!(func.validate().is_err());
        func.instrs.insert(0, Instr::label("L0"));
        assert!(func.validate().is_ok());
    }

    #[test]
    fn validate_catches_untyped_temps() {
        let mut func = IrFunction::new("f");
        func.push(Instr::new(
            Opcode::Move,
            Some(Operand::Temp(0)),
            Some(Operand::Const(1)),
            None,
        ));
        assert!(func.validate().is_err());
        func.temp_types.push("long".to_owned());
        assert!(func.validate().is_ok());
    }

    #[test]
    fn display_is_readable() {
        let mut func = IrFunction::new("m__f");
        func.temp_types.push("long".to_owned());
        func.push(Instr::new(
            Opcode::Add,
            Some(Operand::Temp(0)),
            Some(Operand::Const(1)),
            Some(Operand::Const(2)),
        ));
        let text = func.to_string();
        assert!(text.contains("ADD t0 1 2"));
    }
}
