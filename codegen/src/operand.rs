//! The operand model: typed, lazily materialized values on the logical
//! stack.

use crate::types::{category, Category, Type};
use sunbeam_asm_x64::{insn::CcInsn, Reg};

/// A condition held in the architectural flags register.
///
/// Integer conditions map directly onto x86 condition nibbles. Float
/// conditions follow a UCOMIS comparison: `OrderedAndGt`/`OrderedAndGe`
/// are single flag tests (unordered inputs set CF and fall out as false),
/// while equality must additionally consult the parity flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cond {
    Eq,
    Ne,
    GeS,
    GtS,
    GeU,
    GtU,
    LeS,
    LtS,
    LeU,
    LtU,
    OrderedAndEq,
    OrderedAndGt,
    OrderedAndGe,
    UnorderedOrNe,
}

impl Cond {
    /// The x86 condition nibble, for conditions expressible as a single
    /// flag test.
    pub fn cc(self) -> Option<CcInsn> {
        match self {
            Cond::Eq => Some(CcInsn::EQ),
            Cond::Ne => Some(CcInsn::NE),
            Cond::GeS => Some(CcInsn::GE_S),
            Cond::GtS => Some(CcInsn::GT_S),
            Cond::GeU => Some(CcInsn::GE_U),
            Cond::GtU => Some(CcInsn::GT_U),
            Cond::LeS => Some(CcInsn::LE_S),
            Cond::LtS => Some(CcInsn::LT_S),
            Cond::LeU => Some(CcInsn::LE_U),
            Cond::LtU => Some(CcInsn::LT_U),
            Cond::OrderedAndGt => Some(CcInsn::GT_U),
            Cond::OrderedAndGe => Some(CcInsn::GE_U),
            Cond::OrderedAndEq | Cond::UnorderedOrNe => None,
        }
    }

    /// The condition that holds when the comparison operands are exchanged.
    pub fn swapped(self) -> Cond {
        match self {
            Cond::GeS => Cond::LeS,
            Cond::GtS => Cond::LtS,
            Cond::GeU => Cond::LeU,
            Cond::GtU => Cond::LtU,
            Cond::LeS => Cond::GeS,
            Cond::LtS => Cond::GtS,
            Cond::LeU => Cond::GeU,
            Cond::LtU => Cond::GtU,
            other => other,
        }
    }

    /// The logically inverted condition.
    pub fn negated(self) -> Cond {
        match self {
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
            Cond::GeS => Cond::LtS,
            Cond::GtS => Cond::LeS,
            Cond::GeU => Cond::LtU,
            Cond::GtU => Cond::LeU,
            Cond::LeS => Cond::GtS,
            Cond::LtS => Cond::GeS,
            Cond::LeU => Cond::GtU,
            Cond::LtU => Cond::GeU,
            Cond::OrderedAndEq => Cond::UnorderedOrNe,
            Cond::UnorderedOrNe => Cond::OrderedAndEq,
            // Negations of the remaining float conditions are
            // unordered-or-<, never produced by the front end.
            Cond::OrderedAndGt => Cond::LeU,
            Cond::OrderedAndGe => Cond::LtU,
        }
    }
}

/// A value on the code generator's logical stack.
///
/// The storage discriminant is a primary hot path; exhaustive matching
/// keeps every consumer honest when a variant changes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Operand {
    /// The value is not materialized anywhere; valid only as a local's
    /// cache descriptor.
    Nowhere { ty: Type },

    /// A constant known at compile time.
    Imm { ty: Type, val: i64 },

    /// A logical reference to a local variable; the reference count is
    /// tracked in the local's [`crate::varstate::VarState`].
    VarRef { ty: Type, index: u32 },

    /// The local is cached in the given register.
    VarReg {
        ty: Type,
        index: u32,
        reg: Reg,
        zero_ext: bool,
    },

    /// A transient value owning its register until popped.
    TempReg { ty: Type, reg: Reg, zero_ext: bool },

    /// The value has been spilled to the next machine-stack slot.
    Stack { ty: Type },

    /// The value is the named condition in the flags register; at most one
    /// may be live.
    Flags { cond: Cond },
}

impl Operand {
    pub fn ty(&self) -> Type {
        match *self {
            Operand::Nowhere { ty }
            | Operand::Imm { ty, .. }
            | Operand::VarRef { ty, .. }
            | Operand::VarReg { ty, .. }
            | Operand::TempReg { ty, .. }
            | Operand::Stack { ty } => ty,
            Operand::Flags { .. } => Type::I32,
        }
    }

    pub fn category(&self) -> Category {
        category(self.ty())
    }

    /// True for `VarReg` and `TempReg`.
    pub fn is_reg(&self) -> bool {
        matches!(self, Operand::VarReg { .. } | Operand::TempReg { .. })
    }

    /// The register of a `VarReg` or `TempReg` operand.
    pub fn reg(&self) -> Option<Reg> {
        match *self {
            Operand::VarReg { reg, .. } | Operand::TempReg { reg, .. } => Some(reg),
            _ => None,
        }
    }

    /// Zero-extension fact of a register-resident operand.
    pub fn zero_ext(&self) -> bool {
        match *self {
            Operand::VarReg { zero_ext, .. } | Operand::TempReg { zero_ext, .. } => zero_ext,
            _ => false,
        }
    }
}
