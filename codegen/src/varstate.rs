//! Per-local cache state.

use crate::operand::Operand;

/// Inferred bounds of a local's value, one entry per enclosing block;
/// consumed by bounds-check elision when address operands are known small.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Bounds {
    pub upper: u64,
}

/// Cache state of one local variable.
///
/// `cache.ty()` never changes after the function prologue. `ref_count`
/// equals the number of `VarRef` operands on the operand stack naming this
/// local; if `cache` is `VarReg`, the register is marked allocated.
pub struct VarState {
    pub cache: Operand,
    pub ref_count: u32,
    /// The cache holds a newer value than the stack slot.
    pub dirty: bool,
    /// The stack slot has been written at least once; parameters start
    /// initialized, declared locals do not.
    pub init: bool,
    pub bounds_stack: Vec<Bounds>,
}

impl VarState {
    pub fn new(cache: Operand, dirty: bool, init: bool) -> Self {
        VarState {
            cache,
            ref_count: 0,
            dirty,
            init,
            bounds_stack: Vec::new(),
        }
    }

    pub fn reset_cache(&mut self) {
        self.cache = Operand::Nowhere {
            ty: self.cache.ty(),
        };
        self.dirty = false;
    }

    pub fn trim_bounds_stack(&mut self, size: usize) {
        if self.bounds_stack.len() > size {
            self.bounds_stack.truncate(size);
        }
    }
}
