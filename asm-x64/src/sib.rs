//! SIB byte fields.

use crate::{Reg, Type};

/// An index scale factor, pre-shifted into SIB bit position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scale(pub(crate) u8);

impl Scale {
    pub const S0: Scale = Scale(0 << 6);
    pub const S1: Scale = Scale(1 << 6);
    pub const S2: Scale = Scale(2 << 6);
    pub const S3: Scale = Scale(3 << 6);

    /// Scale of a word-sized element of the given type: S2 for 32-bit
    /// types, S3 for 64-bit types.
    #[inline]
    pub fn of_type(t: Type) -> Scale {
        Scale(((t.size() >> 3) | 2) << 6)
    }
}

/// The "no index register" marker in the SIB index field.
pub(crate) const NO_INDEX: u8 = 4 << 3;

#[inline]
pub(crate) fn reg_index(r: Reg) -> u8 {
    (r.0 & 7) << 3
}

#[inline]
pub(crate) fn reg_base(r: Reg) -> u8 {
    r.0 & 7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_scale() {
        assert_eq!(Scale::of_type(Type::I32), Scale::S2);
        assert_eq!(Scale::of_type(Type::F32), Scale::S2);
        assert_eq!(Scale::of_type(Type::I64), Scale::S3);
        assert_eq!(Scale::of_type(Type::F64), Scale::S3);
    }
}
