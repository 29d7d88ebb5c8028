//! Register numbering.

use std::fmt;

/// A hardware register encoding in one of the two banks: `Reg(0)..Reg(15)`
/// name `rax..r15` in the integer bank and `xmm0..xmm15` in the floating
/// bank. Which bank applies is determined by the operand type at the use
/// site, never stored in the register itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reg(pub u8);

impl Reg {
    /// Function results travel in `rax`/`xmm0`.
    pub const RESULT: Reg = Reg(0);

    /// Internal scratch register (`rcx`/`xmm1`); doubles as the shift-count
    /// register in the integer bank.
    pub const SCRATCH: Reg = Reg(1);

    pub const RAX: Reg = Reg(0);
    pub const RCX: Reg = Reg(1);
    pub const RDX: Reg = Reg(2);
    pub const RBX: Reg = Reg(3);
    pub const RSP: Reg = Reg(4);
    pub const RBP: Reg = Reg(5);
    pub const RSI: Reg = Reg(6);
    pub const RDI: Reg = Reg(7);
    pub const R8: Reg = Reg(8);
    pub const R9: Reg = Reg(9);
    pub const R10: Reg = Reg(10);
    pub const R11: Reg = Reg(11);
    pub const R12: Reg = Reg(12);
    pub const R13: Reg = Reg(13);
    pub const R14: Reg = Reg(14);
    pub const R15: Reg = Reg(15);
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}
