//! Code-generation failures.
//!
//! Every failure aborts the current function's compilation and surfaces to
//! the module driver; the operand stack is never left half-mutated for a
//! resumed compilation to observe. Encoder-internal problems (buffer
//! overflow, missing packed encodings) are accumulated on the text buffer
//! instead, see [`sunbeam_asm_x64::EncodeError`].

use crate::opcodes::Opcode;
use crate::types::Type;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("{op}: {what} index out of bounds: {index}")]
    OutOfBounds {
        op: Opcode,
        what: &'static str,
        index: u64,
    },

    #[error("{op}: operand has wrong type: {found:?}")]
    TypeMismatch { op: Opcode, found: Type },

    #[error("{op} argument #{index} has wrong type: {found:?}")]
    ArgType {
        op: Opcode,
        index: usize,
        found: Type,
    },

    #[error("invalid opcode: 0x{0:02x}")]
    InvalidOpcode(u8),

    #[error("invalid value type: {0:#04x}")]
    InvalidValueType(i8),

    #[error("{op}: operand stack is empty")]
    StackUnderflow { op: Opcode },

    #[error("{op}: control stack is empty")]
    ControlUnderflow { op: Opcode },

    #[error("unexpected end of function body")]
    UnexpectedEnd,

    #[error("trailing bytes after function end")]
    TrailingBytes,

    #[error("{op}: not enough registers for all register arguments")]
    RegistersExhausted { op: Opcode },
}

impl CodegenError {
    pub(crate) fn out_of_bounds(op: Opcode, what: &'static str, index: impl Into<u64>) -> Self {
        CodegenError::OutOfBounds {
            op,
            what,
            index: index.into(),
        }
    }
}
