//! Operation codes packed into dispatch-table entries.

// Unary.
pub const CLZ: u8 = 0;
pub const CTZ: u8 = 1;
pub const POPCNT: u8 = 2;
pub const ABS: u8 = 3;
pub const NEG: u8 = 4;
pub const CEIL: u8 = 5;
pub const FLOOR: u8 = 6;
pub const TRUNC: u8 = 7;
pub const NEAREST: u8 = 8;
pub const SQRT: u8 = 9;

// Binary.
pub const ADD: u8 = 0;
pub const SUB: u8 = 1;
pub const MUL: u8 = 2;
pub const DIV_S: u8 = 3;
pub const DIV_U: u8 = 4;
pub const REM_S: u8 = 5;
pub const REM_U: u8 = 6;
pub const AND: u8 = 7;
pub const OR: u8 = 8;
pub const XOR: u8 = 9;
pub const SHL: u8 = 10;
pub const SHR_S: u8 = 11;
pub const SHR_U: u8 = 12;
pub const ROTL: u8 = 13;
pub const ROTR: u8 = 14;
pub const DIV: u8 = 15;
pub const MIN: u8 = 16;
pub const MAX: u8 = 17;
pub const COPYSIGN: u8 = 18;

// Conditions.
pub const EQ: u8 = 0;
pub const NE: u8 = 1;
pub const LT_S: u8 = 2;
pub const LT_U: u8 = 3;
pub const GT_S: u8 = 4;
pub const GT_U: u8 = 5;
pub const LE_S: u8 = 6;
pub const LE_U: u8 = 7;
pub const GE_S: u8 = 8;
pub const GE_U: u8 = 9;
pub const FEQ: u8 = 10;
pub const FNE: u8 = 11;
pub const FLT: u8 = 12;
pub const FGT: u8 = 13;
pub const FLE: u8 = 14;
pub const FGE: u8 = 15;

// Conversions.
pub const WRAP: u8 = 0;
pub const EXTEND_S: u8 = 1;
pub const EXTEND_U: u8 = 2;
pub const TRUNC_S: u8 = 3;
pub const TRUNC_U: u8 = 4;
pub const CONVERT_S: u8 = 5;
pub const CONVERT_U: u8 = 6;
pub const DEMOTE: u8 = 7;
pub const PROMOTE: u8 = 8;
pub const REINTERPRET: u8 = 9;

// Memory access variants.
pub const LOAD: u8 = 0;
pub const LOAD8_S: u8 = 1;
pub const LOAD8_U: u8 = 2;
pub const LOAD16_S: u8 = 3;
pub const LOAD16_U: u8 = 4;
pub const LOAD32_S: u8 = 5;
pub const LOAD32_U: u8 = 6;
pub const STORE: u8 = 7;
pub const STORE8: u8 = 8;
pub const STORE16: u8 = 9;
pub const STORE32: u8 = 10;
