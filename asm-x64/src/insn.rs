//! Instruction tables: constants of the pattern types in [`crate::encode`].

use crate::encode::{
    Db, Dd, Ipush, Mex2, Pblendi, Pminmax, Pshufi, Rm, Rm2, RmData8, RmData16, RmPacked,
    RmPackedSz, RmPrefix, RmPrefixNt, RmScalar, Rmi, RmiPackedSz, RmiScalar, D12, D2d, M, MI,
    MI16, MI32, MI8, NP, O, OI, OPCODE_BASE,
};

// GP opcodes

pub const ADD: Rm = Rm(0x03);
pub const OR: Rm = Rm(0x0b);
pub const AND: Rm = Rm(0x23);
pub const SUB: Rm = Rm(0x2b);
pub const XOR: Rm = Rm(0x33);
pub const CMP: Rm = Rm(0x3b);
pub const CMOVB: Rm2 = Rm2(0x0f42);
pub const CMOVAE: Rm2 = Rm2(0x0f43);
pub const CMOVE: Rm2 = Rm2(0x0f44);
pub const CMOVNE: Rm2 = Rm2(0x0f45);
pub const CMOVBE: Rm2 = Rm2(0x0f46);
pub const CMOVA: Rm2 = Rm2(0x0f47);
pub const CMOVS: Rm2 = Rm2(0x0f48);
pub const CMOVP: Rm2 = Rm2(0x0f4a);
pub const CMOVL: Rm2 = Rm2(0x0f4c);
pub const CMOVGE: Rm2 = Rm2(0x0f4d);
pub const CMOVLE: Rm2 = Rm2(0x0f4e);
pub const CMOVG: Rm2 = Rm2(0x0f4f);
pub const PUSHO: O = O(0x50);
pub const POPO: O = O(0x58);
/// I64 only.
pub const MOVSXD: Rm = Rm(0x63);
pub const PUSHI: Ipush = Ipush(0x6a);
pub const IMULI: Rmi = Rmi(0x6b);
pub const JB_CB: Db = Db(0x72);
pub const JAE_CB: Db = Db(0x73);
pub const JE_CB: Db = Db(0x74);
pub const JNE_CB: Db = Db(0x75);
pub const JBE_CB: Db = Db(0x76);
pub const JA_CB: Db = Db(0x77);
pub const JS_CB: Db = Db(0x78);
pub const JNS_CB: Db = Db(0x79);
pub const JP_CB: Db = Db(0x7a);
pub const JNP_CB: Db = Db(0x7b);
pub const JL_CB: Db = Db(0x7c);
pub const JGE_CB: Db = Db(0x7d);
pub const JLE_CB: Db = Db(0x7e);
pub const JG_CB: Db = Db(0x7f);
pub const ADDI: MI = MI(0x81 << 16 | 0x83 << 8 | 0 << OPCODE_BASE);
pub const ORI: MI = MI(0x81 << 16 | 0x83 << 8 | 1 << OPCODE_BASE);
pub const ANDI: MI = MI(0x81 << 16 | 0x83 << 8 | 4 << OPCODE_BASE);
pub const SUBI: MI = MI(0x81 << 16 | 0x83 << 8 | 5 << OPCODE_BASE);
pub const XORI: MI = MI(0x81 << 16 | 0x83 << 8 | 6 << OPCODE_BASE);
pub const CMPI: MI = MI(0x81 << 16 | 0x83 << 8 | 7 << OPCODE_BASE);
/// MR opcode.
pub const TEST: Rm = Rm(0x85);
pub const XCHG: Rm = Rm(0x87);
pub const MOV8MR: RmData8 = RmData8(0x88);
pub const MOV16MR: RmData16 = RmData16(0x89);
/// RegReg form intentionally unsupported; write-only memory form.
pub const MOVMR: Rm = Rm(0x89);
pub const MOV: Rm = Rm(0x8b);
pub const LEA: Rm = Rm(0x8d);
pub const POP: M = M(0x8f << 8 | 0 << OPCODE_BASE);
pub const JB_CD: D2d = D2d(0x0f82);
pub const JAE_CD: D2d = D2d(0x0f83);
pub const JE_CD: D2d = D2d(0x0f84);
pub const JNE_CD: D2d = D2d(0x0f85);
pub const JBE_CD: D2d = D2d(0x0f86);
pub const JA_CD: D2d = D2d(0x0f87);
pub const JS_CD: D2d = D2d(0x0f88);
pub const JP_CD: D2d = D2d(0x0f8a);
pub const JL_CD: D2d = D2d(0x0f8c);
pub const JGE_CD: D2d = D2d(0x0f8d);
pub const JLE_CD: D2d = D2d(0x0f8e);
pub const JG_CD: D2d = D2d(0x0f8f);
pub const SETB: Mex2 = Mex2(0x0f92);
pub const SETAE: Mex2 = Mex2(0x0f93);
pub const SETE: Mex2 = Mex2(0x0f94);
pub const SETNE: Mex2 = Mex2(0x0f95);
pub const SETBE: Mex2 = Mex2(0x0f96);
pub const SETA: Mex2 = Mex2(0x0f97);
pub const SETS: Mex2 = Mex2(0x0f98);
pub const SETP: Mex2 = Mex2(0x0f9a);
pub const SETNP: Mex2 = Mex2(0x0f9b);
pub const SETL: Mex2 = Mex2(0x0f9c);
pub const SETGE: Mex2 = Mex2(0x0f9d);
pub const SETLE: Mex2 = Mex2(0x0f9e);
pub const SETG: Mex2 = Mex2(0x0f9f);
pub const NOP: NP = NP(0x90);
pub const CDQ: NP = NP(0x99);
pub const IMUL: Rm2 = Rm2(0x0faf);
pub const MOVZX8: Rm2 = Rm2(0x0fb6);
pub const MOVZX16: Rm2 = Rm2(0x0fb7);
pub const MOV64I: OI = OI(0xb8);
pub const POPCNT: RmPrefix = RmPrefix(0xf3 << 8 | 0xb8);
pub const TZCNT: RmPrefix = RmPrefix(0xf3 << 8 | 0xbc);
pub const LZCNT: RmPrefix = RmPrefix(0xf3 << 8 | 0xbd);
pub const BSF: Rm2 = Rm2(0x0fbc);
pub const BSR: Rm2 = Rm2(0x0fbd);
pub const MOVSX8: Rm2 = Rm2(0x0fbe);
pub const MOVSX16: Rm2 = Rm2(0x0fbf);
pub const ROLI: MI = MI(0xc1 << 8 | 0 << OPCODE_BASE);
pub const RORI: MI = MI(0xc1 << 8 | 1 << OPCODE_BASE);
pub const SHLI: MI = MI(0xc1 << 8 | 4 << OPCODE_BASE);
pub const SHRI: MI = MI(0xc1 << 8 | 5 << OPCODE_BASE);
pub const SARI: MI = MI(0xc1 << 8 | 7 << OPCODE_BASE);
pub const RET: NP = NP(0xc3);
pub const MOV8I: MI8 = MI8(0xc6 << 8 | 0 << OPCODE_BASE);
pub const MOV16I: MI16 = MI16(0xc7 << 8 | 0 << OPCODE_BASE);
pub const MOV32I: MI32 = MI32(0xc7 << 8 | 0 << OPCODE_BASE);
pub const MOVI: MI = MI(0xc7 << 16 | 0 << OPCODE_BASE);
pub const ROL: M = M(0xd3 << 8 | 0 << OPCODE_BASE);
pub const ROR: M = M(0xd3 << 8 | 1 << OPCODE_BASE);
pub const SHL: M = M(0xd3 << 8 | 4 << OPCODE_BASE);
pub const SHR: M = M(0xd3 << 8 | 5 << OPCODE_BASE);
pub const SAR: M = M(0xd3 << 8 | 7 << OPCODE_BASE);
pub const LOOP_CB: Db = Db(0xe2);
pub const CALL_CD: Dd = Dd(0xe8);
pub const JMP_CD: Dd = Dd(0xe9);
pub const JMP_CB: Db = Db(0xeb);
pub const TEST8I: MI8 = MI8(0xf6 << 8 | 0 << OPCODE_BASE);
pub const NEG: M = M(0xf7 << 8 | 3 << OPCODE_BASE);
pub const DIV: M = M(0xf7 << 8 | 6 << OPCODE_BASE);
pub const IDIV: M = M(0xf7 << 8 | 7 << OPCODE_BASE);
pub const INC: M = M(0xff << 8 | 0 << OPCODE_BASE);
pub const DEC: M = M(0xff << 8 | 1 << OPCODE_BASE);
pub const CALLIND: M = M(0xff << 8 | 2 << OPCODE_BASE);
pub const JMPIND: M = M(0xff << 8 | 4 << OPCODE_BASE);
pub const PUSH: M = M(0xff << 8 | 6 << OPCODE_BASE);

// GP opcode pairs

pub const JP_C: D12 = D12::pair(JP_CD, JP_CB);
pub const JLE_C: D12 = D12::pair(JLE_CD, JLE_CB);

// GP/SSE opcodes

/// CVTSI2SS or CVTSI2SD.
pub const CVTSI2SSD: RmScalar = RmScalar(0x2a);
/// CVTTSS2SI or CVTTSD2SI.
pub const CVTTSSD2SI: RmScalar = RmScalar(0x2c);
/// MOVD or MOVQ (xmm <- r/m).
pub const MOVDQ: RmPrefix = RmPrefix(0x66 << 8 | 0x6e);
/// MOVD or MOVQ (r/m <- xmm); register parameters reversed.
pub const MOVDQMR: RmPrefix = RmPrefix(0x66 << 8 | 0x7e);
/// Aligned octet move.
pub const MOVOA: RmPrefixNt = RmPrefixNt(0x66 << 8 | 0x6f);
/// Unaligned octet move.
pub const MOVOU: RmPrefixNt = RmPrefixNt(0xf3 << 8 | 0x6f);
/// Aligned octet move to xmm2/m128.
pub const MOVOAMR: RmPrefixNt = RmPrefixNt(0x66 << 8 | 0x7f);
/// Unaligned octet move to xmm2/m128.
pub const MOVOUMR: RmPrefixNt = RmPrefixNt(0xf3 << 8 | 0x7f);

// SSE opcodes

/// MOVSS or MOVSD.
pub const MOVSSD: RmScalar = RmScalar(0x10);
/// MOVSS or MOVSD store form; RegReg is redundant.
pub const MOVSSDMR: RmScalar = RmScalar(0x11);
/// MOVUPS or MOVUPD.
pub const MOVUPSD: RmPacked = RmPacked(0x10);
/// MOVUPS or MOVUPD to xmm2/m128.
pub const MOVUPSDMR: RmPacked = RmPacked(0x11);
/// MOVAPS or MOVAPD.
pub const MOVAPSD: RmPacked = RmPacked(0x28);
/// MOVAPS or MOVAPD to xmm2/m128.
pub const MOVAPSDMR: RmPacked = RmPacked(0x29);
/// UCOMISS or UCOMISD.
pub const UCOMISSD: RmPacked = RmPacked(0x2e);
/// PMINS{B/W/L}.
pub const PMINS: Pminmax = Pminmax(b"\x38\x38\xea\x00\x38\x39\x00\x00");
/// PMAXS{B/W/L}.
pub const PMAXS: Pminmax = Pminmax(b"\x38\x3c\xee\x00\x38\x3d\x00\x00");
/// PMINU{B/W/L}.
pub const PMINU: Pminmax = Pminmax(b"\xda\x00\x38\x3a\x38\x3b\x00\x00");
/// PMAXU{B/W/L}.
pub const PMAXU: Pminmax = Pminmax(b"\xde\x00\x38\x3e\x38\x3f\x00\x00");
/// ROUNDSS or ROUNDSD.
pub const ROUNDSSD: RmiScalar = RmiScalar(0x3a);
/// SQRTSS or SQRTSD.
pub const SQRTSSD: RmScalar = RmScalar(0x51);
/// ANDPS or ANDPD.
pub const ANDPSD: RmPacked = RmPacked(0x54);
/// ANDNPS or ANDNPD.
pub const ANDNPSD: RmPacked = RmPacked(0x55);
/// ORPS or ORPD.
pub const ORPSD: RmPacked = RmPacked(0x56);
/// XORPS or XORPD.
pub const XORPSD: RmPacked = RmPacked(0x57);
/// ADDSS or ADDSD.
pub const ADDSSD: RmScalar = RmScalar(0x58);
/// MULSS or MULSD.
pub const MULSSD: RmScalar = RmScalar(0x59);
/// CVTSS2SD or CVTSD2SS.
pub const CVTS2SSD: RmScalar = RmScalar(0x5a);
/// SUBSS or SUBSD.
pub const SUBSSD: RmScalar = RmScalar(0x5c);
/// MINSS or MINSD.
pub const MINSSD: RmScalar = RmScalar(0x5d);
/// DIVSS or DIVSD.
pub const DIVSSD: RmScalar = RmScalar(0x5e);
/// MAXSS or MAXSD.
pub const MAXSSD: RmScalar = RmScalar(0x5f);
pub const PXOR: RmPrefix = RmPrefix(0x66 << 8 | 0xef);
/// W/L only.
pub const PSRAI: RmiPackedSz = RmiPackedSz(b"\x00\x71\x72\x00\x00\x00\x04\x04\x00\x00");
/// W/L/Q/O only.
pub const PSRLI: RmiPackedSz = RmiPackedSz(b"\x00\x71\x72\x73\x73\x00\x02\x02\x02\x03");
/// W/L/Q/O only.
pub const PSLLI: RmiPackedSz = RmiPackedSz(b"\x00\x71\x72\x73\x73\x00\x06\x06\x06\x07");
/// W/L/Q only.
pub const PSRL: RmPackedSz = RmPackedSz(0xd3 << 24 | 0xd2 << 16 | 0xd1 << 8);
/// W/L only.
pub const PSRA: RmPackedSz = RmPackedSz(0xe2 << 16 | 0xe1 << 8);
/// W/L/Q only.
pub const PSLL: RmPackedSz = RmPackedSz(0xf3 << 24 | 0xf2 << 16 | 0xf1 << 8);
pub const PSUB: RmPackedSz = RmPackedSz(0xfb << 24 | 0xfa << 16 | 0xf9 << 8 | 0xf8);
pub const PADD: RmPackedSz = RmPackedSz(0xd4 << 24 | 0xfe << 16 | 0xfd << 8 | 0xfc);

// Shuffle, insert, extract, blend

/// W/L/Q only.
pub const PBLENDI: Pblendi = Pblendi(0x0d << 24 | 0x0c << 16 | 0x0e << 8);
pub const PSHUFDI: Pshufi = Pshufi::new(&[0x66, 0x0f, 0x70]);
pub const PSHUFHWI: Pshufi = Pshufi::new(&[0xf3, 0x0f, 0x70]);
pub const PSHUFLWI: Pshufi = Pshufi::new(&[0xf2, 0x0f, 0x70]);
pub const SHUFPDI: Pshufi = Pshufi::new(&[0x66, 0x0f, 0xc6]);
pub const SHUFPSI: Pshufi = Pshufi::new(&[0x0f, 0xc6]);

// Arithmetic logic instructions, addressed by their /digit.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlInsn(u8);

impl AlInsn {
    pub const ADD: AlInsn = AlInsn(0 << OPCODE_BASE);
    pub const OR: AlInsn = AlInsn(1 << OPCODE_BASE);
    pub const AND: AlInsn = AlInsn(4 << OPCODE_BASE);
    pub const SUB: AlInsn = AlInsn(5 << OPCODE_BASE);
    pub const XOR: AlInsn = AlInsn(6 << OPCODE_BASE);

    pub fn opcode(self) -> Rm {
        Rm(self.0 | 0x3)
    }

    pub fn opcode_i(self) -> MI {
        MI(0x81 << 16 | 0x83 << 8 | u32::from(self.0))
    }
}

// Shift instructions, addressed by their /digit.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShiftInsn(u8);

impl ShiftInsn {
    pub const ROTL: ShiftInsn = ShiftInsn(0 << OPCODE_BASE);
    pub const ROTR: ShiftInsn = ShiftInsn(1 << OPCODE_BASE);
    pub const SHL: ShiftInsn = ShiftInsn(4 << OPCODE_BASE);
    pub const SHR_U: ShiftInsn = ShiftInsn(5 << OPCODE_BASE);
    pub const SHR_S: ShiftInsn = ShiftInsn(7 << OPCODE_BASE);

    pub fn opcode(self) -> M {
        M(0xd3 << 8 | u16::from(self.0))
    }

    pub fn opcode_i(self) -> MI {
        MI(0xc1 << 8 | u32::from(self.0))
    }
}

// Condition code instructions, addressed by the x86 condition nibble.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CcInsn(pub u8);

impl CcInsn {
    pub const LT_U: CcInsn = CcInsn(0x2);
    pub const GE_U: CcInsn = CcInsn(0x3);
    pub const EQ: CcInsn = CcInsn(0x4);
    pub const NE: CcInsn = CcInsn(0x5);
    pub const LE_U: CcInsn = CcInsn(0x6);
    pub const GT_U: CcInsn = CcInsn(0x7);
    pub const SIGN: CcInsn = CcInsn(0x8);
    pub const PARITY: CcInsn = CcInsn(0xa);
    pub const LT_S: CcInsn = CcInsn(0xc);
    pub const GE_S: CcInsn = CcInsn(0xd);
    pub const LE_S: CcInsn = CcInsn(0xe);
    pub const GT_S: CcInsn = CcInsn(0xf);

    /// The condition with its operands' roles exchanged (a < b becomes
    /// b > a).
    pub fn swapped(self) -> CcInsn {
        match self {
            CcInsn::LT_U => CcInsn::GT_U,
            CcInsn::GT_U => CcInsn::LT_U,
            CcInsn::LE_U => CcInsn::GE_U,
            CcInsn::GE_U => CcInsn::LE_U,
            CcInsn::LT_S => CcInsn::GT_S,
            CcInsn::GT_S => CcInsn::LT_S,
            CcInsn::LE_S => CcInsn::GE_S,
            CcInsn::GE_S => CcInsn::LE_S,
            other => other,
        }
    }

    /// The logically negated condition (the low nibble bit flip of Jcc).
    pub fn negated(self) -> CcInsn {
        CcInsn(self.0 ^ 1)
    }

    pub fn setcc_opcode(self) -> Mex2 {
        Mex2(0x0f << 8 | (0x90 | u16::from(self.0)))
    }

    pub fn cmovcc_opcode(self) -> Rm2 {
        Rm2(0x0f << 8 | (0x40 | u16::from(self.0)))
    }

    pub fn jcc_opcode_cd(self) -> D2d {
        D2d(0x0f << 8 | (0x80 | u16::from(self.0)))
    }

    pub fn jcc_opcode_cb(self) -> Db {
        Db(0x70 | self.0)
    }

    pub fn jcc_opcode_c(self) -> D12 {
        D12::pair(self.jcc_opcode_cd(), self.jcc_opcode_cb())
    }
}
