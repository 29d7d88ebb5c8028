//! Round-trip validation of the packed-SSE tables: every emitted byte
//! sequence must decode, under an independent disassembler, to exactly the
//! mnemonic and operand list the encoder intended.

use iced_x86::{Decoder, DecoderOptions, Instruction, Mnemonic, OpKind, Register};
use sunbeam_asm_x64::{insn, Reg, Size, TextBuffer, Type};

const XMM: [Register; 16] = [
    Register::XMM0,
    Register::XMM1,
    Register::XMM2,
    Register::XMM3,
    Register::XMM4,
    Register::XMM5,
    Register::XMM6,
    Register::XMM7,
    Register::XMM8,
    Register::XMM9,
    Register::XMM10,
    Register::XMM11,
    Register::XMM12,
    Register::XMM13,
    Register::XMM14,
    Register::XMM15,
];

fn encode(f: impl FnOnce(&mut TextBuffer)) -> Vec<u8> {
    let mut text = TextBuffer::with_limit(32);
    f(&mut text);
    assert!(text.errors().is_empty(), "{:?}", text.errors());
    text.bytes().to_vec()
}

fn decode(bytes: &[u8]) -> Instruction {
    let mut decoder = Decoder::with_ip(64, bytes, 0, DecoderOptions::NONE);
    let instr = decoder.decode();
    assert!(!instr.is_invalid(), "invalid encoding: {bytes:02x?}");
    assert_eq!(
        instr.len(),
        bytes.len(),
        "trailing bytes after decode: {bytes:02x?}",
    );
    instr
}

fn check_rr(f: impl FnOnce(&mut TextBuffer), mnemonic: Mnemonic, dst: u8, src: u8) {
    let bytes = encode(f);
    let instr = decode(&bytes);
    assert_eq!(instr.mnemonic(), mnemonic, "{bytes:02x?}");
    assert_eq!(instr.op0_register(), XMM[dst as usize], "{bytes:02x?}");
    assert_eq!(instr.op1_register(), XMM[src as usize], "{bytes:02x?}");
}

fn check_ri(f: impl FnOnce(&mut TextBuffer), mnemonic: Mnemonic, dst: u8, imm: u8) {
    let bytes = encode(f);
    let instr = decode(&bytes);
    assert_eq!(instr.mnemonic(), mnemonic, "{bytes:02x?}");
    assert_eq!(instr.op0_register(), XMM[dst as usize], "{bytes:02x?}");
    assert_eq!(instr.op_kind(1), OpKind::Immediate8, "{bytes:02x?}");
    assert_eq!(instr.immediate8(), imm, "{bytes:02x?}");
}

fn check_rri(f: impl FnOnce(&mut TextBuffer), mnemonic: Mnemonic, dst: u8, src: u8, imm: u8) {
    let bytes = encode(f);
    let instr = decode(&bytes);
    assert_eq!(instr.mnemonic(), mnemonic, "{bytes:02x?}");
    assert_eq!(instr.op0_register(), XMM[dst as usize], "{bytes:02x?}");
    assert_eq!(instr.op1_register(), XMM[src as usize], "{bytes:02x?}");
    assert_eq!(instr.op_kind(2), OpKind::Immediate8, "{bytes:02x?}");
    assert_eq!(instr.immediate8(), imm, "{bytes:02x?}");
}

#[test]
fn octet_moves() {
    for i in 0..=15u8 {
        for j in 0..=15u8 {
            let (ri, rj) = (Reg(i), Reg(j));
            check_rr(|t| insn::MOVOA.reg_reg(t, ri, rj), Mnemonic::Movdqa, i, j);
            check_rr(|t| insn::MOVOU.reg_reg(t, ri, rj), Mnemonic::Movdqu, i, j);
            check_rr(|t| insn::MOVOAMR.reg_reg(t, ri, rj), Mnemonic::Movdqa, j, i);
            check_rr(|t| insn::MOVOUMR.reg_reg(t, ri, rj), Mnemonic::Movdqu, j, i);
        }
    }
}

#[test]
fn packed_shifts_with_imm8() {
    use Size::{Long, Octet, Quad, Word};
    for i in 0..=15u8 {
        let r = Reg(i);
        check_ri(|t| insn::PSRLI.reg_imm8(t, Word, r, 0x4), Mnemonic::Psrlw, i, 4);
        check_ri(|t| insn::PSRLI.reg_imm8(t, Long, r, 0x4), Mnemonic::Psrld, i, 4);
        check_ri(|t| insn::PSRLI.reg_imm8(t, Quad, r, 0x4), Mnemonic::Psrlq, i, 4);
        check_ri(|t| insn::PSRLI.reg_imm8(t, Octet, r, 0x4), Mnemonic::Psrldq, i, 4);
        check_ri(|t| insn::PSLLI.reg_imm8(t, Word, r, 0x4), Mnemonic::Psllw, i, 4);
        check_ri(|t| insn::PSLLI.reg_imm8(t, Long, r, 0x4), Mnemonic::Pslld, i, 4);
        check_ri(|t| insn::PSLLI.reg_imm8(t, Quad, r, 0x4), Mnemonic::Psllq, i, 4);
        check_ri(|t| insn::PSLLI.reg_imm8(t, Octet, r, 0x4), Mnemonic::Pslldq, i, 4);
        check_ri(|t| insn::PSRAI.reg_imm8(t, Word, r, 0x4), Mnemonic::Psraw, i, 4);
        check_ri(|t| insn::PSRAI.reg_imm8(t, Long, r, 0x4), Mnemonic::Psrad, i, 4);
    }
}

#[test]
fn packed_shifts() {
    use Size::{Long, Quad, Word};
    for i in 0..=15u8 {
        for j in 0..=15u8 {
            let (ri, rj) = (Reg(i), Reg(j));
            check_rr(|t| insn::PSRL.reg_reg(t, Word, ri, rj), Mnemonic::Psrlw, i, j);
            check_rr(|t| insn::PSRL.reg_reg(t, Long, ri, rj), Mnemonic::Psrld, i, j);
            check_rr(|t| insn::PSRL.reg_reg(t, Quad, ri, rj), Mnemonic::Psrlq, i, j);
            check_rr(|t| insn::PSLL.reg_reg(t, Word, ri, rj), Mnemonic::Psllw, i, j);
            check_rr(|t| insn::PSLL.reg_reg(t, Long, ri, rj), Mnemonic::Pslld, i, j);
            check_rr(|t| insn::PSLL.reg_reg(t, Quad, ri, rj), Mnemonic::Psllq, i, j);
            check_rr(|t| insn::PSRA.reg_reg(t, Word, ri, rj), Mnemonic::Psraw, i, j);
            check_rr(|t| insn::PSRA.reg_reg(t, Long, ri, rj), Mnemonic::Psrad, i, j);
        }
    }
}

#[test]
fn packed_add_subtract_andnot() {
    use Size::{Byte, Long, Quad, Word};
    for i in 0..=15u8 {
        for j in 0..=15u8 {
            let (ri, rj) = (Reg(i), Reg(j));
            check_rr(|t| insn::PADD.reg_reg(t, Byte, ri, rj), Mnemonic::Paddb, i, j);
            check_rr(|t| insn::PADD.reg_reg(t, Word, ri, rj), Mnemonic::Paddw, i, j);
            check_rr(|t| insn::PADD.reg_reg(t, Long, ri, rj), Mnemonic::Paddd, i, j);
            check_rr(|t| insn::PADD.reg_reg(t, Quad, ri, rj), Mnemonic::Paddq, i, j);
            check_rr(|t| insn::PSUB.reg_reg(t, Byte, ri, rj), Mnemonic::Psubb, i, j);
            check_rr(|t| insn::PSUB.reg_reg(t, Word, ri, rj), Mnemonic::Psubw, i, j);
            check_rr(|t| insn::PSUB.reg_reg(t, Long, ri, rj), Mnemonic::Psubd, i, j);
            check_rr(|t| insn::PSUB.reg_reg(t, Quad, ri, rj), Mnemonic::Psubq, i, j);
            check_rr(
                |t| insn::ANDNPSD.reg_reg(t, Type::F32, ri, rj),
                Mnemonic::Andnps,
                i,
                j,
            );
            check_rr(
                |t| insn::ANDNPSD.reg_reg(t, Type::F64, ri, rj),
                Mnemonic::Andnpd,
                i,
                j,
            );
        }
    }
}

#[test]
fn aligned_and_unaligned_moves() {
    for i in 0..=15u8 {
        for j in 0..=15u8 {
            let (ri, rj) = (Reg(i), Reg(j));
            check_rr(|t| insn::MOVAPSD.reg_reg(t, Type::F32, ri, rj), Mnemonic::Movaps, i, j);
            check_rr(|t| insn::MOVAPSD.reg_reg(t, Type::F64, ri, rj), Mnemonic::Movapd, i, j);
            check_rr(|t| insn::MOVUPSD.reg_reg(t, Type::F32, ri, rj), Mnemonic::Movups, i, j);
            check_rr(|t| insn::MOVUPSD.reg_reg(t, Type::F64, ri, rj), Mnemonic::Movupd, i, j);
            check_rr(|t| insn::MOVAPSDMR.reg_reg(t, Type::F32, ri, rj), Mnemonic::Movaps, j, i);
            check_rr(|t| insn::MOVAPSDMR.reg_reg(t, Type::F64, ri, rj), Mnemonic::Movapd, j, i);
            check_rr(|t| insn::MOVUPSDMR.reg_reg(t, Type::F32, ri, rj), Mnemonic::Movups, j, i);
            check_rr(|t| insn::MOVUPSDMR.reg_reg(t, Type::F64, ri, rj), Mnemonic::Movupd, j, i);
        }
    }
}

#[test]
fn packed_min_max() {
    use Size::{Byte, Long, Word};
    for i in 0..=15u8 {
        for j in 0..=15u8 {
            let (ri, rj) = (Reg(i), Reg(j));
            check_rr(|t| insn::PMINS.reg_reg(t, Byte, ri, rj), Mnemonic::Pminsb, i, j);
            check_rr(|t| insn::PMINS.reg_reg(t, Word, ri, rj), Mnemonic::Pminsw, i, j);
            check_rr(|t| insn::PMINS.reg_reg(t, Long, ri, rj), Mnemonic::Pminsd, i, j);
            check_rr(|t| insn::PMINU.reg_reg(t, Byte, ri, rj), Mnemonic::Pminub, i, j);
            check_rr(|t| insn::PMINU.reg_reg(t, Word, ri, rj), Mnemonic::Pminuw, i, j);
            check_rr(|t| insn::PMINU.reg_reg(t, Long, ri, rj), Mnemonic::Pminud, i, j);
            check_rr(|t| insn::PMAXS.reg_reg(t, Byte, ri, rj), Mnemonic::Pmaxsb, i, j);
            check_rr(|t| insn::PMAXS.reg_reg(t, Word, ri, rj), Mnemonic::Pmaxsw, i, j);
            check_rr(|t| insn::PMAXS.reg_reg(t, Long, ri, rj), Mnemonic::Pmaxsd, i, j);
            check_rr(|t| insn::PMAXU.reg_reg(t, Byte, ri, rj), Mnemonic::Pmaxub, i, j);
            check_rr(|t| insn::PMAXU.reg_reg(t, Word, ri, rj), Mnemonic::Pmaxuw, i, j);
            check_rr(|t| insn::PMAXU.reg_reg(t, Long, ri, rj), Mnemonic::Pmaxud, i, j);
        }
    }
}

#[test]
fn packed_blend() {
    use Size::{Long, Quad, Word};
    for i in 0..=15u8 {
        for j in 0..=15u8 {
            let (ri, rj) = (Reg(i), Reg(j));
            check_rri(
                |t| insn::PBLENDI.reg_reg_imm8(t, Word, ri, rj, 0x04),
                Mnemonic::Pblendw,
                i,
                j,
                4,
            );
            check_rri(
                |t| insn::PBLENDI.reg_reg_imm8(t, Long, ri, rj, 0x04),
                Mnemonic::Blendps,
                i,
                j,
                4,
            );
            check_rri(
                |t| insn::PBLENDI.reg_reg_imm8(t, Quad, ri, rj, 0x04),
                Mnemonic::Blendpd,
                i,
                j,
                4,
            );
        }
    }
}

#[test]
fn packed_shuffle() {
    for i in 0..=15u8 {
        for j in 0..=15u8 {
            let (ri, rj) = (Reg(i), Reg(j));
            check_rri(
                |t| insn::PSHUFDI.reg_reg_imm8(t, ri, rj, 0x04),
                Mnemonic::Pshufd,
                i,
                j,
                4,
            );
            check_rri(
                |t| insn::PSHUFHWI.reg_reg_imm8(t, ri, rj, 0x04),
                Mnemonic::Pshufhw,
                i,
                j,
                4,
            );
            check_rri(
                |t| insn::PSHUFLWI.reg_reg_imm8(t, ri, rj, 0x04),
                Mnemonic::Pshuflw,
                i,
                j,
                4,
            );
            check_rri(
                |t| insn::SHUFPDI.reg_reg_imm8(t, ri, rj, 0x04),
                Mnemonic::Shufpd,
                i,
                j,
                4,
            );
            check_rri(
                |t| insn::SHUFPSI.reg_reg_imm8(t, ri, rj, 0x04),
                Mnemonic::Shufps,
                i,
                j,
                4,
            );
        }
    }
}

#[test]
fn psrl_word_exact_bytes() {
    // The canonical example: prefix, escape, opcode, ModR/M with /2, imm8.
    assert_eq!(
        encode(|t| insn::PSRLI.reg_imm8(t, Size::Word, Reg(4), 0x4)),
        [0x66, 0x0f, 0x71, 0xd4, 0x04],
    );
}

#[test]
fn missing_packed_encodings_are_reported() {
    let mut text = TextBuffer::with_limit(32);
    insn::PSRA.reg_reg(&mut text, Size::Quad, Reg(0), Reg(1));
    assert_eq!(text.errors().len(), 1);
    assert!(text.bytes().is_empty());
}
