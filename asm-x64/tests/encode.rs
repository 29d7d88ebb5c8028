//! Byte-exact encoding properties: immediate folding, displacement sizing,
//! branch form selection, and stub placeholders.

use sunbeam_asm_x64::{insn, Reg, TextBuffer, Type};

fn encode(f: impl FnOnce(&mut TextBuffer)) -> Vec<u8> {
    let mut text = TextBuffer::with_limit(64);
    f(&mut text);
    assert!(text.errors().is_empty(), "{:?}", text.errors());
    text.bytes().to_vec()
}

#[test]
fn arithmetic_immediate_folding() {
    // Shortest encoding that represents the value exactly.
    assert_eq!(
        encode(|t| insn::ADDI.reg_imm(t, Type::I32, Reg(0), 1)),
        [0x83, 0xc0, 0x01],
    );
    assert_eq!(
        encode(|t| insn::ADDI.reg_imm(t, Type::I32, Reg(0), 127)),
        [0x83, 0xc0, 0x7f],
    );
    assert_eq!(
        encode(|t| insn::ADDI.reg_imm(t, Type::I32, Reg(0), 128)),
        [0x81, 0xc0, 0x80, 0x00, 0x00, 0x00],
    );
    assert_eq!(
        encode(|t| insn::ADDI.reg_imm(t, Type::I32, Reg(0), -128)),
        [0x83, 0xc0, 0x80],
    );
    assert_eq!(
        encode(|t| insn::SUBI.reg_imm(t, Type::I64, Reg(4), 8)),
        [0x48, 0x83, 0xec, 0x08],
    );
}

#[test]
fn push_immediate_folding() {
    assert_eq!(encode(|t| insn::PUSHI.imm(t, 5)), [0x6a, 0x05]);
    assert_eq!(
        encode(|t| insn::PUSHI.imm(t, 0x1000)),
        [0x68, 0x00, 0x10, 0x00, 0x00],
    );
}

#[test]
fn mov_imm64_oi_form() {
    assert_eq!(
        encode(|t| insn::MOV64I.reg_imm64(t, Reg(0), 0x0123_4567_89ab_cdef)),
        [0x48, 0xb8, 0xef, 0xcd, 0xab, 0x89, 0x67, 0x45, 0x23, 0x01],
    );
    assert_eq!(
        encode(|t| insn::MOV64I.reg_imm64(t, Reg(8), -1)),
        [0x49, 0xb8, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff],
    );
}

#[test]
fn displacement_mod_selection() {
    // mod=00 when no displacement is needed.
    assert_eq!(
        encode(|t| insn::MOV.reg_mem_disp(t, Type::I32, Reg(0), Reg(3), 0)),
        [0x8b, 0x03],
    );
    // mod=01 with a sign-extended byte.
    assert_eq!(
        encode(|t| insn::MOV.reg_mem_disp(t, Type::I32, Reg(0), Reg(3), 127)),
        [0x8b, 0x43, 0x7f],
    );
    assert_eq!(
        encode(|t| insn::MOV.reg_mem_disp(t, Type::I32, Reg(0), Reg(3), -8)),
        [0x8b, 0x43, 0xf8],
    );
    // mod=10 with four bytes otherwise.
    assert_eq!(
        encode(|t| insn::MOV.reg_mem_disp(t, Type::I32, Reg(0), Reg(3), 128)),
        [0x8b, 0x83, 0x80, 0x00, 0x00, 0x00],
    );
}

#[test]
fn sib_escape_bases() {
    // rsp and r12 bases force a SIB byte with the no-index marker.
    assert_eq!(
        encode(|t| insn::MOV.reg_mem_disp(t, Type::I64, Reg(0), Reg::RSP, 0)),
        [0x48, 0x8b, 0x04, 0x24],
    );
    assert_eq!(
        encode(|t| insn::MOV.reg_mem_disp(t, Type::I64, Reg(0), Reg::R12, 0)),
        [0x49, 0x8b, 0x04, 0x24],
    );
    assert_eq!(
        encode(|t| insn::MOV.reg_mem_disp(t, Type::I64, Reg(0), Reg::RSP, 16)),
        [0x48, 0x8b, 0x44, 0x24, 0x10],
    );
    // rbp and r13 bases have no disp-free form.
    assert_eq!(
        encode(|t| insn::MOV.reg_mem_disp(t, Type::I64, Reg(0), Reg::RBP, 0)),
        [0x48, 0x8b, 0x45, 0x00],
    );
    assert_eq!(
        encode(|t| insn::MOV.reg_mem_disp(t, Type::I64, Reg(0), Reg::R13, 0)),
        [0x49, 0x8b, 0x45, 0x00],
    );
}

#[test]
fn branch_form_selection() {
    // Forward target within signed-8 of the short form's end: short.
    let mut text = TextBuffer::with_limit(256);
    insn::JLE_C.addr(&mut text, 100);
    assert_eq!(text.bytes(), [0x7e, 0x62]);

    // Backward target out of signed-8 range: near.
    let mut text = TextBuffer::with_limit(256);
    text.extend(200);
    insn::JLE_C.addr(&mut text, 0);
    let disp = (-206i32).to_le_bytes();
    assert_eq!(
        &text.bytes()[200..],
        &[0x0f, 0x8e, disp[0], disp[1], disp[2], disp[3]],
    );

    // Backward target just in range: short.
    let mut text = TextBuffer::with_limit(256);
    text.extend(100);
    insn::JLE_C.addr(&mut text, 0);
    assert_eq!(&text.bytes()[100..], &[0x7e, 0x9a]); // -102
}

#[test]
fn stubs_are_self_loops() {
    assert_eq!(
        encode(|t| insn::CALL_CD.stub32(t)),
        [0xe8, 0xfb, 0xff, 0xff, 0xff],
    );
    assert_eq!(
        encode(|t| insn::JMP_CD.stub32(t)),
        [0xe9, 0xfa, 0xff, 0xff, 0xff],
    );
    assert_eq!(
        encode(|t| insn::JE_CD.stub32(t)),
        [0x0f, 0x84, 0xfa, 0xff, 0xff, 0xff],
    );
    assert_eq!(encode(|t| insn::JE_CB.stub8(t)), [0x74, 0xfe]);
    assert_eq!(
        encode(|t| insn::JLE_C.addr_stub(t)),
        [0x0f, 0x8e, 0xfa, 0xff, 0xff, 0xff],
    );
}

#[test]
fn missing_function_call_targets_address_zero() {
    // Without alignment: a call whose displacement is the negated site
    // address, i.e. it lands on absolute zero.
    let mut text = TextBuffer::with_limit(64);
    text.extend(3);
    insn::CALL_CD.missing_function(&mut text, false);
    let disp = (-8i32).to_le_bytes();
    assert_eq!(&text.bytes()[3..], &[0xe8, disp[0], disp[1], disp[2], disp[3]]);

    // With alignment: NOP padding places the 4-byte displacement on a
    // 4-byte boundary.
    let mut text = TextBuffer::with_limit(64);
    insn::CALL_CD.missing_function(&mut text, true);
    assert_eq!(
        text.bytes(),
        [0x0f, 0x1f, 0x00, 0xe8, 0xf8, 0xff, 0xff, 0xff],
    );
    assert_eq!((text.bytes().len() - 4) % 4, 0);
}

#[test]
fn setcc_forces_rex() {
    // sil/dil are only addressable with a REX prefix present.
    assert_eq!(encode(|t| insn::SETE.one_size_reg(t, Reg(6))), [0x40, 0x0f, 0x94, 0xc6]);
    assert_eq!(encode(|t| insn::SETB.one_size_reg(t, Reg(9))), [0x41, 0x0f, 0x92, 0xc1]);
}

#[test]
fn operand_size_selection() {
    assert_eq!(encode(|t| insn::CDQ.typed(t, Type::I32)), [0x99]);
    assert_eq!(encode(|t| insn::CDQ.typed(t, Type::I64)), [0x48, 0x99]);
    assert_eq!(
        encode(|t| insn::ADD.reg_reg(t, Type::I32, Reg(3), Reg(3))),
        [0x03, 0xdb],
    );
    assert_eq!(
        encode(|t| insn::ADD.reg_reg(t, Type::I64, Reg(3), Reg(8))),
        [0x49, 0x03, 0xd8],
    );
    // 16-bit stores use the 0x66 prefix and no REX.W; 8-bit stores force
    // REX.
    assert_eq!(
        encode(|t| insn::MOV16MR.reg_mem_disp(t, Type::I32, Reg(0), Reg(3), 0)),
        [0x66, 0x89, 0x03],
    );
    assert_eq!(
        encode(|t| insn::MOV8MR.reg_mem_disp(t, Type::I32, Reg(0), Reg(3), 0)),
        [0x40, 0x88, 0x03],
    );
}

#[test]
fn scalar_prefix_from_type() {
    assert_eq!(
        encode(|t| insn::ADDSSD.reg_reg(t, Type::F32, Reg(2), Reg(3))),
        [0xf3, 0x0f, 0x58, 0xd3],
    );
    assert_eq!(
        encode(|t| insn::ADDSSD.reg_reg(t, Type::F64, Reg(2), Reg(3))),
        [0xf2, 0x0f, 0x58, 0xd3],
    );
}
