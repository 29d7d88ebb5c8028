//! Conversions between the value types.

use super::{opers, OpInfo};
use crate::error::CodegenError;
use crate::func::Func;
use crate::links::TrapId;
use crate::loader::Loader;
use crate::opcodes::Opcode;
use crate::operand::Operand;
use crate::types::{category, Type};
use sunbeam_asm_x64::{insn, Reg};

pub(super) fn gen_conversion(
    f: &mut Func<'_>,
    _load: &mut Loader<'_>,
    op: Opcode,
    info: OpInfo,
) -> Result<bool, CodegenError> {
    let result_ty = info.ty();
    let source_ty = info.ty2();

    let x = f.pop_operand(op)?;
    if x.ty() != source_ty {
        return Err(CodegenError::TypeMismatch { op, found: x.ty() });
    }

    match info.oper() {
        opers::WRAP => {
            if let Operand::Imm { val, .. } = x {
                f.push_operand(Operand::Imm {
                    ty: Type::I32,
                    val: val as i32 as i64,
                });
                return Ok(false);
            }
            if let Operand::Stack { .. } = x {
                // The slot's low 32 bits are the wrapped value.
                f.push_operand(Operand::Stack { ty: Type::I32 });
                return Ok(false);
            }
            let (reg, _) = f.op_owned_reg(op, x)?;
            f.push_operand(Operand::TempReg {
                ty: Type::I32,
                reg,
                zero_ext: false,
            });
        }

        opers::EXTEND_S => {
            if let Operand::Imm { val, .. } = x {
                f.push_operand(Operand::Imm {
                    ty: Type::I64,
                    val: val as i32 as i64,
                });
                return Ok(false);
            }
            let (reg, _) = f.op_owned_reg(op, x)?;
            insn::MOVSXD.reg_reg(&mut f.text, Type::I64, reg, reg);
            f.push_operand(Operand::TempReg {
                ty: Type::I64,
                reg,
                zero_ext: false,
            });
        }

        opers::EXTEND_U => {
            if let Operand::Imm { val, .. } = x {
                f.push_operand(Operand::Imm {
                    ty: Type::I64,
                    val: val as u32 as i64,
                });
                return Ok(false);
            }
            let (reg, zero_ext) = f.op_owned_reg(op, x)?;
            if !zero_ext {
                f.op_zero_extend(reg);
            }
            f.push_operand(Operand::TempReg {
                ty: Type::I64,
                reg,
                zero_ext: true,
            });
        }

        opers::TRUNC_S => {
            gen_trunc_signed(f, op, result_ty, source_ty, x)?;
        }

        opers::TRUNC_U => {
            gen_trunc_unsigned(f, op, result_ty, source_ty, x)?;
        }

        opers::CONVERT_S => {
            let x = f.op_materialize(op, x)?;
            let src = x.reg().unwrap();
            let dest = f.op_alloc_reg(op, result_ty)?;
            insn::CVTSI2SSD.type_reg_reg(&mut f.text, result_ty, source_ty, dest, src);
            free_source(f, x);
            f.push_operand(Operand::TempReg {
                ty: result_ty,
                reg: dest,
                zero_ext: false,
            });
        }

        opers::CONVERT_U => {
            gen_convert_unsigned(f, op, result_ty, source_ty, x)?;
        }

        opers::DEMOTE | opers::PROMOTE => {
            let (reg, _) = f.op_owned_reg(op, x)?;
            // The scalar prefix is chosen by the source type.
            insn::CVTS2SSD.reg_reg(&mut f.text, source_ty, reg, reg);
            f.push_operand(Operand::TempReg {
                ty: result_ty,
                reg,
                zero_ext: false,
            });
        }

        opers::REINTERPRET => {
            let x = f.op_materialize(op, x)?;
            let src = x.reg().unwrap();
            let dest = f.op_alloc_reg(op, result_ty)?;
            if result_ty.is_float() {
                let int_ty = source_ty;
                insn::MOVDQ.reg_reg(&mut f.text, int_ty, dest, src);
            } else {
                let int_ty = result_ty;
                insn::MOVDQMR.reg_reg(&mut f.text, int_ty, src, dest);
            }
            free_source(f, x);
            f.push_operand(Operand::TempReg {
                ty: result_ty,
                reg: dest,
                zero_ext: !result_ty.is_float() && !result_ty.is_64(),
            });
        }

        _ => unreachable!(),
    }
    Ok(false)
}

fn free_source(f: &mut Func<'_>, x: Operand) {
    if let Operand::TempReg { ty, reg, .. } = x {
        f.regs.free(category(ty), reg);
    }
}

/// Signed float-to-int truncation. CVTT returns the integer minimum on
/// overflow and NaN; distinguish the legitimate minimum by comparing the
/// source against its exact float representation.
fn gen_trunc_signed(
    f: &mut Func<'_>,
    op: Opcode,
    result_ty: Type,
    source_ty: Type,
    x: Operand,
) -> Result<(), CodegenError> {
    f.op_persist_flags(op)?;
    let x = f.op_materialize(op, x)?;
    let src = x.reg().unwrap();
    let dest = f.op_alloc_reg(op, result_ty)?;

    insn::CVTTSSD2SI.type_reg_reg(&mut f.text, source_ty, result_ty, dest, src);

    let (min_int, min_bits) = match (result_ty.is_64(), source_ty.is_64()) {
        (false, false) => (i32::MIN as i64, (i32::MIN as f32).to_bits() as i64),
        (false, true) => (i32::MIN as i64, (i32::MIN as f64).to_bits() as u64 as i64),
        (true, false) => (i64::MIN, (i64::MIN as f32).to_bits() as i64),
        (true, true) => (i64::MIN, (i64::MIN as f64).to_bits() as u64 as i64),
    };

    f.op_load_imm_scratch(result_ty, min_int);
    insn::CMP.reg_reg(&mut f.text, result_ty, dest, Reg::SCRATCH);
    insn::JNE_CB.rel8(&mut f.text, 0);
    let ok_site = f.text.addr();

    // The sentinel: either the exact minimum or an invalid input.
    let int_ty = if source_ty.is_64() { Type::I64 } else { Type::I32 };
    f.op_load_imm_scratch(int_ty, min_bits);
    insn::MOVDQ.reg_reg(&mut f.text, int_ty, Reg::SCRATCH, Reg::SCRATCH);
    insn::UCOMISSD.reg_reg(&mut f.text, source_ty, src, Reg::SCRATCH);
    insn::JNP_CB.rel8(&mut f.text, 5);
    f.op_trap_call(TrapId::InvalidConversionToInteger);
    insn::JE_CB.rel8(&mut f.text, 5);
    f.op_trap_call(TrapId::IntegerOverflow);

    let here = f.text.addr();
    f.text.update_branch_site8(ok_site, here);

    free_source(f, x);
    f.push_operand(Operand::TempReg {
        ty: result_ty,
        reg: dest,
        zero_ext: false,
    });
    Ok(())
}

/// Unsigned float-to-int truncation. The 32-bit case truncates through a
/// 64-bit register and checks the upper half; the 64-bit case splits at
/// 2^63 and compensates after a biased truncation.
fn gen_trunc_unsigned(
    f: &mut Func<'_>,
    op: Opcode,
    result_ty: Type,
    source_ty: Type,
    x: Operand,
) -> Result<(), CodegenError> {
    f.op_persist_flags(op)?;
    let x = f.op_materialize(op, x)?;
    let src = x.reg().unwrap();
    let dest = f.op_alloc_reg(op, result_ty)?;

    if !result_ty.is_64() {
        insn::CVTTSSD2SI.type_reg_reg(&mut f.text, source_ty, Type::I64, dest, src);
        // Any value outside [0, 2^32) (and the NaN sentinel) has bits in
        // the upper half.
        insn::MOV.reg_reg(&mut f.text, Type::I64, Reg::SCRATCH, dest);
        insn::SHRI.reg_imm8(&mut f.text, Type::I64, Reg::SCRATCH, 32);
        insn::JE_CB.rel8(&mut f.text, 5);
        f.op_trap_call(TrapId::InvalidConversionToInteger);

        free_source(f, x);
        f.push_operand(Operand::TempReg {
            ty: Type::I32,
            reg: dest,
            zero_ext: true,
        });
        return Ok(());
    }

    // 64-bit: values below 2^63 convert directly; larger ones are biased
    // down by 2^63 before conversion and the bit is restored afterward.
    // The source is copied so the bias does not clobber a live value.
    let tmp = f.op_alloc_reg(op, source_ty)?;
    let bound_bits = if source_ty.is_64() {
        (9_223_372_036_854_775_808.0f64).to_bits() as i64
    } else {
        (9_223_372_036_854_775_808.0f32).to_bits() as i64
    };
    let int_ty = if source_ty.is_64() { Type::I64 } else { Type::I32 };

    f.op_load_imm_scratch(int_ty, bound_bits);
    insn::MOVDQ.reg_reg(&mut f.text, int_ty, Reg::SCRATCH, Reg::SCRATCH);
    insn::UCOMISSD.reg_reg(&mut f.text, source_ty, src, Reg::SCRATCH);
    insn::JNP_CB.rel8(&mut f.text, 5);
    f.op_trap_call(TrapId::InvalidConversionToInteger);

    insn::JAE_CB.rel8(&mut f.text, 0);
    let big_site = f.text.addr();

    // Small path: a plain signed truncation, negative inputs trap.
    insn::CVTTSSD2SI.type_reg_reg(&mut f.text, source_ty, Type::I64, dest, src);
    insn::TEST.reg_reg(&mut f.text, Type::I64, dest, dest);
    insn::JNS_CB.rel8(&mut f.text, 5);
    f.op_trap_call(TrapId::IntegerOverflow);
    insn::JMP_CB.rel8(&mut f.text, 0);
    let done_site = f.text.addr();

    // Big path: subtract 2^63, truncate, restore the top bit.
    let here = f.text.addr();
    f.text.update_branch_site8(big_site, here);
    insn::MOVAPSD.reg_reg(&mut f.text, source_ty, tmp, src);
    insn::SUBSSD.reg_reg(&mut f.text, source_ty, tmp, Reg::SCRATCH);
    insn::CVTTSSD2SI.type_reg_reg(&mut f.text, source_ty, Type::I64, dest, tmp);
    insn::TEST.reg_reg(&mut f.text, Type::I64, dest, dest);
    insn::JNS_CB.rel8(&mut f.text, 5);
    f.op_trap_call(TrapId::IntegerOverflow);
    f.op_load_imm_scratch(Type::I64, i64::MIN);
    insn::ADD.reg_reg(&mut f.text, Type::I64, dest, Reg::SCRATCH);

    let here = f.text.addr();
    f.text.update_branch_site8(done_site, here);

    f.regs.free(category(source_ty), tmp);
    free_source(f, x);
    f.push_operand(Operand::TempReg {
        ty: Type::I64,
        reg: dest,
        zero_ext: false,
    });
    Ok(())
}

/// Unsigned int-to-float conversion. 32-bit sources zero-extend and use
/// the 64-bit signed form; 64-bit sources halve with a sticky bit when the
/// top bit is set, then double the result.
fn gen_convert_unsigned(
    f: &mut Func<'_>,
    op: Opcode,
    result_ty: Type,
    source_ty: Type,
    x: Operand,
) -> Result<(), CodegenError> {
    if !source_ty.is_64() {
        let (reg, zero_ext) = f.op_owned_reg(op, x)?;
        if !zero_ext {
            f.op_zero_extend(reg);
        }
        let dest = f.op_alloc_reg(op, result_ty)?;
        insn::CVTSI2SSD.type_reg_reg(&mut f.text, result_ty, Type::I64, dest, reg);
        f.regs.free(category(source_ty), reg);
        f.push_operand(Operand::TempReg {
            ty: result_ty,
            reg: dest,
            zero_ext: false,
        });
        return Ok(());
    }

    f.op_persist_flags(op)?;
    let (reg, _) = f.op_owned_reg(op, x)?;
    let dest = f.op_alloc_reg(op, result_ty)?;

    insn::TEST.reg_reg(&mut f.text, Type::I64, reg, reg);
    insn::JS_CB.rel8(&mut f.text, 0);
    let big_site = f.text.addr();

    insn::CVTSI2SSD.type_reg_reg(&mut f.text, result_ty, Type::I64, dest, reg);
    insn::JMP_CB.rel8(&mut f.text, 0);
    let done_site = f.text.addr();

    // Halve with a sticky low bit, convert, double.
    let here = f.text.addr();
    f.text.update_branch_site8(big_site, here);
    insn::MOV.reg_reg(&mut f.text, Type::I64, Reg::SCRATCH, reg);
    insn::SHRI.reg_imm8(&mut f.text, Type::I64, Reg::SCRATCH, 1);
    insn::ANDI.reg_imm(&mut f.text, Type::I64, reg, 1);
    insn::OR.reg_reg(&mut f.text, Type::I64, Reg::SCRATCH, reg);
    insn::CVTSI2SSD.type_reg_reg(&mut f.text, result_ty, Type::I64, dest, Reg::SCRATCH);
    insn::ADDSSD.reg_reg(&mut f.text, result_ty, dest, dest);

    let here = f.text.addr();
    f.text.update_branch_site8(done_site, here);

    f.regs.free(category(source_ty), reg);
    f.push_operand(Operand::TempReg {
        ty: result_ty,
        reg: dest,
        zero_ext: false,
    });
    Ok(())
}
