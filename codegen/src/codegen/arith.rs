//! Constants, unary and binary operators, comparisons.
//!
//! Machine-stack discipline: spilled operands live in LIFO order, so the
//! upper (right) operand is always resolved before the lower one whenever
//! it is stack-resident.

use super::{opers, OpInfo};
use crate::error::CodegenError;
use crate::func::Func;
use crate::loader::Loader;
use crate::opcodes::Opcode;
use crate::operand::{Cond, Operand};
use crate::types::{category, Type};
use sunbeam_asm_x64::{insn, insn::AlInsn, insn::ShiftInsn, Reg};

pub(super) fn gen_const(
    f: &mut Func<'_>,
    load: &mut Loader<'_>,
    _op: Opcode,
    info: OpInfo,
) -> Result<bool, CodegenError> {
    let ty = info.ty();
    let val = match ty {
        Type::I32 => load.varint32()? as i64,
        Type::I64 => load.varint64()?,
        Type::F32 => load.uint32()? as i64,
        Type::F64 => load.uint64()? as i64,
    };
    f.push_operand(Operand::Imm { ty, val });
    Ok(false)
}

fn free_if_temp(f: &mut Func<'_>, x: Operand) {
    if let Operand::TempReg { ty, reg, .. } = x {
        f.regs.free(category(ty), reg);
    }
}

/// Fold a small immediate out of an operand for the imm8/imm32 ALU forms.
fn foldable_imm(x: Operand) -> Option<i32> {
    if let Operand::Imm { val, .. } = x {
        if val == (val as i32) as i64 {
            return Some(val as i32);
        }
    }
    None
}

pub(super) fn gen_unary_condition(
    f: &mut Func<'_>,
    _load: &mut Loader<'_>,
    op: Opcode,
    info: OpInfo,
) -> Result<bool, CodegenError> {
    let ty = info.ty();
    let x = f.pop_operand(op)?;
    if x.ty() != ty {
        return Err(CodegenError::TypeMismatch { op, found: x.ty() });
    }

    // eqz of a condition is its negation; no code needed.
    if let Operand::Flags { cond } = x {
        f.push_operand(Operand::Flags {
            cond: cond.negated(),
        });
        return Ok(false);
    }

    f.op_persist_flags(op)?;
    let x = f.op_materialize(op, x)?;
    let reg = x.reg().unwrap();
    insn::TEST.reg_reg(&mut f.text, ty, reg, reg);
    free_if_temp(f, x);
    f.push_operand(Operand::Flags { cond: Cond::Eq });
    Ok(false)
}

fn condition(oper: u8) -> Cond {
    match oper {
        opers::EQ => Cond::Eq,
        opers::NE => Cond::Ne,
        opers::LT_S => Cond::LtS,
        opers::LT_U => Cond::LtU,
        opers::GT_S => Cond::GtS,
        opers::GT_U => Cond::GtU,
        opers::LE_S => Cond::LeS,
        opers::LE_U => Cond::LeU,
        opers::GE_S => Cond::GeS,
        opers::GE_U => Cond::GeU,
        opers::FEQ => Cond::OrderedAndEq,
        opers::FNE => Cond::UnorderedOrNe,
        opers::FGT => Cond::OrderedAndGt,
        opers::FGE => Cond::OrderedAndGe,
        _ => unreachable!(),
    }
}

pub(super) fn gen_binary_condition_commute(
    f: &mut Func<'_>,
    load: &mut Loader<'_>,
    op: Opcode,
    info: OpInfo,
) -> Result<bool, CodegenError> {
    gen_condition_common(f, load, op, info, true)
}

pub(super) fn gen_binary_condition(
    f: &mut Func<'_>,
    load: &mut Loader<'_>,
    op: Opcode,
    info: OpInfo,
) -> Result<bool, CodegenError> {
    gen_condition_common(f, load, op, info, false)
}

fn gen_condition_common(
    f: &mut Func<'_>,
    _load: &mut Loader<'_>,
    op: Opcode,
    info: OpInfo,
    commute: bool,
) -> Result<bool, CodegenError> {
    let ty = info.ty();
    let mut right = f.pop_operand(op)?;
    let mut left = f.pop_operand(op)?;
    if left.ty() != ty || right.ty() != ty {
        return Err(CodegenError::TypeMismatch { op, found: ty });
    }
    f.op_persist_flags(op)?;

    if ty.is_float() {
        // Less-than orderings compare with the operands exchanged so that
        // unordered inputs fall out as false on a single flag test.
        let cond = match info.oper() {
            opers::FLT => {
                std::mem::swap(&mut left, &mut right);
                Cond::OrderedAndGt
            }
            opers::FLE => {
                std::mem::swap(&mut left, &mut right);
                Cond::OrderedAndGe
            }
            other => condition(other),
        };

        // After a swap the physically upper operand may be `left`.
        if matches!(left, Operand::Stack { .. }) && !matches!(right, Operand::Stack { .. }) {
            left = f.op_materialize(op, left)?;
        }
        let right = if matches!(right, Operand::Stack { .. }) {
            f.op_materialize(op, right)?
        } else {
            right
        };
        let left = f.op_materialize(op, left)?;
        let lreg = left.reg().unwrap();

        match f.effective_operand(right) {
            Operand::VarRef { index, .. } => {
                let disp = f.var_mem_disp(index);
                insn::UCOMISSD.reg_mem_disp(&mut f.text, ty, lreg, Reg::RSP, disp);
            }
            x => {
                let x = f.op_materialize(op, x)?;
                insn::UCOMISSD.reg_reg(&mut f.text, ty, lreg, x.reg().unwrap());
                free_if_temp(f, x);
            }
        }
        free_if_temp(f, left);
        f.push_operand(Operand::Flags { cond });
        return Ok(false);
    }

    let mut cond = condition(info.oper());
    if foldable_imm(left).is_some() && foldable_imm(right).is_none() {
        std::mem::swap(&mut left, &mut right);
        if !commute {
            cond = cond.swapped();
        }
    }

    let right = if matches!(right, Operand::Stack { .. }) {
        f.op_materialize(op, right)?
    } else {
        right
    };
    let left = f.op_materialize(op, left)?;
    let lreg = left.reg().unwrap();

    match (foldable_imm(right), f.effective_operand(right)) {
        (Some(imm), _) => {
            insn::CMPI.reg_imm(&mut f.text, ty, lreg, imm);
        }
        (None, Operand::VarRef { index, .. }) => {
            let disp = f.var_mem_disp(index);
            insn::CMP.reg_mem_disp(&mut f.text, ty, lreg, Reg::RSP, disp);
        }
        (None, x) => {
            let x = f.op_materialize(op, x)?;
            insn::CMP.reg_reg(&mut f.text, ty, lreg, x.reg().unwrap());
            free_if_temp(f, x);
        }
    }

    free_if_temp(f, left);
    f.push_operand(Operand::Flags { cond });
    Ok(false)
}

pub(super) fn gen_unary(
    f: &mut Func<'_>,
    _load: &mut Loader<'_>,
    op: Opcode,
    info: OpInfo,
) -> Result<bool, CodegenError> {
    let ty = info.ty();
    let x = f.pop_operand(op)?;
    if x.ty() != ty {
        return Err(CodegenError::TypeMismatch { op, found: x.ty() });
    }

    match info.oper() {
        opers::CLZ | opers::CTZ | opers::POPCNT => {
            f.op_persist_flags(op)?;
            let (reg, _) = f.op_owned_reg(op, x)?;
            let count = match info.oper() {
                opers::CLZ => insn::LZCNT,
                opers::CTZ => insn::TZCNT,
                _ => insn::POPCNT,
            };
            count.reg_reg(&mut f.text, ty, reg, reg);
            f.push_operand(Operand::TempReg {
                ty,
                reg,
                zero_ext: true,
            });
        }

        opers::NEG | opers::ABS => {
            let (reg, _) = f.op_owned_reg(op, x)?;
            let int_ty = if ty.is_64() { Type::I64 } else { Type::I32 };
            let (mask, insn_) = match (info.oper(), ty.is_64()) {
                (opers::NEG, false) => (0x8000_0000u64 as i64, false),
                (opers::NEG, true) => (i64::MIN, false),
                (_, false) => (0x7fff_ffffu64 as i64, true),
                (_, true) => (i64::MAX, true),
            };
            f.op_load_imm_scratch(int_ty, mask);
            insn::MOVDQ.reg_reg(&mut f.text, int_ty, Reg::SCRATCH, Reg::SCRATCH);
            if insn_ {
                insn::ANDPSD.reg_reg(&mut f.text, ty, reg, Reg::SCRATCH);
            } else {
                insn::XORPSD.reg_reg(&mut f.text, ty, reg, Reg::SCRATCH);
            }
            f.push_operand(Operand::TempReg {
                ty,
                reg,
                zero_ext: false,
            });
        }

        opers::CEIL | opers::FLOOR | opers::TRUNC | opers::NEAREST => {
            let (reg, _) = f.op_owned_reg(op, x)?;
            let mode = match info.oper() {
                opers::NEAREST => 0,
                opers::FLOOR => 1,
                opers::CEIL => 2,
                _ => 3,
            };
            insn::ROUNDSSD.reg_reg_imm8(&mut f.text, ty, reg, reg, mode);
            f.push_operand(Operand::TempReg {
                ty,
                reg,
                zero_ext: false,
            });
        }

        opers::SQRT => {
            let (reg, _) = f.op_owned_reg(op, x)?;
            insn::SQRTSSD.reg_reg(&mut f.text, ty, reg, reg);
            f.push_operand(Operand::TempReg {
                ty,
                reg,
                zero_ext: false,
            });
        }

        _ => unreachable!(),
    }
    Ok(false)
}

pub(super) fn gen_binary_commute(
    f: &mut Func<'_>,
    load: &mut Loader<'_>,
    op: Opcode,
    info: OpInfo,
) -> Result<bool, CodegenError> {
    gen_binary_common(f, load, op, info, true)
}

pub(super) fn gen_binary(
    f: &mut Func<'_>,
    load: &mut Loader<'_>,
    op: Opcode,
    info: OpInfo,
) -> Result<bool, CodegenError> {
    gen_binary_common(f, load, op, info, false)
}

fn gen_binary_common(
    f: &mut Func<'_>,
    _load: &mut Loader<'_>,
    op: Opcode,
    info: OpInfo,
    commute: bool,
) -> Result<bool, CodegenError> {
    let ty = info.ty();
    let mut right = f.pop_operand(op)?;
    let mut left = f.pop_operand(op)?;
    if left.ty() != ty || right.ty() != ty {
        return Err(CodegenError::TypeMismatch { op, found: ty });
    }

    if ty.is_float() {
        return bin_float(f, op, info.oper(), ty, left, right);
    }

    match info.oper() {
        opers::DIV_S | opers::DIV_U | opers::REM_S | opers::REM_U => {
            return bin_int_div(f, op, info.oper(), ty, left, right);
        }
        opers::SHL | opers::SHR_S | opers::SHR_U | opers::ROTL | opers::ROTR => {
            return bin_int_shift(f, op, info.oper(), ty, left, right);
        }
        _ => {}
    }

    f.op_persist_flags(op)?;

    if commute && foldable_imm(left).is_some() && foldable_imm(right).is_none() {
        std::mem::swap(&mut left, &mut right);
    }

    let right = if matches!(right, Operand::Stack { .. } | Operand::Flags { .. }) {
        f.op_materialize(op, right)?
    } else {
        right
    };
    let (lreg, _) = f.op_owned_reg(op, left)?;

    let al = match info.oper() {
        opers::ADD => Some(AlInsn::ADD),
        opers::SUB => Some(AlInsn::SUB),
        opers::AND => Some(AlInsn::AND),
        opers::OR => Some(AlInsn::OR),
        opers::XOR => Some(AlInsn::XOR),
        _ => None, // mul
    };

    match (foldable_imm(right), f.effective_operand(right)) {
        (Some(imm), _) => match al {
            Some(al) => al.opcode_i().reg_imm(&mut f.text, ty, lreg, imm),
            None => insn::IMULI.reg_reg_imm(&mut f.text, ty, lreg, lreg, imm),
        },
        (None, Operand::VarRef { index, .. }) => {
            let disp = f.var_mem_disp(index);
            match al {
                Some(al) => al.opcode().reg_mem_disp(&mut f.text, ty, lreg, Reg::RSP, disp),
                None => insn::IMUL.reg_mem_disp(&mut f.text, ty, lreg, Reg::RSP, disp),
            }
        }
        (None, x) => {
            let x = f.op_materialize(op, x)?;
            let rreg = x.reg().unwrap();
            match al {
                Some(al) => al.opcode().reg_reg(&mut f.text, ty, lreg, rreg),
                None => insn::IMUL.reg_reg(&mut f.text, ty, lreg, rreg),
            }
            free_if_temp(f, x);
        }
    }

    f.push_operand(Operand::TempReg {
        ty,
        reg: lreg,
        zero_ext: !ty.is_64(),
    });
    Ok(false)
}

fn bin_int_div(
    f: &mut Func<'_>,
    op: Opcode,
    oper: u8,
    ty: Type,
    left: Operand,
    right: Operand,
) -> Result<bool, CodegenError> {
    use crate::links::TrapId;
    use crate::types::Category;

    f.op_persist_flags(op)?;
    // The division sequence owns rax and rdx.
    f.op_save_reg(op, Category::Int, Reg::RAX)?;
    f.op_save_reg(op, Category::Int, Reg::RDX)?;

    let mut right = right;
    if let Some(r) = right.reg() {
        if r == Reg::RAX || r == Reg::RDX {
            let reg = f.op_alloc_reg(op, ty)?;
            f.op_move_reg(ty, reg, r);
            right = Operand::TempReg {
                ty,
                reg,
                zero_ext: right.zero_ext(),
            };
        }
    }

    let right = f.op_materialize(op, right)?;
    let rreg = right.reg().unwrap();
    f.op_move(Reg::RAX, left, false)?;

    insn::TEST.reg_reg(&mut f.text, ty, rreg, rreg);
    insn::JNE_CB.rel8(&mut f.text, 5);
    f.op_trap_call(TrapId::IntegerDivideByZero);

    let signed = oper == opers::DIV_S || oper == opers::REM_S;
    let rem = oper == opers::REM_S || oper == opers::REM_U;

    if signed {
        insn::CMPI.reg_imm(&mut f.text, ty, rreg, -1);
        if !rem {
            // divisor == -1: the only overflowing dividend is the minimum.
            insn::JNE_CB.rel8(&mut f.text, 0);
            let skip = f.text.addr();
            let min = if ty.is_64() {
                i64::MIN
            } else {
                i32::MIN as i64
            };
            f.op_load_imm_scratch(ty, min);
            insn::CMP.reg_reg(&mut f.text, ty, Reg::RAX, Reg::SCRATCH);
            insn::JNE_CB.rel8(&mut f.text, 5);
            f.op_trap_call(TrapId::IntegerOverflow);
            let here = f.text.addr();
            f.text.update_branch_site8(skip, here);
            insn::CDQ.typed(&mut f.text, ty);
            insn::IDIV.reg(&mut f.text, ty, rreg);
        } else {
            // remainder by -1 is 0 and must not reach IDIV.
            insn::JNE_CB.rel8(&mut f.text, 0);
            let do_div = f.text.addr();
            insn::XOR.reg_reg(&mut f.text, Type::I32, Reg::RDX, Reg::RDX);
            insn::JMP_CB.rel8(&mut f.text, 0);
            let done = f.text.addr();
            f.text.update_branch_site8(do_div, f.text.addr());
            insn::CDQ.typed(&mut f.text, ty);
            insn::IDIV.reg(&mut f.text, ty, rreg);
            let here = f.text.addr();
            f.text.update_branch_site8(done, here);
        }
    } else {
        insn::XOR.reg_reg(&mut f.text, Type::I32, Reg::RDX, Reg::RDX);
        insn::DIV.reg(&mut f.text, ty, rreg);
    }

    free_if_temp(f, right);
    f.push_operand(Operand::TempReg {
        ty,
        reg: if rem { Reg::RDX } else { Reg::RAX },
        zero_ext: !ty.is_64(),
    });
    Ok(false)
}

fn bin_int_shift(
    f: &mut Func<'_>,
    op: Opcode,
    oper: u8,
    ty: Type,
    left: Operand,
    right: Operand,
) -> Result<bool, CodegenError> {
    f.op_persist_flags(op)?;

    let shift = match oper {
        opers::SHL => ShiftInsn::SHL,
        opers::SHR_S => ShiftInsn::SHR_S,
        opers::SHR_U => ShiftInsn::SHR_U,
        opers::ROTL => ShiftInsn::ROTL,
        _ => ShiftInsn::ROTR,
    };

    if let Some(count) = foldable_imm(right) {
        let (lreg, _) = f.op_owned_reg(op, left)?;
        shift
            .opcode_i()
            .reg_imm8(&mut f.text, ty, lreg, (count & 63) as i8);
        f.push_operand(Operand::TempReg {
            ty,
            reg: lreg,
            zero_ext: !ty.is_64(),
        });
        return Ok(false);
    }

    // The hardware takes the count in cl.
    let right = if matches!(right, Operand::Flags { .. }) {
        f.op_materialize(op, right)?
    } else {
        right
    };
    f.op_move(Reg::SCRATCH, right, true)?;
    let (lreg, _) = f.op_owned_reg(op, left)?;
    shift.opcode().reg(&mut f.text, ty, lreg);

    f.push_operand(Operand::TempReg {
        ty,
        reg: lreg,
        zero_ext: !ty.is_64(),
    });
    Ok(false)
}

fn bin_float(
    f: &mut Func<'_>,
    op: Opcode,
    oper: u8,
    ty: Type,
    left: Operand,
    right: Operand,
) -> Result<bool, CodegenError> {
    if oper == opers::COPYSIGN {
        return bin_float_copysign(f, op, ty, left, right);
    }

    let right = if matches!(right, Operand::Stack { .. }) {
        f.op_materialize(op, right)?
    } else {
        right
    };
    let (lreg, _) = f.op_owned_reg(op, left)?;

    let insn_ = match oper {
        opers::ADD => insn::ADDSSD,
        opers::SUB => insn::SUBSSD,
        opers::MUL => insn::MULSSD,
        opers::DIV => insn::DIVSSD,
        opers::MIN => insn::MINSSD,
        _ => insn::MAXSSD,
    };

    match f.effective_operand(right) {
        Operand::VarRef { index, .. } => {
            let disp = f.var_mem_disp(index);
            insn_.reg_mem_disp(&mut f.text, ty, lreg, Reg::RSP, disp);
        }
        x => {
            let x = f.op_materialize(op, x)?;
            insn_.reg_reg(&mut f.text, ty, lreg, x.reg().unwrap());
            free_if_temp(f, x);
        }
    }

    f.push_operand(Operand::TempReg {
        ty,
        reg: lreg,
        zero_ext: false,
    });
    Ok(false)
}

/// `copysign(x, y)`: the magnitude of x with the sign of y, composed with
/// AND/OR masks built in the scratch registers.
fn bin_float_copysign(
    f: &mut Func<'_>,
    op: Opcode,
    ty: Type,
    left: Operand,
    right: Operand,
) -> Result<bool, CodegenError> {
    let int_ty = if ty.is_64() { Type::I64 } else { Type::I32 };
    let (sign, magnitude) = if ty.is_64() {
        (i64::MIN, i64::MAX)
    } else {
        (0x8000_0000u64 as i64, 0x7fff_ffffu64 as i64)
    };

    let (rreg, _) = f.op_owned_reg(op, right)?;
    let (lreg, _) = f.op_owned_reg(op, left)?;

    f.op_load_imm_scratch(int_ty, sign);
    insn::MOVDQ.reg_reg(&mut f.text, int_ty, Reg::SCRATCH, Reg::SCRATCH);
    insn::ANDPSD.reg_reg(&mut f.text, ty, rreg, Reg::SCRATCH);
    f.op_load_imm_scratch(int_ty, magnitude);
    insn::MOVDQ.reg_reg(&mut f.text, int_ty, Reg::SCRATCH, Reg::SCRATCH);
    insn::ANDPSD.reg_reg(&mut f.text, ty, lreg, Reg::SCRATCH);
    insn::ORPSD.reg_reg(&mut f.text, ty, lreg, rreg);

    f.regs.free(crate::types::category(ty), rreg);
    f.push_operand(Operand::TempReg {
        ty,
        reg: lreg,
        zero_ext: false,
    });
    Ok(false)
}
