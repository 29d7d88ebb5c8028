//! Linear-memory access, memory queries, and globals.
//!
//! Loads and stores address `[r14 + index + offset]`; out-of-bounds
//! accesses are caught by guard pages, so no inline bounds check is
//! emitted. Globals live at negative displacements below the memory base.

use super::{opers, OpInfo};
use crate::error::CodegenError;
use crate::func::{Func, WORD};
use crate::links::RuntimeFunc;
use crate::loader::Loader;
use crate::opcodes::Opcode;
use crate::operand::Operand;
use crate::types::{category, Category, Type};
use sunbeam_asm_x64::{insn, Reg, Scale};

const MEMORY_BASE: Reg = Reg::R14;

/// Pop and materialize an address operand with its upper half cleared.
fn address_reg(
    f: &mut Func<'_>,
    op: Opcode,
    x: Operand,
) -> Result<(Reg, bool), CodegenError> {
    if x.ty() != Type::I32 {
        return Err(CodegenError::TypeMismatch { op, found: x.ty() });
    }
    let x = f.op_materialize(op, x)?;
    match x {
        Operand::TempReg { reg, zero_ext, .. } => {
            if !zero_ext {
                f.op_zero_extend(reg);
            }
            Ok((reg, true))
        }
        Operand::VarReg { reg, zero_ext, .. } => {
            if zero_ext {
                Ok((reg, false))
            } else {
                // The cached local must not be clobbered by the zero
                // extension.
                let tmp = f.op_alloc_reg(op, Type::I32)?;
                insn::MOV.reg_reg(&mut f.text, Type::I32, tmp, reg);
                Ok((tmp, true))
            }
        }
        _ => unreachable!(),
    }
}

fn read_memory_immediate(load: &mut Loader<'_>, op: Opcode) -> Result<i32, CodegenError> {
    load.varuint32()?; // alignment hint
    let offset = load.varuint32()?;
    if offset > i32::MAX as u32 {
        return Err(CodegenError::out_of_bounds(op, "memory offset", offset));
    }
    Ok(offset as i32)
}

pub(super) fn gen_load(
    f: &mut Func<'_>,
    load: &mut Loader<'_>,
    op: Opcode,
    info: OpInfo,
) -> Result<bool, CodegenError> {
    let ty = info.ty();
    let offset = read_memory_immediate(load, op)?;

    let index = f.pop_operand(op)?;
    let (index_reg, index_owned) = address_reg(f, op, index)?;

    // Integer loads can reuse the index register as the destination.
    let (dest, zero_ext) = if ty.is_float() {
        let dest = f.op_alloc_reg(op, ty)?;
        insn::MOVSSD.reg_mem_index_disp(
            &mut f.text,
            ty,
            dest,
            MEMORY_BASE,
            index_reg,
            Scale::S0,
            offset,
        );
        if index_owned {
            f.regs.free(Category::Int, index_reg);
        }
        (dest, false)
    } else {
        let dest = if index_owned {
            index_reg
        } else {
            f.op_alloc_reg(op, ty)?
        };
        let zero_ext = match info.oper() {
            opers::LOAD => {
                insn::MOV.reg_mem_index_disp(
                    &mut f.text,
                    ty,
                    dest,
                    MEMORY_BASE,
                    index_reg,
                    Scale::S0,
                    offset,
                );
                !ty.is_64()
            }
            opers::LOAD8_S => {
                insn::MOVSX8.reg_mem_index_disp(
                    &mut f.text,
                    ty,
                    dest,
                    MEMORY_BASE,
                    index_reg,
                    Scale::S0,
                    offset,
                );
                false
            }
            opers::LOAD8_U => {
                insn::MOVZX8.reg_mem_index_disp(
                    &mut f.text,
                    Type::I32,
                    dest,
                    MEMORY_BASE,
                    index_reg,
                    Scale::S0,
                    offset,
                );
                true
            }
            opers::LOAD16_S => {
                insn::MOVSX16.reg_mem_index_disp(
                    &mut f.text,
                    ty,
                    dest,
                    MEMORY_BASE,
                    index_reg,
                    Scale::S0,
                    offset,
                );
                false
            }
            opers::LOAD16_U => {
                insn::MOVZX16.reg_mem_index_disp(
                    &mut f.text,
                    Type::I32,
                    dest,
                    MEMORY_BASE,
                    index_reg,
                    Scale::S0,
                    offset,
                );
                true
            }
            opers::LOAD32_S => {
                insn::MOVSXD.reg_mem_index_disp(
                    &mut f.text,
                    Type::I64,
                    dest,
                    MEMORY_BASE,
                    index_reg,
                    Scale::S0,
                    offset,
                );
                false
            }
            opers::LOAD32_U => {
                insn::MOV.reg_mem_index_disp(
                    &mut f.text,
                    Type::I32,
                    dest,
                    MEMORY_BASE,
                    index_reg,
                    Scale::S0,
                    offset,
                );
                true
            }
            _ => unreachable!(),
        };
        (dest, zero_ext)
    };

    f.push_operand(Operand::TempReg {
        ty,
        reg: dest,
        zero_ext,
    });
    Ok(false)
}

pub(super) fn gen_store(
    f: &mut Func<'_>,
    load: &mut Loader<'_>,
    op: Opcode,
    info: OpInfo,
) -> Result<bool, CodegenError> {
    let ty = info.ty();
    let offset = read_memory_immediate(load, op)?;

    let value = f.pop_operand(op)?;
    let index = f.pop_operand(op)?;
    if value.ty() != ty {
        return Err(CodegenError::TypeMismatch {
            op,
            found: value.ty(),
        });
    }

    // Resolve the upper operand (the value) before the index, keeping the
    // machine-stack order intact.
    let value = f.op_materialize(op, value)?;
    let value_reg = value.reg().unwrap();
    let (index_reg, index_owned) = address_reg(f, op, index)?;

    match info.oper() {
        opers::STORE => {
            if ty.is_float() {
                insn::MOVSSDMR.reg_mem_index_disp(
                    &mut f.text,
                    ty,
                    value_reg,
                    MEMORY_BASE,
                    index_reg,
                    Scale::S0,
                    offset,
                );
            } else {
                insn::MOVMR.reg_mem_index_disp(
                    &mut f.text,
                    ty,
                    value_reg,
                    MEMORY_BASE,
                    index_reg,
                    Scale::S0,
                    offset,
                );
            }
        }
        opers::STORE8 => {
            insn::MOV8MR.reg_mem_index_disp(
                &mut f.text,
                Type::I32,
                value_reg,
                MEMORY_BASE,
                index_reg,
                Scale::S0,
                offset,
            );
        }
        opers::STORE16 => {
            insn::MOV16MR.reg_mem_index_disp(
                &mut f.text,
                Type::I32,
                value_reg,
                MEMORY_BASE,
                index_reg,
                Scale::S0,
                offset,
            );
        }
        opers::STORE32 => {
            insn::MOVMR.reg_mem_index_disp(
                &mut f.text,
                Type::I32,
                value_reg,
                MEMORY_BASE,
                index_reg,
                Scale::S0,
                offset,
            );
        }
        _ => unreachable!(),
    }

    if index_owned {
        f.regs.free(Category::Int, index_reg);
    }
    if let Operand::TempReg { ty, reg, .. } = value {
        f.regs.free(category(ty), reg);
    }
    Ok(false)
}

pub(super) fn gen_current_memory(
    f: &mut Func<'_>,
    load: &mut Loader<'_>,
    op: Opcode,
    _info: OpInfo,
) -> Result<bool, CodegenError> {
    load.varuint1()?; // reserved
    f.op_persist_flags(op)?;
    f.op_save_reg(op, Category::Int, Reg::RESULT)?;
    f.op_runtime_call(RuntimeFunc::CurrentMemory);
    f.push_operand(Operand::TempReg {
        ty: Type::I32,
        reg: Reg::RESULT,
        zero_ext: false,
    });
    Ok(false)
}

pub(super) fn gen_grow_memory(
    f: &mut Func<'_>,
    load: &mut Loader<'_>,
    op: Opcode,
    _info: OpInfo,
) -> Result<bool, CodegenError> {
    load.varuint1()?; // reserved
    let pages = f.pop_operand(op)?;
    if pages.ty() != Type::I32 {
        return Err(CodegenError::TypeMismatch {
            op,
            found: pages.ty(),
        });
    }
    f.op_persist_flags(op)?;
    f.op_save_reg(op, Category::Int, Reg::RESULT)?;
    f.op_move(Reg::RESULT, pages, false)?;
    f.op_runtime_call(RuntimeFunc::GrowMemory);
    f.push_operand(Operand::TempReg {
        ty: Type::I32,
        reg: Reg::RESULT,
        zero_ext: false,
    });
    Ok(false)
}

fn global_disp(f: &Func<'_>, index: u32) -> i32 {
    -WORD * (f.module.globals.len() as i32 - index as i32)
}

pub(super) fn gen_get_global(
    f: &mut Func<'_>,
    load: &mut Loader<'_>,
    op: Opcode,
    _info: OpInfo,
) -> Result<bool, CodegenError> {
    let index = load.varuint32()?;
    if index as usize >= f.module.globals.len() {
        return Err(CodegenError::out_of_bounds(op, "global", index));
    }
    let ty = f.module.globals[index as usize];
    let disp = global_disp(f, index);

    let reg = f.op_alloc_reg(op, ty)?;
    if ty.is_float() {
        insn::MOVSSD.reg_mem_disp(&mut f.text, ty, reg, MEMORY_BASE, disp);
    } else {
        insn::MOV.reg_mem_disp(&mut f.text, ty, reg, MEMORY_BASE, disp);
    }
    f.push_operand(Operand::TempReg {
        ty,
        reg,
        zero_ext: !ty.is_float() && !ty.is_64(),
    });
    Ok(false)
}

pub(super) fn gen_set_global(
    f: &mut Func<'_>,
    load: &mut Loader<'_>,
    op: Opcode,
    _info: OpInfo,
) -> Result<bool, CodegenError> {
    let index = load.varuint32()?;
    if index as usize >= f.module.globals.len() {
        return Err(CodegenError::out_of_bounds(op, "global", index));
    }
    let ty = f.module.globals[index as usize];
    let disp = global_disp(f, index);

    let x = f.pop_operand(op)?;
    if x.ty() != ty {
        return Err(CodegenError::TypeMismatch { op, found: x.ty() });
    }

    let x = f.op_materialize(op, x)?;
    let reg = x.reg().unwrap();
    if ty.is_float() {
        insn::MOVSSDMR.reg_mem_disp(&mut f.text, ty, reg, MEMORY_BASE, disp);
    } else {
        insn::MOVMR.reg_mem_disp(&mut f.text, ty, reg, MEMORY_BASE, disp);
    }
    if let Operand::TempReg { ty, reg, .. } = x {
        f.regs.free(category(ty), reg);
    }
    Ok(false)
}
