//! Local variable access: get, set, tee.

use super::OpInfo;
use crate::error::CodegenError;
use crate::func::Func;
use crate::loader::Loader;
use crate::opcodes::Opcode;
use crate::operand::Operand;
use crate::types::category;
use log::trace;

pub(super) fn gen_get_local(
    f: &mut Func<'_>,
    load: &mut Loader<'_>,
    op: Opcode,
    _info: OpInfo,
) -> Result<bool, CodegenError> {
    let index = load.varuint32()?;
    if index as usize >= f.vars.len() {
        return Err(CodegenError::out_of_bounds(op, "local", index));
    }
    f.push_var_ref(index);
    Ok(false)
}

pub(super) fn gen_set_local(
    f: &mut Func<'_>,
    load: &mut Loader<'_>,
    op: Opcode,
    _info: OpInfo,
) -> Result<bool, CodegenError> {
    let index = load.varuint32()?;
    if index as usize >= f.vars.len() {
        return Err(CodegenError::out_of_bounds(op, "local", index));
    }
    op_set_local(f, op, index)?;
    Ok(false)
}

pub(super) fn gen_tee_local(
    f: &mut Func<'_>,
    load: &mut Loader<'_>,
    op: Opcode,
    _info: OpInfo,
) -> Result<bool, CodegenError> {
    let index = load.varuint32()?;
    if index as usize >= f.vars.len() {
        return Err(CodegenError::out_of_bounds(op, "local", index));
    }
    op_set_local(f, op, index)?;
    f.push_var_ref(index);
    Ok(false)
}

fn op_set_local(f: &mut Func<'_>, op: Opcode, index: u32) -> Result<(), CodegenError> {
    trace!("setting variable #{index}");

    let t = f.vars[index as usize].cache.ty();
    let new_value = f.pop_operand(op)?;
    if new_value.ty() != t {
        return Err(CodegenError::TypeMismatch {
            op,
            found: new_value.ty(),
        });
    }

    match new_value {
        Operand::Imm { val, .. } => {
            if let Operand::Imm { val: cached, .. } = f.vars[index as usize].cache {
                if val == cached {
                    return Ok(()); // nop
                }
            }
        }
        Operand::VarRef { index: other, .. } => {
            if other == index {
                return Ok(()); // nop
            }
        }
        _ => {}
    }

    sever_references(f, op, index)?;

    let old_cache = f.vars[index as usize].cache;
    trace!("old variable cache: {old_cache:?}");

    match new_value {
        Operand::Imm { .. } => {
            f.vars[index as usize].cache = new_value;
            f.vars[index as usize].dirty = true;
        }

        Operand::VarRef { .. } | Operand::Stack { .. } | Operand::Flags { .. } => {
            // Try to cache the value in a register, reusing the old cache
            // register when there is one.
            let (reg, ok) = if let Operand::VarReg { reg, .. } = old_cache {
                (Some(reg), true)
            } else {
                let r = f.regs.alloc(category(t));
                (r, r.is_some())
            };

            if ok {
                let reg = reg.unwrap();
                let zero_ext = f.op_move(reg, new_value, false)?;
                f.vars[index as usize].cache = Operand::VarReg {
                    ty: t,
                    index,
                    reg,
                    zero_ext,
                };
                f.vars[index as usize].dirty = true;
            } else {
                f.op_store_var(index, new_value)?;
                f.vars[index as usize].reset_cache();
            }
            // The old cache register was either reused above or retired
            // below.
            if let Operand::VarReg { reg: old, .. } = old_cache {
                if !ok || reg != Some(old) {
                    f.regs.free(category(t), old);
                }
            }
            return Ok(());
        }

        Operand::TempReg { reg, zero_ext, .. } => {
            let (cache_reg, moved_ze, ok) = if f.regs.allocated(category(t), reg) {
                // Repurpose the register which already contains the value.
                (Some(reg), zero_ext, true)
            } else {
                // The value sits in a register the allocator does not own
                // (the result register after a call); copy it out.
                let (r, ok) = if let Operand::VarReg { reg: old, .. } = old_cache {
                    (Some(old), true)
                } else {
                    let r = f.regs.alloc(category(t));
                    (r, r.is_some())
                };
                if ok {
                    let r = r.unwrap();
                    let ze = f.op_move(r, new_value, false)?;
                    (Some(r), ze, true)
                } else {
                    (None, false, false)
                }
            };

            if ok {
                let r = cache_reg.unwrap();
                f.vars[index as usize].cache = Operand::VarReg {
                    ty: t,
                    index,
                    reg: r,
                    zero_ext: moved_ze,
                };
                f.vars[index as usize].dirty = true;
                if let Operand::VarReg { reg: old, .. } = old_cache {
                    if old != r {
                        f.regs.free(category(t), old);
                    }
                }
            } else {
                f.op_store_var(index, new_value)?;
                f.vars[index as usize].reset_cache();
                if let Operand::VarReg { reg: old, .. } = old_cache {
                    f.regs.free(category(t), old);
                }
            }
            return Ok(());
        }

        Operand::Nowhere { .. } | Operand::VarReg { .. } => {
            debug_assert!(false, "unexpected operand on the stack: {new_value:?}");
        }
    }

    if let Operand::VarReg { reg: old, .. } = old_cache {
        f.regs.free(category(t), old);
    }
    Ok(())
}

/// Detach every live reference to the local before its value changes:
/// copy references into temporary registers while they last, then switch
/// to spilling everything (bottom up) to machine-stack slots.
fn sever_references(f: &mut Func<'_>, op: Opcode, index: u32) -> Result<(), CodegenError> {
    if f.vars[index as usize].ref_count == 0 {
        return Ok(());
    }
    trace!(
        "variable reference count: {}",
        f.vars[index as usize].ref_count
    );

    let t = f.vars[index as usize].cache.ty();
    let mut spill_until = None;

    for i in (0..f.operands.len()).rev() {
        let x = f.operands[i];
        if let Operand::VarRef { index: vi, .. } = x {
            if vi != index {
                continue;
            }
            match f.regs.alloc(category(t)) {
                Some(reg) => {
                    let zero_ext = f.op_move(reg, x, true)?;
                    f.operands[i] = Operand::TempReg {
                        ty: t,
                        reg,
                        zero_ext,
                    };
                    f.vars[index as usize].ref_count -= 1;
                    if f.vars[index as usize].ref_count == 0 {
                        return Ok(());
                    }
                }
                None => {
                    spill_until = Some(i);
                    break;
                }
            }
        }
    }

    let Some(spill_until) = spill_until else {
        debug_assert!(false, "could not find all variable references");
        return Err(CodegenError::StackUnderflow { op });
    };

    // Spill mode: convert everything through the offending position to
    // stack slots, bottom up, evicting any flags operand along the way.
    f.op_init_vars()?;

    for i in 0..=spill_until {
        let x = f.operands[i];
        match x {
            Operand::VarRef { ty, index: vi } => {
                f.op_push(x)?;
                f.operands[i] = Operand::Stack { ty };
                f.vars[vi as usize].ref_count -= 1;
                if vi == index && f.vars[index as usize].ref_count == 0 {
                    return Ok(());
                }
            }
            Operand::TempReg { ty, .. } => {
                f.op_push(x)?;
                f.operands[i] = Operand::Stack { ty };
            }
            Operand::Flags { .. } => {
                f.op_push(x)?;
                f.operands[i] = Operand::Stack {
                    ty: crate::types::Type::I32,
                };
            }
            _ => {}
        }
    }

    debug_assert!(f.vars[index as usize].ref_count == 0);
    Ok(())
}
