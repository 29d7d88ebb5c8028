//! Direct and indirect calls, and the argument marshaller that arranges
//! operands into the calling convention's register and stack slots.

use super::OpInfo;
use crate::error::CodegenError;
use crate::func::{Func, WORD};
use crate::loader::Loader;
use crate::opcodes::Opcode;
use crate::operand::Operand;
use crate::regalloc::{ParamRegIter, RegMap};
use crate::types::{category, Category, Sig, Type};
use log::trace;
use sunbeam_asm_x64::Reg;

pub(super) fn gen_call(
    f: &mut Func<'_>,
    load: &mut Loader<'_>,
    op: Opcode,
    _info: OpInfo,
) -> Result<bool, CodegenError> {
    let func_index = load.varuint32()?;
    if func_index as usize >= f.module.func_sigs.len() {
        return Err(CodegenError::out_of_bounds(op, "function", func_index));
    }

    let sig_index = f.module.func_sigs[func_index as usize];
    let sigs = f.module.sigs;
    let sig = &sigs[sig_index as usize];

    let num_stack_params = setup_call_operands(f, op, sig, None)?;

    f.op_call(func_index);
    f.op_backoff_stack_ptr(num_stack_params * WORD);
    Ok(false)
}

pub(super) fn gen_call_indirect(
    f: &mut Func<'_>,
    load: &mut Loader<'_>,
    op: Opcode,
    _info: OpInfo,
) -> Result<bool, CodegenError> {
    let sig_index = load.varuint32()?;
    if sig_index as usize >= f.module.sigs.len() {
        return Err(CodegenError::out_of_bounds(op, "signature", sig_index));
    }
    let sigs = f.module.sigs;
    let sig = &sigs[sig_index as usize];

    load.byte()?; // reserved

    let func_index = f.pop_operand(op)?;
    if func_index.ty() != Type::I32 {
        return Err(CodegenError::TypeMismatch {
            op,
            found: func_index.ty(),
        });
    }
    let func_index = f.op_materialize(op, func_index)?;

    let num_stack_params = setup_call_operands(f, op, sig, Some(func_index))?;

    // If the index was in a register, it has already been relocated to the
    // result register; otherwise it was not touched.
    if !func_index.is_reg() {
        f.op_move(Reg::RESULT, func_index, false)?;
    }

    f.op_call_indirect(f.module.table_funcs.len() as i32, sig_index as i32);
    f.op_backoff_stack_ptr(num_stack_params * WORD);
    Ok(false)
}

/// Arrange the call's argument operands into the calling convention.
///
/// On return, every argument is in its assigned register or stack slot,
/// the indirect index (if any) is in the result register, register-cached
/// locals have been stored, and the result operand (if the signature has
/// one) is on the operand stack.
fn setup_call_operands(
    f: &mut Func<'_>,
    op: Opcode,
    sig: &Sig,
    indirect: Option<Operand>,
) -> Result<i32, CodegenError> {
    f.op_stack_check();

    let mut args = f.pop_operands(op, sig.args.len())?;

    f.op_init_vars()?;
    f.op_save_temporary_operands()?;
    f.op_store_reg_vars()?;

    f.regs.free_all();

    let mut reg_args = RegMap::new();

    for (i, value) in args.iter_mut().enumerate() {
        if value.ty() != sig.args[i] {
            return Err(CodegenError::ArgType {
                op,
                index: i,
                found: value.ty(),
            });
        }

        let mut claimed = None;
        match *value {
            Operand::TempReg { reg, .. } => claimed = Some(reg),
            Operand::VarRef { index, .. } => {
                let cache = f.vars[index as usize].cache;
                if let Operand::VarReg { reg, .. } = cache {
                    claimed = Some(reg);
                    *value = cache; // help the later passes
                }
            }
            _ => {}
        }

        if let Some(reg) = claimed {
            let cat = category(sig.args[i]);
            f.regs.set_allocated(cat, reg);
            reg_args.set(cat, reg, i);
        }
    }

    // Relocate the indirect index to the result register if it already
    // occupies some register.
    if let Some(x) = indirect {
        if let Some(reg) = x.reg() {
            if reg != Reg::RESULT {
                let i = reg_args.get(Category::Int, Reg::RESULT);
                if i >= 0 {
                    trace!("indirect call index: {} <-> {x:?}", Reg::RESULT);
                    f.op_swap(Category::Int, Reg::RESULT, reg);
                    let i = i as usize;
                    args[i] = Operand::TempReg {
                        ty: args[i].ty(),
                        reg,
                        zero_ext: args[i].zero_ext(),
                    };
                    reg_args.clear(Category::Int, Reg::RESULT);
                    reg_args.set(Category::Int, reg, i);
                    // The displaced argument's new home must survive any
                    // allocation below.
                    f.regs.set_allocated(Category::Int, reg);
                } else {
                    trace!("indirect call index: {} <- {x:?}", Reg::RESULT);
                    f.op_move_reg(Type::I32, Reg::RESULT, reg);
                }
            }
        }
    }

    let mut param_regs = ParamRegIter::default();
    let num_stack_params = param_regs.init(&sig.args);

    let mut num_missing_stack_args = 0i32;
    for x in &args[..num_stack_params] {
        if !matches!(x, Operand::Stack { .. }) {
            num_missing_stack_args += 1;
        }
    }

    if num_missing_stack_args > 0 {
        f.op_advance_stack_ptr(num_missing_stack_args * WORD);

        let mut source_index = num_missing_stack_args;
        let mut target_index = 0i32;

        // Move the register args forward which are currently on the
        // stack.
        for i in (num_stack_params..args.len()).rev() {
            if matches!(args[i], Operand::Stack { .. }) {
                trace!("call param #{i}: stack (temporary) <- {:?}", args[i]);
                f.op_copy_stack(target_index * WORD, source_index * WORD);
                source_index += 1;
                target_index += 1;
            }
        }

        // Move the stack args forward which are already on the stack,
        // while inserting the missing stack args. Walking from the top
        // down keeps every copy's source intact when it is read.
        for i in (0..num_stack_params).rev() {
            let x = args[i];
            match x {
                Operand::Stack { .. } => {
                    trace!("call param #{i}: stack <- {x:?}");
                    f.op_copy_stack(target_index * WORD, source_index * WORD);
                    source_index += 1;
                }
                _ => {
                    let x = f.effective_operand(x);
                    trace!("call param #{i}: stack <- {x:?}");
                    f.op_store_stack(target_index * WORD, x);
                }
            }
            target_index += 1;
        }
    }

    // Uniquify register operands: two arguments naming the same cached
    // local must not share a source register.
    for i in 0..args.len() {
        let value = args[i];
        if let Operand::VarReg { ty, reg, zero_ext, .. } = value {
            let cat = category(ty);
            if reg_args.get(cat, reg) != i as i32 {
                let Some(new) = f.regs.alloc(cat) else {
                    return Err(CodegenError::RegistersExhausted { op });
                };
                trace!("call param #{i}: {cat:?} {new} <- {reg}");
                f.op_move_reg(ty, new, reg);
                args[i] = Operand::TempReg {
                    ty,
                    reg: new,
                    zero_ext,
                };
                reg_args.set(cat, new, i);
            }
        }
    }

    f.regs.free_all();

    // Forward pass: place the arguments that already sit in registers,
    // swapping displaced ones along the way.
    let mut preserve_flags = false;

    for i in num_stack_params..args.len() {
        let value = args[i];
        let cat = category(value.ty());
        let pos_reg = param_regs.forward(cat);

        match value {
            Operand::VarReg { reg, .. } | Operand::TempReg { reg, .. } => {
                if reg == pos_reg {
                    trace!("call param #{i}: {cat:?} {pos_reg} already in place");
                } else if reg_args.get(cat, pos_reg) >= 0 {
                    let other = reg_args.get(cat, pos_reg) as usize;
                    trace!("call param #{i}: {cat:?} {pos_reg} <-> {reg}");
                    f.op_swap(cat, pos_reg, reg);
                    args[other] = value;
                    reg_args.set(cat, reg, other);
                } else {
                    trace!("call param #{i}: {cat:?} {pos_reg} <- {reg}");
                    f.op_move_reg(value.ty(), pos_reg, reg);
                }
            }
            Operand::Flags { .. } => preserve_flags = true,
            _ => {}
        }
    }

    // Backward pass: fill in the rest (immediates, stack values, flags)
    // so that late placements cannot stomp earlier sources.
    param_regs.init_regs();

    for i in (num_stack_params..args.len()).rev() {
        let value = args[i];
        let cat = category(value.ty());
        let pos_reg = param_regs.backward(cat);

        if !value.is_reg() {
            trace!("call param #{i}: {cat:?} {pos_reg} <- {value:?}");
            f.op_move(pos_reg, value, preserve_flags)?;
        }
    }

    // The caches were stored before the shuffle; later reads reload from
    // the stack slots.
    f.op_forget_reg_vars();

    // Account for the return address.
    if f.stack_offset + WORD > f.max_stack_offset {
        f.max_stack_offset = f.stack_offset + WORD;
    }

    if let Some(ty) = sig.result {
        f.push_operand(Operand::TempReg {
            ty,
            reg: Reg::RESULT,
            zero_ext: false,
        });
    }

    Ok(num_stack_params as i32)
}
