//! Opcode dispatch and the per-function code generation driver.
//!
//! The dispatch table is a fixed 256-entry array of `{handler, packed
//! info}`; the packed info carries up to three 8-bit fields (type, oper,
//! second type) for the handler. A parallel skip table consumes the
//! immediates of dead code after an unconditional transfer. Block-starting
//! opcodes and the `else`/`end` sentinels are consumed by the block
//! subsystem in [`gen_ops`] rather than dispatched.

mod arith;
mod call;
mod convert;
mod local;
mod memory;
pub(crate) mod opers;

use crate::error::CodegenError;
use crate::func::{Block, BlockKind, Func, WORD};
use crate::links::{Label, TrapId};
use crate::loader::Loader;
use crate::opcodes::{self, Opcode};
use crate::operand::{Cond, Operand};
use crate::types::{block_type, packed_type, Type};
use log::trace;
use smallvec::SmallVec;
use sunbeam_asm_x64::{insn, Reg};

/// Up to three 8-bit fields for a handler: type, second type, oper.
#[derive(Clone, Copy)]
pub(crate) struct OpInfo(u32);

impl OpInfo {
    pub(crate) const NONE: OpInfo = OpInfo(0);

    const fn new(t1: u8, t2: u8, oper: u8) -> OpInfo {
        OpInfo(t1 as u32 | (t2 as u32) << 8 | (oper as u32) << 16)
    }

    pub(crate) fn ty(self) -> Type {
        packed_type(self.0 as u8)
    }

    pub(crate) fn ty2(self) -> Type {
        packed_type((self.0 >> 8) as u8)
    }

    pub(crate) fn oper(self) -> u8 {
        (self.0 >> 16) as u8
    }
}

/// An opcode handler; returns whether the code path is dead after it.
type GenFn = fn(&mut Func<'_>, &mut Loader<'_>, Opcode, OpInfo) -> Result<bool, CodegenError>;

/// An immediate-skipping routine for dead code.
type SkipFn = fn(&mut Loader<'_>, Opcode) -> Result<(), CodegenError>;

#[derive(Clone, Copy)]
struct OpImpl {
    gen: GenFn,
    info: OpInfo,
}

/// Compile one function body: local declarations, prologue, the operator
/// stream up to the terminating `end`, and the epilogue.
pub fn gen_function(f: &mut Func<'_>, load: &mut Loader<'_>) -> Result<(), CodegenError> {
    let mut local_types = Vec::new();
    let decls = load.varuint32()?;
    for _ in 0..decls {
        let n = load.varuint32()?;
        let ty = crate::types::value_type(load.varint7()?)?;
        for _ in 0..n {
            local_types.push(ty);
        }
    }
    f.init_locals(&local_types);

    // The implicit function-level frame; branches to it behave like a
    // branch to the end of the outermost block.
    f.blocks.push(Block {
        kind: BlockKind::Block,
        ty: f.sig.result,
        label: Label::new(),
        else_label: None,
        saved_operands: 0,
    });

    let (term, deadend) = gen_ops(f, load)?;
    if term != opcodes::END {
        return Err(CodegenError::InvalidOpcode(term.0));
    }
    let deadend = end_frame(f, opcodes::END, deadend)?;

    if !deadend {
        if let Some(_ty) = f.sig.result {
            let x = f.pop_operand(opcodes::END)?;
            f.op_move(Reg::RESULT, x, false)?;
        }
    }
    f.op_epilogue();

    if !load.done() {
        return Err(CodegenError::TrailingBytes);
    }
    debug_assert!(f.blocks.is_empty());
    Ok(())
}

/// Generate operators until the current block's `end` or `else`
/// terminator. Returns the terminator and whether the path into it is
/// dead.
fn gen_ops(f: &mut Func<'_>, load: &mut Loader<'_>) -> Result<(Opcode, bool), CodegenError> {
    loop {
        let op = Opcode(load.byte()?);
        trace!("{} at {:#x}", op, f.text.addr());

        let deadend = match op {
            opcodes::END | opcodes::ELSE => return Ok((op, false)),
            opcodes::BLOCK => gen_block(f, load)?,
            opcodes::LOOP => gen_loop(f, load)?,
            opcodes::IF => gen_if(f, load)?,
            _ => {
                let imp = &OPCODE_IMPLS[op.0 as usize];
                (imp.gen)(f, load, op, imp.info)?
            }
        };

        if deadend {
            let term = skip_ops(load)?;
            return Ok((term, true));
        }
    }
}

/// Skip dead operators to the enclosing block's terminator, consuming
/// immediates without emitting code.
fn skip_ops(load: &mut Loader<'_>) -> Result<Opcode, CodegenError> {
    let mut depth = 0usize;
    loop {
        let op = Opcode(load.byte()?);
        match op {
            opcodes::BLOCK | opcodes::LOOP | opcodes::IF => {
                load.varint7()?;
                depth += 1;
            }
            opcodes::END => {
                if depth == 0 {
                    return Ok(op);
                }
                depth -= 1;
            }
            opcodes::ELSE => {
                if depth == 0 {
                    return Ok(op);
                }
            }
            _ => (OPCODE_SKIPS[op.0 as usize])(load, op)?,
        }
    }
}

fn gen_block(f: &mut Func<'_>, load: &mut Loader<'_>) -> Result<bool, CodegenError> {
    let ty = block_type(load.varint7()?)?;
    f.op_spill_operands()?;
    f.blocks.push(Block {
        kind: BlockKind::Block,
        ty,
        label: Label::new(),
        else_label: None,
        saved_operands: f.operands.len(),
    });

    let (term, deadend) = gen_ops(f, load)?;
    if term != opcodes::END {
        return Err(CodegenError::InvalidOpcode(term.0));
    }
    end_frame(f, opcodes::BLOCK, deadend)
}

fn gen_loop(f: &mut Func<'_>, load: &mut Loader<'_>) -> Result<bool, CodegenError> {
    let ty = block_type(load.varint7()?)?;
    f.op_spill_operands()?;
    // The loop head is a merge point for back edges: locals must be in
    // their slots on every iteration.
    f.op_flush_vars()?;
    f.op_reset_var_caches();

    // Address zero is the unresolved-label sentinel; pad if the loop head
    // would land there.
    if f.text.addr() == 0 {
        insn::NOP.simple(&mut f.text);
    }
    let mut label = Label::new();
    label.addr = f.text.addr();
    f.blocks.push(Block {
        kind: BlockKind::Loop,
        ty,
        label,
        else_label: None,
        saved_operands: f.operands.len(),
    });

    let (term, deadend) = gen_ops(f, load)?;
    if term != opcodes::END {
        return Err(CodegenError::InvalidOpcode(term.0));
    }

    // No forward branches target a loop's end; the fallthrough value (if
    // any) stays where the body left it.
    let frame = f.blocks.pop().unwrap();
    trim_bounds_stacks(f);
    debug_assert!(!frame.label.has_sites());
    if deadend {
        f.truncate_operands(frame.saved_operands);
        if let Some(ty) = frame.ty {
            f.push_operand(Operand::TempReg {
                ty,
                reg: Reg::RESULT,
                zero_ext: false,
            });
        }
    }
    Ok(deadend)
}

fn gen_if(f: &mut Func<'_>, load: &mut Loader<'_>) -> Result<bool, CodegenError> {
    let ty = block_type(load.varint7()?)?;
    let cond_op = f.pop_operand(opcodes::IF)?;
    if cond_op.ty() != Type::I32 {
        return Err(CodegenError::TypeMismatch {
            op: opcodes::IF,
            found: cond_op.ty(),
        });
    }
    f.op_spill_operands()?;
    let cond = to_branch_cond(f, opcodes::IF, cond_op)?;
    f.op_flush_vars()?;

    let mut else_label = Label::new();
    emit_branch_cond(f, cond.negated(), &mut else_label);

    f.blocks.push(Block {
        kind: BlockKind::If,
        ty,
        label: Label::new(),
        else_label: Some(else_label),
        saved_operands: f.operands.len(),
    });

    let (term, deadend) = gen_ops(f, load)?;
    match term {
        opcodes::ELSE => {
            if !deadend {
                if let Some(_ty) = ty {
                    let x = f.pop_operand(opcodes::ELSE)?;
                    f.op_move(Reg::RESULT, x, false)?;
                }
                f.op_flush_vars()?;
                let site = f.op_jump_stub();
                f.blocks.last_mut().unwrap().label.add_site(site);
            }
            let saved = f.blocks.last().unwrap().saved_operands;
            f.truncate_operands(saved);
            f.op_reset_var_caches();
            let mut else_label = f.blocks.last_mut().unwrap().else_label.take().unwrap();
            else_label.bind(&mut f.text);

            let (term, deadend) = gen_ops(f, load)?;
            if term != opcodes::END {
                return Err(CodegenError::InvalidOpcode(term.0));
            }
            end_frame(f, opcodes::IF, deadend)
        }

        opcodes::END => {
            // No else arm: the false path arrives at the end label, so the
            // merge is always reachable.
            if !deadend {
                f.op_flush_vars()?;
            }
            let mut frame = f.blocks.pop().unwrap();
            trim_bounds_stacks(f);
            if deadend {
                f.truncate_operands(frame.saved_operands);
            }
            f.op_reset_var_caches();
            frame.else_label.take().unwrap().bind(&mut f.text);
            frame.label.bind(&mut f.text);
            Ok(false)
        }

        other => Err(CodegenError::InvalidOpcode(other.0)),
    }
}

/// Close a block-like frame at its `end`: merge the fallthrough value with
/// any branch values in the result register, bind the end label, and
/// surface the frame's result operand.
fn end_frame(f: &mut Func<'_>, op: Opcode, deadend: bool) -> Result<bool, CodegenError> {
    let mut frame = f.blocks.pop().unwrap();
    trim_bounds_stacks(f);

    if !deadend {
        if !frame.label.has_sites() {
            // No branches out of the frame: the fallthrough value stays
            // wherever the body left it.
            return Ok(false);
        }
        if let Some(_ty) = frame.ty {
            let x = f.pop_operand(op)?;
            f.op_move(Reg::RESULT, x, false)?;
        }
        f.op_flush_vars()?;
        f.op_reset_var_caches();
        debug_assert_eq!(f.operands.len(), frame.saved_operands);
        frame.label.bind(&mut f.text);
        if let Some(ty) = frame.ty {
            f.push_operand(Operand::TempReg {
                ty,
                reg: Reg::RESULT,
                zero_ext: false,
            });
        }
        Ok(false)
    } else {
        f.truncate_operands(frame.saved_operands);
        if frame.label.has_sites() {
            f.op_reset_var_caches();
            frame.label.bind(&mut f.text);
            if let Some(ty) = frame.ty {
                f.push_operand(Operand::TempReg {
                    ty,
                    reg: Reg::RESULT,
                    zero_ext: false,
                });
            }
            Ok(false)
        } else {
            if let Some(ty) = frame.ty {
                f.push_operand(Operand::TempReg {
                    ty,
                    reg: Reg::RESULT,
                    zero_ext: false,
                });
            }
            Ok(true)
        }
    }
}

/// Resolve a popped i32 condition operand into a branchable condition,
/// materializing and testing it unless it already lives in flags.
fn to_branch_cond(
    f: &mut Func<'_>,
    op: Opcode,
    x: Operand,
) -> Result<Cond, CodegenError> {
    if let Operand::Flags { cond } = x {
        return Ok(cond);
    }
    f.op_persist_flags(op)?;
    let x = f.op_materialize(op, x)?;
    let reg = x.reg().unwrap();
    insn::TEST.reg_reg(&mut f.text, Type::I32, reg, reg);
    if let Operand::TempReg { ty, reg, .. } = x {
        f.regs.free(crate::types::category(ty), reg);
    }
    Ok(Cond::Ne)
}

/// Emit a conditional branch to a label, as a stub when the label is
/// unbound. Float equality needs a parity guard; float inequality branches
/// on either flag.
fn emit_branch_cond(f: &mut Func<'_>, cond: Cond, label: &mut Label) {
    match cond.cc() {
        Some(cc) => {
            if label.addr != 0 {
                f.op_jcc_to_addr(cc, label.addr);
            } else {
                let site = f.op_jcc_stub(cc);
                label.add_site(site);
            }
        }
        None => match cond {
            Cond::OrderedAndEq => {
                insn::JP_CB.rel8(&mut f.text, 0);
                let guard = f.text.addr();
                if label.addr != 0 {
                    f.op_jcc_to_addr(insn::CcInsn::EQ, label.addr);
                } else {
                    let site = f.op_jcc_stub(insn::CcInsn::EQ);
                    label.add_site(site);
                }
                let after = f.text.addr();
                f.text.update_branch_site8(guard, after);
            }
            Cond::UnorderedOrNe => {
                for cc in [insn::CcInsn::NE, insn::CcInsn::PARITY] {
                    if label.addr != 0 {
                        f.op_jcc_to_addr(cc, label.addr);
                    } else {
                        let site = f.op_jcc_stub(cc);
                        label.add_site(site);
                    }
                }
            }
            _ => unreachable!(),
        },
    }
}

/// Emit a short conditional branch whose 8-bit displacement(s) the caller
/// patches once the target is reached.
pub(crate) fn emit_branch_cond_rel8(
    f: &mut Func<'_>,
    cond: Cond,
) -> SmallVec<[i32; 2]> {
    let mut sites = SmallVec::new();
    match cond.cc() {
        Some(cc) => {
            cc.jcc_opcode_cb().rel8(&mut f.text, 0);
            sites.push(f.text.addr());
        }
        None => match cond {
            Cond::OrderedAndEq => {
                // Jump only when ordered and equal: skip on parity first.
                insn::JP_CB.rel8(&mut f.text, 2);
                insn::JE_CB.rel8(&mut f.text, 0);
                sites.push(f.text.addr());
            }
            Cond::UnorderedOrNe => {
                insn::JNE_CB.rel8(&mut f.text, 0);
                sites.push(f.text.addr());
                insn::JP_CB.rel8(&mut f.text, 0);
                sites.push(f.text.addr());
            }
            _ => unreachable!(),
        },
    }
    sites
}

/// Value-bounds knowledge inferred inside a block does not survive it.
fn trim_bounds_stacks(f: &mut Func<'_>) {
    let depth = f.blocks.len();
    for v in &mut f.vars {
        v.trim_bounds_stack(depth);
    }
}

fn resolve_frame(f: &Func<'_>, op: Opcode, depth: u32) -> Result<usize, CodegenError> {
    f.blocks
        .len()
        .checked_sub(1 + depth as usize)
        .ok_or(CodegenError::out_of_bounds(op, "branch depth", depth))
}

/// Whether a branch to this frame carries a value in the result register.
fn frame_carries_value(f: &Func<'_>, idx: usize) -> Option<Type> {
    let frame = &f.blocks[idx];
    match frame.kind {
        BlockKind::Loop => None,
        _ => frame.ty,
    }
}

/// Copy an operand's value into the result register without consuming the
/// operand or clobbering flags; used on the taken path of conditional
/// branches.
fn copy_to_result(f: &mut Func<'_>, x: Operand) -> Result<(), CodegenError> {
    match x {
        Operand::Stack { ty } => {
            // The operand is on top of the operand stack, so its slot is
            // the top of the machine stack.
            if ty.is_float() {
                insn::MOVSSD.reg_mem_disp(&mut f.text, ty, Reg::RESULT, Reg::RSP, 0);
            } else {
                insn::MOV.reg_mem_disp(&mut f.text, ty, Reg::RESULT, Reg::RSP, 0);
            }
            Ok(())
        }
        Operand::TempReg { ty, reg, .. } | Operand::VarReg { ty, reg, .. } => {
            if reg != Reg::RESULT {
                f.op_move_reg(ty, Reg::RESULT, reg);
            }
            Ok(())
        }
        Operand::Flags { .. } => {
            debug_assert!(false, "two live flags operands");
            Ok(())
        }
        _ => f.op_move(Reg::RESULT, x, true).map(|_| ()),
    }
}

/// Branch (always taken) to a frame's target, adjusting the machine stack
/// past operands that die on the way out.
fn emit_frame_jump(f: &mut Func<'_>, idx: usize) {
    let delta = WORD * f.stack_resident_above(f.blocks[idx].saved_operands);
    if delta > 0 {
        insn::ADDI.reg_imm(&mut f.text, Type::I64, Reg::RSP, delta);
    }
    let addr = f.blocks[idx].label.addr;
    if addr != 0 {
        f.op_jump_to_addr(addr);
    } else {
        let site = f.op_jump_stub();
        f.blocks[idx].label.add_site(site);
    }
}

fn gen_br(
    f: &mut Func<'_>,
    load: &mut Loader<'_>,
    op: Opcode,
    _info: OpInfo,
) -> Result<bool, CodegenError> {
    let depth = load.varuint32()?;
    let idx = resolve_frame(f, op, depth)?;

    if frame_carries_value(f, idx).is_some() {
        let x = f.pop_operand(op)?;
        f.op_move(Reg::RESULT, x, false)?;
    }
    f.op_flush_vars()?;
    emit_frame_jump(f, idx);
    Ok(true)
}

fn gen_br_if(
    f: &mut Func<'_>,
    load: &mut Loader<'_>,
    op: Opcode,
    _info: OpInfo,
) -> Result<bool, CodegenError> {
    let depth = load.varuint32()?;
    let cond_op = f.pop_operand(op)?;
    let cond = to_branch_cond(f, op, cond_op)?;
    let idx = resolve_frame(f, op, depth)?;

    if frame_carries_value(f, idx).is_some() {
        let x = *f
            .operands
            .last()
            .ok_or(CodegenError::StackUnderflow { op })?;
        copy_to_result(f, x)?;
    }
    f.op_flush_vars()?;

    let delta = WORD * f.stack_resident_above(f.blocks[idx].saved_operands);
    if delta == 0 {
        let addr = f.blocks[idx].label.addr;
        match cond.cc() {
            Some(cc) if addr != 0 => f.op_jcc_to_addr(cc, addr),
            _ => {
                // Route through a local label so the float conditions and
                // unbound targets share one path.
                let mut label = std::mem::take(&mut f.blocks[idx].label);
                emit_branch_cond(f, cond, &mut label);
                f.blocks[idx].label = label;
            }
        }
    } else {
        let sites = emit_branch_cond_rel8(f, cond.negated());
        insn::ADDI.reg_imm(&mut f.text, Type::I64, Reg::RSP, delta);
        let addr = f.blocks[idx].label.addr;
        if addr != 0 {
            f.op_jump_to_addr(addr);
        } else {
            let site = f.op_jump_stub();
            f.blocks[idx].label.add_site(site);
        }
        let after = f.text.addr();
        for site in sites {
            f.text.update_branch_site8(site, after);
        }
    }
    Ok(false)
}

fn gen_br_table(
    f: &mut Func<'_>,
    load: &mut Loader<'_>,
    op: Opcode,
    _info: OpInfo,
) -> Result<bool, CodegenError> {
    let count = load.varuint32()?;
    let mut depths = Vec::with_capacity(count as usize);
    for _ in 0..count {
        depths.push(load.varuint32()?);
    }
    let default_depth = load.varuint32()?;

    let index_op = f.pop_operand(op)?;
    if index_op.ty() != Type::I32 {
        return Err(CodegenError::TypeMismatch {
            op,
            found: index_op.ty(),
        });
    }
    f.op_persist_flags(op)?;
    let index_op = f.op_materialize(op, index_op)?;
    let index_reg = index_op.reg().unwrap();

    let default_idx = resolve_frame(f, op, default_depth)?;
    if frame_carries_value(f, default_idx).is_some() {
        let x = f.pop_operand(op)?;
        f.op_move(Reg::RESULT, x, true)?;
    }
    f.op_flush_vars()?;

    // A compare chain; targets needing a stack adjustment go through a
    // local trampoline emitted after the chain.
    let mut trampolines: Vec<(i32, usize)> = Vec::new();
    for (i, &depth) in depths.iter().enumerate() {
        let idx = resolve_frame(f, op, depth)?;
        insn::CMPI.reg_imm(&mut f.text, Type::I32, index_reg, i as i32);
        let delta = WORD * f.stack_resident_above(f.blocks[idx].saved_operands);
        if delta == 0 {
            let mut label = std::mem::take(&mut f.blocks[idx].label);
            emit_branch_cond(f, Cond::Eq, &mut label);
            f.blocks[idx].label = label;
        } else {
            insn::JE_CB.rel8(&mut f.text, 0);
            trampolines.push((f.text.addr(), idx));
        }
    }
    emit_frame_jump(f, default_idx);

    for (site, idx) in trampolines {
        let here = f.text.addr();
        f.text.update_branch_site8(site, here);
        emit_frame_jump(f, idx);
    }

    if let Operand::TempReg { ty, reg, .. } = index_op {
        f.regs.free(crate::types::category(ty), reg);
    }
    Ok(true)
}

fn gen_return(
    f: &mut Func<'_>,
    _load: &mut Loader<'_>,
    op: Opcode,
    _info: OpInfo,
) -> Result<bool, CodegenError> {
    if f.sig.result.is_some() {
        let x = f.pop_operand(op)?;
        f.op_move(Reg::RESULT, x, false)?;
    }
    f.op_epilogue();
    Ok(true)
}

fn gen_unreachable(
    f: &mut Func<'_>,
    _load: &mut Loader<'_>,
    _op: Opcode,
    _info: OpInfo,
) -> Result<bool, CodegenError> {
    f.op_trap_call(TrapId::Unreachable);
    Ok(true)
}

fn gen_nop(
    _f: &mut Func<'_>,
    _load: &mut Loader<'_>,
    _op: Opcode,
    _info: OpInfo,
) -> Result<bool, CodegenError> {
    Ok(false)
}

fn gen_drop(
    f: &mut Func<'_>,
    _load: &mut Loader<'_>,
    op: Opcode,
    _info: OpInfo,
) -> Result<bool, CodegenError> {
    let x = f.pop_operand(op)?;
    match x {
        Operand::TempReg { ty, reg, .. } => {
            f.regs.free(crate::types::category(ty), reg);
        }
        Operand::Stack { .. } => {
            insn::LEA.reg_mem_disp(&mut f.text, Type::I64, Reg::RSP, Reg::RSP, WORD);
            f.stack_offset -= WORD;
        }
        _ => {}
    }
    Ok(false)
}

fn gen_select(
    f: &mut Func<'_>,
    _load: &mut Loader<'_>,
    op: Opcode,
    _info: OpInfo,
) -> Result<bool, CodegenError> {
    let cond_op = f.pop_operand(op)?;
    let cond = to_branch_cond(f, op, cond_op)?;
    let b = f.pop_operand(op)?;
    let a = f.pop_operand(op)?;
    if a.ty() != b.ty() {
        return Err(CodegenError::TypeMismatch { op, found: b.ty() });
    }
    let ty = a.ty();

    // The machine stack is LIFO: resolve the upper operand (b) first.
    let b = f.op_materialize(op, b)?;
    let b_reg = b.reg().unwrap();
    let (a_reg, a_ze) = f.op_owned_reg(op, a)?;

    match cond.negated().cc() {
        Some(ncc) if !ty.is_float() => {
            ncc.cmovcc_opcode().reg_reg(&mut f.text, ty, a_reg, b_reg);
        }
        _ => {
            let sites = emit_branch_cond_rel8(f, cond);
            f.op_move_reg(ty, a_reg, b_reg);
            let after = f.text.addr();
            for site in sites {
                f.text.update_branch_site8(site, after);
            }
        }
    }

    if let Operand::TempReg { ty: bt, reg, .. } = b {
        f.regs.free(crate::types::category(bt), reg);
    }
    f.push_operand(Operand::TempReg {
        ty,
        reg: a_reg,
        zero_ext: a_ze && !ty.is_float(),
    });
    Ok(false)
}

fn gen_bad(
    _f: &mut Func<'_>,
    _load: &mut Loader<'_>,
    op: Opcode,
    _info: OpInfo,
) -> Result<bool, CodegenError> {
    Err(CodegenError::InvalidOpcode(op.0))
}

// Skip routines.

fn skip_nothing(_: &mut Loader<'_>, _: Opcode) -> Result<(), CodegenError> {
    Ok(())
}

fn skip_varuint32(l: &mut Loader<'_>, _: Opcode) -> Result<(), CodegenError> {
    l.varuint32().map(|_| ())
}

fn skip_varint32(l: &mut Loader<'_>, _: Opcode) -> Result<(), CodegenError> {
    l.varint32().map(|_| ())
}

fn skip_varint64(l: &mut Loader<'_>, _: Opcode) -> Result<(), CodegenError> {
    l.varint64().map(|_| ())
}

fn skip_uint32(l: &mut Loader<'_>, _: Opcode) -> Result<(), CodegenError> {
    l.read(4).map(|_| ())
}

fn skip_uint64(l: &mut Loader<'_>, _: Opcode) -> Result<(), CodegenError> {
    l.read(8).map(|_| ())
}

fn skip_varuint1(l: &mut Loader<'_>, _: Opcode) -> Result<(), CodegenError> {
    l.byte().map(|_| ())
}

fn skip_memory_immediate(l: &mut Loader<'_>, _: Opcode) -> Result<(), CodegenError> {
    l.varuint32()?;
    l.varuint32().map(|_| ())
}

fn skip_br_table(l: &mut Loader<'_>, _: Opcode) -> Result<(), CodegenError> {
    let n = l.varuint32()?;
    for _ in 0..n {
        l.varuint32()?;
    }
    l.varuint32().map(|_| ())
}

fn skip_call_indirect(l: &mut Loader<'_>, _: Opcode) -> Result<(), CodegenError> {
    l.varuint32()?;
    l.byte().map(|_| ())
}

fn bad_skip(_: &mut Loader<'_>, op: Opcode) -> Result<(), CodegenError> {
    Err(CodegenError::InvalidOpcode(op.0))
}

// The tables. Unassigned opcodes dispatch to the bad handler; the block
// subsystem's opcodes never reach the table (see gen_ops).

use opers::*;

const fn opcode_impls() -> [OpImpl; 256] {
    const BAD: OpImpl = OpImpl {
        gen: gen_bad,
        info: OpInfo::NONE,
    };
    const fn op(gen: GenFn, info: OpInfo) -> OpImpl {
        OpImpl { gen, info }
    }
    const fn plain(gen: GenFn) -> OpImpl {
        OpImpl {
            gen,
            info: OpInfo::NONE,
        }
    }
    const I32: u8 = Type::I32 as u8;
    const I64: u8 = Type::I64 as u8;
    const F32: u8 = Type::F32 as u8;
    const F64: u8 = Type::F64 as u8;

    let mut t = [BAD; 256];
    t[0x00] = plain(gen_unreachable);
    t[0x01] = plain(gen_nop);
    // 0x02..=0x05 (block, loop, if, else) and 0x0b (end) are handled by
    // the block subsystem.
    t[0x0c] = plain(gen_br);
    t[0x0d] = plain(gen_br_if);
    t[0x0e] = plain(gen_br_table);
    t[0x0f] = plain(gen_return);
    t[0x10] = plain(call::gen_call);
    t[0x11] = plain(call::gen_call_indirect);
    t[0x1a] = plain(gen_drop);
    t[0x1b] = plain(gen_select);
    t[0x20] = plain(local::gen_get_local);
    t[0x21] = plain(local::gen_set_local);
    t[0x22] = plain(local::gen_tee_local);
    t[0x23] = plain(memory::gen_get_global);
    t[0x24] = plain(memory::gen_set_global);

    t[0x28] = op(memory::gen_load, OpInfo::new(I32, 0, LOAD));
    t[0x29] = op(memory::gen_load, OpInfo::new(I64, 0, LOAD));
    t[0x2a] = op(memory::gen_load, OpInfo::new(F32, 0, LOAD));
    t[0x2b] = op(memory::gen_load, OpInfo::new(F64, 0, LOAD));
    t[0x2c] = op(memory::gen_load, OpInfo::new(I32, 0, LOAD8_S));
    t[0x2d] = op(memory::gen_load, OpInfo::new(I32, 0, LOAD8_U));
    t[0x2e] = op(memory::gen_load, OpInfo::new(I32, 0, LOAD16_S));
    t[0x2f] = op(memory::gen_load, OpInfo::new(I32, 0, LOAD16_U));
    t[0x30] = op(memory::gen_load, OpInfo::new(I64, 0, LOAD8_S));
    t[0x31] = op(memory::gen_load, OpInfo::new(I64, 0, LOAD8_U));
    t[0x32] = op(memory::gen_load, OpInfo::new(I64, 0, LOAD16_S));
    t[0x33] = op(memory::gen_load, OpInfo::new(I64, 0, LOAD16_U));
    t[0x34] = op(memory::gen_load, OpInfo::new(I64, 0, LOAD32_S));
    t[0x35] = op(memory::gen_load, OpInfo::new(I64, 0, LOAD32_U));
    t[0x36] = op(memory::gen_store, OpInfo::new(I32, 0, STORE));
    t[0x37] = op(memory::gen_store, OpInfo::new(I64, 0, STORE));
    t[0x38] = op(memory::gen_store, OpInfo::new(F32, 0, STORE));
    t[0x39] = op(memory::gen_store, OpInfo::new(F64, 0, STORE));
    t[0x3a] = op(memory::gen_store, OpInfo::new(I32, 0, STORE8));
    t[0x3b] = op(memory::gen_store, OpInfo::new(I32, 0, STORE16));
    t[0x3c] = op(memory::gen_store, OpInfo::new(I64, 0, STORE8));
    t[0x3d] = op(memory::gen_store, OpInfo::new(I64, 0, STORE16));
    t[0x3e] = op(memory::gen_store, OpInfo::new(I64, 0, STORE32));
    t[0x3f] = plain(memory::gen_current_memory);
    t[0x40] = plain(memory::gen_grow_memory);

    t[0x41] = op(arith::gen_const, OpInfo::new(I32, 0, 0));
    t[0x42] = op(arith::gen_const, OpInfo::new(I64, 0, 0));
    t[0x43] = op(arith::gen_const, OpInfo::new(F32, 0, 0));
    t[0x44] = op(arith::gen_const, OpInfo::new(F64, 0, 0));

    t[0x45] = op(arith::gen_unary_condition, OpInfo::new(I32, 0, 0));
    t[0x46] = op(arith::gen_binary_condition_commute, OpInfo::new(I32, 0, EQ));
    t[0x47] = op(arith::gen_binary_condition_commute, OpInfo::new(I32, 0, NE));
    t[0x48] = op(arith::gen_binary_condition, OpInfo::new(I32, 0, LT_S));
    t[0x49] = op(arith::gen_binary_condition, OpInfo::new(I32, 0, LT_U));
    t[0x4a] = op(arith::gen_binary_condition, OpInfo::new(I32, 0, GT_S));
    t[0x4b] = op(arith::gen_binary_condition, OpInfo::new(I32, 0, GT_U));
    t[0x4c] = op(arith::gen_binary_condition, OpInfo::new(I32, 0, LE_S));
    t[0x4d] = op(arith::gen_binary_condition, OpInfo::new(I32, 0, LE_U));
    t[0x4e] = op(arith::gen_binary_condition, OpInfo::new(I32, 0, GE_S));
    t[0x4f] = op(arith::gen_binary_condition, OpInfo::new(I32, 0, GE_U));
    t[0x50] = op(arith::gen_unary_condition, OpInfo::new(I64, 0, 0));
    t[0x51] = op(arith::gen_binary_condition_commute, OpInfo::new(I64, 0, EQ));
    t[0x52] = op(arith::gen_binary_condition_commute, OpInfo::new(I64, 0, NE));
    t[0x53] = op(arith::gen_binary_condition, OpInfo::new(I64, 0, LT_S));
    t[0x54] = op(arith::gen_binary_condition, OpInfo::new(I64, 0, LT_U));
    t[0x55] = op(arith::gen_binary_condition, OpInfo::new(I64, 0, GT_S));
    t[0x56] = op(arith::gen_binary_condition, OpInfo::new(I64, 0, GT_U));
    t[0x57] = op(arith::gen_binary_condition, OpInfo::new(I64, 0, LE_S));
    t[0x58] = op(arith::gen_binary_condition, OpInfo::new(I64, 0, LE_U));
    t[0x59] = op(arith::gen_binary_condition, OpInfo::new(I64, 0, GE_S));
    t[0x5a] = op(arith::gen_binary_condition, OpInfo::new(I64, 0, GE_U));
    t[0x5b] = op(arith::gen_binary_condition_commute, OpInfo::new(F32, 0, FEQ));
    t[0x5c] = op(arith::gen_binary_condition_commute, OpInfo::new(F32, 0, FNE));
    t[0x5d] = op(arith::gen_binary_condition, OpInfo::new(F32, 0, FLT));
    t[0x5e] = op(arith::gen_binary_condition, OpInfo::new(F32, 0, FGT));
    t[0x5f] = op(arith::gen_binary_condition, OpInfo::new(F32, 0, FLE));
    t[0x60] = op(arith::gen_binary_condition, OpInfo::new(F32, 0, FGE));
    t[0x61] = op(arith::gen_binary_condition_commute, OpInfo::new(F64, 0, FEQ));
    t[0x62] = op(arith::gen_binary_condition_commute, OpInfo::new(F64, 0, FNE));
    t[0x63] = op(arith::gen_binary_condition, OpInfo::new(F64, 0, FLT));
    t[0x64] = op(arith::gen_binary_condition, OpInfo::new(F64, 0, FGT));
    t[0x65] = op(arith::gen_binary_condition, OpInfo::new(F64, 0, FLE));
    t[0x66] = op(arith::gen_binary_condition, OpInfo::new(F64, 0, FGE));

    t[0x67] = op(arith::gen_unary, OpInfo::new(I32, 0, CLZ));
    t[0x68] = op(arith::gen_unary, OpInfo::new(I32, 0, CTZ));
    t[0x69] = op(arith::gen_unary, OpInfo::new(I32, 0, POPCNT));
    t[0x6a] = op(arith::gen_binary_commute, OpInfo::new(I32, 0, ADD));
    t[0x6b] = op(arith::gen_binary, OpInfo::new(I32, 0, SUB));
    t[0x6c] = op(arith::gen_binary_commute, OpInfo::new(I32, 0, MUL));
    t[0x6d] = op(arith::gen_binary, OpInfo::new(I32, 0, DIV_S));
    t[0x6e] = op(arith::gen_binary, OpInfo::new(I32, 0, DIV_U));
    t[0x6f] = op(arith::gen_binary, OpInfo::new(I32, 0, REM_S));
    t[0x70] = op(arith::gen_binary, OpInfo::new(I32, 0, REM_U));
    t[0x71] = op(arith::gen_binary_commute, OpInfo::new(I32, 0, AND));
    t[0x72] = op(arith::gen_binary_commute, OpInfo::new(I32, 0, OR));
    t[0x73] = op(arith::gen_binary_commute, OpInfo::new(I32, 0, XOR));
    t[0x74] = op(arith::gen_binary, OpInfo::new(I32, 0, SHL));
    t[0x75] = op(arith::gen_binary, OpInfo::new(I32, 0, SHR_S));
    t[0x76] = op(arith::gen_binary, OpInfo::new(I32, 0, SHR_U));
    t[0x77] = op(arith::gen_binary, OpInfo::new(I32, 0, ROTL));
    t[0x78] = op(arith::gen_binary, OpInfo::new(I32, 0, ROTR));
    t[0x79] = op(arith::gen_unary, OpInfo::new(I64, 0, CLZ));
    t[0x7a] = op(arith::gen_unary, OpInfo::new(I64, 0, CTZ));
    t[0x7b] = op(arith::gen_unary, OpInfo::new(I64, 0, POPCNT));
    t[0x7c] = op(arith::gen_binary_commute, OpInfo::new(I64, 0, ADD));
    t[0x7d] = op(arith::gen_binary, OpInfo::new(I64, 0, SUB));
    t[0x7e] = op(arith::gen_binary_commute, OpInfo::new(I64, 0, MUL));
    t[0x7f] = op(arith::gen_binary, OpInfo::new(I64, 0, DIV_S));
    t[0x80] = op(arith::gen_binary, OpInfo::new(I64, 0, DIV_U));
    t[0x81] = op(arith::gen_binary, OpInfo::new(I64, 0, REM_S));
    t[0x82] = op(arith::gen_binary, OpInfo::new(I64, 0, REM_U));
    t[0x83] = op(arith::gen_binary_commute, OpInfo::new(I64, 0, AND));
    t[0x84] = op(arith::gen_binary_commute, OpInfo::new(I64, 0, OR));
    t[0x85] = op(arith::gen_binary_commute, OpInfo::new(I64, 0, XOR));
    t[0x86] = op(arith::gen_binary, OpInfo::new(I64, 0, SHL));
    t[0x87] = op(arith::gen_binary, OpInfo::new(I64, 0, SHR_S));
    t[0x88] = op(arith::gen_binary, OpInfo::new(I64, 0, SHR_U));
    t[0x89] = op(arith::gen_binary, OpInfo::new(I64, 0, ROTL));
    t[0x8a] = op(arith::gen_binary, OpInfo::new(I64, 0, ROTR));

    t[0x8b] = op(arith::gen_unary, OpInfo::new(F32, 0, ABS));
    t[0x8c] = op(arith::gen_unary, OpInfo::new(F32, 0, NEG));
    t[0x8d] = op(arith::gen_unary, OpInfo::new(F32, 0, CEIL));
    t[0x8e] = op(arith::gen_unary, OpInfo::new(F32, 0, FLOOR));
    t[0x8f] = op(arith::gen_unary, OpInfo::new(F32, 0, TRUNC));
    t[0x90] = op(arith::gen_unary, OpInfo::new(F32, 0, NEAREST));
    t[0x91] = op(arith::gen_unary, OpInfo::new(F32, 0, SQRT));
    t[0x92] = op(arith::gen_binary_commute, OpInfo::new(F32, 0, ADD));
    t[0x93] = op(arith::gen_binary, OpInfo::new(F32, 0, SUB));
    t[0x94] = op(arith::gen_binary_commute, OpInfo::new(F32, 0, MUL));
    t[0x95] = op(arith::gen_binary, OpInfo::new(F32, 0, DIV));
    t[0x96] = op(arith::gen_binary_commute, OpInfo::new(F32, 0, MIN));
    t[0x97] = op(arith::gen_binary_commute, OpInfo::new(F32, 0, MAX));
    t[0x98] = op(arith::gen_binary, OpInfo::new(F32, 0, COPYSIGN));
    t[0x99] = op(arith::gen_unary, OpInfo::new(F64, 0, ABS));
    t[0x9a] = op(arith::gen_unary, OpInfo::new(F64, 0, NEG));
    t[0x9b] = op(arith::gen_unary, OpInfo::new(F64, 0, CEIL));
    t[0x9c] = op(arith::gen_unary, OpInfo::new(F64, 0, FLOOR));
    t[0x9d] = op(arith::gen_unary, OpInfo::new(F64, 0, TRUNC));
    t[0x9e] = op(arith::gen_unary, OpInfo::new(F64, 0, NEAREST));
    t[0x9f] = op(arith::gen_unary, OpInfo::new(F64, 0, SQRT));
    t[0xa0] = op(arith::gen_binary_commute, OpInfo::new(F64, 0, ADD));
    t[0xa1] = op(arith::gen_binary, OpInfo::new(F64, 0, SUB));
    t[0xa2] = op(arith::gen_binary_commute, OpInfo::new(F64, 0, MUL));
    t[0xa3] = op(arith::gen_binary, OpInfo::new(F64, 0, DIV));
    t[0xa4] = op(arith::gen_binary_commute, OpInfo::new(F64, 0, MIN));
    t[0xa5] = op(arith::gen_binary_commute, OpInfo::new(F64, 0, MAX));
    t[0xa6] = op(arith::gen_binary, OpInfo::new(F64, 0, COPYSIGN));

    t[0xa7] = op(convert::gen_conversion, OpInfo::new(I32, I64, WRAP));
    t[0xa8] = op(convert::gen_conversion, OpInfo::new(I32, F32, TRUNC_S));
    t[0xa9] = op(convert::gen_conversion, OpInfo::new(I32, F32, TRUNC_U));
    t[0xaa] = op(convert::gen_conversion, OpInfo::new(I32, F64, TRUNC_S));
    t[0xab] = op(convert::gen_conversion, OpInfo::new(I32, F64, TRUNC_U));
    t[0xac] = op(convert::gen_conversion, OpInfo::new(I64, I32, EXTEND_S));
    t[0xad] = op(convert::gen_conversion, OpInfo::new(I64, I32, EXTEND_U));
    t[0xae] = op(convert::gen_conversion, OpInfo::new(I64, F32, TRUNC_S));
    t[0xaf] = op(convert::gen_conversion, OpInfo::new(I64, F32, TRUNC_U));
    t[0xb0] = op(convert::gen_conversion, OpInfo::new(I64, F64, TRUNC_S));
    t[0xb1] = op(convert::gen_conversion, OpInfo::new(I64, F64, TRUNC_U));
    t[0xb2] = op(convert::gen_conversion, OpInfo::new(F32, I32, CONVERT_S));
    t[0xb3] = op(convert::gen_conversion, OpInfo::new(F32, I32, CONVERT_U));
    t[0xb4] = op(convert::gen_conversion, OpInfo::new(F32, I64, CONVERT_S));
    t[0xb5] = op(convert::gen_conversion, OpInfo::new(F32, I64, CONVERT_U));
    t[0xb6] = op(convert::gen_conversion, OpInfo::new(F32, F64, DEMOTE));
    t[0xb7] = op(convert::gen_conversion, OpInfo::new(F64, I32, CONVERT_S));
    t[0xb8] = op(convert::gen_conversion, OpInfo::new(F64, I32, CONVERT_U));
    t[0xb9] = op(convert::gen_conversion, OpInfo::new(F64, I64, CONVERT_S));
    t[0xba] = op(convert::gen_conversion, OpInfo::new(F64, I64, CONVERT_U));
    t[0xbb] = op(convert::gen_conversion, OpInfo::new(F64, F32, PROMOTE));
    t[0xbc] = op(convert::gen_conversion, OpInfo::new(I32, F32, REINTERPRET));
    t[0xbd] = op(convert::gen_conversion, OpInfo::new(I64, F64, REINTERPRET));
    t[0xbe] = op(convert::gen_conversion, OpInfo::new(F32, I32, REINTERPRET));
    t[0xbf] = op(convert::gen_conversion, OpInfo::new(F64, I64, REINTERPRET));
    t
}

static OPCODE_IMPLS: [OpImpl; 256] = opcode_impls();

const fn opcode_skips() -> [SkipFn; 256] {
    let mut t: [SkipFn; 256] = [bad_skip; 256];
    t[0x00] = skip_nothing;
    t[0x01] = skip_nothing;
    t[0x02] = skip_nothing; // consumed by skip_ops
    t[0x03] = skip_nothing;
    t[0x04] = skip_nothing;
    t[0x05] = skip_nothing;
    t[0x0b] = skip_nothing;
    t[0x0c] = skip_varuint32;
    t[0x0d] = skip_varuint32;
    t[0x0e] = skip_br_table;
    t[0x0f] = skip_nothing;
    t[0x10] = skip_varuint32;
    t[0x11] = skip_call_indirect;
    t[0x1a] = skip_nothing;
    t[0x1b] = skip_nothing;
    t[0x20] = skip_varuint32;
    t[0x21] = skip_varuint32;
    t[0x22] = skip_varuint32;
    t[0x23] = skip_varuint32;
    t[0x24] = skip_varuint32;
    let mut i = 0x28;
    while i <= 0x3e {
        t[i] = skip_memory_immediate;
        i += 1;
    }
    t[0x3f] = skip_varuint1;
    t[0x40] = skip_varuint1;
    t[0x41] = skip_varint32;
    t[0x42] = skip_varint64;
    t[0x43] = skip_uint32;
    t[0x44] = skip_uint64;
    let mut i = 0x45;
    while i <= 0xbf {
        t[i] = skip_nothing;
        i += 1;
    }
    t
}

static OPCODE_SKIPS: [SkipFn; 256] = opcode_skips();
