//! The x86-64 macro layer: operand moves, spills, swaps, and the stack,
//! trap and call plumbing shared by the opcode handlers.
//!
//! Conventions baked in here: `rax`/`xmm0` carry results, `rcx`/`xmm1` are
//! scratch (`rcx` doubles as the shift count and the indirect-call entry
//! walker), `r13` is the stack limit, `r14` the linear-memory base and
//! `r15` the indirect-call table base. Stack-pointer adjustments on paths
//! where a flags operand may be live use `LEA`, which leaves the flags
//! register untouched.

use crate::error::CodegenError;
use crate::func::{Func, WORD};
use crate::links::{RuntimeFunc, TrapId};
use crate::opcodes::Opcode;
use crate::operand::{Cond, Operand};
use crate::types::{category, Category, Type};
use log::trace;
use sunbeam_asm_x64::{insn, insn::CcInsn, Reg, Scale};

impl<'m> Func<'m> {
    /// Dereference a `VarRef` to the local's cache when the cache is
    /// materialized; a slot-resident local resolves to the reference
    /// itself (a stack access at the local's slot).
    pub(crate) fn effective_operand(&self, x: Operand) -> Operand {
        if let Operand::VarRef { index, .. } = x {
            let cache = self.vars[index as usize].cache;
            match cache {
                Operand::Imm { .. } | Operand::VarReg { .. } => return cache,
                _ => {}
            }
        }
        x
    }

    /// Emit the minimal instructions that place `x`'s value into `target`.
    /// Returns whether a 64-bit destination is known to be zero-extended
    /// from a 32-bit write. A `TempReg` source is released.
    pub(crate) fn op_move(
        &mut self,
        target: Reg,
        x: Operand,
        preserve_flags: bool,
    ) -> Result<bool, CodegenError> {
        match x {
            Operand::Imm { ty, val } => Ok(self.op_move_imm(target, ty, val, preserve_flags)),

            Operand::VarRef { ty, index } => {
                let cache = self.vars[index as usize].cache;
                match cache {
                    Operand::Imm { .. } | Operand::VarReg { .. } => {
                        self.op_move(target, cache, preserve_flags)
                    }
                    _ => {
                        let disp = self.var_mem_disp(index);
                        if ty.is_float() {
                            insn::MOVSSD.reg_mem_disp(&mut self.text, ty, target, Reg::RSP, disp);
                            Ok(false)
                        } else {
                            insn::MOV.reg_mem_disp(&mut self.text, ty, target, Reg::RSP, disp);
                            Ok(!ty.is_64())
                        }
                    }
                }
            }

            Operand::VarReg {
                ty, reg, zero_ext, ..
            } => {
                if reg == target {
                    Ok(zero_ext)
                } else {
                    self.op_move_reg(ty, target, reg);
                    Ok(!ty.is_float())
                }
            }

            Operand::TempReg { ty, reg, zero_ext } => {
                let ze = if reg == target {
                    zero_ext
                } else {
                    self.op_move_reg(ty, target, reg);
                    self.regs.free(category(ty), reg);
                    !ty.is_float()
                };
                Ok(ze)
            }

            Operand::Stack { ty } => {
                if ty.is_float() {
                    insn::MOVSSD.reg_mem_disp(&mut self.text, ty, target, Reg::RSP, 0);
                    // LEA leaves the flags register alone.
                    insn::LEA.reg_mem_disp(&mut self.text, Type::I64, Reg::RSP, Reg::RSP, WORD);
                } else {
                    insn::POPO.reg(&mut self.text, target);
                }
                self.stack_offset -= WORD;
                Ok(false)
            }

            Operand::Flags { cond } => {
                self.op_setcc(cond, target);
                Ok(true)
            }

            Operand::Nowhere { .. } => {
                debug_assert!(false, "moving a nowhere operand");
                Ok(false)
            }
        }
    }

    fn op_move_imm(&mut self, target: Reg, ty: Type, val: i64, preserve_flags: bool) -> bool {
        if ty.is_float() {
            if val == 0 {
                insn::XORPSD.reg_reg(&mut self.text, ty, target, target);
                return false;
            }
            let int_ty = if ty.is_64() { Type::I64 } else { Type::I32 };
            self.op_load_imm_scratch(int_ty, val);
            insn::MOVDQ.reg_reg(&mut self.text, int_ty, target, Reg::SCRATCH);
            false
        } else if val == 0 && !preserve_flags {
            insn::XOR.reg_reg(&mut self.text, Type::I32, target, target);
            true
        } else if !ty.is_64() {
            insn::MOVI.reg_imm32(&mut self.text, Type::I32, target, val as i32);
            true
        } else if val == (val as i32) as i64 {
            insn::MOVI.reg_imm32(&mut self.text, Type::I64, target, val as i32);
            false
        } else {
            insn::MOV64I.reg_imm64(&mut self.text, target, val);
            false
        }
    }

    /// Load an immediate into the integer scratch register without
    /// touching flags.
    pub(crate) fn op_load_imm_scratch(&mut self, ty: Type, val: i64) {
        if !ty.is_64() || val == (val as i32) as i64 {
            insn::MOVI.reg_imm32(&mut self.text, ty, Reg::SCRATCH, val as i32);
        } else {
            insn::MOV64I.reg_imm64(&mut self.text, Reg::SCRATCH, val);
        }
    }

    /// Plain register-to-register move; does not release the source.
    pub(crate) fn op_move_reg(&mut self, ty: Type, target: Reg, source: Reg) {
        if ty.is_float() {
            insn::MOVAPSD.reg_reg(&mut self.text, ty, target, source);
        } else {
            insn::MOV.reg_reg(&mut self.text, ty, target, source);
        }
    }

    /// Exchange two registers of a bank.
    pub(crate) fn op_swap(&mut self, cat: Category, a: Reg, b: Reg) {
        match cat {
            Category::Int => insn::XCHG.reg_reg(&mut self.text, Type::I64, a, b),
            Category::Float => {
                insn::MOVAPSD.reg_reg(&mut self.text, Type::F32, Reg::SCRATCH, a);
                insn::MOVAPSD.reg_reg(&mut self.text, Type::F32, a, b);
                insn::MOVAPSD.reg_reg(&mut self.text, Type::F32, b, Reg::SCRATCH);
            }
        }
    }

    /// Materialize a condition into a register as 0 or 1. The float
    /// conditions fold the parity flag in with a short branch so that no
    /// second register is needed.
    pub(crate) fn op_setcc(&mut self, cond: Cond, target: Reg) {
        match cond.cc() {
            Some(cc) => {
                cc.setcc_opcode().one_size_reg(&mut self.text, target);
            }
            None => match cond {
                Cond::OrderedAndEq => {
                    insn::SETE.one_size_reg(&mut self.text, target);
                    insn::JNP_CB.rel8(&mut self.text, 0);
                    let site = self.text.addr();
                    insn::XOR.reg_reg(&mut self.text, Type::I32, target, target);
                    let here = self.text.addr();
                    self.text.update_branch_site8(site, here);
                }
                Cond::UnorderedOrNe => {
                    insn::SETNE.one_size_reg(&mut self.text, target);
                    insn::JNP_CB.rel8(&mut self.text, 0);
                    let site = self.text.addr();
                    insn::ORI.reg_imm(&mut self.text, Type::I32, target, 1);
                    let here = self.text.addr();
                    self.text.update_branch_site8(site, here);
                }
                _ => unreachable!(),
            },
        }
        insn::MOVZX8.reg_reg(&mut self.text, Type::I32, target, target);
    }

    /// Allocate a register, spilling operands (and then register-cached
    /// locals) until one frees up.
    pub(crate) fn op_alloc_reg(&mut self, op: Opcode, ty: Type) -> Result<Reg, CodegenError> {
        let cat = category(ty);
        if let Some(r) = self.regs.alloc(cat) {
            return Ok(r);
        }

        for i in 0..self.operands.len() {
            let x = self.operands[i];
            if let Operand::TempReg { ty: t, .. } = x {
                if category(t) == cat {
                    trace!("steal: spilling operand #{i}");
                    self.op_push(x)?;
                    self.operands[i] = Operand::Stack { ty: t };
                    return Ok(self.regs.alloc(cat).unwrap());
                }
            }
        }

        for i in 0..self.vars.len() {
            let cache = self.vars[i].cache;
            if let Operand::VarReg { ty: t, reg, .. } = cache {
                if category(t) == cat {
                    trace!("steal: evicting variable #{i} cache");
                    if self.vars[i].dirty {
                        self.op_store_var(i as u32, cache)?;
                    }
                    self.vars[i].reset_cache();
                    self.regs.free(cat, reg);
                    return Ok(self.regs.alloc(cat).unwrap());
                }
            }
        }

        Err(CodegenError::RegistersExhausted { op })
    }

    /// Move an operand into a fresh temporary register unless it is
    /// already register-resident.
    pub(crate) fn op_materialize(
        &mut self,
        op: Opcode,
        x: Operand,
    ) -> Result<Operand, CodegenError> {
        match x {
            Operand::TempReg { .. } | Operand::VarReg { .. } => Ok(x),
            _ => {
                let ty = x.ty();
                let reg = self.op_alloc_reg(op, ty)?;
                let zero_ext = self.op_move(reg, x, true)?;
                Ok(Operand::TempReg { ty, reg, zero_ext })
            }
        }
    }

    /// Like [`Func::op_materialize`], but always yields a register this
    /// handler owns and may clobber: a register-cached local is copied out
    /// instead of aliased.
    pub(crate) fn op_owned_reg(
        &mut self,
        op: Opcode,
        x: Operand,
    ) -> Result<(Reg, bool), CodegenError> {
        match x {
            Operand::TempReg { reg, zero_ext, .. } => Ok((reg, zero_ext)),
            _ => {
                let ty = x.ty();
                let reg = self.op_alloc_reg(op, ty)?;
                let zero_ext = self.op_move(reg, x, true)?;
                Ok((reg, zero_ext))
            }
        }
    }

    /// Spill one operand to its machine-stack slot. Reference-count
    /// bookkeeping for `VarRef` operands is the caller's business.
    pub(crate) fn op_push(&mut self, x: Operand) -> Result<(), CodegenError> {
        match x {
            Operand::Imm { val, .. } => {
                if val == (val as i32) as i64 {
                    insn::PUSHI.imm(&mut self.text, val as i32);
                } else {
                    insn::MOV64I.reg_imm64(&mut self.text, Reg::SCRATCH, val);
                    insn::PUSHO.reg(&mut self.text, Reg::SCRATCH);
                }
            }

            Operand::VarRef { ty, index } => {
                let cache = self.vars[index as usize].cache;
                match cache {
                    Operand::Imm { .. } => return self.op_push(cache),
                    Operand::VarReg { reg, .. } => self.op_push_reg(ty, reg),
                    _ => {
                        let disp = self.var_mem_disp(index);
                        insn::PUSH.mem_disp(&mut self.text, Type::I32, Reg::RSP, disp);
                    }
                }
            }

            Operand::TempReg { ty, reg, .. } => {
                self.op_push_reg(ty, reg);
                self.regs.free(category(ty), reg);
            }

            Operand::Flags { cond } => {
                self.op_setcc(cond, Reg::SCRATCH);
                insn::PUSHO.reg(&mut self.text, Reg::SCRATCH);
            }

            Operand::Stack { .. } | Operand::Nowhere { .. } | Operand::VarReg { .. } => {
                debug_assert!(false, "pushing an unspillable operand");
            }
        }
        self.grow_stack_offset(WORD);
        Ok(())
    }

    fn op_push_reg(&mut self, ty: Type, reg: Reg) {
        if ty.is_float() {
            insn::LEA.reg_mem_disp(&mut self.text, Type::I64, Reg::RSP, Reg::RSP, -WORD);
            insn::MOVSSDMR.reg_mem_disp(&mut self.text, ty, reg, Reg::RSP, 0);
        } else {
            insn::PUSHO.reg(&mut self.text, reg);
        }
    }

    /// Copy one machine-stack word to another slot through the scratch
    /// register.
    pub(crate) fn op_copy_stack(&mut self, target_offset: i32, source_offset: i32) {
        insn::MOV.reg_mem_disp(
            &mut self.text,
            Type::I64,
            Reg::SCRATCH,
            Reg::RSP,
            source_offset,
        );
        insn::MOVMR.reg_mem_disp(
            &mut self.text,
            Type::I64,
            Reg::SCRATCH,
            Reg::RSP,
            target_offset,
        );
    }

    /// Store an operand's value to a machine-stack slot without consuming
    /// machine-stack state; the operand must not itself be `Stack`.
    pub(crate) fn op_store_stack(&mut self, target_offset: i32, x: Operand) {
        match x {
            Operand::Imm { ty, val } => {
                if val == (val as i32) as i64 {
                    let w = if ty.is_64() { Type::I64 } else { Type::I32 };
                    insn::MOV32I.mem_disp_imm(&mut self.text, w, Reg::RSP, target_offset, val);
                } else {
                    insn::MOV64I.reg_imm64(&mut self.text, Reg::SCRATCH, val);
                    insn::MOVMR.reg_mem_disp(
                        &mut self.text,
                        Type::I64,
                        Reg::SCRATCH,
                        Reg::RSP,
                        target_offset,
                    );
                }
            }

            Operand::VarRef { index, .. } => {
                // A materialized cache was already substituted by
                // effective_operand; this is a slot-to-slot copy.
                let disp = self.var_mem_disp(index);
                self.op_copy_stack(target_offset, disp);
            }

            Operand::VarReg { ty, reg, .. } | Operand::TempReg { ty, reg, .. } => {
                if ty.is_float() {
                    insn::MOVSSDMR.reg_mem_disp(&mut self.text, ty, reg, Reg::RSP, target_offset);
                } else {
                    insn::MOVMR.reg_mem_disp(&mut self.text, ty, reg, Reg::RSP, target_offset);
                }
            }

            Operand::Flags { cond } => {
                self.op_setcc(cond, Reg::SCRATCH);
                insn::MOVMR.reg_mem_disp(
                    &mut self.text,
                    Type::I32,
                    Reg::SCRATCH,
                    Reg::RSP,
                    target_offset,
                );
            }

            Operand::Stack { .. } | Operand::Nowhere { .. } => {
                debug_assert!(false, "storing an unaddressable operand");
            }
        }
    }

    /// Store a value into a local's stack slot, marking the slot
    /// initialized. A `TempReg` source is released; a `Stack` source is
    /// popped.
    pub(crate) fn op_store_var(&mut self, index: u32, x: Operand) -> Result<(), CodegenError> {
        match x {
            Operand::Imm { ty, val } => {
                let disp = self.var_mem_disp(index);
                if val == (val as i32) as i64 {
                    let w = if ty.is_64() { Type::I64 } else { Type::I32 };
                    insn::MOV32I.mem_disp_imm(&mut self.text, w, Reg::RSP, disp, val);
                } else {
                    insn::MOV64I.reg_imm64(&mut self.text, Reg::SCRATCH, val);
                    insn::MOVMR.reg_mem_disp(&mut self.text, Type::I64, Reg::SCRATCH, Reg::RSP, disp);
                }
            }

            Operand::VarReg { ty, reg, .. } => {
                let disp = self.var_mem_disp(index);
                self.op_store_var_reg(ty, reg, disp);
            }

            Operand::TempReg { ty, reg, .. } => {
                let disp = self.var_mem_disp(index);
                self.op_store_var_reg(ty, reg, disp);
                self.regs.free(category(ty), reg);
            }

            Operand::Stack { .. } => {
                insn::POPO.reg(&mut self.text, Reg::SCRATCH);
                self.stack_offset -= WORD;
                let disp = self.var_mem_disp(index);
                insn::MOVMR.reg_mem_disp(&mut self.text, Type::I64, Reg::SCRATCH, Reg::RSP, disp);
            }

            Operand::VarRef { ty, index: other } => {
                let x = self.effective_operand(x);
                if let Operand::VarRef { .. } = x {
                    let source = self.var_mem_disp(other);
                    insn::MOV.reg_mem_disp(&mut self.text, ty, Reg::SCRATCH, Reg::RSP, source);
                    let disp = self.var_mem_disp(index);
                    self.op_store_var_reg(ty, Reg::SCRATCH, disp);
                } else {
                    return self.op_store_var(index, x);
                }
            }

            Operand::Flags { cond } => {
                self.op_setcc(cond, Reg::SCRATCH);
                let disp = self.var_mem_disp(index);
                insn::MOVMR.reg_mem_disp(&mut self.text, Type::I32, Reg::SCRATCH, Reg::RSP, disp);
            }

            Operand::Nowhere { .. } => {
                debug_assert!(false, "storing a nowhere operand");
            }
        }
        self.vars[index as usize].init = true;
        Ok(())
    }

    fn op_store_var_reg(&mut self, ty: Type, reg: Reg, disp: i32) {
        if ty.is_float() {
            insn::MOVSSDMR.reg_mem_disp(&mut self.text, ty, reg, Reg::RSP, disp);
        } else {
            insn::MOVMR.reg_mem_disp(&mut self.text, ty, reg, Reg::RSP, disp);
        }
    }

    /// Write the deferred zero (or constant) initializers of locals whose
    /// slot has never been stored.
    pub(crate) fn op_init_vars(&mut self) -> Result<(), CodegenError> {
        for i in self.num_params..self.vars.len() {
            if self.vars[i].init {
                continue;
            }
            let cache = self.vars[i].cache;
            if let Operand::Imm { .. } = cache {
                trace!("initializing variable #{i}");
                self.op_store_var(i as u32, cache)?;
                self.vars[i].dirty = false;
            }
        }
        Ok(())
    }

    /// Spill every temporary-register and flags operand to the machine
    /// stack.
    pub(crate) fn op_save_temporary_operands(&mut self) -> Result<(), CodegenError> {
        for i in 0..self.operands.len() {
            let x = self.operands[i];
            match x {
                Operand::TempReg { ty, .. } => {
                    trace!("saving temporary operand #{i}");
                    self.op_push(x)?;
                    self.operands[i] = Operand::Stack { ty };
                }
                Operand::Flags { .. } => {
                    trace!("saving flags operand #{i}");
                    self.op_push(x)?;
                    self.operands[i] = Operand::Stack { ty: Type::I32 };
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Write back dirty register-cached locals; the caches stay valid.
    pub(crate) fn op_store_reg_vars(&mut self) -> Result<(), CodegenError> {
        for i in 0..self.vars.len() {
            let cache = self.vars[i].cache;
            if let Operand::VarReg { ty, reg, .. } = cache {
                if self.vars[i].dirty {
                    trace!("storing register variable #{i}");
                    let disp = self.var_mem_disp(i as u32);
                    self.op_store_var_reg(ty, reg, disp);
                    self.vars[i].dirty = false;
                    self.vars[i].init = true;
                }
            }
        }
        Ok(())
    }

    /// Drop every register-backed local cache; the registers were already
    /// stored and freed.
    pub(crate) fn op_forget_reg_vars(&mut self) {
        for i in 0..self.vars.len() {
            if let Operand::VarReg { .. } = self.vars[i].cache {
                trace!("forgetting register variable #{i}");
                self.vars[i].reset_cache();
            }
        }
    }

    /// Synchronize every dirty local cache with its stack slot, keeping
    /// the caches; emits only plain moves, so a live flags operand
    /// survives.
    pub(crate) fn op_flush_vars(&mut self) -> Result<(), CodegenError> {
        for i in 0..self.vars.len() {
            if !self.vars[i].dirty {
                continue;
            }
            let cache = self.vars[i].cache;
            match cache {
                Operand::Imm { .. } => {
                    self.op_store_var(i as u32, cache)?;
                    self.vars[i].dirty = false;
                }
                Operand::VarReg { ty, reg, .. } => {
                    let disp = self.var_mem_disp(i as u32);
                    self.op_store_var_reg(ty, reg, disp);
                    self.vars[i].dirty = false;
                    self.vars[i].init = true;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Reset every local cache to its stack slot, releasing cache
    /// registers. Used when binding a merge point: the state on every
    /// incoming path must agree, and "all locals in their slots" is the
    /// state branches were flushed to.
    pub(crate) fn op_reset_var_caches(&mut self) {
        for i in 0..self.vars.len() {
            let cache = self.vars[i].cache;
            match cache {
                Operand::VarReg { ty, reg, .. } => {
                    debug_assert!(!self.vars[i].dirty);
                    self.regs.free(category(ty), reg);
                    self.vars[i].reset_cache();
                }
                Operand::Imm { .. } => {
                    debug_assert!(!self.vars[i].dirty);
                    self.vars[i].reset_cache();
                }
                _ => {}
            }
        }
    }

    /// Materialize the (at most one) live flags operand ahead of
    /// flag-clobbering emission.
    pub(crate) fn op_persist_flags(&mut self, op: Opcode) -> Result<(), CodegenError> {
        for i in 0..self.operands.len() {
            if let Operand::Flags { cond } = self.operands[i] {
                let reg = self.op_alloc_reg(op, Type::I32)?;
                self.op_setcc(cond, reg);
                self.operands[i] = Operand::TempReg {
                    ty: Type::I32,
                    reg,
                    zero_ext: true,
                };
                break;
            }
        }
        Ok(())
    }

    /// Relocate a temporary operand out of a specific register ahead of a
    /// sequence that clobbers it (division, calls).
    pub(crate) fn op_save_reg(
        &mut self,
        op: Opcode,
        cat: Category,
        reg: Reg,
    ) -> Result<(), CodegenError> {
        for i in 0..self.operands.len() {
            let x = self.operands[i];
            if let Operand::TempReg { ty, reg: r, zero_ext } = x {
                if r == reg && category(ty) == cat {
                    if let Some(new) = self.regs.alloc(cat) {
                        trace!("relocating operand #{i} out of {reg}");
                        self.op_move_reg(ty, new, r);
                        self.operands[i] = Operand::TempReg {
                            ty,
                            reg: new,
                            zero_ext,
                        };
                    } else {
                        trace!("spilling operand #{i} out of {reg}");
                        self.op_push(x)?;
                        self.operands[i] = Operand::Stack { ty };
                    }
                    break;
                }
            }
        }
        Ok(())
    }

    /// Spill every operand that is not an immediate to the machine stack.
    /// Run at control-frame entry so that operands below a merge point
    /// have path-independent storage.
    pub(crate) fn op_spill_operands(&mut self) -> Result<(), CodegenError> {
        for i in 0..self.operands.len() {
            let x = self.operands[i];
            match x {
                Operand::VarRef { ty, index } => {
                    self.op_push(x)?;
                    self.vars[index as usize].ref_count -= 1;
                    self.operands[i] = Operand::Stack { ty };
                }
                Operand::TempReg { ty, .. } => {
                    self.op_push(x)?;
                    self.operands[i] = Operand::Stack { ty };
                }
                Operand::Flags { .. } => {
                    self.op_push(x)?;
                    self.operands[i] = Operand::Stack { ty: Type::I32 };
                }
                Operand::Imm { .. } | Operand::Stack { .. } | Operand::Nowhere { .. } => {}
                Operand::VarReg { .. } => {
                    debug_assert!(false, "VarReg should never appear on the operand stack");
                }
            }
        }
        Ok(())
    }

    /// Grow the machine stack without touching flags.
    pub(crate) fn op_advance_stack_ptr(&mut self, n: i32) {
        insn::LEA.reg_mem_disp(&mut self.text, Type::I64, Reg::RSP, Reg::RSP, -n);
        self.grow_stack_offset(n);
    }

    /// Release machine stack consumed by call arguments.
    pub(crate) fn op_backoff_stack_ptr(&mut self, n: i32) {
        if n > 0 {
            insn::ADDI.reg_imm(&mut self.text, Type::I64, Reg::RSP, n);
            self.stack_offset -= n;
        }
    }

    /// Compare the stack pointer against the stack-limit register and trap
    /// on exhaustion.
    pub(crate) fn op_stack_check(&mut self) {
        insn::CMP.reg_reg(&mut self.text, Type::I64, Reg::RSP, Reg::R13);
        insn::JA_CB.rel8(&mut self.text, 5);
        self.op_trap_call(TrapId::CallStackExhausted);
    }

    /// A 5-byte call to a trap's link object; a stub with a recorded site
    /// while the trap address is unresolved.
    pub(crate) fn op_trap_call(&mut self, trap: TrapId) {
        let addr = self.trap_links[trap as usize].addr;
        if addr != 0 {
            insn::CALL_CD.addr32(&mut self.text, addr);
        } else {
            insn::CALL_CD.stub32(&mut self.text);
            let site = self.text.addr();
            self.trap_links[trap as usize].add_site(site);
        }
    }

    /// Call an out-of-line runtime routine. The routine preserves all
    /// registers except the integer result register.
    pub(crate) fn op_runtime_call(&mut self, func: RuntimeFunc) {
        let addr = self.runtime_links[func as usize].addr;
        if addr != 0 {
            insn::CALL_CD.addr32(&mut self.text, addr);
        } else {
            insn::CALL_CD.stub32(&mut self.text);
            let site = self.text.addr();
            self.runtime_links[func as usize].add_site(site);
        }
        let ret_addr = self.text.addr();
        self.map_call_addr(ret_addr);
        if self.stack_offset + WORD > self.max_stack_offset {
            self.max_stack_offset = self.stack_offset + WORD;
        }
    }

    /// Call a function's link object: a direct displacement when resolved,
    /// a stub plus a recorded call site otherwise.
    pub(crate) fn op_call(&mut self, func_index: u32) {
        let addr = self.module.func_addrs[func_index as usize];
        if addr != 0 {
            insn::CALL_CD.addr32(&mut self.text, addr);
        } else {
            insn::CALL_CD.stub32(&mut self.text);
            let ret_addr = self.text.addr();
            self.call_sites.push(crate::links::CallSite {
                func_index,
                ret_addr,
            });
        }
        let ret_addr = self.text.addr();
        self.map_call_addr(ret_addr);
    }

    /// The indirect-call thunk: bounds-check the table index (in the
    /// result register) against the table length, load the 64-bit entry
    /// (signature index in the low half, function address in the high
    /// half), validate the signature, and call through the scratch
    /// register.
    pub(crate) fn op_call_indirect(&mut self, table_len: i32, sig_index: i32) {
        // The index arrived through moves or swaps that may not have
        // zero-extended it.
        insn::MOV.reg_reg(&mut self.text, Type::I32, Reg::RESULT, Reg::RESULT);
        insn::CMPI.reg_imm(&mut self.text, Type::I32, Reg::RESULT, table_len);
        insn::JB_CB.rel8(&mut self.text, 5);
        self.op_trap_call(TrapId::IndirectCallIndexOutOfBounds);
        insn::MOV.reg_mem_index_disp(
            &mut self.text,
            Type::I64,
            Reg::SCRATCH,
            Reg::R15,
            Reg::RESULT,
            Scale::S3,
            0,
        );
        insn::CMPI.reg_imm(&mut self.text, Type::I32, Reg::SCRATCH, sig_index);
        insn::JE_CB.rel8(&mut self.text, 5);
        self.op_trap_call(TrapId::IndirectCallSignatureMismatch);
        insn::SHRI.reg_imm8(&mut self.text, Type::I64, Reg::SCRATCH, 32);
        insn::CALLIND.reg(&mut self.text, Type::I32, Reg::SCRATCH);
        let ret_addr = self.text.addr();
        self.map_call_addr(ret_addr);
    }

    /// Unconditional jump to a known address, short form when it fits.
    pub(crate) fn op_jump_to_addr(&mut self, addr: i32) {
        let disp = addr - (self.text.addr() + 2);
        if i8::try_from(disp).is_ok() {
            insn::JMP_CB.addr8(&mut self.text, addr);
        } else {
            insn::JMP_CD.addr32(&mut self.text, addr);
        }
    }

    /// Unconditional jump stub; returns the site to patch.
    pub(crate) fn op_jump_stub(&mut self) -> i32 {
        insn::JMP_CD.stub32(&mut self.text);
        self.text.addr()
    }

    /// Conditional jump to a known address.
    pub(crate) fn op_jcc_to_addr(&mut self, cc: CcInsn, addr: i32) {
        cc.jcc_opcode_c().addr(&mut self.text, addr);
    }

    /// Conditional jump stub; returns the site to patch.
    pub(crate) fn op_jcc_stub(&mut self, cc: CcInsn) -> i32 {
        cc.jcc_opcode_c().addr_stub(&mut self.text);
        self.text.addr()
    }

    /// Function epilogue: unwind the locals frame and whatever is still on
    /// the machine stack, then return.
    pub(crate) fn op_epilogue(&mut self) {
        let unwind = self.stack_offset + self.locals_size;
        if unwind > 0 {
            insn::ADDI.reg_imm(&mut self.text, Type::I64, Reg::RSP, unwind);
        }
        insn::RET.simple(&mut self.text);
    }

    /// Zero the upper half of a 64-bit register holding a 32-bit value.
    pub(crate) fn op_zero_extend(&mut self, reg: Reg) {
        insn::MOV.reg_reg(&mut self.text, Type::I32, reg, reg);
    }
}
