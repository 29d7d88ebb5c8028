//! Per-function compilation state.

use crate::error::CodegenError;
use crate::links::{CallSite, Label, NUM_RUNTIME_FUNCS, NUM_TRAPS};
use crate::opcodes::Opcode;
use crate::operand::Operand;
use crate::regalloc::{ParamRegIter, RegAlloc};
use crate::types::{Sig, Type};
use crate::varstate::VarState;
use smallvec::SmallVec;
use sunbeam_asm_x64::{insn, EncodeError, Reg, TextBuffer};

/// Word size of stack slots and table entries.
pub const WORD: i32 = 8;

/// Module metadata shared read-only across concurrent function
/// compilations.
#[derive(Clone, Copy)]
pub struct Module<'m> {
    /// Signature index of each function.
    pub func_sigs: &'m [u32],
    /// Signature table.
    pub sigs: &'m [Sig],
    /// Resolved text address of each function; 0 while unresolved. Calls to
    /// unresolved functions emit stubs and record call sites.
    pub func_addrs: &'m [i32],
    /// Indirect-call table entries (function indices); only the length is
    /// consulted at compile time.
    pub table_funcs: &'m [u32],
    /// Global variable types, stored below the linear-memory base.
    pub globals: &'m [Type],
}

pub(crate) enum BlockKind {
    Block,
    Loop,
    If,
}

/// A control-flow frame.
pub(crate) struct Block {
    pub kind: BlockKind,
    pub ty: Option<Type>,
    /// Branch target: the end label, or the loop start (already bound).
    pub label: Label,
    /// If frames only: the start of the else arm.
    pub else_label: Option<Label>,
    /// Operand-stack depth at frame entry.
    pub saved_operands: usize,
}

/// State of one function compilation, owned exclusively by the compiling
/// thread and consumed when the function-end opcode is reached.
pub struct Func<'m> {
    pub module: Module<'m>,
    pub sig: &'m Sig,

    pub text: TextBuffer,
    pub operands: SmallVec<[Operand; 16]>,
    pub vars: Vec<VarState>,
    pub regs: RegAlloc,

    /// Bytes currently pushed onto the machine stack below the locals
    /// frame.
    pub stack_offset: i32,
    pub max_stack_offset: i32,

    pub(crate) num_params: usize,
    pub(crate) num_stack_params: usize,
    pub(crate) locals_size: i32,

    pub(crate) blocks: Vec<Block>,

    pub(crate) trap_links: [Label; NUM_TRAPS],
    pub(crate) runtime_links: [Label; NUM_RUNTIME_FUNCS],

    call_addrs: Vec<i32>,
    pub(crate) call_sites: Vec<CallSite>,
}

/// The output of one function compilation.
#[derive(Debug)]
pub struct CompiledFunc {
    pub text: Vec<u8>,
    pub encode_errors: Vec<EncodeError>,
    /// Highest machine-stack usage observed, including the return-address
    /// word of calls.
    pub max_stack_offset: i32,
    /// Return address of every emitted call, for unwinding and stack maps.
    pub call_addrs: Vec<i32>,
    /// Call sites pending resolution by the module linker.
    pub call_sites: Vec<CallSite>,
    /// Pending trap-call sites, indexed by [`crate::links::TrapId`].
    pub trap_sites: [Vec<i32>; NUM_TRAPS],
    /// Pending runtime-call sites, indexed by
    /// [`crate::links::RuntimeFunc`].
    pub runtime_sites: [Vec<i32>; NUM_RUNTIME_FUNCS],
}

impl<'m> Func<'m> {
    pub fn new(module: Module<'m>, sig: &'m Sig, text_limit: usize) -> Self {
        Func {
            module,
            sig,
            text: TextBuffer::with_limit(text_limit),
            operands: SmallVec::new(),
            vars: Vec::new(),
            regs: RegAlloc::new(),
            stack_offset: 0,
            max_stack_offset: 0,
            num_params: sig.args.len(),
            num_stack_params: 0,
            locals_size: 0,
            blocks: Vec::new(),
            trap_links: Default::default(),
            runtime_links: Default::default(),
            call_addrs: Vec::new(),
            call_sites: Vec::new(),
        }
    }

    /// Set up the variable table and emit the locals frame. Parameters
    /// mirror the caller's placement: trailing parameters arrive in ABI
    /// registers, the low-indexed overflow on the stack above the return
    /// address.
    pub(crate) fn init_locals(&mut self, local_types: &[Type]) {
        let mut it = ParamRegIter::default();
        self.num_stack_params = it.init(&self.sig.args);

        for (i, &ty) in self.sig.args.iter().enumerate() {
            if i < self.num_stack_params {
                self.vars
                    .push(VarState::new(Operand::Nowhere { ty }, false, true));
            } else {
                let reg = it.forward(crate::types::category(ty));
                self.regs.set_allocated(crate::types::category(ty), reg);
                self.vars.push(VarState::new(
                    Operand::VarReg {
                        ty,
                        index: i as u32,
                        reg,
                        zero_ext: false,
                    },
                    true,
                    true,
                ));
            }
        }

        for &ty in local_types {
            self.vars
                .push(VarState::new(Operand::Imm { ty, val: 0 }, true, false));
        }

        self.locals_size = WORD * (self.vars.len() - self.num_stack_params) as i32;
        if self.locals_size > 0 {
            insn::SUBI.reg_imm(&mut self.text, Type::I64, Reg::RSP, self.locals_size);
        }
    }

    /// Displacement of a local's stack slot from the current stack
    /// pointer.
    pub(crate) fn var_mem_disp(&self, index: u32) -> i32 {
        let index = index as usize;
        if index < self.num_stack_params {
            // Caller-pushed argument slots above the return address;
            // argument 0 is the deepest.
            self.stack_offset
                + self.locals_size
                + WORD
                + WORD * (self.num_stack_params - 1 - index) as i32
        } else {
            self.stack_offset + WORD * (index - self.num_stack_params) as i32
        }
    }

    pub(crate) fn push_operand(&mut self, x: Operand) {
        self.operands.push(x);
    }

    /// Push a logical reference to a local, bumping its reference count.
    pub(crate) fn push_var_ref(&mut self, index: u32) {
        let v = &mut self.vars[index as usize];
        v.ref_count += 1;
        let ty = v.cache.ty();
        self.operands.push(Operand::VarRef {
            ty,
            index,
        });
    }

    pub(crate) fn pop_operand(&mut self, op: Opcode) -> Result<Operand, CodegenError> {
        let x = self
            .operands
            .pop()
            .ok_or(CodegenError::StackUnderflow { op })?;
        if let Operand::VarRef { index, .. } = x {
            self.vars[index as usize].ref_count -= 1;
        }
        Ok(x)
    }

    /// Pop the top `n` operands, returned in stack order (the deepest
    /// first).
    pub(crate) fn pop_operands(
        &mut self,
        op: Opcode,
        n: usize,
    ) -> Result<SmallVec<[Operand; 8]>, CodegenError> {
        if self.operands.len() < n {
            return Err(CodegenError::StackUnderflow { op });
        }
        let mut out: SmallVec<[Operand; 8]> = self.operands.drain(self.operands.len() - n..).collect();
        for x in &mut out {
            if let Operand::VarRef { index, .. } = x {
                self.vars[*index as usize].ref_count -= 1;
            }
        }
        Ok(out)
    }

    /// Discard operands above `len`, releasing registers, references and
    /// spill slots. Used when unwinding dead code at block exits.
    pub(crate) fn truncate_operands(&mut self, len: usize) {
        while self.operands.len() > len {
            match self.operands.pop().unwrap() {
                Operand::TempReg { ty, reg, .. } => {
                    self.regs.free(crate::types::category(ty), reg);
                }
                Operand::VarRef { index, .. } => {
                    self.vars[index as usize].ref_count -= 1;
                }
                Operand::Stack { .. } => {
                    self.stack_offset -= WORD;
                }
                _ => {}
            }
        }
    }

    /// Number of machine-stack-resident operands at or above the given
    /// operand-stack depth.
    pub(crate) fn stack_resident_above(&self, depth: usize) -> i32 {
        self.operands[depth..]
            .iter()
            .filter(|x| matches!(x, Operand::Stack { .. }))
            .count() as i32
    }

    pub(crate) fn grow_stack_offset(&mut self, n: i32) {
        self.stack_offset += n;
        if self.stack_offset > self.max_stack_offset {
            self.max_stack_offset = self.stack_offset;
        }
    }

    /// Record a call's return address for unwinding and stack maps.
    pub fn map_call_addr(&mut self, ret_addr: i32) {
        self.call_addrs.push(ret_addr);
    }

    pub fn finish(self) -> CompiledFunc {
        let (text, encode_errors) = self.text.into_parts();
        CompiledFunc {
            text,
            encode_errors,
            max_stack_offset: self.max_stack_offset,
            call_addrs: self.call_addrs,
            call_sites: self.call_sites,
            trap_sites: self.trap_links.map(|l| l.sites().to_vec()),
            runtime_sites: self.runtime_links.map(|l| l.sites().to_vec()),
        }
    }
}
