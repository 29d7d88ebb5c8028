//! Link sites: addresses that get patched once a branch or call target is
//! known.

use smallvec::SmallVec;
use sunbeam_asm_x64::TextBuffer;

/// A branch or call target with its pending displacement sites.
///
/// `addr` is 0 until the target is bound. Each site is the address of the
/// byte following a 32-bit displacement field (the instruction's
/// fall-through address); the relation is a plain offset list, never a
/// pointer graph.
#[derive(Default)]
pub struct Label {
    pub addr: i32,
    sites: SmallVec<[i32; 4]>,
}

impl Label {
    pub fn new() -> Self {
        Label::default()
    }

    pub fn add_site(&mut self, site_addr: i32) {
        self.sites.push(site_addr);
    }

    pub fn sites(&self) -> &[i32] {
        &self.sites
    }

    pub fn has_sites(&self) -> bool {
        !self.sites.is_empty()
    }

    /// Bind the label to the current text address and patch every pending
    /// site.
    pub fn bind(&mut self, text: &mut TextBuffer) {
        self.addr = text.addr();
        for &site in &self.sites {
            text.update_branch_site(site, self.addr);
        }
        self.sites.clear();
    }
}

/// A call site recorded for the module linker: the emitted `CALL`'s
/// return address, to be patched when the callee's address is resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallSite {
    pub func_index: u32,
    pub ret_addr: i32,
}

/// Traps reachable from generated code; each has a per-function link
/// object merged by the module linker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum TrapId {
    Unreachable = 0,
    CallStackExhausted,
    IndirectCallIndexOutOfBounds,
    IndirectCallSignatureMismatch,
    IntegerDivideByZero,
    IntegerOverflow,
    InvalidConversionToInteger,
}

pub const NUM_TRAPS: usize = TrapId::InvalidConversionToInteger as usize + 1;

/// Runtime routines called out of line; like traps, each is a link object
/// resolved by the module linker. They preserve all registers except the
/// integer result register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum RuntimeFunc {
    CurrentMemory = 0,
    GrowMemory,
}

pub const NUM_RUNTIME_FUNCS: usize = RuntimeFunc::GrowMemory as usize + 1;
