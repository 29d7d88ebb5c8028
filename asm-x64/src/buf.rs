//! The growable machine-code buffer that encoders write into.

use crate::Size;
use thiserror::Error;

/// An error recorded during instruction emission.
///
/// Encoding errors do not abort emission: they are appended to the buffer's
/// error list and the walk continues, so one pass can surface many issues.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// A packed-SSE opcode table has no entry for the requested element size.
    #[error("missing encoding for op {op:#x} size {size:?} at addr {addr}")]
    EncodingUnavailable { op: u32, size: Size, addr: i32 },

    /// The text buffer grew past its configured limit.
    #[error("text buffer limit of {limit} bytes exceeded at addr {addr}")]
    Overflow { limit: usize, addr: i32 },
}

/// Position-dependent machine code under construction.
///
/// `addr` is the offset of the next byte to be written; branch displacements
/// are computed against it. The buffer grows past its limit rather than
/// aborting, recording an [`EncodeError::Overflow`] instead, so a codegen
/// pass can always run to completion and report everything it found.
pub struct TextBuffer {
    bytes: Vec<u8>,
    limit: usize,
    errors: Vec<EncodeError>,
}

impl TextBuffer {
    /// Create a buffer that records an overflow error when it grows past
    /// `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        TextBuffer {
            bytes: Vec::new(),
            limit,
            errors: Vec::new(),
        }
    }

    /// Offset of the next byte to be emitted.
    #[inline]
    pub fn addr(&self) -> i32 {
        self.bytes.len() as i32
    }

    /// The emitted machine code.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Errors accumulated during emission.
    pub fn errors(&self) -> &[EncodeError] {
        &self.errors
    }

    /// Record an emission error without aborting.
    pub fn err(&mut self, e: EncodeError) {
        self.errors.push(e);
    }

    /// Append `n` bytes and return the writable window.
    pub fn extend(&mut self, n: usize) -> &mut [u8] {
        let start = self.bytes.len();
        if start + n > self.limit {
            let (limit, addr) = (self.limit, self.addr());
            self.err(EncodeError::Overflow { limit, addr });
        }
        self.bytes.resize(start + n, 0);
        &mut self.bytes[start..]
    }

    /// Append a single byte.
    #[inline]
    pub fn put_byte(&mut self, b: u8) {
        self.extend(1)[0] = b;
    }

    /// Consume the buffer, yielding the emitted code and the error list.
    pub fn into_parts(self) -> (Vec<u8>, Vec<EncodeError>) {
        (self.bytes, self.errors)
    }

    /// Patch the 32-bit displacement field ending at `site_addr` so the
    /// branch or call lands on `target_addr`. `site_addr` is the address of
    /// the byte following the displacement, i.e. the return/fall-through
    /// address originally recorded for the site.
    pub fn update_branch_site(&mut self, site_addr: i32, target_addr: i32) {
        let disp = target_addr - site_addr;
        let end = site_addr as usize;
        self.bytes[end - 4..end].copy_from_slice(&disp.to_le_bytes());
    }

    /// Patch an 8-bit displacement field ending at `site_addr`; the target
    /// must be within signed-8 range of the site.
    pub fn update_branch_site8(&mut self, site_addr: i32, target_addr: i32) {
        let disp = target_addr - site_addr;
        debug_assert!(i8::try_from(disp).is_ok(), "local branch out of range");
        self.bytes[site_addr as usize - 1] = disp as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_is_recorded_not_fatal() {
        let mut text = TextBuffer::with_limit(4);
        text.extend(3);
        assert!(text.errors().is_empty());
        text.extend(3);
        assert_eq!(text.bytes().len(), 6);
        assert!(matches!(
            text.errors(),
            [EncodeError::Overflow { limit: 4, addr: 3 }]
        ));
    }

    #[test]
    fn branch_site_patching() {
        let mut text = TextBuffer::with_limit(64);
        text.extend(6); // e.g. a near Jcc stub occupying [0, 6)
        text.extend(10);
        text.update_branch_site(6, 16);
        assert_eq!(&text.bytes()[2..6], &10i32.to_le_bytes());
    }
}
