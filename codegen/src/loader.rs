//! Reader for a validated WebAssembly function body.
//!
//! Integer immediates use LEB128; float immediates are little-endian bits.
//! The reader does no validation beyond bounds and LEB termination; the
//! bytecode is assumed to have passed module validation.

use crate::error::CodegenError;

pub struct Loader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Loader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Loader { bytes, pos: 0 }
    }

    /// True when the whole body has been consumed.
    pub fn done(&self) -> bool {
        self.pos == self.bytes.len()
    }

    pub fn byte(&mut self) -> Result<u8, CodegenError> {
        let b = *self
            .bytes
            .get(self.pos)
            .ok_or(CodegenError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(b)
    }

    pub fn read(&mut self, n: usize) -> Result<&'a [u8], CodegenError> {
        let end = self.pos.checked_add(n).ok_or(CodegenError::UnexpectedEnd)?;
        let s = self
            .bytes
            .get(self.pos..end)
            .ok_or(CodegenError::UnexpectedEnd)?;
        self.pos = end;
        Ok(s)
    }

    pub fn varuint1(&mut self) -> Result<bool, CodegenError> {
        Ok(self.byte()? & 1 != 0)
    }

    pub fn varuint32(&mut self) -> Result<u32, CodegenError> {
        let mut result: u32 = 0;
        let mut shift = 0;
        loop {
            let b = self.byte()?;
            result |= u32::from(b & 0x7f) << shift;
            if b & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
            if shift >= 35 {
                return Err(CodegenError::UnexpectedEnd);
            }
        }
    }

    pub fn varint7(&mut self) -> Result<i8, CodegenError> {
        let b = self.byte()?;
        Ok(((b << 1) as i8) >> 1)
    }

    pub fn varint32(&mut self) -> Result<i32, CodegenError> {
        let mut result: i32 = 0;
        let mut shift = 0;
        loop {
            let b = self.byte()?;
            result |= i32::from(b & 0x7f) << shift;
            shift += 7;
            if b & 0x80 == 0 {
                if shift < 32 && b & 0x40 != 0 {
                    result |= -1 << shift;
                }
                return Ok(result);
            }
            if shift >= 35 {
                return Err(CodegenError::UnexpectedEnd);
            }
        }
    }

    pub fn varint64(&mut self) -> Result<i64, CodegenError> {
        let mut result: i64 = 0;
        let mut shift = 0;
        loop {
            let b = self.byte()?;
            result |= i64::from(b & 0x7f) << shift;
            shift += 7;
            if b & 0x80 == 0 {
                if shift < 64 && b & 0x40 != 0 {
                    result |= -1 << shift;
                }
                return Ok(result);
            }
            if shift >= 70 {
                return Err(CodegenError::UnexpectedEnd);
            }
        }
    }

    /// Raw little-endian 32 bits (f32 immediates).
    pub fn uint32(&mut self) -> Result<u32, CodegenError> {
        let s = self.read(4)?;
        Ok(u32::from_le_bytes([s[0], s[1], s[2], s[3]]))
    }

    /// Raw little-endian 64 bits (f64 immediates).
    pub fn uint64(&mut self) -> Result<u64, CodegenError> {
        let s = self.read(8)?;
        Ok(u64::from_le_bytes([
            s[0], s[1], s[2], s[3], s[4], s[5], s[6], s[7],
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leb128_unsigned() {
        let mut l = Loader::new(&[0x00, 0x7f, 0xe5, 0x8e, 0x26, 0xff, 0xff, 0xff, 0xff, 0x0f]);
        assert_eq!(l.varuint32().unwrap(), 0);
        assert_eq!(l.varuint32().unwrap(), 127);
        assert_eq!(l.varuint32().unwrap(), 624485);
        assert_eq!(l.varuint32().unwrap(), u32::MAX);
        assert!(l.done());
    }

    #[test]
    fn leb128_signed() {
        let mut l = Loader::new(&[0x2a, 0x7f, 0x9b, 0xf1, 0x59, 0x80, 0x80, 0x80, 0x80, 0x78]);
        assert_eq!(l.varint32().unwrap(), 42);
        assert_eq!(l.varint32().unwrap(), -1);
        assert_eq!(l.varint32().unwrap(), -624485);
        assert_eq!(l.varint32().unwrap(), i32::MIN);
    }

    #[test]
    fn signed_64() {
        let mut l = Loader::new(&[
            0x7f, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x7f,
        ]);
        assert_eq!(l.varint64().unwrap(), -1);
        assert_eq!(l.varint64().unwrap(), i64::MIN);
    }

    #[test]
    fn truncated_input_is_an_error() {
        let mut l = Loader::new(&[0x80]);
        assert!(l.varuint32().is_err());
    }
}
