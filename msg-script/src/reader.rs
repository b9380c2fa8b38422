use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::{CodecError, Result};

/// Bounds-checked big-endian reader over one record.
///
/// `origin` is the absolute offset of `bytes[0]` inside the script blob and
/// only feeds error messages.
pub(crate) struct ByteReader<'a> {
    cursor: Cursor<&'a [u8]>,
    origin: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8], origin: usize) -> Self {
        Self {
            cursor: Cursor::new(bytes),
            origin,
        }
    }

    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    pub fn remaining(&self) -> usize {
        self.cursor.get_ref().len().saturating_sub(self.position())
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if self.remaining() < needed {
            return Err(CodecError::TruncatedInput {
                offset: self.origin + self.position(),
                needed,
                len: self.origin + self.cursor.get_ref().len(),
            });
        }
        Ok(())
    }

    pub fn u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.cursor.read_u8()?)
    }

    pub fn u16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        Ok(self.cursor.read_u16::<BigEndian>()?)
    }

    pub fn u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.cursor.read_u32::<BigEndian>()?)
    }

    pub fn bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        self.ensure(n)?;
        let mut buf = vec![0u8; n];
        self.cursor.read_exact(&mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_fields() {
        let data = [0x12, 0x00, 0x64, 0xDE, 0xAD, 0xBE, 0xEF];
        let mut r = ByteReader::new(&data, 0);
        assert_eq!(r.u8().unwrap(), 0x12);
        assert_eq!(r.u16().unwrap(), 100);
        assert_eq!(r.u32().unwrap(), 0xDEAD_BEEF);
        assert!(r.is_empty());
    }

    #[test]
    fn short_read_reports_absolute_offset() {
        let data = [0xFB, 0x08, 0x00];
        let mut r = ByteReader::new(&data, 0x40);
        r.u16().unwrap();
        let err = r.u16().unwrap_err();
        match err {
            CodecError::TruncatedInput { offset, needed, len } => {
                assert_eq!(offset, 0x42);
                assert_eq!(needed, 2);
                assert_eq!(len, 0x43);
            }
            other => panic!("unexpected error: {other}"),
        }
        // a failed read leaves the cursor where it was
        assert_eq!(r.position(), 2);
    }
}
