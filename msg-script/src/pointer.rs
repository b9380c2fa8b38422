//! The little-endian u16 offset table in front of every MSG blob.
//!
//! Offsets are relative to the start of the table. The first record starts
//! right after the table, so entry 0 is also the table's byte length.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{CodecError, Result};

pub const ENTRY_SIZE: usize = 2;

/// Byte range of one record, relative to the table start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSpan {
    pub start: usize,
    pub len: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointerTable {
    offsets: Vec<u16>,
}

impl PointerTable {
    pub fn from_offsets(offsets: Vec<u16>) -> Self {
        Self { offsets }
    }

    /// Read the table found at `base` inside `blob`.
    pub fn read(blob: &[u8], base: usize) -> Result<Self> {
        let first = read_entry(blob, base)?;
        if first % 2 != 0 {
            return Err(CodecError::InvalidPointerTable {
                offset: base,
                reason: format!("first entry 0x{first:X} is not a multiple of the entry size"),
            });
        }
        let count = first as usize / ENTRY_SIZE;
        if count == 0 {
            log::warn!("empty pointer table at 0x{base:X}");
        }

        let offsets = (0..count)
            .map(|i| read_entry(blob, base + i * ENTRY_SIZE))
            .collect::<Result<Vec<_>>>()?;
        log::debug!("pointer table at 0x{base:X}: {count} entries");
        Ok(Self { offsets })
    }

    pub fn offsets(&self) -> &[u16] {
        &self.offsets
    }

    pub fn record_count(&self) -> usize {
        self.offsets.len()
    }

    pub fn byte_len(&self) -> usize {
        self.offsets.len() * ENTRY_SIZE
    }

    /// Spans between consecutive entries.
    ///
    /// There are `record_count - 1` of them: the last record has no end
    /// marker in the table and is not covered.
    pub fn spans(&self) -> Result<Vec<RecordSpan>> {
        self.offsets
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                let (start, end) = (pair[0] as usize, pair[1] as usize);
                if end < start {
                    return Err(CodecError::InvalidPointerTable {
                        offset: (i + 1) * ENTRY_SIZE,
                        reason: format!("entry {} (0x{end:X}) precedes entry {i} (0x{start:X})", i + 1),
                    });
                }
                Ok(RecordSpan {
                    start,
                    len: end - start,
                })
            })
            .collect()
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        let start = out.len();
        out.resize(start + self.byte_len(), 0);
        LittleEndian::write_u16_into(&self.offsets, &mut out[start..]);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        self.write_to(&mut out);
        out
    }
}

fn read_entry(blob: &[u8], at: usize) -> Result<u16> {
    blob.get(at..at + ENTRY_SIZE)
        .map(LittleEndian::read_u16)
        .ok_or(CodecError::TruncatedInput {
            offset: at,
            needed: ENTRY_SIZE,
            len: blob.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn read_and_spans() {
        // 3 entries: 6, 9, 12
        let blob = [0x06, 0x00, 0x09, 0x00, 0x0C, 0x00, 0x41, 0x42, 0xFF, 0x43, 0x44, 0xFF];
        let t = PointerTable::read(&blob, 0).unwrap();
        assert_eq!(t.offsets(), &[6, 9, 12]);
        assert_eq!(
            t.spans().unwrap(),
            vec![RecordSpan { start: 6, len: 3 }, RecordSpan { start: 9, len: 3 }]
        );
    }

    #[test]
    fn read_at_base_offset() {
        let blob = [0xAA, 0xBB, 0x02, 0x00, 0xFF];
        let t = PointerTable::read(&blob, 2).unwrap();
        assert_eq!(t.offsets(), &[2]);
        assert!(t.spans().unwrap().is_empty());
    }

    #[test]
    fn write_little_endian() {
        let t = PointerTable::from_offsets(vec![4, 0x0102]);
        assert_eq!(t.to_bytes(), vec![0x04, 0x00, 0x02, 0x01]);
    }

    #[test]
    fn malformed_tables() {
        assert!(matches!(
            PointerTable::read(&[0x03, 0x00, 0x00], 0),
            Err(CodecError::InvalidPointerTable { .. })
        ));
        assert!(matches!(
            PointerTable::read(&[0x06, 0x00, 0x06, 0x00], 0),
            Err(CodecError::TruncatedInput { offset: 4, .. })
        ));
        let t = PointerTable::from_offsets(vec![4, 10, 8]);
        assert!(t.spans().is_err());
    }
}
