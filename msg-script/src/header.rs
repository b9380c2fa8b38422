//! Archive entry header.
//!
//! Every file inside a BIN archive is preceded by a 0x30-byte header and the
//! header plus payload are padded to a whole number of 0x800-byte chunks.
//! When an archive is unpacked the headers are collected in order into a
//! `HEADER.BIN` table; an encoded script refreshes its own slot there.

use std::io::Cursor;

use binrw::{BinRead, BinWrite};

use crate::error::{CodecError, Result};

pub const HEADER_SIZE: usize = 0x30;
pub const CHUNK_SIZE: usize = 0x800;
/// Entry kind of message scripts.
pub const SCRIPT_KIND: u32 = 0x12;

#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct ArchiveEntryHeader {
    pub kind: u32,
    /// Payload size without padding.
    pub raw_size: u32,
    /// Header plus padded payload, in chunks.
    pub padded_chunks: u32,
    pub reserved: [u8; 0x24],
}

impl ArchiveEntryHeader {
    pub fn for_script(raw_len: usize) -> Result<Self> {
        let raw_size = u32::try_from(raw_len).map_err(|_| CodecError::EntryTooLarge(raw_len))?;
        let padded_chunks = u32::try_from((HEADER_SIZE + raw_len).div_ceil(CHUNK_SIZE))
            .map_err(|_| CodecError::EntryTooLarge(raw_len))?;
        Ok(Self {
            kind: SCRIPT_KIND,
            raw_size,
            padded_chunks,
            reserved: [0; 0x24],
        })
    }

    /// Zero bytes to append after a payload of `raw_len` bytes.
    pub fn padding_for(raw_len: usize) -> usize {
        let used = HEADER_SIZE + raw_len;
        used.next_multiple_of(CHUNK_SIZE) - used
    }

    /// Build the header for `blob` and return it with the padded payload.
    pub fn wrap(blob: &[u8]) -> Result<(Self, Vec<u8>)> {
        let header = Self::for_script(blob.len())?;
        let mut padded = Vec::with_capacity(blob.len() + Self::padding_for(blob.len()));
        padded.extend_from_slice(blob);
        padded.resize(blob.len() + Self::padding_for(blob.len()), 0);
        Ok((header, padded))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::with_capacity(HEADER_SIZE));
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self::read(&mut Cursor::new(bytes))?)
    }

    /// Write this header into slot `slot` of a header table, growing the
    /// table with zeroed slots when it is too short.
    pub fn patch_into(&self, table: &mut Vec<u8>, slot: usize) -> Result<()> {
        let start = slot * HEADER_SIZE;
        let end = start + HEADER_SIZE;
        if table.len() < end {
            log::warn!("header table has {} slot(s), growing it to {}", table.len() / HEADER_SIZE, slot + 1);
            table.resize(end, 0);
        }
        table[start..end].copy_from_slice(&self.to_bytes()?);
        Ok(())
    }
}
