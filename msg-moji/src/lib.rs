//! Moji table: the game's private character set.
//!
//! Dialogue text in MSG scripts is not stored in any standard encoding. Each
//! glyph is one raw byte (`0x00..=0xE9`) or a byte pair whose first byte is in
//! `0xF8..=0xFA`. The mapping lives in a plain text file with one `hex=glyph`
//! definition per line.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MojiError {
    #[error("character table is missing: {0}")]
    Missing(PathBuf),

    #[error("failed to read character table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid character table entry at line {line}: {reason}")]
    InvalidLine { line: usize, reason: String },
}

pub type Result<T> = std::result::Result<T, MojiError>;

/// Lookup service used by the script codec in both directions.
pub trait GlyphMap {
    /// Glyph for a raw 1- or 2-byte sequence.
    fn glyph(&self, bytes: &[u8]) -> Option<&str>;

    /// Raw byte sequence for a single character.
    fn bytes_for(&self, c: char) -> Option<&[u8]>;

    /// Glyph for `bytes`, or `?` when the sequence is not defined.
    fn glyph_or_placeholder(&self, bytes: &[u8]) -> &str {
        self.glyph(bytes).unwrap_or("?")
    }
}

#[derive(Debug, Clone, Default)]
pub struct CharTable {
    to_glyph: HashMap<Vec<u8>, String>,
    to_bytes: HashMap<char, Vec<u8>>,
}

impl CharTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a table definition from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MojiError::Missing(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|source| MojiError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::parse(&text)?;
        log::debug!(
            "loaded {} glyphs ({} encodable) from {}",
            table.to_glyph.len(),
            table.to_bytes.len(),
            path.display()
        );
        Ok(table)
    }

    /// Parse `hex=glyph` lines.
    ///
    /// Lines without `=` are skipped. The key is 2 or 4 hex digits; the glyph
    /// is everything after the first `=` up to the line ending, so both `=`
    /// and a single space are valid glyphs. An empty glyph decodes to nothing
    /// and is never encoded.
    pub fn parse(text: &str) -> Result<Self> {
        let mut table = Self::new();
        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim_end_matches('\r');
            let Some((key, glyph)) = line.split_once('=') else {
                continue;
            };
            let bytes = parse_key(key.trim()).map_err(|reason| MojiError::InvalidLine {
                line: line_no,
                reason,
            })?;
            table.insert(bytes, glyph);
        }
        Ok(table)
    }

    /// Register one definition.
    ///
    /// For decoding the first definition of a byte key is kept. For encoding
    /// a later definition of the same glyph replaces the earlier one.
    pub fn insert(&mut self, bytes: Vec<u8>, glyph: &str) {
        let mut chars = glyph.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if let Some(prev) = self.to_bytes.insert(c, bytes.clone()) {
                if prev != bytes {
                    log::debug!("glyph {c:?} redefined: {prev:02X?} -> {bytes:02X?}");
                }
            }
        }

        if self.to_glyph.contains_key(&bytes) {
            log::warn!("duplicate character table key {bytes:02X?}, keeping first definition");
            return;
        }
        self.to_glyph.insert(bytes, glyph.to_string());
    }

    pub fn len(&self) -> usize {
        self.to_glyph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_glyph.is_empty()
    }
}

impl GlyphMap for CharTable {
    fn glyph(&self, bytes: &[u8]) -> Option<&str> {
        self.to_glyph.get(bytes).map(String::as_str)
    }

    fn bytes_for(&self, c: char) -> Option<&[u8]> {
        self.to_bytes.get(&c).map(Vec::as_slice)
    }
}

fn parse_key(key: &str) -> std::result::Result<Vec<u8>, String> {
    if key.len() != 2 && key.len() != 4 {
        return Err(format!("key {key:?} must be 2 or 4 hex digits"));
    }
    if !key.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(format!("key {key:?} is not hexadecimal"));
    }
    (0..key.len())
        .step_by(2)
        .map(|i| {
            key.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("key {key:?} is not hexadecimal"))
        })
        .collect()
}
