//! msg-script
//!
//! Codec for MSG dialogue scripts. A script blob is a little-endian u16
//! pointer table followed by variable-length records; each record mixes
//! character-table glyphs with big-endian control codes and ends with `0xFF`.
//!
//! [`decode::Decoder`] turns a blob into annotated text, [`encode::Encoder`]
//! turns the text back into a blob. Both share an [`opcode::OpcodeTable`]
//! and a [`msg_moji::GlyphMap`].

pub mod config;
pub mod decode;
pub mod encode;
pub mod error;
pub mod header;
pub mod opcode;
pub mod pointer;
mod reader;
pub mod token;

pub use config::{parse_offset, ProjectConfig};
pub use decode::{render_script, DecodedRecord, Decoder};
pub use encode::{EncodedScript, Encoder};
pub use error::{CodecError, Result};
pub use header::ArchiveEntryHeader;
pub use opcode::OpcodeTable;
pub use pointer::PointerTable;
