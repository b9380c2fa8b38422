//! Annotated text → binary blob.
//!
//! The script is cut into blocks at every `--`; each block becomes one record
//! and one pointer-table entry. Inside a line the lexer recognizes, at each
//! position and in this order:
//!
//! 1. a hex escape `_XXXX`,
//! 2. the longest keyword starting there (opcode mnemonics and the
//!    structural words `func`, `line`, `rubi`, `endrubi`, `end`),
//! 3. otherwise one plain character, looked up in the character table.
//!
//! Escapes and keywords may be followed directly by `(op,op,...)`. Operands
//! tagged `%H` are written as big-endian u16, `%I` as big-endian u32, untagged
//! ones as one byte.

use msg_moji::GlyphMap;

use crate::error::{CodecError, Result};
use crate::opcode::{OpcodeTable, STRUCTURAL_KEYWORDS};
use crate::pointer::{PointerTable, ENTRY_SIZE};
use crate::token::{Operand, END, LINE_BREAK, RUBY};

pub const BLOCK_SEPARATOR: &str = "--";
pub const COMMENT_MARKER: &str = "//";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    /// Emits only its operands.
    Func,
    Line,
    Rubi,
    /// Emits nothing.
    EndRubi,
    End,
    Opcode(u16),
}

impl Keyword {
    fn structural(name: &str) -> Option<Self> {
        Some(match name {
            "func" => Keyword::Func,
            "line" => Keyword::Line,
            "rubi" => Keyword::Rubi,
            "endrubi" => Keyword::EndRubi,
            "end" => Keyword::End,
            _ => return None,
        })
    }

    fn write_to(self, out: &mut Vec<u8>) {
        match self {
            Keyword::Func | Keyword::EndRubi => {}
            Keyword::Line => out.push(LINE_BREAK),
            Keyword::Rubi => out.push(RUBY),
            Keyword::End => out.push(END),
            Keyword::Opcode(code) => out.extend_from_slice(&code.to_be_bytes()),
        }
    }
}

/// Pointer table plus concatenated records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedScript {
    pub pointers: PointerTable,
    pub records: Vec<u8>,
}

impl EncodedScript {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.pointers.to_bytes();
        out.extend_from_slice(&self.records);
        out
    }
}

/// Where the lexer currently is, for error messages.
#[derive(Clone, Copy)]
struct Location {
    block: usize,
    line: usize,
}

impl Location {
    fn malformed(self, reason: impl Into<String>) -> CodecError {
        CodecError::MalformedEscapeSyntax {
            block: self.block,
            line: self.line,
            reason: reason.into(),
        }
    }
}

pub struct Encoder<'a> {
    opcodes: &'a OpcodeTable,
    glyphs: &'a dyn GlyphMap,
    /// Longest first, so `endkey` wins over `end`.
    keywords: Vec<(String, Keyword)>,
}

impl<'a> Encoder<'a> {
    pub fn new(opcodes: &'a OpcodeTable, glyphs: &'a dyn GlyphMap) -> Self {
        let mut keywords: Vec<(String, Keyword)> = STRUCTURAL_KEYWORDS
            .iter()
            .filter_map(|&k| Keyword::structural(k).map(|kw| (k.to_string(), kw)))
            .chain(
                opcodes
                    .mnemonics()
                    .map(|(m, code)| (m.to_string(), Keyword::Opcode(code))),
            )
            .collect();
        keywords.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        Self {
            opcodes,
            glyphs,
            keywords,
        }
    }

    pub fn encode(&self, script: &str) -> Result<Vec<u8>> {
        Ok(self.encode_script(script)?.to_bytes())
    }

    pub fn encode_script(&self, script: &str) -> Result<EncodedScript> {
        let blocks: Vec<&str> = script.split(BLOCK_SEPARATOR).collect();
        let table_len = blocks.len() * ENTRY_SIZE;

        let mut offsets = Vec::with_capacity(blocks.len());
        let mut records = Vec::new();
        for (block, text) in blocks.iter().enumerate() {
            let offset = records.len() + table_len;
            let entry = u16::try_from(offset).map_err(|_| CodecError::PointerOverflow { block, offset })?;
            offsets.push(entry);

            for (line_idx, line) in text.lines().enumerate() {
                let loc = Location {
                    block,
                    line: line_idx + 1,
                };
                self.encode_line(strip_comment(line), loc, &mut records)?;
            }
        }

        log::debug!("encoded {} blocks, {} record bytes", blocks.len(), records.len());
        Ok(EncodedScript {
            pointers: PointerTable::from_offsets(offsets),
            records,
        })
    }

    fn encode_line(&self, line: &str, loc: Location, out: &mut Vec<u8>) -> Result<()> {
        let mut rest = line;
        while let Some(c) = rest.chars().next() {
            if let Some(code) = hex_escape(rest) {
                out.extend_from_slice(&code.to_be_bytes());
                rest = self.operands(&rest[5..], Some(code), loc, out)?;
                continue;
            }

            if let Some((name, kw)) = self.keyword_at(rest) {
                kw.write_to(out);
                let code = match kw {
                    Keyword::Opcode(code) => Some(code),
                    _ => None,
                };
                rest = self.operands(&rest[name.len()..], code, loc, out)?;
                continue;
            }

            match self.glyphs.bytes_for(c) {
                Some(bytes) => out.extend_from_slice(bytes),
                None => {
                    if !c.is_whitespace() {
                        log::debug!("block {} line {}: no glyph for {c:?}, skipped", loc.block, loc.line);
                    }
                }
            }
            rest = &rest[c.len_utf8()..];
        }
        Ok(())
    }

    fn keyword_at(&self, s: &str) -> Option<(&str, Keyword)> {
        self.keywords
            .iter()
            .find(|(name, _)| s.starts_with(name.as_str()))
            .map(|(name, kw)| (name.as_str(), *kw))
    }

    /// Consume an optional `(...)` operand list at the start of `s` and
    /// return the remaining text.
    fn operands<'s>(&self, s: &'s str, code: Option<u16>, loc: Location, out: &mut Vec<u8>) -> Result<&'s str> {
        let Some(inner_start) = s.strip_prefix('(') else {
            return Ok(s);
        };
        let close = inner_start
            .find(')')
            .ok_or_else(|| loc.malformed("operand list is not closed"))?;
        let inner = &inner_start[..close];

        let mut count = 0usize;
        if !inner.trim().is_empty() {
            for raw in inner.split(',') {
                parse_operand(raw.trim(), loc)?.write_to(out);
                count += 1;
            }
        }

        if let Some(handler) = code.and_then(|c| self.opcodes.lookup(c)) {
            if let Some(expected) = handler.fixed_operand_count() {
                if expected != count {
                    log::warn!(
                        "block {} line {}: {} takes {expected} operand(s), got {count}",
                        loc.block,
                        loc.line,
                        handler.display_name()
                    );
                }
            }
        }

        Ok(&inner_start[close + 1..])
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find(COMMENT_MARKER) {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// `_` followed by exactly four hex digits.
fn hex_escape(s: &str) -> Option<u16> {
    let b = s.as_bytes();
    if b.len() < 5 || b[0] != b'_' || !b[1..5].iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    u16::from_str_radix(&s[1..5], 16).ok()
}

fn parse_operand(raw: &str, loc: Location) -> Result<Operand> {
    let (digits, width) = if let Some(v) = raw.strip_prefix("%H") {
        (v, 2)
    } else if let Some(v) = raw.strip_prefix("%I") {
        (v, 4)
    } else {
        (raw, 1)
    };

    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|_| loc.malformed(format!("operand {raw:?} is not a number")))?;
    let out_of_range = || CodecError::OperandOutOfRange {
        block: loc.block,
        line: loc.line,
        value,
        width,
    };

    Ok(match width {
        1 => Operand::Byte(u8::try_from(value).map_err(|_| out_of_range())?),
        2 => Operand::Word(u16::try_from(value).map_err(|_| out_of_range())?),
        _ => Operand::Dword(u32::try_from(value).map_err(|_| out_of_range())?),
    })
}
