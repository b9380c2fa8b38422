//! Tokens of one MSG record.

use std::fmt;

pub const LINE_BREAK: u8 = 0xFC;
pub const RUBY: u8 = 0xFE;
pub const END: u8 = 0xFF;

/// First byte of a 2-byte control code.
#[inline]
pub fn is_control_prefix(b: u8) -> bool {
    b == 0xFB || b == 0xFD
}

#[inline]
pub fn is_narrow(b: u8) -> bool {
    b <= 0xE9
}

/// First byte of a 2-byte glyph.
#[inline]
pub fn is_wide_prefix(b: u8) -> bool {
    (0xF8..=0xFA).contains(&b)
}

/// A character-table key: one raw byte or a wide pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Glyph {
    Narrow([u8; 1]),
    Wide([u8; 2]),
}

impl Glyph {
    pub fn bytes(&self) -> &[u8] {
        match self {
            Glyph::Narrow(b) => b,
            Glyph::Wide(b) => b,
        }
    }
}

/// Byte after a ruby marker. Anything outside the glyph ranges is kept only
/// so the record can be written back unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RubyBase {
    Glyph(Glyph),
    Stray(u8),
}

/// Control-code operand, stored big-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Byte(u8),
    Word(u16),
    Dword(u32),
}

impl Operand {
    pub fn write_to(&self, out: &mut Vec<u8>) {
        match *self {
            Operand::Byte(v) => out.push(v),
            Operand::Word(v) => out.extend_from_slice(&v.to_be_bytes()),
            Operand::Dword(v) => out.extend_from_slice(&v.to_be_bytes()),
        }
    }
}

/// `%H` marks a 2-byte operand, `%I` a 4-byte one, bytes are bare decimal.
impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Byte(v) => write!(f, "{v}"),
            Operand::Word(v) => write!(f, "%H{v}"),
            Operand::Dword(v) => write!(f, "%I{v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Optional big-endian function id in front of a record.
    FuncMarker(u16),
    Text(Glyph),
    LineBreak,
    /// Base glyph with a pronunciation annotation. The annotation is kept
    /// here but never rendered as text.
    Ruby {
        base: RubyBase,
        unused: u8,
        annotation: Vec<u8>,
    },
    ControlCode {
        code: u16,
        operands: Vec<Operand>,
    },
    /// Control code missing from the opcode table; its operands (if any)
    /// are left in the stream.
    Unrecognized(u16),
    /// 0xEA..=0xF7: no glyph range, consumed without output.
    Reserved(u8),
    End,
}

impl Token {
    /// Re-serialize the token exactly as it was read.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Token::FuncMarker(v) => out.extend_from_slice(&v.to_be_bytes()),
            Token::Text(g) => out.extend_from_slice(g.bytes()),
            Token::LineBreak => out.push(LINE_BREAK),
            Token::Ruby {
                base,
                unused,
                annotation,
            } => {
                out.push(RUBY);
                match base {
                    RubyBase::Glyph(g) => out.extend_from_slice(g.bytes()),
                    RubyBase::Stray(b) => out.push(*b),
                }
                out.push(annotation.len() as u8);
                out.push(*unused);
                out.extend_from_slice(annotation);
            }
            Token::ControlCode { code, operands } => {
                out.extend_from_slice(&code.to_be_bytes());
                for op in operands {
                    op.write_to(out);
                }
            }
            Token::Unrecognized(code) => out.extend_from_slice(&code.to_be_bytes()),
            Token::Reserved(b) => out.push(*b),
            Token::End => out.push(END),
        }
    }
}

pub fn tokens_to_bytes(tokens: &[Token]) -> Vec<u8> {
    let mut out = Vec::new();
    for t in tokens {
        t.write_to(&mut out);
    }
    out
}
