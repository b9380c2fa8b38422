//! Binary records → annotated text.

use std::fmt::Write as _;

use msg_moji::GlyphMap;

use crate::error::{CodecError, Result};
use crate::opcode::OpcodeTable;
use crate::pointer::{PointerTable, RecordSpan};
use crate::reader::ByteReader;
use crate::token::{is_control_prefix, is_narrow, is_wide_prefix, Glyph, RubyBase, Token, END, LINE_BREAK, RUBY};

/// Newline plus the indentation every record body is written with.
pub const SEPARATOR: &str = "\n\t";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    pub index: usize,
    pub text: String,
}

enum Fragment<'t> {
    Glyph(&'t Glyph),
    Text(String),
    Separator,
}

pub struct Decoder<'a> {
    opcodes: &'a OpcodeTable,
    glyphs: &'a dyn GlyphMap,
    func_marker: bool,
}

impl<'a> Decoder<'a> {
    pub fn new(opcodes: &'a OpcodeTable, glyphs: &'a dyn GlyphMap) -> Self {
        Self {
            opcodes,
            glyphs,
            func_marker: false,
        }
    }

    /// Expect a big-endian function id in front of every record.
    pub fn with_func_marker(mut self, enabled: bool) -> Self {
        self.func_marker = enabled;
        self
    }

    /// Decode every record reachable through the pointer table at `base`.
    pub fn decode_blob(&self, blob: &[u8], base: usize) -> Result<Vec<DecodedRecord>> {
        let table = PointerTable::read(blob, base)?;
        let spans = table.spans()?;
        self.decode(blob, base, &spans)
    }

    pub fn decode(&self, blob: &[u8], base: usize, spans: &[RecordSpan]) -> Result<Vec<DecodedRecord>> {
        spans
            .iter()
            .enumerate()
            .map(|(index, span)| {
                let start = base + span.start;
                let bytes = blob.get(start..start + span.len).ok_or(CodecError::TruncatedInput {
                    offset: start,
                    needed: span.len,
                    len: blob.len(),
                })?;
                let tokens = self.tokenize(bytes, start)?;
                log::debug!("record {index}: {} bytes, {} tokens", span.len, tokens.len());
                Ok(DecodedRecord {
                    index,
                    text: self.render(&tokens),
                })
            })
            .collect()
    }

    /// Split one record into tokens. Stops after the first `End`; bytes
    /// after it are ignored.
    pub fn tokenize(&self, bytes: &[u8], origin: usize) -> Result<Vec<Token>> {
        let mut r = ByteReader::new(bytes, origin);
        let mut tokens = Vec::new();

        if self.func_marker {
            tokens.push(Token::FuncMarker(r.u16()?));
        }

        while !r.is_empty() {
            let b = r.u8()?;
            let token = match b {
                b if is_narrow(b) || is_wide_prefix(b) => Token::Text(read_glyph(b, &mut r)?),
                b if is_control_prefix(b) => {
                    let code = u16::from_be_bytes([b, r.u8()?]);
                    match self.opcodes.lookup(code) {
                        Some(handler) => Token::ControlCode {
                            code,
                            operands: handler.read_operands(&mut r)?,
                        },
                        None => {
                            log::warn!(
                                "unrecognized control code 0x{code:04x} at 0x{:X}",
                                origin + r.position() - 2
                            );
                            Token::Unrecognized(code)
                        }
                    }
                }
                LINE_BREAK => Token::LineBreak,
                RUBY => {
                    let first = r.u8()?;
                    let base = if is_narrow(first) || is_wide_prefix(first) {
                        RubyBase::Glyph(read_glyph(first, &mut r)?)
                    } else {
                        RubyBase::Stray(first)
                    };
                    let count = r.u8()?;
                    let unused = r.u8()?;
                    let annotation = r.bytes(count as usize)?;
                    Token::Ruby {
                        base,
                        unused,
                        annotation,
                    }
                }
                END => {
                    tokens.push(Token::End);
                    if !r.is_empty() {
                        log::debug!("{} byte(s) after end marker at 0x{origin:X}", r.remaining());
                    }
                    break;
                }
                other => Token::Reserved(other),
            };
            tokens.push(token);
        }

        Ok(tokens)
    }

    /// Lay out tokens as one record body.
    ///
    /// Control codes go on their own indented line; a run of adjacent codes
    /// shares separators. Ruby annotations are dropped.
    pub fn render(&self, tokens: &[Token]) -> String {
        let mut parts: Vec<Fragment<'_>> = Vec::new();
        let mut last_was_control = false;

        for token in tokens {
            match token {
                Token::FuncMarker(v) => parts.push(Fragment::Text(format!("func(%H{v})"))),
                Token::Text(g) => {
                    parts.push(Fragment::Glyph(g));
                    last_was_control = false;
                }
                Token::ControlCode { code, operands } => {
                    if !last_was_control {
                        parts.push(Fragment::Separator);
                    }
                    let name = self
                        .opcodes
                        .lookup(*code)
                        .map(|h| h.display_name())
                        .unwrap_or_else(|| crate::opcode::hex_name(*code));
                    let mut text = name;
                    if !operands.is_empty() {
                        let args: Vec<String> = operands.iter().map(ToString::to_string).collect();
                        let _ = write!(text, "({})", args.join(","));
                    }
                    parts.push(Fragment::Text(text));
                    parts.push(Fragment::Separator);
                    last_was_control = true;
                }
                Token::Unrecognized(code) => {
                    if !last_was_control {
                        parts.push(Fragment::Separator);
                    }
                    parts.push(Fragment::Text(format!("Unrecognized control code: 0x{code:04x}")));
                    last_was_control = true;
                }
                Token::LineBreak => parts.push(Fragment::Text(format!("\tline{SEPARATOR}"))),
                Token::Ruby { base, .. } => {
                    if let RubyBase::Glyph(g) = base {
                        parts.push(Fragment::Glyph(g));
                        last_was_control = false;
                    }
                }
                Token::Reserved(_) => {}
                Token::End => {
                    if matches!(parts.last(), Some(Fragment::Separator)) {
                        parts.pop();
                    }
                    parts.push(Fragment::Text(format!("{SEPARATOR}end")));
                }
            }
        }

        let mut out = String::new();
        for part in &parts {
            match part {
                Fragment::Glyph(g) => {
                    if self.glyphs.glyph(g.bytes()).is_none() {
                        log::debug!("unmapped glyph {:02X?}", g.bytes());
                    }
                    out.push_str(self.glyphs.glyph_or_placeholder(g.bytes()));
                }
                Fragment::Text(s) => out.push_str(s),
                Fragment::Separator => out.push_str(SEPARATOR),
            }
        }
        out
    }
}

fn read_glyph(first: u8, r: &mut ByteReader<'_>) -> Result<Glyph> {
    if is_wide_prefix(first) {
        Ok(Glyph::Wide([first, r.u8()?]))
    } else {
        Ok(Glyph::Narrow([first]))
    }
}

/// Lay out decoded records as a script file: a `//NNNN:` header, the indented
/// body and the `--` block separator.
pub fn render_script(records: &[DecodedRecord]) -> String {
    let mut out = String::new();
    for rec in records {
        let _ = write!(out, "//{:04}:\n\t{}{SEPARATOR}--\n\n", rec.index, rec.text);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::tokens_to_bytes;
    use msg_moji::CharTable;
    use pretty_assertions::assert_eq;

    fn moji() -> CharTable {
        CharTable::parse("41=A\n42=B\nF801=가\n").unwrap()
    }

    fn text_of(bytes: &[u8]) -> String {
        let glyphs = moji();
        let d = Decoder::new(OpcodeTable::builtin(), &glyphs);
        let tokens = d.tokenize(bytes, 0).unwrap();
        d.render(&tokens)
    }

    #[test]
    fn literal_then_end() {
        assert_eq!(text_of(&[0x41, 0xFF]), "A\n\tend");
    }

    #[test]
    fn wait_operand() {
        assert_eq!(text_of(&[0xFB, 0x08, 0x00, 0x64]), "\n\twait(%H100)\n\t");
    }

    #[test]
    fn control_code_before_end_drops_separator() {
        assert_eq!(text_of(&[0x41, 0xFB, 0x18, 0xFF]), "A\n\tpagekey\n\tend");
    }

    #[test]
    fn adjacent_control_codes_share_separator() {
        assert_eq!(
            text_of(&[0xFB, 0x18, 0xFB, 0x09, 0x05, 0x42, 0xFF]),
            "\n\tpagekey\n\tvwait(5)\n\tB\n\tend"
        );
    }

    #[test]
    fn unnamed_and_length_prefixed_codes() {
        assert_eq!(text_of(&[0xFB, 0x05, 1, 2, 0xFF]), "\n\t_fb05(1,2)\n\tend");
        assert_eq!(text_of(&[0xFB, 0x11, 0, 0xFF]), "\n\t_fb11(0)\n\tend");
        assert_eq!(
            text_of(&[0xFB, 0x1A, 0x00, 0x01, 0x11, 0x70, 0xFF]),
            "\n\tvoiceload(%I70000)\n\tend"
        );
    }

    #[test]
    fn bespoke_handlers() {
        assert_eq!(
            text_of(&[0xFB, 0x06, 0x00, 0x10, 0x00, 0x20, 3, 4, 0xFF]),
            "\n\tpos(%H16,%H32,3,4)\n\tend"
        );
        assert_eq!(
            text_of(&[0xFB, 0x15, 7, 0, 1, 0, 2, 0, 3, 0, 4, 0, 5, 0xFF]),
            "\n\t_fb15(7,%H1,%H2,%H3,%H4,%H5)\n\tend"
        );
    }

    #[test]
    fn unknown_code_consumes_nothing_more() {
        assert_eq!(
            text_of(&[0xFB, 0x99, 0x41, 0xFF]),
            "\n\tUnrecognized control code: 0xfb99A\n\tend"
        );
    }

    #[test]
    fn ruby_annotation_is_dropped() {
        let bytes = [0xFE, 0xF8, 0x01, 0x02, 0x00, 0x42, 0x42, 0x41, 0xFF];
        assert_eq!(text_of(&bytes), "가A\n\tend");

        let glyphs = moji();
        let d = Decoder::new(OpcodeTable::builtin(), &glyphs);
        let tokens = d.tokenize(&bytes, 0).unwrap();
        assert_eq!(tokens_to_bytes(&tokens), bytes.to_vec());
    }

    #[test]
    fn ruby_with_stray_base() {
        let bytes = [0xFE, 0xFC, 0x01, 0x00, 0x42, 0x41, 0xFF];
        assert_eq!(text_of(&bytes), "A\n\tend");

        let glyphs = moji();
        let d = Decoder::new(OpcodeTable::builtin(), &glyphs);
        let tokens = d.tokenize(&bytes, 0).unwrap();
        assert_eq!(tokens_to_bytes(&tokens), bytes.to_vec());
    }

    #[test]
    fn line_break_and_placeholders() {
        assert_eq!(text_of(&[0x41, 0xFC, 0x43, 0xFF]), "A\tline\n\t?\n\tend");
        assert_eq!(text_of(&[0xF9, 0x00, 0xFF]), "?\n\tend");
    }

    #[test]
    fn func_marker() {
        let glyphs = moji();
        let d = Decoder::new(OpcodeTable::builtin(), &glyphs).with_func_marker(true);
        let tokens = d.tokenize(&[0x01, 0x02, 0x41, 0xFF], 0).unwrap();
        assert_eq!(d.render(&tokens), "func(%H258)A\n\tend");
    }

    #[test]
    fn truncated_operand() {
        let glyphs = moji();
        let d = Decoder::new(OpcodeTable::builtin(), &glyphs);
        assert!(matches!(
            d.tokenize(&[0xFB, 0x08, 0x00], 0x10),
            Err(CodecError::TruncatedInput { offset: 0x12, .. })
        ));
    }

    #[test]
    fn span_past_end_of_blob() {
        // second entry points far beyond the 12-byte blob
        let blob = [0x04, 0x00, 0x40, 0x00, 0x41, 0xFF, 0, 0, 0, 0, 0, 0];
        let glyphs = moji();
        let d = Decoder::new(OpcodeTable::builtin(), &glyphs);
        assert!(matches!(
            d.decode_blob(&blob, 0),
            Err(CodecError::TruncatedInput { offset: 4, needed: 0x3C, len: 12 })
        ));
    }

    #[test]
    fn ruby_annotation_past_end_of_span() {
        // ruby claims 5 annotation bytes, the span holds 2
        let blob = [0x06, 0x00, 0x0D, 0x00, 0x0F, 0x00, 0xFE, 0x41, 0x05, 0x00, 0x42, 0x42, 0xFF, 0x41, 0xFF];
        let glyphs = moji();
        let d = Decoder::new(OpcodeTable::builtin(), &glyphs);
        assert!(matches!(
            d.decode_blob(&blob, 0),
            Err(CodecError::TruncatedInput { offset: 10, needed: 5, .. })
        ));
    }

    #[test]
    fn empty_glyph_renders_nothing() {
        let glyphs = CharTable::parse("41=A\nE9=\n").unwrap();
        let d = Decoder::new(OpcodeTable::builtin(), &glyphs);
        let tokens = d.tokenize(&[0x41, 0xE9, 0x41, 0xFF], 0).unwrap();
        assert_eq!(d.render(&tokens), "AA\n\tend");
    }

    #[test]
    fn blob_decode_skips_last_record() {
        // three entries, two spans; the third record is not decoded
        let blob = [0x06, 0x00, 0x08, 0x00, 0x0A, 0x00, 0x41, 0xFF, 0x42, 0xFF, 0x41, 0xFF];
        let glyphs = moji();
        let d = Decoder::new(OpcodeTable::builtin(), &glyphs);
        let records = d.decode_blob(&blob, 0).unwrap();
        assert_eq!(
            records,
            vec![
                DecodedRecord { index: 0, text: "A\n\tend".into() },
                DecodedRecord { index: 1, text: "B\n\tend".into() },
            ]
        );
        assert_eq!(
            render_script(&records),
            "//0000:\n\tA\n\tend\n\t--\n\n//0001:\n\tB\n\tend\n\t--\n\n"
        );
    }
}
