//! Control-code registry.
//!
//! Every control code is two bytes, high byte `0xFB` or `0xFD`. Most of them
//! carry a fixed number of same-width operands, a few carry a length byte
//! followed by that many operands, and two (`0xFB06`, `0xFB15`) have mixed
//! operand widths and are read by dedicated handlers.

use std::collections::{BTreeMap, HashMap};

use lazy_static::lazy_static;

use crate::error::{CodecError, Result};
use crate::reader::ByteReader;
use crate::token::{is_control_prefix, Operand};

pub const POS: u16 = 0xFB06;
pub const FB15: u16 = 0xFB15;

/// Keywords of the text format that are not table opcodes.
pub const STRUCTURAL_KEYWORDS: [&str; 5] = ["func", "line", "rubi", "endrubi", "end"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandCount {
    Fixed(u16),
    /// One length byte, then that many operands.
    LengthPrefixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandWidth {
    None,
    Byte,
    Word,
    Dword,
}

impl OperandWidth {
    pub fn from_bytes(n: u8) -> Option<Self> {
        match n {
            0 => Some(OperandWidth::None),
            1 => Some(OperandWidth::Byte),
            2 => Some(OperandWidth::Word),
            4 => Some(OperandWidth::Dword),
            _ => None,
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            OperandWidth::None => 0,
            OperandWidth::Byte => 1,
            OperandWidth::Word => 2,
            OperandWidth::Dword => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpcodeSpec {
    pub code: u16,
    pub count: OperandCount,
    pub width: OperandWidth,
    pub mnemonic: Option<String>,
}

impl OpcodeSpec {
    pub fn new(code: u16, count: OperandCount, width: OperandWidth, mnemonic: Option<&str>) -> Self {
        Self {
            code,
            count,
            width,
            mnemonic: mnemonic.map(str::to_string),
        }
    }

    fn read_one(&self, r: &mut ByteReader<'_>) -> Result<Operand> {
        Ok(match self.width {
            OperandWidth::Byte | OperandWidth::None => Operand::Byte(r.u8()?),
            OperandWidth::Word => Operand::Word(r.u16()?),
            OperandWidth::Dword => Operand::Dword(r.u32()?),
        })
    }

    fn validate(&self) -> Result<()> {
        let fail = |reason: &str| {
            Err(CodecError::InvalidOpcodeDefinition {
                code: self.code,
                reason: reason.to_string(),
            })
        };
        if !is_control_prefix((self.code >> 8) as u8) {
            return fail("high byte must be 0xFB or 0xFD");
        }
        match (self.count, self.width) {
            (OperandCount::Fixed(0), OperandWidth::None) => {}
            (_, OperandWidth::None) => return fail("operands need a width of 1, 2 or 4"),
            (OperandCount::Fixed(0), _) => return fail("width given for an opcode without operands"),
            _ => {}
        }
        if let Some(m) = &self.mnemonic {
            if !is_valid_mnemonic(m) {
                return fail("mnemonic must be an identifier not starting with '_' or a digit");
            }
            if STRUCTURAL_KEYWORDS.contains(&m.as_str()) {
                return fail("mnemonic collides with a structural keyword");
            }
        }
        Ok(())
    }
}

fn is_valid_mnemonic(m: &str) -> bool {
    let mut chars = m.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpcodeHandler {
    Generic(OpcodeSpec),
    /// 0xFB06: two u16 then two u8.
    Pos,
    /// 0xFB15: one u8 then five u16.
    Fb15,
}

impl OpcodeHandler {
    pub fn code(&self) -> u16 {
        match self {
            OpcodeHandler::Generic(spec) => spec.code,
            OpcodeHandler::Pos => POS,
            OpcodeHandler::Fb15 => FB15,
        }
    }

    pub fn mnemonic(&self) -> Option<&str> {
        match self {
            OpcodeHandler::Generic(spec) => spec.mnemonic.as_deref(),
            OpcodeHandler::Pos => Some("pos"),
            OpcodeHandler::Fb15 => None,
        }
    }

    /// Name used in text: the mnemonic, or `_xxxx` for unnamed codes.
    pub fn display_name(&self) -> String {
        match self.mnemonic() {
            Some(m) => m.to_string(),
            None => hex_name(self.code()),
        }
    }

    /// Number of operands a well-formed instance carries, if fixed.
    pub fn fixed_operand_count(&self) -> Option<usize> {
        match self {
            OpcodeHandler::Generic(spec) => match spec.count {
                OperandCount::Fixed(n) => Some(n as usize),
                OperandCount::LengthPrefixed => None,
            },
            OpcodeHandler::Pos => Some(4),
            OpcodeHandler::Fb15 => Some(6),
        }
    }

    pub(crate) fn read_operands(&self, r: &mut ByteReader<'_>) -> Result<Vec<Operand>> {
        match self {
            OpcodeHandler::Generic(spec) => {
                let mut ops = Vec::new();
                let count = match spec.count {
                    OperandCount::Fixed(n) => n as usize,
                    OperandCount::LengthPrefixed => {
                        let len = r.u8()?;
                        ops.push(Operand::Byte(len));
                        len as usize
                    }
                };
                for _ in 0..count {
                    ops.push(spec.read_one(r)?);
                }
                Ok(ops)
            }
            OpcodeHandler::Pos => Ok(vec![
                Operand::Word(r.u16()?),
                Operand::Word(r.u16()?),
                Operand::Byte(r.u8()?),
                Operand::Byte(r.u8()?),
            ]),
            OpcodeHandler::Fb15 => {
                let mut ops = vec![Operand::Byte(r.u8()?)];
                for _ in 0..5 {
                    ops.push(Operand::Word(r.u16()?));
                }
                Ok(ops)
            }
        }
    }
}

pub fn hex_name(code: u16) -> String {
    format!("_{code:04x}")
}

use OperandCount::{Fixed, LengthPrefixed as Len};

#[rustfmt::skip]
const BUILTIN: &[(u16, OperandCount, u8, Option<&str>)] = &[
    (0xFB04, Fixed(1),   2, None),
    (0xFB05, Fixed(2),   1, None),
    (0xFB07, Fixed(2),   1, None),
    (0xFB08, Fixed(1),   2, Some("wait")),
    (0xFB09, Fixed(1),   1, Some("vwait")),
    (0xFB0A, Fixed(1),   1, Some("base_color")),
    (0xFB0B, Fixed(0),   0, Some("init_color")),
    (0xFB0C, Fixed(0),   0, None),
    (0xFB0D, Fixed(4),   1, None),
    (0xFB0E, Fixed(1),   1, None),
    (0xFB0F, Fixed(1),   1, Some("sel")),
    (0xFB10, Len,        2, None),
    (0xFB11, Len,        1, None),
    (0xFB12, Fixed(2),   1, None),
    (0xFB13, Fixed(7),   1, None),
    (0xFB16, Fixed(4),   1, None),
    (0xFB18, Fixed(0),   0, Some("pagekey")),
    (0xFB19, Fixed(1),   2, None),
    (0xFB1A, Fixed(1),   4, Some("voiceload")),
    (0xFB1B, Fixed(0),   0, None),
    (0xFB1C, Fixed(0),   0, None),
    (0xFB1D, Fixed(0),   0, None),
    (0xFB1F, Fixed(0),   0, None),
    (0xFB20, Fixed(2),   1, Some("item_name")),
    (0xFB21, Fixed(2),   1, None),
    (0xFB22, Fixed(1),   1, Some("button")),
    (0xFB23, Fixed(1),   1, None),
    (0xFB24, Fixed(0),   0, Some("endkey")),
    (0xFB25, Fixed(1),   1, None),
    (0xFB26, Fixed(2),   1, None),
    (0xFB27, Fixed(2),   1, None),
    (0xFB28, Fixed(4),   1, None),
    (0xFB29, Fixed(1),   1, None),
    (0xFB2A, Fixed(5),   1, None),
    (0xFB2B, Fixed(0),   0, None),
    (0xFB2C, Fixed(1),   1, None),
    (0xFB2E, Fixed(1),   1, Some("space")),
    (0xFB30, Fixed(1),   1, None),
    (0xFB31, Fixed(0),   0, None),
    (0xFB33, Fixed(1),   1, None),
    (0xFB34, Fixed(2),   1, None),
    (0xFB35, Fixed(2),   1, None),
    (0xFB37, Fixed(5),   1, None),
    (0xFB39, Len,        2, None),
    (0xFB3C, Fixed(429), 1, None),
    (0xFB3D, Fixed(0),   0, None),
    (0xFB3E, Fixed(2),   1, None),
    (0xFB3F, Fixed(3),   1, None),
    (0xFB40, Fixed(2),   1, None),
    (0xFB41, Fixed(3),   1, None),
    (0xFB42, Fixed(7),   1, None),
    (0xFB44, Fixed(1),   1, None),
    (0xFB45, Fixed(1),   1, None),
    (0xFB47, Fixed(4),   1, None),
    (0xFB48, Fixed(1),   1, None),
    (0xFB49, Fixed(1),   1, None),
    (0xFB4A, Fixed(1),   1, None),
    (0xFB4B, Fixed(1),   1, None),
    (0xFB4C, Len,        2, None),
    (0xFD00, Fixed(3),   1, Some("nextpage")),
];

lazy_static! {
    static ref BUILTIN_TABLE: OpcodeTable = OpcodeTable::with_builtin();
}

/// Immutable code → handler map. Build it once (optionally with
/// [`OpcodeTable::define`] overrides) and share it by reference.
#[derive(Debug, Clone, Default)]
pub struct OpcodeTable {
    handlers: BTreeMap<u16, OpcodeHandler>,
    by_mnemonic: HashMap<String, u16>,
}

impl OpcodeTable {
    /// The process-wide built-in table.
    pub fn builtin() -> &'static OpcodeTable {
        &BUILTIN_TABLE
    }

    /// A fresh copy of the built-in table, for callers that add definitions.
    pub fn with_builtin() -> Self {
        let mut table = OpcodeTable::default();
        for &(code, count, width, mnemonic) in BUILTIN {
            let width = OperandWidth::from_bytes(width).unwrap_or(OperandWidth::None);
            table.insert(OpcodeHandler::Generic(OpcodeSpec::new(code, count, width, mnemonic)));
        }
        table.insert(OpcodeHandler::Pos);
        table.insert(OpcodeHandler::Fb15);
        table
    }

    fn insert(&mut self, handler: OpcodeHandler) {
        let code = handler.code();
        if let Some(old) = self.handlers.get(&code).and_then(OpcodeHandler::mnemonic) {
            self.by_mnemonic.remove(old);
        }
        if let Some(m) = handler.mnemonic() {
            self.by_mnemonic.insert(m.to_string(), code);
        }
        self.handlers.insert(code, handler);
    }

    /// Add or replace a generic opcode.
    pub fn define(&mut self, spec: OpcodeSpec) -> Result<()> {
        spec.validate()?;
        if spec.code == POS || spec.code == FB15 {
            return Err(CodecError::InvalidOpcodeDefinition {
                code: spec.code,
                reason: "opcode has a dedicated handler and cannot be redefined".to_string(),
            });
        }
        if let Some(m) = &spec.mnemonic {
            if let Some(&other) = self.by_mnemonic.get(m) {
                if other != spec.code {
                    return Err(CodecError::InvalidOpcodeDefinition {
                        code: spec.code,
                        reason: format!("mnemonic {m:?} is already used by 0x{other:04X}"),
                    });
                }
            }
        }
        if self.handlers.contains_key(&spec.code) {
            log::debug!("overriding opcode 0x{:04X}", spec.code);
        }
        self.insert(OpcodeHandler::Generic(spec));
        Ok(())
    }

    pub fn lookup(&self, code: u16) -> Option<&OpcodeHandler> {
        self.handlers.get(&code)
    }

    pub fn code_for(&self, mnemonic: &str) -> Option<u16> {
        self.by_mnemonic.get(mnemonic).copied()
    }

    /// All named opcodes, as `(mnemonic, code)`.
    pub fn mnemonics(&self) -> impl Iterator<Item = (&str, u16)> {
        self.by_mnemonic.iter().map(|(m, &c)| (m.as_str(), c))
    }

    pub fn handlers(&self) -> impl Iterator<Item = &OpcodeHandler> {
        self.handlers.values()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
