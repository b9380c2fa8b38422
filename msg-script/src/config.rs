use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::opcode::{OpcodeSpec, OpcodeTable, OperandCount, OperandWidth};

/// Per-game settings shared by both tools.
///
/// ```toml
/// moji_table = "Moji.tbl"
/// func_marker = false
/// offset = "0x10+4"
///
/// [[opcodes]]
/// code = 0xfb4d
/// count = 1
/// width = 2
/// mnemonic = "shake"
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    /// Relative paths are resolved against the config file's directory.
    pub moji_table: Option<PathBuf>,
    pub func_marker: bool,
    pub offset: Option<OffsetValue>,
    pub opcodes: Vec<OpcodeDef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OffsetValue {
    Number(usize),
    Expr(String),
}

impl OffsetValue {
    pub fn resolve(&self) -> Result<usize> {
        match self {
            OffsetValue::Number(n) => Ok(*n),
            OffsetValue::Expr(s) => parse_offset(s),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpcodeDef {
    pub code: u16,
    #[serde(default)]
    pub count: CountValue,
    /// Operand width in bytes; defaults to 1 when the opcode has operands.
    pub width: Option<u8>,
    pub mnemonic: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CountValue {
    Fixed(u16),
    /// Only `"len"` is accepted.
    Keyword(String),
}

impl Default for CountValue {
    fn default() -> Self {
        CountValue::Fixed(0)
    }
}

impl OpcodeDef {
    pub fn to_spec(&self) -> Result<OpcodeSpec> {
        let count = match &self.count {
            CountValue::Fixed(n) => OperandCount::Fixed(*n),
            CountValue::Keyword(k) if k == "len" => OperandCount::LengthPrefixed,
            CountValue::Keyword(k) => bail!("opcode 0x{:04X}: unknown count {k:?}, expected a number or \"len\"", self.code),
        };
        let width = match self.width {
            Some(w) => OperandWidth::from_bytes(w)
                .ok_or_else(|| anyhow!("opcode 0x{:04X}: width {w} is not 0, 1, 2 or 4", self.code))?,
            None if matches!(count, OperandCount::Fixed(0)) => OperandWidth::None,
            None => OperandWidth::Byte,
        };
        Ok(OpcodeSpec::new(self.code, count, width, self.mnemonic.as_deref()))
    }
}

impl ProjectConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let txt = std::fs::read_to_string(path).with_context(|| format!("read config: {}", path.display()))?;
        let mut config: ProjectConfig =
            toml::from_str(&txt).with_context(|| format!("parse config: {}", path.display()))?;

        if let Some(table) = config.moji_table.take() {
            let dir = path.parent().unwrap_or_else(|| Path::new(""));
            config.moji_table = Some(if table.is_relative() { dir.join(table) } else { table });
        }
        log::debug!("loaded config {} ({} opcode definitions)", path.display(), config.opcodes.len());
        Ok(config)
    }

    /// Built-in opcodes with this config's definitions applied in order.
    pub fn opcode_table(&self) -> Result<OpcodeTable> {
        let mut table = OpcodeTable::with_builtin();
        for def in &self.opcodes {
            table
                .define(def.to_spec()?)
                .with_context(|| format!("opcode 0x{:04X}", def.code))?;
        }
        Ok(table)
    }
}

/// Parse a base offset such as `0x1C`, `32` or `0x1000+0x20+4`.
///
/// Each `+`-separated term is hexadecimal when it carries a `0x` prefix and
/// decimal otherwise.
pub fn parse_offset(s: &str) -> Result<usize> {
    let mut total = 0usize;
    for term in s.split('+') {
        let term = term.trim();
        let value = match term.strip_prefix("0x").or_else(|| term.strip_prefix("0X")) {
            Some(hex) => usize::from_str_radix(hex, 16),
            None => term.parse(),
        }
        .with_context(|| format!("invalid offset term {term:?} in {s:?}"))?;
        total = total
            .checked_add(value)
            .ok_or_else(|| anyhow!("offset {s:?} overflows"))?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn offsets() {
        assert_eq!(parse_offset("0").unwrap(), 0);
        assert_eq!(parse_offset("0x10").unwrap(), 16);
        assert_eq!(parse_offset("0x10+20").unwrap(), 36);
        assert_eq!(parse_offset("0x1000 + 0x20 + 4").unwrap(), 0x1024);
        assert!(parse_offset("").is_err());
        assert!(parse_offset("0xZZ").is_err());
        assert!(parse_offset("10+").is_err());
    }

    #[test]
    fn parse_full_config() {
        let config: ProjectConfig = toml::from_str(
            r#"
            moji_table = "Moji.tbl"
            func_marker = true
            offset = "0x10+4"

            [[opcodes]]
            code = 0xfb4d
            count = 1
            width = 2
            mnemonic = "shake"

            [[opcodes]]
            code = 0xfb4e
            count = "len"

            [[opcodes]]
            code = 0xfb08
            count = 1
            width = 2
            mnemonic = "delay"
            "#,
        )
        .unwrap();
        assert!(config.func_marker);
        assert_eq!(config.offset.as_ref().unwrap().resolve().unwrap(), 20);

        let table = config.opcode_table().unwrap();
        assert_eq!(table.code_for("shake"), Some(0xFB4D));
        assert_eq!(table.code_for("delay"), Some(0xFB08));
        assert_eq!(table.code_for("wait"), None);
        assert_eq!(table.lookup(0xFB4E).unwrap().fixed_operand_count(), None);
    }

    #[test]
    fn empty_config_is_builtin() {
        let config: ProjectConfig = toml::from_str("").unwrap();
        assert!(!config.func_marker);
        assert_eq!(config.opcode_table().unwrap().len(), OpcodeTable::builtin().len());
    }

    #[test]
    fn bad_definitions() {
        for body in [
            "[[opcodes]]\ncode = 0xfb50\ncount = \"many\"",
            "[[opcodes]]\ncode = 0xfb50\ncount = 1\nwidth = 3",
            "[[opcodes]]\ncode = 0x1250",
            "[[opcodes]]\ncode = 0xfb50\nmnemonic = \"end\"",
        ] {
            let config: ProjectConfig = toml::from_str(body).unwrap();
            assert!(config.opcode_table().is_err(), "accepted {body:?}");
        }
        assert!(toml::from_str::<ProjectConfig>("colour = 1").is_err());
    }

    #[test]
    fn load_resolves_table_next_to_config() {
        let dir = std::env::temp_dir().join(format!("msg-script-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("game.toml");
        std::fs::write(&path, "moji_table = \"Moji.tbl\"\noffset = 32\n").unwrap();

        let config = ProjectConfig::load(&path).unwrap();
        assert_eq!(config.moji_table, Some(dir.join("Moji.tbl")));
        assert_eq!(config.offset.unwrap().resolve().unwrap(), 32);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
