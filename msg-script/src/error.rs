use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("truncated input: needed {needed} byte(s) at offset 0x{offset:X}, blob is 0x{len:X} bytes")]
    TruncatedInput { offset: usize, needed: usize, len: usize },

    #[error("invalid pointer table at offset 0x{offset:X}: {reason}")]
    InvalidPointerTable { offset: usize, reason: String },

    #[error("malformed escape in block {block}, line {line}: {reason}")]
    MalformedEscapeSyntax { block: usize, line: usize, reason: String },

    #[error("operand {value} does not fit in {width} byte(s) (block {block}, line {line})")]
    OperandOutOfRange { block: usize, line: usize, value: u64, width: usize },

    #[error("record offset 0x{offset:X} of block {block} does not fit in the u16 pointer table")]
    PointerOverflow { block: usize, offset: usize },

    #[error("invalid definition for opcode 0x{code:04X}: {reason}")]
    InvalidOpcodeDefinition { code: u16, reason: String },

    #[error("entry of {0} bytes is too large for an archive entry header")]
    EntryTooLarge(usize),

    #[error("archive entry header: {0}")]
    Header(#[from] binrw::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CodecError>;
