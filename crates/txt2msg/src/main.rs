use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use msg_moji::CharTable;
use msg_script::{ArchiveEntryHeader, Encoder, ProjectConfig};

const HEADER_TABLE: &str = "HEADER.BIN";

#[derive(Parser, Debug)]
#[command(version, about = "Annotated text back to an MSG dialogue script")]
struct Args {
    input: PathBuf,

    /// Defaults to the input path with a `.MSG` extension.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pad the blob to whole archive chunks and refresh its entry in the
    /// HEADER.BIN next to the input. The input name must start with the
    /// 4-digit entry index.
    #[arg(long)]
    header: bool,

    #[arg(long)]
    moji: Option<PathBuf>,

    #[arg(long)]
    config: Option<PathBuf>,
}

/// Entry index encoded in the first four characters of the file name.
fn entry_slot(input: &Path) -> Result<usize> {
    let name = input
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("input has no file name: {}", input.display()))?;
    match name.get(..4) {
        Some(prefix) if prefix.bytes().all(|b| b.is_ascii_digit()) => Ok(prefix.parse()?),
        _ => Err(anyhow!("the first 4 characters of {name:?} must be digits")),
    }
}

fn patch_header_table(input: &Path, header: &ArchiveEntryHeader, slot: usize) -> Result<()> {
    let path = input.parent().unwrap_or_else(|| Path::new("")).join(HEADER_TABLE);
    let mut table = fs::read(&path).with_context(|| format!("read header table: {}", path.display()))?;
    header.patch_into(&mut table, slot)?;
    fs::write(&path, table).with_context(|| format!("writing header table: {}", path.display()))?;
    log::info!("patched slot {slot} of {}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    let args = Args::parse();

    // fail before encoding when the name cannot carry a slot
    let slot = if args.header { Some(entry_slot(&args.input)?) } else { None };

    let config = match &args.config {
        Some(path) => ProjectConfig::load(path)?,
        None => ProjectConfig::default(),
    };
    let moji_path = args
        .moji
        .clone()
        .or(config.moji_table.clone())
        .unwrap_or_else(|| PathBuf::from("Moji.tbl"));
    let glyphs = CharTable::load(&moji_path)?;
    let opcodes = config.opcode_table()?;

    let script = fs::read_to_string(&args.input).with_context(|| format!("read input: {}", args.input.display()))?;
    let mut blob = Encoder::new(&opcodes, &glyphs)
        .encode(&script)
        .with_context(|| format!("encoding {}", args.input.display()))?;

    if let Some(slot) = slot {
        let (header, padded) = ArchiveEntryHeader::wrap(&blob)?;
        patch_header_table(&args.input, &header, slot)?;
        blob = padded;
    }

    let output = args.output.unwrap_or_else(|| args.input.with_extension("MSG"));
    fs::write(&output, &blob).with_context(|| format!("writing output: {}", output.display()))?;

    log::info!("{} -> {} ({} bytes)", args.input.display(), output.display(), blob.len());
    Ok(())
}
