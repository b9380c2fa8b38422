use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use msg_moji::CharTable;
use msg_script::{parse_offset, render_script, Decoder, ProjectConfig};

#[derive(Parser, Debug)]
#[command(version, about = "MSG dialogue script to annotated text")]
struct Args {
    input: PathBuf,

    output: PathBuf,

    /// Pointer table position, e.g. `0x10`, `32` or `0x1000+0x20`.
    #[arg(long)]
    offset: Option<String>,

    /// Every record starts with a big-endian function id.
    #[arg(long)]
    func: bool,

    #[arg(long)]
    moji: Option<PathBuf>,

    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ProjectConfig::load(path)?,
        None => ProjectConfig::default(),
    };

    let offset = match (&args.offset, &config.offset) {
        (Some(s), _) => parse_offset(s)?,
        (None, Some(v)) => v.resolve()?,
        (None, None) => 0,
    };
    let moji_path = args
        .moji
        .or(config.moji_table.clone())
        .unwrap_or_else(|| PathBuf::from("Moji.tbl"));
    let glyphs = CharTable::load(&moji_path)?;
    let opcodes = config.opcode_table()?;

    let blob = fs::read(&args.input).with_context(|| format!("read input: {}", args.input.display()))?;
    let decoder = Decoder::new(&opcodes, &glyphs).with_func_marker(args.func || config.func_marker);
    let records = decoder
        .decode_blob(&blob, offset)
        .with_context(|| format!("decoding {} at 0x{offset:X}", args.input.display()))?;

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(&args.output, render_script(&records))
        .with_context(|| format!("writing output: {}", args.output.display()))?;

    log::info!("{}: {} records -> {}", args.input.display(), records.len(), args.output.display());
    Ok(())
}
