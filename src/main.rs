//! Xenon JIT block runner
//!
//! Loads a raw big-endian PowerPC code image into guest RAM and runs it
//! through the translator until an exception is raised or the block budget
//! runs out.

mod runner;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use xe_core::config::Config;
use xe_memory::GuestMemory;

use runner::{Runner, Stop};

const DEFAULT_MAX_BLOCKS: u64 = 1_000_000;

struct Args {
    image: PathBuf,
    config: Option<PathBuf>,
    entry: Option<u64>,
    max_blocks: u64,
}

fn parse_u64(text: &str) -> Result<u64> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.with_context(|| format!("Invalid number: {}", text))
}

fn parse_args() -> Result<Args> {
    let mut args = env::args().skip(1);
    let mut image = None;
    let mut config = None;
    let mut entry = None;
    let mut max_blocks = DEFAULT_MAX_BLOCKS;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(PathBuf::from(args.next().context("--config needs a path")?)),
            "--entry" => entry = Some(parse_u64(&args.next().context("--entry needs an address")?)?),
            "--max-blocks" => max_blocks = parse_u64(&args.next().context("--max-blocks needs a count")?)?,
            flag if flag.starts_with("--") => bail!("Unknown option {}", flag),
            path => image = Some(PathBuf::from(path)),
        }
    }

    let Some(image) = image else {
        bail!("Usage: xenon-jit <image> [--config <path>] [--entry <addr>] [--max-blocks <n>]");
    };
    Ok(Args {
        image,
        config,
        entry,
        max_blocks,
    })
}

fn main() -> Result<()> {
    let args = parse_args()?;

    let config = match &args.config {
        Some(path) => Config::load_from(path).with_context(|| format!("Failed to load {}", path.display()))?,
        None => Config::load().unwrap_or_default(),
    };
    xe_core::logging::init(&config);

    tracing::info!("Starting Xenon JIT runner");

    let image = std::fs::read(&args.image).with_context(|| format!("Failed to read {}", args.image.display()))?;
    let memory = Arc::new(GuestMemory::new(config.memory.ram_size).context("Failed to allocate guest memory")?);
    memory
        .load_image(config.memory.load_address, &image)
        .context("Code image does not fit in guest memory")?;
    tracing::info!(
        "Loaded {} ({} bytes) at 0x{:08X}",
        args.image.display(),
        image.len(),
        config.memory.load_address
    );

    let entry = args.entry.unwrap_or(config.memory.load_address);
    let mut runner = Runner::new(memory, config.jit.clone());
    match runner.run(entry, args.max_blocks)? {
        Stop::Exception { pending, cia } => {
            tracing::info!("Exception 0x{:X} pending at 0x{:016X}", pending, cia);
        }
        Stop::BlockLimit { next } => {
            tracing::warn!("Block budget of {} exhausted, next 0x{:016X}", args.max_blocks, next);
        }
    }
    tracing::info!("{} blocks translated", runner.cache().len());

    let state = &runner.state;
    for row in 0..8 {
        let regs: Vec<String> = (0..4)
            .map(|col| {
                let index = row * 4 + col;
                format!("r{:<2} {:016X}", index, state.gpr[index])
            })
            .collect();
        println!("{}", regs.join("  "));
    }
    println!("cr  {:08X}  xer {:016X}  lr {:016X}  ctr {:016X}", state.cr, state.xer, state.lr, state.ctr);
    Ok(())
}
