//! Block dump tool
//!
//! Translates PowerPC instruction words into host IR blocks and prints them.
//! Words come either from hex arguments or from a raw big-endian image file.
//!
//! ```text
//! block-dump 7C632214 4E800020
//! block-dump --file code.bin [--base 0x10000]
//! ```

use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use xe_core::config::JitConfig;
use xe_memory::GuestMemory;
use xe_ppu::{lookup, translate_block, Instruction};

const DEFAULT_BASE: u64 = 0x1_0000;

enum Source {
    Words(Vec<u32>),
    File(PathBuf),
}

fn main() -> Result<()> {
    init_logging();

    let mut args = env::args().skip(1);
    let mut base = DEFAULT_BASE;
    let mut file = None;
    let mut words = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--file" => file = Some(PathBuf::from(args.next().context("--file needs a path")?)),
            "--base" => base = parse_hex(&args.next().context("--base needs an address")?)?,
            word => words.push(parse_hex(word)? as u32),
        }
    }

    let source = match (file, words.is_empty()) {
        (Some(path), true) => Source::File(path),
        (None, false) => Source::Words(words),
        _ => bail!("Usage: block-dump <hex words...> | --file <image> [--base <addr>]"),
    };

    let image = match source {
        Source::Words(words) => words.iter().flat_map(|w| w.to_be_bytes()).collect::<Vec<u8>>(),
        Source::File(path) => std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?,
    };
    dump(&image, base)
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_hex(text: &str) -> Result<u64> {
    let digits = text.trim_start_matches("0x").trim_start_matches("0X");
    u64::from_str_radix(digits, 16).with_context(|| format!("Invalid hex value: {}", text))
}

/// Translate every block in `image` loaded at `base`, back to back
fn dump(image: &[u8], base: u64) -> Result<()> {
    if image.len() % 4 != 0 {
        bail!("Image length {} is not a whole number of instructions", image.len());
    }
    let size = (base + image.len() as u64 + 0xFFF) & !0xFFF;
    let memory = GuestMemory::new(size).context("Failed to allocate guest memory")?;
    memory.load_image(base, image).context("Failed to load image")?;

    let config = JitConfig::default();
    let end = base + image.len() as u64;
    let mut addr = base;
    let mut blocks = 0usize;
    while addr < end {
        let word = memory.fetch(addr)?;
        if lookup(Instruction(word)).is_none() {
            println!("; 0x{:08X}: {:08X}  (no emitter)\n", addr, word);
            addr += 4;
            continue;
        }

        let block = translate_block(&memory, addr, &config)?;
        println!("{}", block);
        addr += 4 * block.instructions as u64;
        blocks += 1;
    }
    tracing::info!("Translated {} blocks from {} words", blocks, image.len() / 4);
    Ok(())
}
