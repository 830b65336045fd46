// vpx2 - VPX-2000 virtual CPU host
//
// Loads a flat program image as the CPU's memory, runs it from address 0
// and services the standard hostcalls. The program's exit status becomes
// the process exit status.
//
// Usage:
//   vpx2 program.bin
//   vpx2 program.bin --memory-size 65536 --stack 0xf000
//   vpx2 program.bin --disasm

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use vpx2::{disasm, drive, Checked, Cpu, Posture, StdHost, Unchecked};

#[derive(Parser, Debug)]
#[command(name = "vpx2")]
#[command(about = "VPX-2000 virtual CPU")]
#[command(version)]
struct Args {
    /// Program image (raw bytes, loaded at address 0)
    image: PathBuf,

    /// Total memory size; the image is zero-padded up to it
    #[arg(long, value_parser = parse_u32)]
    memory_size: Option<u32>,

    /// Initial stack pointer
    #[arg(long, value_parser = parse_u32, default_value = "0")]
    stack: u32,

    /// Skip register, memory and division validation
    #[arg(long)]
    unchecked: bool,

    /// Print a disassembly listing instead of running
    #[arg(long)]
    disasm: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Decimal or 0x-prefixed hex
fn parse_u32(text: &str) -> Result<u32, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid value {text:?}: {e}"))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut image = std::fs::read(&args.image)
        .with_context(|| format!("Failed to read image {}", args.image.display()))?;
    info!(path = %args.image.display(), bytes = image.len(), "loaded image");

    if args.disasm {
        for inst in disasm::disassemble(&image, 0) {
            println!("{inst}");
            if inst.ends_block() {
                println!();
            }
        }
        return Ok(());
    }

    if let Some(size) = args.memory_size {
        let size = size as usize;
        if size < image.len() {
            anyhow::bail!(
                "--memory-size {size} is smaller than the image ({} bytes)",
                image.len()
            );
        }
        image.resize(size, 0);
    }

    let status = if args.unchecked {
        execute::<Unchecked>(image, args.stack)?
    } else {
        execute::<Checked>(image, args.stack)?
    };

    std::process::exit(status as i32)
}

fn execute<P: Posture>(image: Vec<u8>, stack: u32) -> Result<u32> {
    let mut cpu: Cpu<P> = Cpu::new(image).context("Failed to bind memory image")?;
    cpu.set_sp(stack);
    debug!(posture = P::NAME, memory = cpu.memory().len(), sp = stack, "starting");

    let mut host = StdHost::new(std::io::stdout().lock());
    let status = drive(&mut cpu, &mut host).context("Program halted")?;
    debug!(status, pc = cpu.pc(), "program exited");
    Ok(status)
}
