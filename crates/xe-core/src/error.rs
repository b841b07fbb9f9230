//! Error types shared across the Xenon JIT crates

use thiserror::Error;

/// Result alias used by the core crates
pub type Result<T> = std::result::Result<T, XenonError>;

/// Top-level error
#[derive(Debug, Error)]
pub enum XenonError {
    #[error("JIT error: {0}")]
    Jit(#[from] JitError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while building or running translated blocks
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JitError {
    /// No emitter exists for this instruction word
    #[error("Unimplemented instruction 0x{opcode:08X} at 0x{addr:016X}")]
    Unimplemented { addr: u64, opcode: u32 },

    /// The instruction encoding is architecturally invalid
    #[error("Invalid instruction form 0x{opcode:08X}: {reason}")]
    InvalidForm { opcode: u32, reason: &'static str },

    /// A label was jumped to but never bound
    #[error("Label {0} was never bound")]
    UnboundLabel(u32),

    /// A virtual register was read before it was written
    #[error("Value v{0} read before definition")]
    UndefinedValue(u32),

    /// The host would have faulted on an integer divide
    #[error("Host divide fault (divisor was zero or the quotient overflowed)")]
    DivideFault,

    /// A block ran for longer than the configured step budget
    #[error("Block at 0x{addr:016X} exceeded {limit} host operations")]
    StepLimit { addr: u64, limit: u64 },

    /// A block was finalized without any instructions
    #[error("Empty block at 0x{0:016X}")]
    EmptyBlock(u64),

    /// The first instruction of a block could not be fetched
    #[error("Instruction fetch failed at 0x{addr:016X}: {source}")]
    Fetch { addr: u64, source: MemoryError },
}

/// Guest memory errors
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Address 0x{0:016X} is not mapped")]
    Unmapped(u64),

    #[error("Access violation at 0x{addr:016X} (write: {write})")]
    AccessViolation { addr: u64, write: bool },

    #[error("Misaligned atomic access at 0x{0:016X}")]
    Misaligned(u64),

    #[error("Host address 0x{0:X} is outside guest memory")]
    BadHostAddress(u64),

    #[error("Out of memory (requested 0x{0:X} bytes)")]
    OutOfMemory(u64),
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("No configuration directory available on this platform")]
    NoConfigDir,
}
