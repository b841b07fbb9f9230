//! Xenon memory map constants

/// Standard page size (4 KB)
pub const PAGE_SIZE: u64 = 0x1000;

/// Effective addresses at or above this bound fault with a segment error
pub const SEGMENT_LIMIT: u64 = 0x1_0000_0000;
