//! Guest memory for the Xenon JIT
//!
//! A flat, big-endian RAM image with per-page protection. All accesses are
//! host atomics so several guest hardware threads can share one
//! `Arc<GuestMemory>`.

pub mod constants;
pub mod memory;
pub mod pages;

pub use memory::{GuestMemory, GuestValue};
pub use pages::PageFlags;
