//! Xenon PPE (PowerPC) JIT emitter core
//!
//! Guest instructions are translated one at a time into a flat list of host
//! operations ([`jit::ir::HostOp`]) by per-opcode emitters. A translated
//! [`jit::ir::Block`] runs on [`jit::exec::Executor`] against a
//! [`state::ThreadState`] and guest memory reached through [`jit::mmu::Mmu`].

pub mod instruction;
pub mod jit;
pub mod state;
pub mod vmx;

pub use instruction::Instruction;
pub use jit::exec::{Executor, ExitReason};
pub use jit::ir::Block;
pub use jit::table::{lookup, translate_block, Emitter};
pub use state::{Slot, ThreadState};
pub use vmx::Vector128;
