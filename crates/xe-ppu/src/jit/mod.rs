//! Translation of guest instructions into host operations

pub mod alu;
pub mod branch;
pub mod builder;
pub mod exec;
pub mod float;
pub mod fpu;
pub mod helpers;
pub mod ir;
pub mod load_store;
pub mod mmu;
pub mod system;
pub mod table;
pub mod vxu;
