//! Shared harness for the emitter integration tests
//!
//! Test programs are built from the encoders below, written to guest RAM at
//! [`CODE_BASE`] and run block by block until control leaves the program or
//! an exception is left pending.

#![allow(dead_code)]

use xe_core::config::JitConfig;
use xe_memory::GuestMemory;
use xe_ppu::{translate_block, Executor, ExitReason, ThreadState};

pub const CODE_BASE: u64 = 0x1000;
pub const DATA_BASE: u64 = 0x8000;
pub const MEMORY_SIZE: u64 = 0x10000;

/// Guest RAM, one hardware thread and the translation settings
pub struct Harness {
    pub memory: GuestMemory,
    pub state: ThreadState,
    pub config: JitConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            memory: GuestMemory::new(MEMORY_SIZE).unwrap(),
            state: ThreadState::new(0),
            config: JitConfig::default(),
        }
    }

    /// Start in 32-bit mode
    pub fn narrow(mut self) -> Self {
        self.state.set_64bit(false);
        self
    }

    /// Run `code` from [`CODE_BASE`] until it falls off the end, branches
    /// away, or raises an exception
    pub fn run(&mut self, code: &[u32]) -> ExitReason {
        for (i, word) in code.iter().enumerate() {
            self.memory.write::<u32>(CODE_BASE + 4 * i as u64, *word).unwrap();
        }
        let end = CODE_BASE + 4 * code.len() as u64;
        let executor = Executor::new(1 << 20);

        let mut pc = CODE_BASE;
        for _ in 0..1000 {
            let block = translate_block(&self.memory, pc, &self.config).unwrap();
            match executor.run(&block, &mut self.state, &self.memory).unwrap() {
                ExitReason::Continue { next } if (CODE_BASE..end).contains(&next) => pc = next,
                exit => return exit,
            }
        }
        panic!("program at 0x{:X} did not terminate", CODE_BASE);
    }

    pub fn write_u32(&self, addr: u64, value: u32) {
        self.memory.write::<u32>(addr, value).unwrap();
    }

    pub fn write_u64(&self, addr: u64, value: u64) {
        self.memory.write::<u64>(addr, value).unwrap();
    }

    pub fn read_u32(&self, addr: u64) -> u32 {
        self.memory.read::<u32>(addr).unwrap()
    }

    pub fn read_u64(&self, addr: u64) -> u64 {
        self.memory.read::<u64>(addr).unwrap()
    }
}

// Instruction encoders

fn reg(r: u32) -> u32 {
    r & 0x1F
}

pub fn d_form(opcd: u32, rt: u32, ra: u32, imm: i32) -> u32 {
    (opcd << 26) | (reg(rt) << 21) | (reg(ra) << 16) | (imm as u32 & 0xFFFF)
}

pub fn ds_form(opcd: u32, rt: u32, ra: u32, ds: i32, xo: u32) -> u32 {
    (opcd << 26) | (reg(rt) << 21) | (reg(ra) << 16) | (ds as u32 & 0xFFFC) | (xo & 3)
}

pub fn x_form(opcd: u32, rt: u32, ra: u32, rb: u32, xo: u32, rc: bool) -> u32 {
    (opcd << 26) | (reg(rt) << 21) | (reg(ra) << 16) | (reg(rb) << 11) | (xo << 1) | rc as u32
}

pub fn xo_form(rt: u32, ra: u32, rb: u32, oe: bool, xo: u32, rc: bool) -> u32 {
    (31 << 26) | (reg(rt) << 21) | (reg(ra) << 16) | (reg(rb) << 11) | ((oe as u32) << 10) | (xo << 1) | rc as u32
}

pub fn a_form(opcd: u32, frt: u32, fra: u32, frb: u32, frc: u32, xo: u32, rc: bool) -> u32 {
    (opcd << 26) | (reg(frt) << 21) | (reg(fra) << 16) | (reg(frb) << 11) | (reg(frc) << 6) | (xo << 1) | rc as u32
}

pub fn m_form(opcd: u32, rs: u32, ra: u32, sh: u32, mb: u32, me: u32, rc: bool) -> u32 {
    (opcd << 26) | (reg(rs) << 21) | (reg(ra) << 16) | (reg(sh) << 11) | (reg(mb) << 6) | (reg(me) << 1) | rc as u32
}

pub fn vx_form(vd: u32, va: u32, vb: u32, xo: u32) -> u32 {
    (4 << 26) | (reg(vd) << 21) | (reg(va) << 16) | (reg(vb) << 11) | (xo & 0x7FF)
}

pub fn va_form(vd: u32, va: u32, vb: u32, vc: u32, xo: u32) -> u32 {
    (4 << 26) | (reg(vd) << 21) | (reg(va) << 16) | (reg(vb) << 11) | (reg(vc) << 6) | (xo & 0x3F)
}

pub fn vc_form(vd: u32, va: u32, vb: u32, xo: u32, rc: bool) -> u32 {
    (4 << 26) | (reg(vd) << 21) | (reg(va) << 16) | (reg(vb) << 11) | ((rc as u32) << 10) | (xo & 0x3FF)
}

pub fn bc(bo: u32, bi: u32, bd: i32, lk: bool) -> u32 {
    (16 << 26) | (reg(bo) << 21) | (reg(bi) << 16) | (bd as u32 & 0xFFFC) | lk as u32
}

pub fn b(offset: i32, lk: bool) -> u32 {
    (18 << 26) | (offset as u32 & 0x03FF_FFFC) | lk as u32
}

pub fn addi(rt: u32, ra: u32, imm: i32) -> u32 {
    d_form(14, rt, ra, imm)
}

pub fn li(rt: u32, imm: i32) -> u32 {
    addi(rt, 0, imm)
}

pub fn add(rt: u32, ra: u32, rb: u32) -> u32 {
    xo_form(rt, ra, rb, false, 266, false)
}

pub fn mtspr(spr: u32, rs: u32) -> u32 {
    let swapped = ((spr & 0x1F) << 5) | (spr >> 5);
    (31 << 26) | (reg(rs) << 21) | (swapped << 11) | (467 << 1)
}

pub fn mtctr(rs: u32) -> u32 {
    mtspr(9, rs)
}

pub const NOP: u32 = 0x6000_0000;
pub const BLR: u32 = 0x4E80_0020;
