//! Special-purpose register moves, CR/MSR moves and barriers
//!
//! SPR numbers are resolved while translating, so an unknown SPR costs one
//! warning per translation rather than a run-time lookup.

use tracing::warn;

use super::builder::EmitContext;
use super::ir::{BinOp, Exception, Helper, UnOp, Value};
use crate::instruction::Instruction;
use crate::state::{msr, Slot};

/// SPR numbers (halves already swapped back)
pub mod spr {
    pub const XER: u32 = 1;
    pub const LR: u32 = 8;
    pub const CTR: u32 = 9;
    pub const DSISR: u32 = 18;
    pub const DAR: u32 = 19;
    pub const DEC: u32 = 22;
    pub const SRR0: u32 = 26;
    pub const SRR1: u32 = 27;
    pub const CFAR: u32 = 28;
    pub const TBL: u32 = 268;
    pub const TBU: u32 = 269;
    pub const PIR: u32 = 1023;
}

/// MSR bits `mtmsrd` with L=1 may change
pub const MSR_L1_MASK: u64 = msr::EE | msr::RI;

fn spr_slot(number: u32) -> Option<Slot> {
    Some(match number {
        spr::XER => Slot::Xer,
        spr::LR => Slot::Lr,
        spr::CTR => Slot::Ctr,
        spr::DSISR => Slot::Dsisr,
        spr::DAR => Slot::Dar,
        spr::DEC => Slot::Dec,
        spr::SRR0 => Slot::Srr0,
        spr::SRR1 => Slot::Srr1,
        spr::CFAR => Slot::Cfar,
        _ => return None,
    })
}

/// Expand a CRM field mask into a 32-bit CR mask
pub const fn crm_mask(crm: u32) -> u64 {
    let mut mask = 0u64;
    let mut field = 0;
    while field < 8 {
        if crm & (0x80 >> field) != 0 {
            mask |= 0xF << ((7 - field) * 4);
        }
        field += 1;
    }
    mask
}

fn time_base(ctx: &mut EmitContext<'_>, upper: bool) -> Value {
    let tb = ctx.b.call(Helper::ReadTimeBase, Vec::new());
    if upper {
        ctx.b.bin_imm(BinOp::Shr, tb, 32)
    } else {
        tb
    }
}

pub fn mfspr(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let number = instr.spr();
    let value = match number {
        spr::TBL | spr::TBU => time_base(ctx, number == spr::TBU),
        spr::PIR => ctx.b.load(Slot::ThreadId),
        _ => match spr_slot(number) {
            Some(slot) => ctx.b.load(slot),
            None => {
                warn!("mfspr: unknown SPR {} at 0x{:08X}, reads as zero", number, ctx.cia());
                ctx.b.konst(0)
            }
        },
    };
    let value = if number == spr::XER {
        ctx.b.un(UnOp::Zext32, value)
    } else {
        value
    };
    ctx.set_gpr(instr.rd(), value);
}

pub fn mtspr(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let number = instr.spr();
    let Some(slot) = spr_slot(number) else {
        warn!("mtspr: unknown SPR {} at 0x{:08X}, write ignored", number, ctx.cia());
        return;
    };
    let value = ctx.gpr(instr.rs());
    let value = if number == spr::XER {
        ctx.b.un(UnOp::Zext32, value)
    } else {
        value
    };
    ctx.b.store(slot, value);
}

pub fn mftb(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let value = time_base(ctx, instr.spr() == spr::TBU);
    ctx.set_gpr(instr.rd(), value);
}

/// `mfcr`, or `mfocrf` when L11 is set
pub fn mfcr(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let cr = ctx.b.load(Slot::Cr);
    let value = if !instr.l11() {
        cr
    } else if instr.crm().count_ones() == 1 {
        ctx.b.bin_imm(BinOp::And, cr, crm_mask(instr.crm()))
    } else {
        ctx.b.konst(0)
    };
    ctx.set_gpr(instr.rd(), value);
}

/// `mtcrf` and `mtocrf`
pub fn mtcrf(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let mask = crm_mask(instr.crm());
    let rs = ctx.gpr(instr.rs());
    let cr = ctx.b.load(Slot::Cr);
    let kept = ctx.b.bin_imm(BinOp::AndNot, cr, mask);
    let inserted = ctx.b.bin_imm(BinOp::And, rs, mask);
    let merged = ctx.b.or(kept, inserted);
    ctx.b.store(Slot::Cr, merged);
}

pub fn mfmsr(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let value = ctx.b.load(Slot::Msr);
    ctx.set_gpr(instr.rd(), value);
}

pub fn mtmsrd(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let rs = ctx.gpr(instr.rs());
    if instr.l15() {
        let current = ctx.b.load(Slot::Msr);
        let kept = ctx.b.bin_imm(BinOp::AndNot, current, MSR_L1_MASK);
        let inserted = ctx.b.bin_imm(BinOp::And, rs, MSR_L1_MASK);
        let merged = ctx.b.or(kept, inserted);
        ctx.b.store(Slot::Msr, merged);
        return;
    }

    // SF |= bit 1; EE, IR and DR are forced on by PR.
    let hv = ctx.b.bin_imm(BinOp::Shl, rs, 1);
    let hv = ctx.b.bin_imm(BinOp::And, hv, msr::SF);
    let pr = ctx.b.bin_imm(BinOp::And, rs, msr::PR);
    let pr = ctx.b.bin_imm(BinOp::Shr, pr, 14);
    let forced = ctx.b.konst(msr::EE | msr::IR | msr::DR);
    let zero = ctx.b.konst(0);
    let forced = ctx.b.select(pr, forced, zero);
    let value = ctx.b.or(rs, hv);
    let value = ctx.b.or(value, forced);
    ctx.b.store(Slot::Msr, value);
}

pub fn sc(ctx: &mut EmitContext<'_>, instr: Instruction) {
    ctx.raise(Exception::SystemCall(instr.lev() as u8));
}

/// `sync`, `isync`, `eieio` and the cache hints: nothing to emit on a
/// single coherent host memory
pub fn barrier(_ctx: &mut EmitContext<'_>, _instr: Instruction) {}
