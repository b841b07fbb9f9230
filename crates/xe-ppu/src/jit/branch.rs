//! Branch and condition register logical emitters
//!
//! The instruction prologue already stored CIA + 4 into NIA, so a branch only
//! writes NIA and, for the link forms, LR on its taken path. In 32-bit mode
//! both the target and the link value are truncated to 32 bits.

use super::builder::EmitContext;
use super::helpers::{address_mask, cr_field, mode_dependent, set_cr_field};
use super::ir::{BinOp, Cond, Label, UnOp, Value, Width};
use crate::instruction::Instruction;
use crate::state::Slot;

/// BO field bits
pub mod bo {
    /// Ignore the CR bit
    pub const IGNORE_CR: u32 = 0x10;
    /// Branch when the CR bit is set (clear otherwise)
    pub const CR_TRUE: u32 = 0x08;
    /// Leave CTR alone
    pub const NO_CTR: u32 = 0x04;
    /// Branch when the decremented CTR is zero (non-zero otherwise)
    pub const CTR_ZERO: u32 = 0x02;
}

fn link(ctx: &mut EmitContext<'_>, instr: Instruction) {
    if !instr.lk() {
        return;
    }
    let ret = ctx.cia().wrapping_add(4);
    let ret = ctx.b.konst(ret);
    let mask = address_mask(ctx);
    let ret = ctx.b.and(ret, mask);
    ctx.b.store(Slot::Lr, ret);
}

fn set_target(ctx: &mut EmitContext<'_>, target: Value) {
    let mask = address_mask(ctx);
    let target = ctx.b.and(target, mask);
    ctx.b.store(Slot::Nia, target);
}

/// Decrement CTR when BO asks for it; returns the 0/1 CTR condition
fn ctr_condition(ctx: &mut EmitContext<'_>, instr: Instruction) -> Option<Value> {
    if instr.bo() & bo::NO_CTR != 0 {
        return None;
    }
    let ctr = ctx.b.load(Slot::Ctr);
    let ctr = ctx.b.bin_imm(BinOp::Sub, ctr, 1);
    ctx.b.store(Slot::Ctr, ctr);

    let cond = if instr.bo() & bo::CTR_ZERO != 0 { Cond::Eq } else { Cond::Ne };
    Some(mode_dependent(
        ctx,
        |c| c.b.cmp_imm(cond, Width::W32, ctr, 0),
        |c| c.b.cmp_imm(cond, Width::W64, ctr, 0),
    ))
}

/// 0/1 test of CR bit `bi` against BO; `None` when BO ignores the CR
fn cr_condition(ctx: &mut EmitContext<'_>, instr: Instruction) -> Option<Value> {
    if instr.bo() & bo::IGNORE_CR != 0 {
        return None;
    }
    let cr = ctx.b.load(Slot::Cr);
    let bit = ctx.b.bin_imm(BinOp::Shr, cr, (31 - instr.bi()) as u64);
    let bit = ctx.b.bin_imm(BinOp::And, bit, 1);
    let want = (instr.bo() & bo::CR_TRUE != 0) as u64;
    Some(ctx.b.cmp_imm(Cond::Eq, Width::W64, bit, want))
}

/// Emit the BO/BI test and return a label to jump to when not taken
fn conditions(ctx: &mut EmitContext<'_>, instr: Instruction, use_ctr: bool) -> Label {
    let not_taken = ctx.b.new_label();
    let ctr_ok = if use_ctr { ctr_condition(ctx, instr) } else { None };
    let cr_ok = cr_condition(ctx, instr);
    for cond in [ctr_ok, cr_ok].into_iter().flatten() {
        ctx.b.branch_if_zero(cond, not_taken);
    }
    not_taken
}

/// `b`, `ba`, `bl`, `bla`
pub fn b(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let target = if instr.aa() {
        instr.li() as u64
    } else {
        ctx.cia().wrapping_add(instr.li() as u64)
    };
    let target = ctx.b.konst(target);
    set_target(ctx, target);
    link(ctx, instr);
}

/// `bc` and its extended mnemonics
pub fn bc(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let target = if instr.aa() {
        instr.bd() as u64
    } else {
        ctx.cia().wrapping_add(instr.bd() as u64)
    };
    let not_taken = conditions(ctx, instr, true);
    let target = ctx.b.konst(target);
    set_target(ctx, target);
    link(ctx, instr);
    ctx.b.bind(not_taken);
}

/// `bcctr`; BO values that decrement CTR are treated as not decrementing
pub fn bcctr(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let ctr = ctx.b.load(Slot::Ctr);
    let target = ctx.b.bin_imm(BinOp::AndNot, ctr, 3);
    let not_taken = conditions(ctx, instr, false);
    set_target(ctx, target);
    link(ctx, instr);
    ctx.b.bind(not_taken);
}

/// `bclr`; the target is read from LR before the link update
pub fn bclr(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let lr = ctx.b.load(Slot::Lr);
    let target = ctx.b.bin_imm(BinOp::AndNot, lr, 3);
    let not_taken = conditions(ctx, instr, true);
    set_target(ctx, target);
    link(ctx, instr);
    ctx.b.bind(not_taken);
}

// Condition register logical

fn cr_bit(ctx: &mut EmitContext<'_>, cr: Value, bit: u32) -> Value {
    let shifted = ctx.b.bin_imm(BinOp::Shr, cr, (31 - bit) as u64);
    ctx.b.bin_imm(BinOp::And, shifted, 1)
}

fn cr_logical(ctx: &mut EmitContext<'_>, instr: Instruction, op: BinOp, invert: bool) {
    let cr = ctx.b.load(Slot::Cr);
    let a = cr_bit(ctx, cr, instr.crba());
    let b = cr_bit(ctx, cr, instr.crbb());
    let value = ctx.b.bin(op, Width::W64, a, b);
    let value = if invert { ctx.b.un(UnOp::Not, value) } else { value };
    let value = ctx.b.bin_imm(BinOp::And, value, 1);

    let shift = (31 - instr.crbd()) as u64;
    let cleared = ctx.b.bin_imm(BinOp::AndNot, cr, 1 << shift);
    let bit = ctx.b.bin_imm(BinOp::Shl, value, shift);
    let merged = ctx.b.or(cleared, bit);
    ctx.b.store(Slot::Cr, merged);
}

pub fn crand(ctx: &mut EmitContext<'_>, instr: Instruction) {
    cr_logical(ctx, instr, BinOp::And, false);
}

pub fn crandc(ctx: &mut EmitContext<'_>, instr: Instruction) {
    cr_logical(ctx, instr, BinOp::AndNot, false);
}

pub fn creqv(ctx: &mut EmitContext<'_>, instr: Instruction) {
    cr_logical(ctx, instr, BinOp::Xor, true);
}

pub fn crnand(ctx: &mut EmitContext<'_>, instr: Instruction) {
    cr_logical(ctx, instr, BinOp::And, true);
}

pub fn crnor(ctx: &mut EmitContext<'_>, instr: Instruction) {
    cr_logical(ctx, instr, BinOp::Or, true);
}

pub fn cror(ctx: &mut EmitContext<'_>, instr: Instruction) {
    cr_logical(ctx, instr, BinOp::Or, false);
}

pub fn crorc(ctx: &mut EmitContext<'_>, instr: Instruction) {
    cr_logical(ctx, instr, BinOp::OrNot, false);
}

pub fn crxor(ctx: &mut EmitContext<'_>, instr: Instruction) {
    cr_logical(ctx, instr, BinOp::Xor, false);
}

pub fn mcrf(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let field = cr_field(ctx, instr.crfs());
    set_cr_field(ctx, field, instr.crfd());
}
