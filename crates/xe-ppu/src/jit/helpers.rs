//! Condition register and XER helpers shared by the emitters
//!
//! Everything that depends on the run-time 32/64-bit mode goes through
//! [`mode_dependent`], the only place that tests MSR.SF.

use super::builder::EmitContext;
use super::ir::{BinOp, Cond, Value, Width};
use crate::state::{cr, msr, xer, Slot};

/// Emit `on32` and `on64` behind a run-time MSR.SF test and merge their
/// results into one value
pub fn mode_dependent<F32, F64>(ctx: &mut EmitContext<'_>, on32: F32, on64: F64) -> Value
where
    F32: FnOnce(&mut EmitContext<'_>) -> Value,
    F64: FnOnce(&mut EmitContext<'_>) -> Value,
{
    let wide = ctx.b.new_label();
    let join = ctx.b.new_label();
    let result = ctx.b.new_value();

    let msr_value = ctx.b.load(Slot::Msr);
    let sf = ctx.b.bin_imm(BinOp::And, msr_value, msr::SF);
    ctx.b.branch_if(sf, wide);

    let narrow = on32(ctx);
    ctx.b.mov(result, narrow);
    ctx.b.jump(join);

    ctx.b.bind(wide);
    let full = on64(ctx);
    ctx.b.mov(result, full);

    ctx.b.bind(join);
    result
}

/// Mask applied to effective addresses and branch targets in the active mode
pub fn address_mask(ctx: &mut EmitContext<'_>) -> Value {
    mode_dependent(ctx, |c| c.b.konst(0xFFFF_FFFF), |c| c.b.konst(u64::MAX))
}

/// Pack LT/GT/EQ predicates and XER.SO into a CR field value
fn pack_field(ctx: &mut EmitContext<'_>, lt: Value, gt: Value, eq: Value) -> Value {
    let lt = ctx.b.bin_imm(BinOp::Shl, lt, 3);
    let gt = ctx.b.bin_imm(BinOp::Shl, gt, 2);
    let eq = ctx.b.bin_imm(BinOp::Shl, eq, 1);
    let xer_value = ctx.b.load(Slot::Xer);
    let so = ctx.b.bin_imm(BinOp::Shr, xer_value, 31);
    let so = ctx.b.bin_imm(BinOp::And, so, 1);

    let field = ctx.b.or(lt, gt);
    let field = ctx.b.or(field, eq);
    ctx.b.or(field, so)
}

/// Three-way signed compare as a CR field (LT/GT/EQ plus SO)
pub fn signed_compare(ctx: &mut EmitContext<'_>, lhs: Value, rhs: Value, width: Width) -> Value {
    let lt = ctx.b.cmp(Cond::Slt, width, lhs, rhs);
    let gt = ctx.b.cmp(Cond::Sgt, width, lhs, rhs);
    let eq = ctx.b.cmp(Cond::Eq, width, lhs, rhs);
    pack_field(ctx, lt, gt, eq)
}

/// Three-way unsigned compare as a CR field (LT/GT/EQ plus SO)
pub fn unsigned_compare(ctx: &mut EmitContext<'_>, lhs: Value, rhs: Value, width: Width) -> Value {
    let lt = ctx.b.cmp(Cond::Ult, width, lhs, rhs);
    let gt = ctx.b.cmp(Cond::Ugt, width, lhs, rhs);
    let eq = ctx.b.cmp(Cond::Eq, width, lhs, rhs);
    pack_field(ctx, lt, gt, eq)
}

/// Replace CR field `index` with the low four bits of `field`
pub fn set_cr_field(ctx: &mut EmitContext<'_>, field: Value, index: usize) {
    let shift = cr::shift(index);
    let cr_value = ctx.b.load(Slot::Cr);
    let cleared = ctx.b.bin_imm(BinOp::AndNot, cr_value, 0xF << shift);
    let field = ctx.b.bin_imm(BinOp::And, field, 0xF);
    let field = ctx.b.bin_imm(BinOp::Shl, field, shift as u64);
    let merged = ctx.b.or(cleared, field);
    ctx.b.store(Slot::Cr, merged);
}

/// Read CR field `index` into the low four bits
pub fn cr_field(ctx: &mut EmitContext<'_>, index: usize) -> Value {
    let cr_value = ctx.b.load(Slot::Cr);
    let field = ctx.b.bin_imm(BinOp::Shr, cr_value, cr::shift(index) as u64);
    ctx.b.bin_imm(BinOp::And, field, 0xF)
}

/// CR0 from a signed compare of `value` with zero in the active width
pub fn set_cr0(ctx: &mut EmitContext<'_>, value: Value) {
    let field = mode_dependent(
        ctx,
        |c| {
            let zero = c.b.konst(0);
            signed_compare(c, value, zero, Width::W32)
        },
        |c| {
            let zero = c.b.konst(0);
            signed_compare(c, value, zero, Width::W64)
        },
    );
    set_cr_field(ctx, field, 0);
}

/// CR1 from FPSCR FX, FEX, VX and OX
pub fn set_cr1(ctx: &mut EmitContext<'_>) {
    let fpscr = ctx.b.load(Slot::Fpscr);
    let field = ctx.b.bin_imm(BinOp::Shr, fpscr, 28);
    set_cr_field(ctx, field, 1);
}

/// Write XER.CA from a 0/1 value
pub fn set_carry(ctx: &mut EmitContext<'_>, carry: Value) {
    let xer_value = ctx.b.load(Slot::Xer);
    let cleared = ctx.b.bin_imm(BinOp::AndNot, xer_value, xer::CA);
    let bit = ctx.b.bin_imm(BinOp::Shl, carry, 29);
    let merged = ctx.b.or(cleared, bit);
    ctx.b.store(Slot::Xer, merged);
}

/// Clear XER.CA
pub fn clear_carry(ctx: &mut EmitContext<'_>) {
    let zero = ctx.b.konst(0);
    set_carry(ctx, zero);
}

/// XER.CA as a 0/1 value
pub fn carry_in(ctx: &mut EmitContext<'_>) -> Value {
    let xer_value = ctx.b.load(Slot::Xer);
    let bit = ctx.b.bin_imm(BinOp::Shr, xer_value, 29);
    ctx.b.bin_imm(BinOp::And, bit, 1)
}

/// Write XER.OV from a 0/1 value and accumulate it into XER.SO
pub fn set_overflow(ctx: &mut EmitContext<'_>, overflow: Value) {
    let xer_value = ctx.b.load(Slot::Xer);
    let cleared = ctx.b.bin_imm(BinOp::AndNot, xer_value, xer::OV);
    let ov = ctx.b.bin_imm(BinOp::Shl, overflow, 30);
    let so = ctx.b.bin_imm(BinOp::Shl, overflow, 31);
    let merged = ctx.b.or(cleared, ov);
    let merged = ctx.b.or(merged, so);
    ctx.b.store(Slot::Xer, merged);
}

/// Carry out of `a + b` in the active width
///
/// The 32-bit carry is computed on its own pass, the 64-bit one on the other;
/// the sum itself is always the full 64-bit result.
pub fn add_carry(ctx: &mut EmitContext<'_>, a: Value, b: Value) -> Value {
    mode_dependent(
        ctx,
        |c| c.b.bin(BinOp::AddCarry, Width::W32, a, b),
        |c| c.b.bin(BinOp::AddCarry, Width::W64, a, b),
    )
}

/// `a + b + carry` and its carry out in the active width
pub fn add_extended(ctx: &mut EmitContext<'_>, a: Value, b: Value, carry: Value) -> (Value, Value) {
    let partial = ctx.b.add(a, b);
    let sum = ctx.b.add(partial, carry);
    let carry_out = mode_dependent(
        ctx,
        |c| {
            let first = c.b.bin(BinOp::AddCarry, Width::W32, a, b);
            let second = c.b.bin(BinOp::AddCarry, Width::W32, partial, carry);
            c.b.or(first, second)
        },
        |c| {
            let first = c.b.bin(BinOp::AddCarry, Width::W64, a, b);
            let second = c.b.bin(BinOp::AddCarry, Width::W64, partial, carry);
            c.b.or(first, second)
        },
    );
    (sum, carry_out)
}

/// Signed overflow of `sum = a + b (+ carry)` in the active width
pub fn add_overflow(ctx: &mut EmitContext<'_>, a: Value, b: Value, sum: Value) -> Value {
    let from_a = ctx.b.xor(a, sum);
    let from_b = ctx.b.xor(b, sum);
    let both = ctx.b.and(from_a, from_b);
    mode_dependent(
        ctx,
        |c| {
            let bit = c.b.bin_imm(BinOp::Shr, both, 31);
            c.b.bin_imm(BinOp::And, bit, 1)
        },
        |c| c.b.bin_imm(BinOp::Shr, both, 63),
    )
}
