//! Vector unit (VMX) emitters
//!
//! Lanes are numbered from the most significant end of the 128-bit value, the
//! guest's element 0. Single-precision lanes are flushed to zero on the way
//! in and on the way out, which is what the hardware does with NJ set.

use super::builder::EmitContext;
use super::helpers::set_cr_field;
use super::ir::{BinOp, Exception, Lane, RoundKind, Value, VecOp};
use crate::instruction::Instruction;
use crate::state::{msr, vscr, Slot};

/// Quiet bit of a single-precision NaN, replicated across the four lanes
const QUIET_LANES: u128 = 0x0040_0000_0040_0000_0040_0000_0040_0000;

fn require_vxu(ctx: &mut EmitContext<'_>) {
    ctx.require_msr(msr::VXU, Exception::VxUnavailable);
}

fn binary(ctx: &mut EmitContext<'_>, instr: Instruction, op: VecOp) {
    require_vxu(ctx);
    let a = ctx.vr(instr.va());
    let b = ctx.vr(instr.vb());
    let value = ctx.b.vector(op, a, Some(b), None);
    ctx.set_vr(instr.vd(), value);
}

fn unary(ctx: &mut EmitContext<'_>, instr: Instruction, op: VecOp) {
    require_vxu(ctx);
    let b = ctx.vr(instr.vb());
    let value = ctx.b.vector(op, b, None, None);
    ctx.set_vr(instr.vd(), value);
}

fn flush(ctx: &mut EmitContext<'_>, value: Value) -> Value {
    ctx.b.vector(VecOp::FlushDenormals, value, None, None)
}

fn float_vr(ctx: &mut EmitContext<'_>, index: usize) -> Value {
    let value = ctx.vr(index);
    flush(ctx, value)
}

fn float_binary(ctx: &mut EmitContext<'_>, instr: Instruction, op: VecOp) {
    require_vxu(ctx);
    let a = float_vr(ctx, instr.va());
    let b = float_vr(ctx, instr.vb());
    let value = ctx.b.vector(op, a, Some(b), None);
    let value = flush(ctx, value);
    ctx.set_vr(instr.vd(), value);
}

fn float_unary(ctx: &mut EmitContext<'_>, instr: Instruction, op: VecOp) {
    require_vxu(ctx);
    let b = float_vr(ctx, instr.vb());
    let value = ctx.b.vector(op, b, None, None);
    let value = flush(ctx, value);
    ctx.set_vr(instr.vd(), value);
}

/// `a * c + b` shapes
fn float_fused(ctx: &mut EmitContext<'_>, instr: Instruction, op: VecOp) {
    require_vxu(ctx);
    let a = float_vr(ctx, instr.va());
    let b = float_vr(ctx, instr.vb());
    let c = float_vr(ctx, instr.vc());
    let value = ctx.b.vector(op, a, Some(b), Some(c));
    let value = flush(ctx, value);
    ctx.set_vr(instr.vd(), value);
}

/// Lanes where `value` is a NaN, as an all-ones mask
fn nan_lanes(ctx: &mut EmitContext<'_>, value: Value) -> Value {
    let ordered = ctx.b.vector(VecOp::CmpEqFloat, value, Some(value), None);
    ctx.b.vector(VecOp::Nor, ordered, Some(ordered), None)
}

/// Replace lanes where either input is NaN with the quieted NaN, `a` first
fn select_nan(ctx: &mut EmitContext<'_>, result: Value, a: Value, b: Value) -> Value {
    let nan_a = nan_lanes(ctx, a);
    let nan_b = nan_lanes(ctx, b);
    let any = ctx.b.vector(VecOp::Or, nan_a, Some(nan_b), None);

    let quiet = ctx.b.konst128(QUIET_LANES);
    let quiet_a = ctx.b.vector(VecOp::Or, a, Some(quiet), None);
    let quiet_b = ctx.b.vector(VecOp::Or, b, Some(quiet), None);
    let nan = ctx.b.vector(VecOp::Select, quiet_b, Some(quiet_a), Some(nan_a));
    ctx.b.vector(VecOp::Select, result, Some(nan), Some(any))
}

fn float_extreme(ctx: &mut EmitContext<'_>, instr: Instruction, op: VecOp) {
    require_vxu(ctx);
    let a = float_vr(ctx, instr.va());
    let b = float_vr(ctx, instr.vb());
    let value = ctx.b.vector(op, a, Some(b), None);
    let value = select_nan(ctx, value, a, b);
    let value = flush(ctx, value);
    ctx.set_vr(instr.vd(), value);
}

fn set_saturation(ctx: &mut EmitContext<'_>, saturated: Value) {
    let current = ctx.b.load(Slot::Vscr);
    let sat = ctx.b.bin_imm(BinOp::And, saturated, vscr::SAT);
    let merged = ctx.b.or(current, sat);
    ctx.b.store(Slot::Vscr, merged);
}

fn saturating(ctx: &mut EmitContext<'_>, instr: Instruction, op: VecOp) {
    require_vxu(ctx);
    let a = ctx.vr(instr.va());
    let b = ctx.vr(instr.vb());
    let (value, saturated) = ctx.b.vector_sat(op, a, b);
    ctx.set_vr(instr.vd(), value);
    set_saturation(ctx, saturated);
}

fn compare(ctx: &mut EmitContext<'_>, instr: Instruction, op: VecOp, float: bool) {
    require_vxu(ctx);
    let (a, b) = if float {
        (float_vr(ctx, instr.va()), float_vr(ctx, instr.vb()))
    } else {
        (ctx.vr(instr.va()), ctx.vr(instr.vb()))
    };
    let mask = ctx.b.vector(op, a, Some(b), None);
    ctx.set_vr(instr.vd(), mask);
    if instr.vrc() {
        let summary = ctx.b.vector(VecOp::CompareSummary, mask, None, None);
        set_cr_field(ctx, summary, 6);
    }
}

macro_rules! vector_ops {
    ($shape:ident: $($name:ident => $op:expr;)*) => {
        $(
            pub fn $name(ctx: &mut EmitContext<'_>, instr: Instruction) {
                $shape(ctx, instr, $op);
            }
        )*
    };
}

// Logical
vector_ops! { binary:
    vand => VecOp::And;
    vandc => VecOp::AndC;
    vor => VecOp::Or;
    vxor => VecOp::Xor;
    vnor => VecOp::Nor;
}

// Merge and integer arithmetic
vector_ops! { binary:
    vmrghb => VecOp::MergeHigh(Lane::Byte);
    vmrghh => VecOp::MergeHigh(Lane::Half);
    vmrghw => VecOp::MergeHigh(Lane::Word);
    vmrglb => VecOp::MergeLow(Lane::Byte);
    vmrglh => VecOp::MergeLow(Lane::Half);
    vmrglw => VecOp::MergeLow(Lane::Word);
    vaddubm => VecOp::AddModulo(Lane::Byte);
    vadduhm => VecOp::AddModulo(Lane::Half);
    vadduwm => VecOp::AddModulo(Lane::Word);
    vsububm => VecOp::SubModulo(Lane::Byte);
    vsubuhm => VecOp::SubModulo(Lane::Half);
    vsubuwm => VecOp::SubModulo(Lane::Word);
    vaddcuw => VecOp::AddCarryWord;
    vpkuwum => VecOp::PackWordModulo;
}

// Shifts; the executor masks each count to the lane width
vector_ops! { binary:
    vslb => VecOp::ShiftLeft(Lane::Byte);
    vslh => VecOp::ShiftLeft(Lane::Half);
    vslw => VecOp::ShiftLeft(Lane::Word);
    vsrb => VecOp::ShiftRight(Lane::Byte);
    vsrh => VecOp::ShiftRight(Lane::Half);
    vsrw => VecOp::ShiftRight(Lane::Word);
    vsrab => VecOp::ShiftRightAlg(Lane::Byte);
    vsrah => VecOp::ShiftRightAlg(Lane::Half);
    vsraw => VecOp::ShiftRightAlg(Lane::Word);
}

vector_ops! { saturating:
    vsubuhs => VecOp::SubUnsignedSat(Lane::Half);
    vpkswss => VecOp::PackWordSignedSat;
}

vector_ops! { float_binary:
    vaddfp => VecOp::FAdd;
    vsubfp => VecOp::FSub;
}

vector_ops! { float_fused:
    vmaddfp => VecOp::FMulAdd;
    vnmsubfp => VecOp::FNegMulSub;
}

vector_ops! { float_extreme:
    vmaxfp => VecOp::FMax;
    vminfp => VecOp::FMin;
}

vector_ops! { float_unary:
    vrfim => VecOp::FRound(RoundKind::Down);
    vrfin => VecOp::FRound(RoundKind::Nearest);
    vrfip => VecOp::FRound(RoundKind::Up);
    vrfiz => VecOp::FRound(RoundKind::TowardZero);
    vrefp => VecOp::FRecipEstimate;
    vrsqrtefp => VecOp::FRsqrtEstimate;
    vexptefp => VecOp::FExp2Estimate;
    vlogefp => VecOp::FLog2Estimate;
}

pub fn vcmpequw(ctx: &mut EmitContext<'_>, instr: Instruction) {
    compare(ctx, instr, VecOp::CmpEqWord, false);
}

pub fn vcmpeqfp(ctx: &mut EmitContext<'_>, instr: Instruction) {
    compare(ctx, instr, VecOp::CmpEqFloat, true);
}

pub fn vcmpgefp(ctx: &mut EmitContext<'_>, instr: Instruction) {
    compare(ctx, instr, VecOp::CmpGeFloat, true);
}

pub fn vcmpgtfp(ctx: &mut EmitContext<'_>, instr: Instruction) {
    compare(ctx, instr, VecOp::CmpGtFloat, true);
}

pub fn vsel(ctx: &mut EmitContext<'_>, instr: Instruction) {
    require_vxu(ctx);
    let a = ctx.vr(instr.va());
    let b = ctx.vr(instr.vb());
    let c = ctx.vr(instr.vc());
    let value = ctx.b.vector(VecOp::Select, a, Some(b), Some(c));
    ctx.set_vr(instr.vd(), value);
}

pub fn vperm(ctx: &mut EmitContext<'_>, instr: Instruction) {
    require_vxu(ctx);
    let a = ctx.vr(instr.va());
    let b = ctx.vr(instr.vb());
    let c = ctx.vr(instr.vc());
    let value = ctx.b.vector(VecOp::Permute, a, Some(b), Some(c));
    ctx.set_vr(instr.vd(), value);
}

pub fn vsldoi(ctx: &mut EmitContext<'_>, instr: Instruction) {
    binary(ctx, instr, VecOp::ShiftLeftDouble(instr.vshb() as u8));
}

fn splat(ctx: &mut EmitContext<'_>, instr: Instruction, lane: Lane) {
    let index = instr.vuimm() as usize % lane.count();
    unary(ctx, instr, VecOp::Splat(lane, index as u8));
}

pub fn vspltb(ctx: &mut EmitContext<'_>, instr: Instruction) {
    splat(ctx, instr, Lane::Byte);
}

pub fn vsplth(ctx: &mut EmitContext<'_>, instr: Instruction) {
    splat(ctx, instr, Lane::Half);
}

pub fn vspltw(ctx: &mut EmitContext<'_>, instr: Instruction) {
    splat(ctx, instr, Lane::Word);
}

/// Replicate the sign-extended immediate into every lane
pub const fn splat_immediate(imm: i32, lane: Lane) -> u128 {
    let bits = lane.bits();
    let element = (imm as u32 as u128) & ((1u128 << bits) - 1);
    let mut value = 0u128;
    let mut i = 0;
    while i < lane.count() {
        value = (value << bits) | element;
        i += 1;
    }
    value
}

fn splat_signed(ctx: &mut EmitContext<'_>, instr: Instruction, lane: Lane) {
    require_vxu(ctx);
    let value = ctx.b.konst128(splat_immediate(instr.vsimm(), lane));
    ctx.set_vr(instr.vd(), value);
}

pub fn vspltisb(ctx: &mut EmitContext<'_>, instr: Instruction) {
    splat_signed(ctx, instr, Lane::Byte);
}

pub fn vspltish(ctx: &mut EmitContext<'_>, instr: Instruction) {
    splat_signed(ctx, instr, Lane::Half);
}

pub fn vspltisw(ctx: &mut EmitContext<'_>, instr: Instruction) {
    splat_signed(ctx, instr, Lane::Word);
}

/// VSCR lands in the last word of `vd`
pub fn mfvscr(ctx: &mut EmitContext<'_>, instr: Instruction) {
    require_vxu(ctx);
    let value = ctx.b.load(Slot::Vscr);
    let value = ctx.b.bin_imm(BinOp::And, value, 0xFFFF_FFFF);
    ctx.set_vr(instr.vd(), value);
}

pub fn mtvscr(ctx: &mut EmitContext<'_>, instr: Instruction) {
    require_vxu(ctx);
    let b = ctx.vr(instr.vb());
    let value = ctx.b.bin_imm(BinOp::And, b, vscr::NJ | vscr::SAT);
    ctx.b.store(Slot::Vscr, value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splat_immediate() {
        assert_eq!(splat_immediate(-1, Lane::Byte), u128::MAX);
        assert_eq!(splat_immediate(1, Lane::Word), 0x0000_0001_0000_0001_0000_0001_0000_0001);
        assert_eq!(splat_immediate(-16, Lane::Half), 0xFFF0_FFF0_FFF0_FFF0_FFF0_FFF0_FFF0_FFF0);
        assert_eq!(splat_immediate(15, Lane::Byte), u128::from_be_bytes([0x0F; 16]));
    }

    #[test]
    fn test_quiet_lanes_pattern() {
        let words = crate::vmx::Vector128::from_u128(QUIET_LANES).words;
        assert_eq!(words, [crate::jit::float::QUIET_BIT_SINGLE; 4]);
    }
}
