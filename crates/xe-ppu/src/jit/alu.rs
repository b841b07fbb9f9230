//! Integer arithmetic, logical, rotate, shift, compare and trap emitters

use super::builder::EmitContext;
use super::helpers::{
    add_carry, add_extended, add_overflow, carry_in, clear_carry, mode_dependent, set_carry, set_cr0,
    set_cr_field, set_overflow, signed_compare, unsigned_compare,
};
use super::ir::{BinOp, Cond, Exception, UnOp, Value, Width};
use crate::instruction::Instruction;

/// 64-bit mask with bits `mb..=me` set (bit 0 is the MSB), wrapping when
/// `mb > me`
pub const fn mask64(mb: u32, me: u32) -> u64 {
    let begin = u64::MAX >> (mb & 63);
    let end = u64::MAX << (63 - (me & 63));
    if mb <= me {
        begin & end
    } else {
        begin | end
    }
}

fn record(ctx: &mut EmitContext<'_>, instr: Instruction, value: Value) {
    if instr.rc() {
        set_cr0(ctx, value);
    }
}

/// Write `rd`, then OV (OE forms) and CR0 (record forms)
fn finish_xo(ctx: &mut EmitContext<'_>, instr: Instruction, value: Value, overflow: impl FnOnce(&mut EmitContext<'_>) -> Value) {
    ctx.set_gpr(instr.rd(), value);
    if instr.oe() {
        let ov = overflow(ctx);
        set_overflow(ctx, ov);
    }
    record(ctx, instr, value);
}

// Add and subtract

pub fn add(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let a = ctx.gpr(instr.ra());
    let b = ctx.gpr(instr.rb());
    let sum = ctx.b.add(a, b);
    finish_xo(ctx, instr, sum, |c| add_overflow(c, a, b, sum));
}

pub fn addc(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let a = ctx.gpr(instr.ra());
    let b = ctx.gpr(instr.rb());
    let sum = ctx.b.add(a, b);
    let carry = add_carry(ctx, a, b);
    set_carry(ctx, carry);
    finish_xo(ctx, instr, sum, |c| add_overflow(c, a, b, sum));
}

/// `rd = a + b + carry` with CA, shared by the extended add/subtract forms
fn add_extended_into(ctx: &mut EmitContext<'_>, instr: Instruction, a: Value, b: Value, carry: Value) {
    let (sum, carry_out) = add_extended(ctx, a, b, carry);
    set_carry(ctx, carry_out);
    finish_xo(ctx, instr, sum, |c| add_overflow(c, a, b, sum));
}

pub fn adde(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let a = ctx.gpr(instr.ra());
    let b = ctx.gpr(instr.rb());
    let ca = carry_in(ctx);
    add_extended_into(ctx, instr, a, b, ca);
}

pub fn addze(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let a = ctx.gpr(instr.ra());
    let zero = ctx.b.konst(0);
    let ca = carry_in(ctx);
    add_extended_into(ctx, instr, a, zero, ca);
}

pub fn addme(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let a = ctx.gpr(instr.ra());
    let minus_one = ctx.b.konst(u64::MAX);
    let ca = carry_in(ctx);
    add_extended_into(ctx, instr, a, minus_one, ca);
}

pub fn addi(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let base = ctx.gpr_or_zero(instr.ra());
    let sum = ctx.b.bin_imm(BinOp::Add, base, instr.simm16() as u64);
    ctx.set_gpr(instr.rd(), sum);
}

pub fn addis(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let base = ctx.gpr_or_zero(instr.ra());
    let sum = ctx.b.bin_imm(BinOp::Add, base, (instr.simm16() << 16) as u64);
    ctx.set_gpr(instr.rd(), sum);
}

fn addic_common(ctx: &mut EmitContext<'_>, instr: Instruction, record_cr0: bool) {
    let a = ctx.gpr(instr.ra());
    let imm = ctx.b.konst(instr.simm16() as u64);
    let sum = ctx.b.add(a, imm);
    let carry = add_carry(ctx, a, imm);
    set_carry(ctx, carry);
    ctx.set_gpr(instr.rd(), sum);
    if record_cr0 {
        set_cr0(ctx, sum);
    }
}

pub fn addic(ctx: &mut EmitContext<'_>, instr: Instruction) {
    addic_common(ctx, instr, false);
}

/// `addic.` always updates CR0
pub fn addic_rc(ctx: &mut EmitContext<'_>, instr: Instruction) {
    addic_common(ctx, instr, true);
}

pub fn subf(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let a = ctx.gpr(instr.ra());
    let b = ctx.gpr(instr.rb());
    let diff = ctx.b.bin(BinOp::Sub, Width::W64, b, a);
    finish_xo(ctx, instr, diff, |c| {
        let not_a = c.b.un(UnOp::Not, a);
        add_overflow(c, not_a, b, diff)
    });
}

/// `rd = !ra + b + carry` with CA
fn subtract_extended(ctx: &mut EmitContext<'_>, instr: Instruction, b: Value, carry: Value) {
    let a = ctx.gpr(instr.ra());
    let not_a = ctx.b.un(UnOp::Not, a);
    add_extended_into(ctx, instr, not_a, b, carry);
}

pub fn subfc(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let b = ctx.gpr(instr.rb());
    let one = ctx.b.konst(1);
    subtract_extended(ctx, instr, b, one);
}

pub fn subfe(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let b = ctx.gpr(instr.rb());
    let ca = carry_in(ctx);
    subtract_extended(ctx, instr, b, ca);
}

pub fn subfze(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let zero = ctx.b.konst(0);
    let ca = carry_in(ctx);
    subtract_extended(ctx, instr, zero, ca);
}

pub fn subfme(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let minus_one = ctx.b.konst(u64::MAX);
    let ca = carry_in(ctx);
    subtract_extended(ctx, instr, minus_one, ca);
}

pub fn subfic(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let a = ctx.gpr(instr.ra());
    let not_a = ctx.b.un(UnOp::Not, a);
    let imm = ctx.b.konst(instr.simm16() as u64);
    let one = ctx.b.konst(1);
    let (diff, carry) = add_extended(ctx, not_a, imm, one);
    set_carry(ctx, carry);
    ctx.set_gpr(instr.rd(), diff);
}

pub fn neg(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let a = ctx.gpr(instr.ra());
    let negated = ctx.b.un(UnOp::Neg, a);
    finish_xo(ctx, instr, negated, |c| {
        mode_dependent(
            c,
            |c| c.b.cmp_imm(Cond::Eq, Width::W32, a, 0x8000_0000),
            |c| c.b.cmp_imm(Cond::Eq, Width::W64, a, 1 << 63),
        )
    });
}

// Multiply

pub fn mullw(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let a = ctx.gpr(instr.ra());
    let b = ctx.gpr(instr.rb());
    let a = ctx.b.un(UnOp::Sext32, a);
    let b = ctx.b.un(UnOp::Sext32, b);
    let product = ctx.b.bin(BinOp::Mul, Width::W64, a, b);
    finish_xo(ctx, instr, product, |c| {
        let narrowed = c.b.un(UnOp::Sext32, product);
        c.b.cmp(Cond::Ne, Width::W64, narrowed, product)
    });
}

pub fn mulld(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let a = ctx.gpr(instr.ra());
    let b = ctx.gpr(instr.rb());
    let product = ctx.b.bin(BinOp::Mul, Width::W64, a, b);
    finish_xo(ctx, instr, product, |c| {
        let high = c.b.bin(BinOp::MulHiS, Width::W64, a, b);
        let sign = c.b.bin_imm(BinOp::Sar, product, 63);
        c.b.cmp(Cond::Ne, Width::W64, high, sign)
    });
}

pub fn mulli(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let a = ctx.gpr(instr.ra());
    let product = ctx.b.bin_imm(BinOp::Mul, a, instr.simm16() as u64);
    ctx.set_gpr(instr.rd(), product);
}

fn mul_high(ctx: &mut EmitContext<'_>, instr: Instruction, op: BinOp, width: Width) {
    let a = ctx.gpr(instr.ra());
    let b = ctx.gpr(instr.rb());
    let high = ctx.b.bin(op, width, a, b);
    ctx.set_gpr(instr.rd(), high);
    record(ctx, instr, high);
}

pub fn mulhw(ctx: &mut EmitContext<'_>, instr: Instruction) {
    mul_high(ctx, instr, BinOp::MulHiS, Width::W32);
}

pub fn mulhwu(ctx: &mut EmitContext<'_>, instr: Instruction) {
    mul_high(ctx, instr, BinOp::MulHiU, Width::W32);
}

pub fn mulhd(ctx: &mut EmitContext<'_>, instr: Instruction) {
    mul_high(ctx, instr, BinOp::MulHiS, Width::W64);
}

pub fn mulhdu(ctx: &mut EmitContext<'_>, instr: Instruction) {
    mul_high(ctx, instr, BinOp::MulHiU, Width::W64);
}

// Divide

/// Emit a divide that never reaches the host divide with a zero divisor or
/// an overflowing quotient; both cases produce 0 and OV
fn divide(ctx: &mut EmitContext<'_>, instr: Instruction, width: Width, signed: bool) {
    let a = ctx.gpr(instr.ra());
    let b = ctx.gpr(instr.rb());
    let result = ctx.b.new_value();
    let overflow = ctx.b.new_value();
    let invalid = ctx.b.new_label();
    let done = ctx.b.new_label();

    let by_zero = ctx.b.cmp_imm(Cond::Eq, width, b, 0);
    ctx.b.branch_if(by_zero, invalid);
    if signed {
        let min = match width {
            Width::W32 => 0x8000_0000,
            Width::W64 => 1 << 63,
        };
        let is_min = ctx.b.cmp_imm(Cond::Eq, width, a, min);
        let is_minus_one = ctx.b.cmp_imm(Cond::Eq, width, b, u64::MAX);
        let both = ctx.b.and(is_min, is_minus_one);
        ctx.b.branch_if(both, invalid);
    }

    let op = if signed { BinOp::DivS } else { BinOp::DivU };
    let quotient = ctx.b.bin(op, width, a, b);
    let quotient = if signed && width == Width::W32 {
        ctx.b.un(UnOp::Sext32, quotient)
    } else {
        quotient
    };
    ctx.b.mov(result, quotient);
    let clear = ctx.b.konst(0);
    ctx.b.mov(overflow, clear);
    ctx.b.jump(done);

    ctx.b.bind(invalid);
    let zero = ctx.b.konst(0);
    ctx.b.mov(result, zero);
    let one = ctx.b.konst(1);
    ctx.b.mov(overflow, one);

    ctx.b.bind(done);
    finish_xo(ctx, instr, result, |_| overflow);
}

pub fn divw(ctx: &mut EmitContext<'_>, instr: Instruction) {
    divide(ctx, instr, Width::W32, true);
}

pub fn divwu(ctx: &mut EmitContext<'_>, instr: Instruction) {
    divide(ctx, instr, Width::W32, false);
}

pub fn divd(ctx: &mut EmitContext<'_>, instr: Instruction) {
    divide(ctx, instr, Width::W64, true);
}

pub fn divdu(ctx: &mut EmitContext<'_>, instr: Instruction) {
    divide(ctx, instr, Width::W64, false);
}

// Logical

/// X-form logical op: `ra = rs op rb`
fn logical(ctx: &mut EmitContext<'_>, instr: Instruction, op: BinOp, invert: bool) {
    let s = ctx.gpr(instr.rs());
    let b = ctx.gpr(instr.rb());
    let value = ctx.b.bin(op, Width::W64, s, b);
    let value = if invert { ctx.b.un(UnOp::Not, value) } else { value };
    ctx.set_gpr(instr.ra(), value);
    record(ctx, instr, value);
}

pub fn and(ctx: &mut EmitContext<'_>, instr: Instruction) {
    logical(ctx, instr, BinOp::And, false);
}

pub fn andc(ctx: &mut EmitContext<'_>, instr: Instruction) {
    logical(ctx, instr, BinOp::AndNot, false);
}

pub fn or(ctx: &mut EmitContext<'_>, instr: Instruction) {
    logical(ctx, instr, BinOp::Or, false);
}

pub fn orc(ctx: &mut EmitContext<'_>, instr: Instruction) {
    logical(ctx, instr, BinOp::OrNot, false);
}

pub fn xor(ctx: &mut EmitContext<'_>, instr: Instruction) {
    logical(ctx, instr, BinOp::Xor, false);
}

pub fn nand(ctx: &mut EmitContext<'_>, instr: Instruction) {
    logical(ctx, instr, BinOp::And, true);
}

pub fn nor(ctx: &mut EmitContext<'_>, instr: Instruction) {
    logical(ctx, instr, BinOp::Or, true);
}

pub fn eqv(ctx: &mut EmitContext<'_>, instr: Instruction) {
    logical(ctx, instr, BinOp::Xor, true);
}

/// D-form logical op with an unsigned immediate
fn logical_imm(ctx: &mut EmitContext<'_>, instr: Instruction, op: BinOp, shifted: bool, record_cr0: bool) {
    let s = ctx.gpr(instr.rs());
    let imm = if shifted { instr.uimm16() << 16 } else { instr.uimm16() };
    let value = ctx.b.bin_imm(op, s, imm);
    ctx.set_gpr(instr.ra(), value);
    if record_cr0 {
        set_cr0(ctx, value);
    }
}

pub fn andi_rc(ctx: &mut EmitContext<'_>, instr: Instruction) {
    logical_imm(ctx, instr, BinOp::And, false, true);
}

pub fn andis_rc(ctx: &mut EmitContext<'_>, instr: Instruction) {
    logical_imm(ctx, instr, BinOp::And, true, true);
}

pub fn ori(ctx: &mut EmitContext<'_>, instr: Instruction) {
    logical_imm(ctx, instr, BinOp::Or, false, false);
}

pub fn oris(ctx: &mut EmitContext<'_>, instr: Instruction) {
    logical_imm(ctx, instr, BinOp::Or, true, false);
}

pub fn xori(ctx: &mut EmitContext<'_>, instr: Instruction) {
    logical_imm(ctx, instr, BinOp::Xor, false, false);
}

pub fn xoris(ctx: &mut EmitContext<'_>, instr: Instruction) {
    logical_imm(ctx, instr, BinOp::Xor, true, false);
}

fn unary_into_ra(ctx: &mut EmitContext<'_>, instr: Instruction, op: UnOp) {
    let s = ctx.gpr(instr.rs());
    let value = ctx.b.un(op, s);
    ctx.set_gpr(instr.ra(), value);
    record(ctx, instr, value);
}

pub fn cntlzw(ctx: &mut EmitContext<'_>, instr: Instruction) {
    unary_into_ra(ctx, instr, UnOp::Clz32);
}

pub fn cntlzd(ctx: &mut EmitContext<'_>, instr: Instruction) {
    unary_into_ra(ctx, instr, UnOp::Clz64);
}

pub fn extsb(ctx: &mut EmitContext<'_>, instr: Instruction) {
    unary_into_ra(ctx, instr, UnOp::Sext8);
}

pub fn extsh(ctx: &mut EmitContext<'_>, instr: Instruction) {
    unary_into_ra(ctx, instr, UnOp::Sext16);
}

pub fn extsw(ctx: &mut EmitContext<'_>, instr: Instruction) {
    unary_into_ra(ctx, instr, UnOp::Sext32);
}

// Compare

fn compare_width(instr: Instruction) -> Width {
    if instr.l10() {
        Width::W64
    } else {
        Width::W32
    }
}

pub fn cmp(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let a = ctx.gpr(instr.ra());
    let b = ctx.gpr(instr.rb());
    let field = signed_compare(ctx, a, b, compare_width(instr));
    set_cr_field(ctx, field, instr.crfd());
}

pub fn cmpl(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let a = ctx.gpr(instr.ra());
    let b = ctx.gpr(instr.rb());
    let field = unsigned_compare(ctx, a, b, compare_width(instr));
    set_cr_field(ctx, field, instr.crfd());
}

pub fn cmpi(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let a = ctx.gpr(instr.ra());
    let imm = ctx.b.konst(instr.simm16() as u64);
    let field = signed_compare(ctx, a, imm, compare_width(instr));
    set_cr_field(ctx, field, instr.crfd());
}

pub fn cmpli(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let a = ctx.gpr(instr.ra());
    let imm = ctx.b.konst(instr.uimm16());
    let field = unsigned_compare(ctx, a, imm, compare_width(instr));
    set_cr_field(ctx, field, instr.crfd());
}

// Rotate

/// Rotate the low word and duplicate it into the high word
fn rotate_word(ctx: &mut EmitContext<'_>, source: Value, count: Value) -> Value {
    let low = ctx.b.bin(BinOp::Rotl, Width::W32, source, count);
    let high = ctx.b.bin_imm(BinOp::Shl, low, 32);
    ctx.b.or(low, high)
}

/// `ra = rotated & mask`, or `(rotated & mask) | (ra & !mask)` when inserting
fn masked_result(ctx: &mut EmitContext<'_>, instr: Instruction, rotated: Value, mask: u64, insert: bool) {
    let kept = ctx.b.bin_imm(BinOp::And, rotated, mask);
    let value = if insert {
        let old = ctx.gpr(instr.ra());
        let old = ctx.b.bin_imm(BinOp::AndNot, old, mask);
        ctx.b.or(kept, old)
    } else {
        kept
    };
    ctx.set_gpr(instr.ra(), value);
    record(ctx, instr, value);
}

fn word_mask(instr: Instruction) -> u64 {
    mask64(instr.mb() + 32, instr.me() + 32)
}

pub fn rlwinm(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let s = ctx.gpr(instr.rs());
    let count = ctx.b.konst(instr.sh() as u64);
    let rotated = rotate_word(ctx, s, count);
    masked_result(ctx, instr, rotated, word_mask(instr), false);
}

pub fn rlwnm(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let s = ctx.gpr(instr.rs());
    let b = ctx.gpr(instr.rb());
    let count = ctx.b.bin_imm(BinOp::And, b, 0x1F);
    let rotated = rotate_word(ctx, s, count);
    masked_result(ctx, instr, rotated, word_mask(instr), false);
}

pub fn rlwimi(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let s = ctx.gpr(instr.rs());
    let count = ctx.b.konst(instr.sh() as u64);
    let rotated = rotate_word(ctx, s, count);
    masked_result(ctx, instr, rotated, word_mask(instr), true);
}

fn rotate_doubleword_imm(ctx: &mut EmitContext<'_>, instr: Instruction) -> Value {
    let s = ctx.gpr(instr.rs());
    ctx.b.bin_imm(BinOp::Rotl, s, instr.sh64() as u64)
}

fn rotate_doubleword_reg(ctx: &mut EmitContext<'_>, instr: Instruction) -> Value {
    let s = ctx.gpr(instr.rs());
    let b = ctx.gpr(instr.rb());
    let count = ctx.b.bin_imm(BinOp::And, b, 0x3F);
    ctx.b.bin(BinOp::Rotl, Width::W64, s, count)
}

pub fn rldicl(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let rotated = rotate_doubleword_imm(ctx, instr);
    masked_result(ctx, instr, rotated, u64::MAX >> instr.mbe64(), false);
}

pub fn rldicr(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let rotated = rotate_doubleword_imm(ctx, instr);
    masked_result(ctx, instr, rotated, u64::MAX << (63 - instr.mbe64()), false);
}

pub fn rldic(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let rotated = rotate_doubleword_imm(ctx, instr);
    let mask = mask64(instr.mbe64(), 63 - instr.sh64());
    masked_result(ctx, instr, rotated, mask, false);
}

pub fn rldimi(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let rotated = rotate_doubleword_imm(ctx, instr);
    let mask = mask64(instr.mbe64(), 63 - instr.sh64());
    masked_result(ctx, instr, rotated, mask, true);
}

pub fn rldcl(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let rotated = rotate_doubleword_reg(ctx, instr);
    masked_result(ctx, instr, rotated, u64::MAX >> instr.mbe64(), false);
}

pub fn rldcr(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let rotated = rotate_doubleword_reg(ctx, instr);
    masked_result(ctx, instr, rotated, u64::MAX << (63 - instr.mbe64()), false);
}

// Shift

/// Logical shift by `rb`; counts with the `overflow_bit` set give zero
fn shift_logical(ctx: &mut EmitContext<'_>, instr: Instruction, op: BinOp, width: Width, overflow_bit: u64) {
    let s = ctx.gpr(instr.rs());
    let b = ctx.gpr(instr.rb());
    let shifted = ctx.b.bin(op, width, s, b);
    let too_far = ctx.b.bin_imm(BinOp::And, b, overflow_bit);
    let zero = ctx.b.konst(0);
    let value = ctx.b.select(too_far, zero, shifted);
    ctx.set_gpr(instr.ra(), value);
    record(ctx, instr, value);
}

pub fn slw(ctx: &mut EmitContext<'_>, instr: Instruction) {
    shift_logical(ctx, instr, BinOp::Shl, Width::W32, 0x20);
}

pub fn srw(ctx: &mut EmitContext<'_>, instr: Instruction) {
    shift_logical(ctx, instr, BinOp::Shr, Width::W32, 0x20);
}

pub fn sld(ctx: &mut EmitContext<'_>, instr: Instruction) {
    shift_logical(ctx, instr, BinOp::Shl, Width::W64, 0x40);
}

pub fn srd(ctx: &mut EmitContext<'_>, instr: Instruction) {
    shift_logical(ctx, instr, BinOp::Shr, Width::W64, 0x40);
}

/// Arithmetic shift of a sign-extended source by `count` (0..=63)
///
/// CA is set when the source is negative and any 1 bit was shifted out.
/// A register count past the operand width sets CA from the sign alone.
fn shift_arith(
    ctx: &mut EmitContext<'_>,
    instr: Instruction,
    source: Value,
    count: Value,
    out_of_range: Option<Value>,
) {
    let value = ctx.b.bin(BinOp::Sar, Width::W64, source, count);
    let ones = ctx.b.konst(u64::MAX);
    let kept = ctx.b.bin(BinOp::Shl, Width::W64, ones, count);
    let lost = ctx.b.bin(BinOp::AndNot, Width::W64, source, kept);
    let mut lost = ctx.b.cmp_imm(Cond::Ne, Width::W64, lost, 0);
    if let Some(out_of_range) = out_of_range {
        let all = ctx.b.konst(1);
        lost = ctx.b.select(out_of_range, all, lost);
    }
    let negative = ctx.b.cmp_imm(Cond::Slt, Width::W64, source, 0);
    let carry = ctx.b.and(negative, lost);
    set_carry(ctx, carry);
    ctx.set_gpr(instr.ra(), value);
    record(ctx, instr, value);
}

/// Register shift count and the out-of-range flag
///
/// Values with `overflow_bit` set shift out everything, so the count clamps
/// to 63 and the sign fills the result.
fn clamp_count(ctx: &mut EmitContext<'_>, instr: Instruction, overflow_bit: u64) -> (Value, Value) {
    let b = ctx.gpr(instr.rb());
    let too_far = ctx.b.bin_imm(BinOp::And, b, overflow_bit);
    let count = ctx.b.bin_imm(BinOp::And, b, overflow_bit - 1);
    let all = ctx.b.konst(63);
    (ctx.b.select(too_far, all, count), too_far)
}

pub fn sraw(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let s = ctx.gpr(instr.rs());
    let source = ctx.b.un(UnOp::Sext32, s);
    let (count, too_far) = clamp_count(ctx, instr, 0x20);
    shift_arith(ctx, instr, source, count, Some(too_far));
}

pub fn srawi(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let s = ctx.gpr(instr.rs());
    let source = ctx.b.un(UnOp::Sext32, s);
    if instr.sh() == 0 {
        clear_carry(ctx);
        ctx.set_gpr(instr.ra(), source);
        record(ctx, instr, source);
        return;
    }
    let count = ctx.b.konst(instr.sh() as u64);
    shift_arith(ctx, instr, source, count, None);
}

pub fn srad(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let source = ctx.gpr(instr.rs());
    let (count, too_far) = clamp_count(ctx, instr, 0x40);
    shift_arith(ctx, instr, source, count, Some(too_far));
}

pub fn sradi(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let source = ctx.gpr(instr.rs());
    let count = ctx.b.konst(instr.sh64() as u64);
    shift_arith(ctx, instr, source, count, None);
}

// Trap

/// TO field bits
pub mod to {
    pub const LT: u32 = 0x10;
    pub const GT: u32 = 0x08;
    pub const EQ: u32 = 0x04;
    pub const LTU: u32 = 0x02;
    pub const GTU: u32 = 0x01;
}

fn trap(ctx: &mut EmitContext<'_>, instr: Instruction, a: Value, b: Value, width: Width) {
    let conditions = [
        (to::LT, Cond::Slt),
        (to::GT, Cond::Sgt),
        (to::EQ, Cond::Eq),
        (to::LTU, Cond::Ult),
        (to::GTU, Cond::Ugt),
    ];
    let mut hit: Option<Value> = None;
    for (bit, cond) in conditions {
        if instr.to() & bit == 0 {
            continue;
        }
        let test = ctx.b.cmp(cond, width, a, b);
        hit = Some(match hit {
            Some(previous) => ctx.b.or(previous, test),
            None => test,
        });
    }
    let Some(hit) = hit else {
        return;
    };

    let skip = ctx.b.new_label();
    ctx.b.branch_if_zero(hit, skip);
    ctx.raise(Exception::Trap);
    ctx.b.bind(skip);
}

pub fn tw(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let a = ctx.gpr(instr.ra());
    let b = ctx.gpr(instr.rb());
    trap(ctx, instr, a, b, Width::W32);
}

pub fn td(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let a = ctx.gpr(instr.ra());
    let b = ctx.gpr(instr.rb());
    trap(ctx, instr, a, b, Width::W64);
}

pub fn twi(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let a = ctx.gpr(instr.ra());
    let imm = ctx.b.konst(instr.simm16() as u64);
    trap(ctx, instr, a, imm, Width::W32);
}

pub fn tdi(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let a = ctx.gpr(instr.ra());
    let imm = ctx.b.konst(instr.simm16() as u64);
    trap(ctx, instr, a, imm, Width::W64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask64() {
        assert_eq!(mask64(0, 63), u64::MAX);
        assert_eq!(mask64(32, 63), 0xFFFF_FFFF);
        assert_eq!(mask64(0, 0), 1 << 63);
        // Wrapping mask
        assert_eq!(mask64(63, 0), (1 << 63) | 1);
        assert_eq!(mask64(48, 39), 0xFFFF_FFFF_FF00_FFFF);
    }
}
