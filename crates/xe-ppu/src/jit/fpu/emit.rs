//! Scalar floating-point emitters

use super::table::{self, ArithOp, Classify, FpKind, Operand, Outcome, Precision, Rule};
use crate::instruction::Instruction;
use crate::jit::builder::EmitContext;
use crate::jit::float::DEFAULT_QNAN;
use crate::jit::helpers::{set_cr1, set_cr_field};
use crate::jit::ir::{BinOp, Cond, Exception, FBinOp, FTest, FUnOp, FpStatus, Value, Width};
use crate::jit::system::crm_mask;
use crate::state::{fpscr, msr, Slot};

/// Exception bits whose setting also sets FX
const EXCEPTIONS: u64 = fpscr::OX | fpscr::UX | fpscr::ZX | fpscr::XX | fpscr::VX_ALL;

const SIGN: u64 = 1 << 63;
const INFINITY: u64 = 0x7FF0_0000_0000_0000;

/// Host status bit to FPSCR bits
const STATUS_MAP: [(FpStatus, u64); 4] = [
    (FpStatus::INEXACT, fpscr::XX | fpscr::FI),
    (FpStatus::ROUNDED_UP, fpscr::FR),
    (FpStatus::OVERFLOW, fpscr::OX),
    (FpStatus::UNDERFLOW, fpscr::UX),
];

/// Decision-table conditions as emitted 0/1 values
struct Emitted<'c, 'a> {
    ctx: &'c mut EmitContext<'a>,
    operands: [Value; 3],
}

impl Classify for Emitted<'_, '_> {
    type Bit = Value;

    fn test(&mut self, test: FTest, operand: Operand) -> Value {
        self.ctx.b.ftest(test, self.operands[operand.index()])
    }

    fn always(&mut self) -> Value {
        self.ctx.b.konst(1)
    }

    fn not(&mut self, bit: Value) -> Value {
        self.ctx.b.bin_imm(BinOp::Xor, bit, 1)
    }

    fn and(&mut self, lhs: Value, rhs: Value) -> Value {
        self.ctx.b.and(lhs, rhs)
    }

    fn or(&mut self, lhs: Value, rhs: Value) -> Value {
        self.ctx.b.or(lhs, rhs)
    }

    fn xor(&mut self, lhs: Value, rhs: Value) -> Value {
        self.ctx.b.xor(lhs, rhs)
    }
}

fn require_fpu(ctx: &mut EmitContext<'_>) {
    ctx.require_msr(msr::FP, Exception::FpUnavailable);
}

/// Clear the sticky summary and status bits; returns the cleared FPSCR
fn reset_status(ctx: &mut EmitContext<'_>) -> Value {
    let value = ctx.b.load(Slot::Fpscr);
    let value = ctx.b.bin_imm(BinOp::AndNot, value, fpscr::STICKY_RESET | fpscr::FR | fpscr::FI);
    ctx.b.store(Slot::Fpscr, value);
    value
}

/// `bits` when `cond` is non-zero, zero otherwise
fn bits_if(ctx: &mut EmitContext<'_>, cond: Value, bits: u64) -> Value {
    let on = ctx.b.konst(bits);
    let off = ctx.b.konst(0);
    ctx.b.select(cond, on, off)
}

/// Map a host [`FpStatus`] to FPSCR bits
fn status_bits(ctx: &mut EmitContext<'_>, status: Value) -> Value {
    let mut acc = ctx.b.konst(0);
    for (flag, bits) in STATUS_MAP {
        let hit = ctx.b.bin_imm(BinOp::And, status, flag.bits());
        let bits = bits_if(ctx, hit, bits);
        acc = ctx.b.or(acc, bits);
    }
    acc
}

/// OR `flags` into FPSCR and refresh FX, VX and FEX; returns the new FPSCR
fn record(ctx: &mut EmitContext<'_>, flags: Value) -> Value {
    let value = ctx.b.load(Slot::Fpscr);
    let value = ctx.b.or(value, flags);

    let raised = ctx.b.bin_imm(BinOp::And, flags, EXCEPTIONS);
    let fx = bits_if(ctx, raised, fpscr::FX);
    let value = ctx.b.or(value, fx);
    refresh_summary(ctx, value)
}

/// Recompute VX from the invalid-operation bits, then FEX from every
/// exception bit whose enable is set
fn refresh_summary(ctx: &mut EmitContext<'_>, value: Value) -> Value {
    let value = ctx.b.bin_imm(BinOp::AndNot, value, fpscr::VX | fpscr::FEX);
    let invalid = ctx.b.bin_imm(BinOp::And, value, fpscr::VX_ALL);
    let vx = bits_if(ctx, invalid, fpscr::VX);
    let value = ctx.b.or(value, vx);

    let raised = ctx.b.bin_imm(BinOp::Shr, value, fpscr::ENABLE_SHIFT as u64);
    let enabled = ctx.b.and(raised, value);
    let enabled = ctx.b.bin_imm(BinOp::And, enabled, fpscr::ENABLES);
    let fex = bits_if(ctx, enabled, fpscr::FEX);
    ctx.b.or(value, fex)
}

/// Replace the FPRF field with the class of `result`
fn with_fprf(ctx: &mut EmitContext<'_>, value: Value, result: Value, precision: Precision) -> Value {
    let test = match precision {
        Precision::Double => FTest::Fprf,
        Precision::Single => FTest::FprfSingle,
    };
    let class = ctx.b.ftest(test, result);
    let class = ctx.b.bin_imm(BinOp::Shl, class, fpscr::FPRF_SHIFT as u64);
    let cleared = ctx.b.bin_imm(BinOp::AndNot, value, fpscr::FPRF);
    ctx.b.or(cleared, class)
}

fn operand_field(instr: Instruction, operand: Operand) -> usize {
    match operand {
        Operand::A => instr.ra(),
        Operand::B => instr.rb(),
        Operand::C => instr.frc(),
    }
}

/// Host computation for the Compute rule; returns `(result, status)`
fn compute(ctx: &mut EmitContext<'_>, kind: FpKind, operands: [Value; 3], rn: Value) -> (Value, Value) {
    let [a, b, c] = operands;
    let (value, status) = match kind.op {
        ArithOp::Add => ctx.b.fbin(FBinOp::Add, a, b, rn),
        ArithOp::Sub => ctx.b.fbin(FBinOp::Sub, a, b, rn),
        ArithOp::Mul => ctx.b.fbin(FBinOp::Mul, a, c, rn),
        ArithOp::Div => ctx.b.fbin(FBinOp::Div, a, b, rn),
        ArithOp::Sqrt => ctx.b.fun(FUnOp::Sqrt, b, rn),
        ArithOp::RoundToSingle => ctx.b.fun(FUnOp::RoundSingle, b, rn),
        ArithOp::RecipEstimate => ctx.b.fun(FUnOp::RecipEstimate, b, rn),
        ArithOp::RsqrtEstimate => ctx.b.fun(FUnOp::RsqrtEstimate, b, rn),
        ArithOp::MulAdd | ArithOp::MulSub | ArithOp::NegMulAdd | ArithOp::NegMulSub => {
            let addend = if kind.op.subtracts() {
                ctx.b.fun_exact(FUnOp::Neg, b)
            } else {
                b
            };
            ctx.b.fmuladd(a, c, addend)
        }
    };

    let (value, status) = if kind.precision == Precision::Single && kind.op != ArithOp::RoundToSingle {
        let (rounded, narrowed) = ctx.b.fun(FUnOp::RoundSingle, value, rn);
        (rounded, ctx.b.or(status, narrowed))
    } else {
        (value, status)
    };

    // Negation follows rounding and only ever sees a computed result.
    let value = if kind.op.negates() {
        ctx.b.fun_exact(FUnOp::Neg, value)
    } else {
        value
    };
    let flags = status_bits(ctx, status);
    (value, flags)
}

fn special_result(ctx: &mut EmitContext<'_>, kind: FpKind, outcome: Outcome, operands: [Value; 3]) -> Value {
    match outcome {
        Outcome::Nan(operand) => ctx.b.fun_exact(FUnOp::Quiet, operands[operand.index()]),
        Outcome::DefaultNan | Outcome::Compute => ctx.b.konst(DEFAULT_QNAN),
        Outcome::Infinity => {
            let [a, b, _] = operands;
            let sign = if kind.op == ArithOp::Div { ctx.b.xor(a, b) } else { b };
            let sign = ctx.b.bin_imm(BinOp::And, sign, SIGN);
            ctx.b.bin_imm(BinOp::Or, sign, INFINITY)
        }
    }
}

/// Emit one arithmetic instruction through the decision table
fn arith(ctx: &mut EmitContext<'_>, instr: Instruction, kind: FpKind) {
    require_fpu(ctx);
    let status = reset_status(ctx);
    let rn = ctx.b.bin_imm(BinOp::And, status, fpscr::RN);

    let zero = ctx.b.konst(0);
    let mut operands = [zero; 3];
    for operand in kind.op.operands() {
        operands[operand.index()] = ctx.fpr(operand_field(instr, *operand));
    }

    let result = ctx.b.new_value();
    let flags = ctx.b.new_value();
    ctx.b.mov(flags, zero);
    let done = ctx.b.new_label();

    for rule in table::rules(kind) {
        if rule == Rule::Compute {
            let (value, raised) = compute(ctx, kind, operands, rn);
            ctx.b.mov(result, value);
            let merged = ctx.b.or(flags, raised);
            ctx.b.mov(flags, merged);
            break;
        }

        let cond = table::condition(rule, kind, &mut Emitted { ctx: &mut *ctx, operands });
        if rule.is_flag() {
            let bit = bits_if(ctx, cond, rule.flags());
            let merged = ctx.b.or(flags, bit);
            ctx.b.mov(flags, merged);
            continue;
        }

        let next = ctx.b.new_label();
        ctx.b.branch_if_zero(cond, next);
        let value = special_result(ctx, kind, rule.outcome(), operands);
        ctx.b.mov(result, value);
        if rule.flags() != 0 {
            let merged = ctx.b.bin_imm(BinOp::Or, flags, rule.flags());
            ctx.b.mov(flags, merged);
        }
        ctx.b.jump(done);
        ctx.b.bind(next);
    }
    ctx.b.bind(done);

    ctx.set_fpr(instr.rd(), result);
    let value = record(ctx, flags);
    let value = with_fprf(ctx, value, result, kind.precision);
    ctx.b.store(Slot::Fpscr, value);
    if instr.rc() {
        set_cr1(ctx);
    }
}

macro_rules! arithmetic {
    ($($name:ident => $precision:ident($op:ident);)*) => {
        $(
            pub fn $name(ctx: &mut EmitContext<'_>, instr: Instruction) {
                arith(ctx, instr, FpKind::$precision(ArithOp::$op));
            }
        )*
    };
}

arithmetic! {
    fadd => double(Add);
    fadds => single(Add);
    fsub => double(Sub);
    fsubs => single(Sub);
    fmul => double(Mul);
    fmuls => single(Mul);
    fdiv => double(Div);
    fdivs => single(Div);
    fsqrt => double(Sqrt);
    fsqrts => single(Sqrt);
    fmadd => double(MulAdd);
    fmadds => single(MulAdd);
    fmsub => double(MulSub);
    fmsubs => single(MulSub);
    fnmadd => double(NegMulAdd);
    fnmadds => single(NegMulAdd);
    fnmsub => double(NegMulSub);
    fnmsubs => single(NegMulSub);
    frsp => single(RoundToSingle);
    fres => single(RecipEstimate);
    frsqrte => double(RsqrtEstimate);
}

fn compare(ctx: &mut EmitContext<'_>, instr: Instruction, ordered: bool) {
    require_fpu(ctx);
    let status = reset_status(ctx);
    let a = ctx.fpr(instr.ra());
    let b = ctx.fpr(instr.rb());

    let code = ctx.b.fcmp(a, b);
    set_cr_field(ctx, code, instr.crfd());

    let a_snan = ctx.b.ftest(FTest::IsSnan, a);
    let b_snan = ctx.b.ftest(FTest::IsSnan, b);
    let snan = ctx.b.or(a_snan, b_snan);
    let mut flags = bits_if(ctx, snan, fpscr::VXSNAN);

    if ordered {
        let a_qnan = ctx.b.ftest(FTest::IsQnan, a);
        let b_qnan = ctx.b.ftest(FTest::IsQnan, b);
        let qnan = ctx.b.or(a_qnan, b_qnan);
        let enabled = ctx.b.bin_imm(BinOp::And, status, fpscr::VE);
        let disabled = ctx.b.cmp_imm(Cond::Eq, Width::W64, enabled, 0);
        let quiet_snan = ctx.b.and(snan, disabled);
        let unordered = ctx.b.or(qnan, quiet_snan);
        let vxvc = bits_if(ctx, unordered, fpscr::VXVC);
        flags = ctx.b.or(flags, vxvc);
    }

    let value = record(ctx, flags);
    let value = ctx.b.bin_imm(BinOp::AndNot, value, fpscr::FPCC);
    let fpcc = ctx.b.bin_imm(BinOp::Shl, code, fpscr::FPRF_SHIFT as u64);
    let value = ctx.b.or(value, fpcc);
    ctx.b.store(Slot::Fpscr, value);
}

pub fn fcmpu(ctx: &mut EmitContext<'_>, instr: Instruction) {
    compare(ctx, instr, false);
}

pub fn fcmpo(ctx: &mut EmitContext<'_>, instr: Instruction) {
    compare(ctx, instr, true);
}

/// `frc` when `fra` has a clear sign bit or is a zero, `frb` otherwise
pub fn fsel(ctx: &mut EmitContext<'_>, instr: Instruction) {
    require_fpu(ctx);
    let a = ctx.fpr(instr.ra());
    let b = ctx.fpr(instr.rb());
    let c = ctx.fpr(instr.frc());

    let negative = ctx.b.ftest(FTest::IsNegative, a);
    let zero = ctx.b.ftest(FTest::IsZero, a);
    let pick_b = ctx.b.bin(BinOp::AndNot, Width::W64, negative, zero);
    let value = ctx.b.select(pick_b, b, c);
    ctx.set_fpr(instr.rd(), value);
    if instr.rc() {
        set_cr1(ctx);
    }
}

fn to_int(ctx: &mut EmitContext<'_>, instr: Instruction, op: FUnOp, truncate: bool) {
    require_fpu(ctx);
    let status = reset_status(ctx);
    let rn = if truncate {
        ctx.b.konst(1)
    } else {
        ctx.b.bin_imm(BinOp::And, status, fpscr::RN)
    };
    let b = ctx.fpr(instr.rb());
    let (value, raised) = ctx.b.fun(op, b, rn);

    let invalid = ctx.b.bin_imm(BinOp::And, raised, FpStatus::INVALID.bits());
    let snan = ctx.b.ftest(FTest::IsSnan, b);
    let vxcvi = bits_if(ctx, invalid, fpscr::VXCVI);
    let vxsnan = bits_if(ctx, snan, fpscr::VXSNAN);
    let inexact = status_bits(ctx, raised);
    let flags = ctx.b.or(vxcvi, vxsnan);
    let flags = ctx.b.or(flags, inexact);

    ctx.set_fpr(instr.rd(), value);
    let value = record(ctx, flags);
    ctx.b.store(Slot::Fpscr, value);
    if instr.rc() {
        set_cr1(ctx);
    }
}

pub fn fctiw(ctx: &mut EmitContext<'_>, instr: Instruction) {
    to_int(ctx, instr, FUnOp::ToInt32, false);
}

pub fn fctiwz(ctx: &mut EmitContext<'_>, instr: Instruction) {
    to_int(ctx, instr, FUnOp::ToInt32, true);
}

pub fn fctid(ctx: &mut EmitContext<'_>, instr: Instruction) {
    to_int(ctx, instr, FUnOp::ToInt64, false);
}

pub fn fctidz(ctx: &mut EmitContext<'_>, instr: Instruction) {
    to_int(ctx, instr, FUnOp::ToInt64, true);
}

pub fn fcfid(ctx: &mut EmitContext<'_>, instr: Instruction) {
    require_fpu(ctx);
    let status = reset_status(ctx);
    let rn = ctx.b.bin_imm(BinOp::And, status, fpscr::RN);
    let b = ctx.fpr(instr.rb());
    let (value, raised) = ctx.b.fun(FUnOp::FromInt64, b, rn);
    let flags = status_bits(ctx, raised);

    ctx.set_fpr(instr.rd(), value);
    let status = record(ctx, flags);
    let status = with_fprf(ctx, status, value, Precision::Double);
    ctx.b.store(Slot::Fpscr, status);
    if instr.rc() {
        set_cr1(ctx);
    }
}

fn sign_op(ctx: &mut EmitContext<'_>, instr: Instruction, op: Option<FUnOp>) {
    require_fpu(ctx);
    let b = ctx.fpr(instr.rb());
    let value = match op {
        Some(op) => ctx.b.fun_exact(op, b),
        None => b,
    };
    ctx.set_fpr(instr.rd(), value);
    if instr.rc() {
        set_cr1(ctx);
    }
}

pub fn fmr(ctx: &mut EmitContext<'_>, instr: Instruction) {
    sign_op(ctx, instr, None);
}

pub fn fneg(ctx: &mut EmitContext<'_>, instr: Instruction) {
    sign_op(ctx, instr, Some(FUnOp::Neg));
}

pub fn fabs(ctx: &mut EmitContext<'_>, instr: Instruction) {
    sign_op(ctx, instr, Some(FUnOp::Abs));
}

pub fn fnabs(ctx: &mut EmitContext<'_>, instr: Instruction) {
    sign_op(ctx, instr, Some(FUnOp::NegAbs));
}

pub fn mffs(ctx: &mut EmitContext<'_>, instr: Instruction) {
    require_fpu(ctx);
    let value = ctx.b.load(Slot::Fpscr);
    ctx.set_fpr(instr.rd(), value);
    if instr.rc() {
        set_cr1(ctx);
    }
}

pub fn mtfsf(ctx: &mut EmitContext<'_>, instr: Instruction) {
    require_fpu(ctx);
    // FEX and VX are summaries and cannot be written directly.
    let mask = crm_mask(instr.fm()) & !(fpscr::FEX | fpscr::VX);
    let b = ctx.fpr(instr.rb());
    let current = ctx.b.load(Slot::Fpscr);
    let kept = ctx.b.bin_imm(BinOp::AndNot, current, mask);
    let inserted = ctx.b.bin_imm(BinOp::And, b, mask);
    let value = ctx.b.or(kept, inserted);
    let value = refresh_summary(ctx, value);
    ctx.b.store(Slot::Fpscr, value);
    if instr.rc() {
        set_cr1(ctx);
    }
}

fn fpscr_bit(instr: Instruction) -> u64 {
    1 << (31 - instr.crbd())
}

pub fn mtfsb0(ctx: &mut EmitContext<'_>, instr: Instruction) {
    require_fpu(ctx);
    let bit = fpscr_bit(instr) & !(fpscr::FEX | fpscr::VX);
    let current = ctx.b.load(Slot::Fpscr);
    let value = ctx.b.bin_imm(BinOp::AndNot, current, bit);
    let value = refresh_summary(ctx, value);
    ctx.b.store(Slot::Fpscr, value);
    if instr.rc() {
        set_cr1(ctx);
    }
}

pub fn mtfsb1(ctx: &mut EmitContext<'_>, instr: Instruction) {
    require_fpu(ctx);
    let mut bit = fpscr_bit(instr) & !(fpscr::FEX | fpscr::VX);
    if bit & EXCEPTIONS != 0 {
        bit |= fpscr::FX;
    }
    let current = ctx.b.load(Slot::Fpscr);
    let value = ctx.b.bin_imm(BinOp::Or, current, bit);
    let value = refresh_summary(ctx, value);
    ctx.b.store(Slot::Fpscr, value);
    if instr.rc() {
        set_cr1(ctx);
    }
}
