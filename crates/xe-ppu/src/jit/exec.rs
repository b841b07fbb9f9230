//! Block executor
//!
//! Runs the host ops of a [`Block`] against a thread state and an [`Mmu`].
//! Integer divides behave like the host instruction: a zero divisor or an
//! overflowing quotient is a fault, so emitted code has to rule both out
//! before issuing the divide.

use xe_core::error::JitError;
use xe_core::jit_trace;

use super::float::{self, lane};
use super::ir::*;
use super::mmu::Mmu;
use crate::state::{ex, ThreadState};
use crate::vmx::Vector128;

/// SRR1 bit reported for a trap-type program exception
pub const SRR1_TRAP: u64 = 0x2_0000;

/// Why a block returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Ran to completion; NIA holds the next guest address
    Continue { next: u64 },
    /// Left early with exception bits pending in EX
    Exception { pending: u64 },
}

/// Interpreter for translated blocks
#[derive(Debug, Clone, Copy)]
pub struct Executor {
    step_limit: u64,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(1 << 24)
    }
}

impl Executor {
    pub fn new(step_limit: u64) -> Self {
        Self { step_limit }
    }

    /// Execute `block` once
    pub fn run(&self, block: &Block, state: &mut ThreadState, mmu: &dyn Mmu) -> Result<ExitReason, JitError> {
        let mut frame = Frame {
            values: vec![None; block.values as usize],
        };
        let mut pc = 0usize;
        let mut steps = 0u64;

        while let Some(op) = block.ops.get(pc) {
            steps += 1;
            if steps > self.step_limit {
                return Err(JitError::StepLimit {
                    addr: block.start,
                    limit: self.step_limit,
                });
            }
            pc += 1;

            match op {
                HostOp::Const { dst, imm } => frame.set(*dst, *imm),
                HostOp::Mov { dst, src } => {
                    let value = frame.get(*src)?;
                    frame.set(*dst, value);
                }
                HostOp::Load { dst, slot } => frame.set(*dst, state.load(*slot)),
                HostOp::Store { slot, src } => state.store(*slot, frame.get(*src)?),
                HostOp::Bin { op, width, dst, lhs, rhs } => {
                    let value = binary(*op, *width, frame.get64(*lhs)?, frame.get64(*rhs)?)?;
                    frame.set(*dst, value as u128);
                }
                HostOp::Un { op, dst, src } => {
                    frame.set(*dst, unary(*op, frame.get64(*src)?) as u128);
                }
                HostOp::Cmp { cond, width, dst, lhs, rhs } => {
                    let hit = compare(*cond, *width, frame.get64(*lhs)?, frame.get64(*rhs)?);
                    frame.set(*dst, hit as u128);
                }
                HostOp::Select { dst, cond, if_true, if_false } => {
                    let pick = if frame.get(*cond)? != 0 { *if_true } else { *if_false };
                    let value = frame.get(pick)?;
                    frame.set(*dst, value);
                }
                HostOp::FBin { op, dst, lhs, rhs, rn, status } => {
                    let a = frame.getf(*lhs)?;
                    let b = frame.getf(*rhs)?;
                    let mode = RoundKind::from_rn(frame.get64(*rn)?);
                    let result = match op {
                        FBinOp::Add => float::add(a, b, mode),
                        FBinOp::Sub => float::sub(a, b, mode),
                        FBinOp::Mul => float::mul(a, b, mode),
                        FBinOp::Div => float::div(a, b, mode),
                    };
                    frame.set(*dst, result.value.to_bits() as u128);
                    frame.set(*status, result.status.bits() as u128);
                }
                HostOp::FUn { op, dst, src, rn, status } => {
                    let bits = frame.get64(*src)?;
                    let mode = RoundKind::from_rn(frame.get64(*rn)?);
                    let (value, flags) = float_unary(*op, bits, mode);
                    frame.set(*dst, value as u128);
                    frame.set(*status, flags.bits() as u128);
                }
                HostOp::FMulAdd { dst, a, c, b, status } => {
                    let result = float::mul_add(frame.getf(*a)?, frame.getf(*c)?, frame.getf(*b)?);
                    frame.set(*dst, result.value.to_bits() as u128);
                    frame.set(*status, result.status.bits() as u128);
                }
                HostOp::FTest { test, dst, src } => {
                    let value = float::classify(*test, frame.get64(*src)?);
                    frame.set(*dst, value as u128);
                }
                HostOp::FCmp { dst, lhs, rhs } => {
                    let code = float::compare(frame.getf(*lhs)?, frame.getf(*rhs)?);
                    frame.set(*dst, code as u128);
                }
                HostOp::Vector { op, dst, a, b, c, sat } => {
                    let a = frame.get(*a)?;
                    let b = b.map(|v| frame.get(v)).transpose()?.unwrap_or(0);
                    let c = c.map(|v| frame.get(v)).transpose()?.unwrap_or(0);
                    let (value, saturated) = vector(*op, a, b, c);
                    frame.set(*dst, value);
                    if let Some(sat) = sat {
                        frame.set(*sat, saturated as u128);
                    }
                }
                HostOp::Call { helper, dst, args } => {
                    let args = args.iter().map(|v| frame.get(*v)).collect::<Result<Vec<_>, _>>()?;
                    let value = call(*helper, &args, state, mmu);
                    if let Some(dst) = dst {
                        frame.set(*dst, value);
                    }
                }
                HostOp::Bind(_) => {}
                HostOp::Jump(target) => pc = target_of(block, *target)?,
                HostOp::BranchIf { cond, target } => {
                    if frame.get(*cond)? != 0 {
                        pc = target_of(block, *target)?;
                    }
                }
                HostOp::BranchIfZero { cond, target } => {
                    if frame.get(*cond)? == 0 {
                        pc = target_of(block, *target)?;
                    }
                }
                HostOp::Marker { addr, word } => {
                    jit_trace!("exec 0x{:08X}: {:08X}", addr, word);
                    state.tb = state.tb.wrapping_add(1);
                }
                HostOp::Exit => break,
            }
        }

        if state.ex != 0 {
            Ok(ExitReason::Exception { pending: state.ex })
        } else {
            Ok(ExitReason::Continue { next: state.nia })
        }
    }
}

struct Frame {
    values: Vec<Option<u128>>,
}

impl Frame {
    #[inline]
    fn set(&mut self, value: Value, bits: u128) {
        self.values[value.index()] = Some(bits);
    }

    #[inline]
    fn get(&self, value: Value) -> Result<u128, JitError> {
        self.values
            .get(value.index())
            .copied()
            .flatten()
            .ok_or(JitError::UndefinedValue(value.0))
    }

    #[inline]
    fn get64(&self, value: Value) -> Result<u64, JitError> {
        self.get(value).map(|v| v as u64)
    }

    #[inline]
    fn getf(&self, value: Value) -> Result<f64, JitError> {
        self.get64(value).map(f64::from_bits)
    }
}

fn target_of(block: &Block, label: Label) -> Result<usize, JitError> {
    block
        .labels
        .get(label.0 as usize)
        .copied()
        .ok_or(JitError::UnboundLabel(label.0))
}

fn binary(op: BinOp, width: Width, a: u64, b: u64) -> Result<u64, JitError> {
    if width == Width::W32 {
        return binary32(op, a as u32, b as u32).map(u64::from);
    }
    Ok(match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::MulHiS => ((a as i64 as i128 * b as i64 as i128) >> 64) as u64,
        BinOp::MulHiU => ((a as u128 * b as u128) >> 64) as u64,
        BinOp::DivS => (a as i64).checked_div(b as i64).ok_or(JitError::DivideFault)? as u64,
        BinOp::DivU => a.checked_div(b).ok_or(JitError::DivideFault)?,
        BinOp::And => a & b,
        BinOp::Or => a | b,
        BinOp::Xor => a ^ b,
        BinOp::AndNot => a & !b,
        BinOp::OrNot => a | !b,
        BinOp::Shl => a << (b & 63),
        BinOp::Shr => a >> (b & 63),
        BinOp::Sar => ((a as i64) >> (b & 63)) as u64,
        BinOp::Rotl => a.rotate_left((b & 63) as u32),
        BinOp::AddCarry => a.overflowing_add(b).1 as u64,
    })
}

fn binary32(op: BinOp, a: u32, b: u32) -> Result<u32, JitError> {
    Ok(match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::MulHiS => ((a as i32 as i64 * b as i32 as i64) >> 32) as u32,
        BinOp::MulHiU => ((a as u64 * b as u64) >> 32) as u32,
        BinOp::DivS => (a as i32).checked_div(b as i32).ok_or(JitError::DivideFault)? as u32,
        BinOp::DivU => a.checked_div(b).ok_or(JitError::DivideFault)?,
        BinOp::And => a & b,
        BinOp::Or => a | b,
        BinOp::Xor => a ^ b,
        BinOp::AndNot => a & !b,
        BinOp::OrNot => a | !b,
        BinOp::Shl => a << (b & 31),
        BinOp::Shr => a >> (b & 31),
        BinOp::Sar => ((a as i32) >> (b & 31)) as u32,
        BinOp::Rotl => a.rotate_left(b & 31),
        BinOp::AddCarry => a.overflowing_add(b).1 as u32,
    })
}

fn unary(op: UnOp, a: u64) -> u64 {
    match op {
        UnOp::Not => !a,
        UnOp::Neg => a.wrapping_neg(),
        UnOp::Clz32 => (a as u32).leading_zeros() as u64,
        UnOp::Clz64 => a.leading_zeros() as u64,
        UnOp::Sext8 => a as i8 as i64 as u64,
        UnOp::Sext16 => a as i16 as i64 as u64,
        UnOp::Sext32 => a as i32 as i64 as u64,
        UnOp::Zext8 => a as u8 as u64,
        UnOp::Zext16 => a as u16 as u64,
        UnOp::Zext32 => a as u32 as u64,
        UnOp::Swap16 => (a as u16).swap_bytes() as u64,
        UnOp::Swap32 => (a as u32).swap_bytes() as u64,
        UnOp::Swap64 => a.swap_bytes(),
        UnOp::FromBe32 => u32::from_be(a as u32) as u64,
        UnOp::FromBe64 => u64::from_be(a),
        UnOp::ToBe32 => (a as u32).to_be() as u64,
        UnOp::ToBe64 => a.to_be(),
    }
}

fn compare(cond: Cond, width: Width, a: u64, b: u64) -> bool {
    let (a, b, sa, sb) = match width {
        Width::W32 => (a as u32 as u64, b as u32 as u64, a as i32 as i64, b as i32 as i64),
        Width::W64 => (a, b, a as i64, b as i64),
    };
    match cond {
        Cond::Eq => a == b,
        Cond::Ne => a != b,
        Cond::Slt => sa < sb,
        Cond::Sle => sa <= sb,
        Cond::Sgt => sa > sb,
        Cond::Sge => sa >= sb,
        Cond::Ult => a < b,
        Cond::Ule => a <= b,
        Cond::Ugt => a > b,
        Cond::Uge => a >= b,
    }
}

fn float_unary(op: FUnOp, bits: u64, mode: RoundKind) -> (u64, FpStatus) {
    let x = f64::from_bits(bits);
    let rounded = |r: float::Rounded| (r.value.to_bits(), r.status);
    match op {
        FUnOp::Sqrt => rounded(float::sqrt(x, mode)),
        FUnOp::RoundSingle => rounded(float::round_single(x, mode)),
        FUnOp::Neg => (bits ^ (1 << 63), FpStatus::empty()),
        FUnOp::Abs => (bits & !(1 << 63), FpStatus::empty()),
        FUnOp::NegAbs => (bits | (1 << 63), FpStatus::empty()),
        FUnOp::Quiet => (bits | float::QUIET_BIT, FpStatus::empty()),
        FUnOp::SingleToDouble => (float::single_to_double(bits as u32), FpStatus::empty()),
        FUnOp::DoubleToSingle => (float::double_to_single(bits) as u64, FpStatus::empty()),
        FUnOp::ToInt32 => {
            let (value, status) = float::to_int(x, 32, mode);
            (value as u64, status)
        }
        FUnOp::ToInt64 => {
            let (value, status) = float::to_int(x, 64, mode);
            (value as u64, status)
        }
        FUnOp::FromInt64 => rounded(float::from_int(bits as i64, mode)),
        FUnOp::RecipEstimate => ((1.0 / x).to_bits(), FpStatus::empty()),
        FUnOp::RsqrtEstimate => ((1.0 / x.sqrt()).to_bits(), FpStatus::empty()),
    }
}

/// Split a vector into lanes, element 0 first
fn split(v: u128, lane: Lane) -> [u32; 16] {
    let bits = lane.bits();
    let mask = (1u128 << bits) - 1;
    let mut out = [0u32; 16];
    for (i, slot) in out.iter_mut().take(lane.count()).enumerate() {
        let shift = 128 - bits * (i as u32 + 1);
        *slot = ((v >> shift) & mask) as u32;
    }
    out
}

fn join(lanes: &[u32; 16], lane: Lane) -> u128 {
    let bits = lane.bits();
    let mask = (1u128 << bits) - 1;
    lanes
        .iter()
        .take(lane.count())
        .enumerate()
        .fold(0u128, |acc, (i, l)| acc | ((*l as u128 & mask) << (128 - bits * (i as u32 + 1))))
}

fn map2(a: u128, b: u128, lane: Lane, f: impl Fn(u32, u32, u32) -> u32) -> u128 {
    let (la, lb) = (split(a, lane), split(b, lane));
    let mut out = [0u32; 16];
    for i in 0..lane.count() {
        out[i] = f(la[i], lb[i], lane.bits());
    }
    join(&out, lane)
}

fn map_words(a: u128, b: u128, c: u128, f: impl Fn(u32, u32, u32) -> u32) -> u128 {
    let (wa, wb, wc) = (
        Vector128::from_u128(a).words,
        Vector128::from_u128(b).words,
        Vector128::from_u128(c).words,
    );
    Vector128::from_u32x4(std::array::from_fn(|i| f(wa[i], wb[i], wc[i]))).to_u128()
}

fn lane_mask(bits: u32) -> u32 {
    if bits == 32 {
        u32::MAX
    } else {
        (1 << bits) - 1
    }
}

fn sign_extend(value: u32, bits: u32) -> i32 {
    ((value << (32 - bits)) as i32) >> (32 - bits)
}

fn bytes32(a: u128, b: u128) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    bytes[..16].copy_from_slice(&a.to_be_bytes());
    bytes[16..].copy_from_slice(&b.to_be_bytes());
    bytes
}

fn from_bytes(bytes: &[u8]) -> u128 {
    let mut out = [0u8; 16];
    out.copy_from_slice(&bytes[..16]);
    u128::from_be_bytes(out)
}

fn fmax(a: u32, b: u32) -> u32 {
    let (x, y) = (f32::from_bits(a), f32::from_bits(b));
    // Host max: either NaN yields the second operand.
    if x.is_nan() || y.is_nan() || x <= y {
        b
    } else {
        a
    }
}

fn fmin(a: u32, b: u32) -> u32 {
    let (x, y) = (f32::from_bits(a), f32::from_bits(b));
    if x.is_nan() || y.is_nan() || x >= y {
        b
    } else {
        a
    }
}

fn fround(word: u32, kind: RoundKind) -> u32 {
    let x = f32::from_bits(word);
    if x.is_nan() {
        return word | float::QUIET_BIT_SINGLE;
    }
    let r = match kind {
        RoundKind::Nearest => x.round_ties_even(),
        RoundKind::TowardZero => x.trunc(),
        RoundKind::Up => x.ceil(),
        RoundKind::Down => x.floor(),
    };
    r.to_bits()
}

fn fcmp_mask(a: u32, b: u32, f: impl Fn(f32, f32) -> bool) -> u32 {
    if f(f32::from_bits(a), f32::from_bits(b)) {
        u32::MAX
    } else {
        0
    }
}

fn estimate(word: u32, f: impl Fn(f32) -> f32) -> u32 {
    lane::arith(&[word], || f(f32::from_bits(word)))
}

/// Evaluate a vector op; returns the result and whether any lane saturated
fn vector(op: VecOp, a: u128, b: u128, c: u128) -> (u128, bool) {
    let plain = |v: u128| (v, false);
    match op {
        VecOp::And => plain(a & b),
        VecOp::AndC => plain(a & !b),
        VecOp::Or => plain(a | b),
        VecOp::Xor => plain(a ^ b),
        VecOp::Nor => plain(!(a | b)),
        VecOp::Select => plain((a & !c) | (b & c)),
        VecOp::Permute => {
            let src = bytes32(a, b);
            let ctl = c.to_be_bytes();
            plain(u128::from_be_bytes(ctl.map(|sel| src[(sel & 0x1F) as usize])))
        }
        VecOp::ShiftLeftDouble(sh) => {
            let src = bytes32(a, b);
            let sh = (sh & 0xF) as usize;
            plain(from_bytes(&src[sh..sh + 16]))
        }
        VecOp::MergeHigh(lane) | VecOp::MergeLow(lane) => {
            let (la, lb) = (split(a, lane), split(b, lane));
            let half = lane.count() / 2;
            let base = if matches!(op, VecOp::MergeLow(_)) { half } else { 0 };
            let mut out = [0u32; 16];
            for i in 0..half {
                out[2 * i] = la[base + i];
                out[2 * i + 1] = lb[base + i];
            }
            plain(join(&out, lane))
        }
        VecOp::Splat(lane, index) => {
            let la = split(a, lane);
            let value = la[index as usize % lane.count()];
            plain(join(&[value; 16], lane))
        }
        VecOp::AddModulo(lane) => plain(map2(a, b, lane, |x, y, w| x.wrapping_add(y) & lane_mask(w))),
        VecOp::SubModulo(lane) => plain(map2(a, b, lane, |x, y, w| x.wrapping_sub(y) & lane_mask(w))),
        VecOp::AddCarryWord => plain(map2(a, b, Lane::Word, |x, y, _| x.overflowing_add(y).1 as u32)),
        VecOp::SubUnsignedSat(lane) => {
            let (la, lb) = (split(a, lane), split(b, lane));
            let mut out = [0u32; 16];
            let mut saturated = false;
            for i in 0..lane.count() {
                match la[i].checked_sub(lb[i]) {
                    Some(d) => out[i] = d,
                    None => saturated = true,
                }
            }
            (join(&out, lane), saturated)
        }
        VecOp::PackWordModulo => {
            let (wa, wb) = (Vector128::from_u128(a).words, Vector128::from_u128(b).words);
            let halves: [u16; 8] = std::array::from_fn(|i| if i < 4 { wa[i] as u16 } else { wb[i - 4] as u16 });
            plain(Vector128::from_u16x8(halves).to_u128())
        }
        VecOp::PackWordSignedSat => {
            let (wa, wb) = (Vector128::from_u128(a).words, Vector128::from_u128(b).words);
            let mut saturated = false;
            let halves: [u16; 8] = std::array::from_fn(|i| {
                let word = (if i < 4 { wa[i] } else { wb[i - 4] }) as i32;
                let clamped = word.clamp(i16::MIN as i32, i16::MAX as i32);
                saturated |= clamped != word;
                clamped as i16 as u16
            });
            (Vector128::from_u16x8(halves).to_u128(), saturated)
        }
        VecOp::ShiftLeft(lane) => plain(map2(a, b, lane, |x, y, w| (x << (y & (w - 1))) & lane_mask(w))),
        VecOp::ShiftRight(lane) => plain(map2(a, b, lane, |x, y, w| x >> (y & (w - 1)))),
        VecOp::ShiftRightAlg(lane) => plain(map2(a, b, lane, |x, y, w| {
            (sign_extend(x, w) >> (y & (w - 1))) as u32 & lane_mask(w)
        })),
        VecOp::CmpEqWord => plain(map_words(a, b, 0, |x, y, _| if x == y { u32::MAX } else { 0 })),
        VecOp::CmpEqFloat => plain(map_words(a, b, 0, |x, y, _| fcmp_mask(x, y, |p, q| p == q))),
        VecOp::CmpGtFloat => plain(map_words(a, b, 0, |x, y, _| fcmp_mask(x, y, |p, q| p > q))),
        VecOp::CmpGeFloat => plain(map_words(a, b, 0, |x, y, _| fcmp_mask(x, y, |p, q| p >= q))),
        VecOp::FAdd => plain(map_words(a, b, 0, |x, y, _| {
            lane::arith(&[x, y], || f32::from_bits(x) + f32::from_bits(y))
        })),
        VecOp::FSub => plain(map_words(a, b, 0, |x, y, _| {
            lane::arith(&[x, y], || f32::from_bits(x) - f32::from_bits(y))
        })),
        VecOp::FMulAdd => plain(map_words(a, b, c, |x, y, z| {
            lane::arith(&[x, y, z], || f32::from_bits(x).mul_add(f32::from_bits(z), f32::from_bits(y)))
        })),
        VecOp::FNegMulSub => plain(map_words(a, b, c, |x, y, z| {
            lane::arith(&[x, y, z], || -f32::from_bits(x).mul_add(f32::from_bits(z), -f32::from_bits(y)))
        })),
        VecOp::FMax => plain(map_words(a, b, 0, |x, y, _| fmax(x, y))),
        VecOp::FMin => plain(map_words(a, b, 0, |x, y, _| fmin(x, y))),
        VecOp::FRound(kind) => plain(map_words(a, 0, 0, |x, _, _| fround(x, kind))),
        VecOp::FRecipEstimate => plain(map_words(a, 0, 0, |x, _, _| estimate(x, |v| 1.0 / v))),
        VecOp::FRsqrtEstimate => plain(map_words(a, 0, 0, |x, _, _| estimate(x, |v| 1.0 / v.sqrt()))),
        VecOp::FExp2Estimate => plain(map_words(a, 0, 0, |x, _, _| estimate(x, f32::exp2))),
        VecOp::FLog2Estimate => plain(map_words(a, 0, 0, |x, _, _| estimate(x, f32::log2))),
        VecOp::FlushDenormals => plain(map_words(a, 0, 0, |x, _, _| lane::flush_denormal(x))),
        VecOp::ShiftControlLeft => {
            let sh = (a & 0xF) as u8;
            plain(u128::from_be_bytes(std::array::from_fn(|i| sh + i as u8)))
        }
        VecOp::ShiftControlRight => {
            let sh = (a & 0xF) as u8;
            plain(u128::from_be_bytes(std::array::from_fn(|i| 16 - sh + i as u8)))
        }
        VecOp::ShiftLeftBytes => plain(if b >= 16 { 0 } else { a << (8 * b as u32) }),
        VecOp::ShiftRightBytes => plain(if b >= 16 { 0 } else { a >> (8 * b as u32) }),
        VecOp::ExtractByteOffset(lane) => {
            let width = (lane.bits() / 8) as u128;
            let index = ((b & 0xF) / width) as usize;
            plain(split(a, lane)[index] as u128)
        }
        VecOp::CompareSummary => {
            let code = if a == u128::MAX {
                8
            } else if a == 0 {
                2
            } else {
                0
            };
            plain(code)
        }
    }
}

fn call(helper: Helper, args: &[u128], state: &mut ThreadState, mmu: &dyn Mmu) -> u128 {
    let arg = |i: usize| args.get(i).copied().unwrap_or(0);
    match helper {
        Helper::Read(size) => mmu.read(state, arg(0) as u64, size),
        Helper::Write(size) => {
            mmu.write(state, arg(0) as u64, size, arg(1));
            0
        }
        Helper::Translate(size) => mmu.translate(state, arg(0) as u64, size).unwrap_or(0) as u128,
        Helper::HostLoad(size) => mmu.host_load(state, arg(1) as u64, arg(0) as u64, size) as u128,
        Helper::HostCas(size) => {
            mmu.host_cas(state, arg(0) as u64, size, arg(1) as u64, arg(2) as u64) as u128
        }
        Helper::Raise(exception) => {
            match exception {
                Exception::Trap => {
                    state.srr1 |= SRR1_TRAP;
                    state.ex |= ex::PROGRAM;
                }
                Exception::FpUnavailable => state.ex |= ex::FPU_UNAVAILABLE,
                Exception::VxUnavailable => state.ex |= ex::VXU_UNAVAILABLE,
                Exception::SystemCall(_) => state.ex |= ex::SYSTEM_CALL,
            }
            jit_trace!("raise {:?} at 0x{:08X}", exception, state.cia);
            0
        }
        Helper::ReadTimeBase => state.tb as u128,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jit::builder::BlockBuilder;
    use crate::state::Slot;
    use crate::instruction::Instruction;
    use xe_memory::GuestMemory;

    fn run_ops(build: impl FnOnce(&mut BlockBuilder)) -> Result<ThreadState, JitError> {
        let mut builder = BlockBuilder::new(0);
        builder.emit_instruction(0, Instruction(0x6000_0000), false, |ctx, _| build(ctx.b));
        let block = builder.finish()?;
        let mem = GuestMemory::new(0x1000).unwrap();
        let mut state = ThreadState::new(0);
        Executor::default().run(&block, &mut state, &mem)?;
        Ok(state)
    }

    #[test]
    fn test_divide_fault_is_reported() {
        let result = run_ops(|b| {
            let x = b.konst(1);
            let zero = b.konst(0);
            let q = b.bin(BinOp::DivU, Width::W64, x, zero);
            b.store(Slot::Gpr(3), q);
        });
        assert_eq!(result.unwrap_err(), JitError::DivideFault);

        let result = run_ops(|b| {
            let min = b.konst(i64::MIN as u64);
            let neg = b.konst(u64::MAX);
            b.bin(BinOp::DivS, Width::W64, min, neg);
        });
        assert_eq!(result.unwrap_err(), JitError::DivideFault);
    }

    #[test]
    fn test_undefined_value() {
        let result = run_ops(|b| {
            let ghost = b.new_value();
            b.store(Slot::Gpr(1), ghost);
        });
        assert!(matches!(result, Err(JitError::UndefinedValue(_))));
    }

    #[test]
    fn test_step_limit() {
        let mut builder = BlockBuilder::new(0x100);
        builder.emit_instruction(0x100, Instruction(0x4800_0000), false, |ctx, _| {
            let top = ctx.b.new_label();
            ctx.b.bind(top);
            ctx.b.jump(top);
        });
        let block = builder.finish().unwrap();
        let mem = GuestMemory::new(0x1000).unwrap();
        let mut state = ThreadState::new(0);
        let err = Executor::new(100).run(&block, &mut state, &mem).unwrap_err();
        assert_eq!(err, JitError::StepLimit { addr: 0x100, limit: 100 });
    }

    #[test]
    fn test_word_width_ops() {
        let state = run_ops(|b| {
            let a = b.konst(0xFFFF_FFFF_8000_0000);
            let one = b.konst(1);
            let sum = b.bin(BinOp::Add, Width::W32, a, one);
            b.store(Slot::Gpr(3), sum);
            let sar = b.bin(BinOp::Sar, Width::W32, a, one);
            b.store(Slot::Gpr(4), sar);
            let carry = b.bin(BinOp::AddCarry, Width::W32, a, a);
            b.store(Slot::Gpr(5), carry);
        })
        .unwrap();
        assert_eq!(state.gpr[3], 0x8000_0001);
        assert_eq!(state.gpr[4], 0xC000_0000);
        assert_eq!(state.gpr[5], 1);
    }

    #[test]
    fn test_vector_lanes() {
        let a = Vector128::from_u32x4([1, 2, 3, 4]).to_u128();
        let b = Vector128::from_u32x4([5, 6, 7, 8]).to_u128();
        let (merged, _) = vector(VecOp::MergeHigh(Lane::Word), a, b, 0);
        assert_eq!(Vector128::from_u128(merged).words, [1, 5, 2, 6]);
        let (merged, _) = vector(VecOp::MergeLow(Lane::Word), a, b, 0);
        assert_eq!(Vector128::from_u128(merged).words, [3, 7, 4, 8]);

        let (splat, _) = vector(VecOp::Splat(Lane::Half, 1), 0x0001_0002_0003_0004 << 64, 0, 0);
        assert_eq!(Vector128::from_u128(splat).as_u16x8(), [2; 8]);

        let (diff, sat) = vector(VecOp::SubUnsignedSat(Lane::Half), 0, Vector128::from_u16x8([1; 8]).to_u128(), 0);
        assert_eq!(diff, 0);
        assert!(sat);

        let (ctl, _) = vector(VecOp::ShiftControlLeft, 3, 0, 0);
        assert_eq!(ctl.to_be_bytes()[0], 3);
        assert_eq!(ctl.to_be_bytes()[15], 18);
    }

    #[test]
    fn test_vector_shift_counts_wrap() {
        let a = Vector128::from_u32x4([1; 4]).to_u128();
        let b = Vector128::from_u32x4([33; 4]).to_u128();
        let (shifted, _) = vector(VecOp::ShiftLeft(Lane::Word), a, b, 0);
        assert_eq!(Vector128::from_u128(shifted).words, [2; 4]);

        let bytes = u128::from_be_bytes([0x80; 16]);
        let counts = u128::from_be_bytes([9; 16]);
        let (sra, _) = vector(VecOp::ShiftRightAlg(Lane::Byte), bytes, counts, 0);
        assert_eq!(sra, u128::from_be_bytes([0xC0; 16]));
    }
}
