//! NaN/Inf/denormal decision table for the arithmetic FPU ops
//!
//! Rules are evaluated in order. Flag rules only record an FPSCR bit and
//! evaluation continues; the first other rule whose condition holds decides
//! the result. The conditions are written once against [`Classify`], so the
//! pure evaluator ([`decide`]) and the emitter walk the very same table.

use super::super::float;
use super::super::ir::FTest;
use crate::state::fpscr;

/// Source operand by instruction field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    A,
    B,
    C,
}

impl Operand {
    pub const fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
            Self::C => 2,
        }
    }
}

/// Arithmetic operation of an FPU instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Sqrt,
    /// `a * c + b`
    MulAdd,
    /// `a * c - b`
    MulSub,
    /// `-(a * c + b)`
    NegMulAdd,
    /// `-(a * c - b)`
    NegMulSub,
    /// `frsp`
    RoundToSingle,
    /// `fres`
    RecipEstimate,
    /// `frsqrte`
    RsqrtEstimate,
}

impl ArithOp {
    /// Operands in NaN priority order
    pub const fn operands(self) -> &'static [Operand] {
        match self {
            Self::Add | Self::Sub | Self::Div => &[Operand::A, Operand::B],
            Self::Mul => &[Operand::A, Operand::C],
            Self::Sqrt | Self::RoundToSingle | Self::RecipEstimate | Self::RsqrtEstimate => &[Operand::B],
            Self::MulAdd | Self::MulSub | Self::NegMulAdd | Self::NegMulSub => {
                &[Operand::A, Operand::B, Operand::C]
            }
        }
    }

    /// Invalid-operation checks, in evaluation order
    pub const fn invalid(self) -> &'static [Invalid] {
        match self {
            Self::Add | Self::Sub => &[Invalid::Isi],
            Self::Mul => &[Invalid::Imz],
            Self::Div => &[Invalid::Idi, Invalid::Zdz],
            Self::Sqrt | Self::RsqrtEstimate => &[Invalid::Sqrt],
            Self::MulAdd | Self::MulSub | Self::NegMulAdd | Self::NegMulSub => &[Invalid::Imz, Invalid::Isi],
            Self::RoundToSingle | Self::RecipEstimate => &[],
        }
    }

    pub const fn is_fused(self) -> bool {
        matches!(self, Self::MulAdd | Self::MulSub | Self::NegMulAdd | Self::NegMulSub)
    }

    /// The computed result is negated
    pub const fn negates(self) -> bool {
        matches!(self, Self::NegMulAdd | Self::NegMulSub)
    }

    /// The addend enters with its sign flipped
    pub const fn subtracts(self) -> bool {
        matches!(self, Self::Sub | Self::MulSub | Self::NegMulSub)
    }

    /// A zero divisor raises ZX and yields a signed infinity
    pub const fn divides(self) -> bool {
        matches!(self, Self::Div | Self::RecipEstimate | Self::RsqrtEstimate)
    }

    /// Double denormal inputs are invalid at single precision
    const fn rejects_denormals(self) -> bool {
        !matches!(self, Self::RoundToSingle | Self::RecipEstimate | Self::RsqrtEstimate)
    }
}

/// Result precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    Double,
    Single,
}

/// One FPU arithmetic instruction shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FpKind {
    pub op: ArithOp,
    pub precision: Precision,
}

impl FpKind {
    pub const fn double(op: ArithOp) -> Self {
        Self { op, precision: Precision::Double }
    }

    pub const fn single(op: ArithOp) -> Self {
        Self { op, precision: Precision::Single }
    }
}

/// Invalid-operation conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Invalid {
    /// Inf - Inf
    Isi,
    /// Inf * 0
    Imz,
    /// Inf / Inf
    Idi,
    /// 0 / 0
    Zdz,
    /// Square root of a negative number
    Sqrt,
}

impl Invalid {
    /// FPSCR sub-exception bit
    pub const fn bit(self) -> u64 {
        match self {
            Self::Isi => fpscr::VXISI,
            Self::Imz => fpscr::VXIMZ,
            Self::Idi => fpscr::VXIDI,
            Self::Zdz => fpscr::VXZDZ,
            Self::Sqrt => fpscr::VXSQRT,
        }
    }
}

/// One row of the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    /// Record VXSNAN when the operand is signaling
    Snan(Operand),
    /// Result is the quieted operand when it is signaling
    QuietSnan(Operand),
    /// Result is the operand when it is a quiet NaN
    PropagateQnan(Operand),
    /// Result is the default QNaN, with the condition's sub-bit
    Invalid(Invalid),
    /// Double denormal input and no infinite input at single precision
    SingleDenormal,
    /// Finite non-zero dividend over zero
    ZeroDivide,
    /// Run the host operation
    Compute,
}

impl Rule {
    /// Flag rules never decide the result
    pub const fn is_flag(self) -> bool {
        matches!(self, Self::Snan(_))
    }

    /// FPSCR bits recorded when the rule fires
    pub const fn flags(self) -> u64 {
        match self {
            Self::Snan(_) => fpscr::VXSNAN,
            Self::Invalid(invalid) => invalid.bit(),
            Self::ZeroDivide => fpscr::ZX,
            _ => 0,
        }
    }

    pub const fn outcome(self) -> Outcome {
        match self {
            Self::Snan(_) | Self::Compute => Outcome::Compute,
            Self::QuietSnan(operand) | Self::PropagateQnan(operand) => Outcome::Nan(operand),
            Self::Invalid(_) | Self::SingleDenormal => Outcome::DefaultNan,
            Self::ZeroDivide => Outcome::Infinity,
        }
    }
}

/// Build the ordered table for `kind`
pub fn rules(kind: FpKind) -> Vec<Rule> {
    let operands = kind.op.operands();
    let mut table = Vec::with_capacity(3 * operands.len() + 4);
    table.extend(operands.iter().map(|op| Rule::Snan(*op)));
    for op in operands {
        table.push(Rule::QuietSnan(*op));
        table.push(Rule::PropagateQnan(*op));
    }
    table.extend(kind.op.invalid().iter().map(|invalid| Rule::Invalid(*invalid)));
    if kind.precision == Precision::Single && kind.op.rejects_denormals() {
        table.push(Rule::SingleDenormal);
    }
    if kind.op.divides() {
        table.push(Rule::ZeroDivide);
    }
    table.push(Rule::Compute);
    table
}

/// How the result is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The operand with its quiet bit forced
    Nan(Operand),
    /// `0x7FF8_0000_0000_0000`
    DefaultNan,
    /// Infinity signed like the exact quotient
    Infinity,
    /// The host computation
    Compute,
}

/// Result choice plus the FPSCR bits recorded on the way
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub outcome: Outcome,
    pub flags: u64,
}

/// Boolean algebra over operand classifications
///
/// Implemented over plain `bool`s for [`decide`] and over emitted 0/1 values
/// by the emitter.
pub trait Classify {
    type Bit: Copy;

    fn test(&mut self, test: FTest, operand: Operand) -> Self::Bit;
    fn always(&mut self) -> Self::Bit;
    fn not(&mut self, bit: Self::Bit) -> Self::Bit;
    fn and(&mut self, lhs: Self::Bit, rhs: Self::Bit) -> Self::Bit;
    fn or(&mut self, lhs: Self::Bit, rhs: Self::Bit) -> Self::Bit;
    fn xor(&mut self, lhs: Self::Bit, rhs: Self::Bit) -> Self::Bit;

    fn all(&mut self, bits: &[Self::Bit]) -> Self::Bit {
        let mut acc = bits[0];
        for bit in &bits[1..] {
            acc = self.and(acc, *bit);
        }
        acc
    }

    fn any(&mut self, bits: &[Self::Bit]) -> Self::Bit {
        let mut acc = bits[0];
        for bit in &bits[1..] {
            acc = self.or(acc, *bit);
        }
        acc
    }
}

fn invalid_condition<C: Classify>(invalid: Invalid, kind: FpKind, c: &mut C) -> C::Bit {
    use Operand::{A, B, C as Third};
    match invalid {
        Invalid::Isi if kind.op.is_fused() => {
            let a_inf = c.test(FTest::IsInf, A);
            let c_inf = c.test(FTest::IsInf, Third);
            let product_inf = c.or(a_inf, c_inf);
            let a_neg = c.test(FTest::IsNegative, A);
            let c_neg = c.test(FTest::IsNegative, Third);
            let product_neg = c.xor(a_neg, c_neg);
            let b_neg = c.test(FTest::IsNegative, B);
            let addend_neg = if kind.op.subtracts() { c.not(b_neg) } else { b_neg };
            let opposite = c.xor(product_neg, addend_neg);
            let b_inf = c.test(FTest::IsInf, B);
            c.all(&[product_inf, b_inf, opposite])
        }
        Invalid::Isi => {
            let a_inf = c.test(FTest::IsInf, A);
            let b_inf = c.test(FTest::IsInf, B);
            let a_neg = c.test(FTest::IsNegative, A);
            let b_neg = c.test(FTest::IsNegative, B);
            let differ = c.xor(a_neg, b_neg);
            let opposite = if kind.op.subtracts() { c.not(differ) } else { differ };
            c.all(&[a_inf, b_inf, opposite])
        }
        Invalid::Imz => {
            let a_inf = c.test(FTest::IsInf, A);
            let c_zero = c.test(FTest::IsZero, Third);
            let a_zero = c.test(FTest::IsZero, A);
            let c_inf = c.test(FTest::IsInf, Third);
            let inf_zero = c.and(a_inf, c_zero);
            let zero_inf = c.and(a_zero, c_inf);
            c.or(inf_zero, zero_inf)
        }
        Invalid::Idi => {
            let a_inf = c.test(FTest::IsInf, A);
            let b_inf = c.test(FTest::IsInf, B);
            c.and(a_inf, b_inf)
        }
        Invalid::Zdz => {
            let a_zero = c.test(FTest::IsZero, A);
            let b_zero = c.test(FTest::IsZero, B);
            c.and(a_zero, b_zero)
        }
        Invalid::Sqrt => {
            let negative = c.test(FTest::IsNegative, B);
            let zero = c.test(FTest::IsZero, B);
            let nonzero = c.not(zero);
            c.and(negative, nonzero)
        }
    }
}

/// Condition under which `rule` fires for `kind`
pub fn condition<C: Classify>(rule: Rule, kind: FpKind, c: &mut C) -> C::Bit {
    match rule {
        Rule::Snan(op) | Rule::QuietSnan(op) => c.test(FTest::IsSnan, op),
        Rule::PropagateQnan(op) => c.test(FTest::IsQnan, op),
        Rule::Invalid(invalid) => invalid_condition(invalid, kind, c),
        Rule::SingleDenormal => {
            let operands = kind.op.operands();
            let denormals: Vec<_> = operands.iter().map(|op| c.test(FTest::IsDenormal, *op)).collect();
            let infinities: Vec<_> = operands.iter().map(|op| c.test(FTest::IsInf, *op)).collect();
            let any_denormal = c.any(&denormals);
            let any_inf = c.any(&infinities);
            let no_inf = c.not(any_inf);
            c.and(any_denormal, no_inf)
        }
        Rule::ZeroDivide => {
            let divisor_zero = c.test(FTest::IsZero, Operand::B);
            if kind.op == ArithOp::Div {
                let a_zero = c.test(FTest::IsZero, Operand::A);
                let a_inf = c.test(FTest::IsInf, Operand::A);
                let a_special = c.or(a_zero, a_inf);
                let a_ordinary = c.not(a_special);
                c.and(divisor_zero, a_ordinary)
            } else {
                divisor_zero
            }
        }
        Rule::Compute => c.always(),
    }
}

struct Operands([u64; 3]);

impl Classify for Operands {
    type Bit = bool;

    fn test(&mut self, test: FTest, operand: Operand) -> bool {
        float::classify(test, self.0[operand.index()]) != 0
    }

    fn always(&mut self) -> bool {
        true
    }

    fn not(&mut self, bit: bool) -> bool {
        !bit
    }

    fn and(&mut self, lhs: bool, rhs: bool) -> bool {
        lhs && rhs
    }

    fn or(&mut self, lhs: bool, rhs: bool) -> bool {
        lhs || rhs
    }

    fn xor(&mut self, lhs: bool, rhs: bool) -> bool {
        lhs != rhs
    }
}

/// Walk the table for raw operand bit patterns
pub fn decide(kind: FpKind, a: u64, b: u64, c: u64) -> Decision {
    let mut operands = Operands([a, b, c]);
    let mut flags = 0;
    for rule in rules(kind) {
        if !condition(rule, kind, &mut operands) {
            continue;
        }
        flags |= rule.flags();
        if !rule.is_flag() {
            return Decision { outcome: rule.outcome(), flags };
        }
    }
    // `Compute` always fires; this is unreachable for a well-formed table.
    Decision { outcome: Outcome::Compute, flags }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAN: u64 = 0x7FF0_0000_0000_0001;
    const QNAN: u64 = 0x7FF8_0000_0000_0002;
    const INF: u64 = 0x7FF0_0000_0000_0000;
    const NEG_INF: u64 = 0xFFF0_0000_0000_0000;
    const ONE: u64 = 0x3FF0_0000_0000_0000;
    const ZERO: u64 = 0;
    const DENORMAL: u64 = 1;

    #[test]
    fn test_table_shape() {
        let table = rules(FpKind::double(ArithOp::Add));
        assert_eq!(
            table,
            vec![
                Rule::Snan(Operand::A),
                Rule::Snan(Operand::B),
                Rule::QuietSnan(Operand::A),
                Rule::PropagateQnan(Operand::A),
                Rule::QuietSnan(Operand::B),
                Rule::PropagateQnan(Operand::B),
                Rule::Invalid(Invalid::Isi),
                Rule::Compute,
            ]
        );
        assert!(rules(FpKind::single(ArithOp::Add)).contains(&Rule::SingleDenormal));
        assert!(!rules(FpKind::single(ArithOp::RoundToSingle)).contains(&Rule::SingleDenormal));
        assert!(rules(FpKind::double(ArithOp::Div)).contains(&Rule::ZeroDivide));
    }

    #[test]
    fn test_inf_minus_inf() {
        let d = decide(FpKind::double(ArithOp::Add), INF, NEG_INF, 0);
        assert_eq!(d.outcome, Outcome::DefaultNan);
        assert_eq!(d.flags, fpscr::VXISI);

        let d = decide(FpKind::double(ArithOp::Sub), INF, INF, 0);
        assert_eq!(d.outcome, Outcome::DefaultNan);

        let d = decide(FpKind::double(ArithOp::Add), INF, INF, 0);
        assert_eq!(d.outcome, Outcome::Compute);
        assert_eq!(d.flags, 0);
    }

    #[test]
    fn test_nan_priority_by_position() {
        // A quiet NaN in A beats a signaling NaN in B, but B still raises VXSNAN.
        let d = decide(FpKind::double(ArithOp::Add), QNAN, SNAN, 0);
        assert_eq!(d.outcome, Outcome::Nan(Operand::A));
        assert_eq!(d.flags, fpscr::VXSNAN);

        let d = decide(FpKind::double(ArithOp::NegMulAdd), ONE, QNAN, SNAN);
        assert_eq!(d.outcome, Outcome::Nan(Operand::B));
        assert_eq!(d.flags, fpscr::VXSNAN);

        let d = decide(FpKind::double(ArithOp::NegMulAdd), ONE, ONE, SNAN);
        assert_eq!(d.outcome, Outcome::Nan(Operand::C));
    }

    #[test]
    fn test_fused_invalids() {
        let d = decide(FpKind::double(ArithOp::MulAdd), INF, ONE, ZERO);
        assert_eq!(d.outcome, Outcome::DefaultNan);
        assert_eq!(d.flags, fpscr::VXIMZ);

        let d = decide(FpKind::double(ArithOp::MulAdd), INF, NEG_INF, ONE);
        assert_eq!(d.flags, fpscr::VXISI);

        let d = decide(FpKind::double(ArithOp::MulSub), INF, INF, ONE);
        assert_eq!(d.flags, fpscr::VXISI);

        let d = decide(FpKind::double(ArithOp::MulSub), INF, NEG_INF, ONE);
        assert_eq!(d.outcome, Outcome::Compute);
    }

    #[test]
    fn test_divide_rules() {
        assert_eq!(decide(FpKind::double(ArithOp::Div), ZERO, ZERO, 0).flags, fpscr::VXZDZ);
        assert_eq!(decide(FpKind::double(ArithOp::Div), INF, NEG_INF, 0).flags, fpscr::VXIDI);

        let d = decide(FpKind::double(ArithOp::Div), ONE, ZERO, 0);
        assert_eq!(d.outcome, Outcome::Infinity);
        assert_eq!(d.flags, fpscr::ZX);

        let d = decide(FpKind::double(ArithOp::Div), INF, ZERO, 0);
        assert_eq!(d.outcome, Outcome::Compute);
    }

    #[test]
    fn test_single_denormal_rule() {
        let d = decide(FpKind::single(ArithOp::Add), DENORMAL, ONE, 0);
        assert_eq!(d.outcome, Outcome::DefaultNan);
        assert_eq!(d.flags, 0);

        let d = decide(FpKind::single(ArithOp::Add), DENORMAL, INF, 0);
        assert_eq!(d.outcome, Outcome::Compute);

        let d = decide(FpKind::double(ArithOp::Add), DENORMAL, ONE, 0);
        assert_eq!(d.outcome, Outcome::Compute);
    }

    #[test]
    fn test_sqrt_of_negative() {
        let minus_one = ONE | 1 << 63;
        assert_eq!(decide(FpKind::double(ArithOp::Sqrt), 0, minus_one, 0).flags, fpscr::VXSQRT);
        let minus_zero = 1 << 63;
        assert_eq!(decide(FpKind::double(ArithOp::Sqrt), 0, minus_zero, 0).outcome, Outcome::Compute);
    }
}
