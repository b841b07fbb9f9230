//! Host floating-point support for the executor
//!
//! The host FPU only rounds to nearest. Directed rounding is derived from the
//! sign of the exact rounding error, which every basic op can recover with
//! one extra host op (TwoSum for add/sub, a fused multiply-add residual for
//! mul, div and sqrt). The nearest result is then nudged by one ulp when the
//! selected mode rounds the other way.

use std::cmp::Ordering;

use super::ir::{FTest, FpStatus, RoundKind};
use crate::state::fpscr::class;

/// Default quiet NaN produced by invalid operations
pub const DEFAULT_QNAN: u64 = 0x7FF8_0000_0000_0000;
/// Quiet bit of a double NaN
pub const QUIET_BIT: u64 = 1 << 51;
/// Default quiet NaN of single-precision vector lanes
pub const DEFAULT_QNAN_SINGLE: u32 = 0x7FC0_0000;
/// Quiet bit of a single NaN
pub const QUIET_BIT_SINGLE: u32 = 1 << 22;

const EXP_MASK: u64 = 0x7FF0_0000_0000_0000;
const FRAC_MASK: u64 = 0x000F_FFFF_FFFF_FFFF;
const SIGN: u64 = 1 << 63;

/// Result of a rounded operation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rounded {
    pub value: f64,
    pub status: FpStatus,
}

impl Rounded {
    fn exact(value: f64) -> Self {
        Self { value, status: FpStatus::empty() }
    }
}

trait Ulp: Copy + PartialOrd + Into<f64> {
    const MAX: Self;
    const MIN_POSITIVE: Self;
    const ZERO: Self;
    fn next_up(self) -> Self;
    fn next_down(self) -> Self;
    fn is_infinite(self) -> bool;
    fn copysign(self, sign: Self) -> Self;
}

macro_rules! impl_ulp {
    ($ty:ty, $min_sub:expr) => {
        impl Ulp for $ty {
            const MAX: Self = <$ty>::MAX;
            const MIN_POSITIVE: Self = <$ty>::MIN_POSITIVE;
            const ZERO: Self = 0.0;

            fn next_up(self) -> Self {
                if self.is_nan() || self == <$ty>::INFINITY {
                    return self;
                }
                if self == 0.0 {
                    return <$ty>::from_bits($min_sub);
                }
                let bits = self.to_bits();
                if self > 0.0 {
                    <$ty>::from_bits(bits + 1)
                } else {
                    <$ty>::from_bits(bits - 1)
                }
            }

            fn next_down(self) -> Self {
                -(-self).next_up()
            }

            fn is_infinite(self) -> bool {
                <$ty>::is_infinite(self)
            }

            fn copysign(self, sign: Self) -> Self {
                <$ty>::copysign(self, sign)
            }
        }
    };
}

impl_ulp!(f64, 1);
impl_ulp!(f32, 1);

/// Apply `mode` to a round-to-nearest result whose exact value compares to
/// it as `err` (`Greater`: exact is larger)
fn directed<F: Ulp>(nearest: F, err: Ordering, mode: RoundKind, inputs_finite: bool) -> (F, FpStatus) {
    let mut status = FpStatus::empty();

    if nearest.is_infinite() && inputs_finite {
        status |= FpStatus::OVERFLOW | FpStatus::INEXACT;
        let positive = nearest > F::ZERO;
        let max = F::MAX.copysign(nearest);
        let value = match mode {
            RoundKind::Nearest => nearest,
            RoundKind::TowardZero => max,
            RoundKind::Up if positive => nearest,
            RoundKind::Down if !positive => nearest,
            _ => max,
        };
        if value.is_infinite() {
            status |= FpStatus::ROUNDED_UP;
        }
        return (value, status);
    }

    if err == Ordering::Equal {
        return (nearest, status);
    }
    status |= FpStatus::INEXACT;

    let value = match (mode, err) {
        (RoundKind::TowardZero, Ordering::Greater) if nearest < F::ZERO => nearest.next_up(),
        (RoundKind::TowardZero, Ordering::Less) if nearest > F::ZERO => nearest.next_down(),
        (RoundKind::Up, Ordering::Greater) => nearest.next_up(),
        (RoundKind::Down, Ordering::Less) => nearest.next_down(),
        _ => nearest,
    };
    let err = if value != nearest { err.reverse() } else { err };

    let away = (value > F::ZERO && err == Ordering::Less) || (value < F::ZERO && err == Ordering::Greater);
    if away {
        status |= FpStatus::ROUNDED_UP;
    }
    let magnitude: f64 = value.into();
    let min_normal: f64 = F::MIN_POSITIVE.into();
    if magnitude.abs() < min_normal {
        status |= FpStatus::UNDERFLOW;
    }
    (value, status)
}

fn sign_of(x: f64) -> Ordering {
    x.partial_cmp(&0.0).unwrap_or(Ordering::Equal)
}

/// `a + b` rounded per `mode`
pub fn add(a: f64, b: f64, mode: RoundKind) -> Rounded {
    let sum = a + b;
    if sum.is_nan() || !a.is_finite() || !b.is_finite() {
        return Rounded::exact(sum);
    }
    if sum == 0.0 && a.is_sign_positive() != b.is_sign_positive() {
        let zero = if mode == RoundKind::Down { -0.0 } else { 0.0 };
        return Rounded::exact(zero);
    }
    let err = if sum.is_finite() {
        let bb = sum - a;
        sign_of((a - (sum - bb)) + (b - bb))
    } else {
        Ordering::Equal
    };
    let (value, status) = directed(sum, err, mode, true);
    Rounded { value, status }
}

pub fn sub(a: f64, b: f64, mode: RoundKind) -> Rounded {
    add(a, -b, mode)
}

pub fn mul(a: f64, b: f64, mode: RoundKind) -> Rounded {
    let product = a * b;
    if product.is_nan() || !a.is_finite() || !b.is_finite() {
        return Rounded::exact(product);
    }
    let err = if product.is_finite() {
        sign_of(a.mul_add(b, -product))
    } else {
        Ordering::Equal
    };
    let (value, status) = directed(product, err, mode, true);
    Rounded { value, status }
}

pub fn div(a: f64, b: f64, mode: RoundKind) -> Rounded {
    let quotient = a / b;
    if quotient.is_nan() || !a.is_finite() || !b.is_finite() || b == 0.0 {
        return Rounded::exact(quotient);
    }
    let err = if quotient.is_finite() {
        // exact - q = (a - q*b) / b
        let residual = sign_of((-quotient).mul_add(b, a));
        if b < 0.0 {
            residual.reverse()
        } else {
            residual
        }
    } else {
        Ordering::Equal
    };
    let (value, status) = directed(quotient, err, mode, true);
    Rounded { value, status }
}

pub fn sqrt(a: f64, mode: RoundKind) -> Rounded {
    let root = a.sqrt();
    if !root.is_finite() || a <= 0.0 {
        return Rounded::exact(root);
    }
    let err = sign_of((-root).mul_add(root, a));
    let (value, status) = directed(root, err, mode, true);
    Rounded { value, status }
}

/// Fused `a * c + b`, round to nearest
///
/// Inexact is reported when either the product or the sum carries a rounding
/// error, which can miss cancellations that make the fused result exact.
pub fn mul_add(a: f64, c: f64, b: f64) -> Rounded {
    let value = a.mul_add(c, b);
    if value.is_nan() || !a.is_finite() || !b.is_finite() || !c.is_finite() {
        return Rounded::exact(value);
    }
    let product = a * c;
    let product_err = a.mul_add(c, -product);
    let sum = product + b;
    let bb = sum - product;
    let sum_err = (product - (sum - bb)) + (b - bb);
    let err = sign_of(product_err + sum_err);
    let err = if err == Ordering::Equal && (product_err != 0.0 || sum_err != 0.0) {
        // Residuals cancel; the fused result may still be inexact.
        sign_of(product_err)
    } else {
        err
    };
    let (_, status) = directed(value, err, RoundKind::Nearest, true);
    Rounded { value, status }
}

/// Round a double to single precision, staying in double format
pub fn round_single(x: f64, mode: RoundKind) -> Rounded {
    if x.is_nan() {
        return Rounded::exact(f64::from_bits(single_to_double(double_to_single(x.to_bits()))));
    }
    if x.is_infinite() || x == 0.0 {
        return Rounded::exact(x);
    }
    let nearest = x as f32;
    let err = if nearest.is_infinite() {
        Ordering::Equal
    } else {
        x.partial_cmp(&(nearest as f64)).unwrap_or(Ordering::Equal)
    };
    let (value, status) = directed(nearest, err, mode, true);
    Rounded { value: value as f64, status }
}

/// Round to an integral value per `mode`
pub fn round_integral(x: f64, mode: RoundKind) -> f64 {
    match mode {
        RoundKind::Nearest => x.round_ties_even(),
        RoundKind::TowardZero => x.trunc(),
        RoundKind::Up => x.ceil(),
        RoundKind::Down => x.floor(),
    }
}

/// Convert to a signed integer of `bits` width (32 or 64), saturating
///
/// NaN converts to the most negative value. The result is sign extended to
/// 64 bits.
pub fn to_int(x: f64, bits: u32, mode: RoundKind) -> (i64, FpStatus) {
    let (min, max) = if bits == 32 {
        (i32::MIN as i64, i32::MAX as i64)
    } else {
        (i64::MIN, i64::MAX)
    };
    if x.is_nan() {
        return (min, FpStatus::INVALID);
    }
    let rounded = round_integral(x, mode);
    // 2^63 is exactly representable; anything at or above it saturates.
    if rounded >= -(min as f64) {
        return (max, FpStatus::INVALID);
    }
    if rounded < min as f64 {
        return (min, FpStatus::INVALID);
    }
    let value = rounded as i64;

    let mut status = FpStatus::empty();
    if rounded != x {
        status |= FpStatus::INEXACT;
        if rounded.abs() > x.abs() {
            status |= FpStatus::ROUNDED_UP;
        }
    }
    (value, status)
}

/// Convert a signed doubleword to double per `mode`
pub fn from_int(value: i64, mode: RoundKind) -> Rounded {
    let nearest = value as f64;
    let err = (value as i128).cmp(&(nearest as i128));
    let (value, status) = directed(nearest, err, mode, true);
    Rounded { value, status }
}

/// Widen a raw single to a raw double, keeping NaN payloads and signaling
pub fn single_to_double(word: u32) -> u64 {
    let exp = (word >> 23) & 0xFF;
    let frac = word & 0x7F_FFFF;
    if exp == 0 && frac != 0 {
        return (f32::from_bits(word) as f64).to_bits();
    }
    if exp == 0 {
        return ((word as u64) >> 31) << 63;
    }
    let w = word as u64;
    let sign_msb = (w >> 30) & 0x3;
    let fill = if (w >> 30) & 1 != 0 { 0 } else { 0x7 };
    let fill = if exp == 0xFF { 0x7 } else { fill };
    (sign_msb << 62) | (fill << 59) | ((w & 0x3FFF_FFFF) << 29)
}

/// Narrow a raw double to a raw single by bit selection, keeping NaN payloads
/// and signaling; values in the single denormal range are denormalized
pub fn double_to_single(bits: u64) -> u32 {
    let exp = ((bits >> 52) & 0x7FF) as i32;
    if exp > 896 || bits & !SIGN == 0 {
        return (((bits >> 62) & 0x3) << 30) as u32 | ((bits >> 29) & 0x3FFF_FFFF) as u32;
    }
    let sign = ((bits >> 63) as u32) << 31;
    if exp >= 874 {
        let frac = (bits & FRAC_MASK) | (1 << 52);
        let shift = 29 + (897 - exp) as u32;
        return sign | (frac >> shift) as u32;
    }
    sign
}

pub fn is_nan(bits: u64) -> bool {
    bits & EXP_MASK == EXP_MASK && bits & FRAC_MASK != 0
}

pub fn is_snan(bits: u64) -> bool {
    is_nan(bits) && bits & QUIET_BIT == 0
}

pub fn is_qnan(bits: u64) -> bool {
    is_nan(bits) && bits & QUIET_BIT != 0
}

pub fn is_denormal(bits: u64) -> bool {
    bits & EXP_MASK == 0 && bits & FRAC_MASK != 0
}

/// FPRF class code of a double
pub fn fprf(bits: u64) -> u64 {
    let negative = bits & SIGN != 0;
    let x = f64::from_bits(bits);
    if x.is_nan() {
        class::QNAN
    } else if x.is_infinite() {
        if negative { class::NEG_INF } else { class::POS_INF }
    } else if x == 0.0 {
        if negative { class::NEG_ZERO } else { class::POS_ZERO }
    } else if is_denormal(bits) {
        if negative { class::NEG_DENORMAL } else { class::POS_DENORMAL }
    } else if negative {
        class::NEG_NORMAL
    } else {
        class::POS_NORMAL
    }
}

/// FPRF class code of a double holding a single-precision result
pub fn fprf_single(bits: u64) -> u64 {
    let x = f64::from_bits(bits);
    if x.is_finite() && x != 0.0 && x.abs() < f32::MIN_POSITIVE as f64 {
        return if x < 0.0 { class::NEG_DENORMAL } else { class::POS_DENORMAL };
    }
    fprf(bits)
}

/// Evaluate a classification predicate (1 or 0) or an FPRF code on a raw
/// double
pub fn classify(test: FTest, bits: u64) -> u64 {
    let x = f64::from_bits(bits);
    match test {
        FTest::IsSnan => is_snan(bits) as u64,
        FTest::IsQnan => is_qnan(bits) as u64,
        FTest::IsNan => is_nan(bits) as u64,
        FTest::IsInf => x.is_infinite() as u64,
        FTest::IsZero => (x == 0.0) as u64,
        FTest::IsDenormal => is_denormal(bits) as u64,
        FTest::IsNegative => bits >> 63,
        FTest::Fprf => fprf(bits),
        FTest::FprfSingle => fprf_single(bits),
    }
}

/// Compare for a CR field: LT 8, GT 4, EQ 2, unordered 1
pub fn compare(a: f64, b: f64) -> u64 {
    match a.partial_cmp(&b) {
        Some(Ordering::Less) => 8,
        Some(Ordering::Greater) => 4,
        Some(Ordering::Equal) => 2,
        None => 1,
    }
}

/// Lane helpers for single-precision vector ops
pub mod lane {
    use super::{DEFAULT_QNAN_SINGLE, QUIET_BIT_SINGLE};

    pub fn is_nan(word: u32) -> bool {
        f32::from_bits(word).is_nan()
    }

    pub fn is_denormal(word: u32) -> bool {
        word & 0x7F80_0000 == 0 && word & 0x7F_FFFF != 0
    }

    pub fn flush_denormal(word: u32) -> u32 {
        if is_denormal(word) {
            word & 0x8000_0000
        } else {
            word
        }
    }

    /// First NaN operand, quieted; `None` when no operand is NaN
    pub fn first_nan(operands: &[u32]) -> Option<u32> {
        operands
            .iter()
            .find(|w| is_nan(**w))
            .map(|w| w | QUIET_BIT_SINGLE)
    }

    /// Lane result with first-NaN propagation and the default NaN for
    /// invalid results
    pub fn arith(operands: &[u32], compute: impl FnOnce() -> f32) -> u32 {
        if let Some(nan) = first_nan(operands) {
            return nan;
        }
        let result = compute();
        if result.is_nan() {
            DEFAULT_QNAN_SINGLE
        } else {
            result.to_bits()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directed_add() {
        let tiny = f64::from_bits(1);
        assert_eq!(add(1.0, tiny, RoundKind::Nearest).value, 1.0);
        assert_eq!(add(1.0, tiny, RoundKind::Up).value, 1.0f64.next_up_manual());
        assert_eq!(add(1.0, tiny, RoundKind::Down).value, 1.0);
        assert_eq!(add(-1.0, -tiny, RoundKind::TowardZero).value, -1.0);

        let r = add(1.0, tiny, RoundKind::Up);
        assert!(r.status.contains(FpStatus::INEXACT | FpStatus::ROUNDED_UP));
        assert!(add(1.0, 2.0, RoundKind::Nearest).status.is_empty());
    }

    #[test]
    fn test_exact_zero_sign() {
        assert!(add(1.0, -1.0, RoundKind::Nearest).value.is_sign_positive());
        assert!(add(1.0, -1.0, RoundKind::Down).value.is_sign_negative());
    }

    #[test]
    fn test_overflow_modes() {
        let r = mul(f64::MAX, 2.0, RoundKind::TowardZero);
        assert_eq!(r.value, f64::MAX);
        assert!(r.status.contains(FpStatus::OVERFLOW | FpStatus::INEXACT));
        assert_eq!(mul(f64::MAX, 2.0, RoundKind::Nearest).value, f64::INFINITY);
        assert_eq!(mul(-f64::MAX, 2.0, RoundKind::Up).value, -f64::MAX);
    }

    #[test]
    fn test_div_and_sqrt_inexact() {
        assert!(div(1.0, 3.0, RoundKind::Nearest).status.contains(FpStatus::INEXACT));
        assert!(div(1.0, 4.0, RoundKind::Nearest).status.is_empty());
        let down = div(1.0, 3.0, RoundKind::Down).value;
        let up = div(1.0, 3.0, RoundKind::Up).value;
        assert!(down < up);
        assert!(sqrt(4.0, RoundKind::Nearest).status.is_empty());
        assert!(sqrt(2.0, RoundKind::Nearest).status.contains(FpStatus::INEXACT));
    }

    #[test]
    fn test_single_conversions_keep_snan() {
        let snan = 0x7F80_0001u32;
        let wide = single_to_double(snan);
        assert!(is_snan(wide));
        assert_eq!(double_to_single(wide), snan);

        assert_eq!(single_to_double(0x3F80_0000), 1.0f64.to_bits());
        assert_eq!(single_to_double(0x8000_0000), (-0.0f64).to_bits());
        assert_eq!(double_to_single(1.5f64.to_bits()), 1.5f32.to_bits());
        let denormal = f32::from_bits(0x0000_0010) as f64;
        assert_eq!(double_to_single(denormal.to_bits()), 0x0000_0010);
    }

    #[test]
    fn test_to_int_saturation() {
        assert_eq!(to_int(f64::NAN, 32, RoundKind::Nearest).0, i32::MIN as i64);
        assert_eq!(to_int(3e10, 32, RoundKind::Nearest), (i32::MAX as i64, FpStatus::INVALID));
        assert_eq!(to_int(-2.5, 32, RoundKind::Nearest).0, -2);
        assert_eq!(to_int(-2.5, 32, RoundKind::TowardZero).0, -2);
        assert_eq!(to_int(-2.5, 32, RoundKind::Down).0, -3);
        assert_eq!(to_int(1e19, 64, RoundKind::Nearest).0, i64::MAX);
    }

    #[test]
    fn test_fprf_classes() {
        assert_eq!(fprf(f64::NAN.to_bits()), class::QNAN);
        assert_eq!(fprf((-0.0f64).to_bits()), class::NEG_ZERO);
        assert_eq!(fprf(1.0f64.to_bits()), class::POS_NORMAL);
        assert_eq!(fprf(f64::NEG_INFINITY.to_bits()), class::NEG_INF);
        assert_eq!(fprf(1), class::POS_DENORMAL);
        assert_eq!(fprf_single(1e-40f64.to_bits()), class::POS_DENORMAL);
    }

    #[test]
    fn test_vector_lane_nan_select() {
        let qnan_b = 0x7FC0_0002;
        let snan_a = 0xFF80_0001;
        assert_eq!(lane::arith(&[snan_a, qnan_b], || 0.0), 0xFFC0_0001);
        assert_eq!(lane::arith(&[0, qnan_b], || 0.0), qnan_b);
        let inf = f32::INFINITY.to_bits();
        assert_eq!(
            lane::arith(&[inf, inf], || f32::INFINITY - f32::INFINITY),
            DEFAULT_QNAN_SINGLE
        );
    }

    trait NextUp {
        fn next_up_manual(self) -> Self;
    }

    impl NextUp for f64 {
        fn next_up_manual(self) -> Self {
            Ulp::next_up(self)
        }
    }
}
