//! Floating-point unit tests: results, NaN handling and FPSCR updates

mod common;

use common::*;
use xe_ppu::state::fpscr::{self, class};
use xe_ppu::state::{cr, ex, msr};
use xe_ppu::ExitReason;

const DEFAULT_QNAN: u64 = 0x7FF8_0000_0000_0000;

fn fadd(frt: u32, fra: u32, frb: u32, rc: bool) -> u32 {
    a_form(63, frt, fra, frb, 0, 21, rc)
}

fn fadds(frt: u32, fra: u32, frb: u32) -> u32 {
    a_form(59, frt, fra, frb, 0, 21, false)
}

fn fdiv(frt: u32, fra: u32, frb: u32) -> u32 {
    a_form(63, frt, fra, frb, 0, 18, false)
}

fn fnmadd(frt: u32, fra: u32, frc: u32, frb: u32) -> u32 {
    a_form(63, frt, fra, frb, frc, 31, false)
}

fn fsel(frt: u32, fra: u32, frc: u32, frb: u32) -> u32 {
    a_form(63, frt, fra, frb, frc, 23, false)
}

fn fcmp(crfd: u32, fra: u32, frb: u32, ordered: bool) -> u32 {
    x_form(63, crfd << 2, fra, frb, if ordered { 32 } else { 0 }, false)
}

fn fprf(h: &Harness) -> u64 {
    (h.state.fpscr & fpscr::FPRF) >> fpscr::FPRF_SHIFT
}

fn run_with(values: &[(usize, f64)], code: &[u32]) -> Harness {
    let mut h = Harness::new();
    for (index, value) in values {
        h.state.fpr[*index] = value.to_bits();
    }
    h.run(code);
    h
}

#[test]
fn test_fadd_normal_result() {
    let h = run_with(&[(2, 1.5), (3, 2.25)], &[fadd(1, 2, 3, false)]);
    assert_eq!(f64::from_bits(h.state.fpr[1]), 3.75);
    assert_eq!(fprf(&h), class::POS_NORMAL);
    assert_eq!(h.state.fpscr & fpscr::FX, 0);
}

#[test]
fn test_fadd_infinity_minus_infinity() {
    let h = run_with(
        &[(2, f64::INFINITY), (3, f64::NEG_INFINITY)],
        &[fadd(1, 2, 3, true)],
    );
    assert_eq!(h.state.fpr[1], DEFAULT_QNAN);
    let expected = fpscr::FX | fpscr::VX | fpscr::VXISI;
    assert_eq!(h.state.fpscr & expected, expected);
    assert_eq!(fprf(&h), class::QNAN);
    // CR1 mirrors FX, FEX, VX, OX
    assert_eq!(h.state.cr_field(1), cr::LT | cr::EQ);
}

#[test]
fn test_fadd_propagates_qnan_payload() {
    let mut h = Harness::new();
    h.state.fpr[2] = 1.0f64.to_bits();
    h.state.fpr[3] = 0x7FF8_0000_0000_1234;
    h.run(&[fadd(1, 2, 3, false)]);
    assert_eq!(h.state.fpr[1], 0x7FF8_0000_0000_1234);
    assert_eq!(h.state.fpscr & fpscr::VX, 0);
}

#[test]
fn test_fadd_quiets_snan() {
    let mut h = Harness::new();
    h.state.fpr[2] = 0x7FF0_0000_0000_0001;
    h.state.fpr[3] = 0x7FF8_0000_0000_0002;
    h.run(&[fadd(1, 2, 3, false)]);
    // The signaling operand comes first and wins over the quiet one
    assert_eq!(h.state.fpr[1], 0x7FF8_0000_0000_0001);
    assert_ne!(h.state.fpscr & fpscr::VXSNAN, 0);
    assert_ne!(h.state.fpscr & fpscr::FX, 0);
}

#[test]
fn test_fnmadd_nan_priority_and_sign() {
    let mut h = Harness::new();
    h.state.fpr[2] = 1.0f64.to_bits();
    h.state.fpr[3] = 0x7FF8_0000_0000_0CCC;
    h.state.fpr[4] = 0x7FF8_0000_0000_0BBB;
    // fnmadd f1, f2 (a), f3 (c), f4 (b)
    h.run(&[fnmadd(1, 2, 3, 4)]);
    // b outranks c, and a propagated NaN keeps its sign
    assert_eq!(h.state.fpr[1], 0x7FF8_0000_0000_0BBB);
}

#[test]
fn test_fnmadd_negates_result() {
    let h = run_with(&[(2, 2.0), (3, 3.0), (4, 1.0)], &[fnmadd(1, 2, 3, 4)]);
    assert_eq!(f64::from_bits(h.state.fpr[1]), -7.0);
    assert_eq!(fprf(&h), class::NEG_NORMAL);
}

#[test]
fn test_fdiv_by_zero() {
    let h = run_with(&[(2, -3.0), (3, 0.0)], &[fdiv(1, 2, 3)]);
    assert_eq!(f64::from_bits(h.state.fpr[1]), f64::NEG_INFINITY);
    assert_ne!(h.state.fpscr & fpscr::ZX, 0);
    assert_ne!(h.state.fpscr & fpscr::FX, 0);
    assert_eq!(fprf(&h), class::NEG_INF);
}

#[test]
fn test_enabled_zero_divide_sets_fex() {
    let mut h = Harness::new();
    h.state.fpscr = fpscr::ZE;
    h.state.fpr[2] = 1.0f64.to_bits();
    h.state.fpr[3] = 0.0f64.to_bits();
    // fdiv. f1, f2, f3
    h.run(&[a_form(63, 1, 2, 3, 0, 18, true)]);
    let expected = fpscr::FX | fpscr::FEX | fpscr::ZX;
    assert_eq!(h.state.fpscr & expected, expected);
    assert_eq!(h.state.fpscr & fpscr::VX, 0);
    assert_eq!(h.state.cr_field(1), cr::LT | cr::GT);
}

#[test]
fn test_disabled_exception_leaves_fex_clear() {
    let h = run_with(&[(2, 1.0), (3, 0.0)], &[fdiv(1, 2, 3)]);
    assert_ne!(h.state.fpscr & fpscr::ZX, 0);
    assert_eq!(h.state.fpscr & fpscr::FEX, 0);
}

#[test]
fn test_fdiv_zero_by_zero() {
    let h = run_with(&[(2, 0.0), (3, 0.0)], &[fdiv(1, 2, 3)]);
    assert_eq!(h.state.fpr[1], DEFAULT_QNAN);
    assert_ne!(h.state.fpscr & fpscr::VXZDZ, 0);
    assert_eq!(h.state.fpscr & fpscr::ZX, 0);
}

#[test]
fn test_fadds_rounds_to_single() {
    let h = run_with(&[(2, 1.0), (3, 2f64.powi(-30))], &[fadds(1, 2, 3)]);
    assert_eq!(f64::from_bits(h.state.fpr[1]), 1.0);
    let expected = fpscr::XX | fpscr::FI | fpscr::FX;
    assert_eq!(h.state.fpscr & expected, expected);
}

#[test]
fn test_status_bits_reset_per_instruction() {
    let mut h = Harness::new();
    h.state.fpscr = fpscr::FI | fpscr::FR | fpscr::XX;
    h.state.fpr[2] = 1.0f64.to_bits();
    h.state.fpr[3] = 2.0f64.to_bits();
    h.run(&[fadd(1, 2, 3, false)]);
    assert_eq!(h.state.fpscr & (fpscr::FI | fpscr::FR), 0);
    // XX is sticky
    assert_ne!(h.state.fpscr & fpscr::XX, 0);
}

#[test]
fn test_fsel_choices() {
    let cases = [
        (-0.0, 10.0),
        (0.0, 10.0),
        (1.0, 10.0),
        (-1.0, 20.0),
        (f64::NAN, 10.0),
    ];
    for (a, expected) in cases {
        // fsel f1, f2, f3 (c = 10), f4 (b = 20)
        let h = run_with(&[(2, a), (3, 10.0), (4, 20.0)], &[fsel(1, 2, 3, 4)]);
        assert_eq!(f64::from_bits(h.state.fpr[1]), expected, "a = {}", a);
    }
}

#[test]
fn test_fcmpu_sets_cr_and_fpcc() {
    let h = run_with(&[(2, 1.0), (3, 2.0)], &[fcmp(3, 2, 3, false)]);
    assert_eq!(h.state.cr_field(3), cr::LT);
    assert_eq!((h.state.fpscr & fpscr::FPCC) >> fpscr::FPRF_SHIFT, 8);
}

#[test]
fn test_fcmpo_with_qnan() {
    let h = run_with(&[(2, f64::NAN), (3, 2.0)], &[fcmp(0, 2, 3, true)]);
    // Unordered
    assert_eq!(h.state.cr_field(0), 1);
    assert_ne!(h.state.fpscr & fpscr::VXVC, 0);
    assert_eq!(h.state.fpscr & fpscr::VXSNAN, 0);

    let h = run_with(&[(2, f64::NAN), (3, 2.0)], &[fcmp(0, 2, 3, false)]);
    assert_eq!(h.state.fpscr & fpscr::VXVC, 0);
}

#[test]
fn test_convert_to_word() {
    // fctiwz f1, f2
    let h = run_with(&[(2, 3.7)], &[x_form(63, 1, 0, 2, 15, false)]);
    assert_eq!(h.state.fpr[1] as u32, 3);
    assert_ne!(h.state.fpscr & fpscr::XX, 0);

    let h = run_with(&[(2, -2.0)], &[x_form(63, 1, 0, 2, 15, false)]);
    assert_eq!(h.state.fpr[1] as u32, 0xFFFF_FFFE);

    let h = run_with(&[(2, f64::NAN)], &[x_form(63, 1, 0, 2, 15, false)]);
    assert_eq!(h.state.fpr[1] as u32, 0x8000_0000);
    assert_ne!(h.state.fpscr & fpscr::VXCVI, 0);
}

#[test]
fn test_convert_from_doubleword() {
    let mut h = Harness::new();
    h.state.fpr[2] = (-42i64) as u64;
    h.run(&[x_form(63, 1, 0, 2, 846, false)]); // fcfid
    assert_eq!(f64::from_bits(h.state.fpr[1]), -42.0);
}

#[test]
fn test_sign_operations() {
    let h = run_with(
        &[(2, 1.5)],
        &[
            x_form(63, 3, 0, 2, 40, false),  // fneg
            x_form(63, 4, 0, 3, 264, false), // fabs
            x_form(63, 5, 0, 2, 136, false), // fnabs
        ],
    );
    assert_eq!(f64::from_bits(h.state.fpr[3]), -1.5);
    assert_eq!(f64::from_bits(h.state.fpr[4]), 1.5);
    assert_eq!(f64::from_bits(h.state.fpr[5]), -1.5);
}

#[test]
fn test_mtfsb1_sets_summary() {
    let mut h = Harness::new();
    // mtfsb1 3 (OX), then mffs f1
    h.run(&[x_form(63, 3, 0, 0, 38, false), x_form(63, 1, 0, 0, 583, false)]);
    assert_eq!(h.state.fpscr & (fpscr::OX | fpscr::FX), fpscr::OX | fpscr::FX);
    assert_eq!(h.state.fpr[1], h.state.fpscr);
}

#[test]
fn test_fpu_unavailable() {
    let mut h = Harness::new();
    h.state.msr &= !msr::FP;
    h.state.fpr[1] = 5;
    let exit = h.run(&[fadd(1, 2, 3, false)]);
    match exit {
        ExitReason::Exception { pending } => assert_ne!(pending & ex::FPU_UNAVAILABLE, 0),
        other => panic!("expected FPU unavailable, got {:?}", other),
    }
    assert_eq!(h.state.fpr[1], 5);
}
