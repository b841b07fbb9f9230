//! Vector unit tests

mod common;

use common::*;
use xe_ppu::state::{cr, ex, msr, vscr};
use xe_ppu::{ExitReason, Vector128};

fn floats(values: [f32; 4]) -> Vector128 {
    Vector128::from_f32x4(values)
}

#[test]
fn test_vaddfp_flushes_denormals() {
    let mut h = Harness::new();
    h.state.vr[2] = Vector128::from_u32x4([1.0f32.to_bits(), 0x0000_0001, 0x8000_0010, 2.0f32.to_bits()]);
    h.state.vr[3] = floats([1.0, 0.0, 0.0, 0.5]);
    h.run(&[vx_form(1, 2, 3, 10)]);
    assert_eq!(
        h.state.vr[1].as_u32x4(),
        [2.0f32.to_bits(), 0, 0, 2.5f32.to_bits()]
    );
}

#[test]
fn test_vaddfp_flushes_denormal_result() {
    let mut h = Harness::new();
    // Smallest normal minus a value just below it leaves a denormal
    h.state.vr[2] = Vector128::from_u32x4([0x0080_0001; 4]);
    h.state.vr[3] = Vector128::from_u32x4([0x8080_0000; 4]);
    h.run(&[vx_form(1, 2, 3, 10)]);
    assert_eq!(h.state.vr[1].as_u32x4(), [0; 4]);
}

#[test]
fn test_vmaxfp_selects_nan() {
    let mut h = Harness::new();
    h.state.vr[2] = Vector128::from_u32x4([0x7F80_0001, 1.0f32.to_bits(), 3.0f32.to_bits(), 4.0f32.to_bits()]);
    h.state.vr[3] = Vector128::from_u32x4([2.0f32.to_bits(), 0x7FC0_0002, (-1.0f32).to_bits(), 5.0f32.to_bits()]);
    h.run(&[vx_form(1, 2, 3, 1034)]);
    assert_eq!(
        h.state.vr[1].as_u32x4(),
        [0x7FC0_0001, 0x7FC0_0002, 3.0f32.to_bits(), 5.0f32.to_bits()]
    );
}

#[test]
fn test_vmaxfp_prefers_first_nan() {
    let mut h = Harness::new();
    h.state.vr[2] = Vector128::from_u32x4([0x7FC0_00AA; 4]);
    h.state.vr[3] = Vector128::from_u32x4([0x7FC0_00BB; 4]);
    h.run(&[vx_form(1, 2, 3, 1034)]);
    assert_eq!(h.state.vr[1].as_u32x4(), [0x7FC0_00AA; 4]);
}

#[test]
fn test_vcmpeqfp_record_summary() {
    let mut h = Harness::new();
    h.state.vr[2] = floats([1.0, 2.0, 3.0, 4.0]);
    h.state.vr[3] = floats([1.0, 2.0, 3.0, 4.0]);
    h.run(&[vc_form(1, 2, 3, 198, true)]);
    assert_eq!(h.state.vr[1].to_u128(), u128::MAX);
    assert_eq!(h.state.cr_field(6), cr::LT);

    h.state.vr[3] = floats([5.0, 6.0, 7.0, 8.0]);
    h.run(&[vc_form(1, 2, 3, 198, true)]);
    assert_eq!(h.state.vr[1].to_u128(), 0);
    assert_eq!(h.state.cr_field(6), cr::EQ);

    h.state.vr[3] = floats([1.0, 6.0, 3.0, 8.0]);
    h.run(&[vc_form(1, 2, 3, 198, true)]);
    assert_eq!(h.state.vr[1].as_u32x4(), [u32::MAX, 0, u32::MAX, 0]);
    assert_eq!(h.state.cr_field(6), 0);
}

#[test]
fn test_vcmpequw_without_record_keeps_cr() {
    let mut h = Harness::new();
    h.state.cr = 0xF0;
    h.state.vr[2] = Vector128::from_u32x4([1, 2, 3, 4]);
    h.state.vr[3] = Vector128::from_u32x4([1, 0, 3, 0]);
    h.run(&[vc_form(1, 2, 3, 134, false)]);
    assert_eq!(h.state.vr[1].as_u32x4(), [u32::MAX, 0, u32::MAX, 0]);
    assert_eq!(h.state.cr, 0xF0);
}

#[test]
fn test_splat_immediate() {
    let mut h = Harness::new();
    h.run(&[
        vx_form(1, (-1i32 as u32) & 0x1F, 0, 908), // vspltisw v1, -1
        vx_form(2, 5, 0, 844),                     // vspltish v2, 5
    ]);
    assert_eq!(h.state.vr[1].to_u128(), u128::MAX);
    assert_eq!(h.state.vr[2].as_u16x8(), [5; 8]);
}

#[test]
fn test_vperm_selects_second_source() {
    let mut h = Harness::new();
    h.state.vr[2] = Vector128::from_u32x4([0xAAAA_AAAA; 4]);
    h.state.vr[3] = Vector128::from_u32x4([0x0011_2233, 0x4455_6677, 0x8899_AABB, 0xCCDD_EEFF]);
    h.state.vr[4] = Vector128::from_u8x16(std::array::from_fn(|i| 0x10 + i as u8));
    h.run(&[va_form(1, 2, 3, 4, 43)]);
    assert_eq!(h.state.vr[1], h.state.vr[3]);
}

#[test]
fn test_vsel_bitwise() {
    let mut h = Harness::new();
    h.state.vr[2] = Vector128::from_u32x4([0; 4]);
    h.state.vr[3] = Vector128::from_u32x4([u32::MAX; 4]);
    h.state.vr[4] = Vector128::from_u32x4([0xFF00_FF00, 0, u32::MAX, 0x0F0F_0F0F]);
    h.run(&[va_form(1, 2, 3, 4, 42)]);
    assert_eq!(h.state.vr[1].as_u32x4(), [0xFF00_FF00, 0, u32::MAX, 0x0F0F_0F0F]);
}

#[test]
fn test_saturation_is_sticky_and_readable() {
    let mut h = Harness::new();
    h.state.vr[2] = Vector128::from_u16x8([1, 10, 0, 0, 0, 0, 0, 0]);
    h.state.vr[3] = Vector128::from_u16x8([2, 3, 0, 0, 0, 0, 0, 0]);
    h.run(&[
        vx_form(1, 2, 3, 1600), // vsubuhs
        vx_form(5, 0, 0, 1540), // mfvscr
    ]);
    assert_eq!(h.state.vr[1].as_u16x8(), [0, 7, 0, 0, 0, 0, 0, 0]);
    assert_eq!(h.state.vscr & vscr::SAT, vscr::SAT);
    assert_eq!(h.state.vr[5].as_u32x4(), [0, 0, 0, vscr::SAT as u32]);

    h.state.vr[6] = Vector128::from_u32x4([0, 0, 0, vscr::NJ as u32]);
    h.run(&[vx_form(0, 0, 6, 1604)]); // mtvscr
    assert_eq!(h.state.vscr, vscr::NJ);
}

#[test]
fn test_modulo_add_wraps() {
    let mut h = Harness::new();
    h.state.vr[2] = Vector128::from_u32x4([u32::MAX, 1, 2, 3]);
    h.state.vr[3] = Vector128::from_u32x4([1, 1, 1, 1]);
    h.run(&[vx_form(1, 2, 3, 128)]); // vadduwm
    assert_eq!(h.state.vr[1].as_u32x4(), [0, 2, 3, 4]);
}

#[test]
fn test_vector_unit_unavailable() {
    let mut h = Harness::new();
    h.state.msr &= !msr::VXU;
    let exit = h.run(&[vx_form(1, 2, 3, 10)]);
    match exit {
        ExitReason::Exception { pending } => assert_ne!(pending & ex::VXU_UNAVAILABLE, 0),
        other => panic!("expected VXU unavailable, got {:?}", other),
    }
}
