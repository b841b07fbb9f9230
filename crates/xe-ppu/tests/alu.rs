//! Integer unit tests run through translation and execution

mod common;

use common::*;
use xe_ppu::state::{cr, ex, xer};
use xe_ppu::ExitReason;

fn or_rc(ra: u32, rs: u32) -> u32 {
    x_form(31, rs, ra, rs, 444, true)
}

fn cmp(crfd: u32, l: bool, ra: u32, rb: u32, logical: bool) -> u32 {
    let xo = if logical { 32 } else { 0 };
    x_form(31, (crfd << 2) | l as u32, ra, rb, xo, false)
}

#[test]
fn test_add_immediate_chain() {
    let mut h = Harness::new();
    h.run(&[li(3, 5), li(4, 7), add(5, 3, 4), addi(6, 5, -20)]);
    assert_eq!(h.state.gpr[5], 12);
    assert_eq!(h.state.gpr[6], (-8i64) as u64);
}

#[test]
fn test_addis_with_zero_base() {
    let mut h = Harness::new();
    h.state.gpr[0] = 0xDEAD;
    // ra = 0 reads as zero, not r0
    h.run(&[d_form(15, 3, 0, 0x1234)]);
    assert_eq!(h.state.gpr[3], 0x1234_0000);
}

#[test]
fn test_cr0_64bit_mode() {
    let mut h = Harness::new();
    h.state.gpr[3] = 0xFFFF_FFFF_0000_0000;
    h.run(&[or_rc(5, 3)]);
    assert_eq!(h.state.gpr[5], 0xFFFF_FFFF_0000_0000);
    assert_eq!(h.state.cr_field(0), cr::LT);
}

#[test]
fn test_cr0_32bit_mode() {
    let mut h = Harness::new().narrow();
    h.state.gpr[3] = 0xFFFF_FFFF_0000_0000;
    h.run(&[or_rc(5, 3)]);
    assert_eq!(h.state.cr_field(0), cr::EQ);

    h.state.gpr[3] = 0x0000_0000_8000_0000;
    h.run(&[or_rc(5, 3)]);
    assert_eq!(h.state.cr_field(0), cr::LT);
}

#[test]
fn test_cr0_copies_summary_overflow() {
    let mut h = Harness::new();
    h.state.xer = xer::SO;
    h.state.gpr[3] = 7;
    h.run(&[or_rc(5, 3)]);
    assert_eq!(h.state.cr_field(0), cr::GT | cr::SO);
}

#[test]
fn test_addc_and_adde_carry() {
    let mut h = Harness::new();
    h.state.gpr[3] = u64::MAX;
    h.state.gpr[4] = 1;
    h.run(&[
        xo_form(5, 3, 4, false, 10, false),  // addc r5, r3, r4
        xo_form(6, 7, 8, false, 138, false), // adde r6, r7, r8
    ]);
    assert_eq!(h.state.gpr[5], 0);
    assert_eq!(h.state.gpr[6], 1);
    assert!(!h.state.xer_ca());
}

#[test]
fn test_addc_carry_in_32bit_mode() {
    let mut h = Harness::new().narrow();
    h.state.gpr[3] = 0xFFFF_FFFF;
    h.state.gpr[4] = 1;
    h.run(&[xo_form(5, 3, 4, false, 10, false)]);
    assert!(h.state.xer_ca());
    // The register keeps the full 64-bit sum
    assert_eq!(h.state.gpr[5], 0x1_0000_0000);
}

#[test]
fn test_subfic_carry() {
    let mut h = Harness::new();
    h.state.gpr[3] = 5;
    h.run(&[d_form(8, 4, 3, 5)]);
    assert_eq!(h.state.gpr[4], 0);
    assert!(h.state.xer_ca());

    h.state.gpr[3] = 6;
    h.run(&[d_form(8, 4, 3, 5)]);
    assert_eq!(h.state.gpr[4], u64::MAX);
    assert!(!h.state.xer_ca());
}

#[test]
fn test_addo_sets_sticky_overflow() {
    let mut h = Harness::new();
    h.state.gpr[3] = i64::MAX as u64;
    h.state.gpr[4] = 1;
    h.run(&[xo_form(5, 3, 4, true, 266, false)]);
    assert_eq!(h.state.gpr[5], 1 << 63);
    assert!(h.state.xer_ov());
    assert!(h.state.xer_so());

    h.state.gpr[3] = 1;
    h.run(&[xo_form(5, 3, 4, true, 266, false)]);
    assert!(!h.state.xer_ov());
    assert!(h.state.xer_so());
}

#[test]
fn test_divw_overflow_and_zero() {
    let mut h = Harness::new();
    h.state.gpr[3] = 0x8000_0000;
    h.state.gpr[4] = u64::MAX;
    h.state.gpr[5] = 0x55;
    h.run(&[xo_form(5, 3, 4, true, 491, false)]);
    assert_eq!(h.state.gpr[5], 0);
    assert!(h.state.xer_ov());

    h.state.xer = 0;
    h.state.gpr[4] = 0;
    h.run(&[xo_form(5, 3, 4, true, 491, false)]);
    assert_eq!(h.state.gpr[5], 0);
    assert!(h.state.xer_ov());
}

#[test]
fn test_divw_sign_extends_quotient() {
    let mut h = Harness::new();
    h.state.gpr[3] = 7;
    h.state.gpr[4] = (-2i64) as u64;
    h.run(&[xo_form(5, 3, 4, false, 491, false)]);
    assert_eq!(h.state.gpr[5], (-3i64) as u64);
}

#[test]
fn test_divwu_zero_extends_quotient() {
    let mut h = Harness::new();
    h.state.gpr[3] = 0xFFFF_FFFF;
    h.state.gpr[4] = 2;
    h.run(&[xo_form(5, 3, 4, false, 459, false)]);
    assert_eq!(h.state.gpr[5], 0x7FFF_FFFF);
}

#[test]
fn test_divd_and_divdu() {
    let mut h = Harness::new();
    h.state.gpr[3] = (-100i64) as u64;
    h.state.gpr[4] = 7;
    h.run(&[
        xo_form(5, 3, 4, false, 489, false), // divd
        xo_form(6, 3, 4, false, 457, false), // divdu
    ]);
    assert_eq!(h.state.gpr[5], (-14i64) as u64);
    assert_eq!(h.state.gpr[6], ((-100i64) as u64) / 7);

    h.state.gpr[3] = 1 << 63;
    h.state.gpr[4] = u64::MAX;
    h.run(&[xo_form(5, 3, 4, true, 489, false)]);
    assert_eq!(h.state.gpr[5], 0);
    assert!(h.state.xer_ov());
}

#[test]
fn test_mullw_and_mulhwu() {
    let mut h = Harness::new();
    h.state.gpr[3] = 0xFFFF_FFFF;
    h.state.gpr[4] = 0xFFFF_FFFF;
    h.run(&[
        xo_form(5, 3, 4, false, 235, false), // mullw
        xo_form(6, 3, 4, false, 11, false),  // mulhwu
    ]);
    // (-1) * (-1) on the low words
    assert_eq!(h.state.gpr[5], 1);
    assert_eq!(h.state.gpr[6] & 0xFFFF_FFFF, 0xFFFF_FFFE);
}

#[test]
fn test_rlwinm_identity_and_extract() {
    let mut h = Harness::new();
    h.state.gpr[3] = 0x1234_5678_9ABC_DEF0;
    h.run(&[
        m_form(21, 3, 5, 0, 0, 31, false),
        m_form(21, 3, 6, 8, 24, 31, false),
    ]);
    assert_eq!(h.state.gpr[5], 0x9ABC_DEF0);
    assert_eq!(h.state.gpr[6], 0x9A);
}

#[test]
fn test_rlwimi_inserts_field() {
    let mut h = Harness::new();
    h.state.gpr[3] = 0xAB;
    h.state.gpr[5] = 0xFFFF_FFFF;
    // Insert the low byte of r3 into bits 16..23
    h.run(&[m_form(20, 3, 5, 8, 16, 23, false)]);
    assert_eq!(h.state.gpr[5], 0xFFFF_ABFF);
}

#[test]
fn test_srawi_carry_on_negative_loss() {
    let mut h = Harness::new();
    h.state.gpr[3] = (-5i64) as u64;
    h.run(&[x_form(31, 3, 4, 1, 824, false)]);
    assert_eq!(h.state.gpr[4], (-3i64) as u64);
    assert!(h.state.xer_ca());

    h.state.gpr[3] = (-4i64) as u64;
    h.run(&[x_form(31, 3, 4, 1, 824, false)]);
    assert_eq!(h.state.gpr[4], (-2i64) as u64);
    assert!(!h.state.xer_ca());
}

#[test]
fn test_srad_count_past_width() {
    let srad = x_form(31, 3, 4, 5, 794, false);
    let mut h = Harness::new();
    h.state.gpr[3] = 0x8000_0000_0000_0000;
    h.state.gpr[5] = 64;
    h.run(&[srad]);
    assert_eq!(h.state.gpr[4], u64::MAX);
    assert!(h.state.xer_ca());

    h.state.gpr[3] = 0x7FFF_FFFF_FFFF_FFFF;
    h.state.gpr[5] = 127;
    h.run(&[srad]);
    assert_eq!(h.state.gpr[4], 0);
    assert!(!h.state.xer_ca());
}

#[test]
fn test_sraw_count_past_width() {
    let sraw = x_form(31, 3, 4, 5, 792, false);
    let mut h = Harness::new();
    h.state.gpr[3] = 0x8000_0000;
    h.state.gpr[5] = 32;
    h.run(&[sraw]);
    assert_eq!(h.state.gpr[4], u64::MAX);
    assert!(h.state.xer_ca());

    h.state.gpr[3] = 0x1234;
    h.state.gpr[5] = 0x3F;
    h.run(&[sraw]);
    assert_eq!(h.state.gpr[4], 0);
    assert!(!h.state.xer_ca());
}

#[test]
fn test_compare_word_and_doubleword() {
    let mut h = Harness::new();
    h.state.gpr[3] = 0xFFFF_FFFF;
    h.state.gpr[4] = 1;
    h.run(&[
        cmp(7, false, 3, 4, false), // cmpw: -1 < 1
        cmp(6, true, 3, 4, false),  // cmpd: 0xFFFFFFFF > 1
        cmp(5, false, 3, 4, true),  // cmplw
    ]);
    assert_eq!(h.state.cr_field(7), cr::LT);
    assert_eq!(h.state.cr_field(6), cr::GT);
    assert_eq!(h.state.cr_field(5), cr::GT);
}

#[test]
fn test_extsb_and_cntlzw() {
    let mut h = Harness::new();
    h.state.gpr[3] = 0x80;
    h.state.gpr[4] = 0x0001_0000;
    h.run(&[
        x_form(31, 3, 5, 0, 954, false), // extsb
        x_form(31, 4, 6, 0, 26, false),  // cntlzw
    ]);
    assert_eq!(h.state.gpr[5], 0xFFFF_FFFF_FFFF_FF80);
    assert_eq!(h.state.gpr[6], 15);
}

#[test]
fn test_trap_always_raises_program() {
    let mut h = Harness::new();
    let exit = h.run(&[li(3, 1), x_form(31, 31, 0, 0, 4, false), li(4, 1)]);
    match exit {
        ExitReason::Exception { pending } => assert_ne!(pending & ex::PROGRAM, 0),
        other => panic!("expected a trap, got {:?}", other),
    }
    assert_eq!(h.state.gpr[3], 1);
    assert_eq!(h.state.gpr[4], 0);
    assert_eq!(h.state.cia, CODE_BASE + 4);
}

#[test]
fn test_trap_not_taken() {
    let mut h = Harness::new();
    h.state.gpr[3] = 5;
    // twi lt, r3, 0
    let exit = h.run(&[d_form(3, 16, 3, 0), li(4, 1)]);
    assert_eq!(exit, ExitReason::Continue { next: CODE_BASE + 8 });
    assert_eq!(h.state.gpr[4], 1);
}
