//! Load/store emitters
//!
//! Every access follows the same shape: compute the EA, call out to the MMU,
//! then test EX for a data fault before writing anything back. A faulting
//! load leaves both the destination and (for update forms) the base register
//! untouched.

use super::builder::EmitContext;
use super::helpers::{address_mask, set_cr_field};
use super::ir::{BinOp, Cond, Exception, FUnOp, Helper, Lane, Size, UnOp, Value, VecOp, Width};
use crate::instruction::Instruction;
use crate::state::{msr, Slot};

/// How a loaded value is widened into a GPR
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extend {
    Zero,
    Sign,
    /// Byte-reversed, zero-extended
    Reverse,
}

/// Where the EA comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Addr {
    /// `(ra|0) + simm16`
    Disp,
    /// `(ra|0) + (ds << 2)`
    DispDs,
    /// `(ra|0) + rb`
    Indexed,
}

fn effective_address(ctx: &mut EmitContext<'_>, instr: Instruction, addr: Addr) -> Value {
    let base = ctx.gpr_or_zero(instr.ra());
    let offset = match addr {
        Addr::Disp => ctx.b.konst(instr.simm16() as u64),
        Addr::DispDs => ctx.b.konst(instr.ds() as u64),
        Addr::Indexed => ctx.gpr(instr.rb()),
    };
    let ea = ctx.b.add(base, offset);
    let mask = address_mask(ctx);
    ctx.b.and(ea, mask)
}

fn widen(ctx: &mut EmitContext<'_>, raw: Value, size: Size, extend: Extend) -> Value {
    let op = match (size, extend) {
        (Size::U16, Extend::Sign) => UnOp::Sext16,
        (Size::U32, Extend::Sign) => UnOp::Sext32,
        (Size::U16, Extend::Reverse) => UnOp::Swap16,
        (Size::U32, Extend::Reverse) => UnOp::Swap32,
        (Size::U64, Extend::Reverse) => UnOp::Swap64,
        _ => return raw,
    };
    ctx.b.un(op, raw)
}

fn load(ctx: &mut EmitContext<'_>, instr: Instruction, addr: Addr, size: Size, extend: Extend, update: bool) {
    let ea = effective_address(ctx, instr, addr);
    let raw = ctx.b.call(Helper::Read(size), vec![ea]);
    ctx.abort_on_data_fault();
    let value = widen(ctx, raw, size, extend);
    ctx.set_gpr(instr.rd(), value);
    if update {
        ctx.set_gpr(instr.ra(), ea);
    }
}

fn store(ctx: &mut EmitContext<'_>, instr: Instruction, addr: Addr, size: Size, reverse: bool, update: bool) {
    let ea = effective_address(ctx, instr, addr);
    let value = ctx.gpr(instr.rs());
    let value = if reverse {
        widen(ctx, value, size, Extend::Reverse)
    } else {
        value
    };
    ctx.b.call_void(Helper::Write(size), vec![ea, value]);
    ctx.abort_on_data_fault();
    if update {
        ctx.set_gpr(instr.ra(), ea);
    }
}

macro_rules! loads {
    ($($name:ident => $addr:ident, $size:ident, $extend:ident, $update:expr;)*) => {
        $(
            pub fn $name(ctx: &mut EmitContext<'_>, instr: Instruction) {
                load(ctx, instr, Addr::$addr, Size::$size, Extend::$extend, $update);
            }
        )*
    };
}

macro_rules! stores {
    ($($name:ident => $addr:ident, $size:ident, $reverse:expr, $update:expr;)*) => {
        $(
            pub fn $name(ctx: &mut EmitContext<'_>, instr: Instruction) {
                store(ctx, instr, Addr::$addr, Size::$size, $reverse, $update);
            }
        )*
    };
}

loads! {
    lbz => Disp, U8, Zero, false;
    lbzu => Disp, U8, Zero, true;
    lbzx => Indexed, U8, Zero, false;
    lbzux => Indexed, U8, Zero, true;
    lhz => Disp, U16, Zero, false;
    lhzu => Disp, U16, Zero, true;
    lhzx => Indexed, U16, Zero, false;
    lhzux => Indexed, U16, Zero, true;
    lha => Disp, U16, Sign, false;
    lhau => Disp, U16, Sign, true;
    lhax => Indexed, U16, Sign, false;
    lhaux => Indexed, U16, Sign, true;
    lwz => Disp, U32, Zero, false;
    lwzu => Disp, U32, Zero, true;
    lwzx => Indexed, U32, Zero, false;
    lwzux => Indexed, U32, Zero, true;
    lwa => DispDs, U32, Sign, false;
    lwax => Indexed, U32, Sign, false;
    lwaux => Indexed, U32, Sign, true;
    ld => DispDs, U64, Zero, false;
    ldu => DispDs, U64, Zero, true;
    ldx => Indexed, U64, Zero, false;
    ldux => Indexed, U64, Zero, true;
    lhbrx => Indexed, U16, Reverse, false;
    lwbrx => Indexed, U32, Reverse, false;
    ldbrx => Indexed, U64, Reverse, false;
}

stores! {
    stb => Disp, U8, false, false;
    stbu => Disp, U8, false, true;
    stbx => Indexed, U8, false, false;
    stbux => Indexed, U8, false, true;
    sth => Disp, U16, false, false;
    sthu => Disp, U16, false, true;
    sthx => Indexed, U16, false, false;
    sthux => Indexed, U16, false, true;
    stw => Disp, U32, false, false;
    stwu => Disp, U32, false, true;
    stwx => Indexed, U32, false, false;
    stwux => Indexed, U32, false, true;
    std => DispDs, U64, false, false;
    stdu => DispDs, U64, false, true;
    stdx => Indexed, U64, false, false;
    stdux => Indexed, U64, false, true;
    sthbrx => Indexed, U16, true, false;
    stwbrx => Indexed, U32, true, false;
    stdbrx => Indexed, U64, true, false;
}

// Floating-point loads and stores

fn load_float(ctx: &mut EmitContext<'_>, instr: Instruction, addr: Addr, single: bool, update: bool) {
    ctx.require_msr(msr::FP, Exception::FpUnavailable);
    let ea = effective_address(ctx, instr, addr);
    let size = if single { Size::U32 } else { Size::U64 };
    let raw = ctx.b.call(Helper::Read(size), vec![ea]);
    ctx.abort_on_data_fault();
    let value = if single {
        ctx.b.fun_exact(FUnOp::SingleToDouble, raw)
    } else {
        raw
    };
    ctx.set_fpr(instr.rd(), value);
    if update {
        ctx.set_gpr(instr.ra(), ea);
    }
}

fn store_float(ctx: &mut EmitContext<'_>, instr: Instruction, addr: Addr, single: bool, update: bool) {
    ctx.require_msr(msr::FP, Exception::FpUnavailable);
    let ea = effective_address(ctx, instr, addr);
    let value = ctx.fpr(instr.rs());
    let (size, value) = if single {
        (Size::U32, ctx.b.fun_exact(FUnOp::DoubleToSingle, value))
    } else {
        (Size::U64, value)
    };
    ctx.b.call_void(Helper::Write(size), vec![ea, value]);
    ctx.abort_on_data_fault();
    if update {
        ctx.set_gpr(instr.ra(), ea);
    }
}

pub fn lfs(ctx: &mut EmitContext<'_>, instr: Instruction) {
    load_float(ctx, instr, Addr::Disp, true, false);
}

pub fn lfsu(ctx: &mut EmitContext<'_>, instr: Instruction) {
    load_float(ctx, instr, Addr::Disp, true, true);
}

pub fn lfsx(ctx: &mut EmitContext<'_>, instr: Instruction) {
    load_float(ctx, instr, Addr::Indexed, true, false);
}

pub fn lfd(ctx: &mut EmitContext<'_>, instr: Instruction) {
    load_float(ctx, instr, Addr::Disp, false, false);
}

pub fn lfdu(ctx: &mut EmitContext<'_>, instr: Instruction) {
    load_float(ctx, instr, Addr::Disp, false, true);
}

pub fn lfdx(ctx: &mut EmitContext<'_>, instr: Instruction) {
    load_float(ctx, instr, Addr::Indexed, false, false);
}

pub fn stfs(ctx: &mut EmitContext<'_>, instr: Instruction) {
    store_float(ctx, instr, Addr::Disp, true, false);
}

pub fn stfsu(ctx: &mut EmitContext<'_>, instr: Instruction) {
    store_float(ctx, instr, Addr::Disp, true, true);
}

pub fn stfsx(ctx: &mut EmitContext<'_>, instr: Instruction) {
    store_float(ctx, instr, Addr::Indexed, true, false);
}

pub fn stfd(ctx: &mut EmitContext<'_>, instr: Instruction) {
    store_float(ctx, instr, Addr::Disp, false, false);
}

pub fn stfdu(ctx: &mut EmitContext<'_>, instr: Instruction) {
    store_float(ctx, instr, Addr::Disp, false, true);
}

pub fn stfdx(ctx: &mut EmitContext<'_>, instr: Instruction) {
    store_float(ctx, instr, Addr::Indexed, false, false);
}

/// Store the low word of an FPR without conversion
pub fn stfiwx(ctx: &mut EmitContext<'_>, instr: Instruction) {
    ctx.require_msr(msr::FP, Exception::FpUnavailable);
    let ea = effective_address(ctx, instr, Addr::Indexed);
    let value = ctx.fpr(instr.rs());
    ctx.b.call_void(Helper::Write(Size::U32), vec![ea, value]);
}

// Reservations

fn load_reserve(ctx: &mut EmitContext<'_>, instr: Instruction, size: Size) {
    let ea = effective_address(ctx, instr, Addr::Indexed);
    let ea = if size == Size::U64 {
        ctx.b.bin_imm(BinOp::AndNot, ea, 7)
    } else {
        ea
    };

    let host = ctx.b.call(Helper::Translate(size), vec![ea]);
    ctx.abort_if_zero(host);
    let raw = ctx.b.call(Helper::HostLoad(size), vec![host, ea]);
    ctx.abort_on_data_fault();

    let one = ctx.b.konst(1);
    ctx.b.store(Slot::ReserveValid, one);
    ctx.b.store(Slot::ReserveAddr, ea);
    ctx.b.store(Slot::ReserveHost, host);
    ctx.b.store(Slot::ReserveValue, raw);

    let swap = if size == Size::U64 { UnOp::FromBe64 } else { UnOp::FromBe32 };
    let value = ctx.b.un(swap, raw);
    ctx.set_gpr(instr.rd(), value);
}

/// Store conditional: one host CAS against the reserved host address
///
/// The reservation is dropped whatever the outcome. A store to an address
/// other than the reserved one fails without touching memory.
fn store_conditional(ctx: &mut EmitContext<'_>, instr: Instruction, size: Size) {
    let ea = effective_address(ctx, instr, Addr::Indexed);
    let ea = if size == Size::U64 {
        ctx.b.bin_imm(BinOp::AndNot, ea, 7)
    } else {
        ea
    };
    let swap = if size == Size::U64 { UnOp::ToBe64 } else { UnOp::ToBe32 };
    let value = ctx.gpr(instr.rs());
    let new = ctx.b.un(swap, value);

    let failed = ctx.b.new_label();
    let done = ctx.b.new_label();
    let stored = ctx.b.new_value();

    let valid = ctx.b.load(Slot::ReserveValid);
    ctx.b.branch_if_zero(valid, failed);
    let reserved = ctx.b.load(Slot::ReserveAddr);
    let same = ctx.b.cmp(Cond::Eq, Width::W64, ea, reserved);
    ctx.b.branch_if_zero(same, failed);

    let host = ctx.b.load(Slot::ReserveHost);
    let expected = ctx.b.load(Slot::ReserveValue);
    let swapped = ctx.b.call(Helper::HostCas(size), vec![host, expected, new]);
    ctx.b.mov(stored, swapped);
    ctx.b.jump(done);

    ctx.b.bind(failed);
    let zero = ctx.b.konst(0);
    ctx.b.mov(stored, zero);

    ctx.b.bind(done);
    let cleared = ctx.b.konst(0);
    ctx.b.store(Slot::ReserveValid, cleared);
    ctx.abort_on_data_fault();

    let eq = ctx.b.bin_imm(BinOp::Shl, stored, 1);
    let xer = ctx.b.load(Slot::Xer);
    let so = ctx.b.bin_imm(BinOp::Shr, xer, 31);
    let so = ctx.b.bin_imm(BinOp::And, so, 1);
    let field = ctx.b.or(eq, so);
    set_cr_field(ctx, field, 0);
}

pub fn lwarx(ctx: &mut EmitContext<'_>, instr: Instruction) {
    load_reserve(ctx, instr, Size::U32);
}

pub fn ldarx(ctx: &mut EmitContext<'_>, instr: Instruction) {
    load_reserve(ctx, instr, Size::U64);
}

pub fn stwcx(ctx: &mut EmitContext<'_>, instr: Instruction) {
    store_conditional(ctx, instr, Size::U32);
}

pub fn stdcx(ctx: &mut EmitContext<'_>, instr: Instruction) {
    store_conditional(ctx, instr, Size::U64);
}

// Vector loads and stores

fn vector_address(ctx: &mut EmitContext<'_>, instr: Instruction) -> Value {
    ctx.require_msr(msr::VXU, Exception::VxUnavailable);
    effective_address(ctx, instr, Addr::Indexed)
}

/// Quadword containing `ea`, read into a fresh value; aborts on a fault
fn read_quad(ctx: &mut EmitContext<'_>, ea: Value) -> Value {
    let aligned = ctx.b.bin_imm(BinOp::AndNot, ea, 15);
    let data = ctx.b.call(Helper::Read(Size::U128), vec![aligned]);
    ctx.abort_on_data_fault();
    data
}

/// Merge `bytes` into the quadword containing `ea` where `mask` is set
fn merge_quad(ctx: &mut EmitContext<'_>, ea: Value, bytes: Value, mask: Value) {
    let old = read_quad(ctx, ea);
    let merged = ctx.b.vector(VecOp::Select, old, Some(bytes), Some(mask));
    let aligned = ctx.b.bin_imm(BinOp::AndNot, ea, 15);
    ctx.b.call_void(Helper::Write(Size::U128), vec![aligned, merged]);
}

pub fn lvx(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let ea = vector_address(ctx, instr);
    let data = read_quad(ctx, ea);
    ctx.set_vr(instr.vd(), data);
}

pub fn stvx(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let ea = vector_address(ctx, instr);
    let aligned = ctx.b.bin_imm(BinOp::AndNot, ea, 15);
    let value = ctx.vr(instr.vd());
    ctx.b.call_void(Helper::Write(Size::U128), vec![aligned, value]);
}

pub fn lvsl(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let ea = vector_address(ctx, instr);
    let control = ctx.b.vector(VecOp::ShiftControlLeft, ea, None, None);
    ctx.set_vr(instr.vd(), control);
}

pub fn lvsr(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let ea = vector_address(ctx, instr);
    let control = ctx.b.vector(VecOp::ShiftControlRight, ea, None, None);
    ctx.set_vr(instr.vd(), control);
}

/// Bytes from `ea` to the end of its quadword, left justified
pub fn lvlx(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let ea = vector_address(ctx, instr);
    let data = read_quad(ctx, ea);
    let offset = ctx.b.bin_imm(BinOp::And, ea, 15);
    let value = ctx.b.vector(VecOp::ShiftLeftBytes, data, Some(offset), None);
    ctx.set_vr(instr.vd(), value);
}

/// Bytes before `ea` in its quadword, right justified; zero when aligned
pub fn lvrx(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let ea = vector_address(ctx, instr);
    let data = read_quad(ctx, ea);
    let offset = ctx.b.bin_imm(BinOp::And, ea, 15);
    let sixteen = ctx.b.konst(16);
    let shift = ctx.b.bin(BinOp::Sub, Width::W64, sixteen, offset);
    let value = ctx.b.vector(VecOp::ShiftRightBytes, data, Some(shift), None);
    ctx.set_vr(instr.vd(), value);
}

pub fn stvlx(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let ea = vector_address(ctx, instr);
    let offset = ctx.b.bin_imm(BinOp::And, ea, 15);
    let value = ctx.vr(instr.vd());
    let bytes = ctx.b.vector(VecOp::ShiftRightBytes, value, Some(offset), None);
    let ones = ctx.b.konst128(u128::MAX);
    let mask = ctx.b.vector(VecOp::ShiftRightBytes, ones, Some(offset), None);
    merge_quad(ctx, ea, bytes, mask);
}

pub fn stvrx(ctx: &mut EmitContext<'_>, instr: Instruction) {
    let ea = vector_address(ctx, instr);
    let offset = ctx.b.bin_imm(BinOp::And, ea, 15);
    let sixteen = ctx.b.konst(16);
    let shift = ctx.b.bin(BinOp::Sub, Width::W64, sixteen, offset);
    let value = ctx.vr(instr.vd());
    let bytes = ctx.b.vector(VecOp::ShiftLeftBytes, value, Some(shift), None);
    let ones = ctx.b.konst128(u128::MAX);
    let mask = ctx.b.vector(VecOp::ShiftLeftBytes, ones, Some(shift), None);
    merge_quad(ctx, ea, bytes, mask);
}

fn store_element(ctx: &mut EmitContext<'_>, instr: Instruction, lane: Lane) {
    let ea = vector_address(ctx, instr);
    let (size, align) = match lane {
        Lane::Byte => (Size::U8, 0),
        Lane::Half => (Size::U16, 1),
        Lane::Word => (Size::U32, 3),
    };
    let ea = ctx.b.bin_imm(BinOp::AndNot, ea, align);
    let value = ctx.vr(instr.vd());
    let element = ctx.b.vector(VecOp::ExtractByteOffset(lane), value, Some(ea), None);
    ctx.b.call_void(Helper::Write(size), vec![ea, element]);
}

pub fn stvebx(ctx: &mut EmitContext<'_>, instr: Instruction) {
    store_element(ctx, instr, Lane::Byte);
}

pub fn stvehx(ctx: &mut EmitContext<'_>, instr: Instruction) {
    store_element(ctx, instr, Lane::Half);
}

pub fn stvewx(ctx: &mut EmitContext<'_>, instr: Instruction) {
    store_element(ctx, instr, Lane::Word);
}
