//! Hardware thread state and its shared layout table
//!
//! `ThreadState` is a plain `#[repr(C)]` struct. Generated code never touches
//! it through ad hoc pointer arithmetic: every access names a [`Slot`], and
//! the slot is resolved to a byte offset through [`LAYOUT`], the same table
//! the MMU and trap collaborators use.

use std::mem::{offset_of, size_of};

use bytemuck::{Pod, Zeroable};

use crate::vmx::Vector128;

/// Machine State Register bits
pub mod msr {
    /// 64-bit computation mode
    pub const SF: u64 = 1 << 63;
    /// Vector unit available
    pub const VXU: u64 = 1 << 25;
    /// Floating-point available
    pub const FP: u64 = 1 << 13;
    /// Problem (user) state
    pub const PR: u64 = 1 << 14;
    /// External interrupts enabled
    pub const EE: u64 = 1 << 15;
    /// Instruction relocation
    pub const IR: u64 = 1 << 5;
    /// Data relocation
    pub const DR: u64 = 1 << 4;
    /// Recoverable interrupt
    pub const RI: u64 = 1 << 1;
}

/// Fixed-point exception register bits
pub mod xer {
    pub const SO: u64 = 0x8000_0000;
    pub const OV: u64 = 0x4000_0000;
    pub const CA: u64 = 0x2000_0000;
}

/// CR field bits (within one 4-bit group)
pub mod cr {
    pub const LT: u64 = 8;
    pub const GT: u64 = 4;
    pub const EQ: u64 = 2;
    pub const SO: u64 = 1;

    /// Shift of CR field `index` within the 32-bit CR
    #[inline]
    pub const fn shift(index: usize) -> u32 {
        (7 - index as u32) * 4
    }
}

/// Pending exception bits of the EX register
pub mod ex {
    pub const RESET: u64 = 0x1;
    pub const MACHINE_CHECK: u64 = 0x2;
    pub const DATA_STORAGE: u64 = 0x4;
    pub const DATA_SEGMENT: u64 = 0x8;
    pub const INSTR_STORAGE: u64 = 0x10;
    pub const INSTR_SEGMENT: u64 = 0x20;
    pub const EXTERNAL: u64 = 0x40;
    pub const ALIGNMENT: u64 = 0x80;
    pub const PROGRAM: u64 = 0x100;
    pub const FPU_UNAVAILABLE: u64 = 0x200;
    pub const DECREMENTER: u64 = 0x400;
    pub const HYPER_DECREMENTER: u64 = 0x800;
    pub const VXU_UNAVAILABLE: u64 = 0x1000;
    pub const SYSTEM_CALL: u64 = 0x2000;
    pub const TRACE: u64 = 0x4000;
    pub const PERF_MONITOR: u64 = 0x8000;

    /// Data access faults checked after every MMU call
    pub const DATA_FAULT: u64 = DATA_STORAGE | DATA_SEGMENT;
}

/// Floating-point status and control register bits
pub mod fpscr {
    pub const FX: u64 = 1 << 31;
    pub const FEX: u64 = 1 << 30;
    pub const VX: u64 = 1 << 29;
    pub const OX: u64 = 1 << 28;
    pub const UX: u64 = 1 << 27;
    pub const ZX: u64 = 1 << 26;
    pub const XX: u64 = 1 << 25;
    pub const VXSNAN: u64 = 1 << 24;
    pub const VXISI: u64 = 1 << 23;
    pub const VXIDI: u64 = 1 << 22;
    pub const VXZDZ: u64 = 1 << 21;
    pub const VXIMZ: u64 = 1 << 20;
    pub const VXVC: u64 = 1 << 19;
    pub const FR: u64 = 1 << 18;
    pub const FI: u64 = 1 << 17;
    pub const FPRF_SHIFT: u32 = 12;
    pub const FPRF: u64 = 0x1F << FPRF_SHIFT;
    /// Floating-point condition code (low four FPRF bits)
    pub const FPCC: u64 = 0xF << FPRF_SHIFT;
    pub const VXSOFT: u64 = 1 << 10;
    pub const VXSQRT: u64 = 1 << 9;
    pub const VXCVI: u64 = 1 << 8;
    pub const VE: u64 = 1 << 7;
    pub const OE: u64 = 1 << 6;
    pub const UE: u64 = 1 << 5;
    pub const ZE: u64 = 1 << 4;
    pub const XE: u64 = 1 << 3;
    pub const RN: u64 = 0x3;

    /// Distance from an exception bit (VX, OX, UX, ZX, XX) to its enable bit
    pub const ENABLE_SHIFT: u32 = 22;
    pub const ENABLES: u64 = VE | OE | UE | ZE | XE;

    /// All invalid-operation sub-exception bits
    pub const VX_ALL: u64 =
        VXSNAN | VXISI | VXIDI | VXZDZ | VXIMZ | VXVC | VXSOFT | VXSQRT | VXCVI;

    /// Bits cleared at the start of every arithmetic instruction
    pub const STICKY_RESET: u64 = FX | VX | VX_ALL;

    /// FPRF result classes
    pub mod class {
        pub const QNAN: u64 = 0x11;
        pub const NEG_INF: u64 = 0x09;
        pub const NEG_NORMAL: u64 = 0x08;
        pub const NEG_DENORMAL: u64 = 0x18;
        pub const NEG_ZERO: u64 = 0x12;
        pub const POS_ZERO: u64 = 0x02;
        pub const POS_DENORMAL: u64 = 0x14;
        pub const POS_NORMAL: u64 = 0x04;
        pub const POS_INF: u64 = 0x05;
    }
}

/// Vector status and control register bits
pub mod vscr {
    pub const SAT: u64 = 0x1;
    pub const NJ: u64 = 0x1_0000;
}

/// Architectural state of one hardware thread
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct ThreadState {
    pub gpr: [u64; 32],
    /// FPRs as raw IEEE-754 double bit patterns
    pub fpr: [u64; 32],
    pub vr: [Vector128; 32],
    pub cr: u64,
    pub xer: u64,
    pub lr: u64,
    pub ctr: u64,
    pub msr: u64,
    pub fpscr: u64,
    pub vscr: u64,
    pub srr0: u64,
    pub srr1: u64,
    pub dar: u64,
    pub dsisr: u64,
    pub dec: u64,
    pub tb: u64,
    pub cfar: u64,
    /// Address of the instruction being executed
    pub cia: u64,
    /// Address of the next instruction
    pub nia: u64,
    /// Pending exception bits
    pub ex: u64,
    pub thread_id: u64,
    pub reserve_valid: u64,
    /// Guest effective address of the reservation
    pub reserve_addr: u64,
    /// Host address returned by the MMU translate call
    pub reserve_host: u64,
    /// Raw (big-endian) value observed by the reserving load
    pub reserve_value: u64,
}

impl Default for ThreadState {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Architectural state locations addressable by generated code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Gpr(u8),
    Fpr(u8),
    Vr(u8),
    Cr,
    Xer,
    Lr,
    Ctr,
    Msr,
    Fpscr,
    Vscr,
    Srr0,
    Srr1,
    Dar,
    Dsisr,
    Dec,
    Tb,
    Cfar,
    Cia,
    Nia,
    Ex,
    ThreadId,
    ReserveValid,
    ReserveAddr,
    ReserveHost,
    ReserveValue,
}

impl Slot {
    pub fn gpr(index: usize) -> Self {
        Self::Gpr(index as u8 & 0x1F)
    }

    pub fn fpr(index: usize) -> Self {
        Self::Fpr(index as u8 & 0x1F)
    }

    pub fn vr(index: usize) -> Self {
        Self::Vr(index as u8 & 0x1F)
    }

    /// Table name and element index
    fn key(self) -> (&'static str, usize) {
        match self {
            Self::Gpr(i) => ("gpr", i as usize),
            Self::Fpr(i) => ("fpr", i as usize),
            Self::Vr(i) => ("vr", i as usize),
            Self::Cr => ("cr", 0),
            Self::Xer => ("xer", 0),
            Self::Lr => ("lr", 0),
            Self::Ctr => ("ctr", 0),
            Self::Msr => ("msr", 0),
            Self::Fpscr => ("fpscr", 0),
            Self::Vscr => ("vscr", 0),
            Self::Srr0 => ("srr0", 0),
            Self::Srr1 => ("srr1", 0),
            Self::Dar => ("dar", 0),
            Self::Dsisr => ("dsisr", 0),
            Self::Dec => ("dec", 0),
            Self::Tb => ("tb", 0),
            Self::Cfar => ("cfar", 0),
            Self::Cia => ("cia", 0),
            Self::Nia => ("nia", 0),
            Self::Ex => ("ex", 0),
            Self::ThreadId => ("thread_id", 0),
            Self::ReserveValid => ("reserve_valid", 0),
            Self::ReserveAddr => ("reserve_addr", 0),
            Self::ReserveHost => ("reserve_host", 0),
            Self::ReserveValue => ("reserve_value", 0),
        }
    }

    /// Whether the slot holds a 128-bit vector
    pub fn is_vector(self) -> bool {
        matches!(self, Self::Vr(_))
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gpr(i) => write!(f, "r{}", i),
            Self::Fpr(i) => write!(f, "f{}", i),
            Self::Vr(i) => write!(f, "v{}", i),
            other => f.write_str(other.key().0),
        }
    }
}

/// One named field of the state layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDesc {
    pub name: &'static str,
    /// Byte offset of element 0
    pub offset: usize,
    /// Size of one element in bytes
    pub size: usize,
    /// Number of elements
    pub count: usize,
}

/// Versioned layout description of `ThreadState`
#[derive(Debug)]
pub struct StateLayout {
    pub version: u32,
    pub size: usize,
    pub fields: &'static [FieldDesc],
}

macro_rules! array {
    ($name:ident, $size:expr, $count:expr) => {
        FieldDesc {
            name: stringify!($name),
            offset: offset_of!(ThreadState, $name),
            size: $size,
            count: $count,
        }
    };
}

macro_rules! scalar {
    ($name:ident) => {
        FieldDesc {
            name: stringify!($name),
            offset: offset_of!(ThreadState, $name),
            size: 8,
            count: 1,
        }
    };
}

const FIELDS: &[FieldDesc] = &[
    array!(gpr, 8, 32),
    array!(fpr, 8, 32),
    array!(vr, size_of::<Vector128>(), 32),
    scalar!(cr),
    scalar!(xer),
    scalar!(lr),
    scalar!(ctr),
    scalar!(msr),
    scalar!(fpscr),
    scalar!(vscr),
    scalar!(srr0),
    scalar!(srr1),
    scalar!(dar),
    scalar!(dsisr),
    scalar!(dec),
    scalar!(tb),
    scalar!(cfar),
    scalar!(cia),
    scalar!(nia),
    scalar!(ex),
    scalar!(thread_id),
    scalar!(reserve_valid),
    scalar!(reserve_addr),
    scalar!(reserve_host),
    scalar!(reserve_value),
];

/// The layout shared by emitted code, the executor and the MMU glue
pub static LAYOUT: StateLayout = StateLayout {
    version: 1,
    size: size_of::<ThreadState>(),
    fields: FIELDS,
};

impl StateLayout {
    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&FieldDesc> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Byte offset and size of a slot
    pub fn locate(&self, slot: Slot) -> (usize, usize) {
        let (name, index) = slot.key();
        // Every slot name has a table entry; see `test_every_slot_resolves`.
        let desc = self.field(name).unwrap_or(&FIELDS[0]);
        (desc.offset + index * desc.size, desc.size)
    }
}

impl ThreadState {
    /// Create a thread in 64-bit mode with FP and VMX available
    pub fn new(thread_id: u64) -> Self {
        Self {
            thread_id,
            msr: msr::SF | msr::FP | msr::VXU,
            ..Self::zeroed()
        }
    }

    /// Read a slot through the layout table
    pub fn load(&self, slot: Slot) -> u128 {
        let (offset, size) = LAYOUT.locate(slot);
        let bytes = &bytemuck::bytes_of(self)[offset..offset + size];
        if size == 16 {
            bytemuck::pod_read_unaligned::<Vector128>(bytes).to_u128()
        } else {
            bytemuck::pod_read_unaligned::<u64>(bytes) as u128
        }
    }

    /// Write a slot through the layout table
    pub fn store(&mut self, slot: Slot, value: u128) {
        let (offset, size) = LAYOUT.locate(slot);
        let bytes = &mut bytemuck::bytes_of_mut(self)[offset..offset + size];
        if size == 16 {
            bytes.copy_from_slice(bytemuck::bytes_of(&Vector128::from_u128(value)));
        } else {
            bytes.copy_from_slice(&(value as u64).to_ne_bytes());
        }
    }

    #[inline]
    pub fn gpr(&self, index: usize) -> u64 {
        self.gpr[index]
    }

    #[inline]
    pub fn set_gpr(&mut self, index: usize, value: u64) {
        self.gpr[index] = value;
    }

    #[inline]
    pub fn fpr(&self, index: usize) -> f64 {
        f64::from_bits(self.fpr[index])
    }

    #[inline]
    pub fn set_fpr(&mut self, index: usize, value: f64) {
        self.fpr[index] = value.to_bits();
    }

    /// Get CR field value (0-7)
    pub fn cr_field(&self, index: usize) -> u64 {
        (self.cr >> cr::shift(index)) & 0xF
    }

    /// Set CR field value (0-7)
    pub fn set_cr_field(&mut self, index: usize, value: u64) {
        let shift = cr::shift(index);
        self.cr = (self.cr & !(0xF << shift)) | ((value & 0xF) << shift);
    }

    pub fn xer_ca(&self) -> bool {
        self.xer & xer::CA != 0
    }

    pub fn xer_ov(&self) -> bool {
        self.xer & xer::OV != 0
    }

    pub fn xer_so(&self) -> bool {
        self.xer & xer::SO != 0
    }

    pub fn set_xer_so(&mut self, value: bool) {
        if value {
            self.xer |= xer::SO;
        } else {
            self.xer &= !xer::SO;
        }
    }

    /// Whether the thread runs in 64-bit mode
    pub fn is_64bit(&self) -> bool {
        self.msr & msr::SF != 0
    }

    pub fn set_64bit(&mut self, enabled: bool) {
        if enabled {
            self.msr |= msr::SF;
        } else {
            self.msr &= !msr::SF;
        }
    }

    /// Drop any lwarx/ldarx reservation
    pub fn clear_reservation(&mut self) {
        self.reserve_valid = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_matches_struct() {
        assert_eq!(LAYOUT.size, size_of::<ThreadState>());
        assert_eq!(LAYOUT.field("gpr").unwrap().offset, 0);
        assert_eq!(LAYOUT.field("fpr").unwrap().offset, 256);
        assert_eq!(LAYOUT.field("vr").unwrap().size, 16);
        assert_eq!(LAYOUT.field("cr").unwrap().offset, offset_of!(ThreadState, cr));
        assert_eq!(
            LAYOUT.field("reserve_value").unwrap().offset,
            offset_of!(ThreadState, reserve_value)
        );
    }

    #[test]
    fn test_fields_do_not_overlap() {
        let mut spans: Vec<(usize, usize)> = LAYOUT
            .fields
            .iter()
            .map(|f| (f.offset, f.offset + f.size * f.count))
            .collect();
        spans.sort();
        for pair in spans.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "{:?} overlaps {:?}", pair[0], pair[1]);
        }
        assert!(spans.last().unwrap().1 <= LAYOUT.size);
    }

    #[test]
    fn test_every_slot_resolves() {
        let slots = [
            Slot::Gpr(31),
            Slot::Fpr(0),
            Slot::Vr(7),
            Slot::Cr,
            Slot::Xer,
            Slot::Lr,
            Slot::Ctr,
            Slot::Msr,
            Slot::Fpscr,
            Slot::Vscr,
            Slot::Srr0,
            Slot::Srr1,
            Slot::Dar,
            Slot::Dsisr,
            Slot::Dec,
            Slot::Tb,
            Slot::Cfar,
            Slot::Cia,
            Slot::Nia,
            Slot::Ex,
            Slot::ThreadId,
            Slot::ReserveValid,
            Slot::ReserveAddr,
            Slot::ReserveHost,
            Slot::ReserveValue,
        ];
        for slot in slots {
            let (name, _) = slot.key();
            assert!(LAYOUT.field(name).is_some(), "{} has no layout entry", name);
        }
    }

    #[test]
    fn test_slot_access_hits_named_fields() {
        let mut state = ThreadState::new(1);
        state.store(Slot::Gpr(5), 0x1234);
        state.store(Slot::Lr, 0x8000_0000_0000_1000);
        state.store(Slot::Vr(3), 0x0011_2233_4455_6677_8899_AABB_CCDD_EEFF);

        assert_eq!(state.gpr[5], 0x1234);
        assert_eq!(state.lr, 0x8000_0000_0000_1000);
        assert_eq!(state.vr[3].words, [0x0011_2233, 0x4455_6677, 0x8899_AABB, 0xCCDD_EEFF]);
        assert_eq!(state.load(Slot::ThreadId), 1);
        assert_eq!(state.load(Slot::Vr(3)), 0x0011_2233_4455_6677_8899_AABB_CCDD_EEFF);
    }

    #[test]
    fn test_cr_fields() {
        let mut state = ThreadState::default();
        state.set_cr_field(0, 0b1010);
        state.set_cr_field(7, 0b0101);
        assert_eq!(state.cr, 0xA000_0005);
        assert_eq!(state.cr_field(0), 0b1010);
        assert_eq!(state.cr_field(7), 0b0101);
    }

    #[test]
    fn test_new_thread_mode() {
        let state = ThreadState::new(0);
        assert!(state.is_64bit());
        assert_ne!(state.msr & msr::FP, 0);
        assert_ne!(state.msr & msr::VXU, 0);
    }
}
