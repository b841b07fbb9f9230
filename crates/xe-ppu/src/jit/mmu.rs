//! MMU capability consumed by generated code
//!
//! Generated code reaches guest memory only through out-of-line calls. A
//! failing access never returns an error to the block: it records the fault
//! in the thread state (EX, DAR, DSISR) and the emitted code checks EX right
//! after the call.

use xe_core::error::MemoryError;
use xe_core::mmu_trace;
use xe_memory::constants::SEGMENT_LIMIT;
use xe_memory::GuestMemory;

use super::ir::Size;
use crate::state::{ex, ThreadState};

/// DSISR bits reported on data storage faults
pub mod dsisr {
    /// No translation for the address
    pub const NOT_FOUND: u64 = 0x4000_0000;
    /// Access not permitted by page protection
    pub const PROTECTION: u64 = 0x0800_0000;
    /// The faulting access was a store
    pub const STORE: u64 = 0x0200_0000;
}

/// Guest memory as seen by generated code
pub trait Mmu {
    /// Read `size` bytes at `ea`, returning 0 after recording a fault
    fn read(&self, state: &mut ThreadState, ea: u64, size: Size) -> u128;

    /// Write the low `size` bytes of `value` at `ea`
    fn write(&self, state: &mut ThreadState, ea: u64, size: Size, value: u128);

    /// Host address of a naturally aligned word for a reservation
    fn translate(&self, state: &mut ThreadState, ea: u64, size: Size) -> Option<u64>;

    /// Raw (guest byte order) load from a translated host address; `ea` is
    /// the guest address it was translated from and is reported on a fault
    fn host_load(&self, state: &mut ThreadState, ea: u64, host: u64, size: Size) -> u64;

    /// Raw compare-and-swap at a translated host address
    fn host_cas(&self, state: &mut ThreadState, host: u64, size: Size, expected: u64, new: u64) -> bool;

    fn read8(&self, state: &mut ThreadState, ea: u64) -> u8 {
        self.read(state, ea, Size::U8) as u8
    }

    fn read16(&self, state: &mut ThreadState, ea: u64) -> u16 {
        self.read(state, ea, Size::U16) as u16
    }

    fn read32(&self, state: &mut ThreadState, ea: u64) -> u32 {
        self.read(state, ea, Size::U32) as u32
    }

    fn read64(&self, state: &mut ThreadState, ea: u64) -> u64 {
        self.read(state, ea, Size::U64) as u64
    }

    fn read128(&self, state: &mut ThreadState, ea: u64) -> u128 {
        self.read(state, ea, Size::U128)
    }

    fn write8(&self, state: &mut ThreadState, ea: u64, value: u8) {
        self.write(state, ea, Size::U8, value as u128)
    }

    fn write16(&self, state: &mut ThreadState, ea: u64, value: u16) {
        self.write(state, ea, Size::U16, value as u128)
    }

    fn write32(&self, state: &mut ThreadState, ea: u64, value: u32) {
        self.write(state, ea, Size::U32, value as u128)
    }

    fn write64(&self, state: &mut ThreadState, ea: u64, value: u64) {
        self.write(state, ea, Size::U64, value as u128)
    }

    fn write128(&self, state: &mut ThreadState, ea: u64, value: u128) {
        self.write(state, ea, Size::U128, value)
    }
}

/// Record a data access fault in the thread state
fn raise_data_fault(state: &mut ThreadState, ea: u64, store: bool, err: MemoryError) {
    mmu_trace!("data fault at 0x{:016X} (store: {}): {}", ea, store, err);
    state.dar = ea;
    if ea >= SEGMENT_LIMIT {
        state.ex |= ex::DATA_SEGMENT;
        return;
    }
    let cause = match err {
        MemoryError::AccessViolation { .. } => dsisr::PROTECTION,
        _ => dsisr::NOT_FOUND,
    };
    state.dsisr = cause | if store { dsisr::STORE } else { 0 };
    state.ex |= ex::DATA_STORAGE;
}

impl Mmu for GuestMemory {
    fn read(&self, state: &mut ThreadState, ea: u64, size: Size) -> u128 {
        let value = match size {
            Size::U8 => GuestMemory::read::<u8>(self, ea).map(u128::from),
            Size::U16 => GuestMemory::read::<u16>(self, ea).map(u128::from),
            Size::U32 => GuestMemory::read::<u32>(self, ea).map(u128::from),
            Size::U64 => GuestMemory::read::<u64>(self, ea).map(u128::from),
            Size::U128 => GuestMemory::read::<u128>(self, ea),
        };
        value.unwrap_or_else(|err| {
            raise_data_fault(state, ea, false, err);
            0
        })
    }

    fn write(&self, state: &mut ThreadState, ea: u64, size: Size, value: u128) {
        let result = match size {
            Size::U8 => GuestMemory::write(self, ea, value as u8),
            Size::U16 => GuestMemory::write(self, ea, value as u16),
            Size::U32 => GuestMemory::write(self, ea, value as u32),
            Size::U64 => GuestMemory::write(self, ea, value as u64),
            Size::U128 => GuestMemory::write(self, ea, value),
        };
        if let Err(err) = result {
            raise_data_fault(state, ea, true, err);
        }
    }

    fn translate(&self, state: &mut ThreadState, ea: u64, size: Size) -> Option<u64> {
        match self.host_address(ea, size.bytes() as usize) {
            Ok(host) => Some(host),
            Err(MemoryError::Misaligned(_)) => {
                state.dar = ea;
                state.ex |= ex::ALIGNMENT;
                None
            }
            Err(err) => {
                raise_data_fault(state, ea, false, err);
                None
            }
        }
    }

    fn host_load(&self, state: &mut ThreadState, ea: u64, host: u64, size: Size) -> u64 {
        let value = match size {
            Size::U32 => self.host_load_u32(host).map(u64::from),
            _ => self.host_load_u64(host),
        };
        value.unwrap_or_else(|err| {
            raise_data_fault(state, ea, false, err);
            0
        })
    }

    fn host_cas(&self, state: &mut ThreadState, host: u64, size: Size, expected: u64, new: u64) -> bool {
        let swapped = match size {
            Size::U32 => self.host_cas_u32(host, expected as u32, new as u32),
            _ => self.host_cas_u64(host, expected, new),
        };
        swapped.unwrap_or_else(|err| {
            let ea = state.reserve_addr;
            raise_data_fault(state, ea, true, err);
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xe_memory::PageFlags;

    #[test]
    fn test_unmapped_read_sets_dsi() {
        let mem = GuestMemory::new(0x1000).unwrap();
        let mut state = ThreadState::new(0);

        assert_eq!(mem.read32(&mut state, 0x2000), 0);
        assert_eq!(state.ex, ex::DATA_STORAGE);
        assert_eq!(state.dar, 0x2000);
        assert_eq!(state.dsisr, dsisr::NOT_FOUND);
    }

    #[test]
    fn test_protected_write_sets_store_bit() {
        let mem = GuestMemory::new(0x2000).unwrap();
        mem.protect(0x1000, 0x1000, PageFlags::READ).unwrap();
        let mut state = ThreadState::new(0);

        mem.write32(&mut state, 0x1000, 5);
        assert_eq!(state.ex, ex::DATA_STORAGE);
        assert_eq!(state.dsisr, dsisr::PROTECTION | dsisr::STORE);
    }

    #[test]
    fn test_high_address_is_segment_fault() {
        let mem = GuestMemory::new(0x1000).unwrap();
        let mut state = ThreadState::new(0);

        mem.read8(&mut state, 0x1_0000_0000);
        assert_eq!(state.ex, ex::DATA_SEGMENT);
    }

    #[test]
    fn test_translate_and_cas() {
        let mem = GuestMemory::new(0x1000).unwrap();
        mem.write::<u32>(0x40, 7).unwrap();
        let mut state = ThreadState::new(0);

        let host = mem.translate(&mut state, 0x40, Size::U32).unwrap();
        let raw = mem.host_load(&mut state, 0x40, host, Size::U32);
        assert_eq!(u32::from_be(raw as u32), 7);
        assert!(mem.host_cas(&mut state, host, Size::U32, raw, 9u32.to_be() as u64));
        assert!(!mem.host_cas(&mut state, host, Size::U32, raw, 11u32.to_be() as u64));
        assert_eq!(GuestMemory::read::<u32>(&mem, 0x40).unwrap(), 9);
        assert_eq!(state.ex, 0);
    }

    #[test]
    fn test_host_load_fault_reports_guest_address() {
        let mem = GuestMemory::new(0x1000).unwrap();
        let mut state = ThreadState::new(0);
        state.reserve_addr = 0x80;

        assert_eq!(mem.host_load(&mut state, 0x40, 0, Size::U32), 0);
        assert_eq!(state.dar, 0x40);
        assert_eq!(state.ex, ex::DATA_STORAGE);
    }

    #[test]
    fn test_misaligned_translate_is_alignment_fault() {
        let mem = GuestMemory::new(0x1000).unwrap();
        let mut state = ThreadState::new(0);
        assert_eq!(mem.translate(&mut state, 0x42, Size::U32), None);
        assert_eq!(state.ex, ex::ALIGNMENT);
    }
}
