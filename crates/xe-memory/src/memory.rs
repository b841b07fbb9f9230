//! Flat guest RAM
//!
//! Guest memory is big-endian. The backing store is a slice of `AtomicU64`
//! so every guest access is an atomic host access and the allocation is
//! 8-byte aligned, which lets reservation stores use a host
//! compare-and-swap directly on the guest word.

use std::sync::atomic::{AtomicU16, AtomicU32, AtomicU64, AtomicU8, Ordering};

use parking_lot::RwLock;
use xe_core::error::MemoryError;

use crate::constants::PAGE_SIZE;
use crate::pages::PageFlags;

/// Values that can be moved between guest memory and the host
pub trait GuestValue: Copy {
    /// Access size in bytes
    const SIZE: usize;

    fn from_bits(bits: u128) -> Self;
    fn to_bits(self) -> u128;
}

macro_rules! impl_guest_value {
    ($($ty:ty),*) => {
        $(
            impl GuestValue for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn from_bits(bits: u128) -> Self {
                    bits as $ty
                }

                #[inline]
                fn to_bits(self) -> u128 {
                    self as u128
                }
            }
        )*
    };
}

impl_guest_value!(u8, u16, u32, u64, u128);

/// Guest RAM starting at guest address zero
pub struct GuestMemory {
    words: Box<[AtomicU64]>,
    size: u64,
    pages: RwLock<Vec<PageFlags>>,
}

impl GuestMemory {
    /// Allocate `size` bytes of zeroed RAM, rounded up to whole pages
    pub fn new(size: u64) -> Result<Self, MemoryError> {
        Self::with_flags(size, PageFlags::RWX)
    }

    /// Allocate RAM with every page starting out with `flags`
    pub fn with_flags(size: u64, flags: PageFlags) -> Result<Self, MemoryError> {
        let size = size
            .checked_add(PAGE_SIZE - 1)
            .map(|s| s & !(PAGE_SIZE - 1))
            .filter(|s| *s > 0)
            .ok_or(MemoryError::OutOfMemory(size))?;
        let word_count = usize::try_from(size / 8).map_err(|_| MemoryError::OutOfMemory(size))?;
        let page_count = (size / PAGE_SIZE) as usize;

        let words = (0..word_count).map(|_| AtomicU64::new(0)).collect();
        tracing::debug!("Allocated {} KB of guest memory", size / 1024);

        Ok(Self {
            words,
            size,
            pages: RwLock::new(vec![flags; page_count]),
        })
    }

    /// Size of RAM in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Change protection for every page touching `[addr, addr + len)`
    pub fn protect(&self, addr: u64, len: u64, flags: PageFlags) -> Result<(), MemoryError> {
        if len == 0 {
            return Ok(());
        }
        let end = addr
            .checked_add(len)
            .filter(|end| *end <= self.size)
            .ok_or(MemoryError::Unmapped(addr))?;
        let mut pages = self.pages.write();
        for page in (addr / PAGE_SIZE)..end.div_ceil(PAGE_SIZE) {
            pages[page as usize] = flags;
        }
        Ok(())
    }

    /// Protection of the page containing `addr`
    pub fn page_flags(&self, addr: u64) -> Option<PageFlags> {
        self.pages.read().get((addr / PAGE_SIZE) as usize).copied()
    }

    /// Validate an access and return its byte offset into the backing store
    fn check(&self, addr: u64, len: usize, write: bool) -> Result<usize, MemoryError> {
        let end = addr
            .checked_add(len as u64)
            .filter(|end| *end <= self.size)
            .ok_or(MemoryError::Unmapped(addr))?;

        let pages = self.pages.read();
        for page in (addr / PAGE_SIZE)..end.div_ceil(PAGE_SIZE) {
            if !pages[page as usize].permits(write) {
                return Err(MemoryError::AccessViolation { addr, write });
            }
        }
        Ok(addr as usize)
    }

    #[inline]
    fn base_ptr(&self) -> *mut u8 {
        self.words.as_ptr() as *mut u8
    }

    /// Big-endian load of `size` bytes at a checked offset
    fn load(&self, offset: usize, size: usize) -> u128 {
        // SAFETY: `offset + size` was bounds-checked against the backing store,
        // the pointer is derived from `AtomicU64` cells and each typed atomic
        // below is only used at its natural alignment.
        unsafe {
            let ptr = self.base_ptr().add(offset);
            match size {
                1 => AtomicU8::from_ptr(ptr).load(Ordering::Relaxed) as u128,
                2 if offset % 2 == 0 => {
                    u16::from_be(AtomicU16::from_ptr(ptr.cast()).load(Ordering::Relaxed)) as u128
                }
                4 if offset % 4 == 0 => {
                    u32::from_be(AtomicU32::from_ptr(ptr.cast()).load(Ordering::Relaxed)) as u128
                }
                8 if offset % 8 == 0 => {
                    u64::from_be(AtomicU64::from_ptr(ptr.cast()).load(Ordering::Relaxed)) as u128
                }
                16 if offset % 8 == 0 => (self.load(offset, 8) << 64) | self.load(offset + 8, 8),
                _ => (0..size).fold(0, |acc, i| (acc << 8) | self.load(offset + i, 1)),
            }
        }
    }

    /// Big-endian store of the low `size` bytes of `bits`
    fn store(&self, offset: usize, size: usize, bits: u128) {
        // SAFETY: see `load`.
        unsafe {
            let ptr = self.base_ptr().add(offset);
            match size {
                1 => AtomicU8::from_ptr(ptr).store(bits as u8, Ordering::Relaxed),
                2 if offset % 2 == 0 => {
                    AtomicU16::from_ptr(ptr.cast()).store((bits as u16).to_be(), Ordering::Relaxed)
                }
                4 if offset % 4 == 0 => {
                    AtomicU32::from_ptr(ptr.cast()).store((bits as u32).to_be(), Ordering::Relaxed)
                }
                8 if offset % 8 == 0 => {
                    AtomicU64::from_ptr(ptr.cast()).store((bits as u64).to_be(), Ordering::Relaxed)
                }
                16 if offset % 8 == 0 => {
                    self.store(offset, 8, bits >> 64);
                    self.store(offset + 8, 8, bits);
                }
                _ => {
                    for i in 0..size {
                        let shift = 8 * (size - 1 - i);
                        self.store(offset + i, 1, bits >> shift);
                    }
                }
            }
        }
    }

    /// Read a big-endian value
    pub fn read<T: GuestValue>(&self, addr: u64) -> Result<T, MemoryError> {
        let offset = self.check(addr, T::SIZE, false)?;
        Ok(T::from_bits(self.load(offset, T::SIZE)))
    }

    /// Write a big-endian value
    pub fn write<T: GuestValue>(&self, addr: u64, value: T) -> Result<(), MemoryError> {
        let offset = self.check(addr, T::SIZE, true)?;
        self.store(offset, T::SIZE, value.to_bits());
        Ok(())
    }

    /// Fetch an instruction word, requiring execute permission
    pub fn fetch(&self, addr: u64) -> Result<u32, MemoryError> {
        let flags = self.page_flags(addr).ok_or(MemoryError::Unmapped(addr))?;
        if !flags.contains(PageFlags::EXECUTE) {
            return Err(MemoryError::AccessViolation { addr, write: false });
        }
        self.read::<u32>(addr)
    }

    /// Copy guest bytes out
    pub fn read_bytes(&self, addr: u64, out: &mut [u8]) -> Result<(), MemoryError> {
        let offset = self.check(addr, out.len(), false)?;
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.load(offset + i, 1) as u8;
        }
        Ok(())
    }

    /// Copy bytes into guest memory, ignoring page protection
    pub fn load_image(&self, addr: u64, data: &[u8]) -> Result<(), MemoryError> {
        let end = addr
            .checked_add(data.len() as u64)
            .filter(|end| *end <= self.size)
            .ok_or(MemoryError::Unmapped(addr))?;
        for (i, byte) in data.iter().enumerate() {
            self.store(addr as usize + i, 1, *byte as u128);
        }
        tracing::debug!("Loaded {} bytes at 0x{:08X}..0x{:08X}", data.len(), addr, end);
        Ok(())
    }

    /// Host address of a naturally aligned guest word, for reservations
    pub fn host_address(&self, addr: u64, size: usize) -> Result<u64, MemoryError> {
        if addr % size as u64 != 0 {
            return Err(MemoryError::Misaligned(addr));
        }
        let offset = self.check(addr, size, true)?;
        Ok(self.base_ptr() as u64 + offset as u64)
    }

    /// Resolve a host address handed out by `host_address`
    fn host_offset(&self, host: u64, size: usize) -> Result<usize, MemoryError> {
        let base = self.base_ptr() as u64;
        let offset = host
            .checked_sub(base)
            .filter(|off| off + size as u64 <= self.size)
            .ok_or(MemoryError::BadHostAddress(host))?;
        if offset % size as u64 != 0 {
            return Err(MemoryError::Misaligned(offset));
        }
        Ok(offset as usize)
    }

    /// Raw (guest byte order) load of a 32-bit word at a host address
    pub fn host_load_u32(&self, host: u64) -> Result<u32, MemoryError> {
        let offset = self.host_offset(host, 4)?;
        // SAFETY: offset is in bounds and 4-byte aligned.
        Ok(unsafe { AtomicU32::from_ptr(self.base_ptr().add(offset).cast()) }.load(Ordering::Acquire))
    }

    /// Raw (guest byte order) load of a 64-bit word at a host address
    pub fn host_load_u64(&self, host: u64) -> Result<u64, MemoryError> {
        let offset = self.host_offset(host, 8)?;
        // SAFETY: offset is in bounds and 8-byte aligned.
        Ok(unsafe { AtomicU64::from_ptr(self.base_ptr().add(offset).cast()) }.load(Ordering::Acquire))
    }

    /// Compare-and-swap of raw 32-bit words at a host address
    pub fn host_cas_u32(&self, host: u64, expected: u32, new: u32) -> Result<bool, MemoryError> {
        let offset = self.host_offset(host, 4)?;
        // SAFETY: offset is in bounds and 4-byte aligned.
        let cell = unsafe { AtomicU32::from_ptr(self.base_ptr().add(offset).cast()) };
        Ok(cell
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok())
    }

    /// Compare-and-swap of raw 64-bit words at a host address
    pub fn host_cas_u64(&self, host: u64, expected: u64, new: u64) -> Result<bool, MemoryError> {
        let offset = self.host_offset(host, 8)?;
        // SAFETY: offset is in bounds and 8-byte aligned.
        let cell = unsafe { AtomicU64::from_ptr(self.base_ptr().add(offset).cast()) };
        Ok(cell
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok())
    }
}

impl std::fmt::Debug for GuestMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestMemory").field("size", &self.size).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_layout() {
        let mem = GuestMemory::new(0x1000).unwrap();
        mem.write::<u32>(0x10, 0x1122_3344).unwrap();

        let mut bytes = [0u8; 4];
        mem.read_bytes(0x10, &mut bytes).unwrap();
        assert_eq!(bytes, [0x11, 0x22, 0x33, 0x44]);
        assert_eq!(mem.read::<u16>(0x12).unwrap(), 0x3344);
        assert_eq!(mem.read::<u8>(0x10).unwrap(), 0x11);
    }

    #[test]
    fn test_unaligned_access() {
        let mem = GuestMemory::new(0x1000).unwrap();
        mem.write::<u64>(0x23, 0x0102_0304_0506_0708).unwrap();
        assert_eq!(mem.read::<u64>(0x23).unwrap(), 0x0102_0304_0506_0708);
        assert_eq!(mem.read::<u32>(0x25).unwrap(), 0x0304_0506);
    }

    #[test]
    fn test_quadword() {
        let mem = GuestMemory::new(0x1000).unwrap();
        let value = 0x0011_2233_4455_6677_8899_AABB_CCDD_EEFFu128;
        mem.write::<u128>(0x40, value).unwrap();
        assert_eq!(mem.read::<u128>(0x40).unwrap(), value);
        assert_eq!(mem.read::<u32>(0x4C).unwrap(), 0xCCDD_EEFF);
    }

    #[test]
    fn test_out_of_bounds() {
        let mem = GuestMemory::new(0x1000).unwrap();
        assert_eq!(mem.read::<u32>(0x1000), Err(MemoryError::Unmapped(0x1000)));
        assert_eq!(mem.read::<u32>(0xFFE), Err(MemoryError::Unmapped(0xFFE)));
        assert!(mem.read::<u32>(u64::MAX - 1).is_err());
    }

    #[test]
    fn test_protection() {
        let mem = GuestMemory::new(0x3000).unwrap();
        mem.protect(0x1000, 0x1000, PageFlags::READ).unwrap();

        assert!(mem.read::<u32>(0x1000).is_ok());
        assert_eq!(
            mem.write::<u32>(0x1000, 1),
            Err(MemoryError::AccessViolation { addr: 0x1000, write: true })
        );
        // Straddles a writable and a read-only page
        assert!(mem.write::<u32>(0xFFE, 1).is_err());
        assert!(mem.write::<u32>(0x2000, 1).is_ok());
    }

    #[test]
    fn test_fetch_requires_execute() {
        let mem = GuestMemory::with_flags(0x2000, PageFlags::RW).unwrap();
        assert!(mem.fetch(0).is_err());
        mem.protect(0, 0x1000, PageFlags::RX).unwrap();
        mem.load_image(0, &[0x38, 0x60, 0x00, 0x01]).unwrap();
        assert_eq!(mem.fetch(0).unwrap(), 0x3860_0001);
    }

    #[test]
    fn test_host_cas() {
        let mem = GuestMemory::new(0x1000).unwrap();
        mem.write::<u32>(0x100, 0xCAFE_BABE).unwrap();

        let host = mem.host_address(0x100, 4).unwrap();
        let raw = mem.host_load_u32(host).unwrap();
        assert_eq!(u32::from_be(raw), 0xCAFE_BABE);

        assert!(mem.host_cas_u32(host, raw, 0xDEAD_BEEFu32.to_be()).unwrap());
        assert_eq!(mem.read::<u32>(0x100).unwrap(), 0xDEAD_BEEF);

        // Stale expected value fails
        assert!(!mem.host_cas_u32(host, raw, 0).unwrap());
        assert_eq!(mem.read::<u32>(0x100).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn test_host_address_validation() {
        let mem = GuestMemory::new(0x1000).unwrap();
        assert_eq!(mem.host_address(0x102, 4), Err(MemoryError::Misaligned(0x102)));
        assert!(mem.host_load_u64(0).is_err());
        assert!(mem.host_load_u64(mem.host_address(0x8, 8).unwrap()).is_ok());
    }
}
