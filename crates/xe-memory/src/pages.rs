//! Page protection flags

use bitflags::bitflags;

bitflags! {
    /// Protection attributes of one guest page
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PageFlags: u8 {
        /// Loads allowed
        const READ    = 0b0001;
        /// Stores allowed
        const WRITE   = 0b0010;
        /// Instruction fetch allowed
        const EXECUTE = 0b0100;

        const RW  = Self::READ.bits() | Self::WRITE.bits();
        const RX  = Self::READ.bits() | Self::EXECUTE.bits();
        const RWX = Self::READ.bits() | Self::WRITE.bits() | Self::EXECUTE.bits();
    }
}

impl PageFlags {
    /// Whether a data access of the given kind is permitted
    #[inline]
    pub fn permits(self, write: bool) -> bool {
        if write {
            self.contains(Self::WRITE)
        } else {
            self.contains(Self::READ)
        }
    }
}

impl Default for PageFlags {
    fn default() -> Self {
        Self::RWX
    }
}
