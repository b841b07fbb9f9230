//! VMX128 vector register representation
//!
//! Element 0 is the most significant (leftmost) element in the guest's
//! big-endian view, for every lane width.

use bytemuck::{Pod, Zeroable};

/// 128-bit vector register
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C, align(16))]
pub struct Vector128 {
    /// Words in guest element order
    pub words: [u32; 4],
}

impl Vector128 {
    pub const ZERO: Self = Self { words: [0; 4] };

    pub const fn from_u32x4(words: [u32; 4]) -> Self {
        Self { words }
    }

    pub const fn as_u32x4(&self) -> [u32; 4] {
        self.words
    }

    /// Pack into a `u128` with element 0 in the high bits
    pub const fn to_u128(self) -> u128 {
        ((self.words[0] as u128) << 96)
            | ((self.words[1] as u128) << 64)
            | ((self.words[2] as u128) << 32)
            | (self.words[3] as u128)
    }

    pub const fn from_u128(value: u128) -> Self {
        Self {
            words: [
                (value >> 96) as u32,
                (value >> 64) as u32,
                (value >> 32) as u32,
                value as u32,
            ],
        }
    }

    pub fn as_u8x16(&self) -> [u8; 16] {
        self.to_u128().to_be_bytes()
    }

    pub fn from_u8x16(bytes: [u8; 16]) -> Self {
        Self::from_u128(u128::from_be_bytes(bytes))
    }

    pub fn as_u16x8(&self) -> [u16; 8] {
        let bytes = self.as_u8x16();
        std::array::from_fn(|i| u16::from_be_bytes([bytes[2 * i], bytes[2 * i + 1]]))
    }

    pub fn from_u16x8(halves: [u16; 8]) -> Self {
        let mut bytes = [0u8; 16];
        for (i, half) in halves.iter().enumerate() {
            bytes[2 * i..2 * i + 2].copy_from_slice(&half.to_be_bytes());
        }
        Self::from_u8x16(bytes)
    }

    pub fn as_f32x4(&self) -> [f32; 4] {
        self.words.map(f32::from_bits)
    }

    pub fn from_f32x4(values: [f32; 4]) -> Self {
        Self {
            words: values.map(f32::to_bits),
        }
    }
}

impl From<u128> for Vector128 {
    fn from(value: u128) -> Self {
        Self::from_u128(value)
    }
}

impl From<Vector128> for u128 {
    fn from(value: Vector128) -> Self {
        value.to_u128()
    }
}
