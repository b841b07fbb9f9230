//! Field view over a 32-bit PowerPC instruction word
//!
//! Bit numbering follows the architecture books: bit 0 is the most
//! significant bit of the word. Accessors return the raw field, already
//! sign extended where the field is signed.

use std::fmt;

/// Decoded instruction
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction(pub u32);

impl Instruction {
    #[inline]
    pub const fn new(word: u32) -> Self {
        Self(word)
    }

    #[inline]
    pub const fn word(self) -> u32 {
        self.0
    }

    #[inline]
    const fn field(self, shift: u32, bits: u32) -> u32 {
        (self.0 >> shift) & ((1 << bits) - 1)
    }

    /// Primary opcode (bits 0-5)
    #[inline]
    pub const fn opcd(self) -> u32 {
        self.field(26, 6)
    }

    // Register fields

    /// Destination GPR (also `rs`, `rt`, `frd`, `frs`, `vd`)
    #[inline]
    pub const fn rd(self) -> usize {
        self.field(21, 5) as usize
    }

    /// Source GPR in store and logical forms
    #[inline]
    pub const fn rs(self) -> usize {
        self.rd()
    }

    #[inline]
    pub const fn ra(self) -> usize {
        self.field(16, 5) as usize
    }

    #[inline]
    pub const fn rb(self) -> usize {
        self.field(11, 5) as usize
    }

    /// Third FP source of A-form instructions
    #[inline]
    pub const fn frc(self) -> usize {
        self.field(6, 5) as usize
    }

    /// Record bit
    #[inline]
    pub const fn rc(self) -> bool {
        self.0 & 1 != 0
    }

    /// Overflow-enable bit of XO-form instructions
    #[inline]
    pub const fn oe(self) -> bool {
        self.field(10, 1) != 0
    }

    // Immediates

    #[inline]
    pub const fn simm16(self) -> i64 {
        self.0 as u16 as i16 as i64
    }

    #[inline]
    pub const fn uimm16(self) -> u64 {
        (self.0 & 0xFFFF) as u64
    }

    /// DS-form displacement (low two bits cleared)
    #[inline]
    pub const fn ds(self) -> i64 {
        (self.0 & 0xFFFC) as u16 as i16 as i64
    }

    /// DS-form extended opcode
    #[inline]
    pub const fn xo_ds(self) -> u32 {
        self.0 & 3
    }

    // Rotate and shift fields

    /// Shift amount of M-form and `srawi`
    #[inline]
    pub const fn sh(self) -> u32 {
        self.field(11, 5)
    }

    #[inline]
    pub const fn mb(self) -> u32 {
        self.field(6, 5)
    }

    #[inline]
    pub const fn me(self) -> u32 {
        self.field(1, 5)
    }

    /// Six-bit shift of MD/XS forms (sh[5] lives in bit 30)
    #[inline]
    pub const fn sh64(self) -> u32 {
        self.field(11, 5) | ((self.0 << 4) & 0x20)
    }

    /// Six-bit mask begin/end of MD/MDS forms (mb[5] lives in bit 26)
    #[inline]
    pub const fn mbe64(self) -> u32 {
        self.field(6, 5) | (self.0 & 0x20)
    }

    // Branch fields

    /// I-form displacement, already shifted and sign extended
    #[inline]
    pub const fn li(self) -> i64 {
        (((self.0 & 0x03FF_FFFC) << 6) as i32 >> 6) as i64
    }

    /// B-form displacement, already shifted and sign extended
    #[inline]
    pub const fn bd(self) -> i64 {
        (self.0 & 0xFFFC) as u16 as i16 as i64
    }

    #[inline]
    pub const fn aa(self) -> bool {
        self.field(1, 1) != 0
    }

    #[inline]
    pub const fn lk(self) -> bool {
        self.0 & 1 != 0
    }

    #[inline]
    pub const fn bo(self) -> u32 {
        self.field(21, 5)
    }

    #[inline]
    pub const fn bi(self) -> u32 {
        self.field(16, 5)
    }

    // Condition register fields

    #[inline]
    pub const fn crfd(self) -> usize {
        self.field(23, 3) as usize
    }

    #[inline]
    pub const fn crfs(self) -> usize {
        self.field(18, 3) as usize
    }

    #[inline]
    pub const fn crbd(self) -> u32 {
        self.field(21, 5)
    }

    #[inline]
    pub const fn crba(self) -> u32 {
        self.field(16, 5)
    }

    #[inline]
    pub const fn crbb(self) -> u32 {
        self.field(11, 5)
    }

    /// L bit of compares (64-bit when set)
    #[inline]
    pub const fn l10(self) -> bool {
        self.field(21, 1) != 0
    }

    /// One-field bit of `mfocrf`/`mtocrf`
    #[inline]
    pub const fn l11(self) -> bool {
        self.field(20, 1) != 0
    }

    /// L bit of `mtmsrd`
    #[inline]
    pub const fn l15(self) -> bool {
        self.field(16, 1) != 0
    }

    #[inline]
    pub const fn crm(self) -> u32 {
        self.field(12, 8)
    }

    /// Trap condition mask
    #[inline]
    pub const fn to(self) -> u32 {
        self.field(21, 5)
    }

    /// SPR number with the two halves swapped back
    #[inline]
    pub const fn spr(self) -> u32 {
        self.field(16, 5) | (self.field(11, 5) << 5)
    }

    /// `mtfsf` field mask
    #[inline]
    pub const fn fm(self) -> u32 {
        self.field(17, 8)
    }

    /// System call level
    #[inline]
    pub const fn lev(self) -> u32 {
        self.field(5, 7)
    }

    // Extended opcodes

    /// X/XL/XFX-form extended opcode (bits 21-30)
    #[inline]
    pub const fn xo10(self) -> u32 {
        self.field(1, 10)
    }

    /// XO-form extended opcode (bits 22-30)
    #[inline]
    pub const fn xo9(self) -> u32 {
        self.field(1, 9)
    }

    /// A-form extended opcode (bits 26-30)
    #[inline]
    pub const fn xo5(self) -> u32 {
        self.field(1, 5)
    }

    /// MD-form extended opcode (bits 27-29)
    #[inline]
    pub const fn xo_md(self) -> u32 {
        self.field(2, 3)
    }

    /// MDS-form extended opcode (bits 27-30)
    #[inline]
    pub const fn xo_mds(self) -> u32 {
        self.field(1, 4)
    }

    /// XS-form extended opcode (bits 21-29)
    #[inline]
    pub const fn xo_xs(self) -> u32 {
        self.field(2, 9)
    }

    // Vector fields

    #[inline]
    pub const fn vd(self) -> usize {
        self.rd()
    }

    #[inline]
    pub const fn va(self) -> usize {
        self.ra()
    }

    #[inline]
    pub const fn vb(self) -> usize {
        self.rb()
    }

    #[inline]
    pub const fn vc(self) -> usize {
        self.frc()
    }

    /// Signed 5-bit immediate of `vspltis*`
    #[inline]
    pub const fn vsimm(self) -> i32 {
        ((self.field(16, 5) << 27) as i32) >> 27
    }

    /// Unsigned 5-bit immediate of `vsplt*`
    #[inline]
    pub const fn vuimm(self) -> u32 {
        self.field(16, 5)
    }

    /// Byte shift of `vsldoi`
    #[inline]
    pub const fn vshb(self) -> u32 {
        self.field(6, 4)
    }

    /// Record bit of vector compares
    #[inline]
    pub const fn vrc(self) -> bool {
        self.field(10, 1) != 0
    }

    /// VX-form extended opcode (bits 21-31)
    #[inline]
    pub const fn vxo11(self) -> u32 {
        self.0 & 0x7FF
    }

    /// VA-form extended opcode (bits 26-31)
    #[inline]
    pub const fn vxo6(self) -> u32 {
        self.0 & 0x3F
    }

    /// VXR-form extended opcode (bits 22-31)
    #[inline]
    pub const fn vxo10(self) -> u32 {
        self.0 & 0x3FF
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instruction(0x{:08X}, opcd {})", self.0, self.opcd())
    }
}

impl From<u32> for Instruction {
    fn from(word: u32) -> Self {
        Self(word)
    }
}
