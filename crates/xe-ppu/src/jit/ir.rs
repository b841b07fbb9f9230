//! Host operations produced by the emitters
//!
//! A block is a flat list of [`HostOp`]s over virtual registers ([`Value`])
//! and labels. Virtual registers are mutable; the builder hands out a fresh
//! one for every intermediate and the mode combinator writes both arms into a
//! shared one. Every value is 128 bits wide in the executor; integer ops use
//! the low 64 bits and float ops the low 64 bits as a raw double.

use std::fmt;

use bitflags::bitflags;

use crate::state::Slot;

/// Virtual host register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value(pub(crate) u32);

impl Value {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Branch target inside a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub(crate) u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Integer operand width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    /// Operate on the low word, zero-extend the result
    W32,
    W64,
}

impl Width {
    pub const fn bits(self) -> u32 {
        match self {
            Self::W32 => 32,
            Self::W64 => 64,
        }
    }
}

/// Memory access size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Size {
    U8,
    U16,
    U32,
    U64,
    U128,
}

impl Size {
    pub const fn bytes(self) -> u64 {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
            Self::U64 => 8,
            Self::U128 => 16,
        }
    }
}

/// Two-operand integer operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    /// High half of the signed product
    MulHiS,
    /// High half of the unsigned product
    MulHiU,
    /// Signed divide; faults on zero or overflow like a host divide
    DivS,
    /// Unsigned divide; faults on zero
    DivU,
    And,
    Or,
    Xor,
    /// `lhs & !rhs`
    AndNot,
    /// `lhs | !rhs`
    OrNot,
    /// Shift left, count taken modulo the width
    Shl,
    /// Logical shift right, count taken modulo the width
    Shr,
    /// Arithmetic shift right, count taken modulo the width
    Sar,
    /// Rotate left, count taken modulo the width
    Rotl,
    /// Carry out of `lhs + rhs` (0 or 1)
    AddCarry,
}

/// One-operand integer operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Not,
    Neg,
    Clz32,
    Clz64,
    Sext8,
    Sext16,
    Sext32,
    Zext8,
    Zext16,
    Zext32,
    Swap16,
    Swap32,
    Swap64,
    /// Big-endian raw word to host value (low 32 bits)
    FromBe32,
    /// Big-endian raw doubleword to host value
    FromBe64,
    /// Host value to big-endian raw word (low 32 bits)
    ToBe32,
    /// Host value to big-endian raw doubleword
    ToBe64,
}

/// Integer comparison producing 1 or 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cond {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

/// Binary floating-point arithmetic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FBinOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Unary floating-point operations on raw double bit patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FUnOp {
    /// Square root, rounded per the mode operand
    Sqrt,
    /// Round a double to single precision, kept in double format
    RoundSingle,
    /// Flip the sign bit
    Neg,
    /// Clear the sign bit
    Abs,
    /// Set the sign bit
    NegAbs,
    /// Force the quiet bit of a NaN
    Quiet,
    /// Widen a raw single (low 32 bits) to a raw double, bit-exact for NaNs
    SingleToDouble,
    /// Narrow a raw double to a raw single (low 32 bits), bit-exact for NaNs
    DoubleToSingle,
    /// Convert to a signed word, rounding per the mode operand
    ToInt32,
    /// Convert to a signed doubleword, rounding per the mode operand
    ToInt64,
    /// Convert a signed doubleword to double, rounding per the mode operand
    FromInt64,
    /// Reciprocal estimate
    RecipEstimate,
    /// Reciprocal square root estimate
    RsqrtEstimate,
}

/// Floating-point classification predicates (1 or 0), plus FPRF
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FTest {
    IsSnan,
    IsQnan,
    IsNan,
    IsInf,
    IsZero,
    IsDenormal,
    IsNegative,
    /// Five-bit FPRF class code of the value
    Fprf,
    /// FPRF class code judged at single precision
    FprfSingle,
}

/// Rounding control for float ops that take a constant mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoundKind {
    Nearest,
    TowardZero,
    Up,
    Down,
}

impl RoundKind {
    /// Decode the FPSCR RN field
    pub const fn from_rn(rn: u64) -> Self {
        match rn & 3 {
            0 => Self::Nearest,
            1 => Self::TowardZero,
            2 => Self::Up,
            _ => Self::Down,
        }
    }
}

bitflags! {
    /// Status reported by host float ops
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FpStatus: u64 {
        /// Result was rounded
        const INEXACT    = 0b00001;
        /// Rounded result has larger magnitude than the exact one
        const ROUNDED_UP = 0b00010;
        const OVERFLOW   = 0b00100;
        const UNDERFLOW  = 0b01000;
        /// Integer conversion was out of range or NaN
        const INVALID    = 0b10000;
    }
}

/// Lane width of vector integer ops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    Byte,
    Half,
    Word,
}

impl Lane {
    pub const fn bits(self) -> u32 {
        match self {
            Self::Byte => 8,
            Self::Half => 16,
            Self::Word => 32,
        }
    }

    pub const fn count(self) -> usize {
        (128 / self.bits()) as usize
    }
}

/// 128-bit vector operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VecOp {
    And,
    AndC,
    Or,
    Xor,
    Nor,
    /// `(a & !c) | (b & c)`
    Select,
    /// Byte permute of `a:b` controlled by `c`
    Permute,
    /// Bytes `sh..sh+16` of `a:b`
    ShiftLeftDouble(u8),
    MergeHigh(Lane),
    MergeLow(Lane),
    /// Replicate element `index` of `a`
    Splat(Lane, u8),
    AddModulo(Lane),
    SubModulo(Lane),
    /// Carry out of each unsigned word add
    AddCarryWord,
    /// Unsigned saturating subtract, reports saturation
    SubUnsignedSat(Lane),
    /// Pack words of `a:b` to halfwords, modulo
    PackWordModulo,
    /// Pack signed words of `a:b` to signed halfwords, saturating
    PackWordSignedSat,
    /// Per-lane shift left, count from `b` modulo the lane width
    ShiftLeft(Lane),
    ShiftRight(Lane),
    ShiftRightAlg(Lane),
    CmpEqWord,
    CmpEqFloat,
    CmpGtFloat,
    CmpGeFloat,
    FAdd,
    FSub,
    /// `a * c + b`
    FMulAdd,
    /// `-(a * c - b)`
    FNegMulSub,
    /// Lane max; the `b` lane wins on equality or when either lane is NaN
    FMax,
    FMin,
    FRound(RoundKind),
    FRecipEstimate,
    FRsqrtEstimate,
    FExp2Estimate,
    FLog2Estimate,
    /// Replace denormal lanes with signed zero
    FlushDenormals,
    /// `lvsl` control vector for the shift in scalar `a`
    ShiftControlLeft,
    /// `lvsr` control vector for the shift in scalar `a`
    ShiftControlRight,
    /// Shift `a` left by scalar `b` bytes, zero fill
    ShiftLeftBytes,
    /// Shift `a` right by scalar `b` bytes, zero fill
    ShiftRightBytes,
    /// Element of `a` holding the byte at offset scalar `b` (mod 16)
    ExtractByteOffset(Lane),
    /// CR6 summary of a compare mask: 8 all true, 2 all false
    CompareSummary,
}

/// Out-of-line calls from generated code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Helper {
    /// `MMURead*(state, ea)` returning the value
    Read(Size),
    /// `MMUWrite*(state, ea, value)`
    Write(Size),
    /// Translate `ea` to a host address for an atomic of the given size
    Translate(Size),
    /// Raw load from a host address (`host, ea`); `ea` is reported on a fault
    HostLoad(Size),
    /// Raw compare-and-swap at a host address (`host, expected, new`), 1 on success
    HostCas(Size),
    /// Raise an architectural exception
    Raise(Exception),
    /// Read the time base
    ReadTimeBase,
}

/// Exceptions raised by generated code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exception {
    /// Trap instruction condition matched
    Trap,
    FpUnavailable,
    VxUnavailable,
    /// `sc` with the given LEV
    SystemCall(u8),
}

/// A single host operation
#[derive(Debug, Clone, PartialEq)]
pub enum HostOp {
    Const { dst: Value, imm: u128 },
    Mov { dst: Value, src: Value },
    Load { dst: Value, slot: Slot },
    Store { slot: Slot, src: Value },
    Bin { op: BinOp, width: Width, dst: Value, lhs: Value, rhs: Value },
    Un { op: UnOp, dst: Value, src: Value },
    Cmp { cond: Cond, width: Width, dst: Value, lhs: Value, rhs: Value },
    Select { dst: Value, cond: Value, if_true: Value, if_false: Value },
    FBin { op: FBinOp, dst: Value, lhs: Value, rhs: Value, rn: Value, status: Value },
    FUn { op: FUnOp, dst: Value, src: Value, rn: Value, status: Value },
    /// Fused `a * c + b`, round to nearest
    FMulAdd { dst: Value, a: Value, c: Value, b: Value, status: Value },
    FTest { test: FTest, dst: Value, src: Value },
    /// Unordered-aware compare giving a CR field code (LT/GT/EQ/UN)
    FCmp { dst: Value, lhs: Value, rhs: Value },
    Vector {
        op: VecOp,
        dst: Value,
        a: Value,
        b: Option<Value>,
        c: Option<Value>,
        sat: Option<Value>,
    },
    Call { helper: Helper, dst: Option<Value>, args: Vec<Value> },
    Bind(Label),
    Jump(Label),
    /// Jump when `cond` is non-zero
    BranchIf { cond: Value, target: Label },
    /// Jump when `cond` is zero
    BranchIfZero { cond: Value, target: Label },
    /// Marks the start of a guest instruction
    Marker { addr: u64, word: u32 },
    /// Leave the block
    Exit,
}

/// A translated block
#[derive(Debug, Clone)]
pub struct Block {
    /// Guest address of the first instruction
    pub start: u64,
    /// Number of guest instructions translated
    pub instructions: u32,
    pub ops: Vec<HostOp>,
    /// Op index of every bound label
    pub labels: Vec<usize>,
    /// Number of virtual registers used
    pub values: u32,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "block 0x{:08X} ({} instructions, {} values)",
            self.start, self.instructions, self.values
        )?;
        for op in &self.ops {
            match op {
                HostOp::Marker { addr, word } => writeln!(f, "  ; 0x{:08X}: {:08X}", addr, word)?,
                HostOp::Bind(label) => writeln!(f, "{}:", label)?,
                other => writeln!(f, "    {:?}", other)?,
            }
        }
        Ok(())
    }
}
