//! Floating-point unit emitters
//!
//! Every arithmetic instruction follows the same sequence: FPU availability
//! check, sticky bit reset, the [`table`] walk that settles NaN, infinity and
//! denormal cases, the host computation, then FPRF and the optional CR1
//! update.

mod emit;
pub mod table;

pub use emit::*;
pub use table::{decide, ArithOp, Decision, FpKind, Outcome, Precision};
