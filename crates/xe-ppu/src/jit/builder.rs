//! Block assembly
//!
//! [`BlockBuilder`] owns the op list, the virtual register counter and the
//! labels of one block. Emitters never see it directly; they receive an
//! [`EmitContext`] scoped to a single guest instruction, which adds the
//! per-instruction end label used to abandon the instruction on a fault.

use xe_core::error::JitError;

use super::ir::*;
use crate::instruction::Instruction;
use crate::state::{Slot, StateLayout, LAYOUT};

/// Builder for one translated block
pub struct BlockBuilder {
    start: u64,
    ops: Vec<HostOp>,
    labels: Vec<Option<usize>>,
    next_value: u32,
    instructions: u32,
}

impl BlockBuilder {
    pub fn new(start: u64) -> Self {
        Self {
            start,
            ops: Vec::with_capacity(256),
            labels: Vec::new(),
            next_value: 0,
            instructions: 0,
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    /// Number of guest instructions appended so far
    pub fn instructions(&self) -> u32 {
        self.instructions
    }

    pub fn push(&mut self, op: HostOp) {
        self.ops.push(op);
    }

    pub fn new_value(&mut self) -> Value {
        let value = Value(self.next_value);
        self.next_value += 1;
        value
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() as u32 - 1)
    }

    pub fn bind(&mut self, label: Label) {
        self.labels[label.0 as usize] = Some(self.ops.len());
        self.ops.push(HostOp::Bind(label));
    }

    /// Translate one guest instruction with `emit`
    ///
    /// The default next address is stored before the emitter runs, so a
    /// branch only has to overwrite NIA on its taken path. With
    /// `exit_on_exception` the block is left right after any instruction that
    /// raised an exception.
    pub fn emit_instruction<F>(&mut self, cia: u64, instr: Instruction, exit_on_exception: bool, emit: F)
    where
        F: FnOnce(&mut EmitContext<'_>, Instruction),
    {
        self.instructions += 1;
        self.push(HostOp::Marker { addr: cia, word: instr.word() });

        let addr = self.konst(cia);
        self.store(Slot::Cia, addr);
        let next = self.konst(cia.wrapping_add(4));
        self.store(Slot::Nia, next);

        let end = self.new_label();
        {
            let mut ctx = EmitContext {
                b: self,
                layout: &LAYOUT,
                cia,
                end,
            };
            emit(&mut ctx, instr);
        }
        self.bind(end);

        if exit_on_exception {
            let cont = self.new_label();
            let ex = self.load(Slot::Ex);
            self.branch_if_zero(ex, cont);
            self.push(HostOp::Exit);
            self.bind(cont);
        }
    }

    /// Close the block and check that every label was bound
    pub fn finish(mut self) -> Result<Block, JitError> {
        if self.instructions == 0 {
            return Err(JitError::EmptyBlock(self.start));
        }
        self.push(HostOp::Exit);

        let mut labels = Vec::with_capacity(self.labels.len());
        for (index, bound) in self.labels.iter().enumerate() {
            match bound {
                Some(at) => labels.push(*at),
                None => return Err(JitError::UnboundLabel(index as u32)),
            }
        }

        Ok(Block {
            start: self.start,
            instructions: self.instructions,
            ops: self.ops,
            labels,
            values: self.next_value,
        })
    }

    // Value-producing shorthands. Each returns a fresh virtual register.

    pub fn konst(&mut self, imm: u64) -> Value {
        self.konst128(imm as u128)
    }

    pub fn konst128(&mut self, imm: u128) -> Value {
        let dst = self.new_value();
        self.push(HostOp::Const { dst, imm });
        dst
    }

    pub fn mov(&mut self, dst: Value, src: Value) {
        self.push(HostOp::Mov { dst, src });
    }

    pub fn load(&mut self, slot: Slot) -> Value {
        let dst = self.new_value();
        self.push(HostOp::Load { dst, slot });
        dst
    }

    pub fn store(&mut self, slot: Slot, src: Value) {
        self.push(HostOp::Store { slot, src });
    }

    pub fn bin(&mut self, op: BinOp, width: Width, lhs: Value, rhs: Value) -> Value {
        let dst = self.new_value();
        self.push(HostOp::Bin { op, width, dst, lhs, rhs });
        dst
    }

    /// 64-bit op with an immediate right-hand side
    pub fn bin_imm(&mut self, op: BinOp, lhs: Value, imm: u64) -> Value {
        let rhs = self.konst(imm);
        self.bin(op, Width::W64, lhs, rhs)
    }

    pub fn add(&mut self, lhs: Value, rhs: Value) -> Value {
        self.bin(BinOp::Add, Width::W64, lhs, rhs)
    }

    pub fn and(&mut self, lhs: Value, rhs: Value) -> Value {
        self.bin(BinOp::And, Width::W64, lhs, rhs)
    }

    pub fn or(&mut self, lhs: Value, rhs: Value) -> Value {
        self.bin(BinOp::Or, Width::W64, lhs, rhs)
    }

    pub fn xor(&mut self, lhs: Value, rhs: Value) -> Value {
        self.bin(BinOp::Xor, Width::W64, lhs, rhs)
    }

    pub fn un(&mut self, op: UnOp, src: Value) -> Value {
        let dst = self.new_value();
        self.push(HostOp::Un { op, dst, src });
        dst
    }

    pub fn cmp(&mut self, cond: Cond, width: Width, lhs: Value, rhs: Value) -> Value {
        let dst = self.new_value();
        self.push(HostOp::Cmp { cond, width, dst, lhs, rhs });
        dst
    }

    pub fn cmp_imm(&mut self, cond: Cond, width: Width, lhs: Value, imm: u64) -> Value {
        let rhs = self.konst(imm);
        self.cmp(cond, width, lhs, rhs)
    }

    pub fn select(&mut self, cond: Value, if_true: Value, if_false: Value) -> Value {
        let dst = self.new_value();
        self.push(HostOp::Select { dst, cond, if_true, if_false });
        dst
    }

    pub fn jump(&mut self, target: Label) {
        self.push(HostOp::Jump(target));
    }

    pub fn branch_if(&mut self, cond: Value, target: Label) {
        self.push(HostOp::BranchIf { cond, target });
    }

    pub fn branch_if_zero(&mut self, cond: Value, target: Label) {
        self.push(HostOp::BranchIfZero { cond, target });
    }

    pub fn call(&mut self, helper: Helper, args: Vec<Value>) -> Value {
        let dst = self.new_value();
        self.push(HostOp::Call { helper, dst: Some(dst), args });
        dst
    }

    pub fn call_void(&mut self, helper: Helper, args: Vec<Value>) {
        self.push(HostOp::Call { helper, dst: None, args });
    }

    /// Binary float op; returns `(result, status)`
    pub fn fbin(&mut self, op: FBinOp, lhs: Value, rhs: Value, rn: Value) -> (Value, Value) {
        let dst = self.new_value();
        let status = self.new_value();
        self.push(HostOp::FBin { op, dst, lhs, rhs, rn, status });
        (dst, status)
    }

    /// Unary float op; returns `(result, status)`
    pub fn fun(&mut self, op: FUnOp, src: Value, rn: Value) -> (Value, Value) {
        let dst = self.new_value();
        let status = self.new_value();
        self.push(HostOp::FUn { op, dst, src, rn, status });
        (dst, status)
    }

    /// Unary float op that never rounds (sign ops, widening)
    pub fn fun_exact(&mut self, op: FUnOp, src: Value) -> Value {
        let rn = self.konst(0);
        self.fun(op, src, rn).0
    }

    pub fn fmuladd(&mut self, a: Value, c: Value, b: Value) -> (Value, Value) {
        let dst = self.new_value();
        let status = self.new_value();
        self.push(HostOp::FMulAdd { dst, a, c, b, status });
        (dst, status)
    }

    pub fn ftest(&mut self, test: FTest, src: Value) -> Value {
        let dst = self.new_value();
        self.push(HostOp::FTest { test, dst, src });
        dst
    }

    pub fn fcmp(&mut self, lhs: Value, rhs: Value) -> Value {
        let dst = self.new_value();
        self.push(HostOp::FCmp { dst, lhs, rhs });
        dst
    }

    pub fn vector(&mut self, op: VecOp, a: Value, b: Option<Value>, c: Option<Value>) -> Value {
        let dst = self.new_value();
        self.push(HostOp::Vector { op, dst, a, b, c, sat: None });
        dst
    }

    /// Vector op that also reports saturation; returns `(result, saturated)`
    pub fn vector_sat(&mut self, op: VecOp, a: Value, b: Value) -> (Value, Value) {
        let dst = self.new_value();
        let sat = self.new_value();
        self.push(HostOp::Vector { op, dst, a, b: Some(b), c: None, sat: Some(sat) });
        (dst, sat)
    }
}

/// Emission context for one guest instruction
pub struct EmitContext<'a> {
    /// Builder capability: temporaries, labels, append
    pub b: &'a mut BlockBuilder,
    /// Thread-state layout the slots resolve through
    pub layout: &'static StateLayout,
    cia: u64,
    end: Label,
}

impl EmitContext<'_> {
    /// Address of the instruction being translated
    pub fn cia(&self) -> u64 {
        self.cia
    }

    /// Label at the end of this instruction; jumping there commits nothing
    /// not already stored
    pub fn end(&self) -> Label {
        self.end
    }

    /// Abandon the instruction when `cond` is non-zero
    pub fn abort_if(&mut self, cond: Value) {
        let end = self.end;
        self.b.branch_if(cond, end);
    }

    /// Abandon the instruction when `cond` is zero
    pub fn abort_if_zero(&mut self, cond: Value) {
        let end = self.end;
        self.b.branch_if_zero(cond, end);
    }

    /// Abandon the instruction when a data access fault is pending
    pub fn abort_on_data_fault(&mut self) {
        let ex = self.b.load(Slot::Ex);
        let fault = self.b.bin_imm(BinOp::And, ex, crate::state::ex::DATA_FAULT);
        self.abort_if(fault);
    }

    /// Raise `exception` and end the instruction
    pub fn raise(&mut self, exception: Exception) {
        self.b.call_void(Helper::Raise(exception), Vec::new());
        let end = self.end;
        self.b.jump(end);
    }

    /// Raise `unavailable` unless `bit` is set in MSR
    pub fn require_msr(&mut self, bit: u64, unavailable: Exception) {
        let ok = self.b.new_label();
        let msr = self.b.load(Slot::Msr);
        let enabled = self.b.bin_imm(BinOp::And, msr, bit);
        self.b.branch_if(enabled, ok);
        self.raise(unavailable);
        self.b.bind(ok);
    }

    // Register shorthands

    pub fn gpr(&mut self, index: usize) -> Value {
        self.b.load(Slot::gpr(index))
    }

    pub fn set_gpr(&mut self, index: usize, value: Value) {
        self.b.store(Slot::gpr(index), value);
    }

    /// `(ra|0)`: zero for r0, the register otherwise
    pub fn gpr_or_zero(&mut self, index: usize) -> Value {
        if index == 0 {
            self.b.konst(0)
        } else {
            self.gpr(index)
        }
    }

    pub fn fpr(&mut self, index: usize) -> Value {
        self.b.load(Slot::fpr(index))
    }

    pub fn set_fpr(&mut self, index: usize, value: Value) {
        self.b.store(Slot::fpr(index), value);
    }

    pub fn vr(&mut self, index: usize) -> Value {
        self.b.load(Slot::vr(index))
    }

    pub fn set_vr(&mut self, index: usize, value: Value) {
        self.b.store(Slot::vr(index), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_block_is_rejected() {
        let builder = BlockBuilder::new(0x1000);
        assert_eq!(builder.finish().unwrap_err(), JitError::EmptyBlock(0x1000));
    }

    #[test]
    fn test_unbound_label_is_rejected() {
        let mut builder = BlockBuilder::new(0);
        builder.emit_instruction(0, Instruction(0x6000_0000), false, |ctx, _| {
            let dangling = ctx.b.new_label();
            ctx.b.jump(dangling);
        });
        assert!(matches!(builder.finish(), Err(JitError::UnboundLabel(_))));
    }

    #[test]
    fn test_instruction_prologue_sets_next_address() {
        let mut builder = BlockBuilder::new(0x2000);
        builder.emit_instruction(0x2000, Instruction(0x6000_0000), true, |_, _| {});
        let block = builder.finish().unwrap();

        assert_eq!(block.instructions, 1);
        assert!(block.ops.iter().any(|op| matches!(op, HostOp::Const { imm: 0x2004, .. })));
        assert!(block
            .ops
            .iter()
            .any(|op| matches!(op, HostOp::Store { slot: Slot::Nia, .. })));
        assert_eq!(block.ops.last(), Some(&HostOp::Exit));
    }
}
