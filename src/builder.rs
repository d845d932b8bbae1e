//! Positioned instruction emission into a [`FuncDefBody`].

use crate::{BinOp, Block, CmpOp, Context, FuncDefBody, Inst, InstDef, InstKind, Type, Value};
use smallvec::SmallVec;

/// Where newly emitted instructions land, within their block.
#[derive(Copy, Clone)]
enum InsertPos {
    /// Append at the end of the block (just before its terminator).
    End,

    /// At a fixed index (each emission advances past itself).
    At(usize),
}

/// Emission cursor over one function body: every `emit_*` call defines a new
/// instruction at the cursor and returns its [`Value`].
pub struct Builder<'a> {
    pub cx: &'a Context,
    body: &'a mut FuncDefBody,
    block: Block,
    pos: InsertPos,
}

impl<'a> Builder<'a> {
    pub fn new(cx: &'a Context, body: &'a mut FuncDefBody, block: Block) -> Self {
        Self { cx, body, block, pos: InsertPos::End }
    }

    pub fn block(&self) -> Block {
        self.block
    }

    /// Move the cursor to the end of `block`.
    pub fn set_position_end(&mut self, block: Block) {
        self.block = block;
        self.pos = InsertPos::End;
    }

    /// Move the cursor to just after the phi run of `block` (the "first
    /// non-header instruction" position).
    pub fn set_position_after_phis(&mut self, block: Block) {
        let idx = self.body.num_phis(block);
        self.block = block;
        self.pos = InsertPos::At(idx);
    }

    pub fn emit(
        &mut self,
        kind: InstKind,
        inputs: impl IntoIterator<Item = Value>,
        output_type: Option<Type>,
    ) -> Value {
        let inst = self.emit_inst(InstDef {
            kind,
            inputs: inputs.into_iter().collect(),
            output_type,
        });
        Value::Inst(inst)
    }

    pub fn emit_inst(&mut self, def: InstDef) -> Inst {
        let inst = self.body.insts.define(def);
        let insts = &mut self.body.blocks[self.block].insts;
        match &mut self.pos {
            InsertPos::End => insts.push(inst),
            InsertPos::At(idx) => {
                insts.insert(*idx, inst);
                *idx += 1;
            }
        }
        inst
    }

    /// Insert a phi at the very start of `block` (joining the existing phi
    /// run), without moving the cursor.
    pub fn insert_phi(
        &mut self,
        block: Block,
        incoming: impl IntoIterator<Item = (Block, Value)>,
        ty: Type,
    ) -> Value {
        let (preds, inputs): (SmallVec<[Block; 2]>, SmallVec<[Value; 2]>) =
            incoming.into_iter().unzip();
        let inst = self.body.insts.define(InstDef {
            kind: InstKind::Phi { preds },
            inputs,
            output_type: Some(ty),
        });
        self.body.blocks[block].insts.insert(0, inst);
        if self.block == block {
            if let InsertPos::At(idx) = &mut self.pos {
                *idx += 1;
            }
        }
        Value::Inst(inst)
    }

    pub fn binary(&mut self, op: BinOp, ty: Type, a: Value, b: Value) -> Value {
        self.emit(InstKind::Binary(op), [a, b], Some(ty))
    }

    pub fn compare(&mut self, op: CmpOp, a: Value, b: Value) -> Value {
        self.emit(InstKind::Compare(op), [a, b], Some(self.cx.type_bool()))
    }

    pub fn select(&mut self, ty: Type, cond: Value, on_true: Value, on_false: Value) -> Value {
        self.emit(InstKind::Select, [cond, on_true, on_false], Some(ty))
    }

    /// Boolean AND, with the trivial `true ∧ x` cases folded away (block mask
    /// chains start from the constant-true entry mask).
    pub fn and_bool(&mut self, a: Value, b: Value) -> Value {
        if self.cx.is_const_true(a) {
            return b;
        }
        if self.cx.is_const_true(b) {
            return a;
        }
        self.binary(BinOp::And, self.cx.type_bool(), a, b)
    }

    pub fn or_bool(&mut self, a: Value, b: Value) -> Value {
        self.binary(BinOp::Or, self.cx.type_bool(), a, b)
    }

    /// Boolean negation, encoded as `x ⊕ true` (which widens to a lane-mask
    /// complement).
    pub fn not_bool(&mut self, v: Value) -> Value {
        let t = Value::Const(self.cx.const_bool(true));
        self.binary(BinOp::Xor, self.cx.type_bool(), v, t)
    }
}
