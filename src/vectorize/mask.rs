//! Lane-activity mask generation.
//!
//! Masks are built *in the scalar IR*, before widening: a mask is an ordinary
//! boolean SSA value that is exact per-lane reachability once widened. The
//! entry block's mask is the constant `true`; an edge mask narrows the source
//! block's mask by the branch condition; a join's mask is the union of its
//! incoming edge masks; and each loop header carries an explicit `activemask`
//! phi, so the live-in mask is re-derived every iteration (lanes that left
//! the loop stay masked off).

use crate::builder::Builder;
use crate::cfg::{Cfg, LoopInfo};
use crate::vectorize::VectorizeError;
use crate::{Block, Context, FuncDefBody, Inst, Terminator, Value};
use rustc_hash::{FxHashMap, FxHashSet};

pub struct MaskBuilder<'a> {
    cx: &'a Context,
    cfg: &'a Cfg,

    block_masks: FxHashMap<Block, Value>,
    edge_masks: FxHashMap<(Block, Block), Value>,

    /// The `activemask` phis (one per loop header), so other passes can tell
    /// them apart from source-level phis.
    loop_mask_phis: FxHashSet<Inst>,
}

impl<'a> MaskBuilder<'a> {
    /// Seeds the entry mask and materializes every loop's `activemask` phi
    /// (all headers are seeded before any edge mask is computed, so that
    /// mask chains crossing a loop resolve to the phi, i.e. the recurrence,
    /// rather than re-deriving a stale pre-loop mask).
    pub fn new(
        cx: &'a Context,
        body: &mut FuncDefBody,
        cfg: &'a Cfg,
        loops: &'a [LoopInfo],
    ) -> Result<Self, VectorizeError> {
        let mut this = Self {
            cx,
            cfg,
            block_masks: FxHashMap::default(),
            edge_masks: FxHashMap::default(),
            loop_mask_phis: FxHashSet::default(),
        };
        this.block_masks.insert(body.entry, Value::Const(cx.const_bool(true)));

        let undef = Value::Const(cx.const_undef(cx.type_bool()));
        let mut phis = Vec::with_capacity(loops.len());
        for l in loops {
            let mut b = Builder::new(cx, body, l.header);
            let phi = b.insert_phi(
                l.header,
                [(l.pre_header, undef), (l.latch, undef)],
                cx.type_bool(),
            );
            let phi_inst = match phi {
                Value::Inst(inst) => inst,
                _ => unreachable!(),
            };
            this.loop_mask_phis.insert(phi_inst);
            this.block_masks.insert(l.header, phi);
            phis.push((l, phi_inst));
        }
        for (l, phi_inst) in phis {
            let from_pre = this.edge_mask(body, l.header, l.pre_header)?;
            let from_latch = this.edge_mask(body, l.header, l.latch)?;
            body.insts[phi_inst].inputs[0] = from_pre;
            body.insts[phi_inst].inputs[1] = from_latch;
        }
        Ok(this)
    }

    pub fn is_loop_mask_phi(&self, inst: Inst) -> bool {
        self.loop_mask_phis.contains(&inst)
    }

    /// The mask of lanes that reach `block` at all, memoized.
    pub fn block_mask(
        &mut self,
        body: &mut FuncDefBody,
        block: Block,
    ) -> Result<Value, VectorizeError> {
        if let Some(&mask) = self.block_masks.get(&block) {
            return Ok(mask);
        }

        let preds = self.cfg.preds(block);
        let mask = match preds {
            [] => {
                // Unreachable blocks keep an all-false mask (nothing gets there).
                Value::Const(self.cx.const_bool(false))
            }
            &[pred] => self.edge_mask(body, block, pred)?,
            _ => {
                // Union of incoming edges, folded in predecessor order and
                // materialized just before the first non-phi instruction.
                let preds: Vec<Block> = preds.to_vec();
                let mut edges = Vec::with_capacity(preds.len());
                for pred in preds {
                    edges.push(self.edge_mask(body, block, pred)?);
                }
                let mut b = Builder::new(self.cx, body, block);
                b.set_position_after_phis(block);
                let mut mask = edges[0];
                for &edge in &edges[1..] {
                    mask = b.or_bool(mask, edge);
                }
                mask
            }
        };
        self.block_masks.insert(block, mask);
        Ok(mask)
    }

    /// The mask of lanes that travel the `pred -> block` edge, memoized.
    ///
    /// For a conditional branch this is the source block's mask narrowed by
    /// the condition (or its complement, on the `else` edge); the narrowing
    /// is what keeps lanes that already left a loop masked off across the
    /// latch -> header edge.
    pub fn edge_mask(
        &mut self,
        body: &mut FuncDefBody,
        block: Block,
        pred: Block,
    ) -> Result<Value, VectorizeError> {
        if let Some(&mask) = self.edge_masks.get(&(block, pred)) {
            return Ok(mask);
        }

        let mask = match body.blocks[pred].terminator.clone() {
            Terminator::Branch { .. } => self.block_mask(body, pred)?,
            Terminator::CondBranch { cond, on_true, on_false } => {
                let pred_mask = self.block_mask(body, pred)?;
                let mut b = Builder::new(self.cx, body, pred);
                let part = if block == on_true {
                    cond
                } else {
                    debug_assert!(block == on_false);
                    b.not_bool(cond)
                };
                b.and_bool(pred_mask, part)
            }
            Terminator::Return(_) | Terminator::Unreachable => {
                return Err(VectorizeError::UnsupportedTerminator);
            }
        };
        self.edge_masks.insert((block, pred), mask);
        Ok(mask)
    }

    /// Force-compute the masks of `needed` blocks (beyond whatever predication
    /// already materialized) and return the whole table; widening consumes
    /// this *after* predication has restructured the control flow (the masks
    /// keep their original-reachability meaning). Only blocks that actually
    /// consume a mask are forced, so no mask instructions are emitted into
    /// positions nothing dominates.
    pub fn into_block_masks(
        mut self,
        body: &mut FuncDefBody,
        needed: &[Block],
    ) -> Result<FxHashMap<Block, Value>, VectorizeError> {
        for &block in needed {
            self.block_mask(body, block)?;
        }
        Ok(self.block_masks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::LoopFinder;
    use crate::{BinOp, CmpOp, Context, FuncDefBody, InstKind, Terminator, Value};

    /// entry -> {then | else} -> merge, on a varying-shaped condition value.
    fn diamond(cx: &Context) -> (FuncDefBody, Block, Block, Block, Value) {
        let mut body = FuncDefBody::new();
        let then_b = body.add_block();
        let else_b = body.add_block();
        let merge = body.add_block();
        let entry = body.entry;

        let mut b = crate::builder::Builder::new(cx, &mut body, entry);
        let cond = b.compare(CmpOp::Slt, Value::Param { idx: 0 }, Value::Const(cx.const_i32(3)));

        body.blocks[entry].terminator =
            Terminator::CondBranch { cond, on_true: then_b, on_false: else_b };
        body.blocks[then_b].terminator = Terminator::Branch { target: merge };
        body.blocks[else_b].terminator = Terminator::Branch { target: merge };
        body.blocks[merge].terminator = Terminator::Return(None);
        (body, then_b, else_b, merge, cond)
    }

    #[test]
    fn diamond_edge_masks() {
        let cx = Context::new();
        let (mut body, then_b, else_b, merge, cond) = diamond(&cx);
        let cfg = Cfg::of(&body);
        let mut masks = MaskBuilder::new(&cx, &mut body, &cfg, &[]).unwrap();
        let entry = body.entry;

        // Then-edge: the raw condition (entry mask is constant true).
        let em_then = masks.edge_mask(&mut body, then_b, entry).unwrap();
        assert_eq!(em_then, cond);

        // Else-edge: its complement (a xor-true instruction).
        let em_else = masks.edge_mask(&mut body, else_b, entry).unwrap();
        let else_inst = match em_else {
            Value::Inst(inst) => inst,
            _ => panic!("else edge mask should be an instruction"),
        };
        assert_eq!(body.insts[else_inst].kind, InstKind::Binary(BinOp::Xor));
        assert_eq!(body.insts[else_inst].inputs[0], cond);

        // Merge mask: union of both edges.
        let bm = masks.block_mask(&mut body, merge).unwrap();
        let or_inst = match bm {
            Value::Inst(inst) => inst,
            _ => panic!("merge mask should be an instruction"),
        };
        assert_eq!(body.insts[or_inst].kind, InstKind::Binary(BinOp::Or));
        // Materialized inside the merge block.
        assert!(body.blocks[merge].insts.contains(&or_inst));
    }

    #[test]
    fn entry_mask_is_const_true() {
        let cx = Context::new();
        let (mut body, ..) = diamond(&cx);
        let cfg = Cfg::of(&body);
        let mut masks = MaskBuilder::new(&cx, &mut body, &cfg, &[]).unwrap();
        let entry = body.entry;
        let m = masks.block_mask(&mut body, entry).unwrap();
        assert!(cx.is_const_true(m));
    }

    #[test]
    fn loop_header_gets_activemask_phi() {
        let cx = Context::new();
        let mut body = FuncDefBody::new();
        let header = body.add_block();
        let exit = body.add_block();
        let entry = body.entry;

        let mut b = crate::builder::Builder::new(&cx, &mut body, header);
        let cond =
            b.compare(CmpOp::Slt, Value::Param { idx: 0 }, Value::Const(cx.const_i32(10)));

        body.blocks[entry].terminator = Terminator::Branch { target: header };
        body.blocks[header].terminator =
            Terminator::CondBranch { cond, on_true: header, on_false: exit };
        body.blocks[exit].terminator = Terminator::Return(None);

        let cfg = Cfg::of(&body);
        let loops = LoopFinder::new(&body, &cfg).find().unwrap();
        let mut masks = MaskBuilder::new(&cx, &mut body, &cfg, &loops).unwrap();

        // Header mask is the phi itself.
        let hm = masks.block_mask(&mut body, header).unwrap();
        let phi = match hm {
            Value::Inst(inst) => inst,
            _ => panic!("header mask should be the activemask phi"),
        };
        assert!(masks.is_loop_mask_phi(phi));
        assert!(body.insts[phi].is_phi());
        assert_eq!(body.blocks[header].insts[0], phi);

        // Latch incoming: the continue condition narrowed by the header mask
        // (the self-loop's latch is the header).
        let latch_in = body.insts[phi].inputs[1];
        let and_inst = match latch_in {
            Value::Inst(inst) => inst,
            _ => panic!("latch edge mask should be an instruction"),
        };
        assert_eq!(body.insts[and_inst].kind, InstKind::Binary(BinOp::And));
        assert_eq!(&body.insts[and_inst].inputs[..], &[hm, cond]);
    }
}
