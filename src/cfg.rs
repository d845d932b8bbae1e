//! Control-flow graph (CFG) abstractions and utilities.

use crate::{Block, FuncDefBody, FxIndexSet, Terminator};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

/// Computed CFG information for one [`FuncDefBody`]: predecessor edges and a
/// reverse post-order (RPO) over the reachable blocks.
///
/// RPO iteration over a CFG provides certain guarantees, most importantly
/// that dominators are visited before the entire subgraph they dominate.
pub struct Cfg {
    preds: FxHashMap<Block, SmallVec<[Block; 2]>>,
    rpo: Vec<Block>,
}

impl Cfg {
    pub fn of(body: &FuncDefBody) -> Self {
        let mut post_order = Vec::with_capacity(body.blocks.len());
        let mut visited = FxHashSet::default();
        post_order_visit(body, body.entry, &mut visited, &mut post_order);

        let mut preds: FxHashMap<Block, SmallVec<[Block; 2]>> = FxHashMap::default();
        // NOTE(eddyb) predecessor order is RPO of the predecessors themselves,
        // making everything downstream (mask folds, phi argument order checks)
        // deterministic without any extra sorting.
        for &block in post_order.iter().rev() {
            for succ in body.blocks[block].terminator.successors() {
                preds.entry(succ).or_default().push(block);
            }
        }

        post_order.reverse();
        Self { preds, rpo: post_order }
    }

    /// Reachable blocks in reverse post-order (the entry block comes first).
    pub fn rev_post_order(&self) -> impl DoubleEndedIterator<Item = Block> + '_ {
        self.rpo.iter().copied()
    }

    pub fn preds(&self, block: Block) -> &[Block] {
        self.preds.get(&block).map_or(&[], |p| &p[..])
    }

    pub fn is_reachable(&self, block: Block) -> bool {
        block == self.rpo[0] || self.preds.contains_key(&block)
    }
}

fn post_order_visit(
    body: &FuncDefBody,
    block: Block,
    visited: &mut FxHashSet<Block>,
    post_order: &mut Vec<Block>,
) {
    if !visited.insert(block) {
        return;
    }
    for succ in body.blocks[block].terminator.successors() {
        post_order_visit(body, succ, visited, post_order);
    }
    post_order.push(block);
}

/// A structurally valid (vectorizable) natural loop: two-predecessor header,
/// single latch, single exiting block.
///
/// Anything looser (multiple latches, multiple exits, headers shared between
/// back edges) is rejected by [`LoopFinder`] via [`LoopShapeError`] - the
/// vectorizer refuses to guess a masking strategy for shapes it cannot prove
/// correct.
#[derive(Debug)]
pub struct LoopInfo {
    pub header: Block,

    /// The unique predecessor of `header` from outside the loop.
    pub pre_header: Block,

    /// The unique in-loop predecessor of `header` (source of the back edge).
    pub latch: Block,

    /// The unique block inside the loop with a successor outside of it.
    pub exiting: Block,

    /// All blocks of the loop, `header` included, in discovery order.
    pub body: FxIndexSet<Block>,
}

impl LoopInfo {
    pub fn contains(&self, block: Block) -> bool {
        self.body.contains(&block)
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum LoopShapeError {
    #[error("loop header must have exactly two predecessors (preheader and latch)")]
    HeaderPredCount,

    #[error("loops with multiple latches are not supported")]
    MultipleLatches,

    #[error("loops with multiple exiting blocks are not supported")]
    MultipleExits,

    #[error("irreducible control flow (loop entered through a non-header block)")]
    Irreducible,
}

/// Minimal natural-loop analysis: back edges are found on a depth-first walk
/// (an edge to a block still on the traversal path), and each back edge's
/// loop body is everything that reaches the latch without passing through the
/// header.
pub struct LoopFinder<'a> {
    body: &'a FuncDefBody,
    cfg: &'a Cfg,
}

impl<'a> LoopFinder<'a> {
    pub fn new(body: &'a FuncDefBody, cfg: &'a Cfg) -> Self {
        Self { body, cfg }
    }

    /// All loops of the function, outermost-first, each validated against the
    /// supported shape.
    pub fn find(&self) -> Result<Vec<LoopInfo>, LoopShapeError> {
        let mut back_edges = Vec::new();
        let mut visited = FxHashSet::default();
        let mut on_path = FxHashSet::default();
        self.back_edge_visit(self.body.entry, &mut visited, &mut on_path, &mut back_edges);

        // One loop per header; a second back edge into the same header would
        // mean multiple latches.
        let mut headers = FxHashSet::default();
        let mut loops = Vec::new();
        for (latch, header) in back_edges {
            if !headers.insert(header) {
                return Err(LoopShapeError::MultipleLatches);
            }
            loops.push(self.close_loop(header, latch)?);
        }
        Ok(loops)
    }

    fn back_edge_visit(
        &self,
        block: Block,
        visited: &mut FxHashSet<Block>,
        on_path: &mut FxHashSet<Block>,
        back_edges: &mut Vec<(Block, Block)>,
    ) {
        if !visited.insert(block) {
            return;
        }
        on_path.insert(block);
        for succ in self.body.blocks[block].terminator.successors() {
            if on_path.contains(&succ) {
                back_edges.push((block, succ));
            } else {
                self.back_edge_visit(succ, visited, on_path, back_edges);
            }
        }
        on_path.remove(&block);
    }

    fn close_loop(&self, header: Block, latch: Block) -> Result<LoopInfo, LoopShapeError> {
        let mut body = FxIndexSet::default();
        body.insert(header);
        body.insert(latch);
        let mut worklist = vec![latch];
        while let Some(block) = worklist.pop() {
            if block == header {
                continue;
            }
            for &pred in self.cfg.preds(block) {
                if body.insert(pred) {
                    worklist.push(pred);
                }
            }
        }

        let header_preds = self.cfg.preds(header);
        if header_preds.len() != 2 {
            return Err(LoopShapeError::HeaderPredCount);
        }
        let pre_header = *header_preds
            .iter()
            .find(|p| !body.contains(*p))
            .ok_or(LoopShapeError::HeaderPredCount)?;

        // A non-header loop block with an outside predecessor would be a
        // second entry into the cycle.
        for &block in &body {
            if block != header
                && self.cfg.preds(block).iter().any(|p| !body.contains(p))
            {
                return Err(LoopShapeError::Irreducible);
            }
        }

        let mut exiting = None;
        for &block in &body {
            let leaves =
                self.body.blocks[block].terminator.successors().iter().any(|s| !body.contains(s));
            if leaves {
                if exiting.replace(block).is_some() {
                    return Err(LoopShapeError::MultipleExits);
                }
            }
        }
        // A loop without an exiting block never terminates; treat it like a
        // multi-exit shape rather than inventing a mask story for it.
        let exiting = exiting.ok_or(LoopShapeError::MultipleExits)?;

        Ok(LoopInfo { header, pre_header, latch, exiting, body })
    }
}

/// Convenience query used by several passes: the loop (if any) whose header
/// is `block`.
pub fn loop_with_header(loops: &[LoopInfo], block: Block) -> Option<&LoopInfo> {
    loops.iter().find(|l| l.header == block)
}

/// Whether `block -> target` is a back edge of one of `loops`.
pub fn is_back_edge(loops: &[LoopInfo], block: Block, target: Block) -> bool {
    loops.iter().any(|l| l.latch == block && l.header == target)
}

/// Whether `block` is the exiting block of one of `loops`.
pub fn is_loop_exiting(loops: &[LoopInfo], block: Block) -> Option<&LoopInfo> {
    loops.iter().find(|l| l.exiting == block)
}

/// `Unreachable` terminators are tolerated only on unreachable blocks; any
/// reachable one (or a `Return` feeding a mask) is caught by the passes that
/// care, so this module stays purely structural.
pub fn terminator_is_simple_branch(term: &Terminator) -> bool {
    matches!(term, Terminator::Branch { .. } | Terminator::CondBranch { .. })
}
