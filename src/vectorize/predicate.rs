//! Predication: replacing divergent control-flow merges with mask-selected
//! values, so the divergent branches themselves can be dropped.
//!
//! Supported divergent shapes (anything else is a hard error, per the "refuse
//! to guess" policy):
//! * `if`/`else` diamonds and `if`-only triangles whose arms are single
//!   blocks (or empty edges) re-converging at one merge block - these are
//!   flattened: both arms execute in sequence, merge phis become left-folds
//!   of [`Select`](crate::InstKind::Select)s over edge masks;
//! * single-latch/single-exit loops - these keep their back edge; the
//!   continue condition is narrowed to "lanes still active", and loop-carried
//!   phis have their latch input predicated so inactive lanes hold their
//!   exit-iteration values.

use crate::builder::Builder;
use crate::cfg::{self, Cfg, LoopInfo};
use crate::uniformity::UniformityAnalysis;
use crate::vectorize::{VectorizeError, mask::MaskBuilder};
use crate::{Block, Context, FuncDefBody, Inst, InstKind, Terminator, Value};
use smallvec::SmallVec;

/// A phi that must be rewritten into a select fold: it merges values along
/// edges picked by a non-uniform condition, and it is not the re-convergence
/// representation of a loop (loop-header phis must stay phis - folding a
/// loop-carried value at its own header would not even be SSA).
pub fn is_selection_phi(
    uni: &mut UniformityAnalysis<'_>,
    body: &FuncDefBody,
    phi: Inst,
    owning_block_is_loop_header: bool,
) -> bool {
    if owning_block_is_loop_header {
        return false;
    }
    let preds: SmallVec<[Block; 2]> = match &body.insts[phi].kind {
        InstKind::Phi { preds } => preds.clone(),
        _ => return false,
    };
    uni.is_divergent(body, &preds) && !uni.is_uniform(body, Value::Inst(phi))
}

/// Predicate `body` in place: strengthen loop continue conditions, predicate
/// loop-carried phis, then flatten divergent acyclic regions.
///
/// On success the only remaining divergent control flow is loop back/exit
/// edges (which widening turns into "any lane still active" branches).
pub fn predicate_function(
    cx: &Context,
    body: &mut FuncDefBody,
    cfg: &Cfg,
    loops: &[LoopInfo],
    uni: &mut UniformityAnalysis<'_>,
    masks: &mut MaskBuilder<'_>,
) -> Result<(), VectorizeError> {
    for l in loops {
        predicate_loop(cx, body, l, uni, masks)?;
    }

    let rpo: Vec<Block> = cfg.rev_post_order().collect();
    for &block in &rpo {
        flatten_divergent_branch(cx, body, cfg, loops, uni, masks, block)?;
    }

    cleanup_and_validate(cx, body, cfg, loops, uni, masks)
}

fn predicate_loop(
    cx: &Context,
    body: &mut FuncDefBody,
    l: &LoopInfo,
    uni: &mut UniformityAnalysis<'_>,
    masks: &mut MaskBuilder<'_>,
) -> Result<(), VectorizeError> {
    let (cond, on_true, on_false) = match body.blocks[l.exiting].terminator {
        Terminator::CondBranch { cond, on_true, on_false } => (cond, on_true, on_false),
        _ => return Err(VectorizeError::UnsupportedTerminator),
    };
    if uni.is_uniform(body, cond) {
        // All lanes agree on the trip count; the loop stays a plain scalar
        // loop (its activemask phi degenerates to all-true).
        return Ok(());
    }

    let (stay, leave) =
        if l.contains(on_true) { (on_true, on_false) } else { (on_false, on_true) };

    // "Continue" becomes "any lane that reached the exiting block still wants
    // to continue"; this is exactly the in-loop edge mask, and (via the
    // activemask recurrence) what keeps already-exited lanes retired.
    let continue_mask = masks.edge_mask(body, stay, l.exiting)?;
    body.blocks[l.exiting].terminator =
        Terminator::CondBranch { cond: continue_mask, on_true: stay, on_false: leave };

    // Loop-carried phis: the latch input only commits for lanes that take the
    // back edge (a lane that exits keeps the value the phi had on its last
    // entry, which is what the scalar program's phi would have seen).
    let back_edge_mask = masks.edge_mask(body, l.header, l.latch)?;
    let header_phis: Vec<Inst> = body.blocks[l.header]
        .insts
        .iter()
        .copied()
        .take_while(|&inst| body.insts[inst].is_phi())
        .collect();
    for phi in header_phis {
        if masks.is_loop_mask_phi(phi) {
            continue;
        }
        let phi_value = Value::Inst(phi);
        let (latch_idx, latch_in) = body.insts[phi]
            .phi_incoming()
            .enumerate()
            .find(|(_, (pred, _))| *pred == l.latch)
            .map(|(i, (_, v))| (i, v))
            .ok_or(VectorizeError::UnsupportedPhiShape)?;
        if latch_in == phi_value {
            continue;
        }
        let ty = body.insts[phi].output_type.expect("phis always produce a value");
        let mut b = Builder::new(cx, body, l.latch);
        let guarded = b.select(ty, back_edge_mask, latch_in, phi_value);
        body.insts[phi].inputs[latch_idx] = guarded;
    }

    accumulate_exit_values(cx, body, l, masks)
}

/// Loop-closed dataflow: a value defined inside a divergent loop and used
/// after it must carry, per lane, the value of that lane's *last active*
/// iteration - not whatever the final (other lanes') iteration recomputed.
/// Each such value gets an accumulator phi updated under the latch's mask,
/// and all outside uses are redirected to the accumulated copy.
fn accumulate_exit_values(
    cx: &Context,
    body: &mut FuncDefBody,
    l: &LoopInfo,
    masks: &mut MaskBuilder<'_>,
) -> Result<(), VectorizeError> {
    let mut defined_in: rustc_hash::FxHashMap<Inst, Block> = rustc_hash::FxHashMap::default();
    for &block in &l.body {
        for &inst in &body.blocks[block].insts {
            defined_in.insert(inst, block);
        }
    }
    let header_phis: rustc_hash::FxHashSet<Inst> =
        body.blocks[l.header].insts.iter().copied().take_while(|&i| body.insts[i].is_phi()).collect();

    // Values defined in the loop (excluding header phis, whose latch inputs
    // are already guarded) with at least one use outside of it.
    let mut escaping: Vec<Value> = Vec::new();
    let outside: Vec<Block> =
        body.blocks.keys().filter(|b| !l.body.contains(b)).collect();
    for &block in &outside {
        let mut note = |v: Value| {
            if let Value::Inst(inst) = v {
                if defined_in.contains_key(&inst)
                    && !header_phis.contains(&inst)
                    && !escaping.contains(&v)
                {
                    escaping.push(v);
                }
            }
        };
        for &inst in &body.blocks[block].insts {
            for &input in &body.insts[inst].inputs {
                note(input);
            }
        }
        match body.blocks[block].terminator {
            Terminator::CondBranch { cond, .. } => note(cond),
            Terminator::Return(Some(v)) => note(v),
            _ => {}
        }
    }
    if escaping.is_empty() {
        return Ok(());
    }

    // The accumulator select must postdominate every in-loop definition of an
    // escaping value; the single supported placement is the latch, which only
    // works when exiting there too.
    if l.exiting != l.latch {
        return Err(VectorizeError::UnsupportedBranchShape);
    }

    let latch_mask = masks.block_mask(body, l.latch)?;
    for v in escaping {
        let ty = body
            .value_type(cx, &[], v)
            .expect("escaping values always have a type");
        let undef = Value::Const(cx.const_undef(ty));
        let mut b = Builder::new(cx, body, l.latch);
        let acc_phi = b.insert_phi(l.header, [(l.pre_header, undef), (l.latch, undef)], ty);
        let acc_next = b.select(ty, latch_mask, v, acc_phi);
        let phi_inst = match acc_phi {
            Value::Inst(inst) => inst,
            _ => unreachable!(),
        };
        body.insts[phi_inst].inputs[1] = acc_next;

        for &block in &outside {
            for i in 0..body.blocks[block].insts.len() {
                let inst = body.blocks[block].insts[i];
                for input in &mut body.insts[inst].inputs {
                    if *input == v {
                        *input = acc_next;
                    }
                }
            }
            match &mut body.blocks[block].terminator {
                Terminator::CondBranch { cond, .. } if *cond == v => *cond = acc_next,
                Terminator::Return(Some(r)) if *r == v => *r = acc_next,
                _ => {}
            }
        }
    }
    Ok(())
}

/// If `block` ends in a divergent conditional branch, flatten the `if`/`else`
/// region it controls (or fail on unsupported shapes).
fn flatten_divergent_branch(
    cx: &Context,
    body: &mut FuncDefBody,
    cfg: &Cfg,
    loops: &[LoopInfo],
    uni: &mut UniformityAnalysis<'_>,
    masks: &mut MaskBuilder<'_>,
    block: Block,
) -> Result<(), VectorizeError> {
    let (cond, on_true, on_false) = match body.blocks[block].terminator {
        Terminator::CondBranch { cond, on_true, on_false } => (cond, on_true, on_false),
        _ => return Ok(()),
    };
    if uni.is_uniform(body, cond) {
        return Ok(());
    }
    // Loop exit branches were already predicated; they keep real control flow.
    if cfg::is_loop_exiting(loops, block).is_some() {
        return Ok(());
    }
    if on_true == on_false {
        return Err(VectorizeError::UnsupportedBranchShape);
    }

    // A "plain arm" is a single block entered only from `block`, falling
    // through to a merge.
    let plain_arm = |body: &FuncDefBody, arm: Block| -> Option<Block> {
        match cfg.preds(arm) {
            &[pred] if pred == block => {}
            _ => return None,
        }
        match body.blocks[arm].terminator {
            Terminator::Branch { target } => Some(target),
            _ => None,
        }
    };

    // (execution order of the arms, merge block)
    let (arms, merge) = match (plain_arm(body, on_true), plain_arm(body, on_false)) {
        (Some(m1), Some(m2)) if m1 == m2 && m1 != on_true && m1 != on_false => {
            (vec![on_true, on_false], m1)
        }
        (Some(m), _) if m == on_false => (vec![on_true], on_false),
        (_, Some(m)) if m == on_true => (vec![on_false], on_true),
        _ => return Err(VectorizeError::UnsupportedBranchShape),
    };

    // Masks must be snapshotted before the branch disappears: they describe
    // *original* reachability.
    masks.block_mask(body, block)?;
    for &arm in &arms {
        masks.block_mask(body, arm)?;
    }
    masks.block_mask(body, merge)?;

    // Fold every merge phi into selects: once flattened, the merge has a
    // single predecessor and cannot keep any phi (even ones whose incoming
    // values happen to agree).
    let merge_phis: Vec<Inst> = body.blocks[merge]
        .insts
        .iter()
        .copied()
        .take_while(|&inst| body.insts[inst].is_phi())
        .collect();
    for phi in merge_phis {
        let incoming: SmallVec<[(Block, Value); 2]> = body.insts[phi].phi_incoming().collect();
        if incoming.len() != 2 {
            return Err(VectorizeError::UnsupportedPhiShape);
        }
        for &(pred, _) in &incoming {
            if pred != block && !arms.contains(&pred) {
                return Err(VectorizeError::UnsupportedBranchShape);
            }
        }

        // Left-fold: first incoming value seeds the fold, every further one
        // is selected in by its edge mask.
        let ty = body.insts[phi].output_type.expect("phis always produce a value");
        let mut fold = incoming[0].1;
        for &(pred, value) in &incoming[1..] {
            let edge = masks.edge_mask(body, merge, pred)?;
            let mut b = Builder::new(cx, body, merge);
            b.set_position_after_phis(merge);
            fold = b.select(ty, edge, value, fold);
        }
        body.replace_all_uses(Value::Inst(phi), fold);
        body.detach_inst(merge, phi);
    }

    // Drop the divergent branch: chain `block`, the arms, and the merge.
    let mut chain = vec![block];
    chain.extend(&arms);
    for pair in chain.windows(2) {
        body.blocks[pair[0]].terminator = Terminator::Branch { target: pair[1] };
    }
    body.blocks[*chain.last().unwrap()].terminator = Terminator::Branch { target: merge };
    Ok(())
}

/// Eliminate trivial (single-incoming) phis, then make sure no divergent
/// selection phi survived - any leftover means a shape the flattener cannot
/// express, and must fail rather than miscompile.
fn cleanup_and_validate(
    _cx: &Context,
    body: &mut FuncDefBody,
    _cfg: &Cfg,
    loops: &[LoopInfo],
    uni: &mut UniformityAnalysis<'_>,
    masks: &MaskBuilder<'_>,
) -> Result<(), VectorizeError> {
    let blocks: Vec<Block> = body.blocks.keys().collect();
    for &block in &blocks {
        let phis: Vec<Inst> = body.blocks[block]
            .insts
            .iter()
            .copied()
            .take_while(|&inst| body.insts[inst].is_phi())
            .collect();
        for phi in phis {
            if body.insts[phi].inputs.len() == 1 {
                let replacement = body.insts[phi].inputs[0];
                body.replace_all_uses(Value::Inst(phi), replacement);
                body.detach_inst(block, phi);
                continue;
            }
            let is_header = cfg::loop_with_header(loops, block).is_some()
                || masks.is_loop_mask_phi(phi);
            if is_selection_phi(uni, body, phi, is_header) {
                return Err(VectorizeError::UnsupportedPhiShape);
            }
        }
    }
    Ok(())
}
