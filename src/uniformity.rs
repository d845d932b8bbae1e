//! Uniformity analysis: classifying values as uniform (identical across all
//! lanes), varying, or "varying offset" (uniform base address + varying index).
//!
//! Pure and memoized; nothing here mutates the IR. Each function gets a fresh
//! analysis, because classifications depend on the function's own parameter
//! annotations (and receiver), not just on its instructions.

use crate::cfg::{self, Cfg};
use crate::{
    Block, Context, Func, FuncDecl, FuncDefBody, FuncEffects, FuncParam, InstKind, Terminator,
    Value,
};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum UniformityKind {
    /// In-progress sentinel for cycle breaking (a value whose classification
    /// is being computed, reached again through a phi cycle). Treated the same
    /// as `Varying` by every consumer.
    //
    // FIXME(eddyb) values classified *while* a cycle was unresolved keep their
    // conservative caching even after the owning phi resolves; re-running a
    // fixed-point iteration could upgrade some of them to `Uniform`
    // (see `cycle_participants_stay_conservative`).
    Unknown,

    Varying,

    /// Value is the same across all lanes.
    Uniform,

    /// Uniform pointer offset by a varying value, resulting from an
    /// array/pointer address computation chain.
    VaryingOffset,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct UniformityInfo {
    pub kind: UniformityKind,

    /// Lane increment step if the value contains sequential values, else 0.
    pub stride: i32,
}

impl UniformityInfo {
    pub fn is_sequential(&self) -> bool {
        self.kind == UniformityKind::Varying && self.stride != 0
    }
}

impl From<UniformityKind> for UniformityInfo {
    fn from(kind: UniformityKind) -> Self {
        Self { kind, stride: 0 }
    }
}

/// Per-function uniformity classification, queried lazily.
pub struct UniformityAnalysis<'a> {
    cx: &'a Context,

    params: SmallVec<[FuncParam; 2]>,
    is_instance: bool,

    /// Effect summaries for every callee in the module (externally provided).
    callee_effects: &'a FxHashMap<Func, FuncEffects>,

    cache: FxHashMap<Value, UniformityInfo>,
}

impl<'a> UniformityAnalysis<'a> {
    pub fn new(
        cx: &'a Context,
        decl: &FuncDecl,
        callee_effects: &'a FxHashMap<Func, FuncEffects>,
    ) -> Self {
        Self {
            cx,
            params: decl.params.clone(),
            is_instance: decl.is_instance,
            callee_effects,
            cache: FxHashMap::default(),
        }
    }

    /// Whether parameter `idx` of `decl` is uniform: the receiver of an
    /// instance-style function, or any parameter annotated uniform.
    pub fn param_is_uniform(decl: &FuncDecl, idx: usize) -> bool {
        (decl.is_instance && idx == 0) || decl.params[idx].uniform
    }

    pub fn is_uniform(&mut self, body: &FuncDefBody, v: Value) -> bool {
        self.info(body, v).kind == UniformityKind::Uniform
    }

    pub fn info(&mut self, body: &FuncDefBody, v: Value) -> UniformityInfo {
        match v {
            // Constants and type-default/undefined values are per-definition
            // identical in every lane.
            Value::Const(_) => UniformityKind::Uniform.into(),

            Value::Param { idx } => {
                let uniform = (self.is_instance && idx == 0)
                    || self.params.get(idx as usize).is_some_and(|p| p.uniform);
                if uniform { UniformityKind::Uniform } else { UniformityKind::Varying }.into()
            }

            Value::Inst(inst) => {
                if let Some(&info) = self.cache.get(&v) {
                    return info;
                }
                // Provisional in-progress marking, so phi cycles terminate
                // (and resolve conservatively).
                self.cache.insert(v, UniformityKind::Unknown.into());
                let info = self.compute(body, inst).into();
                self.cache.insert(v, info);
                info
            }
        }
    }

    fn compute(&mut self, body: &FuncDefBody, inst: crate::Inst) -> UniformityKind {
        let def = &body.insts[inst];

        match &def.kind {
            InstKind::Call(callee) => {
                let effects = self.callee_effects.get(callee).copied().unwrap_or_default();
                if effects.may_only_throw_or_read_mem {
                    self.all_uniform(body, &def.inputs)
                } else {
                    UniformityKind::Varying
                }
            }

            InstKind::PtrOffset | InstKind::ArrayAddr { .. }
                if self.is_uniform(body, def.inputs[0]) =>
            {
                if self.is_uniform(body, def.inputs[1]) {
                    UniformityKind::Uniform
                } else {
                    UniformityKind::VaryingOffset
                }
            }

            InstKind::FieldAddr { .. } if self.is_uniform(body, def.inputs[0]) => {
                UniformityKind::Uniform
            }

            InstKind::Phi { preds } => {
                if self.is_divergent(body, preds) {
                    return UniformityKind::Varying;
                }
                self.all_uniform(body, &def.inputs)
            }

            kind if !kind.has_side_effects() || matches!(kind, InstKind::Load) => {
                self.all_uniform(body, &def.inputs)
            }

            _ => UniformityKind::Varying,
        }
    }

    fn all_uniform(&mut self, body: &FuncDefBody, values: &[Value]) -> UniformityKind {
        for &v in values {
            if !self.is_uniform(body, v) {
                return UniformityKind::Varying;
            }
        }
        UniformityKind::Uniform
    }

    /// Whether a block with the given predecessors is divergent: reachable
    /// through an edge whose selection depends on a non-uniform condition
    /// (or through a terminator that isn't a simple branch at all).
    pub fn is_divergent(&mut self, body: &FuncDefBody, preds: &[Block]) -> bool {
        preds.iter().any(|&pred| match &body.blocks[pred].terminator {
            Terminator::Branch { .. } => false,
            Terminator::CondBranch { cond, .. } => !self.is_uniform(body, *cond),
            _ => !cfg::terminator_is_simple_branch(&body.blocks[pred].terminator),
        })
    }

    /// [`Self::is_divergent`], looking the predecessors up in `cfg`.
    pub fn is_divergent_block(&mut self, body: &FuncDefBody, cfg: &Cfg, block: Block) -> bool {
        let preds: SmallVec<[Block; 2]> = cfg.preds(block).iter().copied().collect();
        self.is_divergent(body, &preds)
    }

    /// Decoration hook for the printer: classification as a short string.
    pub fn decoration(&mut self, body: &FuncDefBody, v: Value) -> &'static str {
        match self.info(body, v).kind {
            UniformityKind::Unknown => "unknown",
            UniformityKind::Varying => "varying",
            UniformityKind::Uniform => "uniform",
            UniformityKind::VaryingOffset => "varying-offset",
        }
    }

    // HACK(eddyb) keep `cx` live even though only a couple of rules need it -
    // everything downstream constructs the analysis with it regardless.
    pub fn cx(&self) -> &'a Context {
        self.cx
    }
}
