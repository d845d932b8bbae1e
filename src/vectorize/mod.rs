//! SPMD-to-SIMD vectorization: masking, widening, and native lowering.
//!
//! The pipeline, per procedure (driven by [`Vectorizer`]):
//! 1. [`uniformity`](crate::uniformity) classification of every value,
//! 2. mask generation ([`mask::MaskBuilder`]) and predication
//!    ([`predicate`]): divergent `if`/`else` regions are flattened, their
//!    phis replaced by mask-selected folds, and loops get an explicit
//!    `activemask` re-convergence phi,
//! 3. widening ([`widen::WidenPass`]): a vector-width clone of the procedure
//!    (and, transitively, of every same-module callee), emitting the
//!    width-independent [`WideOp`] instruction set,
//! 4. lowering ([`lower::LowerPass`]): [`WideOp`]s onto native vector
//!    registers ([`NativeOp`]), packing logical vectors wider than the
//!    largest register into synthesized aggregates.

pub mod lower;
pub mod mask;
pub mod predicate;
pub mod widen;

use crate::cfg::LoopShapeError;
use crate::{BinOp, CmpOp, Context, Func, MathOp, Module, Type, TypeKind};

pub use lower::{LowerPass, NativeOp, PackCache, VectorPack};
pub use widen::WidenPass;

/// Abstract ("wide") vector operation: hardware-width-independent vector
/// semantics, emitted by widening and consumed by lowering. No [`WideOp`]
/// survives in a fully lowered procedure.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum WideOp {
    /// `inputs: [scalar]`; broadcast to every lane.
    Splat,

    /// `inputs: [lane0, .., laneW-1]`; build a vector from scalars.
    Create,

    Binary(BinOp),

    /// Produces a lane mask (all-ones/all-zeros lanes) with the *operand's*
    /// element type, as native compares do.
    Compare(CmpOp),

    Math(MathOp),

    Convert(ConvertOp),

    /// `inputs: [array, index_vector]`; per-lane addresses off one uniform
    /// base. Never reaches lowering: consumed by per-lane extraction.
    OffsetUniformPtr,

    /// `inputs: [vector, lane]`; `lane` must be a constant (lane indices are
    /// compile-time literals, not runtime values).
    GetLane,

    /// `inputs: [vector]`; reduce to a per-lane bitmask (`u64`), movemask
    /// style.
    GetMask,

    /// `inputs: [array, index_vector]`; declared for future use, the widening
    /// stage does not emit it yet.
    MemGather,

    /// `inputs: [array, index_vector, value_vector, mask]`; declared for
    /// future use, the widening stage does not emit it yet.
    MemScatter,
}

impl WideOp {
    pub fn has_side_effects(self) -> bool {
        matches!(self, WideOp::MemGather | WideOp::MemScatter)
    }
}

/// Conversion kinds, as selected by widening from source/destination bit
/// width and signedness/floatness.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ConvertOp {
    BitCast,
    ZeroExt,
    SignExt,
    Trunc,
    I2F,
    F2I,
    FExt,
    FTrunc,
}

/// Fatal vectorization faults. There is no partial success: the first error
/// aborts the whole widening/lowering run for the affected call graph, and
/// recovery (e.g. falling back to the scalar path) is the caller's business.
#[derive(Debug, thiserror::Error)]
pub enum VectorizeError {
    #[error(transparent)]
    LoopShape(#[from] LoopShapeError),

    #[error("mask generation requires simple (un)conditional branch terminators")]
    UnsupportedTerminator,

    #[error("divergent phi with more than two incoming values")]
    UnsupportedPhiShape,

    #[error("unsupported divergent branch shape (not an if/else-shaped region)")]
    UnsupportedBranchShape,

    #[error("varying argument passed to a parameter declared uniform")]
    VaryingArgToUniformParam,

    #[error("entry procedure has no body in this module")]
    MissingBody,

    #[error("not implemented: {0}")]
    Unimplemented(&'static str),
}

/// The vector-width analog of a scalar (lane) type.
///
/// `Bool` lanes widen to `i32` (all-ones/all-zeros integer masks): native
/// registers have no one-bit lanes, and integer masks are what the movemask
/// lowering consumes.
pub(crate) fn wide_type_of(cx: &Context, lane: Type, width: u32) -> Type {
    let lane = match cx[lane] {
        TypeKind::Bool => cx.type_i32(),
        _ => lane,
    };
    cx.type_wide_vector(lane, width)
}

/// Whole-pipeline driver: widen a call graph, then lower every widened
/// procedure to native vector types.
///
/// The [`PackCache`] lives here (not in a hidden static) so its process-wide
/// sharing is explicit: decompositions depend only on element type, width and
/// the fixed native register sizes, so one `Vectorizer` can be reused across
/// modules.
pub struct Vectorizer<'a> {
    cx: &'a Context,
    width: u32,
    pack_cache: PackCache,
}

impl<'a> Vectorizer<'a> {
    pub fn new(cx: &'a Context, width: u32) -> Self {
        assert!(width.is_power_of_two(), "target lane width must be a power of two");
        Self { cx, width, pack_cache: PackCache::default() }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// Vectorize `entry` (and transitively its same-module callees), leaving
    /// the new procedures in `module`, and returning the vectorized entry.
    pub fn vectorize(&mut self, module: &mut Module, entry: Func) -> Result<Func, VectorizeError> {
        let mut widen = WidenPass::new(self.cx, self.width);
        let vector_entry = widen.process_call_graph(module, entry)?;

        for func in widen.into_vectorized_funcs() {
            LowerPass::new(self.cx, &mut self.pack_cache).process(module, func)?;
        }
        Ok(vector_entry)
    }
}
