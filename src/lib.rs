//! **SIMT** is a set of IR transforms for compiling SPMD ("single program,
//! multiple data") kernels down to SIMD execution: a scalar per-lane procedure
//! is rewritten into one that processes `W` work items per invocation using
//! native vector registers, with data-dependent control flow handled through
//! predication.
//!
//! #### Notable types/modules
//!
//! ##### IR data types
//! * [`Context`](struct.Context.html): handles interning ([`Type`]s, [`Const`]s, etc.) and entity allocation
//! * [`Module`]: owns [`Func`]s (declarations and bodies)
//! * [`FuncDefBody`]: owns [`Block`]s and [`Inst`]s (rooted by [`entry`](FuncDefBody::entry))
//!
//! ##### Utilities and passes
//! * [`print`](mod@print): plain-text pretty-printer for procedures
//! * [`uniformity`]: uniform/varying/varying-offset value classification
//! * [`vectorize`]: the masking/widening/lowering pipeline itself

// BEGIN - Embark standard lints v6 for Rust 1.55+
// do not change or add/remove here, but one can add exceptions after this section
// for more info see: <https://github.com/EmbarkStudios/rust-ecosystem/issues/59>
#![deny(unsafe_code)]
#![warn(
    clippy::all,
    clippy::await_holding_lock,
    clippy::char_lit_as_u8,
    clippy::checked_conversions,
    clippy::dbg_macro,
    clippy::debug_assert_with_mut_call,
    clippy::doc_markdown,
    clippy::empty_enum,
    clippy::enum_glob_use,
    clippy::exit,
    clippy::expl_impl_clone_on_copy,
    clippy::explicit_deref_methods,
    clippy::explicit_into_iter_loop,
    clippy::fallible_impl_from,
    clippy::filter_map_next,
    clippy::flat_map_option,
    clippy::float_cmp_const,
    clippy::fn_params_excessive_bools,
    clippy::from_iter_instead_of_collect,
    clippy::if_let_mutex,
    clippy::implicit_clone,
    clippy::imprecise_flops,
    clippy::inefficient_to_string,
    clippy::invalid_upcast_comparisons,
    clippy::large_digit_groups,
    clippy::large_stack_arrays,
    clippy::large_types_passed_by_value,
    clippy::let_unit_value,
    clippy::linkedlist,
    clippy::lossy_float_literal,
    clippy::macro_use_imports,
    clippy::manual_ok_or,
    clippy::map_err_ignore,
    clippy::map_flatten,
    clippy::map_unwrap_or,
    clippy::match_same_arms,
    clippy::match_wild_err_arm,
    clippy::match_wildcard_for_single_variants,
    clippy::mem_forget,
    clippy::missing_enforced_import_renames,
    clippy::mut_mut,
    clippy::mutex_integer,
    clippy::needless_borrow,
    clippy::needless_continue,
    clippy::needless_for_each,
    clippy::option_option,
    clippy::path_buf_push_overwrite,
    clippy::ptr_as_ptr,
    clippy::rc_mutex,
    clippy::ref_option_ref,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::same_functions_in_if_condition,
    clippy::semicolon_if_nothing_returned,
    clippy::single_match_else,
    clippy::string_add_assign,
    clippy::string_add,
    clippy::string_lit_as_bytes,
    clippy::string_to_string,
    clippy::todo,
    clippy::trait_duplication_in_bounds,
    clippy::unimplemented,
    clippy::unnested_or_patterns,
    clippy::unused_self,
    clippy::useless_transmute,
    clippy::verbose_file_reads,
    clippy::zero_sized_map_values,
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms
)]
// END - Embark standard lints v6 for Rust 1.55+
// crate-specific exceptions:
#![allow(
    // NOTE(eddyb) ignored for readability (`match` used when `if let` is too long).
    clippy::single_match_else,
)]
#![forbid(unsafe_code)]

pub mod builder;
pub mod cfg;
mod context;
pub mod print;
pub mod uniformity;
pub mod vectorize;

use smallvec::SmallVec;

// HACK(eddyb) work around the lack of `FxIndex{Map,Set}` type aliases elsewhere.
#[doc(hidden)]
type FxIndexMap<K, V> =
    indexmap::IndexMap<K, V, std::hash::BuildHasherDefault<rustc_hash::FxHasher>>;
#[doc(hidden)]
type FxIndexSet<V> = indexmap::IndexSet<V, std::hash::BuildHasherDefault<rustc_hash::FxHasher>>;

pub use context::{Context, Entity, EntityDefs, InternInCx};

/// Interned handle for a [`TypeKind`].
pub use context::Type;

/// Interned handle for a [`ConstDef`] (a constant value).
pub use context::Const;

/// Interned handle for a [`str`].
pub use context::InternedStr;

context::entity_handles! {
    /// Entity handle for a [`FuncDecl`] (a function).
    Func => FuncDecl;
    /// Entity handle for a [`BlockDef`] (a basic block).
    Block => BlockDef;
    /// Entity handle for an [`InstDef`] (an instruction).
    Inst => InstDef;
}

/// Top-level container: all functions of one compilation unit.
#[derive(Default)]
pub struct Module {
    pub funcs: EntityDefs<Func>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Definition for a [`Type`]: the shape of values of that type.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum TypeKind {
    Bool,
    Int { bits: u16, signed: bool },
    Float { bits: u16 },

    /// Pointer to a single element of the given type.
    Ptr(Type),

    /// Unsized array (only usable as a parameter type); elements are addressed
    /// via [`InstKind::ArrayAddr`] and counted via [`InstKind::ArrayLen`].
    Array(Type),

    /// Nominal aggregate, used both for source-level structs and for the
    /// wrapper types synthesized by vector lowering.
    Struct { name: InternedStr, fields: SmallVec<[Type; 4]> },

    /// Abstract `width`-lane vector of `elem`, independent of any native
    /// register size; only exists between widening and lowering.
    WideVector { elem: Type, width: u32 },

    /// One concrete native vector register (`bits` ∈ {128, 256, 512}) of
    /// `elem` lanes; only produced by lowering.
    NativeVector { elem: Type, bits: u32 },
}

impl TypeKind {
    /// Bit width of a scalar (`Bool`/`Int`/`Float`) type.
    pub fn scalar_bits(&self) -> Option<u16> {
        match *self {
            TypeKind::Bool => Some(1),
            TypeKind::Int { bits, .. } | TypeKind::Float { bits } => Some(bits),
            _ => None,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, TypeKind::Float { .. })
    }

    pub fn is_int(&self) -> bool {
        matches!(self, TypeKind::Int { .. })
    }

    pub fn is_unsigned_int(&self) -> bool {
        matches!(self, TypeKind::Int { signed: false, .. })
    }

    /// Whether lanes of this type can live directly in a native vector
    /// register (as opposed to requiring full scalarization).
    pub fn is_numeric(&self) -> bool {
        matches!(self, TypeKind::Int { .. } | TypeKind::Float { .. })
    }
}

/// Definition for a [`Const`]: a constant value.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ConstDef {
    pub ty: Type,
    pub kind: ConstKind,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ConstKind {
    Bool(bool),
    Int(i64),

    /// IEEE-754 bits (of the width given by the type), kept as raw bits so
    /// that `ConstDef` can be `Eq + Hash`.
    Float(u64),

    /// Undefined/type-default value.
    Undef,
}

impl Context {
    pub fn type_bool(&self) -> Type {
        self.intern(TypeKind::Bool)
    }
    pub fn type_int(&self, bits: u16, signed: bool) -> Type {
        self.intern(TypeKind::Int { bits, signed })
    }
    pub fn type_i32(&self) -> Type {
        self.type_int(32, true)
    }
    pub fn type_u32(&self) -> Type {
        self.type_int(32, false)
    }
    pub fn type_u64(&self) -> Type {
        self.type_int(64, false)
    }
    pub fn type_float(&self, bits: u16) -> Type {
        self.intern(TypeKind::Float { bits })
    }
    pub fn type_f32(&self) -> Type {
        self.type_float(32)
    }
    pub fn type_ptr(&self, elem: Type) -> Type {
        self.intern(TypeKind::Ptr(elem))
    }
    pub fn type_wide_vector(&self, elem: Type, width: u32) -> Type {
        self.intern(TypeKind::WideVector { elem, width })
    }
    pub fn type_native_vector(&self, elem: Type, bits: u32) -> Type {
        self.intern(TypeKind::NativeVector { elem, bits })
    }

    /// Lane count of a `NativeVector` type.
    pub fn native_lane_count(&self, ty: Type) -> u32 {
        match self[ty] {
            TypeKind::NativeVector { elem, bits } => {
                bits / u32::from(self[elem].scalar_bits().unwrap())
            }
            _ => unreachable!("native_lane_count: not a native vector type"),
        }
    }

    pub fn const_bool(&self, v: bool) -> Const {
        self.intern(ConstDef { ty: self.type_bool(), kind: ConstKind::Bool(v) })
    }
    pub fn const_int(&self, ty: Type, v: i64) -> Const {
        self.intern(ConstDef { ty, kind: ConstKind::Int(v) })
    }
    pub fn const_i32(&self, v: i32) -> Const {
        self.const_int(self.type_i32(), v.into())
    }
    pub fn const_u32(&self, v: u32) -> Const {
        self.const_int(self.type_u32(), v.into())
    }
    pub fn const_f32(&self, v: f32) -> Const {
        self.intern(ConstDef { ty: self.type_f32(), kind: ConstKind::Float(v.to_bits().into()) })
    }
    pub fn const_f64(&self, v: f64) -> Const {
        self.intern(ConstDef { ty: self.type_float(64), kind: ConstKind::Float(v.to_bits()) })
    }
    pub fn const_undef(&self, ty: Type) -> Const {
        self.intern(ConstDef { ty, kind: ConstKind::Undef })
    }

    /// Whether `v` is the constant `true` (e.g. the entry block mask).
    pub fn is_const_true(&self, v: Value) -> bool {
        match v {
            Value::Const(ct) => self[ct].kind == ConstKind::Bool(true),
            _ => false,
        }
    }
}

/// Declaration/definition for a [`Func`]: a function.
#[derive(Clone)]
pub struct FuncDecl {
    pub name: InternedStr,

    pub params: SmallVec<[FuncParam; 2]>,

    /// `None` for `void` functions.
    pub ret_type: Option<Type>,

    /// Whether the return value is uniform across lanes (an annotation, like
    /// the per-parameter one; only meaningful to the vectorizer).
    pub ret_uniform: bool,

    /// Instance-style functions have an implicit receiver as their first
    /// parameter, which is always uniform.
    pub is_instance: bool,

    /// Effect summary provided by an external effects analysis.
    pub effects: FuncEffects,

    pub def: DeclDef,
}

#[derive(Copy, Clone)]
pub struct FuncParam {
    pub ty: Type,

    /// Declared uniform: the caller guarantees all lanes pass the same value.
    pub uniform: bool,
}

/// Summary of a callee's observable effects, as provided by the host
/// compiler's (external) effects analysis.
#[derive(Copy, Clone, Default)]
pub struct FuncEffects {
    /// The callee has no observable effect beyond throwing or reading memory;
    /// calls to it with uniform arguments produce uniform results.
    pub may_only_throw_or_read_mem: bool,
}

/// Functions can carry a full definition, or be imports from outside the
/// compilation unit (which the vectorizer must call as-is, per-lane).
#[derive(Clone)]
pub enum DeclDef {
    Imported,
    Present(FuncDefBody),
}

impl FuncDecl {
    pub fn body(&self) -> Option<&FuncDefBody> {
        match &self.def {
            DeclDef::Present(body) => Some(body),
            DeclDef::Imported => None,
        }
    }
}

/// The body of a [`Func`] definition: blocks and instructions, rooted at
/// `entry`.
#[derive(Clone)]
pub struct FuncDefBody {
    pub blocks: EntityDefs<Block>,
    pub insts: EntityDefs<Inst>,
    pub entry: Block,
}

impl Default for FuncDefBody {
    fn default() -> Self {
        Self::new()
    }
}

impl FuncDefBody {
    pub fn new() -> Self {
        let mut blocks = EntityDefs::new();
        let entry = blocks.define(BlockDef::default());
        Self { blocks, insts: EntityDefs::new(), entry }
    }

    pub fn add_block(&mut self) -> Block {
        self.blocks.define(BlockDef::default())
    }

    /// Number of leading phi instructions of `block` (phis are only legal as a
    /// contiguous run at the start of a block).
    pub fn num_phis(&self, block: Block) -> usize {
        self.blocks[block]
            .insts
            .iter()
            .take_while(|&&inst| self.insts[inst].is_phi())
            .count()
    }

    /// The result type of a value (`None` for void instructions), given the
    /// parameters of the declaration this body belongs to.
    pub fn value_type(&self, cx: &Context, params: &[FuncParam], v: Value) -> Option<Type> {
        match v {
            Value::Const(ct) => Some(cx[ct].ty),
            Value::Param { idx } => Some(params[idx as usize].ty),
            Value::Inst(inst) => self.insts[inst].output_type,
        }
    }

    /// Atomically replace every use of `old` with `new`: all instruction
    /// operands (attached to a block or not), phi incoming values, branch
    /// conditions and return values.
    ///
    /// This is the only sanctioned way to redirect dataflow - per-pass operand
    /// surgery tends to miss terminators (or phis) and leave dangling uses.
    pub fn replace_all_uses(&mut self, old: Value, new: Value) {
        for inst in self.insts.keys().collect::<Vec<_>>() {
            for input in &mut self.insts[inst].inputs {
                if *input == old {
                    *input = new;
                }
            }
        }
        for block in self.blocks.keys().collect::<Vec<_>>() {
            match &mut self.blocks[block].terminator {
                Terminator::CondBranch { cond, .. } if *cond == old => *cond = new,
                Terminator::Return(Some(v)) if *v == old => *v = new,
                _ => {}
            }
        }
    }

    /// Remove `inst` from `block`'s instruction list (its definition stays in
    /// the arena, but nothing executes it anymore; the caller must have
    /// already redirected its uses).
    pub fn detach_inst(&mut self, block: Block, inst: Inst) {
        self.blocks[block].insts.retain(|&i| i != inst);
    }
}

/// Definition for a [`Block`]: a straight-line instruction sequence, ended by
/// a [`Terminator`] ("control instruction on exit").
#[derive(Clone)]
pub struct BlockDef {
    pub insts: Vec<Inst>,
    pub terminator: Terminator,
}

impl Default for BlockDef {
    fn default() -> Self {
        Self { insts: Vec::new(), terminator: Terminator::Unreachable }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Terminator {
    Branch { target: Block },
    CondBranch { cond: Value, on_true: Block, on_false: Block },
    Return(Option<Value>),
    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> SmallVec<[Block; 2]> {
        match *self {
            Terminator::Branch { target } => [target].into_iter().collect(),
            Terminator::CondBranch { on_true, on_false, .. } => {
                [on_true, on_false].into_iter().collect()
            }
            Terminator::Return(_) | Terminator::Unreachable => SmallVec::new(),
        }
    }
}

/// Definition for an [`Inst`]: a leaf (non-control-flow) instruction.
#[derive(Clone)]
pub struct InstDef {
    pub kind: InstKind,

    pub inputs: SmallVec<[Value; 2]>,

    /// `None` for void instructions (stores, traps).
    pub output_type: Option<Type>,
}

impl InstDef {
    pub fn is_phi(&self) -> bool {
        matches!(self.kind, InstKind::Phi { .. })
    }

    /// Incoming `(predecessor, value)` pairs of a phi.
    pub fn phi_incoming(&self) -> impl Iterator<Item = (Block, Value)> + '_ {
        let preds = match &self.kind {
            InstKind::Phi { preds } => &preds[..],
            _ => &[],
        };
        preds.iter().copied().zip(self.inputs.iter().copied())
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug, derive_more::From)]
pub enum InstKind {
    /// SSA merge: `inputs[i]` is the value when entered from `preds[i]`.
    Phi { preds: SmallVec<[Block; 2]> },

    #[from]
    Binary(BinOp),

    /// Scalar result type is `Bool`; widened compares instead produce a lane
    /// mask with the *operand's* element type (all-ones/all-zeros lanes).
    #[from]
    Compare(CmpOp),

    #[from]
    Math(MathOp),

    /// `inputs: [value]`; conversion kind is derived from source/destination
    /// types. Overflow-checked conversions have no vector form.
    Convert { check_overflow: bool },

    /// `inputs: [cond, on_true, on_false]`.
    Select,

    /// `inputs: [ptr]`.
    Load,

    /// `inputs: [ptr, value]`; void.
    Store,

    /// `inputs: [array]`; element count of an `Array`-typed parameter.
    ArrayLen,

    /// `inputs: [array, index]`; address of an array element. When
    /// `in_bounds` is false, carries an implicit bounds check (which widening
    /// makes explicit, masked to active lanes).
    ArrayAddr { in_bounds: bool },

    /// `inputs: [ptr]`; address of field `field` of a pointed-to struct.
    FieldAddr { field: u32 },

    /// `inputs: [ptr, index]`; raw element-wise pointer displacement.
    PtrOffset,

    Call(Func),

    /// `inputs: [bitmask]`; raises the given fault iff any bit is set. Only
    /// bits of *active* lanes may ever be set by the vectorizer's own checks.
    TrapIf(TrapKind),

    /// Abstract vector operation (between widening and lowering).
    #[from]
    Wide(vectorize::WideOp),

    /// Native vector register operation (after lowering).
    #[from]
    Native(vectorize::NativeOp),

    /// `inputs: [aggregate]`; reads field `.0` of a struct-typed value.
    ExtractField(u32),

    /// `inputs: [aggregate, value]`; functional update of field `.0`.
    InsertField(u32),
}

impl InstKind {
    /// Whether executing this instruction can be observed beyond its result
    /// (or can fault). `Load` is included (it can fault on a bad pointer),
    /// matching the conservative host-IR notion; the uniformity analysis
    /// special-cases it.
    pub fn has_side_effects(&self) -> bool {
        match self {
            InstKind::Store
            | InstKind::Load
            | InstKind::Call(_)
            | InstKind::TrapIf(_)
            | InstKind::ArrayAddr { in_bounds: false } => true,

            InstKind::Wide(op) => op.has_side_effects(),
            InstKind::Native(op) => op.has_side_effects(),

            _ => false,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SRem,
    URem,
    FAdd,
    FSub,
    FMul,
    FDiv,
    And,
    Or,
    Xor,
    Shl,
    Sra,
    Srl,
}

impl BinOp {
    pub fn is_float(self) -> bool {
        matches!(self, BinOp::FAdd | BinOp::FSub | BinOp::FMul | BinOp::FDiv)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum CmpOp {
    Eq,
    Ne,
    Slt,
    Sgt,
    Sle,
    Sge,
    Ult,
    Ugt,
    Ule,
    Uge,
    FOeq,
    FUne,
    FOlt,
    FOgt,
    FOle,
    FOge,
}

impl CmpOp {
    pub fn is_float(self) -> bool {
        matches!(
            self,
            CmpOp::FOeq | CmpOp::FUne | CmpOp::FOlt | CmpOp::FOgt | CmpOp::FOle | CmpOp::FOge
        )
    }

    pub fn is_unsigned(self) -> bool {
        matches!(self, CmpOp::Ult | CmpOp::Ugt | CmpOp::Ule | CmpOp::Uge)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum MathOp {
    Abs,
    Min,
    Max,
    Floor,
    Ceil,
    Round,
    Fma,
    Sqrt,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum TrapKind {
    IndexOutOfRange,
}

/// An SSA value: a constant, a function parameter, or an instruction result.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Value {
    Const(Const),
    Param { idx: u32 },
    Inst(Inst),
}
