//! Lowering: abstract wide vectors onto native vector registers.
//!
//! A [`VectorPack`] is the native decomposition of one logical vector type:
//! an ordered list of registers greedily covering the lanes (512/256/128
//! bits, descending), plus a synthesized aggregate wrapper when more than one
//! register is needed (and a fully scalarized wrapper when the element type
//! cannot live in a register at all). Per-instruction lowering then emits one
//! native operation per register, stitching multi-register results together
//! through field inserts.

use crate::cfg::Cfg;
use crate::vectorize::{ConvertOp, VectorizeError, WideOp};
use crate::{
    BinOp, CmpOp, Context, DeclDef, Func, FuncDefBody, FuncParam, Inst, InstDef, InstKind, MathOp,
    Module, Terminator, Type, TypeKind, Value,
};
use arrayvec::ArrayVec;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::mem;

/// Native vector register operation. One lowered instruction operates on
/// exactly one register-typed value per operand.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum NativeOp {
    Add,
    Sub,
    Mul,
    Div,
    BitAnd,
    BitOr,
    BitXor,
    OnesComplement,
    ShiftLeft,
    ShiftRightArithmetic,
    ShiftRightLogical,

    Abs,
    Min,
    Max,
    Floor,
    Ceil,
    Round,
    Fma,
    Sqrt,

    /// All comparisons produce all-ones/all-zeros lanes of the operand type.
    Equals,
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,

    /// One input: broadcast. `lane_count` inputs: per-lane construction.
    Create,

    /// `inputs: [vec, lane]` (constant lane).
    GetElement,

    /// `inputs: [vec]`; sign bit of every lane, packed into a scalar.
    ExtractMostSignificantBits,

    ConvertToFloat,
    ConvertToInt,

    /// Reinterpret lanes as the (same-width) element type of the result.
    BitCast,

    /// `inputs: [mask, on_true, on_false]`; bitwise blend.
    ConditionalSelect,

    /// Declared for completeness; nothing emits them yet.
    Gather,
    Scatter,
}

impl NativeOp {
    pub fn has_side_effects(self) -> bool {
        matches!(self, NativeOp::Scatter)
    }
}

/// Native register widths, in bits, largest first (the greedy decomposition
/// order).
pub const NATIVE_VEC_BITS: [u32; 3] = [512, 256, 128];

const MAX_REGS: usize = 8;

/// The native decomposition of one logical [`WideVector`](TypeKind::WideVector)
/// type. Never mutated after creation (safe to share through [`PackCache`]).
#[derive(Clone)]
pub struct VectorPack {
    /// Native register types covering the lanes, in order; empty when the
    /// element type has no register form (fully scalarized wrapper instead).
    pub reg_types: ArrayVec<Type, MAX_REGS>,

    /// Synthesized aggregate holding the registers (present iff `reg_types`
    /// has ≥2 entries, or the pack is fully scalarized).
    pub wrapper: Option<Type>,
}

impl VectorPack {
    /// The concrete type that replaces the logical vector type.
    pub fn real_type(&self) -> Type {
        match self.wrapper {
            Some(w) => w,
            None => self.reg_types[0],
        }
    }

    pub fn is_scalarized(&self) -> bool {
        self.reg_types.is_empty()
    }
}

/// Process-wide pack cache, explicitly passed (not a hidden static): the
/// decomposition depends only on element type, width and the fixed register
/// sizes, so packs are safe to share across procedures and modules.
#[derive(Default)]
pub struct PackCache {
    packs: FxHashMap<Type, VectorPack>,
}

impl PackCache {
    pub fn pack_of(&mut self, cx: &Context, wide_ty: Type) -> Result<VectorPack, VectorizeError> {
        if let Some(pack) = self.packs.get(&wide_ty) {
            return Ok(pack.clone());
        }
        let (elem, width) = match cx[wide_ty] {
            TypeKind::WideVector { elem, width } => (elem, width),
            _ => unreachable!("pack_of: not a wide vector type"),
        };
        let pack = Self::decompose(cx, elem, width)?;
        self.packs.insert(wide_ty, pack.clone());
        Ok(pack)
    }

    fn decompose(cx: &Context, elem: Type, width: u32) -> Result<VectorPack, VectorizeError> {
        if !cx[elem].is_numeric() {
            // No register form: one wrapper field per lane.
            let name = format!("Vector_{}_x{}", crate::print::type_name(cx, elem), width);
            let wrapper = cx.intern(TypeKind::Struct {
                name: cx.intern(name),
                fields: (0..width).map(|_| elem).collect(),
            });
            return Ok(VectorPack { reg_types: ArrayVec::new(), wrapper: Some(wrapper) });
        }

        let elem_bits = u32::from(cx[elem].scalar_bits().unwrap());
        let mut reg_types = ArrayVec::new();
        let mut remaining = width;
        while remaining > 0 {
            let total = remaining * elem_bits;
            let reg_bits = *NATIVE_VEC_BITS.iter().find(|&&bits| total >= bits).ok_or(
                VectorizeError::Unimplemented("vector narrower than the smallest native register"),
            )?;
            if reg_types.is_full() {
                return Err(VectorizeError::Unimplemented(
                    "vector wider than the supported register count",
                ));
            }
            reg_types.push(cx.type_native_vector(elem, reg_bits));
            remaining -= reg_bits / elem_bits;
        }

        let wrapper = (reg_types.len() >= 2).then(|| {
            let name = format!("Vector_{}_x{}", crate::print::type_name(cx, elem), width);
            cx.intern(TypeKind::Struct {
                name: cx.intern(name),
                fields: reg_types.iter().copied().collect(),
            })
        });
        Ok(VectorPack { reg_types, wrapper })
    }
}

/// Single-sweep rewrite of one procedure from abstract wide IR to native
/// instructions/types. Values are rewritten in place: later instructions see
/// already-lowered earlier values.
pub struct LowerPass<'a> {
    cx: &'a Context,
    cache: &'a mut PackCache,

    /// Pre-lowering logical (`WideVector`) types of values whose concrete
    /// type has already been rewritten.
    source_types: FxHashMap<Value, Type>,

    /// The procedure's (already lowered) parameter types.
    params: SmallVec<[FuncParam; 2]>,
}

impl<'a> LowerPass<'a> {
    pub fn new(cx: &'a Context, cache: &'a mut PackCache) -> Self {
        Self { cx, cache, source_types: FxHashMap::default(), params: SmallVec::new() }
    }

    pub fn process(&mut self, module: &mut Module, func: Func) -> Result<(), VectorizeError> {
        let mut body = match mem::replace(&mut module.funcs[func].def, DeclDef::Imported) {
            DeclDef::Present(body) => body,
            DeclDef::Imported => return Err(VectorizeError::MissingBody),
        };

        // Parameter/return types are rewritten up front (the original logical
        // types stay visible through `source_types`), so multi-register
        // operands extract fields consistently from the first instruction on.
        let mut params = module.funcs[func].params.clone();
        for (i, p) in params.iter_mut().enumerate() {
            if matches!(self.cx[p.ty], TypeKind::WideVector { .. }) {
                self.source_types.insert(Value::Param { idx: i as u32 }, p.ty);
                p.ty = self.cache.pack_of(self.cx, p.ty)?.real_type();
            }
        }
        let ret_type = match module.funcs[func].ret_type {
            Some(ty) if matches!(self.cx[ty], TypeKind::WideVector { .. }) => {
                Some(self.cache.pack_of(self.cx, ty)?.real_type())
            }
            other => other,
        };
        self.params = params.clone();

        let cfg = Cfg::of(&body);
        for block in cfg.rev_post_order().collect::<Vec<_>>() {
            let old = mem::take(&mut body.blocks[block].insts);
            let mut out = Vec::with_capacity(old.len());
            for inst in old {
                self.lower_inst(&mut body, &mut out, inst)?;
            }
            body.blocks[block].insts = out;
        }

        module.funcs[func].params = params;
        module.funcs[func].ret_type = ret_type;
        module.funcs[func].def = DeclDef::Present(body);
        Ok(())
    }

    fn lower_inst(
        &mut self,
        body: &mut FuncDefBody,
        out: &mut Vec<Inst>,
        inst: Inst,
    ) -> Result<(), VectorizeError> {
        let def = body.insts[inst].clone();

        if let InstKind::Wide(op) = def.kind {
            let lowered = self.lower_wide(body, out, op, &def)?;
            if let Some(v) = lowered {
                if let Some(wty) = def.output_type {
                    if matches!(self.cx[wty], TypeKind::WideVector { .. }) {
                        self.source_types.insert(v, wty);
                    }
                }
                body.replace_all_uses(Value::Inst(inst), v);
            }
            return Ok(());
        }

        let wty = match def.output_type {
            Some(ty) if matches!(self.cx[ty], TypeKind::WideVector { .. }) => ty,
            _ => {
                out.push(inst);
                return Ok(());
            }
        };

        match def.kind {
            // Phis and calls keep their identity; only the type is rewritten.
            InstKind::Phi { .. } | InstKind::Call(_) => {
                let real = self.cache.pack_of(self.cx, wty)?.real_type();
                body.insts[inst].output_type = Some(real);
                self.source_types.insert(Value::Inst(inst), wty);
                out.push(inst);
                Ok(())
            }

            InstKind::Select => {
                let mask = self.coerce(body, out, wty, def.inputs[0])?;
                let a = self.coerce(body, out, wty, def.inputs[1])?;
                let b = self.coerce(body, out, wty, def.inputs[2])?;
                let v =
                    self.emit_packed(body, out, NativeOp::ConditionalSelect, wty, &[mask, a, b])?;
                self.source_types.insert(v, wty);
                body.replace_all_uses(Value::Inst(inst), v);
                Ok(())
            }

            _ => Err(VectorizeError::Unimplemented(
                "vector-typed instruction with no native lowering",
            )),
        }
    }

    fn lower_wide(
        &mut self,
        body: &mut FuncDefBody,
        out: &mut Vec<Inst>,
        op: WideOp,
        def: &InstDef,
    ) -> Result<Option<Value>, VectorizeError> {
        let wty = def.output_type;
        match op {
            WideOp::Splat => {
                let wty = wty.unwrap();
                Ok(Some(self.emit_splat(body, out, wty, def.inputs[0])?))
            }

            WideOp::Create => {
                let wty = wty.unwrap();
                Ok(Some(self.emit_create(body, out, wty, &def.inputs)?))
            }

            WideOp::Binary(bin) => {
                let wty = wty.unwrap();
                Ok(Some(self.lower_binary(body, out, bin, wty, &def.inputs)?))
            }

            WideOp::Compare(cmp) => {
                let wty = wty.unwrap();
                Ok(Some(self.lower_compare(body, out, cmp, wty, &def.inputs)?))
            }

            WideOp::Math(math) => {
                let wty = wty.unwrap();
                let native = match math {
                    MathOp::Abs => NativeOp::Abs,
                    MathOp::Min => NativeOp::Min,
                    MathOp::Max => NativeOp::Max,
                    MathOp::Floor => NativeOp::Floor,
                    MathOp::Ceil => NativeOp::Ceil,
                    MathOp::Round => NativeOp::Round,
                    MathOp::Fma => NativeOp::Fma,
                    MathOp::Sqrt => NativeOp::Sqrt,
                };
                let mut args = SmallVec::<[Value; 3]>::new();
                for &v in &def.inputs {
                    args.push(self.coerce(body, out, wty, v)?);
                }
                Ok(Some(self.emit_packed(body, out, native, wty, &args)?))
            }

            WideOp::Convert(conv) => {
                let wty = wty.unwrap();
                Ok(Some(self.lower_convert(body, out, conv, wty, def.inputs[0])?))
            }

            WideOp::GetMask => Ok(Some(self.lower_get_mask(body, out, def.inputs[0])?)),

            WideOp::GetLane => Ok(Some(self.lower_get_lane(body, out, def)?)),

            // Per-lane address vectors are consumed by lane extraction during
            // widening; one surviving here means an unmodeled use (e.g. a
            // stored pointer vector), which must fail loudly.
            WideOp::OffsetUniformPtr => Err(VectorizeError::Unimplemented(
                "per-lane address vectors must be consumed by lane extraction",
            )),

            WideOp::MemGather => Err(VectorizeError::Unimplemented("vector memory gather")),
            WideOp::MemScatter => Err(VectorizeError::Unimplemented("vector memory scatter")),
        }
    }

    fn lower_binary(
        &mut self,
        body: &mut FuncDefBody,
        out: &mut Vec<Inst>,
        op: BinOp,
        wty: Type,
        inputs: &[Value],
    ) -> Result<Value, VectorizeError> {
        let native = match op {
            BinOp::Add | BinOp::FAdd => NativeOp::Add,
            BinOp::Sub | BinOp::FSub => NativeOp::Sub,
            BinOp::Mul | BinOp::FMul => NativeOp::Mul,
            BinOp::SDiv | BinOp::UDiv | BinOp::FDiv => NativeOp::Div,
            BinOp::And => NativeOp::BitAnd,
            BinOp::Or => NativeOp::BitOr,
            BinOp::Xor => NativeOp::BitXor,
            BinOp::Shl => NativeOp::ShiftLeft,
            BinOp::Sra => NativeOp::ShiftRightArithmetic,
            BinOp::Srl => NativeOp::ShiftRightLogical,
            BinOp::SRem | BinOp::URem => {
                return Err(VectorizeError::Unimplemented("vector integer remainder"));
            }
        };

        // Division cares about lane signedness; reinterpret if the logical
        // element disagrees with the operation.
        let wty = match op {
            BinOp::SDiv => self.with_elem_signedness(wty, true),
            BinOp::UDiv => self.with_elem_signedness(wty, false),
            _ => wty,
        };
        let a = self.coerce(body, out, wty, inputs[0])?;
        let b = self.coerce(body, out, wty, inputs[1])?;
        self.emit_packed(body, out, native, wty, &[a, b])
    }

    fn lower_compare(
        &mut self,
        body: &mut FuncDefBody,
        out: &mut Vec<Inst>,
        op: CmpOp,
        wty: Type,
        inputs: &[Value],
    ) -> Result<Value, VectorizeError> {
        let wty = if op.is_unsigned() {
            self.with_elem_signedness(wty, false)
        } else if !op.is_float() {
            self.with_elem_signedness(wty, true)
        } else {
            wty
        };
        let a = self.coerce(body, out, wty, inputs[0])?;
        let b = self.coerce(body, out, wty, inputs[1])?;

        let (native, negate) = match op {
            CmpOp::Eq | CmpOp::FOeq => (NativeOp::Equals, false),
            CmpOp::Ne | CmpOp::FUne => (NativeOp::Equals, true),
            CmpOp::Slt | CmpOp::Ult | CmpOp::FOlt => (NativeOp::LessThan, false),
            CmpOp::Sgt | CmpOp::Ugt | CmpOp::FOgt => (NativeOp::GreaterThan, false),
            CmpOp::Sle | CmpOp::Ule | CmpOp::FOle => (NativeOp::LessThanOrEqual, false),
            CmpOp::Sge | CmpOp::Uge | CmpOp::FOge => (NativeOp::GreaterThanOrEqual, false),
        };
        let mut result = self.emit_packed(body, out, native, wty, &[a, b])?;
        if negate {
            result = self.emit_packed(body, out, NativeOp::OnesComplement, wty, &[result])?;
        }
        Ok(result)
    }

    /// `wty` with its integer element reinterpreted at the given signedness
    /// (float and already-matching elements pass through).
    fn with_elem_signedness(&self, wty: Type, signed: bool) -> Type {
        match self.cx[wty] {
            TypeKind::WideVector { elem, width } => match self.cx[elem] {
                TypeKind::Int { bits, signed: s } if s != signed => {
                    self.cx.type_wide_vector(self.cx.type_int(bits, signed), width)
                }
                _ => wty,
            },
            _ => wty,
        }
    }

    fn lower_convert(
        &mut self,
        body: &mut FuncDefBody,
        out: &mut Vec<Inst>,
        op: ConvertOp,
        dst_wty: Type,
        value: Value,
    ) -> Result<Value, VectorizeError> {
        match op {
            ConvertOp::BitCast => self.bitcast(body, out, dst_wty, value),
            ConvertOp::I2F => {
                let v = self.pass_through(body, out, value)?;
                self.emit_packed(body, out, NativeOp::ConvertToFloat, dst_wty, &[v])
            }
            ConvertOp::F2I => {
                let v = self.pass_through(body, out, value)?;
                self.emit_packed(body, out, NativeOp::ConvertToInt, dst_wty, &[v])
            }
            // Lane-width changes need multi-step narrowing/widening across
            // register boundaries; fail loudly rather than miscompile.
            ConvertOp::ZeroExt
            | ConvertOp::SignExt
            | ConvertOp::Trunc
            | ConvertOp::FExt
            | ConvertOp::FTrunc => {
                Err(VectorizeError::Unimplemented("narrowing/widening vector conversions"))
            }
        }
    }

    fn lower_get_mask(
        &mut self,
        body: &mut FuncDefBody,
        out: &mut Vec<Inst>,
        value: Value,
    ) -> Result<Value, VectorizeError> {
        let src_wty = self.logical_type_of(body, value)?;
        let pack = self.cache.pack_of(self.cx, src_wty)?;
        if pack.is_scalarized() {
            return Err(VectorizeError::Unimplemented("movemask of scalarized lanes"));
        }

        let u64t = self.cx.type_u64();
        let mut acc: Option<Value> = None;
        let mut shift = 0u32;
        for (i, &reg) in pack.reg_types.iter().enumerate() {
            let part = self.operand_register(body, out, value, &pack, i)?;
            let mut bits =
                self.emit(body, out, NativeOp::ExtractMostSignificantBits.into(), [part], Some(u64t));
            if shift > 0 {
                let sh = Value::Const(self.cx.const_int(u64t, i64::from(shift)));
                bits = self.emit(body, out, InstKind::Binary(BinOp::Shl), [bits, sh], Some(u64t));
            }
            acc = Some(match acc {
                None => bits,
                Some(prev) => {
                    self.emit(body, out, InstKind::Binary(BinOp::Or), [prev, bits], Some(u64t))
                }
            });
            shift += self.cx.native_lane_count(reg);
        }
        Ok(acc.expect("packs always cover at least one register"))
    }

    fn lower_get_lane(
        &mut self,
        body: &mut FuncDefBody,
        out: &mut Vec<Inst>,
        def: &InstDef,
    ) -> Result<Value, VectorizeError> {
        let src_wty = self.logical_type_of(body, def.inputs[0])?;
        let pack = self.cache.pack_of(self.cx, src_wty)?;
        let elem = match self.cx[src_wty] {
            TypeKind::WideVector { elem, .. } => elem,
            _ => unreachable!(),
        };
        let lane = def.inputs[1];

        if pack.is_scalarized() {
            let idx = match lane {
                Value::Const(ct) => match self.cx[ct].kind {
                    crate::ConstKind::Int(i) => i as u32,
                    _ => return Err(VectorizeError::Unimplemented("non-literal lane index")),
                },
                _ => return Err(VectorizeError::Unimplemented("non-literal lane index")),
            };
            let v = self.pass_through(body, out, def.inputs[0])?;
            return Ok(self.emit(body, out, InstKind::ExtractField(idx), [v], Some(elem)));
        }
        if pack.reg_types.len() > 1 {
            return Err(VectorizeError::Unimplemented(
                "per-lane extraction across multiple registers",
            ));
        }
        let v = self.pass_through(body, out, def.inputs[0])?;
        Ok(self.emit(body, out, NativeOp::GetElement.into(), [v, lane], Some(elem)))
    }

    /// Broadcast `scalar` to every lane of `wty`.
    fn emit_splat(
        &mut self,
        body: &mut FuncDefBody,
        out: &mut Vec<Inst>,
        wty: Type,
        scalar: Value,
    ) -> Result<Value, VectorizeError> {
        let pack = self.cache.pack_of(self.cx, wty)?;
        if pack.is_scalarized() {
            let wrapper = pack.wrapper.unwrap();
            let width = match self.cx[wty] {
                TypeKind::WideVector { width, .. } => width,
                _ => unreachable!(),
            };
            let mut result = Value::Const(self.cx.const_undef(wrapper));
            for i in 0..width {
                result = self.emit(
                    body,
                    out,
                    InstKind::InsertField(i),
                    [result, scalar],
                    Some(wrapper),
                );
            }
            return Ok(result);
        }
        self.combine_regs(body, out, &pack, |this, body, out, reg, _| {
            Ok(this.emit(body, out, NativeOp::Create.into(), [scalar], Some(reg)))
        })
    }

    /// Build a vector out of `width` scalars, chunked per register.
    fn emit_create(
        &mut self,
        body: &mut FuncDefBody,
        out: &mut Vec<Inst>,
        wty: Type,
        lanes: &[Value],
    ) -> Result<Value, VectorizeError> {
        let pack = self.cache.pack_of(self.cx, wty)?;
        if pack.is_scalarized() {
            let wrapper = pack.wrapper.unwrap();
            let mut result = Value::Const(self.cx.const_undef(wrapper));
            for (i, &lane) in lanes.iter().enumerate() {
                result = self.emit(
                    body,
                    out,
                    InstKind::InsertField(i as u32),
                    [result, lane],
                    Some(wrapper),
                );
            }
            return Ok(result);
        }

        let mut offset = 0usize;
        self.combine_regs(body, out, &pack, |this, body, out, reg, _| {
            let count = this.cx.native_lane_count(reg) as usize;
            let chunk = &lanes[offset..offset + count];
            offset += count;
            Ok(this.emit(body, out, NativeOp::Create.into(), chunk.iter().copied(), Some(reg)))
        })
    }

    /// Emit one native op per register of `wty`'s pack, recombining the
    /// per-register results into the wrapper when the pack spans several.
    fn emit_packed(
        &mut self,
        body: &mut FuncDefBody,
        out: &mut Vec<Inst>,
        op: NativeOp,
        wty: Type,
        args: &[Value],
    ) -> Result<Value, VectorizeError> {
        let pack = self.cache.pack_of(self.cx, wty)?;
        if pack.is_scalarized() {
            return Err(VectorizeError::Unimplemented(
                "native operations on scalarized aggregate lanes",
            ));
        }
        let args = args.to_vec();
        self.combine_regs(body, out, &pack, |this, body, out, reg, i| {
            let mut reg_args = SmallVec::<[Value; 3]>::new();
            for &arg in &args {
                reg_args.push(this.operand_register_of(body, out, arg, i)?);
            }
            Ok(this.emit(body, out, op.into(), reg_args, Some(reg)))
        })
    }

    /// Drive `per_reg` over every register of `pack`; a single-register pack
    /// returns the lone result directly, a multi-register one is reassembled
    /// field by field into the wrapper aggregate.
    fn combine_regs(
        &mut self,
        body: &mut FuncDefBody,
        out: &mut Vec<Inst>,
        pack: &VectorPack,
        mut per_reg: impl FnMut(
            &mut Self,
            &mut FuncDefBody,
            &mut Vec<Inst>,
            Type,
            usize,
        ) -> Result<Value, VectorizeError>,
    ) -> Result<Value, VectorizeError> {
        if pack.reg_types.len() == 1 {
            return per_reg(self, body, out, pack.reg_types[0], 0);
        }
        let wrapper = pack.wrapper.expect("multi-register packs always have a wrapper");
        let mut result = Value::Const(self.cx.const_undef(wrapper));
        for (i, &reg) in pack.reg_types.iter().enumerate() {
            let v = per_reg(self, body, out, reg, i)?;
            result =
                self.emit(body, out, InstKind::InsertField(i as u32), [result, v], Some(wrapper));
        }
        Ok(result)
    }

    /// The `i`-th register's worth of `arg`: wrapper-typed values extract a
    /// field, single-register values pass through.
    fn operand_register_of(
        &mut self,
        body: &mut FuncDefBody,
        out: &mut Vec<Inst>,
        arg: Value,
        i: usize,
    ) -> Result<Value, VectorizeError> {
        match self.current_type(body, arg).map(|ty| self.cx[ty].clone()) {
            Some(TypeKind::Struct { fields, .. }) => {
                let field_ty = *fields.get(i).ok_or(VectorizeError::Unimplemented(
                    "mixed register layouts in one operation",
                ))?;
                Ok(self.emit(body, out, InstKind::ExtractField(i as u32), [arg], Some(field_ty)))
            }
            _ => Ok(arg),
        }
    }

    fn operand_register(
        &mut self,
        body: &mut FuncDefBody,
        out: &mut Vec<Inst>,
        arg: Value,
        pack: &VectorPack,
        i: usize,
    ) -> Result<Value, VectorizeError> {
        if pack.reg_types.len() == 1 { Ok(arg) } else { self.operand_register_of(body, out, arg, i) }
    }

    /// Reinterpret `value`'s lanes as `dst_wty`'s (same-width) element type.
    fn bitcast(
        &mut self,
        body: &mut FuncDefBody,
        out: &mut Vec<Inst>,
        dst_wty: Type,
        value: Value,
    ) -> Result<Value, VectorizeError> {
        let src_wty = self.logical_type_of(body, value)?;
        if src_wty == dst_wty {
            return self.pass_through(body, out, value);
        }
        let (src_elem, dst_elem) = match (&self.cx[src_wty], &self.cx[dst_wty]) {
            (
                &TypeKind::WideVector { elem: s, .. },
                &TypeKind::WideVector { elem: d, .. },
            ) => (s, d),
            _ => unreachable!("bitcast operands are vectors"),
        };
        if self.cx[src_elem].scalar_bits() != self.cx[dst_elem].scalar_bits() {
            return Err(VectorizeError::Unimplemented("lane-width-changing bitcast"));
        }
        self.emit_packed(body, out, NativeOp::BitCast, dst_wty, &[value])
    }

    /// Coerce `v` into a `dst_wty`-shaped operand: matching vectors pass
    /// through, mismatched element types bitcast, scalars splat. This is what
    /// keeps mixed vector/uniform-scalar operands (and mask element-type
    /// mismatches) valid inputs to lowering.
    fn coerce(
        &mut self,
        body: &mut FuncDefBody,
        out: &mut Vec<Inst>,
        dst_wty: Type,
        v: Value,
    ) -> Result<Value, VectorizeError> {
        match self.try_logical_type_of(body, v) {
            Some(src_wty) if src_wty == dst_wty => self.pass_through(body, out, v),
            Some(_) => self.bitcast(body, out, dst_wty, v),
            None => self.emit_splat(body, out, dst_wty, v),
        }
    }

    /// `v` unchanged (it is already in lowered form); exists so callers read
    /// uniformly.
    fn pass_through(
        &mut self,
        _body: &mut FuncDefBody,
        _out: &mut Vec<Inst>,
        v: Value,
    ) -> Result<Value, VectorizeError> {
        Ok(v)
    }

    /// The logical (pre-lowering) vector type of `v`.
    fn logical_type_of(
        &self,
        body: &FuncDefBody,
        v: Value,
    ) -> Result<Type, VectorizeError> {
        self.try_logical_type_of(body, v)
            .ok_or(VectorizeError::Unimplemented("scalar operand where a vector was expected"))
    }

    fn try_logical_type_of(&self, body: &FuncDefBody, v: Value) -> Option<Type> {
        if let Some(&wty) = self.source_types.get(&v) {
            return Some(wty);
        }
        let ty = self.current_type(body, v)?;
        matches!(self.cx[ty], TypeKind::WideVector { .. }).then_some(ty)
    }

    fn current_type(&self, body: &FuncDefBody, v: Value) -> Option<Type> {
        body.value_type(self.cx, &self.params, v)
    }

    fn emit(
        &mut self,
        body: &mut FuncDefBody,
        out: &mut Vec<Inst>,
        kind: InstKind,
        inputs: impl IntoIterator<Item = Value>,
        output_type: Option<Type>,
    ) -> Value {
        let inst = body.insts.define(InstDef {
            kind,
            inputs: inputs.into_iter().collect(),
            output_type,
        });
        out.push(inst);
        Value::Inst(inst)
    }
}
