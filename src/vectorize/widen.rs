//! Widening: cloning a scalar procedure (and, transitively, its same-module
//! callees) into a vector-width form.
//!
//! Per procedure, the pass first runs uniformity analysis, mask generation
//! and predication *on the scalar body*, then clones it block by block:
//! uniform values pass through unchanged, varying computation becomes
//! [`WideOp`]s, and anything without a vector form is scalarized lane by
//! lane. The result still uses abstract vector types; lowering makes them
//! native.

use crate::builder::Builder;
use crate::cfg::{Cfg, LoopFinder};
use crate::uniformity::UniformityAnalysis;
use crate::vectorize::mask::MaskBuilder;
use crate::vectorize::{ConvertOp, VectorizeError, WideOp, predicate, wide_type_of};
use crate::{
    BinOp, Block, CmpOp, ConstKind, Context, DeclDef, Func, FuncDecl, FuncDefBody, FuncEffects,
    FuncParam, FxIndexMap, Inst, InstDef, InstKind, Module, Terminator, TrapKind, Type, TypeKind,
    Value,
};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::mem;

pub struct WidenPass<'a> {
    cx: &'a Context,
    width: u32,

    /// Source -> vectorized function, memoized by source identity (each
    /// reachable same-module callee is widened exactly once).
    vectorized: FxIndexMap<Func, Func>,

    worklist: Vec<Func>,

    wide_types: FxHashMap<Type, Type>,
}

impl<'a> WidenPass<'a> {
    pub fn new(cx: &'a Context, width: u32) -> Self {
        Self {
            cx,
            width,
            vectorized: FxIndexMap::default(),
            worklist: Vec::new(),
            wide_types: FxHashMap::default(),
        }
    }

    /// Widen `entry` and every same-module callee it (transitively) reaches,
    /// returning the vectorized entry. Each procedure is fully widened before
    /// the next one starts; only *signatures* of callees are needed early,
    /// and those are fixed as soon as a callee is first discovered.
    pub fn process_call_graph(
        &mut self,
        module: &mut Module,
        entry: Func,
    ) -> Result<Func, VectorizeError> {
        let vector_entry =
            self.vectorized_func(module, entry)?.ok_or(VectorizeError::MissingBody)?;
        while let Some(src) = self.worklist.pop() {
            self.widen_one(module, src)?;
        }
        Ok(vector_entry)
    }

    /// The vectorized functions produced by the walk (in discovery order),
    /// for lowering.
    pub fn into_vectorized_funcs(self) -> impl Iterator<Item = Func> {
        self.vectorized.into_values()
    }

    /// The vector-width analog of a scalar lane type, cached.
    fn wide_type(&mut self, lane: Type) -> Type {
        let (cx, width) = (self.cx, self.width);
        *self.wide_types.entry(lane).or_insert_with(|| wide_type_of(cx, lane, width))
    }

    /// The vectorized counterpart of `src`: `None` if `src` is imported (it
    /// stays scalar and gets called per-lane), otherwise the (possibly
    /// freshly declared) vector function, with parameter/return types decided
    /// by `src`'s *own* uniformity annotations, not any call site.
    fn vectorized_func(
        &mut self,
        module: &mut Module,
        src: Func,
    ) -> Result<Option<Func>, VectorizeError> {
        if let Some(&dest) = self.vectorized.get(&src) {
            return Ok(Some(dest));
        }
        if module.funcs[src].body().is_none() {
            return Ok(None);
        }

        let src_params = module.funcs[src].params.clone();
        let mut params = SmallVec::with_capacity(src_params.len());
        for (i, p) in src_params.into_iter().enumerate() {
            let uniform = UniformityAnalysis::param_is_uniform(&module.funcs[src], i);
            let ty = if uniform { p.ty } else { self.wide_type(p.ty) };
            params.push(FuncParam { ty, uniform });
        }
        let ret_uniform = module.funcs[src].ret_uniform;
        let ret_type = match module.funcs[src].ret_type {
            Some(ty) if !ret_uniform => Some(self.wide_type(ty)),
            other => other,
        };
        let name = format!("{}.w{}", &self.cx[module.funcs[src].name], self.width);

        let dest = module.funcs.define(FuncDecl {
            name: self.cx.intern(name),
            params,
            ret_type,
            ret_uniform,
            // The receiver (if any) survives as an explicitly-uniform first
            // parameter of a detached, static-style procedure.
            is_instance: false,
            effects: module.funcs[src].effects,
            def: DeclDef::Present(FuncDefBody::new()),
        });
        self.vectorized.insert(src, dest);
        self.worklist.push(src);
        Ok(Some(dest))
    }

    fn widen_one(&mut self, module: &mut Module, src: Func) -> Result<(), VectorizeError> {
        let dest = self.vectorized[&src];

        let mut src_body = match mem::replace(&mut module.funcs[src].def, DeclDef::Imported) {
            DeclDef::Present(body) => body,
            DeclDef::Imported => unreachable!("worklist entries always carry a body"),
        };
        // The body was just taken out, so this decl clone is cheap.
        let src_decl = module.funcs[src].clone();
        let callee_effects: FxHashMap<Func, FuncEffects> =
            module.funcs.iter().map(|(f, d)| (f, d.effects)).collect();

        // Scalar-side preparation: masks + predication restructure the source
        // body; the masks keep their original-reachability meaning.
        let cfg = Cfg::of(&src_body);
        let loops = LoopFinder::new(&src_body, &cfg).find()?;
        let mut uni = UniformityAnalysis::new(self.cx, &src_decl, &callee_effects);
        let mut masks = MaskBuilder::new(self.cx, &mut src_body, &cfg, &loops)?;
        predicate::predicate_function(self.cx, &mut src_body, &cfg, &loops, &mut uni, &mut masks)?;

        // Blocks whose widened form will consult an activity mask: the ones
        // carrying an implicitly bounds-checked address computation.
        let needs_mask: Vec<Block> = src_body
            .blocks
            .keys()
            .filter(|&b| {
                src_body.blocks[b].insts.iter().any(|&inst| {
                    matches!(src_body.insts[inst].kind, InstKind::ArrayAddr { in_bounds: false })
                })
            })
            .collect();
        let block_masks = masks.into_block_masks(&mut src_body, &needs_mask)?;

        // Clone in an RPO over the *flattened* control flow, so every non-phi
        // use sees its definition already cloned.
        let flat_cfg = Cfg::of(&src_body);

        let dest_params = module.funcs[dest].params.clone();
        let mut dest_body = FuncDefBody::new();
        {
            let mut cloner = Cloner {
                pass: self,
                module,
                src_decl: &src_decl,
                src_body: &src_body,
                uni: &mut uni,
                block_masks: &block_masks,
                dest_params: &dest_params,
                dest: &mut dest_body,
                value_map: FxHashMap::default(),
                block_map: FxHashMap::default(),
                phi_fixups: Vec::new(),
            };
            cloner.run(&flat_cfg)?;
        }

        module.funcs[src].def = DeclDef::Present(src_body);
        module.funcs[dest].def = DeclDef::Present(dest_body);
        Ok(())
    }
}

/// A vector phi input that couldn't be resolved while cloning (its value
/// comes from a block cloned later, e.g. across a loop back edge).
struct PhiFixup {
    dest_phi: Inst,
    input_idx: usize,
    src_pred: Block,
    src_value: Value,
    want_wide: bool,
}

struct Cloner<'a, 'u, 'cx> {
    pass: &'a mut WidenPass<'cx>,
    module: &'a mut Module,

    src_decl: &'a FuncDecl,
    src_body: &'a FuncDefBody,
    uni: &'a mut UniformityAnalysis<'u>,

    /// Scalar per-block activity masks (values in the *source* body).
    block_masks: &'a FxHashMap<Block, Value>,

    dest_params: &'a [FuncParam],
    dest: &'a mut FuncDefBody,

    value_map: FxHashMap<Value, Value>,
    block_map: FxHashMap<Block, Block>,
    phi_fixups: Vec<PhiFixup>,
}

impl Cloner<'_, '_, '_> {
    fn cx(&self) -> &Context {
        self.pass.cx
    }

    fn run(&mut self, flat_cfg: &Cfg) -> Result<(), VectorizeError> {
        let rpo: Vec<Block> = flat_cfg.rev_post_order().collect();
        for &block in &rpo {
            let mapped = if block == self.src_body.entry {
                self.dest.entry
            } else {
                self.dest.add_block()
            };
            self.block_map.insert(block, mapped);
        }
        for &block in &rpo {
            self.clone_block(block)?;
        }

        for fixup in mem::take(&mut self.phi_fixups) {
            let pred = self.block_map[&fixup.src_pred];
            let value = if fixup.want_wide {
                self.widen_operand(pred, fixup.src_value)?
            } else {
                self.remap(fixup.src_value)
            };
            self.dest.insts[fixup.dest_phi].inputs[fixup.input_idx] = value;
        }
        Ok(())
    }

    fn clone_block(&mut self, block: Block) -> Result<(), VectorizeError> {
        let mapped = self.block_map[&block];
        let insts = self.src_body.blocks[block].insts.clone();
        for inst in insts {
            self.clone_inst(block, mapped, inst)?;
        }

        let term = match self.src_body.blocks[block].terminator.clone() {
            Terminator::Branch { target } => {
                Terminator::Branch { target: self.block_map[&target] }
            }
            Terminator::CondBranch { cond, on_true, on_false } => {
                let mut c = self.remap(cond);
                if self.is_wide(c) {
                    // Divergent (loop) branch: taken while *any* lane is
                    // still active.
                    let u64t = self.cx().type_u64();
                    let bits = self.emit(mapped, WideOp::GetMask.into(), [c], Some(u64t));
                    let zero = Value::Const(self.cx().const_int(u64t, 0));
                    c = self.emit(
                        mapped,
                        InstKind::Compare(CmpOp::Ne),
                        [bits, zero],
                        Some(self.cx().type_bool()),
                    );
                }
                Terminator::CondBranch {
                    cond: c,
                    on_true: self.block_map[&on_true],
                    on_false: self.block_map[&on_false],
                }
            }
            Terminator::Return(Some(v)) => {
                let rv = if self.src_decl.ret_uniform {
                    self.remap(v)
                } else {
                    self.widen_operand(mapped, v)?
                };
                Terminator::Return(Some(rv))
            }
            Terminator::Return(None) => Terminator::Return(None),
            Terminator::Unreachable => Terminator::Unreachable,
        };
        self.dest.blocks[mapped].terminator = term;
        Ok(())
    }

    fn clone_inst(
        &mut self,
        block: Block,
        mapped: Block,
        inst: Inst,
    ) -> Result<(), VectorizeError> {
        let def = self.src_body.insts[inst].clone();
        let src_val = Value::Inst(inst);

        // Phis (loop headers and uniform merges; selection phis are already
        // folded away by predication). Incoming values may come from blocks
        // cloned later, so they resolve through fixups.
        if let InstKind::Phi { preds } = &def.kind {
            let uniform = self.uni.is_uniform(self.src_body, src_val);
            let ty = def.output_type.expect("phis always produce a value");
            let dty = if uniform { ty } else { self.pass.wide_type(ty) };
            let mapped_preds: SmallVec<[Block; 2]> =
                preds.iter().map(|p| self.block_map[p]).collect();

            let placeholder = Value::Const(self.cx().const_undef(dty));
            let dest_phi = self.dest.insts.define(InstDef {
                kind: InstKind::Phi { preds: mapped_preds },
                inputs: def.inputs.iter().map(|_| placeholder).collect(),
                output_type: Some(dty),
            });
            self.dest.blocks[mapped].insts.push(dest_phi);
            for (i, (src_pred, src_value)) in def.phi_incoming().enumerate() {
                self.phi_fixups.push(PhiFixup {
                    dest_phi,
                    input_idx: i,
                    src_pred,
                    src_value,
                    want_wide: !uniform,
                });
            }
            self.value_map.insert(src_val, Value::Inst(dest_phi));
            return Ok(());
        }

        // Uniform values clone unchanged (operands remapped to their cloned
        // counterparts).
        if self.uni.is_uniform(self.src_body, src_val) {
            let inputs: SmallVec<[Value; 2]> =
                def.inputs.iter().map(|&op| self.remap(op)).collect();
            let v = self.emit(mapped, def.kind.clone(), inputs, def.output_type);
            self.value_map.insert(src_val, v);
            return Ok(());
        }

        let result = match def.kind {
            InstKind::Binary(op) => {
                let wty = self.pass.wide_type(def.output_type.unwrap());
                let a = self.widen_operand(mapped, def.inputs[0])?;
                let b = self.widen_operand(mapped, def.inputs[1])?;
                Some(self.emit(mapped, WideOp::Binary(op).into(), [a, b], Some(wty)))
            }

            InstKind::Compare(op) => {
                // The mask takes the *operand's* element type (native
                // compares yield all-ones/all-zeros lanes of that type).
                let lane = self.src_value_type(def.inputs[0]);
                let wty = self.pass.wide_type(lane);
                let a = self.widen_operand(mapped, def.inputs[0])?;
                let b = self.widen_operand(mapped, def.inputs[1])?;
                Some(self.emit(mapped, WideOp::Compare(op).into(), [a, b], Some(wty)))
            }

            InstKind::Math(op) => {
                let wty = self.pass.wide_type(def.output_type.unwrap());
                let mut inputs = SmallVec::<[Value; 2]>::new();
                for &v in &def.inputs {
                    inputs.push(self.widen_operand(mapped, v)?);
                }
                Some(self.emit(mapped, WideOp::Math(op).into(), inputs, Some(wty)))
            }

            InstKind::ArrayAddr { in_bounds }
                if self.uni.is_uniform(self.src_body, def.inputs[0])
                    && self.array_elem(def.inputs[0]).is_some_and(|e| self.cx()[e].is_numeric()) =>
            {
                Some(self.widen_uniform_array_addr(block, mapped, &def, in_bounds)?)
            }

            InstKind::Convert { check_overflow: false } => {
                Some(self.widen_convert(mapped, &def)?)
            }

            InstKind::Select => {
                let wty = self.pass.wide_type(def.output_type.unwrap());
                let c = self.widen_mask_operand(mapped, def.inputs[0])?;
                let t = self.widen_operand(mapped, def.inputs[1])?;
                let f = self.widen_operand(mapped, def.inputs[2])?;
                Some(self.emit(mapped, InstKind::Select, [c, t, f], Some(wty)))
            }

            InstKind::Call(callee) => return self.widen_call(mapped, src_val, &def, callee),

            // Everything else (loads from varying addresses, stores, calls
            // outside the module, checked conversions, ...) scalarizes.
            _ => self.scalarize(mapped, &def)?,
        };
        if let Some(v) = result {
            self.value_map.insert(src_val, v);
        }
        Ok(())
    }

    /// Rule for uniform-base array addressing: one scalar base, a lane of
    /// indices, and an explicit vectorized bounds check raised only for
    /// *active* out-of-range lanes.
    fn widen_uniform_array_addr(
        &mut self,
        block: Block,
        mapped: Block,
        def: &InstDef,
        in_bounds: bool,
    ) -> Result<Value, VectorizeError> {
        let array = self.remap(def.inputs[0]);
        let index = self.widen_operand(mapped, def.inputs[1])?;

        if !in_bounds {
            let u32t = self.cx().type_u32();
            let wu32 = self.pass.wide_type(u32t);
            let len = self.emit(mapped, InstKind::ArrayLen, [array], Some(u32t));
            let len_splat = self.emit(mapped, WideOp::Splat.into(), [len], Some(wu32));
            let mut oob =
                self.emit(mapped, WideOp::Compare(CmpOp::Uge).into(), [index, len_splat], Some(wu32));

            let active = self.block_masks[&block];
            if !self.cx().is_const_true(active) {
                let active = self.widen_mask_operand(mapped, active)?;
                oob = self.emit(mapped, WideOp::Binary(BinOp::And).into(), [oob, active], Some(wu32));
            }
            let bits = self.emit(mapped, WideOp::GetMask.into(), [oob], Some(self.cx().type_u64()));
            self.emit(mapped, InstKind::TrapIf(TrapKind::IndexOutOfRange), [bits], None);
        }

        let elem = def
            .output_type
            .and_then(|ty| match self.cx()[ty] {
                TypeKind::Ptr(elem) => Some(elem),
                _ => None,
            })
            .expect("array addressing produces an element pointer");
        let wptr = self.pass.wide_type(self.cx().type_ptr(elem));
        Ok(self.emit(mapped, WideOp::OffsetUniformPtr.into(), [array, index], Some(wptr)))
    }

    /// Conversion-op selection by bit width and signedness/floatness.
    fn widen_convert(&mut self, mapped: Block, def: &InstDef) -> Result<Value, VectorizeError> {
        let src_ty = self.src_value_type(def.inputs[0]);
        let dst_ty = def.output_type.unwrap();
        let (src_k, dst_k) = (&self.cx()[src_ty], &self.cx()[dst_ty]);
        let (src_bits, dst_bits) = (
            src_k.scalar_bits().expect("convert on scalar types"),
            dst_k.scalar_bits().expect("convert on scalar types"),
        );

        let op = if src_k.is_float() && dst_k.is_float() {
            if src_bits > dst_bits { ConvertOp::FTrunc } else { ConvertOp::FExt }
        } else if src_k.is_float() {
            ConvertOp::F2I
        } else if dst_k.is_float() {
            ConvertOp::I2F
        } else if dst_bits > src_bits {
            if dst_k.is_unsigned_int() { ConvertOp::ZeroExt } else { ConvertOp::SignExt }
        } else if dst_bits < src_bits {
            ConvertOp::Trunc
        } else {
            ConvertOp::BitCast
        };

        let v = self.widen_operand(mapped, def.inputs[0])?;
        let wty = self.pass.wide_type(dst_ty);
        Ok(self.emit(mapped, WideOp::Convert(op).into(), [v], Some(wty)))
    }

    /// Calls to same-module procedures go to the (memoized) vectorized
    /// clone, with arguments shaped by the *callee's* parameter annotations;
    /// anything else falls back to per-lane scalar calls.
    fn widen_call(
        &mut self,
        mapped: Block,
        src_val: Value,
        def: &InstDef,
        callee: Func,
    ) -> Result<(), VectorizeError> {
        let vectorized = self.pass.vectorized_func(self.module, callee)?;
        let result = match vectorized {
            Some(vcallee) => {
                let callee_is_instance = self.module.funcs[callee].is_instance;
                let callee_params = self.module.funcs[callee].params.clone();
                let callee_ret_uniform = self.module.funcs[callee].ret_uniform;

                let mut args = SmallVec::<[Value; 2]>::new();
                for (i, &arg) in def.inputs.iter().enumerate() {
                    let param_uniform =
                        (callee_is_instance && i == 0) || callee_params[i].uniform;
                    if param_uniform {
                        if !self.uni.is_uniform(self.src_body, arg) {
                            return Err(VectorizeError::VaryingArgToUniformParam);
                        }
                        args.push(self.remap(arg));
                    } else {
                        args.push(self.widen_operand(mapped, arg)?);
                    }
                }
                let ret = match def.output_type {
                    Some(ty) if !callee_ret_uniform => Some(self.pass.wide_type(ty)),
                    other => other,
                };
                Some(self.emit(mapped, InstKind::Call(vcallee), args, ret))
            }
            None => self.scalarize(mapped, def)?,
        };
        if let Some(v) = result {
            self.value_map.insert(src_val, v);
        }
        Ok(())
    }

    /// The correctness safety net: clone the instruction once per lane,
    /// extracting each vector operand's lane, and recombine the per-lane
    /// results with `Create` (void instructions produce nothing - and run
    /// unconditionally, see `scalarized_store_ignores_mask`).
    fn scalarize(
        &mut self,
        mapped: Block,
        def: &InstDef,
    ) -> Result<Option<Value>, VectorizeError> {
        let width = self.pass.width;
        let mut lanes = SmallVec::<[Value; 8]>::new();
        for lane in 0..width {
            let mut inputs = SmallVec::<[Value; 2]>::new();
            for &op in &def.inputs {
                let m = self.remap(op);
                let m = if self.is_wide(m) { self.get_lane(mapped, m, lane)? } else { m };
                inputs.push(m);
            }
            let v = self.emit(mapped, def.kind.clone(), inputs, def.output_type);
            if def.output_type.is_some() {
                lanes.push(v);
            }
        }
        match def.output_type {
            Some(ty) => {
                let wty = self.pass.wide_type(ty);
                Ok(Some(self.emit(mapped, WideOp::Create.into(), lanes, Some(wty))))
            }
            None => Ok(None),
        }
    }

    /// Per-lane extraction, with the usual peepholes (splats and lane packs
    /// extract for free; per-lane addressing re-becomes scalar addressing).
    fn get_lane(&mut self, mapped: Block, v: Value, lane: u32) -> Result<Value, VectorizeError> {
        if let Value::Inst(inst) = v {
            let def = self.dest.insts[inst].clone();
            match def.kind {
                InstKind::Wide(WideOp::Splat) => return Ok(def.inputs[0]),
                InstKind::Wide(WideOp::Create) => return Ok(def.inputs[lane as usize]),
                InstKind::Wide(WideOp::OffsetUniformPtr) => {
                    let lane_idx = self.get_lane(mapped, def.inputs[1], lane)?;
                    let elem_ptr = match self.dest_value_type(v).map(|ty| self.cx()[ty].clone()) {
                        Some(TypeKind::WideVector { elem, .. }) => elem,
                        _ => unreachable!("per-lane addressing always yields pointer lanes"),
                    };
                    // The bounds check (if any) already ran for the whole
                    // vector of indices.
                    return Ok(self.emit(
                        mapped,
                        InstKind::ArrayAddr { in_bounds: true },
                        [def.inputs[0], lane_idx],
                        Some(elem_ptr),
                    ));
                }
                _ => {}
            }
        }
        let lane_ty = match self.dest_value_type(v).map(|ty| self.cx()[ty].clone()) {
            Some(TypeKind::WideVector { elem, .. }) => elem,
            _ => unreachable!("get_lane on a non-vector value"),
        };
        let idx = Value::Const(self.cx().const_u32(lane));
        Ok(self.emit(mapped, WideOp::GetLane.into(), [v, idx], Some(lane_ty)))
    }

    /// Remap + widen an operand for a vector-consuming position: already-wide
    /// values pass through, everything else is splat (with scalar booleans
    /// first turned into `i32` all-ones/all-zeros masks, so mask algebra
    /// stays bitwise).
    fn widen_operand(&mut self, mapped: Block, src_v: Value) -> Result<Value, VectorizeError> {
        let m = self.remap(src_v);
        if self.is_wide(m) {
            return Ok(m);
        }
        let lane = self.dest_value_type(m).expect("widening a void value");
        if self.cx()[lane] == TypeKind::Bool {
            return self.widen_mask_operand(mapped, src_v);
        }
        let wty = self.pass.wide_type(lane);
        Ok(self.emit(mapped, WideOp::Splat.into(), [m], Some(wty)))
    }

    /// Like [`Self::widen_operand`], for mask positions: scalar booleans
    /// become splatted `-1`/`0` `i32` lanes.
    fn widen_mask_operand(&mut self, mapped: Block, src_v: Value) -> Result<Value, VectorizeError> {
        let m = self.remap(src_v);
        if self.is_wide(m) {
            return Ok(m);
        }
        let i32t = self.cx().type_i32();
        let scalar = match m {
            Value::Const(ct) => match self.cx()[ct].kind {
                ConstKind::Bool(b) => Value::Const(self.cx().const_i32(if b { -1 } else { 0 })),
                _ => m,
            },
            _ => {
                let all_ones = Value::Const(self.cx().const_i32(-1));
                let zero = Value::Const(self.cx().const_i32(0));
                self.emit(mapped, InstKind::Select, [m, all_ones, zero], Some(i32t))
            }
        };
        let wty = self.pass.wide_type(i32t);
        Ok(self.emit(mapped, WideOp::Splat.into(), [scalar], Some(wty)))
    }

    fn emit(
        &mut self,
        mapped: Block,
        kind: InstKind,
        inputs: impl IntoIterator<Item = Value>,
        output_type: Option<Type>,
    ) -> Value {
        let mut b = Builder::new(self.pass.cx, self.dest, mapped);
        b.emit(kind, inputs, output_type)
    }

    fn remap(&self, v: Value) -> Value {
        match v {
            Value::Const(_) | Value::Param { .. } => v,
            Value::Inst(_) => *self
                .value_map
                .get(&v)
                .expect("RPO cloning guarantees defs are visited before (non-phi) uses"),
        }
    }

    fn is_wide(&self, v: Value) -> bool {
        self.dest_value_type(v)
            .is_some_and(|ty| matches!(self.cx()[ty], TypeKind::WideVector { .. }))
    }

    fn dest_value_type(&self, v: Value) -> Option<Type> {
        self.dest.value_type(self.pass.cx, self.dest_params, v)
    }

    fn src_value_type(&self, v: Value) -> Type {
        self.src_body
            .value_type(self.pass.cx, &self.src_decl.params, v)
            .expect("operands always have a type")
    }

    fn array_elem(&self, v: Value) -> Option<Type> {
        match self.cx()[self.src_value_type(v)] {
            TypeKind::Array(elem) => Some(elem),
            _ => None,
        }
    }
}
