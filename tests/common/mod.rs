//! Reference interpreter for the IR, used to check that widened+lowered
//! procedures compute exactly what `W` independent scalar invocations would.
//!
//! Values are raw lane bits (`u64`), decoded per use site from the IR types;
//! this makes bit-level mask algebra (all-ones lanes, bitwise blends,
//! movemask) exact rather than approximated.

use rustc_hash::FxHashMap;
use simt::{
    BinOp, Block, CmpOp, ConstKind, Context, Func, FuncDecl, FuncDefBody, Inst, InstKind, MathOp,
    Module, TrapKind, Type, TypeKind, Value,
    vectorize::NativeOp,
};
use std::cell::RefCell;

#[derive(Clone, Debug, PartialEq)]
pub enum Val {
    /// Scalar lane bits (int, float bits, bool 0/1).
    Bits(u64),
    /// An `Array`-typed parameter, by index into [`Machine::arrays`].
    ArrayRef(usize),
    /// Element pointer.
    Ptr { array: usize, index: i64 },
    /// Native vector register (per-lane bits).
    Vec(Vec<u64>),
    /// Aggregate (struct) value.
    Agg(Vec<Val>),
    Undef,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Trap {
    IndexOutOfRange,
}

pub struct Machine<'a> {
    pub cx: &'a Context,
    pub module: &'a Module,
    /// Backing storage for `Array` parameters (raw element bits).
    pub arrays: Vec<RefCell<Vec<u64>>>,
}

impl<'a> Machine<'a> {
    pub fn new(cx: &'a Context, module: &'a Module) -> Self {
        Self { cx, module, arrays: Vec::new() }
    }

    pub fn add_array(&mut self, elems: Vec<u64>) -> Val {
        self.arrays.push(RefCell::new(elems));
        Val::ArrayRef(self.arrays.len() - 1)
    }

    pub fn eval(&self, func: Func, args: &[Val]) -> Result<Option<Val>, Trap> {
        let decl = &self.module.funcs[func];
        let body = decl.body().expect("imported functions cannot be interpreted");
        let mut exec = Exec { m: self, decl, body, args, env: FxHashMap::default() };
        exec.run()
    }
}

struct Exec<'a, 'm> {
    m: &'a Machine<'m>,
    decl: &'a FuncDecl,
    body: &'a FuncDefBody,
    args: &'a [Val],
    env: FxHashMap<Inst, Val>,
}

impl Exec<'_, '_> {
    fn run(&mut self) -> Result<Option<Val>, Trap> {
        let mut block = self.body.entry;
        let mut prev: Option<Block> = None;
        loop {
            self.exec_block(block, prev)?;
            match self.body.blocks[block].terminator.clone() {
                simt::Terminator::Branch { target } => {
                    prev = Some(block);
                    block = target;
                }
                simt::Terminator::CondBranch { cond, on_true, on_false } => {
                    let taken = self.bits(cond) != 0;
                    prev = Some(block);
                    block = if taken { on_true } else { on_false };
                }
                simt::Terminator::Return(v) => {
                    return Ok(v.map(|v| self.value(v)));
                }
                simt::Terminator::Unreachable => panic!("executed unreachable terminator"),
            }
        }
    }

    fn exec_block(&mut self, block: Block, prev: Option<Block>) -> Result<(), Trap> {
        let body = self.body;

        // Phis read their incoming values simultaneously, then commit.
        let insts = &body.blocks[block].insts;
        let phi_count = body.num_phis(block);
        let mut phi_values = Vec::with_capacity(phi_count);
        for &inst in &insts[..phi_count] {
            let prev = prev.expect("phi in entry block");
            let (_, incoming) = body.insts[inst]
                .phi_incoming()
                .find(|&(pred, _)| pred == prev)
                .expect("phi has no incoming for taken edge");
            phi_values.push((inst, self.value(incoming)));
        }
        for (inst, v) in phi_values {
            self.env.insert(inst, v);
        }

        for &inst in &insts[phi_count..] {
            if let Some(v) = self.exec_inst(inst)? {
                self.env.insert(inst, v);
            }
        }
        Ok(())
    }

    fn exec_inst(&mut self, inst: Inst) -> Result<Option<Val>, Trap> {
        let def = self.body.insts[inst].clone();
        let out_ty = def.output_type;
        let cx = self.m.cx;

        let result = match def.kind.clone() {
            InstKind::Phi { .. } => unreachable!("phis execute on block entry"),

            InstKind::Binary(op) => {
                let ty = out_ty.unwrap();
                let (a, b) = (self.bits(def.inputs[0]), self.bits(def.inputs[1]));
                Some(Val::Bits(scalar_binary(cx, ty, op, a, b)))
            }

            InstKind::Compare(op) => {
                let ty = self.type_of(def.inputs[0]);
                let (a, b) = (self.bits(def.inputs[0]), self.bits(def.inputs[1]));
                Some(Val::Bits(u64::from(scalar_compare(cx, ty, op, a, b))))
            }

            InstKind::Math(op) => {
                let ty = out_ty.unwrap();
                let args: Vec<u64> = def.inputs.iter().map(|&v| self.bits(v)).collect();
                Some(Val::Bits(scalar_math(cx, ty, op, &args)))
            }

            InstKind::Convert { .. } => {
                let src = self.type_of(def.inputs[0]);
                let dst = out_ty.unwrap();
                Some(Val::Bits(scalar_convert(cx, src, dst, self.bits(def.inputs[0]))))
            }

            InstKind::Select => {
                let cond = self.bits(def.inputs[0]) != 0;
                Some(self.value(def.inputs[if cond { 1 } else { 2 }]))
            }

            InstKind::Load => {
                let (array, index) = self.ptr(def.inputs[0]);
                // Unchecked access: a masked-off lane's gather load reads
                // *somewhere* without faulting (the explicit mask-guarded
                // check is the only fault source).
                let bits = usize::try_from(index)
                    .ok()
                    .and_then(|i| self.m.arrays[array].borrow().get(i).copied())
                    .unwrap_or(0);
                Some(Val::Bits(bits))
            }

            InstKind::Store => {
                let (array, index) = self.ptr(def.inputs[0]);
                let v = self.bits(def.inputs[1]);
                if let Ok(i) = usize::try_from(index) {
                    let mut arr = self.m.arrays[array].borrow_mut();
                    if i < arr.len() {
                        arr[i] = v;
                    }
                }
                None
            }

            InstKind::ArrayLen => {
                let array = self.array_ref(def.inputs[0]);
                Some(Val::Bits(self.m.arrays[array].borrow().len() as u64))
            }

            InstKind::ArrayAddr { in_bounds } => {
                let array = self.array_ref(def.inputs[0]);
                let idx_ty = self.type_of(def.inputs[1]);
                let index = decode_int(cx, idx_ty, self.bits(def.inputs[1]));
                if !in_bounds {
                    let len = self.m.arrays[array].borrow().len() as i64;
                    if index < 0 || index >= len {
                        return Err(Trap::IndexOutOfRange);
                    }
                }
                Some(Val::Ptr { array, index })
            }

            InstKind::PtrOffset => {
                let (array, index) = self.ptr(def.inputs[0]);
                let off_ty = self.type_of(def.inputs[1]);
                let off = decode_int(cx, off_ty, self.bits(def.inputs[1]));
                Some(Val::Ptr { array, index: index + off })
            }

            InstKind::Call(callee) => {
                let call_args: Vec<Val> = def.inputs.iter().map(|&v| self.value(v)).collect();
                self.m.eval(callee, &call_args)?
            }

            InstKind::TrapIf(TrapKind::IndexOutOfRange) => {
                if self.bits(def.inputs[0]) != 0 {
                    return Err(Trap::IndexOutOfRange);
                }
                None
            }

            InstKind::ExtractField(i) => match self.value(def.inputs[0]) {
                Val::Agg(fields) => Some(fields[i as usize].clone()),
                other => panic!("extractfield on {other:?}"),
            },

            InstKind::InsertField(i) => {
                let n = match &cx[out_ty.unwrap()] {
                    TypeKind::Struct { fields, .. } => fields.len(),
                    _ => panic!("insertfield with non-struct result"),
                };
                let mut fields = match self.value(def.inputs[0]) {
                    Val::Agg(fields) => fields,
                    Val::Undef => vec![Val::Undef; n],
                    other => panic!("insertfield on {other:?}"),
                };
                fields[i as usize] = self.value(def.inputs[1]);
                Some(Val::Agg(fields))
            }

            InstKind::Native(op) => self.exec_native(op, &def.inputs, out_ty)?,

            InstKind::Wide(op) => {
                panic!("abstract vector op survived lowering: {op:?}")
            }

            InstKind::FieldAddr { .. } => panic!("field addressing not modeled by the test machine"),
        };
        Ok(result)
    }

    fn exec_native(
        &mut self,
        op: NativeOp,
        inputs: &[Value],
        out_ty: Option<Type>,
    ) -> Result<Option<Val>, Trap> {
        let cx = self.m.cx;
        let elem_of = |ty: Type| match cx[ty] {
            TypeKind::NativeVector { elem, .. } => elem,
            _ => panic!("native op with non-register type"),
        };

        let result = match op {
            NativeOp::Create => {
                let ty = out_ty.unwrap();
                let count = cx.native_lane_count(ty) as usize;
                let lanes = if inputs.len() == 1 {
                    vec![self.bits(inputs[0]); count]
                } else {
                    assert_eq!(inputs.len(), count, "create arity must match lane count");
                    inputs.iter().map(|&v| self.bits(v)).collect()
                };
                Val::Vec(lanes)
            }

            NativeOp::GetElement => {
                let lanes = self.lanes(inputs[0]);
                let idx = self.bits(inputs[1]) as usize;
                Val::Bits(lanes[idx])
            }

            NativeOp::ExtractMostSignificantBits => {
                let src_ty = self.type_of(inputs[0]);
                let elem = elem_of(src_ty);
                let w = u32::from(cx[elem].scalar_bits().unwrap());
                let lanes = self.lanes(inputs[0]);
                let mut bits = 0u64;
                for (i, &lane) in lanes.iter().enumerate() {
                    bits |= ((lane >> (w - 1)) & 1) << i;
                }
                Val::Bits(bits)
            }

            NativeOp::ConditionalSelect => {
                let elem = elem_of(out_ty.unwrap());
                let w = u32::from(cx[elem].scalar_bits().unwrap());
                let mask = lane_mask(w);
                let m = self.lanes(inputs[0]);
                let a = self.lanes(inputs[1]);
                let b = self.lanes(inputs[2]);
                Val::Vec(
                    m.iter()
                        .zip(a.iter().zip(&b))
                        .map(|(&m, (&a, &b))| ((m & a) | (!m & b)) & mask)
                        .collect(),
                )
            }

            NativeOp::BitCast => Val::Vec(self.lanes(inputs[0])),

            NativeOp::OnesComplement => {
                let elem = elem_of(out_ty.unwrap());
                let mask = lane_mask(u32::from(cx[elem].scalar_bits().unwrap()));
                Val::Vec(self.lanes(inputs[0]).iter().map(|&l| !l & mask).collect())
            }

            NativeOp::ConvertToFloat => {
                let src_elem = elem_of(self.type_of(inputs[0]));
                let dst_elem = elem_of(out_ty.unwrap());
                Val::Vec(
                    self.lanes(inputs[0])
                        .iter()
                        .map(|&l| {
                            let v = decode_int(cx, src_elem, l) as f64;
                            encode_float(cx, dst_elem, v)
                        })
                        .collect(),
                )
            }

            NativeOp::ConvertToInt => {
                let src_elem = elem_of(self.type_of(inputs[0]));
                let dst_elem = elem_of(out_ty.unwrap());
                Val::Vec(
                    self.lanes(inputs[0])
                        .iter()
                        .map(|&l| {
                            let v = decode_float(cx, src_elem, l);
                            encode_int(cx, dst_elem, v.trunc() as i64)
                        })
                        .collect(),
                )
            }

            NativeOp::Add
            | NativeOp::Sub
            | NativeOp::Mul
            | NativeOp::Div
            | NativeOp::BitAnd
            | NativeOp::BitOr
            | NativeOp::BitXor
            | NativeOp::ShiftLeft
            | NativeOp::ShiftRightArithmetic
            | NativeOp::ShiftRightLogical
            | NativeOp::Min
            | NativeOp::Max => {
                let elem = elem_of(out_ty.unwrap());
                let bin = native_to_bin(op, &cx[elem]);
                let a = self.lanes(inputs[0]);
                let b = self.lanes(inputs[1]);
                Val::Vec(
                    a.iter()
                        .zip(&b)
                        .map(|(&a, &b)| match bin {
                            Ok(bin) => scalar_binary(cx, elem, bin, a, b),
                            Err(math) => scalar_math(cx, elem, math, &[a, b]),
                        })
                        .collect(),
                )
            }

            NativeOp::Abs
            | NativeOp::Floor
            | NativeOp::Ceil
            | NativeOp::Round
            | NativeOp::Sqrt => {
                let elem = elem_of(out_ty.unwrap());
                let math = match op {
                    NativeOp::Abs => MathOp::Abs,
                    NativeOp::Floor => MathOp::Floor,
                    NativeOp::Ceil => MathOp::Ceil,
                    NativeOp::Round => MathOp::Round,
                    NativeOp::Sqrt => MathOp::Sqrt,
                    _ => unreachable!(),
                };
                Val::Vec(
                    self.lanes(inputs[0])
                        .iter()
                        .map(|&l| scalar_math(cx, elem, math, &[l]))
                        .collect(),
                )
            }

            NativeOp::Fma => {
                let elem = elem_of(out_ty.unwrap());
                let (a, b, c) = (self.lanes(inputs[0]), self.lanes(inputs[1]), self.lanes(inputs[2]));
                Val::Vec(
                    a.iter()
                        .zip(b.iter().zip(&c))
                        .map(|(&a, (&b, &c))| scalar_math(cx, elem, MathOp::Fma, &[a, b, c]))
                        .collect(),
                )
            }

            NativeOp::Equals
            | NativeOp::LessThan
            | NativeOp::GreaterThan
            | NativeOp::LessThanOrEqual
            | NativeOp::GreaterThanOrEqual => {
                let elem = elem_of(out_ty.unwrap());
                let w = u32::from(cx[elem].scalar_bits().unwrap());
                let all_ones = lane_mask(w);
                let cmp = match op {
                    NativeOp::Equals => CmpOp::Eq,
                    NativeOp::LessThan => {
                        if cx[elem].is_unsigned_int() {
                            CmpOp::Ult
                        } else if cx[elem].is_float() {
                            CmpOp::FOlt
                        } else {
                            CmpOp::Slt
                        }
                    }
                    NativeOp::GreaterThan => {
                        if cx[elem].is_unsigned_int() {
                            CmpOp::Ugt
                        } else if cx[elem].is_float() {
                            CmpOp::FOgt
                        } else {
                            CmpOp::Sgt
                        }
                    }
                    NativeOp::LessThanOrEqual => {
                        if cx[elem].is_unsigned_int() {
                            CmpOp::Ule
                        } else if cx[elem].is_float() {
                            CmpOp::FOle
                        } else {
                            CmpOp::Sle
                        }
                    }
                    NativeOp::GreaterThanOrEqual => {
                        if cx[elem].is_unsigned_int() {
                            CmpOp::Uge
                        } else if cx[elem].is_float() {
                            CmpOp::FOge
                        } else {
                            CmpOp::Sge
                        }
                    }
                    _ => unreachable!(),
                };
                let a = self.lanes(inputs[0]);
                let b = self.lanes(inputs[1]);
                Val::Vec(
                    a.iter()
                        .zip(&b)
                        .map(|(&a, &b)| {
                            if scalar_compare(cx, elem, cmp, a, b) { all_ones } else { 0 }
                        })
                        .collect(),
                )
            }

            NativeOp::Gather | NativeOp::Scatter => {
                panic!("gather/scatter are declared but never emitted")
            }
        };
        Ok(Some(result))
    }

    fn value(&self, v: Value) -> Val {
        match v {
            Value::Const(ct) => {
                let def = &self.m.cx[ct];
                match def.kind {
                    ConstKind::Bool(b) => Val::Bits(u64::from(b)),
                    ConstKind::Int(i) => {
                        Val::Bits((i as u64) & type_lane_mask(self.m.cx, def.ty))
                    }
                    ConstKind::Float(bits) => Val::Bits(bits),
                    ConstKind::Undef => Val::Undef,
                }
            }
            Value::Param { idx } => self.args[idx as usize].clone(),
            Value::Inst(inst) => self.env.get(&inst).cloned().unwrap_or(Val::Undef),
        }
    }

    fn bits(&self, v: Value) -> u64 {
        match self.value(v) {
            Val::Bits(b) => b,
            Val::Undef => 0,
            other => panic!("expected scalar bits, got {other:?}"),
        }
    }

    fn lanes(&self, v: Value) -> Vec<u64> {
        match self.value(v) {
            Val::Vec(lanes) => lanes,
            other => panic!("expected vector lanes, got {other:?}"),
        }
    }

    fn ptr(&self, v: Value) -> (usize, i64) {
        match self.value(v) {
            Val::Ptr { array, index } => (array, index),
            other => panic!("expected pointer, got {other:?}"),
        }
    }

    fn array_ref(&self, v: Value) -> usize {
        match self.value(v) {
            Val::ArrayRef(idx) => idx,
            other => panic!("expected array, got {other:?}"),
        }
    }

    fn type_of(&self, v: Value) -> Type {
        self.body
            .value_type(self.m.cx, &self.decl.params, v)
            .expect("operands always have a type")
    }
}

fn native_to_bin(op: NativeOp, elem: &TypeKind) -> Result<BinOp, MathOp> {
    let float = elem.is_float();
    Ok(match op {
        NativeOp::Add => {
            if float {
                BinOp::FAdd
            } else {
                BinOp::Add
            }
        }
        NativeOp::Sub => {
            if float {
                BinOp::FSub
            } else {
                BinOp::Sub
            }
        }
        NativeOp::Mul => {
            if float {
                BinOp::FMul
            } else {
                BinOp::Mul
            }
        }
        NativeOp::Div => {
            if float {
                BinOp::FDiv
            } else if elem.is_unsigned_int() {
                BinOp::UDiv
            } else {
                BinOp::SDiv
            }
        }
        NativeOp::BitAnd => BinOp::And,
        NativeOp::BitOr => BinOp::Or,
        NativeOp::BitXor => BinOp::Xor,
        NativeOp::ShiftLeft => BinOp::Shl,
        NativeOp::ShiftRightArithmetic => BinOp::Sra,
        NativeOp::ShiftRightLogical => BinOp::Srl,
        NativeOp::Min => return Err(MathOp::Min),
        NativeOp::Max => return Err(MathOp::Max),
        _ => panic!("not a lane-wise binary op: {op:?}"),
    })
}

fn lane_mask(bits: u32) -> u64 {
    if bits >= 64 { !0 } else { (1u64 << bits) - 1 }
}

fn type_lane_mask(cx: &Context, ty: Type) -> u64 {
    match cx[ty].scalar_bits() {
        Some(bits) => lane_mask(u32::from(bits)),
        None => !0,
    }
}

fn decode_int(cx: &Context, ty: Type, bits: u64) -> i64 {
    match cx[ty] {
        TypeKind::Int { bits: w, signed } => {
            let w = u32::from(w);
            let masked = bits & lane_mask(w);
            if signed && w < 64 && (masked >> (w - 1)) & 1 == 1 {
                (masked | !lane_mask(w)) as i64
            } else {
                masked as i64
            }
        }
        TypeKind::Bool => (bits & 1) as i64,
        _ => panic!("decode_int on non-integer type"),
    }
}

fn encode_int(cx: &Context, ty: Type, v: i64) -> u64 {
    (v as u64) & type_lane_mask(cx, ty)
}

fn decode_float(cx: &Context, ty: Type, bits: u64) -> f64 {
    match cx[ty] {
        TypeKind::Float { bits: 32 } => f64::from(f32::from_bits(bits as u32)),
        TypeKind::Float { bits: 64 } => f64::from_bits(bits),
        _ => panic!("decode_float on non-float type"),
    }
}

fn encode_float(cx: &Context, ty: Type, v: f64) -> u64 {
    match cx[ty] {
        TypeKind::Float { bits: 32 } => u64::from((v as f32).to_bits()),
        TypeKind::Float { bits: 64 } => v.to_bits(),
        _ => panic!("encode_float on non-float type"),
    }
}

fn scalar_binary(cx: &Context, ty: Type, op: BinOp, a: u64, b: u64) -> u64 {
    let kind = &cx[ty];
    let mask = type_lane_mask(cx, ty);
    match op {
        BinOp::And => a & b & mask,
        BinOp::Or => (a | b) & mask,
        BinOp::Xor => (a ^ b) & mask,

        BinOp::Add => (decode_int(cx, ty, a).wrapping_add(decode_int(cx, ty, b)) as u64) & mask,
        BinOp::Sub => (decode_int(cx, ty, a).wrapping_sub(decode_int(cx, ty, b)) as u64) & mask,
        BinOp::Mul => (decode_int(cx, ty, a).wrapping_mul(decode_int(cx, ty, b)) as u64) & mask,
        BinOp::SDiv => {
            let (a, b) = (decode_int(cx, ty, a), decode_int(cx, ty, b));
            (a.wrapping_div(b) as u64) & mask
        }
        BinOp::UDiv => ((a & mask) / (b & mask)) & mask,
        BinOp::SRem => {
            let (a, b) = (decode_int(cx, ty, a), decode_int(cx, ty, b));
            (a.wrapping_rem(b) as u64) & mask
        }
        BinOp::URem => ((a & mask) % (b & mask)) & mask,

        BinOp::Shl => (a << (b & 63)) & mask,
        BinOp::Srl => ((a & mask) >> (b & 63)) & mask,
        BinOp::Sra => {
            let sh = b & 63;
            ((decode_int(cx, ty, a) >> sh) as u64) & mask
        }

        BinOp::FAdd | BinOp::FSub | BinOp::FMul | BinOp::FDiv => {
            assert!(kind.is_float(), "float op on non-float lanes");
            let (x, y) = (decode_float(cx, ty, a), decode_float(cx, ty, b));
            let r = match op {
                BinOp::FAdd => x + y,
                BinOp::FSub => x - y,
                BinOp::FMul => x * y,
                BinOp::FDiv => x / y,
                _ => unreachable!(),
            };
            // `encode_float` rounds through the lane width, as hardware would.
            encode_float(cx, ty, r)
        }
    }
}

fn scalar_compare(cx: &Context, ty: Type, op: CmpOp, a: u64, b: u64) -> bool {
    if op.is_float() {
        let (x, y) = (decode_float(cx, ty, a), decode_float(cx, ty, b));
        match op {
            CmpOp::FOeq => x == y,
            CmpOp::FUne => x != y,
            CmpOp::FOlt => x < y,
            CmpOp::FOgt => x > y,
            CmpOp::FOle => x <= y,
            CmpOp::FOge => x >= y,
            _ => unreachable!(),
        }
    } else if op.is_unsigned() {
        let mask = type_lane_mask(cx, ty);
        let (x, y) = (a & mask, b & mask);
        match op {
            CmpOp::Ult => x < y,
            CmpOp::Ugt => x > y,
            CmpOp::Ule => x <= y,
            CmpOp::Uge => x >= y,
            _ => unreachable!(),
        }
    } else {
        let (x, y) = (decode_int(cx, ty, a), decode_int(cx, ty, b));
        match op {
            CmpOp::Eq => x == y,
            CmpOp::Ne => x != y,
            CmpOp::Slt => x < y,
            CmpOp::Sgt => x > y,
            CmpOp::Sle => x <= y,
            CmpOp::Sge => x >= y,
            _ => unreachable!(),
        }
    }
}

fn scalar_math(cx: &Context, ty: Type, op: MathOp, args: &[u64]) -> u64 {
    if cx[ty].is_float() {
        let f = |i: usize| decode_float(cx, ty, args[i]);
        let r = match op {
            MathOp::Abs => f(0).abs(),
            MathOp::Min => f(0).min(f(1)),
            MathOp::Max => f(0).max(f(1)),
            MathOp::Floor => f(0).floor(),
            MathOp::Ceil => f(0).ceil(),
            MathOp::Round => f(0).round(),
            MathOp::Fma => f(0).mul_add(f(1), f(2)),
            MathOp::Sqrt => {
                // Compute at lane precision, as the native op would.
                if matches!(cx[ty], TypeKind::Float { bits: 32 }) {
                    f64::from((f(0) as f32).sqrt())
                } else {
                    f(0).sqrt()
                }
            }
        };
        encode_float(cx, ty, r)
    } else {
        let x = |i: usize| decode_int(cx, ty, args[i]);
        let r = match op {
            MathOp::Abs => x(0).wrapping_abs(),
            MathOp::Min => x(0).min(x(1)),
            MathOp::Max => x(0).max(x(1)),
            _ => panic!("integer lanes only support abs/min/max"),
        };
        encode_int(cx, ty, r)
    }
}

// Encoding/decoding helpers for tests.

pub fn f32_bits(v: f32) -> u64 {
    u64::from(v.to_bits())
}

pub fn i32_bits(v: i32) -> u64 {
    (v as u64) & 0xFFFF_FFFF
}

pub fn vec_f32(lanes: &[f32]) -> Val {
    Val::Vec(lanes.iter().map(|&v| f32_bits(v)).collect())
}

pub fn vec_i32(lanes: &[i32]) -> Val {
    Val::Vec(lanes.iter().map(|&v| i32_bits(v)).collect())
}

pub fn as_f32_lanes(v: &Val) -> Vec<f32> {
    match v {
        Val::Vec(lanes) => lanes.iter().map(|&b| f32::from_bits(b as u32)).collect(),
        other => panic!("expected vector, got {other:?}"),
    }
}

pub fn as_i32_lanes(v: &Val) -> Vec<i32> {
    match v {
        Val::Vec(lanes) => lanes.iter().map(|&b| b as u32 as i32).collect(),
        other => panic!("expected vector, got {other:?}"),
    }
}

pub fn as_f32(v: &Val) -> f32 {
    match v {
        Val::Bits(b) => f32::from_bits(*b as u32),
        other => panic!("expected scalar, got {other:?}"),
    }
}

pub fn as_i32(v: &Val) -> i32 {
    match v {
        Val::Bits(b) => *b as u32 as i32,
        other => panic!("expected scalar, got {other:?}"),
    }
}
