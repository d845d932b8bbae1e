//! Plain-text pretty-printing of procedures, for dumps and tests.
//!
//! Deterministic and entirely line-oriented: values print as `%vN` (arena
//! order), parameters as `%argN`, blocks as `bN`. An optional per-value
//! decoration hook lets analyses annotate instructions (e.g. uniformity
//! classifications) without the printer knowing about them.

use crate::{
    Block, ConstKind, Context, Entity, Func, FuncDefBody, Inst, InstKind, Module, Terminator,
    Type, TypeKind, Value,
};
use itertools::Itertools;
use std::fmt::Write as _;

/// A short, mangling-friendly name for a type (also used for synthesized
/// wrapper struct names).
pub fn type_name(cx: &Context, ty: Type) -> String {
    match &cx[ty] {
        TypeKind::Bool => "bool".into(),
        TypeKind::Int { bits, signed: true } => format!("i{bits}"),
        TypeKind::Int { bits, signed: false } => format!("u{bits}"),
        TypeKind::Float { bits } => format!("f{bits}"),
        TypeKind::Ptr(elem) => format!("ptr<{}>", type_name(cx, *elem)),
        TypeKind::Array(elem) => format!("array<{}>", type_name(cx, *elem)),
        TypeKind::Struct { name, .. } => cx[*name].to_string(),
        TypeKind::WideVector { elem, width } => format!("{}[x{width}]", type_name(cx, *elem)),
        TypeKind::NativeVector { elem, bits } => format!("v{bits}<{}>", type_name(cx, *elem)),
    }
}

pub struct Printer<'a> {
    cx: &'a Context,
    module: &'a Module,
}

impl<'a> Printer<'a> {
    pub fn new(cx: &'a Context, module: &'a Module) -> Self {
        Self { cx, module }
    }

    pub fn func_to_string(&self, func: Func) -> String {
        self.func_to_string_with(func, |_| None)
    }

    /// Like [`Self::func_to_string`], with a per-value decoration appended as
    /// a trailing comment (the uniformity analysis plugs in here).
    pub fn func_to_string_with(
        &self,
        func: Func,
        mut decorate: impl FnMut(Value) -> Option<&'static str>,
    ) -> String {
        let decl = &self.module.funcs[func];
        let mut s = String::new();

        let params = decl
            .params
            .iter()
            .enumerate()
            .format_with(", ", |(i, p), f| {
                let uniform = if p.uniform { " uniform" } else { "" };
                f(&format_args!("%arg{i}: {}{uniform}", type_name(self.cx, p.ty)))
            });
        let ret = match decl.ret_type {
            Some(ty) => format!(" -> {}", type_name(self.cx, ty)),
            None => String::new(),
        };
        let _ = writeln!(s, "fn {}({params}){ret} {{", &self.cx[decl.name]);

        if let Some(body) = decl.body() {
            for block in body.blocks.keys() {
                let _ = writeln!(s, "  {}:", block_name(block));
                for &inst in &body.blocks[block].insts {
                    self.print_inst(&mut s, body, inst, &mut decorate);
                }
                let _ = writeln!(s, "    {}", self.terminator_to_string(body, block));
            }
        } else {
            let _ = writeln!(s, "  <imported>");
        }
        s.push_str("}\n");
        s
    }

    fn print_inst(
        &self,
        s: &mut String,
        body: &FuncDefBody,
        inst: Inst,
        decorate: &mut impl FnMut(Value) -> Option<&'static str>,
    ) {
        let def = &body.insts[inst];
        let mut line = String::new();
        match def.output_type {
            Some(ty) => {
                let _ = write!(
                    line,
                    "{} = {} ",
                    value_name(Value::Inst(inst)),
                    format_args!("{}: {}", kind_mnemonic(&def.kind), type_name(self.cx, ty)),
                );
            }
            None => {
                let _ = write!(line, "{} ", kind_mnemonic(&def.kind));
            }
        }

        match &def.kind {
            InstKind::Phi { preds } => {
                let args = preds.iter().zip(&def.inputs).format_with(", ", |(p, v), f| {
                    f(&format_args!("[{}: {}]", block_name(*p), self.value_to_string(*v)))
                });
                let _ = write!(line, "{args}");
            }
            _ => {
                let args =
                    def.inputs.iter().format_with(", ", |v, f| f(&self.value_to_string(*v)));
                let _ = write!(line, "{args}");
            }
        }

        if let Some(deco) = decorate(Value::Inst(inst)) {
            let _ = write!(line, "  // {deco}");
        }
        let _ = writeln!(s, "    {}", line.trim_end());
    }

    fn terminator_to_string(&self, body: &FuncDefBody, block: Block) -> String {
        match &body.blocks[block].terminator {
            Terminator::Branch { target } => format!("br {}", block_name(*target)),
            Terminator::CondBranch { cond, on_true, on_false } => format!(
                "br_if {}, {}, {}",
                self.value_to_string(*cond),
                block_name(*on_true),
                block_name(*on_false),
            ),
            Terminator::Return(Some(v)) => format!("ret {}", self.value_to_string(*v)),
            Terminator::Return(None) => "ret".into(),
            Terminator::Unreachable => "unreachable".into(),
        }
    }

    pub fn value_to_string(&self, v: Value) -> String {
        match v {
            Value::Const(ct) => {
                let def = &self.cx[ct];
                match def.kind {
                    ConstKind::Bool(b) => b.to_string(),
                    ConstKind::Int(i) => format!("{i}{}", type_name(self.cx, def.ty)),
                    ConstKind::Float(bits) => match self.cx[def.ty] {
                        TypeKind::Float { bits: 32 } => {
                            format!("{}f32", f32::from_bits(bits as u32))
                        }
                        _ => format!("{}f64", f64::from_bits(bits)),
                    },
                    ConstKind::Undef => format!("undef: {}", type_name(self.cx, def.ty)),
                }
            }
            Value::Param { .. } | Value::Inst(_) => value_name(v),
        }
    }
}

fn value_name(v: Value) -> String {
    match v {
        Value::Param { idx } => format!("%arg{idx}"),
        Value::Inst(inst) => format!("%v{}", inst.index()),
        Value::Const(_) => unreachable!("constants print inline"),
    }
}

fn block_name(block: Block) -> String {
    format!("b{}", block.index())
}

fn kind_mnemonic(kind: &InstKind) -> String {
    match kind {
        InstKind::Phi { .. } => "phi".into(),
        InstKind::Binary(op) => format!("{op:?}").to_lowercase(),
        InstKind::Compare(op) => format!("cmp.{}", format!("{op:?}").to_lowercase()),
        InstKind::Math(op) => format!("math.{}", format!("{op:?}").to_lowercase()),
        InstKind::Convert { check_overflow } => {
            if *check_overflow { "conv.ovf".into() } else { "conv".into() }
        }
        InstKind::Select => "select".into(),
        InstKind::Load => "load".into(),
        InstKind::Store => "store".into(),
        InstKind::ArrayLen => "arraylen".into(),
        InstKind::ArrayAddr { in_bounds: true } => "arrayaddr.inbounds".into(),
        InstKind::ArrayAddr { in_bounds: false } => "arrayaddr".into(),
        InstKind::FieldAddr { field } => format!("fieldaddr.{field}"),
        InstKind::PtrOffset => "ptroffset".into(),
        InstKind::Call(func) => format!("call.fn{}", func.index()),
        InstKind::TrapIf(kind) => format!("trap_if.{}", format!("{kind:?}").to_lowercase()),
        InstKind::Wide(op) => format!("wide.{}", format!("{op:?}").to_lowercase()),
        InstKind::Native(op) => format!("simd.{}", format!("{op:?}").to_lowercase()),
        InstKind::ExtractField(i) => format!("extractfield.{i}"),
        InstKind::InsertField(i) => format!("insertfield.{i}"),
    }
}
