//! Type inference over authored expressions.
//!
//! Rules are tried in a fixed order; the first that applies wins. When nothing
//! applies the caller's default type is returned and the result is marked as a
//! fallback so the stage compiler can report it.

use std::collections::BTreeMap;

use super::builtins::BuiltinRegistry;
use super::syntax::{Expr, Stmt, is_float_literal, parse_expression, visit_expr, walk_exprs};
use super::types::{Scalar, WgslType};

pub struct InferContext<'a> {
    /// Types of everything already resolved: planned nodes, locals, stage built-ins.
    pub known: &'a BTreeMap<String, WgslType>,
    /// Return types of helper functions.
    pub functions: &'a BTreeMap<String, WgslType>,
    pub registry: &'a BuiltinRegistry,
    /// Body searched for indexed assignments when typing `new Array(n)`.
    pub body: &'a [Stmt],
    pub default_type: &'a WgslType,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Inference {
    pub ty: WgslType,
    pub is_fallback: bool,
}

impl Inference {
    fn of(ty: WgslType) -> Self {
        Self {
            ty,
            is_fallback: false,
        }
    }

    fn fallback(ctx: &InferContext<'_>) -> Self {
        Self {
            ty: ctx.default_type.clone(),
            is_fallback: true,
        }
    }
}

/// WGSL built-ins whose result has the type of their first argument.
const SAME_AS_FIRST_ARG: &[&str] = &[
    "abs", "acos", "acosh", "asin", "asinh", "atan", "atanh", "atan2", "ceil", "clamp", "cos",
    "cosh", "countLeadingZeros", "countOneBits", "countTrailingZeros", "cross", "degrees",
    "exp", "exp2", "faceForward", "floor", "fma", "fract", "inverseSqrt", "log", "log2", "max",
    "min", "mix", "normalize", "pow", "radians", "reflect", "refract", "reverseBits", "round",
    "saturate", "select", "sign", "sin", "sinh", "smoothstep", "sqrt", "step", "tan", "tanh",
    "transpose", "trunc", "dpdx", "dpdy", "fwidth",
];

/// Element type of a typed-array constructor name.
pub fn typed_array_element(name: &str) -> Option<Scalar> {
    Some(match name {
        "Float32Array" | "Float64Array" => Scalar::F32,
        "Float16Array" => Scalar::F16,
        "Int8Array" | "Int16Array" | "Int32Array" | "BigInt64Array" => Scalar::I32,
        "Uint8Array" | "Uint16Array" | "Uint32Array" | "Uint8ClampedArray" | "BigUint64Array" => {
            Scalar::U32
        }
        _ => return None,
    })
}

/// `vec3`, `vec3f`, `mat4`, `mat2x3h`: the constructed shape, and whether the
/// element type was spelled out.
pub fn constructor_shape(name: &str) -> Option<(WgslType, bool)> {
    if !(name.starts_with("vec") || name.starts_with("mat")) {
        return None;
    }
    let ty = WgslType::parse(name);
    if !ty.is_vector_or_matrix() {
        return None;
    }
    let explicit = name
        .chars()
        .last()
        .is_some_and(|c| matches!(c, 'f' | 'i' | 'u' | 'h'));
    Some((ty, explicit))
}

fn is_swizzle(prop: &str) -> bool {
    (1..=4).contains(&prop.len())
        && (prop.chars().all(|c| "xyzw".contains(c)) || prop.chars().all(|c| "rgba".contains(c)))
}

fn literal_length(expr: &Expr) -> Option<u32> {
    expr.number_value()
        .filter(|v| *v >= 0.0 && v.fract() == 0.0)
        .map(|v| v as u32)
}

pub fn number_type(text: &str) -> WgslType {
    if is_float_literal(text) {
        if text.ends_with('h') {
            WgslType::Scalar(Scalar::F16)
        } else {
            WgslType::F32
        }
    } else if text.ends_with('u') {
        WgslType::U32
    } else {
        WgslType::I32
    }
}

fn contains_float_literal(expr: &Expr) -> bool {
    let mut found = false;
    visit_expr(expr, &mut |e| {
        if let Expr::Number(text) = e
            && is_float_literal(text)
        {
            found = true;
        }
    });
    found
}

/// Arithmetic result type: vector or matrix side wins, then float.
pub fn combine_arithmetic(l: &WgslType, r: &WgslType) -> WgslType {
    match (l, r) {
        (WgslType::Matrix { rows, scalar, .. }, WgslType::Vector { .. }) => WgslType::Vector {
            size: *rows,
            scalar: *scalar,
        },
        (WgslType::Vector { .. }, WgslType::Matrix { columns, scalar, .. }) => WgslType::Vector {
            size: *columns,
            scalar: *scalar,
        },
        (WgslType::Matrix { .. } | WgslType::Vector { .. }, _) => l.clone(),
        (_, WgslType::Matrix { .. } | WgslType::Vector { .. }) => r.clone(),
        (WgslType::Scalar(a), WgslType::Scalar(_)) if a.is_float() => l.clone(),
        (WgslType::Scalar(_), WgslType::Scalar(b)) if b.is_float() => r.clone(),
        _ => l.clone(),
    }
}

/// [`combine_arithmetic`] with `i32` preferred when the sides disagree on
/// signedness.
pub fn promote(l: &WgslType, r: &WgslType) -> WgslType {
    let ty = combine_arithmetic(l, r);
    let signed = l.scalar() == Some(Scalar::I32) || r.scalar() == Some(Scalar::I32);
    if ty.scalar() == Some(Scalar::U32) && signed {
        ty.with_scalar(Scalar::I32)
    } else {
        ty
    }
}

/// Type both sides of an arithmetic, comparison or `?:` pair are converted
/// to. Integer literals are abstract and take the other side's type.
pub fn operand_type(left: &Expr, l: &WgslType, right: &Expr, r: &WgslType) -> WgslType {
    let literal = |e: &Expr, t: &WgslType| e.is_numeric_literal() && !t.is_float();
    match (literal(left, l), literal(right, r)) {
        (true, false) => combine_arithmetic(r, l),
        (false, true) => combine_arithmetic(l, r),
        _ => promote(l, r),
    }
}

pub fn infer(expr: &Expr, ctx: &InferContext<'_>) -> Inference {
    infer_named(None, expr, ctx)
}

/// Infer from source text. A quoted string names the type directly.
pub fn infer_str(text: &str, ctx: &InferContext<'_>) -> Inference {
    match parse_expression(text.trim()) {
        Ok(expr) => infer(&expr, ctx),
        Err(_) => Inference::fallback(ctx),
    }
}

/// Infer the type of `expr`, which initialises `name` when given.
pub fn infer_named(name: Option<&str>, expr: &Expr, ctx: &InferContext<'_>) -> Inference {
    match expr {
        Expr::Bool(_) => Inference::of(WgslType::BOOL),
        Expr::Str(raw) => {
            let inner = raw.get(1..raw.len().saturating_sub(1)).unwrap_or_default();
            Inference::of(WgslType::parse(inner))
        }
        Expr::Call { callee, args } => infer_call(name, callee, args, ctx),
        Expr::Array(items) => infer_array_literal(items, ctx),
        Expr::New { callee, args } => infer_new(name, callee, args, ctx),
        Expr::Number(text) => Inference::of(number_type(text)),
        Expr::Ident(id) => infer_ident(id, ctx),
        Expr::Paren(inner) => infer_named(name, inner, ctx),
        Expr::Member { object, property } => infer_member(object, property, ctx),
        Expr::Index { object, .. } => {
            let base = infer(object, ctx);
            let ty = match &base.ty {
                WgslType::Array { element, .. } => (**element).clone(),
                WgslType::Vector { scalar, .. } => WgslType::Scalar(*scalar),
                WgslType::Matrix { rows, scalar, .. } => WgslType::Vector {
                    size: *rows,
                    scalar: *scalar,
                },
                _ => return Inference::fallback(ctx),
            };
            Inference {
                ty,
                is_fallback: base.is_fallback,
            }
        }
        Expr::Unary { op, operand } => {
            if op == "!" {
                Inference::of(WgslType::BOOL)
            } else {
                infer(operand, ctx)
            }
        }
        Expr::Update { operand, .. } => infer(operand, ctx),
        Expr::Binary { op, left, right } => infer_binary(op, left, right, ctx),
        Expr::Assign { value, .. } => infer(value, ctx),
        Expr::Conditional {
            then, otherwise, ..
        } => {
            let a = infer(then, ctx);
            let b = infer(otherwise, ctx);
            match (a.is_fallback, b.is_fallback) {
                (false, false) => Inference::of(operand_type(then, &a.ty, otherwise, &b.ty)),
                (true, false) => b,
                _ => a,
            }
        }
        Expr::Function(_) => Inference::fallback(ctx),
    }
}

fn infer_ident(id: &str, ctx: &InferContext<'_>) -> Inference {
    if let Some(ty) = ctx.known.get(id) {
        return Inference::of(ty.clone());
    }
    if let Some(b) = ctx.registry.get(id) {
        return Inference::of(b.ty.clone());
    }
    Inference::fallback(ctx)
}

fn infer_member(object: &Expr, property: &str, ctx: &InferContext<'_>) -> Inference {
    if object.as_ident() == Some("Math") {
        return Inference::of(WgslType::F32);
    }
    if property == "length" {
        return Inference::of(WgslType::U32);
    }
    let base = infer(object, ctx);
    match &base.ty {
        WgslType::Vector { scalar, .. } if is_swizzle(property) => {
            let ty = if property.len() == 1 {
                WgslType::Scalar(*scalar)
            } else {
                WgslType::vector(property.len() as u8, *scalar)
            };
            Inference {
                ty,
                is_fallback: base.is_fallback,
            }
        }
        _ => Inference::fallback(ctx),
    }
}

fn infer_binary(op: &str, left: &Expr, right: &Expr, ctx: &InferContext<'_>) -> Inference {
    match op {
        "==" | "!=" | "===" | "!==" | "<" | ">" | "<=" | ">=" | "&&" | "||" => {
            Inference::of(WgslType::BOOL)
        }
        "<<" | ">>" | ">>>" | "&" | "|" | "^" => infer(left, ctx),
        "??" => infer(left, ctx),
        _ => {
            let l = infer(left, ctx);
            let r = infer(right, ctx);
            let mut ty = operand_type(left, &l.ty, right, &r.ty);
            if op == "**" && !ty.is_float() {
                ty = ty.with_scalar(Scalar::F32);
            }
            Inference {
                ty,
                is_fallback: l.is_fallback && r.is_fallback,
            }
        }
    }
}

fn infer_array_literal(items: &[Expr], ctx: &InferContext<'_>) -> Inference {
    let Some(first) = items.first() else {
        return Inference::of(WgslType::array(WgslType::F32, None));
    };
    let first_ty = infer(first, ctx);
    let element = if first_ty.ty.is_vector_or_matrix() {
        first_ty.ty
    } else if items.iter().any(contains_float_literal) {
        WgslType::F32
    } else {
        first_ty.ty
    };
    Inference::of(WgslType::array(element, Some(items.len() as u32)))
}

fn infer_constructor(ty: WgslType, explicit: bool, args: &[Expr], ctx: &InferContext<'_>) -> WgslType {
    if explicit || matches!(ty, WgslType::Matrix { .. }) {
        return ty;
    }
    let arg_types: Vec<WgslType> = args.iter().map(|a| infer(a, ctx).ty).collect();
    let scalar = if args.iter().any(contains_float_literal) || arg_types.iter().any(WgslType::is_float)
    {
        Scalar::F32
    } else if arg_types.iter().any(|t| t.scalar() == Some(Scalar::U32)) {
        Scalar::U32
    } else {
        Scalar::I32
    };
    ty.with_scalar(scalar)
}

fn infer_call(name: Option<&str>, callee: &Expr, args: &[Expr], ctx: &InferContext<'_>) -> Inference {
    let first_arg = || {
        args.first()
            .map(|a| infer(a, ctx))
            .unwrap_or_else(|| Inference::fallback(ctx))
    };
    match callee {
        Expr::Ident(fname) => {
            if let Some((ty, explicit)) = constructor_shape(fname) {
                return Inference::of(infer_constructor(ty, explicit, args, ctx));
            }
            if let Some(ty) = ctx.functions.get(fname.as_str()) {
                return Inference::of(ty.clone());
            }
            match fname.as_str() {
                "f32" | "i32" | "u32" | "f16" | "bool" => Inference::of(WgslType::parse(fname)),
                "arrayLength" | "textureNumLayers" | "textureNumLevels" | "textureNumSamples" => {
                    Inference::of(WgslType::U32)
                }
                "length" | "distance" | "dot" | "determinant" => {
                    let t = first_arg();
                    let scalar = t.ty.scalar().unwrap_or(Scalar::F32);
                    Inference {
                        ty: WgslType::Scalar(scalar),
                        is_fallback: t.is_fallback,
                    }
                }
                "all" | "any" => Inference::of(WgslType::BOOL),
                "textureSampleCompare" | "textureSampleCompareLevel" => {
                    Inference::of(WgslType::F32)
                }
                "textureDimensions" => Inference::of(WgslType::vector(2, Scalar::U32)),
                n if n.starts_with("texture") => {
                    let depth = args
                        .first()
                        .and_then(|a| a.as_ident())
                        .and_then(|t| ctx.known.get(t))
                        .is_some_and(|t| matches!(t, WgslType::Named(s) if s.starts_with("texture_depth")));
                    if depth && (n.starts_with("textureSample") || n == "textureLoad") {
                        Inference::of(WgslType::F32)
                    } else {
                        Inference::of(WgslType::vector(4, Scalar::F32))
                    }
                }
                n if SAME_AS_FIRST_ARG.contains(&n) => first_arg(),
                _ => Inference::fallback(ctx),
            }
        }
        Expr::Member { object, property } => {
            if object.as_ident() == Some("Math") {
                return match property.as_str() {
                    "fround" => Inference::of(WgslType::F32),
                    "clz32" => Inference::of(WgslType::U32),
                    _ => first_arg(),
                };
            }
            if property == "fill" {
                if let Expr::New { callee, args: new_args } = object.unparen()
                    && callee.as_ident() == Some("Array")
                {
                    let length = new_args.first().and_then(literal_length);
                    let element = match args.first() {
                        Some(v) => infer(v, ctx),
                        None => return infer_new(name, callee, new_args, ctx),
                    };
                    return Inference {
                        ty: WgslType::array(element.ty, length),
                        is_fallback: element.is_fallback,
                    };
                }
            }
            Inference::fallback(ctx)
        }
        _ => Inference::fallback(ctx),
    }
}

fn infer_new(name: Option<&str>, callee: &Expr, args: &[Expr], ctx: &InferContext<'_>) -> Inference {
    let Some(ctor) = callee.as_ident() else {
        return Inference::fallback(ctx);
    };
    let length = match args {
        [arg] if arg.is_numeric_literal() => literal_length(arg),
        [Expr::Array(items)] => Some(items.len() as u32),
        _ => None,
    };
    if let Some(scalar) = typed_array_element(ctor) {
        return Inference::of(WgslType::array(WgslType::Scalar(scalar), length));
    }
    if ctor == "Array" {
        if let Some(element) = name.and_then(|n| indexed_assignment_type(n, ctx)) {
            return Inference::of(WgslType::array(element, length));
        }
        return Inference {
            ty: WgslType::array(ctx.default_type.clone(), length),
            is_fallback: true,
        };
    }
    Inference::fallback(ctx)
}

/// Type of the right-hand side of the first `name[i] = value` in the body.
fn indexed_assignment_type(name: &str, ctx: &InferContext<'_>) -> Option<WgslType> {
    let mut found = None;
    walk_exprs(ctx.body, &mut |e| {
        if found.is_some() {
            return;
        }
        if let Expr::Assign { target, value, .. } = e
            && let Expr::Index { object, .. } = target.as_ref()
            && object.as_ident() == Some(name)
        {
            found = Some(infer(value, ctx));
        }
    });
    found.filter(|i| !i.is_fallback).map(|i| i.ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transpiler::syntax::parse_statements;

    struct Fixture {
        known: BTreeMap<String, WgslType>,
        functions: BTreeMap<String, WgslType>,
        registry: BuiltinRegistry,
        body: Vec<Stmt>,
        default_type: WgslType,
    }

    impl Fixture {
        fn new(body: &str) -> Self {
            Self {
                known: BTreeMap::new(),
                functions: BTreeMap::new(),
                registry: BuiltinRegistry::standard(),
                body: parse_statements(body).unwrap(),
                default_type: WgslType::F32,
            }
        }

        fn ctx(&self) -> InferContext<'_> {
            InferContext {
                known: &self.known,
                functions: &self.functions,
                registry: &self.registry,
                body: &self.body,
                default_type: &self.default_type,
            }
        }

        fn ty(&self, src: &str) -> String {
            infer_str(src, &self.ctx()).ty.to_string()
        }
    }

    #[test]
    fn test_literal_rules_in_order() {
        let f = Fixture::new("");
        assert_eq!(f.ty("true"), "bool");
        assert_eq!(f.ty("'vec2<u32>'"), "vec2u");
        assert_eq!(f.ty("vec3(1, 2, 3)"), "vec3i");
        assert_eq!(f.ty("vec3(1.0, 2, 3)"), "vec3f");
        assert_eq!(f.ty("vec2h(1, 2)"), "vec2h");
        assert_eq!(f.ty("vec2(1u, 2u)"), "vec2u");
        assert_eq!(f.ty("mat4(1)"), "mat4x4f");
        assert_eq!(f.ty("1.5"), "f32");
        assert_eq!(f.ty("2e3"), "f32");
        assert_eq!(f.ty("7"), "i32");
        assert_eq!(f.ty("7u"), "u32");
    }

    #[test]
    fn test_array_rules() {
        let f = Fixture::new("");
        assert_eq!(f.ty("[1.0, 2.0, 3.0, 4.0]"), "array<f32, 4>");
        assert_eq!(f.ty("[1, 2]"), "array<i32, 2>");
        assert_eq!(f.ty("[1, 2.5]"), "array<f32, 2>");
        assert_eq!(f.ty("[vec2(1.0, 2.0)]"), "array<vec2f, 1>");
        assert_eq!(f.ty("[]"), "array<f32>");
        assert_eq!(f.ty("new Float64Array(8)"), "array<f32, 8>");
        assert_eq!(f.ty("new Uint8Array(4)"), "array<u32, 4>");
        assert_eq!(f.ty("new Int16Array([1, 2, 3])"), "array<i32, 3>");
        assert_eq!(f.ty("new Array(3).fill(vec3(0.0))"), "array<vec3f, 3>");
    }

    #[test]
    fn test_new_array_uses_later_indexed_assignment() {
        let f = Fixture::new("let arr = new Array(4)\narr[0] = vec2(1.0, 0.0)");
        let expr = parse_expression("new Array(4)").unwrap();
        let inf = infer_named(Some("arr"), &expr, &f.ctx());
        assert_eq!(inf.ty.to_string(), "array<vec2f, 4>");
        assert!(!inf.is_fallback);

        let inf = infer_named(Some("other"), &expr, &f.ctx());
        assert!(inf.is_fallback);
    }

    #[test]
    fn test_identifiers_and_structure() {
        let mut f = Fixture::new("");
        f.known.insert("v".into(), WgslType::vector(3, Scalar::F32));
        f.known
            .insert("data".into(), WgslType::array(WgslType::F32, None));
        f.known.insert("threadId".into(), WgslType::vector(3, Scalar::U32));
        assert_eq!(f.ty("v"), "vec3f");
        assert_eq!(f.ty("v.xy"), "vec2f");
        assert_eq!(f.ty("v.x * 2"), "f32");
        assert_eq!(f.ty("data"), "array<f32>");
        assert_eq!(f.ty("data[threadId.x]"), "f32");
        assert_eq!(f.ty("threadId.x"), "u32");
        assert_eq!(f.ty("resX"), "f32");
        assert_eq!(f.ty("clicked"), "i32");
        assert_eq!(f.ty("a < b"), "bool");
        assert_eq!(f.ty("length(v)"), "f32");
        assert_eq!(f.ty("normalize(v)"), "vec3f");
        assert_eq!(f.ty("Math.sqrt(2.0)"), "f32");
        assert_eq!(f.ty("2 ** 3"), "f32");
    }

    #[test]
    fn test_mixed_operands_and_ternary_branches() {
        let mut f = Fixture::new("");
        f.known.insert("i".into(), WgslType::I32);
        f.known.insert("x".into(), WgslType::F32);
        f.known.insert("threadId".into(), WgslType::vector(3, Scalar::U32));
        assert_eq!(f.ty("i * x"), "f32");
        assert_eq!(f.ty("threadId.x + 1"), "u32");
        assert_eq!(f.ty("1 + threadId.x"), "u32");
        assert_eq!(f.ty("i + threadId.x"), "i32");
        assert_eq!(f.ty("x > 0.0 ? i : x"), "f32");
        assert_eq!(f.ty("x > 0.0 ? 1 : threadId.x"), "u32");
        assert_eq!(f.ty("x > 0.0 ? mystery : i"), "i32");
    }

    #[test]
    fn test_unknown_identifier_falls_back() {
        let f = Fixture::new("");
        let inf = infer_str("mystery", &f.ctx());
        assert_eq!(inf.ty, WgslType::F32);
        assert!(inf.is_fallback);
        assert!(!infer_str("1.0", &f.ctx()).is_fallback);
    }
}
