//! Structural rewrite of an authored body into WGSL statements.

use std::collections::{BTreeMap, BTreeSet};

use super::builtins::BuiltinRegistry;
use super::infer::{
    InferContext, Inference, constructor_shape, infer_named, operand_type, typed_array_element,
};
use super::math_table::MathTable;
use super::planner::{DEFAULTS_VAR, UNIFORMS_VAR};
use super::syntax::{DeclKind, Declarator, Expr, Stmt};
use super::types::{AttributedNode, ResourceClass, Scalar, StageKind, WgslType};
use super::utils::fmt_float;

const INDENT: &str = "    ";

pub struct RewriteContext<'a> {
    pub stage: StageKind,
    /// True for the outermost stage function, false for helpers.
    pub entry: bool,
    pub nodes: &'a [AttributedNode],
    /// Interstage field names mapped to `pixel.<name>` in render stages.
    pub interstage: &'a BTreeSet<String>,
    pub known: &'a BTreeMap<String, WgslType>,
    pub functions: &'a BTreeMap<String, WgslType>,
    pub registry: &'a BuiltinRegistry,
    pub math: &'a MathTable,
    pub default_type: &'a WgslType,
    pub hoist_consts: bool,
    /// Helper parameters; they shadow planned names.
    pub params: &'a [(String, WgslType)],
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Rewritten {
    /// Statement lines at indentation zero, joined by newlines.
    pub code: String,
    /// Module-scope `const` declarations lifted out of the body.
    pub hoisted: Vec<String>,
    /// Type of the first `return` value, for helpers.
    pub return_type: Option<WgslType>,
    /// Helper locals typed by the inference fallback.
    pub fallbacks: Vec<String>,
}

pub fn rewrite(body: &[Stmt], ctx: RewriteContext<'_>) -> Rewritten {
    let mut types = ctx.known.clone();
    let mut top = BTreeSet::new();
    for (name, ty) in ctx.params {
        types.insert(name.clone(), ty.clone());
        top.insert(name.clone());
    }
    let mut rw = Rewriter {
        ctx,
        body,
        types,
        scopes: vec![top],
        hoisted: Vec::new(),
        hoisted_names: BTreeSet::new(),
        lines: Vec::new(),
        depth: 0,
        return_type: None,
        fallbacks: Vec::new(),
        has_return: false,
        pending: Vec::new(),
        temps: 0,
    };
    for stmt in body {
        rw.stmt(stmt);
    }
    if rw.ctx.entry && rw.ctx.stage == StageKind::Fragment {
        let ends_in_return = body
            .iter()
            .rev()
            .find(|s| !matches!(s, Stmt::Comment { .. } | Stmt::Empty))
            .is_some_and(|s| matches!(s, Stmt::Return(_)));
        if !ends_in_return {
            if !rw.has_return {
                log::warn!("fragment body has no return; emitting transparent black");
            }
            rw.line("return vec4f(0.0);".to_string());
        }
    }
    Rewritten {
        code: rw.lines.join("\n"),
        hoisted: rw.hoisted,
        return_type: rw.return_type,
        fallbacks: rw.fallbacks,
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum OpClass {
    Mul,
    Add,
    Shift,
    Relational,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
}

fn op_class(op: &str) -> Option<OpClass> {
    Some(match op {
        "*" | "/" | "%" => OpClass::Mul,
        "+" | "-" => OpClass::Add,
        "<<" | ">>" | ">>>" => OpClass::Shift,
        "<" | ">" | "<=" | ">=" | "==" | "!=" | "===" | "!==" => OpClass::Relational,
        "&&" => OpClass::And,
        "||" => OpClass::Or,
        "&" => OpClass::BitAnd,
        "|" => OpClass::BitOr,
        "^" => OpClass::BitXor,
        _ => return None,
    })
}

/// WGSL refuses to mix several operator groups without parentheses.
fn needs_parens(parent: OpClass, child: OpClass, right: bool) -> bool {
    use OpClass::*;
    match parent {
        Mul => child != Mul || right,
        Add => match child {
            Mul => false,
            Add => right,
            _ => true,
        },
        Shift => true,
        Relational => !matches!(child, Mul | Add | Shift),
        And => !matches!(child, Mul | Add | Shift | Relational | And),
        Or => !matches!(child, Mul | Add | Shift | Relational | Or),
        BitAnd | BitOr | BitXor => child != parent || right,
    }
}

fn wgsl_op(op: &str) -> &str {
    match op {
        "===" => "==",
        "!==" => "!=",
        ">>>" => ">>",
        other => other,
    }
}

fn number_text(raw: &str) -> String {
    let mut t: String = raw.chars().filter(|c| *c != '_').collect();
    if t.ends_with('n') {
        t.pop();
    }
    if t.starts_with('.') {
        t.insert(0, '0');
    }
    if t.ends_with('.') {
        t.push('0');
    }
    t
}

/// `new Array(n).fill(v)`: the length expression and fill value.
fn array_fill(expr: &Expr) -> Option<(&Expr, &Expr)> {
    let Expr::Call { callee, args } = expr.unparen() else {
        return None;
    };
    let Expr::Member { object, property } = callee.as_ref() else {
        return None;
    };
    if property != "fill" {
        return None;
    }
    match (object.unparen(), args.as_slice()) {
        (Expr::New { callee, args: new_args }, [value]) if callee.as_ident() == Some("Array") => {
            new_args.first().map(|n| (n, value))
        }
        _ => None,
    }
}

/// The type `from` must be converted to so it can meet `target`, if any.
/// Scalars are splatted into vector targets only when `splat` is set.
fn conversion(from: &WgslType, target: &WgslType, splat: bool) -> Option<WgslType> {
    if !matches!(target, WgslType::Scalar(_) | WgslType::Vector { .. }) {
        return None;
    }
    let want = target.scalar().filter(|s| *s != Scalar::Bool)?;
    let have = from.scalar().filter(|s| *s != Scalar::Bool)?;
    match (from, target) {
        (WgslType::Scalar(_), WgslType::Vector { .. }) if splat => Some(target.clone()),
        (WgslType::Scalar(_) | WgslType::Vector { .. }, _) if have != want => {
            Some(from.with_scalar(want))
        }
        _ => None,
    }
}

/// Wrap `text` (the emitted `e` of type `from`) so it has type `to`.
/// Integer literals are re-spelled instead of wrapped.
fn convert_text(text: String, e: &Expr, from: &WgslType, to: &WgslType) -> String {
    match to {
        WgslType::Vector { scalar, .. } if matches!(from, WgslType::Scalar(_)) => {
            let inner = match conversion(from, &WgslType::Scalar(*scalar), false) {
                Some(s) => convert_text(text, e, from, &s),
                None => text,
            };
            format!("{to}({inner})")
        }
        WgslType::Scalar(s) if e.is_numeric_literal() && !from.is_float() => {
            match e.number_value() {
                Some(v) if s.is_float() => fmt_float(v),
                Some(v) if v.fract() == 0.0 && (v >= 0.0 || *s == Scalar::I32) => {
                    format!("{}", v as i64)
                }
                _ => format!("{to}({text})"),
            }
        }
        _ => format!("{to}({text})"),
    }
}

fn is_sized_new(expr: &Expr) -> bool {
    match expr.unparen() {
        Expr::New { callee, args } => {
            let ctor = callee.as_ident().unwrap_or_default();
            (ctor == "Array" || typed_array_element(ctor).is_some())
                && matches!(args.as_slice(), [n] if n.is_numeric_literal())
        }
        _ => false,
    }
}

struct Rewriter<'a> {
    ctx: RewriteContext<'a>,
    body: &'a [Stmt],
    types: BTreeMap<String, WgslType>,
    scopes: Vec<BTreeSet<String>>,
    hoisted: Vec<String>,
    hoisted_names: BTreeSet<String>,
    lines: Vec<String>,
    depth: usize,
    return_type: Option<WgslType>,
    fallbacks: Vec<String>,
    has_return: bool,
    /// Statements an expression needs to run first; flushed before the next line.
    pending: Vec<String>,
    temps: usize,
}

impl Rewriter<'_> {
    fn line(&mut self, text: String) {
        let indent = INDENT.repeat(self.depth);
        for before in std::mem::take(&mut self.pending) {
            self.lines.push(format!("{indent}{before}"));
        }
        self.lines.push(format!("{indent}{text}"));
    }

    fn temp(&mut self, prefix: &str) -> String {
        let name = format!("{prefix}_{}", self.temps);
        self.temps += 1;
        name
    }

    /// Loop conditions are evaluated once up front when they hoist statements.
    fn warn_hoisted_condition(&self, kind: &str, before: usize) {
        if self.pending.len() > before {
            log::warn!("side effect in a {kind} condition runs once before the loop");
        }
    }

    fn infer(&self, name: Option<&str>, expr: &Expr) -> Inference {
        let ictx = InferContext {
            known: &self.types,
            functions: self.ctx.functions,
            registry: self.ctx.registry,
            body: self.body,
            default_type: self.ctx.default_type,
        };
        infer_named(name, expr, &ictx)
    }

    fn is_shadowed(&self, name: &str) -> bool {
        self.scopes.iter().any(|s| s.contains(name))
    }

    fn node(&self, name: &str) -> Option<&AttributedNode> {
        if self.is_shadowed(name) {
            return None;
        }
        self.ctx.nodes.iter().find(|n| n.name == name)
    }

    fn is_storage(&self, name: &str) -> bool {
        self.node(name).is_some_and(AttributedNode::is_storage_array)
    }

    fn resolve(&self, name: &str) -> String {
        if let Some(node) = self.node(name) {
            match node.class {
                ResourceClass::Uniform if node.ty == WgslType::BOOL => {
                    return format!("bool({UNIFORMS_VAR}.{name})");
                }
                ResourceClass::Uniform => return format!("{UNIFORMS_VAR}.{name}"),
                ResourceClass::DefaultUniform => return format!("{DEFAULTS_VAR}.{name}"),
                _ => {}
            }
        }
        if self.ctx.stage.is_render()
            && !self.is_shadowed(name)
            && (name == "position" || self.ctx.interstage.contains(name))
        {
            return format!("pixel.{name}");
        }
        name.to_string()
    }

    fn declare_local(&mut self, name: &str, ty: WgslType) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
        self.types.insert(name.to_string(), ty);
    }

    fn nested(&mut self, stmt: &Stmt) {
        self.depth += 1;
        self.scopes.push(BTreeSet::new());
        match stmt {
            Stmt::Block(inner) => inner.iter().for_each(|s| self.stmt(s)),
            other => self.stmt(other),
        }
        self.scopes.pop();
        self.depth -= 1;
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Decl { kind, declarators } => {
                for d in declarators {
                    self.declaration(*kind, d);
                }
            }
            Stmt::Expr(e) => self.expr_stmt(e),
            Stmt::If {
                test,
                then,
                otherwise,
            } => {
                let cond = self.condition(test);
                self.line(format!("if ({cond}) {{"));
                self.nested(then);
                let mut rest = otherwise.as_deref();
                while let Some(o) = rest {
                    if let Stmt::If {
                        test,
                        then,
                        otherwise,
                    } = o
                    {
                        let cond = self.condition(test);
                        self.line(format!("}} else if ({cond}) {{"));
                        self.nested(then);
                        rest = otherwise.as_deref();
                    } else {
                        self.line("} else {".to_string());
                        self.nested(o);
                        rest = None;
                    }
                }
                self.line("}".to_string());
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                self.scopes.push(BTreeSet::new());
                let init = match init.as_deref() {
                    Some(Stmt::Decl { kind, declarators }) => declarators
                        .iter()
                        .map(|d| self.declaration_text(*kind, d))
                        .collect::<Vec<_>>()
                        .join(", "),
                    Some(Stmt::Expr(e)) => self.statement_expr(e),
                    _ => String::new(),
                };
                let before = self.pending.len();
                let test = test.as_ref().map(|t| self.condition(t)).unwrap_or_default();
                self.warn_hoisted_condition("for", before);
                let update = update
                    .as_ref()
                    .map(|u| self.statement_expr(u))
                    .unwrap_or_default();
                self.line(format!("for ({init}; {test}; {update}) {{"));
                self.nested(body);
                self.line("}".to_string());
                self.scopes.pop();
            }
            Stmt::While { test, body } => {
                let cond = self.condition(test);
                self.warn_hoisted_condition("while", 0);
                self.line(format!("while ({cond}) {{"));
                self.nested(body);
                self.line("}".to_string());
            }
            Stmt::DoWhile { body, test } => {
                self.line("loop {".to_string());
                self.nested(body);
                let cond = self.condition(test);
                self.depth += 1;
                self.line("continuing {".to_string());
                self.depth += 1;
                self.line(format!("break if !({cond});"));
                self.depth -= 1;
                self.line("}".to_string());
                self.depth -= 1;
                self.line("}".to_string());
            }
            Stmt::Block(_) => {
                self.line("{".to_string());
                self.nested(stmt);
                self.line("}".to_string());
            }
            Stmt::Return(value) => self.return_stmt(value.as_ref()),
            Stmt::Break => self.line("break;".to_string()),
            Stmt::Continue => self.line("continue;".to_string()),
            Stmt::Function(f) => {
                log::debug!(
                    "nested function `{}` left to the helper pass",
                    f.name.as_deref().unwrap_or("<anonymous>")
                );
            }
            Stmt::Comment { text, trailing } => {
                if *trailing && let Some(last) = self.lines.last_mut() {
                    last.push(' ');
                    last.push_str(text);
                } else {
                    self.line(text.clone());
                }
            }
            Stmt::Empty => {}
        }
    }

    fn expr_stmt(&mut self, e: &Expr) {
        match e {
            Expr::Assign { op, target, value } if op == "=" => {
                if let Some((len, fill)) = array_fill(value) {
                    let element = self.infer(None, target).ty.element().cloned();
                    let target = match target.as_ident() {
                        Some(name) if self.is_storage(name) => format!("{name}.values"),
                        _ => self.expr(target),
                    };
                    for l in self.fill_lines(&target, len, fill, element.as_ref()) {
                        self.line(l);
                    }
                    return;
                }
                let text = self.expr(e);
                self.line(format!("{text};"));
            }
            Expr::Assign { .. } | Expr::Update { .. } | Expr::Call { .. } => {
                let text = self.statement_expr(e);
                self.line(format!("{text};"));
            }
            Expr::Paren(inner) => self.expr_stmt(inner),
            other => log::debug!("dropping expression statement without effect: {other:?}"),
        }
    }

    /// An expression whose value is discarded; `++x` and `x++` both become `x++`.
    fn statement_expr(&mut self, e: &Expr) -> String {
        match e.unparen() {
            Expr::Update { op, operand, .. } => {
                let text = self.expr(operand);
                format!("{text}{op}")
            }
            _ => self.expr(e),
        }
    }

    /// A counted loop storing `value` into every slot of `target`, at relative indentation.
    fn fill_lines(
        &mut self,
        target: &str,
        len: &Expr,
        value: &Expr,
        element: Option<&WgslType>,
    ) -> Vec<String> {
        let counter = format!("fill_{}_i", target.replace(['.', '[', ']'], "_"));
        let len = self.expr_as(len, &WgslType::I32);
        let value = match element {
            Some(el) => self.expr_as(value, el),
            None => self.expr(value),
        };
        vec![
            format!("for (var {counter}: i32 = 0; {counter} < {len}; {counter}++) {{"),
            format!("{INDENT}{target}[{counter}] = {value};"),
            "}".to_string(),
        ]
    }

    fn is_const_expr(&self, e: &Expr) -> bool {
        match e.unparen() {
            Expr::Number(_) | Expr::Bool(_) => true,
            Expr::Ident(n) => self.hoisted_names.contains(n),
            Expr::Member { object, property } => {
                object.as_ident() == Some("Math") && self.ctx.math.constant(property).is_some()
            }
            Expr::Unary { operand, .. } => self.is_const_expr(operand),
            Expr::Binary { left, right, .. } => {
                self.is_const_expr(left) && self.is_const_expr(right)
            }
            Expr::Call { callee, args } => {
                let callable = match callee.as_ref() {
                    Expr::Ident(n) => {
                        constructor_shape(n).is_some() || matches!(n.as_str(), "f32" | "i32" | "u32")
                    }
                    Expr::Member { object, property } => {
                        object.as_ident() == Some("Math")
                            && self.ctx.math.function(property).is_some()
                    }
                    _ => false,
                };
                callable && args.iter().all(|a| self.is_const_expr(a))
            }
            _ => false,
        }
    }

    fn infer_declared(&mut self, name: &str, init: Option<&Expr>) -> WgslType {
        let inf = match init {
            Some(e) => self.infer(Some(name), e),
            None => match self.types.get(name) {
                Some(ty) => Inference {
                    ty: ty.clone(),
                    is_fallback: false,
                },
                None => Inference {
                    ty: self.ctx.default_type.clone(),
                    is_fallback: true,
                },
            },
        };
        if inf.is_fallback && !self.ctx.entry {
            log::warn!("no inference rule matched `{name}`; using {}", inf.ty);
            self.fallbacks.push(name.to_string());
        }
        inf.ty
    }

    /// `var i: i32 = 0` for loop headers.
    fn declaration_text(&mut self, kind: DeclKind, d: &Declarator) -> String {
        let ty = self.infer_declared(&d.name, d.init.as_ref());
        let keyword = match kind {
            DeclKind::Const if ty.is_vector_or_matrix() => "let",
            _ => "var",
        };
        let text = match &d.init {
            Some(init) => format!("{keyword} {}: {ty} = {}", d.name, self.expr(init)),
            None => format!("var {}: {ty}", d.name),
        };
        self.declare_local(&d.name, ty);
        text
    }

    fn declaration(&mut self, kind: DeclKind, d: &Declarator) {
        let name = d.name.as_str();
        let Some(init) = d.init.as_ref() else {
            let text = self.declaration_text(kind, d);
            self.line(format!("{text};"));
            return;
        };

        if kind == DeclKind::Const
            && self.ctx.entry
            && self.ctx.hoist_consts
            && self.depth == 0
            && self.is_const_expr(init)
        {
            let ty = self.infer_declared(name, Some(init));
            if !ty.is_array() {
                let value = self.expr(init);
                self.hoisted.push(format!("const {name}: {ty} = {value};"));
                self.hoisted_names.insert(name.to_string());
                self.declare_local(name, ty);
                return;
            }
        }

        if let Some((len, value)) = array_fill(init) {
            let ty = self.infer_declared(name, Some(init));
            self.line(format!("var {name}: {ty};"));
            let element = ty.element().cloned();
            self.declare_local(name, ty);
            for l in self.fill_lines(name, len, value, element.as_ref()) {
                self.line(l);
            }
            return;
        }

        if is_sized_new(init) {
            let ty = self.infer_declared(name, Some(init));
            self.line(format!("var {name}: {ty};"));
            self.declare_local(name, ty);
            return;
        }

        let text = self.declaration_text(kind, d);
        self.line(format!("{text};"));
    }

    fn return_stmt(&mut self, value: Option<&Expr>) {
        self.has_return = true;
        if self.ctx.entry {
            match self.ctx.stage {
                StageKind::Fragment => {
                    let color = match value {
                        Some(v) => self.color(v),
                        None => "vec4f(0.0)".to_string(),
                    };
                    self.line(format!("return {color};"));
                }
                StageKind::Compute | StageKind::Vertex => {
                    let text = value.map(|v| format!(" {}", self.expr(v))).unwrap_or_default();
                    self.line(format!("// return{text};"));
                }
            }
            return;
        }
        match value {
            Some(v) => {
                if self.return_type.is_none() {
                    self.return_type = Some(self.infer(None, v).ty);
                }
                let text = self.expr(v);
                self.line(format!("return {text};"));
            }
            None => self.line("return;".to_string()),
        }
    }

    fn color(&mut self, value: &Expr) -> String {
        if let Expr::Array(items) = value.unparen() {
            let mut parts: Vec<String> = items.iter().map(|i| self.expr(i)).collect();
            if parts.len() == 3 {
                parts.push("1.0".to_string());
            }
            return format!("vec4f({})", parts.join(", "));
        }
        let ty = self.infer(None, value).ty;
        let text = self.expr(value);
        match ty {
            WgslType::Vector { size: 4, .. } => text,
            WgslType::Vector { size: 3, .. } => format!("vec4f({text}, 1.0)"),
            WgslType::Scalar(_) => format!("vec4f(vec3f({text}), 1.0)"),
            _ => text,
        }
    }

    /// Emit a branch or loop condition, comparing non-bool scalars with zero.
    fn condition(&mut self, test: &Expr) -> String {
        let text = self.expr(test);
        let inf = self.infer(None, test);
        if inf.is_fallback {
            return text;
        }
        let zero = match inf.ty {
            WgslType::Scalar(Scalar::F32 | Scalar::F16) => "0.0",
            WgslType::Scalar(Scalar::I32 | Scalar::U32) => "0",
            _ => return text,
        };
        match test.unparen() {
            Expr::Binary { .. } | Expr::Unary { .. } => format!("({text}) != {zero}"),
            _ => format!("{text} != {zero}"),
        }
    }

    fn args(&mut self, args: &[Expr]) -> String {
        args.iter().map(|a| self.expr(a)).collect::<Vec<_>>().join(", ")
    }

    fn operand(&mut self, parent: &str, child: &Expr, right: bool) -> String {
        let text = self.expr(child);
        let child_op = match child {
            Expr::Binary { op, .. } if op != "**" && op != "??" => op.as_str(),
            Expr::Assign { .. } => return format!("({text})"),
            _ => return text,
        };
        match (op_class(parent), op_class(child_op)) {
            (Some(p), Some(c)) if !needs_parens(p, c, right) => text,
            _ => format!("({text})"),
        }
    }

    fn length_of(&mut self, object: &Expr) -> String {
        if let Some(name) = object.as_ident() {
            if self.is_storage(name) {
                return format!("arrayLength(&{name}.values)");
            }
            match self.types.get(name) {
                Some(WgslType::Array {
                    length: Some(n), ..
                }) => return n.to_string(),
                Some(WgslType::Vector { size, .. }) => return size.to_string(),
                _ => {}
            }
        }
        let text = self.expr(object);
        format!("arrayLength(&{text})")
    }

    /// The type two operands meet at, or `None` when either side is a guess.
    fn common_type(&self, a: &Expr, b: &Expr) -> Option<(WgslType, WgslType, WgslType)> {
        let (ia, ib) = (self.infer(None, a), self.infer(None, b));
        if ia.is_fallback || ib.is_fallback {
            return None;
        }
        let target = operand_type(a, &ia.ty, b, &ib.ty);
        Some((ia.ty, ib.ty, target))
    }

    /// [`Self::operand`], converted to `target` when the types differ.
    fn operand_as(
        &mut self,
        parent: &str,
        child: &Expr,
        right: bool,
        types: Option<(&WgslType, &WgslType)>,
    ) -> String {
        match types.and_then(|(from, target)| conversion(from, target, false).map(|to| (from, to))) {
            Some((from, to)) => {
                let text = self.expr(child);
                convert_text(text, child, from, &to)
            }
            None => self.operand(parent, child, right),
        }
    }

    /// Emit `e` with exactly the type `target`, splatting scalars into vectors.
    fn expr_as(&mut self, e: &Expr, target: &WgslType) -> String {
        self.converted(e, target, true)
    }

    fn converted(&mut self, e: &Expr, target: &WgslType, splat: bool) -> String {
        let from = self.infer(None, e);
        let text = self.expr(e);
        if from.is_fallback {
            return text;
        }
        match conversion(&from.ty, target, splat) {
            Some(to) => convert_text(text, e, &from.ty, &to),
            None => text,
        }
    }

    fn expr(&mut self, e: &Expr) -> String {
        match e {
            Expr::Number(raw) => number_text(raw),
            Expr::Str(raw) => raw.clone(),
            Expr::Bool(b) => b.to_string(),
            Expr::Ident(name) => self.resolve(name),
            Expr::Paren(inner) => format!("({})", self.expr(inner)),
            Expr::Array(items) => {
                let ty = self.infer(None, e).ty;
                let args = self.args(items);
                format!("{ty}({args})")
            }
            Expr::Member { object, property } => {
                if object.as_ident() == Some("Math") {
                    return match self.ctx.math.constant(property) {
                        Some(value) => value,
                        None => {
                            log::warn!("unsupported Math constant `Math.{property}`");
                            property.clone()
                        }
                    };
                }
                if property == "length" {
                    return self.length_of(object);
                }
                let base = self.postfix_base(object);
                format!("{base}.{property}")
            }
            Expr::Index { object, index } => {
                let base = match object.as_ident() {
                    Some(name) if self.is_storage(name) => format!("{name}.values"),
                    _ => self.postfix_base(object),
                };
                let index = self.expr(index);
                format!("{base}[{index}]")
            }
            Expr::Call { callee, args } => self.call(e, callee, args),
            Expr::New { callee, args } => {
                let ty = self.infer(None, e).ty;
                let ctor = callee.as_ident().unwrap_or_default();
                if ctor != "Array" && typed_array_element(ctor).is_none() {
                    log::warn!("unsupported constructor `new {ctor}`");
                }
                match args.as_slice() {
                    [Expr::Array(items)] => {
                        let args = self.args(items);
                        format!("{ty}({args})")
                    }
                    _ => format!("{ty}()"),
                }
            }
            Expr::Unary { op, operand } => {
                let text = self.expr(operand);
                let text = match operand.as_ref() {
                    Expr::Binary { op, .. } if op != "**" => format!("({text})"),
                    Expr::Assign { .. } => format!("({text})"),
                    _ => text,
                };
                match op.as_str() {
                    "+" => text,
                    "-" | "!" | "~" => format!("{op}{text}"),
                    other => {
                        log::warn!("unsupported unary operator `{other}`");
                        text
                    }
                }
            }
            Expr::Update { op, operand, prefix } => {
                // WGSL only has increment statements; run it first and use the variable.
                let text = self.expr(operand);
                if *prefix {
                    self.pending.push(format!("{text}{op};"));
                    text
                } else {
                    let before = self.temp("update");
                    self.pending.push(format!("let {before} = {text};"));
                    self.pending.push(format!("{text}{op};"));
                    before
                }
            }
            Expr::Binary { op, left, right } => match op.as_str() {
                "**" => {
                    let ty = self.infer(None, e).ty;
                    let l = self.expr_as(left, &ty);
                    let r = self.expr_as(right, &ty);
                    format!("pow({l}, {r})")
                }
                "??" => {
                    log::warn!("`??` has no WGSL counterpart; keeping the left operand");
                    self.expr(left)
                }
                _ => {
                    let wop = wgsl_op(op);
                    let numeric = matches!(
                        op_class(wop),
                        Some(OpClass::Mul | OpClass::Add | OpClass::Relational)
                    );
                    let types = if numeric {
                        self.common_type(left, right)
                    } else {
                        None
                    };
                    let (lt, rt) = match &types {
                        Some((l, r, target)) => (Some((l, target)), Some((r, target))),
                        None => (None, None),
                    };
                    let ls = self.operand_as(wop, left, false, lt);
                    let rs = self.operand_as(wop, right, true, rt);
                    format!("{ls} {wop} {rs}")
                }
            },
            Expr::Assign { op, target, value } => {
                let t = self.expr(target);
                let target_ty = self.infer(None, target);
                let converts = !target_ty.is_fallback
                    && matches!(op.as_str(), "=" | "+=" | "-=" | "*=" | "/=" | "%=" | "**=");
                let v = if converts {
                    // `vec += scalar` is valid WGSL, `vec = scalar` is not.
                    let splat = op == "=" || op == "**=";
                    self.converted(value, &target_ty.ty, splat)
                } else {
                    self.expr(value)
                };
                match op.as_str() {
                    "**=" => format!("{t} = pow({t}, {v})"),
                    ">>>=" => format!("{t} >>= {v}"),
                    "&&=" => format!("{t} = {t} && ({v})"),
                    "||=" => format!("{t} = {t} || ({v})"),
                    "??=" => {
                        log::warn!("`??=` has no WGSL counterpart; assigning unconditionally");
                        format!("{t} = {v}")
                    }
                    _ => format!("{t} {op} {v}"),
                }
            }
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => {
                let c = self.condition(test);
                let target = self.common_type(then, otherwise).map(|(_, _, t)| t);
                let (a, b) = match &target {
                    Some(ty) => (self.expr_as(then, ty), self.expr_as(otherwise, ty)),
                    None => (self.expr(then), self.expr(otherwise)),
                };
                format!("select({b}, {a}, {c})")
            }
            Expr::Function(_) => {
                log::warn!("function expressions are only supported as helper declarations");
                String::new()
            }
        }
    }

    /// Operand of `.` or `[]`; binary operands need parentheses.
    fn postfix_base(&mut self, object: &Expr) -> String {
        let text = self.expr(object);
        match object {
            Expr::Binary { op, .. } if op != "**" => format!("({text})"),
            Expr::Unary { .. } | Expr::Assign { .. } => format!("({text})"),
            _ => text,
        }
    }

    fn call(&mut self, whole: &Expr, callee: &Expr, args: &[Expr]) -> String {
        if let Some((len, value)) = array_fill(whole) {
            let ty = self.infer(None, whole).ty;
            let name = self.temp("fill_tmp");
            self.pending.push(format!("var {name}: {ty};"));
            let element = ty.element().cloned();
            let lines = self.fill_lines(&name, len, value, element.as_ref());
            self.pending.extend(lines);
            return name;
        }
        match callee {
            Expr::Member { object, property } if object.as_ident() == Some("Math") => {
                let name = match self.ctx.math.function(property) {
                    Some(f) => f.to_string(),
                    None => {
                        log::warn!("unsupported Math function `Math.{property}`");
                        property.clone()
                    }
                };
                let args = self.args(args);
                format!("{name}({args})")
            }
            Expr::Ident(name) if constructor_shape(name).is_some() => {
                let ty = self.infer(None, whole).ty;
                let args = self.args(args);
                format!("{ty}({args})")
            }
            _ => {
                let name = self.postfix_base(callee);
                let args = self.args(args);
                format!("{name}({args})")
            }
        }
    }
}
