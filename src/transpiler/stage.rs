//! Per-stage compilation: helpers, planning, rewriting and entry-point templates.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};

use crate::options::{CompileOptions, VertexField};

use super::Transpiler;
use super::infer::{InferContext, infer};
use super::planner::{
    BindingPlanner, DEFAULTS_STRUCT, PlanContext, UNIFORMS_STRUCT,
};
use super::rewrite::{RewriteContext, rewrite};
use super::syntax::{Expr, FunctionDecl, Stmt, parse_function, walk_exprs};
use super::tokenizer::tokenize;
use super::types::{
    HelperFn, ProgramParts, Scalar, StageKind, StageProgram, StructField, WgslType,
};
use super::utils::indent;

pub const DEFAULT_WORKGROUP_SIZE: u32 = 64;

/// Names the entry point provides for `stage`, with their types.
pub fn stage_builtins(stage: StageKind, options: &CompileOptions) -> BTreeMap<String, WgslType> {
    let vec3u = WgslType::vector(3, Scalar::U32);
    let mut out = BTreeMap::new();
    match stage {
        StageKind::Compute => {
            out.insert("threadId".to_string(), vec3u.clone());
            out.insert("localId".to_string(), vec3u.clone());
            out.insert("localIndex".to_string(), WgslType::U32);
            out.insert("workgroups".to_string(), vec3u.clone());
            out.insert("workgroupId".to_string(), vec3u);
        }
        StageKind::Vertex | StageKind::Fragment => {
            if stage == StageKind::Vertex {
                out.insert("vertexIndex".to_string(), WgslType::U32);
                out.insert("instanceIndex".to_string(), WgslType::U32);
            } else {
                out.insert("is_front".to_string(), WgslType::BOOL);
                out.insert("sampleIndex".to_string(), WgslType::U32);
            }
            out.insert("position".to_string(), WgslType::vector(4, Scalar::F32));
            out.insert("pixel".to_string(), WgslType::Named("Vertex".to_string()));
            for field in options.vertex_fields() {
                if stage == StageKind::Vertex {
                    out.insert(format!("{}In", field.name), field.ty.clone());
                }
                out.insert(field.name, field.ty);
            }
        }
    }
    out
}

/// Remove nested function declarations from `stmts`, collecting them (and
/// their own nested functions) into `out`.
fn strip_functions(stmts: &[Stmt], out: &mut Vec<FunctionDecl>) -> Vec<Stmt> {
    let mut kept = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        if let Some(s) = strip_stmt(stmt, out) {
            kept.push(s);
        }
    }
    kept
}

fn strip_boxed(stmt: &Stmt, out: &mut Vec<FunctionDecl>) -> Box<Stmt> {
    Box::new(strip_stmt(stmt, out).unwrap_or(Stmt::Empty))
}

fn strip_stmt(stmt: &Stmt, out: &mut Vec<FunctionDecl>) -> Option<Stmt> {
    Some(match stmt {
        Stmt::Function(f) => {
            let mut helper = f.clone();
            helper.body = strip_functions(&f.body, out);
            out.push(helper);
            return None;
        }
        Stmt::Block(inner) => Stmt::Block(strip_functions(inner, out)),
        Stmt::If {
            test,
            then,
            otherwise,
        } => Stmt::If {
            test: test.clone(),
            then: strip_boxed(then, out),
            otherwise: otherwise.as_deref().map(|o| strip_boxed(o, out)),
        },
        Stmt::For {
            init,
            test,
            update,
            body,
        } => Stmt::For {
            init: init.clone(),
            test: test.clone(),
            update: update.clone(),
            body: strip_boxed(body, out),
        },
        Stmt::While { test, body } => Stmt::While {
            test: test.clone(),
            body: strip_boxed(body, out),
        },
        Stmt::DoWhile { body, test } => Stmt::DoWhile {
            body: strip_boxed(body, out),
            test: test.clone(),
        },
        other => other.clone(),
    })
}

/// Identifiers the authored `return` hands back as outputs.
fn returned_names(body: &[Stmt]) -> Vec<String> {
    let mut names = Vec::new();
    let mut push = |e: &Expr| {
        if let Some(n) = e.as_ident()
            && !names.iter().any(|x: &String| x == n)
        {
            names.push(n.to_string());
        }
    };
    super::syntax::walk_stmts(body, &mut |stmt| match stmt {
        Stmt::Return(Some(Expr::Array(items))) => items.iter().for_each(&mut push),
        Stmt::Return(Some(e)) => push(e.unparen()),
        _ => {}
    });
    names
}

/// First call `name(...)` in `bodies` and its arguments.
fn first_call_args<'a>(name: &str, bodies: &[&'a [Stmt]]) -> Option<&'a [Expr]> {
    let mut found = None;
    for body in bodies.iter().copied() {
        walk_exprs(body, &mut |e| {
            if found.is_none()
                && let Expr::Call { callee, args } = e
                && callee.as_ident() == Some(name)
            {
                found = Some(args.as_slice());
            }
        });
        if found.is_some() {
            break;
        }
    }
    found
}

struct HelperSig {
    decl: FunctionDecl,
    name: String,
    params: Vec<(String, WgslType)>,
}

fn interstage_struct(fields: &[VertexField]) -> String {
    let mut lines = vec![
        "struct Vertex {".to_string(),
        "    @builtin(position) position: vec4f,".to_string(),
    ];
    for (i, field) in fields.iter().enumerate() {
        let flat = if field.ty.is_float() {
            ""
        } else {
            " @interpolate(flat)"
        };
        lines.push(format!(
            "    @location({i}){flat} {}: {},",
            field.name, field.ty
        ));
    }
    lines.push("}".to_string());
    lines.join("\n")
}

fn entry_point(stage: StageKind, options: &CompileOptions, body: &str) -> String {
    let body = indent(body, 1);
    match stage {
        StageKind::Compute => {
            let size = options.workgroup_size.unwrap_or(DEFAULT_WORKGROUP_SIZE);
            format!(
                "@compute @workgroup_size({size})\n\
                 fn compute_main(\n\
                 \x20   @builtin(global_invocation_id) threadId: vec3u,\n\
                 \x20   @builtin(local_invocation_id) localId: vec3u,\n\
                 \x20   @builtin(local_invocation_index) localIndex: u32,\n\
                 \x20   @builtin(num_workgroups) workgroups: vec3u,\n\
                 \x20   @builtin(workgroup_id) workgroupId: vec3u,\n\
                 ) {{\n{body}\n}}"
            )
        }
        StageKind::Vertex => {
            let fields = options.vertex_fields();
            let mut params = vec![
                "    @builtin(vertex_index) vertexIndex: u32,".to_string(),
                "    @builtin(instance_index) instanceIndex: u32,".to_string(),
            ];
            let mut prologue = vec!["    var pixel: Vertex;".to_string()];
            for (i, field) in fields.iter().enumerate() {
                params.push(format!("    @location({i}) {}In: {},", field.name, field.ty));
                prologue.push(format!("    pixel.{0} = {0}In;", field.name));
            }
            let vec4f = WgslType::vector(4, Scalar::F32);
            if fields.iter().any(|f| f.name == "vertex" && f.ty == vec4f) {
                prologue.push("    pixel.position = vertexIn;".to_string());
            }
            format!(
                "@vertex\nfn vtx_main(\n{}\n) -> Vertex {{\n{}\n{body}\n    return pixel;\n}}",
                params.join("\n"),
                prologue.join("\n"),
            )
        }
        StageKind::Fragment => format!(
            "@fragment\n\
             fn frag_main(\n\
             \x20   pixel: Vertex,\n\
             \x20   @builtin(front_facing) is_front: bool,\n\
             \x20   @builtin(sample_index) sampleIndex: u32,\n\
             ) -> @location(0) vec4f {{\n{body}\n}}"
        ),
    }
}

fn struct_block(name: &str, fields: &[StructField]) -> String {
    let mut out = format!("struct {name} {{\n");
    for f in fields {
        out.push_str(&format!("    {}: {},\n", f.name, f.ty));
    }
    out.push('}');
    out
}

/// Struct definitions followed by the `@group @binding` declarations.
pub fn render_header(parts: &ProgramParts) -> String {
    let mut blocks = Vec::new();
    if !parts.uniform_fields.is_empty() {
        blocks.push(struct_block(UNIFORMS_STRUCT, &parts.uniform_fields));
    }
    if !parts.default_fields.is_empty() {
        blocks.push(struct_block(DEFAULTS_STRUCT, &parts.default_fields));
    }
    let mut decls: Vec<_> = parts.decls.iter().collect();
    decls.sort_by_key(|d| d.slot);
    for d in &decls {
        if let Some(def) = &d.struct_def
            && !blocks.contains(def)
        {
            blocks.push(def.clone());
        }
    }
    let bindings: Vec<String> = decls
        .iter()
        .map(|d| format!("@group({}) @binding({}) {}", d.slot.group, d.slot.binding, d.decl))
        .collect();
    if !bindings.is_empty() {
        blocks.push(bindings.join("\n"));
    }
    blocks.join("\n\n")
}

/// Full module text: header, interstage struct, constants, helpers, entry.
pub fn render_module(parts: &ProgramParts, header: &str) -> String {
    let mut sections: Vec<String> = Vec::new();
    if !header.is_empty() {
        sections.push(header.to_string());
    }
    if let Some(s) = &parts.interstage {
        sections.push(s.clone());
    }
    if !parts.consts.is_empty() {
        sections.push(parts.consts.join("\n"));
    }
    sections.extend(parts.helpers.iter().map(|h| h.code.clone()));
    if !parts.entry.is_empty() {
        sections.push(parts.entry.clone());
    }
    let mut code = sections.join("\n\n");
    code.push('\n');
    code
}

impl Transpiler {
    pub(super) fn build_stage(
        &self,
        source: &str,
        stage: StageKind,
        options: &CompileOptions,
        starting_binding: u32,
    ) -> Result<StageProgram> {
        let func = parse_function(source)
            .with_context(|| format!("failed to parse {} stage", stage.label()))?;

        let mut nested = Vec::new();
        for (i, extra) in options.functions.iter().enumerate() {
            let mut f = parse_function(extra)
                .with_context(|| format!("failed to parse helper function #{i}"))?;
            f.body = strip_functions(&f.body, &mut nested);
            nested.push(f);
        }
        let body = strip_functions(&func.body, &mut nested);
        let entry_fn = FunctionDecl {
            name: func.name.clone(),
            params: func.params.clone(),
            body,
            line: func.line,
        };
        let helpers: Vec<FunctionDecl> = nested
            .into_iter()
            .filter(|f| {
                if f.name.is_none() {
                    log::warn!("skipping anonymous nested function at line {}", f.line);
                }
                f.name.is_some()
            })
            .collect();

        let returned = if stage == StageKind::Fragment {
            Vec::new()
        } else {
            returned_names(&entry_fn.body)
        };
        let reserved = stage_builtins(stage, options);
        let interstage: BTreeSet<String> = if stage.is_render() {
            options.vertex_fields().into_iter().map(|f| f.name).collect()
        } else {
            BTreeSet::new()
        };

        // Helper signatures are typed before planning so entry inference can
        // see helper return types.
        let mut seed = reserved.clone();
        {
            let empty = BTreeMap::new();
            let ictx = InferContext {
                known: &empty,
                functions: &empty,
                registry: &self.registry,
                body: &[],
                default_type: &self.default_type,
            };
            for p in &entry_fn.params {
                if let Some(d) = &p.default {
                    let inf = infer(d, &ictx);
                    if !inf.is_fallback {
                        seed.insert(p.name.clone(), inf.ty);
                    }
                }
            }
        }
        let mut bodies: Vec<&[Stmt]> = vec![entry_fn.body.as_slice()];
        bodies.extend(helpers.iter().map(|h| h.body.as_slice()));
        let mut functions: BTreeMap<String, WgslType> = BTreeMap::new();
        let mut sigs = Vec::with_capacity(helpers.len());
        for h in &helpers {
            let name = h.name.clone().unwrap_or_default();
            let call_args = first_call_args(&name, &bodies);
            let ictx = InferContext {
                known: &seed,
                functions: &functions,
                registry: &self.registry,
                body: &h.body,
                default_type: &self.default_type,
            };
            let params: Vec<(String, WgslType)> = h
                .params
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    let from_default = p.default.as_ref().map(|d| infer(d, &ictx));
                    let from_call = call_args.and_then(|a| a.get(i)).map(|a| infer(a, &ictx));
                    let ty = match (from_default, from_call) {
                        (Some(d), _) if !d.is_fallback => d.ty,
                        (_, Some(c)) if !c.is_fallback => c.ty,
                        _ => {
                            log::warn!(
                                "parameter `{}` of `{name}` has no inferable type; using {}",
                                p.name,
                                self.default_type
                            );
                            self.default_type.clone()
                        }
                    };
                    (p.name.clone(), ty)
                })
                .collect();
            let dry = rewrite(
                &h.body,
                RewriteContext {
                    stage,
                    entry: false,
                    nodes: &[],
                    interstage: &interstage,
                    known: &seed,
                    functions: &functions,
                    registry: &self.registry,
                    math: &self.math,
                    default_type: &self.default_type,
                    hoist_consts: false,
                    params: &params,
                },
            );
            if let Some(ret) = dry.return_type {
                functions.insert(name.clone(), ret);
            }
            sigs.push(HelperSig {
                decl: h.clone(),
                name,
                params,
            });
        }

        let tokens = tokenize(&entry_fn, &helpers, &self.registry);
        let plan = BindingPlanner::new(PlanContext {
            stage,
            body: &entry_fn.body,
            helpers: &helpers,
            registry: &self.registry,
            options,
            reserved: &reserved,
            functions: &functions,
            default_type: &self.default_type,
        })
        .plan(&tokens, &returned, starting_binding);
        for name in &plan.fallbacks {
            log::warn!(
                "no inference rule matched `{name}` in {} stage; using {}",
                stage.label(),
                self.default_type
            );
        }

        let mut fallbacks = plan.fallbacks.clone();
        let mut helper_fns = Vec::with_capacity(sigs.len());
        for sig in &sigs {
            let out = rewrite(
                &sig.decl.body,
                RewriteContext {
                    stage,
                    entry: false,
                    nodes: &plan.nodes,
                    interstage: &interstage,
                    known: &plan.known,
                    functions: &functions,
                    registry: &self.registry,
                    math: &self.math,
                    default_type: &self.default_type,
                    hoist_consts: false,
                    params: &sig.params,
                },
            );
            fallbacks.extend(out.fallbacks.iter().map(|n| format!("{}.{n}", sig.name)));
            let params = sig
                .params
                .iter()
                .map(|(n, t)| format!("{n}: {t}"))
                .collect::<Vec<_>>()
                .join(", ");
            let ret = out
                .return_type
                .map(|t| format!(" -> {t}"))
                .unwrap_or_default();
            helper_fns.push(HelperFn {
                name: sig.name.clone(),
                code: format!("fn {}({params}){ret} {{\n{}\n}}", sig.name, indent(&out.code, 1)),
            });
        }

        let entry = rewrite(
            &entry_fn.body,
            RewriteContext {
                stage,
                entry: true,
                nodes: &plan.nodes,
                interstage: &interstage,
                known: &plan.known,
                functions: &functions,
                registry: &self.registry,
                math: &self.math,
                default_type: &self.default_type,
                hoist_consts: options.hoist_consts,
                params: &[],
            },
        );

        let parts = ProgramParts {
            decls: plan.parts.decls.clone(),
            uniform_fields: plan.parts.uniform_fields.clone(),
            default_fields: plan.parts.default_fields.clone(),
            interstage: stage
                .is_render()
                .then(|| interstage_struct(&options.vertex_fields())),
            consts: entry.hoisted,
            helpers: helper_fns,
            entry: entry_point(stage, options, &entry.code),
        };
        log::debug!(
            "compiled {} stage: {} declarations, next binding {}",
            stage.label(),
            parts.decls.len(),
            plan.next_binding
        );

        let mut program = StageProgram {
            stage,
            code: String::new(),
            header: String::new(),
            params: plan.nodes,
            default_uniforms: (!plan.default_uniforms.is_empty()).then_some(plan.default_uniforms),
            workgroup_size: (stage == StageKind::Compute)
                .then(|| options.workgroup_size.unwrap_or(DEFAULT_WORKGROUP_SIZE)),
            bind_group_number: options.bind_group_number,
            alt_bindings: BTreeMap::new(),
            inference_fallbacks: fallbacks,
            returned,
            parts,
        };
        program.assemble();
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_functions_collects_nested_helpers() {
        let f = parse_function(
            "function main(a) {\n function sq(x) {\n  function twice(y) { return y * 2 }\n  return twice(x) * x\n }\n if (a) { function inner() { return 1 } }\n a = sq(a)\n}",
        )
        .unwrap();
        let mut helpers = Vec::new();
        let body = strip_functions(&f.body, &mut helpers);
        let names: Vec<_> = helpers.iter().filter_map(|h| h.name.clone()).collect();
        assert_eq!(names, ["twice", "sq", "inner"]);
        assert!(body.iter().all(|s| !matches!(s, Stmt::Function(_))));
        assert_eq!(body.len(), 2);
    }

    #[test]
    fn test_returned_names() {
        let f = parse_function("function f(a, b) { if (a) { return a } return [a, b] }").unwrap();
        assert_eq!(returned_names(&f.body), ["a", "b"]);
    }

    #[test]
    fn test_interstage_struct_flat_ints() {
        let fields = vec![
            VertexField {
                name: "uv".into(),
                ty: WgslType::vector(2, Scalar::F32),
            },
            VertexField {
                name: "id".into(),
                ty: WgslType::U32,
            },
        ];
        assert_eq!(
            interstage_struct(&fields),
            "struct Vertex {\n    @builtin(position) position: vec4f,\n    @location(0) uv: vec2f,\n    @location(1) @interpolate(flat) id: u32,\n}"
        );
    }

    #[test]
    fn test_render_header_orders_by_slot() {
        use super::super::types::{BindingKind, BindingSlot, ResourceDecl};
        let parts = ProgramParts {
            decls: vec![
                ResourceDecl {
                    name: "uniforms".into(),
                    slot: BindingSlot::new(0, 1),
                    kind: BindingKind::Uniform,
                    decl: "var<uniform> uniforms: UniformsStruct;".into(),
                    struct_def: None,
                },
                ResourceDecl {
                    name: "data".into(),
                    slot: BindingSlot::new(0, 0),
                    kind: BindingKind::Storage { read_only: false },
                    decl: "var<storage, read_write> data: DataStruct;".into(),
                    struct_def: Some("struct DataStruct {\n    values: array<f32>,\n}".into()),
                },
            ],
            uniform_fields: vec![StructField {
                name: "time".into(),
                ty: WgslType::F32,
            }],
            ..ProgramParts::default()
        };
        assert_eq!(
            render_header(&parts),
            "struct UniformsStruct {\n    time: f32,\n}\n\n\
             struct DataStruct {\n    values: array<f32>,\n}\n\n\
             @group(0) @binding(0) var<storage, read_write> data: DataStruct;\n\
             @group(0) @binding(1) var<uniform> uniforms: UniformsStruct;"
        );
    }
}
