//! Classifies identifiers into GPU resources and assigns binding slots.

use std::collections::{BTreeMap, BTreeSet};

use crate::options::CompileOptions;

use super::builtins::BuiltinRegistry;
use super::infer::{InferContext, infer_named};
use super::syntax::{Expr, FunctionDecl, Stmt, walk_exprs};
use super::types::{
    AttributedNode, BindingKind, BindingSlot, ProgramParts, ResourceClass, ResourceDecl,
    StageKind, StorageAccess, StructField, TextureDim, TextureKind, Token, TokenRole, WgslType,
};
use super::utils::{capitalize, sanitize_wgsl_ident};

pub const UNIFORMS_STRUCT: &str = "UniformsStruct";
pub const UNIFORMS_VAR: &str = "uniforms";
pub const DEFAULTS_STRUCT: &str = "DefaultUniforms";
pub const DEFAULTS_VAR: &str = "defaults";

pub struct PlanContext<'a> {
    pub stage: StageKind,
    /// Entry body with helper functions already removed.
    pub body: &'a [Stmt],
    pub helpers: &'a [FunctionDecl],
    pub registry: &'a BuiltinRegistry,
    pub options: &'a CompileOptions,
    /// Stage built-ins and interstage fields; typed but never planned.
    pub reserved: &'a BTreeMap<String, WgslType>,
    pub functions: &'a BTreeMap<String, WgslType>,
    pub default_type: &'a WgslType,
}

#[derive(Clone, Debug, Default)]
pub struct BindingPlan {
    pub header: String,
    pub nodes: Vec<AttributedNode>,
    pub default_uniforms: Vec<String>,
    pub next_binding: u32,
    pub parts: ProgramParts,
    /// Inferred types of every planned name plus the reserved names.
    pub known: BTreeMap<String, WgslType>,
    pub fallbacks: Vec<String>,
}

/// How `texture*` calls use a name.
#[derive(Clone, Copy, Debug, Default)]
struct Usage {
    depth_compare: bool,
    comparison_sampler: bool,
    filtering_sampler: bool,
    sampled: bool,
    stored: bool,
    loaded: bool,
    generic: bool,
}

fn texture_usage(bodies: &[&[Stmt]]) -> BTreeMap<String, Usage> {
    let mut usage: BTreeMap<String, Usage> = BTreeMap::new();
    for body in bodies {
        walk_exprs(body, &mut |e| {
            let Expr::Call { callee, args } = e else {
                return;
            };
            let Some(fname) = callee.as_ident().filter(|n| n.starts_with("texture")) else {
                return;
            };
            let arg = |i: usize| args.get(i).and_then(Expr::as_ident).map(str::to_string);
            let mut mark = |i: usize, f: fn(&mut Usage)| {
                if let Some(name) = arg(i) {
                    f(usage.entry(name).or_default());
                }
            };
            match fname {
                "textureSampleCompare" | "textureSampleCompareLevel" | "textureGatherCompare" => {
                    mark(0, |u| u.depth_compare = true);
                    mark(1, |u| u.comparison_sampler = true);
                }
                "textureGather" => {
                    // Non-depth gathers take the component index first.
                    let shift = usize::from(args.first().is_some_and(Expr::is_numeric_literal));
                    mark(shift, |u| u.sampled = true);
                    mark(shift + 1, |u| u.filtering_sampler = true);
                }
                n if n.starts_with("textureSample") => {
                    mark(0, |u| u.sampled = true);
                    mark(1, |u| u.filtering_sampler = true);
                }
                "textureStore" => mark(0, |u| u.stored = true),
                "textureLoad" => mark(0, |u| u.loaded = true),
                _ => mark(0, |u| u.generic = true),
            }
        });
    }
    usage
}

/// Root identifier of an assignment target (`a`, `a[i]`, `a.x[i]`).
fn target_root(expr: &Expr) -> Option<&str> {
    match expr.unparen() {
        Expr::Ident(name) => Some(name),
        Expr::Index { object, .. } | Expr::Member { object, .. } => target_root(object),
        _ => None,
    }
}

fn modified_names(bodies: &[&[Stmt]]) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for body in bodies {
        walk_exprs(body, &mut |e| match e {
            Expr::Assign { target, .. } | Expr::Update { operand: target, .. } => {
                if let Some(root) = target_root(target) {
                    out.insert(root.to_string());
                }
            }
            _ => {}
        });
    }
    out
}

fn indexed_names(bodies: &[&[Stmt]]) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for body in bodies {
        walk_exprs(body, &mut |e| match e {
            Expr::Index { object, .. } => {
                if let Some(name) = object.as_ident() {
                    out.insert(name.to_string());
                }
            }
            Expr::Member { object, property } if property == "length" => {
                if let Some(name) = object.as_ident() {
                    out.insert(name.to_string());
                }
            }
            _ => {}
        });
    }
    out
}

fn storage_texture_dim(name: &str) -> TextureDim {
    match TextureDim::from_name(name) {
        TextureDim::Cube => TextureDim::D2,
        TextureDim::CubeArray => TextureDim::D2Array,
        d => d,
    }
}

pub struct BindingPlanner<'a> {
    ctx: PlanContext<'a>,
}

struct PlanState {
    plan: BindingPlan,
    next: u32,
    group: u32,
    uniforms_opened: bool,
    defaults_opened: bool,
}

impl PlanState {
    fn take_slot(&mut self) -> BindingSlot {
        let slot = BindingSlot::new(self.group, self.next);
        self.next += 1;
        slot
    }

    fn push_decl(&mut self, decl: ResourceDecl) {
        log::debug!(
            "planned `{}` at group {} binding {}",
            decl.name,
            decl.slot.group,
            decl.slot.binding
        );
        self.plan.parts.decls.push(decl);
    }
}

impl<'a> BindingPlanner<'a> {
    pub fn new(ctx: PlanContext<'a>) -> Self {
        Self { ctx }
    }

    pub fn plan(&self, tokens: &[Token], returned: &[String], starting_binding: u32) -> BindingPlan {
        let ctx = &self.ctx;
        let mut bodies: Vec<&[Stmt]> = vec![ctx.body];
        bodies.extend(ctx.helpers.iter().map(|h| h.body.as_slice()));
        let usage = texture_usage(&bodies);
        let modified = modified_names(&bodies);
        let indexed = indexed_names(&bodies);

        let mut st = PlanState {
            plan: BindingPlan {
                known: ctx.reserved.clone(),
                ..BindingPlan::default()
            },
            next: starting_binding,
            group: ctx.options.bind_group_number,
            uniforms_opened: false,
            defaults_opened: false,
        };
        let mut seen = BTreeSet::new();

        for token in tokens {
            let name = token.text.as_str();
            if !seen.insert(name.to_string()) || ctx.reserved.contains_key(name) {
                continue;
            }
            let is_input = token.role == TokenRole::Input;
            let mut node = if let Some(ov) = ctx.options.variable_types.get(name) {
                self.plan_override(&mut st, name, ov)
            } else if let Some(u) = usage.get(name).copied().and_then(|u| self.usage_class(name, u)) {
                self.plan_texture(&mut st, name, u)
            } else if is_input && !ctx.registry.contains(name) {
                let is_returned = returned.iter().any(|r| r == name);
                let is_modified = modified.contains(name);
                let mut node = self.plan_input(&mut st, token, is_returned || is_modified, &indexed);
                node.is_returned = is_returned;
                node.is_modified = is_modified;
                node
            } else if let Some(builtin) = ctx.registry.get(name) {
                self.plan_default_uniform(&mut st, name, builtin.ty.clone())
            } else if token.role == TokenRole::Declared {
                let inf = self.infer(&st, name, token.value.as_ref());
                if inf.is_fallback {
                    st.plan.fallbacks.push(name.to_string());
                }
                let mut node = AttributedNode::local(name, inf.ty, token.value.clone());
                node.is_modified = modified.contains(name);
                node
            } else {
                continue;
            };
            node.is_input = is_input;
            st.plan.known.insert(name.to_string(), node.ty.clone());
            st.plan.nodes.push(node);
        }

        let mut plan = st.plan;
        plan.next_binding = st.next;
        plan.default_uniforms = plan.parts.default_fields.iter().map(|f| f.name.clone()).collect();
        plan.header = super::stage::render_header(&plan.parts);
        plan
    }

    fn infer(&self, st: &PlanState, name: &str, value: Option<&Expr>) -> super::infer::Inference {
        let ctx = &self.ctx;
        let infer_ctx = InferContext {
            known: &st.plan.known,
            functions: ctx.functions,
            registry: ctx.registry,
            body: ctx.body,
            default_type: ctx.default_type,
        };
        match value {
            Some(v) => infer_named(Some(name), v, &infer_ctx),
            None => super::infer::Inference {
                ty: ctx.default_type.clone(),
                is_fallback: true,
            },
        }
    }

    fn usage_class(&self, name: &str, u: Usage) -> Option<ResourceClass> {
        if u.depth_compare {
            return Some(ResourceClass::Texture(TextureKind::from_name(name, true)));
        }
        if u.comparison_sampler {
            return Some(ResourceClass::Sampler { comparison: true });
        }
        if u.filtering_sampler {
            return Some(ResourceClass::Sampler { comparison: false });
        }
        if u.sampled {
            return Some(ResourceClass::Texture(TextureKind::from_name(name, false)));
        }
        if u.stored {
            let format = self
                .ctx
                .options
                .texture_format(name)
                .unwrap_or("rgba8unorm")
                .to_string();
            let access = if u.loaded {
                StorageAccess::ReadWrite
            } else {
                StorageAccess::Write
            };
            return Some(ResourceClass::StorageTexture {
                dim: storage_texture_dim(name),
                format,
                access,
            });
        }
        if u.loaded || u.generic {
            return Some(ResourceClass::Texture(TextureKind::from_name(name, false)));
        }
        None
    }

    fn plan_texture(&self, st: &mut PlanState, name: &str, class: ResourceClass) -> AttributedNode {
        let (ty_text, kind) = match &class {
            ResourceClass::Texture(k) => (
                k.wgsl(),
                BindingKind::Texture {
                    depth: k.depth,
                    dim: k.dim,
                    multisampled: k.multisampled,
                },
            ),
            ResourceClass::Sampler { comparison } => (
                if *comparison {
                    "sampler_comparison".to_string()
                } else {
                    "sampler".to_string()
                },
                BindingKind::Sampler {
                    comparison: *comparison,
                },
            ),
            ResourceClass::StorageTexture {
                dim,
                format,
                access,
            } => (
                format!(
                    "texture_storage_{}<{format}, {}>",
                    dim.wgsl_suffix(),
                    access.wgsl()
                ),
                BindingKind::StorageTexture {
                    format: format.clone(),
                    access: *access,
                    dim: *dim,
                },
            ),
            _ => unreachable!("usage classification yields textures and samplers only"),
        };
        log::debug!("`{name}` classified by usage as {ty_text}");
        let slot = st.take_slot();
        st.push_decl(ResourceDecl {
            name: name.to_string(),
            slot,
            kind,
            decl: format!("var {name}: {ty_text};"),
            struct_def: None,
        });
        let mut node = AttributedNode::local(name, WgslType::Named(ty_text), None);
        node.class = class;
        node.binding = Some(slot);
        node
    }

    fn plan_override(
        &self,
        st: &mut PlanState,
        name: &str,
        ov: &crate::options::VariableOverride,
    ) -> AttributedNode {
        let prefix = ov.prefix();
        let ty_text = ov.ty().trim().to_string();
        let slot = match ov.binding() {
            Some(b) => {
                st.next = st.next.max(b + 1);
                BindingSlot::new(ov.group().unwrap_or(st.group), b)
            }
            None => {
                let mut s = st.take_slot();
                if let Some(g) = ov.group() {
                    s.group = g;
                }
                s
            }
        };
        let decl = format!("{prefix} {name}: {ty_text};");
        st.push_decl(ResourceDecl {
            name: name.to_string(),
            slot,
            kind: BindingKind::from_declaration(&prefix, &ty_text),
            decl: decl.clone(),
            struct_def: None,
        });
        let mut node = AttributedNode::local(name, WgslType::parse(&ty_text), None);
        node.class = ResourceClass::Override { decl };
        node.binding = Some(slot);
        node
    }

    fn plan_input(
        &self,
        st: &mut PlanState,
        token: &Token,
        writes: bool,
        indexed: &BTreeSet<String>,
    ) -> AttributedNode {
        let name = token.text.as_str();
        let mut inf = self.infer(st, name, token.value.as_ref());
        if inf.is_fallback && indexed.contains(name) && !inf.ty.is_array() {
            inf.ty = WgslType::array(self.ctx.default_type.clone(), None);
        }
        if inf.is_fallback {
            st.plan.fallbacks.push(name.to_string());
        }

        if let WgslType::Named(text) = &inf.ty
            && (text.starts_with("texture") || text.starts_with("sampler"))
        {
            // A quoted type default declares the resource directly.
            let ov = crate::options::VariableOverride::Type(text.clone());
            let mut node = self.plan_override(st, name, &ov);
            node.raw_value = token.value.clone();
            return node;
        }

        if let WgslType::Array { element, length } = &inf.ty {
            let access = if self.ctx.stage == StageKind::Vertex || !writes {
                StorageAccess::Read
            } else {
                StorageAccess::ReadWrite
            };
            let struct_name = format!("{}Struct", capitalize(&sanitize_wgsl_ident(name)));
            let runtime = WgslType::array((**element).clone(), None);
            let slot = st.take_slot();
            st.push_decl(ResourceDecl {
                name: name.to_string(),
                slot,
                kind: BindingKind::Storage {
                    read_only: access == StorageAccess::Read,
                },
                decl: format!("var<storage, {}> {name}: {struct_name};", access.wgsl()),
                struct_def: Some(format!(
                    "struct {struct_name} {{\n    values: {runtime},\n}}"
                )),
            });
            let mut node = AttributedNode::local(name, runtime, token.value.clone());
            node.length = *length;
            node.class = ResourceClass::StorageArray { access };
            node.binding = Some(slot);
            return node;
        }

        if !st.uniforms_opened {
            st.uniforms_opened = true;
            let slot = st.take_slot();
            st.push_decl(ResourceDecl {
                name: UNIFORMS_VAR.to_string(),
                slot,
                kind: BindingKind::Uniform,
                decl: format!("var<uniform> {UNIFORMS_VAR}: {UNIFORMS_STRUCT};"),
                struct_def: None,
            });
        }
        let field_ty = match inf.ty {
            WgslType::Scalar(super::types::Scalar::Bool) => WgslType::I32,
            ref t => t.clone(),
        };
        st.plan.parts.uniform_fields.push(StructField {
            name: name.to_string(),
            ty: field_ty,
        });
        let mut node = AttributedNode::local(name, inf.ty, token.value.clone());
        node.class = ResourceClass::Uniform;
        node.binding = st
            .plan
            .parts
            .decls
            .iter()
            .find(|d| d.name == UNIFORMS_VAR)
            .map(|d| d.slot);
        node
    }

    fn plan_default_uniform(&self, st: &mut PlanState, name: &str, ty: WgslType) -> AttributedNode {
        if !st.defaults_opened {
            st.defaults_opened = true;
            let slot = st.take_slot();
            st.push_decl(ResourceDecl {
                name: DEFAULTS_VAR.to_string(),
                slot,
                kind: BindingKind::Uniform,
                decl: format!("var<uniform> {DEFAULTS_VAR}: {DEFAULTS_STRUCT};"),
                struct_def: None,
            });
        }
        st.plan.parts.default_fields.push(StructField {
            name: name.to_string(),
            ty: ty.clone(),
        });
        let mut node = AttributedNode::local(name, ty, None);
        node.class = ResourceClass::DefaultUniform;
        node.binding = st
            .plan
            .parts
            .decls
            .iter()
            .find(|d| d.name == DEFAULTS_VAR)
            .map(|d| d.slot);
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transpiler::syntax::parse_function;
    use crate::transpiler::tokenizer::tokenize;

    fn plan_for(src: &str, stage: StageKind, options: &CompileOptions) -> BindingPlan {
        let f = parse_function(src).unwrap();
        let registry = BuiltinRegistry::standard();
        let tokens = tokenize(&f, &[], &registry);
        let reserved = BTreeMap::from([(
            "threadId".to_string(),
            WgslType::vector(3, super::super::types::Scalar::U32),
        )]);
        let functions = BTreeMap::new();
        let planner = BindingPlanner::new(PlanContext {
            stage,
            body: &f.body,
            helpers: &[],
            registry: &registry,
            options,
            reserved: &reserved,
            functions: &functions,
            default_type: &WgslType::F32,
        });
        let returned: Vec<String> = f
            .body
            .iter()
            .filter_map(|s| match s {
                Stmt::Return(Some(Expr::Ident(n))) => Some(n.clone()),
                _ => None,
            })
            .collect();
        planner.plan(&tokens, &returned, 0)
    }

    #[test]
    fn test_returned_float_array_is_read_write_storage() {
        let plan = plan_for(
            "function f(data = [1.0, 2.0, 3.0, 4.0]) { return data }",
            StageKind::Compute,
            &CompileOptions::default(),
        );
        assert_eq!(plan.parts.decls.len(), 1);
        let d = &plan.parts.decls[0];
        assert_eq!(d.slot, BindingSlot::new(0, 0));
        assert_eq!(d.decl, "var<storage, read_write> data: DataStruct;");
        assert_eq!(
            d.struct_def.as_deref(),
            Some("struct DataStruct {\n    values: array<f32>,\n}")
        );
        assert_eq!(plan.nodes[0].length, Some(4));
        assert!(plan.nodes[0].is_returned);
        assert_eq!(plan.next_binding, 1);
    }

    #[test]
    fn test_vertex_storage_is_always_read() {
        let plan = plan_for(
            "function f(data = [1.0]) { data[0] = 2.0; return data }",
            StageKind::Vertex,
            &CompileOptions::default(),
        );
        assert_eq!(plan.parts.decls[0].kind, BindingKind::Storage { read_only: true });
    }

    #[test]
    fn test_shared_structs_consume_one_binding_each() {
        let plan = plan_for(
            "function f(a = 1.0, b = vec3(1.0), flag = true) { let x = a + b.x + resX + resY + frame }",
            StageKind::Compute,
            &CompileOptions::default(),
        );
        let names: Vec<(&str, u32)> = plan
            .parts
            .decls
            .iter()
            .map(|d| (d.name.as_str(), d.slot.binding))
            .collect();
        assert_eq!(names, [("uniforms", 0), ("defaults", 1)]);
        let fields: Vec<String> = plan
            .parts
            .uniform_fields
            .iter()
            .map(|f| format!("{}: {}", f.name, f.ty))
            .collect();
        assert_eq!(fields, ["a: f32", "b: vec3f", "flag: i32"]);
        assert_eq!(plan.default_uniforms, ["resX", "resY", "frame"]);
    }

    #[test]
    fn test_call_only_texture_names_are_resources() {
        let plan = plan_for(
            "function f(uv = vec2(0.5, 0.5)) {\n\
             let c = textureSample(albedoCubeArr, linearSamp, vec3(uv, 1.0), 0)\n\
             let d = textureSampleCompare(shadowMap, cmp, uv, 0.5)\n\
             textureStore(outTex, vec2i(0, 0), c)\n\
             }",
            StageKind::Fragment,
            &CompileOptions::default(),
        );
        let decl = |n: &str| {
            plan.parts
                .decls
                .iter()
                .find(|d| d.name == n)
                .map(|d| d.decl.clone())
                .unwrap()
        };
        assert_eq!(decl("albedoCubeArr"), "var albedoCubeArr: texture_cube_array<f32>;");
        assert_eq!(decl("linearSamp"), "var linearSamp: sampler;");
        assert_eq!(decl("shadowMap"), "var shadowMap: texture_depth_2d;");
        assert_eq!(decl("cmp"), "var cmp: sampler_comparison;");
        assert_eq!(
            decl("outTex"),
            "var outTex: texture_storage_2d<rgba8unorm, write>;"
        );
        let bindings: Vec<u32> = plan.parts.decls.iter().map(|d| d.slot.binding).collect();
        assert_eq!(bindings, [0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_override_wins_and_reserves_binding() {
        let options = CompileOptions::from_json(
            r#"{"variableTypes": {"data": {"type": "array<u32>", "prefix": "var<storage, read>", "binding": 3}}}"#,
        )
        .unwrap();
        let plan = plan_for(
            "function f(data = [1.0], k = 2.0) { return data }",
            StageKind::Compute,
            &options,
        );
        assert_eq!(plan.parts.decls[0].decl, "var<storage, read> data: array<u32>;");
        assert_eq!(plan.parts.decls[0].slot.binding, 3);
        assert_eq!(plan.parts.decls[1].slot.binding, 4);
        assert!(matches!(plan.nodes[0].class, ResourceClass::Override { .. }));
    }

    #[test]
    fn test_unannotated_indexed_input_falls_back_to_float_array() {
        let plan = plan_for(
            "function f(values) { values[threadId.x] = 1.0 }",
            StageKind::Compute,
            &CompileOptions::default(),
        );
        assert_eq!(plan.nodes[0].ty.to_string(), "array<f32>");
        assert_eq!(plan.fallbacks, ["values"]);
        assert!(plan.parts.decls[0].decl.starts_with("var<storage, read_write>"));
    }
}
