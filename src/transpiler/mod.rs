//! Authoring-language to WGSL transpiler.
//!
//! A stage function goes through lexing and parsing, token extraction, binding
//! planning and a structural rewrite before the entry-point template wraps it.
//! Render pipelines compile both stages and reconcile their bindings.

pub mod builtins;
pub mod infer;
pub mod lexer;
pub mod math_table;
pub mod planner;
pub mod reconcile;
pub mod rewrite;
pub mod stage;
pub mod syntax;
pub mod tokenizer;
pub mod type_catalog;
pub mod types;
pub mod utils;
pub mod validation;

use anyhow::Result;

use crate::error::PipelineError;
use crate::options::CompileOptions;

pub use builtins::{BuiltinRegistry, HostContext};
pub use math_table::MathTable;
pub use reconcile::{Reconciliation, reconcile};
pub use types::{StageKind, StageProgram, WgslType};

use types::HelperFn;

/// Compiler context: the built-in uniform registry, the `Math` table and the
/// inference fallback type.
#[derive(Clone, Debug)]
pub struct Transpiler {
    registry: BuiltinRegistry,
    math: MathTable,
    default_type: WgslType,
}

impl Default for Transpiler {
    fn default() -> Self {
        Self::new()
    }
}

/// A vertex and fragment stage with reconciled bindings.
#[derive(Clone, Debug)]
pub struct RenderProgram {
    pub vertex: StageProgram,
    pub fragment: StageProgram,
    /// One module holding both entry points.
    pub code: String,
}

impl RenderProgram {
    pub fn stages(&self) -> [&StageProgram; 2] {
        [&self.vertex, &self.fragment]
    }
}

impl Transpiler {
    pub fn new() -> Self {
        Self {
            registry: BuiltinRegistry::standard(),
            math: MathTable::standard(),
            default_type: WgslType::F32,
        }
    }

    pub fn with_registry(mut self, registry: BuiltinRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_math(mut self, math: MathTable) -> Self {
        self.math = math;
        self
    }

    pub fn with_default_type(mut self, ty: WgslType) -> Self {
        self.default_type = ty;
        self
    }

    pub fn registry(&self) -> &BuiltinRegistry {
        &self.registry
    }

    /// Compile one stage. `starting_binding` overrides `options.starting_binding`.
    pub fn compile_stage(
        &self,
        source: &str,
        stage: StageKind,
        options: &CompileOptions,
        starting_binding: Option<u32>,
    ) -> Result<StageProgram> {
        let start = starting_binding
            .or(options.starting_binding)
            .unwrap_or(0);
        self.build_stage(source, stage, options, start)
    }

    pub fn compile_compute(&self, source: &str, options: &CompileOptions) -> Result<StageProgram> {
        self.compile_stage(source, StageKind::Compute, options, None)
    }

    /// Compile, reconcile and merge a vertex and a fragment stage.
    pub fn compile_render(
        &self,
        vertex: Option<&str>,
        fragment: Option<&str>,
        options: &CompileOptions,
    ) -> Result<RenderProgram> {
        let vertex = vertex.ok_or(PipelineError::MissingStage("vertex"))?;
        let fragment = fragment.ok_or(PipelineError::MissingStage("fragment"))?;
        let mut vertex = self.compile_stage(vertex, StageKind::Vertex, options, None)?;
        let mut fragment = self.compile_stage(fragment, StageKind::Fragment, options, None)?;
        reconcile(&mut vertex, &mut fragment);
        let code = combined_module(&vertex, &fragment);
        Ok(RenderProgram {
            vertex,
            fragment,
            code,
        })
    }
}

/// Merge two reconciled stages into one module, declaring shared items once.
fn combined_module(a: &StageProgram, b: &StageProgram) -> String {
    let mut parts = a.parts().clone();
    let theirs = b.parts();
    for decl in &theirs.decls {
        if !parts.decls.iter().any(|d| d.name == decl.name) {
            parts.decls.push(decl.clone());
        }
    }
    for c in &theirs.consts {
        if !parts.consts.contains(c) {
            parts.consts.push(c.clone());
        }
    }
    let renames = helper_renames(&parts.helpers, &theirs.helpers);
    for h in &theirs.helpers {
        let helper = HelperFn {
            name: renamed(&h.name, &renames),
            code: rename_all(&h.code, &renames),
        };
        if !parts.helpers.contains(&helper) {
            parts.helpers.push(helper);
        }
    }
    if parts.interstage.is_none() {
        parts.interstage = theirs.interstage.clone();
    }
    parts.entry = format!("{}\n\n{}", parts.entry, rename_all(&theirs.entry, &renames));
    let header = stage::render_header(&parts);
    stage::render_module(&parts, &header)
}

/// Second-stage helpers whose name is taken by a different first-stage helper.
/// Renaming a callee changes its callers' code, so this runs to a fixpoint.
fn helper_renames(ours: &[HelperFn], theirs: &[HelperFn]) -> Vec<(String, String)> {
    let mut renames: Vec<(String, String)> = Vec::new();
    loop {
        let fresh: Vec<(String, String)> = theirs
            .iter()
            .filter(|h| !renames.iter().any(|(from, _)| *from == h.name))
            .filter(|h| {
                let code = rename_all(&h.code, &renames);
                ours.iter().any(|x| x.name == h.name && x.code != code)
            })
            .map(|h| (h.name.clone(), format!("{}_fragment", h.name)))
            .collect();
        if fresh.is_empty() {
            return renames;
        }
        for (from, to) in &fresh {
            log::warn!("helper `{from}` differs between stages; the fragment copy becomes `{to}`");
        }
        renames.extend(fresh);
    }
}

fn renamed(name: &str, renames: &[(String, String)]) -> String {
    renames
        .iter()
        .find(|(from, _)| from == name)
        .map_or_else(|| name.to_string(), |(_, to)| to.clone())
}

fn rename_all(text: &str, renames: &[(String, String)]) -> String {
    renames
        .iter()
        .fold(text.to_string(), |t, (from, to)| rename_calls(&t, from, to))
}

/// Replace `from(` with `to(` where `from` is a whole identifier.
fn rename_calls(text: &str, from: &str, to: &str) -> String {
    let pattern = format!("{from}(");
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(&pattern) {
        let (before, after) = rest.split_at(pos);
        let whole = before
            .chars()
            .next_back()
            .is_none_or(|c| !(c.is_ascii_alphanumeric() || c == '_'));
        out.push_str(before);
        out.push_str(if whole { to } else { from });
        out.push('(');
        rest = &after[pattern.len()..];
    }
    out.push_str(rest);
    out
}
