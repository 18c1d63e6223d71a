//! Binding reconciliation between two stages that share one pipeline layout.

use std::collections::{BTreeMap, BTreeSet};

use super::planner::{DEFAULTS_VAR, UNIFORMS_VAR};
use super::types::{BindingSlot, StageProgram, StructField};

#[derive(Clone, Debug, PartialEq)]
pub struct Reconciliation {
    pub code_a: String,
    pub alt_a: BTreeMap<String, BindingSlot>,
    pub code_b: String,
    pub alt_b: BTreeMap<String, BindingSlot>,
}

fn merge_fields(a: &[StructField], b: &[StructField]) -> Vec<StructField> {
    let mut merged = a.to_vec();
    for field in b {
        if !merged.iter().any(|f| f.name == field.name) {
            merged.push(field.clone());
        }
    }
    merged
}

fn next_free(group: u32, used: &BTreeSet<BindingSlot>) -> BindingSlot {
    let mut slot = BindingSlot::new(group, 0);
    while used.contains(&slot) {
        slot.binding += 1;
    }
    slot
}

/// Point node bindings at their (possibly moved) declarations.
fn sync_node_bindings(program: &mut StageProgram) {
    let slots: BTreeMap<String, BindingSlot> = program
        .parts
        .decls
        .iter()
        .map(|d| (d.name.clone(), d.slot))
        .collect();
    for node in &mut program.params {
        let key = if node.is_uniform() {
            UNIFORMS_VAR
        } else if node.is_default_uniform() {
            DEFAULTS_VAR
        } else {
            node.name.as_str()
        };
        if let Some(slot) = slots.get(key) {
            node.binding = Some(*slot);
        }
    }
}

/// Make `b`'s declarations agree with `a`'s and merge the shared uniform structs.
///
/// `a` keeps its slots. A name declared by both takes `a`'s slot in `b`; other
/// declarations of `b` that collide move to the next free binding of their group.
pub fn reconcile(a: &mut StageProgram, b: &mut StageProgram) -> Reconciliation {
    let a_slots: BTreeMap<String, BindingSlot> = a
        .parts
        .decls
        .iter()
        .map(|d| (d.name.clone(), d.slot))
        .collect();
    let mut used: BTreeSet<BindingSlot> = a_slots.values().copied().collect();

    let mut movers = Vec::new();
    for (i, decl) in b.parts.decls.iter_mut().enumerate() {
        if let Some(slot) = a_slots.get(&decl.name) {
            if decl.slot != *slot {
                log::debug!(
                    "`{}` shares binding {} with the other stage",
                    decl.name,
                    slot.binding
                );
                decl.slot = *slot;
                b.alt_bindings.insert(decl.name.clone(), *slot);
            }
        } else if !used.insert(decl.slot) {
            movers.push(i);
        }
    }
    for i in movers {
        let decl = &mut b.parts.decls[i];
        let slot = next_free(decl.slot.group, &used);
        log::debug!(
            "`{}` moved from binding {} to {}",
            decl.name,
            decl.slot.binding,
            slot.binding
        );
        used.insert(slot);
        decl.slot = slot;
        b.alt_bindings.insert(decl.name.clone(), slot);
    }
    sync_node_bindings(b);

    let uniforms = merge_fields(&a.parts.uniform_fields, &b.parts.uniform_fields);
    let defaults = merge_fields(&a.parts.default_fields, &b.parts.default_fields);
    let default_names: Vec<String> = defaults.iter().map(|f| f.name.clone()).collect();
    for p in [&mut *a, &mut *b] {
        p.parts.uniform_fields = uniforms.clone();
        p.parts.default_fields = defaults.clone();
        p.default_uniforms = (!default_names.is_empty()).then(|| default_names.clone());
        p.assemble();
    }

    Reconciliation {
        code_a: a.code.clone(),
        alt_a: a.alt_bindings.clone(),
        code_b: b.code.clone(),
        alt_b: b.alt_bindings.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::CompileOptions;
    use crate::transpiler::Transpiler;
    use crate::transpiler::types::StageKind;

    fn compile(src: &str, stage: StageKind) -> StageProgram {
        Transpiler::new()
            .compile_stage(src, stage, &CompileOptions::default(), None)
            .unwrap()
    }

    #[test]
    fn test_shared_uniform_struct_keeps_one_slot() {
        let mut a = compile("function v(time = 0.0) { position.x = time }", StageKind::Vertex);
        let mut b = compile("function f(time = 0.0, tint = vec3(1.0)) { return [tint.x, time, 0.0, 1.0] }", StageKind::Fragment);
        let r = reconcile(&mut a, &mut b);
        assert!(r.alt_b.is_empty());
        assert_eq!(a.parts().uniform_fields, b.parts().uniform_fields);
        assert_eq!(a.parts().uniform_fields.len(), 2);
        assert!(r.code_a.contains("    tint: vec3f,"));
        assert_eq!(a.decl("uniforms").unwrap().slot, b.decl("uniforms").unwrap().slot);
    }

    #[test]
    fn test_colliding_declaration_moves() {
        let mut a = compile("function v(pts = [1.0, 2.0]) { position.x = pts[vertexIndex] }", StageKind::Vertex);
        let mut b = compile("function f(k = 1.0) { return [k, k, k, 1.0] }", StageKind::Fragment);
        assert_eq!(b.decl("uniforms").unwrap().slot.binding, 0);
        let r = reconcile(&mut a, &mut b);
        assert_eq!(r.alt_b.get("uniforms"), Some(&BindingSlot::new(0, 1)));
        assert!(r.code_b.contains("@group(0) @binding(1) var<uniform> uniforms: UniformsStruct;"));
        assert_eq!(b.params[0].binding, Some(BindingSlot::new(0, 1)));
    }

    #[test]
    fn test_reconcile_with_own_copy_changes_nothing() {
        let mut a = compile("function f(data = [1.0], s = 2.0) { data[0] = s * resX }", StageKind::Compute);
        let mut b = a.clone();
        let before = a.code.clone();
        let r = reconcile(&mut a, &mut b);
        assert!(r.alt_a.is_empty() && r.alt_b.is_empty());
        assert_eq!(r.code_a, before);
        assert_eq!(r.code_b, before);
    }
}
