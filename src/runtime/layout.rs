//! Bind-group layout entries derived from compiled stages.

use serde::Serialize;

use crate::transpiler::types::{BindingKind, StageKind, StageProgram};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Visibility {
    pub compute: bool,
    pub vertex: bool,
    pub fragment: bool,
}

impl Visibility {
    pub fn of(stage: StageKind) -> Self {
        Self {
            compute: stage == StageKind::Compute,
            vertex: stage == StageKind::Vertex,
            fragment: stage == StageKind::Fragment,
        }
    }

    fn union(self, other: Visibility) -> Self {
        Self {
            compute: self.compute || other.compute,
            vertex: self.vertex || other.vertex,
            fragment: self.fragment || other.fragment,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutEntry {
    pub binding: u32,
    pub name: String,
    pub visibility: Visibility,
    pub kind: BindingKind,
}

/// Entries of bind group `group` across `programs`, ordered by binding.
///
/// Stages that declare the same binding share one entry: visibility is the
/// union, and a storage buffer stays read-only only if every stage reads it.
pub fn layout_entries(programs: &[&StageProgram], group: u32) -> Vec<LayoutEntry> {
    let mut entries: Vec<LayoutEntry> = Vec::new();
    for program in programs {
        let visibility = Visibility::of(program.stage);
        for decl in program.parts().decls.iter().filter(|d| d.slot.group == group) {
            match entries.iter_mut().find(|e| e.binding == decl.slot.binding) {
                Some(entry) => {
                    entry.visibility = entry.visibility.union(visibility);
                    if let (
                        BindingKind::Storage { read_only },
                        BindingKind::Storage { read_only: other },
                    ) = (&mut entry.kind, &decl.kind)
                    {
                        *read_only &= *other;
                    }
                }
                None => entries.push(LayoutEntry {
                    binding: decl.slot.binding,
                    name: decl.name.clone(),
                    visibility,
                    kind: decl.kind.clone(),
                }),
            }
        }
    }
    entries.sort_by_key(|e| e.binding);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::CompileOptions;
    use crate::transpiler::Transpiler;

    #[test]
    fn test_compute_entries_follow_declarations() {
        let p = Transpiler::new()
            .compile_compute(
                "function f(data = [1.0], scale = 2.0) { data[threadId.x] = data[threadId.x] * scale }",
                &CompileOptions::default(),
            )
            .unwrap();
        let entries = layout_entries(&[&p], 0);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "data");
        assert_eq!(entries[0].kind, BindingKind::Storage { read_only: false });
        assert!(entries[0].visibility.compute && !entries[0].visibility.fragment);
        assert_eq!(entries[1].kind, BindingKind::Uniform);
        assert!(layout_entries(&[&p], 1).is_empty());
    }

    #[test]
    fn test_render_entries_merge_visibility() {
        let r = Transpiler::new()
            .compile_render(
                Some("function v(time = 0.0) { position.x = time }"),
                Some("function f(time = 0.0) { return [time, 0.0, 0.0, 1.0] }"),
                &CompileOptions::default(),
            )
            .unwrap();
        let entries = layout_entries(&[&r.vertex, &r.fragment], 0);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].visibility.vertex && entries[0].visibility.fragment);
        assert!(!entries[0].visibility.compute);
    }

    #[test]
    fn test_entries_serialize_for_cli() {
        let entry = LayoutEntry {
            binding: 2,
            name: "albedo".to_string(),
            visibility: Visibility::of(StageKind::Fragment),
            kind: BindingKind::Sampler { comparison: false },
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"]["type"], "sampler");
        assert_eq!(json["visibility"]["fragment"], true);
    }
}
