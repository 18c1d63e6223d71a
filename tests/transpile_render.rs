use wgsl_forge::PipelineError;
use wgsl_forge::options::CompileOptions;
use wgsl_forge::runtime::layout_entries;
use wgsl_forge::transpiler::Transpiler;
use wgsl_forge::transpiler::types::{BindingKind, BindingSlot};
use wgsl_forge::transpiler::validation::validate_module;

const VERTEX: &str = "function vert(time = 0.0) {\n\
  position = vec4(vertex.xy, 0.0, 1.0)\n\
  position.x += Math.sin(time) * 0.1\n\
}";

const FRAGMENT: &str = "function frag(time = 0.0, tint = vec3(1.0, 0.5, 0.25)) {\n\
  return [tint.x * color.x, tint.y, tint.z * Math.abs(Math.sin(time)), 1.0]\n\
}";

#[test]
fn test_shared_time_uniform_merges_into_one_struct() {
    let r = Transpiler::new()
        .compile_render(Some(VERTEX), Some(FRAGMENT), &CompileOptions::default())
        .unwrap();
    let v = r.vertex.decl("uniforms").unwrap();
    let f = r.fragment.decl("uniforms").unwrap();
    assert_eq!(v.slot, BindingSlot::new(0, 0));
    assert_eq!(v.slot, f.slot);

    let fields: Vec<String> = r
        .vertex
        .parts()
        .uniform_fields
        .iter()
        .map(|f| format!("{}: {}", f.name, f.ty))
        .collect();
    assert_eq!(fields, ["time: f32", "tint: vec3f"]);
    assert_eq!(r.vertex.parts().uniform_fields, r.fragment.parts().uniform_fields);

    assert_eq!(r.code.matches("struct UniformsStruct {").count(), 1);
    assert_eq!(r.code.matches("var<uniform> uniforms: UniformsStruct;").count(), 1);
    assert!(r.code.contains("fn vtx_main("));
    assert!(r.code.contains("fn frag_main("));
    assert!(r.code.contains("pixel.position.x += sin(uniforms.time) * 0.1;"));
    validate_module(&r.code).unwrap();
    validate_module(&r.vertex.code).unwrap();
    validate_module(&r.fragment.code).unwrap();
}

#[test]
fn test_layout_entries_union_stage_visibility() {
    let r = Transpiler::new()
        .compile_render(
            Some("function v(pts = [0.0, 0.5, 1.0]) { position.y = pts[vertexIndex] }"),
            Some("function f(k = 1.0) { return [k, k, k, 1.0] }"),
            &CompileOptions::default(),
        )
        .unwrap();
    let entries = layout_entries(&r.stages(), 0);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "pts");
    assert_eq!(entries[0].kind, BindingKind::Storage { read_only: true });
    assert!(entries[0].visibility.vertex && !entries[0].visibility.fragment);
    assert_eq!(entries[1].name, "uniforms");
    assert_eq!(entries[1].binding, 1);
    assert!(entries[1].visibility.fragment);
    assert_eq!(r.fragment.alt_bindings.get("uniforms"), Some(&BindingSlot::new(0, 1)));
    validate_module(&r.code).unwrap();
}

#[test]
fn test_fragment_texture_and_sampler_are_declared() {
    let r = Transpiler::new()
        .compile_render(
            Some("function v() { position = vertex }"),
            Some("function f() {\n  let c = textureSample(albedo, samp, uv)\n  return c\n}"),
            &CompileOptions::default(),
        )
        .unwrap();
    assert_eq!(r.fragment.decl("albedo").unwrap().decl, "var albedo: texture_2d<f32>;");
    assert_eq!(r.fragment.decl("samp").unwrap().decl, "var samp: sampler;");
    assert!(r.code.contains("textureSample(albedo, samp, pixel.uv)"));
    validate_module(&r.code).unwrap();
}

#[test]
fn test_missing_fragment_is_a_pipeline_error() {
    let err = Transpiler::new()
        .compile_render(Some(VERTEX), None, &CompileOptions::default())
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<PipelineError>(),
        Some(&PipelineError::MissingStage("fragment"))
    );
}

mod properties {
    use proptest::prelude::*;
    use wgsl_forge::options::CompileOptions;
    use wgsl_forge::transpiler::{StageKind, Transpiler, reconcile};

    proptest! {
        #[test]
        fn test_reconciling_with_own_copy_changes_nothing(count in 1usize..5, gain in 0.0f32..4.0) {
            let params: Vec<String> = (0..count).map(|i| format!("u{i} = {gain:.3}")).collect();
            let sum: Vec<String> = (0..count).map(|i| format!("u{i}")).collect();
            let src = format!(
                "function f({}) {{\n  let s = {} + resX\n  return [s, s, s, 1.0]\n}}",
                params.join(", "),
                sum.join(" + ")
            );
            let mut a = Transpiler::new()
                .compile_stage(&src, StageKind::Fragment, &CompileOptions::default(), None)
                .unwrap();
            let original = a.clone();
            let mut b = a.clone();
            let r = reconcile(&mut a, &mut b);
            prop_assert!(r.alt_a.is_empty() && r.alt_b.is_empty());
            prop_assert_eq!(&r.code_a, &original.code);
            prop_assert_eq!(&r.code_b, &original.code);
            prop_assert_eq!(a.parts().uniform_fields.len(), count);
        }
    }
}
