use wgsl_forge::options::CompileOptions;
use wgsl_forge::runtime::layout_entries;
use wgsl_forge::transpiler::Transpiler;
use wgsl_forge::transpiler::types::{BindingKind, BindingSlot};
use wgsl_forge::transpiler::validation::validate_module;

fn compile(src: &str) -> wgsl_forge::StageProgram {
    Transpiler::new()
        .compile_compute(src, &CompileOptions::default())
        .unwrap()
}

#[test]
fn test_data_scenario_declares_one_read_write_storage_struct() {
    let p = compile(
        "function double(data = [1.0, 2.0, 3.0, 4.0]) {\n\
         \x20 data[threadId.x] = data[threadId.x] * 2.0\n\
         \x20 return data\n\
         }",
    );
    let decls = &p.parts().decls;
    assert_eq!(decls.len(), 1);
    assert_eq!(decls[0].slot, BindingSlot::new(0, 0));
    assert_eq!(decls[0].kind, BindingKind::Storage { read_only: false });
    assert!(p.code.contains("struct DataStruct {\n    values: array<f32>,\n}"));
    assert!(p.code.contains("@group(0) @binding(0) var<storage, read_write> data: DataStruct;"));
    assert!(p.code.contains("@compute @workgroup_size(64)"));
    assert!(p.code.contains("data.values[threadId.x] = data.values[threadId.x] * 2.0;"));
    assert!(p.code.contains("// return data;"));
    assert_eq!(p.returned, ["data"]);
    assert_eq!(p.workgroup_size, Some(64));
    validate_module(&p.code).unwrap();
}

#[test]
fn test_uniforms_defaults_and_helpers_validate() {
    let p = compile(
        "function blur(src = [0.0, 0.0, 0.0, 0.0], dst = [0.0, 0.0, 0.0, 0.0], radius = 2, gain = 1.0) {\n\
         \x20 function weight(d = 0.0) {\n\
         \x20   return 1.0 / (1.0 + d)\n\
         \x20 }\n\
         \x20 let i = threadId.x\n\
         \x20 let acc = 0.0\n\
         \x20 for (let k = 0; k < radius; k++) {\n\
         \x20   acc += src[i] * weight(1.0)\n\
         \x20 }\n\
         \x20 dst[i] = acc * gain + utcTime * 0.0\n\
         \x20 return dst\n\
         }",
    );
    let names: Vec<(&str, u32)> = p
        .parts()
        .decls
        .iter()
        .map(|d| (d.name.as_str(), d.slot.binding))
        .collect();
    assert_eq!(
        names,
        [("src", 0), ("dst", 1), ("uniforms", 2), ("defaults", 3)]
    );
    assert_eq!(p.decl("src").unwrap().kind, BindingKind::Storage { read_only: true });
    assert_eq!(p.decl("dst").unwrap().kind, BindingKind::Storage { read_only: false });
    assert!(p.code.contains("fn weight(d: f32) -> f32 {"));
    assert!(p.code.contains("k < uniforms.radius"));
    assert!(p.code.contains("defaults.utcTime"));
    assert_eq!(p.default_uniforms.as_deref(), Some(&["utcTime".to_string()][..]));
    assert!(p.inference_fallbacks.is_empty());
    validate_module(&p.code).unwrap();
}

#[test]
fn test_mixed_numeric_bodies_validate() {
    let cases = [
        ("int times float", "let i = 2\n  data[threadId.x] = data[threadId.x] * i"),
        ("int exponent", "let x = data[0]\n  data[1] = x ** 2"),
        ("negated base", "data[1] = -data[0] ** 2"),
        ("mixed ternary", "let i = 1\n  data[0] = data[1] > 0.0 ? i : 0.5"),
        ("int stored into floats", "let i = 3\n  data[0] = i\n  data[1] += i"),
        ("storage fill", "data = new Array(data.length).fill(1)"),
        ("increment as value", "let i = 0\n  let j = i++\n  data[j] = f32(i)"),
        ("fill as value", "data[0] = new Array(3).fill(1.0)[1]"),
        ("signed and unsigned index", "let i = 1\n  data[i + threadId.x] = data[threadId.x + 1] * 0.5"),
    ];
    for (label, body) in cases {
        let src = format!("function f(data = [1.0, 2.0, 3.0, 4.0]) {{\n  {body}\n}}");
        let p = compile(&src);
        if let Err(err) = validate_module(&p.code) {
            panic!("{label}: {err:#}\n{}", p.code);
        }
    }
}

#[test]
fn test_options_control_workgroup_and_bindings() {
    let options = CompileOptions::from_json(
        r#"{"workgroupSize": 128, "startingBinding": 2, "bindGroupNumber": 1}"#,
    )
    .unwrap();
    let p = Transpiler::new()
        .compile_compute("function f(data = [1.0]) { data[threadId.x] = 0.0 }", &options)
        .unwrap();
    assert!(p.code.contains("@compute @workgroup_size(128)"));
    assert_eq!(p.decl("data").unwrap().slot, BindingSlot::new(1, 2));
    assert_eq!(layout_entries(&[&p], 1).len(), 1);
    assert!(layout_entries(&[&p], 0).is_empty());
}

#[test]
fn test_storage_texture_format_from_options() {
    let options = CompileOptions::from_json(r#"{"textures": {"outTex": {"format": "rgba16float"}}}"#)
        .unwrap();
    let p = Transpiler::new()
        .compile_compute(
            "function paint() {\n\
             \x20 textureStore(outTex, vec2(i32(threadId.x), 0), vec4(1.0, 0.0, 0.0, 1.0))\n\
             }",
            &options,
        )
        .unwrap();
    let decl = p.decl("outTex").unwrap();
    assert_eq!(decl.decl, "var outTex: texture_storage_2d<rgba16float, write>;");
    assert!(matches!(decl.kind, BindingKind::StorageTexture { .. }));
}

#[test]
fn test_unannotated_input_is_recorded_as_fallback() {
    let p = compile("function f(values) { values[threadId.x] = 1.0 }");
    assert_eq!(p.inference_fallbacks, ["values"]);
    assert!(p.code.contains("values: array<f32>,"));
}

#[test]
fn test_parse_errors_report_the_line() {
    let err = Transpiler::new()
        .compile_compute("function f() {\n  let = 1\n}", &CompileOptions::default())
        .unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("failed to parse compute stage"));
    assert!(msg.contains("line 2"));
}

#[test]
fn test_recompiling_is_deterministic() {
    let src = "function f(a = [1.0, 2.0], s = 0.5) { a[threadId.x] *= s * resX }";
    assert_eq!(compile(src).code, compile(src).code);
}

mod properties {
    use proptest::prelude::*;
    use wgsl_forge::transpiler::syntax::parse_function;
    use wgsl_forge::transpiler::tokenizer::tokenize;
    use wgsl_forge::transpiler::BuiltinRegistry;

    fn source() -> impl Strategy<Value = String> {
        (
            prop::collection::vec("[a-z]{1,6}", 1..4),
            prop::sample::select(vec!["resX", "frame", "mouseY", "x"]),
            0.0f32..10.0,
        )
            .prop_map(|(names, builtin, v)| {
                let params: Vec<String> = names.iter().map(|n| format!("p_{n} = {v:.2}")).collect();
                format!(
                    "function f({}) {{\n  let a = {v:.2} * {builtin}\n  const b = textureLoad(tex, vec2i(0, 0), 0)\n}}",
                    params.join(", ")
                )
            })
    }

    proptest! {
        #[test]
        fn test_tokenizing_twice_is_identical(src in source()) {
            let registry = BuiltinRegistry::standard();
            let func = parse_function(&src).unwrap();
            let first = tokenize(&func, &[], &registry);
            let second = tokenize(&parse_function(&src).unwrap(), &[], &registry);
            prop_assert_eq!(first, second);
        }
    }
}
