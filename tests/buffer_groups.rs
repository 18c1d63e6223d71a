use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, bail};
use wgsl_forge::options::CompileOptions;
use wgsl_forge::pipeline::{ComputePipeline, RenderResources};
use wgsl_forge::runtime::{
    BindResource, BufferOptions, BufferUsage, GpuBackend, GroupState, InputValue, LayoutEntry,
    SamplerDesc, TextureData, TextureDesc,
};
use wgsl_forge::transpiler::Transpiler;
use wgsl_forge::values::{ArrayData, UniformValue};
use wgsl_forge::PipelineError;

#[derive(Debug, Default, Clone, PartialEq)]
struct Counters {
    buffers: usize,
    writes: usize,
    textures: usize,
    texture_writes: usize,
    samplers: usize,
    layouts: usize,
    bind_groups: usize,
    pipelines: usize,
    dispatches: usize,
    reads: usize,
}

#[derive(Clone, Debug, PartialEq)]
struct MockBuffer {
    id: u64,
    size: u64,
}

#[derive(Default)]
struct MockBackend {
    counters: RefCell<Counters>,
    next_id: Cell<u64>,
    contents: RefCell<HashMap<u64, Vec<u8>>>,
    last_dispatch: Cell<Option<[u32; 3]>>,
}

impl MockBackend {
    fn id(&self) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    fn counters(&self) -> Counters {
        self.counters.borrow().clone()
    }

    fn f32_at(&self, buffer: &MockBuffer, index: usize) -> f32 {
        let contents = self.contents.borrow();
        let bytes = &contents[&buffer.id][index * 4..index * 4 + 4];
        bytemuck::pod_read_unaligned(bytes)
    }
}

impl GpuBackend for MockBackend {
    type Buffer = MockBuffer;
    type Texture = (u64, TextureDesc);
    type Sampler = (u64, SamplerDesc);
    type BindGroupLayout = Vec<LayoutEntry>;
    type BindGroup = Vec<(u32, u64)>;
    type ComputePipeline = String;
    type PendingRead = Vec<u8>;

    fn create_buffer(
        &self,
        _label: &str,
        size: u64,
        _usage: BufferUsage,
        contents: Option<&[u8]>,
    ) -> Result<MockBuffer> {
        self.counters.borrow_mut().buffers += 1;
        let id = self.id();
        let data = contents.map_or_else(|| vec![0; size as usize], <[u8]>::to_vec);
        self.contents.borrow_mut().insert(id, data);
        Ok(MockBuffer { id, size })
    }

    fn buffer_size(&self, buffer: &MockBuffer) -> u64 {
        buffer.size
    }

    fn write_buffer(&self, buffer: &MockBuffer, offset: u64, data: &[u8]) -> Result<()> {
        self.counters.borrow_mut().writes += 1;
        let mut contents = self.contents.borrow_mut();
        let Some(dst) = contents.get_mut(&buffer.id) else {
            bail!("unknown buffer {}", buffer.id);
        };
        let start = offset as usize;
        dst[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn create_texture(&self, _label: &str, desc: &TextureDesc) -> Result<(u64, TextureDesc)> {
        self.counters.borrow_mut().textures += 1;
        Ok((self.id(), desc.clone()))
    }

    fn write_texture(&self, _texture: &(u64, TextureDesc), _desc: &TextureDesc, _data: &[u8]) -> Result<()> {
        self.counters.borrow_mut().texture_writes += 1;
        Ok(())
    }

    fn create_sampler(&self, _label: &str, desc: &SamplerDesc) -> Result<(u64, SamplerDesc)> {
        self.counters.borrow_mut().samplers += 1;
        Ok((self.id(), *desc))
    }

    fn create_bind_group_layout(&self, _label: &str, entries: &[LayoutEntry]) -> Result<Vec<LayoutEntry>> {
        self.counters.borrow_mut().layouts += 1;
        Ok(entries.to_vec())
    }

    fn create_bind_group(
        &self,
        _label: &str,
        layout: &Vec<LayoutEntry>,
        entries: &[(u32, BindResource<'_, Self>)],
    ) -> Result<Vec<(u32, u64)>> {
        if layout.len() != entries.len() {
            bail!("layout has {} entries, bind group {}", layout.len(), entries.len());
        }
        self.counters.borrow_mut().bind_groups += 1;
        Ok(entries
            .iter()
            .map(|(binding, r)| {
                let id = match r {
                    BindResource::Buffer(b) => b.id,
                    BindResource::Texture(t) => t.0,
                    BindResource::Sampler(s) => s.0,
                };
                (*binding, id)
            })
            .collect())
    }

    fn create_compute_pipeline(
        &self,
        _label: &str,
        code: &str,
        _entry_point: &str,
        _layouts: &[&Vec<LayoutEntry>],
    ) -> Result<String> {
        self.counters.borrow_mut().pipelines += 1;
        Ok(code.to_string())
    }

    fn dispatch(&self, _pipeline: &String, _groups: &[&Vec<(u32, u64)>], workgroups: [u32; 3]) -> Result<()> {
        self.counters.borrow_mut().dispatches += 1;
        self.last_dispatch.set(Some(workgroups));
        Ok(())
    }

    fn begin_read(&self, buffer: &MockBuffer) -> Result<Vec<u8>> {
        self.counters.borrow_mut().reads += 1;
        Ok(self.contents.borrow()[&buffer.id].clone())
    }

    async fn finish_read(&self, pending: Vec<u8>) -> Result<Vec<u8>> {
        Ok(pending)
    }
}

const SCALE: &str = "function scale(data = [1.0, 2.0], k = 2.0) {\n\
  data[threadId.x] *= k * resX\n\
  return data\n\
}";

fn pipeline(backend: &Arc<MockBackend>, source: &str) -> ComputePipeline<MockBackend> {
    ComputePipeline::builder()
        .device(Arc::clone(backend))
        .source(source)
        .build(&Transpiler::new())
        .unwrap()
}

fn array(values: &[f32]) -> Option<InputValue<MockBackend>> {
    Some(InputValue::Array(ArrayData::F32(values.to_vec())))
}

#[test]
fn test_missing_device_is_reported() {
    let err = ComputePipeline::<MockBackend>::builder()
        .source(SCALE)
        .build(&Transpiler::new())
        .err()
        .unwrap();
    assert_eq!(
        err.downcast_ref::<PipelineError>(),
        Some(&PipelineError::MissingDevice)
    );
}

#[test]
fn test_first_buffer_creates_everything_once() {
    let backend = Arc::new(MockBackend::default());
    let mut p = pipeline(&backend, SCALE);
    assert_eq!(backend.counters().pipelines, 1);
    let group = p.manager().group(0).unwrap();
    assert_eq!(group.state(), GroupState::Uninitialized);

    let outcome = p.buffer(&[None, None], &BufferOptions::default()).unwrap();
    assert!(outcome.rebuilt_bind_group);
    let c = backend.counters();
    // data, uniforms, defaults
    assert_eq!(c.buffers, 3);
    assert_eq!(c.bind_groups, 1);
    let group = p.manager().group(0).unwrap();
    assert_eq!(group.state(), GroupState::Populated);
    let data = group.buffer_handle("data").unwrap();
    assert_eq!(backend.f32_at(data, 1), 2.0);
    assert_eq!(group.length("data"), Some(2));
}

#[test]
fn test_same_length_writes_in_place_and_new_length_rebuilds() {
    let backend = Arc::new(MockBackend::default());
    let mut p = pipeline(&backend, SCALE);
    let options = BufferOptions::default();
    p.buffer(&[None, None], &options).unwrap();

    let outcome = p.buffer(&[array(&[3.0, 4.0]), None], &options).unwrap();
    assert!(!outcome.rebuilt_bind_group);
    assert_eq!(backend.counters().buffers, 3);
    let data = p.manager().group(0).unwrap().buffer_handle("data").unwrap();
    assert_eq!(backend.f32_at(data, 0), 3.0);

    let outcome = p.buffer(&[array(&[1.0; 8]), None], &options).unwrap();
    assert!(outcome.rebuilt_bind_group);
    assert_eq!(backend.counters().buffers, 4);
    assert_eq!(backend.counters().bind_groups, 2);
    assert_eq!(p.manager().group(0).unwrap().length("data"), Some(8));
}

#[test]
fn test_uniforms_persist_and_defaults_resample() {
    let backend = Arc::new(MockBackend::default());
    let mut p = pipeline(&backend, SCALE);
    let options = BufferOptions::default();
    p.manager().host().set_resolution(640, 480);
    p.buffer(&[None, Some(InputValue::Uniform(UniformValue::Scalar(5.0)))], &options)
        .unwrap();
    p.manager().host().set_resolution(800, 600);
    p.buffer(&[None, None], &options).unwrap();

    let group = p.manager().group(0).unwrap();
    assert_eq!(group.uniform_value("k"), Some(&UniformValue::Scalar(5.0)));
    let uniforms = group.buffer_handle("uniforms").unwrap();
    assert_eq!(backend.f32_at(uniforms, 0), 5.0);
    let defaults = group.buffer_handle("defaults").unwrap();
    assert_eq!(backend.f32_at(defaults, 0), 800.0);
    assert_eq!(backend.counters().bind_groups, 1);
}

#[test]
fn test_new_bindings_forces_rebuild() {
    let backend = Arc::new(MockBackend::default());
    let mut p = pipeline(&backend, SCALE);
    p.buffer(&[None, None], &BufferOptions::default()).unwrap();
    let options = BufferOptions {
        new_bindings: true,
        ..BufferOptions::default()
    };
    assert!(p.buffer(&[None, None], &options).unwrap().rebuilt_bind_group);
    assert_eq!(backend.counters().bind_groups, 2);
}

#[test]
fn test_uniform_input_rejects_array_value() {
    let backend = Arc::new(MockBackend::default());
    let mut p = pipeline(&backend, SCALE);
    let err = p
        .buffer(&[None, array(&[1.0])], &BufferOptions::default())
        .unwrap_err();
    assert!(err.to_string().contains("`k` is a uniform"));
}

#[test]
fn test_run_dispatches_and_reads_outputs_in_order() {
    let backend = Arc::new(MockBackend::default());
    let mut p = pipeline(&backend, SCALE);
    let input: Vec<f32> = (0..130).map(|i| i as f32).collect();
    let results = pollster::block_on(p.run(&[array(&input), None], &BufferOptions::default(), None))
        .unwrap();
    assert_eq!(backend.last_dispatch.get(), Some([3, 1, 1]));
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, "data");
    assert_eq!(results[0].1, ArrayData::F32(input));

    pollster::block_on(p.run(&[None, None], &BufferOptions::default(), Some([7, 2, 1]))).unwrap();
    assert_eq!(backend.last_dispatch.get(), Some([7, 2, 1]));
    let c = backend.counters();
    assert_eq!(c.dispatches, 2);
    assert_eq!(c.reads, 2);
}

#[test]
fn test_two_outputs_are_read_back() {
    let backend = Arc::new(MockBackend::default());
    let mut p = pipeline(
        &backend,
        "function split(a = [1.0, 2.0], b = [0.0, 0.0]) {\n\
         \x20 b[threadId.x] = a[threadId.x]\n\
         \x20 a[threadId.x] = 0.0\n\
         }",
    );
    let results = pollster::block_on(p.run(&[None, None], &BufferOptions::default(), None)).unwrap();
    let names: Vec<&str> = results.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["a", "b"]);
    assert_eq!(backend.counters().reads, 2);
}

fn render_resources(backend: &Arc<MockBackend>) -> RenderResources<MockBackend> {
    let program = Transpiler::new()
        .compile_render(
            Some("function v(offsets = [0.0, 0.0]) {\n  position = vertex\n  position.x += offsets[instanceIndex]\n}"),
            Some("function f(albedo) {\n  return textureSample(albedo, samp, uv)\n}"),
            &CompileOptions::default(),
        )
        .unwrap();
    RenderResources::new(Arc::clone(backend), program).unwrap()
}

#[test]
fn test_render_placeholders_and_samplers_are_created_once() {
    let backend = Arc::new(MockBackend::default());
    let mut r = render_resources(&backend);
    let names: Vec<&str> = r.entries().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["offsets", "samp", "albedo"]);

    r.buffer(&[None, None], &BufferOptions::default()).unwrap();
    r.buffer(&[None, None], &BufferOptions::default()).unwrap();
    let c = backend.counters();
    assert_eq!(c.textures, 1);
    assert_eq!(c.samplers, 1);
    assert_eq!(c.bind_groups, 1);

    let texture = TextureData {
        width: 2,
        height: 2,
        format: None,
        bytes: vec![255; 16],
    };
    let outcome = r
        .buffer(&[None, Some(InputValue::Texture(texture))], &BufferOptions::default())
        .unwrap();
    assert!(outcome.rebuilt_bind_group);
    let c = backend.counters();
    assert_eq!(c.textures, 2);
    assert_eq!(c.texture_writes, 1);
    assert_eq!(c.samplers, 1);
}

#[test]
fn test_compute_output_buffer_feeds_vertex_stage() {
    let backend = Arc::new(MockBackend::default());
    let mut r = render_resources(&backend);
    r.buffer(&[None, None], &BufferOptions::default()).unwrap();
    let shared = backend
        .create_buffer("from compute", 16, BufferUsage::STORAGE, None)
        .unwrap();
    let outcome = r
        .buffer(&[Some(InputValue::Buffer(shared.clone())), None], &BufferOptions::default())
        .unwrap();
    assert!(outcome.rebuilt_bind_group);
    let group = r.manager().group(0).unwrap();
    assert_eq!(group.buffer_handle("offsets").unwrap().id, shared.id);
    assert_eq!(group.length("offsets"), Some(4));
}

#[test]
fn test_vertex_and_index_buffers_replace_by_length() {
    let backend = Arc::new(MockBackend::default());
    let mut r = render_resources(&backend);
    assert!(r.set_vertex_buffer(0, &[0; 64]).unwrap());
    assert!(!r.set_vertex_buffer(0, &[1; 64]).unwrap());
    assert!(r.set_vertex_buffer(0, &[1; 128]).unwrap());
    assert!(r.set_index_buffer(&[0; 12]).unwrap());
    assert!(!r.set_index_buffer(&[0; 12]).unwrap());
    assert_eq!(r.manager().vertex_buffer(0).unwrap().size, 128);
}

#[test]
fn test_same_buffer_supplied_again_keeps_bind_group() {
    let backend = Arc::new(MockBackend::default());
    let mut r = render_resources(&backend);
    let shared = backend
        .create_buffer("from compute", 16, BufferUsage::STORAGE, None)
        .unwrap();
    let inputs = [Some(InputValue::Buffer(shared.clone())), None];
    r.buffer(&inputs, &BufferOptions::default()).unwrap();
    let bind_groups = backend.counters().bind_groups;

    let outcome = r.buffer(&inputs, &BufferOptions::default()).unwrap();
    assert!(!outcome.rebuilt_bind_group);
    assert_eq!(backend.counters().bind_groups, bind_groups);
    assert_eq!(r.manager().group(0).unwrap().state(), GroupState::Populated);

    let other = backend
        .create_buffer("from compute", 16, BufferUsage::STORAGE, None)
        .unwrap();
    let outcome = r
        .buffer(&[Some(InputValue::Buffer(other)), None], &BufferOptions::default())
        .unwrap();
    assert!(outcome.rebuilt_bind_group);
}

#[test]
fn test_group_exposes_textures_samplers_and_uniform_buffers() {
    let backend = Arc::new(MockBackend::default());
    let mut r = render_resources(&backend);
    r.buffer(&[None, None], &BufferOptions::default()).unwrap();
    let group = r.manager().group(0).unwrap();
    assert_eq!(group.textures().len(), 1);
    assert_eq!(group.texture("albedo").unwrap().1.width, 1);
    assert!(group.texture("samp").is_none());
    assert_eq!(group.samplers().keys().collect::<Vec<_>>(), ["samp"]);
    assert!(group.sampler("samp").is_some());
    assert!(group.uniform_buffer().is_none());
    assert_eq!(group.total_uniform_buffer_size(), 0);
    assert_eq!(group.total_default_uniform_buffer_size(), 0);

    let mut p = pipeline(
        &backend,
        "function tinted(data = [0.0], tint = vec3(1.0, 0.5, 0.25), k = 2.0) {\n\
         \x20 data[threadId.x] = tint.x * k * resX\n\
         }",
    );
    p.buffer(&[None, None, None], &BufferOptions::default()).unwrap();
    let group = p.manager().group(0).unwrap();
    assert_eq!(group.uniform_buffer(), group.buffer_handle("uniforms"));
    assert_eq!(group.default_uniform_buffer(), group.buffer_handle("defaults"));
    assert_eq!(group.total_uniform_buffer_size(), 16);
    assert_eq!(group.total_default_uniform_buffer_size(), 8);
    assert_eq!(group.uniform_buffer().unwrap().size, 16);
}

#[test]
fn test_output_buffers_follow_returned_then_modified() {
    let backend = Arc::new(MockBackend::default());
    let mut p = pipeline(&backend, SCALE);
    p.buffer(&[None, None], &BufferOptions::default()).unwrap();
    let group = p.manager().group(0).unwrap();
    let outputs: Vec<&str> = group.output_buffers().iter().map(|(n, _)| *n).collect();
    assert_eq!(outputs, ["data"]);

    let mut p = pipeline(
        &backend,
        "function split(a = [1.0, 2.0], b = [0.0, 0.0], c = [5.0]) {\n\
         \x20 b[threadId.x] = a[threadId.x] + c[0]\n\
         \x20 a[threadId.x] = 0.0\n\
         }",
    );
    p.buffer(&[None, None, None], &BufferOptions::default()).unwrap();
    let group = p.manager().group(0).unwrap();
    let outputs: Vec<&str> = group.output_buffers().iter().map(|(n, _)| *n).collect();
    assert_eq!(outputs, ["a", "b"]);
}
