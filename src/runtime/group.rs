//! Buffer groups: the GPU resources behind one bind group and the bookkeeping
//! that decides when the bind group has to be rebuilt.
//!
//! A group starts `Uninitialized`. The first `buffer()` call creates every
//! missing resource and the bind group (`Populated`). Replacing a resource
//! (new storage length, new texture, caller-supplied buffer) marks it `Dirty`
//! and the next rebuild returns it to `Populated`. Writes that fit the
//! existing buffer never trigger a rebuild.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use serde::Deserialize;

use crate::options::{SamplerSettings, TextureSettings};
use crate::transpiler::builtins::{BuiltinRegistry, HostContext};
use crate::transpiler::planner::{DEFAULTS_VAR, UNIFORMS_VAR};
use crate::transpiler::type_catalog::TypeCatalog;
use crate::transpiler::types::{
    AttributedNode, BindingKind, StageProgram, StructField, TextureDim, WgslType,
};
use crate::values::{ArrayData, UniformValue, element_stride};

use super::backend::{BindResource, BufferUsage, GpuBackend, TextureDesc};
use super::layout::{LayoutEntry, layout_entries};
use super::sampler::sampler_desc;
use super::uniform_pack::{UniformLayout, pack};

const DEFAULT_TEXTURE_FORMAT: &str = "rgba8unorm";
const DEFAULT_DEPTH_FORMAT: &str = "depth32float";

/// Texels for a sampled or storage texture.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    /// Falls back to the texture's configured format, then `rgba8unorm`.
    pub format: Option<String>,
    pub bytes: Vec<u8>,
}

/// One positional input to [`BufferGroup::buffer`].
pub enum InputValue<B: GpuBackend> {
    Array(ArrayData),
    Uniform(UniformValue),
    Texture(TextureData),
    /// An existing buffer, e.g. the output of a compute pass feeding a vertex stage.
    Buffer(B::Buffer),
}

impl<B: GpuBackend> Clone for InputValue<B> {
    fn clone(&self) -> Self {
        match self {
            InputValue::Array(a) => InputValue::Array(a.clone()),
            InputValue::Uniform(u) => InputValue::Uniform(u.clone()),
            InputValue::Texture(t) => InputValue::Texture(t.clone()),
            InputValue::Buffer(b) => InputValue::Buffer(b.clone()),
        }
    }
}

impl<B: GpuBackend> From<ArrayData> for InputValue<B> {
    fn from(data: ArrayData) -> Self {
        InputValue::Array(data)
    }
}

impl<B: GpuBackend> From<UniformValue> for InputValue<B> {
    fn from(value: UniformValue) -> Self {
        InputValue::Uniform(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BufferOptions {
    /// Rebuild the bind group even if no resource was replaced.
    pub new_bindings: bool,
    pub textures: BTreeMap<String, TextureSettings>,
    pub samplers: BTreeMap<String, SamplerSettings>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupState {
    Uninitialized,
    Populated,
    Dirty,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferOutcome {
    pub rebuilt_bind_group: bool,
}

fn storage_usage() -> BufferUsage {
    BufferUsage::STORAGE | BufferUsage::COPY_DST | BufferUsage::COPY_SRC | BufferUsage::VERTEX
}

fn uniform_usage() -> BufferUsage {
    BufferUsage::UNIFORM | BufferUsage::COPY_DST
}

/// Storage bindings cannot be empty; short contents are zero-extended.
fn at_least(bytes: &[u8], min: usize) -> Cow<'_, [u8]> {
    if bytes.len() >= min {
        Cow::Borrowed(bytes)
    } else {
        let mut padded = bytes.to_vec();
        padded.resize(min, 0);
        Cow::Owned(padded)
    }
}

/// Write `bytes` into `existing` when the length matches, otherwise create a
/// replacement. Returns the buffer to keep, if a new one was created.
fn write_or_replace<B: GpuBackend>(
    backend: &B,
    label: &str,
    existing: Option<&B::Buffer>,
    bytes: &[u8],
    usage: BufferUsage,
) -> Result<Option<B::Buffer>> {
    if let Some(buffer) = existing
        && backend.buffer_size(buffer) == bytes.len() as u64
    {
        backend.write_buffer(buffer, 0, bytes)?;
        return Ok(None);
    }
    let buffer = backend.create_buffer(label, bytes.len() as u64, usage, Some(bytes))?;
    Ok(Some(buffer))
}

fn merge_fields(programs: &[&StageProgram], pick: fn(&StageProgram) -> &[StructField]) -> Vec<StructField> {
    let mut fields: Vec<StructField> = Vec::new();
    for p in programs {
        for f in pick(p) {
            if !fields.iter().any(|x| x.name == f.name) {
                fields.push(f.clone());
            }
        }
    }
    fields
}

fn zero_value(ty: &WgslType) -> UniformValue {
    match TypeCatalog::standard().get(ty) {
        Some(info) if info.components * info.columns > 1 => {
            UniformValue::List(vec![0.0; (info.components * info.columns) as usize])
        }
        _ => UniformValue::Scalar(0.0),
    }
}

/// Storage arrays read back after a run: the returned ones, or every written
/// one when nothing is returned.
pub fn output_nodes(params: &[AttributedNode]) -> Vec<&AttributedNode> {
    let storage = params.iter().filter(|n| n.is_storage_array());
    let returned: Vec<_> = storage.clone().filter(|n| n.is_returned).collect();
    if returned.is_empty() {
        storage.filter(|n| n.is_modified).collect()
    } else {
        returned
    }
}

fn struct_size(fields: &[StructField]) -> u32 {
    if fields.is_empty() {
        return 0;
    }
    UniformLayout::for_fields(fields).0.size
}

fn pack_struct(fields: &[StructField], value_of: impl Fn(&StructField) -> UniformValue) -> Vec<u8> {
    let (_, infos) = UniformLayout::for_fields(fields);
    let values: Vec<UniformValue> = fields
        .iter()
        .filter(|f| TypeCatalog::standard().get(&f.ty).is_some())
        .map(&value_of)
        .collect();
    let pairs: Vec<_> = infos.iter().copied().zip(values.iter()).collect();
    pack(&pairs)
}

/// GPU resources and cached values for one bind group.
pub struct BufferGroup<B: GpuBackend> {
    number: u32,
    state: GroupState,
    entries: Vec<LayoutEntry>,
    /// Bound nodes of this group, inputs in positional order.
    params: Vec<AttributedNode>,
    uniform_fields: Vec<StructField>,
    default_fields: Vec<StructField>,
    uniform_values: BTreeMap<String, UniformValue>,
    buffers: BTreeMap<String, B::Buffer>,
    /// Element counts of storage buffers.
    lengths: BTreeMap<String, usize>,
    textures: BTreeMap<String, B::Texture>,
    samplers: BTreeMap<String, B::Sampler>,
    layout: B::BindGroupLayout,
    bind_group: Option<B::BindGroup>,
}

impl<B: GpuBackend> BufferGroup<B> {
    pub fn new(backend: &B, number: u32, programs: &[&StageProgram]) -> Result<Self> {
        let entries = layout_entries(programs, number);
        let mut params: Vec<AttributedNode> = Vec::new();
        for p in programs {
            for node in &p.params {
                if node.binding.is_some_and(|b| b.group == number)
                    && !params.iter().any(|n| n.name == node.name)
                {
                    params.push(node.clone());
                }
            }
        }
        let uniform_fields = merge_fields(programs, |p| p.parts().uniform_fields.as_slice());
        let default_fields = merge_fields(programs, |p| p.parts().default_fields.as_slice());
        let uniform_values = params
            .iter()
            .filter(|n| n.is_uniform())
            .map(|n| {
                let value = n
                    .raw_value
                    .as_ref()
                    .and_then(UniformValue::from_expr)
                    .unwrap_or_else(|| zero_value(&n.ty));
                (n.name.clone(), value)
            })
            .collect();
        let layout = backend.create_bind_group_layout(&format!("group {number}"), &entries)?;
        log::debug!("group {number}: {} layout entries", entries.len());
        Ok(Self {
            number,
            state: GroupState::Uninitialized,
            entries,
            params,
            uniform_fields,
            default_fields,
            uniform_values,
            buffers: BTreeMap::new(),
            lengths: BTreeMap::new(),
            textures: BTreeMap::new(),
            samplers: BTreeMap::new(),
            layout,
            bind_group: None,
        })
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn state(&self) -> GroupState {
        self.state
    }

    pub fn entries(&self) -> &[LayoutEntry] {
        &self.entries
    }

    pub fn layout(&self) -> &B::BindGroupLayout {
        &self.layout
    }

    pub fn bind_group(&self) -> Option<&B::BindGroup> {
        self.bind_group.as_ref()
    }

    pub fn buffer_handle(&self, name: &str) -> Option<&B::Buffer> {
        self.buffers.get(name)
    }

    /// Element count of a storage buffer, as last supplied.
    pub fn length(&self, name: &str) -> Option<usize> {
        self.lengths.get(name).copied()
    }

    pub fn uniform_value(&self, name: &str) -> Option<&UniformValue> {
        self.uniform_values.get(name)
    }

    pub fn textures(&self) -> &BTreeMap<String, B::Texture> {
        &self.textures
    }

    pub fn texture(&self, name: &str) -> Option<&B::Texture> {
        self.textures.get(name)
    }

    pub fn samplers(&self) -> &BTreeMap<String, B::Sampler> {
        &self.samplers
    }

    pub fn sampler(&self, name: &str) -> Option<&B::Sampler> {
        self.samplers.get(name)
    }

    /// The merged `uniforms` struct buffer, once created.
    pub fn uniform_buffer(&self) -> Option<&B::Buffer> {
        self.buffers.get(UNIFORMS_VAR)
    }

    /// The built-in `defaults` struct buffer, once created.
    pub fn default_uniform_buffer(&self) -> Option<&B::Buffer> {
        self.buffers.get(DEFAULTS_VAR)
    }

    /// Byte size of the `uniforms` struct, 0 without user uniforms.
    pub fn total_uniform_buffer_size(&self) -> u32 {
        struct_size(&self.uniform_fields)
    }

    /// Byte size of the `defaults` struct, 0 without built-in uniforms.
    pub fn total_default_uniform_buffer_size(&self) -> u32 {
        struct_size(&self.default_fields)
    }

    /// Buffers of the group's [`output_nodes`] that exist, in the same order.
    pub fn output_buffers(&self) -> Vec<(&str, &B::Buffer)> {
        output_nodes(&self.params)
            .into_iter()
            .filter_map(|n| self.buffers.get(&n.name).map(|b| (n.name.as_str(), b)))
            .collect()
    }

    /// Input nodes in positional order.
    pub fn inputs(&self) -> impl Iterator<Item = &AttributedNode> {
        self.params.iter().filter(|n| n.is_input)
    }

    fn mark_dirty(&mut self) {
        if self.state == GroupState::Populated {
            self.state = GroupState::Dirty;
        }
    }

    fn node(&self, name: &str) -> Option<&AttributedNode> {
        self.params.iter().find(|n| n.name == name)
    }

    fn write_storage(&mut self, backend: &B, node: &AttributedNode, bytes: &[u8]) -> Result<()> {
        let element = node.ty.element().cloned().unwrap_or(WgslType::F32);
        let stride = element_stride(&element) as usize;
        self.lengths.insert(node.name.clone(), bytes.len() / stride);
        let bytes = at_least(bytes, stride);
        if let Some(buffer) = write_or_replace(
            backend,
            &node.name,
            self.buffers.get(&node.name),
            &bytes,
            storage_usage(),
        )? {
            log::debug!("`{}` resized to {} bytes", node.name, bytes.len());
            self.buffers.insert(node.name.clone(), buffer);
            self.mark_dirty();
        }
        Ok(())
    }

    fn texture_desc(
        &self,
        name: &str,
        width: u32,
        height: u32,
        format: Option<&str>,
        options: &BufferOptions,
    ) -> TextureDesc {
        let configured = options.textures.get(name).and_then(|t| t.format.as_deref());
        let kind = self.entries.iter().find(|e| e.name == name).map(|e| &e.kind);
        let (dim, depth, multisampled, storage, kind_format) = match kind {
            Some(BindingKind::Texture {
                depth,
                dim,
                multisampled,
            }) => (*dim, *depth, *multisampled, false, None),
            Some(BindingKind::StorageTexture { format, dim, .. }) => {
                (*dim, false, false, true, Some(format.as_str()))
            }
            _ => (TextureDim::D2, false, false, false, None),
        };
        let format = format
            .or(configured)
            .or(kind_format)
            .unwrap_or(if depth {
                DEFAULT_DEPTH_FORMAT
            } else {
                DEFAULT_TEXTURE_FORMAT
            });
        let mut desc = TextureDesc::placeholder(format, dim);
        desc.width = width.max(1);
        desc.height = height.max(1);
        desc.sample_count = if multisampled { 4 } else { 1 };
        desc.storage = storage;
        desc
    }

    fn apply_input(
        &mut self,
        backend: &B,
        node: &AttributedNode,
        value: &InputValue<B>,
        options: &BufferOptions,
        uniforms_changed: &mut bool,
    ) -> Result<()> {
        match value {
            InputValue::Uniform(v) if node.is_uniform() => {
                if self.uniform_values.get(&node.name) != Some(v) {
                    self.uniform_values.insert(node.name.clone(), v.clone());
                    *uniforms_changed = true;
                }
            }
            InputValue::Uniform(v) => {
                let info = TypeCatalog::standard()
                    .get(&node.ty)
                    .ok_or_else(|| anyhow!("input `{}` of type {} is not a uniform", node.name, node.ty))?;
                let bytes = pack(&[(info, v)]);
                if let Some(buffer) = write_or_replace(
                    backend,
                    &node.name,
                    self.buffers.get(&node.name),
                    &bytes,
                    uniform_usage(),
                )? {
                    self.buffers.insert(node.name.clone(), buffer);
                    self.mark_dirty();
                }
            }
            InputValue::Array(_) | InputValue::Buffer(_) if node.is_uniform() => {
                bail!("input `{}` is a uniform and takes a uniform value", node.name)
            }
            InputValue::Array(data) => self.write_storage(backend, node, &data.as_bytes())?,
            InputValue::Buffer(buffer) => {
                let element = node.ty.element().cloned().unwrap_or(WgslType::F32);
                let len = backend.buffer_size(buffer) as usize / element_stride(&element) as usize;
                self.lengths.insert(node.name.clone(), len);
                if self.buffers.get(&node.name) == Some(buffer) {
                    log::trace!("`{}`: same buffer supplied again", node.name);
                    return Ok(());
                }
                self.buffers.insert(node.name.clone(), buffer.clone());
                self.mark_dirty();
            }
            InputValue::Texture(data) => {
                let desc = self.texture_desc(
                    &node.name,
                    data.width,
                    data.height,
                    data.format.as_deref(),
                    options,
                );
                let texture = backend.create_texture(&node.name, &desc)?;
                backend.write_texture(&texture, &desc, &data.bytes)?;
                self.textures.insert(node.name.clone(), texture);
                self.mark_dirty();
            }
        }
        Ok(())
    }

    /// Bring every binding of the group up to date with `inputs`.
    ///
    /// `inputs` are positional over the group's input parameters; `None`
    /// keeps the current value.
    pub fn buffer(
        &mut self,
        backend: &B,
        registry: &BuiltinRegistry,
        host: &HostContext,
        inputs: &[Option<InputValue<B>>],
        options: &BufferOptions,
    ) -> Result<BufferOutcome> {
        let nodes: Vec<AttributedNode> = self.inputs().cloned().collect();
        if inputs.len() > nodes.len() {
            log::warn!(
                "group {}: {} inputs supplied, {} expected; extras ignored",
                self.number,
                inputs.len(),
                nodes.len()
            );
        }
        let mut uniforms_changed = false;
        for (node, value) in nodes.iter().zip(inputs) {
            if let Some(value) = value {
                self.apply_input(backend, node, value, options, &mut uniforms_changed)?;
            }
        }

        for entry in self.entries.clone() {
            self.ensure_resource(backend, registry, host, &entry, uniforms_changed, options)?;
        }

        if options.new_bindings {
            self.mark_dirty();
        }
        let rebuild = self.state != GroupState::Populated || self.bind_group.is_none();
        if rebuild {
            self.rebuild(backend)?;
        }
        Ok(BufferOutcome {
            rebuilt_bind_group: rebuild,
        })
    }

    fn ensure_resource(
        &mut self,
        backend: &B,
        registry: &BuiltinRegistry,
        host: &HostContext,
        entry: &LayoutEntry,
        uniforms_changed: bool,
        options: &BufferOptions,
    ) -> Result<()> {
        let name = entry.name.as_str();
        match &entry.kind {
            BindingKind::Uniform if name == UNIFORMS_VAR => {
                let values = &self.uniform_values;
                let bytes = pack_struct(&self.uniform_fields, |f| {
                    values.get(&f.name).cloned().unwrap_or_else(|| zero_value(&f.ty))
                });
                match self.buffers.get(name) {
                    Some(buffer) if uniforms_changed => backend.write_buffer(buffer, 0, &bytes)?,
                    Some(_) => {}
                    None => {
                        let buffer = backend.create_buffer(
                            name,
                            bytes.len() as u64,
                            uniform_usage(),
                            Some(&bytes),
                        )?;
                        self.buffers.insert(name.to_string(), buffer);
                        self.mark_dirty();
                    }
                }
            }
            BindingKind::Uniform if name == DEFAULTS_VAR => {
                let bytes = pack_struct(&self.default_fields, |f| {
                    registry.sample(&f.name, host).unwrap_or_else(|| {
                        log::warn!("no built-in uniform named `{}`", f.name);
                        zero_value(&f.ty)
                    })
                });
                if let Some(buffer) =
                    write_or_replace(backend, name, self.buffers.get(name), &bytes, uniform_usage())?
                {
                    self.buffers.insert(name.to_string(), buffer);
                    self.mark_dirty();
                }
            }
            BindingKind::Uniform | BindingKind::Storage { .. } if self.buffers.contains_key(name) => {}
            BindingKind::Uniform => {
                let node = self.node(name).cloned();
                let ty = node.as_ref().map(|n| n.ty.clone()).unwrap_or(WgslType::F32);
                let value = node
                    .as_ref()
                    .and_then(|n| n.raw_value.as_ref())
                    .and_then(UniformValue::from_expr)
                    .unwrap_or_else(|| zero_value(&ty));
                let bytes = match TypeCatalog::standard().get(&ty) {
                    Some(info) => pack(&[(info, &value)]),
                    None => vec![0; 16],
                };
                let buffer =
                    backend.create_buffer(name, bytes.len() as u64, uniform_usage(), Some(&bytes))?;
                self.buffers.insert(name.to_string(), buffer);
                self.mark_dirty();
            }
            BindingKind::Storage { .. } => {
                let Some(node) = self.node(name).cloned() else {
                    bail!("storage binding `{name}` has no parameter");
                };
                let element = node.ty.element().cloned().unwrap_or(WgslType::F32);
                let data = node
                    .raw_value
                    .as_ref()
                    .and_then(|e| ArrayData::from_expr(e, &element));
                let bytes = match &data {
                    Some(d) => d.as_bytes().into_owned(),
                    None => Vec::new(),
                };
                self.write_storage(backend, &node, &bytes)?;
            }
            BindingKind::Texture { .. } | BindingKind::StorageTexture { .. }
                if !self.textures.contains_key(name) =>
            {
                let settings = options.textures.get(name);
                let width = settings.and_then(|t| t.width).unwrap_or(1);
                let height = settings.and_then(|t| t.height).unwrap_or(1);
                let desc = self.texture_desc(name, width, height, None, options);
                log::debug!("`{name}`: placeholder {}x{} {}", desc.width, desc.height, desc.format);
                let texture = backend.create_texture(name, &desc)?;
                self.textures.insert(name.to_string(), texture);
                self.mark_dirty();
            }
            BindingKind::Sampler { comparison } if !self.samplers.contains_key(name) => {
                let desc = sampler_desc(options.samplers.get(name), *comparison);
                let sampler = backend.create_sampler(name, &desc)?;
                self.samplers.insert(name.to_string(), sampler);
                self.mark_dirty();
            }
            BindingKind::Texture { .. }
            | BindingKind::StorageTexture { .. }
            | BindingKind::Sampler { .. } => {}
        }
        Ok(())
    }

    fn rebuild(&mut self, backend: &B) -> Result<()> {
        let mut resources = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let name = entry.name.as_str();
            let resource = match &entry.kind {
                BindingKind::Uniform | BindingKind::Storage { .. } => {
                    self.buffers.get(name).map(BindResource::Buffer)
                }
                BindingKind::Texture { .. } | BindingKind::StorageTexture { .. } => {
                    self.textures.get(name).map(BindResource::Texture)
                }
                BindingKind::Sampler { .. } => self.samplers.get(name).map(BindResource::Sampler),
            };
            let resource = resource
                .ok_or_else(|| anyhow!("no resource for binding {} (`{name}`)", entry.binding))?;
            resources.push((entry.binding, resource));
        }
        let bind_group =
            backend.create_bind_group(&format!("group {}", self.number), &self.layout, &resources)?;
        log::debug!(
            "group {}: bind group rebuilt with {} entries",
            self.number,
            resources.len()
        );
        self.bind_group = Some(bind_group);
        self.state = GroupState::Populated;
        Ok(())
    }
}

/// All buffer groups of one pipeline plus its vertex and index buffers.
pub struct BufferGroupManager<B: GpuBackend> {
    backend: Arc<B>,
    registry: BuiltinRegistry,
    host: HostContext,
    groups: BTreeMap<u32, BufferGroup<B>>,
    vertex_buffers: BTreeMap<u32, B::Buffer>,
    index_buffer: Option<B::Buffer>,
}

impl<B: GpuBackend> BufferGroupManager<B> {
    /// One group per number from 0 to the highest declared, so pipeline
    /// layouts have no holes.
    pub fn new(
        backend: Arc<B>,
        programs: &[&StageProgram],
        registry: BuiltinRegistry,
        host: HostContext,
    ) -> Result<Self> {
        let numbers: BTreeSet<u32> = programs
            .iter()
            .flat_map(|p| p.parts().decls.iter().map(|d| d.slot.group))
            .collect();
        let highest = numbers.last().copied();
        let mut groups = BTreeMap::new();
        if let Some(highest) = highest {
            for number in 0..=highest {
                groups.insert(number, BufferGroup::new(backend.as_ref(), number, programs)?);
            }
        }
        Ok(Self {
            backend,
            registry,
            host,
            groups,
            vertex_buffers: BTreeMap::new(),
            index_buffer: None,
        })
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn host(&self) -> &HostContext {
        &self.host
    }

    pub fn group(&self, number: u32) -> Option<&BufferGroup<B>> {
        self.groups.get(&number)
    }

    pub fn buffer(
        &mut self,
        group: u32,
        inputs: &[Option<InputValue<B>>],
        options: &BufferOptions,
    ) -> Result<BufferOutcome> {
        let g = self
            .groups
            .get_mut(&group)
            .ok_or_else(|| anyhow!("no bind group {group}"))?;
        g.buffer(self.backend.as_ref(), &self.registry, &self.host, inputs, options)
    }

    /// Build every group that has no bind group yet.
    pub fn prepare_all(&mut self, options: &BufferOptions) -> Result<()> {
        for g in self.groups.values_mut() {
            if g.bind_group().is_none() {
                g.buffer(self.backend.as_ref(), &self.registry, &self.host, &[], options)?;
            }
        }
        Ok(())
    }

    pub fn layouts(&self) -> Vec<&B::BindGroupLayout> {
        self.groups.values().map(BufferGroup::layout).collect()
    }

    /// Bind groups in group order; fails if any group was never buffered.
    pub fn bind_groups(&self) -> Result<Vec<&B::BindGroup>> {
        self.groups
            .values()
            .map(|g| {
                g.bind_group()
                    .ok_or_else(|| anyhow!("bind group {} has not been buffered", g.number()))
            })
            .collect()
    }

    /// Create or update the vertex buffer at `slot`. Returns true if a new
    /// buffer was created.
    pub fn set_vertex_buffer(&mut self, slot: u32, bytes: &[u8]) -> Result<bool> {
        let label = format!("vertex buffer {slot}");
        let usage = BufferUsage::VERTEX | BufferUsage::COPY_DST;
        match write_or_replace(
            self.backend.as_ref(),
            &label,
            self.vertex_buffers.get(&slot),
            bytes,
            usage,
        )? {
            Some(buffer) => {
                self.vertex_buffers.insert(slot, buffer);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn set_index_buffer(&mut self, bytes: &[u8]) -> Result<bool> {
        let usage = BufferUsage::INDEX | BufferUsage::COPY_DST;
        match write_or_replace(
            self.backend.as_ref(),
            "index buffer",
            self.index_buffer.as_ref(),
            bytes,
            usage,
        )? {
            Some(buffer) => {
                self.index_buffer = Some(buffer);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn vertex_buffer(&self, slot: u32) -> Option<&B::Buffer> {
        self.vertex_buffers.get(&slot)
    }

    pub fn index_buffer(&self) -> Option<&B::Buffer> {
        self.index_buffer.as_ref()
    }
}
