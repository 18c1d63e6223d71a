//! The seam between buffer management and a concrete GPU API.
//!
//! Everything above this trait deals in names, layouts and byte slices; handle
//! types stay opaque. Implementations: the wgpu backend (feature
//! `backend_wgpu`) and the counting mock used by the integration tests.

use std::future::Future;
use std::ops::BitOr;

use anyhow::Result;

use crate::transpiler::types::TextureDim;

use super::layout::LayoutEntry;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BufferUsage(u32);

impl BufferUsage {
    pub const STORAGE: BufferUsage = BufferUsage(1);
    pub const UNIFORM: BufferUsage = BufferUsage(1 << 1);
    pub const VERTEX: BufferUsage = BufferUsage(1 << 2);
    pub const INDEX: BufferUsage = BufferUsage(1 << 3);
    pub const COPY_SRC: BufferUsage = BufferUsage(1 << 4);
    pub const COPY_DST: BufferUsage = BufferUsage(1 << 5);
    pub const MAP_READ: BufferUsage = BufferUsage(1 << 6);

    pub fn contains(self, other: BufferUsage) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for BufferUsage {
    type Output = BufferUsage;

    fn bitor(self, rhs: BufferUsage) -> BufferUsage {
        BufferUsage(self.0 | rhs.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    /// Array layers (6 per cube) or depth for 3D textures.
    pub layers: u32,
    /// WebGPU format name, e.g. `rgba8unorm`, `depth32float`.
    pub format: String,
    pub dim: TextureDim,
    pub sample_count: u32,
    /// Bound as a storage texture rather than sampled.
    pub storage: bool,
}

impl TextureDesc {
    /// Smallest texture that satisfies a binding of `dim`.
    pub fn placeholder(format: impl Into<String>, dim: TextureDim) -> Self {
        let layers = match dim {
            TextureDim::Cube | TextureDim::CubeArray => 6,
            _ => 1,
        };
        Self {
            width: 1,
            height: 1,
            layers,
            format: format.into(),
            dim,
            sample_count: 1,
            storage: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AddressMode {
    #[default]
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub mipmap_filter: FilterMode,
    pub address_modes: [AddressMode; 3],
    pub compare: Option<CompareFunction>,
}

/// A resource bound at one binding of a bind group.
pub enum BindResource<'a, B: GpuBackend + ?Sized> {
    Buffer(&'a B::Buffer),
    Texture(&'a B::Texture),
    Sampler(&'a B::Sampler),
}

pub trait GpuBackend {
    /// Equality identifies the same GPU buffer.
    type Buffer: Clone + PartialEq;
    type Texture;
    type Sampler;
    type BindGroupLayout;
    type BindGroup;
    type ComputePipeline;
    type PendingRead;

    fn create_buffer(
        &self,
        label: &str,
        size: u64,
        usage: BufferUsage,
        contents: Option<&[u8]>,
    ) -> Result<Self::Buffer>;

    fn buffer_size(&self, buffer: &Self::Buffer) -> u64;

    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]) -> Result<()>;

    fn create_texture(&self, label: &str, desc: &TextureDesc) -> Result<Self::Texture>;

    /// Upload tightly packed texels for layer 0, mip 0.
    fn write_texture(&self, texture: &Self::Texture, desc: &TextureDesc, data: &[u8])
    -> Result<()>;

    fn create_sampler(&self, label: &str, desc: &SamplerDesc) -> Result<Self::Sampler>;

    fn create_bind_group_layout(
        &self,
        label: &str,
        entries: &[LayoutEntry],
    ) -> Result<Self::BindGroupLayout>;

    fn create_bind_group(
        &self,
        label: &str,
        layout: &Self::BindGroupLayout,
        entries: &[(u32, BindResource<'_, Self>)],
    ) -> Result<Self::BindGroup>;

    /// Compile `code` and build a pipeline whose layout is `layouts` in group order.
    fn create_compute_pipeline(
        &self,
        label: &str,
        code: &str,
        entry_point: &str,
        layouts: &[&Self::BindGroupLayout],
    ) -> Result<Self::ComputePipeline>;

    /// Record and submit one dispatch.
    fn dispatch(
        &self,
        pipeline: &Self::ComputePipeline,
        bind_groups: &[&Self::BindGroup],
        workgroups: [u32; 3],
    ) -> Result<()>;

    /// Copy `buffer` into a fresh staging buffer and request a map.
    fn begin_read(&self, buffer: &Self::Buffer) -> Result<Self::PendingRead>;

    fn finish_read(&self, pending: Self::PendingRead) -> impl Future<Output = Result<Vec<u8>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_flags_combine() {
        let usage = BufferUsage::STORAGE | BufferUsage::COPY_DST;
        assert!(usage.contains(BufferUsage::STORAGE));
        assert!(usage.contains(BufferUsage::COPY_DST));
        assert!(!usage.contains(BufferUsage::UNIFORM));
        assert!(!usage.contains(BufferUsage::STORAGE | BufferUsage::MAP_READ));
    }

    #[test]
    fn test_cube_placeholder_has_six_layers() {
        assert_eq!(TextureDesc::placeholder("rgba8unorm", TextureDim::Cube).layers, 6);
        assert_eq!(TextureDesc::placeholder("rgba8unorm", TextureDim::D2).layers, 1);
    }
}
