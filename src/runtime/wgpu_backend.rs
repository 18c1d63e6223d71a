//! wgpu implementation of [`GpuBackend`].
//!
//! Read-backs copy into a fresh `MAP_READ` staging buffer per request, so
//! overlapping runs never share staging memory.

use std::future::Future;
use std::sync::mpsc;

use anyhow::{Context, Result, anyhow, bail};
use wgpu::util::DeviceExt;

use crate::transpiler::types::{BindingKind, StorageAccess, TextureDim};

use super::backend::{
    AddressMode, BindResource, BufferUsage, CompareFunction, FilterMode, GpuBackend,
    SamplerDesc, TextureDesc,
};
use super::layout::LayoutEntry;

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

/// A texture together with the view bind groups reference.
pub struct WgpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

pub struct WgpuPendingRead {
    staging: wgpu::Buffer,
    receiver: mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>,
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self { device, queue }
    }

    /// Default adapter and device, for headless use.
    pub async fn request() -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .context("no suitable GPU adapter")?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default())
            .await
            .context("failed to create GPU device")?;
        Ok(Self::new(device, queue))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

fn buffer_usages(usage: BufferUsage) -> wgpu::BufferUsages {
    let mut out = wgpu::BufferUsages::empty();
    let pairs = [
        (BufferUsage::STORAGE, wgpu::BufferUsages::STORAGE),
        (BufferUsage::UNIFORM, wgpu::BufferUsages::UNIFORM),
        (BufferUsage::VERTEX, wgpu::BufferUsages::VERTEX),
        (BufferUsage::INDEX, wgpu::BufferUsages::INDEX),
        (BufferUsage::COPY_SRC, wgpu::BufferUsages::COPY_SRC),
        (BufferUsage::COPY_DST, wgpu::BufferUsages::COPY_DST),
        (BufferUsage::MAP_READ, wgpu::BufferUsages::MAP_READ),
    ];
    for (ours, theirs) in pairs {
        if usage.contains(ours) {
            out |= theirs;
        }
    }
    out
}

pub fn texture_format(name: &str) -> Result<wgpu::TextureFormat> {
    use wgpu::TextureFormat as F;
    let format = match name.trim().to_ascii_lowercase().as_str() {
        "r8unorm" => F::R8Unorm,
        "rg8unorm" => F::Rg8Unorm,
        "rgba8unorm" => F::Rgba8Unorm,
        "rgba8unorm-srgb" => F::Rgba8UnormSrgb,
        "bgra8unorm" => F::Bgra8Unorm,
        "bgra8unorm-srgb" => F::Bgra8UnormSrgb,
        "rgba8snorm" => F::Rgba8Snorm,
        "rgba8uint" => F::Rgba8Uint,
        "rgba8sint" => F::Rgba8Sint,
        "r16float" => F::R16Float,
        "rg16float" => F::Rg16Float,
        "rgba16float" => F::Rgba16Float,
        "r32float" => F::R32Float,
        "rg32float" => F::Rg32Float,
        "rgba32float" => F::Rgba32Float,
        "r32uint" => F::R32Uint,
        "r32sint" => F::R32Sint,
        "rgba32uint" => F::Rgba32Uint,
        "rgba32sint" => F::Rgba32Sint,
        "depth16unorm" => F::Depth16Unorm,
        "depth24plus" => F::Depth24Plus,
        "depth32float" => F::Depth32Float,
        other => bail!("unsupported texture format `{other}`"),
    };
    Ok(format)
}

fn view_dimension(dim: TextureDim) -> wgpu::TextureViewDimension {
    match dim {
        TextureDim::D1 => wgpu::TextureViewDimension::D1,
        TextureDim::D2 => wgpu::TextureViewDimension::D2,
        TextureDim::D2Array => wgpu::TextureViewDimension::D2Array,
        TextureDim::Cube => wgpu::TextureViewDimension::Cube,
        TextureDim::CubeArray => wgpu::TextureViewDimension::CubeArray,
        TextureDim::D3 => wgpu::TextureViewDimension::D3,
    }
}

fn texture_dimension(dim: TextureDim) -> wgpu::TextureDimension {
    match dim {
        TextureDim::D1 => wgpu::TextureDimension::D1,
        TextureDim::D3 => wgpu::TextureDimension::D3,
        _ => wgpu::TextureDimension::D2,
    }
}

fn filter_mode(mode: FilterMode) -> wgpu::FilterMode {
    match mode {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

fn address_mode(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
        AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
    }
}

fn compare_function(f: CompareFunction) -> wgpu::CompareFunction {
    match f {
        CompareFunction::Never => wgpu::CompareFunction::Never,
        CompareFunction::Less => wgpu::CompareFunction::Less,
        CompareFunction::Equal => wgpu::CompareFunction::Equal,
        CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunction::Greater => wgpu::CompareFunction::Greater,
        CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunction::Always => wgpu::CompareFunction::Always,
    }
}

fn binding_type(kind: &BindingKind) -> Result<wgpu::BindingType> {
    let ty = match kind {
        BindingKind::Uniform => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        BindingKind::Storage { read_only } => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage {
                read_only: *read_only,
            },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        BindingKind::Texture {
            depth,
            dim,
            multisampled,
        } => wgpu::BindingType::Texture {
            sample_type: if *depth {
                wgpu::TextureSampleType::Depth
            } else {
                wgpu::TextureSampleType::Float {
                    filterable: !*multisampled,
                }
            },
            view_dimension: view_dimension(*dim),
            multisampled: *multisampled,
        },
        BindingKind::StorageTexture {
            format,
            access,
            dim,
        } => wgpu::BindingType::StorageTexture {
            access: match access {
                StorageAccess::Read => wgpu::StorageTextureAccess::ReadOnly,
                StorageAccess::Write => wgpu::StorageTextureAccess::WriteOnly,
                StorageAccess::ReadWrite => wgpu::StorageTextureAccess::ReadWrite,
            },
            format: texture_format(format)?,
            view_dimension: view_dimension(*dim),
        },
        BindingKind::Sampler { comparison } => wgpu::BindingType::Sampler(if *comparison {
            wgpu::SamplerBindingType::Comparison
        } else {
            wgpu::SamplerBindingType::Filtering
        }),
    };
    Ok(ty)
}

impl GpuBackend for WgpuBackend {
    type Buffer = wgpu::Buffer;
    type Texture = WgpuTexture;
    type Sampler = wgpu::Sampler;
    type BindGroupLayout = wgpu::BindGroupLayout;
    type BindGroup = wgpu::BindGroup;
    type ComputePipeline = wgpu::ComputePipeline;
    type PendingRead = WgpuPendingRead;

    fn create_buffer(
        &self,
        label: &str,
        size: u64,
        usage: BufferUsage,
        contents: Option<&[u8]>,
    ) -> Result<wgpu::Buffer> {
        let usage = buffer_usages(usage);
        let buffer = match contents {
            Some(contents) if contents.len() as u64 == size => {
                self.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(label),
                        contents,
                        usage,
                    })
            }
            Some(contents) => bail!(
                "buffer `{label}`: {} bytes of contents for a {size} byte buffer",
                contents.len()
            ),
            None => self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage,
                mapped_at_creation: false,
            }),
        };
        Ok(buffer)
    }

    fn buffer_size(&self, buffer: &wgpu::Buffer) -> u64 {
        buffer.size()
    }

    fn write_buffer(&self, buffer: &wgpu::Buffer, offset: u64, data: &[u8]) -> Result<()> {
        if offset + data.len() as u64 > buffer.size() {
            bail!(
                "write of {} bytes at {offset} overflows a {} byte buffer",
                data.len(),
                buffer.size()
            );
        }
        self.queue.write_buffer(buffer, offset, data);
        Ok(())
    }

    fn create_texture(&self, label: &str, desc: &TextureDesc) -> Result<WgpuTexture> {
        let format = texture_format(&desc.format)?;
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING;
        if desc.storage {
            usage |= wgpu::TextureUsages::STORAGE_BINDING;
        }
        if format.is_depth_stencil_format() || desc.sample_count > 1 {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        } else {
            usage |= wgpu::TextureUsages::COPY_DST;
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.layers.max(1),
            },
            mip_level_count: 1,
            sample_count: desc.sample_count.max(1),
            dimension: texture_dimension(desc.dim),
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            dimension: Some(view_dimension(desc.dim)),
            ..Default::default()
        });
        Ok(WgpuTexture { texture, view })
    }

    fn write_texture(&self, texture: &WgpuTexture, desc: &TextureDesc, data: &[u8]) -> Result<()> {
        let format = texture_format(&desc.format)?;
        if format.is_depth_stencil_format() {
            log::warn!("depth texture data is not uploaded; render into it instead");
            return Ok(());
        }
        let block = format
            .block_copy_size(None)
            .ok_or_else(|| anyhow!("format {} cannot be written", desc.format))?;
        let bytes_per_row = desc.width * block;
        let expected = (bytes_per_row * desc.height) as usize;
        if data.len() < expected {
            bail!(
                "texture data is {} bytes; a {}x{} {} texture needs {expected}",
                data.len(),
                desc.width,
                desc.height,
                desc.format
            );
        }
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &data[..expected],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(desc.height),
            },
            wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn create_sampler(&self, label: &str, desc: &SamplerDesc) -> Result<wgpu::Sampler> {
        Ok(self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: address_mode(desc.address_modes[0]),
            address_mode_v: address_mode(desc.address_modes[1]),
            address_mode_w: address_mode(desc.address_modes[2]),
            mag_filter: filter_mode(desc.mag_filter),
            min_filter: filter_mode(desc.min_filter),
            mipmap_filter: filter_mode(desc.mipmap_filter),
            compare: desc.compare.map(compare_function),
            ..Default::default()
        }))
    }

    fn create_bind_group_layout(
        &self,
        label: &str,
        entries: &[LayoutEntry],
    ) -> Result<wgpu::BindGroupLayout> {
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let mut visibility = wgpu::ShaderStages::NONE;
            if entry.visibility.compute {
                visibility |= wgpu::ShaderStages::COMPUTE;
            }
            if entry.visibility.vertex {
                visibility |= wgpu::ShaderStages::VERTEX;
            }
            if entry.visibility.fragment {
                visibility |= wgpu::ShaderStages::FRAGMENT;
            }
            out.push(wgpu::BindGroupLayoutEntry {
                binding: entry.binding,
                visibility,
                ty: binding_type(&entry.kind)
                    .with_context(|| format!("binding {} (`{}`)", entry.binding, entry.name))?,
                count: None,
            });
        }
        Ok(self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries: &out,
            }))
    }

    fn create_bind_group(
        &self,
        label: &str,
        layout: &wgpu::BindGroupLayout,
        entries: &[(u32, BindResource<'_, Self>)],
    ) -> Result<wgpu::BindGroup> {
        let entries: Vec<wgpu::BindGroupEntry<'_>> = entries
            .iter()
            .map(|(binding, resource)| wgpu::BindGroupEntry {
                binding: *binding,
                resource: match resource {
                    BindResource::Buffer(b) => b.as_entire_binding(),
                    BindResource::Texture(t) => wgpu::BindingResource::TextureView(&t.view),
                    BindResource::Sampler(s) => wgpu::BindingResource::Sampler(s),
                },
            })
            .collect();
        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &entries,
        }))
    }

    fn create_compute_pipeline(
        &self,
        label: &str,
        code: &str,
        entry_point: &str,
        layouts: &[&wgpu::BindGroupLayout],
    ) -> Result<wgpu::ComputePipeline> {
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(code.into()),
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: layouts,
                push_constant_ranges: &[],
            });
        Ok(self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some(entry_point),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            }))
    }

    fn dispatch(
        &self,
        pipeline: &wgpu::ComputePipeline,
        bind_groups: &[&wgpu::BindGroup],
        workgroups: [u32; 3],
    ) -> Result<()> {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("dispatch"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("dispatch"),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            for (index, group) in bind_groups.iter().enumerate() {
                pass.set_bind_group(index as u32, *group, &[]);
            }
            let [x, y, z] = workgroups;
            pass.dispatch_workgroups(x, y, z);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn begin_read(&self, buffer: &wgpu::Buffer) -> Result<WgpuPendingRead> {
        let size = buffer.size();
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("read-back staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("read-back"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let (sender, receiver) = mpsc::channel();
        staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = sender.send(result);
            });
        Ok(WgpuPendingRead { staging, receiver })
    }

    fn finish_read(&self, pending: WgpuPendingRead) -> impl Future<Output = Result<Vec<u8>>> {
        async move {
            self.device
                .poll(wgpu::PollType::wait_indefinitely())
                .context("device poll failed during read-back")?;
            match pending.receiver.recv() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => bail!("buffer mapping failed: {e}"),
                Err(_) => bail!("buffer mapping was never signalled"),
            }
            let bytes = pending.staging.slice(..).get_mapped_range().to_vec();
            pending.staging.unmap();
            Ok(bytes)
        }
    }
}
