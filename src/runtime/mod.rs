//! Host-side resources for compiled programs: uniform packing, bind-group
//! layouts, buffer groups and the GPU backend seam.

pub mod backend;
pub mod group;
pub mod layout;
pub mod sampler;
pub mod uniform_pack;
#[cfg(feature = "backend_wgpu")]
pub mod wgpu_backend;

pub use backend::{BindResource, BufferUsage, GpuBackend, SamplerDesc, TextureDesc};
pub use group::{
    BufferGroup, BufferGroupManager, BufferOptions, BufferOutcome, GroupState, InputValue,
    TextureData, output_nodes,
};
pub use layout::{LayoutEntry, Visibility, layout_entries};
pub use uniform_pack::{UniformLayout, pack};
#[cfg(feature = "backend_wgpu")]
pub use wgpu_backend::WgpuBackend;
