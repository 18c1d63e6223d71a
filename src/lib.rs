//! Compile JavaScript-style stage functions to WGSL and manage the GPU
//! resources their bindings need.

pub mod error;
pub mod options;
pub mod pipeline;
pub mod runtime;
pub mod transpiler;
pub mod values;

pub use error::PipelineError;
pub use options::CompileOptions;
pub use pipeline::{ComputePipeline, ComputePipelineBuilder, RenderResources};
pub use transpiler::{RenderProgram, StageKind, StageProgram, Transpiler};
