//! Compute pipelines and render resources built on a [`GpuBackend`].
//!
//! The façade compiles the authored functions, validates the generated WGSL
//! and owns the buffer groups. Calls are sequential: one `buffer()` or `run()`
//! at a time per pipeline.

use std::sync::Arc;

use anyhow::{Result, anyhow};

use crate::error::PipelineError;
use crate::options::CompileOptions;
use crate::runtime::backend::GpuBackend;
use crate::runtime::group::{
    BufferGroupManager, BufferOptions, BufferOutcome, InputValue, output_nodes,
};
use crate::runtime::layout::{LayoutEntry, layout_entries};
use crate::transpiler::builtins::{BuiltinRegistry, HostContext};
use crate::transpiler::stage::DEFAULT_WORKGROUP_SIZE;
use crate::transpiler::types::{StageKind, StageProgram, WgslType};
use crate::transpiler::validation::validate_wgsl_with_context;
use crate::transpiler::{RenderProgram, Transpiler};
use crate::values::ArrayData;

pub struct ComputePipelineBuilder<B: GpuBackend> {
    device: Option<Arc<B>>,
    source: Option<String>,
    options: CompileOptions,
    host: Option<HostContext>,
}

impl<B: GpuBackend> Default for ComputePipelineBuilder<B> {
    fn default() -> Self {
        Self {
            device: None,
            source: None,
            options: CompileOptions::default(),
            host: None,
        }
    }
}

impl<B: GpuBackend> ComputePipelineBuilder<B> {
    pub fn device(mut self, device: Arc<B>) -> Self {
        self.device = Some(device);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    /// Host context the built-in uniforms are sampled from.
    pub fn host(mut self, host: HostContext) -> Self {
        self.host = Some(host);
        self
    }

    pub fn build(self, transpiler: &Transpiler) -> Result<ComputePipeline<B>> {
        let backend = self.device.ok_or(PipelineError::MissingDevice)?;
        let source = self.source.ok_or(PipelineError::MissingStage("compute"))?;
        let program = transpiler.compile_compute(&source, &self.options)?;
        validate_wgsl_with_context(&program.code, "compute stage")?;

        let manager = BufferGroupManager::new(
            Arc::clone(&backend),
            &[&program],
            transpiler.registry().clone(),
            self.host.unwrap_or_default(),
        )?;
        let pipeline = backend
            .create_compute_pipeline(
                "compute",
                &program.code,
                StageKind::Compute.entry_point(),
                &manager.layouts(),
            )
            .map_err(|e| PipelineError::Backend(format!("{e:#}")))?;
        let entries = layout_entries(&[&program], program.bind_group_number);
        log::info!(
            "compute pipeline ready: {} bindings, workgroup size {}",
            entries.len(),
            program.workgroup_size.unwrap_or(DEFAULT_WORKGROUP_SIZE)
        );
        Ok(ComputePipeline {
            backend,
            program,
            entries,
            pipeline,
            manager,
        })
    }
}

pub struct ComputePipeline<B: GpuBackend> {
    backend: Arc<B>,
    program: StageProgram,
    entries: Vec<LayoutEntry>,
    pipeline: B::ComputePipeline,
    manager: BufferGroupManager<B>,
}

impl<B: GpuBackend> ComputePipeline<B> {
    pub fn builder() -> ComputePipelineBuilder<B> {
        ComputePipelineBuilder::default()
    }

    pub fn program(&self) -> &StageProgram {
        &self.program
    }

    pub fn entries(&self) -> &[LayoutEntry] {
        &self.entries
    }

    pub fn manager(&self) -> &BufferGroupManager<B> {
        &self.manager
    }

    /// Upload inputs (positional over the function's parameters) without dispatching.
    pub fn buffer(
        &mut self,
        inputs: &[Option<InputValue<B>>],
        options: &BufferOptions,
    ) -> Result<BufferOutcome> {
        let outcome = self
            .manager
            .buffer(self.program.bind_group_number, inputs, options)?;
        self.manager.prepare_all(options)?;
        Ok(outcome)
    }

    /// Storage arrays read back after a run: the returned names, or every
    /// written storage array when the function returns nothing.
    pub fn outputs(&self) -> Vec<(String, WgslType)> {
        output_nodes(&self.program.params)
            .into_iter()
            .map(|n| {
                let element = n.ty.element().cloned().unwrap_or(WgslType::F32);
                (n.name.clone(), element)
            })
            .collect()
    }

    /// `ceil(first storage input length / workgroup size)` along x.
    pub fn default_workgroups(&self) -> [u32; 3] {
        let size = self.program.workgroup_size.unwrap_or(DEFAULT_WORKGROUP_SIZE).max(1);
        let length = self
            .manager
            .group(self.program.bind_group_number)
            .and_then(|g| {
                let first = g.inputs().find(|n| n.is_storage_array())?;
                g.length(&first.name)
            })
            .unwrap_or(1);
        [(length as u32).div_ceil(size).max(1), 1, 1]
    }

    /// Buffer, dispatch once and read back every output in output order.
    pub async fn run(
        &mut self,
        inputs: &[Option<InputValue<B>>],
        options: &BufferOptions,
        workgroups: Option<[u32; 3]>,
    ) -> Result<Vec<(String, ArrayData)>> {
        self.buffer(inputs, options)?;
        let count = workgroups.unwrap_or_else(|| self.default_workgroups());
        let bind_groups = self.manager.bind_groups()?;
        self.backend
            .dispatch(&self.pipeline, &bind_groups, count)
            .map_err(|e| PipelineError::Backend(format!("{e:#}")))?;
        log::debug!("dispatched {count:?} workgroups");

        let outputs = self.outputs();
        let group = self
            .manager
            .group(self.program.bind_group_number)
            .ok_or_else(|| anyhow!("no bind group {}", self.program.bind_group_number))?;
        let mut pending = Vec::with_capacity(outputs.len());
        for (name, _) in &outputs {
            let buffer = group
                .buffer_handle(name)
                .ok_or_else(|| anyhow!("output `{name}` has no buffer"))?;
            pending.push(self.backend.begin_read(buffer)?);
        }
        let mut results = Vec::with_capacity(outputs.len());
        for ((name, element), read) in outputs.into_iter().zip(pending) {
            let bytes = self.backend.finish_read(read).await?;
            results.push((name, ArrayData::from_bytes(&bytes, &element)));
        }
        Ok(results)
    }
}

/// Bind groups and vertex/index buffers for a compiled render program.
/// Pipeline creation and draw submission stay with the caller.
pub struct RenderResources<B: GpuBackend> {
    program: RenderProgram,
    entries: Vec<LayoutEntry>,
    manager: BufferGroupManager<B>,
}

impl<B: GpuBackend> RenderResources<B> {
    pub fn new(device: Arc<B>, program: RenderProgram) -> Result<Self> {
        Self::with_context(device, program, BuiltinRegistry::standard(), HostContext::new())
    }

    pub fn with_context(
        device: Arc<B>,
        program: RenderProgram,
        registry: BuiltinRegistry,
        host: HostContext,
    ) -> Result<Self> {
        validate_wgsl_with_context(&program.code, "render program")?;
        let stages = program.stages();
        let manager = BufferGroupManager::new(device, &stages, registry, host)?;
        let entries = layout_entries(&stages, program.vertex.bind_group_number);
        log::info!("render resources ready: {} bindings", entries.len());
        Ok(Self {
            program,
            entries,
            manager,
        })
    }

    pub fn program(&self) -> &RenderProgram {
        &self.program
    }

    pub fn entries(&self) -> &[LayoutEntry] {
        &self.entries
    }

    pub fn manager(&self) -> &BufferGroupManager<B> {
        &self.manager
    }

    /// Inputs are positional over the vertex parameters followed by the
    /// fragment parameters not already listed.
    pub fn buffer(
        &mut self,
        inputs: &[Option<InputValue<B>>],
        options: &BufferOptions,
    ) -> Result<BufferOutcome> {
        let outcome = self
            .manager
            .buffer(self.program.vertex.bind_group_number, inputs, options)?;
        self.manager.prepare_all(options)?;
        Ok(outcome)
    }

    pub fn set_vertex_buffer(&mut self, slot: u32, bytes: &[u8]) -> Result<bool> {
        self.manager.set_vertex_buffer(slot, bytes)
    }

    pub fn set_index_buffer(&mut self, bytes: &[u8]) -> Result<bool> {
        self.manager.set_index_buffer(bytes)
    }
}
