//! Caller-visible fatal errors.
//!
//! These travel inside `anyhow::Error`; use `downcast_ref::<PipelineError>()`
//! to branch on them.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("no GPU device was supplied to the pipeline builder")]
    MissingDevice,
    #[error("render pipeline needs both stages; the {0} stage is missing")]
    MissingStage(&'static str),
    #[error("GPU backend error: {0}")]
    Backend(String),
}
