#![forbid(unsafe_code)]

pub mod cli;
pub mod error;
pub mod extract;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod reshape;
pub mod storage;
pub mod validate;

pub use error::{EtlError, EtlResult};
pub use model::{LongRecord, Metric, RunReport, ValidationReport, Violation};
pub use pipeline::{CaseloadEngine, PipelineRequest, PipelineStage};
pub use storage::RunStore;
