//! The orchestrator and its step machinery.

pub mod confidence;
pub mod orchestrator;
pub mod steps;

pub use confidence::ConfidenceTracker;
pub use orchestrator::{EvolvedCleaningPipeline, PipelineCapabilities};
pub use steps::{PipelinePhase, PipelineStep, StepRecord, StepStatus};
