//! # Pipeline Module
//!
//! High-level orchestration of the batch analysis workflow. Coordinates
//! I/O, the clustering and lineage stages, and output generation.

pub mod analysis;

pub use analysis::{run_analysis, run_from_config, AnalysisPipeline, AnalysisResult, WorkflowParameters};
