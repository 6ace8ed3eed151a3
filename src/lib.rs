//! # Clonesift Library Root
//!
//! Reconstructs the clonal structure of an evolving population from
//! time-series mutation-frequency measurements: clusters trajectories
//! into genotypes, infers the lineage (background) forest, orders the
//! result deterministically, and emits the edge/population tables
//! consumed by Muller-plot tooling.
//!
//! ## Module Structure
//! ```text
//! clonesift
//! ├── config     # CLI configuration + option records
//! ├── data       # Frequency tables, genotypes, lineage forest
//! ├── io         # Delimited table reading/writing
//! ├── model      # Pairwise metrics, clustering, lineage, sorting, ggmuller
//! └── pipelines  # Batch orchestration (load -> analyze -> write)
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod io;
pub mod model;
pub mod pipelines;

pub use config::{Config, GenotypeOptions, LineageOptions, SortOptions};
pub use data::{FrequencyTable, GenotypeTable, LineageEdge, LineageForest, ROOT_GENOTYPE};
pub use error::{ClonesiftError, Result};
pub use model::{ClusterMethod, ClusterOutcome, TrajectoryMetrics};
pub use pipelines::{run_analysis, AnalysisPipeline, AnalysisResult};
