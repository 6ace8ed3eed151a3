//! # Model Module
//!
//! The analysis algorithms: pairwise trajectory comparison, the two
//! clustering methods, mean-genotype aggregation, background (lineage)
//! inference, the cascading-tier sorter, and the ggmuller table
//! formatter.
//!
//! ## Pipeline shape
//! ```text
//! trajectory table
//!   -> pairwise   (memoized symmetric metrics)
//!   -> cluster    (matlab greedy | hierarchical linkage)
//!   -> aggregate  (mean genotype series)
//!   -> lineage    (additive/subtractive/derivative checks -> forest)
//!   -> sort       (cascading frequency tiers)
//!   -> muller     (edge + population tables)
//! ```
//! Every stage consumes and produces immutable values; the pairwise cache
//! is the only memoized state and lives for a single run.

pub mod aggregate;
pub mod cluster;
pub mod lineage;
pub mod muller;
pub mod pairwise;
pub mod sort;
pub mod stats;

pub use aggregate::calculate_mean_genotypes;
pub use cluster::{cluster_trajectories, ClusterAssignment, ClusterMethod, ClusterOutcome, LinkageMatrix};
pub use lineage::{apply_genotype_checks, infer_lineage, BackgroundChecks};
pub use muller::{edge_table, population_table, PopulationRow, PopulationTable};
pub use pairwise::{trajectory_metric, PairKey, PairwiseCache, TrajectoryMetric, TrajectoryMetrics};
pub use sort::sort_genotypes;
