//! # Analysis Pipeline
//!
//! Orchestrates the full workflow:
//! 1. Load the trajectory table (and display metadata)
//! 2. Populate the pairwise metric cache
//! 3. Cluster trajectories into genotypes
//! 4. Aggregate member trajectories into mean genotype series
//! 5. Infer the lineage forest and validate it
//! 6. Sort genotypes through the cascading frequency tiers
//! 7. Build the ggmuller edge and population tables
//! 8. Write every output table, the pairwise diagnostics, and the
//!    run-parameter report next to each other in the output directory

use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::config::{Config, GenotypeOptions, LineageOptions, SortOptions};
use crate::data::genotype::{GenotypeTable, LineageEdge, LineageForest};
use crate::data::table::FrequencyTable;
use crate::error::Result;
use crate::io::tables::{
    read_trajectory_table, write_edge_table, write_genotype_table, write_linkage_matrix,
    write_pairwise_table, write_population_table, write_trajectory_table, MetadataTable,
};
use crate::model::aggregate::calculate_mean_genotypes;
use crate::model::cluster::{cluster_trajectories, LinkageMatrix};
use crate::model::lineage::infer_lineage;
use crate::model::muller::{edge_table, population_table, PopulationTable};
use crate::model::pairwise::TrajectoryMetrics;
use crate::model::sort::sort_genotypes;

/// Everything one analysis run produces.
#[derive(Debug)]
pub struct AnalysisResult {
    /// Mean genotype table in display (sorted) order.
    pub genotypes: GenotypeTable,
    /// Parent assignment for every genotype.
    pub forest: LineageForest,
    /// ggmuller edge table.
    pub edges: Vec<LineageEdge>,
    /// ggmuller population table plus the oversubscription report.
    pub populations: PopulationTable,
    /// The pairwise metric cache, retained for diagnostics output.
    pub metrics: TrajectoryMetrics,
    /// Linkage matrix; present only for the hierarchical method.
    pub linkage: Option<LinkageMatrix>,
}

/// Run the core analysis over an in-memory trajectory table.
pub fn run_analysis(
    table: &FrequencyTable,
    genotype_options: &GenotypeOptions,
    sort_options: &SortOptions,
    lineage_options: &LineageOptions,
) -> Result<AnalysisResult> {
    let mut metrics = TrajectoryMetrics::new();

    let outcome = info_span!("cluster")
        .in_scope(|| cluster_trajectories(table, &mut metrics, genotype_options))?;
    info!(genotypes = outcome.assignment().len(), "clustered trajectories");

    let genotypes = info_span!("aggregate")
        .in_scope(|| calculate_mean_genotypes(outcome.assignment(), table))?;

    let forest = info_span!("lineage").in_scope(|| infer_lineage(&genotypes, lineage_options))?;

    let sorted = info_span!("sort").in_scope(|| sort_genotypes(&genotypes, sort_options))?;

    let edges = edge_table(&sorted, &forest);
    let populations = population_table(&sorted, &edges, sort_options.detection_breakpoint);
    if !populations.oversubscribed().is_empty() {
        warn!(
            generations = populations.oversubscribed().len(),
            "population table has oversubscribed generations"
        );
    }

    let linkage = outcome.linkage().cloned();
    Ok(AnalysisResult {
        genotypes: sorted,
        forest,
        edges,
        populations,
        metrics,
        linkage,
    })
}

/// Every threshold a run was configured with, serialized next to the
/// output tables so a result is reproducible from its directory alone.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowParameters {
    pub detection_cutoff: f64,
    pub fixed_cutoff: f64,
    pub similarity_cutoff: f64,
    pub difference_cutoff: f64,
    pub method: String,
    pub significance_cutoff: f64,
    pub frequency_cutoffs: Vec<f64>,
    pub additive_background_double_cutoff: f64,
    pub additive_background_single_cutoff: f64,
    pub subtractive_background_double_cutoff: f64,
    pub subtractive_background_single_cutoff: f64,
    pub derivative_detection_cutoff: f64,
    pub derivative_check_cutoff: f64,
}

impl WorkflowParameters {
    pub fn new(
        genotype_options: &GenotypeOptions,
        sort_options: &SortOptions,
        lineage_options: &LineageOptions,
    ) -> Self {
        Self {
            detection_cutoff: genotype_options.detection_breakpoint,
            fixed_cutoff: genotype_options.fixed_breakpoint,
            similarity_cutoff: genotype_options.similarity_breakpoint,
            difference_cutoff: genotype_options.difference_breakpoint,
            method: genotype_options.method.to_string(),
            significance_cutoff: sort_options.significant_breakpoint,
            frequency_cutoffs: sort_options.frequency_breakpoints.clone(),
            additive_background_double_cutoff: lineage_options.additive_double_cutoff,
            additive_background_single_cutoff: lineage_options.additive_single_cutoff,
            subtractive_background_double_cutoff: lineage_options.subtractive_double_cutoff,
            subtractive_background_single_cutoff: lineage_options.subtractive_single_cutoff,
            derivative_detection_cutoff: lineage_options.derivative_detection_cutoff,
            derivative_check_cutoff: lineage_options.derivative_check_cutoff,
        }
    }
}

/// End-to-end batch pipeline: file in, table files out.
pub struct AnalysisPipeline {
    config: Config,
}

impl AnalysisPipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the analysis and write every output table.
    pub fn run(&mut self) -> Result<PathBuf> {
        let input = info_span!("load")
            .in_scope(|| read_trajectory_table(&self.config.input))?;

        let genotype_options = self.config.genotype_options();
        let sort_options = self.config.sort_options();
        let lineage_options = self.config.lineage_options();
        let result = run_analysis(
            &input.table,
            &genotype_options,
            &sort_options,
            &lineage_options,
        )?;

        let stem = self
            .config
            .input
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("clonesift")
            .to_string();
        std::fs::create_dir_all(&self.config.output)?;
        self.write_outputs(&stem, &input.table, &input.metadata, &result)?;

        let parameters =
            WorkflowParameters::new(&genotype_options, &sort_options, &lineage_options);
        let parameter_path = self.config.output.join(format!("{stem}.parameters.json"));
        let report = serde_json::to_string_pretty(&parameters)
            .map_err(|err| crate::error::ClonesiftError::algorithm(err.to_string()))?;
        std::fs::write(&parameter_path, report)?;

        info!(output = %self.config.output.display(), "analysis complete");
        Ok(self.config.output.clone())
    }

    fn write_outputs(
        &self,
        stem: &str,
        table: &FrequencyTable,
        metadata: &MetadataTable,
        result: &AnalysisResult,
    ) -> Result<()> {
        let out = |suffix: &str| -> PathBuf { self.config.output.join(format!("{stem}.{suffix}")) };
        write_trajectory_table(
            &out("trajectories.tsv"),
            table,
            &result.genotypes,
            metadata,
        )?;
        write_genotype_table(&out("genotypes.tsv"), &result.genotypes)?;
        write_edge_table(&out("ggmuller.edges.tsv"), &result.edges)?;
        write_population_table(&out("ggmuller.populations.tsv"), &result.populations)?;
        write_pairwise_table(&out("pairwise.tsv"), &result.metrics)?;
        if let Some(linkage) = &result.linkage {
            write_linkage_matrix(&out("linkage.tsv"), linkage)?;
        }
        Ok(())
    }
}

/// Convenience for callers that already validated a config elsewhere.
pub fn run_from_config(config: Config) -> Result<PathBuf> {
    let mut pipeline = AnalysisPipeline::new(config);
    pipeline.run()
}
