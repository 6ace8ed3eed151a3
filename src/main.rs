//! # Clonesift: Clonal Lineage Inference from Frequency Trajectories
//!
//! Batch command-line front end for the library.
//!
//! ## Usage
//! ```bash
//! # Default threshold-greedy clustering
//! clonesift --input trajectories.tsv --output results/
//!
//! # Hierarchical clustering with custom breakpoints
//! clonesift --input trajectories.tsv --method hierarchy --detection-breakpoint 0.02
//! ```

use std::time::Instant;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use clonesift::pipelines::AnalysisPipeline;
use clonesift::Config;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let start = Instant::now();
    let config = Config::parse_and_validate().context("invalid configuration")?;

    let input = config.input.clone();
    let mut pipeline = AnalysisPipeline::new(config);
    let output = pipeline
        .run()
        .with_context(|| format!("analysis of {} failed", input.display()))?;

    eprintln!(
        "Completed in {:.2}s; tables written to {}",
        start.elapsed().as_secs_f64(),
        output.display()
    );
    Ok(())
}
