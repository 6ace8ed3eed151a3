use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use clonesift::model::cluster::ClusterMethod;
use clonesift::pipelines::AnalysisPipeline;
use clonesift::Config;

// --- Helpers ---

fn write_input_table(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("population.trajectories.tsv");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "Trajectory\t0\t17\t25\t44\t66\tGene").unwrap();
    writeln!(file, "trajectory-1\t0\t0.3\t0.7\t1.0\t1.0\tmutS").unwrap();
    writeln!(file, "trajectory-2\t0\t0.3\t0.7\t1.0\t1.0\ttopA").unwrap();
    writeln!(file, "trajectory-3\t0\t0\t0.3\t0.6\t0.9\tspoT").unwrap();
    writeln!(file, "trajectory-4\t0\t0.1\t0.2\t0.05\t0\t").unwrap();
    file.flush().unwrap();
    path
}

fn config_for(input: std::path::PathBuf, output: std::path::PathBuf) -> Config {
    Config {
        input,
        output,
        detection_breakpoint: 0.03,
        fixed_breakpoint: None,
        similarity_breakpoint: 0.05,
        difference_breakpoint: 0.10,
        method: ClusterMethod::Matlab,
        significant_breakpoint: 0.15,
        frequency_breakpoints: vec![0.90, 0.75, 0.60, 0.45, 0.30, 0.15, 0.00],
        starting_genotypes: Vec::new(),
    }
}

fn read_tsv(path: &Path) -> Vec<HashMap<String, String>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .unwrap();
    let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    reader
        .records()
        .map(|record| {
            let record = record.unwrap();
            headers
                .iter()
                .cloned()
                .zip(record.iter().map(String::from))
                .collect()
        })
        .collect()
}

// --- End-to-end file pipeline ---

#[test]
fn pipeline_writes_the_full_output_set() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input_table(dir.path());
    let output = dir.path().join("results");
    let config = config_for(input, output.clone());
    config.validate().unwrap();

    let mut pipeline = AnalysisPipeline::new(config);
    let written = pipeline.run().unwrap();
    assert_eq!(written, output);

    for name in [
        "population.trajectories.trajectories.tsv",
        "population.trajectories.genotypes.tsv",
        "population.trajectories.ggmuller.edges.tsv",
        "population.trajectories.ggmuller.populations.tsv",
        "population.trajectories.pairwise.tsv",
        "population.trajectories.parameters.json",
    ] {
        assert!(output.join(name).exists(), "missing output {name}");
    }
}

#[test]
fn edge_and_genotype_tables_stay_referentially_consistent_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input_table(dir.path());
    let output = dir.path().join("results");
    let mut pipeline = AnalysisPipeline::new(config_for(input, output.clone()));
    pipeline.run().unwrap();

    let genotypes = read_tsv(&output.join("population.trajectories.genotypes.tsv"));
    let edges = read_tsv(&output.join("population.trajectories.ggmuller.edges.tsv"));

    let genotype_ids: Vec<&str> = genotypes.iter().map(|row| row["Genotype"].as_str()).collect();
    assert_eq!(edges.len(), genotype_ids.len());
    for edge in &edges {
        assert!(genotype_ids.contains(&edge["Identity"].as_str()));
        let parent = edge["Parent"].as_str();
        assert!(parent == "genotype-0" || genotype_ids.contains(&parent));
    }

    // The identical pair collapsed into one genotype whose member list
    // survives the round trip.
    let members: Vec<&str> = genotypes.iter().map(|row| row["members"].as_str()).collect();
    assert!(members
        .iter()
        .any(|list| list.contains("trajectory-1") && list.contains("trajectory-2")));
}

#[test]
fn population_table_on_disk_conserves_each_generation() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input_table(dir.path());
    let output = dir.path().join("results");
    let mut pipeline = AnalysisPipeline::new(config_for(input, output.clone()));
    pipeline.run().unwrap();

    let rows = read_tsv(&output.join("population.trajectories.ggmuller.populations.tsv"));
    let mut totals: HashMap<String, f64> = HashMap::new();
    let mut root_population: HashMap<String, f64> = HashMap::new();
    for row in &rows {
        let population: f64 = row["Population"].parse().unwrap();
        assert!(population >= 0.0);
        *totals.entry(row["Generation"].clone()).or_default() += population;
        if row["Identity"] == "genotype-0" {
            root_population.insert(row["Generation"].clone(), population);
        }
    }
    // The synthetic root appears at every generation and tops the sampled
    // genotypes up to exactly 100; an oversubscribed generation instead
    // clamps the root to zero and keeps the excess visible.
    for (generation, total) in totals {
        let root = root_population
            .get(&generation)
            .unwrap_or_else(|| panic!("generation {generation} has no root row"));
        if *root > 0.0 {
            assert!(
                (total - 100.0).abs() < 1e-6,
                "generation {generation} does not conserve: {total}"
            );
        } else {
            assert!(
                total >= 100.0 - 1e-6,
                "root clamped but generation {generation} is undersubscribed: {total}"
            );
        }
    }
}

#[test]
fn annotated_trajectory_table_keeps_metadata_and_assignment() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input_table(dir.path());
    let output = dir.path().join("results");
    let mut pipeline = AnalysisPipeline::new(config_for(input, output.clone()));
    pipeline.run().unwrap();

    let rows = read_tsv(&output.join("population.trajectories.trajectories.tsv"));
    assert_eq!(rows.len(), 4);
    for row in &rows {
        assert!(row["genotype"].starts_with("genotype-"));
    }
    let first = rows
        .iter()
        .find(|row| row["Trajectory"] == "trajectory-1")
        .unwrap();
    assert_eq!(first["Gene"], "mutS");
}

#[test]
fn parameters_report_carries_every_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input_table(dir.path());
    let output = dir.path().join("results");
    let mut pipeline = AnalysisPipeline::new(config_for(input, output.clone()));
    pipeline.run().unwrap();

    let report: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(output.join("population.trajectories.parameters.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(report["detectionCutoff"], 0.03);
    assert_eq!(report["method"], "matlab");
    assert_eq!(report["frequencyCutoffs"].as_array().unwrap().len(), 7);
    assert!(report["derivativeCheckCutoff"].is_number());
}

#[test]
fn hierarchy_runs_also_write_the_linkage_matrix() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input_table(dir.path());
    let output = dir.path().join("results");
    let mut config = config_for(input, output.clone());
    config.method = ClusterMethod::Hierarchy;
    let mut pipeline = AnalysisPipeline::new(config);
    pipeline.run().unwrap();

    let linkage = read_tsv(&output.join("population.trajectories.linkage.tsv"));
    // Three merges fold four trajectories into one dendrogram.
    assert_eq!(linkage.len(), 3);
}
