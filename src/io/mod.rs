//! # I/O Module
//!
//! File reading/writing boundaries. Converts between delimited table
//! files and the in-memory `FrequencyTable`/`GenotypeTable`
//! representations.

pub mod tables;

pub use tables::{read_trajectory_table, MetadataTable, TrajectoryInput};
