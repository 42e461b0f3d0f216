// THEORY:
// This file is the main entry point for the `rde_wave_tracker` library crate.
// It defines the public API exposed to external consumers (the CLI runner in
// `main.rs`, or any service that wants to call the analysis remotely).
//
// The primary exports are the `analyze*` entry points and their data structures
// (`AnalysisConfig`, `AnalysisResult`, `SystemSnapshot`, ...). The per-layer
// machinery lives in `core_modules` and is public for testing and reuse, but a
// typical consumer only needs `pipeline`, `report` and `tool`.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;
pub mod report;
pub mod tool;

pub use config::AnalysisConfig;
pub use error::AnalysisError;
pub use pipeline::{analyze, analyze_case, analyze_synthetic, AnalysisResult, SystemSnapshot};
