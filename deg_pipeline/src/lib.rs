//! Differential-expression post-processing: classify genes, join expression
//! and enrichment tables, and render volcano / MA / heatmap / dot / Venn figures.

pub mod classify;
pub mod config;
pub mod data_handling;
pub mod enrichment;
pub mod error;
pub mod helper_functions;
pub mod highlight;
pub mod join;
pub mod overlap;
pub mod pipeline;
pub mod plots;
pub mod views;

pub use classify::{Regulation, Thresholds};
pub use config::RunConfig;
pub use error::{PipelineError, Result};
pub use pipeline::{run, RunSummary};
