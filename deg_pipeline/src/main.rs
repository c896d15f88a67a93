use std::path::PathBuf;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use deg_pipeline::{run, RunConfig};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting the DEG pipeline");

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.json"));
    let config = RunConfig::from_json_file(&config_path)
        .with_context(|| format!("loading run configuration from {}", config_path.display()))?;

    let summary = run(&config).with_context(|| format!("running contrast '{}'", config.contrast))?;

    for (label, count) in &summary.label_counts {
        info!("{label}: {count} genes");
    }
    if !summary.missing_highlights.is_empty() {
        warn!(
            "{} highlighted genes were not found: {}",
            summary.missing_highlights.len(),
            summary.missing_highlights.join(", ")
        );
    }
    if let Some(overlap) = summary.overlap {
        info!("Overlap: {} / {} genes, {} shared", overlap.a, overlap.b, overlap.both);
    }
    info!("Ranked list: {} genes", summary.ranked_genes);
    for file in &summary.files {
        info!("Wrote {}", file.display());
    }
    info!("Finished");
    Ok(())
}
