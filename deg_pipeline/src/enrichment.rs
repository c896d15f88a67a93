//! Gene-set enrichment: handing a ranked list to an external engine and
//! tidying its result table for the dot plot.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use polars::prelude::*;
use tracing::{debug, error, info, warn};

use crate::classify::RankedList;
use crate::data_handling::gene_sets::GeneSetCollection;
use crate::data_handling::loader::rename_columns;
use crate::data_handling::PADJ;
use crate::error::{PipelineError, Result};
use crate::helper_functions::{cast_numeric, f64_values, neg_log10, read_tsv, require_columns, str_values};

pub const GENE_SET: &str = "gene_set";
pub const NES: &str = "nes";
pub const CORE_MEMBER_COUNT: &str = "core_member_count";
pub const SET_SIZE: &str = "set_size";
pub const GENE_RATIO: &str = "gene_ratio";
pub const LABEL: &str = "label";
pub use crate::views::NEG_LOG10_PADJ;

pub const DEFAULT_LABEL_PREFIXES: [&str; 6] = ["HALLMARK_", "KEGG_", "REACTOME_", "GOBP_", "GOCC_", "GOMF_"];

/// Computes per-set enrichment statistics from a ranked gene list.
///
/// Implementations return one row per gene set with at least `gene_set`,
/// `nes`, `adjusted_p_value` and `core_member_count`.
pub trait EnrichmentEngine {
    fn run(&self, ranked: &RankedList, sets: &GeneSetCollection) -> Result<DataFrame>;
}

/// Runs an external program (e.g. an fgsea wrapper script) as
/// `program args... --rnk <file> --gmt <file> --out <file>` and reads the TSV it writes.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    pub program: String,
    pub args: Vec<String>,
    pub renames: BTreeMap<String, String>,
}

impl EnrichmentEngine for CommandEngine {
    fn run(&self, ranked: &RankedList, sets: &GeneSetCollection) -> Result<DataFrame> {
        let scratch = tempfile::tempdir()?;
        let rnk = scratch.path().join("ranked.rnk");
        let gmt = scratch.path().join("gene_sets.gmt");
        let out = scratch.path().join("enrichment.tsv");
        ranked.to_rnk(&rnk)?;
        sets.write_gmt(&gmt)?;

        info!(
            "Running enrichment engine '{}' on {} ranked genes and {} gene sets",
            self.program,
            ranked.len(),
            sets.len()
        );
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg("--rnk")
            .arg(&rnk)
            .arg("--gmt")
            .arg(&gmt)
            .arg("--out")
            .arg(&out)
            .output()
            .map_err(|e| {
                error!("Failed to launch {}: {}", self.program, e);
                PipelineError::ExternalTool {
                    tool: self.program.clone(),
                    reason: e.to_string(),
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("Enrichment engine failed:\n{stderr}");
            return Err(PipelineError::ExternalTool {
                tool: self.program.clone(),
                reason: format!("exited with {}: {}", output.status, stderr.trim()),
            });
        }
        debug!("Enrichment engine stdout:\n{}", String::from_utf8_lossy(&output.stdout));

        if !out.exists() {
            return Err(PipelineError::ExternalTool {
                tool: self.program.clone(),
                reason: "finished without writing a result table".into(),
            });
        }
        read_results(&out, &self.renames)
    }
}

/// Results computed earlier and stored as a TSV; the ranked list is ignored.
#[derive(Debug, Clone)]
pub struct PrecomputedEngine {
    pub path: PathBuf,
    pub renames: BTreeMap<String, String>,
}

impl EnrichmentEngine for PrecomputedEngine {
    fn run(&self, _ranked: &RankedList, _sets: &GeneSetCollection) -> Result<DataFrame> {
        info!("Loading precomputed enrichment results from {}", self.path.display());
        read_results(&self.path, &self.renames)
    }
}

fn read_results(path: &Path, renames: &BTreeMap<String, String>) -> Result<DataFrame> {
    let df = rename_columns(read_tsv(path)?, renames, path)?;
    require_columns(&df, &[GENE_SET, NES, PADJ, CORE_MEMBER_COUNT], path)?;
    let mut df = df;
    for name in [NES, PADJ, CORE_MEMBER_COUNT] {
        cast_numeric(&mut df, name, path)?;
    }
    Ok(df)
}

/// Display label for a gene-set name: collection prefix removed, `_` → space.
pub fn clean_label(name: &str, prefixes: &[String]) -> String {
    let stripped = prefixes
        .iter()
        .find_map(|p| name.strip_prefix(p.as_str()))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(name);
    stripped.replace('_', " ")
}

/// Adds `set_size`, `gene_ratio`, `label` and `neg_log10_padj`, ordered by NES descending.
pub fn annotate_enrichment(df: &DataFrame, sets: &GeneSetCollection, prefixes: &[String]) -> Result<DataFrame> {
    let names = str_values(df, GENE_SET)?;
    let cores = f64_values(df, CORE_MEMBER_COUNT)?;
    let padj = f64_values(df, PADJ)?;

    let mut unknown = 0usize;
    let sizes: Vec<Option<u32>> = names
        .iter()
        .map(|n| {
            let size = n.as_deref().and_then(|n| sets.size_of(n)).map(|s| s as u32);
            if size.is_none() {
                unknown += 1;
            }
            size
        })
        .collect();
    if unknown > 0 {
        warn!("{unknown} enrichment rows name gene sets missing from the collection");
    }

    let ratios: Vec<Option<f64>> = cores
        .iter()
        .zip(sizes.iter())
        .map(|(core, size)| match (core, size) {
            (Some(core), Some(size)) if *size > 0 => Some(core / *size as f64),
            _ => None,
        })
        .collect();
    let labels: Vec<Option<String>> = names
        .iter()
        .map(|n| n.as_deref().map(|n| clean_label(n, prefixes)))
        .collect();
    let significance: Vec<Option<f64>> = padj.iter().map(|p| p.map(neg_log10)).collect();

    let mut out = df.clone();
    out.with_column(Series::new(PlSmallStr::from(SET_SIZE), sizes))?;
    out.with_column(Series::new(PlSmallStr::from(GENE_RATIO), ratios))?;
    out.with_column(Series::new(PlSmallStr::from(LABEL), labels))?;
    out.with_column(Series::new(PlSmallStr::from(NEG_LOG10_PADJ), significance))?;

    let sorted = out.sort(
        [NES],
        SortMultipleOptions::default()
            .with_order_descending(true)
            .with_nulls_last(true)
            .with_maintain_order(true),
    )?;
    Ok(sorted)
}
