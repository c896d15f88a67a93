//! Genes of interest picked out for emphasis on every plot.

use std::collections::HashSet;

use polars::prelude::*;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::Result;

pub const HIGHLIGHTED: &str = "highlighted";

/// Named, ordered, duplicate-free list of gene identifiers.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "RawHighlightSet")]
pub struct HighlightSet {
    pub name: String,
    genes: Vec<String>,
}

#[derive(Deserialize)]
struct RawHighlightSet {
    #[serde(default)]
    name: String,
    #[serde(default)]
    genes: Vec<String>,
}

impl From<RawHighlightSet> for HighlightSet {
    fn from(raw: RawHighlightSet) -> Self {
        HighlightSet::new(raw.name, raw.genes)
    }
}

impl HighlightSet {
    pub fn new<S: Into<String>>(name: impl Into<String>, genes: impl IntoIterator<Item = S>) -> Self {
        let mut seen = HashSet::new();
        let genes = genes
            .into_iter()
            .map(Into::<String>::into)
            .filter(|g| seen.insert(g.clone()))
            .collect();
        HighlightSet {
            name: name.into(),
            genes,
        }
    }

    pub fn genes(&self) -> &[String] {
        &self.genes
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.genes.iter().map(String::as_str)
    }

    pub fn contains(&self, gene: &str) -> bool {
        self.genes.iter().any(|g| g == gene)
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }
}

fn membership_mask(df: &DataFrame, gene_col: &str, wanted: &HashSet<&str>) -> Result<Vec<bool>> {
    let ca = df.column(gene_col)?.str()?;
    Ok(ca
        .into_iter()
        .map(|g| g.map_or(false, |g| wanted.contains(g)))
        .collect())
}

/// Rows whose identifier is among `gene_ids`, in original order with every
/// column kept. Requested identifiers absent from `df` are simply not returned.
pub fn select_highlights<'a>(
    df: &DataFrame,
    gene_col: &str,
    gene_ids: impl IntoIterator<Item = &'a str>,
) -> Result<DataFrame> {
    let wanted: HashSet<&str> = gene_ids.into_iter().collect();
    let mask: BooleanChunked = membership_mask(df, gene_col, &wanted)?.into_iter().collect();
    let selected = df.filter(&mask)?;
    debug!("Selected {} of {} rows for highlighting", selected.height(), df.height());
    Ok(selected)
}

/// Requested identifiers that have no row in `df`, in request order.
pub fn missing_highlights(df: &DataFrame, gene_col: &str, set: &HighlightSet) -> Result<Vec<String>> {
    let present: HashSet<&str> = df.column(gene_col)?.str()?.into_iter().flatten().collect();
    let missing: Vec<String> = set
        .iter()
        .filter(|g| !present.contains(g))
        .map(str::to_string)
        .collect();
    if !missing.is_empty() {
        warn!(
            "{} highlight gene(s) of '{}' not found: {}",
            missing.len(),
            set.name,
            missing.join(", ")
        );
    }
    Ok(missing)
}

/// Copy of `df` with a boolean `highlighted` column.
pub fn flag_highlights(df: &DataFrame, gene_col: &str, set: &HighlightSet) -> Result<DataFrame> {
    let wanted: HashSet<&str> = set.iter().collect();
    let flags = membership_mask(df, gene_col, &wanted)?;
    let mut out = df.clone();
    out.with_column(Series::new(PlSmallStr::from(HIGHLIGHTED), flags))?;
    Ok(out)
}
