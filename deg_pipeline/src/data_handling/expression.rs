//! Expression-level (TPM) table and its per-group summary.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use serde::Deserialize;
use tracing::{debug, info};

use crate::data_handling::loader::{load_table, ColumnContract};
use crate::data_handling::{Dataset, GENE_ID};
use crate::error::{PipelineError, Result};
use crate::helper_functions::{cast_numeric, f64_values, require_columns};

pub const GRAND_MEAN: &str = "grand_mean";
pub const LOG2_MEAN: &str = "log2_mean";

pub fn group_mean_column(group: &str) -> String {
    format!("mean_{group}")
}

/// One experimental group and the replicate columns it averages over.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SampleGroup {
    pub name: String,
    pub samples: Vec<String>,
}

impl SampleGroup {
    pub fn new<S: Into<String>>(name: impl Into<String>, samples: impl IntoIterator<Item = S>) -> Self {
        SampleGroup {
            name: name.into(),
            samples: samples.into_iter().map(Into::<String>::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpressionDataset {
    pub path: PathBuf,
    #[serde(default)]
    pub renames: BTreeMap<String, String>,
    #[serde(default)]
    pub contract: Option<ColumnContract>,
    /// In display order: heatmap columns follow this list
    pub groups: Vec<SampleGroup>,
}

impl Dataset for ExpressionDataset {
    /// Loads the table and appends the group means, grand mean and `log2_mean`.
    fn load(&self) -> Result<DataFrame> {
        info!("Reading expression table from {}", self.path.display());
        let df = load_table(&self.path, &self.renames, self.contract.as_ref(), GENE_ID)?;
        summarize_expression(df, &self.groups, &self.path)
    }
}

/// Mean of the present values in each row; rows with nothing present give `None`.
fn row_means(columns: &[Vec<Option<f64>>], height: usize) -> Vec<Option<f64>> {
    (0..height)
        .map(|row| {
            let present: Vec<f64> = columns.iter().filter_map(|c| c[row]).collect();
            if present.is_empty() {
                None
            } else {
                Some(present.iter().sum::<f64>() / present.len() as f64)
            }
        })
        .collect()
}

/// Add `mean_<group>` per group, `grand_mean` over every listed sample column,
/// and `log2_mean = log2(grand_mean + 1)`.
pub fn summarize_expression(
    mut df: DataFrame,
    groups: &[SampleGroup],
    source: &Path,
) -> Result<DataFrame> {
    if groups.is_empty() {
        return Err(PipelineError::malformed(source, "no expression groups configured"));
    }
    if let Some(dup) = groups
        .iter()
        .enumerate()
        .find(|(i, g)| groups[..*i].iter().any(|other| other.name == g.name))
        .map(|(_, g)| &g.name)
    {
        return Err(PipelineError::malformed(source, format!("expression group '{dup}' is listed twice")));
    }

    let height = df.height();
    let mut all_samples: Vec<&str> = Vec::new();
    for SampleGroup { name: group, samples } in groups {
        if samples.is_empty() {
            return Err(PipelineError::malformed(
                source,
                format!("expression group '{group}' lists no sample columns"),
            ));
        }
        let names: Vec<&str> = samples.iter().map(String::as_str).collect();
        require_columns(&df, &names, source)?;
        for &name in &names {
            cast_numeric(&mut df, name, source)?;
            if !all_samples.contains(&name) {
                all_samples.push(name);
            }
        }
    }

    for SampleGroup { name: group, samples } in groups {
        let values = samples
            .iter()
            .map(|s| f64_values(&df, s))
            .collect::<Result<Vec<_>>>()?;
        let means = row_means(&values, height);
        df.with_column(Series::new(PlSmallStr::from(group_mean_column(group)), means))?;
    }

    let values = all_samples
        .iter()
        .map(|s| f64_values(&df, s))
        .collect::<Result<Vec<_>>>()?;
    let grand = row_means(&values, height);
    let log2_mean: Vec<Option<f64>> = grand.iter().map(|m| m.map(|m| (m + 1.0).log2())).collect();
    df.with_column(Series::new(PlSmallStr::from(GRAND_MEAN), grand))?;
    df.with_column(Series::new(PlSmallStr::from(LOG2_MEAN), log2_mean))?;

    debug!("Summarized {} groups over {} sample columns", groups.len(), all_samples.len());
    Ok(df)
}
