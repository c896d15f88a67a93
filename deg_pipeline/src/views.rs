//! Plot-ready tables. Each view is a fresh frame derived from the
//! classified table, so every plot agrees on labels and highlights.

use polars::prelude::*;
use tracing::debug;

use crate::classify::{Regulation, REGULATION};
use crate::data_handling::expression::{group_mean_column, LOG2_MEAN};
use crate::data_handling::{GENE_ID, LOG2FC, PADJ};
use crate::error::Result;
use crate::helper_functions::{f64_values, neg_log10, str_values};
use crate::highlight::{flag_highlights, HighlightSet, HIGHLIGHTED};
use crate::join::{left_join_checked, MismatchPolicy};

pub const NEG_LOG10_PADJ: &str = "neg_log10_padj";

pub fn zscore_column(group: &str) -> String {
    format!("z_{group}")
}

/// gene_id, log2_fold_change (missing → 0), neg_log10_padj, regulation, highlighted.
pub fn volcano_view(classified: &DataFrame, highlights: &HighlightSet) -> Result<DataFrame> {
    let fcs: Vec<f64> = f64_values(classified, LOG2FC)?
        .into_iter()
        .map(|fc| fc.filter(|v| !v.is_nan()).unwrap_or(0.0))
        .collect();
    let significance: Vec<Option<f64>> = f64_values(classified, PADJ)?
        .into_iter()
        .map(|p| p.map(neg_log10))
        .collect();

    let view = DataFrame::new(vec![
        classified.column(GENE_ID)?.clone(),
        Column::new(PlSmallStr::from(LOG2FC), fcs),
        Column::new(PlSmallStr::from(NEG_LOG10_PADJ), significance),
        classified.column(REGULATION)?.clone(),
    ])?;
    flag_highlights(&view, GENE_ID, highlights)
}

/// Volcano view plus `log2_mean` from the expression summary.
pub fn ma_view(volcano: &DataFrame, expression: &DataFrame, policy: MismatchPolicy) -> Result<DataFrame> {
    let means = expression.select([GENE_ID, LOG2_MEAN])?;
    left_join_checked(volcano, "differential expression", &means, "expression summary", GENE_ID, policy)
}

/// Row-wise z-scores over the present values (sample standard deviation).
/// Rows with fewer than two values or no spread score 0.
fn zscore_row(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    let n = present.len();
    let mean = if n > 0 { present.iter().sum::<f64>() / n as f64 } else { 0.0 };
    let sd = if n > 1 {
        (present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
    } else {
        0.0
    };
    values
        .iter()
        .map(|v| v.map(|v| if sd > 0.0 { (v - mean) / sd } else { 0.0 }))
        .collect()
}

/// Significant genes with z-scored group means, ordered by fold change
/// (largest first). Highlights are matched by identifier, never by row number.
pub fn heatmap_view(
    classified: &DataFrame,
    expression: &DataFrame,
    groups: &[String],
    highlights: &HighlightSet,
    policy: MismatchPolicy,
) -> Result<DataFrame> {
    let mask: BooleanChunked = str_values(classified, REGULATION)?
        .iter()
        .map(|r| {
            r.as_deref()
                .and_then(|r| r.parse::<Regulation>().ok())
                .map_or(false, |r| r.is_significant())
        })
        .collect();
    let degs = classified.filter(&mask)?.select([GENE_ID, LOG2FC, REGULATION])?;

    let mean_cols: Vec<String> = groups.iter().map(|g| group_mean_column(g)).collect();
    let mut keep = vec![GENE_ID.to_string()];
    keep.extend(mean_cols.iter().cloned());
    let means = expression.select(keep)?;
    let joined = left_join_checked(&degs, "significant genes", &means, "expression summary", GENE_ID, policy)?;

    let per_group = mean_cols
        .iter()
        .map(|c| f64_values(&joined, c))
        .collect::<Result<Vec<_>>>()?;
    let mut z_cols: Vec<Vec<Option<f64>>> = vec![Vec::with_capacity(joined.height()); groups.len()];
    for row in 0..joined.height() {
        let values: Vec<Option<f64>> = per_group.iter().map(|c| c[row]).collect();
        for (j, z) in zscore_row(&values).into_iter().enumerate() {
            z_cols[j].push(z);
        }
    }

    let mut view = joined.select([GENE_ID, LOG2FC, REGULATION])?;
    for (group, z) in groups.iter().zip(z_cols) {
        view.with_column(Series::new(PlSmallStr::from(zscore_column(group)), z))?;
    }
    let view = flag_highlights(&view, GENE_ID, highlights)?;
    let view = view.sort(
        [LOG2FC],
        SortMultipleOptions::default()
            .with_order_descending(true)
            .with_nulls_last(true)
            .with_maintain_order(true),
    )?;
    debug!("Heatmap view: {} genes x {} groups", view.height(), groups.len());
    Ok(view)
}

/// `(row index, gene)` for every highlighted row of a view, in view order.
pub fn annotation_rows(view: &DataFrame) -> Result<Vec<(usize, String)>> {
    let genes = view.column(GENE_ID)?.str()?;
    let flags = view.column(HIGHLIGHTED)?.bool()?;
    Ok(genes
        .into_iter()
        .zip(flags.into_iter())
        .enumerate()
        .filter_map(|(i, (g, f))| match (g, f) {
            (Some(g), Some(true)) => Some((i, g.to_string())),
            _ => None,
        })
        .collect())
}
