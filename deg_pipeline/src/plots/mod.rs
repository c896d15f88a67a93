//! PNG renderers for the prepared views (plotters bitmap backend).
//!
//! Renderers only draw: every filter, join and label decision has been
//! made by the view builders before a frame reaches this module.

use std::path::Path;

use plotters::style::RGBColor;
use polars::prelude::DataFrame;
use serde::Deserialize;
use tracing::warn;

use crate::classify::{Regulation, REGULATION};
use crate::data_handling::GENE_ID;
use crate::error::{PipelineError, Result};
use crate::helper_functions::{f64_values, str_values};
use crate::highlight::HIGHLIGHTED;

pub mod dotplot;
pub mod heatmap;
pub mod ma;
pub mod venn;
pub mod volcano;

#[derive(Debug, Clone, Deserialize)]
pub struct PlotStyle {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Write gene names next to highlighted points
    #[serde(default = "default_true")]
    pub label_highlights: bool,
    /// Upper bound on gene sets in the enrichment dot plot
    #[serde(default = "default_max_gene_sets")]
    pub max_gene_sets: usize,
}

fn default_width() -> u32 {
    900
}

fn default_height() -> u32 {
    700
}

fn default_true() -> bool {
    true
}

fn default_max_gene_sets() -> usize {
    20
}

impl Default for PlotStyle {
    fn default() -> Self {
        PlotStyle {
            width: default_width(),
            height: default_height(),
            label_highlights: true,
            max_gene_sets: default_max_gene_sets(),
        }
    }
}

pub(crate) const CAPTION_FONT: (&str, u32) = ("sans-serif", 26);
pub(crate) const AXIS_FONT: (&str, u32) = ("sans-serif", 20);
pub(crate) const LABEL_FONT: (&str, u32) = ("sans-serif", 14);

pub fn colour_for_regulation(regulation: Regulation) -> RGBColor {
    match regulation {
        Regulation::Upregulated => RGBColor(228, 76, 55),
        Regulation::Downregulated => RGBColor(89, 188, 203),
        Regulation::NotSignificant => RGBColor(190, 190, 190),
    }
}

/// Blue → white → red for values in `[-limit, limit]` (clamped).
pub fn diverging_colour(value: f64, limit: f64) -> RGBColor {
    let t = if limit > 0.0 { (value / limit).clamp(-1.0, 1.0) } else { 0.0 };
    let mix = |from: u8, to: u8, t: f64| (from as f64 + (to as f64 - from as f64) * t).round() as u8;
    if t >= 0.0 {
        RGBColor(mix(255, 178, t), mix(255, 24, t), mix(255, 43, t))
    } else {
        let t = -t;
        RGBColor(mix(255, 33, t), mix(255, 102, t), mix(255, 172, t))
    }
}

/// Pad a data range so points do not sit on the border.
pub fn expand_range(min_val: f64, max_val: f64, pct: f64) -> (f64, f64) {
    if !min_val.is_finite() || !max_val.is_finite() {
        return (-1.0, 1.0);
    }
    if (max_val - min_val).abs() < 1e-9 {
        return (min_val - 1.0, max_val + 1.0);
    }
    let pad = (max_val - min_val) * pct;
    (min_val - pad, max_val + pad)
}

/// Min and max over the finite values, or `None` when there are none.
pub fn finite_bounds(values: impl IntoIterator<Item = f64>) -> Option<(f64, f64)> {
    values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// `map_err` adapter turning any backend error into `PipelineError::Render`.
pub(crate) fn render_err<E: std::fmt::Display>(path: &Path) -> impl Fn(E) -> PipelineError + '_ {
    move |e| PipelineError::render(path, e)
}

/// One gene on a scatter plot.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScatterPoint {
    pub gene: String,
    pub x: f64,
    pub y: f64,
    pub regulation: Regulation,
    pub highlighted: bool,
}

/// Rows of a view with finite `x_col`/`y_col`; the rest are skipped with a warning.
pub(crate) fn scatter_points(view: &DataFrame, x_col: &str, y_col: &str) -> Result<Vec<ScatterPoint>> {
    let genes = str_values(view, GENE_ID)?;
    let xs = f64_values(view, x_col)?;
    let ys = f64_values(view, y_col)?;
    let labels = str_values(view, REGULATION)?;
    let flags: Vec<bool> = view
        .column(HIGHLIGHTED)?
        .bool()?
        .into_iter()
        .map(|f| f.unwrap_or(false))
        .collect();

    let mut points = Vec::with_capacity(view.height());
    let mut skipped = 0usize;
    for i in 0..view.height() {
        match (&genes[i], xs[i], ys[i], labels[i].as_deref()) {
            (Some(gene), Some(x), Some(y), Some(label)) if x.is_finite() && y.is_finite() => {
                points.push(ScatterPoint {
                    gene: gene.clone(),
                    x,
                    y,
                    regulation: label.parse()?,
                    highlighted: flags[i],
                });
            }
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!("Skipped {skipped} rows with missing '{x_col}' or '{y_col}' values");
    }
    Ok(points)
}
