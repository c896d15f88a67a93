use std::cmp::Ordering;
use std::path::Path;

use plotters::prelude::*;
use polars::prelude::DataFrame;
use tracing::{info, warn};

use crate::data_handling::PADJ;
use crate::enrichment::{GENE_RATIO, LABEL, NEG_LOG10_PADJ, NES};
use crate::error::Result;
use crate::helper_functions::{f64_values, str_values};
use crate::plots::{diverging_colour, expand_range, finite_bounds, render_err, PlotStyle, AXIS_FONT, CAPTION_FONT, LABEL_FONT};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Dot {
    pub label: String,
    pub nes: f64,
    pub padj: f64,
    pub significance: f64,
    pub gene_ratio: f64,
}

/// The `max_sets` most significant gene sets, then ordered by NES (largest first).
pub(crate) fn select_dots(view: &DataFrame, max_sets: usize) -> Result<Vec<Dot>> {
    let labels = str_values(view, LABEL)?;
    let nes = f64_values(view, NES)?;
    let padj = f64_values(view, PADJ)?;
    let sig = f64_values(view, NEG_LOG10_PADJ)?;
    let ratio = f64_values(view, GENE_RATIO)?;

    let mut dots: Vec<Dot> = (0..view.height())
        .filter_map(|i| {
            Some(Dot {
                label: labels[i].clone()?,
                nes: nes[i].filter(|v| v.is_finite())?,
                padj: padj[i]?,
                significance: sig[i]?,
                gene_ratio: ratio[i].unwrap_or(0.0),
            })
        })
        .collect();

    dots.sort_by(|a, b| a.padj.partial_cmp(&b.padj).unwrap_or(Ordering::Equal));
    dots.truncate(max_sets);
    dots.sort_by(|a, b| b.nes.partial_cmp(&a.nes).unwrap_or(Ordering::Equal));
    Ok(dots)
}

/// Enrichment dot plot: NES on x, one row per gene set, dot size from the
/// gene ratio and colour from -log10 adjusted p-value.
pub fn render_dotplot(view: &DataFrame, style: &PlotStyle, title: &str, output_path: &Path) -> Result<()> {
    let dots = select_dots(view, style.max_gene_sets)?;
    if dots.is_empty() {
        warn!("No enrichment results to draw for {}", output_path.display());
        return Ok(());
    }

    let n = dots.len() as u32;
    let (x_min, x_max) = finite_bounds(dots.iter().map(|d| d.nes)).unwrap_or((-1.0, 1.0));
    let (x_lo, x_hi) = expand_range(x_min.min(0.0), x_max.max(0.0), 0.1);
    let max_sig = dots.iter().map(|d| d.significance).fold(0.0, f64::max);

    let root = BitMapBackend::new(output_path, (style.width, style.height)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err(output_path))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, CAPTION_FONT)
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(260)
        .build_cartesian_2d(x_lo..x_hi, (0u32..n).into_segmented())
        .map_err(render_err(output_path))?;

    // first dot (largest NES) at the top
    let y_formatter = |v: &SegmentValue<u32>| match v {
        SegmentValue::CenterOf(y) => (n - 1)
            .checked_sub(*y)
            .and_then(|i| dots.get(i as usize))
            .map(|d| d.label.clone())
            .unwrap_or_default(),
        _ => String::new(),
    };

    chart
        .configure_mesh()
        .y_labels(dots.len())
        .y_label_formatter(&y_formatter)
        .x_desc("normalized enrichment score")
        .axis_desc_style(AXIS_FONT)
        .label_style(LABEL_FONT)
        .draw()
        .map_err(render_err(output_path))?;

    chart
        .draw_series(LineSeries::new(
            vec![(0.0, SegmentValue::Exact(0)), (0.0, SegmentValue::Exact(n))],
            BLACK.mix(0.4).stroke_width(1),
        ))
        .map_err(render_err(output_path))?;

    chart
        .draw_series(dots.iter().enumerate().map(|(i, d)| {
            let radius = 4.0 + 14.0 * d.gene_ratio.clamp(0.0, 1.0);
            let colour = diverging_colour(d.significance, max_sig.max(1e-12));
            Circle::new((d.nes, SegmentValue::CenterOf(n - 1 - i as u32)), radius, colour.filled())
        }))
        .map_err(render_err(output_path))?;

    root.present().map_err(render_err(output_path))?;
    info!("Enrichment dot plot ({} gene sets) written to {}", dots.len(), output_path.display());
    Ok(())
}
