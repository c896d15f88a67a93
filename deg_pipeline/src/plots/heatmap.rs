use std::path::Path;

use plotters::prelude::*;
use polars::prelude::DataFrame;
use tracing::{info, warn};

use crate::data_handling::GENE_ID;
use crate::error::Result;
use crate::helper_functions::{f64_values, str_values};
use crate::plots::{diverging_colour, render_err, PlotStyle, AXIS_FONT, CAPTION_FONT, LABEL_FONT};
use crate::views::{annotation_rows, zscore_column};

/// z-scores beyond this saturate the colour scale
const Z_LIMIT: f64 = 2.0;
const MISSING: RGBColor = RGBColor(220, 220, 220);

/// Heatmap of a `heatmap_view` frame: one row per gene in view order, one
/// column per group. Only highlighted genes are named on the row axis.
pub fn render_heatmap(
    view: &DataFrame,
    groups: &[String],
    style: &PlotStyle,
    title: &str,
    output_path: &Path,
) -> Result<()> {
    if view.height() == 0 || groups.is_empty() {
        warn!("Nothing to draw for heatmap {}", output_path.display());
        return Ok(());
    }

    let n_rows = view.height() as u32;
    let n_cols = groups.len() as u32;
    let genes = str_values(view, GENE_ID)?;

    let mut row_labels = vec![String::new(); genes.len()];
    for (row, gene) in annotation_rows(view)? {
        row_labels[row] = gene;
    }

    let mut cells: Vec<(u32, u32, Option<f64>)> = Vec::with_capacity(genes.len() * groups.len());
    for (j, group) in groups.iter().enumerate() {
        for (i, z) in f64_values(view, &zscore_column(group))?.into_iter().enumerate() {
            // first view row at the top
            cells.push((j as u32, n_rows - 1 - i as u32, z));
        }
    }

    let root = BitMapBackend::new(output_path, (style.width, style.height)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err(output_path))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, CAPTION_FONT)
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(110)
        .build_cartesian_2d((0u32..n_cols).into_segmented(), (0u32..n_rows).into_segmented())
        .map_err(render_err(output_path))?;

    let x_formatter = |v: &SegmentValue<u32>| match v {
        SegmentValue::CenterOf(j) => groups.get(*j as usize).cloned().unwrap_or_default(),
        _ => String::new(),
    };
    let y_formatter = |v: &SegmentValue<u32>| match v {
        SegmentValue::CenterOf(y) => (n_rows - 1)
            .checked_sub(*y)
            .and_then(|i| row_labels.get(i as usize))
            .cloned()
            .unwrap_or_default(),
        _ => String::new(),
    };

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(groups.len())
        .y_labels(genes.len())
        .x_label_formatter(&x_formatter)
        .y_label_formatter(&y_formatter)
        .axis_desc_style(AXIS_FONT)
        .label_style(LABEL_FONT)
        .draw()
        .map_err(render_err(output_path))?;

    chart
        .draw_series(cells.iter().map(|&(x, y, z)| {
            let colour = z.map_or(MISSING, |z| diverging_colour(z, Z_LIMIT));
            Rectangle::new(
                [
                    (SegmentValue::Exact(x), SegmentValue::Exact(y)),
                    (SegmentValue::Exact(x + 1), SegmentValue::Exact(y + 1)),
                ],
                colour.filled(),
            )
        }))
        .map_err(render_err(output_path))?;

    root.present().map_err(render_err(output_path))?;
    info!("Heatmap ({} genes) written to {}", n_rows, output_path.display());
    Ok(())
}
