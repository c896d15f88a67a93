use std::path::Path;

use plotters::prelude::*;
use polars::prelude::DataFrame;
use tracing::info;

use crate::classify::{Regulation, Thresholds};
use crate::data_handling::LOG2FC;
use crate::error::Result;
use crate::helper_functions::neg_log10;
use crate::plots::{
    colour_for_regulation, expand_range, finite_bounds, render_err, scatter_points, PlotStyle, AXIS_FONT, CAPTION_FONT,
    LABEL_FONT,
};
use crate::views::NEG_LOG10_PADJ;

/// Volcano plot of a `volcano_view` frame with the classification
/// thresholds drawn as reference lines.
pub fn render_volcano(
    view: &DataFrame,
    thresholds: &Thresholds,
    style: &PlotStyle,
    title: &str,
    output_path: &Path,
) -> Result<()> {
    let points = scatter_points(view, LOG2FC, NEG_LOG10_PADJ)?;
    let p_line = neg_log10(thresholds.adjusted_p_value);
    let fc_line = thresholds.log2_fold_change;

    let (x_min, x_max) = finite_bounds(points.iter().map(|p| p.x)).unwrap_or((-fc_line, fc_line));
    let x_abs = x_min.abs().max(x_max.abs()).max(fc_line);
    let (x_lo, x_hi) = expand_range(-x_abs, x_abs, 0.05);
    let y_top = finite_bounds(points.iter().map(|p| p.y)).map_or(p_line, |(_, hi)| hi.max(p_line));
    let (_, y_hi) = expand_range(0.0, y_top, 0.05);

    let root = BitMapBackend::new(output_path, (style.width, style.height)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err(output_path))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, CAPTION_FONT)
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_lo..x_hi, 0.0..y_hi)
        .map_err(render_err(output_path))?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("log2 fold change")
        .y_desc("-log10 adjusted p-value")
        .axis_desc_style(AXIS_FONT)
        .draw()
        .map_err(render_err(output_path))?;

    // not-significant first so coloured points stay on top
    for regulation in [Regulation::NotSignificant, Regulation::Downregulated, Regulation::Upregulated] {
        let colour = colour_for_regulation(regulation);
        let count = points.iter().filter(|p| p.regulation == regulation).count();
        chart
            .draw_series(
                points
                    .iter()
                    .filter(|p| p.regulation == regulation)
                    .map(|p| Circle::new((p.x, p.y), 3, colour.mix(0.7).filled())),
            )
            .map_err(render_err(output_path))?
            .label(format!("{regulation} ({count})"))
            .legend(move |(x, y)| Circle::new((x, y), 4, colour.filled()));
    }

    let guide = BLACK.mix(0.4).stroke_width(1);
    for x in [-fc_line, fc_line] {
        chart
            .draw_series(LineSeries::new(vec![(x, 0.0), (x, y_hi)], guide))
            .map_err(render_err(output_path))?;
    }
    chart
        .draw_series(LineSeries::new(vec![(x_lo, p_line), (x_hi, p_line)], guide))
        .map_err(render_err(output_path))?;

    if style.label_highlights {
        chart
            .draw_series(points.iter().filter(|p| p.highlighted).map(|p| {
                EmptyElement::at((p.x, p.y))
                    + Circle::new((0, 0), 4, BLACK.stroke_width(2))
                    + Text::new(p.gene.clone(), (6, -6), LABEL_FONT.into_font())
            }))
            .map_err(render_err(output_path))?;
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(&BLACK)
        .position(SeriesLabelPosition::UpperLeft)
        .draw()
        .map_err(render_err(output_path))?;

    root.present().map_err(render_err(output_path))?;
    info!("Volcano plot written to {}", output_path.display());
    Ok(())
}
