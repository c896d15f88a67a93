use std::path::Path;

use plotters::prelude::*;
use polars::prelude::DataFrame;
use tracing::info;

use crate::classify::{Regulation, Thresholds};
use crate::data_handling::expression::LOG2_MEAN;
use crate::data_handling::LOG2FC;
use crate::error::Result;
use crate::plots::{
    colour_for_regulation, expand_range, finite_bounds, render_err, scatter_points, PlotStyle, AXIS_FONT, CAPTION_FONT,
    LABEL_FONT,
};

/// MA plot (mean expression vs fold change) of an `ma_view` frame.
pub fn render_ma(
    view: &DataFrame,
    thresholds: &Thresholds,
    style: &PlotStyle,
    title: &str,
    output_path: &Path,
) -> Result<()> {
    let points = scatter_points(view, LOG2_MEAN, LOG2FC)?;
    let fc_line = thresholds.log2_fold_change;

    let (x_min, x_max) = finite_bounds(points.iter().map(|p| p.x)).unwrap_or((0.0, 1.0));
    let (x_lo, x_hi) = expand_range(x_min.min(0.0), x_max, 0.05);
    let (y_min, y_max) = finite_bounds(points.iter().map(|p| p.y)).unwrap_or((-fc_line, fc_line));
    let y_abs = y_min.abs().max(y_max.abs()).max(fc_line);
    let (y_lo, y_hi) = expand_range(-y_abs, y_abs, 0.05);

    let root = BitMapBackend::new(output_path, (style.width, style.height)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err(output_path))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, CAPTION_FONT)
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)
        .map_err(render_err(output_path))?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("log2 (mean TPM + 1)")
        .y_desc("log2 fold change")
        .axis_desc_style(AXIS_FONT)
        .draw()
        .map_err(render_err(output_path))?;

    for regulation in [Regulation::NotSignificant, Regulation::Downregulated, Regulation::Upregulated] {
        let colour = colour_for_regulation(regulation);
        chart
            .draw_series(
                points
                    .iter()
                    .filter(|p| p.regulation == regulation)
                    .map(|p| Circle::new((p.x, p.y), 3, colour.mix(0.7).filled())),
            )
            .map_err(render_err(output_path))?
            .label(regulation.to_string())
            .legend(move |(x, y)| Circle::new((x, y), 4, colour.filled()));
    }

    chart
        .draw_series(LineSeries::new(vec![(x_lo, 0.0), (x_hi, 0.0)], BLACK.stroke_width(1)))
        .map_err(render_err(output_path))?;
    for y in [-fc_line, fc_line] {
        chart
            .draw_series(LineSeries::new(vec![(x_lo, y), (x_hi, y)], BLACK.mix(0.4).stroke_width(1)))
            .map_err(render_err(output_path))?;
    }

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
        .position(SeriesLabelPosition::UpperRight)
        .draw()
        .map_err(render_err(output_path))?;

    root.present().map_err(render_err(output_path))?;
    info!("MA plot written to {}", output_path.display());
    Ok(())
}
