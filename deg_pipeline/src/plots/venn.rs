//! Proportional two-set Venn (Euler) diagram.

use std::f64::consts::PI;
use std::path::Path;

use plotters::prelude::*;
use tracing::info;

use crate::error::Result;
use crate::overlap::OverlapCounts;
use crate::plots::{render_err, PlotStyle, AXIS_FONT, CAPTION_FONT};

const SET_A: RGBColor = RGBColor(228, 76, 55);
const SET_B: RGBColor = RGBColor(89, 188, 203);

/// Circle radii and centre distance in "count" units: `π r² = |set|`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VennLayout {
    pub radius_a: f64,
    pub radius_b: f64,
    pub distance: f64,
}

/// Area of the intersection of two circles whose centres are `d` apart.
pub fn lens_area(r1: f64, r2: f64, d: f64) -> f64 {
    if d >= r1 + r2 {
        return 0.0;
    }
    let small = r1.min(r2);
    if d <= (r1 - r2).abs() {
        return PI * small * small;
    }
    let a1 = ((d * d + r1 * r1 - r2 * r2) / (2.0 * d * r1)).clamp(-1.0, 1.0).acos();
    let a2 = ((d * d + r2 * r2 - r1 * r1) / (2.0 * d * r2)).clamp(-1.0, 1.0).acos();
    let k = ((-d + r1 + r2) * (d + r1 - r2) * (d - r1 + r2) * (d + r1 + r2)).max(0.0).sqrt();
    r1 * r1 * a1 + r2 * r2 * a2 - 0.5 * k
}

/// Place two circles so their areas and lens area match the counts.
///
/// The lens area shrinks monotonically as the centres move apart, so the
/// distance is found by bisection between full containment and tangency.
pub fn fit_two_circles(counts: OverlapCounts) -> VennLayout {
    let both = counts.both.min(counts.a).min(counts.b) as f64;
    let radius_a = (counts.a as f64 / PI).sqrt();
    let radius_b = (counts.b as f64 / PI).sqrt();

    let mut lo = (radius_a - radius_b).abs();
    let mut hi = radius_a + radius_b;
    let distance = if both <= 0.0 {
        hi
    } else if both >= counts.a.min(counts.b) as f64 {
        lo
    } else {
        for _ in 0..100 {
            let mid = 0.5 * (lo + hi);
            if lens_area(radius_a, radius_b, mid) > both {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        0.5 * (lo + hi)
    };

    VennLayout {
        radius_a,
        radius_b,
        distance,
    }
}

pub fn render_venn(
    counts: OverlapCounts,
    names: (&str, &str),
    style: &PlotStyle,
    title: &str,
    output_path: &Path,
) -> Result<()> {
    let layout = fit_two_circles(counts);
    let (w, h) = (style.width as f64, style.height as f64);

    let root = BitMapBackend::new(output_path, (style.width, style.height)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err(output_path))?;
    let area = root
        .titled(title, CAPTION_FONT)
        .map_err(render_err(output_path))?;

    // gap keeps disjoint sets visibly apart
    let gap = if counts.both == 0 { 0.1 * layout.radius_a.max(layout.radius_b) } else { 0.0 };
    let extent = layout.radius_a + layout.distance + gap + layout.radius_b;
    let tallest = 2.0 * layout.radius_a.max(layout.radius_b);
    let scale = if extent > 0.0 && tallest > 0.0 {
        (0.8 * w / extent).min(0.65 * h / tallest)
    } else {
        1.0
    };

    let left = 0.5 * (w - extent * scale);
    let cy = (0.5 * h) as i32;
    let cx_a = left + layout.radius_a * scale;
    let cx_b = cx_a + (layout.distance + gap) * scale;

    area.draw(&Circle::new(
        (cx_a as i32, cy),
        (layout.radius_a * scale) as i32,
        SET_A.mix(0.45).filled(),
    ))
    .map_err(render_err(output_path))?;
    area.draw(&Circle::new(
        (cx_b as i32, cy),
        (layout.radius_b * scale) as i32,
        SET_B.mix(0.45).filled(),
    ))
    .map_err(render_err(output_path))?;

    let only_a = counts.a.saturating_sub(counts.both);
    let only_b = counts.b.saturating_sub(counts.both);
    let mid = 0.5 * ((cx_a + layout.radius_a * scale) + (cx_b - layout.radius_b * scale));
    let labels = [
        (format!("{only_a}"), cx_a - 0.5 * layout.radius_a * scale, cy),
        (format!("{only_b}"), cx_b + 0.5 * layout.radius_b * scale, cy),
        (format!("{}", counts.both), mid, cy),
        (format!("{} ({})", names.0, counts.a), cx_a - layout.radius_a * scale, cy - (layout.radius_a * scale) as i32 - 30),
        (format!("{} ({})", names.1, counts.b), cx_b, cy - (layout.radius_b * scale) as i32 - 30),
    ];
    for (text, x, y) in labels {
        area.draw(&Text::new(text, (x as i32, y), AXIS_FONT.into_font()))
            .map_err(render_err(output_path))?;
    }

    root.present().map_err(render_err(output_path))?;
    info!(
        "Venn diagram ({} / {} / {} shared) written to {}",
        counts.a,
        counts.b,
        counts.both,
        output_path.display()
    );
    Ok(())
}
