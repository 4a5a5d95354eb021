//! SVG rendering of the focus mapping: samples as dots, the mapper as a line.

use std::path::Path;

use plotters::prelude::*;
use tracing::info;

use crate::error::{Error, Result};
use crate::mapper::FocusMapper;
use crate::model::CalibrationPoint;

const SIZE: (u32, u32) = (750, 350);
const CURVE_SAMPLES: usize = 255;

fn plot_error(e: impl std::fmt::Display) -> Error {
    Error::Plot(e.to_string())
}

/// Draw `points` and, if present, the `mapper` curve over
/// `[0, max(1, last distance)]` into an SVG file at `path`.
pub fn render_mapper(
    path: &Path,
    points: &[CalibrationPoint],
    mapper: Option<&FocusMapper>,
) -> Result<()> {
    if points.is_empty() {
        return Err(Error::Plot("no focus mappings to plot".to_string()));
    }

    let x_max = points
        .iter()
        .map(|p| p.distance)
        .fold(1.0_f64, f64::max);
    let x_min = points.iter().map(|p| p.distance).fold(0.0_f64, f64::min);
    let focus_max = points.iter().map(|p| p.focus).max().unwrap_or(0);
    let focus_min = points.iter().map(|p| p.focus).min().unwrap_or(0);
    let y_range = f64::from(focus_min.min(0))..f64::from(focus_max) * 1.1 + 1.0;

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Webcam focus mapping", ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(35)
        .y_label_area_size(45)
        .build_cartesian_2d(x_min..x_max, y_range)
        .map_err(plot_error)?;

    chart
        .configure_mesh()
        .x_desc("Distance")
        .y_desc("Focus")
        .x_label_formatter(&|x| format!("{x:.2}"))
        .draw()
        .map_err(plot_error)?;

    if let Some(mapper) = mapper {
        let curve = mapper
            .sample(x_min, x_max, CURVE_SAMPLES)
            .into_iter()
            .map(|(d, f)| (d, f64::from(f)));
        chart
            .draw_series(LineSeries::new(curve, &BLUE))
            .map_err(plot_error)?;
    }

    chart
        .draw_series(
            points
                .iter()
                .map(|p| Circle::new((p.distance, f64::from(p.focus)), 3, RED.filled())),
        )
        .map_err(plot_error)?;

    root.present().map_err(plot_error)?;
    info!(path = %path.display(), points = points.len(), "focus mapping plot written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_svg_file() {
        let points = [
            CalibrationPoint::new(0.16, 250),
            CalibrationPoint::new(0.34, 80),
            CalibrationPoint::new(0.8, 53),
        ];
        let mapper = FocusMapper::build(&points);
        let path = std::env::temp_dir().join(format!("focus-plot-{}.svg", uuid::Uuid::new_v4()));

        render_mapper(&path, &points, mapper.as_ref()).unwrap();

        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn empty_store_is_an_error() {
        let path = std::env::temp_dir().join("focus-plot-empty.svg");
        assert!(matches!(
            render_mapper(&path, &[], None),
            Err(Error::Plot(_))
        ));
    }
}
