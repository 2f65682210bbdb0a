//! Mean duration vs resource count, rendered as an SVG line chart.

use std::path::PathBuf;
use std::str::FromStr;

use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use super::error::HarnessError;
use super::timing::TimingTable;
use crate::config::{Axis, HarnessConfig};
use crate::persist::write_atomic;

const WIDTH: u32 = 640;
const HEIGHT: u32 = 420;
const LINE: RGBColor = RGBColor(31, 78, 156);

#[derive(Debug, Error)]
#[error("failed to draw scaling chart: {0}")]
pub struct ChartError(String);

impl<E: std::error::Error + Send + Sync> From<DrawingAreaErrorKind<E>> for ChartError {
    fn from(err: DrawingAreaErrorKind<E>) -> Self {
        ChartError(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Write the figure under the resources dir.
    Save,
    /// Print the curve to stdout.
    Show,
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "save" => Ok(Self::Save),
            "show" => Ok(Self::Show),
            other => Err(format!("unknown output mode '{other}'")),
        }
    }
}

/// Mean of `samples` without the first one, which carries one-time warm-up
/// cost. `None` when fewer than two samples exist.
pub fn mean_excluding_warmup(samples: &[u64]) -> Option<f64> {
    let measured = samples.get(1..)?;
    if measured.is_empty() {
        return None;
    }
    Some(measured.iter().map(|&s| s as f64).sum::<f64>() / measured.len() as f64)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CurvePoint {
    pub resource_count: usize,
    pub mean_micros: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScalingCurve {
    pub axis: Axis,
    pub points: Vec<CurvePoint>,
}

impl ScalingCurve {
    pub fn from_table(axis: Axis, table: &TimingTable) -> Self {
        let points = table
            .columns()
            .filter_map(|(resource_count, samples)| {
                let mean = mean_excluding_warmup(samples);
                if mean.is_none() {
                    warn!(%axis, resource_count, "fewer than two samples; no point plotted");
                }
                mean.map(|mean_micros| CurvePoint {
                    resource_count,
                    mean_micros,
                })
            })
            .collect();
        Self { axis, points }
    }

    pub fn render_text(&self) -> String {
        let mut out = format!("{}\tmean_microseconds\n", self.axis);
        for point in &self.points {
            out.push_str(&format!("{}\t{:.3}\n", point.resource_count, point.mean_micros));
        }
        out
    }

    /// Line chart of mean microseconds against resource count, as SVG markup.
    pub fn render_svg(&self) -> Result<String, ChartError> {
        let counts = || self.points.iter().map(|p| p.resource_count as u32);
        let x_min = counts().min().unwrap_or(1);
        let x_max = counts().max().unwrap_or(1).max(x_min + 1);
        let y_max = self.points.iter().map(|p| p.mean_micros).fold(0.0, f64::max);
        let y_top = if y_max > 0.0 { y_max * 1.1 } else { 1.0 };
        let points: Vec<(u32, f64)> = self
            .points
            .iter()
            .map(|p| (p.resource_count as u32, p.mean_micros))
            .collect();

        let mut svg = String::new();
        {
            let root = SVGBackend::with_string(&mut svg, (WIDTH, HEIGHT)).into_drawing_area();
            root.fill(&WHITE)?;

            let mut chart = ChartBuilder::on(&root)
                .margin(20)
                .x_label_area_size(40)
                .y_label_area_size(70)
                .build_cartesian_2d(x_min..x_max, 0.0..y_top)?;

            chart
                .configure_mesh()
                .x_desc(format!("Number of {}", self.axis))
                .y_desc("Microseconds")
                .x_labels((x_max - x_min + 1) as usize)
                .y_label_formatter(&|micros: &f64| format_thousands(micros.round() as u64))
                .draw()?;

            chart.draw_series(LineSeries::new(points.iter().copied(), &LINE))?;
            chart.draw_series(
                points
                    .iter()
                    .map(|&(x, y)| Circle::new((x, y), 3, LINE.filled())),
            )?;

            root.present()?;
        }
        Ok(svg)
    }
}

/// `1234567` -> `"1,234,567"`.
pub fn format_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlotOutcome {
    Saved(PathBuf),
    Shown(String),
}

/// Read the persisted table for `axis` and save or print its curve.
pub fn plot(config: &HarnessConfig, axis: Axis, mode: OutputMode) -> Result<PlotOutcome, HarnessError> {
    let table = TimingTable::load(&config.timing_table_path(axis))?;
    let curve = ScalingCurve::from_table(axis, &table);
    match mode {
        OutputMode::Show => Ok(PlotOutcome::Shown(curve.render_text())),
        OutputMode::Save => {
            let path = config.figure_path(axis);
            let svg = curve.render_svg()?;
            write_atomic(&path, svg.as_bytes()).map_err(|source| HarnessError::Figure {
                path: path.display().to_string(),
                source,
            })?;
            info!(%axis, figure = %path.display(), points = curve.points.len(), "figure saved");
            Ok(PlotOutcome::Saved(path))
        }
    }
}
