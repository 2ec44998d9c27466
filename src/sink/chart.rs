//! SVG line chart: one series per variant over the swept axis
//!
//! The output is a self-contained SVG document with no external fonts or
//! scripts, so it renders the same in a browser and in CI artifacts.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::Sink;
use crate::params::Scalar;
use crate::table::ResultTable;
use crate::Result;

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 500.0;
const LEFT: f64 = 80.0;
const RIGHT: f64 = 200.0;
const TOP: f64 = 50.0;
const BOTTOM: f64 = 60.0;
const MARKER_RADIUS: f64 = 3.5;
const LINEAR_TICKS: usize = 5;

const PALETTE: [&str; 8] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
];

/// How an axis maps values to positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scale {
    /// Evenly spaced values.
    #[default]
    Linear,
    /// Base-2 logarithmic.
    Log2,
    /// Base-10 logarithmic.
    Log10,
    /// One evenly spaced slot per axis value, in order.
    Categorical,
}

impl Scale {
    fn log_base(self) -> Option<f64> {
        match self {
            Self::Log2 => Some(2.0),
            Self::Log10 => Some(10.0),
            Self::Linear | Self::Categorical => None,
        }
    }
}

/// Labels and scales for a chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartStyle {
    /// Chart title
    pub title: String,
    /// X axis label
    pub x_label: String,
    /// Y axis label
    pub y_label: String,
    /// X scale; log scales fall back to linear for non-positive values
    #[serde(default)]
    pub x_scale: Scale,
    /// Y scale
    #[serde(default)]
    pub y_scale: Scale,
}

impl ChartStyle {
    /// Linear-scaled chart with the given labels.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        x_label: impl Into<String>,
        y_label: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            x_label: x_label.into(),
            y_label: y_label.into(),
            x_scale: Scale::Linear,
            y_scale: Scale::Linear,
        }
    }

    /// Set the x scale.
    #[must_use]
    pub const fn with_x_scale(mut self, scale: Scale) -> Self {
        self.x_scale = scale;
        self
    }

    /// Set the y scale.
    #[must_use]
    pub const fn with_y_scale(mut self, scale: Scale) -> Self {
        self.y_scale = scale;
        self
    }
}

/// Writes result tables as SVG line charts.
#[derive(Debug, Clone)]
pub struct ChartSink {
    style: ChartStyle,
}

impl ChartSink {
    /// Sink rendering with `style`.
    #[must_use]
    pub const fn new(style: ChartStyle) -> Self {
        Self { style }
    }

    /// Labels and scales in use.
    #[must_use]
    pub const fn style(&self) -> &ChartStyle {
        &self.style
    }
}

impl Sink for ChartSink {
    fn kind(&self) -> &'static str {
        "svg"
    }

    fn extension(&self) -> &'static str {
        "svg"
    }

    fn write(&self, table: &ResultTable, path: &Path) -> Result<()> {
        fs::write(path, render_svg(table, &self.style))?;
        Ok(())
    }
}

/// Maps data values onto a pixel range.
#[derive(Debug, Clone, Copy)]
struct Mapper {
    base: Option<f64>,
    lo: f64,
    hi: f64,
    start: f64,
    end: f64,
}

impl Mapper {
    fn new(base: Option<f64>, values: impl Iterator<Item = f64> + Clone, start: f64, end: f64) -> Self {
        let transform = |v: f64| base.map_or(v, |b| v.log(b));
        let mut lo = values.clone().map(transform).fold(f64::INFINITY, f64::min);
        let mut hi = values.map(transform).fold(f64::NEG_INFINITY, f64::max);
        if !lo.is_finite() || !hi.is_finite() {
            lo = 0.0;
            hi = 1.0;
        }
        if base.is_none() && lo > 0.0 {
            lo = 0.0;
        }
        if (hi - lo).abs() < f64::EPSILON {
            lo -= 0.5;
            hi += 0.5;
        }
        Self {
            base,
            lo,
            hi,
            start,
            end,
        }
    }

    fn map(&self, value: f64) -> f64 {
        let v = self.base.map_or(value, |b| value.log(b));
        self.start + (v - self.lo) / (self.hi - self.lo) * (self.end - self.start)
    }

    /// Tick values in data space.
    fn ticks(&self) -> Vec<f64> {
        match self.base {
            Some(b) => {
                let first = self.lo.floor() as i32;
                let last = self.hi.ceil() as i32;
                (first..=last)
                    .map(|e| b.powi(e))
                    .filter(|v| {
                        let l = v.log(b);
                        l >= self.lo - 1e-9 && l <= self.hi + 1e-9
                    })
                    .collect()
            }
            None => {
                let step = (self.hi - self.lo) / LINEAR_TICKS as f64;
                (0..=LINEAR_TICKS).map(|i| self.lo + step * i as f64).collect()
            }
        }
    }
}

/// The x scale actually used: log scales need positive numbers, anything
/// non-numeric is laid out categorically.
fn effective_x_scale(requested: Scale, values: &[Scalar]) -> Scale {
    let numeric: Option<Vec<f64>> = values.iter().map(Scalar::as_f64).collect();
    match (requested, numeric) {
        (Scale::Categorical, _) | (_, None) => Scale::Categorical,
        (Scale::Log2 | Scale::Log10, Some(v)) if v.iter().any(|x| *x <= 0.0) => Scale::Linear,
        (scale, Some(_)) => scale,
    }
}

fn effective_y_scale(requested: Scale, table: &ResultTable) -> Scale {
    let all_positive = table
        .columns()
        .iter()
        .flat_map(|c| c.values())
        .all(|v| *v > 0.0);
    match requested {
        Scale::Log2 | Scale::Log10 if !all_positive => Scale::Linear,
        Scale::Categorical => Scale::Linear,
        other => other,
    }
}

fn format_tick(value: f64) -> String {
    let abs = value.abs();
    if abs >= 1e6 || (abs > 0.0 && abs < 1e-2) {
        format!("{value:.1e}")
    } else if (value - value.round()).abs() < 1e-9 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

/// Render `table` as an SVG line chart.
#[must_use]
pub fn render_svg(table: &ResultTable, style: &ChartStyle) -> String {
    let axis_values = table.axis().values();
    let x_scale = effective_x_scale(style.x_scale, axis_values);
    let y_scale = effective_y_scale(style.y_scale, table);

    let plot_left = LEFT;
    let plot_right = WIDTH - RIGHT;
    let plot_top = TOP;
    let plot_bottom = HEIGHT - BOTTOM;

    let xs: Vec<f64> = if x_scale == Scale::Categorical {
        let n = axis_values.len();
        let slot = (plot_right - plot_left) / n.max(1) as f64;
        (0..n).map(|i| plot_left + slot * (i as f64 + 0.5)).collect()
    } else {
        let raw: Vec<f64> = axis_values.iter().filter_map(Scalar::as_f64).collect();
        let mapper = Mapper::new(x_scale.log_base(), raw.iter().copied(), plot_left, plot_right);
        raw.iter().map(|v| mapper.map(*v)).collect()
    };

    let y_mapper = Mapper::new(
        y_scale.log_base(),
        table.columns().iter().flat_map(|c| c.values().iter().copied()),
        plot_bottom,
        plot_top,
    );

    let mut svg = String::new();
    let _ = write!(
        svg,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{WIDTH}\" height=\"{HEIGHT}\" viewBox=\"0 0 {WIDTH} {HEIGHT}\" font-family=\"sans-serif\">"
    );
    svg.push_str("<rect width=\"100%\" height=\"100%\" fill=\"white\"/>");
    let _ = write!(
        svg,
        "<text x=\"{}\" y=\"28\" font-size=\"16\" text-anchor=\"middle\">{}</text>",
        (plot_left + plot_right) / 2.0,
        xml_escape(&style.title)
    );

    // Frame and axis labels.
    let _ = write!(
        svg,
        "<rect x=\"{plot_left}\" y=\"{plot_top}\" width=\"{}\" height=\"{}\" fill=\"none\" stroke=\"black\"/>",
        plot_right - plot_left,
        plot_bottom - plot_top
    );
    let _ = write!(
        svg,
        "<text x=\"{}\" y=\"{}\" font-size=\"13\" text-anchor=\"middle\">{}</text>",
        (plot_left + plot_right) / 2.0,
        HEIGHT - 15.0,
        xml_escape(&style.x_label)
    );
    let mid_y = (plot_top + plot_bottom) / 2.0;
    let _ = write!(
        svg,
        "<text x=\"20\" y=\"{mid_y}\" font-size=\"13\" text-anchor=\"middle\" transform=\"rotate(-90 20 {mid_y})\">{}</text>",
        xml_escape(&style.y_label)
    );

    for (x, value) in xs.iter().zip(axis_values) {
        let _ = write!(
            svg,
            "<line x1=\"{x:.2}\" y1=\"{plot_bottom}\" x2=\"{x:.2}\" y2=\"{}\" stroke=\"black\"/>\
             <text x=\"{x:.2}\" y=\"{}\" font-size=\"11\" text-anchor=\"middle\">{}</text>",
            plot_bottom + 5.0,
            plot_bottom + 18.0,
            xml_escape(&value.to_string())
        );
    }
    for tick in y_mapper.ticks() {
        let y = y_mapper.map(tick);
        let _ = write!(
            svg,
            "<line x1=\"{plot_left}\" y1=\"{y:.2}\" x2=\"{plot_right}\" y2=\"{y:.2}\" stroke=\"#dddddd\"/>\
             <text x=\"{}\" y=\"{:.2}\" font-size=\"11\" text-anchor=\"end\">{}</text>",
            plot_left - 6.0,
            y + 4.0,
            format_tick(tick)
        );
    }

    for (index, column) in table.columns().iter().enumerate() {
        let color = PALETTE[index % PALETTE.len()];
        let points: Vec<(f64, f64)> = xs
            .iter()
            .zip(column.values())
            .map(|(x, v)| (*x, y_mapper.map(*v)))
            .collect();

        let path = points
            .iter()
            .map(|(x, y)| format!("{x:.2},{y:.2}"))
            .collect::<Vec<_>>()
            .join(" ");
        let _ = write!(
            svg,
            "<polyline points=\"{path}\" fill=\"none\" stroke=\"{color}\" stroke-width=\"2\"/>"
        );
        for (x, y) in &points {
            let _ = write!(
                svg,
                "<circle cx=\"{x:.2}\" cy=\"{y:.2}\" r=\"{MARKER_RADIUS}\" fill=\"{color}\"/>"
            );
        }

        let legend_y = plot_top + 10.0 + 20.0 * index as f64;
        let legend_x = plot_right + 15.0;
        let _ = write!(
            svg,
            "<line x1=\"{legend_x}\" y1=\"{legend_y}\" x2=\"{}\" y2=\"{legend_y}\" stroke=\"{color}\" stroke-width=\"2\"/>\
             <text x=\"{}\" y=\"{}\" font-size=\"12\">{}</text>",
            legend_x + 20.0,
            legend_x + 26.0,
            legend_y + 4.0,
            xml_escape(column.label())
        );
    }

    svg.push_str("</svg>\n");
    svg
}

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
