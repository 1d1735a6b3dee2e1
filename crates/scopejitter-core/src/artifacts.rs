//! Sweep output on disk
//!
//! Layout under the artifact root, for parameter `P` and sweep value `V`:
//!
//! ```text
//! parameters.json                        effective settings of the run
//! OffsetVals_PV/offset_vals_PV_000.txt   one file per capture loop
//! offset_values_all_PV.txt               loops merged once the value finishes
//! hist_PV.png                            histogram with the fitted Gaussian
//! sweep_P.json                           per-value results for the whole sweep
//! jitter_vs_P.png                        σ per value with standard-error bars
//! ```
//!
//! Offset files hold one value per line in seconds. A value's loop
//! directory is emptied when the value starts, and dropped again if the
//! value ends without a fit, so a merge only ever sees loops of the
//! current attempt.

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::stats::distribution::FittedDistribution;
use crate::sweep::{JitterPoint, SweepError, SweepObserver, SweepPointResult, SweepReport};

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: not an offset value: {value:?}")]
    Parse {
        path: PathBuf,
        line: usize,
        value: String,
    },

    #[error("Failed to render plot: {0}")]
    Plot(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for ArtifactError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        ArtifactError::Plot(format!("{value:?}"))
    }
}

impl From<image::ImageError> for ArtifactError {
    fn from(value: image::ImageError) -> Self {
        ArtifactError::Plot(value.to_string())
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ArtifactError + '_ {
    move |source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Plot image settings
#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub bar: RGBColor,
    pub curve: RGBColor,
    /// Markers, connecting line and error bars of the jitter plot
    pub marker: RGBColor,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 800,
            height: 500,
            background: WHITE,
            bar: RGBColor(135, 206, 235),
            curve: RED,
            marker: BLUE,
        }
    }
}

/// Render histogram bars with the fitted curve on top, as PNG bytes
pub fn render_histogram_png(
    fit: &FittedDistribution,
    style: &PlotStyle,
) -> Result<Vec<u8>, ArtifactError> {
    let (Some(&x0), Some(&x1)) = (fit.bin_edges.first(), fit.bin_edges.last()) else {
        return Err(ArtifactError::Plot("distribution has no bins".into()));
    };
    let x_pad = (x1 - x0) * 0.05;
    let (x0, x1) = (x0 - x_pad, x1 + x_pad);
    let peak = fit
        .bin_counts
        .iter()
        .map(|&c| c as f64)
        .fold(fit.amplitude, f64::max);
    let y_max = (peak * 1.1).max(1.0);

    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(20)
            .build_cartesian_2d(x0..x1, 0f64..y_max)?;

        let bar_style = style.bar.mix(0.6).filled();
        chart.draw_series(
            fit.bin_edges
                .windows(2)
                .zip(&fit.bin_counts)
                .filter(|(_, count)| **count > 0)
                .map(|(edge, &count)| {
                    Rectangle::new([(edge[0], 0.0), (edge[1], count as f64)], bar_style)
                }),
        )?;

        const CURVE_POINTS: usize = 400;
        let curve = (0..=CURVE_POINTS).map(|i| {
            let x = x0 + (x1 - x0) * i as f64 / CURVE_POINTS as f64;
            (x, fit.gaussian_at(x))
        });
        chart.draw_series(LineSeries::new(curve, style.curve.stroke_width(2)))?;
        chart.draw_series(LineSeries::new([(x0, 0.0), (x1, 0.0)], &BLACK))?;
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}

/// Render σ against the swept value with `±σ_err` bars, as PNG bytes
pub fn render_jitter_plot_png(
    points: &[JitterPoint],
    style: &PlotStyle,
) -> Result<Vec<u8>, ArtifactError> {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return Err(ArtifactError::Plot("no fitted sweep values".into()));
    };
    let (x_min, x_max) = points.iter().fold((first.value, last.value), |(lo, hi), p| {
        (lo.min(p.value), hi.max(p.value))
    });
    let x0 = x_min as f64 - 0.5;
    let x1 = x_max as f64 + 0.5;
    let y_top = points
        .iter()
        .map(|p| p.sigma + p.sigma_err)
        .fold(0.0, f64::max);
    if !(y_top > 0.0 && y_top.is_finite()) {
        return Err(ArtifactError::Plot(format!("jitter range {y_top} cannot be drawn")));
    }
    let y_max = y_top * 1.2;

    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(20)
            .build_cartesian_2d(x0..x1, 0f64..y_max)?;

        let marker = style.marker.filled();
        chart.draw_series(LineSeries::new(
            points.iter().map(|p| (p.value as f64, p.sigma)),
            style.marker.stroke_width(1),
        ))?;
        chart.draw_series(points.iter().map(|p| {
            ErrorBar::new_vertical(
                p.value as f64,
                p.sigma - p.sigma_err,
                p.sigma,
                p.sigma + p.sigma_err,
                marker,
                8,
            )
        }))?;
        chart.draw_series(
            points
                .iter()
                .map(|p| Circle::new((p.value as f64, p.sigma), 4, marker)),
        )?;
        chart.draw_series(LineSeries::new([(x0, 0.0), (x1, 0.0)], &BLACK))?;
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}

fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ArtifactError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| ArtifactError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    DynamicImage::ImageRgb8(image).write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}

/// Write one offset per line
pub fn write_offsets(path: &Path, offsets: &[f64]) -> Result<(), ArtifactError> {
    let mut text = String::with_capacity(offsets.len() * 26);
    for offset in offsets {
        text.push_str(&format!("{offset:.18e}\n"));
    }
    fs::write(path, text).map_err(io_err(path))
}

/// Read an offset file, skipping blank lines
pub fn read_offsets(path: &Path) -> Result<Vec<f64>, ArtifactError> {
    let text = fs::read_to_string(path).map_err(io_err(path))?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            line.trim().parse::<f64>().map_err(|_| ArtifactError::Parse {
                path: path.to_path_buf(),
                line: i + 1,
                value: line.to_string(),
            })
        })
        .collect()
}

/// Writes sweep artifacts under one root directory
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    root: PathBuf,
    param_name: String,
    style: PlotStyle,
}

impl ArtifactWriter {
    pub fn new(root: impl Into<PathBuf>, param_name: impl Into<String>) -> Result<Self, ArtifactError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(io_err(&root))?;
        Ok(Self {
            root,
            param_name: param_name.into(),
            style: PlotStyle::default(),
        })
    }

    pub fn with_style(mut self, style: PlotStyle) -> Self {
        self.style = style;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn tag(&self, value: i64) -> String {
        format!("{}{}", self.param_name, value)
    }

    pub fn loop_dir(&self, value: i64) -> PathBuf {
        self.root.join(format!("OffsetVals_{}", self.tag(value)))
    }

    pub fn loop_file(&self, value: i64, loop_index: usize) -> PathBuf {
        self.loop_dir(value)
            .join(format!("offset_vals_{}_{:03}.txt", self.tag(value), loop_index))
    }

    pub fn merged_file(&self, value: i64) -> PathBuf {
        self.root
            .join(format!("offset_values_all_{}.txt", self.tag(value)))
    }

    pub fn histogram_file(&self, value: i64) -> PathBuf {
        self.root.join(format!("hist_{}.png", self.tag(value)))
    }

    pub fn summary_file(&self) -> PathBuf {
        self.root.join(format!("sweep_{}.json", self.param_name))
    }

    pub fn jitter_plot_file(&self) -> PathBuf {
        self.root.join(format!("jitter_vs_{}.png", self.param_name))
    }

    /// Shared by every parameter swept into the same root
    pub fn parameters_file(&self) -> PathBuf {
        self.root.join("parameters.json")
    }

    /// Record the effective run settings
    pub fn write_parameters<T: Serialize + ?Sized>(&self, settings: &T) -> Result<PathBuf, ArtifactError> {
        let path = self.parameters_file();
        let json = serde_json::to_string_pretty(settings)?;
        fs::write(&path, json).map_err(io_err(&path))?;
        tracing::info!(path = %path.display(), "parameters_written");
        Ok(path)
    }

    /// Remove the loop directory of `value` with anything left in it
    pub fn discard_loop_offsets(&self, value: i64) -> Result<(), ArtifactError> {
        let dir = self.loop_dir(value);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(io_err(&dir))?;
            tracing::debug!(path = %dir.display(), "loop_offsets_discarded");
        }
        Ok(())
    }

    pub fn write_loop_offsets(
        &self,
        value: i64,
        loop_index: usize,
        offsets: &[f64],
    ) -> Result<PathBuf, ArtifactError> {
        let dir = self.loop_dir(value);
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        let path = self.loop_file(value, loop_index);
        write_offsets(&path, offsets)?;
        tracing::debug!(path = %path.display(), count = offsets.len(), "loop_offsets_written");
        Ok(path)
    }

    /// Concatenate loop files `0..loops` of `value` in loop order and delete them
    ///
    /// # Errors
    /// `Io` when one of those loop files is missing.
    pub fn merge_loop_offsets(&self, value: i64, loops: usize) -> Result<PathBuf, ArtifactError> {
        let loop_files: Vec<PathBuf> = (0..loops).map(|i| self.loop_file(value, i)).collect();
        let mut contents = Vec::with_capacity(loop_files.len());
        for path in &loop_files {
            contents.push(fs::read(path).map_err(io_err(path))?);
        }

        let merged = self.merged_file(value);
        let mut out = fs::File::create(&merged).map_err(io_err(&merged))?;
        for text in &contents {
            out.write_all(text).map_err(io_err(&merged))?;
        }
        out.flush().map_err(io_err(&merged))?;

        for path in &loop_files {
            fs::remove_file(path).map_err(io_err(path))?;
        }
        tracing::info!(path = %merged.display(), loops, "loop_offsets_merged");
        Ok(merged)
    }

    pub fn write_histogram(
        &self,
        value: i64,
        fit: &FittedDistribution,
    ) -> Result<PathBuf, ArtifactError> {
        let path = self.histogram_file(value);
        let png = render_histogram_png(fit, &self.style)?;
        fs::write(&path, png).map_err(io_err(&path))?;
        tracing::info!(path = %path.display(), fwhm = fit.fwhm, "histogram_written");
        Ok(path)
    }

    pub fn write_report(&self, report: &SweepReport) -> Result<PathBuf, ArtifactError> {
        let path = self.summary_file();
        let json = serde_json::to_string_pretty(report)?;
        fs::write(&path, json).map_err(io_err(&path))?;
        tracing::info!(path = %path.display(), values = report.entries.len(), "sweep_report_written");
        Ok(path)
    }

    /// Plot the jitter series of `report`; `None` when nothing was fitted
    pub fn write_jitter_plot(&self, report: &SweepReport) -> Result<Option<PathBuf>, ArtifactError> {
        let series = report.jitter_series();
        if series.is_empty() {
            tracing::warn!(param = %self.param_name, "no fitted values to plot");
            return Ok(None);
        }
        let path = self.jitter_plot_file();
        let png = render_jitter_plot_png(&series, &self.style)?;
        fs::write(&path, png).map_err(io_err(&path))?;
        tracing::info!(path = %path.display(), values = series.len(), "jitter_plot_written");
        Ok(Some(path))
    }
}

impl SweepObserver for ArtifactWriter {
    fn point_started(&mut self, value: i64) -> Result<(), SweepError> {
        self.discard_loop_offsets(value)?;
        Ok(())
    }

    fn loop_completed(&mut self, value: i64, loop_index: usize, offsets: &[f64]) -> Result<(), SweepError> {
        self.write_loop_offsets(value, loop_index, offsets)?;
        Ok(())
    }

    fn point_completed(&mut self, result: &SweepPointResult) -> Result<(), SweepError> {
        self.merge_loop_offsets(result.value, result.loops)?;
        self.write_histogram(result.value, &result.distribution)?;
        Ok(())
    }

    fn point_failed(&mut self, value: i64, _error: &SweepError) -> Result<(), SweepError> {
        self.discard_loop_offsets(value)?;
        Ok(())
    }

    fn sweep_completed(&mut self, report: &SweepReport) -> Result<(), SweepError> {
        self.write_report(report)?;
        self.write_jitter_plot(report)?;
        Ok(())
    }
}
