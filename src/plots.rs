// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! PNG rendering for the confusion matrix heatmap and the ROC / PR curves
//!
//! Every plot owns its own `Figure`: the bitmap is drawn to a temporary file
//! next to the target and only renamed into place once drawing succeeded.
//! Dropping a `Figure` removes the temporary file, so a failed plot never
//! leaves a half-drawn image behind and nothing carries over between plots.

use crate::config::PlotConfig;
use crate::error::ReportError;
use crate::metrics::{ConfusionMatrix, PrecisionRecallCurve, RocCurve};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::series::DashedLineSeries;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::{FontStyle, FontTransform};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

type DrawResult = Result<(), Box<dyn Error>>;
type Canvas<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

const FONT: &str = "sans-serif";
const DARK_ORANGE: RGBColor = RGBColor(255, 140, 0);
const NAVY: RGBColor = RGBColor(0, 0, 128);

/// matplotlib "Blues", light to dark
const BLUES: [(u8, u8, u8); 9] = [
    (247, 251, 255),
    (222, 235, 247),
    (198, 219, 239),
    (158, 202, 225),
    (107, 174, 214),
    (66, 146, 198),
    (33, 113, 181),
    (8, 81, 156),
    (8, 48, 107),
];

const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// The last font request and whether it produced a registered font
struct FontState {
    preferred: Option<PathBuf>,
    loaded: bool,
}

static FONT_STATE: Mutex<Option<FontState>> = Mutex::new(None);

/// Register a TrueType font for plot text.
///
/// A successful registration is reused while `preferred` stays the same. A
/// different path registers that font instead; a failed lookup is retried.
/// Returns false when no usable font was found; plots are then drawn without
/// titles, tick labels or legends.
pub fn ensure_font(preferred: Option<&Path>) -> bool {
    let mut state = FONT_STATE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(cached) = state.as_ref() {
        if cached.loaded && cached.preferred.as_deref() == preferred {
            return true;
        }
    }

    let loaded = register_first_font(preferred);
    *state = Some(FontState {
        preferred: preferred.map(Path::to_path_buf),
        loaded,
    });
    loaded
}

fn register_first_font(preferred: Option<&Path>) -> bool {
    if let Some(path) = preferred {
        if !path.is_file() {
            tracing::warn!("Configured plot font {} not found", path.display());
        }
    }
    let candidates = preferred
        .into_iter()
        .map(Path::to_path_buf)
        .chain(FONT_CANDIDATES.iter().map(PathBuf::from));

    for path in candidates {
        let Ok(bytes) = std::fs::read(&path) else {
            continue;
        };
        // The font registry needs 'static data; leaked once per font change.
        let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
        if plotters::style::register_font(FONT, FontStyle::Normal, bytes).is_ok() {
            tracing::debug!("Using plot font {}", path.display());
            return true;
        }
        tracing::warn!("Ignoring unreadable font file {}", path.display());
    }

    tracing::warn!("No TrueType font found; plots will be rendered without text");
    false
}

/// Size and text settings shared by all plots of a run
#[derive(Debug, Clone, Copy)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    /// Draw titles, labels and legends
    pub text: bool,
}

impl PlotStyle {
    pub fn from_config(config: &PlotConfig) -> Self {
        Self {
            width: config.width.max(200),
            height: config.height.max(150),
            text: ensure_font(config.font_path.as_deref()),
        }
    }
}

/// A drawing surface bound to one output file
struct Figure {
    target: PathBuf,
    scratch: PathBuf,
    size: (u32, u32),
    committed: bool,
}

impl Figure {
    fn new(target: &Path, style: &PlotStyle) -> Self {
        let stem = target
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "figure".to_string());
        let scratch = target.with_file_name(format!(".{}.partial.png", stem));
        Self {
            target: target.to_path_buf(),
            scratch,
            size: (style.width, style.height),
            committed: false,
        }
    }

    /// Draw with `draw`, then move the finished image into place
    fn render<F>(mut self, artifact: &str, draw: F) -> Result<PathBuf, ReportError>
    where
        F: FnOnce(&Canvas<'_>) -> DrawResult,
    {
        {
            let root = BitMapBackend::new(&self.scratch, self.size).into_drawing_area();
            root.fill(&WHITE).map_err(|e| ReportError::render(artifact, e))?;
            draw(&root).map_err(|e| ReportError::render(artifact, e))?;
            root.present().map_err(|e| ReportError::render(artifact, e))?;
        }

        std::fs::rename(&self.scratch, &self.target).map_err(|e| ReportError::io(&self.target, e))?;
        self.committed = true;
        Ok(self.target.clone())
    }
}

impl Drop for Figure {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.scratch);
        }
    }
}

/// Interpolated "Blues" colour for `t` in [0, 1]
pub fn blues(t: f64) -> RGBColor {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let scaled = t * (BLUES.len() - 1) as f64;
    let lo = scaled.floor() as usize;
    let hi = (lo + 1).min(BLUES.len() - 1);
    let frac = scaled - lo as f64;

    let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * frac).round() as u8;
    let (a, b) = (BLUES[lo], BLUES[hi]);
    RGBColor(mix(a.0, b.0), mix(a.1, b.1), mix(a.2, b.2))
}

/// Annotated heatmap of a confusion matrix, titled "Confusion Matrix"
pub fn plot_confusion_matrix(cm: &ConfusionMatrix, path: &Path, style: &PlotStyle) -> Result<PathBuf, ReportError> {
    Figure::new(path, style).render("confusion matrix", |root| draw_confusion_matrix(root, cm, style))
}

fn draw_confusion_matrix(root: &Canvas<'_>, cm: &ConfusionMatrix, style: &PlotStyle) -> DrawResult {
    let n = cm.size().max(1) as i32;
    let (width, height) = (style.width as i32, style.height as i32);
    let (left, right, top, bottom) = (90, 110, 50, 70);

    let side = (width - left - right).min(height - top - bottom).max(n);
    let cell = side / n;
    let side = cell * n;
    let (x0, y0) = (left, top);
    let max = cm.max_count().max(1) as f64;

    for (i, row) in cm.counts.iter().enumerate() {
        for (j, &count) in row.iter().enumerate() {
            let (i, j) = (i as i32, j as i32);
            let intensity = count as f64 / max;
            let upper_left = (x0 + j * cell, y0 + i * cell);
            let lower_right = (x0 + (j + 1) * cell, y0 + (i + 1) * cell);
            root.draw(&Rectangle::new([upper_left, lower_right], blues(intensity).filled()))?;

            if style.text {
                let color = if intensity > 0.5 { WHITE } else { blues(1.0) };
                let label_style = (FONT, 22)
                    .into_font()
                    .color(&color)
                    .pos(Pos::new(HPos::Center, VPos::Center));
                let center = (upper_left.0 + cell / 2, upper_left.1 + cell / 2);
                root.draw(&Text::new(count.to_string(), center, label_style))?;
            }
        }
    }
    root.draw(&Rectangle::new([(x0, y0), (x0 + side, y0 + side)], BLACK.stroke_width(1)))?;

    // Colour bar
    let bar_x = x0 + side + 30;
    for k in 0..side {
        let t = 1.0 - k as f64 / side as f64;
        root.draw(&Rectangle::new([(bar_x, y0 + k), (bar_x + 20, y0 + k + 1)], blues(t).filled()))?;
    }
    root.draw(&Rectangle::new([(bar_x, y0), (bar_x + 20, y0 + side)], BLACK.stroke_width(1)))?;

    if !style.text {
        return Ok(());
    }

    let centered = |size: u32| (FONT, size).into_font().color(&BLACK).pos(Pos::new(HPos::Center, VPos::Center));
    root.draw(&Text::new("Confusion Matrix", (x0 + side / 2, top / 2), centered(22)))?;

    for (k, name) in cm.labels.display_names.iter().enumerate() {
        let offset = k as i32 * cell + cell / 2;
        root.draw(&Text::new(name.clone(), (x0 + offset, y0 + side + 15), centered(16)))?;
        let row_label = (FONT, 16)
            .into_font()
            .color(&BLACK)
            .pos(Pos::new(HPos::Right, VPos::Center));
        root.draw(&Text::new(name.clone(), (x0 - 10, y0 + offset), row_label))?;
    }

    root.draw(&Text::new("Predicted label", (x0 + side / 2, y0 + side + 45), centered(16)))?;
    let rotated = (FONT, 16)
        .into_font()
        .transform(FontTransform::Rotate270)
        .color(&BLACK)
        .pos(Pos::new(HPos::Center, VPos::Center));
    root.draw(&Text::new("True label", (x0 - 55, y0 + side / 2), rotated))?;

    let tick = (FONT, 13).into_font().color(&BLACK).pos(Pos::new(HPos::Left, VPos::Center));
    root.draw(&Text::new(cm.max_count().to_string(), (bar_x + 26, y0), tick.clone()))?;
    root.draw(&Text::new("0", (bar_x + 26, y0 + side), tick))?;

    Ok(())
}

/// ROC curve against the no-skill diagonal, AUC in the legend
pub fn plot_roc_curve(curve: &RocCurve, path: &Path, style: &PlotStyle) -> Result<PathBuf, ReportError> {
    Figure::new(path, style).render("ROC curve", |root| draw_roc_curve(root, curve, style))
}

fn draw_roc_curve(root: &Canvas<'_>, curve: &RocCurve, style: &PlotStyle) -> DrawResult {
    let mut builder = ChartBuilder::on(root);
    builder.margin(20);
    if style.text {
        builder
            .caption("Receiver Operating Characteristic", (FONT, 22))
            .x_label_area_size(45)
            .y_label_area_size(55);
    }
    let mut chart = builder.build_cartesian_2d(0f64..1f64, 0f64..1.05f64)?;

    let mut mesh = chart.configure_mesh();
    if style.text {
        mesh.x_desc("False Positive Rate").y_desc("True Positive Rate");
    } else {
        mesh.x_labels(0).y_labels(0);
    }
    mesh.draw()?;

    let points: Vec<(f64, f64)> = curve.fpr.iter().copied().zip(curve.tpr.iter().copied()).collect();
    let series = chart.draw_series(LineSeries::new(points, DARK_ORANGE.stroke_width(2)))?;
    if style.text {
        series
            .label(format!("ROC Curve (AUC = {:.2})", curve.auc))
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], DARK_ORANGE.stroke_width(2)));
    }

    chart.draw_series(DashedLineSeries::new(
        vec![(0.0, 0.0), (1.0, 1.0)],
        10,
        6,
        NAVY.stroke_width(2),
    ))?;

    if style.text {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::LowerRight)
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()?;
    }
    Ok(())
}

/// Precision-recall curve, average precision in the legend
pub fn plot_precision_recall_curve(
    curve: &PrecisionRecallCurve,
    path: &Path,
    style: &PlotStyle,
) -> Result<PathBuf, ReportError> {
    Figure::new(path, style).render("precision-recall curve", |root| draw_precision_recall_curve(root, curve, style))
}

fn draw_precision_recall_curve(root: &Canvas<'_>, curve: &PrecisionRecallCurve, style: &PlotStyle) -> DrawResult {
    let mut builder = ChartBuilder::on(root);
    builder.margin(20);
    if style.text {
        builder
            .caption("Precision-Recall Curve", (FONT, 22))
            .x_label_area_size(45)
            .y_label_area_size(55);
    }
    let mut chart = builder.build_cartesian_2d(0f64..1f64, 0f64..1.05f64)?;

    let mut mesh = chart.configure_mesh();
    if style.text {
        mesh.x_desc("Recall").y_desc("Precision");
    } else {
        mesh.x_labels(0).y_labels(0);
    }
    mesh.draw()?;

    let points: Vec<(f64, f64)> = curve.recall.iter().copied().zip(curve.precision.iter().copied()).collect();
    let series = chart.draw_series(LineSeries::new(points, BLUE.stroke_width(2)))?;
    if style.text {
        series
            .label(format!("Avg Precision = {:.2}", curve.average_precision))
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE.stroke_width(2)));

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::LowerLeft)
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()?;
    }
    Ok(())
}
