use eframe::egui::Color32;

use crate::config::{OverlayConfig, QScanConfig};
use crate::data::model::{Detector, DetectorResult, TimeSeries};
use crate::data::qtransform::QGram;
use crate::error::Result;

// ---------------------------------------------------------------------------
// Figure descriptions
// ---------------------------------------------------------------------------

/// One panel of a stacked time-domain figure.
#[derive(Debug, Clone)]
pub struct SeriesPanel {
    pub series: TimeSeries,
    pub ylabel: String,
    pub ylim: Option<(f64, f64)>,
}

/// Raw and filtered strain stacked on a shared time axis.
#[derive(Debug, Clone)]
pub struct OverlayFigure {
    pub title: String,
    pub detector: Detector,
    pub color: Color32,
    /// Time axis origin; ticks are seconds relative to it.
    pub epoch: f64,
    /// Visible GPS range.
    pub xlim: (f64, f64),
    pub top: SeriesPanel,
    pub bottom: SeriesPanel,
}

/// Q-transform heatmap with a logarithmic frequency axis.
#[derive(Debug, Clone)]
pub struct SpectrogramFigure {
    pub title: String,
    pub detector: Detector,
    pub epoch: f64,
    pub xlim: (f64, f64),
    pub qgram: QGram,
    pub ylabel: String,
    pub colorbar_label: String,
    pub energy_range: (f64, f64),
}

#[derive(Debug, Clone)]
pub enum Figure {
    Overlay(OverlayFigure),
    Spectrogram(SpectrogramFigure),
}

impl Figure {
    pub fn title(&self) -> &str {
        match self {
            Figure::Overlay(f) => &f.title,
            Figure::Spectrogram(f) => &f.title,
        }
    }

    pub fn detector(&self) -> Detector {
        match self {
            Figure::Overlay(f) => f.detector,
            Figure::Spectrogram(f) => f.detector,
        }
    }
}

/// Axis label for seconds counted from `epoch`.
pub fn time_axis_label(epoch: f64) -> String {
    format!("Time [seconds] from {epoch}")
}

/// Raw vs filtered overlay for one detector, windowed around the event.
pub fn overlay_figure(
    result: &DetectorResult,
    event: &str,
    gps: f64,
    config: &OverlayConfig,
) -> OverlayFigure {
    let detector = result.detector;
    OverlayFigure {
        title: format!(
            "{}-{detector} Strain Data around {event}",
            detector.observatory()
        ),
        detector,
        color: result.color,
        epoch: gps.floor(),
        xlim: (gps - config.before, gps + config.after),
        top: SeriesPanel {
            series: result.raw.clone(),
            ylabel: "Raw Amplitude".to_string(),
            ylim: None,
        },
        bottom: SeriesPanel {
            series: result.filtered.clone(),
            ylabel: "Whitened Amplitude".to_string(),
            ylim: Some(config.filtered_ylim),
        },
    }
}

/// Q-transform figure; the window is anchored at the integer event second.
pub fn spectrogram_figure(
    detector: Detector,
    qgram: QGram,
    gps: f64,
    config: &QScanConfig,
) -> SpectrogramFigure {
    let epoch = gps.floor();
    let energy_range = config
        .energy_range
        .unwrap_or((0.0, qgram.peak.energy));
    SpectrogramFigure {
        title: format!("{}-{detector} Strain", detector.observatory()),
        detector,
        epoch,
        xlim: (epoch + config.outseg.0, epoch + config.outseg.1),
        qgram,
        ylabel: "Frequency [Hz]".to_string(),
        colorbar_label: "Normalized Energy".to_string(),
        energy_range,
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Receives figures as the pipeline produces them.
pub trait Renderer {
    fn overlay(&mut self, figure: OverlayFigure) -> Result<()>;

    fn spectrogram(&mut self, figure: SpectrogramFigure) -> Result<()>;

    /// Present everything received so far. Called once, at the end of a run.
    fn show(&mut self) -> Result<()>;
}

/// Collects figures and opens them in the egui viewer on [`Renderer::show`].
#[derive(Default)]
pub struct ViewerRenderer {
    figures: Vec<Figure>,
}

impl ViewerRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Renderer for ViewerRenderer {
    fn overlay(&mut self, figure: OverlayFigure) -> Result<()> {
        log::debug!("queued figure '{}'", figure.title);
        self.figures.push(Figure::Overlay(figure));
        Ok(())
    }

    fn spectrogram(&mut self, figure: SpectrogramFigure) -> Result<()> {
        log::debug!("queued figure '{}'", figure.title);
        self.figures.push(Figure::Spectrogram(figure));
        Ok(())
    }

    fn show(&mut self) -> Result<()> {
        if self.figures.is_empty() {
            log::warn!("no figures to show");
            return Ok(());
        }
        crate::app::run_viewer(std::mem::take(&mut self.figures))
    }
}
