//! Analysis parameters.
//!
//! Every constant the pipeline depends on lives here and is passed into the
//! functions that need it. `AnalysisConfig::default()` reproduces the
//! GW151226 analysis.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::data::model::Detector;
use crate::error::{AnalysisError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Catalog name of the event to analyse.
    pub event: String,
    /// Detectors in processing (and display) order.
    pub detectors: Vec<Detector>,
    /// Seconds fetched on each side of the event time.
    pub half_window: f64,
    /// Allow the data service to read/write its on-disk cache.
    pub use_cache: bool,
    pub filter: FilterConfig,
    pub whitening: WhiteningConfig,
    /// Seconds trimmed from each end after whitening and filtering.
    pub crop_margin: f64,
    pub overlay: OverlayConfig,
    pub qscan: QScanConfig,
    pub gwosc: GwoscConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            event: "GW151226".to_string(),
            detectors: vec![Detector::H1, Detector::L1],
            half_window: 16.0,
            use_cache: true,
            filter: FilterConfig::default(),
            whitening: WhiteningConfig::default(),
            crop_margin: 1.0,
            overlay: OverlayConfig::default(),
            qscan: QScanConfig::default(),
            gwosc: GwoscConfig::default(),
        }
    }
}

/// Bandpass plus power-line notches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub bandpass_low: f64,
    pub bandpass_high: f64,
    /// Butterworth order of each of the high-pass and low-pass halves.
    pub order: usize,
    pub notches: Vec<f64>,
    /// Notch quality factor (centre / -3 dB bandwidth).
    pub notch_q: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            bandpass_low: 40.0,
            bandpass_high: 500.0,
            order: 4,
            notches: vec![60.0, 120.0, 180.0],
            notch_q: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhiteningConfig {
    /// Welch segment length in seconds.
    pub fftlength: f64,
    /// Welch segment overlap in seconds; `None` means half a segment.
    pub overlap: Option<f64>,
    /// Hann taper applied to each end before the FFT, in seconds.
    pub taper: f64,
}

impl Default for WhiteningConfig {
    fn default() -> Self {
        Self {
            fftlength: 4.0,
            overlap: None,
            taper: 0.5,
        }
    }
}

/// Raw vs filtered time-domain figure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Seconds shown before the event time.
    pub before: f64,
    /// Seconds shown after the event time.
    pub after: f64,
    pub filtered_ylim: (f64, f64),
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            before: 1.0,
            after: 0.2,
            filtered_ylim: (-10.0, 10.0),
        }
    }
}

/// Q-transform spectrogram.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QScanConfig {
    /// Bandpass applied to the raw series before the transform.
    pub bandpass: (f64, f64),
    pub frange: (f64, f64),
    pub qrange: (f64, f64),
    pub mismatch: f64,
    /// Output window relative to the integer event second.
    pub outseg: (f64, f64),
    pub n_times: usize,
    pub n_frequencies: usize,
    /// Colour scale limits for normalized energy. `None` scales from zero
    /// to the loudest tile.
    pub energy_range: Option<(f64, f64)>,
}

impl Default for QScanConfig {
    fn default() -> Self {
        Self {
            bandpass: (30.0, 500.0),
            frange: (30.0, 1000.0),
            qrange: (8.0, 64.0),
            mismatch: 0.2,
            outseg: (0.3, 0.9),
            n_times: 600,
            n_frequencies: 300,
            energy_range: None,
        }
    }
}

/// Gravitational Wave Open Science Center endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GwoscConfig {
    pub host: String,
    /// Preferred sample rate of the downloaded files.
    pub sample_rate: f64,
    /// Strain cache directory; `None` uses the platform cache dir.
    pub cache_dir: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for GwoscConfig {
    fn default() -> Self {
        Self {
            host: "https://gwosc.org".to_string(),
            sample_rate: 4096.0,
            cache_dir: None,
            timeout_secs: 120,
        }
    }
}

impl GwoscConfig {
    pub fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("gw-strain-viewer")
        })
    }
}

fn ensure(cond: bool, msg: impl FnOnce() -> String) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(AnalysisError::InvalidParameter(msg()))
    }
}

fn ensure_range(name: &str, (lo, hi): (f64, f64)) -> Result<()> {
    ensure(lo.is_finite() && hi.is_finite() && lo < hi, || {
        format!("{name} must be an increasing range, got ({lo}, {hi})")
    })
}

impl AnalysisConfig {
    /// Check the numeric preconditions that do not depend on the data.
    ///
    /// Nyquist limits are checked later, once the sample rate is known.
    pub fn validate(&self) -> Result<()> {
        ensure(!self.event.trim().is_empty(), || "event name is empty".into())?;
        ensure(!self.detectors.is_empty(), || "no detectors configured".into())?;
        ensure(self.half_window > 0.0, || {
            format!("half_window must be positive, got {}", self.half_window)
        })?;
        ensure(self.crop_margin >= 0.0, || {
            format!("crop_margin must be non-negative, got {}", self.crop_margin)
        })?;
        ensure(2.0 * self.crop_margin < 2.0 * self.half_window, || {
            format!(
                "crop margin {} leaves nothing of a {} s window",
                self.crop_margin,
                2.0 * self.half_window
            )
        })?;
        ensure(
            self.whitening.fftlength > 0.0 && self.whitening.fftlength <= 2.0 * self.half_window,
            || {
                format!(
                    "whitening fftlength {} must be positive and fit in the {} s window",
                    self.whitening.fftlength,
                    2.0 * self.half_window
                )
            },
        )?;
        ensure_range(
            "bandpass",
            (self.filter.bandpass_low, self.filter.bandpass_high),
        )?;
        ensure(self.filter.bandpass_low > 0.0, || {
            "bandpass low cutoff must be positive".into()
        })?;
        ensure(
            self.filter.notches.iter().all(|f| *f > 0.0),
            || format!("notch frequencies must be positive: {:?}", self.filter.notches),
        )?;
        ensure(self.overlay.before >= 0.0 && self.overlay.after >= 0.0, || {
            "overlay window offsets must be non-negative".into()
        })?;
        ensure_range("overlay y-limits", self.overlay.filtered_ylim)?;
        ensure_range("qscan bandpass", self.qscan.bandpass)?;
        ensure_range("qscan frange", self.qscan.frange)?;
        ensure_range("qscan qrange", self.qscan.qrange)?;
        ensure_range("qscan outseg", self.qscan.outseg)?;
        if let Some(range) = self.qscan.energy_range {
            ensure_range("qscan energy range", range)?;
        }
        ensure(self.qscan.n_times > 1 && self.qscan.n_frequencies > 1, || {
            "qscan output grid needs at least 2x2 cells".into()
        })?;
        Ok(())
    }
}
