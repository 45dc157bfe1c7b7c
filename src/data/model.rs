use std::fmt;
use std::str::FromStr;

use eframe::egui::Color32;
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

// ---------------------------------------------------------------------------
// Detector – one interferometer station
// ---------------------------------------------------------------------------

/// The supported interferometers, identified by their station codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Detector {
    H1,
    L1,
    V1,
}

impl Detector {
    pub const ALL: [Detector; 3] = [Detector::H1, Detector::L1, Detector::V1];

    /// Two-character station code as used by GWOSC.
    pub fn code(&self) -> &'static str {
        match self {
            Detector::H1 => "H1",
            Detector::L1 => "L1",
            Detector::V1 => "V1",
        }
    }

    /// Observatory prefix used in figure titles ("LIGO-H1").
    pub fn observatory(&self) -> &'static str {
        match self {
            Detector::H1 | Detector::L1 => "LIGO",
            Detector::V1 => "Virgo",
        }
    }

    pub fn site(&self) -> &'static str {
        match self {
            Detector::H1 => "Hanford",
            Detector::L1 => "Livingston",
            Detector::V1 => "Cascina",
        }
    }
}

impl fmt::Display for Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Detector {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        Detector::ALL
            .into_iter()
            .find(|d| d.code() == s)
            .ok_or_else(|| AnalysisError::UnsupportedDetector(s.to_string()))
    }
}

impl TryFrom<String> for Detector {
    type Error = AnalysisError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Detector> for String {
    fn from(d: Detector) -> Self {
        d.code().to_string()
    }
}

// ---------------------------------------------------------------------------
// Span – half-open GPS interval
// ---------------------------------------------------------------------------

/// Half-open interval `[start, end)` in GPS seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub start: f64,
    pub end: f64,
}

impl Span {
    pub fn new(start: f64, end: f64) -> Self {
        Span { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Shrink the span by `margin` seconds on both sides.
    pub fn contract(&self, margin: f64) -> Span {
        Span::new(self.start + margin, self.end - margin)
    }

    pub fn contains(&self, other: &Span) -> bool {
        other.start >= self.start && other.end <= self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

// ---------------------------------------------------------------------------
// TimeSeries – uniformly sampled strain
// ---------------------------------------------------------------------------

/// Uniformly sampled amplitude series.
///
/// Derived operations (`crop`, `with_samples`) return a new series; a series
/// is never modified after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    t0: f64,
    sample_rate: f64,
    samples: Vec<f64>,
}

impl TimeSeries {
    pub fn new(t0: f64, sample_rate: f64, samples: Vec<f64>) -> Result<Self> {
        if !(sample_rate > 0.0) || !sample_rate.is_finite() {
            return Err(AnalysisError::InvalidParameter(format!(
                "sample rate must be positive, got {sample_rate}"
            )));
        }
        Ok(TimeSeries {
            t0,
            sample_rate,
            samples,
        })
    }

    pub fn t0(&self) -> f64 {
        self.t0
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn span(&self) -> Span {
        Span::new(self.t0, self.t0 + self.samples.len() as f64 / self.sample_rate)
    }

    /// Timestamp of sample `i`.
    pub fn time_at(&self, i: usize) -> f64 {
        self.t0 + i as f64 / self.sample_rate
    }

    /// Same timing, new sample values. Lengths must match.
    pub fn with_samples(&self, samples: Vec<f64>) -> Result<Self> {
        if samples.len() != self.samples.len() {
            return Err(AnalysisError::InvalidParameter(format!(
                "derived series has {} samples, source has {}",
                samples.len(),
                self.samples.len()
            )));
        }
        Ok(TimeSeries {
            t0: self.t0,
            sample_rate: self.sample_rate,
            samples,
        })
    }

    /// Return the part of the series inside `span`, snapped to sample
    /// boundaries.
    pub fn crop(&self, span: Span) -> Result<Self> {
        let own = self.span();
        // Half a sample of slack so spans computed in floating point still match.
        let slack = 0.5 / self.sample_rate;
        if span.start >= span.end
            || span.start < own.start - slack
            || span.end > own.end + slack
        {
            return Err(AnalysisError::InvalidParameter(format!(
                "cannot crop {own} to {span}"
            )));
        }
        let i0 = ((span.start - self.t0) * self.sample_rate).round().max(0.0) as usize;
        let i1 = (((span.end - self.t0) * self.sample_rate).round() as usize).min(self.len());
        Ok(TimeSeries {
            t0: self.time_at(i0),
            sample_rate: self.sample_rate,
            samples: self.samples[i0..i1].to_vec(),
        })
    }

    /// Root-mean-square amplitude.
    pub fn rms(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        (self.samples.iter().map(|x| x * x).sum::<f64>() / self.len() as f64).sqrt()
    }
}

// ---------------------------------------------------------------------------
// DetectorResult – one detector's processed data
// ---------------------------------------------------------------------------

/// Cropped raw and filtered series for one detector, ready for rendering.
#[derive(Debug, Clone)]
pub struct DetectorResult {
    pub detector: Detector,
    pub raw: TimeSeries,
    pub filtered: TimeSeries,
    pub color: Color32,
}
