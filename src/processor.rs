use crate::config::WhiteningConfig;
use crate::data::filter::FilterDesign;
use crate::data::model::TimeSeries;
use crate::data::qtransform::{q_transform, QGram, QParams};
use crate::data::spectral::whiten;
use crate::error::{AnalysisError, Result};

// ---------------------------------------------------------------------------
// SignalProcessor – the numerical back end seen by the pipeline
// ---------------------------------------------------------------------------

/// Numerical operations the pipeline needs. Every operation returns a new
/// series; inputs are never modified.
pub trait SignalProcessor {
    /// Normalise `series` by its own noise spectrum.
    fn whiten(&self, series: &TimeSeries, config: &WhiteningConfig) -> Result<TimeSeries>;

    /// Zero-phase filtering with a pre-built design.
    fn filter(&self, series: &TimeSeries, design: &FilterDesign) -> Result<TimeSeries>;

    /// Zero-phase Butterworth bandpass.
    fn bandpass(&self, series: &TimeSeries, low: f64, high: f64) -> Result<TimeSeries>;

    fn q_transform(&self, series: &TimeSeries, params: &QParams) -> Result<QGram>;
}

/// In-crate implementation built on `rustfft` and second-order sections.
#[derive(Debug, Clone)]
pub struct NativeProcessor {
    /// Order of each half of the bandpass used by [`SignalProcessor::bandpass`].
    pub bandpass_order: usize,
}

impl Default for NativeProcessor {
    fn default() -> Self {
        Self { bandpass_order: 4 }
    }
}

impl SignalProcessor for NativeProcessor {
    fn whiten(&self, series: &TimeSeries, config: &WhiteningConfig) -> Result<TimeSeries> {
        whiten(series, config)
    }

    fn filter(&self, series: &TimeSeries, design: &FilterDesign) -> Result<TimeSeries> {
        if (design.sample_rate() - series.sample_rate()).abs() > f64::EPSILON {
            return Err(AnalysisError::InvalidParameter(format!(
                "filter designed for {} Hz applied to {} Hz data",
                design.sample_rate(),
                series.sample_rate()
            )));
        }
        series.with_samples(design.filtfilt(series.samples()))
    }

    fn bandpass(&self, series: &TimeSeries, low: f64, high: f64) -> Result<TimeSeries> {
        let design =
            FilterDesign::bandpass_only(low, high, self.bandpass_order, series.sample_rate())?;
        self.filter(series, &design)
    }

    fn q_transform(&self, series: &TimeSeries, params: &QParams) -> Result<QGram> {
        q_transform(series, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterConfig;
    use crate::data::spectral::tests::white_noise;

    fn noise_series(seconds: usize) -> TimeSeries {
        TimeSeries::new(1_000_000_000.0, 4096.0, white_noise(21, seconds * 4096, 1e-21)).unwrap()
    }

    #[test]
    fn filter_keeps_length_and_start() {
        let processor = NativeProcessor::default();
        let raw = noise_series(8);
        let design = FilterDesign::new(&FilterConfig::default(), raw.sample_rate()).unwrap();
        let filtered = processor.filter(&raw, &design).unwrap();
        assert_eq!(filtered.len(), raw.len());
        assert_eq!(filtered.t0(), raw.t0());
        assert_eq!(filtered.span(), raw.span());
    }

    #[test]
    fn whiten_then_filter_keeps_sample_count() {
        let processor = NativeProcessor::default();
        let raw = noise_series(16);
        let design = FilterDesign::new(&FilterConfig::default(), raw.sample_rate()).unwrap();
        let whitened = processor.whiten(&raw, &WhiteningConfig::default()).unwrap();
        let filtered = processor.filter(&whitened, &design).unwrap();
        assert_eq!(whitened.len(), raw.len());
        assert_eq!(filtered.len(), whitened.len());
    }

    #[test]
    fn filter_rejects_mismatched_rate() {
        let processor = NativeProcessor::default();
        let raw = noise_series(1);
        let design = FilterDesign::new(&FilterConfig::default(), 16384.0).unwrap();
        assert!(matches!(
            processor.filter(&raw, &design),
            Err(AnalysisError::InvalidParameter(_))
        ));
    }

    #[test]
    fn bandpass_validates_cutoffs() {
        let processor = NativeProcessor::default();
        let raw = noise_series(1);
        assert!(processor.bandpass(&raw, 30.0, 500.0).is_ok());
        assert!(processor.bandpass(&raw, 30.0, 4000.0).is_err());
    }
}
