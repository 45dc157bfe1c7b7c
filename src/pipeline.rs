use crate::color::detector_color;
use crate::config::AnalysisConfig;
use crate::data::filter::FilterDesign;
use crate::data::loader::{EventCatalog, StrainSource};
use crate::data::model::{Detector, DetectorResult, Span};
use crate::data::qtransform::QParams;
use crate::error::{AnalysisError, Result};
use crate::processor::SignalProcessor;
use crate::render::{overlay_figure, spectrogram_figure, Renderer};

/// One analysis run: resolve, fetch, filter, render.
///
/// The stages are strictly sequential and the first error aborts the run.
pub struct Pipeline<'a> {
    config: &'a AnalysisConfig,
    catalog: &'a dyn EventCatalog,
    source: &'a dyn StrainSource,
    processor: &'a dyn SignalProcessor,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a AnalysisConfig,
        catalog: &'a dyn EventCatalog,
        source: &'a dyn StrainSource,
        processor: &'a dyn SignalProcessor,
    ) -> Self {
        Pipeline {
            config,
            catalog,
            source,
            processor,
        }
    }

    /// Run the analysis and hand every figure to `renderer`, then show them.
    pub fn run(&self, renderer: &mut dyn Renderer) -> Result<Vec<DetectorResult>> {
        let config = self.config;
        config.validate()?;

        let gps = self.catalog.event_gps(&config.event)?;
        log::info!("{} at GPS {gps}", config.event);

        let epoch = gps.floor();
        let window = Span::new(epoch - config.half_window, epoch + config.half_window);

        // One second of the first detector fixes the sample rate of the run.
        let reference = config.detectors[0];
        let sample_rate = self
            .source
            .fetch(reference, gps, gps + 1.0, config.use_cache)?
            .sample_rate();
        log::info!("Sample rate {sample_rate} Hz (from {reference})");

        let design = FilterDesign::new(&config.filter, sample_rate)?;
        log::debug!("Filter cascade of {} sections", design.sections().len());

        let mut results = Vec::with_capacity(config.detectors.len());
        for &detector in &config.detectors {
            results.push(self.process(detector, window, sample_rate, &design)?);
        }

        for result in &results {
            renderer.overlay(overlay_figure(result, &config.event, gps, &config.overlay))?;

            let (low, high) = config.qscan.bandpass;
            let band = self.processor.bandpass(&result.raw, low, high)?;
            let params = QParams::from_config(&config.qscan, epoch);
            let qgram = self.processor.q_transform(&band, &params)?;
            log::info!(
                "{} Q-scan peak: {:.1} normalized energy at {:.3} s, {:.1} Hz (Q = {:.1})",
                result.detector,
                qgram.peak.energy,
                qgram.peak.time - epoch,
                qgram.peak.frequency,
                qgram.q
            );
            renderer.spectrogram(spectrogram_figure(result.detector, qgram, gps, &config.qscan))?;
        }

        renderer.show()?;
        Ok(results)
    }

    fn process(
        &self,
        detector: Detector,
        window: Span,
        sample_rate: f64,
        design: &FilterDesign,
    ) -> Result<DetectorResult> {
        let config = self.config;
        let raw = self
            .source
            .fetch(detector, window.start, window.end, config.use_cache)?;
        if (raw.sample_rate() - sample_rate).abs() > f64::EPSILON {
            return Err(AnalysisError::SampleRateMismatch {
                detector: detector.to_string(),
                expected: sample_rate,
                actual: raw.sample_rate(),
            });
        }

        let whitened = self.processor.whiten(&raw, &config.whitening)?;
        let filtered = self.processor.filter(&whitened, design)?;

        let raw = raw.crop(raw.span().contract(config.crop_margin))?;
        let filtered = filtered.crop(filtered.span().contract(config.crop_margin))?;
        log::info!(
            "{detector}: kept {} (raw rms {:.3e}, filtered rms {:.3})",
            raw.span(),
            raw.rms(),
            filtered.rms()
        );

        Ok(DetectorResult {
            detector,
            raw,
            filtered,
            color: detector_color(detector),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::f64::consts::PI;

    use super::*;
    use crate::config::WhiteningConfig;
    use crate::data::model::TimeSeries;
    use crate::data::qtransform::{QGram, QPeak};
    use crate::processor::NativeProcessor;
    use crate::render::{Figure, OverlayFigure, SpectrogramFigure};

    const GPS: f64 = 1135136350.6;

    struct FixedCatalog(Option<f64>);

    impl EventCatalog for FixedCatalog {
        fn event_gps(&self, name: &str) -> Result<f64> {
            self.0
                .ok_or_else(|| AnalysisError::UnknownEvent(name.to_string()))
        }
    }

    /// 100 Hz unit sinusoid for any detector and span; counts requests.
    struct SineSource {
        rates: Vec<(Detector, f64)>,
        calls: Cell<usize>,
    }

    impl SineSource {
        fn new() -> Self {
            SineSource {
                rates: Vec::new(),
                calls: Cell::new(0),
            }
        }

        fn rate(&self, detector: Detector) -> f64 {
            self.rates
                .iter()
                .find(|(d, _)| *d == detector)
                .map_or(4096.0, |(_, r)| *r)
        }
    }

    impl StrainSource for SineSource {
        fn fetch(&self, detector: Detector, start: f64, end: f64, _cache: bool) -> Result<TimeSeries> {
            self.calls.set(self.calls.get() + 1);
            let fs = self.rate(detector);
            let n = ((end - start) * fs).round() as usize;
            let samples = (0..n)
                .map(|i| (2.0 * PI * 100.0 * i as f64 / fs).sin())
                .collect();
            TimeSeries::new(start, fs, samples)
        }
    }

    /// Identity whitening, real filtering, trivial Q-transform.
    struct StubProcessor;

    impl SignalProcessor for StubProcessor {
        fn whiten(&self, series: &TimeSeries, _config: &WhiteningConfig) -> Result<TimeSeries> {
            Ok(series.clone())
        }

        fn filter(&self, series: &TimeSeries, design: &FilterDesign) -> Result<TimeSeries> {
            NativeProcessor::default().filter(series, design)
        }

        fn bandpass(&self, series: &TimeSeries, low: f64, high: f64) -> Result<TimeSeries> {
            NativeProcessor::default().bandpass(series, low, high)
        }

        fn q_transform(&self, _series: &TimeSeries, params: &QParams) -> Result<QGram> {
            Ok(QGram {
                q: params.qrange.0,
                times: vec![params.outseg.start, params.outseg.end],
                frequencies: vec![params.frange.0, params.frange.1],
                energy: vec![1.0; 4],
                peak: QPeak {
                    time: params.outseg.start,
                    frequency: params.frange.0,
                    energy: 1.0,
                },
            })
        }
    }

    #[derive(Default)]
    struct RecordingRenderer {
        figures: Vec<Figure>,
        shown: usize,
    }

    impl Renderer for RecordingRenderer {
        fn overlay(&mut self, figure: OverlayFigure) -> Result<()> {
            self.figures.push(Figure::Overlay(figure));
            Ok(())
        }

        fn spectrogram(&mut self, figure: SpectrogramFigure) -> Result<()> {
            self.figures.push(Figure::Spectrogram(figure));
            Ok(())
        }

        fn show(&mut self) -> Result<()> {
            self.shown += 1;
            Ok(())
        }
    }

    fn h1_only() -> AnalysisConfig {
        AnalysisConfig {
            detectors: vec![Detector::H1],
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn sinusoid_passes_through_with_unit_gain() {
        let config = h1_only();
        let catalog = FixedCatalog(Some(GPS));
        let source = SineSource::new();
        let mut renderer = RecordingRenderer::default();

        let results = Pipeline::new(&config, &catalog, &source, &StubProcessor)
            .run(&mut renderer)
            .unwrap();

        assert_eq!(results.len(), 1);
        let h1 = &results[0];
        assert_eq!(h1.detector, Detector::H1);
        assert_eq!(h1.color, detector_color(Detector::H1));
        let ratio = h1.filtered.rms() / h1.raw.rms();
        assert!((ratio - 1.0).abs() < 0.05, "gain {ratio}");

        assert_eq!(renderer.shown, 1);
        assert_eq!(renderer.figures.len(), 2);
        match &renderer.figures[0] {
            Figure::Overlay(fig) => {
                assert_eq!(fig.xlim, (GPS - 1.0, GPS + 0.2));
                assert_eq!(fig.title, "LIGO-H1 Strain Data around GW151226");
            }
            other => panic!("expected overlay first, got {}", other.title()),
        }
        assert!(matches!(&renderer.figures[1], Figure::Spectrogram(fig) if fig.title == "LIGO-H1 Strain"));
    }

    #[test]
    fn crop_removes_the_margin_from_both_ends() {
        let config = h1_only();
        let source = SineSource::new();
        let results = Pipeline::new(&config, &FixedCatalog(Some(GPS)), &source, &StubProcessor)
            .run(&mut RecordingRenderer::default())
            .unwrap();

        let expected = 2.0 * config.half_window - 2.0 * config.crop_margin;
        for series in [&results[0].raw, &results[0].filtered] {
            assert_eq!(series.len(), (expected * 4096.0) as usize);
            assert_eq!(series.t0(), GPS.floor() - config.half_window + config.crop_margin);
            assert!((series.span().duration() - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn figures_follow_detector_order() {
        let config = AnalysisConfig::default();
        let mut renderer = RecordingRenderer::default();
        Pipeline::new(&config, &FixedCatalog(Some(GPS)), &SineSource::new(), &StubProcessor)
            .run(&mut renderer)
            .unwrap();

        let order: Vec<Detector> = renderer.figures.iter().map(Figure::detector).collect();
        assert_eq!(order, vec![Detector::H1, Detector::H1, Detector::L1, Detector::L1]);
    }

    #[test]
    fn unknown_event_fails_before_any_fetch() {
        let config = h1_only();
        let source = SineSource::new();
        let mut renderer = RecordingRenderer::default();
        let err = Pipeline::new(&config, &FixedCatalog(None), &source, &StubProcessor)
            .run(&mut renderer)
            .unwrap_err();

        assert!(matches!(err, AnalysisError::UnknownEvent(name) if name == "GW151226"));
        assert_eq!(source.calls.get(), 0);
        assert_eq!(renderer.shown, 0);
    }

    #[test]
    fn unsupported_detector_is_rejected_when_config_is_read() {
        let err = serde_json::from_str::<AnalysisConfig>(r#"{"detectors": ["H1", "K1"]}"#)
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported detector: K1"), "{err}");
    }

    #[test]
    fn mismatched_sample_rate_aborts_the_run() {
        let config = AnalysisConfig::default();
        let source = SineSource {
            rates: vec![(Detector::L1, 16384.0)],
            calls: Cell::new(0),
        };
        let mut renderer = RecordingRenderer::default();
        let err = Pipeline::new(&config, &FixedCatalog(Some(GPS)), &source, &StubProcessor)
            .run(&mut renderer)
            .unwrap_err();

        assert!(matches!(
            err,
            AnalysisError::SampleRateMismatch { ref detector, expected, actual }
                if detector == "L1" && expected == 4096.0 && actual == 16384.0
        ));
        assert!(renderer.figures.is_empty());
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let config = AnalysisConfig {
            detectors: Vec::new(),
            ..AnalysisConfig::default()
        };
        let catalog = FixedCatalog(Some(GPS));
        let source = SineSource::new();
        let err = Pipeline::new(&config, &catalog, &source, &StubProcessor)
            .run(&mut RecordingRenderer::default())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidParameter(_)));
        assert_eq!(source.calls.get(), 0);
    }

    #[test]
    fn renderer_errors_propagate() {
        struct FailingRenderer(usize);
        impl Renderer for FailingRenderer {
            fn overlay(&mut self, _figure: OverlayFigure) -> Result<()> {
                self.0 += 1;
                Err(AnalysisError::Render("no display".into()))
            }
            fn spectrogram(&mut self, _figure: SpectrogramFigure) -> Result<()> {
                Ok(())
            }
            fn show(&mut self) -> Result<()> {
                Ok(())
            }
        }

        let config = h1_only();
        let mut renderer = FailingRenderer(0);
        let err = Pipeline::new(&config, &FixedCatalog(Some(GPS)), &SineSource::new(), &StubProcessor)
            .run(&mut renderer)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Render(_)));
        assert_eq!(renderer.0, 1);
    }
}
