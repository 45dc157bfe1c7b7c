use std::f64::consts::PI;

use rustfft::num_complex::Complex64;

use crate::config::FilterConfig;
use crate::error::{AnalysisError, Result};

// ---------------------------------------------------------------------------
// Second-order sections
// ---------------------------------------------------------------------------

/// Biquad coefficients, normalised so that `a0 == 1`:
/// `H(z) = (b0 + b1 z^-1 + b2 z^-2) / (1 + a1 z^-1 + a2 z^-2)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoeffs {
    /// Complex gain at normalised angular frequency `w` (rad/sample).
    pub fn response(&self, w: f64) -> Complex64 {
        let z1 = Complex64::from_polar(1.0, -w);
        let z2 = z1 * z1;
        let num = self.b0 + z1 * self.b1 + z2 * self.b2;
        let den = 1.0 + z1 * self.a1 + z2 * self.a2;
        num / den
    }

    fn is_first_order(&self) -> bool {
        self.b2 == 0.0 && self.a2 == 0.0
    }
}

/// Direct Form II Transposed state of one section.
#[derive(Debug, Clone, Default)]
struct BiquadState {
    z1: f64,
    z2: f64,
}

impl BiquadState {
    #[inline]
    fn process(&mut self, c: &BiquadCoeffs, input: f64) -> f64 {
        let output = c.b0 * input + self.z1;
        self.z1 = c.b1 * input - c.a1 * output + self.z2;
        self.z2 = c.b2 * input - c.a2 * output;
        output
    }
}

// ---------------------------------------------------------------------------
// Designers
// ---------------------------------------------------------------------------

/// Prewarped analog frequency for the bilinear transform.
fn prewarp(freq: f64, sample_rate: f64) -> f64 {
    (PI * freq / sample_rate).tan()
}

fn check_below_nyquist(what: &str, freq: f64, sample_rate: f64) -> Result<()> {
    let nyquist = sample_rate / 2.0;
    if !(freq > 0.0) || freq >= nyquist {
        return Err(AnalysisError::InvalidParameter(format!(
            "{what} ({freq} Hz) must lie in (0, {nyquist}) Hz for sample rate {sample_rate} Hz"
        )));
    }
    Ok(())
}

/// Damping of the k-th conjugate pole pair of an order-`order` Butterworth
/// prototype.
fn butterworth_damping(k: usize, order: usize) -> f64 {
    (PI * (2 * k + 1) as f64 / (2 * order) as f64).sin()
}

#[derive(Clone, Copy)]
enum Pass {
    Low,
    High,
}

fn butterworth(pass: Pass, cutoff: f64, sample_rate: f64, order: usize) -> Result<Vec<BiquadCoeffs>> {
    if order == 0 {
        return Err(AnalysisError::InvalidParameter(
            "Butterworth order must be at least 1".into(),
        ));
    }
    check_below_nyquist("Butterworth cutoff", cutoff, sample_rate)?;

    let wc = prewarp(cutoff, sample_rate);
    let wc2 = wc * wc;
    let mut sections = Vec::with_capacity((order + 1) / 2);

    for k in 0..order / 2 {
        let zeta = butterworth_damping(k, order);
        let a0 = 1.0 + 2.0 * zeta * wc + wc2;
        let a1 = 2.0 * (wc2 - 1.0) / a0;
        let a2 = (1.0 - 2.0 * zeta * wc + wc2) / a0;
        let (b0, b1, b2) = match pass {
            Pass::Low => (wc2 / a0, 2.0 * wc2 / a0, wc2 / a0),
            Pass::High => (1.0 / a0, -2.0 / a0, 1.0 / a0),
        };
        sections.push(BiquadCoeffs { b0, b1, b2, a1, a2 });
    }

    // Odd orders keep a real pole: one first-order section.
    if order % 2 == 1 {
        let a1 = (wc - 1.0) / (wc + 1.0);
        let (b0, b1) = match pass {
            Pass::Low => (wc / (1.0 + wc), wc / (1.0 + wc)),
            Pass::High => (1.0 / (1.0 + wc), -1.0 / (1.0 + wc)),
        };
        sections.push(BiquadCoeffs {
            b0,
            b1,
            b2: 0.0,
            a1,
            a2: 0.0,
        });
    }

    Ok(sections)
}

/// Butterworth low-pass sections.
pub fn butterworth_lowpass(cutoff: f64, sample_rate: f64, order: usize) -> Result<Vec<BiquadCoeffs>> {
    butterworth(Pass::Low, cutoff, sample_rate, order)
}

/// Butterworth high-pass sections.
pub fn butterworth_highpass(cutoff: f64, sample_rate: f64, order: usize) -> Result<Vec<BiquadCoeffs>> {
    butterworth(Pass::High, cutoff, sample_rate, order)
}

/// Notch biquad with zeros on the unit circle at `center`.
///
/// `q` is centre frequency over -3 dB bandwidth.
pub fn notch(center: f64, sample_rate: f64, q: f64) -> Result<BiquadCoeffs> {
    check_below_nyquist("notch frequency", center, sample_rate)?;
    if !(q > 0.0) {
        return Err(AnalysisError::InvalidParameter(format!(
            "notch quality factor must be positive, got {q}"
        )));
    }
    let w0 = 2.0 * PI * center / sample_rate;
    let cos_w0 = w0.cos();
    let alpha = w0.sin() / (2.0 * q);
    let a0 = 1.0 + alpha;
    Ok(BiquadCoeffs {
        b0: 1.0 / a0,
        b1: -2.0 * cos_w0 / a0,
        b2: 1.0 / a0,
        a1: -2.0 * cos_w0 / a0,
        a2: (1.0 - alpha) / a0,
    })
}

// ---------------------------------------------------------------------------
// FilterDesign – the combined descriptor
// ---------------------------------------------------------------------------

/// A cascade of second-order sections designed for one sample rate.
///
/// Built once per run and shared by every detector.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterDesign {
    sections: Vec<BiquadCoeffs>,
    sample_rate: f64,
}

impl FilterDesign {
    /// Bandpass followed by one notch per configured frequency.
    pub fn new(config: &FilterConfig, sample_rate: f64) -> Result<Self> {
        let bandpass = Self::bandpass_only(
            config.bandpass_low,
            config.bandpass_high,
            config.order,
            sample_rate,
        )?;
        let notches = config
            .notches
            .iter()
            .map(|&f| notch(f, sample_rate, config.notch_q))
            .collect::<Result<Vec<_>>>()?;

        let mut sections = bandpass.sections;
        sections.extend(notches);
        let design = FilterDesign {
            sections,
            sample_rate,
        };
        log::debug!(
            "designed {} sections at {sample_rate} Hz: bandpass {}-{} Hz, notches {:?}",
            design.sections.len(),
            config.bandpass_low,
            config.bandpass_high,
            config.notches
        );
        for f in [config.bandpass_low, config.bandpass_high]
            .iter()
            .chain(&config.notches)
        {
            log::debug!("  |H({f} Hz)| = {:.3e}", design.magnitude(*f));
        }
        Ok(design)
    }

    /// High-pass at `low` cascaded with low-pass at `high`.
    pub fn bandpass_only(low: f64, high: f64, order: usize, sample_rate: f64) -> Result<Self> {
        if !(sample_rate > 0.0) {
            return Err(AnalysisError::InvalidParameter(format!(
                "sample rate must be positive, got {sample_rate}"
            )));
        }
        if !(low < high) {
            return Err(AnalysisError::InvalidParameter(format!(
                "bandpass low cutoff ({low} Hz) must be below high cutoff ({high} Hz)"
            )));
        }
        let mut sections = butterworth_highpass(low, sample_rate, order)?;
        sections.extend(butterworth_lowpass(high, sample_rate, order)?);
        Ok(FilterDesign {
            sections,
            sample_rate,
        })
    }

    pub fn sections(&self) -> &[BiquadCoeffs] {
        &self.sections
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Magnitude of the single-pass frequency response at `freq` Hz.
    pub fn magnitude(&self, freq: f64) -> f64 {
        let w = 2.0 * PI * freq / self.sample_rate;
        self.sections
            .iter()
            .map(|s| s.response(w))
            .fold(Complex64::new(1.0, 0.0), |acc, h| acc * h)
            .norm()
    }

    /// Causal, single-pass filtering from zero initial state.
    pub fn apply(&self, signal: &[f64]) -> Vec<f64> {
        let mut out = signal.to_vec();
        for coeffs in &self.sections {
            let mut state = BiquadState::default();
            for sample in out.iter_mut() {
                *sample = state.process(coeffs, *sample);
            }
        }
        out
    }

    /// Number of samples of odd-extension padding used by [`filtfilt`](Self::filtfilt).
    fn pad_len(&self, len: usize) -> usize {
        let first_order = self.sections.iter().filter(|s| s.is_first_order()).count();
        let taps = 2 * self.sections.len() + 1 - first_order;
        (3 * taps).min(len.saturating_sub(1))
    }

    /// Zero-phase filtering: forward pass, then a pass over the reversed
    /// output. The result has the same length as `signal`.
    pub fn filtfilt(&self, signal: &[f64]) -> Vec<f64> {
        let n = signal.len();
        if n < 2 {
            return signal.to_vec();
        }
        let pad = self.pad_len(n);

        // Odd extension about the end points.
        let mut extended = Vec::with_capacity(n + 2 * pad);
        extended.extend((1..=pad).rev().map(|i| 2.0 * signal[0] - signal[i]));
        extended.extend_from_slice(signal);
        extended.extend((1..=pad).map(|i| 2.0 * signal[n - 1] - signal[n - 1 - i]));

        let mut forward = self.apply(&extended);
        forward.reverse();
        let mut backward = self.apply(&forward);
        backward.reverse();

        backward[pad..pad + n].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: f64 = 4096.0;

    fn sine(freq: f64, seconds: f64) -> Vec<f64> {
        let n = (seconds * FS) as usize;
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / FS).sin())
            .collect()
    }

    /// RMS of the central part, away from edge transients.
    fn central_rms(x: &[f64]) -> f64 {
        let skip = (2.0 * FS) as usize;
        let mid = &x[skip..x.len() - skip];
        (mid.iter().map(|v| v * v).sum::<f64>() / mid.len() as f64).sqrt()
    }

    fn gain(design: &FilterDesign, freq: f64) -> f64 {
        let input = sine(freq, 8.0);
        let output = design.filtfilt(&input);
        central_rms(&output) / central_rms(&input)
    }

    #[test]
    fn combined_design_rejects_notches_and_out_of_band() {
        let design = FilterDesign::new(&FilterConfig::default(), FS).unwrap();
        for f in [60.0, 120.0, 180.0] {
            let g = gain(&design, f);
            assert!(g < 0.05, "{f} Hz should be notched, gain {g}");
        }
        for f in [10.0, 20.0, 1000.0, 1500.0] {
            let g = gain(&design, f);
            assert!(g < 0.05, "{f} Hz is out of band, gain {g}");
        }
    }

    #[test]
    fn combined_design_passes_in_band() {
        let design = FilterDesign::new(&FilterConfig::default(), FS).unwrap();
        for f in [90.0, 100.0, 150.0, 250.0, 300.0] {
            let g = gain(&design, f);
            assert!((0.9..1.1).contains(&g), "{f} Hz should pass, gain {g}");
        }
    }

    #[test]
    fn magnitude_matches_design_intent() {
        let design = FilterDesign::new(&FilterConfig::default(), FS).unwrap();
        assert!(design.magnitude(60.0) < 1e-6);
        assert!((design.magnitude(250.0) - 1.0).abs() < 0.02);
        // -3 dB at the Butterworth corners (notches are far enough away)
        let corner = FilterDesign::bandpass_only(40.0, 500.0, 4, FS).unwrap();
        assert!((corner.magnitude(500.0) - 0.5f64.sqrt()).abs() < 0.02);
        assert!((corner.magnitude(40.0) - 0.5f64.sqrt()).abs() < 0.02);
    }

    #[test]
    fn section_count() {
        let design = FilterDesign::new(&FilterConfig::default(), FS).unwrap();
        // 2 high-pass + 2 low-pass biquads for order 4, plus 3 notches
        assert_eq!(design.sections().len(), 7);
        let odd = FilterDesign::bandpass_only(40.0, 500.0, 3, FS).unwrap();
        assert_eq!(odd.sections().len(), 4);
    }

    #[test]
    fn filtfilt_preserves_length() {
        let design = FilterDesign::new(&FilterConfig::default(), FS).unwrap();
        for n in [1, 2, 5, 100, 4096] {
            let x: Vec<f64> = (0..n).map(|i| (i as f64 * 0.1).sin()).collect();
            assert_eq!(design.filtfilt(&x).len(), n);
        }
    }

    #[test]
    fn filtfilt_has_no_phase_shift() {
        let design = FilterDesign::bandpass_only(40.0, 500.0, 4, FS).unwrap();
        let input = sine(100.0, 4.0);
        let output = design.filtfilt(&input);
        // zero-phase: output stays in phase with the input in the middle
        let mid = input.len() / 2;
        let corr: f64 = (mid..mid + 4096).map(|i| input[i] * output[i]).sum();
        let norm: f64 = (mid..mid + 4096).map(|i| input[i] * input[i]).sum();
        assert!(corr / norm > 0.95);
    }

    #[test]
    fn rejects_cutoffs_at_or_above_nyquist() {
        let mut config = FilterConfig::default();
        config.bandpass_high = 2048.0;
        assert!(matches!(
            FilterDesign::new(&config, FS),
            Err(AnalysisError::InvalidParameter(_))
        ));

        let mut config = FilterConfig::default();
        config.notches = vec![3000.0];
        assert!(FilterDesign::new(&config, FS).is_err());

        assert!(FilterDesign::bandpass_only(500.0, 40.0, 4, FS).is_err());
        assert!(FilterDesign::bandpass_only(40.0, 500.0, 0, FS).is_err());
        assert!(notch(60.0, FS, 0.0).is_err());
    }
}
