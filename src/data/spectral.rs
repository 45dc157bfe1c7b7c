//! Spectral estimates and whitening.

use std::f64::consts::PI;

use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;

use super::model::TimeSeries;
use crate::config::WhiteningConfig;
use crate::error::{AnalysisError, Result};

/// Periodic Hann window of length `n`.
pub fn hann(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / n as f64).cos()))
        .collect()
}

/// Median of `values` (mean of the two middle values for even lengths).
/// Reorders the slice.
pub fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    }
}

/// Ratio of median to mean for an average of `n` chi-squared (2 dof)
/// periodogram values.
fn median_bias(n: usize) -> f64 {
    let mut bias = 1.0;
    for i in 1..=(n.saturating_sub(1)) / 2 {
        let ii = 2.0 * i as f64;
        bias += 1.0 / (ii + 1.0) - 1.0 / ii;
    }
    bias
}

/// Forward complex FFT of a real signal.
pub fn fft_real(data: &[f64]) -> Vec<Complex64> {
    let mut buffer: Vec<Complex64> = data.iter().map(|&x| Complex64::new(x, 0.0)).collect();
    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(buffer.len()).process(&mut buffer);
    buffer
}

/// Inverse FFT, scaled by `1/n` so that it undoes [`fft_real`].
pub fn ifft(mut buffer: Vec<Complex64>) -> Vec<Complex64> {
    let n = buffer.len();
    if n == 0 {
        return buffer;
    }
    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_inverse(n).process(&mut buffer);
    let scale = 1.0 / n as f64;
    for c in buffer.iter_mut() {
        *c *= scale;
    }
    buffer
}

/// One-sided amplitude spectral density on a uniform frequency grid.
#[derive(Debug, Clone)]
pub struct Asd {
    pub df: f64,
    pub values: Vec<f64>,
}

impl Asd {
    /// Linear interpolation at `freq` Hz, clamped to the grid.
    pub fn at(&self, freq: f64) -> f64 {
        let last = self.values.len() - 1;
        let x = (freq / self.df).max(0.0);
        let i = x.floor() as usize;
        if i >= last {
            return self.values[last];
        }
        let frac = x - i as f64;
        self.values[i] * (1.0 - frac) + self.values[i + 1] * frac
    }
}

/// Welch ASD with a Hann window and median averaging.
///
/// Each segment is mean-detrended before windowing. The median is corrected
/// for its bias relative to the mean.
pub fn welch_asd(data: &[f64], sample_rate: f64, fftlength: f64, overlap: f64) -> Result<Asd> {
    let nfft = (fftlength * sample_rate).round() as usize;
    let noverlap = (overlap * sample_rate).round() as usize;
    if nfft < 2 || noverlap >= nfft {
        return Err(AnalysisError::InvalidParameter(format!(
            "invalid Welch parameters: fftlength {fftlength} s, overlap {overlap} s"
        )));
    }
    if data.len() < nfft {
        return Err(AnalysisError::InvalidParameter(format!(
            "need at least {nfft} samples for a {fftlength} s segment, got {}",
            data.len()
        )));
    }

    let window = hann(nfft);
    let window_power: f64 = window.iter().map(|w| w * w).sum();
    let scale = 1.0 / (sample_rate * window_power);
    let nbins = nfft / 2 + 1;
    let step = nfft - noverlap;

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(nfft);
    let mut periodograms: Vec<Vec<f64>> = vec![Vec::new(); nbins];

    let mut start = 0;
    while start + nfft <= data.len() {
        let segment = &data[start..start + nfft];
        let mean = segment.iter().sum::<f64>() / nfft as f64;
        let mut buffer: Vec<Complex64> = segment
            .iter()
            .zip(&window)
            .map(|(&x, &w)| Complex64::new((x - mean) * w, 0.0))
            .collect();
        fft.process(&mut buffer);

        for (k, bin) in periodograms.iter_mut().enumerate() {
            let mut p = buffer[k].norm_sqr() * scale;
            // one-sided: fold negative frequencies, except DC and Nyquist
            if k != 0 && !(nfft % 2 == 0 && k == nfft / 2) {
                p *= 2.0;
            }
            bin.push(p);
        }
        start += step;
    }

    let nseg = periodograms[0].len();
    let bias = median_bias(nseg);
    log::debug!("Welch ASD: {nseg} segments of {nfft} samples, median bias {bias:.4}");

    let values = periodograms
        .iter_mut()
        .map(|bin| (median(bin) / bias).sqrt())
        .collect();
    Ok(Asd {
        df: sample_rate / nfft as f64,
        values,
    })
}

/// Divide out the noise spectrum so every frequency carries comparable
/// variance. White input comes out with unit variance.
pub fn whiten(series: &TimeSeries, config: &WhiteningConfig) -> Result<TimeSeries> {
    let fs = series.sample_rate();
    let overlap = config.overlap.unwrap_or(config.fftlength / 2.0);
    let asd = welch_asd(series.samples(), fs, config.fftlength, overlap)?;

    let n = series.len();
    let mean = series.samples().iter().sum::<f64>() / n as f64;
    let mut x: Vec<f64> = series.samples().iter().map(|v| v - mean).collect();

    let ntaper = ((config.taper * fs).round() as usize).min(n / 2);
    for i in 0..ntaper {
        let w = 0.5 * (1.0 - (PI * i as f64 / ntaper as f64).cos());
        x[i] *= w;
        x[n - 1 - i] *= w;
    }

    let norm = (2.0 / fs).sqrt();
    let mut spectrum = fft_real(&x);
    for (k, c) in spectrum.iter_mut().enumerate() {
        let kk = k.min(n - k);
        let a = asd.at(kk as f64 * fs / n as f64);
        *c *= if kk == 0 || !(a > 0.0) { 0.0 } else { norm / a };
    }
    let whitened = ifft(spectrum).into_iter().map(|c| c.re).collect();
    series.with_samples(whitened)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Deterministic xoshiro256** generator for synthetic noise.
    pub(crate) struct SimpleRng {
        state: [u64; 4],
    }

    impl SimpleRng {
        pub(crate) fn new(seed: u64) -> Self {
            let mut s = [0u64; 4];
            let mut x = seed;
            for slot in &mut s {
                x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
                *slot = x;
            }
            SimpleRng { state: s }
        }

        fn next_u64(&mut self) -> u64 {
            let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
            let t = self.state[1] << 17;
            self.state[2] ^= self.state[0];
            self.state[3] ^= self.state[1];
            self.state[1] ^= self.state[2];
            self.state[0] ^= self.state[3];
            self.state[2] ^= t;
            self.state[3] = self.state[3].rotate_left(45);
            result
        }

        fn next_f64(&mut self) -> f64 {
            (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
        }

        /// Box-Muller normal sample.
        pub(crate) fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
            let u1 = self.next_f64().max(1e-15);
            let u2 = self.next_f64();
            let z = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
            mean + std_dev * z
        }
    }

    pub(crate) fn white_noise(seed: u64, n: usize, sigma: f64) -> Vec<f64> {
        let mut rng = SimpleRng::new(seed);
        (0..n).map(|_| rng.gauss(0.0, sigma)).collect()
    }

    fn std_dev(x: &[f64]) -> f64 {
        let mean = x.iter().sum::<f64>() / x.len() as f64;
        (x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / x.len() as f64).sqrt()
    }

    #[test]
    fn median_handles_odd_and_even() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
        assert!(median(&mut []).is_nan());
    }

    #[test]
    fn median_bias_approaches_ln2() {
        assert_eq!(median_bias(1), 1.0);
        assert!((median_bias(1001) - std::f64::consts::LN_2).abs() < 1e-3);
    }

    #[test]
    fn welch_recovers_white_noise_level() {
        let fs = 1024.0;
        let sigma = 2.0;
        let data = white_noise(7, 32 * 1024, sigma);
        let asd = welch_asd(&data, fs, 4.0, 2.0).unwrap();
        assert_eq!(asd.values.len(), 4096 / 2 + 1);
        assert_eq!(asd.df, 0.25);
        // one-sided PSD of white noise: 2 sigma^2 / fs
        let expected = (2.0 * sigma * sigma / fs).sqrt();
        let mut mid: Vec<f64> = asd.values[100..1900].to_vec();
        let m = median(&mut mid);
        assert!((m / expected - 1.0).abs() < 0.15, "ASD {m} vs {expected}");
    }

    #[test]
    fn welch_needs_a_full_segment() {
        assert!(welch_asd(&[0.0; 100], 100.0, 4.0, 2.0).is_err());
        assert!(welch_asd(&[0.0; 1000], 100.0, 4.0, 4.0).is_err());
    }

    #[test]
    fn whitened_white_noise_has_unit_variance() {
        let fs = 4096.0;
        let data = white_noise(11, 16 * 4096, 3e-21);
        let series = TimeSeries::new(1000.0, fs, data).unwrap();
        let whitened = whiten(&series, &WhiteningConfig::default()).unwrap();

        assert_eq!(whitened.len(), series.len());
        assert_eq!(whitened.t0(), series.t0());
        let skip = 4096;
        let sd = std_dev(&whitened.samples()[skip..whitened.len() - skip]);
        assert!((0.85..1.15).contains(&sd), "whitened std {sd}");
    }

    #[test]
    fn whitening_flattens_a_coloured_spectrum() {
        let fs = 1024.0;
        // Brown-ish noise: strongly red spectrum.
        let white = white_noise(3, 32 * 1024, 1.0);
        let mut red = Vec::with_capacity(white.len());
        let mut acc = 0.0;
        for w in white {
            acc = 0.99 * acc + w;
            red.push(acc);
        }
        let series = TimeSeries::new(0.0, fs, red).unwrap();
        let whitened = whiten(&series, &WhiteningConfig::default()).unwrap();
        let asd = welch_asd(&whitened.samples()[1024..31 * 1024], fs, 4.0, 2.0).unwrap();
        let band = |lo: f64, hi: f64| {
            let (i0, i1) = ((lo / asd.df) as usize, (hi / asd.df) as usize);
            asd.values[i0..i1].iter().sum::<f64>() / (i1 - i0) as f64
        };
        let low = band(15.0, 30.0);
        let high = band(300.0, 450.0);
        assert!((low / high - 1.0).abs() < 0.3, "low {low} high {high}");
    }

    #[test]
    fn fft_roundtrip_restores_signal() {
        let x: Vec<f64> = (0..37).map(|i| (i as f64 * 0.3).cos()).collect();
        let back = ifft(fft_real(&x));
        for (a, b) in x.iter().zip(back) {
            assert!((a - b.re).abs() < 1e-12);
        }
    }
}
