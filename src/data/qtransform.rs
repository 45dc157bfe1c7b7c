//! Constant-Q time-frequency transform.
//!
//! The tiling follows the Q-pipeline scheme used by GWpy: Q planes are
//! log-spaced over the Q range, each plane holds log-spaced frequency rows,
//! and each row is an inverse FFT of a bi-square windowed slice of the
//! one-sided spectrum. Row energies are normalised by their median, then the
//! plane with the loudest tile inside the output segment is interpolated onto
//! a regular time / log-frequency grid.

use rustfft::num_complex::Complex64;

use super::model::{Span, TimeSeries};
use super::spectral::{fft_real, ifft, median};
use crate::config::QScanConfig;
use crate::error::{AnalysisError, Result};

/// Parameters of one transform.
#[derive(Debug, Clone)]
pub struct QParams {
    pub frange: (f64, f64),
    pub qrange: (f64, f64),
    pub mismatch: f64,
    /// Absolute GPS window of the output grid.
    pub outseg: Span,
    pub n_times: usize,
    pub n_frequencies: usize,
}

impl QParams {
    /// Parameters for a scan whose output window is placed relative to `epoch`.
    pub fn from_config(config: &QScanConfig, epoch: f64) -> Self {
        QParams {
            frange: config.frange,
            qrange: config.qrange,
            mismatch: config.mismatch,
            outseg: Span::new(epoch + config.outseg.0, epoch + config.outseg.1),
            n_times: config.n_times,
            n_frequencies: config.n_frequencies,
        }
    }
}

/// Loudest cell of a [`QGram`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QPeak {
    pub time: f64,
    pub frequency: f64,
    pub energy: f64,
}

/// Normalised energy on a regular grid.
///
/// `energy` is row-major: one row per frequency, `times.len()` columns.
#[derive(Debug, Clone)]
pub struct QGram {
    pub q: f64,
    pub times: Vec<f64>,
    pub frequencies: Vec<f64>,
    pub energy: Vec<f64>,
    pub peak: QPeak,
}

impl QGram {
    pub fn energy_at(&self, freq_index: usize, time_index: usize) -> f64 {
        self.energy[freq_index * self.times.len() + time_index]
    }
}

// ---------------------------------------------------------------------------
// Tiling
// ---------------------------------------------------------------------------

fn mismatch_step(mismatch: f64) -> f64 {
    2.0 * (mismatch / 3.0).sqrt()
}

/// Q values of the planes covering `qrange`.
fn q_planes(qrange: (f64, f64), deltam: f64) -> Vec<f64> {
    let cumum = (qrange.1 / qrange.0).ln() / 2f64.sqrt();
    let nplanes = ((cumum / deltam).ceil() as usize).max(1);
    let dq = cumum / nplanes as f64;
    (0..nplanes)
        .map(|i| qrange.0 * (2f64.sqrt() * dq * (i as f64 + 0.5)).exp())
        .collect()
}

/// Row frequencies of one plane, snapped down to multiples of `1/duration`.
fn plane_frequencies(q: f64, frange: (f64, f64), duration: f64, deltam: f64) -> Vec<f64> {
    let (minf, maxf) = frange;
    let qterm = (2.0 + q * q).sqrt();
    let fcum = (maxf / minf).ln() * qterm / 2.0;
    let nfreq = ((fcum / deltam).ceil() as usize).max(1);
    let fstep = fcum / nfreq as f64;
    let fstepmin = 1.0 / duration;
    let mut out: Vec<f64> = (0..nfreq)
        .map(|i| {
            let f = minf * (2.0 / qterm * (i as f64 + 0.5) * fstep).exp();
            (f / fstepmin).floor() * fstepmin
        })
        .collect();
    out.dedup();
    out
}

/// Highest frequency a plane of quality `qmin` can resolve.
fn max_frequency(sample_rate: f64, qmin: f64) -> f64 {
    sample_rate / 2.0 / (1.0 + 11f64.sqrt() / qmin)
}

/// One frequency row of a plane.
struct Row {
    frequency: f64,
    /// Median-normalised energy, `ntiles` samples spanning the whole series.
    energy: Vec<f64>,
}

impl Row {
    fn value_at(&self, t: f64, t0: f64, duration: f64) -> f64 {
        let n = self.energy.len();
        let x = ((t - t0) / duration * n as f64).max(0.0);
        let i = x.floor() as usize;
        if i + 1 >= n {
            return self.energy[n - 1];
        }
        let frac = x - i as f64;
        self.energy[i] * (1.0 - frac) + self.energy[i + 1] * frac
    }
}

fn transform_row(
    spectrum: &[Complex64],
    q: f64,
    frequency: f64,
    duration: f64,
    sample_rate: f64,
    deltam: f64,
) -> Row {
    let qprime = q / 11f64.sqrt();
    let tcum = duration * 2.0 * std::f64::consts::PI * frequency / q;
    let ntiles = 2usize.pow((tcum / deltam).log2().ceil().max(0.0) as u32);
    let half = (frequency / qprime * duration).floor() as i64;
    let windowsize = (2 * half + 1) as usize;
    let norm = ntiles as f64 / (duration * sample_rate)
        * (315.0 * qprime / (128.0 * frequency)).sqrt();

    let windowed: Vec<Complex64> = (-half..=half)
        .map(|k| {
            let x = (k as f64 / duration) * qprime / frequency;
            let w = (1.0 - x * x).powi(2) * norm;
            let idx = (k as f64 + 1.0 + frequency * duration).round() as i64;
            if idx >= 0 && (idx as usize) < spectrum.len() {
                spectrum[idx as usize] * w
            } else {
                Complex64::new(0.0, 0.0)
            }
        })
        .collect();

    // zero-pad to ntiles, then move negative frequencies to the end
    let size = ntiles.max(windowsize);
    let left = (size - windowsize) / 2;
    let mut padded = vec![Complex64::new(0.0, 0.0); size];
    padded[left..left + windowsize].copy_from_slice(&windowed);
    padded.rotate_left(size / 2);

    let mut energy: Vec<f64> = ifft(padded).iter().map(|c| c.norm_sqr()).collect();
    let mut scratch = energy.clone();
    let med = median(&mut scratch);
    if med > 0.0 {
        for e in energy.iter_mut() {
            *e /= med;
        }
    }
    Row { frequency, energy }
}

// ---------------------------------------------------------------------------
// Transform
// ---------------------------------------------------------------------------

/// Compute the Q-transform of `series` and interpolate the loudest plane onto
/// the output grid described by `params`.
pub fn q_transform(series: &TimeSeries, params: &QParams) -> Result<QGram> {
    let span = series.span();
    if series.len() < 2 {
        return Err(AnalysisError::InvalidParameter(
            "Q-transform needs at least two samples".into(),
        ));
    }
    if !span.contains(&params.outseg) || params.outseg.duration() <= 0.0 {
        return Err(AnalysisError::InvalidParameter(format!(
            "output segment {} is not inside the data {span}",
            params.outseg
        )));
    }
    let (qmin, qmax) = params.qrange;
    if !(qmin > 0.0 && qmin < qmax) {
        return Err(AnalysisError::InvalidParameter(format!(
            "invalid Q range ({qmin}, {qmax})"
        )));
    }
    if params.n_times < 2 || params.n_frequencies < 2 {
        return Err(AnalysisError::InvalidParameter(
            "output grid needs at least 2x2 cells".into(),
        ));
    }

    let fs = series.sample_rate();
    let duration = span.duration();
    let deltam = mismatch_step(params.mismatch);
    let qs = q_planes(params.qrange, deltam);

    let maxf = max_frequency(fs, qs.iter().cloned().fold(f64::INFINITY, f64::min));
    let mut frange = params.frange;
    if frange.1 > maxf {
        log::warn!(
            "upper frequency {} Hz too high for Q range {:?}, truncating to {maxf:.1} Hz",
            frange.1,
            params.qrange
        );
        frange.1 = maxf;
    }
    if !(frange.0 > 0.0 && frange.0 < frange.1) {
        return Err(AnalysisError::InvalidParameter(format!(
            "invalid frequency range ({}, {})",
            frange.0, frange.1
        )));
    }
    if frange.0 * duration < 1.0 {
        return Err(AnalysisError::InvalidParameter(format!(
            "lowest frequency {} Hz is below the {:.3} Hz resolution of {duration} s of data",
            frange.0,
            1.0 / duration
        )));
    }

    // one-sided spectrum, normalised like a DFT amplitude estimate
    let n = series.len();
    let mut spectrum = fft_real(series.samples());
    spectrum.truncate(n / 2 + 1);
    for (k, c) in spectrum.iter_mut().enumerate() {
        *c /= n as f64;
        if k > 0 {
            *c *= 2.0;
        }
    }

    let t0 = span.start;
    let out = params.outseg;
    let mut best: Option<(f64, f64, Vec<Row>)> = None;
    for &q in &qs {
        let rows: Vec<Row> = plane_frequencies(q, frange, duration, deltam)
            .into_iter()
            .map(|f| transform_row(&spectrum, q, f, duration, fs, deltam))
            .collect();

        let loudest = rows
            .iter()
            .flat_map(|row| {
                let len = row.energy.len();
                row.energy.iter().enumerate().filter_map(move |(j, &e)| {
                    let t = t0 + j as f64 * duration / len as f64;
                    (t >= out.start && t <= out.end).then_some(e)
                })
            })
            .fold(0.0, f64::max);
        log::debug!("Q plane q={q:.2}: {} rows, peak energy {loudest:.2}", rows.len());

        if best.as_ref().map_or(true, |(_, e, _)| loudest > *e) {
            best = Some((q, loudest, rows));
        }
    }
    let (q, _, rows) = best.ok_or_else(|| {
        AnalysisError::InvalidParameter("Q tiling produced no planes".into())
    })?;

    // regular output grid
    let times: Vec<f64> = (0..params.n_times)
        .map(|i| out.start + out.duration() * i as f64 / (params.n_times - 1) as f64)
        .collect();
    let (lf0, lf1) = (frange.0.ln(), frange.1.ln());
    let frequencies: Vec<f64> = (0..params.n_frequencies)
        .map(|i| (lf0 + (lf1 - lf0) * i as f64 / (params.n_frequencies - 1) as f64).exp())
        .collect();

    // interpolate each row in time first
    let resampled: Vec<Vec<f64>> = rows
        .iter()
        .map(|row| times.iter().map(|&t| row.value_at(t, t0, duration)).collect())
        .collect();
    let row_logf: Vec<f64> = rows.iter().map(|r| r.frequency.ln()).collect();

    let mut energy = Vec::with_capacity(times.len() * frequencies.len());
    let mut peak = QPeak {
        time: times[0],
        frequency: frequencies[0],
        energy: f64::NEG_INFINITY,
    };
    for &f in &frequencies {
        let lf = f.ln();
        let upper = row_logf.partition_point(|&x| x < lf);
        let (lo, hi, frac) = if upper == 0 {
            (0, 0, 0.0)
        } else if upper >= rows.len() {
            (rows.len() - 1, rows.len() - 1, 0.0)
        } else {
            let (a, b) = (row_logf[upper - 1], row_logf[upper]);
            (upper - 1, upper, (lf - a) / (b - a))
        };
        for (ti, &t) in times.iter().enumerate() {
            let e = resampled[lo][ti] * (1.0 - frac) + resampled[hi][ti] * frac;
            if e > peak.energy {
                peak = QPeak {
                    time: t,
                    frequency: f,
                    energy: e,
                };
            }
            energy.push(e);
        }
    }

    log::info!(
        "Q-transform: q={q:.1}, peak {:.1} at {:.3} s, {:.1} Hz",
        peak.energy,
        peak.time,
        peak.frequency
    );
    Ok(QGram {
        q,
        times,
        frequencies,
        energy,
        peak,
    })
}
