use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::read::GzDecoder;
use reqwest::StatusCode;
use serde::Deserialize;

use super::model::{Detector, Span, TimeSeries};
use crate::config::GwoscConfig;
use crate::error::{AnalysisError, Result};

// ---------------------------------------------------------------------------
// Collaborator interfaces
// ---------------------------------------------------------------------------

/// Maps an event name to its GPS time.
pub trait EventCatalog {
    fn event_gps(&self, name: &str) -> Result<f64>;
}

/// Supplies strain for a detector over `[start, end)` GPS seconds.
pub trait StrainSource {
    fn fetch(&self, detector: Detector, start: f64, end: f64, cache: bool) -> Result<TimeSeries>;
}

// ---------------------------------------------------------------------------
// GWOSC event API
// ---------------------------------------------------------------------------

/// One downloadable strain file as listed by the event API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StrainFile {
    #[serde(rename = "GPSstart")]
    pub gps_start: f64,
    pub detector: String,
    pub duration: f64,
    pub format: String,
    pub sampling_rate: f64,
    pub url: String,
}

impl StrainFile {
    pub fn span(&self) -> Span {
        Span::new(self.gps_start, self.gps_start + self.duration)
    }

    /// Last path segment of the URL, used as the cache file name.
    pub fn file_name(&self) -> &str {
        self.url.rsplit('/').next().unwrap_or(&self.url)
    }
}

#[derive(Debug, Deserialize)]
struct EventResponse {
    #[serde(default)]
    events: BTreeMap<String, EventEntry>,
}

#[derive(Debug, Deserialize)]
struct EventEntry {
    #[serde(rename = "GPS")]
    gps: f64,
    #[serde(default)]
    version: u32,
    #[serde(default)]
    strain: Vec<StrainFile>,
}

/// Extract the GPS time and strain listing of the newest event version.
///
/// Expected shape:
///
/// ```json
/// { "events": { "GW151226-v2": { "GPS": 1135136350.6, "version": 2,
///     "strain": [ { "GPSstart": 1135136334, "detector": "H1", "duration": 32,
///                   "format": "txt", "sampling_rate": 4096, "url": "..." } ] } } }
/// ```
pub fn parse_event_json(name: &str, text: &str) -> Result<(f64, Vec<StrainFile>)> {
    let response: EventResponse = serde_json::from_str(text)
        .map_err(|e| AnalysisError::Parse(format!("event catalog response for {name}: {e}")))?;
    let (key, entry) = response
        .events
        .into_iter()
        .max_by_key(|(_, entry)| entry.version)
        .ok_or_else(|| AnalysisError::UnknownEvent(name.to_string()))?;
    log::debug!("{name} resolved as {key} with {} strain files", entry.strain.len());
    Ok((entry.gps, entry.strain))
}

/// Pick the text-format file that covers `span` for `detector`.
///
/// Files at `sample_rate` are preferred, then the shortest file.
pub fn select_file<'a>(
    files: &'a [StrainFile],
    detector: Detector,
    span: Span,
    sample_rate: f64,
) -> Result<&'a StrainFile> {
    files
        .iter()
        .filter(|f| f.detector == detector.code())
        .filter(|f| f.format.eq_ignore_ascii_case("txt"))
        .filter(|f| f.span().contains(&span))
        .min_by(|a, b| {
            let rate_a = a.sampling_rate != sample_rate;
            let rate_b = b.sampling_rate != sample_rate;
            rate_a
                .cmp(&rate_b)
                .then(a.duration.total_cmp(&b.duration))
        })
        .ok_or_else(|| {
            AnalysisError::DataUnavailable(format!(
                "no {detector} strain file covers {span} ({} files known)",
                files.len()
            ))
        })
}

// ---------------------------------------------------------------------------
// GWOSC ASCII strain format
// ---------------------------------------------------------------------------

/// Gunzip when the payload carries the gzip magic, otherwise read as text.
pub fn decode_payload(bytes: &[u8]) -> Result<String> {
    if bytes.starts_with(&[0x1f, 0x8b]) {
        let mut text = String::new();
        GzDecoder::new(bytes).read_to_string(&mut text)?;
        Ok(text)
    } else {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| AnalysisError::Parse(format!("strain file is not UTF-8: {e}")))
    }
}

/// Parse a GWOSC strain text file.
///
/// Header lines start with `#`; the ones carrying `starting GPS <t>` and
/// `<n> samples per second` override `fallback`'s metadata. Every other
/// non-empty line is one strain sample.
pub fn parse_strain_text(text: &str, fallback: &StrainFile) -> Result<TimeSeries> {
    let mut t0 = fallback.gps_start;
    let mut sample_rate = fallback.sampling_rate;
    let mut samples = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('#') {
            let tokens: Vec<&str> = header.split_whitespace().collect();
            for (i, tok) in tokens.iter().enumerate() {
                if *tok == "GPS" {
                    if let Some(v) = tokens.get(i + 1).and_then(|t| t.parse::<f64>().ok()) {
                        t0 = v;
                    }
                }
                if *tok == "samples" && tokens.get(i + 1) == Some(&"per") {
                    if let Some(v) = i
                        .checked_sub(1)
                        .and_then(|j| tokens[j].parse::<f64>().ok())
                    {
                        sample_rate = v;
                    }
                }
            }
            continue;
        }
        let value = line.parse::<f64>().map_err(|_| {
            AnalysisError::Parse(format!("line {}: '{line}' is not a number", line_no + 1))
        })?;
        samples.push(value);
    }

    if samples.is_empty() {
        return Err(AnalysisError::Parse(format!(
            "{} contains no samples",
            fallback.file_name()
        )));
    }
    TimeSeries::new(t0, sample_rate, samples)
}

// ---------------------------------------------------------------------------
// GwoscClient
// ---------------------------------------------------------------------------

/// Read-only client for the Gravitational Wave Open Science Center.
///
/// Strain files are located through the listings of events resolved with
/// [`EventCatalog::event_gps`].
pub struct GwoscClient {
    config: GwoscConfig,
    http: reqwest::blocking::Client,
    files: RefCell<Vec<StrainFile>>,
}

impl GwoscClient {
    pub fn new(config: GwoscConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(GwoscClient {
            config,
            http,
            files: RefCell::new(Vec::new()),
        })
    }

    /// Add strain files to the set `fetch` chooses from.
    pub fn remember(&self, files: Vec<StrainFile>) {
        let mut known = self.files.borrow_mut();
        for file in files {
            if !known.contains(&file) {
                known.push(file);
            }
        }
    }

    fn cache_path(&self, file: &StrainFile) -> PathBuf {
        self.config.resolved_cache_dir().join(file.file_name())
    }

    fn download(&self, url: &str) -> Result<Vec<u8>> {
        log::info!("Downloading {url}");
        let bytes = self.http.get(url).send()?.error_for_status()?.bytes()?;
        Ok(bytes.to_vec())
    }

    /// File contents, from the cache when allowed and present.
    fn load(&self, file: &StrainFile, cache: bool) -> Result<Vec<u8>> {
        let path = self.cache_path(file);
        if cache && path.is_file() {
            log::info!("Reading cached {}", path.display());
            return Ok(std::fs::read(&path)?);
        }
        let bytes = self.download(&file.url)?;
        if cache {
            write_cache_file(&path, &bytes)?;
            log::debug!("Cached {} bytes at {}", bytes.len(), path.display());
        }
        Ok(bytes)
    }
}

/// Write through a temporary file in the target directory and rename it
/// into place, so an interrupted write never leaves a partial cache entry.
fn write_cache_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

impl EventCatalog for GwoscClient {
    fn event_gps(&self, name: &str) -> Result<f64> {
        let url = format!(
            "{}/eventapi/json/event/{name}/",
            self.config.host.trim_end_matches('/')
        );
        log::info!("Resolving {name} via {url}");
        let response = self.http.get(&url).send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(AnalysisError::UnknownEvent(name.to_string()));
        }
        let text = response.error_for_status()?.text()?;
        let (gps, files) = parse_event_json(name, &text)?;
        self.remember(files);
        Ok(gps)
    }
}

impl StrainSource for GwoscClient {
    fn fetch(&self, detector: Detector, start: f64, end: f64, cache: bool) -> Result<TimeSeries> {
        if !(start < end) {
            return Err(AnalysisError::InvalidParameter(format!(
                "fetch start {start} must precede end {end}"
            )));
        }
        let span = Span::new(start, end);
        let file = select_file(&self.files.borrow(), detector, span, self.config.sample_rate)?.clone();

        let text = decode_payload(&self.load(&file, cache)?)?;
        let series = parse_strain_text(&text, &file)?;
        if !series.span().contains(&span) {
            return Err(AnalysisError::DataUnavailable(format!(
                "{} covers {}, requested {span}",
                file.file_name(),
                series.span()
            )));
        }
        let cropped = series.crop(span)?;
        if cropped.samples().iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::DataUnavailable(format!(
                "{detector} data has gaps inside {span}"
            )));
        }
        log::info!(
            "Fetched {detector} {span}: {} samples at {} Hz",
            cropped.len(),
            cropped.sample_rate()
        );
        Ok(cropped)
    }
}
