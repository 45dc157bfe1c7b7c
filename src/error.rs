use thiserror::Error;

/// Everything that can abort an analysis run.
///
/// The pipeline is fail-fast: the first error stops the run, there are no
/// retries and no per-detector isolation.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Strain data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Unsupported detector: {0}")]
    UnsupportedDetector(String),

    #[error("Rendering failed: {0}")]
    Render(String),

    #[error("Sample rate mismatch for {detector}: expected {expected} Hz, got {actual} Hz")]
    SampleRateMismatch {
        detector: String,
        expected: f64,
        actual: f64,
    },
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
