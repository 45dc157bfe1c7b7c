/// Data layer: strain access, filtering and time-frequency analysis.
///
/// Architecture:
/// ```text
///   GWOSC event API / strain files
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  event → GPS, span → TimeSeries (cached)
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ spectral  │  Welch ASD, whitening
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  bandpass + notches, zero-phase
///   └──────────┘
///        │
///        ▼
///   ┌────────────┐
///   │ qtransform │  constant-Q energy map
///   └────────────┘
/// ```

pub mod filter;
pub mod loader;
pub mod model;
pub mod qtransform;
pub mod spectral;
