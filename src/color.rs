use eframe::egui::Color32;
use palette::{LinSrgb, Mix, Srgb};

use crate::data::model::Detector;

// ---------------------------------------------------------------------------
// Detector colours
// ---------------------------------------------------------------------------

/// Conventional per-observatory colours (GWpy palette).
pub fn detector_color(detector: Detector) -> Color32 {
    match detector {
        Detector::H1 => Color32::from_rgb(0xee, 0x00, 0x00),
        Detector::L1 => Color32::from_rgb(0x4b, 0xa6, 0xff),
        Detector::V1 => Color32::from_rgb(0x9b, 0x59, 0xb6),
    }
}

// ---------------------------------------------------------------------------
// Energy colour map: normalized energy → Color32
// ---------------------------------------------------------------------------

/// Viridis anchor colours, low to high.
const VIRIDIS: [(u8, u8, u8); 5] = [
    (0x44, 0x01, 0x54),
    (0x3b, 0x52, 0x8b),
    (0x21, 0x91, 0x8c),
    (0x5e, 0xc9, 0x62),
    (0xfd, 0xe7, 0x25),
];

/// Maps normalized Q-transform energy onto a perceptually ordered gradient.
#[derive(Debug, Clone)]
pub struct EnergyColorMap {
    stops: Vec<LinSrgb>,
    pub vmin: f64,
    pub vmax: f64,
}

impl EnergyColorMap {
    pub fn new(vmin: f64, vmax: f64) -> Self {
        let stops = VIRIDIS
            .iter()
            .map(|&(r, g, b)| Srgb::new(r, g, b).into_format::<f32>().into_linear())
            .collect();
        EnergyColorMap { stops, vmin, vmax }
    }

    /// Colour for `value`, clamped to `[vmin, vmax]`.
    pub fn color_for(&self, value: f64) -> Color32 {
        let span = self.vmax - self.vmin;
        let t = if span > 0.0 {
            ((value - self.vmin) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let x = t as f32 * (self.stops.len() - 1) as f32;
        let i = (x.floor() as usize).min(self.stops.len() - 2);
        let mixed = self.stops[i].mix(self.stops[i + 1], x - i as f32);
        let rgb: Srgb<u8> = Srgb::<f32>::from_linear(mixed).into_format();
        Color32::from_rgb(rgb.red, rgb.green, rgb.blue)
    }

    /// `n` evenly spaced (value, colour) pairs for a colour bar.
    pub fn legend_entries(&self, n: usize) -> Vec<(f64, Color32)> {
        if n < 2 {
            return vec![(self.vmin, self.color_for(self.vmin))];
        }
        (0..n)
            .map(|i| {
                let v = self.vmin + (self.vmax - self.vmin) * i as f64 / (n - 1) as f64;
                (v, self.color_for(v))
            })
            .collect()
    }
}
