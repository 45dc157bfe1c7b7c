use std::collections::HashMap;

use eframe::egui::TextureHandle;

use crate::color::EnergyColorMap;
use crate::render::Figure;

// ---------------------------------------------------------------------------
// Viewer state
// ---------------------------------------------------------------------------

/// Everything the viewer shows, independent of rendering.
pub struct ViewerState {
    /// Figures in the order the pipeline produced them.
    pub figures: Vec<Figure>,

    /// Index of the figure on screen.
    pub selected: usize,

    /// Snap the plot bounds back to the figure's limits on the next frame.
    pub reset_view: bool,

    /// Show the info side panel.
    pub show_info: bool,

    /// Spectrogram textures, uploaded on first display.
    pub textures: HashMap<usize, TextureHandle>,

    /// Colour bar gradient shared by all spectrograms.
    pub colorbar: Option<TextureHandle>,
}

impl ViewerState {
    pub fn new(figures: Vec<Figure>) -> Self {
        Self {
            figures,
            selected: 0,
            reset_view: true,
            show_info: true,
            textures: HashMap::new(),
            colorbar: None,
        }
    }

    pub fn current(&self) -> Option<&Figure> {
        self.figures.get(self.selected)
    }

    /// Switch tabs. Out-of-range indices are ignored.
    pub fn select(&mut self, index: usize) {
        if index < self.figures.len() && index != self.selected {
            self.selected = index;
            self.reset_view = true;
        }
    }

    pub fn select_next(&mut self) {
        if !self.figures.is_empty() {
            self.select((self.selected + 1) % self.figures.len());
        }
    }

    pub fn select_previous(&mut self) {
        if !self.figures.is_empty() {
            let n = self.figures.len();
            self.select((self.selected + n - 1) % n);
        }
    }

    /// Colour map for the spectrogram at `index`, if it is one.
    pub fn color_map(&self, index: usize) -> Option<EnergyColorMap> {
        match self.figures.get(index)? {
            Figure::Spectrogram(fig) => {
                Some(EnergyColorMap::new(fig.energy_range.0, fig.energy_range.1))
            }
            Figure::Overlay(_) => None,
        }
    }
}
