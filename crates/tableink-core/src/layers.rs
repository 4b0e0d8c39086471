//! Render layers and their visibility toggles.

use serde::{Deserialize, Serialize};

/// A render layer, in bottom-to-top draw order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Background,
    Grid,
    Lighting,
    Tokens,
    Fog,
    Annotations,
}

impl Layer {
    /// Every layer, bottom first.
    pub const ALL: [Layer; 6] = [
        Layer::Background,
        Layer::Grid,
        Layer::Lighting,
        Layer::Tokens,
        Layer::Fog,
        Layer::Annotations,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Layer::Background => "background",
            Layer::Grid => "grid",
            Layer::Lighting => "lighting",
            Layer::Tokens => "tokens",
            Layer::Fog => "fog",
            Layer::Annotations => "annotations",
        }
    }
}

/// Per-layer visibility. Everything starts visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayerVisibility {
    pub background: bool,
    pub grid: bool,
    pub lighting: bool,
    pub tokens: bool,
    pub fog: bool,
    pub annotations: bool,
}

impl Default for LayerVisibility {
    fn default() -> Self {
        Self {
            background: true,
            grid: true,
            lighting: true,
            tokens: true,
            fog: true,
            annotations: true,
        }
    }
}

impl LayerVisibility {
    fn slot(&mut self, layer: Layer) -> &mut bool {
        match layer {
            Layer::Background => &mut self.background,
            Layer::Grid => &mut self.grid,
            Layer::Lighting => &mut self.lighting,
            Layer::Tokens => &mut self.tokens,
            Layer::Fog => &mut self.fog,
            Layer::Annotations => &mut self.annotations,
        }
    }

    pub fn is_visible(&self, layer: Layer) -> bool {
        match layer {
            Layer::Background => self.background,
            Layer::Grid => self.grid,
            Layer::Lighting => self.lighting,
            Layer::Tokens => self.tokens,
            Layer::Fog => self.fog,
            Layer::Annotations => self.annotations,
        }
    }

    pub fn set(&mut self, layer: Layer, visible: bool) {
        *self.slot(layer) = visible;
    }

    /// Flip a layer; returns its new visibility.
    pub fn toggle(&mut self, layer: Layer) -> bool {
        let slot = self.slot(layer);
        *slot = !*slot;
        *slot
    }

    /// Visible layers in draw order.
    pub fn visible_layers(&self) -> impl Iterator<Item = Layer> + '_ {
        Layer::ALL.into_iter().filter(|l| self.is_visible(*l))
    }
}
