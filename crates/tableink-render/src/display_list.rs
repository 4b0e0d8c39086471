//! Backend-neutral draw commands, grouped by layer.
//!
//! All geometry is in screen space: the compositor has already applied the
//! viewport transform and the device scale factor.

use kurbo::{BezPath, Point, Rect};
use peniko::Color;
use std::ops::Range;
use tableink_core::layers::Layer;

/// How a command combines with what is already drawn in its layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Blend {
    #[default]
    Over,
    /// Remove coverage; used to cut lights out of the darkness.
    Erase,
    /// Add colour; used for light glows.
    Add,
}

/// A single drawing operation.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Fill {
        path: BezPath,
        color: Color,
        blend: Blend,
    },
    Stroke {
        path: BezPath,
        color: Color,
        width: f64,
        /// Dash pattern in screen pixels; `None` for a solid line.
        dash: Option<[f64; 2]>,
    },
    /// Circle whose colour runs from `inner` at the center to `outer` at the rim.
    RadialFill {
        center: Point,
        radius: f64,
        inner: Color,
        outer: Color,
        blend: Blend,
    },
    Image {
        source: String,
        rect: Rect,
    },
    Label {
        text: String,
        position: Point,
        size: f64,
        color: Color,
    },
}

/// A frame's worth of commands, in draw order.
#[derive(Debug, Clone, Default)]
pub struct DisplayList {
    commands: Vec<DrawCommand>,
    layers: Vec<(Layer, Range<usize>)>,
    open: Option<(Layer, usize)>,
    background: Option<Color>,
}

impl DisplayList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
        self.layers.clear();
        self.open = None;
        self.background = None;
    }

    /// Colour to clear the surface with.
    pub fn background(&self) -> Option<Color> {
        self.background
    }

    pub fn set_background(&mut self, color: Color) {
        self.background = Some(color);
    }

    /// Start collecting commands for `layer`, closing any open layer.
    pub fn begin_layer(&mut self, layer: Layer) {
        self.end_layer();
        self.open = Some((layer, self.commands.len()));
    }

    pub fn end_layer(&mut self) {
        if let Some((layer, start)) = self.open.take() {
            self.layers.push((layer, start..self.commands.len()));
        }
    }

    pub fn push(&mut self, command: DrawCommand) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Layers drawn this frame, bottom first.
    pub fn layers(&self) -> Vec<Layer> {
        self.layers.iter().map(|(layer, _)| *layer).collect()
    }

    /// Commands belonging to one layer; empty when it was not drawn.
    pub fn layer_commands(&self, layer: Layer) -> &[DrawCommand] {
        self.layers
            .iter()
            .find(|(l, _)| *l == layer)
            .map(|(_, range)| &self.commands[range.clone()])
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
