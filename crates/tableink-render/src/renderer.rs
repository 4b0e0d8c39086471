//! Renderer trait and per-frame context.

use kurbo::Size;
use peniko::Color;
use tableink_core::session::TableSession;
use thiserror::Error;

/// Renderer errors.
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("Invalid viewport: {0}")]
    InvalidViewport(String),
}

pub type RenderResult<T> = Result<T, RendererError>;

/// Everything needed to draw one frame of a session.
pub struct RenderContext<'a> {
    /// The session whose view is drawn.
    pub session: &'a TableSession,
    /// Surface size in physical pixels.
    pub viewport_size: Size,
    /// Physical pixels per logical pixel.
    pub scale_factor: f64,
    /// Color behind the map.
    pub background_color: Color,
    /// Fog colour used when lighting is off.
    pub fog_color: Color,
    /// Fog opacity for the DM, who sees through it.
    pub dm_fog_opacity: f64,
    /// Draw token names.
    pub show_labels: bool,
}

impl<'a> RenderContext<'a> {
    pub fn new(session: &'a TableSession, viewport_size: Size) -> Self {
        Self {
            session,
            viewport_size,
            scale_factor: 1.0,
            background_color: Color::from_rgba8(24, 24, 28, 255),
            fog_color: Color::from_rgba8(20, 22, 30, 255),
            dm_fog_opacity: 0.5,
            show_labels: true,
        }
    }

    pub fn with_scale_factor(mut self, scale_factor: f64) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    pub fn with_background(mut self, color: Color) -> Self {
        self.background_color = color;
        self
    }

    pub fn with_fog_color(mut self, color: Color) -> Self {
        self.fog_color = color;
        self
    }

    /// Set how see-through fog is for the DM.
    pub fn with_dm_fog_opacity(mut self, opacity: f64) -> Self {
        self.dm_fog_opacity = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn with_labels(mut self, show: bool) -> Self {
        self.show_labels = show;
        self
    }

    /// Reject frames that cannot be drawn.
    pub fn validate(&self) -> RenderResult<()> {
        let Size { width, height } = self.viewport_size;
        if !(width.is_finite() && height.is_finite()) || width <= 0.0 || height <= 0.0 {
            return Err(RendererError::InvalidViewport(format!("{}x{}", width, height)));
        }
        if !(self.scale_factor.is_finite() && self.scale_factor > 0.0) {
            return Err(RendererError::InvalidViewport(format!(
                "scale factor {}",
                self.scale_factor
            )));
        }
        Ok(())
    }
}

/// A backend that turns a session's layer stack into pixels or commands.
pub trait Renderer: Send + Sync {
    /// Prepare the frame. Called once per frame before presenting.
    fn build_scene(&mut self, ctx: &RenderContext) -> RenderResult<()>;

    /// Colour the surface is cleared to.
    fn background_color(&self, ctx: &RenderContext) -> Color {
        ctx.background_color
    }
}
