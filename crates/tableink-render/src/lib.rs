//! TableInk Render Library
//!
//! Renderer abstraction for TableInk. The compositor walks a session's
//! visible layers and records backend-neutral draw commands, which a GPU or
//! software backend then replays.

pub mod display_list;
mod compositor;
mod renderer;

pub use compositor::compose;
pub use display_list::{Blend, DisplayList, DrawCommand};
pub use renderer::{RenderContext, RenderResult, Renderer, RendererError};

/// Renderer that records each frame into a [`DisplayList`].
#[derive(Debug, Default)]
pub struct DisplayListRenderer {
    list: DisplayList,
}

impl DisplayListRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands recorded by the last `build_scene` call.
    pub fn display_list(&self) -> &DisplayList {
        &self.list
    }

    pub fn take_display_list(&mut self) -> DisplayList {
        std::mem::take(&mut self.list)
    }
}

impl Renderer for DisplayListRenderer {
    fn build_scene(&mut self, ctx: &RenderContext) -> RenderResult<()> {
        compose(ctx, &mut self.list)?;
        log::trace!(
            "Built frame: {} commands in {} layers",
            self.list.len(),
            self.list.layers().len()
        );
        Ok(())
    }
}
