/// RenderTarget trait - a set of color + depth/stencil attachments

use crate::rhi::texture::Texture;
use std::sync::Arc;

/// A render target created by `Driver::create_render_target`, or the
/// swapchain-backed default target owned by the render context
///
/// Color attachments must be contiguous from index 0: lookups stop at the
/// first empty slot.
pub trait RenderTarget: Send + Sync {
    /// True for the swapchain-backed default target
    fn is_default(&self) -> bool;

    /// Bind `texture` (mip `level`) as the color attachment at `index`
    fn set_color_attachment(&self, index: usize, texture: Option<Arc<dyn Texture>>, level: u32);

    /// Bind `texture` as the depth-stencil attachment
    fn set_depth_stencil_attachment(&self, texture: Option<Arc<dyn Texture>>);

    fn color_attachment(&self, index: usize) -> Option<Arc<dyn Texture>>;

    fn depth_stencil_attachment(&self) -> Option<Arc<dyn Texture>>;
}
