/// RenderContext trait - the per-frame command surface

use crate::rhi::buffer::Buffer;
use crate::rhi::pipeline::{DepthStencilState, PipelineDesc, RenderPipeline};
use crate::rhi::render_target::RenderTarget;
use crate::rhi::types::{
    CullMode, DepthStencilDesc, IndexFormat, PixelBufferDesc, PrimitiveType, RenderPassDesc,
    Winding,
};
use std::sync::Arc;

/// Per-surface frame driver
///
/// One frame looks like:
/// `begin_frame` -> `begin_render_pass` -> repeated
/// `update_pipeline_state` + buffer binds + draws -> `end_render_pass` ->
/// `end_frame`.
///
/// `begin_frame` returning `false` means the frame should be skipped for this
/// tick (swapchain out of date or surface lost); the caller simply retries on
/// the next tick.
pub trait RenderContext {
    /// The swapchain-backed default render target
    fn screen_render_target(&self) -> Arc<dyn RenderTarget>;

    /// Notify the context of a surface resize; the swapchain is rebuilt on
    /// the next `begin_frame`
    fn update_surface(&mut self, width: u32, height: u32) -> bool;

    fn begin_frame(&mut self) -> bool;

    fn begin_render_pass(&mut self, render_target: &Arc<dyn RenderTarget>, desc: &RenderPassDesc);

    fn set_depth_stencil_state(&mut self, state: Arc<dyn DepthStencilState>);

    fn update_depth_stencil_state(&mut self, desc: &DepthStencilDesc);

    fn set_render_pipeline(&mut self, pipeline: Arc<dyn RenderPipeline>);

    /// Resolve the logical pipeline description into a (cached) native
    /// pipeline and bind it if it changed
    fn update_pipeline_state(&mut self, render_target: &Arc<dyn RenderTarget>, desc: &PipelineDesc);

    fn set_viewport(&mut self, x: i32, y: i32, width: u32, height: u32);

    fn set_cull_mode(&mut self, mode: CullMode);

    fn set_winding(&mut self, winding: Winding);

    fn set_scissor_rect(&mut self, enabled: bool, x: f32, y: f32, width: f32, height: f32);

    fn set_stencil_reference_value(&mut self, value: u32);

    fn set_vertex_buffer(&mut self, buffer: Arc<dyn Buffer>);

    fn set_index_buffer(&mut self, buffer: Arc<dyn Buffer>);

    fn set_instance_buffer(&mut self, buffer: Arc<dyn Buffer>);

    fn draw_arrays(&mut self, primitive: PrimitiveType, start: usize, count: usize);

    fn draw_arrays_instanced(
        &mut self,
        primitive: PrimitiveType,
        start: usize,
        count: usize,
        instance_count: usize,
    );

    fn draw_elements(
        &mut self,
        primitive: PrimitiveType,
        index_format: IndexFormat,
        count: usize,
        offset: usize,
    );

    fn draw_elements_instanced(
        &mut self,
        primitive: PrimitiveType,
        index_format: IndexFormat,
        count: usize,
        offset: usize,
        instance_count: usize,
    );

    fn end_render_pass(&mut self);

    /// Submit, present, run post-frame operations, and advance the frame
    /// index if the present succeeded
    fn end_frame(&mut self);

    /// Read back the target's color attachment after this frame completes
    ///
    /// Deferred to a post-frame operation so it observes the frame's final
    /// rendered content; the callback runs inside `end_frame`.
    fn read_pixels(
        &mut self,
        render_target: &Arc<dyn RenderTarget>,
        callback: Box<dyn FnOnce(PixelBufferDesc) + Send>,
    );
}
