/// Driver trait - the factory surface of an RHI backend

use crate::error::Result;
use crate::rhi::buffer::Buffer;
use crate::rhi::pipeline::{DepthStencilState, RenderPipeline};
use crate::rhi::program::Program;
use crate::rhi::render_target::RenderTarget;
use crate::rhi::texture::Texture;
use crate::rhi::types::{
    BufferType, BufferUsage, SamplerDesc, SamplerHandle, TextureDesc, VertexLayoutDesc,
};
use crate::rhi::vertex_layout::VertexLayout;
use std::sync::Arc;

/// Factory for every GPU resource; one per device
///
/// There is intentionally no global accessor: callers thread the driver
/// handle through the constructors of whatever needs it. Backends expose a
/// concrete constructor taking window handles (surface creation is not part
/// of this trait) and a concrete render-context factory for the same reason.
pub trait Driver: Send + Sync {
    /// Create a buffer; `Immutable` usage requires `initial` data
    fn create_buffer(
        &self,
        size: usize,
        buffer_type: BufferType,
        usage: BufferUsage,
        initial: Option<&[u8]>,
    ) -> Result<Arc<dyn Buffer>>;

    fn create_texture(&self, desc: &TextureDesc) -> Result<Arc<dyn Texture>>;

    /// Create an offscreen render target with optional initial attachments
    fn create_render_target(
        &self,
        color_attachment: Option<Arc<dyn Texture>>,
        depth_stencil_attachment: Option<Arc<dyn Texture>>,
    ) -> Result<Arc<dyn RenderTarget>>;

    fn create_depth_stencil_state(&self) -> Arc<dyn DepthStencilState>;

    /// Create the pipeline/cache manager; one per driver is expected
    fn create_render_pipeline(&self) -> Arc<dyn RenderPipeline>;

    /// Link a program from vertex + fragment SPIR-V
    fn create_program(&self, vertex_spirv: &[u32], fragment_spirv: &[u32])
        -> Result<Arc<dyn Program>>;

    fn create_vertex_layout(&self, desc: VertexLayoutDesc) -> Arc<dyn VertexLayout>;

    /// Create a native sampler
    ///
    /// Returns `None` when the description cannot be satisfied (e.g.
    /// anisotropic filtering on a device without the feature); callers are
    /// expected to check and degrade.
    fn create_sampler(&self, desc: &SamplerDesc) -> Option<SamplerHandle>;

    /// GPU vendor name
    fn vendor(&self) -> String;

    /// Device/renderer name
    fn renderer_name(&self) -> String;

    /// API version string
    fn version(&self) -> String;

    /// Block until the device is idle
    fn wait_idle(&self);
}
