/*!
# Nebula Engine - Vulkan RHI

Vulkan implementation of the `nebula_engine` render hardware interface.

The backend is built around a shared [`GpuContext`] (device, allocator,
queues, fenced disposal queue) threaded explicitly through every resource:

- [`VulkanDriver`] - instance/device bring-up, adapter selection, factories
- [`VulkanRenderContext`] - swapchain + frames-in-flight orchestration
- [`VulkanBuffer`] / [`VulkanTexture`] - GPU resources with staged uploads
  and per-subresource image-layout tracking
- [`VulkanRenderTarget`] - render pass / framebuffer caching
- [`VulkanRenderPipeline`] - PSO and layout caching, descriptor recycling

[`GpuContext`]: vulkan_context::GpuContext
[`VulkanDriver`]: vulkan_driver::VulkanDriver
[`VulkanRenderContext`]: vulkan_render_context::VulkanRenderContext
[`VulkanBuffer`]: vulkan_buffer::VulkanBuffer
[`VulkanTexture`]: vulkan_texture::VulkanTexture
[`VulkanRenderTarget`]: vulkan_render_target::VulkanRenderTarget
[`VulkanRenderPipeline`]: vulkan_render_pipeline::VulkanRenderPipeline
*/

pub mod debug;
pub mod vulkan_buffer;
pub mod vulkan_context;
pub mod vulkan_depth_stencil;
pub mod vulkan_driver;
pub mod vulkan_image_layout;
pub mod vulkan_program;
pub mod vulkan_render_context;
pub mod vulkan_render_pipeline;
pub mod vulkan_render_target;
pub mod vulkan_sampler;
pub mod vulkan_texture;
pub mod vulkan_uniform_ring;
pub mod vulkan_utils;
pub mod vulkan_vertex_layout;

// Main nebula namespace module
pub mod nebula {
    pub use crate::vulkan_buffer::VulkanBuffer;
    pub use crate::vulkan_context::{
        DeviceCapabilities, DisposableResource, GpuContext, IsolateSubmission,
    };
    pub use crate::vulkan_depth_stencil::VulkanDepthStencilState;
    pub use crate::vulkan_driver::VulkanDriver;
    pub use crate::vulkan_image_layout::ImageLayoutTracker;
    pub use crate::vulkan_program::VulkanProgram;
    pub use crate::vulkan_render_context::VulkanRenderContext;
    pub use crate::vulkan_render_pipeline::VulkanRenderPipeline;
    pub use crate::vulkan_render_target::VulkanRenderTarget;
    pub use crate::vulkan_texture::VulkanTexture;
    pub use crate::vulkan_vertex_layout::VulkanVertexLayout;
}
