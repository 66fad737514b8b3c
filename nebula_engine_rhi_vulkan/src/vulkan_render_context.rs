/// VulkanRenderContext - per-frame orchestration
///
/// Owns the swapchain and MAX_FRAMES_IN_FLIGHT parallel sets of command
/// buffer, fence, uniform ring, descriptor-state list, and dynamic-state
/// dirty mask. One frame: begin_frame (fence wait, ring reset, acquire) ->
/// begin_render_pass -> update_pipeline_state + binds + draws (each draw
/// lazily reapplies dynamic state and descriptor sets) -> end_render_pass ->
/// end_frame (submit, present, post-frame ops, advance). The swapchain is
/// rebuilt wholesale when marked dirty; acquire/present failures abandon the
/// frame for one tick and mark it dirty.

use ash::vk;
use bitflags::bitflags;
use nebula_engine::nebula::rhi::{
    Buffer, CullMode, DepthStencilDesc, DepthStencilState, IndexFormat, PipelineDesc,
    PixelBufferDesc, PixelFormat, PrimitiveType, ProgramState, RenderContext, RenderPassDesc,
    RenderPipeline, RenderTarget, Texture, Winding,
};
use nebula_engine::nebula::Result;
use nebula_engine::{engine_bail, engine_err, engine_error, engine_info, engine_warn};
use std::sync::{Arc, Mutex};

use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_context::GpuContext;
use crate::vulkan_depth_stencil::VulkanDepthStencilState;
use crate::vulkan_render_pipeline::{
    DescriptorState, ExtendedDynamicState, VulkanRenderPipeline, MAX_FRAMES_IN_FLIGHT,
    SET_INDEX_SAMPLER, SET_INDEX_UBO,
};
use crate::vulkan_render_target::{as_vulkan_texture, VulkanRenderTarget};
use crate::vulkan_program::{FS_UBO_BINDING_INDEX, VS_UBO_BINDING_INDEX};
use crate::vulkan_uniform_ring::UniformRing;
use crate::vulkan_utils::{from_vk_color_format, to_vk_cull_mode, to_vk_front_face, to_vk_index_type, to_vk_primitive_topology};

bitflags! {
    /// Dynamic state that must be (re)applied before the next draw
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct DynamicStateBits: u32 {
        const VIEWPORT = 1 << 0;
        const SCISSOR = 1 << 1;
        const STENCIL_REF = 1 << 2;
        const CULL_MODE = 1 << 3;
        const FRONT_FACE = 1 << 4;
    }
}

/// Some driver implementations require dynamic state to be re-set after a
/// pipeline bind even when unchanged
const PIPELINE_REQUIRED_DYNAMIC_BITS: DynamicStateBits = DynamicStateBits::all();

enum SwapchainOp {
    Acquire,
    Present,
}

fn nearly_equal(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-6
}

fn viewport_eq(a: &vk::Viewport, b: &vk::Viewport) -> bool {
    nearly_equal(a.x, b.x)
        && nearly_equal(a.y, b.y)
        && nearly_equal(a.width, b.width)
        && nearly_equal(a.height, b.height)
        && nearly_equal(a.min_depth, b.min_depth)
        && nearly_equal(a.max_depth, b.max_depth)
}

fn rect_eq(a: &vk::Rect2D, b: &vk::Rect2D) -> bool {
    a.offset.x == b.offset.x
        && a.offset.y == b.offset.y
        && a.extent.width == b.extent.width
        && a.extent.height == b.extent.height
}

/// Deferred work run inside end_frame, after the present
enum PostFrameOp {
    ReadPixels {
        render_target: Arc<dyn RenderTarget>,
        callback: Box<dyn FnOnce(PixelBufferDesc) + Send>,
    },
}

pub struct VulkanRenderContext {
    ctx: Arc<GpuContext>,

    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    swapchain_images: Vec<vk::Image>,
    swapchain_image_views: Vec<vk::ImageView>,
    /// Current swapchain image index
    current_image_index: u32,
    semaphore_index: usize,
    acquire_complete_semaphores: Vec<vk::Semaphore>,
    render_finished_semaphores: Vec<vk::Semaphore>,

    command_pool: vk::CommandPool,
    command_buffers: [vk::CommandBuffer; MAX_FRAMES_IN_FLIGHT],
    in_flight_fences: [vk::Fence; MAX_FRAMES_IN_FLIGHT],
    /// Driver fence value each slot's last submission completes as
    frame_fence_values: [u64; MAX_FRAMES_IN_FLIGHT],
    uniform_rings: Vec<UniformRing>,
    in_flight_descriptor_states: [Vec<DescriptorState>; MAX_FRAMES_IN_FLIGHT],
    dynamic_dirty_bits: [DynamicStateBits; MAX_FRAMES_IN_FLIGHT],
    current_frame: usize,
    current_cmd: vk::CommandBuffer,

    screen_rt: Arc<VulkanRenderTarget>,
    current_rt: Option<Arc<dyn RenderTarget>>,

    depth_stencil_state: Option<Arc<dyn DepthStencilState>>,
    render_pipeline: Option<Arc<dyn RenderPipeline>>,
    last_pipeline_desc: Option<PipelineDesc>,
    program_state: Option<Arc<Mutex<ProgramState>>>,

    vertex_buffer: Option<Arc<dyn Buffer>>,
    index_buffer: Option<Arc<dyn Buffer>>,
    instance_buffer: Option<Arc<dyn Buffer>>,

    bound_pipeline: vk::Pipeline,
    /// Topology the bound pipeline was baked with (pre-extension devices)
    baked_topology: vk::PrimitiveTopology,

    cached_viewport: vk::Viewport,
    cached_scissor: vk::Rect2D,
    cached_cull_mode: vk::CullModeFlags,
    cached_front_face: vk::FrontFace,
    cached_topology: vk::PrimitiveTopology,
    scissor_enabled: bool,
    stencil_reference: u32,

    render_target_width: u32,
    render_target_height: u32,
    screen_width: u32,
    screen_height: u32,

    vsync: bool,
    swapchain_dirty: bool,
    in_frame: bool,
    suboptimal: bool,

    post_frame_ops: Vec<PostFrameOp>,
}

impl VulkanRenderContext {
    pub(crate) fn new(
        ctx: Arc<GpuContext>,
        surface: vk::SurfaceKHR,
        surface_loader: ash::khr::surface::Instance,
        initial_extent: vk::Extent2D,
        vsync: bool,
        uniform_ring_capacity: usize,
    ) -> Result<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(&ctx.instance, &ctx.device);

        let command_pool = unsafe {
            let pool_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(ctx.graphics_queue_family)
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            ctx.device
                .create_command_pool(&pool_info, None)
                .map_err(|e| engine_err!("nebula::vulkan", "vkCreateCommandPool failed: {:?}", e))?
        };

        let command_buffers = unsafe {
            let alloc_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(command_pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(MAX_FRAMES_IN_FLIGHT as u32);
            let buffers = ctx
                .device
                .allocate_command_buffers(&alloc_info)
                .map_err(|e| engine_err!("nebula::vulkan", "vkAllocateCommandBuffers failed: {:?}", e))?;
            [buffers[0], buffers[1]]
        };

        // Frame fences start signaled so the first begin_frame doesn't block
        let mut in_flight_fences = [vk::Fence::null(); MAX_FRAMES_IN_FLIGHT];
        for fence in in_flight_fences.iter_mut() {
            *fence = unsafe {
                ctx.device
                    .create_fence(
                        &vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED),
                        None,
                    )
                    .map_err(|e| engine_err!("nebula::vulkan", "Failed to create frame fence: {:?}", e))?
            };
        }

        let mut uniform_rings = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            uniform_rings.push(UniformRing::new(Arc::clone(&ctx), uniform_ring_capacity)?);
        }

        let screen_rt = Arc::new(VulkanRenderTarget::new(Arc::clone(&ctx), true));

        let mut this = Self {
            ctx,
            surface,
            surface_loader,
            swapchain_loader,
            swapchain: vk::SwapchainKHR::null(),
            swapchain_images: Vec::new(),
            swapchain_image_views: Vec::new(),
            current_image_index: 0,
            semaphore_index: 0,
            acquire_complete_semaphores: Vec::new(),
            render_finished_semaphores: Vec::new(),
            command_pool,
            command_buffers,
            in_flight_fences,
            frame_fence_values: [0; MAX_FRAMES_IN_FLIGHT],
            uniform_rings,
            in_flight_descriptor_states: Default::default(),
            dynamic_dirty_bits: [DynamicStateBits::empty(); MAX_FRAMES_IN_FLIGHT],
            current_frame: 0,
            current_cmd: vk::CommandBuffer::null(),
            screen_rt,
            current_rt: None,
            depth_stencil_state: None,
            render_pipeline: None,
            last_pipeline_desc: None,
            program_state: None,
            vertex_buffer: None,
            index_buffer: None,
            instance_buffer: None,
            bound_pipeline: vk::Pipeline::null(),
            baked_topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            cached_viewport: vk::Viewport::default(),
            cached_scissor: vk::Rect2D::default(),
            cached_cull_mode: vk::CullModeFlags::NONE,
            cached_front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            cached_topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            scissor_enabled: false,
            stencil_reference: 0,
            render_target_width: 0,
            render_target_height: 0,
            screen_width: initial_extent.width,
            screen_height: initial_extent.height,
            vsync,
            swapchain_dirty: false,
            in_frame: false,
            suboptimal: false,
            post_frame_ops: Vec::new(),
        };
        this.recreate_swapchain()?;
        Ok(this)
    }

    /// Clone of the pipeline-manager Arc, independent of `self`'s borrows
    fn pipeline_manager(&self) -> Option<Arc<dyn RenderPipeline>> {
        self.render_pipeline.clone()
    }

    fn as_pipeline_manager(pipeline: &Arc<dyn RenderPipeline>) -> &VulkanRenderPipeline {
        unsafe { &*(Arc::as_ptr(pipeline) as *const VulkanRenderPipeline) }
    }

    fn depth_stencil_desc(&self) -> DepthStencilDesc {
        self.depth_stencil_state
            .as_ref()
            .map(|state| {
                let vk_state =
                    unsafe { &*(Arc::as_ptr(state) as *const VulkanDepthStencilState) };
                vk_state.desc()
            })
            .unwrap_or_default()
    }

    fn mark_dynamic_state_dirty(&mut self, bits: DynamicStateBits) {
        for dirty in self.dynamic_dirty_bits.iter_mut() {
            *dirty |= bits;
        }
    }

    // ===== SWAPCHAIN =====

    fn recreate_swapchain(&mut self) -> Result<()> {
        unsafe {
            // Choose a surface format: prefer RGBA8 over BGRA8 under the
            // SRGB-nonlinear colorspace
            let formats = self
                .surface_loader
                .get_physical_device_surface_formats(self.ctx.physical_device, self.surface)
                .map_err(|e| engine_err!("nebula::vulkan", "surface format query failed: {:?}", e))?;

            let mut chosen_format: Option<(vk::SurfaceFormatKHR, PixelFormat)> = None;
            let mut best_score = -1i32;
            for surface_format in &formats {
                if surface_format.color_space != vk::ColorSpaceKHR::SRGB_NONLINEAR {
                    continue;
                }
                let Some(pixel_format) = from_vk_color_format(surface_format.format) else {
                    continue;
                };
                let score = match pixel_format {
                    PixelFormat::Rgba8 => 2,
                    _ => 1,
                };
                if score > best_score {
                    best_score = score;
                    chosen_format = Some((*surface_format, pixel_format));
                }
            }
            let Some((surface_format, pixel_format)) = chosen_format else {
                engine_bail!(
                    "nebula::vulkan",
                    "No suitable surface format (need R8G8B8A8_UNORM or B8G8R8A8_UNORM, SRGB nonlinear)"
                );
            };

            // FIFO is always available; MAILBOX only when vsync is off
            let mut present_mode = vk::PresentModeKHR::FIFO;
            if !self.vsync {
                let modes = self
                    .surface_loader
                    .get_physical_device_surface_present_modes(self.ctx.physical_device, self.surface)
                    .unwrap_or_default();
                if modes.contains(&vk::PresentModeKHR::MAILBOX) {
                    present_mode = vk::PresentModeKHR::MAILBOX;
                }
            }

            let caps = self
                .surface_loader
                .get_physical_device_surface_capabilities(self.ctx.physical_device, self.surface)
                .map_err(|e| engine_err!("nebula::vulkan", "surface capability query failed: {:?}", e))?;

            let mut extent = caps.current_extent;
            if extent.width == u32::MAX {
                extent = vk::Extent2D {
                    width: self.screen_width,
                    height: self.screen_height,
                };
            }
            if extent.width == 0 || extent.height == 0 {
                engine_bail!("nebula::vulkan", "Failed to create swapchain: zero extent");
            }

            let mut image_count = caps.min_image_count + 1;
            if caps.max_image_count > 0 {
                image_count = image_count.min(caps.max_image_count);
            }

            // Destroy the old swapchain and its views
            for view in self.swapchain_image_views.drain(..) {
                self.ctx.device.destroy_image_view(view, None);
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
                self.swapchain = vk::SwapchainKHR::null();
            }

            let create_info = vk::SwapchainCreateInfoKHR::default()
                .surface(self.surface)
                .min_image_count(image_count)
                .image_format(surface_format.format)
                .image_color_space(surface_format.color_space)
                .image_extent(extent)
                .image_array_layers(1)
                // TRANSFER_SRC so the default target supports readback
                .image_usage(
                    vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
                )
                .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
                .pre_transform(caps.current_transform)
                .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                .present_mode(present_mode)
                .clipped(true);

            self.swapchain = self
                .swapchain_loader
                .create_swapchain(&create_info, None)
                .map_err(|e| engine_err!("nebula::vulkan", "vkCreateSwapchainKHR failed: {:?}", e))?;

            self.swapchain_images = self
                .swapchain_loader
                .get_swapchain_images(self.swapchain)
                .map_err(|e| engine_err!("nebula::vulkan", "vkGetSwapchainImagesKHR failed: {:?}", e))?;

            self.swapchain_image_views.clear();
            for &image in &self.swapchain_images {
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(surface_format.format)
                    .components(vk::ComponentMapping::default())
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });
                let view = self
                    .ctx
                    .device
                    .create_image_view(&view_info, None)
                    .map_err(|e| engine_err!("nebula::vulkan", "vkCreateImageView failed: {:?}", e))?;
                self.swapchain_image_views.push(view);
            }

            self.screen_rt.rebuild_swapchain_attachments(
                &self.swapchain_images,
                &self.swapchain_image_views,
                extent,
                pixel_format,
            )?;

            // Re-create per-image semaphores
            for semaphore in self.render_finished_semaphores.drain(..) {
                self.ctx.device.destroy_semaphore(semaphore, None);
            }
            for semaphore in self.acquire_complete_semaphores.drain(..) {
                self.ctx.device.destroy_semaphore(semaphore, None);
            }
            for _ in 0..self.swapchain_images.len() {
                let info = vk::SemaphoreCreateInfo::default();
                self.render_finished_semaphores.push(
                    self.ctx
                        .device
                        .create_semaphore(&info, None)
                        .map_err(|e| engine_err!("nebula::vulkan", "vkCreateSemaphore failed: {:?}", e))?,
                );
                self.acquire_complete_semaphores.push(
                    self.ctx
                        .device
                        .create_semaphore(&info, None)
                        .map_err(|e| engine_err!("nebula::vulkan", "vkCreateSemaphore failed: {:?}", e))?,
                );
            }

            self.screen_width = extent.width;
            self.screen_height = extent.height;

            // Reset frame state
            self.current_frame = 0;
            self.current_image_index = 0;
            self.suboptimal = false;
            self.semaphore_index = self.acquire_complete_semaphores.len() - 1;

            engine_info!(
                "nebula::vulkan",
                "swapchain created: {}x{} x{} images, {:?}",
                extent.width,
                extent.height,
                self.swapchain_images.len(),
                surface_format.format
            );
            Ok(())
        }
    }

    /// Classify an acquire/present result
    ///
    /// SUBOPTIMAL is logged once and the frame proceeds; OUT_OF_DATE and
    /// SURFACE_LOST abandon the frame and mark the swapchain dirty (the
    /// caller retries next tick); anything else is fatal.
    fn handle_swapchain_result(
        &mut self,
        result: vk::Result,
        op: SwapchainOp,
        prev_semaphore_index: usize,
    ) -> bool {
        let op_name = match op {
            SwapchainOp::Acquire => "vkAcquireNextImageKHR",
            SwapchainOp::Present => "vkQueuePresentKHR",
        };
        match result {
            vk::Result::SUCCESS => true,
            vk::Result::SUBOPTIMAL_KHR => {
                if !self.suboptimal {
                    self.suboptimal = true;
                    engine_warn!("nebula::vulkan", "{}: suboptimal swapchain", op_name);
                }
                true
            }
            vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::ERROR_SURFACE_LOST_KHR => {
                engine_info!("nebula::vulkan", "{}: swapchain out of date / surface lost", op_name);
                if matches!(op, SwapchainOp::Acquire) {
                    self.semaphore_index = prev_semaphore_index; // revert
                }
                self.swapchain_dirty = true;
                false
            }
            other => {
                engine_error!("nebula::vulkan", "{} failed: {:?}", op_name, other);
                panic!("{} failed: {:?}", op_name, other);
            }
        }
    }

    // ===== PIPELINE / DRAW PLUMBING =====

    fn update_pipeline_internal(&mut self) {
        let (Some(desc), Some(rt)) = (self.last_pipeline_desc.clone(), self.current_rt.clone())
        else {
            return;
        };
        let Some(pipeline_arc) = self.pipeline_manager() else {
            engine_error!("nebula::vulkan", "render pipeline not set");
            return;
        };
        let pipeline_manager = Self::as_pipeline_manager(&pipeline_arc);

        let vk_rt = unsafe { &*(Arc::as_ptr(&rt) as *const VulkanRenderTarget) };
        let state = ExtendedDynamicState {
            cull_mode: self.cached_cull_mode,
            front_face: self.cached_front_face,
            topology: self.cached_topology,
        };
        let ds_desc = self.depth_stencil_desc();
        pipeline_manager.update(vk_rt, &desc, &ds_desc, &state);

        // Bind only when the native pipeline actually changed
        let pipeline = pipeline_manager.active_pipeline();
        if pipeline != vk::Pipeline::null() && self.bound_pipeline != pipeline {
            unsafe {
                self.ctx.device.cmd_bind_pipeline(
                    self.current_cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    pipeline,
                );
            }
            self.bound_pipeline = pipeline;
            self.baked_topology = self.cached_topology;
            self.dynamic_dirty_bits[self.current_frame] |= PIPELINE_REQUIRED_DYNAMIC_BITS;
        }
    }

    /// Set the draw topology, rebuilding the pipeline when the device bakes it
    fn apply_topology(&mut self, primitive: PrimitiveType) {
        let topology = to_vk_primitive_topology(primitive);
        self.cached_topology = topology;

        if self.ctx.capabilities.extended_dynamic_state {
            unsafe {
                self.ctx
                    .device
                    .cmd_set_primitive_topology(self.current_cmd, topology);
            }
        } else if topology != self.baked_topology {
            // Baked-topology tier: a different topology is a different PSO
            self.update_pipeline_internal();
        }
    }

    fn apply_pending_dynamic_states(&mut self) {
        let dirty = self.dynamic_dirty_bits[self.current_frame];
        if dirty.contains(DynamicStateBits::VIEWPORT) {
            unsafe {
                self.ctx
                    .device
                    .cmd_set_viewport(self.current_cmd, 0, &[self.cached_viewport]);
            }
        }
        if dirty.contains(DynamicStateBits::SCISSOR) {
            unsafe {
                self.ctx
                    .device
                    .cmd_set_scissor(self.current_cmd, 0, &[self.cached_scissor]);
            }
        }
        if dirty.contains(DynamicStateBits::STENCIL_REF) {
            unsafe {
                self.ctx.device.cmd_set_stencil_reference(
                    self.current_cmd,
                    vk::StencilFaceFlags::FRONT_AND_BACK,
                    self.stencil_reference,
                );
            }
        }
        // Cull mode and front face via the extension when available;
        // otherwise they were baked into the pipeline
        if self.ctx.capabilities.extended_dynamic_state {
            if dirty.contains(DynamicStateBits::CULL_MODE) {
                unsafe {
                    self.ctx
                        .device
                        .cmd_set_cull_mode(self.current_cmd, self.cached_cull_mode);
                }
            }
            if dirty.contains(DynamicStateBits::FRONT_FACE) {
                unsafe {
                    self.ctx
                        .device
                        .cmd_set_front_face(self.current_cmd, self.cached_front_face);
                }
            }
        }
        self.dynamic_dirty_bits[self.current_frame] = DynamicStateBits::empty();
    }

    /// Apply dynamic state, stream uniforms into the ring, build and bind
    /// descriptor sets, and bind vertex/instance buffers
    fn prepare_drawing(&mut self) {
        debug_assert!(self.in_frame, "draw outside begin_frame/end_frame");
        self.apply_pending_dynamic_states();

        let Some(program_state) = self.program_state.clone() else {
            engine_error!("nebula::vulkan", "ProgramState must be set before drawing");
            return;
        };
        let Some(pipeline_arc) = self.pipeline_manager() else {
            engine_error!("nebula::vulkan", "render pipeline must be set before drawing");
            return;
        };
        let pipeline_manager = Self::as_pipeline_manager(&pipeline_arc);
        debug_assert!(self.bound_pipeline != vk::Pipeline::null());

        let pipeline_layout = pipeline_manager.active_pipeline_layout();
        let Some(dsl) = pipeline_manager.active_descriptor_layout_state() else {
            engine_error!("nebula::vulkan", "descriptor layouts not built");
            return;
        };

        // Acquire descriptor sets for this frame, matching the active layout
        let Some(descriptor_state) = pipeline_manager.acquire_descriptor_state(self.current_frame)
        else {
            engine_error!("nebula::vulkan", "Failed to acquire descriptor sets");
            return;
        };
        let descriptor_sets = descriptor_state.sets;
        self.in_flight_descriptor_states[self.current_frame].push(descriptor_state);

        // Populate CPU-side uniforms via callbacks, then copy the stage
        // blobs into the ring
        let mut state = program_state.lock().unwrap();
        state.apply_callback_uniforms();

        let mut buffer_infos: Vec<vk::DescriptorBufferInfo> = Vec::with_capacity(2);
        let mut image_infos: Vec<vk::DescriptorImageInfo> =
            Vec::with_capacity(dsl.sampler_descriptor_count as usize);
        // (dst set, binding, first image info index, count) resolved into
        // writes once the info vectors stop growing
        let mut buffer_writes: Vec<(u32, usize)> = Vec::new();
        let mut image_writes: Vec<(u32, usize, usize)> = Vec::new();

        let ring = &mut self.uniform_rings[self.current_frame];

        let vertex_blob = state.vertex_uniform_buffer();
        if !vertex_blob.is_empty() {
            let slice = ring.write(vertex_blob);
            buffer_infos.push(vk::DescriptorBufferInfo {
                buffer: ring.buffer(),
                offset: slice.offset as vk::DeviceSize,
                range: slice.size as vk::DeviceSize,
            });
            buffer_writes.push((VS_UBO_BINDING_INDEX, buffer_infos.len() - 1));
        }
        let fragment_blob = state.fragment_uniform_buffer();
        if !fragment_blob.is_empty() {
            let slice = ring.write(fragment_blob);
            buffer_infos.push(vk::DescriptorBufferInfo {
                buffer: ring.buffer(),
                offset: slice.offset as vk::DeviceSize,
                range: slice.size as vk::DeviceSize,
            });
            buffer_writes.push((FS_UBO_BINDING_INDEX, buffer_infos.len() - 1));
        }

        // Samplers (set 1)
        for (&binding, textures) in state.texture_binding_sets() {
            if textures.is_empty() {
                continue;
            }
            let first = image_infos.len();
            for texture in textures {
                let vk_texture = as_vulkan_texture(texture);
                image_infos.push(vk::DescriptorImageInfo {
                    sampler: vk_texture.sampler(),
                    image_view: vk_texture.native_view(),
                    image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                });
            }
            image_writes.push((binding, first, textures.len()));
        }

        let mut writes: Vec<vk::WriteDescriptorSet> =
            Vec::with_capacity(buffer_writes.len() + image_writes.len());
        for &(binding, info_index) in &buffer_writes {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(descriptor_sets[SET_INDEX_UBO])
                    .dst_binding(binding)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(std::slice::from_ref(&buffer_infos[info_index])),
            );
        }
        for &(binding, first, count) in &image_writes {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(descriptor_sets[SET_INDEX_SAMPLER])
                    .dst_binding(binding)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&image_infos[first..first + count]),
            );
        }

        unsafe {
            if !writes.is_empty() {
                self.ctx.device.update_descriptor_sets(&writes, &[]);
            }

            // Bind only the sets that exist
            self.ctx.device.cmd_bind_descriptor_sets(
                self.current_cmd,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline_layout,
                0,
                &descriptor_sets[..dsl.layout_count as usize],
                &[],
            );
        }
        drop(state);

        // Vertex (+ instance) buffers
        let Some(vertex_buffer) = &self.vertex_buffer else {
            engine_error!("nebula::vulkan", "vertex buffer must be set before drawing");
            return;
        };
        let vertex_handle =
            unsafe { &*(Arc::as_ptr(vertex_buffer) as *const VulkanBuffer) }.native_handle();
        match &self.instance_buffer {
            None => unsafe {
                self.ctx
                    .device
                    .cmd_bind_vertex_buffers(self.current_cmd, 0, &[vertex_handle], &[0]);
            },
            Some(instance_buffer) => {
                let instance_handle =
                    unsafe { &*(Arc::as_ptr(instance_buffer) as *const VulkanBuffer) }
                        .native_handle();
                unsafe {
                    self.ctx.device.cmd_bind_vertex_buffers(
                        self.current_cmd,
                        0,
                        &[vertex_handle, instance_handle],
                        &[0, 0],
                    );
                }
            }
        }
    }

    fn bind_index_buffer(&self, index_format: IndexFormat) {
        let Some(index_buffer) = &self.index_buffer else {
            engine_error!("nebula::vulkan", "index buffer must be set for indexed draws");
            return;
        };
        let handle =
            unsafe { &*(Arc::as_ptr(index_buffer) as *const VulkanBuffer) }.native_handle();
        unsafe {
            self.ctx.device.cmd_bind_index_buffer(
                self.current_cmd,
                handle,
                0,
                to_vk_index_type(index_format),
            );
        }
    }

    // ===== READBACK =====

    fn read_pixels_impl(
        &mut self,
        render_target: &Arc<dyn RenderTarget>,
        callback: Box<dyn FnOnce(PixelBufferDesc) + Send>,
    ) {
        let vk_rt = unsafe { &*(Arc::as_ptr(render_target) as *const VulkanRenderTarget) };

        // Read the acquired image for the default target, color0 otherwise
        let attachment = if vk_rt.is_default() {
            render_target.color_attachment(self.current_image_index as usize)
        } else {
            render_target.color_attachment(0)
        };
        let Some(attachment) = attachment else {
            callback(PixelBufferDesc::default());
            return;
        };

        let desc = attachment.desc();
        if !matches!(desc.pixel_format, PixelFormat::Rgba8 | PixelFormat::Bgra8) {
            engine_error!(
                "nebula::vulkan",
                "read_pixels: unsupported format {:?}",
                desc.pixel_format
            );
            callback(PixelBufferDesc::default());
            return;
        }

        // Ensure the frame's rendering has finished
        unsafe {
            self.ctx
                .device
                .wait_for_fences(&[self.in_flight_fences[self.current_frame]], true, u64::MAX)
                .ok();
        }

        let texture = as_vulkan_texture(&attachment);
        let width = desc.width;
        let height = desc.height;
        let pixel_stride = 4u64;
        let buffer_size = width as u64 * height as u64 * pixel_stride;

        let result: Result<Vec<u8>> = (|| {
            let (staging_buffer, staging_memory) = self.ctx.create_raw_buffer(
                buffer_size,
                vk::BufferUsageFlags::TRANSFER_DST,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?;

            // The tracked ground-truth layout; a presented swapchain image
            // that was never explicitly tracked is in PRESENT_SRC
            let current_layout = texture.current_layout();
            if vk_rt.is_default() && current_layout == vk::ImageLayout::UNDEFINED {
                texture.set_known_layout(vk::ImageLayout::PRESENT_SRC_KHR);
            }
            let restore_layout = if vk_rt.is_default() && current_layout == vk::ImageLayout::UNDEFINED
            {
                vk::ImageLayout::PRESENT_SRC_KHR
            } else {
                current_layout
            };

            let submission = self.ctx.start_isolate_submission()?;
            texture.transition_layout(submission.cmd, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);

            let region = vk::BufferImageCopy {
                buffer_offset: 0,
                buffer_row_length: 0, // tightly packed
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D::default(),
                image_extent: vk::Extent3D {
                    width,
                    height,
                    depth: 1,
                },
            };
            unsafe {
                self.ctx.device.cmd_copy_image_to_buffer(
                    submission.cmd,
                    texture.native_image(),
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    staging_buffer,
                    &[region],
                );
            }

            // Restore the original layout
            texture.transition_layout(submission.cmd, restore_layout);
            self.ctx.finish_isolate_submission(submission)?;

            // Map and copy out; the wait was synchronous so the staging
            // resources are freed immediately (no disposal-queue deferral)
            let mut data = vec![0u8; buffer_size as usize];
            unsafe {
                let mapped = self
                    .ctx
                    .device
                    .map_memory(staging_memory, 0, buffer_size, vk::MemoryMapFlags::empty())
                    .map_err(|e| engine_err!("nebula::vulkan", "vkMapMemory (readback) failed: {:?}", e))?;
                std::ptr::copy_nonoverlapping(mapped as *const u8, data.as_mut_ptr(), data.len());
                self.ctx.device.unmap_memory(staging_memory);
                self.ctx.device.destroy_buffer(staging_buffer, None);
                self.ctx.device.free_memory(staging_memory, None);
            }
            Ok(data)
        })();

        match result {
            Ok(data) => callback(PixelBufferDesc {
                width,
                height,
                data,
            }),
            Err(e) => {
                engine_error!("nebula::vulkan", "read_pixels failed: {}", e);
                callback(PixelBufferDesc::default());
            }
        }
    }
}

impl RenderContext for VulkanRenderContext {
    fn screen_render_target(&self) -> Arc<dyn RenderTarget> {
        self.screen_rt.clone()
    }

    fn update_surface(&mut self, width: u32, height: u32) -> bool {
        if width == self.screen_width && height == self.screen_height {
            return true;
        }
        self.screen_width = width;
        self.screen_height = height;
        self.swapchain_dirty = true;
        true
    }

    fn begin_frame(&mut self) -> bool {
        if self.swapchain_dirty {
            self.ctx.wait_device_idle();
            self.screen_rt.invalidate();
            if let Err(e) = self.recreate_swapchain() {
                engine_error!("nebula::vulkan", "swapchain recreation failed: {}", e);
                return false;
            }
            self.swapchain_dirty = false;
        }

        unsafe {
            // Wait for this slot's previous frame; bounds frames in flight
            self.ctx
                .device
                .wait_for_fences(&[self.in_flight_fences[self.current_frame]], true, u64::MAX)
                .expect("vkWaitForFences failed");
        }

        // The slot's previous submission completed: retire disposals
        self.ctx
            .process_disposal_queue(self.frame_fence_values[self.current_frame]);

        // Reset this frame's uniform ring write head
        self.uniform_rings[self.current_frame].reset();

        let prev_semaphore_index = self.semaphore_index;
        self.semaphore_index = (self.semaphore_index + 1) % self.acquire_complete_semaphores.len();

        let acquire_result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                self.acquire_complete_semaphores[self.semaphore_index],
                vk::Fence::null(),
            )
        };
        let result_code = match acquire_result {
            Ok((image_index, suboptimal)) => {
                self.current_image_index = image_index;
                if suboptimal {
                    vk::Result::SUBOPTIMAL_KHR
                } else {
                    vk::Result::SUCCESS
                }
            }
            Err(code) => code,
        };
        if !self.handle_swapchain_result(result_code, SwapchainOp::Acquire, prev_semaphore_index) {
            return false;
        }

        self.in_frame = true;

        unsafe {
            self.ctx
                .device
                .reset_fences(&[self.in_flight_fences[self.current_frame]])
                .expect("vkResetFences failed");

            self.current_cmd = self.command_buffers[self.current_frame];
            self.ctx
                .device
                .reset_command_buffer(self.current_cmd, vk::CommandBufferResetFlags::empty())
                .expect("vkResetCommandBuffer failed");
        }

        // Recycle this slot's descriptor allocations: the GPU is done with them
        let retired = std::mem::take(&mut self.in_flight_descriptor_states[self.current_frame]);
        if let Some(pipeline_arc) = self.pipeline_manager() {
            let pipeline_manager = Self::as_pipeline_manager(&pipeline_arc);
            for state in retired {
                pipeline_manager.recycle_descriptor_state(state);
            }
        }

        unsafe {
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.ctx
                .device
                .begin_command_buffer(self.current_cmd, &begin_info)
                .expect("vkBeginCommandBuffer failed");
        }

        true
    }

    fn begin_render_pass(&mut self, render_target: &Arc<dyn RenderTarget>, desc: &RenderPassDesc) {
        debug_assert!(self.in_frame, "begin_render_pass outside a frame");
        let vk_rt = unsafe { &*(Arc::as_ptr(render_target) as *const VulkanRenderTarget) };

        self.current_rt = Some(Arc::clone(render_target));

        // Target size from the first color attachment
        let (width, height) = vk_rt.extent();
        self.render_target_width = width;
        self.render_target_height = height;

        vk_rt.begin_render_pass(self.current_cmd, desc, width, height, self.current_image_index);
    }

    fn set_depth_stencil_state(&mut self, state: Arc<dyn DepthStencilState>) {
        self.depth_stencil_state = Some(state);
    }

    fn update_depth_stencil_state(&mut self, desc: &DepthStencilDesc) {
        match &self.depth_stencil_state {
            Some(state) => state.update(desc),
            None => engine_error!("nebula::vulkan", "depth-stencil state not set"),
        }
    }

    fn set_render_pipeline(&mut self, pipeline: Arc<dyn RenderPipeline>) {
        self.render_pipeline = Some(pipeline);
    }

    fn update_pipeline_state(&mut self, render_target: &Arc<dyn RenderTarget>, desc: &PipelineDesc) {
        self.current_rt = Some(Arc::clone(render_target));
        self.program_state = Some(Arc::clone(&desc.program_state));
        self.last_pipeline_desc = Some(desc.clone());
        self.update_pipeline_internal();
    }

    fn set_viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        // Negative-height viewport flips Y to the engine's convention
        let viewport = vk::Viewport {
            x: x as f32,
            y: (y + height as i32) as f32,
            width: width as f32,
            height: -(height as f32),
            min_depth: 0.0,
            max_depth: 1.0,
        };
        if !viewport_eq(&viewport, &self.cached_viewport) {
            self.cached_viewport = viewport;
            self.mark_dynamic_state_dirty(DynamicStateBits::VIEWPORT);
        }
    }

    fn set_cull_mode(&mut self, mode: CullMode) {
        let native_mode = to_vk_cull_mode(mode);
        if native_mode != self.cached_cull_mode {
            self.cached_cull_mode = native_mode;
            self.mark_dynamic_state_dirty(DynamicStateBits::CULL_MODE);
            if !self.ctx.capabilities.extended_dynamic_state {
                // Baked into the PSO on this tier
                self.update_pipeline_internal();
            }
        }
    }

    fn set_winding(&mut self, winding: Winding) {
        let front_face = to_vk_front_face(winding);
        if front_face != self.cached_front_face {
            self.cached_front_face = front_face;
            self.mark_dynamic_state_dirty(DynamicStateBits::FRONT_FACE);
            if !self.ctx.capabilities.extended_dynamic_state {
                self.update_pipeline_internal();
            }
        }
    }

    fn set_scissor_rect(&mut self, enabled: bool, x: f32, y: f32, width: f32, height: f32) {
        let rect = if enabled {
            let rt_width = self.render_target_width as f32;
            let rt_height = self.render_target_height as f32;

            // Clamp and flip Y
            let min_x = x.clamp(0.0, rt_width) as i32;
            let min_y = y.clamp(0.0, rt_height) as i32;
            let max_x = (x + width).clamp(0.0, rt_width) as i32;
            let max_y = (y + height).clamp(0.0, rt_height) as i32;

            vk::Rect2D {
                offset: vk::Offset2D {
                    x: min_x,
                    y: self.render_target_height as i32 - max_y,
                },
                extent: vk::Extent2D {
                    width: (max_x - min_x).max(0) as u32,
                    height: (max_y - min_y).max(0) as u32,
                },
            }
        } else {
            vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D {
                    width: self.render_target_width,
                    height: self.render_target_height,
                },
            }
        };

        if self.scissor_enabled != enabled || !rect_eq(&self.cached_scissor, &rect) {
            self.scissor_enabled = enabled;
            self.cached_scissor = rect;
            self.mark_dynamic_state_dirty(DynamicStateBits::SCISSOR);
        }
    }

    fn set_stencil_reference_value(&mut self, value: u32) {
        if value != self.stencil_reference {
            self.stencil_reference = value;
            self.mark_dynamic_state_dirty(DynamicStateBits::STENCIL_REF);
        }
    }

    fn set_vertex_buffer(&mut self, buffer: Arc<dyn Buffer>) {
        if self
            .vertex_buffer
            .as_ref()
            .is_some_and(|bound| Arc::ptr_eq(bound, &buffer))
        {
            return;
        }
        self.vertex_buffer = Some(buffer);
    }

    fn set_index_buffer(&mut self, buffer: Arc<dyn Buffer>) {
        if self
            .index_buffer
            .as_ref()
            .is_some_and(|bound| Arc::ptr_eq(bound, &buffer))
        {
            return;
        }
        self.index_buffer = Some(buffer);
    }

    fn set_instance_buffer(&mut self, buffer: Arc<dyn Buffer>) {
        if self
            .instance_buffer
            .as_ref()
            .is_some_and(|bound| Arc::ptr_eq(bound, &buffer))
        {
            return;
        }
        self.instance_buffer = Some(buffer);
    }

    fn draw_arrays(&mut self, primitive: PrimitiveType, start: usize, count: usize) {
        self.apply_topology(primitive);
        self.prepare_drawing();
        unsafe {
            self.ctx
                .device
                .cmd_draw(self.current_cmd, count as u32, 1, start as u32, 0);
        }
    }

    fn draw_arrays_instanced(
        &mut self,
        primitive: PrimitiveType,
        start: usize,
        count: usize,
        instance_count: usize,
    ) {
        self.apply_topology(primitive);
        self.prepare_drawing();
        unsafe {
            self.ctx.device.cmd_draw(
                self.current_cmd,
                count as u32,
                instance_count as u32,
                start as u32,
                0,
            );
        }
    }

    fn draw_elements(
        &mut self,
        primitive: PrimitiveType,
        index_format: IndexFormat,
        count: usize,
        offset: usize,
    ) {
        self.apply_topology(primitive);
        self.prepare_drawing();
        self.bind_index_buffer(index_format);
        unsafe {
            self.ctx.device.cmd_draw_indexed(
                self.current_cmd,
                count as u32,
                1,
                (offset / index_format.bytes()) as u32,
                0,
                0,
            );
        }
    }

    fn draw_elements_instanced(
        &mut self,
        primitive: PrimitiveType,
        index_format: IndexFormat,
        count: usize,
        offset: usize,
        instance_count: usize,
    ) {
        self.apply_topology(primitive);
        self.prepare_drawing();
        self.bind_index_buffer(index_format);
        unsafe {
            self.ctx.device.cmd_draw_indexed(
                self.current_cmd,
                count as u32,
                instance_count as u32,
                (offset / index_format.bytes()) as u32,
                0,
                0,
            );
        }
    }

    fn end_render_pass(&mut self) {
        if let Some(render_target) = self.current_rt.take() {
            let vk_rt = unsafe { &*(Arc::as_ptr(&render_target) as *const VulkanRenderTarget) };
            vk_rt.end_render_pass(self.current_cmd);
        }

        // Reset per-pass state caches
        self.program_state = None;
        self.bound_pipeline = vk::Pipeline::null();
        self.vertex_buffer = None;
        self.index_buffer = None;
        self.instance_buffer = None;
    }

    fn end_frame(&mut self) {
        unsafe {
            self.ctx
                .device
                .end_command_buffer(self.current_cmd)
                .expect("vkEndCommandBuffer failed");
        }

        // Flush written uniform range when non-coherent
        self.uniform_rings[self.current_frame].flush_written();

        let wait_semaphores = [self.acquire_complete_semaphores[self.semaphore_index]];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores =
            [self.render_finished_semaphores[self.current_image_index as usize]];
        let command_buffers = [self.current_cmd];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            let _guard = self.ctx.queue_submit_lock.lock().unwrap();
            self.ctx
                .device
                .queue_submit(
                    self.ctx.graphics_queue,
                    &[submit_info],
                    self.in_flight_fences[self.current_frame],
                )
                .expect("vkQueueSubmit failed");
        }
        self.frame_fence_values[self.current_frame] = self.ctx.advance_fence_value();

        // Present, waiting on the render-finished semaphore
        let swapchains = [self.swapchain];
        let image_indices = [self.current_image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let present_result = unsafe {
            self.swapchain_loader
                .queue_present(self.ctx.present_queue, &present_info)
        };
        let result_code = match present_result {
            Ok(false) => vk::Result::SUCCESS,
            Ok(true) => vk::Result::SUBOPTIMAL_KHR,
            Err(code) => code,
        };
        let succeeded = self.handle_swapchain_result(result_code, SwapchainOp::Present, 0);

        // Deferred operations observe the frame's final rendered content
        let ops = std::mem::take(&mut self.post_frame_ops);
        for op in ops {
            match op {
                PostFrameOp::ReadPixels {
                    render_target,
                    callback,
                } => self.read_pixels_impl(&render_target, callback),
            }
        }

        // Advance only on a successful present
        if succeeded {
            self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;
        }
        self.in_frame = false;
    }

    fn read_pixels(
        &mut self,
        render_target: &Arc<dyn RenderTarget>,
        callback: Box<dyn FnOnce(PixelBufferDesc) + Send>,
    ) {
        // The Arc keeps the target alive across the deferral
        self.post_frame_ops.push(PostFrameOp::ReadPixels {
            render_target: Arc::clone(render_target),
            callback,
        });
    }
}

impl Drop for VulkanRenderContext {
    fn drop(&mut self) {
        self.ctx.wait_device_idle();

        self.screen_rt.invalidate();

        for ring in self.uniform_rings.iter_mut() {
            ring.destroy();
        }

        unsafe {
            for semaphore in self.render_finished_semaphores.drain(..) {
                self.ctx.device.destroy_semaphore(semaphore, None);
            }
            for semaphore in self.acquire_complete_semaphores.drain(..) {
                self.ctx.device.destroy_semaphore(semaphore, None);
            }
            for fence in self.in_flight_fences {
                self.ctx.device.destroy_fence(fence, None);
            }
            self.ctx
                .device
                .free_command_buffers(self.command_pool, &self.command_buffers);
            self.ctx.device.destroy_command_pool(self.command_pool, None);

            for view in self.swapchain_image_views.drain(..) {
                self.ctx.device.destroy_image_view(view, None);
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }
        }
    }
}
