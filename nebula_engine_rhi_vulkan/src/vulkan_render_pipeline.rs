/// VulkanRenderPipeline - pipeline/layout caching and descriptor recycling
///
/// Converts the logical pipeline description into a cached native pipeline.
/// Caches: descriptor-set layouts and pipeline layouts keyed by program id,
/// native pipelines keyed by the composite state hash, and per-(pipeline
/// layout, frame index) free lists of descriptor-set allocations. Reverse
/// multimaps track which pipelines depend on which render pass / program so
/// invalidation can evict exactly the stale entries.

use ash::vk::{self, Handle};
use nebula_engine::nebula::rhi::{
    BlendDesc, DepthStencilDesc, PipelineDesc, Program, RenderPipeline, RenderTarget, UniformStage,
    VertexLayout,
};
use nebula_engine::{engine_debug, engine_error};
use rustc_hash::{FxHashMap, FxHasher};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use crate::vulkan_context::GpuContext;
use crate::vulkan_depth_stencil::to_vk_depth_stencil_state;
use crate::vulkan_program::{VulkanProgram, FS_UBO_BINDING_INDEX, VS_UBO_BINDING_INDEX};
use crate::vulkan_render_target::VulkanRenderTarget;
use crate::vulkan_utils::{
    to_vk_blend_factor, to_vk_blend_op, to_vk_color_mask,
};
use crate::vulkan_vertex_layout::VulkanVertexLayout;

pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

pub const MAX_DESCRIPTOR_SETS: usize = 2;
pub const SET_INDEX_UBO: usize = 0;
pub const SET_INDEX_SAMPLER: usize = 1;

const DEFAULT_DESCRIPTOR_POOL_UNIFORM_COUNT: u32 = 64;
const DEFAULT_DESCRIPTOR_POOL_SAMPLER_COUNT: u32 = 64;
const DEFAULT_DESCRIPTOR_POOL_MAX_SETS: u32 = 128;

/// Cull/front-face/topology values that are baked into the pipeline when the
/// device lacks (parts of) extended dynamic state
#[derive(Debug, Clone, Copy)]
pub struct ExtendedDynamicState {
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub topology: vk::PrimitiveTopology,
}

impl Default for ExtendedDynamicState {
    fn default() -> Self {
        Self {
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        }
    }
}

/// Which of the extended dynamic values end up in the pipeline key
///
/// Three capability tiers: no extension support bakes all three (more
/// pipeline permutations, correctness without the extension); partial
/// support (restricted dynamic topology) bakes topology only; full support
/// bakes nothing.
pub(crate) fn baked_dynamic_state_bits(
    extended_dynamic_state: bool,
    topology_unrestricted: bool,
    state: &ExtendedDynamicState,
) -> u32 {
    if !extended_dynamic_state {
        state.cull_mode.as_raw() | ((state.front_face.as_raw() as u32) << 8)
            | ((state.topology.as_raw() as u32) << 16)
    } else if !topology_unrestricted {
        state.topology.as_raw() as u32
    } else {
        0
    }
}

/// Composite pipeline cache key
///
/// The pipeline layout and descriptor-set layouts are derived from the
/// program, so the key only covers states that directly affect pipeline
/// creation: blend, depth-stencil, shader combination, vertex layout, the
/// render pass (attachment formats), and any baked dynamic values.
pub(crate) fn make_pipeline_id(
    blend_desc: &BlendDesc,
    depth_stencil_hash: u64,
    program_id: u64,
    render_pass: vk::RenderPass,
    vertex_layout_hash: u64,
    baked_dynamic_bits: u32,
) -> u64 {
    let mut hasher = FxHasher::default();
    blend_desc.hash(&mut hasher);
    depth_stencil_hash.hash(&mut hasher);
    program_id.hash(&mut hasher);
    render_pass.as_raw().hash(&mut hasher);
    vertex_layout_hash.hash(&mut hasher);
    baked_dynamic_bits.hash(&mut hasher);
    hasher.finish()
}

/// Descriptor-set layouts derived from one program
#[derive(Clone, Copy)]
pub struct DescriptorSetLayoutState {
    pub layouts: [vk::DescriptorSetLayout; MAX_DESCRIPTOR_SETS],
    pub layout_count: u32,
    pub uniform_descriptor_count: u32,
    pub sampler_descriptor_count: u32,
}

/// A recyclable descriptor-set allocation
#[derive(Clone, Copy)]
pub struct DescriptorState {
    pub sets: [vk::DescriptorSet; MAX_DESCRIPTOR_SETS],
    pub owner_layout: vk::PipelineLayout,
    /// Frame the allocation is bound to; -1 when sitting in a free list
    pub frame_index: i32,
}

/// Free lists per (pipeline layout, frame index)
///
/// Recycling happens when a frame slot is reused: its allocations are known
/// to be out of flight and can back new draws without vkAllocateDescriptorSets.
#[derive(Default)]
pub(crate) struct DescriptorFreeLists {
    map: FxHashMap<vk::PipelineLayout, [Vec<DescriptorState>; MAX_FRAMES_IN_FLIGHT]>,
}

impl DescriptorFreeLists {
    pub(crate) fn take(
        &mut self,
        layout: vk::PipelineLayout,
        frame_index: usize,
    ) -> Option<DescriptorState> {
        let free_list = &mut self.map.get_mut(&layout)?[frame_index];
        let mut state = free_list.pop()?;
        debug_assert_eq!(state.frame_index, -1);
        state.frame_index = frame_index as i32;
        Some(state)
    }

    pub(crate) fn recycle(&mut self, mut state: DescriptorState) {
        let pool = self.map.entry(state.owner_layout).or_default();
        let frame_index = state.frame_index as usize;
        state.frame_index = -1; // mark free to reuse
        pool[frame_index].push(state);
    }
}

struct PipelineInner {
    descriptor_layout_cache: FxHashMap<u64, DescriptorSetLayoutState>,
    pipeline_layout_cache: FxHashMap<u64, vk::PipelineLayout>,
    /// PSO cache
    pipeline_cache: FxHashMap<u64, vk::Pipeline>,
    free_lists: DescriptorFreeLists,
    descriptor_pools: Vec<vk::DescriptorPool>,

    // Reverse indexes for invalidation
    program_to_pipelines: FxHashMap<u64, Vec<u64>>,
    render_pass_to_pipelines: FxHashMap<u64, Vec<u64>>,

    active_pipeline: vk::Pipeline,
    active_pipeline_layout: vk::PipelineLayout,
    active_dsl: Option<DescriptorSetLayoutState>,

    pipeline_creations: u64,
    descriptor_set_allocations: u64,
}

pub struct VulkanRenderPipeline {
    ctx: Arc<GpuContext>,
    inner: Mutex<PipelineInner>,
}

impl RenderPipeline for VulkanRenderPipeline {}

impl VulkanRenderPipeline {
    pub fn new(ctx: Arc<GpuContext>) -> Self {
        let this = Self {
            ctx,
            inner: Mutex::new(PipelineInner {
                descriptor_layout_cache: FxHashMap::default(),
                pipeline_layout_cache: FxHashMap::default(),
                pipeline_cache: FxHashMap::default(),
                free_lists: DescriptorFreeLists::default(),
                descriptor_pools: Vec::new(),
                program_to_pipelines: FxHashMap::default(),
                render_pass_to_pipelines: FxHashMap::default(),
                active_pipeline: vk::Pipeline::null(),
                active_pipeline_layout: vk::PipelineLayout::null(),
                active_dsl: None,
                pipeline_creations: 0,
                descriptor_set_allocations: 0,
            }),
        };
        // Preallocate one descriptor pool
        {
            let mut inner = this.inner.lock().unwrap();
            this.allocate_descriptor_pool(&mut inner);
        }
        this
    }

    /// Resolve the logical description into the active (cached) native
    /// pipeline, creating layouts/pipelines only when their keys are new
    pub fn update(
        &self,
        render_target: &VulkanRenderTarget,
        desc: &PipelineDesc,
        depth_stencil_desc: &DepthStencilDesc,
        state: &ExtendedDynamicState,
    ) {
        // Evict cached objects whose render pass or program died since the
        // last update
        for render_pass in self.ctx.take_retired_render_passes() {
            self.remove_cached_psos_by_render_pass(render_pass);
        }
        for program_id in self.ctx.take_retired_programs() {
            self.remove_cached_objects_by_program(program_id);
        }

        let render_pass = render_target.native_render_pass();
        if render_pass == vk::RenderPass::null() {
            engine_error!("nebula::vulkan", "update_pipeline_state before any render pass");
            return;
        }

        let program_state = desc.program_state.lock().unwrap();
        let program = Arc::clone(program_state.program());
        drop(program_state);
        let vulkan_program: &VulkanProgram =
            unsafe { &*(Arc::as_ptr(&program) as *const VulkanProgram) };
        let vertex_layout: &VulkanVertexLayout =
            unsafe { &*(Arc::as_ptr(&desc.vertex_layout) as *const VulkanVertexLayout) };

        let mut inner = self.inner.lock().unwrap();
        self.update_descriptor_set_layouts(&mut inner, vulkan_program);
        self.update_pipeline_layout(&mut inner, vulkan_program.program_id());
        self.update_graphics_pipeline(
            &mut inner,
            desc,
            depth_stencil_desc,
            state,
            render_pass,
            render_target,
            vulkan_program,
            vertex_layout,
        );
    }

    pub(crate) fn active_pipeline(&self) -> vk::Pipeline {
        self.inner.lock().unwrap().active_pipeline
    }

    pub(crate) fn active_pipeline_layout(&self) -> vk::PipelineLayout {
        self.inner.lock().unwrap().active_pipeline_layout
    }

    pub(crate) fn active_descriptor_layout_state(&self) -> Option<DescriptorSetLayoutState> {
        self.inner.lock().unwrap().active_dsl
    }

    /// Number of distinct native pipelines currently cached
    pub fn pipeline_cache_len(&self) -> usize {
        self.inner.lock().unwrap().pipeline_cache.len()
    }

    /// (pipelines created, descriptor sets allocated) so far
    pub fn creation_stats(&self) -> (u64, u64) {
        let inner = self.inner.lock().unwrap();
        (inner.pipeline_creations, inner.descriptor_set_allocations)
    }

    // ===== DESCRIPTOR STATES =====

    /// Reuse a recycled allocation or allocate fresh sets for the active
    /// layout; exhaustion/fragmentation grows a new pool rather than failing
    pub(crate) fn acquire_descriptor_state(&self, frame_index: usize) -> Option<DescriptorState> {
        let mut inner = self.inner.lock().unwrap();
        let layout = inner.active_pipeline_layout;
        let dsl = inner.active_dsl?;

        if let Some(state) = inner.free_lists.take(layout, frame_index) {
            return Some(state);
        }

        let set_layouts = &dsl.layouts[..dsl.layout_count as usize];
        let pool = *inner.descriptor_pools.last()?;
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(set_layouts);

        let allocated = unsafe { self.ctx.device.allocate_descriptor_sets(&alloc_info) };
        let allocated = match allocated {
            Ok(sets) => sets,
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => {
                let new_pool = self.allocate_descriptor_pool(&mut inner);
                let retry_info = vk::DescriptorSetAllocateInfo::default()
                    .descriptor_pool(new_pool)
                    .set_layouts(set_layouts);
                match unsafe { self.ctx.device.allocate_descriptor_sets(&retry_info) } {
                    Ok(sets) => sets,
                    Err(e) => {
                        engine_error!("nebula::vulkan", "vkAllocateDescriptorSets failed: {:?}", e);
                        return None;
                    }
                }
            }
            Err(e) => {
                engine_error!("nebula::vulkan", "vkAllocateDescriptorSets failed: {:?}", e);
                return None;
            }
        };

        inner.descriptor_set_allocations += 1;

        let mut sets = [vk::DescriptorSet::null(); MAX_DESCRIPTOR_SETS];
        sets[..allocated.len()].copy_from_slice(&allocated);
        Some(DescriptorState {
            sets,
            owner_layout: layout,
            frame_index: frame_index as i32,
        })
    }

    /// Return an allocation to its (layout, frame) free list
    pub(crate) fn recycle_descriptor_state(&self, state: DescriptorState) {
        self.inner.lock().unwrap().free_lists.recycle(state);
    }

    fn allocate_descriptor_pool(&self, inner: &mut PipelineInner) -> vk::DescriptorPool {
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: DEFAULT_DESCRIPTOR_POOL_UNIFORM_COUNT,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: DEFAULT_DESCRIPTOR_POOL_SAMPLER_COUNT,
            },
        ];
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(DEFAULT_DESCRIPTOR_POOL_MAX_SETS)
            .pool_sizes(&pool_sizes);

        let pool = unsafe {
            self.ctx
                .device
                .create_descriptor_pool(&create_info, None)
                .expect("Failed to create descriptor pool")
        };
        inner.descriptor_pools.push(pool);
        pool
    }

    // ===== CACHE BUILDERS =====

    fn update_descriptor_set_layouts(&self, inner: &mut PipelineInner, program: &VulkanProgram) {
        let program_id = program.program_id();
        if let Some(&state) = inner.descriptor_layout_cache.get(&program_id) {
            inner.active_dsl = Some(state);
            return;
        }

        let mut ubo_bindings: Vec<vk::DescriptorSetLayoutBinding> = Vec::new();
        let mut sampler_bindings: Vec<vk::DescriptorSetLayoutBinding> = Vec::new();
        let mut state = DescriptorSetLayoutState {
            layouts: [vk::DescriptorSetLayout::null(); MAX_DESCRIPTOR_SETS],
            layout_count: 0,
            uniform_descriptor_count: 0,
            sampler_descriptor_count: 0,
        };

        for block in program.active_uniform_blocks() {
            let stage_flags = match block.stage {
                UniformStage::Vertex => vk::ShaderStageFlags::VERTEX,
                UniformStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
            };
            debug_assert!(
                block.binding == VS_UBO_BINDING_INDEX || block.binding == FS_UBO_BINDING_INDEX
            );
            ubo_bindings.push(
                vk::DescriptorSetLayoutBinding::default()
                    .binding(block.binding)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .descriptor_count(1)
                    .stage_flags(stage_flags),
            );
            state.uniform_descriptor_count += 1;
        }

        // Samplers -> set 1
        for sampler in program.active_samplers() {
            sampler_bindings.push(
                vk::DescriptorSetLayoutBinding::default()
                    .binding(sampler.binding)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .descriptor_count(sampler.count)
                    .stage_flags(vk::ShaderStageFlags::FRAGMENT),
            );
            state.sampler_descriptor_count += sampler.count;
        }

        unsafe {
            let ubo_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&ubo_bindings);
            state.layouts[SET_INDEX_UBO] = self
                .ctx
                .device
                .create_descriptor_set_layout(&ubo_info, None)
                .expect("Failed to create UBO descriptor set layout");
            state.layout_count = 1;

            if !sampler_bindings.is_empty() {
                let sampler_info =
                    vk::DescriptorSetLayoutCreateInfo::default().bindings(&sampler_bindings);
                state.layouts[SET_INDEX_SAMPLER] = self
                    .ctx
                    .device
                    .create_descriptor_set_layout(&sampler_info, None)
                    .expect("Failed to create sampler descriptor set layout");
                state.layout_count += 1;
            }
        }

        inner.descriptor_layout_cache.insert(program_id, state);
        inner.active_dsl = Some(state);
    }

    fn update_pipeline_layout(&self, inner: &mut PipelineInner, program_id: u64) {
        if let Some(&layout) = inner.pipeline_layout_cache.get(&program_id) {
            inner.active_pipeline_layout = layout;
            return;
        }

        let dsl = inner.active_dsl.expect("descriptor set layouts must be built first");
        let set_layouts = &dsl.layouts[..dsl.layout_count as usize];
        let create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(set_layouts);

        let layout = unsafe {
            self.ctx
                .device
                .create_pipeline_layout(&create_info, None)
                .expect("vkCreatePipelineLayout failed")
        };
        inner.pipeline_layout_cache.insert(program_id, layout);
        inner.active_pipeline_layout = layout;
    }

    #[allow(clippy::too_many_arguments)]
    fn update_graphics_pipeline(
        &self,
        inner: &mut PipelineInner,
        desc: &PipelineDesc,
        depth_stencil_desc: &DepthStencilDesc,
        state: &ExtendedDynamicState,
        render_pass: vk::RenderPass,
        render_target: &VulkanRenderTarget,
        program: &VulkanProgram,
        vertex_layout: &VulkanVertexLayout,
    ) {
        let caps = &self.ctx.capabilities;
        let baked_bits = baked_dynamic_state_bits(
            caps.extended_dynamic_state,
            caps.dynamic_primitive_topology_unrestricted,
            state,
        );

        let pipeline_id = make_pipeline_id(
            &desc.blend_desc,
            depth_stencil_desc.key_hash(),
            program.program_id(),
            render_pass,
            vertex_layout.hash(),
            baked_bits,
        );
        if let Some(&pipeline) = inner.pipeline_cache.get(&pipeline_id) {
            inner.active_pipeline = pipeline;
            return;
        }

        // Shader stages
        let entry = c"main";
        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(program.vs_module())
                .name(entry),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(program.fs_module())
                .name(entry),
        ];

        // Vertex input
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(vertex_layout.binding_descriptions())
            .vertex_attribute_descriptions(vertex_layout.attribute_descriptions());

        // Input assembly: topology baked unless fully dynamic
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(state.topology)
            .primitive_restart_enable(false);

        // Viewport/scissor are always dynamic
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        // Rasterizer: cull/front-face baked unless the extension is present
        let raster_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(state.cull_mode)
            .front_face(state.front_face)
            .line_width(1.0);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .sample_shading_enable(false);

        let depth_stencil_state = to_vk_depth_stencil_state(depth_stencil_desc);

        // One blend attachment per bound color attachment
        let blend_attachment = vk::PipelineColorBlendAttachmentState {
            color_write_mask: to_vk_color_mask(desc.blend_desc.write_mask),
            blend_enable: desc.blend_desc.blend_enabled.into(),
            src_color_blend_factor: to_vk_blend_factor(desc.blend_desc.source_rgb_blend_factor),
            dst_color_blend_factor: to_vk_blend_factor(desc.blend_desc.destination_rgb_blend_factor),
            color_blend_op: to_vk_blend_op(desc.blend_desc.rgb_blend_op),
            src_alpha_blend_factor: to_vk_blend_factor(desc.blend_desc.source_alpha_blend_factor),
            dst_alpha_blend_factor: to_vk_blend_factor(desc.blend_desc.destination_alpha_blend_factor),
            alpha_blend_op: to_vk_blend_op(desc.blend_desc.alpha_blend_op),
        };
        let color_attachment_count = if render_target.is_default() {
            1
        } else {
            (0..nebula_engine::nebula::rhi::MAX_COLOR_ATTACHMENT)
                .take_while(|&i| {
                    use nebula_engine::nebula::rhi::RenderTarget as _;
                    render_target.color_attachment(i).is_some()
                })
                .count()
                .max(1)
        };
        let blend_attachments = vec![blend_attachment; color_attachment_count];
        let blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        // Dynamic states
        let mut dynamic_states = vec![
            vk::DynamicState::VIEWPORT,
            vk::DynamicState::SCISSOR,
            vk::DynamicState::STENCIL_REFERENCE,
            vk::DynamicState::BLEND_CONSTANTS,
            vk::DynamicState::DEPTH_BIAS,
        ];
        if caps.extended_dynamic_state {
            dynamic_states.push(vk::DynamicState::CULL_MODE_EXT);
            dynamic_states.push(vk::DynamicState::FRONT_FACE_EXT);
            dynamic_states.push(vk::DynamicState::PRIMITIVE_TOPOLOGY_EXT);
        }
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&raster_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&blend_state)
            .dynamic_state(&dynamic_state)
            .layout(inner.active_pipeline_layout)
            .render_pass(render_pass)
            .subpass(0);

        let pipeline = unsafe {
            self.ctx
                .device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map(|pipelines| pipelines[0])
                .expect("vkCreateGraphicsPipelines failed")
        };

        inner.pipeline_creations += 1;
        inner
            .render_pass_to_pipelines
            .entry(render_pass.as_raw())
            .or_default()
            .push(pipeline_id);
        inner
            .program_to_pipelines
            .entry(program.program_id())
            .or_default()
            .push(pipeline_id);
        inner.pipeline_cache.insert(pipeline_id, pipeline);
        inner.active_pipeline = pipeline;
    }

    // ===== INVALIDATION =====

    /// Evict every pipeline built against `render_pass`
    ///
    /// Called when a render target destroys its cached passes; the caller
    /// has already ensured the GPU is idle.
    pub fn remove_cached_psos_by_render_pass(&self, render_pass: vk::RenderPass) {
        let mut inner = self.inner.lock().unwrap();
        let Some(pipeline_ids) = inner.render_pass_to_pipelines.remove(&render_pass.as_raw()) else {
            return;
        };
        engine_debug!(
            "nebula::vulkan",
            "evicting {} pipelines for retired render pass",
            pipeline_ids.len()
        );
        for pipeline_id in pipeline_ids {
            if let Some(pipeline) = inner.pipeline_cache.remove(&pipeline_id) {
                unsafe { self.ctx.device.destroy_pipeline(pipeline, None) };
                if inner.active_pipeline == pipeline {
                    inner.active_pipeline = vk::Pipeline::null();
                }
            }
        }
    }

    /// Evict the layouts and pipelines owned by a destroyed program
    pub fn remove_cached_objects_by_program(&self, program_id: u64) {
        self.ctx.wait_device_idle();

        let mut inner = self.inner.lock().unwrap();

        if let Some(state) = inner.descriptor_layout_cache.remove(&program_id) {
            unsafe {
                for layout in &state.layouts[..state.layout_count as usize] {
                    self.ctx.device.destroy_descriptor_set_layout(*layout, None);
                }
            }
        }

        if let Some(layout) = inner.pipeline_layout_cache.remove(&program_id) {
            unsafe { self.ctx.device.destroy_pipeline_layout(layout, None) };
            if inner.active_pipeline_layout == layout {
                inner.active_pipeline_layout = vk::PipelineLayout::null();
                inner.active_dsl = None;
            }
        }

        if let Some(pipeline_ids) = inner.program_to_pipelines.remove(&program_id) {
            for pipeline_id in pipeline_ids {
                if let Some(pipeline) = inner.pipeline_cache.remove(&pipeline_id) {
                    unsafe { self.ctx.device.destroy_pipeline(pipeline, None) };
                    if inner.active_pipeline == pipeline {
                        inner.active_pipeline = vk::Pipeline::null();
                    }
                }
            }
        }
    }
}

impl Drop for VulkanRenderPipeline {
    fn drop(&mut self) {
        self.ctx.wait_device_idle();

        let mut inner = self.inner.lock().unwrap();
        unsafe {
            for (_, layout) in inner.pipeline_layout_cache.drain() {
                self.ctx.device.destroy_pipeline_layout(layout, None);
            }
            for (_, state) in inner.descriptor_layout_cache.drain() {
                for layout in &state.layouts[..state.layout_count as usize] {
                    self.ctx.device.destroy_descriptor_set_layout(*layout, None);
                }
            }
            for pool in inner.descriptor_pools.drain(..) {
                self.ctx.device.destroy_descriptor_pool(pool, None);
            }
            for (_, pipeline) in inner.pipeline_cache.drain() {
                self.ctx.device.destroy_pipeline(pipeline, None);
            }
        }
    }
}

#[cfg(test)]
#[path = "vulkan_render_pipeline_tests.rs"]
mod tests;
