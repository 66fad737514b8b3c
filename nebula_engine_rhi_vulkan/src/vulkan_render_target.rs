/// VulkanRenderTarget - attachments + render pass / framebuffer caching
///
/// Caches are keyed by (pass-description hash, current attachment-view
/// identity). A dirty-flag bitmask per color slot + depth/stencil tracks
/// which attachment views must be re-resolved before the next cache lookup:
/// the default target re-resolves only the acquired image's slot and depth,
/// offscreen targets re-hash everything when any bit is set.

use ash::vk;
use nebula_engine::glam;
use nebula_engine::nebula::rhi::{
    mrt_color_flag, PixelFormat, RenderPassDesc, RenderPassFlags, RenderTarget, SamplerDesc,
    TargetBufferFlags, Texture, TextureDesc, TextureType, TextureUsage, MAX_COLOR_ATTACHMENT,
};
use nebula_engine::nebula::Result;
use nebula_engine::{engine_bail, engine_error};
use rustc_hash::{FxHashMap, FxHasher};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use crate::vulkan_context::GpuContext;
use crate::vulkan_texture::VulkanTexture;
use crate::vulkan_utils::to_vk_format;

/// Slot of the depth-stencil view in the attachment-view table
const DEPTH_VIEW_INDEX: usize = MAX_COLOR_ATTACHMENT;

/// Downcast a contract texture to the backend type (backend-created only)
pub(crate) fn as_vulkan_texture(texture: &Arc<dyn Texture>) -> &VulkanTexture {
    unsafe { &*(Arc::as_ptr(texture) as *const VulkanTexture) }
}

// ===== LOAD/STORE OP POLICY (pure) =====

/// clear -> CLEAR; else discard-start -> DONT_CARE; else LOAD.
/// discard-end -> DONT_CARE; else STORE.
pub(crate) fn load_store_ops(
    flags: &RenderPassFlags,
    attachment: TargetBufferFlags,
) -> (vk::AttachmentLoadOp, vk::AttachmentStoreOp) {
    let load = if flags.clear.intersects(attachment) {
        vk::AttachmentLoadOp::CLEAR
    } else if flags.discard_start.intersects(attachment) {
        vk::AttachmentLoadOp::DONT_CARE
    } else {
        vk::AttachmentLoadOp::LOAD
    };
    let store = if flags.discard_end.intersects(attachment) {
        vk::AttachmentStoreOp::DONT_CARE
    } else {
        vk::AttachmentStoreOp::STORE
    };
    (load, store)
}

/// Per-attachment clear values in framebuffer order (colors then depth)
///
/// `color_slots` lists the logical color slot of each bound attachment: the
/// acquired image index for the default target, 0..N contiguous otherwise.
pub(crate) fn build_clear_values(
    desc: &RenderPassDesc,
    color_slots: &[usize],
    has_depth: bool,
) -> Vec<vk::ClearValue> {
    let mut clear_values = Vec::with_capacity(color_slots.len() + usize::from(has_depth));

    for &slot in color_slots {
        let color = if desc.flags.clear.intersects(mrt_color_flag(slot)) {
            desc.clear_color
        } else {
            glam::Vec4::ZERO
        };
        clear_values.push(vk::ClearValue {
            color: vk::ClearColorValue {
                float32: color.to_array(),
            },
        });
    }

    if has_depth {
        let depth_stencil = if desc
            .flags
            .clear
            .intersects(TargetBufferFlags::DEPTH_AND_STENCIL)
        {
            vk::ClearDepthStencilValue {
                depth: desc.clear_depth,
                stencil: desc.clear_stencil as u32,
            }
        } else {
            vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            }
        };
        clear_values.push(vk::ClearValue { depth_stencil });
    }

    clear_values
}

/// Framebuffer cache key: render pass handle chained onto the view-set hash
pub(crate) fn framebuffer_key(render_pass: vk::RenderPass, seed: u64) -> u64 {
    use ash::vk::Handle;
    let mut hasher = FxHasher::default();
    seed.hash(&mut hasher);
    render_pass.as_raw().hash(&mut hasher);
    hasher.finish()
}

/// Hash the identity of a set of attachment views
fn hash_views(views: &[vk::ImageView]) -> u64 {
    use ash::vk::Handle;
    let mut hasher = FxHasher::default();
    for view in views {
        view.as_raw().hash(&mut hasher);
    }
    hasher.finish()
}

struct AttachmentSlot {
    texture: Arc<dyn Texture>,
    #[allow(dead_code)]
    level: u32,
}

#[derive(Default)]
struct CacheStats {
    render_pass_creations: u64,
    framebuffer_creations: u64,
}

struct RenderTargetInner {
    color: [Option<AttachmentSlot>; MAX_COLOR_ATTACHMENT],
    depth_stencil: Option<AttachmentSlot>,

    dirty_flags: TargetBufferFlags,

    /// Current attachment views for building renderpass/framebuffer
    attachment_views: [vk::ImageView; MAX_COLOR_ATTACHMENT + 1],

    /// Seed values per swapchain image; only used for the default target
    render_hash_seeds: [u64; MAX_COLOR_ATTACHMENT],
    active_hash_seed: u64,

    clear_values: Vec<vk::ClearValue>,

    /// Active objects for the in-progress pass
    render_pass: vk::RenderPass,
    framebuffer: vk::Framebuffer,

    render_pass_cache: FxHashMap<u64, vk::RenderPass>,
    framebuffer_cache: FxHashMap<u64, vk::Framebuffer>,
    stats: CacheStats,
}

pub struct VulkanRenderTarget {
    ctx: Arc<GpuContext>,
    is_default: bool,
    inner: Mutex<RenderTargetInner>,
}

impl VulkanRenderTarget {
    pub fn new(ctx: Arc<GpuContext>, is_default: bool) -> Self {
        Self {
            ctx,
            is_default,
            inner: Mutex::new(RenderTargetInner {
                color: Default::default(),
                depth_stencil: None,
                dirty_flags: TargetBufferFlags::ALL,
                attachment_views: [vk::ImageView::null(); MAX_COLOR_ATTACHMENT + 1],
                render_hash_seeds: [0; MAX_COLOR_ATTACHMENT],
                active_hash_seed: 0,
                clear_values: Vec::new(),
                render_pass: vk::RenderPass::null(),
                framebuffer: vk::Framebuffer::null(),
                render_pass_cache: FxHashMap::default(),
                framebuffer_cache: FxHashMap::default(),
                stats: CacheStats::default(),
            }),
        }
    }

    /// Destroy all cached passes/framebuffers and mark everything dirty
    ///
    /// The caller must ensure the GPU is idle. Retired pass handles are
    /// recorded on the context so the pipeline manager can evict PSOs.
    pub fn invalidate(&self) {
        let mut inner = self.inner.lock().unwrap();
        for (_, framebuffer) in inner.framebuffer_cache.drain() {
            unsafe { self.ctx.device.destroy_framebuffer(framebuffer, None) };
        }
        for (_, render_pass) in inner.render_pass_cache.drain() {
            unsafe { self.ctx.device.destroy_render_pass(render_pass, None) };
            self.ctx.note_retired_render_pass(render_pass);
        }
        inner.render_pass = vk::RenderPass::null();
        inner.framebuffer = vk::Framebuffer::null();
        inner.attachment_views = [vk::ImageView::null(); MAX_COLOR_ATTACHMENT + 1];
        inner.render_hash_seeds = [0; MAX_COLOR_ATTACHMENT];
        inner.active_hash_seed = 0;
        inner.dirty_flags = TargetBufferFlags::ALL;
    }

    /// Replace the default target's attachments with fresh swapchain wraps
    pub(crate) fn rebuild_swapchain_attachments(
        &self,
        images: &[vk::Image],
        image_views: &[vk::ImageView],
        extent: vk::Extent2D,
        pixel_format: PixelFormat,
    ) -> Result<()> {
        if images.is_empty() || image_views.is_empty() {
            return Ok(());
        }
        if images.len() > MAX_COLOR_ATTACHMENT {
            engine_bail!("nebula::vulkan", "Too many swapchain images: {}", images.len());
        }

        let mut inner = self.inner.lock().unwrap();

        // Drop old wraps (non-owning) and the old depth attachment
        for slot in inner.color.iter_mut() {
            *slot = None;
        }
        inner.depth_stencil = None;

        let color_desc = TextureDesc {
            texture_type: TextureType::Tex2D,
            width: extent.width,
            height: extent.height,
            array_size: 1,
            mip_levels: 1,
            pixel_format,
            usage: TextureUsage::RenderTarget,
            sampler_desc: SamplerDesc::default(),
        };

        inner.dirty_flags = TargetBufferFlags::DEPTH_AND_STENCIL;
        for (index, (&image, &view)) in images.iter().zip(image_views).enumerate() {
            // Wrap the swapchain VkImage; the texture never owns it
            let wrapped: Arc<dyn Texture> = Arc::new(VulkanTexture::from_swapchain_image(
                Arc::clone(&self.ctx),
                image,
                view,
                color_desc.clone(),
            ));
            inner.color[index] = Some(AttachmentSlot {
                texture: wrapped,
                level: 0,
            });
            inner.dirty_flags |= mrt_color_flag(index);
        }

        // Matching depth-stencil attachment
        let depth_desc = TextureDesc {
            pixel_format: PixelFormat::D24S8,
            ..color_desc
        };
        let depth: Arc<dyn Texture> =
            Arc::new(VulkanTexture::new(Arc::clone(&self.ctx), &depth_desc)?);
        inner.depth_stencil = Some(AttachmentSlot {
            texture: depth,
            level: 0,
        });

        Ok(())
    }

    /// Active render pass handle for pipeline creation
    pub(crate) fn native_render_pass(&self) -> vk::RenderPass {
        self.inner.lock().unwrap().render_pass
    }

    /// Cached-object statistics: (passes cached, framebuffers cached,
    /// passes created, framebuffers created)
    pub fn cache_stats(&self) -> (usize, usize, u64, u64) {
        let inner = self.inner.lock().unwrap();
        (
            inner.render_pass_cache.len(),
            inner.framebuffer_cache.len(),
            inner.stats.render_pass_creations,
            inner.stats.framebuffer_creations,
        )
    }

    /// Clear values recorded by the last begin_render_pass
    pub fn clear_value_count(&self) -> usize {
        self.inner.lock().unwrap().clear_values.len()
    }

    /// Size of the first color attachment (or depth when color0 is absent)
    pub(crate) fn extent(&self) -> (u32, u32) {
        let inner = self.inner.lock().unwrap();
        if let Some(slot) = &inner.color[0] {
            let desc = slot.texture.desc();
            return (desc.width, desc.height);
        }
        if let Some(slot) = &inner.depth_stencil {
            let desc = slot.texture.desc();
            return (desc.width, desc.height);
        }
        (0, 0)
    }

    // ===== PASS LIFECYCLE =====

    /// Select/create the pass + framebuffer and record vkCmdBeginRenderPass
    pub(crate) fn begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        desc: &RenderPassDesc,
        width: u32,
        height: u32,
        image_index: u32,
    ) {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        let image_index = image_index as usize;

        // 1) Resolve which attachment views are current
        if self.is_default {
            debug_assert!(image_index < MAX_COLOR_ATTACHMENT, "image index out of range");

            let old_dirty = inner.dirty_flags;
            if inner
                .dirty_flags
                .intersects(TargetBufferFlags::DEPTH_AND_STENCIL)
            {
                inner.dirty_flags &= !TargetBufferFlags::DEPTH_AND_STENCIL;
                match &inner.depth_stencil {
                    Some(slot) => {
                        inner.attachment_views[DEPTH_VIEW_INDEX] =
                            as_vulkan_texture(&slot.texture).native_view();
                    }
                    None => {
                        engine_error!("nebula::vulkan", "swapchain depth-stencil can't be null");
                        return;
                    }
                }
            }

            let color_flag = mrt_color_flag(image_index);
            if inner.dirty_flags.intersects(color_flag) {
                inner.dirty_flags &= !color_flag;
                match &inner.color[image_index] {
                    Some(slot) => {
                        inner.attachment_views[image_index] =
                            as_vulkan_texture(&slot.texture).native_view();
                    }
                    None => {
                        engine_error!("nebula::vulkan", "swapchain image can't be null");
                        return;
                    }
                }
            }

            if old_dirty == inner.dirty_flags {
                // Neither color[image_index] nor depth-stencil changed
                inner.active_hash_seed = inner.render_hash_seeds[image_index];
            } else {
                let seed = hash_views(&[
                    inner.attachment_views[image_index],
                    inner.attachment_views[DEPTH_VIEW_INDEX],
                ]);
                inner.render_hash_seeds[image_index] = seed;
                inner.active_hash_seed = seed;
            }
        } else if inner.dirty_flags != TargetBufferFlags::empty() {
            // Offscreen: re-resolve dirty slots, then re-hash the whole set
            for index in 0..MAX_COLOR_ATTACHMENT {
                if !inner.dirty_flags.intersects(mrt_color_flag(index)) {
                    continue;
                }
                inner.attachment_views[index] = match &inner.color[index] {
                    Some(slot) => as_vulkan_texture(&slot.texture).native_view(),
                    None => vk::ImageView::null(),
                };
            }
            if inner
                .dirty_flags
                .intersects(TargetBufferFlags::DEPTH_AND_STENCIL)
            {
                inner.attachment_views[DEPTH_VIEW_INDEX] = match &inner.depth_stencil {
                    Some(slot) => as_vulkan_texture(&slot.texture).native_view(),
                    None => vk::ImageView::null(),
                };
            }

            inner.active_hash_seed = hash_views(&inner.attachment_views);
            inner.dirty_flags = TargetBufferFlags::empty();
        }

        // 2) Ensure render pass, 3) ensure framebuffer
        self.update_render_pass(inner, desc, image_index);
        self.update_framebuffer(inner, image_index, width, height);

        // 4) Clear values
        let has_depth = inner.attachment_views[DEPTH_VIEW_INDEX] != vk::ImageView::null();
        let color_slots: Vec<usize> = if self.is_default {
            vec![image_index]
        } else {
            // Contiguous color attachments assumption
            (0..MAX_COLOR_ATTACHMENT)
                .take_while(|&i| inner.attachment_views[i] != vk::ImageView::null())
                .collect()
        };
        inner.clear_values = build_clear_values(desc, &color_slots, has_depth);

        // 5) Transition to render layouts (non-default targets only)
        if !self.is_default {
            self.prepare_attachments_for_rendering(&inner, cmd);
        }

        // 6) Begin render pass
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(inner.render_pass)
            .framebuffer(inner.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D { width, height },
            })
            .clear_values(&inner.clear_values);
        unsafe {
            self.ctx
                .device
                .cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
        }
    }

    /// End the pass and restore attachments for subsequent sampling
    pub(crate) fn end_render_pass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.ctx.device.cmd_end_render_pass(cmd) };

        if self.is_default {
            return;
        }

        // The pass's final layouts; record them so the trackers stay truthful
        let inner = self.inner.lock().unwrap();
        for slot in inner.color.iter() {
            match slot {
                Some(slot) => as_vulkan_texture(&slot.texture)
                    .set_known_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                None => break,
            }
        }
        if let Some(slot) = &inner.depth_stencil {
            as_vulkan_texture(&slot.texture)
                .set_known_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        }
    }

    fn prepare_attachments_for_rendering(&self, inner: &RenderTargetInner, cmd: vk::CommandBuffer) {
        // Color -> ATTACHMENT_OPTIMAL (contiguous indices starting at 0)
        for slot in inner.color.iter() {
            match slot {
                Some(slot) => as_vulkan_texture(&slot.texture)
                    .transition_layout(cmd, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
                None => break,
            }
        }
        if let Some(slot) = &inner.depth_stencil {
            as_vulkan_texture(&slot.texture)
                .transition_layout(cmd, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        }
    }

    fn update_render_pass(
        &self,
        inner: &mut RenderTargetInner,
        desc: &RenderPassDesc,
        image_index: usize,
    ) {
        let key = desc.key_hash(inner.active_hash_seed);
        if let Some(&render_pass) = inner.render_pass_cache.get(&key) {
            inner.render_pass = render_pass;
            return;
        }

        let mut attachments: Vec<vk::AttachmentDescription> = Vec::new();
        let mut color_refs: Vec<vk::AttachmentReference> = Vec::new();

        let mut append_color = |slot: &AttachmentSlot, logical_index: usize| {
            let (load_op, store_op) = load_store_ops(&desc.flags, mrt_color_flag(logical_index));

            // UNDEFINED when not loading to minimize mismatch risk
            let initial_layout = if load_op == vk::AttachmentLoadOp::LOAD {
                if self.is_default {
                    vk::ImageLayout::PRESENT_SRC_KHR
                } else {
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
                }
            } else {
                vk::ImageLayout::UNDEFINED
            };
            let final_layout = if self.is_default {
                vk::ImageLayout::PRESENT_SRC_KHR
            } else {
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
            };

            attachments.push(
                vk::AttachmentDescription::default()
                    .format(to_vk_format(slot.texture.desc().pixel_format))
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(load_op)
                    .store_op(store_op)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(initial_layout)
                    .final_layout(final_layout),
            );
            color_refs.push(
                vk::AttachmentReference::default()
                    .attachment(color_refs.len() as u32)
                    .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
            );
        };

        if self.is_default {
            if let Some(slot) = &inner.color[image_index] {
                append_color(slot, image_index);
            }
        } else {
            for index in 0..MAX_COLOR_ATTACHMENT {
                if inner.attachment_views[index] == vk::ImageView::null() {
                    break;
                }
                if let Some(slot) = &inner.color[index] {
                    append_color(slot, index);
                }
            }
        }

        // Depth/stencil attachment
        let has_depth = inner.attachment_views[DEPTH_VIEW_INDEX] != vk::ImageView::null();
        let mut depth_ref = vk::AttachmentReference::default();
        if has_depth {
            if let Some(slot) = &inner.depth_stencil {
                let (depth_load, depth_store) =
                    load_store_ops(&desc.flags, TargetBufferFlags::DEPTH);
                let (stencil_load, stencil_store) =
                    load_store_ops(&desc.flags, TargetBufferFlags::STENCIL);

                let needs_load_initial = depth_load == vk::AttachmentLoadOp::LOAD
                    || stencil_load == vk::AttachmentLoadOp::LOAD;
                let initial_layout = if needs_load_initial {
                    vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
                } else {
                    vk::ImageLayout::UNDEFINED
                };

                attachments.push(
                    vk::AttachmentDescription::default()
                        .format(to_vk_format(slot.texture.desc().pixel_format))
                        .samples(vk::SampleCountFlags::TYPE_1)
                        .load_op(depth_load)
                        .store_op(depth_store)
                        .stencil_load_op(stencil_load)
                        .stencil_store_op(stencil_store)
                        .initial_layout(initial_layout)
                        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
                );
                depth_ref = vk::AttachmentReference::default()
                    .attachment(attachments.len() as u32 - 1)
                    .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
            }
        }

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if has_depth {
            subpass = subpass.depth_stencil_attachment(&depth_ref);
        }

        let mut dependencies = vec![vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            )];
        if has_depth {
            dependencies.push(
                vk::SubpassDependency::default()
                    .src_subpass(vk::SUBPASS_EXTERNAL)
                    .dst_subpass(0)
                    .src_stage_mask(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS)
                    .dst_stage_mask(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS)
                    .src_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
                    .dst_access_mask(
                        vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                    ),
            );
        }

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(&dependencies);

        let render_pass = unsafe {
            self.ctx
                .device
                .create_render_pass(&create_info, None)
                .expect("Failed to create VkRenderPass")
        };
        inner.stats.render_pass_creations += 1;
        inner.render_pass_cache.insert(key, render_pass);
        inner.render_pass = render_pass;
    }

    fn update_framebuffer(
        &self,
        inner: &mut RenderTargetInner,
        image_index: usize,
        width: u32,
        height: u32,
    ) {
        debug_assert!(inner.render_pass != vk::RenderPass::null());

        let key = framebuffer_key(inner.render_pass, inner.active_hash_seed);
        if let Some(&framebuffer) = inner.framebuffer_cache.get(&key) {
            inner.framebuffer = framebuffer;
            return;
        }

        // Ordered views (contiguous colors + optional depth)
        let mut views: Vec<vk::ImageView> = Vec::with_capacity(MAX_COLOR_ATTACHMENT + 1);
        if self.is_default {
            debug_assert!(inner.attachment_views[image_index] != vk::ImageView::null());
            views.push(inner.attachment_views[image_index]);
        } else {
            for index in 0..MAX_COLOR_ATTACHMENT {
                if inner.attachment_views[index] != vk::ImageView::null() {
                    views.push(inner.attachment_views[index]);
                } else {
                    break;
                }
            }
        }
        if inner.attachment_views[DEPTH_VIEW_INDEX] != vk::ImageView::null() {
            views.push(inner.attachment_views[DEPTH_VIEW_INDEX]);
        }

        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(inner.render_pass)
            .attachments(&views)
            .width(width)
            .height(height)
            .layers(1);

        let framebuffer = unsafe {
            self.ctx
                .device
                .create_framebuffer(&create_info, None)
                .expect("Failed to create VkFramebuffer")
        };
        inner.stats.framebuffer_creations += 1;
        inner.framebuffer_cache.insert(key, framebuffer);
        inner.framebuffer = framebuffer;
    }
}

impl RenderTarget for VulkanRenderTarget {
    fn is_default(&self) -> bool {
        self.is_default
    }

    fn set_color_attachment(&self, index: usize, texture: Option<Arc<dyn Texture>>, level: u32) {
        if index >= MAX_COLOR_ATTACHMENT {
            engine_error!("nebula::vulkan", "color attachment index {} out of range", index);
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        inner.color[index] = texture.map(|texture| AttachmentSlot { texture, level });
        inner.dirty_flags |= mrt_color_flag(index);
    }

    fn set_depth_stencil_attachment(&self, texture: Option<Arc<dyn Texture>>) {
        let mut inner = self.inner.lock().unwrap();
        inner.depth_stencil = texture.map(|texture| AttachmentSlot { texture, level: 0 });
        inner.dirty_flags |= TargetBufferFlags::DEPTH_AND_STENCIL;
    }

    fn color_attachment(&self, index: usize) -> Option<Arc<dyn Texture>> {
        let inner = self.inner.lock().unwrap();
        inner
            .color
            .get(index)?
            .as_ref()
            .map(|slot| Arc::clone(&slot.texture))
    }

    fn depth_stencil_attachment(&self) -> Option<Arc<dyn Texture>> {
        let inner = self.inner.lock().unwrap();
        inner
            .depth_stencil
            .as_ref()
            .map(|slot| Arc::clone(&slot.texture))
    }
}

impl Drop for VulkanRenderTarget {
    fn drop(&mut self) {
        // Cached passes/framebuffers may be referenced by in-flight work
        self.ctx.wait_device_idle();
        self.invalidate();
    }
}

#[cfg(test)]
#[path = "vulkan_render_target_tests.rs"]
mod tests;
