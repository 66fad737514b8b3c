/// VulkanTexture - image + view + sampler with explicit layout tracking
///
/// The layout tracker is the invariant-bearing piece: every upload, blit,
/// attachment use, and readback consults and updates it. Swapchain-wrapped
/// textures do not own their image (`owns_resources = false`) and must not
/// destroy it.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use nebula_engine::nebula::rhi::{
    compute_mip_levels, SamplerDesc, Texture, TextureCubeFace, TextureDesc, TextureType,
    TextureUsage,
};
use nebula_engine::nebula::Result;
use nebula_engine::{engine_bail, engine_err, engine_error, engine_warn};
use std::sync::{Arc, Mutex};

use crate::vulkan_context::{DisposableResource, GpuContext};
use crate::vulkan_image_layout::{transition_image_layout, ImageLayoutTracker};
use crate::vulkan_utils::{aspect_mask_of, to_vk_format};

const LEVEL_INITIAL_CAPS: usize = 16;
const LAYER_INITIAL_CAPS: usize = 8;

/// Native image + view (+ allocation for owned images)
pub(crate) struct TextureHandle {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub allocation: Option<Allocation>,
}

impl TextureHandle {
    fn null() -> Self {
        Self {
            image: vk::Image::null(),
            view: vk::ImageView::null(),
            allocation: None,
        }
    }

    fn is_valid(&self) -> bool {
        self.image != vk::Image::null()
    }
}

struct TextureInner {
    handle: TextureHandle,
    layout_tracker: ImageLayoutTracker,
    sampler: vk::Sampler,
    /// Set when a full mip chain was generated at runtime
    generated_mip_levels: u32,
}

pub struct VulkanTexture {
    ctx: Arc<GpuContext>,
    desc: TextureDesc,
    owns_resources: bool,
    inner: Mutex<TextureInner>,
}

impl VulkanTexture {
    /// Create a texture; the native image is created lazily on first use
    pub fn new(ctx: Arc<GpuContext>, desc: &TextureDesc) -> Result<Self> {
        if desc.width == 0 || desc.height == 0 {
            engine_bail!("nebula::vulkan", "Texture dimensions must be non-zero");
        }
        if to_vk_format(desc.pixel_format) == vk::Format::UNDEFINED {
            engine_bail!(
                "nebula::vulkan",
                "Vulkan does not support pixel format {:?}",
                desc.pixel_format
            );
        }

        let sampler = ctx.resolve_sampler(&desc.sampler_desc).unwrap_or_else(|| {
            engine_warn!(
                "nebula::vulkan",
                "Sampler description unsupported, falling back to default"
            );
            ctx.resolve_sampler(&SamplerDesc::default())
                .unwrap_or(vk::Sampler::null())
        });

        Ok(Self {
            ctx,
            desc: desc.clone(),
            owns_resources: true,
            inner: Mutex::new(TextureInner {
                handle: TextureHandle::null(),
                layout_tracker: ImageLayoutTracker::new(LEVEL_INITIAL_CAPS, LAYER_INITIAL_CAPS),
                sampler,
                generated_mip_levels: 0,
            }),
        })
    }

    /// Wrap an externally-owned image (swapchain); never destroys it
    pub(crate) fn from_swapchain_image(
        ctx: Arc<GpuContext>,
        image: vk::Image,
        view: vk::ImageView,
        desc: TextureDesc,
    ) -> Self {
        let sampler = ctx
            .resolve_sampler(&desc.sampler_desc)
            .unwrap_or(vk::Sampler::null());
        Self {
            ctx,
            desc,
            owns_resources: false,
            inner: Mutex::new(TextureInner {
                handle: TextureHandle {
                    image,
                    view,
                    allocation: None,
                },
                layout_tracker: ImageLayoutTracker::new(LEVEL_INITIAL_CAPS, LAYER_INITIAL_CAPS),
                sampler,
                generated_mip_levels: 0,
            }),
        }
    }

    fn is_cube(&self) -> bool {
        self.desc.texture_type == TextureType::TexCube
    }

    fn array_layers(&self) -> u32 {
        if self.is_cube() {
            6
        } else {
            self.desc.array_size.max(1)
        }
    }

    /// Effective mip count: explicit, generated, or 1
    fn mip_levels(&self, inner: &TextureInner) -> u32 {
        if inner.generated_mip_levels != 0 {
            inner.generated_mip_levels
        } else {
            self.desc.mip_levels.max(1)
        }
    }

    fn should_generate_mipmaps(&self, level: u32) -> bool {
        // mip_levels == 0 requests a runtime-generated full chain
        self.desc.mip_levels == 0
            && level == 0
            && !self.desc.pixel_format.is_compressed()
            && self.desc.usage != TextureUsage::RenderTarget
    }

    /// Create image + memory + view on first use
    fn ensure_native_texture(&self, inner: &mut TextureInner) -> Result<()> {
        if inner.handle.is_valid() {
            return Ok(());
        }

        let format = to_vk_format(self.desc.pixel_format);
        let is_cube = self.is_cube();
        let array_layers = self.array_layers();
        let mip_levels = if self.desc.mip_levels == 0 {
            compute_mip_levels(self.desc.width, self.desc.height)
        } else {
            self.desc.mip_levels
        };

        let mut usage = vk::ImageUsageFlags::TRANSFER_DST
            | vk::ImageUsageFlags::SAMPLED
            | vk::ImageUsageFlags::TRANSFER_SRC;
        if self.desc.usage == TextureUsage::RenderTarget {
            if self.desc.pixel_format.is_depth_stencil() {
                usage |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
            } else {
                usage |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
            }
        }

        let image_info = vk::ImageCreateInfo::default()
            .flags(if is_cube {
                vk::ImageCreateFlags::CUBE_COMPATIBLE
            } else {
                vk::ImageCreateFlags::empty()
            })
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: self.desc.width,
                height: self.desc.height,
                depth: 1,
            })
            .mip_levels(mip_levels)
            .array_layers(array_layers)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe {
            self.ctx
                .device
                .create_image(&image_info, None)
                .map_err(|e| engine_err!("nebula::vulkan", "vkCreateImage failed: {:?}", e))?
        };

        let requirements = unsafe { self.ctx.device.get_image_memory_requirements(image) };
        let allocation = self
            .ctx
            .allocator
            .lock()
            .unwrap()
            .allocate(&AllocationCreateDesc {
                name: "nebula texture",
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| {
                unsafe { self.ctx.device.destroy_image(image, None) };
                engine_err!("nebula::vulkan", "Failed to allocate image memory: {:?}", e)
            })?;

        unsafe {
            self.ctx
                .device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .map_err(|e| engine_err!("nebula::vulkan", "vkBindImageMemory failed: {:?}", e))?;
        }

        let view_type = if is_cube {
            vk::ImageViewType::CUBE
        } else if self.desc.array_size > 1 {
            vk::ImageViewType::TYPE_2D_ARRAY
        } else {
            vk::ImageViewType::TYPE_2D
        };

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(view_type)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect_mask_of(self.desc.pixel_format),
                base_mip_level: 0,
                level_count: mip_levels,
                base_array_layer: 0,
                layer_count: array_layers,
            });

        let view = unsafe {
            self.ctx
                .device
                .create_image_view(&view_info, None)
                .map_err(|e| engine_err!("nebula::vulkan", "vkCreateImageView failed: {:?}", e))?
        };

        inner.handle = TextureHandle {
            image,
            view,
            allocation: Some(allocation),
        };
        Ok(())
    }

    pub(crate) fn native_image(&self) -> vk::Image {
        let mut inner = self.inner.lock().unwrap();
        if let Err(e) = self.ensure_native_texture(&mut inner) {
            engine_error!("nebula::vulkan", "native_image: {}", e);
        }
        inner.handle.image
    }

    pub(crate) fn native_view(&self) -> vk::ImageView {
        let mut inner = self.inner.lock().unwrap();
        if let Err(e) = self.ensure_native_texture(&mut inner) {
            engine_error!("nebula::vulkan", "native_view: {}", e);
        }
        inner.handle.view
    }

    pub(crate) fn sampler(&self) -> vk::Sampler {
        self.inner.lock().unwrap().sampler
    }

    // ===== LAYOUT TRACKING =====

    /// Transition the whole image to `new_layout`, tracked at (0, 0)
    pub(crate) fn transition_layout(&self, cmd: vk::CommandBuffer, new_layout: vk::ImageLayout) {
        let mut inner = self.inner.lock().unwrap();
        if let Err(e) = self.ensure_native_texture(&mut inner) {
            engine_error!("nebula::vulkan", "transition_layout: {}", e);
            return;
        }

        let old_layout = inner.layout_tracker.layout(0, 0);
        let range = vk::ImageSubresourceRange {
            aspect_mask: aspect_mask_of(self.desc.pixel_format),
            base_mip_level: 0,
            level_count: self.mip_levels(&inner),
            base_array_layer: 0,
            layer_count: self.array_layers(),
        };
        transition_image_layout(
            &self.ctx.device,
            cmd,
            inner.handle.image,
            old_layout,
            new_layout,
            range,
        );
        inner.layout_tracker.set_layout(0, 0, new_layout);
    }

    /// Layout of (level 0, layer 0) per the tracker
    pub(crate) fn current_layout(&self) -> vk::ImageLayout {
        self.inner.lock().unwrap().layout_tracker.layout(0, 0)
    }

    /// Record a layout the image reached without an explicit barrier here
    /// (render pass final layouts)
    pub(crate) fn set_known_layout(&self, layout: vk::ImageLayout) {
        self.inner.lock().unwrap().layout_tracker.set_layout(0, 0, layout);
    }

    // ===== UPLOADS =====

    fn upload_region(
        &self,
        xoffset: u32,
        yoffset: u32,
        width: u32,
        height: u32,
        level: u32,
        data: &[u8],
        layer: u32,
        upload_size: u64,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        self.ensure_native_texture(&mut inner)?;

        if (data.len() as u64) < upload_size {
            engine_bail!(
                "nebula::vulkan",
                "Texture upload data too small: {} < {}",
                data.len(),
                upload_size
            );
        }

        // Stage the bytes in a host-visible buffer, freed after the wait
        let (staging_buffer, staging_memory) = self.ctx.create_raw_buffer(
            upload_size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        unsafe {
            let mapped = self
                .ctx
                .device
                .map_memory(staging_memory, 0, upload_size, vk::MemoryMapFlags::empty())
                .map_err(|e| engine_err!("nebula::vulkan", "vkMapMemory (staging) failed: {:?}", e))?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped as *mut u8, upload_size as usize);
            self.ctx.device.unmap_memory(staging_memory);
        }

        let submission = self.ctx.start_isolate_submission()?;

        let aspect_mask = aspect_mask_of(self.desc.pixel_format);
        let range = vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: level,
            level_count: 1,
            base_array_layer: layer,
            layer_count: 1,
        };

        let old_layout = inner.layout_tracker.layout(level, layer);
        transition_image_layout(
            &self.ctx.device,
            submission.cmd,
            inner.handle.image,
            old_layout,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            range,
        );

        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            // 0 = tightly packed per format rules
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask,
                mip_level: level,
                base_array_layer: layer,
                layer_count: 1,
            },
            image_offset: vk::Offset3D {
                x: xoffset as i32,
                y: yoffset as i32,
                z: 0,
            },
            image_extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
        };
        unsafe {
            self.ctx.device.cmd_copy_buffer_to_image(
                submission.cmd,
                staging_buffer,
                inner.handle.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }

        transition_image_layout(
            &self.ctx.device,
            submission.cmd,
            inner.handle.image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            range,
        );
        inner
            .layout_tracker
            .set_layout(level, layer, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

        if self.should_generate_mipmaps(level) {
            self.generate_mipmaps(&mut inner, submission.cmd);
        }

        self.ctx.finish_isolate_submission(submission)?;

        unsafe {
            self.ctx.device.destroy_buffer(staging_buffer, None);
            self.ctx.device.free_memory(staging_memory, None);
        }
        Ok(())
    }

    /// Downsample level N-1 into level N through a blit chain
    ///
    /// Intermediate levels pass through TransferSrc/TransferDst and settle
    /// at ShaderReadOnly, tracked per level.
    fn generate_mipmaps(&self, inner: &mut TextureInner, cmd: vk::CommandBuffer) {
        let mip_levels = compute_mip_levels(self.desc.width, self.desc.height);
        if mip_levels <= 1 {
            return;
        }

        let layer_count = self.array_layers();
        let mut mip_width = self.desc.width as i32;
        let mut mip_height = self.desc.height as i32;

        for level in 1..mip_levels {
            let src_range = vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: level - 1,
                level_count: 1,
                base_array_layer: 0,
                layer_count,
            };
            let dst_range = vk::ImageSubresourceRange {
                base_mip_level: level,
                ..src_range
            };

            transition_image_layout(
                &self.ctx.device,
                cmd,
                inner.handle.image,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                src_range,
            );
            // First write to this level
            transition_image_layout(
                &self.ctx.device,
                cmd,
                inner.handle.image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                dst_range,
            );

            let dst_width = (mip_width / 2).max(1);
            let dst_height = (mip_height / 2).max(1);

            let blit = vk::ImageBlit {
                src_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: level - 1,
                    base_array_layer: 0,
                    layer_count,
                },
                src_offsets: [
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D { x: mip_width, y: mip_height, z: 1 },
                ],
                dst_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: level,
                    base_array_layer: 0,
                    layer_count,
                },
                dst_offsets: [
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D { x: dst_width, y: dst_height, z: 1 },
                ],
            };
            unsafe {
                self.ctx.device.cmd_blit_image(
                    cmd,
                    inner.handle.image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    inner.handle.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[blit],
                    vk::Filter::LINEAR,
                );
            }

            transition_image_layout(
                &self.ctx.device,
                cmd,
                inner.handle.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                dst_range,
            );
            transition_image_layout(
                &self.ctx.device,
                cmd,
                inner.handle.image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                src_range,
            );

            mip_width = dst_width;
            mip_height = dst_height;

            inner
                .layout_tracker
                .set_layout(level, 0, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        }

        inner.generated_mip_levels = mip_levels;
    }
}

impl Texture for VulkanTexture {
    fn desc(&self) -> TextureDesc {
        self.desc.clone()
    }

    fn update_data(&self, data: &[u8], width: u32, height: u32, level: u32, layer: u32) {
        self.update_sub_data(0, 0, width, height, level, data, layer);
    }

    fn update_sub_data(
        &self,
        xoffset: u32,
        yoffset: u32,
        width: u32,
        height: u32,
        level: u32,
        data: &[u8],
        layer: u32,
    ) {
        if data.is_empty() || width == 0 || height == 0 {
            return;
        }
        let upload_size = self.desc.pixel_format.slice_size(width, height) as u64;
        if let Err(e) = self.upload_region(xoffset, yoffset, width, height, level, data, layer, upload_size)
        {
            engine_error!("nebula::vulkan", "Texture upload failed: {}", e);
        }
    }

    fn update_compressed_data(&self, data: &[u8], width: u32, height: u32, level: u32, layer: u32) {
        self.update_compressed_sub_data(0, 0, width, height, level, data, layer);
    }

    fn update_compressed_sub_data(
        &self,
        xoffset: u32,
        yoffset: u32,
        width: u32,
        height: u32,
        level: u32,
        data: &[u8],
        layer: u32,
    ) {
        if data.is_empty() || width == 0 || height == 0 {
            return;
        }

        let block = self.desc.pixel_format.block_info();
        // Offsets must be block-aligned; width/height may end in a partial block
        if xoffset % block.width != 0 || yoffset % block.height != 0 {
            engine_error!(
                "nebula::vulkan",
                "Compressed upload offsets must be block-aligned ({}, {}) for {:?}",
                xoffset,
                yoffset,
                self.desc.pixel_format
            );
            return;
        }

        let expected_size = self.desc.pixel_format.slice_size(width, height) as u64;
        if data.len() as u64 != expected_size {
            engine_error!(
                "nebula::vulkan",
                "Compressed data size mismatch: got {}, expected {}",
                data.len(),
                expected_size
            );
            return;
        }

        if self.desc.mip_levels == 0 {
            engine_warn!(
                "nebula::vulkan",
                "Compressed textures do not support runtime mipmap generation; \
                 upload precomputed mip levels instead"
            );
        }

        if let Err(e) = self.upload_region(xoffset, yoffset, width, height, level, data, layer, expected_size)
        {
            engine_error!("nebula::vulkan", "Compressed texture upload failed: {}", e);
        }
    }

    fn update_face_data(&self, face: TextureCubeFace, data: &[u8]) {
        if !self.is_cube() {
            engine_error!("nebula::vulkan", "update_face_data on a non-cube texture");
            return;
        }
        self.update_sub_data(0, 0, self.desc.width, self.desc.height, 0, data, face as u32);
    }

    fn update_sampler_desc(&self, desc: &SamplerDesc) {
        if let Some(sampler) = self.ctx.resolve_sampler(desc) {
            self.inner.lock().unwrap().sampler = sampler;
        } else {
            engine_warn!("nebula::vulkan", "update_sampler_desc: unsupported sampler description");
        }
    }
}

impl Drop for VulkanTexture {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        // Sampler lifetime belongs to the shared cache
        inner.sampler = vk::Sampler::null();

        if !self.owns_resources {
            return;
        }

        let handle = std::mem::replace(&mut inner.handle, TextureHandle::null());
        if handle.view != vk::ImageView::null() {
            self.ctx
                .queue_disposal_current(DisposableResource::ImageView(handle.view));
        }
        if handle.image != vk::Image::null() {
            self.ctx.queue_disposal_current(DisposableResource::Image {
                image: handle.image,
                allocation: handle.allocation,
            });
        }
    }
}
