/// Image layout tracking and barrier inference
///
/// Vulkan provides no "current layout" query: the engine is the sole source
/// of truth for every subresource's layout, and a missed update is a
/// correctness bug (validation error / undefined behavior), not a
/// performance issue. Every read or write path consults and updates the
/// tracker; nothing ever assumes a layout.

use ash::vk;

/// Sparse (mip level x array layer) table of the image's current layout
///
/// Subresources never explicitly set report `UNDEFINED`, matching the layout
/// of a freshly created image.
pub struct ImageLayoutTracker {
    layouts: Vec<Vec<vk::ImageLayout>>,
}

impl ImageLayoutTracker {
    pub fn new(level_capacity: usize, layer_capacity: usize) -> Self {
        Self {
            layouts: vec![vec![vk::ImageLayout::UNDEFINED; layer_capacity]; level_capacity],
        }
    }

    /// Layout most recently set for (level, layer), UNDEFINED when never set
    pub fn layout(&self, level: u32, layer: u32) -> vk::ImageLayout {
        self.layouts
            .get(level as usize)
            .and_then(|layers| layers.get(layer as usize))
            .copied()
            .unwrap_or(vk::ImageLayout::UNDEFINED)
    }

    pub fn set_layout(&mut self, level: u32, layer: u32, layout: vk::ImageLayout) {
        let level = level as usize;
        let layer = layer as usize;
        if level >= self.layouts.len() {
            self.layouts.resize(level + 1, Vec::new());
        }
        if layer >= self.layouts[level].len() {
            self.layouts[level].resize(layer + 1, vk::ImageLayout::UNDEFINED);
        }
        self.layouts[level][layer] = layout;
    }
}

/// Access mask and pipeline stage implied by a layout on the source side
///
/// Fixed lookup, not queried from the driver: the barrier must describe what
/// the *engine* knows happened before and what happens next.
pub fn src_barrier_masks(old_layout: vk::ImageLayout) -> (vk::AccessFlags, vk::PipelineStageFlags) {
    match old_layout {
        vk::ImageLayout::UNDEFINED => {
            (vk::AccessFlags::empty(), vk::PipelineStageFlags::TOP_OF_PIPE)
        }
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => {
            (vk::AccessFlags::TRANSFER_WRITE, vk::PipelineStageFlags::TRANSFER)
        }
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => {
            (vk::AccessFlags::TRANSFER_READ, vk::PipelineStageFlags::TRANSFER)
        }
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => {
            (vk::AccessFlags::SHADER_READ, vk::PipelineStageFlags::FRAGMENT_SHADER)
        }
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => (
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => (
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        ),
        _ => (vk::AccessFlags::empty(), vk::PipelineStageFlags::ALL_COMMANDS),
    }
}

/// Access mask and pipeline stage implied by a layout on the destination side
pub fn dst_barrier_masks(new_layout: vk::ImageLayout) -> (vk::AccessFlags, vk::PipelineStageFlags) {
    match new_layout {
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => {
            (vk::AccessFlags::TRANSFER_WRITE, vk::PipelineStageFlags::TRANSFER)
        }
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => {
            (vk::AccessFlags::TRANSFER_READ, vk::PipelineStageFlags::TRANSFER)
        }
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => {
            (vk::AccessFlags::SHADER_READ, vk::PipelineStageFlags::FRAGMENT_SHADER)
        }
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => (
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => (
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        ),
        _ => (vk::AccessFlags::empty(), vk::PipelineStageFlags::ALL_COMMANDS),
    }
}

/// Record a layout transition barrier for a subresource range
pub fn transition_image_layout(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    range: vk::ImageSubresourceRange,
) {
    let (src_access, src_stage) = src_barrier_masks(old_layout);
    let (dst_access, dst_stage) = dst_barrier_masks(new_layout);

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
        .src_access_mask(src_access)
        .dst_access_mask(dst_access);

    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}

#[cfg(test)]
#[path = "vulkan_image_layout_tests.rs"]
mod tests;
