/// VulkanDepthStencilState - depth/stencil description + hash for pipeline keys

use ash::vk;
use nebula_engine::nebula::rhi::{DepthStencilDesc, DepthStencilFlags, DepthStencilState, StencilDesc};
use std::sync::Mutex;

use crate::vulkan_utils::{to_vk_compare_op, to_vk_stencil_op};

pub struct VulkanDepthStencilState {
    desc: Mutex<DepthStencilDesc>,
}

impl VulkanDepthStencilState {
    pub fn new() -> Self {
        Self {
            desc: Mutex::new(DepthStencilDesc::default()),
        }
    }

    pub(crate) fn desc(&self) -> DepthStencilDesc {
        *self.desc.lock().unwrap()
    }
}

impl Default for VulkanDepthStencilState {
    fn default() -> Self {
        Self::new()
    }
}

impl DepthStencilState for VulkanDepthStencilState {
    fn update(&self, desc: &DepthStencilDesc) {
        *self.desc.lock().unwrap() = *desc;
    }

    fn state_hash(&self) -> u64 {
        self.desc.lock().unwrap().key_hash()
    }
}

fn to_vk_stencil_op_state(desc: &StencilDesc) -> vk::StencilOpState {
    vk::StencilOpState {
        fail_op: to_vk_stencil_op(desc.stencil_failure_operation),
        pass_op: to_vk_stencil_op(desc.depth_stencil_pass_operation),
        depth_fail_op: to_vk_stencil_op(desc.depth_failure_operation),
        compare_op: to_vk_compare_op(desc.stencil_compare_function),
        compare_mask: desc.read_mask,
        write_mask: desc.write_mask,
        // set dynamically via vkCmdSetStencilReference
        reference: 0,
    }
}

/// Build the fixed-function create-info for a description
pub(crate) fn to_vk_depth_stencil_state(
    desc: &DepthStencilDesc,
) -> vk::PipelineDepthStencilStateCreateInfo<'static> {
    vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(desc.flags.contains(DepthStencilFlags::DEPTH_TEST))
        .depth_write_enable(desc.flags.contains(DepthStencilFlags::DEPTH_WRITE))
        .depth_compare_op(to_vk_compare_op(desc.depth_compare_function))
        .depth_bounds_test_enable(false)
        .stencil_test_enable(desc.flags.contains(DepthStencilFlags::STENCIL_TEST))
        .front(to_vk_stencil_op_state(&desc.front_face_stencil))
        .back(to_vk_stencil_op_state(&desc.back_face_stencil))
}
