/// VulkanVertexLayout - vertex input bindings/attributes baked at creation

use ash::vk;
use nebula_engine::nebula::rhi::{VertexLayout, VertexLayoutDesc};

use crate::vulkan_utils::to_vk_vertex_format;

/// Binding 0 feeds per-vertex data, binding 1 per-instance data
pub const VERTEX_BINDING_INDEX: u32 = 0;
pub const INSTANCE_BINDING_INDEX: u32 = 1;

pub struct VulkanVertexLayout {
    desc: VertexLayoutDesc,
    hash: u64,
    bindings: Vec<vk::VertexInputBindingDescription>,
    attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl VulkanVertexLayout {
    pub fn new(desc: VertexLayoutDesc) -> Self {
        let hash = desc.key_hash();

        let mut bindings = vec![vk::VertexInputBindingDescription {
            binding: VERTEX_BINDING_INDEX,
            stride: desc.stride,
            input_rate: vk::VertexInputRate::VERTEX,
        }];
        let has_instanced = desc.attributes.iter().any(|a| a.instanced);
        if has_instanced {
            bindings.push(vk::VertexInputBindingDescription {
                binding: INSTANCE_BINDING_INDEX,
                stride: desc.instance_stride,
                input_rate: vk::VertexInputRate::INSTANCE,
            });
        }

        let attributes = desc
            .attributes
            .iter()
            .map(|attr| vk::VertexInputAttributeDescription {
                location: attr.location,
                binding: if attr.instanced {
                    INSTANCE_BINDING_INDEX
                } else {
                    VERTEX_BINDING_INDEX
                },
                format: to_vk_vertex_format(attr.format),
                offset: attr.offset,
            })
            .collect();

        Self {
            desc,
            hash,
            bindings,
            attributes,
        }
    }

    pub(crate) fn binding_descriptions(&self) -> &[vk::VertexInputBindingDescription] {
        &self.bindings
    }

    pub(crate) fn attribute_descriptions(&self) -> &[vk::VertexInputAttributeDescription] {
        &self.attributes
    }

    pub(crate) fn has_instanced_binding(&self) -> bool {
        self.bindings.len() > 1
    }
}

impl VertexLayout for VulkanVertexLayout {
    fn hash(&self) -> u64 {
        self.hash
    }

    fn desc(&self) -> &VertexLayoutDesc {
        &self.desc
    }
}
