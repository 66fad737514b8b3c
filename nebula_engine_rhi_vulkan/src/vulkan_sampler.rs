/// SamplerCache - internal VkSampler management for the Vulkan backend
///
/// Creates and caches VkSampler objects on first use, keyed by the full
/// sampler description. Typical scenes only need a handful of samplers, so
/// this stays tiny.

use ash::vk;
use nebula_engine::nebula::rhi::{CompareFunc, SamplerDesc, SamplerFilter};
use rustc_hash::FxHashMap;

use crate::vulkan_context::DeviceCapabilities;
use crate::vulkan_utils::{to_vk_address_mode, to_vk_compare_op};

/// Internal sampler cache - creates VkSampler on first use, destroyed by the
/// driver at shutdown while the device is still alive
pub(crate) struct SamplerCache {
    cache: FxHashMap<SamplerDesc, vk::Sampler>,
}

impl SamplerCache {
    pub(crate) fn new() -> Self {
        Self {
            cache: FxHashMap::default(),
        }
    }

    /// Get or create a VkSampler for the description
    ///
    /// Returns None when the description asks for anisotropic filtering on a
    /// device without the feature; the caller degrades.
    pub(crate) fn get(
        &mut self,
        device: &ash::Device,
        capabilities: &DeviceCapabilities,
        desc: &SamplerDesc,
    ) -> Option<vk::Sampler> {
        if let Some(&sampler) = self.cache.get(desc) {
            return Some(sampler);
        }

        let wants_anisotropy = desc.min_filter == SamplerFilter::Anisotropic;
        if wants_anisotropy && !capabilities.sampler_anisotropy {
            return None;
        }

        let filter_of = |filter: SamplerFilter| match filter {
            SamplerFilter::Nearest => vk::Filter::NEAREST,
            // anisotropy is expressed through anisotropy_enable, not the filter
            SamplerFilter::Linear | SamplerFilter::Anisotropic => vk::Filter::LINEAR,
        };
        let mipmap_mode = match desc.mip_filter {
            SamplerFilter::Nearest => vk::SamplerMipmapMode::NEAREST,
            _ => vk::SamplerMipmapMode::LINEAR,
        };

        let mut create_info = vk::SamplerCreateInfo::default()
            .mag_filter(filter_of(desc.mag_filter))
            .min_filter(filter_of(desc.min_filter))
            .mipmap_mode(mipmap_mode)
            .address_mode_u(to_vk_address_mode(desc.s_address_mode))
            .address_mode_v(to_vk_address_mode(desc.t_address_mode))
            .address_mode_w(to_vk_address_mode(desc.w_address_mode))
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false);

        // Compare func is only meaningful for shadow samplers
        match desc.compare_func {
            Some(func) if func != CompareFunc::Always && func != CompareFunc::Never => {
                create_info = create_info
                    .compare_enable(true)
                    .compare_op(to_vk_compare_op(func));
            }
            _ => {
                create_info = create_info
                    .compare_enable(false)
                    .compare_op(vk::CompareOp::ALWAYS);
            }
        }

        if wants_anisotropy {
            let max = (desc.anisotropy.max(1) as f32).min(capabilities.max_sampler_anisotropy);
            create_info = create_info.anisotropy_enable(true).max_anisotropy(max);
        } else {
            create_info = create_info.anisotropy_enable(false).max_anisotropy(1.0);
        }

        let sampler = unsafe { device.create_sampler(&create_info, None).ok()? };
        self.cache.insert(*desc, sampler);
        Some(sampler)
    }

    /// Destroy all cached VkSamplers. Must run while the device is alive.
    pub(crate) fn shutdown(&mut self, device: &ash::Device) {
        for (_, sampler) in self.cache.drain() {
            unsafe {
                device.destroy_sampler(sampler, None);
            }
        }
    }
}
