/// VulkanDriver - instance/device bring-up and the resource factory
///
/// Owns the instance, physical/logical device, queues, surface, and the
/// shared GpuContext every resource hangs off. Adapter selection filters
/// devices exposing a graphics queue and scores the rest by power
/// preference; no usable device is fatal.

use ash::vk::{self, Handle};
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use nebula_engine::nebula::rhi::{
    Buffer, BufferType, BufferUsage, DepthStencilState, Driver, DriverConfig, PowerPreference,
    Program, RenderPipeline, RenderTarget, SamplerDesc, SamplerHandle, Texture, TextureDesc,
    VertexLayout, VertexLayoutDesc,
};
use nebula_engine::nebula::Result;
use nebula_engine::{engine_bail, engine_err, engine_info, engine_warn};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::CStr;
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

use crate::debug;
use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_context::{DeviceCapabilities, GpuContext};
use crate::vulkan_depth_stencil::VulkanDepthStencilState;
use crate::vulkan_program::VulkanProgram;
use crate::vulkan_render_context::VulkanRenderContext;
use crate::vulkan_render_pipeline::VulkanRenderPipeline;
use crate::vulkan_render_target::VulkanRenderTarget;
use crate::vulkan_texture::VulkanTexture;
use crate::vulkan_vertex_layout::VulkanVertexLayout;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Everything the adapter score depends on, gathered per device
pub(crate) struct AdapterCandidate {
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub device_local_vram: u64,
    /// Enumeration order; ties resolve to the first-enumerated device
    pub index: usize,
}

/// Score one graphics-capable adapter under a power preference
///
/// HighPerformance favors discrete GPUs, then newer API versions, then VRAM
/// (a point per 256 MiB); LowPower favors integrated GPUs; Auto falls back
/// to enumeration order.
pub(crate) fn score_adapter(candidate: &AdapterCandidate, preference: PowerPreference) -> i64 {
    let mut score: i64 = 0;
    match preference {
        PowerPreference::HighPerformance => {
            if candidate.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
                score += 100;
                score += candidate.api_version as i64;
                score += (candidate.device_local_vram / (256 * 1024 * 1024)) as i64;
            }
        }
        PowerPreference::LowPower => {
            if candidate.device_type == vk::PhysicalDeviceType::INTEGRATED_GPU {
                score += 100;
            }
        }
        PowerPreference::Auto => {
            score += 100 - candidate.index as i64;
        }
    }
    score
}

fn vendor_to_string(vendor_id: u32) -> &'static str {
    // Common PCI vendor IDs; Vulkan doesn't standardize vendor strings
    match vendor_id {
        0x10DE => "NVIDIA",
        0x8086 => "Intel",
        0x1002 => "AMD",
        0x13B5 => "ARM",
        0x5143 => "Qualcomm",
        0x106B => "Apple",
        0x144D => "Samsung",
        0x15AD => "VMware",
        0x1AE0 => "Google",
        0x14E4 => "Broadcom",
        _ => "Unknown",
    }
}

pub struct VulkanDriver {
    _entry: ash::Entry,
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    surface_extent: vk::Extent2D,

    config: DriverConfig,

    vendor: String,
    renderer: String,
    version: String,

    gpu_context: Arc<GpuContext>,
}

impl VulkanDriver {
    /// Bring up instance, device, queues, and the shared context
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(
        window: &W,
        width: u32,
        height: u32,
        config: DriverConfig,
    ) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load().map_err(|e| {
                engine_err!("nebula::vulkan", "Failed to load Vulkan library: {:?}", e)
            })?;

            // ===== INSTANCE =====

            let app_name = std::ffi::CString::new(config.app_name.as_str()).unwrap_or_default();
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, 1, 0, 0))
                .engine_name(c"Nebula")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            let display_handle = window.display_handle().map_err(|e| {
                engine_err!("nebula::vulkan", "Failed to get display handle: {}", e)
            })?;
            let mut extension_names =
                ash_window::enumerate_required_extensions(display_handle.as_raw())
                    .map_err(|e| {
                        engine_err!("nebula::vulkan", "Failed to get required extensions: {}", e)
                    })?
                    .to_vec();

            let use_validation = config.enable_validation
                && debug::is_validation_layer_available(&entry, VALIDATION_LAYER);
            if config.enable_validation && !use_validation {
                engine_warn!("nebula::vulkan", "Vulkan validation layer not available");
            }

            let layer_names = if use_validation {
                vec![VALIDATION_LAYER.as_ptr()]
            } else {
                vec![]
            };
            let mut debug_create_info = debug::messenger_create_info();
            if use_validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            }

            let mut create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);
            if use_validation {
                create_info = create_info.push_next(&mut debug_create_info);
            }

            let instance = entry.create_instance(&create_info, None).map_err(|e| {
                engine_err!("nebula::vulkan", "Failed to create Vulkan instance: {:?}", e)
            })?;

            let (debug_utils_loader, debug_messenger) = if use_validation {
                let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
                let messenger = loader
                    .create_debug_utils_messenger(&debug::messenger_create_info(), None)
                    .map_err(|e| {
                        engine_err!("nebula::vulkan", "Failed to create debug messenger: {:?}", e)
                    })?;
                (Some(loader), Some(messenger))
            } else {
                (None, None)
            };

            // ===== SURFACE =====

            let window_handle = window.window_handle().map_err(|e| {
                engine_err!("nebula::vulkan", "Failed to get window handle: {}", e)
            })?;
            let surface = ash_window::create_surface(
                &entry,
                &instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| engine_err!("nebula::vulkan", "Failed to create surface: {:?}", e))?;
            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

            // ===== ADAPTER =====

            let physical_devices = instance.enumerate_physical_devices().map_err(|e| {
                engine_err!("nebula::vulkan", "Failed to enumerate physical devices: {:?}", e)
            })?;

            let mut best_device = vk::PhysicalDevice::null();
            let mut best_graphics_family = u32::MAX;
            let mut best_score = -1i64;
            for (index, &physical_device) in physical_devices.iter().enumerate() {
                let queue_families =
                    instance.get_physical_device_queue_family_properties(physical_device);
                // Skip devices without a graphics queue
                let Some(graphics_family) = queue_families
                    .iter()
                    .position(|qf| {
                        qf.queue_count > 0 && qf.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                    })
                    .map(|i| i as u32)
                else {
                    continue;
                };

                let props = instance.get_physical_device_properties(physical_device);
                let memory_props = instance.get_physical_device_memory_properties(physical_device);
                let device_local_vram = memory_props.memory_heaps
                    [..memory_props.memory_heap_count as usize]
                    .iter()
                    .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
                    .map(|heap| heap.size)
                    .sum();

                let candidate = AdapterCandidate {
                    device_type: props.device_type,
                    api_version: props.api_version,
                    device_local_vram,
                    index,
                };
                let score = score_adapter(&candidate, config.power_preference);
                if score > best_score {
                    best_score = score;
                    best_device = physical_device;
                    best_graphics_family = graphics_family;
                }
            }
            if best_device == vk::PhysicalDevice::null() {
                engine_bail!("nebula::vulkan", "No GPU with a graphics queue available");
            }
            let physical_device = best_device;
            let graphics_family = best_graphics_family;

            // Present queue family: first family able to present this surface
            let queue_families =
                instance.get_physical_device_queue_family_properties(physical_device);
            let Some(present_family) = (0..queue_families.len() as u32).find(|&i| {
                surface_loader
                    .get_physical_device_surface_support(physical_device, i, surface)
                    .unwrap_or(false)
            }) else {
                engine_bail!("nebula::vulkan", "No present queue family found");
            };

            // ===== CAPABILITY TIERS =====

            let extension_props = instance
                .enumerate_device_extension_properties(physical_device)
                .unwrap_or_default();
            let has_extension = |name: &CStr| {
                extension_props
                    .iter()
                    .any(|prop| unsafe { CStr::from_ptr(prop.extension_name.as_ptr()) } == name)
            };

            if !has_extension(ash::khr::swapchain::NAME) {
                engine_bail!("nebula::vulkan", "Device lacks VK_KHR_swapchain");
            }
            let supports_extended_dynamic_state =
                has_extension(ash::ext::extended_dynamic_state::NAME);

            let mut dyn_state3_props =
                vk::PhysicalDeviceExtendedDynamicState3PropertiesEXT::default();
            let mut props2 =
                vk::PhysicalDeviceProperties2::default().push_next(&mut dyn_state3_props);
            instance.get_physical_device_properties2(physical_device, &mut props2);
            let topology_unrestricted =
                dyn_state3_props.dynamic_primitive_topology_unrestricted == vk::TRUE;
            engine_info!(
                "nebula::vulkan",
                "extendedDynamicState={} dynamicPrimitiveTopologyUnrestricted={}",
                supports_extended_dynamic_state,
                topology_unrestricted
            );

            let supported_features = instance.get_physical_device_features(physical_device);
            let sampler_anisotropy = supported_features.sampler_anisotropy == vk::TRUE;

            // ===== DEVICE =====

            let mut device_extensions = vec![ash::khr::swapchain::NAME.as_ptr()];
            if supports_extended_dynamic_state {
                device_extensions.push(ash::ext::extended_dynamic_state::NAME.as_ptr());
            }

            let queue_priorities = [1.0f32];
            let queue_infos: Vec<vk::DeviceQueueCreateInfo> = if graphics_family == present_family {
                vec![vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(graphics_family)
                    .queue_priorities(&queue_priorities)]
            } else {
                vec![
                    vk::DeviceQueueCreateInfo::default()
                        .queue_family_index(graphics_family)
                        .queue_priorities(&queue_priorities),
                    vk::DeviceQueueCreateInfo::default()
                        .queue_family_index(present_family)
                        .queue_priorities(&queue_priorities),
                ]
            };

            let enabled_features =
                vk::PhysicalDeviceFeatures::default().sampler_anisotropy(sampler_anisotropy);
            let mut ext_dyn_state_features =
                vk::PhysicalDeviceExtendedDynamicStateFeaturesEXT::default()
                    .extended_dynamic_state(true);

            let mut device_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_infos)
                .enabled_extension_names(&device_extensions)
                .enabled_features(&enabled_features);
            if supports_extended_dynamic_state {
                device_info = device_info.push_next(&mut ext_dyn_state_features);
            }

            let device = instance
                .create_device(physical_device, &device_info, None)
                .map_err(|e| engine_err!("nebula::vulkan", "vkCreateDevice failed: {:?}", e))?;

            let graphics_queue = device.get_device_queue(graphics_family, 0);
            let present_queue = device.get_device_queue(present_family, 0);

            // ===== ALLOCATOR + SHARED CONTEXT =====

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| engine_err!("nebula::vulkan", "Failed to create GPU allocator: {:?}", e))?;

            // Transient pool for reusable one-shot uploads
            let upload_pool_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(graphics_family)
                .flags(
                    vk::CommandPoolCreateFlags::TRANSIENT
                        | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
                );
            let upload_command_pool = device
                .create_command_pool(&upload_pool_info, None)
                .map_err(|e| {
                    engine_err!("nebula::vulkan", "Failed to create upload command pool: {:?}", e)
                })?;

            let props = instance.get_physical_device_properties(physical_device);
            let memory_properties = instance.get_physical_device_memory_properties(physical_device);
            let capabilities = DeviceCapabilities {
                min_uniform_buffer_offset_alignment: props
                    .limits
                    .min_uniform_buffer_offset_alignment
                    .max(1),
                extended_dynamic_state: supports_extended_dynamic_state,
                dynamic_primitive_topology_unrestricted: topology_unrestricted,
                sampler_anisotropy,
                max_sampler_anisotropy: props.limits.max_sampler_anisotropy,
                max_texture_size: props.limits.max_image_dimension2_d,
            };

            let vendor = vendor_to_string(props.vendor_id).to_string();
            let renderer = CStr::from_ptr(props.device_name.as_ptr())
                .to_string_lossy()
                .into_owned();
            let version = format!(
                "Vulkan-{}.{}.{}",
                vk::api_version_major(props.api_version),
                vk::api_version_minor(props.api_version),
                vk::api_version_patch(props.api_version)
            );
            engine_info!("nebula::vulkan", "using {} ({}) {}", renderer, vendor, version);

            let gpu_context = Arc::new(GpuContext::new(
                device,
                instance,
                physical_device,
                Arc::new(Mutex::new(allocator)),
                graphics_queue,
                graphics_family,
                present_queue,
                present_family,
                upload_command_pool,
                memory_properties,
                capabilities,
                debug_utils_loader,
                debug_messenger,
            ));

            Ok(Self {
                _entry: entry,
                surface,
                surface_loader,
                surface_extent: vk::Extent2D { width, height },
                config,
                vendor,
                renderer,
                version,
                gpu_context,
            })
        }
    }

    /// The shared context resources hang off (explicit, never global)
    pub fn gpu_context(&self) -> &Arc<GpuContext> {
        &self.gpu_context
    }

    /// Create the per-surface frame driver for this driver's surface
    pub fn create_render_context(&self) -> Result<VulkanRenderContext> {
        VulkanRenderContext::new(
            Arc::clone(&self.gpu_context),
            self.surface,
            self.surface_loader.clone(),
            self.surface_extent,
            self.config.vsync,
            self.config.uniform_ring_capacity,
        )
    }
}

impl Driver for VulkanDriver {
    fn create_buffer(
        &self,
        size: usize,
        buffer_type: BufferType,
        usage: BufferUsage,
        initial: Option<&[u8]>,
    ) -> Result<Arc<dyn Buffer>> {
        let buffer =
            VulkanBuffer::new(Arc::clone(&self.gpu_context), size, buffer_type, usage, initial)?;
        Ok(Arc::new(buffer))
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<Arc<dyn Texture>> {
        let texture = VulkanTexture::new(Arc::clone(&self.gpu_context), desc)?;
        Ok(Arc::new(texture))
    }

    fn create_render_target(
        &self,
        color_attachment: Option<Arc<dyn Texture>>,
        depth_stencil_attachment: Option<Arc<dyn Texture>>,
    ) -> Result<Arc<dyn RenderTarget>> {
        let render_target = VulkanRenderTarget::new(Arc::clone(&self.gpu_context), false);
        if let Some(color) = color_attachment {
            render_target.set_color_attachment(0, Some(color), 0);
        }
        render_target.set_depth_stencil_attachment(depth_stencil_attachment);
        Ok(Arc::new(render_target))
    }

    fn create_depth_stencil_state(&self) -> Arc<dyn DepthStencilState> {
        Arc::new(VulkanDepthStencilState::new())
    }

    fn create_render_pipeline(&self) -> Arc<dyn RenderPipeline> {
        Arc::new(VulkanRenderPipeline::new(Arc::clone(&self.gpu_context)))
    }

    fn create_program(
        &self,
        vertex_spirv: &[u32],
        fragment_spirv: &[u32],
    ) -> Result<Arc<dyn Program>> {
        let program =
            VulkanProgram::new(Arc::clone(&self.gpu_context), vertex_spirv, fragment_spirv)?;
        Ok(Arc::new(program))
    }

    fn create_vertex_layout(&self, desc: VertexLayoutDesc) -> Arc<dyn VertexLayout> {
        Arc::new(VulkanVertexLayout::new(desc))
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Option<SamplerHandle> {
        self.gpu_context
            .resolve_sampler(desc)
            .map(|sampler| SamplerHandle(sampler.as_raw()))
    }

    fn vendor(&self) -> String {
        self.vendor.clone()
    }

    fn renderer_name(&self) -> String {
        self.renderer.clone()
    }

    fn version(&self) -> String {
        self.version.clone()
    }

    fn wait_idle(&self) {
        self.gpu_context.wait_device_idle();
    }
}

impl Drop for VulkanDriver {
    fn drop(&mut self) {
        unsafe {
            // Wait for the device, then flush every deferred disposal
            self.gpu_context.destroy_stale_resources();

            // 1. Shutdown the sampler cache while the device is alive
            self.gpu_context
                .sampler_cache
                .lock()
                .unwrap()
                .shutdown(&self.gpu_context.device);

            // 2. Destroy the upload command pool
            {
                let mut pool = self.gpu_context.upload_command_pool.lock().unwrap();
                if *pool != vk::CommandPool::null() {
                    self.gpu_context.device.destroy_command_pool(*pool, None);
                    *pool = vk::CommandPool::null();
                }
            }

            // 3. Drop the allocator: frees VkDeviceMemory pages BEFORE the
            //    device goes away. Requires this to be the sole GpuContext
            //    owner; resources still alive keep the device alive instead.
            if let Some(ctx) = Arc::get_mut(&mut self.gpu_context) {
                ManuallyDrop::drop(&mut ctx.allocator);

                // 4. Debug messenger BEFORE device and instance
                if let (Some(loader), Some(messenger)) =
                    (&ctx.debug_utils_loader, &ctx.debug_messenger)
                {
                    loader.destroy_debug_utils_messenger(*messenger, None);
                }

                // 5. Surface, then device, then instance
                self.surface_loader.destroy_surface(self.surface, None);
                ctx.device.destroy_device(None);
                ctx.instance.destroy_instance(None);
            } else {
                engine_warn!(
                    "nebula::vulkan",
                    "GpuContext still shared at driver drop; leaking device objects"
                );
            }
        }
    }
}

#[cfg(test)]
#[path = "vulkan_driver_tests.rs"]
mod tests;
