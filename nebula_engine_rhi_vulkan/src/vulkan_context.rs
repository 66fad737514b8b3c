/// GpuContext - shared GPU state for all Vulkan resources
///
/// Shared (via `Arc`) by every resource so that buffers and textures never
/// reach for a global: the device handle is threaded explicitly. Carries the
/// device, allocator, queues, the mutex-guarded transient upload pool, the
/// fenced deferred-disposal queue, and the one-shot "isolate submission"
/// path used for staging uploads and blits.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, Allocator};
use nebula_engine::nebula::rhi::SamplerDesc;
use nebula_engine::nebula::Result;
use nebula_engine::{engine_debug, engine_err, engine_error};
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::vulkan_sampler::SamplerCache;

/// A GPU resource whose destruction must wait for in-flight work
///
/// Closed sum over everything the backend defers: each entry carries the
/// native handle (plus its allocation for gpu-allocator-backed resources).
pub enum DisposableResource {
    Sampler(vk::Sampler),
    Image {
        image: vk::Image,
        allocation: Option<Allocation>,
    },
    ImageView(vk::ImageView),
    Buffer {
        buffer: vk::Buffer,
        allocation: Option<Allocation>,
    },
    Memory(vk::DeviceMemory),
}

/// A queued disposal tagged with the fence value that must complete first
pub struct PendingDisposal {
    pub fence_value: u64,
    pub resource: DisposableResource,
}

/// Extract the disposals that are safe to destroy at `completed_fence_value`
///
/// Pure selection so the retirement policy is testable without a device.
pub fn drain_ready_disposals(
    pending: &mut Vec<PendingDisposal>,
    completed_fence_value: u64,
) -> Vec<PendingDisposal> {
    let mut ready = Vec::new();
    let mut index = 0;
    while index < pending.len() {
        if pending[index].fence_value <= completed_fence_value {
            ready.push(pending.swap_remove(index));
        } else {
            index += 1;
        }
    }
    ready
}

/// One-shot command buffer + fence for synchronous GPU work
pub struct IsolateSubmission {
    pub cmd: vk::CommandBuffer,
    pub fence: vk::Fence,
}

/// Device limits and optional-feature tiers queried once at startup
#[derive(Debug, Clone, Copy)]
pub struct DeviceCapabilities {
    pub min_uniform_buffer_offset_alignment: u64,
    /// VK_EXT_extended_dynamic_state: cull mode / front face / topology as
    /// dynamic state
    pub extended_dynamic_state: bool,
    /// Whether dynamic topology may differ in class from the pipeline's
    /// baked topology
    pub dynamic_primitive_topology_unrestricted: bool,
    pub sampler_anisotropy: bool,
    pub max_sampler_anisotropy: f32,
    pub max_texture_size: u32,
}

/// Shared GPU context for all Vulkan resources.
///
/// Note: device and instance destruction is handled by VulkanDriver::drop()
/// to avoid issues with drop ordering; this struct's Drop intentionally does
/// nothing beyond releasing plain memory.
pub struct GpuContext {
    /// Vulkan logical device
    pub device: ash::Device,

    /// Vulkan instance (kept for swapchain loader creation; destroyed by the driver)
    pub instance: ash::Instance,

    pub physical_device: vk::PhysicalDevice,

    /// GPU memory allocator (shared, requires mutex for thread safety)
    /// Wrapped in ManuallyDrop so it is dropped BEFORE the device is destroyed
    pub allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,

    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,
    pub present_queue: vk::Queue,
    pub present_queue_family: u32,

    /// Transient command pool for isolate submissions. Mutex-guarded: asset
    /// loading may upload from outside the render thread.
    pub(crate) upload_command_pool: Mutex<vk::CommandPool>,

    /// Graphics-queue submissions are serialized through this mutex so
    /// isolate submissions can run off the render thread.
    pub(crate) queue_submit_lock: Mutex<()>,

    memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub capabilities: DeviceCapabilities,

    disposal_queue: Mutex<Vec<PendingDisposal>>,
    /// Number of frame submissions made so far; the frame being recorded
    /// will complete as `current_fence_value + 1`
    current_fence_value: AtomicU64,
    completed_fence_value: AtomicU64,

    /// Shared sampler cache (textures resolve their samplers through it)
    pub(crate) sampler_cache: Mutex<SamplerCache>,

    /// Render passes destroyed by render targets; the pipeline manager
    /// drains this to evict dependent PSOs
    retired_render_passes: Mutex<Vec<vk::RenderPass>>,
    /// Program ids of destroyed programs; layouts and PSOs built from them
    /// are evicted the same way
    retired_programs: Mutex<Vec<u64>>,

    pub(crate) debug_utils_loader: Option<ash::ext::debug_utils::Instance>,
    pub(crate) debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl GpuContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        device: ash::Device,
        instance: ash::Instance,
        physical_device: vk::PhysicalDevice,
        allocator: Arc<Mutex<Allocator>>,
        graphics_queue: vk::Queue,
        graphics_queue_family: u32,
        present_queue: vk::Queue,
        present_queue_family: u32,
        upload_command_pool: vk::CommandPool,
        memory_properties: vk::PhysicalDeviceMemoryProperties,
        capabilities: DeviceCapabilities,
        debug_utils_loader: Option<ash::ext::debug_utils::Instance>,
        debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    ) -> Self {
        Self {
            device,
            instance,
            physical_device,
            allocator: ManuallyDrop::new(allocator),
            graphics_queue,
            graphics_queue_family,
            present_queue,
            present_queue_family,
            upload_command_pool: Mutex::new(upload_command_pool),
            queue_submit_lock: Mutex::new(()),
            memory_properties,
            capabilities,
            disposal_queue: Mutex::new(Vec::new()),
            current_fence_value: AtomicU64::new(0),
            completed_fence_value: AtomicU64::new(0),
            sampler_cache: Mutex::new(SamplerCache::new()),
            retired_render_passes: Mutex::new(Vec::new()),
            retired_programs: Mutex::new(Vec::new()),
            debug_utils_loader,
            debug_messenger,
        }
    }

    /// Record that a program died; its cached layouts/pipelines must go
    pub fn note_retired_program(&self, program_id: u64) {
        self.retired_programs.lock().unwrap().push(program_id);
    }

    /// Take the program ids retired since the last call
    pub fn take_retired_programs(&self) -> Vec<u64> {
        std::mem::take(&mut *self.retired_programs.lock().unwrap())
    }

    /// Record that a render pass was destroyed; PSOs built against it must go
    pub fn note_retired_render_pass(&self, render_pass: vk::RenderPass) {
        self.retired_render_passes.lock().unwrap().push(render_pass);
    }

    /// Take the set of render passes retired since the last call
    pub fn take_retired_render_passes(&self) -> Vec<vk::RenderPass> {
        std::mem::take(&mut *self.retired_render_passes.lock().unwrap())
    }

    /// Get or create a cached VkSampler for the description
    ///
    /// None when the description cannot be satisfied on this device.
    pub fn resolve_sampler(&self, desc: &SamplerDesc) -> Option<vk::Sampler> {
        self.sampler_cache
            .lock()
            .unwrap()
            .get(&self.device, &self.capabilities, desc)
    }

    // ===== MEMORY =====

    /// Deterministic first-match scan over the physical memory types
    ///
    /// No compatible type is a process-fatal invariant violation: the device
    /// was accepted at startup with these requirements.
    pub fn find_memory_type(&self, type_filter: u32, properties: vk::MemoryPropertyFlags) -> u32 {
        for i in 0..self.memory_properties.memory_type_count {
            if (type_filter & (1 << i)) != 0
                && self.memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
            {
                return i;
            }
        }
        engine_error!(
            "nebula::vulkan",
            "failed to find suitable memory type (filter={:#x}, props={:?})",
            type_filter,
            properties
        );
        panic!("failed to find suitable memory type");
    }

    /// Create a raw buffer with dedicated device memory
    ///
    /// Used where the allocation needs persistent mapping across frame
    /// resets (uniform rings) or is freed right after a blocking wait
    /// (staging). Long-lived resources go through gpu-allocator instead.
    pub fn create_raw_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<(vk::Buffer, vk::DeviceMemory)> {
        unsafe {
            let buffer_info = vk::BufferCreateInfo::default()
                .size(size)
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = self
                .device
                .create_buffer(&buffer_info, None)
                .map_err(|e| engine_err!("nebula::vulkan", "vkCreateBuffer failed: {:?}", e))?;

            let requirements = self.device.get_buffer_memory_requirements(buffer);
            let memory_type = self.find_memory_type(requirements.memory_type_bits, properties);

            let alloc_info = vk::MemoryAllocateInfo::default()
                .allocation_size(requirements.size)
                .memory_type_index(memory_type);

            let memory = match self.device.allocate_memory(&alloc_info, None) {
                Ok(memory) => memory,
                Err(e) => {
                    self.device.destroy_buffer(buffer, None);
                    return Err(engine_err!("nebula::vulkan", "vkAllocateMemory failed: {:?}", e));
                }
            };

            if let Err(e) = self.device.bind_buffer_memory(buffer, memory, 0) {
                self.device.destroy_buffer(buffer, None);
                self.device.free_memory(memory, None);
                return Err(engine_err!("nebula::vulkan", "vkBindBufferMemory failed: {:?}", e));
            }

            Ok((buffer, memory))
        }
    }

    // ===== ISOLATE SUBMISSIONS =====

    /// Acquire a one-shot command buffer + fence and begin recording
    ///
    /// Intentionally synchronous: `finish_isolate_submission` blocks until
    /// the GPU completes. Simplicity over throughput for infrequent
    /// operations (staging uploads, mipmap blits, readback).
    pub fn start_isolate_submission(&self) -> Result<IsolateSubmission> {
        unsafe {
            let cmd = {
                let pool = self.upload_command_pool.lock().unwrap();
                let alloc_info = vk::CommandBufferAllocateInfo::default()
                    .command_pool(*pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(1);
                self.device
                    .allocate_command_buffers(&alloc_info)
                    .map_err(|e| {
                        engine_err!(
                            "nebula::vulkan",
                            "Failed to allocate upload command buffer: {:?}",
                            e
                        )
                    })?[0]
            };

            let fence = self
                .device
                .create_fence(&vk::FenceCreateInfo::default(), None)
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to create upload fence: {:?}", e))?;

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device
                .begin_command_buffer(cmd, &begin_info)
                .map_err(|e| engine_err!("nebula::vulkan", "vkBeginCommandBuffer failed: {:?}", e))?;

            Ok(IsolateSubmission { cmd, fence })
        }
    }

    /// End recording, submit, and block until the fence signals
    pub fn finish_isolate_submission(&self, submission: IsolateSubmission) -> Result<()> {
        unsafe {
            self.device
                .end_command_buffer(submission.cmd)
                .map_err(|e| engine_err!("nebula::vulkan", "vkEndCommandBuffer failed: {:?}", e))?;

            let command_buffers = [submission.cmd];
            let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

            {
                let _guard = self.queue_submit_lock.lock().unwrap();
                self.device
                    .queue_submit(self.graphics_queue, &[submit_info], submission.fence)
                    .map_err(|e| {
                        engine_err!("nebula::vulkan", "vkQueueSubmit (upload) failed: {:?}", e)
                    })?;
            }

            self.device
                .wait_for_fences(&[submission.fence], true, u64::MAX)
                .map_err(|e| engine_err!("nebula::vulkan", "vkWaitForFences (upload) failed: {:?}", e))?;

            self.device.destroy_fence(submission.fence, None);
            let pool = self.upload_command_pool.lock().unwrap();
            self.device.free_command_buffers(*pool, &[submission.cmd]);

            Ok(())
        }
    }

    // ===== DEFERRED DISPOSAL =====

    /// Fence value the frame currently being recorded will complete as
    pub fn pending_fence_value(&self) -> u64 {
        self.current_fence_value.load(Ordering::Acquire) + 1
    }

    /// Called by the render context after each frame submission
    pub fn advance_fence_value(&self) -> u64 {
        self.current_fence_value.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn completed_fence_value(&self) -> u64 {
        self.completed_fence_value.load(Ordering::Acquire)
    }

    /// Queue a resource for destruction once `fence_value` has completed
    pub fn queue_disposal(&self, resource: DisposableResource, fence_value: u64) {
        self.disposal_queue
            .lock()
            .unwrap()
            .push(PendingDisposal { fence_value, resource });
    }

    /// Queue a resource that may be referenced by the frame being recorded
    pub fn queue_disposal_current(&self, resource: DisposableResource) {
        self.queue_disposal(resource, self.pending_fence_value());
    }

    /// Destroy every queued resource whose tagged fence value has completed
    pub fn process_disposal_queue(&self, completed_fence_value: u64) {
        // Monotonic: a later observation can only raise the watermark
        self.completed_fence_value
            .fetch_max(completed_fence_value, Ordering::AcqRel);

        let ready = {
            let mut pending = self.disposal_queue.lock().unwrap();
            drain_ready_disposals(&mut pending, completed_fence_value)
        };
        if !ready.is_empty() {
            engine_debug!("nebula::vulkan", "destroying {} retired GPU resources", ready.len());
        }
        for disposal in ready {
            self.destroy_resource(disposal.resource);
        }
    }

    /// Force-flush the disposal queue: wait device idle and treat every
    /// fence as completed. Used at shutdown and in recreation paths.
    pub fn destroy_stale_resources(&self) {
        self.wait_device_idle();
        self.process_disposal_queue(u64::MAX);
    }

    fn destroy_resource(&self, resource: DisposableResource) {
        unsafe {
            match resource {
                DisposableResource::Sampler(sampler) => {
                    self.device.destroy_sampler(sampler, None);
                }
                DisposableResource::Image { image, allocation } => {
                    self.device.destroy_image(image, None);
                    if let Some(allocation) = allocation {
                        if let Ok(mut allocator) = self.allocator.lock() {
                            allocator.free(allocation).ok();
                        }
                    }
                }
                DisposableResource::ImageView(view) => {
                    self.device.destroy_image_view(view, None);
                }
                DisposableResource::Buffer { buffer, allocation } => {
                    self.device.destroy_buffer(buffer, None);
                    if let Some(allocation) = allocation {
                        if let Ok(mut allocator) = self.allocator.lock() {
                            allocator.free(allocation).ok();
                        }
                    }
                }
                DisposableResource::Memory(memory) => {
                    self.device.free_memory(memory, None);
                }
            }
        }
    }

    pub fn wait_device_idle(&self) {
        unsafe {
            self.device.device_wait_idle().ok();
        }
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        // NOTE: device and instance destruction is handled by
        // VulkanDriver::drop() to avoid issues with drop ordering.
        // This Drop impl intentionally does nothing.
    }
}

#[cfg(test)]
#[path = "vulkan_context_tests.rs"]
mod tests;
