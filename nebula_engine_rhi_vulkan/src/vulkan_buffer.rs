/// VulkanBuffer - Vulkan implementation of the Buffer trait

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use nebula_engine::nebula::rhi::{Buffer, BufferType, BufferUsage};
use nebula_engine::nebula::Result;
use nebula_engine::{engine_bail, engine_err, engine_error};
use std::sync::{Arc, Mutex};

use crate::vulkan_context::{DisposableResource, GpuContext};

/// Host-side mirror state for context-loss restore
struct BufferMirror {
    default_data: Vec<u8>,
    need_default_stored_data: bool,
}

/// Vulkan buffer implementation
///
/// `Dynamic` buffers live in host-visible memory and are written through the
/// persistent mapping; `Static`/`Immutable` buffers are device-local and
/// updated through a blocking staging copy. Destruction goes through the
/// driver's fenced disposal queue, never while the buffer may be in flight.
pub struct VulkanBuffer {
    ctx: Arc<GpuContext>,
    buffer: vk::Buffer,
    allocation: Mutex<Option<Allocation>>,
    capacity: usize,
    buffer_type: BufferType,
    usage: BufferUsage,
    host_visible: bool,
    mirror: Mutex<BufferMirror>,
}

/// BufferUsage -> memory location + extra usage bits
fn translate_usage(usage: BufferUsage) -> (MemoryLocation, vk::BufferUsageFlags) {
    match usage {
        // GPU read, CPU write
        BufferUsage::Dynamic => (MemoryLocation::CpuToGpu, vk::BufferUsageFlags::empty()),
        // GPU read, updated via staging
        BufferUsage::Static | BufferUsage::Immutable => {
            (MemoryLocation::GpuOnly, vk::BufferUsageFlags::TRANSFER_DST)
        }
    }
}

/// BufferType -> bind flags
fn translate_bind_flag(buffer_type: BufferType) -> vk::BufferUsageFlags {
    match buffer_type {
        BufferType::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
        BufferType::Index => vk::BufferUsageFlags::INDEX_BUFFER,
        BufferType::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
        // readback target
        BufferType::PixelPack => vk::BufferUsageFlags::TRANSFER_DST,
    }
}

fn align_to(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

impl VulkanBuffer {
    pub fn new(
        ctx: Arc<GpuContext>,
        size: usize,
        buffer_type: BufferType,
        usage: BufferUsage,
        initial: Option<&[u8]>,
    ) -> Result<Self> {
        if usage == BufferUsage::Immutable && initial.is_none() {
            engine_bail!("nebula::vulkan", "Immutable buffer requires initial data");
        }
        if size == 0 {
            engine_bail!("nebula::vulkan", "Buffer size must be non-zero");
        }

        let (location, extra_usage) = translate_usage(usage);
        let usage_flags = translate_bind_flag(buffer_type) | extra_usage;
        let capacity = if buffer_type == BufferType::Uniform {
            align_to(size, 16)
        } else {
            size
        };

        let buffer = unsafe {
            let buffer_info = vk::BufferCreateInfo::default()
                .size(capacity as vk::DeviceSize)
                .usage(usage_flags)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);
            ctx.device
                .create_buffer(&buffer_info, None)
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to create VkBuffer, size={}: {:?}", capacity, e))?
        };

        let requirements = unsafe { ctx.device.get_buffer_memory_requirements(buffer) };
        let allocation = ctx
            .allocator
            .lock()
            .unwrap()
            .allocate(&AllocationCreateDesc {
                name: "nebula buffer",
                requirements,
                location,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| {
                unsafe { ctx.device.destroy_buffer(buffer, None) };
                engine_err!("nebula::vulkan", "Failed to allocate buffer memory: {:?}", e)
            })?;

        unsafe {
            ctx.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                .map_err(|e| engine_err!("nebula::vulkan", "vkBindBufferMemory failed: {:?}", e))?;
        }

        let this = Self {
            ctx,
            buffer,
            allocation: Mutex::new(Some(allocation)),
            capacity,
            buffer_type,
            usage,
            host_visible: location == MemoryLocation::CpuToGpu,
            mirror: Mutex::new(BufferMirror {
                default_data: initial.map(<[u8]>::to_vec).unwrap_or_default(),
                need_default_stored_data: false,
            }),
        };

        if let Some(initial) = initial {
            this.update_data(initial);
        }

        Ok(this)
    }

    pub(crate) fn native_handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Direct write through the persistent mapping (host-visible path)
    ///
    /// COHERENT memory was requested, so no explicit flush is needed.
    fn write_mapped(&self, offset: usize, data: &[u8]) {
        let allocation = self.allocation.lock().unwrap();
        let Some(allocation) = allocation.as_ref() else {
            engine_error!("nebula::vulkan", "Buffer update failed: no GPU allocation");
            return;
        };
        let Some(mapped) = allocation.mapped_ptr() else {
            engine_error!("nebula::vulkan", "Buffer is not CPU-accessible");
            return;
        };
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                (mapped.as_ptr() as *mut u8).add(offset),
                data.len(),
            );
        }
    }

    /// Staging copy through an isolate submission (device-local path)
    ///
    /// Synchronous and not throughput-optimized; callers needing
    /// high-frequency updates should prefer Dynamic buffers.
    fn write_staged(&self, offset: usize, data: &[u8]) {
        let result: Result<()> = (|| {
            let (staging_buffer, staging_memory) = self.ctx.create_raw_buffer(
                data.len() as vk::DeviceSize,
                vk::BufferUsageFlags::TRANSFER_SRC,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?;

            unsafe {
                let mapped = self
                    .ctx
                    .device
                    .map_memory(staging_memory, 0, data.len() as vk::DeviceSize, vk::MemoryMapFlags::empty())
                    .map_err(|e| engine_err!("nebula::vulkan", "vkMapMemory (staging) failed: {:?}", e))?;
                std::ptr::copy_nonoverlapping(data.as_ptr(), mapped as *mut u8, data.len());
                self.ctx.device.unmap_memory(staging_memory);
            }

            let submission = self.ctx.start_isolate_submission()?;
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: offset as vk::DeviceSize,
                size: data.len() as vk::DeviceSize,
            };
            unsafe {
                self.ctx
                    .device
                    .cmd_copy_buffer(submission.cmd, staging_buffer, self.buffer, &[region]);
            }
            self.ctx.finish_isolate_submission(submission)?;

            // The wait above already happened: safe to destroy immediately
            unsafe {
                self.ctx.device.destroy_buffer(staging_buffer, None);
                self.ctx.device.free_memory(staging_memory, None);
            }
            Ok(())
        })();

        if let Err(e) = result {
            engine_error!("nebula::vulkan", "Staged buffer update failed: {}", e);
        }
    }
}

impl Buffer for VulkanBuffer {
    fn update_data(&self, data: &[u8]) {
        self.update_sub_data(0, data);
    }

    fn update_sub_data(&self, offset: usize, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        if offset + data.len() > self.capacity {
            engine_error!(
                "nebula::vulkan",
                "Buffer update out of range: offset={} len={} capacity={}",
                offset,
                data.len(),
                self.capacity
            );
            return;
        }

        if self.host_visible {
            self.write_mapped(offset, data);
        } else {
            self.write_staged(offset, data);
        }

        // Update the context-loss mirror
        let mut mirror = self.mirror.lock().unwrap();
        if mirror.need_default_stored_data {
            if mirror.default_data.len() < offset + data.len() {
                mirror.default_data.resize(offset + data.len(), 0);
            }
            mirror.default_data[offset..offset + data.len()].copy_from_slice(data);
        }
    }

    fn using_default_stored_data(&self, need: bool) {
        let restore = {
            let mut mirror = self.mirror.lock().unwrap();
            mirror.need_default_stored_data = need;
            if need && !mirror.default_data.is_empty() {
                Some(mirror.default_data.clone())
            } else {
                None
            }
        };

        // Restore to default, write to GPU immediately
        if let Some(data) = restore {
            if self.host_visible {
                self.write_mapped(0, &data);
            } else {
                self.write_staged(0, &data);
            }
        }
    }

    fn size(&self) -> usize {
        self.capacity
    }

    fn buffer_type(&self) -> BufferType {
        self.buffer_type
    }

    fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        // Never destroyed while in flight: retire through the fenced queue
        let allocation = self.allocation.lock().unwrap().take();
        self.ctx.queue_disposal_current(DisposableResource::Buffer {
            buffer: self.buffer,
            allocation,
        });
    }
}
