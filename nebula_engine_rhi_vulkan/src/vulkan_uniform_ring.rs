/// Per-frame uniform ring buffers
///
/// Each frame slot owns a persistently mapped host-visible buffer with a
/// monotonic write head that resets once the slot's fence has signaled.
/// Descriptor writes reference (buffer, offset, range) slices; nothing is
/// ever freed mid-frame.

use ash::vk;
use nebula_engine::engine_error;
use nebula_engine::nebula::Result;
use nebula_engine::engine_err;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

/// Write-head arithmetic for one ring
///
/// Offsets advance monotonically in `align` multiples. Overflow of the fixed
/// capacity is an assertion failure, not a graceful fallback: callers must
/// size the ring generously or the frame's uniform traffic is a hard cap.
pub struct RingAllocator {
    capacity: usize,
    align: usize,
    write_head: usize,
}

impl RingAllocator {
    pub fn new(capacity: usize, align: usize) -> Self {
        let align = align.max(1);
        assert!(align.is_power_of_two(), "ring alignment must be a power of two");
        Self {
            capacity,
            align,
            write_head: 0,
        }
    }

    /// Reserve an aligned slice; returns its offset
    pub fn allocate(&mut self, size: usize) -> usize {
        let aligned = (size + self.align - 1) & !(self.align - 1);
        assert!(
            self.write_head + aligned <= self.capacity,
            "Uniform ring buffer overflow ({} + {} > {})",
            self.write_head,
            aligned,
            self.capacity
        );
        let offset = self.write_head;
        self.write_head += aligned;
        offset
    }

    /// Reset the write head at the start of the slot's frame
    pub fn reset(&mut self) {
        self.write_head = 0;
    }

    pub fn used(&self) -> usize {
        self.write_head
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn align(&self) -> usize {
        self.align
    }
}

/// An aligned slice reserved from the current frame's ring
#[derive(Debug, Clone, Copy)]
pub struct UniformSlice {
    pub offset: usize,
    pub size: usize,
}

/// GPU-backed ring for one frame slot
///
/// Raw memory (not gpu-allocator) because the mapping must stay alive for
/// the context's whole lifetime and the memory type is chosen explicitly.
pub struct UniformRing {
    ctx: Arc<GpuContext>,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    mapped: *mut u8,
    allocator: RingAllocator,
    /// COHERENT was requested; kept as a hint for the flush decision
    is_coherent: bool,
}

impl UniformRing {
    pub fn new(ctx: Arc<GpuContext>, capacity: usize) -> Result<Self> {
        let align = ctx.capabilities.min_uniform_buffer_offset_alignment.max(1) as usize;

        let (buffer, memory) = ctx.create_raw_buffer(
            capacity as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        let mapped = unsafe {
            ctx.device
                .map_memory(memory, 0, capacity as vk::DeviceSize, vk::MemoryMapFlags::empty())
                .map_err(|e| engine_err!("nebula::vulkan", "vkMapMemory (uniform ring) failed: {:?}", e))?
        } as *mut u8;

        Ok(Self {
            ctx,
            buffer,
            memory,
            mapped,
            allocator: RingAllocator::new(capacity, align),
            is_coherent: true,
        })
    }

    pub fn buffer(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn reset(&mut self) {
        self.allocator.reset();
    }

    /// Copy `data` into a fresh aligned slice and return it
    pub fn write(&mut self, data: &[u8]) -> UniformSlice {
        let offset = self.allocator.allocate(data.len());
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.mapped.add(offset), data.len());
        }
        UniformSlice {
            offset,
            size: data.len(),
        }
    }

    /// Flush the written range before submit when the memory is non-coherent
    pub fn flush_written(&self) {
        if self.is_coherent || self.allocator.used() == 0 {
            return;
        }
        let range = vk::MappedMemoryRange::default()
            .memory(self.memory)
            .offset(0)
            .size(self.allocator.used() as vk::DeviceSize);
        unsafe {
            if let Err(e) = self.ctx.device.flush_mapped_memory_ranges(&[range]) {
                engine_error!("nebula::vulkan", "vkFlushMappedMemoryRanges failed: {:?}", e);
            }
        }
    }

    /// Destroy the GPU objects; caller must have waited the device idle
    pub fn destroy(&mut self) {
        unsafe {
            if !self.mapped.is_null() {
                self.ctx.device.unmap_memory(self.memory);
                self.mapped = std::ptr::null_mut();
            }
            if self.buffer != vk::Buffer::null() {
                self.ctx.device.destroy_buffer(self.buffer, None);
                self.buffer = vk::Buffer::null();
            }
            if self.memory != vk::DeviceMemory::null() {
                self.ctx.device.free_memory(self.memory, None);
                self.memory = vk::DeviceMemory::null();
            }
        }
    }
}

#[cfg(test)]
#[path = "vulkan_uniform_ring_tests.rs"]
mod tests;
