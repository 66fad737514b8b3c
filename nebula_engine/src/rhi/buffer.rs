/// Buffer trait - GPU-visible memory region (vertex/index/uniform/readback)

use crate::rhi::types::{BufferType, BufferUsage};

/// A GPU buffer created by `Driver::create_buffer`
///
/// Backends decide the memory location from the usage: `Dynamic` buffers are
/// host-visible and updated by direct mapping, `Static`/`Immutable` buffers
/// are device-local and updated through a blocking staging copy. Callers that
/// rewrite a buffer every frame should create it as `Dynamic`.
pub trait Buffer: Send + Sync {
    /// Overwrite the buffer from offset 0
    ///
    /// Equivalent to `update_sub_data(0, data)`.
    fn update_data(&self, data: &[u8]);

    /// Overwrite `data.len()` bytes starting at `offset`
    fn update_sub_data(&self, offset: usize, data: &[u8]);

    /// Opt in/out of keeping a host-side mirror of the last written content
    ///
    /// The mirror is used to restore GPU content after a backend context loss
    /// (e.g. app backgrounding on mobile). Turning it on immediately
    /// re-uploads the mirror if it is non-empty.
    fn using_default_stored_data(&self, need: bool);

    /// Capacity in bytes
    fn size(&self) -> usize;

    fn buffer_type(&self) -> BufferType;

    fn usage(&self) -> BufferUsage;
}
