/// ProgramState - CPU-side uniform and texture staging for one program
///
/// Owns byte blobs mirroring the program's per-stage uniform blocks plus the
/// texture binding table. The render context copies the blobs into its
/// per-frame uniform ring and turns the binding table into descriptor writes
/// on every draw.

use crate::rhi::program::Program;
use crate::rhi::texture::Texture;
use crate::rhi::types::{UniformLocation, UniformStage};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Callback producing uniform bytes lazily, evaluated once per draw
pub type UniformCallback = Box<dyn Fn() -> Vec<u8> + Send>;

pub struct ProgramState {
    program: Arc<dyn Program>,
    vertex_uniform_buffer: Vec<u8>,
    fragment_uniform_buffer: Vec<u8>,
    callback_uniforms: Vec<(UniformLocation, UniformCallback)>,
    /// binding index -> bound textures (len > 1 for sampler arrays)
    texture_bindings: FxHashMap<u32, Vec<Arc<dyn Texture>>>,
}

impl ProgramState {
    /// Create a state sized from the program's reflected uniform blocks
    pub fn new(program: Arc<dyn Program>) -> Self {
        let vs_size = program.uniform_block_size(UniformStage::Vertex);
        let fs_size = program.uniform_block_size(UniformStage::Fragment);
        Self {
            program,
            vertex_uniform_buffer: vec![0; vs_size],
            fragment_uniform_buffer: vec![0; fs_size],
            callback_uniforms: Vec::new(),
            texture_bindings: FxHashMap::default(),
        }
    }

    pub fn program(&self) -> &Arc<dyn Program> {
        &self.program
    }

    /// Look up a named uniform through the program's reflection data
    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        self.program.uniform_location(name)
    }

    /// Write raw bytes at a uniform location
    ///
    /// `data` longer than the member size is truncated; writes past the end
    /// of the stage block are clamped.
    pub fn set_uniform(&mut self, location: &UniformLocation, data: &[u8]) {
        let blob = match location.stage {
            UniformStage::Vertex => &mut self.vertex_uniform_buffer,
            UniformStage::Fragment => &mut self.fragment_uniform_buffer,
        };
        let start = location.offset as usize;
        if start >= blob.len() {
            return;
        }
        let len = data.len().min(location.size as usize).min(blob.len() - start);
        blob[start..start + len].copy_from_slice(&data[..len]);
    }

    /// Write any plain-old-data value at a uniform location
    pub fn set_uniform_pod<T: bytemuck::Pod>(&mut self, location: &UniformLocation, value: &T) {
        self.set_uniform(location, bytemuck::bytes_of(value));
    }

    /// Register a callback evaluated on every draw for per-draw uniforms
    ///
    /// Replaces any previous callback at the same location.
    pub fn set_callback_uniform(&mut self, location: UniformLocation, callback: UniformCallback) {
        if let Some(slot) = self
            .callback_uniforms
            .iter_mut()
            .find(|(loc, _)| loc.stage == location.stage && loc.offset == location.offset)
        {
            slot.1 = callback;
        } else {
            self.callback_uniforms.push((location, callback));
        }
    }

    /// Evaluate all callback uniforms into the stage blobs
    ///
    /// Called by the render context right before descriptor writes.
    pub fn apply_callback_uniforms(&mut self) {
        // Evaluate first: callbacks cannot borrow the blobs being written.
        let pending: Vec<(UniformLocation, Vec<u8>)> = self
            .callback_uniforms
            .iter()
            .map(|(loc, cb)| (*loc, cb()))
            .collect();
        for (loc, bytes) in pending {
            self.set_uniform(&loc, &bytes);
        }
    }

    /// Bind one texture at a sampler binding index
    pub fn set_texture(&mut self, binding: u32, texture: Arc<dyn Texture>) {
        self.texture_bindings.insert(binding, vec![texture]);
    }

    /// Bind a sampler array at a binding index
    pub fn set_texture_array(&mut self, binding: u32, textures: Vec<Arc<dyn Texture>>) {
        self.texture_bindings.insert(binding, textures);
    }

    pub fn vertex_uniform_buffer(&self) -> &[u8] {
        &self.vertex_uniform_buffer
    }

    pub fn fragment_uniform_buffer(&self) -> &[u8] {
        &self.fragment_uniform_buffer
    }

    pub fn texture_binding_sets(&self) -> &FxHashMap<u32, Vec<Arc<dyn Texture>>> {
        &self.texture_bindings
    }
}

#[cfg(test)]
#[path = "program_state_tests.rs"]
mod tests;
