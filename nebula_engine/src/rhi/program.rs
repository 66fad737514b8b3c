/// Program trait - compiled shader stages with reflected metadata

use crate::rhi::types::{UniformLocation, UniformStage};

/// A uniform block reflected from a shader stage
#[derive(Debug, Clone)]
pub struct UniformBlockInfo {
    pub stage: UniformStage,
    /// Descriptor binding index inside the UBO set
    pub binding: u32,
    /// Byte size of the whole block
    pub size: u32,
    pub members: Vec<UniformMemberInfo>,
}

#[derive(Debug, Clone)]
pub struct UniformMemberInfo {
    pub name: String,
    pub offset: u32,
    pub size: u32,
}

/// A combined-image-sampler binding reflected from the fragment stage
#[derive(Debug, Clone)]
pub struct SamplerBindingInfo {
    pub name: String,
    /// Descriptor binding index inside the sampler set
    pub binding: u32,
    /// Array size (1 for plain samplers)
    pub count: u32,
}

/// A linked vertex + fragment program created by `Driver::create_program`
pub trait Program: Send + Sync {
    /// Stable identity of the shader combination; keys layout caches
    fn program_id(&self) -> u64;

    /// Look up a named uniform member across both stage blocks
    fn uniform_location(&self, name: &str) -> Option<UniformLocation>;

    /// Byte size of the given stage's uniform block (0 when absent)
    fn uniform_block_size(&self, stage: UniformStage) -> usize;

    fn active_uniform_blocks(&self) -> &[UniformBlockInfo];

    fn active_samplers(&self) -> &[SamplerBindingInfo];
}
