//! Unit tests for ProgramState
//!
//! Uses a hand-written Program stub with a 64-byte vertex block and a
//! 16-byte fragment block.

use crate::rhi::program::{Program, SamplerBindingInfo, UniformBlockInfo, UniformMemberInfo};
use crate::rhi::program_state::ProgramState;
use crate::rhi::texture::Texture;
use crate::rhi::types::{
    SamplerDesc, TextureCubeFace, TextureDesc, UniformLocation, UniformStage,
};
use std::sync::Arc;

struct StubProgram {
    blocks: Vec<UniformBlockInfo>,
    samplers: Vec<SamplerBindingInfo>,
}

impl StubProgram {
    fn new() -> Self {
        Self {
            blocks: vec![
                UniformBlockInfo {
                    stage: UniformStage::Vertex,
                    binding: 0,
                    size: 64,
                    members: vec![UniformMemberInfo {
                        name: "u_mvp".to_string(),
                        offset: 0,
                        size: 64,
                    }],
                },
                UniformBlockInfo {
                    stage: UniformStage::Fragment,
                    binding: 1,
                    size: 16,
                    members: vec![UniformMemberInfo {
                        name: "u_color".to_string(),
                        offset: 0,
                        size: 16,
                    }],
                },
            ],
            samplers: vec![SamplerBindingInfo {
                name: "u_tex".to_string(),
                binding: 0,
                count: 1,
            }],
        }
    }
}

impl Program for StubProgram {
    fn program_id(&self) -> u64 {
        0xABCD
    }

    fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        for block in &self.blocks {
            for member in &block.members {
                if member.name == name {
                    return Some(UniformLocation {
                        stage: block.stage,
                        offset: member.offset,
                        size: member.size,
                    });
                }
            }
        }
        None
    }

    fn uniform_block_size(&self, stage: UniformStage) -> usize {
        self.blocks
            .iter()
            .find(|b| b.stage == stage)
            .map(|b| b.size as usize)
            .unwrap_or(0)
    }

    fn active_uniform_blocks(&self) -> &[UniformBlockInfo] {
        &self.blocks
    }

    fn active_samplers(&self) -> &[SamplerBindingInfo] {
        &self.samplers
    }
}

struct StubTexture;

impl Texture for StubTexture {
    fn desc(&self) -> TextureDesc {
        TextureDesc::default()
    }
    fn update_data(&self, _: &[u8], _: u32, _: u32, _: u32, _: u32) {}
    fn update_sub_data(&self, _: u32, _: u32, _: u32, _: u32, _: u32, _: &[u8], _: u32) {}
    fn update_compressed_data(&self, _: &[u8], _: u32, _: u32, _: u32, _: u32) {}
    fn update_compressed_sub_data(&self, _: u32, _: u32, _: u32, _: u32, _: u32, _: &[u8], _: u32) {}
    fn update_face_data(&self, _: TextureCubeFace, _: &[u8]) {}
    fn update_sampler_desc(&self, _: &SamplerDesc) {}
}

fn new_state() -> ProgramState {
    ProgramState::new(Arc::new(StubProgram::new()))
}

// ============================================================================
// UNIFORM WRITES
// ============================================================================

#[test]
fn test_blobs_sized_from_reflection() {
    let state = new_state();
    assert_eq!(state.vertex_uniform_buffer().len(), 64);
    assert_eq!(state.fragment_uniform_buffer().len(), 16);
}

#[test]
fn test_set_uniform_writes_bytes() {
    let mut state = new_state();
    let loc = state.uniform_location("u_color").unwrap();
    assert_eq!(loc.stage, UniformStage::Fragment);

    state.set_uniform(&loc, &[1, 2, 3, 4]);
    assert_eq!(&state.fragment_uniform_buffer()[..4], &[1, 2, 3, 4]);
    // rest of the member untouched
    assert_eq!(state.fragment_uniform_buffer()[4], 0);
}

#[test]
fn test_set_uniform_clamps_overflow() {
    let mut state = new_state();
    // Write past the end of the fragment block: clamped, no panic
    let loc = UniformLocation { stage: UniformStage::Fragment, offset: 12, size: 16 };
    state.set_uniform(&loc, &[0xFF; 16]);
    assert_eq!(&state.fragment_uniform_buffer()[12..16], &[0xFF; 4]);

    // Entirely out of range: ignored
    let loc = UniformLocation { stage: UniformStage::Fragment, offset: 64, size: 4 };
    state.set_uniform(&loc, &[1, 2, 3, 4]);
}

#[test]
fn test_set_uniform_pod() {
    let mut state = new_state();
    let loc = state.uniform_location("u_color").unwrap();
    state.set_uniform_pod(&loc, &[1.0f32, 0.5, 0.25, 1.0]);

    let bytes = &state.fragment_uniform_buffer()[..4];
    assert_eq!(f32::from_le_bytes(bytes.try_into().unwrap()), 1.0);
}

// ============================================================================
// CALLBACK UNIFORMS
// ============================================================================

#[test]
fn test_callback_uniforms_apply_per_draw() {
    let mut state = new_state();
    let loc = state.uniform_location("u_color").unwrap();

    state.set_callback_uniform(loc, Box::new(|| vec![9, 9, 9, 9]));
    assert_eq!(state.fragment_uniform_buffer()[0], 0);

    state.apply_callback_uniforms();
    assert_eq!(&state.fragment_uniform_buffer()[..4], &[9, 9, 9, 9]);
}

#[test]
fn test_callback_uniform_replaces_previous() {
    let mut state = new_state();
    let loc = state.uniform_location("u_color").unwrap();

    state.set_callback_uniform(loc, Box::new(|| vec![1, 1, 1, 1]));
    state.set_callback_uniform(loc, Box::new(|| vec![2, 2, 2, 2]));
    state.apply_callback_uniforms();

    assert_eq!(&state.fragment_uniform_buffer()[..4], &[2, 2, 2, 2]);
}

// ============================================================================
// TEXTURE BINDINGS
// ============================================================================

#[test]
fn test_texture_bindings() {
    let mut state = new_state();
    state.set_texture(0, Arc::new(StubTexture));
    assert_eq!(state.texture_binding_sets()[&0].len(), 1);

    state.set_texture_array(1, vec![Arc::new(StubTexture), Arc::new(StubTexture)]);
    assert_eq!(state.texture_binding_sets()[&1].len(), 2);

    // Rebinding a slot replaces the previous set
    state.set_texture(1, Arc::new(StubTexture));
    assert_eq!(state.texture_binding_sets()[&1].len(), 1);
}
