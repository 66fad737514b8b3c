//! Contract tests for the Driver/resource traits, run against MockDriver

use crate::rhi::buffer::Buffer;
use crate::rhi::driver::Driver;
use crate::rhi::mock_driver::MockDriver;
use crate::rhi::pipeline::DepthStencilState;
use crate::rhi::render_target::RenderTarget;
use crate::rhi::texture::Texture;
use crate::rhi::types::*;
use std::sync::atomic::Ordering;

fn tex_desc(width: u32, height: u32) -> TextureDesc {
    TextureDesc {
        width,
        height,
        ..Default::default()
    }
}

// ============================================================================
// BUFFERS
// ============================================================================

#[test]
fn test_buffer_update_round_trip() {
    let driver = MockDriver::new();
    let buffer = driver
        .create_buffer(64, BufferType::Vertex, BufferUsage::Dynamic, None)
        .unwrap();

    buffer.update_data(&[7u8; 16]);
    buffer.update_sub_data(16, &[9u8; 8]);

    assert_eq!(buffer.size(), 64);
    assert_eq!(buffer.buffer_type(), BufferType::Vertex);
    assert_eq!(driver.stats.buffers_created.load(Ordering::Relaxed), 1);
}

#[test]
fn test_immutable_buffer_requires_initial_data() {
    let driver = MockDriver::new();
    assert!(driver
        .create_buffer(64, BufferType::Index, BufferUsage::Immutable, None)
        .is_err());
    assert!(driver
        .create_buffer(4, BufferType::Index, BufferUsage::Immutable, Some(&[0, 1, 2, 3]))
        .is_ok());
}

#[test]
fn test_default_stored_data_mirror() {
    let driver = MockDriver::new();
    let buffer = driver
        .create_buffer(16, BufferType::Uniform, BufferUsage::Dynamic, None)
        .unwrap();

    buffer.using_default_stored_data(true);
    buffer.update_data(&[5u8; 16]);

    // The mirror tracked the write (backend-visible behavior)
    let mock = unsafe {
        &*(std::sync::Arc::as_ptr(&buffer) as *const crate::rhi::mock_driver::MockBuffer)
    };
    assert_eq!(mock.default_data.lock().unwrap().as_deref(), Some(&[5u8; 16][..]));
}

// ============================================================================
// TEXTURES
// ============================================================================

#[test]
fn test_texture_creation_validation() {
    let driver = MockDriver::new();
    assert!(driver.create_texture(&tex_desc(0, 16)).is_err());
    assert!(driver.create_texture(&tex_desc(16, 16)).is_ok());
}

#[test]
fn test_compressed_upload_size_contract() {
    let driver = MockDriver::new();
    let desc = TextureDesc {
        pixel_format: PixelFormat::S3tcDxt1,
        ..tex_desc(8, 8)
    };
    let texture = driver.create_texture(&desc).unwrap();

    // 8x8 DXT1 = 2x2 blocks of 8 bytes
    texture.update_compressed_data(&[0u8; 32], 8, 8, 0, 0);
}

#[test]
#[should_panic(expected = "compressed data size mismatch")]
fn test_compressed_upload_wrong_size_panics() {
    let driver = MockDriver::new();
    let desc = TextureDesc {
        pixel_format: PixelFormat::S3tcDxt1,
        ..tex_desc(8, 8)
    };
    let texture = driver.create_texture(&desc).unwrap();
    texture.update_compressed_data(&[0u8; 16], 8, 8, 0, 0);
}

// ============================================================================
// RENDER TARGETS
// ============================================================================

#[test]
fn test_render_target_contiguous_colors() {
    let driver = MockDriver::new();
    let tex0 = driver.create_texture(&tex_desc(64, 64)).unwrap();
    let tex1 = driver.create_texture(&tex_desc(64, 64)).unwrap();

    let rt = driver.create_render_target(Some(tex0), None).unwrap();
    rt.set_color_attachment(1, Some(tex1), 0);

    assert!(rt.color_attachment(0).is_some());
    assert!(rt.color_attachment(1).is_some());
    assert!(rt.color_attachment(2).is_none());
    assert!(!rt.is_default());
}

#[test]
#[should_panic(expected = "contiguous")]
fn test_render_target_gap_panics() {
    let driver = MockDriver::new();
    let tex = driver.create_texture(&tex_desc(64, 64)).unwrap();
    let rt = driver.create_render_target(None, None).unwrap();

    // Slot 2 without slots 0/1 violates the contract
    rt.set_color_attachment(2, Some(tex), 0);
}

// ============================================================================
// SAMPLERS
// ============================================================================

#[test]
fn test_create_sampler_degrades_to_none() {
    let mut driver = MockDriver::new();
    driver.support_anisotropy = false;

    let aniso = SamplerDesc {
        min_filter: SamplerFilter::Anisotropic,
        anisotropy: 16,
        ..Default::default()
    };
    assert!(driver.create_sampler(&aniso).is_none());
    assert!(driver.create_sampler(&SamplerDesc::default()).is_some());
}

// ============================================================================
// STATE OBJECTS
// ============================================================================

#[test]
fn test_depth_stencil_state_hash_follows_update() {
    let driver = MockDriver::new();
    let state = driver.create_depth_stencil_state();
    let initial = state.state_hash();

    state.update(&DepthStencilDesc {
        flags: DepthStencilFlags::DEPTH_TEST,
        ..Default::default()
    });
    assert_ne!(state.state_hash(), initial);
}
