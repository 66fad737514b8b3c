//! Unit tests for rhi/types.rs
//!
//! Covers pixel-format block geometry, mip chain derivation, target buffer
//! flags, and the stable key hashes used by backend caches.

use crate::rhi::types::*;

// ============================================================================
// PIXEL FORMATS
// ============================================================================

#[test]
fn test_pixel_format_classification() {
    assert!(PixelFormat::Etc2.is_compressed());
    assert!(PixelFormat::Astc8x8.is_compressed());
    assert!(PixelFormat::S3tcDxt5.is_compressed());
    assert!(!PixelFormat::Rgba8.is_compressed());
    assert!(!PixelFormat::D24S8.is_compressed());

    assert!(PixelFormat::D24S8.is_depth_stencil());
    assert!(!PixelFormat::Bgra8.is_depth_stencil());
}

#[test]
fn test_block_info_compressed() {
    let etc2 = PixelFormat::Etc2.block_info();
    assert_eq!((etc2.width, etc2.height, etc2.bytes), (4, 4, 8));

    let etc2a = PixelFormat::Etc2A.block_info();
    assert_eq!((etc2a.width, etc2a.height, etc2a.bytes), (4, 4, 16));

    let astc = PixelFormat::Astc8x8.block_info();
    assert_eq!((astc.width, astc.height, astc.bytes), (8, 8, 16));

    let dxt1 = PixelFormat::S3tcDxt1.block_info();
    assert_eq!((dxt1.width, dxt1.height, dxt1.bytes), (4, 4, 8));
}

#[test]
fn test_row_pitch_uncompressed() {
    assert_eq!(PixelFormat::Rgba8.row_pitch(256), 1024);
    assert_eq!(PixelFormat::R8.row_pitch(256), 256);
    assert_eq!(PixelFormat::Rgb565.row_pitch(128), 256);
    assert_eq!(PixelFormat::Rgba32F.row_pitch(4), 64);
}

#[test]
fn test_row_pitch_compressed_rounds_up_to_blocks() {
    // 10 texels wide = 3 DXT1 blocks of 8 bytes
    assert_eq!(PixelFormat::S3tcDxt1.row_pitch(10), 24);
    // exact multiple
    assert_eq!(PixelFormat::S3tcDxt1.row_pitch(8), 16);
    // ASTC 8x8: 9 texels = 2 blocks of 16 bytes
    assert_eq!(PixelFormat::Astc8x8.row_pitch(9), 32);
}

#[test]
fn test_slice_size() {
    assert_eq!(PixelFormat::Rgba8.slice_size(64, 64), 64 * 64 * 4);
    // 8x8 DXT5 = 2x2 blocks of 16 bytes
    assert_eq!(PixelFormat::S3tcDxt5.slice_size(8, 8), 64);
    // partial blocks round up
    assert_eq!(PixelFormat::S3tcDxt5.slice_size(9, 5), 3 * 2 * 16);
}

#[test]
fn test_compute_mip_levels() {
    assert_eq!(compute_mip_levels(1, 1), 1);
    assert_eq!(compute_mip_levels(2, 2), 2);
    assert_eq!(compute_mip_levels(256, 256), 9);
    assert_eq!(compute_mip_levels(256, 64), 9);
    assert_eq!(compute_mip_levels(100, 100), 7);
}

// ============================================================================
// TARGET BUFFER FLAGS
// ============================================================================

#[test]
fn test_mrt_color_flags() {
    assert_eq!(mrt_color_flag(0), TargetBufferFlags::COLOR0);
    assert_eq!(mrt_color_flag(1), TargetBufferFlags::COLOR1);
    assert_eq!(mrt_color_flag(3), TargetBufferFlags::COLOR3);
}

#[test]
fn test_target_buffer_flag_composition() {
    let flags = TargetBufferFlags::COLOR0 | TargetBufferFlags::DEPTH;
    assert!(flags.intersects(TargetBufferFlags::ALL_COLOR));
    assert!(flags.intersects(TargetBufferFlags::DEPTH_AND_STENCIL));
    assert!(!flags.contains(TargetBufferFlags::STENCIL));

    assert_eq!(
        TargetBufferFlags::DEPTH | TargetBufferFlags::STENCIL,
        TargetBufferFlags::DEPTH_AND_STENCIL
    );
    assert!(TargetBufferFlags::ALL.contains(TargetBufferFlags::ALL_COLOR));
}

// ============================================================================
// KEY HASHES
// ============================================================================

#[test]
fn test_render_pass_desc_hash_is_stable() {
    let desc = RenderPassDesc {
        flags: RenderPassFlags {
            clear: TargetBufferFlags::ALL,
            ..Default::default()
        },
        clear_color: glam::vec4(0.1, 0.2, 0.3, 1.0),
        ..Default::default()
    };

    assert_eq!(desc.key_hash(7), desc.clone().key_hash(7));
}

#[test]
fn test_render_pass_desc_hash_sensitivity() {
    let base = RenderPassDesc {
        flags: RenderPassFlags {
            clear: TargetBufferFlags::ALL_COLOR,
            ..Default::default()
        },
        ..Default::default()
    };
    let base_hash = base.key_hash(0);

    // Flipping a single clear flag changes the key
    let mut changed = base.clone();
    changed.flags.clear |= TargetBufferFlags::DEPTH;
    assert_ne!(changed.key_hash(0), base_hash);

    // Discard-start change alone changes the key
    let mut changed = base.clone();
    changed.flags.discard_start = TargetBufferFlags::COLOR0;
    assert_ne!(changed.key_hash(0), base_hash);

    // Discard-end change alone changes the key
    let mut changed = base.clone();
    changed.flags.discard_end = TargetBufferFlags::DEPTH_AND_STENCIL;
    assert_ne!(changed.key_hash(0), base_hash);

    // Clear color change alone changes the key
    let mut changed = base.clone();
    changed.clear_color = glam::vec4(1.0, 0.0, 0.0, 1.0);
    assert_ne!(changed.key_hash(0), base_hash);

    // Same description under a different attachment seed changes the key
    assert_ne!(base.key_hash(1), base_hash);
}

#[test]
fn test_vertex_layout_desc_hash() {
    let layout = VertexLayoutDesc {
        stride: 20,
        instance_stride: 0,
        attributes: vec![
            VertexAttribute { location: 0, format: VertexFormat::Float3, offset: 0, instanced: false },
            VertexAttribute { location: 1, format: VertexFormat::Float2, offset: 12, instanced: false },
        ],
    };
    assert_eq!(layout.key_hash(), layout.clone().key_hash());

    let mut other = layout.clone();
    other.attributes[1].offset = 16;
    assert_ne!(other.key_hash(), layout.key_hash());

    let mut other = layout.clone();
    other.stride = 24;
    assert_ne!(other.key_hash(), layout.key_hash());
}

#[test]
fn test_depth_stencil_desc_hash() {
    let desc = DepthStencilDesc {
        flags: DepthStencilFlags::DEPTH_TEST | DepthStencilFlags::DEPTH_WRITE,
        ..Default::default()
    };
    assert_eq!(desc.key_hash(), desc.key_hash());

    let mut other = desc;
    other.depth_compare_function = CompareFunc::GreaterEqual;
    assert_ne!(other.key_hash(), desc.key_hash());

    let mut other = desc;
    other.front_face_stencil.write_mask = 0xFF;
    assert_ne!(other.key_hash(), desc.key_hash());
}

#[test]
fn test_vertex_format_sizes() {
    assert_eq!(VertexFormat::Float3.size(), 12);
    assert_eq!(VertexFormat::UByte4Norm.size(), 4);
    assert_eq!(VertexFormat::UShort4.size(), 8);
}

#[test]
fn test_index_format_bytes() {
    assert_eq!(IndexFormat::U16.bytes(), 2);
    assert_eq!(IndexFormat::U32.bytes(), 4);
}

#[test]
fn test_driver_config_default() {
    let config = DriverConfig::default();
    assert!(config.vsync);
    assert_eq!(config.uniform_ring_capacity, 1024 * 1024);
}
