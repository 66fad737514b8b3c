//! Unit tests for the render-target load/store policy, clear values, and
//! framebuffer cache keys

use crate::vulkan_render_target::{build_clear_values, framebuffer_key, load_store_ops};
use ash::vk::{self, Handle};
use nebula_engine::glam;
use nebula_engine::nebula::rhi::{RenderPassDesc, RenderPassFlags, TargetBufferFlags};

// ============================================================================
// LOAD/STORE OP POLICY
// ============================================================================

#[test]
fn test_clear_flag_wins_over_discard() {
    let flags = RenderPassFlags {
        clear: TargetBufferFlags::COLOR0,
        discard_start: TargetBufferFlags::COLOR0,
        discard_end: TargetBufferFlags::empty(),
    };
    let (load, store) = load_store_ops(&flags, TargetBufferFlags::COLOR0);
    assert_eq!(load, vk::AttachmentLoadOp::CLEAR);
    assert_eq!(store, vk::AttachmentStoreOp::STORE);
}

#[test]
fn test_discard_start_without_clear_is_dont_care() {
    let flags = RenderPassFlags {
        clear: TargetBufferFlags::empty(),
        discard_start: TargetBufferFlags::COLOR1,
        discard_end: TargetBufferFlags::empty(),
    };
    let (load, _) = load_store_ops(&flags, TargetBufferFlags::COLOR1);
    assert_eq!(load, vk::AttachmentLoadOp::DONT_CARE);
}

#[test]
fn test_untouched_attachment_loads_and_stores() {
    let flags = RenderPassFlags::default();
    let (load, store) = load_store_ops(&flags, TargetBufferFlags::COLOR0);
    assert_eq!(load, vk::AttachmentLoadOp::LOAD);
    assert_eq!(store, vk::AttachmentStoreOp::STORE);
}

#[test]
fn test_discard_end_drops_the_store() {
    let flags = RenderPassFlags {
        clear: TargetBufferFlags::DEPTH,
        discard_start: TargetBufferFlags::empty(),
        discard_end: TargetBufferFlags::DEPTH,
    };
    let (load, store) = load_store_ops(&flags, TargetBufferFlags::DEPTH);
    assert_eq!(load, vk::AttachmentLoadOp::CLEAR);
    assert_eq!(store, vk::AttachmentStoreOp::DONT_CARE);
}

#[test]
fn test_depth_and_stencil_ops_are_independent() {
    let flags = RenderPassFlags {
        clear: TargetBufferFlags::DEPTH,
        discard_start: TargetBufferFlags::STENCIL,
        discard_end: TargetBufferFlags::empty(),
    };
    let (depth_load, _) = load_store_ops(&flags, TargetBufferFlags::DEPTH);
    let (stencil_load, _) = load_store_ops(&flags, TargetBufferFlags::STENCIL);
    assert_eq!(depth_load, vk::AttachmentLoadOp::CLEAR);
    assert_eq!(stencil_load, vk::AttachmentLoadOp::DONT_CARE);
}

// ============================================================================
// CLEAR VALUES
// ============================================================================

fn all_clear_desc() -> RenderPassDesc {
    RenderPassDesc {
        flags: RenderPassFlags {
            clear: TargetBufferFlags::ALL,
            ..Default::default()
        },
        clear_color: glam::vec4(0.25, 0.5, 0.75, 1.0),
        clear_depth: 0.5,
        clear_stencil: 7,
    }
}

#[test]
fn test_clear_values_two_colors_plus_depth() {
    let desc = all_clear_desc();
    let values = build_clear_values(&desc, &[0, 1], true);
    assert_eq!(values.len(), 3);

    unsafe {
        assert_eq!(values[0].color.float32, [0.25, 0.5, 0.75, 1.0]);
        assert_eq!(values[1].color.float32, [0.25, 0.5, 0.75, 1.0]);
        assert_eq!(values[2].depth_stencil.depth, 0.5);
        assert_eq!(values[2].depth_stencil.stencil, 7);
    }
}

#[test]
fn test_uncleared_color_slot_gets_zeros() {
    let mut desc = all_clear_desc();
    desc.flags.clear = TargetBufferFlags::COLOR0 | TargetBufferFlags::DEPTH_AND_STENCIL;

    let values = build_clear_values(&desc, &[0, 1], true);
    unsafe {
        assert_eq!(values[0].color.float32, [0.25, 0.5, 0.75, 1.0]);
        assert_eq!(values[1].color.float32, [0.0, 0.0, 0.0, 0.0]);
    }
}

#[test]
fn test_uncleared_depth_defaults_to_far_plane() {
    let mut desc = all_clear_desc();
    desc.flags.clear = TargetBufferFlags::ALL_COLOR;

    let values = build_clear_values(&desc, &[0], true);
    unsafe {
        assert_eq!(values[1].depth_stencil.depth, 1.0);
        assert_eq!(values[1].depth_stencil.stencil, 0);
    }
}

#[test]
fn test_clear_values_default_target_uses_image_slot() {
    // The default target passes only the acquired image's slot
    let mut desc = all_clear_desc();
    desc.flags.clear = TargetBufferFlags::COLOR2;

    let values = build_clear_values(&desc, &[2], false);
    assert_eq!(values.len(), 1);
    unsafe {
        assert_eq!(values[0].color.float32, [0.25, 0.5, 0.75, 1.0]);
    }
}

#[test]
fn test_clear_values_no_depth() {
    let values = build_clear_values(&all_clear_desc(), &[0], false);
    assert_eq!(values.len(), 1);
}

// ============================================================================
// CACHE KEYS
// ============================================================================

#[test]
fn test_render_pass_key_changes_with_attachment_seed() {
    // Same description, different attachment identity -> different key
    let desc = all_clear_desc();
    assert_ne!(desc.key_hash(0x1111), desc.key_hash(0x2222));
}

#[test]
fn test_framebuffer_key_depends_on_pass_and_seed() {
    let pass_a = vk::RenderPass::from_raw(0x10);
    let pass_b = vk::RenderPass::from_raw(0x20);

    assert_eq!(framebuffer_key(pass_a, 1), framebuffer_key(pass_a, 1));
    assert_ne!(framebuffer_key(pass_a, 1), framebuffer_key(pass_b, 1));
    assert_ne!(framebuffer_key(pass_a, 1), framebuffer_key(pass_a, 2));
}
