//! Unit tests for pipeline cache keys, capability-tier baking, and the
//! descriptor free lists

use crate::vulkan_render_pipeline::{
    baked_dynamic_state_bits, make_pipeline_id, DescriptorFreeLists, DescriptorState,
    ExtendedDynamicState, MAX_DESCRIPTOR_SETS,
};
use ash::vk::{self, Handle};
use nebula_engine::nebula::rhi::{BlendDesc, BlendFactor};

// ============================================================================
// PIPELINE CACHE KEY
// ============================================================================

fn base_key() -> u64 {
    make_pipeline_id(
        &BlendDesc::default(),
        0xD5,
        0xAB,
        vk::RenderPass::from_raw(0x100),
        0x7E,
        0,
    )
}

#[test]
fn test_identical_inputs_produce_identical_keys() {
    assert_eq!(base_key(), base_key());
}

#[test]
fn test_each_component_changes_the_key() {
    let base = base_key();

    let mut blend = BlendDesc::default();
    blend.blend_enabled = true;
    blend.source_rgb_blend_factor = BlendFactor::SrcAlpha;
    assert_ne!(
        make_pipeline_id(&blend, 0xD5, 0xAB, vk::RenderPass::from_raw(0x100), 0x7E, 0),
        base
    );

    // depth-stencil hash
    assert_ne!(
        make_pipeline_id(&BlendDesc::default(), 0xD6, 0xAB, vk::RenderPass::from_raw(0x100), 0x7E, 0),
        base
    );

    // program id
    assert_ne!(
        make_pipeline_id(&BlendDesc::default(), 0xD5, 0xAC, vk::RenderPass::from_raw(0x100), 0x7E, 0),
        base
    );

    // render pass
    assert_ne!(
        make_pipeline_id(&BlendDesc::default(), 0xD5, 0xAB, vk::RenderPass::from_raw(0x200), 0x7E, 0),
        base
    );

    // vertex layout hash
    assert_ne!(
        make_pipeline_id(&BlendDesc::default(), 0xD5, 0xAB, vk::RenderPass::from_raw(0x100), 0x7F, 0),
        base
    );

    // baked dynamic bits
    assert_ne!(
        make_pipeline_id(&BlendDesc::default(), 0xD5, 0xAB, vk::RenderPass::from_raw(0x100), 0x7E, 1),
        base
    );
}

// ============================================================================
// CAPABILITY-TIER BAKING
// ============================================================================

fn strip_state() -> ExtendedDynamicState {
    ExtendedDynamicState {
        cull_mode: vk::CullModeFlags::BACK,
        front_face: vk::FrontFace::CLOCKWISE,
        topology: vk::PrimitiveTopology::TRIANGLE_STRIP,
    }
}

#[test]
fn test_full_dynamic_state_bakes_nothing() {
    // Full extension support: zero extra pipeline permutations
    assert_eq!(baked_dynamic_state_bits(true, true, &strip_state()), 0);
    assert_eq!(
        baked_dynamic_state_bits(true, true, &ExtendedDynamicState::default()),
        0
    );
}

#[test]
fn test_restricted_topology_bakes_topology_only() {
    let strip = baked_dynamic_state_bits(true, false, &strip_state());
    let mut list_state = strip_state();
    list_state.topology = vk::PrimitiveTopology::TRIANGLE_LIST;
    let list = baked_dynamic_state_bits(true, false, &list_state);

    assert_ne!(strip, list);

    // Cull mode does NOT affect the key at this tier
    let mut front_cull = strip_state();
    front_cull.cull_mode = vk::CullModeFlags::FRONT;
    assert_eq!(strip, baked_dynamic_state_bits(true, false, &front_cull));
}

#[test]
fn test_no_extension_bakes_all_three() {
    let base = baked_dynamic_state_bits(false, false, &strip_state());

    let mut changed = strip_state();
    changed.cull_mode = vk::CullModeFlags::FRONT;
    assert_ne!(base, baked_dynamic_state_bits(false, false, &changed));

    let mut changed = strip_state();
    changed.front_face = vk::FrontFace::COUNTER_CLOCKWISE;
    assert_ne!(base, baked_dynamic_state_bits(false, false, &changed));

    let mut changed = strip_state();
    changed.topology = vk::PrimitiveTopology::LINE_LIST;
    assert_ne!(base, baked_dynamic_state_bits(false, false, &changed));
}

// ============================================================================
// DESCRIPTOR FREE LISTS
// ============================================================================

fn fake_state(layout_raw: u64, set_raw: u64, frame_index: i32) -> DescriptorState {
    let mut sets = [vk::DescriptorSet::null(); MAX_DESCRIPTOR_SETS];
    sets[0] = vk::DescriptorSet::from_raw(set_raw);
    DescriptorState {
        sets,
        owner_layout: vk::PipelineLayout::from_raw(layout_raw),
        frame_index,
    }
}

#[test]
fn test_recycle_then_take_returns_identical_allocation() {
    let mut lists = DescriptorFreeLists::default();
    let state = fake_state(0x40, 0x77, 0);

    lists.recycle(state);
    let taken = lists.take(vk::PipelineLayout::from_raw(0x40), 0).unwrap();

    // Identical sets, re-bound to the frame
    assert_eq!(taken.sets[0].as_raw(), 0x77);
    assert_eq!(taken.frame_index, 0);

    // Free list is now empty again
    assert!(lists.take(vk::PipelineLayout::from_raw(0x40), 0).is_none());
}

#[test]
fn test_free_lists_are_per_frame_index() {
    let mut lists = DescriptorFreeLists::default();
    lists.recycle(fake_state(0x40, 0x1, 0));

    // Frame 1 cannot steal frame 0's allocation
    assert!(lists.take(vk::PipelineLayout::from_raw(0x40), 1).is_none());
    assert!(lists.take(vk::PipelineLayout::from_raw(0x40), 0).is_some());
}

#[test]
fn test_free_lists_are_per_layout() {
    let mut lists = DescriptorFreeLists::default();
    lists.recycle(fake_state(0x40, 0x1, 0));

    assert!(lists.take(vk::PipelineLayout::from_raw(0x41), 0).is_none());
    assert!(lists.take(vk::PipelineLayout::from_raw(0x40), 0).is_some());
}

#[test]
fn test_take_from_empty_lists() {
    let mut lists = DescriptorFreeLists::default();
    assert!(lists.take(vk::PipelineLayout::from_raw(0x1), 0).is_none());
}
