//! Unit tests for the image layout tracker and barrier mask inference

use crate::vulkan_image_layout::{dst_barrier_masks, src_barrier_masks, ImageLayoutTracker};
use ash::vk;

// ============================================================================
// LAYOUT TRACKER
// ============================================================================

#[test]
fn test_unset_subresources_are_undefined() {
    let tracker = ImageLayoutTracker::new(4, 2);
    assert_eq!(tracker.layout(0, 0), vk::ImageLayout::UNDEFINED);
    assert_eq!(tracker.layout(3, 1), vk::ImageLayout::UNDEFINED);
    // Out of the initial capacity: still UNDEFINED, no panic
    assert_eq!(tracker.layout(16, 16), vk::ImageLayout::UNDEFINED);
}

#[test]
fn test_set_layout_returns_most_recent_write() {
    let mut tracker = ImageLayoutTracker::new(4, 2);

    tracker.set_layout(0, 0, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    assert_eq!(tracker.layout(0, 0), vk::ImageLayout::TRANSFER_DST_OPTIMAL);

    tracker.set_layout(0, 0, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    assert_eq!(tracker.layout(0, 0), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
}

#[test]
fn test_subresources_are_independent() {
    let mut tracker = ImageLayoutTracker::new(4, 2);

    tracker.set_layout(1, 0, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
    tracker.set_layout(1, 1, vk::ImageLayout::TRANSFER_DST_OPTIMAL);

    assert_eq!(tracker.layout(1, 0), vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
    assert_eq!(tracker.layout(1, 1), vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    // Neighbors untouched
    assert_eq!(tracker.layout(0, 0), vk::ImageLayout::UNDEFINED);
    assert_eq!(tracker.layout(2, 0), vk::ImageLayout::UNDEFINED);
}

#[test]
fn test_tracker_grows_past_initial_capacity() {
    let mut tracker = ImageLayoutTracker::new(1, 1);

    tracker.set_layout(9, 5, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    assert_eq!(tracker.layout(9, 5), vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    // Slots created by the growth stay UNDEFINED
    assert_eq!(tracker.layout(9, 4), vk::ImageLayout::UNDEFINED);
    assert_eq!(tracker.layout(8, 5), vk::ImageLayout::UNDEFINED);
}

#[test]
fn test_transition_sequence_mirrors_upload_path() {
    // Undefined -> TransferDst -> ShaderReadOnly, the first-upload sequence
    let mut tracker = ImageLayoutTracker::new(16, 8);

    assert_eq!(tracker.layout(0, 0), vk::ImageLayout::UNDEFINED);
    tracker.set_layout(0, 0, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    tracker.set_layout(0, 0, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    assert_eq!(tracker.layout(0, 0), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
}

// ============================================================================
// BARRIER MASK INFERENCE
// ============================================================================

#[test]
fn test_src_masks_for_undefined() {
    let (access, stage) = src_barrier_masks(vk::ImageLayout::UNDEFINED);
    assert_eq!(access, vk::AccessFlags::empty());
    assert_eq!(stage, vk::PipelineStageFlags::TOP_OF_PIPE);
}

#[test]
fn test_src_masks_for_transfer_layouts() {
    let (access, stage) = src_barrier_masks(vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    assert_eq!(access, vk::AccessFlags::TRANSFER_WRITE);
    assert_eq!(stage, vk::PipelineStageFlags::TRANSFER);

    let (access, _) = src_barrier_masks(vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
    assert_eq!(access, vk::AccessFlags::TRANSFER_READ);
}

#[test]
fn test_dst_masks_for_shader_read() {
    let (access, stage) = dst_barrier_masks(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    assert_eq!(access, vk::AccessFlags::SHADER_READ);
    assert_eq!(stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
}

#[test]
fn test_dst_masks_for_attachments() {
    let (access, stage) = dst_barrier_masks(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    assert_eq!(access, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
    assert_eq!(stage, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);

    let (access, stage) = dst_barrier_masks(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    assert_eq!(access, vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE);
    assert!(stage.contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS));
    assert!(stage.contains(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS));
}

#[test]
fn test_unknown_layouts_fall_back_to_all_commands() {
    let (_, stage) = src_barrier_masks(vk::ImageLayout::PRESENT_SRC_KHR);
    assert_eq!(stage, vk::PipelineStageFlags::ALL_COMMANDS);

    let (_, stage) = dst_barrier_masks(vk::ImageLayout::PRESENT_SRC_KHR);
    assert_eq!(stage, vk::PipelineStageFlags::ALL_COMMANDS);
}
