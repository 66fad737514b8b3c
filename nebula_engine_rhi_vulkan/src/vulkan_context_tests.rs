//! Unit tests for the deferred-disposal retirement policy

use crate::vulkan_context::{drain_ready_disposals, DisposableResource, PendingDisposal};
use ash::vk::{self, Handle};

fn pending(fence_value: u64, raw: u64) -> PendingDisposal {
    PendingDisposal {
        fence_value,
        resource: DisposableResource::ImageView(vk::ImageView::from_raw(raw)),
    }
}

fn raw_of(disposal: &PendingDisposal) -> u64 {
    match &disposal.resource {
        DisposableResource::ImageView(view) => view.as_raw(),
        _ => unreachable!(),
    }
}

#[test]
fn test_drain_nothing_before_completion() {
    let mut queue = vec![pending(3, 1), pending(5, 2)];
    let ready = drain_ready_disposals(&mut queue, 2);
    assert!(ready.is_empty());
    assert_eq!(queue.len(), 2);
}

#[test]
fn test_drain_exactly_completed_values() {
    let mut queue = vec![pending(1, 10), pending(2, 20), pending(3, 30)];

    let ready = drain_ready_disposals(&mut queue, 2);
    let mut raws: Vec<u64> = ready.iter().map(raw_of).collect();
    raws.sort_unstable();
    assert_eq!(raws, vec![10, 20]);

    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].fence_value, 3);
}

#[test]
fn test_drain_is_incremental() {
    let mut queue = vec![pending(1, 1), pending(4, 4), pending(2, 2)];

    assert_eq!(drain_ready_disposals(&mut queue, 1).len(), 1);
    assert_eq!(drain_ready_disposals(&mut queue, 1).len(), 0);
    assert_eq!(drain_ready_disposals(&mut queue, 3).len(), 1);
    assert_eq!(drain_ready_disposals(&mut queue, u64::MAX).len(), 1);
    assert!(queue.is_empty());
}

#[test]
fn test_drain_all_at_force_flush() {
    // destroy_stale_resources passes u64::MAX after the idle wait
    let mut queue = vec![pending(7, 1), pending(9, 2), pending(100, 3)];
    let ready = drain_ready_disposals(&mut queue, u64::MAX);
    assert_eq!(ready.len(), 3);
    assert!(queue.is_empty());
}

#[test]
fn test_mixed_resource_variants_drain_together() {
    let mut queue = vec![
        PendingDisposal {
            fence_value: 1,
            resource: DisposableResource::Sampler(vk::Sampler::from_raw(1)),
        },
        PendingDisposal {
            fence_value: 1,
            resource: DisposableResource::Buffer {
                buffer: vk::Buffer::from_raw(2),
                allocation: None,
            },
        },
        PendingDisposal {
            fence_value: 1,
            resource: DisposableResource::Memory(vk::DeviceMemory::from_raw(3)),
        },
        PendingDisposal {
            fence_value: 2,
            resource: DisposableResource::Image {
                image: vk::Image::from_raw(4),
                allocation: None,
            },
        },
    ];

    let ready = drain_ready_disposals(&mut queue, 1);
    assert_eq!(ready.len(), 3);
    assert_eq!(queue.len(), 1);
}
