//! Unit tests for the uniform ring write-head arithmetic

use crate::vulkan_uniform_ring::RingAllocator;

#[test]
fn test_offsets_are_monotonic_and_aligned() {
    let mut ring = RingAllocator::new(4096, 256);

    let a = ring.allocate(16);
    let b = ring.allocate(300);
    let c = ring.allocate(1);

    assert!(a < b && b < c);
    assert_eq!(a % 256, 0);
    assert_eq!(b % 256, 0);
    assert_eq!(c % 256, 0);

    // 16 rounds to 256, 300 rounds to 512
    assert_eq!(a, 0);
    assert_eq!(b, 256);
    assert_eq!(c, 768);
    assert_eq!(ring.used(), 1024);
}

#[test]
fn test_reset_rewinds_the_head() {
    let mut ring = RingAllocator::new(1024, 64);
    ring.allocate(100);
    ring.allocate(100);
    assert!(ring.used() > 0);

    ring.reset();
    assert_eq!(ring.used(), 0);
    assert_eq!(ring.allocate(8), 0);
}

#[test]
fn test_exact_capacity_fits() {
    let mut ring = RingAllocator::new(512, 256);
    ring.allocate(256);
    // Second slice lands exactly at the end
    assert_eq!(ring.allocate(256), 256);
    assert_eq!(ring.used(), 512);
}

#[test]
#[should_panic(expected = "Uniform ring buffer overflow")]
fn test_overflow_is_an_assertion_not_corruption() {
    let mut ring = RingAllocator::new(512, 256);
    ring.allocate(256);
    ring.allocate(256);
    // One byte over: must be caught, never silently wrap
    ring.allocate(1);
}

#[test]
#[should_panic(expected = "Uniform ring buffer overflow")]
fn test_aligned_size_overflows_even_when_raw_size_fits() {
    let mut ring = RingAllocator::new(300, 256);
    // 20 raw bytes fit, but the 256-aligned reservation of the second
    // allocation does not
    ring.allocate(20);
    ring.allocate(20);
}

#[test]
fn test_minimum_alignment_of_one() {
    let mut ring = RingAllocator::new(16, 1);
    assert_eq!(ring.allocate(3), 0);
    assert_eq!(ring.allocate(3), 3);
    assert_eq!(ring.used(), 6);
}
