//! Unit tests for adapter scoring

use crate::vulkan_driver::{score_adapter, AdapterCandidate};
use ash::vk;
use nebula_engine::nebula::rhi::PowerPreference;

fn discrete(index: usize, api_version: u32, vram_gib: u64) -> AdapterCandidate {
    AdapterCandidate {
        device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
        api_version,
        device_local_vram: vram_gib * 1024 * 1024 * 1024,
        index,
    }
}

fn integrated(index: usize) -> AdapterCandidate {
    AdapterCandidate {
        device_type: vk::PhysicalDeviceType::INTEGRATED_GPU,
        api_version: vk::API_VERSION_1_3,
        device_local_vram: 256 * 1024 * 1024,
        index,
    }
}

#[test]
fn test_high_performance_prefers_discrete() {
    let discrete_score = score_adapter(&discrete(1, vk::API_VERSION_1_3, 8), PowerPreference::HighPerformance);
    let integrated_score = score_adapter(&integrated(0), PowerPreference::HighPerformance);
    assert!(discrete_score > integrated_score);
}

#[test]
fn test_high_performance_weighs_vram() {
    let small = score_adapter(&discrete(0, vk::API_VERSION_1_3, 4), PowerPreference::HighPerformance);
    let large = score_adapter(&discrete(1, vk::API_VERSION_1_3, 16), PowerPreference::HighPerformance);
    assert!(large > small);
    // A point per 256 MiB: 12 GiB difference = 48 points
    assert_eq!(large - small, 48);
}

#[test]
fn test_high_performance_weighs_api_version() {
    let older = score_adapter(&discrete(0, vk::API_VERSION_1_2, 8), PowerPreference::HighPerformance);
    let newer = score_adapter(&discrete(1, vk::API_VERSION_1_3, 8), PowerPreference::HighPerformance);
    assert!(newer > older);
}

#[test]
fn test_low_power_prefers_integrated() {
    let discrete_score = score_adapter(&discrete(0, vk::API_VERSION_1_3, 16), PowerPreference::LowPower);
    let integrated_score = score_adapter(&integrated(1), PowerPreference::LowPower);
    assert!(integrated_score > discrete_score);
}

#[test]
fn test_auto_uses_enumeration_order() {
    let first = score_adapter(&integrated(0), PowerPreference::Auto);
    let second = score_adapter(&integrated(1), PowerPreference::Auto);
    assert!(first > second);

    // Device type is irrelevant under Auto
    assert_eq!(
        score_adapter(&discrete(2, vk::API_VERSION_1_3, 8), PowerPreference::Auto),
        score_adapter(&integrated(2), PowerPreference::Auto)
    );
}

#[test]
fn test_ties_resolve_to_first_enumerated() {
    // score_adapter equal scores: the selection loop keeps the earlier
    // device because later candidates must strictly beat the best
    let a = score_adapter(&integrated(3), PowerPreference::LowPower);
    let b = score_adapter(&integrated(5), PowerPreference::LowPower);
    assert_eq!(a, b);
}
