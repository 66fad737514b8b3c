//! Unit tests for the format and enum translation tables

use crate::vulkan_utils::*;
use ash::vk;
use nebula_engine::nebula::rhi::{
    CullMode, IndexFormat, PixelFormat, PrimitiveType, VertexFormat, Winding,
};

#[test]
fn test_format_table_uncompressed() {
    assert_eq!(to_vk_format(PixelFormat::Rgba8), vk::Format::R8G8B8A8_UNORM);
    assert_eq!(to_vk_format(PixelFormat::Bgra8), vk::Format::B8G8R8A8_UNORM);
    assert_eq!(to_vk_format(PixelFormat::Rgb565), vk::Format::R5G6B5_UNORM_PACK16);
    assert_eq!(to_vk_format(PixelFormat::R8), vk::Format::R8_UNORM);
    assert_eq!(to_vk_format(PixelFormat::Rgba32F), vk::Format::R32G32B32A32_SFLOAT);
}

#[test]
fn test_format_table_compressed() {
    assert_eq!(to_vk_format(PixelFormat::Etc2), vk::Format::ETC2_R8G8B8_UNORM_BLOCK);
    assert_eq!(to_vk_format(PixelFormat::S3tcDxt1), vk::Format::BC1_RGBA_UNORM_BLOCK);
    assert_eq!(to_vk_format(PixelFormat::S3tcDxt5), vk::Format::BC3_UNORM_BLOCK);
    assert_eq!(to_vk_format(PixelFormat::Astc4x4), vk::Format::ASTC_4X4_UNORM_BLOCK);
}

#[test]
fn test_format_table_depth_stencil() {
    assert_eq!(to_vk_format(PixelFormat::D24S8), vk::Format::D24_UNORM_S8_UINT);
    let aspect = aspect_mask_of(PixelFormat::D24S8);
    assert!(aspect.contains(vk::ImageAspectFlags::DEPTH));
    assert!(aspect.contains(vk::ImageAspectFlags::STENCIL));
    assert_eq!(aspect_mask_of(PixelFormat::Rgba8), vk::ImageAspectFlags::COLOR);
}

#[test]
fn test_swapchain_format_reverse_lookup() {
    assert_eq!(from_vk_color_format(vk::Format::R8G8B8A8_UNORM), Some(PixelFormat::Rgba8));
    assert_eq!(from_vk_color_format(vk::Format::B8G8R8A8_UNORM), Some(PixelFormat::Bgra8));
    assert_eq!(from_vk_color_format(vk::Format::R16G16B16A16_SFLOAT), None);
}

#[test]
fn test_primitive_topology_mapping() {
    assert_eq!(
        to_vk_primitive_topology(PrimitiveType::Triangle),
        vk::PrimitiveTopology::TRIANGLE_LIST
    );
    assert_eq!(
        to_vk_primitive_topology(PrimitiveType::TriangleStrip),
        vk::PrimitiveTopology::TRIANGLE_STRIP
    );
    assert_eq!(to_vk_primitive_topology(PrimitiveType::Point), vk::PrimitiveTopology::POINT_LIST);
    assert_eq!(to_vk_primitive_topology(PrimitiveType::Line), vk::PrimitiveTopology::LINE_LIST);
}

#[test]
fn test_line_loop_degrades_to_line_strip() {
    // No native LINE_LOOP in Vulkan: degrade (with a logged error)
    assert_eq!(
        to_vk_primitive_topology(PrimitiveType::LineLoop),
        vk::PrimitiveTopology::LINE_STRIP
    );
    assert_eq!(
        to_vk_primitive_topology(PrimitiveType::LineStrip),
        vk::PrimitiveTopology::LINE_STRIP
    );
}

#[test]
fn test_index_cull_winding_mappings() {
    assert_eq!(to_vk_index_type(IndexFormat::U16), vk::IndexType::UINT16);
    assert_eq!(to_vk_index_type(IndexFormat::U32), vk::IndexType::UINT32);

    assert_eq!(to_vk_cull_mode(CullMode::None), vk::CullModeFlags::NONE);
    assert_eq!(to_vk_cull_mode(CullMode::Back), vk::CullModeFlags::BACK);
    assert_eq!(to_vk_cull_mode(CullMode::Front), vk::CullModeFlags::FRONT);

    assert_eq!(to_vk_front_face(Winding::Clockwise), vk::FrontFace::CLOCKWISE);
    assert_eq!(
        to_vk_front_face(Winding::CounterClockwise),
        vk::FrontFace::COUNTER_CLOCKWISE
    );
}

#[test]
fn test_vertex_format_mapping() {
    assert_eq!(to_vk_vertex_format(VertexFormat::Float3), vk::Format::R32G32B32_SFLOAT);
    assert_eq!(to_vk_vertex_format(VertexFormat::UByte4Norm), vk::Format::R8G8B8A8_UNORM);
    assert_eq!(to_vk_vertex_format(VertexFormat::Int2), vk::Format::R32G32_SINT);
}
