/// Translation tables between engine RHI types and Vulkan

use ash::vk;
use nebula_engine::engine_error;
use nebula_engine::nebula::rhi::{
    BlendFactor, BlendOp, ColorWriteMask, CompareFunc, CullMode, IndexFormat, PixelFormat,
    PrimitiveType, SamplerAddressMode, StencilOp, VertexFormat, Winding,
};

/// Fixed PixelFormat -> VkFormat table
///
/// Formats the backend cannot express map to `UNDEFINED`; texture creation
/// logs an error and bails when it meets one. New engine formats must be
/// added here or their uploads fail.
pub fn to_vk_format(format: PixelFormat) -> vk::Format {
    match format {
        PixelFormat::Etc2 => vk::Format::ETC2_R8G8B8_UNORM_BLOCK,
        PixelFormat::Etc2A => vk::Format::ETC2_R8G8B8A8_UNORM_BLOCK,
        PixelFormat::Astc4x4 => vk::Format::ASTC_4X4_UNORM_BLOCK,
        PixelFormat::Astc8x8 => vk::Format::ASTC_8X8_UNORM_BLOCK,
        PixelFormat::S3tcDxt1 => vk::Format::BC1_RGBA_UNORM_BLOCK,
        PixelFormat::S3tcDxt3 => vk::Format::BC2_UNORM_BLOCK,
        PixelFormat::S3tcDxt5 => vk::Format::BC3_UNORM_BLOCK,
        PixelFormat::Rgba8 => vk::Format::R8G8B8A8_UNORM,
        PixelFormat::Bgra8 => vk::Format::B8G8R8A8_UNORM,
        PixelFormat::Rgb565 => vk::Format::R5G6B5_UNORM_PACK16,
        PixelFormat::Rgba4 => vk::Format::R4G4B4A4_UNORM_PACK16,
        PixelFormat::Rgb5A1 => vk::Format::R5G5B5A1_UNORM_PACK16,
        PixelFormat::R8 => vk::Format::R8_UNORM,
        PixelFormat::Rg8 => vk::Format::R8G8_UNORM,
        PixelFormat::Rgba32F => vk::Format::R32G32B32A32_SFLOAT,
        PixelFormat::D24S8 => vk::Format::D24_UNORM_S8_UINT,
    }
}

/// Reverse lookup used when wrapping swapchain images
pub fn from_vk_color_format(format: vk::Format) -> Option<PixelFormat> {
    match format {
        vk::Format::R8G8B8A8_UNORM => Some(PixelFormat::Rgba8),
        vk::Format::B8G8R8A8_UNORM => Some(PixelFormat::Bgra8),
        _ => None,
    }
}

/// Aspect flags implied by a pixel format
pub fn aspect_mask_of(format: PixelFormat) -> vk::ImageAspectFlags {
    if format.is_depth_stencil() {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Map PrimitiveType to VkPrimitiveTopology
///
/// LINE_LOOP has no Vulkan topology; emulating it needs LINE_STRIP with
/// primitive restart and extra pipeline variants. The backend logs an error
/// and degrades to LINE_STRIP instead.
pub fn to_vk_primitive_topology(primitive: PrimitiveType) -> vk::PrimitiveTopology {
    match primitive {
        PrimitiveType::Point => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveType::Line => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveType::LineLoop => {
            engine_error!("nebula::vulkan", "Vulkan RHI doesn't support LineLoop");
            vk::PrimitiveTopology::LINE_STRIP
        }
        PrimitiveType::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveType::Triangle => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveType::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
    }
}

pub fn to_vk_index_type(format: IndexFormat) -> vk::IndexType {
    match format {
        IndexFormat::U16 => vk::IndexType::UINT16,
        IndexFormat::U32 => vk::IndexType::UINT32,
    }
}

pub fn to_vk_cull_mode(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Back => vk::CullModeFlags::BACK,
        CullMode::Front => vk::CullModeFlags::FRONT,
    }
}

pub fn to_vk_front_face(winding: Winding) -> vk::FrontFace {
    match winding {
        Winding::Clockwise => vk::FrontFace::CLOCKWISE,
        Winding::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
    }
}

pub fn to_vk_compare_op(func: CompareFunc) -> vk::CompareOp {
    match func {
        CompareFunc::Never => vk::CompareOp::NEVER,
        CompareFunc::Less => vk::CompareOp::LESS,
        CompareFunc::LessEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareFunc::Greater => vk::CompareOp::GREATER,
        CompareFunc::GreaterEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareFunc::Equal => vk::CompareOp::EQUAL,
        CompareFunc::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareFunc::Always => vk::CompareOp::ALWAYS,
    }
}

pub fn to_vk_stencil_op(op: StencilOp) -> vk::StencilOp {
    match op {
        StencilOp::Keep => vk::StencilOp::KEEP,
        StencilOp::Zero => vk::StencilOp::ZERO,
        StencilOp::Replace => vk::StencilOp::REPLACE,
        StencilOp::Invert => vk::StencilOp::INVERT,
        StencilOp::IncrementWrap => vk::StencilOp::INCREMENT_AND_WRAP,
        StencilOp::DecrementWrap => vk::StencilOp::DECREMENT_AND_WRAP,
    }
}

pub fn to_vk_blend_op(op: BlendOp) -> vk::BlendOp {
    match op {
        BlendOp::Add => vk::BlendOp::ADD,
        BlendOp::Subtract => vk::BlendOp::SUBTRACT,
        BlendOp::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
    }
}

pub fn to_vk_blend_factor(factor: BlendFactor) -> vk::BlendFactor {
    match factor {
        BlendFactor::Zero => vk::BlendFactor::ZERO,
        BlendFactor::One => vk::BlendFactor::ONE,
        BlendFactor::SrcColor => vk::BlendFactor::SRC_COLOR,
        BlendFactor::OneMinusSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
        BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstColor => vk::BlendFactor::DST_COLOR,
        BlendFactor::OneMinusDstColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
        BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        BlendFactor::ConstantAlpha => vk::BlendFactor::CONSTANT_ALPHA,
        BlendFactor::OneMinusConstantAlpha => vk::BlendFactor::ONE_MINUS_CONSTANT_ALPHA,
        BlendFactor::SrcAlphaSaturate => vk::BlendFactor::SRC_ALPHA_SATURATE,
        // maps to the blend constant
        BlendFactor::BlendColor => vk::BlendFactor::CONSTANT_COLOR,
    }
}

pub fn to_vk_color_mask(mask: ColorWriteMask) -> vk::ColorComponentFlags {
    let mut flags = vk::ColorComponentFlags::empty();
    if mask.contains(ColorWriteMask::RED) {
        flags |= vk::ColorComponentFlags::R;
    }
    if mask.contains(ColorWriteMask::GREEN) {
        flags |= vk::ColorComponentFlags::G;
    }
    if mask.contains(ColorWriteMask::BLUE) {
        flags |= vk::ColorComponentFlags::B;
    }
    if mask.contains(ColorWriteMask::ALPHA) {
        flags |= vk::ColorComponentFlags::A;
    }
    flags
}

pub fn to_vk_vertex_format(format: VertexFormat) -> vk::Format {
    match format {
        VertexFormat::Float => vk::Format::R32_SFLOAT,
        VertexFormat::Float2 => vk::Format::R32G32_SFLOAT,
        VertexFormat::Float3 => vk::Format::R32G32B32_SFLOAT,
        VertexFormat::Float4 => vk::Format::R32G32B32A32_SFLOAT,
        VertexFormat::Int => vk::Format::R32_SINT,
        VertexFormat::Int2 => vk::Format::R32G32_SINT,
        VertexFormat::Int3 => vk::Format::R32G32B32_SINT,
        VertexFormat::Int4 => vk::Format::R32G32B32A32_SINT,
        VertexFormat::UByte4 => vk::Format::R8G8B8A8_UINT,
        VertexFormat::UByte4Norm => vk::Format::R8G8B8A8_UNORM,
        VertexFormat::UShort2 => vk::Format::R16G16_UINT,
        VertexFormat::UShort4 => vk::Format::R16G16B16A16_UINT,
    }
}

pub fn to_vk_address_mode(mode: SamplerAddressMode) -> vk::SamplerAddressMode {
    match mode {
        SamplerAddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
        SamplerAddressMode::Mirror => vk::SamplerAddressMode::MIRRORED_REPEAT,
        SamplerAddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        SamplerAddressMode::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
    }
}

#[cfg(test)]
#[path = "vulkan_utils_tests.rs"]
mod tests;
