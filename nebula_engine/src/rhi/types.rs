//! Description structs and enums shared by every RHI backend
//!
//! These are plain-data types: backends translate them into native state at
//! resource-creation time. Anything used as a cache key is hashable with a
//! stable structural hash (floats hashed through their bit patterns).

use bitflags::bitflags;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

/// Maximum number of color attachments a render target can carry (MRT)
pub const MAX_COLOR_ATTACHMENT: usize = 4;

// ============================================================================
// PIXEL FORMATS
// ============================================================================

/// Texel block geometry for a pixel format
///
/// Uncompressed formats report a 1x1 block with `bytes` = bytes per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub width: u32,
    pub height: u32,
    pub bytes: u32,
}

/// Pixel formats understood by the engine
///
/// Compressed formats require pre-baked mip data; backends reject runtime
/// mipmap generation for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    // Compressed
    Etc2,
    Etc2A,
    Astc4x4,
    Astc8x8,
    S3tcDxt1,
    S3tcDxt3,
    S3tcDxt5,
    // Uncompressed color
    Rgba8,
    Bgra8,
    Rgb565,
    Rgba4,
    Rgb5A1,
    R8,
    Rg8,
    Rgba32F,
    // Depth-stencil
    D24S8,
}

impl PixelFormat {
    /// True for block-compressed formats
    pub fn is_compressed(self) -> bool {
        matches!(
            self,
            PixelFormat::Etc2
                | PixelFormat::Etc2A
                | PixelFormat::Astc4x4
                | PixelFormat::Astc8x8
                | PixelFormat::S3tcDxt1
                | PixelFormat::S3tcDxt3
                | PixelFormat::S3tcDxt5
        )
    }

    /// True for formats carrying depth and/or stencil aspects
    pub fn is_depth_stencil(self) -> bool {
        matches!(self, PixelFormat::D24S8)
    }

    /// Texel block geometry of this format
    pub fn block_info(self) -> BlockInfo {
        match self {
            PixelFormat::Etc2 => BlockInfo { width: 4, height: 4, bytes: 8 },
            PixelFormat::Etc2A => BlockInfo { width: 4, height: 4, bytes: 16 },
            PixelFormat::Astc4x4 => BlockInfo { width: 4, height: 4, bytes: 16 },
            PixelFormat::Astc8x8 => BlockInfo { width: 8, height: 8, bytes: 16 },
            PixelFormat::S3tcDxt1 => BlockInfo { width: 4, height: 4, bytes: 8 },
            PixelFormat::S3tcDxt3 => BlockInfo { width: 4, height: 4, bytes: 16 },
            PixelFormat::S3tcDxt5 => BlockInfo { width: 4, height: 4, bytes: 16 },
            PixelFormat::Rgba8 => BlockInfo { width: 1, height: 1, bytes: 4 },
            PixelFormat::Bgra8 => BlockInfo { width: 1, height: 1, bytes: 4 },
            PixelFormat::Rgb565 => BlockInfo { width: 1, height: 1, bytes: 2 },
            PixelFormat::Rgba4 => BlockInfo { width: 1, height: 1, bytes: 2 },
            PixelFormat::Rgb5A1 => BlockInfo { width: 1, height: 1, bytes: 2 },
            PixelFormat::R8 => BlockInfo { width: 1, height: 1, bytes: 1 },
            PixelFormat::Rg8 => BlockInfo { width: 1, height: 1, bytes: 2 },
            PixelFormat::Rgba32F => BlockInfo { width: 1, height: 1, bytes: 16 },
            PixelFormat::D24S8 => BlockInfo { width: 1, height: 1, bytes: 4 },
        }
    }

    /// Bytes of one tightly-packed row of `width` texels (block rows for
    /// compressed formats)
    pub fn row_pitch(self, width: u32) -> u32 {
        let block = self.block_info();
        width.div_ceil(block.width) * block.bytes
    }

    /// Bytes of a tightly-packed `width` x `height` subresource
    pub fn slice_size(self, width: u32, height: u32) -> u32 {
        let block = self.block_info();
        self.row_pitch(width) * height.div_ceil(block.height)
    }
}

/// Number of mip levels in a full chain for the given base dimensions
pub fn compute_mip_levels(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

// ============================================================================
// TEXTURES & SAMPLERS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureType {
    Tex2D,
    TexCube,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureUsage {
    /// Sampled in shaders, uploaded from the CPU
    Read,
    /// Used as a color or depth-stencil attachment
    RenderTarget,
}

/// Cube map faces, in Vulkan layer order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureCubeFace {
    PositiveX = 0,
    NegativeX = 1,
    PositiveY = 2,
    NegativeY = 3,
    PositiveZ = 4,
    NegativeZ = 5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerFilter {
    Nearest,
    Linear,
    /// Only meaningful for minification; requires device support
    Anisotropic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerAddressMode {
    Repeat,
    Mirror,
    ClampToEdge,
    ClampToBorder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunc {
    Never,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
    Always,
}

/// Sampler description; hashable so backends can cache native samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    pub min_filter: SamplerFilter,
    pub mag_filter: SamplerFilter,
    pub mip_filter: SamplerFilter,
    pub s_address_mode: SamplerAddressMode,
    pub t_address_mode: SamplerAddressMode,
    pub w_address_mode: SamplerAddressMode,
    /// Shadow-sampler comparison; None disables compare
    pub compare_func: Option<CompareFunc>,
    /// Max anisotropy level; only used when min_filter is Anisotropic
    pub anisotropy: u8,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            min_filter: SamplerFilter::Linear,
            mag_filter: SamplerFilter::Linear,
            mip_filter: SamplerFilter::Linear,
            s_address_mode: SamplerAddressMode::ClampToEdge,
            t_address_mode: SamplerAddressMode::ClampToEdge,
            w_address_mode: SamplerAddressMode::ClampToEdge,
            compare_func: None,
            anisotropy: 0,
        }
    }
}

/// Texture creation description
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub texture_type: TextureType,
    pub width: u32,
    pub height: u32,
    /// Number of array layers (cube textures use 6 internally)
    pub array_size: u32,
    /// 0 means "derive a full mip chain from width/height"
    pub mip_levels: u32,
    pub pixel_format: PixelFormat,
    pub usage: TextureUsage,
    pub sampler_desc: SamplerDesc,
}

impl Default for TextureDesc {
    fn default() -> Self {
        Self {
            texture_type: TextureType::Tex2D,
            width: 0,
            height: 0,
            array_size: 1,
            mip_levels: 1,
            pixel_format: PixelFormat::Rgba8,
            usage: TextureUsage::Read,
            sampler_desc: SamplerDesc::default(),
        }
    }
}

/// Opaque native sampler handle returned by `Driver::create_sampler`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerHandle(pub u64);

// ============================================================================
// BUFFERS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferType {
    Vertex,
    Index,
    Uniform,
    /// Readback target for pixel transfers
    PixelPack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Device-local, updated through a staging copy
    Static,
    /// Host-visible, frequently rewritten by the CPU
    Dynamic,
    /// Device-local, must be created with initial contents
    Immutable,
}

// ============================================================================
// GEOMETRY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    Point,
    Line,
    /// Not natively supported by Vulkan; backends degrade to LineStrip
    LineLoop,
    LineStrip,
    Triangle,
    TriangleStrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    pub fn bytes(self) -> usize {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Back,
    Front,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winding {
    Clockwise,
    CounterClockwise,
}

// ============================================================================
// BLEND STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstColor,
    OneMinusDstColor,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantAlpha,
    OneMinusConstantAlpha,
    SrcAlphaSaturate,
    BlendColor,
}

bitflags! {
    /// Per-channel color write mask
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWriteMask: u8 {
        const RED = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE = 1 << 2;
        const ALPHA = 1 << 3;
        const ALL = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits() | Self::ALPHA.bits();
    }
}

/// Fixed-function blend state for one color attachment; part of pipeline keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendDesc {
    pub write_mask: ColorWriteMask,
    pub blend_enabled: bool,
    pub rgb_blend_op: BlendOp,
    pub alpha_blend_op: BlendOp,
    pub source_rgb_blend_factor: BlendFactor,
    pub destination_rgb_blend_factor: BlendFactor,
    pub source_alpha_blend_factor: BlendFactor,
    pub destination_alpha_blend_factor: BlendFactor,
}

impl Default for BlendDesc {
    fn default() -> Self {
        Self {
            write_mask: ColorWriteMask::ALL,
            blend_enabled: false,
            rgb_blend_op: BlendOp::Add,
            alpha_blend_op: BlendOp::Add,
            source_rgb_blend_factor: BlendFactor::One,
            destination_rgb_blend_factor: BlendFactor::Zero,
            source_alpha_blend_factor: BlendFactor::One,
            destination_alpha_blend_factor: BlendFactor::Zero,
        }
    }
}

// ============================================================================
// DEPTH / STENCIL STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    Invert,
    IncrementWrap,
    DecrementWrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilDesc {
    pub stencil_compare_function: CompareFunc,
    pub stencil_failure_operation: StencilOp,
    pub depth_failure_operation: StencilOp,
    pub depth_stencil_pass_operation: StencilOp,
    pub read_mask: u32,
    pub write_mask: u32,
}

impl Default for StencilDesc {
    fn default() -> Self {
        Self {
            stencil_compare_function: CompareFunc::Always,
            stencil_failure_operation: StencilOp::Keep,
            depth_failure_operation: StencilOp::Keep,
            depth_stencil_pass_operation: StencilOp::Keep,
            read_mask: u32::MAX,
            write_mask: u32::MAX,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DepthStencilFlags: u32 {
        const DEPTH_TEST = 1 << 0;
        const DEPTH_WRITE = 1 << 1;
        const STENCIL_TEST = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilDesc {
    pub depth_compare_function: CompareFunc,
    pub front_face_stencil: StencilDesc,
    pub back_face_stencil: StencilDesc,
    pub flags: DepthStencilFlags,
}

impl Default for DepthStencilDesc {
    fn default() -> Self {
        Self {
            depth_compare_function: CompareFunc::Less,
            front_face_stencil: StencilDesc::default(),
            back_face_stencil: StencilDesc::default(),
            flags: DepthStencilFlags::empty(),
        }
    }
}

impl DepthStencilDesc {
    /// Stable structural hash for pipeline cache keys
    pub fn key_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

// ============================================================================
// RENDER PASSES
// ============================================================================

bitflags! {
    /// Selects attachments of a render target (colors, depth, stencil)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TargetBufferFlags: u32 {
        const COLOR0 = 1 << 0;
        const COLOR1 = 1 << 1;
        const COLOR2 = 1 << 2;
        const COLOR3 = 1 << 3;
        const ALL_COLOR = Self::COLOR0.bits() | Self::COLOR1.bits()
            | Self::COLOR2.bits() | Self::COLOR3.bits();
        const DEPTH = 1 << 4;
        const STENCIL = 1 << 5;
        const DEPTH_AND_STENCIL = Self::DEPTH.bits() | Self::STENCIL.bits();
        const ALL = Self::ALL_COLOR.bits() | Self::DEPTH_AND_STENCIL.bits();
    }
}

/// Flag for the color attachment at `index`
pub fn mrt_color_flag(index: usize) -> TargetBufferFlags {
    debug_assert!(index < MAX_COLOR_ATTACHMENT);
    TargetBufferFlags::from_bits_truncate(1 << index)
}

/// Which attachments to clear / discard at pass start and end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderPassFlags {
    pub clear: TargetBufferFlags,
    pub discard_start: TargetBufferFlags,
    pub discard_end: TargetBufferFlags,
}

/// Description of one render pass over a render target
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassDesc {
    pub flags: RenderPassFlags,
    pub clear_color: glam::Vec4,
    pub clear_depth: f32,
    pub clear_stencil: u8,
}

impl Default for RenderPassDesc {
    fn default() -> Self {
        Self {
            flags: RenderPassFlags::default(),
            clear_color: glam::Vec4::ZERO,
            clear_depth: 1.0,
            clear_stencil: 0,
        }
    }
}

impl RenderPassDesc {
    /// Stable structural hash, chained onto `seed` (the attachment-set hash)
    ///
    /// Floats are hashed through their bit patterns so the same description
    /// always produces the same key.
    pub fn key_hash(&self, seed: u64) -> u64 {
        let mut hasher = FxHasher::default();
        seed.hash(&mut hasher);
        self.flags.clear.bits().hash(&mut hasher);
        self.flags.discard_start.bits().hash(&mut hasher);
        self.flags.discard_end.bits().hash(&mut hasher);
        for channel in self.clear_color.to_array() {
            channel.to_bits().hash(&mut hasher);
        }
        self.clear_depth.to_bits().hash(&mut hasher);
        self.clear_stencil.hash(&mut hasher);
        hasher.finish()
    }
}

// ============================================================================
// VERTEX LAYOUTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum VertexFormat {
    Float,
    Float2,
    Float3,
    Float4,
    Int,
    Int2,
    Int3,
    Int4,
    UByte4,
    UByte4Norm,
    UShort2,
    UShort4,
}

impl VertexFormat {
    /// Size of one attribute of this format in bytes
    pub fn size(self) -> u32 {
        match self {
            VertexFormat::Float | VertexFormat::Int => 4,
            VertexFormat::Float2 | VertexFormat::Int2 => 8,
            VertexFormat::Float3 | VertexFormat::Int3 => 12,
            VertexFormat::Float4 | VertexFormat::Int4 => 16,
            VertexFormat::UByte4 | VertexFormat::UByte4Norm => 4,
            VertexFormat::UShort2 => 4,
            VertexFormat::UShort4 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Shader input location
    pub location: u32,
    pub format: VertexFormat,
    /// Byte offset inside the vertex (or instance) record
    pub offset: u32,
    /// True when fed from the instance buffer at per-instance rate
    pub instanced: bool,
}

/// Static description of vertex input bindings and attributes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexLayoutDesc {
    /// Stride of the per-vertex binding
    pub stride: u32,
    /// Stride of the per-instance binding (0 when unused)
    pub instance_stride: u32,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexLayoutDesc {
    /// Stable structural hash used in pipeline cache keys
    pub fn key_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

// ============================================================================
// READBACK
// ============================================================================

/// CPU-side pixel rectangle produced by `RenderContext::read_pixels`
#[derive(Debug, Clone, Default)]
pub struct PixelBufferDesc {
    pub width: u32,
    pub height: u32,
    /// Tightly packed rows; empty when the readback failed
    pub data: Vec<u8>,
}

// ============================================================================
// DRIVER CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerPreference {
    /// Prefer earlier-enumerated adapters
    Auto,
    /// Prefer discrete GPUs, weighted by API version and VRAM
    HighPerformance,
    /// Prefer integrated GPUs
    LowPower,
}

/// Backend driver configuration
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub app_name: String,
    /// Enables VK_LAYER_KHRONOS_validation and the debug messenger when available
    pub enable_validation: bool,
    pub power_preference: PowerPreference,
    /// FIFO when true; MAILBOX is picked when false and available
    pub vsync: bool,
    /// Per-frame uniform ring buffer capacity in bytes
    pub uniform_ring_capacity: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            app_name: "Nebula Application".to_string(),
            enable_validation: cfg!(debug_assertions),
            power_preference: PowerPreference::Auto,
            vsync: true,
            uniform_ring_capacity: 1024 * 1024,
        }
    }
}

// ============================================================================
// UNIFORMS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformStage {
    Vertex,
    Fragment,
}

/// Location of a uniform member inside a stage's uniform block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformLocation {
    pub stage: UniformStage,
    pub offset: u32,
    pub size: u32,
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
