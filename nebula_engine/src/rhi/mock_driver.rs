/// MockDriver - GPU-free Driver implementation for contract tests
///
/// Records creations and updates so unit tests can assert against the RHI
/// contract without a device. Not compiled into release consumers; test
/// builds of dependent crates may use it as a stand-in backend.

use crate::error::Result;
use crate::rhi::buffer::Buffer;
use crate::rhi::pipeline::{DepthStencilState, RenderPipeline};
use crate::rhi::program::{Program, SamplerBindingInfo, UniformBlockInfo};
use crate::rhi::render_target::RenderTarget;
use crate::rhi::texture::Texture;
use crate::rhi::types::*;
use crate::rhi::vertex_layout::VertexLayout;
use crate::rhi::driver::Driver;
use crate::engine_bail;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct MockStats {
    pub buffers_created: AtomicU64,
    pub textures_created: AtomicU64,
    pub render_targets_created: AtomicU64,
}

pub struct MockDriver {
    pub stats: Arc<MockStats>,
    /// Samplers the mock refuses to create (simulates missing features)
    pub support_anisotropy: bool,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(MockStats::default()),
            support_anisotropy: true,
        }
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MockBuffer {
    size: usize,
    buffer_type: BufferType,
    usage: BufferUsage,
    pub contents: Mutex<Vec<u8>>,
    pub default_data: Mutex<Option<Vec<u8>>>,
}

impl Buffer for MockBuffer {
    fn update_data(&self, data: &[u8]) {
        self.update_sub_data(0, data);
    }

    fn update_sub_data(&self, offset: usize, data: &[u8]) {
        assert!(offset + data.len() <= self.size, "buffer update out of range");
        let mut contents = self.contents.lock().unwrap();
        contents[offset..offset + data.len()].copy_from_slice(data);

        let mut mirror = self.default_data.lock().unwrap();
        if let Some(mirror) = mirror.as_mut() {
            if mirror.len() < offset + data.len() {
                mirror.resize(offset + data.len(), 0);
            }
            mirror[offset..offset + data.len()].copy_from_slice(data);
        }
    }

    fn using_default_stored_data(&self, need: bool) {
        let mut mirror = self.default_data.lock().unwrap();
        if need {
            if mirror.is_none() {
                *mirror = Some(Vec::new());
            }
        } else {
            *mirror = None;
        }
    }

    fn size(&self) -> usize {
        self.size
    }

    fn buffer_type(&self) -> BufferType {
        self.buffer_type
    }

    fn usage(&self) -> BufferUsage {
        self.usage
    }
}

pub struct MockTexture {
    desc: TextureDesc,
    pub upload_count: AtomicU64,
}

impl Texture for MockTexture {
    fn desc(&self) -> TextureDesc {
        self.desc.clone()
    }

    fn update_data(&self, _data: &[u8], _w: u32, _h: u32, _level: u32, _layer: u32) {
        self.upload_count.fetch_add(1, Ordering::Relaxed);
    }

    fn update_sub_data(&self, _x: u32, _y: u32, _w: u32, _h: u32, _level: u32, _data: &[u8], _layer: u32) {
        self.upload_count.fetch_add(1, Ordering::Relaxed);
    }

    fn update_compressed_data(&self, data: &[u8], w: u32, h: u32, _level: u32, _layer: u32) {
        // The mock still enforces the compressed-size contract
        assert_eq!(
            data.len() as u32,
            self.desc.pixel_format.slice_size(w, h),
            "compressed data size mismatch"
        );
        self.upload_count.fetch_add(1, Ordering::Relaxed);
    }

    fn update_compressed_sub_data(&self, x: u32, y: u32, _w: u32, _h: u32, _level: u32, _data: &[u8], _layer: u32) {
        let block = self.desc.pixel_format.block_info();
        assert!(x % block.width == 0 && y % block.height == 0, "offsets must be block aligned");
        self.upload_count.fetch_add(1, Ordering::Relaxed);
    }

    fn update_face_data(&self, _face: TextureCubeFace, _data: &[u8]) {
        assert_eq!(self.desc.texture_type, TextureType::TexCube);
        self.upload_count.fetch_add(1, Ordering::Relaxed);
    }

    fn update_sampler_desc(&self, _desc: &SamplerDesc) {}
}

#[derive(Default)]
struct MockAttachments {
    color: [Option<Arc<dyn Texture>>; MAX_COLOR_ATTACHMENT],
    depth_stencil: Option<Arc<dyn Texture>>,
}

pub struct MockRenderTarget {
    attachments: Mutex<MockAttachments>,
}

impl RenderTarget for MockRenderTarget {
    fn is_default(&self) -> bool {
        false
    }

    fn set_color_attachment(&self, index: usize, texture: Option<Arc<dyn Texture>>, _level: u32) {
        let mut attachments = self.attachments.lock().unwrap();
        // Contiguity contract: slot N requires slot N-1 to be bound
        if texture.is_some() && index > 0 {
            assert!(
                attachments.color[index - 1].is_some(),
                "color attachments must be contiguous from index 0"
            );
        }
        attachments.color[index] = texture;
    }

    fn set_depth_stencil_attachment(&self, texture: Option<Arc<dyn Texture>>) {
        self.attachments.lock().unwrap().depth_stencil = texture;
    }

    fn color_attachment(&self, index: usize) -> Option<Arc<dyn Texture>> {
        self.attachments.lock().unwrap().color[index].clone()
    }

    fn depth_stencil_attachment(&self) -> Option<Arc<dyn Texture>> {
        self.attachments.lock().unwrap().depth_stencil.clone()
    }
}

struct MockPipeline;
impl RenderPipeline for MockPipeline {}

struct MockDepthStencilState {
    desc: Mutex<DepthStencilDesc>,
}

impl DepthStencilState for MockDepthStencilState {
    fn update(&self, desc: &DepthStencilDesc) {
        *self.desc.lock().unwrap() = *desc;
    }

    fn state_hash(&self) -> u64 {
        self.desc.lock().unwrap().key_hash()
    }
}

struct MockProgram;

impl Program for MockProgram {
    fn program_id(&self) -> u64 {
        1
    }
    fn uniform_location(&self, _name: &str) -> Option<UniformLocation> {
        None
    }
    fn uniform_block_size(&self, _stage: UniformStage) -> usize {
        0
    }
    fn active_uniform_blocks(&self) -> &[UniformBlockInfo] {
        &[]
    }
    fn active_samplers(&self) -> &[SamplerBindingInfo] {
        &[]
    }
}

struct MockVertexLayout {
    desc: VertexLayoutDesc,
}

impl VertexLayout for MockVertexLayout {
    fn hash(&self) -> u64 {
        self.desc.key_hash()
    }
    fn desc(&self) -> &VertexLayoutDesc {
        &self.desc
    }
}

impl Driver for MockDriver {
    fn create_buffer(
        &self,
        size: usize,
        buffer_type: BufferType,
        usage: BufferUsage,
        initial: Option<&[u8]>,
    ) -> Result<Arc<dyn Buffer>> {
        if usage == BufferUsage::Immutable && initial.is_none() {
            engine_bail!("nebula::mock", "Immutable buffer requires initial data");
        }

        self.stats.buffers_created.fetch_add(1, Ordering::Relaxed);
        let mut contents = vec![0u8; size];
        if let Some(initial) = initial {
            contents[..initial.len()].copy_from_slice(initial);
        }
        Ok(Arc::new(MockBuffer {
            size,
            buffer_type,
            usage,
            contents: Mutex::new(contents),
            default_data: Mutex::new(None),
        }))
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<Arc<dyn Texture>> {
        if desc.width == 0 || desc.height == 0 {
            engine_bail!("nebula::mock", "texture dimensions must be non-zero");
        }
        self.stats.textures_created.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(MockTexture {
            desc: desc.clone(),
            upload_count: AtomicU64::new(0),
        }))
    }

    fn create_render_target(
        &self,
        color_attachment: Option<Arc<dyn Texture>>,
        depth_stencil_attachment: Option<Arc<dyn Texture>>,
    ) -> Result<Arc<dyn RenderTarget>> {
        self.stats.render_targets_created.fetch_add(1, Ordering::Relaxed);
        let rt = MockRenderTarget {
            attachments: Mutex::new(MockAttachments::default()),
        };
        rt.set_color_attachment(0, color_attachment, 0);
        rt.set_depth_stencil_attachment(depth_stencil_attachment);
        Ok(Arc::new(rt))
    }

    fn create_depth_stencil_state(&self) -> Arc<dyn DepthStencilState> {
        Arc::new(MockDepthStencilState {
            desc: Mutex::new(DepthStencilDesc::default()),
        })
    }

    fn create_render_pipeline(&self) -> Arc<dyn RenderPipeline> {
        Arc::new(MockPipeline)
    }

    fn create_program(
        &self,
        _vertex_spirv: &[u32],
        _fragment_spirv: &[u32],
    ) -> Result<Arc<dyn Program>> {
        Ok(Arc::new(MockProgram))
    }

    fn create_vertex_layout(&self, desc: VertexLayoutDesc) -> Arc<dyn VertexLayout> {
        Arc::new(MockVertexLayout { desc })
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Option<SamplerHandle> {
        if desc.min_filter == SamplerFilter::Anisotropic && !self.support_anisotropy {
            return None;
        }
        Some(SamplerHandle(0xDEAD_BEEF))
    }

    fn vendor(&self) -> String {
        "Mock".to_string()
    }

    fn renderer_name(&self) -> String {
        "MockDriver".to_string()
    }

    fn version(&self) -> String {
        "mock-1.0".to_string()
    }

    fn wait_idle(&self) {}
}

#[cfg(test)]
#[path = "mock_driver_tests.rs"]
mod tests;
