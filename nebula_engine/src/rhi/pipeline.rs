/// Pipeline description and state-object traits

use crate::rhi::program_state::ProgramState;
use crate::rhi::types::{BlendDesc, DepthStencilDesc};
use crate::rhi::vertex_layout::VertexLayout;
use std::sync::{Arc, Mutex};

/// Logical description of the pipeline used by the next draws
///
/// Backends hash the contents (together with the depth-stencil state and the
/// active render pass) into a pipeline cache key; a native pipeline is only
/// built when the key was never seen before.
#[derive(Clone)]
pub struct PipelineDesc {
    pub program_state: Arc<Mutex<ProgramState>>,
    pub blend_desc: BlendDesc,
    pub vertex_layout: Arc<dyn VertexLayout>,
}

/// Pipeline/cache manager created once per driver by
/// `Driver::create_render_pipeline`
///
/// Carries no user-visible operations: the render context drives it through
/// `RenderContext::update_pipeline_state`.
pub trait RenderPipeline: Send + Sync {}

/// Mutable depth-stencil state created by `Driver::create_depth_stencil_state`
///
/// `update` replaces the entire description; the backend folds its hash into
/// pipeline cache keys.
pub trait DepthStencilState: Send + Sync {
    fn update(&self, desc: &DepthStencilDesc);

    /// Stable hash of the current description
    fn state_hash(&self) -> u64;
}
