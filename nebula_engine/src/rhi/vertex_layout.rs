/// VertexLayout trait - immutable vertex input description

use crate::rhi::types::VertexLayoutDesc;

/// A vertex layout created by `Driver::create_vertex_layout`
///
/// Immutable after creation; the hash participates in pipeline cache keys.
pub trait VertexLayout: Send + Sync {
    /// Stable hash of the layout description
    fn hash(&self) -> u64;

    fn desc(&self) -> &VertexLayoutDesc;
}
