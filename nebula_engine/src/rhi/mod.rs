/// RHI module - the render hardware interface contract
///
/// Backend-agnostic types and traits implemented by rendering plugins
/// (Vulkan, etc.). Consumers only see this surface; concrete backend types
/// stay behind `Arc<dyn _>`.

// Module declarations
pub mod types;
pub mod buffer;
pub mod texture;
pub mod render_target;
pub mod vertex_layout;
pub mod program;
pub mod program_state;
pub mod pipeline;
pub mod driver;
pub mod render_context;
pub mod mock_driver;

// Re-export everything from types.rs
pub use types::*;

// Re-export from other modules
pub use buffer::*;
pub use texture::*;
pub use render_target::*;
pub use vertex_layout::*;
pub use program::*;
pub use program_state::*;
pub use pipeline::*;
pub use driver::*;
pub use render_context::*;
