/*!
# Nebula Engine

Core traits and types for the Nebula rendering engine.

This crate provides the platform-agnostic render hardware interface (RHI)
using trait-based dynamic polymorphism. Backend implementations (Vulkan,
etc.) live in sibling crates and implement these traits.

## Architecture

- **Driver**: factory trait for creating GPU resources
- **RenderContext**: the per-frame command surface
- **Buffer** / **Texture** / **RenderTarget**: GPU resource traits
- **RenderPipeline** / **DepthStencilState**: pipeline state traits
- **Program** / **VertexLayout**: static shader and vertex-input descriptions
- **ProgramState**: CPU-side uniform and texture staging

Backend implementations provide concrete types that implement these traits.
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod rhi;

// Main nebula namespace module
pub mod nebula {
    // Error types
    pub use crate::error::{Error, Result};

    // Engine logging facade
    pub use crate::engine::Engine;

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
        // Note: engine_* macros are NOT re-exported here - they are crate-root exports
    }

    // RHI sub-module with all rendering types
    pub mod rhi {
        pub use crate::rhi::*;
    }
}

// Re-export math library at crate root
pub use glam;
