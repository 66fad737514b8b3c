//! Integration tests for the RHI contract through the public surface
//!
//! Drives the mock driver exactly the way a backend consumer would, through
//! the `nebula` namespace re-exports and trait objects only. No GPU required.
//!
//! Run with: cargo test --test rhi_contract_tests

use nebula_engine::nebula::rhi::{
    mock_driver::MockDriver, Buffer, BufferType, BufferUsage, DepthStencilState, Driver,
    PipelineDesc, ProgramState, RenderTarget, Texture, TextureDesc, VertexAttribute, VertexFormat,
    VertexLayout, VertexLayoutDesc,
};
use std::sync::{Arc, Mutex};

fn driver() -> Arc<dyn Driver> {
    Arc::new(MockDriver::new())
}

#[test]
fn test_factory_surface_through_trait_objects() {
    let driver = driver();

    let buffer = driver
        .create_buffer(256, BufferType::Vertex, BufferUsage::Dynamic, None)
        .unwrap();
    buffer.update_data(&[1, 2, 3, 4]);

    let texture = driver
        .create_texture(&TextureDesc {
            width: 8,
            height: 8,
            ..Default::default()
        })
        .unwrap();
    texture.update_data(&[0u8; 8 * 8 * 4], 8, 8, 0, 0);

    let render_target = driver.create_render_target(Some(texture), None).unwrap();
    assert!(render_target.color_attachment(0).is_some());
    assert!(render_target.depth_stencil_attachment().is_none());
}

#[test]
fn test_pipeline_desc_composition() {
    let driver = driver();

    let program = driver.create_program(&[0x0723_0203], &[0x0723_0203]).unwrap();
    let vertex_layout = driver.create_vertex_layout(VertexLayoutDesc {
        stride: 12,
        instance_stride: 0,
        attributes: vec![VertexAttribute {
            location: 0,
            format: VertexFormat::Float3,
            offset: 0,
            instanced: false,
        }],
    });

    let program_state = Arc::new(Mutex::new(ProgramState::new(program)));
    let desc = PipelineDesc {
        program_state,
        blend_desc: Default::default(),
        vertex_layout: Arc::clone(&vertex_layout),
    };

    // The description is cheaply cloneable (Arc-based), as the per-draw
    // update path requires
    let cloned = desc.clone();
    assert_eq!(cloned.vertex_layout.hash(), vertex_layout.hash());
}

#[test]
fn test_state_objects() {
    let driver = driver();
    let _pipeline = driver.create_render_pipeline();
    let depth_stencil = driver.create_depth_stencil_state();
    let initial_hash = depth_stencil.state_hash();
    assert_eq!(initial_hash, depth_stencil.state_hash());
}
