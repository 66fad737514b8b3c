//! Nebula demo - clear-screen frame loop on the Vulkan RHI
//!
//! Opens a window, brings up the Vulkan driver + render context, and clears
//! the screen with an animated color each frame. Exercises the whole frame
//! state machine (acquire, record, submit, present, resize recovery).

use nebula_engine::engine_info;
use nebula_engine::glam;
use nebula_engine::nebula::rhi::{
    Driver, DriverConfig, RenderContext, RenderPassDesc, RenderPassFlags, TargetBufferFlags,
};
use nebula_engine_rhi_vulkan::nebula::{VulkanDriver, VulkanRenderContext};
use std::time::Instant;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

/// Fields drop in declaration order: the context must go before the driver
/// (the driver tears the device down once it is the sole owner)
#[derive(Default)]
struct DemoApp {
    context: Option<VulkanRenderContext>,
    driver: Option<VulkanDriver>,
    window: Option<Window>,
    started: Option<Instant>,
}

impl DemoApp {
    fn render_frame(&mut self) {
        let Some(context) = self.context.as_mut() else {
            return;
        };

        if !context.begin_frame() {
            // Swapchain out of date: one dropped frame, retry next tick
            return;
        }

        let elapsed = self
            .started
            .get_or_insert_with(Instant::now)
            .elapsed()
            .as_secs_f32();
        let clear_color = glam::vec4(
            0.5 + 0.5 * (elapsed * 0.7).sin(),
            0.5 + 0.5 * (elapsed * 0.9).sin(),
            0.5 + 0.5 * (elapsed * 1.3).sin(),
            1.0,
        );

        let pass = RenderPassDesc {
            flags: RenderPassFlags {
                clear: TargetBufferFlags::ALL,
                ..Default::default()
            },
            clear_color,
            ..Default::default()
        };

        let screen = context.screen_render_target();
        context.begin_render_pass(&screen, &pass);
        context.end_render_pass();
        context.end_frame();
    }
}

impl ApplicationHandler for DemoApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = event_loop
            .create_window(
                Window::default_attributes()
                    .with_title("Nebula Demo")
                    .with_inner_size(winit::dpi::LogicalSize::new(1280, 720)),
            )
            .expect("failed to create window");

        let size = window.inner_size();
        let driver = VulkanDriver::new(&window, size.width, size.height, DriverConfig::default())
            .expect("failed to create Vulkan driver");
        let context = driver
            .create_render_context()
            .expect("failed to create render context");

        engine_info!(
            "nebula::demo",
            "running on {} ({})",
            driver.renderer_name(),
            driver.vendor()
        );

        self.window = Some(window);
        self.driver = Some(driver);
        self.context = Some(context);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                // Drop the context before the driver
                self.context = None;
                self.driver = None;
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(context) = self.context.as_mut() {
                    context.update_surface(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                self.render_frame();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() {
    let event_loop = EventLoop::new().expect("failed to create event loop");
    event_loop.set_control_flow(ControlFlow::Poll);
    event_loop
        .run_app(&mut DemoApp::default())
        .expect("event loop error");
}
