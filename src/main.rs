// =============================================================================
// VW-DEMO - Spinning textured quad on top of the vw_gpu context
// =============================================================================
//
// Opens a winit window, hands its raw handles to `Context::new` and drives
// the frame loop the same way a foreign caller would through the C ABI:
//
// FRAME FLOW:
// 1. Update the checkerboard texture and the rotation uniform
// 2. draw_begin (acquire, record uploads, begin render pass)
// 3. draw_shape for the quad
// 4. draw_end (submit, present) - `true` means rebuild at the window size
//
// =============================================================================

use anyhow::{Context as _, Result};
use glam::{Mat4, Vec3};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::sync::Arc;
use std::time::Instant;
use vw_gpu::{Config, Context, InstanceKey, ShaderPair, ShapeKey, TextureKey};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

const TEXTURE_SIZE: u32 = 64;
const CHECKER: u32 = 8;

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let config = Config::load();
    vw_gpu::init_logging(&config);
    log::info!("Starting vw-demo");
    log::info!(
        "Window: {}x{}, present mode: {}",
        config.window.width,
        config.window.height,
        config.graphics.present_mode
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

// =============================================================================
// SCENE
// =============================================================================

/// Everything created through the context
///
/// Handles stay valid until the context is dropped, which frees them all.
struct Scene {
    ctx: Context,
    shape: ShapeKey,
    instance: InstanceKey,
    texture: TextureKey,
    pixels: Vec<u8>,
    started: Instant,
}

impl Scene {
    fn new(window: &Window, config: &Config) -> Result<Self> {
        let size = window.inner_size();
        let mut ctx = Context::new(
            window.raw_display_handle(),
            window.raw_window_handle(),
            size.width,
            size.height,
            config,
        )?;

        let vertex = std::fs::read(&config.demo.vertex_shader)
            .with_context(|| format!("Failed to read {}", config.demo.vertex_shader))?;
        let fragment = std::fs::read(&config.demo.fragment_shader)
            .with_context(|| format!("Failed to read {}", config.demo.fragment_shader))?;
        let pipelines = ctx.build_pipelines(&[ShaderPair::new(&vertex, &fragment).with_textures(1)])?;

        // Two triangles, xyzw per vertex
        #[rustfmt::skip]
        let quad: [f32; 24] = [
            -0.5, -0.5, 0.0, 1.0,
             0.5, -0.5, 0.0, 1.0,
             0.5,  0.5, 0.0, 1.0,
            -0.5, -0.5, 0.0, 1.0,
             0.5,  0.5, 0.0, 1.0,
            -0.5,  0.5, 0.0, 1.0,
        ];
        let shape = ctx.new_shape(&quad)?;

        let pixels = checkerboard(0);
        let texture = ctx.new_texture(TEXTURE_SIZE, TEXTURE_SIZE, &pixels)?;
        let instance = ctx.new_textured_instance(pipelines[0], &[texture])?;

        Ok(Self {
            ctx,
            shape,
            instance,
            texture,
            pixels,
            started: Instant::now(),
        })
    }

    /// Draw one frame; returns true when the swapchain needs a rebuild
    fn render(&mut self, clear: [f32; 3]) -> Result<bool> {
        let t = self.started.elapsed().as_secs_f32();

        let shift = (t * 8.0) as u32;
        fill_checkerboard(&mut self.pixels, shift);
        self.ctx
            .update_texture(self.texture, TEXTURE_SIZE, TEXTURE_SIZE, &self.pixels)?;

        let extent = self.ctx.extent();
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let transform = Mat4::from_scale(Vec3::new(1.0 / aspect, 1.0, 1.0)) * Mat4::from_rotation_z(t);
        self.ctx
            .write_uniform(self.instance, &transform.to_cols_array())?;

        self.ctx.draw_begin(clear[0], clear[1], clear[2])?;
        self.ctx.draw_shape(self.shape, self.instance)?;
        Ok(self.ctx.draw_end()?)
    }
}

fn checkerboard(shift: u32) -> Vec<u8> {
    let mut pixels = vec![0u8; (TEXTURE_SIZE * TEXTURE_SIZE * 4) as usize];
    fill_checkerboard(&mut pixels, shift);
    pixels
}

fn fill_checkerboard(pixels: &mut [u8], shift: u32) {
    for (i, texel) in pixels.chunks_exact_mut(4).enumerate() {
        let x = i as u32 % TEXTURE_SIZE + shift;
        let y = i as u32 / TEXTURE_SIZE;
        let light = (x / CHECKER + y / CHECKER) % 2 == 0;
        let value = if light { 230 } else { 40 };
        texel.copy_from_slice(&[value, value, value, 255]);
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Field order matters for Drop: the scene goes before the window.
struct App {
    config: Config,
    scene: Option<Scene>,
    window: Option<Arc<Window>>,

    /// Set when the window size changed or present asked for a rebuild
    needs_resize: bool,
    /// Window has zero area, skip rendering
    is_minimized: bool,

    frame_count: u32,
    last_fps_update: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            scene: None,
            window: None,
            needs_resize: false,
            is_minimized: false,
            frame_count: 0,
            last_fps_update: Instant::now(),
        }
    }

    fn render_frame(&mut self) -> Result<()> {
        if self.is_minimized {
            return Ok(());
        }
        let (Some(scene), Some(window)) = (self.scene.as_mut(), self.window.as_ref()) else {
            return Ok(());
        };

        if self.needs_resize {
            let size = window.inner_size();
            scene.ctx.resize(size.width, size.height)?;
            self.needs_resize = false;
        }

        if scene.render(self.config.graphics.clear_color)? {
            self.needs_resize = true;
        }
        self.update_fps();
        Ok(())
    }

    fn update_fps(&mut self) {
        self.frame_count += 1;

        let elapsed = self.last_fps_update.elapsed().as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;
            if let Some(ref window) = self.window {
                window.set_title(&format!("{} - {:.0} FPS", self.config.window.title, fps));
            }
            self.frame_count = 0;
            self.last_fps_update = Instant::now();
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        match Scene::new(&window, &self.config) {
            Ok(scene) => self.scene = Some(scene),
            Err(e) => {
                log::error!("Failed to initialize: {:#}", e);
                event_loop.exit();
                return;
            }
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.is_minimized = size.width == 0 || size.height == 0;
                if !self.is_minimized {
                    self.needs_resize = true;
                }
            }

            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render_frame() {
                    log::error!("Render error: {:#}", e);
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() && event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    log::info!("ESC pressed, exiting...");
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}
