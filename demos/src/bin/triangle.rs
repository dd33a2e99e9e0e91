//! # Triangle Demo
//!
//! A spinning triangle with per-vertex colors, modulated by a checkerboard
//! texture, drawn straight into the window's swapchain.

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use ember_core::{
    ClearMask, Color, IndexFormat, Material, MeshHandle, ShaderDescription, ShaderStage,
    ShaderStageInfo, ShaderUniform, TextureFormat, TextureSampler, UniformType, VertexElement,
    VertexFormat, VertexType,
};
use ember_demos::DemoArgs;
use ember_graphics::{DrawCommand, GraphicsError, Renderer, SurfaceTarget};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::window::{Window, WindowId};

const SHADER: &str = r#"
struct VertexUniforms {
    // cos, sin, scale, aspect
    params: vec4<f32>,
}

struct FragmentUniforms {
    tint: vec4<f32>,
}

@group(1) @binding(0) var<uniform> vertex_uniforms: VertexUniforms;
@group(2) @binding(0) var checker_texture: texture_2d<f32>;
@group(2) @binding(1) var checker_sampler: sampler;
@group(3) @binding(0) var<uniform> fragment_uniforms: FragmentUniforms;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) color: vec4<f32>,
}

@vertex
fn vs_main(
    @location(0) position: vec2<f32>,
    @location(1) uv: vec2<f32>,
    @location(2) color: vec4<f32>,
) -> VertexOutput {
    let p = vertex_uniforms.params;
    let rotated = vec2<f32>(
        position.x * p.x - position.y * p.y,
        position.x * p.y + position.y * p.x,
    ) * p.z;
    var out: VertexOutput;
    out.position = vec4<f32>(rotated.x / p.w, rotated.y, 0.0, 1.0);
    out.uv = uv;
    out.color = color;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let checker = textureSample(checker_texture, checker_sampler, in.uv);
    return in.color * checker * fragment_uniforms.tint;
}
"#;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 2],
    uv: [f32; 2],
    color: [u8; 4],
}

const VERTICES: [Vertex; 3] = [
    Vertex {
        position: [0.0, 0.8],
        uv: [0.5, 0.0],
        color: [255, 64, 64, 255],
    },
    Vertex {
        position: [-0.7, -0.5],
        uv: [0.0, 1.0],
        color: [64, 255, 64, 255],
    },
    Vertex {
        position: [0.7, -0.5],
        uv: [1.0, 1.0],
        color: [64, 64, 255, 255],
    },
];

const INDICES: [u16; 3] = [0, 1, 2];
const CHECKER_SIZE: u32 = 64;

fn vertex_format() -> VertexFormat {
    VertexFormat::new([
        VertexElement::new(0, VertexType::Float2),
        VertexElement::new(1, VertexType::Float2),
        VertexElement::new(2, VertexType::UByte4),
    ])
}

fn shader_description() -> ShaderDescription {
    ShaderDescription::new(
        ShaderStageInfo::new(SHADER, "vs_main")
            .with_uniform(ShaderUniform::new("params", UniformType::Float4)),
        ShaderStageInfo::new(SHADER, "fs_main")
            .with_sampler_count(1)
            .with_uniform(ShaderUniform::new("tint", UniformType::Float4)),
    )
}

fn checker_pixels() -> Vec<u8> {
    (0..CHECKER_SIZE * CHECKER_SIZE)
        .flat_map(|i| {
            let (x, y) = (i % CHECKER_SIZE / 8, i / CHECKER_SIZE / 8);
            let v = if (x + y) % 2 == 0 { 255 } else { 160 };
            [v, v, v, 255]
        })
        .collect()
}

/// GPU resources of the scene.
struct Scene {
    material: Material,
    mesh: MeshHandle,
}

impl Scene {
    fn new(renderer: &mut Renderer) -> Result<Self, GraphicsError> {
        let description = shader_description();
        let shader = renderer.create_shader(&description)?;

        let checker = renderer.create_texture(
            CHECKER_SIZE,
            CHECKER_SIZE,
            TextureFormat::R8G8B8A8,
            false,
        )?;
        renderer.set_texture_data(checker, &checker_pixels())?;

        let mesh = renderer.create_mesh()?;
        renderer.set_mesh_vertex_data(mesh, bytemuck::cast_slice(&VERTICES), 0, &vertex_format())?;
        renderer.set_mesh_index_data(mesh, bytemuck::cast_slice(&INDICES), 0, IndexFormat::Sixteen)?;

        let mut material = Material::with_shader(shader, &description);
        material.set_sampler(
            ShaderStage::Fragment,
            0,
            Some(checker),
            TextureSampler::linear_clamp(),
        );
        material.set_color("tint", Color::WHITE);
        Ok(Self { material, mesh })
    }
}

/// Main application state
struct App {
    args: DemoArgs,
    window: Option<Arc<Window>>,
    renderer: Renderer,
    scene: Option<Scene>,
    window_size: (u32, u32),
    start: Instant,
    frames: u64,
}

impl App {
    fn new(args: DemoArgs) -> Self {
        Self {
            window_size: (args.width, args.height),
            args,
            window: None,
            renderer: Renderer::new(),
            scene: None,
            start: Instant::now(),
            frames: 0,
        }
    }

    fn init_renderer(&mut self, window: Arc<Window>) -> Result<(), GraphicsError> {
        let size = window.inner_size();
        self.window_size = (size.width, size.height);

        self.renderer
            .create_device_with(self.args.instance_parameters())?;
        log::info!("Using {}", self.renderer.driver());
        self.renderer.startup(&SurfaceTarget::from_window(
            window,
            size.width,
            size.height,
        ))?;
        self.renderer.set_vsync(!self.args.no_vsync)?;
        self.scene = Some(Scene::new(&mut self.renderer)?);
        Ok(())
    }

    /// Renders a single frame.
    fn render_frame(&mut self) -> Result<(), GraphicsError> {
        let Some(scene) = self.scene.as_mut() else {
            return Ok(());
        };

        let t = self.start.elapsed().as_secs_f32();
        let (width, height) = self.window_size;
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        scene
            .material
            .set_vec4("params", [t.cos(), t.sin(), 0.9 + 0.1 * (t * 2.0).sin(), aspect]);
        let pulse = 0.75 + 0.25 * (t * 3.0).sin();
        scene
            .material
            .set_color("tint", Color::new(pulse, pulse, pulse, 1.0));

        self.renderer.clear(
            None,
            Color::new(0.1, 0.1, 0.15, 1.0),
            1.0,
            0,
            ClearMask::COLOR,
        )?;
        self.renderer
            .draw(&DrawCommand::new(&scene.material, scene.mesh, 3))?;
        self.renderer.present()?;
        self.frames += 1;
        Ok(())
    }

    fn exit(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(e) = self.renderer.shutdown() {
            log::error!("Renderer shutdown failed: {e}");
        }
        log::info!("Rendered {} frames", self.frames);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let window_attributes = Window::default_attributes()
            .with_title("Ember - Triangle")
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.args.width,
                self.args.height,
            ));

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };
        log::info!("Window created successfully");

        if let Err(e) = self.init_renderer(window.clone()) {
            log::error!("Failed to initialize renderer: {e}");
            event_loop.exit();
            return;
        }
        window.request_redraw();
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, exiting...");
                self.exit(event_loop);
            }
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.window_size = (size.width, size.height);
                if let Err(e) = self.renderer.resize(size.width, size.height) {
                    log::error!("Resize failed: {e}");
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render_frame() {
                    log::error!("Frame failed: {e}");
                    self.exit(event_loop);
                    return;
                }
                if self.args.max_frames.is_some_and(|max| self.frames >= max) {
                    self.exit(event_loop);
                    return;
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = DemoArgs::parse();
    log::info!("Starting Ember Triangle Demo");
    log::info!("Core version: {}", ember_core::VERSION);
    log::info!("Graphics version: {}", ember_graphics::VERSION);

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let mut app = App::new(args);

    event_loop.run_app(&mut app).expect("Event loop error");
}
