use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

use ember_core::{
    BlendMode, IndexFormat, Material, ShaderDescription, ShaderStageInfo, ShaderUniform,
    TextureFormat, UniformType, VertexElement, VertexFormat, VertexType,
};
use ember_graphics::resources::grown_capacity;
use ember_graphics::{
    BackendType, DrawCommand, InstanceParameters, Renderer, SurfaceTarget, UploadRing,
};

const QUAD: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];
const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

fn dummy_renderer() -> Renderer {
    let mut renderer = Renderer::new();
    renderer
        .create_device_with(InstanceParameters::new().with_backend(BackendType::Dummy))
        .unwrap();
    renderer.startup(&SurfaceTarget::headless(1280, 720)).unwrap();
    renderer
}

/// Present and drop the recorded call log so it does not grow across iterations.
fn present(renderer: &mut Renderer) {
    renderer.present().unwrap();
    if let Some(dummy) = renderer.backend().and_then(|b| b.as_dummy()) {
        dummy.clear_calls();
    }
}

fn quad_scene(renderer: &mut Renderer) -> (Material, ember_core::MeshHandle) {
    let description = ShaderDescription::new(
        ShaderStageInfo::new(b"vertex".to_vec(), "vs_main"),
        ShaderStageInfo::new(b"fragment".to_vec(), "fs_main")
            .with_uniform(ShaderUniform::new("color", UniformType::Float4)),
    );
    let shader = renderer.create_shader(&description).unwrap();
    let mut material = Material::with_shader(shader, &description);
    material.set_vec4("color", [1.0, 0.5, 0.25, 1.0]);

    let format = VertexFormat::new([VertexElement::new(0, VertexType::Float2)]);
    let mesh = renderer.create_mesh().unwrap();
    renderer
        .set_mesh_vertex_data(mesh, bytemuck::cast_slice(&QUAD), 0, &format)
        .unwrap();
    renderer
        .set_mesh_index_data(mesh, bytemuck::cast_slice(&QUAD_INDICES), 0, IndexFormat::Sixteen)
        .unwrap();
    (material, mesh)
}

// ---------------------------------------------------------------------------
// Upload planning
// ---------------------------------------------------------------------------

fn bench_ring_planning(c: &mut Criterion) {
    c.bench_function("upload_ring_stage_1000_mixed", |b| {
        b.iter_batched(
            || UploadRing::new(16 * 1024 * 1024, 4),
            |mut ring| {
                for i in 0..1000u64 {
                    black_box(ring.stage(64 + (i % 7) * 4096, 4));
                }
                ring
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_buffer_growth(c: &mut Criterion) {
    c.bench_function("grown_capacity_1000", |b| {
        b.iter(|| {
            for required in 1..1000u64 {
                black_box(grown_capacity(black_box(16), required * 97));
            }
        });
    });
}

// ---------------------------------------------------------------------------
// Draw execution
// ---------------------------------------------------------------------------

fn bench_draw_same_state(c: &mut Criterion) {
    let mut renderer = dummy_renderer();
    let (material, mesh) = quad_scene(&mut renderer);

    c.bench_function("draw_1000_same_state", |b| {
        b.iter(|| {
            let command = DrawCommand::new(&material, mesh, 6);
            for _ in 0..1000 {
                renderer.draw(&command).unwrap();
            }
            present(&mut renderer);
        });
    });
}

fn bench_draw_pipeline_variants(c: &mut Criterion) {
    let mut renderer = dummy_renderer();
    let (material, mesh) = quad_scene(&mut renderer);
    let blends = [
        BlendMode::PREMULTIPLY,
        BlendMode::NON_PREMULTIPLY,
        BlendMode::ADD,
        BlendMode::MULTIPLY,
    ];

    c.bench_function("draw_1000_alternating_blend", |b| {
        b.iter(|| {
            for i in 0..1000 {
                let command = DrawCommand::new(&material, mesh, 6).with_blend(blends[i % 4]);
                renderer.draw(&command).unwrap();
            }
            present(&mut renderer);
        });
    });
}

// ---------------------------------------------------------------------------
// Texture uploads
// ---------------------------------------------------------------------------

fn bench_texture_upload(c: &mut Criterion) {
    let mut renderer = dummy_renderer();
    let texture = renderer
        .create_texture(256, 256, TextureFormat::R8G8B8A8, false)
        .unwrap();
    let pixels = vec![0x7fu8; 256 * 256 * 4];

    c.bench_function("texture_upload_256x256_rgba", |b| {
        b.iter(|| {
            renderer.set_texture_data(texture, black_box(&pixels)).unwrap();
            present(&mut renderer);
        });
    });
}

criterion_group!(
    benches,
    bench_ring_planning,
    bench_buffer_growth,
    bench_draw_same_state,
    bench_draw_pipeline_variants,
    bench_texture_upload,
);
criterion_main!(benches);
