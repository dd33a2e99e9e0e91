//! Renderer integration tests.
//!
//! Tests are parameterized with `rstest`. Behavior that can only be observed
//! through recorded backend calls (pass reuse, pipeline caching, upload
//! cycling) runs on the dummy backend; pixel results are checked on wgpu.
//!
//! # Test Categories
//!
//! - **Upload Tests**: texture staging, ring cycling, bypass and stalls
//! - **Mesh Tests**: buffer growth and partial writes
//! - **Draw Tests**: pass reuse, state deduplication, samplers, uniforms
//! - **Lifecycle Tests**: invalidation, presentation, vsync, shutdown
//!
//! ```bash
//! cargo test -p ember-graphics --test renderer_tests
//! ```

mod common;

use rstest::rstest;

use common::{
    Backend, SURFACE_HEIGHT, SURFACE_WIDTH, TestContext, generate_test_pattern, position_format,
    position_of,
};
use ember_core::{
    BlendMode, ClearMask, Color, DepthCompare, IndexFormat, Material, ShaderDescription,
    ShaderStage, ShaderStageInfo, TextureFormat, TextureSampler,
};
use ember_graphics::resources::MeshBuffer;
use ember_graphics::types;
use ember_graphics::{
    DrawCommand, DummyCall, DummyConfig, GraphicsError, PresentMode, Renderer, RenderTarget,
    StagePlan,
};

// ============================================================================
// Upload Tests
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_texture_roundtrip(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let texture = ctx.create_texture(5, 3, TextureFormat::R8G8B8A8);
    let pattern = generate_test_pattern(5, 3);
    ctx.renderer.set_texture_data(texture, &pattern).unwrap();
    assert_eq!(ctx.renderer.get_texture_data(texture).unwrap(), pattern);

    // Single-channel rows are far from any row alignment.
    let texture = ctx.create_texture(7, 5, TextureFormat::R8);
    let pattern: Vec<u8> = (0..35).collect();
    ctx.renderer.set_texture_data(texture, &pattern).unwrap();
    assert_eq!(ctx.renderer.get_texture_data(texture).unwrap(), pattern);
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_texture_payload_must_match_size(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        return;
    };

    let texture = ctx.create_texture(4, 4, TextureFormat::R8G8B8A8);
    assert!(matches!(
        ctx.renderer.set_texture_data(texture, &[0; 63]),
        Err(GraphicsError::InvalidParameter(_))
    ));

    let depth = ctx.create_target(4, 4, TextureFormat::Depth24Stencil8);
    assert!(matches!(
        ctx.renderer.set_texture_data(depth, &[0; 64]),
        Err(GraphicsError::InvalidParameter(_))
    ));
    assert!(matches!(
        ctx.renderer.get_texture_data(depth),
        Err(GraphicsError::InvalidParameter(_))
    ));
}

#[rstest]
#[case::dummy(Backend::Dummy)]
fn test_first_upload_of_frame_cycles(#[case] backend: Backend) {
    let mut ctx = TestContext::new(backend).unwrap();
    let texture = ctx.create_texture(2, 2, TextureFormat::R8G8B8A8);
    ctx.renderer.present().unwrap();
    ctx.clear_calls();

    ctx.renderer.set_texture_data(texture, &[1; 16]).unwrap();
    ctx.renderer.set_texture_data(texture, &[2; 16]).unwrap();

    let writes: Vec<_> = ctx
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            DummyCall::WriteTransferBuffer { offset, cycle, .. } => Some((offset, cycle)),
            _ => None,
        })
        .collect();
    assert_eq!(writes, [(0, true), (16, false)]);
    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::BeginCopyPass)), 1);

    // The last write wins once the frame is submitted.
    assert_eq!(ctx.renderer.get_texture_data(texture).unwrap(), vec![2; 16]);
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_large_upload_bypasses_ring(#[case] backend: Backend) {
    let Some(mut ctx) =
        TestContext::with_parameters(backend, |p| p.with_upload_buffer_size(1024))
    else {
        return;
    };

    // Exactly the ring's capacity.
    let texture = ctx.create_texture(16, 16, TextureFormat::R8G8B8A8);
    let pattern = generate_test_pattern(16, 16);
    ctx.renderer.set_texture_data(texture, &pattern).unwrap();

    let (texture_ring, _) = ctx.renderer.upload_stats().unwrap();
    assert_eq!(texture_ring.bypasses, 1);
    assert_eq!(ctx.renderer.get_texture_data(texture).unwrap(), pattern);

    if backend == Backend::Dummy {
        assert_eq!(
            ctx.count_calls(|c| matches!(c, DummyCall::CreateTransferBuffer { size: 1024, .. })),
            3
        );
        assert_eq!(
            ctx.count_calls(|c| matches!(c, DummyCall::ReleaseTransferBuffer { .. })),
            1
        );
    }
}

#[rstest]
#[case::dummy(Backend::Dummy)]
fn test_ring_stalls_after_cycle_cap(#[case] backend: Backend) {
    let mut ctx = TestContext::with_parameters(backend, |p| {
        p.with_upload_buffer_size(1024).with_max_upload_cycles(1)
    })
    .unwrap();
    let textures: Vec<_> = (0..3)
        .map(|_| ctx.create_texture(30, 20, TextureFormat::R8))
        .collect();
    ctx.renderer.present().unwrap();
    ctx.clear_calls();

    for (i, &texture) in textures.iter().enumerate() {
        ctx.renderer.set_texture_data(texture, &[i as u8 + 1; 600]).unwrap();
    }

    let calls = ctx.calls();
    let writes: Vec<_> = calls
        .iter()
        .enumerate()
        .filter_map(|(i, call)| match call {
            DummyCall::WriteTransferBuffer { offset, cycle, .. } => Some((i, *offset, *cycle)),
            _ => None,
        })
        .collect();
    assert_eq!(writes.len(), 3);
    assert!(writes.iter().all(|&(_, offset, cycle)| offset == 0 && cycle));

    // The third upload waited for everything recorded before it.
    let submit = position_of(&calls, |c| matches!(c, DummyCall::Submit { .. }));
    let wait = position_of(&calls, |c| matches!(c, DummyCall::WaitFence { .. }));
    assert!(writes[1].0 < submit && submit < wait && wait < writes[2].0);

    let (texture_ring, buffer_ring) = ctx.renderer.upload_stats().unwrap();
    assert_eq!(texture_ring.stalls, 1);
    assert_eq!(texture_ring.wraps, 1);
    assert_eq!(buffer_ring.stalls, 0);

    for (i, &texture) in textures.iter().enumerate() {
        assert_eq!(
            ctx.renderer.get_texture_data(texture).unwrap(),
            vec![i as u8 + 1; 600]
        );
    }
}

#[test]
fn test_ring_plan_matches_renderer_cycles() {
    let mut ring = ember_graphics::UploadRing::new(1024, 1);
    assert_eq!(ring.stage(600, 1), StagePlan::Write { offset: 0, cycle: true });
    assert_eq!(ring.stage(600, 1), StagePlan::Write { offset: 0, cycle: true });
    assert_eq!(ring.stage(600, 1), StagePlan::Stall);
}

// ============================================================================
// Mesh Tests
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
fn test_mesh_buffer_growth(#[case] backend: Backend) {
    let mut ctx = TestContext::new(backend).unwrap();
    let mesh = ctx.renderer.create_mesh().unwrap();
    let format = position_format();
    ctx.clear_calls();

    ctx.renderer
        .set_mesh_vertex_data(mesh, &[0; 12], 0, &format)
        .unwrap();
    ctx.renderer
        .set_mesh_vertex_data(mesh, &[0; 40], 0, &format)
        .unwrap();
    // Fits in the grown buffer.
    ctx.renderer
        .set_mesh_vertex_data(mesh, &[0; 8], 56, &format)
        .unwrap();

    let sizes: Vec<_> = ctx
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            DummyCall::CreateBuffer { size, .. } => Some(size),
            _ => None,
        })
        .collect();
    assert_eq!(sizes, [16, 64]);
    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::ReleaseBuffer { .. })), 1);

    let device = ctx.renderer.device_id().unwrap();
    let record = ctx.renderer.registry().mesh(mesh, device).unwrap();
    assert_eq!(record.buffer(MeshBuffer::Vertex).unwrap().capacity(), 64);
    assert!(record.buffer(MeshBuffer::Index).is_none());
    assert!(!record.is_drawable());
}

#[rstest]
#[case::dummy(Backend::Dummy)]
fn test_mesh_partial_write(#[case] backend: Backend) {
    let mut ctx = TestContext::new(backend).unwrap();
    let mesh = ctx.renderer.create_mesh().unwrap();
    let format = position_format();
    let initial: Vec<u8> = (1..=16).collect();

    ctx.renderer
        .set_mesh_vertex_data(mesh, &initial, 0, &format)
        .unwrap();
    ctx.renderer
        .set_mesh_vertex_data(mesh, &[0xaa; 8], 8, &format)
        .unwrap();
    ctx.renderer
        .set_mesh_index_data(mesh, bytemuck::cast_slice(&[0u32, 1, 2]), 0, IndexFormat::ThirtyTwo)
        .unwrap();
    ctx.renderer.present().unwrap();

    let device = ctx.renderer.device_id().unwrap();
    let record = ctx.renderer.registry().mesh(mesh, device).unwrap();
    let vertex = record.buffer(MeshBuffer::Vertex).unwrap();
    let mut expected = initial[..8].to_vec();
    expected.extend([0xaa; 8]);
    assert_eq!(ctx.dummy().buffer_contents(vertex.gpu()).unwrap(), expected);
    assert_eq!(record.index_format(), IndexFormat::ThirtyTwo);
    assert!(record.is_drawable());
}

#[test]
fn test_unaligned_write_keeps_neighbouring_bytes() {
    let mut ctx = TestContext::dummy_with(DummyConfig {
        buffer_copy_alignment: 4,
        ..DummyConfig::default()
    });
    let mesh = ctx.renderer.create_mesh().unwrap();
    let format = position_format();

    ctx.renderer
        .set_mesh_vertex_data(mesh, &[0xaa; 12], 0, &format)
        .unwrap();
    ctx.renderer
        .set_mesh_vertex_data(mesh, &[1, 2, 3, 4, 5, 6], 0, &format)
        .unwrap();
    assert!(matches!(
        ctx.renderer.set_mesh_vertex_data(mesh, &[0; 4], 2, &format),
        Err(GraphicsError::InvalidParameter(_))
    ));
    ctx.renderer.present().unwrap();

    let device = ctx.renderer.device_id().unwrap();
    let record = ctx.renderer.registry().mesh(mesh, device).unwrap();
    let vertex = record.buffer(MeshBuffer::Vertex).unwrap();
    let contents = ctx.dummy().buffer_contents(vertex.gpu()).unwrap();
    assert_eq!(&contents[..12], &[1, 2, 3, 4, 5, 6, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa]);
}

#[rstest]
#[case::dummy(Backend::Dummy)]
fn test_instance_data(#[case] backend: Backend) {
    let mut ctx = TestContext::new(backend).unwrap();
    let mesh = ctx.renderer.create_mesh().unwrap();
    ctx.renderer
        .set_mesh_instance_data(mesh, &[7; 24], 0, &position_format())
        .unwrap();

    let device = ctx.renderer.device_id().unwrap();
    let record = ctx.renderer.registry().mesh(mesh, device).unwrap();
    assert_eq!(record.buffer(MeshBuffer::Instance).unwrap().capacity(), 32);
    assert_eq!(record.instance_format(), Some(&position_format()));
}

#[rstest]
#[case::webgpu(Backend::WebGpu)]
fn test_mesh_offset_alignment(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        return;
    };
    let mesh = ctx.renderer.create_mesh().unwrap();
    assert!(matches!(
        ctx.renderer
            .set_mesh_vertex_data(mesh, &[0; 8], 2, &position_format()),
        Err(GraphicsError::InvalidParameter(_))
    ));
    // Odd payloads are padded.
    ctx.renderer
        .set_mesh_vertex_data(mesh, &[0; 6], 0, &position_format())
        .unwrap();
}

// ============================================================================
// Draw Tests
// ============================================================================

fn red_material(ctx: &mut TestContext, samplers: u32) -> Material {
    let mut material = ctx.create_solid_material(samplers);
    assert!(material.set_color("color", Color::RED));
    material
}

#[rstest]
#[case::dummy(Backend::Dummy)]
fn test_draw_reuses_pass_and_state(#[case] backend: Backend) {
    let mut ctx = TestContext::new(backend).unwrap();
    let material = red_material(&mut ctx, 0);
    let mesh = ctx.create_quad();
    ctx.clear_calls();

    let command = DrawCommand::new(&material, mesh, 6);
    ctx.renderer.draw(&command).unwrap();
    ctx.renderer.draw(&command).unwrap();

    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::BeginRenderPass { .. })), 1);
    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::CreatePipeline { .. })), 1);
    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::BindPipeline { .. })), 1);
    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::BindVertexBuffer { .. })), 1);
    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::BindIndexBuffer { .. })), 1);
    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::SetViewport(_))), 0);
    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::DrawIndexed { .. })), 2);
    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::BindSamplers { .. })), 0);

    let expected: Vec<u8> = bytemuck::cast_slice(&Color::RED.to_array()).to_vec();
    assert_eq!(
        ctx.count_calls(|c| *c
            == DummyCall::PushUniforms {
                stage: ShaderStage::Fragment,
                data: expected.clone(),
            }),
        2
    );
}

#[rstest]
#[case::dummy(Backend::Dummy)]
fn test_mesh_update_forces_rebind(#[case] backend: Backend) {
    let mut ctx = TestContext::new(backend).unwrap();
    let material = red_material(&mut ctx, 0);
    let mesh = ctx.create_quad();
    ctx.clear_calls();

    let command = DrawCommand::new(&material, mesh, 6);
    ctx.renderer.draw(&command).unwrap();
    ctx.renderer
        .set_mesh_vertex_data(mesh, &[0; 32], 0, &position_format())
        .unwrap();
    ctx.renderer.draw(&command).unwrap();

    // Uploads go to their own command buffer, the render pass stays open.
    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::BeginRenderPass { .. })), 1);
    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::BindVertexBuffer { .. })), 2);
    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::BindPipeline { .. })), 1);
}

#[rstest]
#[case::dummy(Backend::Dummy)]
fn test_pipeline_variants_are_cached(#[case] backend: Backend) {
    let mut ctx = TestContext::new(backend).unwrap();
    let material = red_material(&mut ctx, 0);
    let mesh = ctx.create_quad();
    ctx.clear_calls();

    ctx.renderer.draw(&DrawCommand::new(&material, mesh, 6)).unwrap();
    ctx.renderer
        .draw(&DrawCommand::new(&material, mesh, 6).with_blend(BlendMode::NON_PREMULTIPLY))
        .unwrap();
    ctx.renderer.draw(&DrawCommand::new(&material, mesh, 6)).unwrap();

    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::CreatePipeline { .. })), 2);
    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::BindPipeline { .. })), 3);
    let stats = ctx.renderer.pipeline_cache().unwrap().stats();
    assert_eq!((stats.hits, stats.misses), (1, 2));
}

#[rstest]
#[case::dummy(Backend::Dummy)]
fn test_unsupported_blend_fails_without_recording(#[case] backend: Backend) {
    let mut ctx = TestContext::new(backend).unwrap();
    let material = red_material(&mut ctx, 0);
    let mesh = ctx.create_quad();

    let mut blend = BlendMode::default();
    blend.color_src = ember_core::BlendFactor::Src1Color;
    let result = ctx
        .renderer
        .draw(&DrawCommand::new(&material, mesh, 6).with_blend(blend));
    assert!(matches!(result, Err(GraphicsError::UnsupportedFormat(_))));
    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::DrawIndexed { .. })), 0);
    assert!(ctx.renderer.pipeline_cache().unwrap().is_empty());

    // The failed draw closed its pass; the next one starts cleanly.
    ctx.renderer.draw(&DrawCommand::new(&material, mesh, 6)).unwrap();
    ctx.renderer.present().unwrap();
}

#[rstest]
#[case::dummy(Backend::Dummy)]
fn test_target_switch_ends_pass(#[case] backend: Backend) {
    let mut ctx = TestContext::new(backend).unwrap();
    let material = red_material(&mut ctx, 0);
    let mesh = ctx.create_quad();
    let target = RenderTarget::new(ctx.create_target(32, 32, TextureFormat::R8G8B8A8));
    ctx.clear_calls();

    ctx.renderer
        .draw(&DrawCommand::new(&material, mesh, 6).with_target(&target))
        .unwrap();
    ctx.renderer.draw(&DrawCommand::new(&material, mesh, 6)).unwrap();
    ctx.renderer
        .draw(&DrawCommand::new(&material, mesh, 6).with_target(&target))
        .unwrap();

    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::BeginRenderPass { .. })), 3);
    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::EndRenderPass)), 2);

    let formats: Vec<_> = ctx
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            DummyCall::CreatePipeline { color_formats, .. } => Some(color_formats),
            _ => None,
        })
        .collect();
    assert_eq!(
        formats,
        [
            vec![types::TextureFormat::Rgba8Unorm],
            vec![types::TextureFormat::Bgra8Unorm]
        ]
    );
}

#[rstest]
#[case::dummy(Backend::Dummy)]
fn test_depth_target(#[case] backend: Backend) {
    let mut ctx = TestContext::new(backend).unwrap();
    let material = red_material(&mut ctx, 0);
    let mesh = ctx.create_quad();
    let color = ctx.create_target(32, 32, TextureFormat::R8G8B8A8);
    let depth = ctx.create_target(32, 32, TextureFormat::Depth24Stencil8);
    let target = RenderTarget::with_depth(color, depth);
    ctx.clear_calls();

    ctx.renderer
        .draw(
            &DrawCommand::new(&material, mesh, 6)
                .with_target(&target)
                .with_depth(DepthCompare::Less, true),
        )
        .unwrap();

    let calls = ctx.calls();
    assert!(calls.iter().any(|c| matches!(
        c,
        DummyCall::BeginRenderPass { color_textures, depth_texture: Some(_), clear_depth: None, .. }
            if color_textures.len() == 1
    )));
    assert!(calls.iter().any(|c| matches!(
        c,
        DummyCall::CreatePipeline {
            depth_format: Some(types::TextureFormat::Depth24PlusStencil8),
            ..
        }
    )));
}

#[rstest]
#[case::dummy(Backend::Dummy)]
fn test_viewport_and_scissor_are_deduplicated(#[case] backend: Backend) {
    let mut ctx = TestContext::new(backend).unwrap();
    let material = red_material(&mut ctx, 0);
    let mesh = ctx.create_quad();
    ctx.clear_calls();

    let rect = ember_core::RectInt::new(8, 8, 100, 100);
    let command = DrawCommand::new(&material, mesh, 6).with_scissor(rect);
    ctx.renderer.draw(&command).unwrap();
    ctx.renderer.draw(&command).unwrap();
    ctx.renderer.draw(&DrawCommand::new(&material, mesh, 6)).unwrap();

    let scissors: Vec<_> = ctx
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            DummyCall::SetScissor(scissor) => Some(scissor),
            _ => None,
        })
        .collect();
    assert_eq!(
        scissors,
        [
            types::ScissorRect::new(8, 8, SURFACE_WIDTH - 8, SURFACE_HEIGHT - 8),
            types::ScissorRect::from_dimensions(SURFACE_WIDTH, SURFACE_HEIGHT),
        ]
    );
}

#[rstest]
#[case::dummy(Backend::Dummy)]
fn test_draw_forwards_range_offset_and_viewport(#[case] backend: Backend) {
    let mut ctx = TestContext::new(backend).unwrap();
    let material = red_material(&mut ctx, 0);
    let mesh = ctx.create_quad();
    ctx.clear_calls();

    let viewport = ember_core::RectInt::new(4, 2, 32, 16);
    ctx.renderer
        .draw(
            &DrawCommand::new(&material, mesh, 6)
                .with_index_range(3, 3)
                .with_vertex_offset(1)
                .with_viewport(viewport),
        )
        .unwrap();
    ctx.renderer.draw(&DrawCommand::new(&material, mesh, 6)).unwrap();

    let draws: Vec<_> = ctx
        .calls()
        .into_iter()
        .filter(|call| matches!(call, DummyCall::DrawIndexed { .. }))
        .collect();
    assert_eq!(
        draws,
        [
            DummyCall::DrawIndexed {
                index_count: 3,
                first_index: 3,
                vertex_offset: 1,
            },
            DummyCall::DrawIndexed {
                index_count: 6,
                first_index: 0,
                vertex_offset: 0,
            },
        ]
    );

    let viewports: Vec<_> = ctx
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            DummyCall::SetViewport(viewport) => Some(viewport),
            _ => None,
        })
        .collect();
    assert_eq!(
        viewports,
        [
            types::Viewport::new(4.0, 2.0, 32.0, 16.0),
            types::Viewport::from_dimensions(SURFACE_WIDTH, SURFACE_HEIGHT),
        ]
    );
}

#[rstest]
#[case::dummy(Backend::Dummy)]
fn test_samplers_use_fallback_and_cache(#[case] backend: Backend) {
    let mut ctx = TestContext::new(backend).unwrap();
    let fallback = ctx.fallback_texture_id();
    let mut material = red_material(&mut ctx, 2);
    let mesh = ctx.create_quad();
    ctx.clear_calls();
    let texture = ctx.create_texture(4, 4, TextureFormat::R8G8B8A8);
    let texture_id = ctx
        .calls()
        .iter()
        .find_map(|c| match c {
            DummyCall::CreateTexture { id, .. } => Some(*id),
            _ => None,
        })
        .unwrap();
    material.set_sampler(
        ShaderStage::Fragment,
        0,
        Some(texture),
        TextureSampler::linear_clamp(),
    );

    ctx.renderer.draw(&DrawCommand::new(&material, mesh, 6)).unwrap();
    ctx.renderer.draw(&DrawCommand::new(&material, mesh, 6)).unwrap();
    ctx.renderer.destroy_texture(texture).unwrap();
    ctx.renderer.draw(&DrawCommand::new(&material, mesh, 6)).unwrap();

    let bound: Vec<_> = ctx
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            DummyCall::BindSamplers {
                stage: ShaderStage::Fragment,
                textures,
                ..
            } => Some(textures),
            _ => None,
        })
        .collect();
    assert_eq!(
        bound,
        [
            vec![texture_id, fallback],
            vec![texture_id, fallback],
            vec![fallback, fallback],
        ]
    );
    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::CreateSampler { .. })), 2);
    assert_eq!(ctx.renderer.sampler_cache().unwrap().len(), 2);
}

#[rstest]
#[case::dummy(Backend::Dummy)]
fn test_draw_validation(#[case] backend: Backend) {
    let mut ctx = TestContext::new(backend).unwrap();
    let material = red_material(&mut ctx, 0);
    let mesh = ctx.create_quad();
    let empty_mesh = ctx.renderer.create_mesh().unwrap();

    let no_shader = Material::new();
    assert!(matches!(
        ctx.renderer.draw(&DrawCommand::new(&no_shader, mesh, 6)),
        Err(GraphicsError::InvalidResource(_))
    ));
    assert!(matches!(
        ctx.renderer.draw(&DrawCommand::new(&material, empty_mesh, 6)),
        Err(GraphicsError::InvalidResource(_))
    ));

    let texture = ctx.create_target(8, 8, TextureFormat::R8G8B8A8);
    let target = RenderTarget::new(texture);
    ctx.renderer.destroy_texture(texture).unwrap();
    assert!(matches!(
        ctx.renderer
            .draw(&DrawCommand::new(&material, mesh, 6).with_target(&target)),
        Err(GraphicsError::InvalidResource(_))
    ));

    let sampled = ctx.create_texture(8, 8, TextureFormat::R8G8B8A8);
    assert!(matches!(
        ctx.renderer
            .draw(&DrawCommand::new(&material, mesh, 6).with_target(&RenderTarget::new(sampled))),
        Err(GraphicsError::InvalidParameter(_))
    ));

    assert!(matches!(
        ctx.renderer
            .draw(&DrawCommand::new(&material, mesh, 6).with_index_range(u32::MAX, 2)),
        Err(GraphicsError::InvalidParameter(_))
    ));

    ctx.renderer.destroy_mesh(mesh).unwrap();
    assert!(matches!(
        ctx.renderer.draw(&DrawCommand::new(&material, mesh, 6)),
        Err(GraphicsError::InvalidResource(_))
    ));
    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::DrawIndexed { .. })), 0);
}

#[rstest]
#[case::dummy(Backend::Dummy)]
fn test_clear_semantics(#[case] backend: Backend) {
    let mut ctx = TestContext::new(backend).unwrap();
    let material = red_material(&mut ctx, 0);
    let mesh = ctx.create_quad();
    let color = ctx.create_target(16, 16, TextureFormat::R8G8B8A8);
    let depth = ctx.create_target(16, 16, TextureFormat::Depth24Stencil8);
    let target = RenderTarget::with_depth(color, depth);
    ctx.clear_calls();

    ctx.renderer
        .clear(None, Color::RED, 1.0, 0, ClearMask::empty())
        .unwrap();
    assert!(ctx.calls().is_empty());

    ctx.renderer
        .clear(None, Color::RED, 1.0, 0, ClearMask::COLOR)
        .unwrap();
    ctx.renderer
        .clear(None, Color::BLACK, 1.0, 0, ClearMask::COLOR)
        .unwrap();
    // Drawing after a clear continues in the cleared pass.
    ctx.renderer.draw(&DrawCommand::new(&material, mesh, 6)).unwrap();
    ctx.renderer
        .clear(Some(&target), Color::RED, 0.5, 3, ClearMask::DEPTH)
        .unwrap();

    let passes: Vec<_> = ctx
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            DummyCall::BeginRenderPass {
                swapchain,
                clear_color,
                clear_depth,
                clear_stencil,
                ..
            } => Some((swapchain, clear_color, clear_depth, clear_stencil)),
            _ => None,
        })
        .collect();
    assert_eq!(
        passes,
        [
            (true, Some(Color::RED), None, None),
            (true, Some(Color::BLACK), None, None),
            (false, None, Some(0.5), None),
        ]
    );
}

#[rstest]
#[case::dummy(Backend::Dummy)]
fn test_draws_skipped_without_swapchain_image(#[case] backend: Backend) {
    let mut ctx = TestContext::new(backend).unwrap();
    let material = red_material(&mut ctx, 0);
    let mesh = ctx.create_quad();
    let target = RenderTarget::new(ctx.create_target(16, 16, TextureFormat::R8G8B8A8));

    ctx.dummy().set_swapchain_available(false);
    ctx.renderer.present().unwrap();
    ctx.clear_calls();

    ctx.renderer.draw(&DrawCommand::new(&material, mesh, 6)).unwrap();
    ctx.renderer
        .clear(None, Color::RED, 1.0, 0, ClearMask::ALL)
        .unwrap();
    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::DrawIndexed { .. })), 0);

    // Offscreen targets are unaffected.
    ctx.renderer
        .draw(&DrawCommand::new(&material, mesh, 6).with_target(&target))
        .unwrap();
    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::DrawIndexed { .. })), 1);

    ctx.renderer.present().unwrap();
    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::Present)), 0);

    ctx.dummy().set_swapchain_available(true);
    ctx.renderer.present().unwrap();
    ctx.renderer.draw(&DrawCommand::new(&material, mesh, 6)).unwrap();
    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::DrawIndexed { .. })), 2);
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
fn test_startup_resources(#[case] backend: Backend) {
    let ctx = TestContext::new(backend).unwrap();
    assert!(ctx.renderer.is_started());
    assert!(ctx.renderer.vsync());

    let live = ctx.dummy().live_objects();
    assert_eq!(live.textures, 1);
    assert_eq!(live.transfer_buffers, 2);

    let calls = ctx.calls();
    assert_eq!(
        calls[0],
        DummyCall::ClaimSurface {
            width: SURFACE_WIDTH,
            height: SURFACE_HEIGHT
        }
    );
    assert!(calls.contains(&DummyCall::AcquireSwapchain { acquired: true }));
    assert_eq!(ctx.dummy().present_mode(), Some(PresentMode::Mailbox));
}

#[test]
fn test_operations_need_startup() {
    let mut renderer = Renderer::new();
    renderer
        .create_device_with(Backend::Dummy.to_instance_parameters())
        .unwrap();

    let texture = renderer
        .create_texture(2, 2, TextureFormat::R8G8B8A8, false)
        .unwrap();
    assert_eq!(
        renderer.set_texture_data(texture, &[0; 16]),
        Err(GraphicsError::DeviceNotReady)
    );
    assert_eq!(renderer.present(), Err(GraphicsError::DeviceNotReady));
    assert_eq!(renderer.set_vsync(false), Err(GraphicsError::DeviceNotReady));
    assert!(!renderer.vsync());

    let mut renderer = Renderer::new();
    assert_eq!(
        renderer.create_device_with(
            Backend::Dummy
                .to_instance_parameters()
                .with_frames_in_flight(0)
        ),
        Err(GraphicsError::InvalidParameter(
            "frames_in_flight must be at least 1".into()
        ))
    );
}

#[rstest]
#[case::dummy(Backend::Dummy)]
fn test_present_submits_uploads_before_draws(#[case] backend: Backend) {
    let mut ctx = TestContext::new(backend).unwrap();
    let material = red_material(&mut ctx, 0);
    let mesh = ctx.create_quad();
    ctx.renderer.draw(&DrawCommand::new(&material, mesh, 6)).unwrap();
    ctx.clear_calls();

    ctx.renderer.present().unwrap();

    let calls = ctx.calls();
    let end_copy = position_of(&calls, |c| matches!(c, DummyCall::EndCopyPass));
    let end_render = position_of(&calls, |c| matches!(c, DummyCall::EndRenderPass));
    let submits: Vec<_> = calls
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, DummyCall::Submit { .. }))
        .map(|(i, _)| i)
        .collect();
    let present = position_of(&calls, |c| matches!(c, DummyCall::Present));
    let acquire = position_of(&calls, |c| matches!(c, DummyCall::AcquireSwapchain { .. }));

    assert_eq!(submits.len(), 2);
    assert!(end_copy < submits[0] && end_render < submits[0]);
    assert!(submits[1] < present && present < acquire);
}

#[rstest]
#[case::dummy(Backend::Dummy)]
fn test_frames_in_flight_bound(#[case] backend: Backend) {
    let mut ctx =
        TestContext::with_parameters(backend, |p| p.with_frames_in_flight(2)).unwrap();
    for _ in 0..5 {
        ctx.renderer.present().unwrap();
    }
    assert_eq!(ctx.renderer.frame_stats(), Some((5, 3)));
    // Two frames worth of fences are still pending.
    assert_eq!(ctx.dummy().live_objects().fences, 4);
}

#[test]
fn test_device_loss_surfaces_from_present() {
    let mut ctx =
        TestContext::with_parameters(Backend::Dummy, |p| p.with_frames_in_flight(1)).unwrap();
    ctx.renderer.present().unwrap();
    ctx.dummy().lose_device();

    assert!(matches!(ctx.renderer.present(), Err(GraphicsError::Internal(_))));
    assert!(matches!(ctx.renderer.wait_idle(), Err(GraphicsError::Internal(_))));
}

#[test]
fn test_vsync_mapping() {
    let mut ctx = TestContext::dummy_with(DummyConfig::default());
    ctx.renderer.set_vsync(false).unwrap();
    assert_eq!(ctx.dummy().present_mode(), Some(PresentMode::Immediate));
    assert!(!ctx.renderer.vsync());

    let mut ctx = TestContext::dummy_with(DummyConfig {
        supports_mailbox: false,
        supports_immediate: false,
        ..DummyConfig::default()
    });
    assert_eq!(ctx.dummy().present_mode(), Some(PresentMode::Fifo));
    ctx.renderer.set_vsync(false).unwrap();
    assert_eq!(ctx.dummy().present_mode(), Some(PresentMode::Fifo));

    let mut ctx = TestContext::dummy_with(DummyConfig {
        supports_mailbox: false,
        ..DummyConfig::default()
    });
    ctx.renderer.set_vsync(false).unwrap();
    assert_eq!(ctx.dummy().present_mode(), Some(PresentMode::Immediate));
}

#[test]
fn test_depth_format_fallback() {
    let mut ctx = TestContext::dummy_with(DummyConfig {
        supports_depth24_stencil8: false,
        ..DummyConfig::default()
    });
    assert_eq!(
        ctx.renderer.depth_format(),
        Some(types::TextureFormat::Depth32FloatStencil8)
    );

    ctx.create_target(8, 8, TextureFormat::Depth24Stencil8);
    assert!(ctx.calls().iter().any(|c| matches!(
        c,
        DummyCall::CreateTexture {
            format: types::TextureFormat::Depth32FloatStencil8,
            ..
        }
    )));
}

#[rstest]
#[case::dummy(Backend::Dummy)]
fn test_resize(#[case] backend: Backend) {
    let mut ctx = TestContext::new(backend).unwrap();
    ctx.clear_calls();

    ctx.renderer.resize(0, 100).unwrap();
    assert!(ctx.calls().is_empty());

    ctx.renderer.resize(128, 96).unwrap();
    assert_eq!(
        ctx.calls(),
        [DummyCall::ResizeSurface {
            width: 128,
            height: 96
        }]
    );
}

#[rstest]
#[case::dummy(Backend::Dummy)]
fn test_destroy_texture_invalidates_its_pipelines(#[case] backend: Backend) {
    let mut ctx = TestContext::new(backend).unwrap();
    let material = red_material(&mut ctx, 0);
    let mesh = ctx.create_quad();
    let a = ctx.create_target(16, 16, TextureFormat::R8G8B8A8);
    let b = ctx.create_target(16, 16, TextureFormat::R8G8B8A8);
    let target_a = RenderTarget::new(a);
    let target_b = RenderTarget::new(b);

    ctx.renderer
        .draw(&DrawCommand::new(&material, mesh, 6).with_target(&target_b))
        .unwrap();
    ctx.renderer
        .draw(&DrawCommand::new(&material, mesh, 6).with_target(&target_a))
        .unwrap();
    ctx.clear_calls();

    ctx.renderer.destroy_texture(a).unwrap();

    // The open pass rendered into `a` and is closed first.
    let calls = ctx.calls();
    let end = position_of(&calls, |c| matches!(c, DummyCall::EndRenderPass));
    let release = position_of(&calls, |c| matches!(c, DummyCall::ReleaseTexture { .. }));
    assert!(end < release);
    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::ReleasePipeline { .. })), 1);
    assert_eq!(ctx.renderer.pipeline_cache().unwrap().len(), 1);

    ctx.renderer
        .draw(&DrawCommand::new(&material, mesh, 6).with_target(&target_b))
        .unwrap();
    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::CreatePipeline { .. })), 0);
}

#[rstest]
#[case::dummy(Backend::Dummy)]
fn test_destroy_shader_invalidates_its_pipelines(#[case] backend: Backend) {
    let mut ctx = TestContext::new(backend).unwrap();
    let first = red_material(&mut ctx, 0);
    let second = red_material(&mut ctx, 0);
    let mesh = ctx.create_quad();

    ctx.renderer.draw(&DrawCommand::new(&first, mesh, 6)).unwrap();
    ctx.renderer.draw(&DrawCommand::new(&second, mesh, 6)).unwrap();
    ctx.clear_calls();

    ctx.renderer.destroy_shader(first.shader().unwrap()).unwrap();
    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::ReleasePipeline { .. })), 1);
    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::ReleaseShader { .. })), 1);
    assert!(matches!(
        ctx.renderer.draw(&DrawCommand::new(&first, mesh, 6)),
        Err(GraphicsError::InvalidResource(_))
    ));
    ctx.renderer.draw(&DrawCommand::new(&second, mesh, 6)).unwrap();
}

#[rstest]
#[case::dummy(Backend::Dummy)]
fn test_shutdown_releases_frame_resources(#[case] backend: Backend) {
    let mut ctx = TestContext::new(backend).unwrap();
    let mut material = red_material(&mut ctx, 1);
    let mesh = ctx.create_quad();
    let texture = ctx.create_texture(4, 4, TextureFormat::R8G8B8A8);
    material.set_sampler(ShaderStage::Fragment, 0, Some(texture), TextureSampler::default());
    ctx.renderer.draw(&DrawCommand::new(&material, mesh, 6)).unwrap();

    ctx.renderer.shutdown().unwrap();
    assert!(!ctx.renderer.is_started());
    let live = ctx.dummy().live_objects();
    assert_eq!(live.textures, 1);
    assert_eq!(live.buffers, 2);
    assert_eq!(live.shaders, 1);
    assert_eq!(live.transfer_buffers, 0);
    assert_eq!(live.samplers, 0);
    assert_eq!(live.pipelines, 0);
    assert_eq!(live.fences, 0);
    assert!(ctx.calls().contains(&DummyCall::ReleaseSurface));

    ctx.renderer.shutdown().unwrap();

    // Resources survive a restart.
    ctx.renderer
        .startup(&ember_graphics::SurfaceTarget::headless(32, 32))
        .unwrap();
    ctx.renderer.draw(&DrawCommand::new(&material, mesh, 6)).unwrap();
    ctx.renderer.present().unwrap();
}

#[rstest]
#[case::dummy(Backend::Dummy)]
fn test_handles_go_stale_with_their_device(#[case] backend: Backend) {
    let mut ctx = TestContext::new(backend).unwrap();
    let material = red_material(&mut ctx, 0);
    let mesh = ctx.create_quad();
    let texture = ctx.create_texture(4, 4, TextureFormat::R8G8B8A8);

    ctx.renderer.destroy_device().unwrap();
    assert!(!ctx.renderer.has_device());
    ctx.renderer
        .create_device_with(backend.to_instance_parameters())
        .unwrap();
    ctx.renderer
        .startup(&ember_graphics::SurfaceTarget::headless(32, 32))
        .unwrap();

    assert!(matches!(
        ctx.renderer.set_texture_data(texture, &[0; 64]),
        Err(GraphicsError::InvalidResource(_))
    ));
    assert!(matches!(
        ctx.renderer.draw(&DrawCommand::new(&material, mesh, 6)),
        Err(GraphicsError::InvalidResource(_))
    ));

    ctx.renderer.destroy_texture(texture).unwrap();
    ctx.renderer.destroy_mesh(mesh).unwrap();
    assert_eq!(ctx.renderer.registry().counts(), (0, 0, 1));
    assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::ReleaseTexture { .. })), 0);
}

#[test]
fn test_creation_failure_is_reported() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    ctx.dummy().fail_next_creation("out of memory");
    assert!(matches!(
        ctx.renderer.create_texture(4, 4, TextureFormat::R8, false),
        Err(GraphicsError::CreationFailed(_))
    ));
    assert_eq!(ctx.renderer.registry().counts(), (0, 0, 0));
}

#[rstest]
#[case::webgpu(Backend::WebGpu)]
fn test_invalid_shader_is_reported(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let code = b"this is not wgsl @@@".to_vec();
    let description = ShaderDescription::new(
        ShaderStageInfo::new(code.clone(), "vs_main"),
        ShaderStageInfo::new(code, "fs_main"),
    );
    let counts = ctx.renderer.registry().counts();

    assert!(matches!(
        ctx.renderer.create_shader(&description),
        Err(GraphicsError::CreationFailed(_))
    ));
    assert_eq!(ctx.renderer.registry().counts(), counts);

    // The device stays usable.
    ctx.create_solid_shader(0);
    ctx.renderer.present().unwrap();
}

// ============================================================================
// Scenario Tests
// ============================================================================

const TEXTURED_WGSL: &str = r#"
@group(2) @binding(0) var tint_texture: texture_2d<f32>;
@group(2) @binding(1) var tint_sampler: sampler;

@vertex
fn vs_main(@location(0) position: vec2<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(position, 0.0, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return textureSample(tint_texture, tint_sampler, vec2<f32>(0.5, 0.5));
}
"#;

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_textured_triangle_frame(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        return;
    };

    let texture = ctx.create_texture(64, 64, TextureFormat::R8G8B8A8);
    ctx.renderer
        .set_texture_data(texture, &[0x40u8, 0x80, 0xc0, 0xff].repeat(64 * 64))
        .unwrap();

    let vertices: [[f32; 2]; 3] = [[0.0, 0.5], [-0.5, -0.5], [0.5, -0.5]];
    let mesh = ctx.renderer.create_mesh().unwrap();
    ctx.renderer
        .set_mesh_vertex_data(mesh, bytemuck::cast_slice(&vertices), 0, &position_format())
        .unwrap();
    ctx.renderer
        .set_mesh_index_data(mesh, bytemuck::cast_slice(&[0u16, 1, 2]), 0, IndexFormat::Sixteen)
        .unwrap();
    assert_eq!(position_format().stride(), 8);

    let description = ember_core::ShaderDescription::new(
        ember_core::ShaderStageInfo::new(TEXTURED_WGSL, "vs_main"),
        ember_core::ShaderStageInfo::new(TEXTURED_WGSL, "fs_main").with_sampler_count(1),
    );
    let shader = ctx.renderer.create_shader(&description).unwrap();
    let mut material = Material::with_shader(shader, &description);
    material.set_sampler(ShaderStage::Fragment, 0, Some(texture), TextureSampler::default());

    ctx.renderer.draw(&DrawCommand::new(&material, mesh, 3)).unwrap();
    ctx.renderer.present().unwrap();

    if backend == Backend::Dummy {
        assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::DrawIndexed { index_count: 3, .. })), 1);
        assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::PushUniforms { .. })), 0);
        assert_eq!(ctx.count_calls(|c| matches!(c, DummyCall::Present)), 1);
    }
}

// ============================================================================
// Pixel Tests
// ============================================================================

#[rstest]
#[case::webgpu(Backend::WebGpu)]
fn test_clear_target_readback(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        return;
    };
    let texture = ctx.create_target(16, 16, TextureFormat::R8G8B8A8);
    let target = RenderTarget::new(texture);

    ctx.renderer
        .clear(Some(&target), Color::RED, 1.0, 0, ClearMask::COLOR)
        .unwrap();
    let pixels = ctx.renderer.get_texture_data(texture).unwrap();
    assert!(pixels.chunks_exact(4).all(|p| p == [255, 0, 0, 255]));
}

#[rstest]
#[case::webgpu(Backend::WebGpu)]
fn test_draw_target_readback(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        return;
    };
    let mut material = ctx.create_solid_material(0);
    assert!(material.set_color("color", Color::new(0.0, 1.0, 0.0, 1.0)));
    let mesh = ctx.create_quad();
    let texture = ctx.create_target(16, 16, TextureFormat::R8G8B8A8);
    let target = RenderTarget::new(texture);

    ctx.renderer
        .clear(Some(&target), Color::BLACK, 1.0, 0, ClearMask::COLOR)
        .unwrap();
    ctx.renderer
        .draw(&DrawCommand::new(&material, mesh, 6).with_target(&target))
        .unwrap();
    let pixels = ctx.renderer.get_texture_data(texture).unwrap();
    assert!(pixels.chunks_exact(4).all(|p| p == [0, 255, 0, 255]));

    ctx.renderer.present().unwrap();
}
