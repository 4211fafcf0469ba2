//! Director Tests
//!
//! Tests for:
//! - Tick ordering: queue drain, pass update, recording, single submit
//! - Async sources (pending shaders and textures)
//! - Stage visibility and shared passes
//! - Resize, device recovery and destruction
//! - Event listeners

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tessera::device::DeviceCall;
use tessera::loader::pending;
use tessera::*;

const TRIANGLE_WGSL: &str = "@vertex fn vs_main() {} @fragment fn fs_main() {}";
const COMPUTE_WGSL: &str = "@compute @workgroup_size(64) fn main() {}";

fn director() -> (Director<HeadlessDevice>, HeadlessDevice) {
    let _ = env_logger::builder().is_test(true).try_init();
    let device = HeadlessDevice::new();
    let probe = device.clone();
    (Director::new(device, DirectorSettings::default()), probe)
}

struct Triangle {
    pass: PassHandle,
    pipeline: PipelineHandle,
    binding: BindingHandle,
    shader: ShaderHandle,
    vertices: BufferHandle,
}

fn triangle_with(director: &mut Director<HeadlessDevice>, source: ShaderSource) -> Triangle {
    let positions = ArrayRef::new("positions", &[[0.0f32, 0.5], [-0.5, -0.5], [0.5, -0.5]]).unwrap();
    let attributes = vec![wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x2,
        offset: 0,
        shader_location: 0,
    }];
    let vertices = director
        .create_buffer(
            BufferDescriptor::new("triangle", BufferKind::vertex(8, attributes))
                .with_region(RegionDescriptor::new(positions)),
        )
        .unwrap();
    let shader = director
        .create_shader(ShaderDescriptor {
            label: "triangle".to_string(),
            source,
            vertex_inputs: Some(vec![0]),
        })
        .unwrap();
    let pipeline = director
        .create_render_pipeline(RenderPipelineDescriptor::new("triangle", shader))
        .unwrap();
    let binding = director
        .create_binding(BindingDescriptor::with_fixed_range("triangle", &[3]).vertex_buffer(vertices))
        .unwrap();
    let pass = director
        .create_pass(PassDescriptor::render("main", vec![ColorAttachment::screen()], None))
        .unwrap();
    director.add_item(pass, pipeline, binding).unwrap();
    director.add_stage(StageDescriptor::new("main", [pass])).unwrap();

    Triangle {
        pass,
        pipeline,
        binding,
        shader,
        vertices,
    }
}

fn triangle(director: &mut Director<HeadlessDevice>) -> Triangle {
    triangle_with(director, ShaderSource::Wgsl(TRIANGLE_WGSL.to_string()))
}

fn recorded(probe: &HeadlessDevice, pred: impl Fn(&Command) -> bool) -> Vec<Command> {
    probe
        .last_submission()
        .unwrap_or_default()
        .into_iter()
        .filter(|c| pred(c))
        .collect()
}

fn collect_events(director: &mut Director<HeadlessDevice>) -> Arc<Mutex<Vec<DirectorEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    director.add_listener(move |event| sink.lock().push(event.clone()));
    seen
}

// ============================================================================
// Frame execution
// ============================================================================

#[test]
fn first_tick_realizes_everything_and_draws_once() {
    let (mut director, probe) = director();
    let tri = triangle(&mut director);

    director.tick();

    assert!(director.pass(tri.pass).unwrap().is_executable());
    assert!(director.binding(tri.binding).unwrap().is_complete());
    assert!(director.shader(tri.shader).unwrap().is_complete());
    assert_eq!(probe.submissions().len(), 1);

    let draws = recorded(&probe, |c| matches!(c, Command::Draw { .. }));
    assert_eq!(
        draws,
        vec![Command::Draw {
            vertices: 0..3,
            instances: 0..1,
        }]
    );
    assert_eq!(recorded(&probe, |c| matches!(c, Command::SetVertexBuffer { slot: 0, .. })).len(), 1);

    let stats = director.last_frame_stats();
    assert_eq!(stats.frame_index, 1);
    assert_eq!(stats.passes_executed, 1);
    assert_eq!(stats.passes_skipped, 0);
    assert!(probe.validation_errors().is_empty());
}

#[test]
fn steady_state_tick_writes_nothing_and_creates_nothing() {
    let (mut director, probe) = director();
    triangle(&mut director);

    director.tick();
    let writes = probe.buffer_writes();
    let modules = probe.shader_modules_created();
    let pipelines = probe.count(|c| matches!(c, DeviceCall::CreateRenderPipeline { .. }));

    director.tick();

    assert_eq!(probe.buffer_writes(), writes);
    assert_eq!(probe.shader_modules_created(), modules);
    assert_eq!(probe.count(|c| matches!(c, DeviceCall::CreateRenderPipeline { .. })), pipelines);
    assert_eq!(director.last_frame_stats().buffer_writes, 0);
    assert_eq!(director.last_frame_stats().objects_created, 0);
    assert_eq!(probe.submissions().len(), 2);
}

#[test]
fn mutated_vertices_are_written_before_the_next_draw() {
    let (mut director, probe) = director();
    let tri = triangle(&mut director);
    director.tick();
    probe.clear_calls();

    let buffer = director.buffer(tri.vertices).unwrap();
    let positions = buffer.regions()[0].reference.array().clone();
    positions.set_element_as(1, &[-0.75f32, -0.75]).unwrap();
    director.tick();

    assert_eq!(probe.buffer_writes(), 1);
    assert_eq!(director.last_frame_stats().buffer_writes, 1);
}

#[test]
fn nothing_is_submitted_without_an_executable_pass() {
    let (mut director, probe) = director();
    let tri = triangle(&mut director);
    probe.set_surface_available(false);

    director.tick();

    assert!(!director.pass(tri.pass).unwrap().is_executable());
    assert!(probe.submissions().is_empty());
    assert_eq!(probe.count(|c| matches!(c, DeviceCall::AcquireFrame)), 1);
    assert_eq!(director.last_frame_stats().passes_skipped, 1);

    probe.set_surface_available(true);
    director.tick();
    assert_eq!(probe.submissions().len(), 1);
}

#[test]
fn screen_frame_is_only_acquired_for_visible_screen_passes() {
    let (mut director, probe) = director();
    triangle(&mut director);
    director.hide_stage("main");

    director.tick();
    director.tick();

    assert_eq!(probe.count(|c| matches!(c, DeviceCall::AcquireFrame)), 0);
    assert!(probe.submissions().is_empty());
}

#[test]
fn compute_pass_dispatches_fixed_workgroups() {
    let (mut director, probe) = director();
    let particles = ArrayRef::zeroed("particles", 256, 16).unwrap();
    let storage = director
        .create_buffer(
            BufferDescriptor::new("particles", BufferKind::Storage { read_only: false })
                .with_region(RegionDescriptor::new(particles)),
        )
        .unwrap();
    let shader = director
        .create_shader(ShaderDescriptor::wgsl("simulate", COMPUTE_WGSL))
        .unwrap();
    let pipeline = director
        .create_compute_pipeline(ComputePipelineDescriptor::new("simulate", shader, "main"))
        .unwrap();
    let binding = director
        .create_binding(
            BindingDescriptor::with_fixed_range("simulate", &[4, 2])
                .storage(BufferEntry::new(0, storage).visible_to(wgpu::ShaderStages::COMPUTE)),
        )
        .unwrap();
    let pass = director.create_pass(PassDescriptor::compute("simulate")).unwrap();
    director.add_item(pass, pipeline, binding).unwrap();
    director.add_stage(StageDescriptor::new("physics", [pass])).unwrap();

    director.tick();

    let commands = probe.last_submission().unwrap();
    assert!(matches!(commands.first(), Some(Command::BeginComputePass { .. })));
    assert!(commands.iter().any(|c| matches!(c, Command::SetComputePipeline(_))));
    assert!(commands.iter().any(|c| matches!(c, Command::SetBindGroup { index: 0, .. })));
    assert!(commands.contains(&Command::Dispatch { x: 4, y: 2, z: 1 }));
    assert_eq!(probe.count(|c| matches!(c, DeviceCall::AcquireFrame)), 0);
}

#[test]
fn add_item_rejects_pipeline_of_the_wrong_kind() {
    let (mut director, _) = director();
    let tri = triangle(&mut director);
    let shader = director
        .create_shader(ShaderDescriptor::wgsl("simulate", COMPUTE_WGSL))
        .unwrap();
    let compute = director
        .create_compute_pipeline(ComputePipelineDescriptor::new("simulate", shader, "main"))
        .unwrap();

    let result = director.add_item(tri.pass, compute, tri.binding);
    assert_eq!(
        result,
        Err(Error::PipelineKindMismatch {
            pass: "main".to_string(),
            pipeline: "simulate".to_string(),
        })
    );
    assert_eq!(director.pass(tri.pass).unwrap().items().len(), 1);
}

#[test]
fn pass_shared_by_two_stages_runs_once() {
    let (mut director, probe) = director();
    let tri = triangle(&mut director);
    director.add_stage(StageDescriptor::new("overlay", [tri.pass])).unwrap();

    director.tick();

    assert_eq!(recorded(&probe, |c| matches!(c, Command::BeginRenderPass { .. })).len(), 1);
    assert_eq!(director.last_frame_stats().passes_executed, 1);
}

#[test]
fn duplicate_stage_name_is_rejected() {
    let (mut director, _) = director();
    let tri = triangle(&mut director);
    let result = director.add_stage(StageDescriptor::new("main", [tri.pass]));
    assert_eq!(result, Err(Error::DuplicateStage("main".to_string())));
}

#[test]
fn hidden_stage_is_skipped_until_shown() {
    let (mut director, probe) = director();
    triangle(&mut director);

    assert!(director.hide_stage("main"));
    director.tick();
    assert!(probe.submissions().is_empty());
    assert_eq!(director.last_frame_stats().passes_executed, 0);

    assert!(director.show_stage("main"));
    director.tick();
    assert_eq!(probe.submissions().len(), 1);
    assert!(!director.show_stage("missing"));
}

#[test]
fn attachment_clear_uses_default_clear_color() {
    let (mut director, probe) = director();
    director.settings_mut().clear_color = wgpu::Color::WHITE;
    triangle(&mut director);

    director.tick();

    let begin = recorded(&probe, |c| matches!(c, Command::BeginRenderPass { .. }));
    let Some(Command::BeginRenderPass { color_attachments, .. }) = begin.first() else {
        panic!("no render pass recorded");
    };
    assert_eq!(color_attachments[0].clear, Some(wgpu::Color::WHITE));
    assert!(color_attachments[0].store);
}

#[test]
fn dynamic_uniforms_are_written_before_the_frame_is_submitted() {
    let (mut director, probe) = director();
    let frames = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&frames);
    let globals = BlockRef::new(
        "globals",
        vec![
            ("tint", FieldSource::from(glam::Vec4::ONE)),
            (
                "time",
                FieldSource::dynamic(move || UniformValue::F32(counter.fetch_add(1, Ordering::Relaxed) as f32)),
            ),
        ],
    )
    .unwrap();
    let uniforms = director
        .create_buffer(BufferDescriptor::new("globals", BufferKind::Uniform).with_region(RegionDescriptor::new(globals)))
        .unwrap();
    let shader = director
        .create_shader(ShaderDescriptor::wgsl("animated", TRIANGLE_WGSL))
        .unwrap();
    let pipeline = director
        .create_render_pipeline(RenderPipelineDescriptor::new("animated", shader))
        .unwrap();
    let binding = director
        .create_binding(BindingDescriptor::with_fixed_range("animated", &[3]).uniform(BufferEntry::new(0, uniforms)))
        .unwrap();
    let pass = director
        .create_pass(PassDescriptor::render("animated", vec![ColorAttachment::screen()], None))
        .unwrap();
    director.add_item(pass, pipeline, binding).unwrap();
    director.add_stage(StageDescriptor::new("main", [pass])).unwrap();
    let evaluated = frames.load(Ordering::Relaxed);

    director.tick();
    probe.clear_calls();
    director.tick();

    assert_eq!(frames.load(Ordering::Relaxed) - evaluated, 2);
    assert_eq!(director.last_frame_stats().buffer_writes, 1);
    let calls = probe.calls();
    let write = calls.iter().position(|c| matches!(c, DeviceCall::WriteBuffer { .. })).unwrap();
    let submit = calls.iter().position(|c| matches!(c, DeviceCall::Submit { .. })).unwrap();
    assert!(write < submit);
    assert_eq!(director.pending_updates(), 0);
}

// ============================================================================
// Async sources
// ============================================================================

#[test]
fn pending_shader_blocks_pass_until_source_arrives() {
    let (mut director, probe) = director();
    let (sender, load) = pending::<String>();
    let tri = triangle_with(&mut director, ShaderSource::Pending(load));

    for _ in 0..3 {
        director.tick();
        assert!(!director.pass(tri.pass).unwrap().is_executable());
    }
    assert_eq!(probe.shader_modules_created(), 0);
    assert!(probe.submissions().is_empty());
    assert!(director.shader(tri.shader).unwrap().is_pending());

    sender.complete(TRIANGLE_WGSL.to_string());
    director.tick();

    assert!(director.pass(tri.pass).unwrap().is_executable());
    assert_eq!(probe.shader_modules_created(), 1);
    assert_eq!(probe.submissions().len(), 1);
}

#[test]
fn replacing_pending_source_cancels_the_load() {
    let (mut director, probe) = director();
    let (sender, load) = pending::<String>();
    let tri = triangle_with(&mut director, ShaderSource::Pending(load));
    director.tick();

    director
        .set_shader_source(tri.shader, ShaderSource::Wgsl(TRIANGLE_WGSL.to_string()))
        .unwrap();
    assert!(sender.is_cancelled());

    director.tick();
    assert!(director.pass(tri.pass).unwrap().is_executable());
    assert_eq!(probe.shader_modules_created(), 1);
}

#[test]
fn failed_shader_is_not_retried() {
    let (mut director, probe) = director();
    probe.reject_shader("triangle");
    let events = collect_events(&mut director);
    let tri = triangle(&mut director);

    for _ in 0..3 {
        director.tick();
    }

    assert!(director.shader(tri.shader).unwrap().is_failed());
    assert!(!director.pass(tri.pass).unwrap().is_executable());
    assert_eq!(probe.shader_modules_created(), 1);
    let failures = events
        .lock()
        .iter()
        .filter(|e| matches!(e, DirectorEvent::ShaderFailed { .. }))
        .count();
    assert_eq!(failures, 1);
}

#[test]
fn pending_texture_blocks_binding_until_data_arrives() {
    let (mut director, probe) = director();
    let (sender, load) = pending::<Vec<u8>>();
    let texture = director
        .create_texture(
            TextureDescriptor::new("albedo", wgpu::TextureFormat::Rgba8Unorm, TextureSize::fixed(2, 2))
                .with_data(TextureData::Pending(load)),
        )
        .unwrap();
    let sampler = director.create_sampler(SamplerDescriptor::linear("albedo"));
    let shader = director
        .create_shader(ShaderDescriptor::wgsl("quad", TRIANGLE_WGSL))
        .unwrap();
    let pipeline = director
        .create_render_pipeline(RenderPipelineDescriptor::new("quad", shader))
        .unwrap();
    let binding = director
        .create_binding(
            BindingDescriptor::with_fixed_range("quad", &[6])
                .texture(TextureEntry::new(0, texture))
                .sampler(SamplerEntry::new(1, sampler)),
        )
        .unwrap();
    let pass = director
        .create_pass(PassDescriptor::render("quad", vec![ColorAttachment::screen()], None))
        .unwrap();
    director.add_item(pass, pipeline, binding).unwrap();
    director.add_stage(StageDescriptor::new("main", [pass])).unwrap();

    director.tick();
    director.tick();
    assert!(!director.pass(pass).unwrap().is_executable());
    assert_eq!(probe.count(|c| matches!(c, DeviceCall::CreateTexture { .. })), 0);
    assert_eq!(director.pending_updates(), 1);

    sender.complete(vec![255; 16]);
    director.tick();

    assert!(director.texture(texture).unwrap().is_complete());
    assert!(director.pass(pass).unwrap().is_executable());
    assert_eq!(probe.count(|c| matches!(c, DeviceCall::WriteTexture { len: 16, .. })), 1);
    assert_eq!(director.monitor().texture_count(), 1);
    assert_eq!(director.monitor().texture_bytes(), 16);
}

#[test]
fn wrongly_sized_texture_data_fails_the_texture() {
    let (mut director, probe) = director();
    let events = collect_events(&mut director);
    let texture = director
        .create_texture(
            TextureDescriptor::new("broken", wgpu::TextureFormat::Rgba8Unorm, TextureSize::fixed(2, 2))
                .with_data(TextureData::Bytes(vec![0; 10])),
        )
        .unwrap();

    director.tick();

    assert!(director.texture(texture).unwrap().is_failed());
    assert_eq!(probe.count(|c| matches!(c, DeviceCall::WriteTexture { .. })), 0);
    assert!(
        events
            .lock()
            .iter()
            .any(|e| matches!(e, DirectorEvent::TextureFailed { handle, .. } if *handle == texture))
    );
}

#[test]
fn failed_texture_releases_its_accounting() {
    let (mut director, probe) = director();
    let good = director
        .create_texture(
            TextureDescriptor::new("good", wgpu::TextureFormat::Rgba8Unorm, TextureSize::fixed(2, 2))
                .with_data(TextureData::Bytes(vec![0; 16])),
        )
        .unwrap();
    let bad = director
        .create_texture(
            TextureDescriptor::new("bad", wgpu::TextureFormat::Rgba8Unorm, TextureSize::fixed(2, 2))
                .with_data(TextureData::Bytes(vec![0; 10])),
        )
        .unwrap();

    director.tick();
    assert!(director.texture(good).unwrap().is_complete());
    assert!(director.texture(bad).unwrap().is_failed());
    assert_eq!(director.monitor().texture_count(), 1);
    assert_eq!(director.monitor().texture_bytes(), 16);
    assert_eq!(probe.count(|c| matches!(c, DeviceCall::DestroyTexture(_))), 1);

    director.destroy_texture(bad).unwrap();
    assert_eq!(director.monitor().texture_count(), 1);
    assert_eq!(director.monitor().texture_bytes(), 16);

    director.destroy_texture(good).unwrap();
    assert_eq!(director.monitor().texture_count(), 0);
    assert_eq!(director.monitor().texture_bytes(), 0);
}

#[test]
fn dropped_texture_producer_fails_the_texture() {
    let (mut director, probe) = director();
    let events = collect_events(&mut director);
    let (sender, load) = pending::<Vec<u8>>();
    let texture = director
        .create_texture(
            TextureDescriptor::new("streamed", wgpu::TextureFormat::Rgba8Unorm, TextureSize::fixed(2, 2))
                .with_data(TextureData::Pending(load)),
        )
        .unwrap();
    director.tick();
    assert_eq!(director.pending_updates(), 1);

    drop(sender);
    director.tick();
    director.tick();

    let texture_state = director.texture(texture).unwrap();
    assert!(!texture_state.is_complete());
    assert!(texture_state.is_failed());
    assert_eq!(director.pending_updates(), 0);
    assert_eq!(probe.count(|c| matches!(c, DeviceCall::WriteTexture { .. })), 0);
    let failures = events
        .lock()
        .iter()
        .filter(|e| matches!(e, DirectorEvent::TextureFailed { handle, .. } if *handle == texture))
        .count();
    assert_eq!(failures, 1);
}

#[test]
fn dropped_shader_producer_fails_the_shader() {
    let (mut director, probe) = director();
    let events = collect_events(&mut director);
    let (sender, load) = pending::<String>();
    let tri = triangle_with(&mut director, ShaderSource::Pending(load));
    director.tick();
    assert!(director.shader(tri.shader).unwrap().is_pending());

    drop(sender);
    director.tick();
    director.tick();

    assert!(director.shader(tri.shader).unwrap().is_failed());
    assert!(!director.pass(tri.pass).unwrap().is_executable());
    assert_eq!(probe.shader_modules_created(), 0);
    let failures = events
        .lock()
        .iter()
        .filter(|e| matches!(e, DirectorEvent::ShaderFailed { handle, .. } if *handle == tri.shader))
        .count();
    assert_eq!(failures, 1);
}

// ============================================================================
// Resize & recovery
// ============================================================================

#[test]
fn resize_recreates_screen_sized_textures() {
    let (mut director, probe) = director();
    let events = collect_events(&mut director);
    let target = director
        .create_texture(TextureDescriptor::render_target("offscreen", wgpu::TextureFormat::Rgba8Unorm))
        .unwrap();
    director.tick();
    assert_eq!(director.texture(target).unwrap().extent().width, 800);
    let first_version = director.texture(target).unwrap().version();

    director.resize(1024, 768);
    director.tick();

    let texture = director.texture(target).unwrap();
    assert_eq!((texture.extent().width, texture.extent().height), (1024, 768));
    assert_eq!(texture.version(), first_version + 1);
    assert_eq!(director.screen().size(), (1024, 768));
    assert_eq!(
        probe.count(|c| matches!(c, DeviceCall::CreateTexture { width: 1024, height: 768, .. })),
        1
    );
    assert_eq!(probe.count(|c| matches!(c, DeviceCall::DestroyTexture(_))), 1);
    assert!(
        events
            .lock()
            .contains(&DirectorEvent::Resized { width: 1024, height: 768 })
    );
    assert_eq!(director.monitor().texture_count(), 1);
}

#[test]
fn resize_to_same_size_is_ignored() {
    let (mut director, probe) = director();
    let events = collect_events(&mut director);
    director.resize(800, 600);
    director.tick();

    assert_eq!(probe.count(|c| matches!(c, DeviceCall::ConfigureSurface { .. })), 1);
    assert!(events.lock().is_empty());
}

#[test]
fn oversized_resize_is_clamped_to_device_limit() {
    let limits = tessera::device::DeviceLimits {
        max_texture_dimension_2d: 2048,
        ..Default::default()
    };
    let mut director = Director::new(HeadlessDevice::with_limits(limits), DirectorSettings::default());

    director.resize(4096, 100);
    assert_eq!(director.screen().size(), (2048, 100));

    director.resize(0, 0);
    assert_eq!(director.screen().size(), (1, 1));
}

#[test]
fn recovered_device_rebuilds_every_object() {
    let (mut director, old_probe) = director();
    let tri = triangle(&mut director);
    director.tick();
    assert_eq!(old_probe.submissions().len(), 1);

    let fresh = HeadlessDevice::new();
    let probe = fresh.clone();
    director.recover_device(fresh);
    assert!(!director.pass(tri.pass).unwrap().is_executable());
    assert!(!director.buffer(tri.vertices).unwrap().is_realized());

    director.tick();

    assert!(director.pass(tri.pass).unwrap().is_executable());
    assert_eq!(probe.count(|c| matches!(c, DeviceCall::CreateBuffer { .. })), 1);
    assert_eq!(probe.shader_modules_created(), 1);
    assert_eq!(probe.count(|c| matches!(c, DeviceCall::CreateRenderPipeline { .. })), 1);
    assert_eq!(probe.buffer_writes(), 1);
    assert_eq!(probe.submissions().len(), 1);
    assert_eq!(old_probe.submissions().len(), 1);
    assert!(probe.validation_errors().is_empty());
}

// ============================================================================
// Destruction
// ============================================================================

#[test]
fn destroyed_pipeline_leaves_an_empty_executable_pass() {
    let (mut director, probe) = director();
    let tri = triangle(&mut director);
    director.tick();

    director.destroy_pipeline(tri.pipeline).unwrap();
    assert!(director.pass(tri.pass).unwrap().items().is_empty());
    director.tick();

    let commands = probe.last_submission().unwrap();
    assert!(matches!(commands.first(), Some(Command::BeginRenderPass { .. })));
    assert_eq!(commands.last(), Some(&Command::EndPass));
    assert!(!commands.iter().any(|c| matches!(c, Command::Draw { .. })));
}

#[test]
fn destroyed_attachments_keep_their_passes_idle() {
    let (mut director, _) = director();
    let color = director
        .create_texture(TextureDescriptor::render_target("offscreen", wgpu::TextureFormat::Rgba8Unorm))
        .unwrap();
    let depth = director
        .create_texture(TextureDescriptor::render_target("depth", wgpu::TextureFormat::Depth32Float))
        .unwrap();
    let offscreen = director
        .create_pass(PassDescriptor::render("offscreen", vec![ColorAttachment::texture(color)], None))
        .unwrap();
    let onscreen = director
        .create_pass(PassDescriptor::render(
            "onscreen",
            vec![ColorAttachment::screen()],
            Some(DepthAttachment::new(depth)),
        ))
        .unwrap();
    director.add_stage(StageDescriptor::new("main", [offscreen, onscreen])).unwrap();
    director.tick();
    assert!(director.pass(offscreen).unwrap().is_executable());
    assert!(director.pass(onscreen).unwrap().is_executable());

    director.destroy_texture(color).unwrap();
    director.destroy_texture(depth).unwrap();
    for _ in 0..3 {
        director.tick();
        for pass in [offscreen, onscreen] {
            let pass = director.pass(pass).unwrap();
            assert!(!pass.is_executable());
            assert!(pass.has_missing_attachment());
        }
    }
}

#[test]
fn destroyed_handles_are_unknown() {
    let (mut director, _) = director();
    let tri = triangle(&mut director);
    director.tick();

    director.destroy_binding(tri.binding).unwrap();
    director.destroy_pipeline(tri.pipeline).unwrap();
    director.destroy_shader(tri.shader).unwrap();
    director.destroy_pass(tri.pass).unwrap();

    assert_eq!(director.destroy_binding(tri.binding), Err(Error::UnknownHandle("binding")));
    assert_eq!(director.destroy_pipeline(tri.pipeline), Err(Error::UnknownHandle("pipeline")));
    assert_eq!(director.destroy_shader(tri.shader), Err(Error::UnknownHandle("shader")));
    assert_eq!(director.destroy_pass(tri.pass), Err(Error::UnknownHandle("pass")));
    assert!(director.stage("main").unwrap().passes().is_empty());
    assert!(director.pipeline(tri.pipeline).is_none());
}

#[test]
fn pipeline_for_unknown_shader_is_rejected() {
    let (mut director, _) = director();
    let shader = director
        .create_shader(ShaderDescriptor::wgsl("gone", TRIANGLE_WGSL))
        .unwrap();
    director.destroy_shader(shader).unwrap();

    let result = director.create_render_pipeline(RenderPipelineDescriptor::new("orphan", shader));
    assert_eq!(result, Err(Error::UnknownHandle("shader")));
}

// ============================================================================
// Events & update list
// ============================================================================

#[test]
fn listener_sees_creation_in_dependency_order() {
    let (mut director, _) = director();
    let events = collect_events(&mut director);
    let tri = triangle(&mut director);

    director.tick();

    let seen = events.lock().clone();
    let position = |wanted: &DirectorEvent| seen.iter().position(|e| e == wanted);
    let stage = position(&DirectorEvent::StageAdded { name: "main".to_string() }).unwrap();
    let shader = position(&DirectorEvent::ShaderCompiled { handle: tri.shader }).unwrap();
    let complete = position(&DirectorEvent::BindingComplete { handle: tri.binding }).unwrap();
    let pipeline = position(&DirectorEvent::PipelineCreated { handle: tri.pipeline }).unwrap();
    let executable = position(&DirectorEvent::PassExecutable { handle: tri.pass }).unwrap();
    assert!(stage < shader && shader < complete && complete < pipeline && pipeline < executable);
    assert!(seen.iter().any(|e| matches!(e, DirectorEvent::BufferCreated { handle, .. } if *handle == tri.vertices)));

    events.lock().clear();
    director.tick();
    assert!(events.lock().is_empty());
}

#[test]
fn removed_listener_receives_nothing() {
    let (mut director, _) = director();
    let seen = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&seen);
    let id = director.add_listener(move |_| *sink.lock() += 1);
    assert!(director.remove_listener(id));
    assert!(!director.remove_listener(id));

    triangle(&mut director);
    director.tick();

    assert_eq!(*seen.lock(), 0);
}

#[test]
fn add_to_update_list_reports_pending_objects() {
    let (mut director, _) = director();
    let tri = triangle(&mut director);
    assert!(!director.add_to_update_list(tri.vertices));

    director.tick();
    assert_eq!(director.pending_updates(), 0);
    assert!(director.add_to_update_list(tri.vertices));
    assert!(!director.add_to_update_list(tri.vertices));
    assert_eq!(director.pending_updates(), 1);
}
