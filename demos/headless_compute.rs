//! Headless Compute
//!
//! Doubles a storage buffer of floats on the GPU every frame without a
//! window. Run with `RUST_LOG=debug cargo run --example headless_compute`.

use tessera::{
    ArrayRef, BindingDescriptor, BufferDescriptor, BufferEntry, BufferKind,
    ComputePipelineDescriptor, DeviceSettings, Director, DirectorSettings, PassDescriptor,
    RegionDescriptor, ShaderDescriptor, StageDescriptor, WgpuDevice,
};

const SHADER: &str = r"
@group(0) @binding(0) var<storage, read_write> values: array<f32>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x < arrayLength(&values)) {
        values[id.x] = values[id.x] * 2.0;
    }
}
";

const COUNT: usize = 1024;

fn main() -> tessera::Result<()> {
    env_logger::init();

    let device = match pollster::block_on(WgpuDevice::new_headless(&DeviceSettings::default())) {
        Ok(device) => device,
        Err(err) => {
            log::error!("No GPU available: {err}");
            return Ok(());
        }
    };
    let mut director = Director::new(device, DirectorSettings::default());

    let data: Vec<f32> = (0..COUNT).map(|i| i as f32).collect();
    let values = ArrayRef::new("values", &data)?;
    let buffer = director.create_buffer(
        BufferDescriptor::new("values", BufferKind::Storage { read_only: false })
            .with_region(RegionDescriptor::new(values)),
    )?;

    let shader = director.create_shader(ShaderDescriptor::wgsl("double", SHADER))?;
    let pipeline =
        director.create_compute_pipeline(ComputePipelineDescriptor::new("double", shader, "main"))?;
    let workgroups = COUNT.div_ceil(64) as u32;
    let binding = director.create_binding(
        BindingDescriptor::with_fixed_range("double", &[workgroups])
            .storage(BufferEntry::new(0, buffer).visible_to(wgpu::ShaderStages::COMPUTE)),
    )?;
    let pass = director.create_pass(PassDescriptor::compute("double"))?;
    director.add_item(pass, pipeline, binding)?;
    director.add_stage(StageDescriptor::new("compute", [pass]))?;

    for _ in 0..4 {
        director.tick();
        let stats = director.last_frame_stats();
        log::info!(
            "frame {}: {} pass(es) executed, {} object(s) created",
            stats.frame_index,
            stats.passes_executed,
            stats.objects_created
        );
    }
    log::info!("Device memory in use: {} bytes", director.monitor().total_bytes());
    Ok(())
}
