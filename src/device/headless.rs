//! Headless Device
//!
//! A [`GpuDevice`] without a GPU. It mints ids, applies the same validation
//! rules a real device enforces on buffer writes, and records every call so
//! callers can inspect what the scheduler asked the device to do.
//!
//! Clones share state: keep one clone around after handing the device to a
//! [`Director`](crate::Director) to observe it.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use slotmap::SlotMap;

use super::{
    BindGroupId, BindGroupLayoutId, CommandEncoder, Command, DeviceLimits, GpuBindGroupDesc,
    GpuBindGroupLayoutDesc, GpuBufferDesc, GpuBufferId, GpuComputePipelineDesc,
    GpuComputePipelineId, GpuDevice, GpuRenderPipelineDesc, GpuRenderPipelineId, GpuSamplerDesc,
    GpuSamplerId, GpuTextureDesc, GpuTextureId, GpuTextureViewId, ShaderModuleId, SurfaceFrame,
};
use crate::errors::{Error, Result};

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreateBuffer { label: String, size: u64 },
    WriteBuffer { buffer: GpuBufferId, offset: u64, len: u64 },
    DestroyBuffer(GpuBufferId),
    CreateTexture { label: String, width: u32, height: u32 },
    WriteTexture { texture: GpuTextureId, len: u64 },
    DestroyTexture(GpuTextureId),
    CreateSampler { label: String },
    DestroySampler(GpuSamplerId),
    CreateShaderModule { label: String },
    DestroyShaderModule(ShaderModuleId),
    CreateBindGroupLayout { label: String, entries: usize },
    CreateBindGroup { label: String },
    DestroyBindGroup(BindGroupId),
    CreateRenderPipeline { label: String },
    CreateComputePipeline { label: String },
    DestroyRenderPipeline(GpuRenderPipelineId),
    DestroyComputePipeline(GpuComputePipelineId),
    ConfigureSurface { width: u32, height: u32 },
    AcquireFrame,
    Submit { commands: usize },
}

#[derive(Debug)]
struct HeadlessState {
    limits: DeviceLimits,
    surface_format: wgpu::TextureFormat,
    surface_size: (u32, u32),
    surface_available: bool,
    rejected_shaders: FxHashSet<String>,

    buffers: SlotMap<GpuBufferId, GpuBufferDesc>,
    textures: SlotMap<GpuTextureId, GpuTextureDesc>,
    views: SlotMap<GpuTextureViewId, Option<GpuTextureId>>,
    samplers: SlotMap<GpuSamplerId, GpuSamplerDesc>,
    modules: SlotMap<ShaderModuleId, String>,
    layouts: SlotMap<BindGroupLayoutId, GpuBindGroupLayoutDesc>,
    bind_groups: SlotMap<BindGroupId, GpuBindGroupDesc>,
    render_pipelines: SlotMap<GpuRenderPipelineId, GpuRenderPipelineDesc>,
    compute_pipelines: SlotMap<GpuComputePipelineId, GpuComputePipelineDesc>,

    pending_frame: Option<GpuTextureViewId>,
    calls: Vec<DeviceCall>,
    submissions: Vec<Vec<Command>>,
    validation_errors: Vec<String>,
}

/// Recording no-GPU device.
#[derive(Debug, Clone)]
pub struct HeadlessDevice {
    state: Arc<Mutex<HeadlessState>>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DeviceLimits::default())
    }

    #[must_use]
    pub fn with_limits(limits: DeviceLimits) -> Self {
        Self {
            state: Arc::new(Mutex::new(HeadlessState {
                limits,
                surface_format: wgpu::TextureFormat::Bgra8UnormSrgb,
                surface_size: (1, 1),
                surface_available: true,
                rejected_shaders: FxHashSet::default(),
                buffers: SlotMap::with_key(),
                textures: SlotMap::with_key(),
                views: SlotMap::with_key(),
                samplers: SlotMap::with_key(),
                modules: SlotMap::with_key(),
                layouts: SlotMap::with_key(),
                bind_groups: SlotMap::with_key(),
                render_pipelines: SlotMap::with_key(),
                compute_pipelines: SlotMap::with_key(),
                pending_frame: None,
                calls: Vec::new(),
                submissions: Vec::new(),
                validation_errors: Vec::new(),
            })),
        }
    }

    // ========================================================================
    // Test controls
    // ========================================================================

    /// Simulates a surface that cannot hand out frames (minimized window,
    /// outdated swapchain).
    pub fn set_surface_available(&self, available: bool) {
        self.state.lock().surface_available = available;
    }

    /// Makes shader module creation fail for the given label.
    pub fn reject_shader(&self, label: &str) {
        self.state.lock().rejected_shaders.insert(label.to_string());
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    #[must_use]
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.lock().calls.clone()
    }

    /// Number of recorded calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&DeviceCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }

    #[must_use]
    pub fn buffer_writes(&self) -> usize {
        self.count(|c| matches!(c, DeviceCall::WriteBuffer { .. }))
    }

    #[must_use]
    pub fn shader_modules_created(&self) -> usize {
        self.count(|c| matches!(c, DeviceCall::CreateShaderModule { .. }))
    }

    #[must_use]
    pub fn submissions(&self) -> Vec<Vec<Command>> {
        self.state.lock().submissions.clone()
    }

    #[must_use]
    pub fn last_submission(&self) -> Option<Vec<Command>> {
        self.state.lock().submissions.last().cloned()
    }

    /// Descriptor of a live buffer.
    #[must_use]
    pub fn buffer_desc(&self, id: GpuBufferId) -> Option<GpuBufferDesc> {
        self.state.lock().buffers.get(id).cloned()
    }

    #[must_use]
    pub fn texture_desc(&self, id: GpuTextureId) -> Option<GpuTextureDesc> {
        self.state.lock().textures.get(id).cloned()
    }

    #[must_use]
    pub fn render_pipeline_desc(&self, id: GpuRenderPipelineId) -> Option<GpuRenderPipelineDesc> {
        self.state.lock().render_pipelines.get(id).cloned()
    }

    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.state.lock().buffers.len()
    }

    /// Rule violations a real device would have reported.
    #[must_use]
    pub fn validation_errors(&self) -> Vec<String> {
        self.state.lock().validation_errors.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }
}

impl HeadlessState {
    fn validate_write(&mut self, buffer: GpuBufferId, offset: u64, len: u64) {
        let Some(desc) = self.buffers.get(buffer) else {
            self.validation_errors
                .push(format!("write to destroyed buffer {buffer:?}"));
            return;
        };
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 || len % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            self.validation_errors.push(format!(
                "unaligned write to `{}`: offset {offset}, len {len}",
                desc.label
            ));
        }
        if offset + len > desc.size {
            self.validation_errors.push(format!(
                "write past end of `{}`: {} > {}",
                desc.label,
                offset + len,
                desc.size
            ));
        }
    }
}

impl GpuDevice for HeadlessDevice {
    fn limits(&self) -> DeviceLimits {
        self.state.lock().limits
    }

    fn surface_format(&self) -> wgpu::TextureFormat {
        self.state.lock().surface_format
    }

    fn configure_surface(&mut self, width: u32, height: u32) {
        let mut s = self.state.lock();
        s.surface_size = (width, height);
        s.calls.push(DeviceCall::ConfigureSurface { width, height });
    }

    fn acquire_frame(&mut self) -> Option<SurfaceFrame> {
        let mut s = self.state.lock();
        s.calls.push(DeviceCall::AcquireFrame);
        if !s.surface_available {
            return None;
        }
        if let Some(previous) = s.pending_frame.take() {
            s.views.remove(previous);
        }
        let view = s.views.insert(None);
        s.pending_frame = Some(view);
        let (width, height) = s.surface_size;
        Some(SurfaceFrame { view, width, height })
    }

    fn create_buffer(&mut self, desc: &GpuBufferDesc) -> Result<GpuBufferId> {
        let mut s = self.state.lock();
        if desc.size == 0 {
            return Err(Error::Device(format!("buffer `{}` has zero size", desc.label)));
        }
        s.calls.push(DeviceCall::CreateBuffer {
            label: desc.label.clone(),
            size: desc.size,
        });
        Ok(s.buffers.insert(desc.clone()))
    }

    fn write_buffer(&mut self, buffer: GpuBufferId, offset: u64, data: &[u8]) {
        let mut s = self.state.lock();
        let len = data.len() as u64;
        s.validate_write(buffer, offset, len);
        s.calls.push(DeviceCall::WriteBuffer { buffer, offset, len });
    }

    fn destroy_buffer(&mut self, buffer: GpuBufferId) {
        let mut s = self.state.lock();
        s.buffers.remove(buffer);
        s.calls.push(DeviceCall::DestroyBuffer(buffer));
    }

    fn create_texture(&mut self, desc: &GpuTextureDesc) -> Result<(GpuTextureId, GpuTextureViewId)> {
        let mut s = self.state.lock();
        let max = s.limits.max_texture_dimension_2d;
        if desc.size.width == 0 || desc.size.height == 0 {
            return Err(Error::Device(format!("texture `{}` has zero extent", desc.label)));
        }
        if desc.size.width > max || desc.size.height > max {
            return Err(Error::Device(format!(
                "texture `{}` exceeds max dimension {max}",
                desc.label
            )));
        }
        s.calls.push(DeviceCall::CreateTexture {
            label: desc.label.clone(),
            width: desc.size.width,
            height: desc.size.height,
        });
        let texture = s.textures.insert(desc.clone());
        let view = s.views.insert(Some(texture));
        Ok((texture, view))
    }

    fn write_texture(&mut self, texture: GpuTextureId, data: &[u8]) {
        let mut guard = self.state.lock();
        let s = &mut *guard;
        if let Some(desc) = s.textures.get(texture) {
            let expected = desc
                .bytes_per_texel()
                .map(|bpt| u64::from(bpt) * u64::from(desc.size.width) * u64::from(desc.size.height));
            if let Some(expected) = expected
                && (data.len() as u64) < expected
            {
                let label = desc.label.clone();
                s.validation_errors.push(format!(
                    "texture `{label}` upload of {} bytes, expected {expected}",
                    data.len()
                ));
            }
        } else {
            s.validation_errors
                .push(format!("write to destroyed texture {texture:?}"));
        }
        s.calls.push(DeviceCall::WriteTexture {
            texture,
            len: data.len() as u64,
        });
    }

    fn destroy_texture(&mut self, texture: GpuTextureId) {
        let mut s = self.state.lock();
        s.textures.remove(texture);
        s.views.retain(|_, owner| *owner != Some(texture));
        s.calls.push(DeviceCall::DestroyTexture(texture));
    }

    fn create_sampler(&mut self, desc: &GpuSamplerDesc) -> Result<GpuSamplerId> {
        let mut s = self.state.lock();
        s.calls.push(DeviceCall::CreateSampler {
            label: desc.label.clone(),
        });
        Ok(s.samplers.insert(desc.clone()))
    }

    fn destroy_sampler(&mut self, sampler: GpuSamplerId) {
        let mut s = self.state.lock();
        s.samplers.remove(sampler);
        s.calls.push(DeviceCall::DestroySampler(sampler));
    }

    fn create_shader_module(&mut self, label: &str, wgsl: &str) -> Result<ShaderModuleId> {
        let mut s = self.state.lock();
        s.calls.push(DeviceCall::CreateShaderModule {
            label: label.to_string(),
        });
        if wgsl.trim().is_empty() {
            return Err(Error::ShaderCompilation {
                label: label.to_string(),
                message: "empty source".to_string(),
            });
        }
        if s.rejected_shaders.contains(label) {
            return Err(Error::ShaderCompilation {
                label: label.to_string(),
                message: "rejected by device".to_string(),
            });
        }
        Ok(s.modules.insert(wgsl.to_string()))
    }

    fn destroy_shader_module(&mut self, module: ShaderModuleId) {
        let mut s = self.state.lock();
        s.modules.remove(module);
        s.calls.push(DeviceCall::DestroyShaderModule(module));
    }

    fn create_bind_group_layout(&mut self, desc: &GpuBindGroupLayoutDesc) -> Result<BindGroupLayoutId> {
        let mut s = self.state.lock();
        s.calls.push(DeviceCall::CreateBindGroupLayout {
            label: desc.label.clone(),
            entries: desc.entries.len(),
        });
        Ok(s.layouts.insert(desc.clone()))
    }

    fn create_bind_group(&mut self, desc: &GpuBindGroupDesc) -> Result<BindGroupId> {
        let mut s = self.state.lock();
        let Some(layout) = s.layouts.get(desc.layout) else {
            return Err(Error::Device(format!(
                "bind group `{}` references an unknown layout",
                desc.label
            )));
        };
        if layout.entries.len() != desc.entries.len() {
            return Err(Error::Device(format!(
                "bind group `{}` has {} entries, layout expects {}",
                desc.label,
                desc.entries.len(),
                layout.entries.len()
            )));
        }
        s.calls.push(DeviceCall::CreateBindGroup {
            label: desc.label.clone(),
        });
        Ok(s.bind_groups.insert(desc.clone()))
    }

    fn destroy_bind_group(&mut self, group: BindGroupId) {
        let mut s = self.state.lock();
        s.bind_groups.remove(group);
        s.calls.push(DeviceCall::DestroyBindGroup(group));
    }

    fn create_render_pipeline(&mut self, desc: &GpuRenderPipelineDesc) -> Result<GpuRenderPipelineId> {
        let mut s = self.state.lock();
        if !s.modules.contains_key(desc.module) {
            return Err(Error::Device(format!(
                "pipeline `{}` references a destroyed shader module",
                desc.label
            )));
        }
        s.calls.push(DeviceCall::CreateRenderPipeline {
            label: desc.label.clone(),
        });
        Ok(s.render_pipelines.insert(desc.clone()))
    }

    fn create_compute_pipeline(&mut self, desc: &GpuComputePipelineDesc) -> Result<GpuComputePipelineId> {
        let mut s = self.state.lock();
        if !s.modules.contains_key(desc.module) {
            return Err(Error::Device(format!(
                "pipeline `{}` references a destroyed shader module",
                desc.label
            )));
        }
        s.calls.push(DeviceCall::CreateComputePipeline {
            label: desc.label.clone(),
        });
        Ok(s.compute_pipelines.insert(desc.clone()))
    }

    fn destroy_render_pipeline(&mut self, pipeline: GpuRenderPipelineId) {
        let mut s = self.state.lock();
        s.render_pipelines.remove(pipeline);
        s.calls.push(DeviceCall::DestroyRenderPipeline(pipeline));
    }

    fn destroy_compute_pipeline(&mut self, pipeline: GpuComputePipelineId) {
        let mut s = self.state.lock();
        s.compute_pipelines.remove(pipeline);
        s.calls.push(DeviceCall::DestroyComputePipeline(pipeline));
    }

    fn submit(&mut self, encoder: CommandEncoder) {
        let mut s = self.state.lock();
        let commands = encoder.into_commands();
        s.calls.push(DeviceCall::Submit {
            commands: commands.len(),
        });
        s.submissions.push(commands);
        if let Some(frame) = s.pending_frame.take() {
            s.views.remove(frame);
        }
    }
}
