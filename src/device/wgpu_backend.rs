//! wgpu Backend
//!
//! [`WgpuDevice`] owns the core GPU handles (device, queue and an optional
//! presentation surface) and stores every created object in a `slotmap`
//! keyed by the ids handed back to the scheduler.
//!
//! Device acquisition is async and resolves once at startup; drive it with an
//! executor of your choice (`pollster::block_on` on native).

use std::borrow::Cow;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use super::{
    BindGroupId, BindGroupLayoutId, Command, CommandEncoder, DeviceLimits, GpuBindGroupDesc,
    GpuBindGroupLayoutDesc, GpuBindingResource, GpuBufferDesc, GpuBufferId, GpuColorAttachment,
    GpuComputePipelineDesc, GpuComputePipelineId, GpuDepthAttachment, GpuDevice,
    GpuRenderPipelineDesc, GpuRenderPipelineId, GpuSamplerDesc, GpuSamplerId, GpuTextureDesc,
    GpuTextureId, GpuTextureViewId, ShaderModuleId, SurfaceFrame,
};
use crate::errors::{Error, Result};
use crate::settings::DeviceSettings;

struct SurfaceState {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
}

/// Real GPU backend.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: Option<SurfaceState>,
    limits: DeviceLimits,

    buffers: SlotMap<GpuBufferId, wgpu::Buffer>,
    textures: SlotMap<GpuTextureId, (wgpu::Texture, GpuTextureDesc)>,
    views: SlotMap<GpuTextureViewId, wgpu::TextureView>,
    default_views: FxHashMap<GpuTextureId, GpuTextureViewId>,
    samplers: SlotMap<GpuSamplerId, wgpu::Sampler>,
    modules: SlotMap<ShaderModuleId, wgpu::ShaderModule>,
    layouts: SlotMap<BindGroupLayoutId, wgpu::BindGroupLayout>,
    bind_groups: SlotMap<BindGroupId, wgpu::BindGroup>,
    render_pipelines: SlotMap<GpuRenderPipelineId, wgpu::RenderPipeline>,
    compute_pipelines: SlotMap<GpuComputePipelineId, wgpu::ComputePipeline>,

    current_frame: Option<(wgpu::SurfaceTexture, GpuTextureViewId)>,
}

impl WgpuDevice {
    /// Acquires an adapter and device able to present to `window`.
    pub async fn new<W>(window: W, settings: &DeviceSettings, width: u32, height: u32) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle + Send + Sync + 'static,
    {
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: settings.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| Error::AdapterRequestFailed(e.to_string()))?;

        let (device, queue) = Self::request_device(&adapter, settings).await?;

        let mut config = surface
            .get_default_config(&adapter, width.max(1), height.max(1))
            .ok_or_else(|| Error::AdapterRequestFailed("Surface not supported by adapter".to_string()))?;

        if let Some(preferred) = settings.surface_format {
            let caps = surface.get_capabilities(&adapter);
            if caps.formats.contains(&preferred) {
                config.format = preferred;
            } else {
                log::warn!("Surface format {preferred:?} unsupported, using {:?}", config.format);
            }
        }

        config.present_mode = if settings.vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };
        surface.configure(&device, &config);

        Ok(Self::from_parts(device, queue, Some(SurfaceState { surface, config })))
    }

    /// Acquires a device without a presentation surface (offscreen / compute).
    pub async fn new_headless(settings: &DeviceSettings) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: settings.power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| Error::AdapterRequestFailed(e.to_string()))?;

        let (device, queue) = Self::request_device(&adapter, settings).await?;
        Ok(Self::from_parts(device, queue, None))
    }

    async fn request_device(
        adapter: &wgpu::Adapter,
        settings: &DeviceSettings,
    ) -> Result<(wgpu::Device, wgpu::Queue)> {
        let pair = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Tessera Device"),
                required_features: settings.required_features,
                required_limits: settings.required_limits.clone(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await?;
        Ok(pair)
    }

    fn from_parts(device: wgpu::Device, queue: wgpu::Queue, surface: Option<SurfaceState>) -> Self {
        let limits = DeviceLimits::from(&device.limits());
        Self {
            device,
            queue,
            surface,
            limits,
            buffers: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            views: SlotMap::with_key(),
            default_views: FxHashMap::default(),
            samplers: SlotMap::with_key(),
            modules: SlotMap::with_key(),
            layouts: SlotMap::with_key(),
            bind_groups: SlotMap::with_key(),
            render_pipelines: SlotMap::with_key(),
            compute_pipelines: SlotMap::with_key(),
            current_frame: None,
        }
    }

    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    // ========================================================================
    // Replay
    // ========================================================================

    fn color_attachment(&self, a: &GpuColorAttachment) -> Option<wgpu::RenderPassColorAttachment<'_>> {
        let view = self.views.get(a.view)?;
        Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: a.resolve_target.and_then(|id| self.views.get(id)),
            ops: wgpu::Operations {
                load: a.clear.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                store: if a.store { wgpu::StoreOp::Store } else { wgpu::StoreOp::Discard },
            },
            depth_slice: None,
        })
    }

    fn depth_attachment(&self, a: &GpuDepthAttachment) -> Option<wgpu::RenderPassDepthStencilAttachment<'_>> {
        let view = self.views.get(a.view)?;
        Some(wgpu::RenderPassDepthStencilAttachment {
            view,
            depth_ops: Some(wgpu::Operations {
                load: a.clear_depth.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                store: if a.store { wgpu::StoreOp::Store } else { wgpu::StoreOp::Discard },
            }),
            stencil_ops: None,
        })
    }

    fn replay_render_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
        colors: &[GpuColorAttachment],
        depth: Option<&GpuDepthAttachment>,
        body: &[Command],
    ) {
        let color_attachments: Option<Vec<_>> = colors
            .iter()
            .map(|a| self.color_attachment(a).map(Some))
            .collect();
        let Some(color_attachments) = color_attachments else {
            log::warn!("Render pass `{label}` skipped: attachment view no longer exists");
            return;
        };
        let depth_stencil_attachment = match depth {
            Some(d) => match self.depth_attachment(d) {
                Some(att) => Some(att),
                None => {
                    log::warn!("Render pass `{label}` skipped: depth view no longer exists");
                    return;
                }
            },
            None => None,
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            ..Default::default()
        });

        for command in body {
            match command {
                Command::SetRenderPipeline(id) => {
                    if let Some(p) = self.render_pipelines.get(*id) {
                        pass.set_pipeline(p);
                    }
                }
                Command::SetBindGroup { index, group } => {
                    if let Some(g) = self.bind_groups.get(*group) {
                        pass.set_bind_group(*index, g, &[]);
                    }
                }
                Command::SetVertexBuffer { slot, buffer } => {
                    if let Some(b) = self.buffers.get(*buffer) {
                        pass.set_vertex_buffer(*slot, b.slice(..));
                    }
                }
                Command::SetIndexBuffer { buffer, format } => {
                    if let Some(b) = self.buffers.get(*buffer) {
                        pass.set_index_buffer(b.slice(..), *format);
                    }
                }
                Command::Draw { vertices, instances } => {
                    pass.draw(vertices.clone(), instances.clone());
                }
                Command::DrawIndexed { indices, base_vertex, instances } => {
                    pass.draw_indexed(indices.clone(), *base_vertex, instances.clone());
                }
                Command::DrawIndirect { buffer, offset } => {
                    if let Some(b) = self.buffers.get(*buffer) {
                        pass.draw_indirect(b, *offset);
                    }
                }
                Command::DrawIndexedIndirect { buffer, offset } => {
                    if let Some(b) = self.buffers.get(*buffer) {
                        pass.draw_indexed_indirect(b, *offset);
                    }
                }
                other => log::warn!("Command {other:?} is not valid inside render pass `{label}`"),
            }
        }
    }

    fn replay_compute_pass(&self, encoder: &mut wgpu::CommandEncoder, label: &str, body: &[Command]) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });

        for command in body {
            match command {
                Command::SetComputePipeline(id) => {
                    if let Some(p) = self.compute_pipelines.get(*id) {
                        pass.set_pipeline(p);
                    }
                }
                Command::SetBindGroup { index, group } => {
                    if let Some(g) = self.bind_groups.get(*group) {
                        pass.set_bind_group(*index, g, &[]);
                    }
                }
                Command::Dispatch { x, y, z } => pass.dispatch_workgroups(*x, *y, *z),
                Command::DispatchIndirect { buffer, offset } => {
                    if let Some(b) = self.buffers.get(*buffer) {
                        pass.dispatch_workgroups_indirect(b, *offset);
                    }
                }
                other => log::warn!("Command {other:?} is not valid inside compute pass `{label}`"),
            }
        }
    }
}

fn pass_end(commands: &[Command], start: usize) -> usize {
    commands[start..]
        .iter()
        .position(|c| matches!(c, Command::EndPass))
        .map_or(commands.len(), |p| start + p)
}

impl GpuDevice for WgpuDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface
            .as_ref()
            .map_or(wgpu::TextureFormat::Bgra8UnormSrgb, |s| s.config.format)
    }

    fn configure_surface(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if let Some(state) = &mut self.surface {
            state.config.width = width;
            state.config.height = height;
            state.surface.configure(&self.device, &state.config);
        }
    }

    fn acquire_frame(&mut self) -> Option<SurfaceFrame> {
        let state = self.surface.as_ref()?;
        if let Some((_, stale)) = self.current_frame.take() {
            self.views.remove(stale);
        }

        let output = match state.surface.get_current_texture() {
            wgpu::CurrentSurfaceTexture::Success(output)
            | wgpu::CurrentSurfaceTexture::Suboptimal(output) => output,
            wgpu::CurrentSurfaceTexture::Lost | wgpu::CurrentSurfaceTexture::Outdated => {
                state.surface.configure(&self.device, &state.config);
                return None;
            }
            e => {
                log::error!("Surface frame acquisition failed: {e:?}");
                return None;
            }
        };

        let (width, height) = (state.config.width, state.config.height);
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let view_id = self.views.insert(view);
        self.current_frame = Some((output, view_id));
        Some(SurfaceFrame {
            view: view_id,
            width,
            height,
        })
    }

    fn create_buffer(&mut self, desc: &GpuBufferDesc) -> Result<GpuBufferId> {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&desc.label),
            size: desc.size,
            usage: desc.usage,
            mapped_at_creation: false,
        });
        Ok(self.buffers.insert(buffer))
    }

    fn write_buffer(&mut self, buffer: GpuBufferId, offset: u64, data: &[u8]) {
        if let Some(b) = self.buffers.get(buffer) {
            self.queue.write_buffer(b, offset, data);
        }
    }

    fn destroy_buffer(&mut self, buffer: GpuBufferId) {
        if let Some(b) = self.buffers.remove(buffer) {
            b.destroy();
        }
    }

    fn create_texture(&mut self, desc: &GpuTextureDesc) -> Result<(GpuTextureId, GpuTextureViewId)> {
        let max = self.limits.max_texture_dimension_2d;
        if desc.size.width > max || desc.size.height > max {
            return Err(Error::Device(format!(
                "texture `{}` exceeds max dimension {max}",
                desc.label
            )));
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: desc.size,
            mip_level_count: desc.mip_level_count,
            sample_count: desc.sample_count,
            dimension: desc.dimension,
            format: desc.format,
            usage: desc.usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&desc.label),
            dimension: Some(desc.view_dimension),
            ..Default::default()
        });
        let texture_id = self.textures.insert((texture, desc.clone()));
        let view_id = self.views.insert(view);
        self.default_views.insert(texture_id, view_id);
        Ok((texture_id, view_id))
    }

    fn write_texture(&mut self, texture: GpuTextureId, data: &[u8]) {
        let Some((tex, desc)) = self.textures.get(texture) else {
            return;
        };
        let Some(bytes_per_texel) = desc.bytes_per_texel() else {
            log::warn!("Texture `{}` has a compressed format; upload skipped", desc.label);
            return;
        };
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: tex,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_texel * desc.size.width),
                rows_per_image: Some(desc.size.height),
            },
            desc.size,
        );
    }

    fn destroy_texture(&mut self, texture: GpuTextureId) {
        if let Some(view) = self.default_views.remove(&texture) {
            self.views.remove(view);
        }
        if let Some((tex, _)) = self.textures.remove(texture) {
            tex.destroy();
        }
    }

    fn create_sampler(&mut self, desc: &GpuSamplerDesc) -> Result<GpuSamplerId> {
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&desc.label),
            address_mode_u: desc.address_mode_u,
            address_mode_v: desc.address_mode_v,
            address_mode_w: desc.address_mode_w,
            mag_filter: desc.mag_filter,
            min_filter: desc.min_filter,
            mipmap_filter: desc.mipmap_filter,
            lod_min_clamp: desc.lod_min_clamp,
            lod_max_clamp: desc.lod_max_clamp,
            compare: desc.compare,
            anisotropy_clamp: desc.anisotropy_clamp,
            border_color: None,
        });
        Ok(self.samplers.insert(sampler))
    }

    fn destroy_sampler(&mut self, sampler: GpuSamplerId) {
        self.samplers.remove(sampler);
    }

    fn create_shader_module(&mut self, label: &str, wgsl: &str) -> Result<ShaderModuleId> {
        if wgsl.trim().is_empty() {
            return Err(Error::ShaderCompilation {
                label: label.to_string(),
                message: "empty source".to_string(),
            });
        }
        // Validation diagnostics are reported through the device's
        // uncaptured-error handler.
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(wgsl)),
        });
        Ok(self.modules.insert(module))
    }

    fn destroy_shader_module(&mut self, module: ShaderModuleId) {
        self.modules.remove(module);
    }

    fn create_bind_group_layout(&mut self, desc: &GpuBindGroupLayoutDesc) -> Result<BindGroupLayoutId> {
        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&desc.label),
                entries: &desc.entries,
            });
        Ok(self.layouts.insert(layout))
    }

    fn create_bind_group(&mut self, desc: &GpuBindGroupDesc) -> Result<BindGroupId> {
        let layout = self
            .layouts
            .get(desc.layout)
            .ok_or_else(|| Error::Device(format!("bind group `{}` has no layout", desc.label)))?;

        let mut entries = Vec::with_capacity(desc.entries.len());
        for (binding, resource) in &desc.entries {
            let resource = match resource {
                GpuBindingResource::Buffer { buffer, offset, size } => {
                    let buffer = self.buffers.get(*buffer).ok_or_else(|| {
                        Error::Device(format!("bind group `{}`: buffer destroyed", desc.label))
                    })?;
                    wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer,
                        offset: *offset,
                        size: size.and_then(wgpu::BufferSize::new),
                    })
                }
                GpuBindingResource::TextureView(view) => {
                    let view = self.views.get(*view).ok_or_else(|| {
                        Error::Device(format!("bind group `{}`: view destroyed", desc.label))
                    })?;
                    wgpu::BindingResource::TextureView(view)
                }
                GpuBindingResource::Sampler(sampler) => {
                    let sampler = self.samplers.get(*sampler).ok_or_else(|| {
                        Error::Device(format!("bind group `{}`: sampler destroyed", desc.label))
                    })?;
                    wgpu::BindingResource::Sampler(sampler)
                }
            };
            entries.push(wgpu::BindGroupEntry {
                binding: *binding,
                resource,
            });
        }

        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&desc.label),
            layout,
            entries: &entries,
        });
        Ok(self.bind_groups.insert(group))
    }

    fn destroy_bind_group(&mut self, group: BindGroupId) {
        self.bind_groups.remove(group);
    }

    fn create_render_pipeline(&mut self, desc: &GpuRenderPipelineDesc) -> Result<GpuRenderPipelineId> {
        let module = self
            .modules
            .get(desc.module)
            .ok_or_else(|| Error::Device(format!("pipeline `{}`: shader destroyed", desc.label)))?;
        let layouts: Option<Vec<&wgpu::BindGroupLayout>> = desc
            .bind_group_layouts
            .iter()
            .map(|id| self.layouts.get(*id))
            .collect();
        let layouts = layouts
            .ok_or_else(|| Error::Device(format!("pipeline `{}`: layout missing", desc.label)))?;
        let layouts: Vec<Option<&wgpu::BindGroupLayout>> = layouts.into_iter().map(Some).collect();

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&desc.label),
                bind_group_layouts: &layouts,
                immediate_size: 0,
            });

        let vertex_buffers: Vec<_> = desc.vertex_buffers.iter().map(|b| b.as_wgpu()).collect();
        let targets: Vec<_> = desc.color_targets.iter().cloned().map(Some).collect();

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&desc.label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: Some(&desc.vertex_entry),
                    buffers: &vertex_buffers,
                    compilation_options: Default::default(),
                },
                fragment: desc.fragment_entry.as_deref().map(|entry| wgpu::FragmentState {
                    module,
                    entry_point: Some(entry),
                    targets: &targets,
                    compilation_options: Default::default(),
                }),
                primitive: desc.primitive,
                depth_stencil: desc.depth_stencil.clone(),
                multisample: desc.multisample,
                multiview_mask: None,
                cache: None,
            });
        Ok(self.render_pipelines.insert(pipeline))
    }

    fn create_compute_pipeline(&mut self, desc: &GpuComputePipelineDesc) -> Result<GpuComputePipelineId> {
        let module = self
            .modules
            .get(desc.module)
            .ok_or_else(|| Error::Device(format!("pipeline `{}`: shader destroyed", desc.label)))?;
        let layouts: Option<Vec<&wgpu::BindGroupLayout>> = desc
            .bind_group_layouts
            .iter()
            .map(|id| self.layouts.get(*id))
            .collect();
        let layouts = layouts
            .ok_or_else(|| Error::Device(format!("pipeline `{}`: layout missing", desc.label)))?;
        let layouts: Vec<Option<&wgpu::BindGroupLayout>> = layouts.into_iter().map(Some).collect();

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&desc.label),
                bind_group_layouts: &layouts,
                immediate_size: 0,
            });

        let constants: Vec<(&str, f64)> = desc
            .constants
            .iter()
            .map(|(name, value)| (name.as_str(), *value))
            .collect();

        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&desc.label),
                layout: Some(&pipeline_layout),
                module,
                entry_point: Some(&desc.entry_point),
                compilation_options: wgpu::PipelineCompilationOptions {
                    constants: &constants,
                    zero_initialize_workgroup_memory: true,
                },
                cache: None,
            });
        Ok(self.compute_pipelines.insert(pipeline))
    }

    fn destroy_render_pipeline(&mut self, pipeline: GpuRenderPipelineId) {
        self.render_pipelines.remove(pipeline);
    }

    fn destroy_compute_pipeline(&mut self, pipeline: GpuComputePipelineId) {
        self.compute_pipelines.remove(pipeline);
    }

    fn submit(&mut self, encoder: CommandEncoder) {
        let mut gpu_encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(encoder.label()),
            });

        let commands = encoder.into_commands();
        let mut i = 0;
        while i < commands.len() {
            match &commands[i] {
                Command::BeginRenderPass {
                    label,
                    color_attachments,
                    depth_attachment,
                } => {
                    let end = pass_end(&commands, i + 1);
                    self.replay_render_pass(
                        &mut gpu_encoder,
                        label,
                        color_attachments,
                        depth_attachment.as_ref(),
                        &commands[i + 1..end],
                    );
                    i = end + 1;
                }
                Command::BeginComputePass { label } => {
                    let end = pass_end(&commands, i + 1);
                    self.replay_compute_pass(&mut gpu_encoder, label, &commands[i + 1..end]);
                    i = end + 1;
                }
                other => {
                    log::warn!("Command {other:?} recorded outside of a pass");
                    i += 1;
                }
            }
        }

        self.queue.submit(std::iter::once(gpu_encoder.finish()));

        if let Some((frame, view)) = self.current_frame.take() {
            self.views.remove(view);
            frame.present();
        }
    }
}
