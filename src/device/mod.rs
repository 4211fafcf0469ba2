//! Device Capability Provider
//!
//! The scheduler never talks to a graphics API directly. Everything it needs
//! from the GPU goes through the [`GpuDevice`] trait:
//!
//! - object creation (buffers, textures, samplers, shader modules, bind
//!   groups, pipelines)
//! - buffer / texture uploads
//! - swapchain frame acquisition
//! - submission of one recorded [`CommandEncoder`] per frame
//!
//! Device objects are identified by opaque `slotmap` ids. Descriptors are
//! owned, plain-data structs so they can be retained for rebuilding after a
//! device loss and recorded by [`HeadlessDevice`].
//!
//! Two implementations ship with the crate:
//!
//! | Backend | Purpose |
//! |---------|---------|
//! | [`WgpuDevice`] | Real GPU backend built on `wgpu` |
//! | [`HeadlessDevice`] | No-GPU backend that records every call (tests, tooling) |

mod command;
mod headless;
mod wgpu_backend;

pub use command::{Command, CommandEncoder, GpuColorAttachment, GpuDepthAttachment};
pub use headless::{DeviceCall, HeadlessDevice};
pub use wgpu_backend::WgpuDevice;

use slotmap::new_key_type;

use crate::errors::Result;

new_key_type! {
    pub struct GpuBufferId;
    pub struct GpuTextureId;
    pub struct GpuTextureViewId;
    pub struct GpuSamplerId;
    pub struct ShaderModuleId;
    pub struct BindGroupLayoutId;
    pub struct BindGroupId;
    pub struct GpuRenderPipelineId;
    pub struct GpuComputePipelineId;
}

// ============================================================================
// Owned descriptors
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct GpuBufferDesc {
    pub label: String,
    pub size: u64,
    pub usage: wgpu::BufferUsages,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GpuTextureDesc {
    pub label: String,
    pub size: wgpu::Extent3d,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
    pub mip_level_count: u32,
    pub sample_count: u32,
    pub dimension: wgpu::TextureDimension,
    pub view_dimension: wgpu::TextureViewDimension,
}

impl GpuTextureDesc {
    /// Bytes per texel of the base format, when the format has a fixed size.
    #[must_use]
    pub fn bytes_per_texel(&self) -> Option<u32> {
        self.format.block_copy_size(None)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GpuSamplerDesc {
    pub label: String,
    pub address_mode_u: wgpu::AddressMode,
    pub address_mode_v: wgpu::AddressMode,
    pub address_mode_w: wgpu::AddressMode,
    pub mag_filter: wgpu::FilterMode,
    pub min_filter: wgpu::FilterMode,
    pub mipmap_filter: wgpu::MipmapFilterMode,
    pub lod_min_clamp: f32,
    pub lod_max_clamp: f32,
    pub compare: Option<wgpu::CompareFunction>,
    pub anisotropy_clamp: u16,
}

impl Default for GpuSamplerDesc {
    fn default() -> Self {
        Self {
            label: "Sampler".to_string(),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            lod_min_clamp: 0.0,
            lod_max_clamp: 32.0,
            compare: None,
            anisotropy_clamp: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GpuBindGroupLayoutDesc {
    pub label: String,
    pub entries: Vec<wgpu::BindGroupLayoutEntry>,
}

/// Resource bound at one slot of a bind group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuBindingResource {
    Buffer {
        buffer: GpuBufferId,
        offset: u64,
        size: Option<u64>,
    },
    TextureView(GpuTextureViewId),
    Sampler(GpuSamplerId),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GpuBindGroupDesc {
    pub label: String,
    pub layout: BindGroupLayoutId,
    pub entries: Vec<(u32, GpuBindingResource)>,
}

/// Owned counterpart of `wgpu::VertexBufferLayout`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnedVertexBufferLayout {
    pub array_stride: u64,
    pub step_mode: wgpu::VertexStepMode,
    pub attributes: Vec<wgpu::VertexAttribute>,
}

impl OwnedVertexBufferLayout {
    #[must_use]
    pub fn as_wgpu(&self) -> wgpu::VertexBufferLayout<'_> {
        wgpu::VertexBufferLayout {
            array_stride: self.array_stride,
            step_mode: self.step_mode,
            attributes: &self.attributes,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GpuRenderPipelineDesc {
    pub label: String,
    pub bind_group_layouts: Vec<BindGroupLayoutId>,
    pub module: ShaderModuleId,
    pub vertex_entry: String,
    pub fragment_entry: Option<String>,
    pub vertex_buffers: Vec<OwnedVertexBufferLayout>,
    pub color_targets: Vec<wgpu::ColorTargetState>,
    pub depth_stencil: Option<wgpu::DepthStencilState>,
    pub primitive: wgpu::PrimitiveState,
    pub multisample: wgpu::MultisampleState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GpuComputePipelineDesc {
    pub label: String,
    pub bind_group_layouts: Vec<BindGroupLayoutId>,
    pub module: ShaderModuleId,
    pub entry_point: String,
    pub constants: Vec<(String, f64)>,
}

/// The subset of device limits the scheduler consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    pub max_texture_dimension_2d: u32,
    pub max_bind_groups: u32,
    pub max_vertex_buffers: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        let limits = wgpu::Limits::default();
        Self::from(&limits)
    }
}

impl From<&wgpu::Limits> for DeviceLimits {
    fn from(limits: &wgpu::Limits) -> Self {
        Self {
            max_texture_dimension_2d: limits.max_texture_dimension_2d,
            max_bind_groups: limits.max_bind_groups,
            max_vertex_buffers: limits.max_vertex_buffers,
        }
    }
}

/// One acquired swapchain frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceFrame {
    pub view: GpuTextureViewId,
    pub width: u32,
    pub height: u32,
}

// ============================================================================
// Capability trait
// ============================================================================

/// Graphics device capability provider.
///
/// Creation methods return `Err` when the device rejects a descriptor; the
/// scheduler logs the error and leaves the owning object incomplete.
pub trait GpuDevice {
    /// Device limits, queried when clamping the screen size.
    fn limits(&self) -> DeviceLimits;

    /// Color format of the presentation surface.
    fn surface_format(&self) -> wgpu::TextureFormat;

    /// Reconfigures the presentation surface.
    fn configure_surface(&mut self, width: u32, height: u32);

    /// Acquires the next swapchain frame. `None` when no surface exists or the
    /// surface is temporarily unavailable; the frame is presented by the
    /// next [`submit`](Self::submit).
    fn acquire_frame(&mut self) -> Option<SurfaceFrame>;

    fn create_buffer(&mut self, desc: &GpuBufferDesc) -> Result<GpuBufferId>;
    fn write_buffer(&mut self, buffer: GpuBufferId, offset: u64, data: &[u8]);
    fn destroy_buffer(&mut self, buffer: GpuBufferId);

    /// Creates a texture and its default view.
    fn create_texture(&mut self, desc: &GpuTextureDesc) -> Result<(GpuTextureId, GpuTextureViewId)>;
    /// Uploads tightly packed texel data into mip level 0.
    fn write_texture(&mut self, texture: GpuTextureId, data: &[u8]);
    fn destroy_texture(&mut self, texture: GpuTextureId);

    fn create_sampler(&mut self, desc: &GpuSamplerDesc) -> Result<GpuSamplerId>;
    fn destroy_sampler(&mut self, sampler: GpuSamplerId);

    fn create_shader_module(&mut self, label: &str, wgsl: &str) -> Result<ShaderModuleId>;
    fn destroy_shader_module(&mut self, module: ShaderModuleId);

    fn create_bind_group_layout(&mut self, desc: &GpuBindGroupLayoutDesc) -> Result<BindGroupLayoutId>;
    fn create_bind_group(&mut self, desc: &GpuBindGroupDesc) -> Result<BindGroupId>;
    fn destroy_bind_group(&mut self, group: BindGroupId);

    fn create_render_pipeline(&mut self, desc: &GpuRenderPipelineDesc) -> Result<GpuRenderPipelineId>;
    fn create_compute_pipeline(&mut self, desc: &GpuComputePipelineDesc) -> Result<GpuComputePipelineId>;
    fn destroy_render_pipeline(&mut self, pipeline: GpuRenderPipelineId);
    fn destroy_compute_pipeline(&mut self, pipeline: GpuComputePipelineId);

    /// Replays the recorded commands as one submission and presents the
    /// acquired frame, if any.
    fn submit(&mut self, encoder: CommandEncoder);
}

impl<D: GpuDevice + ?Sized> GpuDevice for Box<D> {
    fn limits(&self) -> DeviceLimits {
        (**self).limits()
    }
    fn surface_format(&self) -> wgpu::TextureFormat {
        (**self).surface_format()
    }
    fn configure_surface(&mut self, width: u32, height: u32) {
        (**self).configure_surface(width, height);
    }
    fn acquire_frame(&mut self) -> Option<SurfaceFrame> {
        (**self).acquire_frame()
    }
    fn create_buffer(&mut self, desc: &GpuBufferDesc) -> Result<GpuBufferId> {
        (**self).create_buffer(desc)
    }
    fn write_buffer(&mut self, buffer: GpuBufferId, offset: u64, data: &[u8]) {
        (**self).write_buffer(buffer, offset, data);
    }
    fn destroy_buffer(&mut self, buffer: GpuBufferId) {
        (**self).destroy_buffer(buffer);
    }
    fn create_texture(&mut self, desc: &GpuTextureDesc) -> Result<(GpuTextureId, GpuTextureViewId)> {
        (**self).create_texture(desc)
    }
    fn write_texture(&mut self, texture: GpuTextureId, data: &[u8]) {
        (**self).write_texture(texture, data);
    }
    fn destroy_texture(&mut self, texture: GpuTextureId) {
        (**self).destroy_texture(texture);
    }
    fn create_sampler(&mut self, desc: &GpuSamplerDesc) -> Result<GpuSamplerId> {
        (**self).create_sampler(desc)
    }
    fn destroy_sampler(&mut self, sampler: GpuSamplerId) {
        (**self).destroy_sampler(sampler);
    }
    fn create_shader_module(&mut self, label: &str, wgsl: &str) -> Result<ShaderModuleId> {
        (**self).create_shader_module(label, wgsl)
    }
    fn destroy_shader_module(&mut self, module: ShaderModuleId) {
        (**self).destroy_shader_module(module);
    }
    fn create_bind_group_layout(&mut self, desc: &GpuBindGroupLayoutDesc) -> Result<BindGroupLayoutId> {
        (**self).create_bind_group_layout(desc)
    }
    fn create_bind_group(&mut self, desc: &GpuBindGroupDesc) -> Result<BindGroupId> {
        (**self).create_bind_group(desc)
    }
    fn destroy_bind_group(&mut self, group: BindGroupId) {
        (**self).destroy_bind_group(group);
    }
    fn create_render_pipeline(&mut self, desc: &GpuRenderPipelineDesc) -> Result<GpuRenderPipelineId> {
        (**self).create_render_pipeline(desc)
    }
    fn create_compute_pipeline(&mut self, desc: &GpuComputePipelineDesc) -> Result<GpuComputePipelineId> {
        (**self).create_compute_pipeline(desc)
    }
    fn destroy_render_pipeline(&mut self, pipeline: GpuRenderPipelineId) {
        (**self).destroy_render_pipeline(pipeline);
    }
    fn destroy_compute_pipeline(&mut self, pipeline: GpuComputePipelineId) {
        (**self).destroy_compute_pipeline(pipeline);
    }
    fn submit(&mut self, encoder: CommandEncoder) {
        (**self).submit(encoder);
    }
}
