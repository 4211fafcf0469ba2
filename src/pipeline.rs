//! Pipelines
//!
//! A pipeline pairs one [`Shader`] with fixed-function state. The device
//! pipeline object also depends on things the pipeline does not own: the
//! bind-group and vertex layouts of the binding it draws, and (for render
//! pipelines) the formats of the pass attachments. Device pipelines are
//! therefore built lazily and cached per variant:
//!
//! ```text
//! RenderPipeline ──► variants: (layout signature, RenderTargets) → GpuRenderPipelineId
//! ComputePipeline ─► variants: layout signature                  → GpuComputePipelineId
//! ```
//!
//! A new shader generation (recompiled source) or a change of attachment
//! formats drops the cached variants; the shader itself is not recompiled
//! for a format change.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::binding::BindingLayout;
use crate::device::{
    GpuComputePipelineDesc, GpuComputePipelineId, GpuDevice, GpuRenderPipelineDesc,
    GpuRenderPipelineId,
};
use crate::handles::ShaderHandle;
use crate::resources::Shader;

// ============================================================================
// Descriptors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub write_enabled: bool,
    pub compare: wgpu::CompareFunction,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            write_enabled: true,
            compare: wgpu::CompareFunction::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPipelineDescriptor {
    pub label: String,
    pub shader: ShaderHandle,
    pub vertex_entry: String,
    /// `None` builds a depth-only pipeline.
    pub fragment_entry: Option<String>,
    pub blend: Option<wgpu::BlendState>,
    pub depth: Option<DepthState>,
    pub topology: wgpu::PrimitiveTopology,
    pub cull_mode: Option<wgpu::Face>,
    pub front_face: wgpu::FrontFace,
    pub sample_count: u32,
}

impl RenderPipelineDescriptor {
    #[must_use]
    pub fn new(label: &str, shader: ShaderHandle) -> Self {
        Self {
            label: label.to_string(),
            shader,
            vertex_entry: "vs_main".to_string(),
            fragment_entry: Some("fs_main".to_string()),
            blend: Some(wgpu::BlendState::REPLACE),
            depth: None,
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            front_face: wgpu::FrontFace::Ccw,
            sample_count: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComputePipelineDescriptor {
    pub label: String,
    pub shader: ShaderHandle,
    pub entry_point: String,
    /// Pipeline-overridable constants substituted at pipeline creation.
    pub constants: Vec<(String, f64)>,
}

impl ComputePipelineDescriptor {
    #[must_use]
    pub fn new(label: &str, shader: ShaderHandle, entry_point: &str) -> Self {
        Self {
            label: label.to_string(),
            shader,
            entry_point: entry_point.to_string(),
            constants: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_constant(mut self, name: &str, value: f64) -> Self {
        self.constants.push((name.to_string(), value));
        self
    }
}

/// Attachment formats a render pipeline variant is built for. Supplied by
/// the pass the pipeline is drawn in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderTargets {
    pub colors: SmallVec<[wgpu::TextureFormat; 4]>,
    pub depth: Option<wgpu::TextureFormat>,
    pub sample_count: u32,
}

// ============================================================================
// Pipeline objects
// ============================================================================

type RenderKey = (u64, RenderTargets);

#[derive(Debug)]
pub struct RenderPipeline {
    desc: RenderPipelineDescriptor,
    variants: FxHashMap<RenderKey, GpuRenderPipelineId>,
    rejected: FxHashSet<RenderKey>,
    shader_generation: u64,
}

#[derive(Debug)]
pub struct ComputePipeline {
    desc: ComputePipelineDescriptor,
    variants: FxHashMap<u64, GpuComputePipelineId>,
    rejected: FxHashSet<u64>,
    shader_generation: u64,
}

/// Render or compute pipeline owned by the director.
#[derive(Debug)]
pub enum Pipeline {
    Render(RenderPipeline),
    Compute(ComputePipeline),
}

impl Pipeline {
    pub(crate) fn render(desc: RenderPipelineDescriptor) -> Self {
        Self::Render(RenderPipeline {
            desc,
            variants: FxHashMap::default(),
            rejected: FxHashSet::default(),
            shader_generation: 0,
        })
    }

    pub(crate) fn compute(desc: ComputePipelineDescriptor) -> Self {
        Self::Compute(ComputePipeline {
            desc,
            variants: FxHashMap::default(),
            rejected: FxHashSet::default(),
            shader_generation: 0,
        })
    }

    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Render(p) => &p.desc.label,
            Self::Compute(p) => &p.desc.label,
        }
    }

    #[must_use]
    pub fn shader(&self) -> ShaderHandle {
        match self {
            Self::Render(p) => p.desc.shader,
            Self::Compute(p) => p.desc.shader,
        }
    }

    #[must_use]
    pub fn is_compute(&self) -> bool {
        matches!(self, Self::Compute(_))
    }

    /// Number of cached device pipelines.
    #[must_use]
    pub fn variant_count(&self) -> usize {
        match self {
            Self::Render(p) => p.variants.len(),
            Self::Compute(p) => p.variants.len(),
        }
    }

    /// Drops variants built from an older shader generation.
    pub(crate) fn sync_shader<D: GpuDevice + ?Sized>(&mut self, device: &mut D, shader: &Shader) {
        let (generation, label) = match self {
            Self::Render(p) => (&mut p.shader_generation, &p.desc.label),
            Self::Compute(p) => (&mut p.shader_generation, &p.desc.label),
        };
        if *generation == shader.generation() {
            return;
        }
        log::debug!(
            "Pipeline `{label}` follows shader `{}` to generation {}",
            shader.label(),
            shader.generation()
        );
        *generation = shader.generation();
        self.invalidate(device);
    }

    /// Destroys every cached variant. They are rebuilt on demand.
    pub fn invalidate<D: GpuDevice + ?Sized>(&mut self, device: &mut D) {
        match self {
            Self::Render(p) => {
                for (_, id) in p.variants.drain() {
                    device.destroy_render_pipeline(id);
                }
                p.rejected.clear();
            }
            Self::Compute(p) => {
                for (_, id) in p.variants.drain() {
                    device.destroy_compute_pipeline(id);
                }
                p.rejected.clear();
            }
        }
    }

    pub(crate) fn reset_device(&mut self) {
        match self {
            Self::Render(p) => {
                p.variants.clear();
                p.rejected.clear();
                p.shader_generation = 0;
            }
            Self::Compute(p) => {
                p.variants.clear();
                p.rejected.clear();
                p.shader_generation = 0;
            }
        }
    }

    pub fn destroy<D: GpuDevice + ?Sized>(&mut self, device: &mut D) {
        self.invalidate(device);
    }
}

/// A variant lookup result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Resolved<Id> {
    pub id: Id,
    pub created: bool,
}

impl RenderPipeline {
    #[must_use]
    pub fn descriptor(&self) -> &RenderPipelineDescriptor {
        &self.desc
    }

    /// Returns the device pipeline for this layout and target combination,
    /// building it on first use. `None` while the shader is not compiled or
    /// after the device rejected the variant.
    pub(crate) fn resolve<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        shader: &Shader,
        layout: BindingLayout<'_>,
        targets: &RenderTargets,
    ) -> Option<Resolved<GpuRenderPipelineId>> {
        let module = shader.module()?;
        let key = (layout.signature, targets.clone());
        if let Some(&id) = self.variants.get(&key) {
            return Some(Resolved { id, created: false });
        }
        if self.rejected.contains(&key) {
            return None;
        }

        let depth_stencil = targets.depth.map(|format| {
            let state = self.desc.depth.unwrap_or(DepthState {
                write_enabled: false,
                compare: wgpu::CompareFunction::Always,
            });
            wgpu::DepthStencilState {
                format,
                depth_write_enabled: Some(state.write_enabled),
                depth_compare: Some(state.compare),
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }
        });
        if self.desc.depth.is_some() && targets.depth.is_none() {
            log::warn!(
                "Pipeline `{}` declares a depth test but its pass has no depth attachment",
                self.desc.label
            );
        }

        let color_targets = targets
            .colors
            .iter()
            .map(|&format| wgpu::ColorTargetState {
                format,
                blend: self.desc.blend,
                write_mask: wgpu::ColorWrites::ALL,
            })
            .collect();

        let desc = GpuRenderPipelineDesc {
            label: self.desc.label.clone(),
            bind_group_layouts: layout.group_layouts.to_vec(),
            module,
            vertex_entry: self.desc.vertex_entry.clone(),
            fragment_entry: self.desc.fragment_entry.clone(),
            vertex_buffers: layout.vertex_layouts.to_vec(),
            color_targets,
            depth_stencil,
            primitive: wgpu::PrimitiveState {
                topology: self.desc.topology,
                cull_mode: self.desc.cull_mode,
                front_face: self.desc.front_face,
                ..Default::default()
            },
            multisample: wgpu::MultisampleState {
                count: targets.sample_count.max(self.desc.sample_count),
                ..Default::default()
            },
        };

        match device.create_render_pipeline(&desc) {
            Ok(id) => {
                log::debug!(
                    "Created render pipeline `{}` variant #{} ({:?})",
                    self.desc.label,
                    self.variants.len() + 1,
                    targets.colors
                );
                self.variants.insert(key, id);
                Some(Resolved { id, created: true })
            }
            Err(err) => {
                log::error!("Render pipeline `{}` rejected: {err}", self.desc.label);
                self.rejected.insert(key);
                None
            }
        }
    }
}

impl ComputePipeline {
    #[must_use]
    pub fn descriptor(&self) -> &ComputePipelineDescriptor {
        &self.desc
    }

    pub(crate) fn resolve<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        shader: &Shader,
        layout: BindingLayout<'_>,
    ) -> Option<Resolved<GpuComputePipelineId>> {
        let module = shader.module()?;
        if let Some(&id) = self.variants.get(&layout.signature) {
            return Some(Resolved { id, created: false });
        }
        if self.rejected.contains(&layout.signature) {
            return None;
        }
        let desc = GpuComputePipelineDesc {
            label: self.desc.label.clone(),
            bind_group_layouts: layout.group_layouts.to_vec(),
            module,
            entry_point: self.desc.entry_point.clone(),
            constants: self.desc.constants.clone(),
        };
        match device.create_compute_pipeline(&desc) {
            Ok(id) => {
                log::debug!("Created compute pipeline `{}`", self.desc.label);
                self.variants.insert(layout.signature, id);
                Some(Resolved { id, created: true })
            }
            Err(err) => {
                log::error!("Compute pipeline `{}` rejected: {err}", self.desc.label);
                self.rejected.insert(layout.signature);
                None
            }
        }
    }
}
