//! Bindings
//!
//! A [`Binding`] gathers everything one draw or dispatch reads: vertex and
//! index buffers, an optional indirect buffer, uniform and storage buffers,
//! textures and samplers. It derives bind-group layouts from those entries
//! and builds bind groups once its pipeline's shader is compiled and every
//! resource has a device object.
//!
//! # Completion
//!
//! [`Binding::try_make_complete`] is called by the owning pass every tick.
//! Bind groups are rebuilt only when the set of bound device objects changed
//! (a texture was recreated by a resize, a buffer grew), so repeated calls are
//! cheap.
//!
//! # Draw ranges
//!
//! The range function is evaluated fresh every frame and interpreted by
//! [`DrawRange`]:
//!
//! | Pass | Values | Defaults |
//! |------|--------|----------|
//! | Render | `[count, instances, first, first_instance]` | `instances = 1`, rest `0` |
//! | Compute | `[x, y, z]` | `y = z = 1` |

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use smallvec::SmallVec;

use crate::device::{
    BindGroupId, BindGroupLayoutId, GpuBindGroupDesc, GpuBindGroupLayoutDesc, GpuBindingResource,
    GpuBufferId, GpuDevice, OwnedVertexBufferLayout,
};
use crate::errors::{Error, Result};
use crate::handles::{BufferHandle, PipelineHandle, SamplerHandle, TextureHandle};
use crate::resources::{BufferKind, ResourceTables, Shader};

/// Produces the draw / dispatch range for the current frame.
pub type RangeFn = Arc<dyn Fn() -> SmallVec<[u32; 4]> + Send + Sync>;

// ============================================================================
// Entries
// ============================================================================

/// Uniform or storage buffer bound at `(group, binding)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferEntry {
    pub group: u32,
    pub binding: u32,
    pub visibility: wgpu::ShaderStages,
    pub buffer: BufferHandle,
}

impl BufferEntry {
    #[must_use]
    pub fn new(binding: u32, buffer: BufferHandle) -> Self {
        Self {
            group: 0,
            binding,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            buffer,
        }
    }

    #[must_use]
    pub fn in_group(mut self, group: u32) -> Self {
        self.group = group;
        self
    }

    #[must_use]
    pub fn visible_to(mut self, visibility: wgpu::ShaderStages) -> Self {
        self.visibility = visibility;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureEntry {
    pub group: u32,
    pub binding: u32,
    pub visibility: wgpu::ShaderStages,
    pub texture: TextureHandle,
    /// Derived from the texture format when `None`.
    pub sample_type: Option<wgpu::TextureSampleType>,
}

impl TextureEntry {
    #[must_use]
    pub fn new(binding: u32, texture: TextureHandle) -> Self {
        Self {
            group: 0,
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            texture,
            sample_type: None,
        }
    }

    #[must_use]
    pub fn in_group(mut self, group: u32) -> Self {
        self.group = group;
        self
    }

    #[must_use]
    pub fn visible_to(mut self, visibility: wgpu::ShaderStages) -> Self {
        self.visibility = visibility;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerEntry {
    pub group: u32,
    pub binding: u32,
    pub visibility: wgpu::ShaderStages,
    pub sampler: SamplerHandle,
}

impl SamplerEntry {
    #[must_use]
    pub fn new(binding: u32, sampler: SamplerHandle) -> Self {
        Self {
            group: 0,
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            sampler,
        }
    }

    #[must_use]
    pub fn in_group(mut self, group: u32) -> Self {
        self.group = group;
        self
    }
}

/// Category of a bind-group entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    Uniform,
    Storage,
    Texture,
    Sampler,
}

#[derive(Clone)]
pub struct BindingDescriptor {
    pub label: String,
    pub range: RangeFn,
    /// Bound to vertex buffer slots in order.
    pub vertex_buffers: Vec<BufferHandle>,
    pub index_buffer: Option<BufferHandle>,
    /// Draw / dispatch arguments read from a buffer instead of `range`.
    pub indirect_buffer: Option<BufferHandle>,
    pub uniforms: Vec<BufferEntry>,
    pub storages: Vec<BufferEntry>,
    pub textures: Vec<TextureEntry>,
    pub samplers: Vec<SamplerEntry>,
}

impl BindingDescriptor {
    pub fn new(label: &str, range: impl Fn() -> SmallVec<[u32; 4]> + Send + Sync + 'static) -> Self {
        Self {
            label: label.to_string(),
            range: Arc::new(range),
            vertex_buffers: Vec::new(),
            index_buffer: None,
            indirect_buffer: None,
            uniforms: Vec::new(),
            storages: Vec::new(),
            textures: Vec::new(),
            samplers: Vec::new(),
        }
    }

    /// Binding whose range never changes.
    #[must_use]
    pub fn with_fixed_range(label: &str, range: &[u32]) -> Self {
        let range: SmallVec<[u32; 4]> = SmallVec::from_slice(range);
        Self::new(label, move || range.clone())
    }

    #[must_use]
    pub fn vertex_buffer(mut self, buffer: BufferHandle) -> Self {
        self.vertex_buffers.push(buffer);
        self
    }

    #[must_use]
    pub fn index_buffer(mut self, buffer: BufferHandle) -> Self {
        self.index_buffer = Some(buffer);
        self
    }

    #[must_use]
    pub fn indirect_buffer(mut self, buffer: BufferHandle) -> Self {
        self.indirect_buffer = Some(buffer);
        self
    }

    #[must_use]
    pub fn uniform(mut self, entry: BufferEntry) -> Self {
        self.uniforms.push(entry);
        self
    }

    #[must_use]
    pub fn storage(mut self, entry: BufferEntry) -> Self {
        self.storages.push(entry);
        self
    }

    #[must_use]
    pub fn texture(mut self, entry: TextureEntry) -> Self {
        self.textures.push(entry);
        self
    }

    #[must_use]
    pub fn sampler(mut self, entry: SamplerEntry) -> Self {
        self.samplers.push(entry);
        self
    }
}

impl std::fmt::Debug for BindingDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingDescriptor")
            .field("label", &self.label)
            .field("vertex_buffers", &self.vertex_buffers)
            .field("index_buffer", &self.index_buffer)
            .field("uniforms", &self.uniforms)
            .field("storages", &self.storages)
            .field("textures", &self.textures)
            .field("samplers", &self.samplers)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Draw ranges
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawRange {
    Draw {
        count: u32,
        instances: u32,
        first: u32,
        first_instance: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
}

impl DrawRange {
    /// Interprets 1–4 values as a draw. `None` for any other length.
    #[must_use]
    pub fn render(values: &[u32]) -> Option<Self> {
        if values.is_empty() || values.len() > 4 {
            return None;
        }
        let at = |i: usize, default: u32| values.get(i).copied().unwrap_or(default);
        Some(Self::Draw {
            count: values[0],
            instances: at(1, 1),
            first: at(2, 0),
            first_instance: at(3, 0),
        })
    }

    /// Interprets 1–3 values as workgroup counts.
    #[must_use]
    pub fn compute(values: &[u32]) -> Option<Self> {
        if values.is_empty() || values.len() > 3 {
            return None;
        }
        let at = |i: usize| values.get(i).copied().unwrap_or(1);
        Some(Self::Dispatch {
            x: values[0],
            y: at(1),
            z: at(2),
        })
    }
}

// ============================================================================
// Binding
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LayoutEntry {
    kind: BindingKind,
    group: u32,
    entry: wgpu::BindGroupLayoutEntry,
}

/// Device-side layout shape consumed by pipelines.
#[derive(Debug, Clone, Copy)]
pub struct BindingLayout<'a> {
    pub signature: u64,
    pub group_layouts: &'a [BindGroupLayoutId],
    pub vertex_layouts: &'a [OwnedVertexBufferLayout],
}

pub struct Binding {
    label: String,
    range: RangeFn,
    vertex_buffers: Vec<BufferHandle>,
    index_buffer: Option<(BufferHandle, wgpu::IndexFormat)>,
    indirect_buffer: Option<BufferHandle>,
    uniforms: Vec<BufferEntry>,
    storages: Vec<BufferEntry>,
    textures: Vec<TextureEntry>,
    samplers: Vec<SamplerEntry>,

    layout_entries: Vec<LayoutEntry>,
    vertex_layouts: Vec<OwnedVertexBufferLayout>,
    vertex_locations: FxHashSet<u32>,
    signature: u64,

    pipeline: Option<PipelineHandle>,
    group_layouts: Vec<BindGroupLayoutId>,
    bind_groups: Vec<BindGroupId>,
    bound: Vec<(u32, u32, GpuBindingResource)>,
    complete: bool,
    missing_inputs_reported: bool,
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("label", &self.label)
            .field("pipeline", &self.pipeline)
            .field("complete", &self.complete)
            .field("bind_groups", &self.bind_groups.len())
            .finish_non_exhaustive()
    }
}

impl Binding {
    pub(crate) fn new(desc: BindingDescriptor, res: &ResourceTables<'_>) -> Result<Self> {
        if desc.label.is_empty() {
            return Err(Error::MissingField {
                context: "binding description".to_string(),
                field: "label",
            });
        }
        let label = desc.label;

        let buffer_kind = |handle: BufferHandle| {
            res.buffers
                .get(handle)
                .map(|b| (b.label().to_string(), b.kind().clone()))
                .ok_or(Error::UnknownHandle("buffer"))
        };
        let incompatible = |label: String, expected: &'static str| Error::IncompatibleBuffer { label, expected };

        // Vertex inputs
        let mut vertex_layouts = Vec::with_capacity(desc.vertex_buffers.len());
        let mut vertex_locations = FxHashSet::default();
        for &handle in &desc.vertex_buffers {
            let (name, kind) = buffer_kind(handle)?;
            let layout = kind
                .vertex_layout()
                .ok_or_else(|| incompatible(name, "vertex buffer"))?;
            for attribute in &layout.attributes {
                if !vertex_locations.insert(attribute.shader_location) {
                    return Err(Error::DuplicateLocation {
                        label,
                        location: attribute.shader_location,
                    });
                }
            }
            vertex_layouts.push(layout);
        }

        let index_buffer = match desc.index_buffer {
            Some(handle) => {
                let (name, kind) = buffer_kind(handle)?;
                let format = kind
                    .index_format()
                    .ok_or_else(|| incompatible(name, "index buffer"))?;
                Some((handle, format))
            }
            None => None,
        };

        if let Some(handle) = desc.indirect_buffer {
            let (name, kind) = buffer_kind(handle)?;
            if kind != BufferKind::Indirect {
                return Err(incompatible(name, "indirect buffer"));
            }
        }

        // Bind group layout entries
        let mut slots = FxHashSet::default();
        let mut claim = |group: u32, binding: u32| {
            if slots.insert((group, binding)) {
                Ok(())
            } else {
                Err(Error::DuplicateBinding {
                    label: label.clone(),
                    group,
                    binding,
                })
            }
        };
        let mut layout_entries = Vec::new();

        for entry in &desc.uniforms {
            let (name, kind) = buffer_kind(entry.buffer)?;
            if kind != BufferKind::Uniform {
                return Err(incompatible(name, "uniform buffer"));
            }
            claim(entry.group, entry.binding)?;
            layout_entries.push(LayoutEntry {
                kind: BindingKind::Uniform,
                group: entry.group,
                entry: buffer_layout_entry(entry, wgpu::BufferBindingType::Uniform),
            });
        }

        for entry in &desc.storages {
            let (name, kind) = buffer_kind(entry.buffer)?;
            let BufferKind::Storage { read_only } = kind else {
                return Err(incompatible(name, "storage buffer"));
            };
            claim(entry.group, entry.binding)?;
            layout_entries.push(LayoutEntry {
                kind: BindingKind::Storage,
                group: entry.group,
                entry: buffer_layout_entry(entry, wgpu::BufferBindingType::Storage { read_only }),
            });
        }

        for entry in &desc.textures {
            let texture = res
                .textures
                .get(entry.texture)
                .ok_or(Error::UnknownHandle("texture"))?;
            claim(entry.group, entry.binding)?;
            let sample_type = entry.sample_type.unwrap_or_else(|| {
                texture
                    .format()
                    .sample_type(None, None)
                    .unwrap_or(wgpu::TextureSampleType::Float { filterable: true })
            });
            layout_entries.push(LayoutEntry {
                kind: BindingKind::Texture,
                group: entry.group,
                entry: wgpu::BindGroupLayoutEntry {
                    binding: entry.binding,
                    visibility: entry.visibility,
                    ty: wgpu::BindingType::Texture {
                        sample_type,
                        view_dimension: texture.view_dimension(),
                        multisampled: texture.sample_count() > 1,
                    },
                    count: None,
                },
            });
        }

        for entry in &desc.samplers {
            let sampler = res
                .samplers
                .get(entry.sampler)
                .ok_or(Error::UnknownHandle("sampler"))?;
            claim(entry.group, entry.binding)?;
            layout_entries.push(LayoutEntry {
                kind: BindingKind::Sampler,
                group: entry.group,
                entry: wgpu::BindGroupLayoutEntry {
                    binding: entry.binding,
                    visibility: entry.visibility,
                    ty: wgpu::BindingType::Sampler(sampler.descriptor().binding_type()),
                    count: None,
                },
            });
        }

        layout_entries.sort_by_key(|e| (e.group, e.entry.binding));
        let signature = fx_hash(&(&layout_entries, &vertex_layouts));

        Ok(Self {
            label,
            range: desc.range,
            vertex_buffers: desc.vertex_buffers,
            index_buffer,
            indirect_buffer: desc.indirect_buffer,
            uniforms: desc.uniforms,
            storages: desc.storages,
            textures: desc.textures,
            samplers: desc.samplers,
            layout_entries,
            vertex_layouts,
            vertex_locations,
            signature,
            pipeline: None,
            group_layouts: Vec::new(),
            bind_groups: Vec::new(),
            bound: Vec::new(),
            complete: false,
            missing_inputs_reported: false,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    #[must_use]
    pub fn pipeline(&self) -> Option<PipelineHandle> {
        self.pipeline
    }

    /// Associates the binding with the pipeline it is drawn with. Returns
    /// `false` when it was already associated with a different one.
    pub(crate) fn associate(&mut self, pipeline: PipelineHandle) -> bool {
        match self.pipeline {
            Some(current) if current != pipeline => false,
            _ => {
                self.pipeline = Some(pipeline);
                true
            }
        }
    }

    /// Layout entries of one category, sorted by `(group, binding)`.
    #[must_use]
    pub fn export_layout_descriptor(&self, kind: BindingKind) -> Vec<wgpu::BindGroupLayoutEntry> {
        self.layout_entries
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.entry)
            .collect()
    }

    /// Hash of the bind-group and vertex layout shape.
    #[must_use]
    pub fn layout_signature(&self) -> u64 {
        self.signature
    }

    /// Layout handed to pipelines. Empty group layouts before completion.
    #[must_use]
    pub fn layout(&self) -> BindingLayout<'_> {
        BindingLayout {
            signature: self.signature,
            group_layouts: &self.group_layouts,
            vertex_layouts: &self.vertex_layouts,
        }
    }

    #[must_use]
    pub fn vertex_layouts(&self) -> &[OwnedVertexBufferLayout] {
        &self.vertex_layouts
    }

    #[must_use]
    pub fn bind_group_layouts(&self) -> &[BindGroupLayoutId] {
        &self.group_layouts
    }

    #[must_use]
    pub fn bind_groups(&self) -> &[BindGroupId] {
        &self.bind_groups
    }

    #[must_use]
    pub fn vertex_buffers(&self) -> &[BufferHandle] {
        &self.vertex_buffers
    }

    #[must_use]
    pub fn index_buffer(&self) -> Option<(BufferHandle, wgpu::IndexFormat)> {
        self.index_buffer
    }

    #[must_use]
    pub fn indirect_buffer(&self) -> Option<BufferHandle> {
        self.indirect_buffer
    }

    /// Evaluates the range function for this frame.
    #[must_use]
    pub fn evaluate_range(&self) -> SmallVec<[u32; 4]> {
        (self.range)()
    }

    /// Every buffer this binding reads.
    pub fn buffers(&self) -> impl Iterator<Item = BufferHandle> + '_ {
        self.vertex_buffers
            .iter()
            .copied()
            .chain(self.index_buffer.map(|(h, _)| h))
            .chain(self.indirect_buffer)
            .chain(self.uniforms.iter().map(|e| e.buffer))
            .chain(self.storages.iter().map(|e| e.buffer))
    }

    #[must_use]
    pub fn references_texture(&self, texture: TextureHandle) -> bool {
        self.textures.iter().any(|e| e.texture == texture)
    }

    // ========================================================================
    // Per-frame work
    // ========================================================================

    /// Re-evaluates dynamic uniform fields into their blocks. `seen` holds
    /// reference ids already updated this frame. Returns the number of
    /// blocks updated.
    pub(crate) fn update(&self, res: &ResourceTables<'_>, seen: &mut FxHashSet<u64>) -> usize {
        let mut updated = 0;
        for entry in self.uniforms.iter().chain(&self.storages) {
            let Some(buffer) = res.buffers.get(entry.buffer) else {
                continue;
            };
            for block in buffer.dynamic_blocks() {
                if !seen.insert(block.array().id()) {
                    continue;
                }
                match block.update() {
                    Ok(()) => updated += 1,
                    Err(err) => log::warn!("Binding `{}`: {err}", self.label),
                }
            }
        }
        updated
    }

    /// Builds bind-group layouts and bind groups once the shader is compiled
    /// and every resource is realized. Rebuilds bind groups only when the
    /// bound device objects changed. Returns the completeness flag.
    pub(crate) fn try_make_complete<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        res: &ResourceTables<'_>,
        shader: Option<&Shader>,
    ) -> bool {
        let Some(shader) = shader.filter(|s| s.is_complete()) else {
            log::trace!("Binding `{}` waits for its shader", self.label);
            return false;
        };

        if let Some(inputs) = shader.vertex_inputs() {
            let missing: Vec<u32> = inputs
                .iter()
                .copied()
                .filter(|loc| !self.vertex_locations.contains(loc))
                .collect();
            if !missing.is_empty() {
                if !self.missing_inputs_reported {
                    log::warn!(
                        "Binding `{}` does not supply vertex locations {missing:?} read by shader `{}`",
                        self.label,
                        shader.label()
                    );
                    self.missing_inputs_reported = true;
                }
                self.complete = false;
                return false;
            }
        }

        if !self.vertex_resources_ready(res) {
            self.complete = false;
            return false;
        }
        let Some(bound) = self.collect_bound(res) else {
            log::trace!("Binding `{}` waits for resources", self.label);
            self.complete = false;
            return false;
        };

        if self.group_layouts.is_empty()
            && let Err(err) = self.create_group_layouts(device)
        {
            log::error!("Binding `{}`: bind group layout rejected: {err}", self.label);
            return false;
        }

        if bound != self.bound || self.bind_groups.len() != self.group_layouts.len() {
            if let Err(err) = self.create_bind_groups(device, &bound) {
                log::error!("Binding `{}`: bind group rejected: {err}", self.label);
                self.complete = false;
                return false;
            }
            self.bound = bound;
        }

        if !self.complete {
            log::debug!("Binding `{}` is complete", self.label);
        }
        self.complete = true;
        true
    }

    fn vertex_resources_ready(&self, res: &ResourceTables<'_>) -> bool {
        let realized = |h: BufferHandle| res.buffers.get(h).is_some_and(|b| b.is_realized());
        self.vertex_buffers.iter().all(|&h| realized(h))
            && self.index_buffer.is_none_or(|(h, _)| realized(h))
            && self.indirect_buffer.is_none_or(realized)
    }

    fn collect_bound(&self, res: &ResourceTables<'_>) -> Option<Vec<(u32, u32, GpuBindingResource)>> {
        let buffer_id = |h: BufferHandle| -> Option<GpuBufferId> { res.buffers.get(h)?.gpu_id() };

        let mut bound = Vec::with_capacity(self.layout_entries.len());
        for entry in self.uniforms.iter().chain(&self.storages) {
            let buffer = buffer_id(entry.buffer)?;
            bound.push((
                entry.group,
                entry.binding,
                GpuBindingResource::Buffer {
                    buffer,
                    offset: 0,
                    size: None,
                },
            ));
        }
        for entry in &self.textures {
            let texture = res.textures.get(entry.texture).filter(|t| t.is_complete())?;
            bound.push((entry.group, entry.binding, GpuBindingResource::TextureView(texture.view()?)));
        }
        for entry in &self.samplers {
            let sampler = res.samplers.get(entry.sampler)?.gpu_id()?;
            bound.push((entry.group, entry.binding, GpuBindingResource::Sampler(sampler)));
        }
        bound.sort_by_key(|(group, binding, _)| (*group, *binding));
        Some(bound)
    }

    fn group_count(&self) -> u32 {
        self.layout_entries.iter().map(|e| e.group + 1).max().unwrap_or(0)
    }

    fn create_group_layouts<D: GpuDevice + ?Sized>(&mut self, device: &mut D) -> Result<()> {
        let mut layouts = Vec::new();
        for group in 0..self.group_count() {
            let entries = self
                .layout_entries
                .iter()
                .filter(|e| e.group == group)
                .map(|e| e.entry)
                .collect();
            layouts.push(device.create_bind_group_layout(&GpuBindGroupLayoutDesc {
                label: format!("{} / group {group}", self.label),
                entries,
            })?);
        }
        self.group_layouts = layouts;
        Ok(())
    }

    fn create_bind_groups<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        bound: &[(u32, u32, GpuBindingResource)],
    ) -> Result<()> {
        let mut per_group: FxHashMap<u32, Vec<(u32, GpuBindingResource)>> = FxHashMap::default();
        for &(group, binding, resource) in bound {
            per_group.entry(group).or_default().push((binding, resource));
        }

        let mut groups = Vec::with_capacity(self.group_layouts.len());
        for (group, &layout) in self.group_layouts.iter().enumerate() {
            let entries = per_group.remove(&(group as u32)).unwrap_or_default();
            match device.create_bind_group(&GpuBindGroupDesc {
                label: format!("{} / group {group}", self.label),
                layout,
                entries,
            }) {
                Ok(id) => groups.push(id),
                Err(err) => {
                    for id in groups {
                        device.destroy_bind_group(id);
                    }
                    return Err(err);
                }
            }
        }

        for old in std::mem::replace(&mut self.bind_groups, groups) {
            device.destroy_bind_group(old);
        }
        log::debug!("Binding `{}` built {} bind group(s)", self.label, self.bind_groups.len());
        Ok(())
    }

    /// Forgets device objects after device loss.
    pub(crate) fn reset_device(&mut self) {
        self.group_layouts.clear();
        self.bind_groups.clear();
        self.bound.clear();
        self.complete = false;
    }

    pub fn destroy<D: GpuDevice + ?Sized>(&mut self, device: &mut D) {
        for id in self.bind_groups.drain(..) {
            device.destroy_bind_group(id);
        }
        self.group_layouts.clear();
        self.bound.clear();
        self.complete = false;
    }
}

fn buffer_layout_entry(entry: &BufferEntry, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding: entry.binding,
        visibility: entry.visibility,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn fx_hash<K: std::hash::Hash>(key: &K) -> u64 {
    use std::hash::Hasher;
    let mut hasher = FxHasher::default();
    key.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_range_defaults() {
        assert_eq!(
            DrawRange::render(&[3]),
            Some(DrawRange::Draw {
                count: 3,
                instances: 1,
                first: 0,
                first_instance: 0
            })
        );
        assert_eq!(DrawRange::render(&[]), None);
        assert_eq!(DrawRange::render(&[1, 2, 3, 4, 5]), None);
    }

    #[test]
    fn compute_range_defaults() {
        assert_eq!(
            DrawRange::compute(&[8, 4]),
            Some(DrawRange::Dispatch { x: 8, y: 4, z: 1 })
        );
        assert_eq!(DrawRange::compute(&[1, 1, 1, 1]), None);
    }
}
