//! Passes
//!
//! A [`Pass`] is an ordered list of `(pipeline, binding)` items executed
//! against a set of attachments (render) or none (compute). Items run in
//! declaration order; there is no reordering between items or passes.
//!
//! Every tick the director calls [`Pass::update`], which refreshes the
//! attachment views (the screen view rotates every frame), drives each
//! item's binding toward completion and resolves its device pipeline. The
//! pass is executable only when every attachment has a view and every item
//! resolved. [`Pass::execute`] then records the pass into the frame's
//! [`CommandEncoder`].

use rustc_hash::FxHashSet;
use slotmap::SlotMap;
use smallvec::SmallVec;

use crate::binding::{Binding, DrawRange};
use crate::device::{
    Command, CommandEncoder, GpuColorAttachment, GpuComputePipelineId, GpuDepthAttachment, GpuDevice,
    GpuRenderPipelineId, GpuTextureViewId, SurfaceFrame,
};
use crate::director::DirectorEvent;
use crate::handles::{BindingHandle, PipelineHandle, ShaderHandle, TextureHandle};
use crate::pipeline::{Pipeline, RenderTargets};
use crate::resources::{ResourceTables, Shader};

// ============================================================================
// Attachments
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentTarget {
    /// The swapchain frame acquired for the current tick.
    Screen,
    Texture(TextureHandle),
}

/// What a color attachment starts from.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum LoadAction {
    /// Keep the existing contents.
    Load,
    Clear(wgpu::Color),
    /// Clear to [`DirectorSettings::clear_color`](crate::DirectorSettings::clear_color).
    #[default]
    ClearDefault,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAttachment {
    pub target: AttachmentTarget,
    pub load: LoadAction,
    pub store: bool,
    /// Multisample resolve destination.
    pub resolve_target: Option<AttachmentTarget>,
}

impl ColorAttachment {
    #[must_use]
    pub fn screen() -> Self {
        Self {
            target: AttachmentTarget::Screen,
            load: LoadAction::ClearDefault,
            store: true,
            resolve_target: None,
        }
    }

    #[must_use]
    pub fn texture(texture: TextureHandle) -> Self {
        Self {
            target: AttachmentTarget::Texture(texture),
            ..Self::screen()
        }
    }

    #[must_use]
    pub fn with_load(mut self, load: LoadAction) -> Self {
        self.load = load;
        self
    }

    #[must_use]
    pub fn resolve_to(mut self, target: AttachmentTarget) -> Self {
        self.resolve_target = Some(target);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthAttachment {
    pub texture: TextureHandle,
    /// `None` loads the existing depth.
    pub clear_depth: Option<f32>,
    pub store: bool,
}

impl DepthAttachment {
    /// Cleared to `1.0` every frame, not stored.
    #[must_use]
    pub fn new(texture: TextureHandle) -> Self {
        Self {
            texture,
            clear_depth: Some(1.0),
            store: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PassKind {
    Render {
        colors: Vec<ColorAttachment>,
        depth: Option<DepthAttachment>,
    },
    Compute,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PassDescriptor {
    pub label: String,
    pub kind: PassKind,
}

impl PassDescriptor {
    #[must_use]
    pub fn render(label: &str, colors: Vec<ColorAttachment>, depth: Option<DepthAttachment>) -> Self {
        Self {
            label: label.to_string(),
            kind: PassKind::Render { colors, depth },
        }
    }

    #[must_use]
    pub fn compute(label: &str) -> Self {
        Self {
            label: label.to_string(),
            kind: PassKind::Compute,
        }
    }
}

// ============================================================================
// Frame context
// ============================================================================

/// Everything a pass update borrows from the director for one tick.
pub(crate) struct FrameContext<'a, D: GpuDevice + ?Sized> {
    pub device: &'a mut D,
    pub res: ResourceTables<'a>,
    pub shaders: &'a SlotMap<ShaderHandle, Shader>,
    pub pipelines: &'a mut SlotMap<PipelineHandle, Pipeline>,
    pub bindings: &'a mut SlotMap<BindingHandle, Binding>,
    pub screen_frame: Option<SurfaceFrame>,
    pub screen_format: wgpu::TextureFormat,
    pub clear_color: wgpu::Color,
    /// Block references already re-evaluated this frame.
    pub seen_blocks: FxHashSet<u64>,
    pub created: u32,
    pub events: Vec<DirectorEvent>,
}

// ============================================================================
// Pass
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResolvedPipeline {
    Render(GpuRenderPipelineId),
    Compute(GpuComputePipelineId),
}

#[derive(Debug, Clone)]
pub struct PassItem {
    pub pipeline: PipelineHandle,
    pub binding: BindingHandle,
    resolved: Option<ResolvedPipeline>,
    mismatch_reported: bool,
}

impl PassItem {
    /// The item has a device pipeline and a complete binding.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.resolved.is_some()
    }
}

#[derive(Debug, Default)]
struct ResolvedAttachments {
    colors: Vec<GpuColorAttachment>,
    depth: Option<GpuDepthAttachment>,
}

#[derive(Debug)]
pub struct Pass {
    label: String,
    kind: PassKind,
    items: Vec<PassItem>,
    attachments: Option<ResolvedAttachments>,
    targets: Option<RenderTargets>,
    executable: bool,
    missing_attachment: bool,
}

impl Pass {
    #[must_use]
    pub fn new(desc: PassDescriptor) -> Self {
        Self {
            label: desc.label,
            kind: desc.kind,
            items: Vec::new(),
            attachments: None,
            targets: None,
            executable: false,
            missing_attachment: false,
        }
    }

    /// Appends one item. Items execute in the order they were added.
    pub fn add(&mut self, pipeline: PipelineHandle, binding: BindingHandle) -> &mut Self {
        self.items.push(PassItem {
            pipeline,
            binding,
            resolved: None,
            mismatch_reported: false,
        });
        self.executable = false;
        self
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn kind(&self) -> &PassKind {
        &self.kind
    }

    #[must_use]
    pub fn is_compute(&self) -> bool {
        matches!(self.kind, PassKind::Compute)
    }

    #[must_use]
    pub fn items(&self) -> &[PassItem] {
        &self.items
    }

    #[must_use]
    pub fn is_executable(&self) -> bool {
        self.executable
    }

    /// Whether an attachment texture was destroyed under this pass.
    #[must_use]
    pub fn has_missing_attachment(&self) -> bool {
        self.missing_attachment
    }

    /// Attachment formats resolved by the last update.
    #[must_use]
    pub fn targets(&self) -> Option<&RenderTargets> {
        self.targets.as_ref()
    }

    /// Some color attachment (or resolve target) is the swapchain frame.
    #[must_use]
    pub fn targets_screen(&self) -> bool {
        match &self.kind {
            PassKind::Render { colors, .. } => colors.iter().any(|c| {
                c.target == AttachmentTarget::Screen || c.resolve_target == Some(AttachmentTarget::Screen)
            }),
            PassKind::Compute => false,
        }
    }

    #[must_use]
    pub fn uses_pipeline(&self, pipeline: PipelineHandle) -> bool {
        self.items.iter().any(|i| i.pipeline == pipeline)
    }

    #[must_use]
    pub fn uses_binding(&self, binding: BindingHandle) -> bool {
        self.items.iter().any(|i| i.binding == binding)
    }

    /// Drops items referring to a destroyed pipeline or binding.
    pub(crate) fn remove_items(&mut self, pred: impl Fn(&PassItem) -> bool) {
        let before = self.items.len();
        self.items.retain(|i| !pred(i));
        if self.items.len() != before {
            log::debug!("Pass `{}` dropped {} item(s)", self.label, before - self.items.len());
        }
    }

    /// Forgets resolved device ids after device loss.
    pub(crate) fn reset_device(&mut self) {
        for item in &mut self.items {
            item.resolved = None;
        }
        self.attachments = None;
        self.targets = None;
        self.executable = false;
    }

    // ========================================================================
    // Per-frame update
    // ========================================================================

    /// Refreshes attachments, completes bindings and resolves pipelines.
    /// Returns the executable flag.
    pub(crate) fn update<D: GpuDevice + ?Sized>(&mut self, ctx: &mut FrameContext<'_, D>) -> bool {
        let attachments_ready = self.refresh_attachments(ctx);

        let mut items_ready = true;
        for index in 0..self.items.len() {
            let ready = self.update_item(index, ctx);
            items_ready &= ready;
        }

        self.executable = attachments_ready && items_ready;
        if !self.executable {
            log::trace!(
                "Pass `{}` not executable (attachments ready: {attachments_ready}, items ready: {items_ready})",
                self.label
            );
        }
        self.executable
    }

    fn refresh_attachments<D: GpuDevice + ?Sized>(&mut self, ctx: &FrameContext<'_, D>) -> bool {
        let PassKind::Render { colors, depth } = &self.kind else {
            self.attachments = Some(ResolvedAttachments::default());
            return true;
        };

        let resolve = |target: AttachmentTarget| -> (Option<wgpu::TextureFormat>, Option<GpuTextureViewId>, u32) {
            match target {
                AttachmentTarget::Screen => (Some(ctx.screen_format), ctx.screen_frame.map(|f| f.view), 1),
                AttachmentTarget::Texture(h) => match ctx.res.textures.get(h) {
                    Some(t) => (
                        Some(t.format()),
                        t.view().filter(|_| t.is_complete()),
                        t.sample_count(),
                    ),
                    None => (None, None, 1),
                },
            }
        };

        let mut ready = true;
        let mut formats: SmallVec<[wgpu::TextureFormat; 4]> = SmallVec::new();
        let mut sample_count = 1;
        let mut resolved = ResolvedAttachments::default();

        for color in colors {
            let (format, view, samples) = resolve(color.target);
            let Some(format) = format else {
                if !self.missing_attachment {
                    log::warn!("Pass `{}` targets a destroyed texture", self.label);
                    self.missing_attachment = true;
                }
                self.targets = None;
                self.attachments = None;
                return false;
            };
            formats.push(format);
            sample_count = sample_count.max(samples);

            let resolve_view = match color.resolve_target {
                Some(target) => {
                    let (_, view, _) = resolve(target);
                    ready &= view.is_some();
                    view
                }
                None => None,
            };
            match view {
                Some(view) => resolved.colors.push(GpuColorAttachment {
                    view,
                    resolve_target: resolve_view,
                    clear: match color.load {
                        LoadAction::Load => None,
                        LoadAction::Clear(c) => Some(c),
                        LoadAction::ClearDefault => Some(ctx.clear_color),
                    },
                    store: color.store,
                }),
                None => ready = false,
            }
        }

        let mut depth_missing = false;
        let mut depth_format = None;
        if let Some(depth) = depth {
            match ctx.res.textures.get(depth.texture) {
                Some(texture) => {
                    depth_format = Some(texture.format());
                    match texture.view().filter(|_| texture.is_complete()) {
                        Some(view) => {
                            resolved.depth = Some(GpuDepthAttachment {
                                view,
                                clear_depth: depth.clear_depth,
                                store: depth.store,
                            });
                        }
                        None => ready = false,
                    }
                }
                None => {
                    if !self.missing_attachment {
                        log::warn!("Pass `{}` depth attachment was destroyed", self.label);
                    }
                    depth_missing = true;
                    ready = false;
                }
            }
        }
        self.missing_attachment = depth_missing;

        self.targets = Some(RenderTargets {
            colors: formats,
            depth: depth_format,
            sample_count,
        });
        self.attachments = ready.then_some(resolved);
        ready
    }

    fn update_item<D: GpuDevice + ?Sized>(&mut self, index: usize, ctx: &mut FrameContext<'_, D>) -> bool {
        let label = &self.label;
        let compute = matches!(self.kind, PassKind::Compute);
        let targets = self.targets.as_ref();
        let item = &mut self.items[index];

        let (Some(pipeline), Some(binding)) = (ctx.pipelines.get_mut(item.pipeline), ctx.bindings.get_mut(item.binding))
        else {
            item.resolved = None;
            return false;
        };
        if pipeline.is_compute() != compute {
            if !item.mismatch_reported {
                log::error!("Pass `{label}` cannot execute pipeline `{}`", pipeline.label());
                item.mismatch_reported = true;
            }
            item.resolved = None;
            return false;
        }
        let Some(shader) = ctx.shaders.get(pipeline.shader()) else {
            item.resolved = None;
            return false;
        };

        pipeline.sync_shader(&mut *ctx.device, shader);
        binding.update(&ctx.res, &mut ctx.seen_blocks);

        let was_complete = binding.is_complete();
        if !binding.try_make_complete(&mut *ctx.device, &ctx.res, Some(shader)) {
            item.resolved = None;
            return false;
        }
        if !was_complete {
            ctx.events.push(DirectorEvent::BindingComplete { handle: item.binding });
        }

        let resolved = match pipeline {
            Pipeline::Render(p) => {
                let Some(targets) = targets else {
                    item.resolved = None;
                    return false;
                };
                p.resolve(&mut *ctx.device, shader, binding.layout(), targets)
                    .map(|r| (ResolvedPipeline::Render(r.id), r.created))
            }
            Pipeline::Compute(p) => p
                .resolve(&mut *ctx.device, shader, binding.layout())
                .map(|r| (ResolvedPipeline::Compute(r.id), r.created)),
        };

        match resolved {
            Some((id, created)) => {
                if created {
                    ctx.created += 1;
                    ctx.events.push(DirectorEvent::PipelineCreated { handle: item.pipeline });
                }
                item.resolved = Some(id);
                true
            }
            None => {
                item.resolved = None;
                false
            }
        }
    }

    // ========================================================================
    // Recording
    // ========================================================================

    /// Records this pass. Returns the number of draws / dispatches issued.
    pub(crate) fn execute(
        &self,
        encoder: &mut CommandEncoder,
        res: &ResourceTables<'_>,
        bindings: &SlotMap<BindingHandle, Binding>,
    ) -> u32 {
        let Some(attachments) = &self.attachments else {
            return 0;
        };
        match &self.kind {
            PassKind::Render { .. } => {
                encoder.begin_render_pass(&self.label, attachments.colors.clone(), attachments.depth.clone());
            }
            PassKind::Compute => encoder.begin_compute_pass(&self.label),
        }

        let mut issued = 0;
        for item in &self.items {
            let (Some(resolved), Some(binding)) = (item.resolved, bindings.get(item.binding)) else {
                continue;
            };
            if self.record_item(encoder, res, binding, resolved) {
                issued += 1;
            }
        }

        encoder.end_pass();
        issued
    }

    fn record_item(
        &self,
        encoder: &mut CommandEncoder,
        res: &ResourceTables<'_>,
        binding: &Binding,
        resolved: ResolvedPipeline,
    ) -> bool {
        let gpu_buffer = |h| res.buffers.get(h).and_then(|b| b.gpu_id());

        match resolved {
            ResolvedPipeline::Render(id) => encoder.push(Command::SetRenderPipeline(id)),
            ResolvedPipeline::Compute(id) => encoder.push(Command::SetComputePipeline(id)),
        }

        for (index, &group) in binding.bind_groups().iter().enumerate() {
            encoder.push(Command::SetBindGroup {
                index: index as u32,
                group,
            });
        }

        let indirect = binding.indirect_buffer().and_then(gpu_buffer);

        if let ResolvedPipeline::Compute(_) = resolved {
            if let Some(buffer) = indirect {
                encoder.push(Command::DispatchIndirect { buffer, offset: 0 });
                return true;
            }
            let values = binding.evaluate_range();
            let Some(DrawRange::Dispatch { x, y, z }) = DrawRange::compute(&values) else {
                log::warn!(
                    "Binding `{}` produced an invalid dispatch range {values:?}; skipped",
                    binding.label()
                );
                return false;
            };
            encoder.push(Command::Dispatch { x, y, z });
            return true;
        }

        for (slot, &handle) in binding.vertex_buffers().iter().enumerate() {
            if let Some(buffer) = gpu_buffer(handle) {
                encoder.push(Command::SetVertexBuffer {
                    slot: slot as u32,
                    buffer,
                });
            }
        }
        let index = binding
            .index_buffer()
            .and_then(|(h, format)| gpu_buffer(h).map(|buffer| (buffer, format)));
        if let Some((buffer, format)) = index {
            encoder.push(Command::SetIndexBuffer { buffer, format });
        }

        if let Some(buffer) = indirect {
            encoder.push(if index.is_some() {
                Command::DrawIndexedIndirect { buffer, offset: 0 }
            } else {
                Command::DrawIndirect { buffer, offset: 0 }
            });
            return true;
        }

        let values = binding.evaluate_range();
        let Some(DrawRange::Draw {
            count,
            instances,
            first,
            first_instance,
        }) = DrawRange::render(&values)
        else {
            log::warn!(
                "Binding `{}` produced an invalid draw range {values:?}; skipped",
                binding.label()
            );
            return false;
        };
        let instances = first_instance..first_instance + instances;
        encoder.push(if index.is_some() {
            Command::DrawIndexed {
                indices: first..first + count,
                base_vertex: 0,
                instances,
            }
        } else {
            Command::Draw {
                vertices: first..first + count,
                instances,
            }
        });
        true
    }
}
