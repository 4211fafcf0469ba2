//! Director
//!
//! The per-frame scheduler. It owns every resource object, the update queue,
//! the stage registry and the screen, and drives all device work from
//! [`Director::tick`]:
//!
//! ```text
//! tick()
//!  ├─ 1. drain update queue   buffers → textures → samplers → shaders → pipelines → bindings
//!  ├─ 2. update passes        acquire screen frame, complete bindings, resolve pipelines
//!  ├─ 3. late flush           buffers dirtied by per-frame dynamic uniforms
//!  └─ 4. record & submit      executable passes, stage order then pass order, one submission
//! ```
//!
//! Nothing inside `tick` returns an error: a resource that cannot be built is
//! logged and stays incomplete, and every pass depending on it is skipped
//! until it recovers.

mod events;
mod queue;
mod stage;

pub use events::{DirectorEvent, ListenerId};
pub use stage::{Stage, StageDescriptor};

use rustc_hash::FxHashSet;
use slotmap::SlotMap;

use crate::binding::{Binding, BindingDescriptor};
use crate::device::{CommandEncoder, GpuDevice};
use crate::errors::{Error, Result};
use crate::handles::{
    BindingHandle, BufferHandle, PassHandle, PipelineHandle, ResourceKey, SamplerHandle,
    ShaderHandle, TextureHandle,
};
use crate::pass::{FrameContext, Pass, PassDescriptor};
use crate::pipeline::{ComputePipelineDescriptor, Pipeline, RenderPipelineDescriptor};
use crate::resources::{
    Buffer, BufferDescriptor, Monitor, RegionDescriptor, ResourceTables, Sampler,
    SamplerDescriptor, Shader, ShaderDescriptor, ShaderSource, ShaderUpdate, Texture,
    TextureData, TextureDescriptor, TextureUpdate,
};
use crate::screen::Screen;
use crate::settings::DirectorSettings;

use events::EventTable;
use queue::UpdateQueue;
use stage::StageRegistry;

/// Counters for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame_index: u64,
    /// Buffer region writes issued (queue drain and late flush).
    pub buffer_writes: u32,
    /// Device objects created: buffers, textures, samplers, shader modules
    /// and pipelines.
    pub objects_created: u32,
    pub passes_executed: u32,
    /// Visible passes that were not executable.
    pub passes_skipped: u32,
}

pub struct Director<D: GpuDevice> {
    device: D,
    settings: DirectorSettings,

    buffers: SlotMap<BufferHandle, Buffer>,
    textures: SlotMap<TextureHandle, Texture>,
    samplers: SlotMap<SamplerHandle, Sampler>,
    shaders: SlotMap<ShaderHandle, Shader>,
    pipelines: SlotMap<PipelineHandle, Pipeline>,
    bindings: SlotMap<BindingHandle, Binding>,
    passes: SlotMap<PassHandle, Pass>,

    stages: StageRegistry,
    queue: UpdateQueue,
    screen: Screen,
    monitor: Monitor,
    events: EventTable,

    frame_index: u64,
    last_stats: FrameStats,
}

impl<D: GpuDevice> std::fmt::Debug for Director<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Director")
            .field("frame_index", &self.frame_index)
            .field("buffers", &self.buffers.len())
            .field("textures", &self.textures.len())
            .field("shaders", &self.shaders.len())
            .field("pipelines", &self.pipelines.len())
            .field("bindings", &self.bindings.len())
            .field("passes", &self.passes.len())
            .field("pending", &self.queue.len())
            .field("screen", &self.screen)
            .finish_non_exhaustive()
    }
}

impl<D: GpuDevice> Director<D> {
    /// Takes ownership of an acquired device and configures its surface for
    /// the initial screen size.
    pub fn new(mut device: D, settings: DirectorSettings) -> Self {
        let limits = device.limits();
        let screen = Screen::new(
            settings.screen_size,
            device.surface_format(),
            limits.max_texture_dimension_2d,
        );
        device.configure_surface(screen.width(), screen.height());
        log::info!(
            "Director initialized: screen {}x{} ({:?})",
            screen.width(),
            screen.height(),
            screen.format()
        );

        Self {
            device,
            settings,
            buffers: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            samplers: SlotMap::with_key(),
            shaders: SlotMap::with_key(),
            pipelines: SlotMap::with_key(),
            bindings: SlotMap::with_key(),
            passes: SlotMap::with_key(),
            stages: StageRegistry::default(),
            queue: UpdateQueue::default(),
            screen,
            monitor: Monitor::new(),
            events: EventTable::default(),
            frame_index: 0,
            last_stats: FrameStats::default(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[must_use]
    pub fn settings(&self) -> &DirectorSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut DirectorSettings {
        &mut self.settings
    }

    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    #[must_use]
    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    #[must_use]
    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    #[must_use]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    #[must_use]
    pub fn last_frame_stats(&self) -> FrameStats {
        self.last_stats
    }

    /// Number of objects waiting for the next drain.
    #[must_use]
    pub fn pending_updates(&self) -> usize {
        self.queue.len()
    }

    fn tables(&self) -> ResourceTables<'_> {
        ResourceTables {
            buffers: &self.buffers,
            textures: &self.textures,
            samplers: &self.samplers,
        }
    }

    // ========================================================================
    // Buffers
    // ========================================================================

    /// Validates the description, claims its references and queues the
    /// device buffer for the next tick.
    pub fn create_buffer(&mut self, desc: BufferDescriptor) -> Result<BufferHandle> {
        let buffer = Buffer::new(desc)?;
        let size = buffer.device_size();
        let handle = self.buffers.insert(buffer);
        let notify = self.queue.sender();
        if let Err(err) = self.buffers[handle].attach(handle, notify) {
            self.buffers.remove(handle);
            return Err(err);
        }
        self.monitor.allocate_buffer(size);
        self.queue.enqueue(handle.into());
        Ok(handle)
    }

    /// Appends a region to an existing buffer.
    pub fn register_region(&mut self, handle: BufferHandle, desc: RegionDescriptor) -> Result<()> {
        let buffer = self.buffers.get_mut(handle).ok_or(Error::UnknownHandle("buffer"))?;
        let before = buffer.device_size();
        buffer.register_region(desc)?;
        let after = buffer.device_size();
        if after != before {
            self.monitor.resize_buffer(before, after);
        }
        self.queue.enqueue(handle.into());
        Ok(())
    }

    #[must_use]
    pub fn buffer(&self, handle: BufferHandle) -> Option<&Buffer> {
        self.buffers.get(handle)
    }

    /// Frees the device buffer and releases every reference it claimed.
    pub fn destroy_buffer(&mut self, handle: BufferHandle) -> Result<()> {
        let mut buffer = self.buffers.remove(handle).ok_or(Error::UnknownHandle("buffer"))?;
        let size = buffer.destroy(&mut self.device);
        self.monitor.free_buffer(size);
        self.queue.remove(handle.into());
        Ok(())
    }

    // ========================================================================
    // Textures, samplers, shaders
    // ========================================================================

    pub fn create_texture(&mut self, desc: TextureDescriptor) -> Result<TextureHandle> {
        let texture = Texture::new(desc, self.screen.size())?;
        let handle = self.textures.insert(texture);
        self.queue.enqueue(handle.into());
        Ok(handle)
    }

    /// Replaces a texture's texel data, cancelling a load still in flight.
    pub fn set_texture_data(&mut self, handle: TextureHandle, data: TextureData) -> Result<()> {
        let texture = self.textures.get_mut(handle).ok_or(Error::UnknownHandle("texture"))?;
        texture.set_data(data);
        self.queue.enqueue(handle.into());
        Ok(())
    }

    #[must_use]
    pub fn texture(&self, handle: TextureHandle) -> Option<&Texture> {
        self.textures.get(handle)
    }

    pub fn destroy_texture(&mut self, handle: TextureHandle) -> Result<()> {
        let mut texture = self.textures.remove(handle).ok_or(Error::UnknownHandle("texture"))?;
        let freed = texture.destroy(&mut self.device);
        if freed > 0 {
            self.monitor.free_texture(freed);
        }
        self.queue.remove(handle.into());
        Ok(())
    }

    pub fn create_sampler(&mut self, desc: SamplerDescriptor) -> SamplerHandle {
        let handle = self.samplers.insert(Sampler::new(desc));
        self.queue.enqueue(handle.into());
        handle
    }

    #[must_use]
    pub fn sampler(&self, handle: SamplerHandle) -> Option<&Sampler> {
        self.samplers.get(handle)
    }

    pub fn destroy_sampler(&mut self, handle: SamplerHandle) -> Result<()> {
        let mut sampler = self.samplers.remove(handle).ok_or(Error::UnknownHandle("sampler"))?;
        sampler.destroy(&mut self.device);
        self.queue.remove(handle.into());
        Ok(())
    }

    pub fn create_shader(&mut self, desc: ShaderDescriptor) -> Result<ShaderHandle> {
        if desc.label.is_empty() {
            return Err(Error::MissingField {
                context: "shader description".to_string(),
                field: "label",
            });
        }
        let handle = self.shaders.insert(Shader::new(desc));
        self.queue.enqueue(handle.into());
        Ok(handle)
    }

    /// Supplies new source. A load still in flight is cancelled.
    pub fn set_shader_source(&mut self, handle: ShaderHandle, source: ShaderSource) -> Result<()> {
        let shader = self.shaders.get_mut(handle).ok_or(Error::UnknownHandle("shader"))?;
        shader.set_source(source);
        self.queue.enqueue(handle.into());
        Ok(())
    }

    #[must_use]
    pub fn shader(&self, handle: ShaderHandle) -> Option<&Shader> {
        self.shaders.get(handle)
    }

    pub fn destroy_shader(&mut self, handle: ShaderHandle) -> Result<()> {
        let mut shader = self.shaders.remove(handle).ok_or(Error::UnknownHandle("shader"))?;
        shader.destroy(&mut self.device);
        self.queue.remove(handle.into());
        Ok(())
    }

    // ========================================================================
    // Pipelines and bindings
    // ========================================================================

    pub fn create_render_pipeline(&mut self, desc: RenderPipelineDescriptor) -> Result<PipelineHandle> {
        self.check_pipeline(&desc.label, desc.shader)?;
        let handle = self.pipelines.insert(Pipeline::render(desc));
        self.queue.enqueue(handle.into());
        Ok(handle)
    }

    pub fn create_compute_pipeline(&mut self, desc: ComputePipelineDescriptor) -> Result<PipelineHandle> {
        self.check_pipeline(&desc.label, desc.shader)?;
        if desc.entry_point.is_empty() {
            return Err(Error::MissingField {
                context: format!("compute pipeline `{}`", desc.label),
                field: "entry_point",
            });
        }
        let handle = self.pipelines.insert(Pipeline::compute(desc));
        self.queue.enqueue(handle.into());
        Ok(handle)
    }

    fn check_pipeline(&self, label: &str, shader: ShaderHandle) -> Result<()> {
        if label.is_empty() {
            return Err(Error::MissingField {
                context: "pipeline description".to_string(),
                field: "label",
            });
        }
        if !self.shaders.contains_key(shader) {
            return Err(Error::UnknownHandle("shader"));
        }
        Ok(())
    }

    #[must_use]
    pub fn pipeline(&self, handle: PipelineHandle) -> Option<&Pipeline> {
        self.pipelines.get(handle)
    }

    /// Destroys every device variant and drops the pipeline from its passes.
    pub fn destroy_pipeline(&mut self, handle: PipelineHandle) -> Result<()> {
        let mut pipeline = self.pipelines.remove(handle).ok_or(Error::UnknownHandle("pipeline"))?;
        pipeline.destroy(&mut self.device);
        for pass in self.passes.values_mut() {
            pass.remove_items(|item| item.pipeline == handle);
        }
        self.queue.remove(handle.into());
        Ok(())
    }

    /// Validates the entries against the referenced resources. Bind groups
    /// are built once the binding is added to a pass and its shader compiles.
    pub fn create_binding(&mut self, desc: BindingDescriptor) -> Result<BindingHandle> {
        let binding = Binding::new(desc, &self.tables())?;
        let handle = self.bindings.insert(binding);
        self.queue.enqueue(handle.into());
        Ok(handle)
    }

    #[must_use]
    pub fn binding(&self, handle: BindingHandle) -> Option<&Binding> {
        self.bindings.get(handle)
    }

    pub fn destroy_binding(&mut self, handle: BindingHandle) -> Result<()> {
        let mut binding = self.bindings.remove(handle).ok_or(Error::UnknownHandle("binding"))?;
        binding.destroy(&mut self.device);
        for pass in self.passes.values_mut() {
            pass.remove_items(|item| item.binding == handle);
        }
        self.queue.remove(handle.into());
        Ok(())
    }

    // ========================================================================
    // Passes and stages
    // ========================================================================

    pub fn create_pass(&mut self, desc: PassDescriptor) -> Result<PassHandle> {
        if desc.label.is_empty() {
            return Err(Error::MissingField {
                context: "pass description".to_string(),
                field: "label",
            });
        }
        Ok(self.passes.insert(Pass::new(desc)))
    }

    /// Appends `(pipeline, binding)` to a pass after checking that the pass
    /// can execute that kind of pipeline.
    pub fn add_item(&mut self, pass: PassHandle, pipeline: PipelineHandle, binding: BindingHandle) -> Result<()> {
        let target = self.passes.get_mut(pass).ok_or(Error::UnknownHandle("pass"))?;
        let pipe = self.pipelines.get(pipeline).ok_or(Error::UnknownHandle("pipeline"))?;
        let bound = self.bindings.get_mut(binding).ok_or(Error::UnknownHandle("binding"))?;

        if pipe.is_compute() != target.is_compute() {
            return Err(Error::PipelineKindMismatch {
                pass: target.label().to_string(),
                pipeline: pipe.label().to_string(),
            });
        }
        if !bound.associate(pipeline) {
            log::warn!(
                "Binding `{}` is already drawn with another pipeline; `{}` must share its layout",
                bound.label(),
                pipe.label()
            );
        }
        target.add(pipeline, binding);
        self.queue.enqueue(binding.into());
        Ok(())
    }

    #[must_use]
    pub fn pass(&self, handle: PassHandle) -> Option<&Pass> {
        self.passes.get(handle)
    }

    /// Direct access for chaining [`Pass::add`]. Unlike
    /// [`add_item`](Self::add_item), a pipeline of the wrong kind is only
    /// reported when the pass updates.
    pub fn pass_mut(&mut self, handle: PassHandle) -> Option<&mut Pass> {
        self.passes.get_mut(handle)
    }

    pub fn destroy_pass(&mut self, handle: PassHandle) -> Result<()> {
        self.passes.remove(handle).ok_or(Error::UnknownHandle("pass"))?;
        self.stages.remove_pass(handle);
        Ok(())
    }

    pub fn add_stage(&mut self, desc: StageDescriptor) -> Result<()> {
        if desc.passes.iter().any(|p| !self.passes.contains_key(*p)) {
            return Err(Error::UnknownHandle("pass"));
        }
        let name = desc.name.clone();
        self.stages.add(desc)?;
        log::debug!("Stage `{name}` added");
        self.events.push(DirectorEvent::StageAdded { name });
        Ok(())
    }

    /// Returns `false` for an unknown stage.
    pub fn show_stage(&mut self, name: &str) -> bool {
        self.stages.set_visible(name, true)
    }

    /// Returns `false` for an unknown stage.
    pub fn hide_stage(&mut self, name: &str) -> bool {
        self.stages.set_visible(name, false)
    }

    pub fn remove_stage(&mut self, name: &str) -> Option<Stage> {
        let stage = self.stages.remove(name)?;
        self.events.push(DirectorEvent::StageRemoved {
            name: stage.name().to_string(),
        });
        Some(stage)
    }

    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.get(name)
    }

    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter()
    }

    // ========================================================================
    // Update queue & events
    // ========================================================================

    /// Queues an object for the next drain. Returns `false` when it was
    /// already pending.
    pub fn add_to_update_list(&mut self, key: impl Into<ResourceKey>) -> bool {
        self.queue.enqueue(key.into())
    }

    pub fn add_listener(&mut self, listener: impl FnMut(&DirectorEvent) + Send + 'static) -> ListenerId {
        self.events.add(Box::new(listener))
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.events.remove(id)
    }

    // ========================================================================
    // Frame
    // ========================================================================

    /// Runs one frame. Call at most once per rendered frame.
    pub fn tick(&mut self) {
        self.frame_index += 1;
        let mut stats = FrameStats {
            frame_index: self.frame_index,
            ..Default::default()
        };

        self.drain_updates(&mut stats);

        let visible = self.stages.visible_passes();
        let wants_screen = visible
            .iter()
            .any(|h| self.passes.get(*h).is_some_and(Pass::targets_screen));
        if wants_screen {
            self.screen.acquire(&mut self.device);
        }

        let mut ctx = FrameContext {
            device: &mut self.device,
            res: ResourceTables {
                buffers: &self.buffers,
                textures: &self.textures,
                samplers: &self.samplers,
            },
            shaders: &self.shaders,
            pipelines: &mut self.pipelines,
            bindings: &mut self.bindings,
            screen_frame: self.screen.frame(),
            screen_format: self.screen.format(),
            clear_color: self.settings.clear_color,
            seen_blocks: FxHashSet::default(),
            created: 0,
            events: Vec::new(),
        };
        for &handle in &visible {
            let Some(pass) = self.passes.get_mut(handle) else {
                continue;
            };
            let was_executable = pass.is_executable();
            if pass.update(&mut ctx) && !was_executable {
                log::debug!("Pass `{}` is executable", pass.label());
                ctx.events.push(DirectorEvent::PassExecutable { handle });
            }
        }
        stats.objects_created += ctx.created;
        let pass_events = std::mem::take(&mut ctx.events);
        self.events.extend(pass_events);

        if self.settings.late_flush {
            for handle in self.queue.drain_buffers() {
                self.flush_buffer(handle, &mut stats);
            }
        }

        let mut encoder = CommandEncoder::new(&format!("frame {}", self.frame_index));
        let res = ResourceTables {
            buffers: &self.buffers,
            textures: &self.textures,
            samplers: &self.samplers,
        };
        for &handle in &visible {
            let Some(pass) = self.passes.get(handle) else {
                continue;
            };
            if pass.is_executable() {
                pass.execute(&mut encoder, &res, &self.bindings);
                stats.passes_executed += 1;
            } else {
                log::trace!("Pass `{}` skipped this frame", pass.label());
                stats.passes_skipped += 1;
            }
        }
        if stats.passes_executed > 0 {
            self.device.submit(encoder);
        }
        self.screen.release_frame();

        let interval = self.settings.stats_log_interval;
        if interval > 0 && self.frame_index % interval == 0 {
            log::debug!("{stats:?}");
        }
        self.last_stats = stats;
        self.events.dispatch();
    }

    /// Drains the queue in dependency order. Objects waiting on an async
    /// load go back into the queue for the next tick.
    fn drain_updates(&mut self, stats: &mut FrameStats) {
        let keys = self.queue.drain();
        if keys.is_empty() {
            return;
        }
        log::trace!("Draining {} queued object(s)", keys.len());

        let mut retry = Vec::new();
        for key in keys {
            match key {
                ResourceKey::Buffer(h) => self.flush_buffer(h, stats),
                ResourceKey::Texture(h) => {
                    let Some(texture) = self.textures.get_mut(h) else {
                        continue;
                    };
                    match texture.update(&mut self.device) {
                        TextureUpdate::Waiting => retry.push(key),
                        TextureUpdate::Created { bytes, freed } => {
                            if freed > 0 {
                                self.monitor.free_texture(freed);
                            }
                            self.monitor.allocate_texture(bytes);
                            stats.objects_created += 1;
                            let extent = texture.extent();
                            self.events.push(DirectorEvent::TextureCreated {
                                handle: h,
                                width: extent.width,
                                height: extent.height,
                            });
                        }
                        TextureUpdate::Failed { message, freed } => {
                            if freed > 0 {
                                self.monitor.free_texture(freed);
                            }
                            self.events.push(DirectorEvent::TextureFailed { handle: h, message });
                        }
                        TextureUpdate::Unchanged => {}
                    }
                }
                ResourceKey::Sampler(h) => {
                    let Some(sampler) = self.samplers.get_mut(h) else {
                        continue;
                    };
                    match sampler.realize(&mut self.device) {
                        Ok(true) => {
                            stats.objects_created += 1;
                            self.events.push(DirectorEvent::SamplerCreated { handle: h });
                        }
                        Ok(false) => {}
                        Err(err) => {
                            log::error!("Sampler `{}` rejected: {err}", sampler.descriptor().label);
                        }
                    }
                }
                ResourceKey::Shader(h) => {
                    let Some(shader) = self.shaders.get_mut(h) else {
                        continue;
                    };
                    match shader.update(&mut self.device) {
                        ShaderUpdate::Waiting => retry.push(key),
                        ShaderUpdate::Compiled => {
                            stats.objects_created += 1;
                            self.events.push(DirectorEvent::ShaderCompiled { handle: h });
                        }
                        ShaderUpdate::Failed(message) => {
                            self.events.push(DirectorEvent::ShaderFailed { handle: h, message });
                        }
                        ShaderUpdate::Unchanged => {}
                    }
                }
                ResourceKey::Pipeline(h) => {
                    let Some(pipeline) = self.pipelines.get_mut(h) else {
                        continue;
                    };
                    if let Some(shader) = self.shaders.get(pipeline.shader()) {
                        pipeline.sync_shader(&mut self.device, shader);
                    }
                }
                ResourceKey::Binding(h) => {
                    let Some(binding) = self.bindings.get_mut(h) else {
                        continue;
                    };
                    let shader = binding
                        .pipeline()
                        .and_then(|p| self.pipelines.get(p))
                        .and_then(|p| self.shaders.get(p.shader()));
                    let res = ResourceTables {
                        buffers: &self.buffers,
                        textures: &self.textures,
                        samplers: &self.samplers,
                    };
                    let was_complete = binding.is_complete();
                    if binding.try_make_complete(&mut self.device, &res, shader) && !was_complete {
                        self.events.push(DirectorEvent::BindingComplete { handle: h });
                    }
                }
            }
        }

        for key in retry {
            self.queue.enqueue(key);
        }
    }

    fn flush_buffer(&mut self, handle: BufferHandle, stats: &mut FrameStats) {
        let Some(buffer) = self.buffers.get_mut(handle) else {
            return;
        };
        let outcome = buffer.flush(&mut self.device);
        stats.buffer_writes += outcome.writes;
        if outcome.created {
            stats.objects_created += 1;
            self.events.push(DirectorEvent::BufferCreated {
                handle,
                size: buffer.device_size(),
            });
        }
        if outcome.writes > 0 {
            self.events.push(DirectorEvent::BufferWritten {
                handle,
                writes: outcome.writes,
            });
        }
    }

    // ========================================================================
    // Screen & device
    // ========================================================================

    /// Applies a resize notification: reconfigures the surface, recreates
    /// screen-sized textures and drops pipeline variants built for an old
    /// surface format.
    pub fn resize(&mut self, width: u32, height: u32) {
        if !self.screen.set_size(width, height) {
            return;
        }
        let (width, height) = self.screen.size();
        self.device.configure_surface(width, height);

        if self.screen.set_format(self.device.surface_format()) {
            log::info!("Surface format changed to {:?}", self.screen.format());
            let stale: FxHashSet<PipelineHandle> = self
                .passes
                .values()
                .filter(|p| p.targets_screen())
                .flat_map(|p| p.items().iter().map(|i| i.pipeline))
                .collect();
            for handle in stale {
                if let Some(pipeline) = self.pipelines.get_mut(handle) {
                    pipeline.invalidate(&mut self.device);
                }
            }
        }

        let size = self.screen.size();
        for (handle, texture) in &mut self.textures {
            if texture.is_screen_dependent() && texture.resize(size) {
                self.queue.enqueue(handle.into());
            }
        }

        log::debug!("Screen resized to {width}x{height}");
        self.events.push(DirectorEvent::Resized { width, height });
    }

    /// Swaps in a freshly acquired device after device loss and returns the
    /// old one. Every object forgets its device ids and is rebuilt from its
    /// retained description on the next tick.
    pub fn recover_device(&mut self, device: D) -> D {
        let old = std::mem::replace(&mut self.device, device);
        log::warn!("Recovering from device loss: rebuilding all device objects");

        self.screen.set_max_dimension(self.device.limits().max_texture_dimension_2d);
        self.screen.set_format(self.device.surface_format());
        self.device.configure_surface(self.screen.width(), self.screen.height());

        for (handle, buffer) in &mut self.buffers {
            buffer.reset_device();
            self.queue.enqueue(handle.into());
        }
        for (handle, texture) in &mut self.textures {
            let freed = texture.reset_device();
            if freed > 0 {
                self.monitor.free_texture(freed);
            }
            self.queue.enqueue(handle.into());
        }
        for (handle, sampler) in &mut self.samplers {
            sampler.reset_device();
            self.queue.enqueue(handle.into());
        }
        for (handle, shader) in &mut self.shaders {
            shader.reset_device();
            self.queue.enqueue(handle.into());
        }
        for (handle, pipeline) in &mut self.pipelines {
            pipeline.reset_device();
            self.queue.enqueue(handle.into());
        }
        for (handle, binding) in &mut self.bindings {
            binding.reset_device();
            self.queue.enqueue(handle.into());
        }
        for pass in self.passes.values_mut() {
            pass.reset_device();
        }

        self.events.push(DirectorEvent::DeviceRecovered);
        old
    }
}
