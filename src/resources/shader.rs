//! Shaders
//!
//! A [`Shader`] turns WGSL source into a device shader module. The source may
//! be supplied up front or arrive later through a
//! [`PendingLoad`](crate::loader::PendingLoad).
//!
//! Completion is monotonic: once a module exists the shader stays complete.
//! A failed compile is not retried until new source is supplied, and a
//! failed recompile keeps the previous module in place. Every successful
//! compile bumps [`Shader::generation`], which pipelines use to drop
//! variants built from an older module.

use crate::device::{GpuDevice, ShaderModuleId};
use crate::loader::{LoadState, PendingLoad};

#[derive(Debug, Default)]
pub enum ShaderSource {
    /// Source will be supplied later with
    /// [`Director::set_shader_source`](crate::Director::set_shader_source).
    #[default]
    None,
    Wgsl(String),
    Pending(PendingLoad<String>),
}

#[derive(Debug, Default)]
pub struct ShaderDescriptor {
    pub label: String,
    pub source: ShaderSource,
    /// Vertex input locations the vertex stage reads. When set, bindings
    /// must supply an attribute for each location.
    pub vertex_inputs: Option<Vec<u32>>,
}

impl ShaderDescriptor {
    #[must_use]
    pub fn wgsl(label: &str, source: impl Into<String>) -> Self {
        Self {
            label: label.to_string(),
            source: ShaderSource::Wgsl(source.into()),
            vertex_inputs: None,
        }
    }
}

/// Outcome of one [`Shader::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderUpdate {
    /// Source still loading.
    Waiting,
    Compiled,
    Failed(String),
    Unchanged,
}

#[derive(Debug)]
pub struct Shader {
    label: String,
    source: Option<String>,
    pending: Option<PendingLoad<String>>,
    vertex_inputs: Option<Vec<u32>>,

    /// Source arrived but has not been handed to the device yet.
    needs_compile: bool,
    module: Option<ShaderModuleId>,
    failed: bool,
    generation: u64,
}

impl Shader {
    #[must_use]
    pub fn new(desc: ShaderDescriptor) -> Self {
        let mut shader = Self {
            label: desc.label,
            source: None,
            pending: None,
            vertex_inputs: desc.vertex_inputs,
            needs_compile: false,
            module: None,
            failed: false,
            generation: 0,
        };
        shader.set_source(desc.source);
        shader
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    #[must_use]
    pub fn vertex_inputs(&self) -> Option<&[u32]> {
        self.vertex_inputs.as_deref()
    }

    #[must_use]
    pub fn module(&self) -> Option<ShaderModuleId> {
        self.module
    }

    /// A device module exists.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.module.is_some()
    }

    /// The latest source failed to compile and no earlier module exists.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.failed && self.module.is_none()
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replaces the source, cancelling a load still in flight.
    pub(crate) fn set_source(&mut self, source: ShaderSource) {
        if let Some(old) = self.pending.take() {
            old.cancel();
        }
        match source {
            ShaderSource::None => {}
            ShaderSource::Wgsl(code) => {
                self.source = Some(code);
                self.needs_compile = true;
                self.failed = false;
            }
            ShaderSource::Pending(load) => self.pending = Some(load),
        }
    }

    /// Polls a pending load and compiles new source.
    pub fn update<D: GpuDevice + ?Sized>(&mut self, device: &mut D) -> ShaderUpdate {
        if let Some(pending) = &mut self.pending {
            match pending.poll() {
                LoadState::Pending => return ShaderUpdate::Waiting,
                LoadState::Ready(code) => {
                    self.source = Some(code);
                    self.needs_compile = true;
                    self.failed = false;
                }
                LoadState::Failed(err) => {
                    log::warn!("Shader `{}` source failed to load: {err}", self.label);
                    self.pending = None;
                    self.failed = true;
                    return ShaderUpdate::Failed(err.to_string());
                }
                LoadState::Abandoned => {
                    log::warn!("Shader `{}` source producer went away", self.label);
                    self.pending = None;
                    self.failed = true;
                    return ShaderUpdate::Failed("source producer went away".to_string());
                }
                LoadState::Cancelled => {}
            }
            self.pending = None;
        }

        if !self.needs_compile {
            return ShaderUpdate::Unchanged;
        }
        let Some(code) = &self.source else {
            return ShaderUpdate::Unchanged;
        };
        self.needs_compile = false;

        match device.create_shader_module(&self.label, code) {
            Ok(module) => {
                if let Some(old) = self.module.replace(module) {
                    device.destroy_shader_module(old);
                }
                self.generation += 1;
                self.failed = false;
                log::debug!("Compiled shader `{}` (generation {})", self.label, self.generation);
                ShaderUpdate::Compiled
            }
            Err(err) => {
                log::error!("Shader `{}` failed to compile: {err}", self.label);
                self.failed = true;
                ShaderUpdate::Failed(err.to_string())
            }
        }
    }

    /// Forgets the module after device loss; the retained source is compiled
    /// again on the next update.
    pub(crate) fn reset_device(&mut self) {
        self.module = None;
        self.needs_compile = self.source.is_some();
    }

    pub fn destroy<D: GpuDevice + ?Sized>(&mut self, device: &mut D) {
        if let Some(pending) = self.pending.take() {
            pending.cancel();
        }
        if let Some(module) = self.module.take() {
            device.destroy_shader_module(module);
        }
    }
}
