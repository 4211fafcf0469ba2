//! # Tessera
//!
//! Resource lifecycle and per-frame scheduling over a GPU device API.
//!
//! Callers describe buffers, textures, samplers, shaders, pipelines,
//! bindings and passes with plain descriptors. The [`Director`] owns every
//! object, turns pending creation and update requests into device objects
//! once per frame, and executes the passes of visible stages in declared
//! order.
//!
//! ```rust,ignore
//! use tessera::*;
//!
//! let mut director = Director::new(HeadlessDevice::new(), DirectorSettings::default());
//!
//! let positions = ArrayRef::new("positions", &[[0.0f32, 0.5], [-0.5, -0.5], [0.5, -0.5]])?;
//! let vertices = director.create_buffer(
//!     BufferDescriptor::new("triangle", BufferKind::vertex(8, vec![/* attributes */]))
//!         .with_region(RegionDescriptor::new(positions)),
//! )?;
//! let shader = director.create_shader(ShaderDescriptor::wgsl("triangle", WGSL))?;
//! let pipeline = director.create_render_pipeline(RenderPipelineDescriptor::new("triangle", shader))?;
//! let binding = director.create_binding(
//!     BindingDescriptor::with_fixed_range("triangle", &[3]).vertex_buffer(vertices),
//! )?;
//! let pass = director.create_pass(PassDescriptor::render("main", vec![ColorAttachment::screen()], None))?;
//! director.add_item(pass, pipeline, binding)?;
//! director.add_stage(StageDescriptor::new("main", [pass]))?;
//!
//! loop {
//!     director.tick();
//! }
//! ```

#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod binding;
pub mod device;
pub mod director;
pub mod errors;
pub mod handles;
pub mod loader;
pub mod pass;
pub mod pipeline;
pub mod resources;
pub mod screen;
pub mod settings;

pub use binding::{
    Binding, BindingDescriptor, BindingKind, BufferEntry, DrawRange, SamplerEntry, TextureEntry,
};
pub use device::{Command, CommandEncoder, DeviceCall, GpuDevice, HeadlessDevice, WgpuDevice};
pub use director::{Director, DirectorEvent, FrameStats, ListenerId, Stage, StageDescriptor};
pub use errors::{Error, Result};
pub use handles::{
    BindingHandle, BufferHandle, PassHandle, PipelineHandle, ResourceKey, SamplerHandle,
    ShaderHandle, TextureHandle,
};
pub use loader::{LoadSender, LoadState, PendingLoad};
pub use pass::{
    AttachmentTarget, ColorAttachment, DepthAttachment, LoadAction, Pass, PassDescriptor, PassKind,
};
pub use pipeline::{
    ComputePipelineDescriptor, DepthState, Pipeline, RenderPipelineDescriptor, RenderTargets,
};
pub use resources::{
    ArrayRef, BlockLayout, BlockRef, Buffer, BufferDescriptor, BufferKind, FieldSource, Monitor,
    Reference, RegionDescriptor, Sampler, SamplerDescriptor, Shader, ShaderDescriptor,
    ShaderSource, Texture, TextureData, TextureDescriptor, TextureSize, UniformType, UniformValue,
};
pub use screen::Screen;
pub use settings::{DeviceSettings, DirectorSettings};
