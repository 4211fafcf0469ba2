//! Resource Objects
//!
//! CPU-side descriptions that each own (at most) one device object:
//!
//! - [`ArrayRef`] / [`BlockRef`]: observable byte sources feeding buffers
//! - [`Buffer`]: vertex, index, indirect, storage and uniform buffers
//! - [`Texture`], [`Sampler`], [`Shader`]
//! - [`Monitor`]: memory accounting
//!
//! None of these talk to the device on construction. The
//! [`Director`](crate::Director) realizes them during `tick`.

pub mod block;
pub mod buffer;
pub mod monitor;
pub mod reference;
pub mod sampler;
pub mod shader;
pub mod texture;

pub use block::{BlockField, BlockLayout, BlockRef, FieldSource, UniformType, UniformValue};
pub use buffer::{
    Buffer, BufferDescriptor, BufferKind, FlushOutcome, Reference, Region, RegionDescriptor,
};
pub use monitor::Monitor;
pub use reference::{ArrayRef, CallbackSlot, RefCallback};
pub use sampler::{Sampler, SamplerDescriptor};
pub use shader::{Shader, ShaderDescriptor, ShaderSource, ShaderUpdate};
pub use texture::{Texture, TextureData, TextureDescriptor, TextureSize, TextureUpdate};

use slotmap::SlotMap;

use crate::handles::{BufferHandle, SamplerHandle, TextureHandle};

/// Read-only view of the resource storages, lent to bindings and passes
/// while they resolve device objects.
#[derive(Clone, Copy)]
pub(crate) struct ResourceTables<'a> {
    pub buffers: &'a SlotMap<BufferHandle, Buffer>,
    pub textures: &'a SlotMap<TextureHandle, Texture>,
    pub samplers: &'a SlotMap<SamplerHandle, Sampler>,
}
