//! Resource Handles
//!
//! Every object owned by the [`Director`](crate::Director) is addressed by a
//! lightweight, `Copy` `slotmap` key. A handle whose object was destroyed
//! simply stops resolving; slotmap versioning keeps it from aliasing a later
//! object stored in the same slot.

use slotmap::new_key_type;

new_key_type! {
    /// Handle to a [`Buffer`](crate::resources::Buffer).
    pub struct BufferHandle;
    /// Handle to a [`Texture`](crate::resources::Texture).
    pub struct TextureHandle;
    /// Handle to a [`Sampler`](crate::resources::Sampler).
    pub struct SamplerHandle;
    /// Handle to a [`Shader`](crate::resources::Shader).
    pub struct ShaderHandle;
    /// Handle to a render or compute [`Pipeline`](crate::Pipeline).
    pub struct PipelineHandle;
    /// Handle to a [`Binding`](crate::Binding).
    pub struct BindingHandle;
    /// Handle to a render or compute [`Pass`](crate::Pass).
    pub struct PassHandle;
}

/// An object waiting in the update queue.
///
/// The derived ordering is the drain order: dependencies sort before their
/// dependents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    Buffer(BufferHandle),
    Texture(TextureHandle),
    Sampler(SamplerHandle),
    Shader(ShaderHandle),
    Pipeline(PipelineHandle),
    Binding(BindingHandle),
}

impl ResourceKey {
    /// Drain rank: buffers, textures, samplers, shaders, pipelines, bindings.
    #[inline]
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Buffer(_) => 0,
            Self::Texture(_) => 1,
            Self::Sampler(_) => 2,
            Self::Shader(_) => 3,
            Self::Pipeline(_) => 4,
            Self::Binding(_) => 5,
        }
    }
}

impl From<BufferHandle> for ResourceKey {
    fn from(h: BufferHandle) -> Self {
        Self::Buffer(h)
    }
}

impl From<TextureHandle> for ResourceKey {
    fn from(h: TextureHandle) -> Self {
        Self::Texture(h)
    }
}

impl From<SamplerHandle> for ResourceKey {
    fn from(h: SamplerHandle) -> Self {
        Self::Sampler(h)
    }
}

impl From<ShaderHandle> for ResourceKey {
    fn from(h: ShaderHandle) -> Self {
        Self::Shader(h)
    }
}

impl From<PipelineHandle> for ResourceKey {
    fn from(h: PipelineHandle) -> Self {
        Self::Pipeline(h)
    }
}

impl From<BindingHandle> for ResourceKey {
    fn from(h: BindingHandle) -> Self {
        Self::Binding(h)
    }
}
