//! Textures
//!
//! A [`Texture`] owns one device texture and its default view. The size is
//! either fixed or derived from the screen; screen-sized textures are
//! recreated on every resize. Each recreation bumps [`Texture::version`],
//! which invalidates bind groups and attachments referencing the old view.
//!
//! Texel data may arrive asynchronously through a
//! [`PendingLoad`](crate::loader::PendingLoad); the texture is complete only
//! after the data has been uploaded.

use crate::device::{GpuDevice, GpuTextureDesc, GpuTextureId, GpuTextureViewId};
use crate::errors::{Error, Result};
use crate::loader::{LoadState, PendingLoad};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextureSize {
    Fixed {
        width: u32,
        height: u32,
        depth_or_array_layers: u32,
    },
    /// Fraction of the screen size, recomputed on resize.
    Screen { scale: f32 },
}

impl TextureSize {
    #[must_use]
    pub fn fixed(width: u32, height: u32) -> Self {
        Self::Fixed {
            width,
            height,
            depth_or_array_layers: 1,
        }
    }

    /// Full-resolution screen-sized texture.
    #[must_use]
    pub fn screen() -> Self {
        Self::Screen { scale: 1.0 }
    }

    #[must_use]
    pub fn is_screen_dependent(&self) -> bool {
        matches!(self, Self::Screen { .. })
    }

    /// Concrete extent for the given screen size.
    #[must_use]
    pub fn extent(&self, screen: (u32, u32)) -> wgpu::Extent3d {
        match *self {
            Self::Fixed {
                width,
                height,
                depth_or_array_layers,
            } => wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers,
            },
            Self::Screen { scale } => wgpu::Extent3d {
                width: ((screen.0 as f32 * scale) as u32).max(1),
                height: ((screen.1 as f32 * scale) as u32).max(1),
                depth_or_array_layers: 1,
            },
        }
    }
}

#[derive(Debug, Default)]
pub enum TextureData {
    #[default]
    None,
    /// Tightly packed texels for mip level 0.
    Bytes(Vec<u8>),
    Pending(PendingLoad<Vec<u8>>),
}

#[derive(Debug)]
pub struct TextureDescriptor {
    pub label: String,
    pub format: wgpu::TextureFormat,
    pub size: TextureSize,
    pub usage: wgpu::TextureUsages,
    pub mip_level_count: u32,
    pub sample_count: u32,
    pub dimension: wgpu::TextureDimension,
    pub view_dimension: wgpu::TextureViewDimension,
    pub data: TextureData,
}

impl TextureDescriptor {
    /// Sampled 2D texture.
    #[must_use]
    pub fn new(label: &str, format: wgpu::TextureFormat, size: TextureSize) -> Self {
        Self {
            label: label.to_string(),
            format,
            size,
            usage: wgpu::TextureUsages::TEXTURE_BINDING,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            view_dimension: wgpu::TextureViewDimension::D2,
            data: TextureData::None,
        }
    }

    /// Screen-sized render target.
    #[must_use]
    pub fn render_target(label: &str, format: wgpu::TextureFormat) -> Self {
        Self {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            ..Self::new(label, format, TextureSize::screen())
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: TextureData) -> Self {
        self.data = data;
        self
    }
}

/// Outcome of one [`Texture::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum TextureUpdate {
    /// Data still loading; poll again next tick.
    Waiting,
    /// Device texture (re)created. `freed` is the accounting of the texture
    /// it replaced.
    Created { bytes: u64, freed: u64 },
    Unchanged,
    /// Data load or upload failed; the texture will not complete until new
    /// data is set. Its device texture is released and `freed` is the
    /// accounting that went with it.
    Failed { message: String, freed: u64 },
}

#[derive(Debug)]
pub struct Texture {
    label: String,
    format: wgpu::TextureFormat,
    size: TextureSize,
    usage: wgpu::TextureUsages,
    mip_level_count: u32,
    sample_count: u32,
    dimension: wgpu::TextureDimension,
    view_dimension: wgpu::TextureViewDimension,

    pending: Option<PendingLoad<Vec<u8>>>,
    /// Retained for rebuilds.
    data: Option<Vec<u8>>,
    uploaded: bool,
    failed: bool,

    extent: wgpu::Extent3d,
    gpu: Option<(GpuTextureId, GpuTextureViewId)>,
    needs_create: bool,
    accounted: u64,
    version: u64,
}

impl Texture {
    pub fn new(desc: TextureDescriptor, screen: (u32, u32)) -> Result<Self> {
        if desc.label.is_empty() {
            return Err(Error::MissingField {
                context: "texture description".to_string(),
                field: "label",
            });
        }
        let mut usage = desc.usage;
        let (pending, data) = match desc.data {
            TextureData::None => (None, None),
            TextureData::Bytes(bytes) => (None, Some(bytes)),
            TextureData::Pending(load) => (Some(load), None),
        };
        if pending.is_some() || data.is_some() {
            usage |= wgpu::TextureUsages::COPY_DST;
        }
        Ok(Self {
            label: desc.label,
            format: desc.format,
            extent: desc.size.extent(screen),
            size: desc.size,
            usage,
            mip_level_count: desc.mip_level_count.max(1),
            sample_count: desc.sample_count.max(1),
            dimension: desc.dimension,
            view_dimension: desc.view_dimension,
            pending,
            data,
            uploaded: false,
            failed: false,
            gpu: None,
            needs_create: true,
            accounted: 0,
            version: 0,
        })
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    #[must_use]
    pub fn extent(&self) -> wgpu::Extent3d {
        self.extent
    }

    #[must_use]
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    #[must_use]
    pub fn view_dimension(&self) -> wgpu::TextureViewDimension {
        self.view_dimension
    }

    #[must_use]
    pub fn is_screen_dependent(&self) -> bool {
        self.size.is_screen_dependent()
    }

    /// Bumped every time the device texture is recreated.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn view(&self) -> Option<GpuTextureViewId> {
        self.gpu.map(|(_, view)| view)
    }

    #[must_use]
    pub fn gpu_id(&self) -> Option<GpuTextureId> {
        self.gpu.map(|(id, _)| id)
    }

    /// Device texture exists and any expected data has been uploaded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.failed && self.pending.is_none() && self.gpu.is_some() && (self.data.is_none() || self.uploaded)
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Estimated device memory for the current extent.
    #[must_use]
    pub fn byte_size(&self) -> u64 {
        let texel = u64::from(self.format.block_copy_size(None).unwrap_or(4));
        u64::from(self.extent.width)
            * u64::from(self.extent.height)
            * u64::from(self.extent.depth_or_array_layers)
            * texel
            * u64::from(self.sample_count)
    }

    /// Replaces the texel data; the texture is re-uploaded on the next update.
    pub(crate) fn set_data(&mut self, data: TextureData) {
        if let Some(old) = self.pending.take() {
            old.cancel();
        }
        match data {
            TextureData::None => self.data = None,
            TextureData::Bytes(bytes) => self.data = Some(bytes),
            TextureData::Pending(load) => {
                self.data = None;
                self.pending = Some(load);
            }
        }
        if !self.usage.contains(wgpu::TextureUsages::COPY_DST) {
            self.usage |= wgpu::TextureUsages::COPY_DST;
            self.needs_create = true;
        }
        self.uploaded = false;
        self.failed = false;
    }

    /// Recomputes the extent of a screen-sized texture. Returns `true` when
    /// the texture must be recreated.
    pub(crate) fn resize(&mut self, screen: (u32, u32)) -> bool {
        let extent = self.size.extent(screen);
        if extent == self.extent {
            return false;
        }
        self.extent = extent;
        self.needs_create = true;
        true
    }

    /// Forgets device objects after device loss. Returns the accounting
    /// that was released.
    pub(crate) fn reset_device(&mut self) -> u64 {
        self.gpu = None;
        self.uploaded = false;
        std::mem::take(&mut self.accounted)
    }

    /// Polls pending data, (re)creates the device texture when its extent
    /// changed and uploads data that has not been uploaded yet.
    pub fn update<D: GpuDevice + ?Sized>(&mut self, device: &mut D) -> TextureUpdate {
        if self.failed {
            return TextureUpdate::Unchanged;
        }
        // Accounting the caller currently holds for this texture.
        let accounted = self.accounted;

        if let Some(pending) = &mut self.pending {
            match pending.poll() {
                LoadState::Pending => return TextureUpdate::Waiting,
                LoadState::Ready(bytes) => {
                    self.data = Some(bytes);
                    self.uploaded = false;
                }
                LoadState::Failed(err) => {
                    self.pending = None;
                    return self.fail(device, accounted, format!("texel data failed to load: {err}"));
                }
                LoadState::Abandoned => {
                    self.pending = None;
                    return self.fail(device, accounted, "texel data producer went away".to_string());
                }
                LoadState::Cancelled => {}
            }
            self.pending = None;
        }

        let mut outcome = TextureUpdate::Unchanged;
        if self.gpu.is_none() || self.needs_create {
            if let Some((old, _)) = self.gpu.take() {
                device.destroy_texture(old);
            }
            let desc = GpuTextureDesc {
                label: self.label.clone(),
                size: self.extent,
                format: self.format,
                usage: self.usage,
                mip_level_count: self.mip_level_count,
                sample_count: self.sample_count,
                dimension: self.dimension,
                view_dimension: self.view_dimension,
            };
            match device.create_texture(&desc) {
                Ok(pair) => {
                    self.gpu = Some(pair);
                    self.needs_create = false;
                    self.version += 1;
                    self.uploaded = false;
                    log::debug!(
                        "Created texture `{}` {}x{} (v{})",
                        self.label,
                        self.extent.width,
                        self.extent.height,
                        self.version
                    );
                    let bytes = self.byte_size();
                    outcome = TextureUpdate::Created {
                        bytes,
                        freed: std::mem::replace(&mut self.accounted, bytes),
                    };
                }
                Err(err) => return self.fail(device, accounted, err.to_string()),
            }
        }

        if let (Some(data), Some((id, _)), false) = (&self.data, self.gpu, self.uploaded) {
            let expected = self.byte_size() / u64::from(self.sample_count);
            if data.len() as u64 != expected {
                let message = format!("expected {expected} bytes of texel data, got {}", data.len());
                return self.fail(device, accounted, message);
            }
            device.write_texture(id, data);
            self.uploaded = true;
        }
        outcome
    }

    /// Marks the texture broken and drops its device object so nothing
    /// can bind a texture without its data.
    fn fail<D: GpuDevice + ?Sized>(&mut self, device: &mut D, accounted: u64, message: String) -> TextureUpdate {
        log::warn!("Texture `{}` is broken: {message}", self.label);
        self.failed = true;
        if let Some((id, _)) = self.gpu.take() {
            device.destroy_texture(id);
        }
        self.accounted = 0;
        TextureUpdate::Failed { message, freed: accounted }
    }

    pub fn destroy<D: GpuDevice + ?Sized>(&mut self, device: &mut D) -> u64 {
        if let Some(pending) = self.pending.take() {
            pending.cancel();
        }
        if let Some((id, _)) = self.gpu.take() {
            device.destroy_texture(id);
        }
        std::mem::take(&mut self.accounted)
    }
}
