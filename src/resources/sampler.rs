//! Samplers

use crate::device::{GpuDevice, GpuSamplerDesc, GpuSamplerId};
use crate::errors::Result;

/// Sampler description. Converted 1:1 into the device descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerDescriptor {
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

impl Default for SamplerDescriptor {
    fn default() -> Self {
        let gpu = GpuSamplerDesc::default();
        Self {
            label: gpu.label,
            address_mode_u: gpu.address_mode_u,
            address_mode_v: gpu.address_mode_v,
            address_mode_w: gpu.address_mode_w,
            mag_filter: gpu.mag_filter,
            min_filter: gpu.min_filter,
            mipmap_filter: gpu.mipmap_filter,
            lod_min_clamp: gpu.lod_min_clamp,
            lod_max_clamp: gpu.lod_max_clamp,
            compare: gpu.compare,
            anisotropy_clamp: gpu.anisotropy_clamp,
        }
    }
}

impl SamplerDescriptor {
    /// Bilinear filtering, clamped addressing.
    #[must_use]
    pub fn linear(label: &str) -> Self {
        Self {
            label: label.to_string(),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn nearest(label: &str) -> Self {
        Self {
            label: label.to_string(),
            ..Default::default()
        }
    }

    /// Depth-comparison sampler for shadow lookups.
    #[must_use]
    pub fn comparison(label: &str, compare: wgpu::CompareFunction) -> Self {
        Self {
            compare: Some(compare),
            ..Self::linear(label)
        }
    }

    /// Binding type this sampler must be declared with.
    #[must_use]
    pub fn binding_type(&self) -> wgpu::SamplerBindingType {
        if self.compare.is_some() {
            wgpu::SamplerBindingType::Comparison
        } else if self.mag_filter == wgpu::FilterMode::Nearest
            && self.min_filter == wgpu::FilterMode::Nearest
            && self.mipmap_filter == wgpu::MipmapFilterMode::Nearest
        {
            wgpu::SamplerBindingType::NonFiltering
        } else {
            wgpu::SamplerBindingType::Filtering
        }
    }

    fn to_gpu(&self) -> GpuSamplerDesc {
        GpuSamplerDesc {
            label: self.label.clone(),
            address_mode_u: self.address_mode_u,
            address_mode_v: self.address_mode_v,
            address_mode_w: self.address_mode_w,
            mag_filter: self.mag_filter,
            min_filter: self.min_filter,
            mipmap_filter: self.mipmap_filter,
            lod_min_clamp: self.lod_min_clamp,
            lod_max_clamp: self.lod_max_clamp,
            compare: self.compare,
            anisotropy_clamp: self.anisotropy_clamp,
        }
    }
}

#[derive(Debug)]
pub struct Sampler {
    desc: SamplerDescriptor,
    gpu: Option<GpuSamplerId>,
}

impl Sampler {
    #[must_use]
    pub fn new(desc: SamplerDescriptor) -> Self {
        Self { desc, gpu: None }
    }

    #[must_use]
    pub fn descriptor(&self) -> &SamplerDescriptor {
        &self.desc
    }

    #[must_use]
    pub fn gpu_id(&self) -> Option<GpuSamplerId> {
        self.gpu
    }

    #[must_use]
    pub fn is_realized(&self) -> bool {
        self.gpu.is_some()
    }

    /// Creates the device sampler once. Returns `true` when it was created
    /// by this call.
    pub fn realize<D: GpuDevice + ?Sized>(&mut self, device: &mut D) -> Result<bool> {
        if self.gpu.is_some() {
            return Ok(false);
        }
        let id = device.create_sampler(&self.desc.to_gpu())?;
        log::debug!("Created sampler `{}`", self.desc.label);
        self.gpu = Some(id);
        Ok(true)
    }

    pub(crate) fn reset_device(&mut self) {
        self.gpu = None;
    }

    pub fn destroy<D: GpuDevice + ?Sized>(&mut self, device: &mut D) {
        if let Some(id) = self.gpu.take() {
            device.destroy_sampler(id);
        }
    }
}
