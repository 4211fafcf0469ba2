//! Screen
//!
//! The swapchain-backed render target. Its size follows resize
//! notifications (clamped to the device limit), and a fresh frame view is
//! acquired at the start of every tick that has a visible pass drawing to
//! it. Passes must never hold on to a frame view across ticks.

use crate::device::{GpuDevice, GpuTextureViewId, SurfaceFrame};

/// Clamps a requested surface size to `[1, max_dimension]` per axis.
#[must_use]
pub fn clamp_extent(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let max = max_dimension.max(1);
    (width.clamp(1, max), height.clamp(1, max))
}

#[derive(Debug)]
pub struct Screen {
    size: (u32, u32),
    format: wgpu::TextureFormat,
    max_dimension: u32,
    frame: Option<SurfaceFrame>,
}

impl Screen {
    pub(crate) fn new(size: (u32, u32), format: wgpu::TextureFormat, max_dimension: u32) -> Self {
        Self {
            size: clamp_extent(size.0, size.1, max_dimension),
            format,
            max_dimension,
            frame: None,
        }
    }

    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.size.0
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.size.1
    }

    #[must_use]
    pub fn aspect_ratio(&self) -> f32 {
        self.size.0 as f32 / self.size.1 as f32
    }

    #[must_use]
    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// View of the frame acquired for the current tick.
    #[must_use]
    pub fn frame_view(&self) -> Option<GpuTextureViewId> {
        self.frame.map(|f| f.view)
    }

    pub(crate) fn frame(&self) -> Option<SurfaceFrame> {
        self.frame
    }

    /// Applies a new size. Returns `true` when the clamped size changed.
    pub(crate) fn set_size(&mut self, width: u32, height: u32) -> bool {
        let size = clamp_extent(width, height, self.max_dimension);
        if size != (width, height) {
            log::warn!(
                "Requested screen size {width}x{height} clamped to {}x{}",
                size.0,
                size.1
            );
        }
        if size == self.size {
            return false;
        }
        self.size = size;
        true
    }

    /// Updates the surface format. Returns `true` when it changed.
    pub(crate) fn set_format(&mut self, format: wgpu::TextureFormat) -> bool {
        std::mem::replace(&mut self.format, format) != format
    }

    pub(crate) fn set_max_dimension(&mut self, max_dimension: u32) {
        self.max_dimension = max_dimension;
        self.size = clamp_extent(self.size.0, self.size.1, max_dimension);
    }

    /// Acquires this tick's frame. Returns `false` when the surface is not
    /// available; screen passes are skipped for the tick.
    pub(crate) fn acquire<D: GpuDevice + ?Sized>(&mut self, device: &mut D) -> bool {
        self.frame = device.acquire_frame();
        if self.frame.is_none() {
            log::trace!("No screen frame available this tick");
        }
        self.frame.is_some()
    }

    /// Drops the frame view once the tick has been submitted.
    pub(crate) fn release_frame(&mut self) {
        self.frame = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_extent_bounds_both_axes() {
        assert_eq!(clamp_extent(0, 0, 8192), (1, 1));
        assert_eq!(clamp_extent(10_000, 600, 8192), (8192, 600));
        assert_eq!(clamp_extent(640, 480, 0), (1, 1));
    }

    #[test]
    fn set_size_reports_changes_only() {
        let mut screen = Screen::new((800, 600), wgpu::TextureFormat::Bgra8UnormSrgb, 4096);
        assert!(!screen.set_size(800, 600));
        assert!(screen.set_size(5000, 600));
        assert_eq!(screen.size(), (4096, 600));
    }
}
