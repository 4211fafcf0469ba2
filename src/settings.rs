//! Director & Device Settings
//!
//! Configuration for the two halves of the crate:
//!
//! - [`DirectorSettings`] tunes the per-frame scheduler (clear color, initial
//!   screen size, late buffer flush, stats logging).
//! - [`DeviceSettings`] configures adapter/device acquisition for the wgpu
//!   backend.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tessera::{Director, DirectorSettings, HeadlessDevice};
//!
//! let settings = DirectorSettings {
//!     screen_size: (1280, 720),
//!     ..Default::default()
//! };
//! let director = Director::new(HeadlessDevice::new(), settings);
//! ```

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct DirectorSettings {
    /// Clear color used by color attachments declared with
    /// [`LoadAction::ClearDefault`](crate::LoadAction::ClearDefault).
    pub clear_color: wgpu::Color,

    /// Initial logical screen size, in physical pixels.
    ///
    /// Clamped to the device's `max_texture_dimension_2d` on startup.
    pub screen_size: (u32, u32),

    /// Flush buffers dirtied during pass updates (per-frame dynamic
    /// uniforms) before recording, instead of deferring them to the next
    /// tick.
    pub late_flush: bool,

    /// Log a `FrameStats` summary every N frames at `debug` level.
    /// `0` disables it.
    pub stats_log_interval: u64,
}

impl Default for DirectorSettings {
    fn default() -> Self {
        Self {
            clear_color: wgpu::Color::BLACK,
            screen_size: (800, 600),
            late_flush: true,
            stats_log_interval: 0,
        }
    }
}

/// Adapter / device acquisition settings for [`WgpuDevice`](crate::WgpuDevice).
#[derive(Debug, Clone)]
pub struct DeviceSettings {
    /// GPU power preference.
    pub power_preference: wgpu::PowerPreference,
    /// Features the device must support.
    pub required_features: wgpu::Features,
    /// Limits the device must satisfy.
    pub required_limits: wgpu::Limits,
    /// Wait for vblank when presenting.
    pub vsync: bool,
    /// Preferred surface format. Falls back to the surface default when the
    /// adapter does not support it.
    pub surface_format: Option<wgpu::TextureFormat>,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            vsync: true,
            surface_format: None,
        }
    }
}
