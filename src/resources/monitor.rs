//! Memory accounting for device-backed resources.

/// Tracks bytes claimed by buffers and textures.
///
/// Buffers account their size at construction, textures when their device
/// object is created. Numbers are estimates of device memory, not
/// measurements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Monitor {
    buffer_bytes: u64,
    texture_bytes: u64,
    peak_bytes: u64,
    buffer_count: u32,
    texture_count: u32,
}

impl Monitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate_buffer(&mut self, bytes: u64) {
        self.buffer_bytes += bytes;
        self.buffer_count += 1;
        self.update_peak();
    }

    /// Adjusts a live buffer's accounting after it grew.
    pub fn resize_buffer(&mut self, old_bytes: u64, new_bytes: u64) {
        self.buffer_bytes = self.buffer_bytes.saturating_sub(old_bytes) + new_bytes;
        self.update_peak();
    }

    pub fn free_buffer(&mut self, bytes: u64) {
        self.buffer_bytes = self.buffer_bytes.saturating_sub(bytes);
        self.buffer_count = self.buffer_count.saturating_sub(1);
    }

    pub fn allocate_texture(&mut self, bytes: u64) {
        self.texture_bytes += bytes;
        self.texture_count += 1;
        self.update_peak();
    }

    pub fn free_texture(&mut self, bytes: u64) {
        self.texture_bytes = self.texture_bytes.saturating_sub(bytes);
        self.texture_count = self.texture_count.saturating_sub(1);
    }

    #[inline]
    fn update_peak(&mut self) {
        self.peak_bytes = self.peak_bytes.max(self.total_bytes());
    }

    #[must_use]
    pub fn buffer_bytes(&self) -> u64 {
        self.buffer_bytes
    }

    #[must_use]
    pub fn texture_bytes(&self) -> u64 {
        self.texture_bytes
    }

    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.buffer_bytes + self.texture_bytes
    }

    #[must_use]
    pub fn peak_bytes(&self) -> u64 {
        self.peak_bytes
    }

    #[must_use]
    pub fn buffer_count(&self) -> u32 {
        self.buffer_count
    }

    #[must_use]
    pub fn texture_count(&self) -> u32 {
        self.texture_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_survives_frees() {
        let mut m = Monitor::new();
        m.allocate_buffer(64);
        m.allocate_texture(256);
        m.free_buffer(64);
        assert_eq!(m.total_bytes(), 256);
        assert_eq!(m.peak_bytes(), 320);
        assert_eq!(m.buffer_count(), 0);
    }
}
