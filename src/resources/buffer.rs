//! Buffer Family
//!
//! One [`Buffer`] type covers vertex, index, indirect, storage and uniform
//! buffers; the [`BufferKind`] tag supplies default usage flags and the
//! layout information a [`Binding`](crate::Binding) needs.
//!
//! A buffer is a sequence of named regions, each backed by a [`Reference`].
//! Regions subscribe to their reference: a mutation marks the region dirty
//! and re-enqueues the buffer with the director. [`Buffer::flush`] then emits
//! one device write per dirty region, in registration order.
//!
//! ```text
//! offset 0            align_up(end(R1), A2)
//! ┌──────────────────┬───pad───┬──────────────────┐
//! │ R1 (ArrayRef)    │         │ R2 (BlockRef)    │
//! └──────────────────┴─────────┴──────────────────┘
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use super::block::BlockRef;
use super::reference::{ArrayRef, CallbackSlot};
use crate::device::{GpuBufferDesc, GpuBufferId, GpuDevice, OwnedVertexBufferLayout};
use crate::errors::{Error, Result};
use crate::handles::{BufferHandle, ResourceKey};

// ============================================================================
// Kinds
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum BufferKind {
    Vertex {
        stride: u64,
        step_mode: wgpu::VertexStepMode,
        attributes: Vec<wgpu::VertexAttribute>,
    },
    Index {
        format: wgpu::IndexFormat,
    },
    Indirect,
    Storage {
        read_only: bool,
    },
    Uniform,
}

impl BufferKind {
    /// Vertex buffer with per-vertex stepping.
    #[must_use]
    pub fn vertex(stride: u64, attributes: Vec<wgpu::VertexAttribute>) -> Self {
        Self::Vertex {
            stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes,
        }
    }

    #[must_use]
    pub fn default_usage(&self) -> wgpu::BufferUsages {
        match self {
            Self::Vertex { .. } => wgpu::BufferUsages::VERTEX,
            Self::Index { .. } => wgpu::BufferUsages::INDEX,
            Self::Indirect => wgpu::BufferUsages::INDIRECT,
            Self::Storage { .. } => wgpu::BufferUsages::STORAGE,
            Self::Uniform => wgpu::BufferUsages::UNIFORM,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Vertex { .. } => "vertex",
            Self::Index { .. } => "index",
            Self::Indirect => "indirect",
            Self::Storage { .. } => "storage",
            Self::Uniform => "uniform",
        }
    }

    #[must_use]
    pub fn vertex_layout(&self) -> Option<OwnedVertexBufferLayout> {
        match self {
            Self::Vertex {
                stride,
                step_mode,
                attributes,
            } => Some(OwnedVertexBufferLayout {
                array_stride: *stride,
                step_mode: *step_mode,
                attributes: attributes.clone(),
            }),
            _ => None,
        }
    }

    #[must_use]
    pub fn index_format(&self) -> Option<wgpu::IndexFormat> {
        match self {
            Self::Index { format } => Some(*format),
            _ => None,
        }
    }
}

// ============================================================================
// References & descriptors
// ============================================================================

/// Data source of one region.
#[derive(Debug, Clone)]
pub enum Reference {
    Array(ArrayRef),
    Block(BlockRef),
}

impl Reference {
    #[must_use]
    pub fn array(&self) -> &ArrayRef {
        match self {
            Self::Array(a) => a,
            Self::Block(b) => b.array(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.array().name()
    }

    #[must_use]
    pub fn as_block(&self) -> Option<&BlockRef> {
        match self {
            Self::Block(b) => Some(b),
            Self::Array(_) => None,
        }
    }
}

impl From<ArrayRef> for Reference {
    fn from(r: ArrayRef) -> Self {
        Self::Array(r)
    }
}

impl From<BlockRef> for Reference {
    fn from(r: BlockRef) -> Self {
        Self::Block(r)
    }
}

#[derive(Debug, Clone)]
pub struct RegionDescriptor {
    pub reference: Reference,
    /// Explicit start offset. Defaults to the end of the previous region
    /// rounded up to `alignment`.
    pub offset: Option<u64>,
    /// Bytes reserved for the region. Defaults to the padded reference length.
    pub size: Option<u64>,
    pub alignment: u64,
}

impl RegionDescriptor {
    #[must_use]
    pub fn new(reference: impl Into<Reference>) -> Self {
        Self {
            reference: reference.into(),
            offset: None,
            size: None,
            alignment: 1,
        }
    }

    #[must_use]
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    #[must_use]
    pub fn with_alignment(mut self, alignment: u64) -> Self {
        self.alignment = alignment;
        self
    }
}

#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub label: String,
    pub kind: BufferKind,
    /// Declared byte size. When set it must equal the extent of the regions.
    pub size: Option<u64>,
    pub regions: Vec<RegionDescriptor>,
    pub extra_usage: wgpu::BufferUsages,
}

impl BufferDescriptor {
    #[must_use]
    pub fn new(label: &str, kind: BufferKind) -> Self {
        Self {
            label: label.to_string(),
            kind,
            size: None,
            regions: Vec::new(),
            extra_usage: wgpu::BufferUsages::empty(),
        }
    }

    #[must_use]
    pub fn with_region(mut self, region: RegionDescriptor) -> Self {
        self.regions.push(region);
        self
    }

    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

// ============================================================================
// Buffer
// ============================================================================

#[derive(Debug)]
pub struct Region {
    pub name: String,
    pub reference: Reference,
    pub offset: u64,
    pub size: u64,
    pub alignment: u64,
    slot: Option<CallbackSlot>,
    oversize_reported: bool,
}

impl Region {
    #[inline]
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Result of one [`Buffer::flush`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    pub created: bool,
    pub writes: u32,
}

type Notifier = (BufferHandle, flume::Sender<ResourceKey>);

#[derive(Debug)]
pub struct Buffer {
    label: String,
    kind: BufferKind,
    declared_size: Option<u64>,
    extra_usage: wgpu::BufferUsages,
    regions: Vec<Region>,
    extent: u64,

    /// Indices of regions awaiting a write. Shared with reference callbacks.
    dirty: Arc<Mutex<FxHashSet<usize>>>,
    notifier: Option<Notifier>,

    gpu: Option<GpuBufferId>,
    gpu_size: u64,
    destroyed: bool,
}

impl Buffer {
    /// Validates the description and lays out its regions. References are
    /// claimed later by [`attach`](Self::attach), so a failed construction
    /// leaves them untouched.
    pub fn new(desc: BufferDescriptor) -> Result<Self> {
        if desc.label.is_empty() {
            return Err(Error::MissingField {
                context: "buffer description".to_string(),
                field: "label",
            });
        }
        if let BufferKind::Vertex { stride: 0, .. } = desc.kind {
            return Err(Error::MissingField {
                context: format!("vertex buffer `{}`", desc.label),
                field: "stride",
            });
        }
        if desc.regions.is_empty() && desc.size.is_none() {
            return Err(Error::MissingField {
                context: format!("buffer `{}`", desc.label),
                field: "regions",
            });
        }

        let mut buffer = Self {
            label: desc.label,
            kind: desc.kind,
            declared_size: desc.size,
            extra_usage: desc.extra_usage,
            regions: Vec::with_capacity(desc.regions.len()),
            extent: 0,
            dirty: Arc::new(Mutex::new(FxHashSet::default())),
            notifier: None,
            gpu: None,
            gpu_size: 0,
            destroyed: false,
        };

        for region in desc.regions {
            buffer.place_region(region, true)?;
        }

        if let Some(declared) = buffer.declared_size
            && !buffer.regions.is_empty()
            && declared != buffer.extent
        {
            return Err(Error::SizeMismatch {
                label: buffer.label,
                declared,
                computed: buffer.extent,
            });
        }
        Ok(buffer)
    }

    /// Computes the placement of `desc` and appends it. `strict` enforces the
    /// declared size; late registrations grow the buffer instead.
    fn place_region(&mut self, desc: RegionDescriptor, strict: bool) -> Result<usize> {
        let name = desc.reference.name().to_string();
        let alignment = desc.alignment;
        if alignment == 0 || !alignment.is_power_of_two() {
            return Err(Error::InvalidAlignment(alignment));
        }
        if self.regions.iter().any(|r| r.name == name) {
            return Err(Error::DuplicateRegion {
                label: self.label.clone(),
                region: name,
            });
        }
        if desc.reference.array().is_destroyed() {
            return Err(Error::Destroyed(name));
        }

        let data_len = desc.reference.array().byte_len() as u64;
        let size = match desc.size {
            Some(reserved) if reserved < data_len => {
                return Err(Error::SizeMismatch {
                    label: name,
                    declared: reserved,
                    computed: data_len,
                });
            }
            Some(reserved) => reserved.next_multiple_of(4),
            None => data_len,
        };

        let offset = match desc.offset {
            Some(offset) => {
                let reason = if offset % alignment != 0 {
                    Some("not a multiple of the region alignment")
                } else if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
                    Some("not a multiple of the copy alignment (4)")
                } else if offset < self.extent {
                    Some("overlaps the previous region")
                } else {
                    None
                };
                if let Some(reason) = reason {
                    return Err(Error::InvalidOffset {
                        region: name,
                        offset,
                        reason,
                    });
                }
                offset
            }
            None => self.extent.next_multiple_of(alignment),
        };

        let end = offset + size;
        if strict
            && let Some(declared) = self.declared_size
            && end > declared
        {
            return Err(Error::RegionOverflow {
                region: name,
                end,
                size: declared,
            });
        }

        self.regions.push(Region {
            name,
            reference: desc.reference,
            offset,
            size,
            alignment,
            slot: None,
            oversize_reported: false,
        });
        self.extent = end;
        Ok(self.regions.len() - 1)
    }

    /// Claims every reference and subscribes to its mutations. Called once
    /// the buffer has a handle.
    pub(crate) fn attach(&mut self, handle: BufferHandle, notify: flume::Sender<ResourceKey>) -> Result<()> {
        self.notifier = Some((handle, notify));
        for index in 0..self.regions.len() {
            if let Err(err) = self.claim(index) {
                self.unclaim(index);
                self.notifier = None;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Undoes the claims of the first `count` regions.
    fn unclaim(&mut self, count: usize) {
        for region in &mut self.regions[..count] {
            if let Some(slot) = region.slot.take() {
                region.reference.array().remove_callback(slot);
            }
            region.reference.array().release();
        }
        self.dirty.lock().clear();
    }

    fn claim(&mut self, index: usize) -> Result<()> {
        let region = &self.regions[index];
        region.reference.array().retain()?;
        let slot = self.notifier.as_ref().map(|(handle, tx)| {
            let dirty = Arc::clone(&self.dirty);
            let tx = tx.clone();
            let key = ResourceKey::Buffer(*handle);
            region.reference.array().register_callback(Arc::new(move |_| {
                dirty.lock().insert(index);
                // Closed channel: the director is gone.
                let _ = tx.send(key);
            }))
        });
        self.regions[index].slot = slot;
        self.dirty.lock().insert(index);
        Ok(())
    }

    /// Appends a region after construction. Growing past the current device
    /// size recreates the device buffer on the next flush.
    pub(crate) fn register_region(&mut self, desc: RegionDescriptor) -> Result<()> {
        let index = self.place_region(desc, false)?;
        if let Err(err) = self.claim(index) {
            self.regions.pop();
            self.extent = self.regions.last().map_or(0, Region::end);
            return Err(err);
        }
        if self.declared_size.is_some_and(|d| d < self.extent) {
            self.declared_size = Some(self.extent);
        }
        log::debug!(
            "Buffer `{}` registered region #{index}, extent now {}",
            self.label,
            self.extent
        );
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn kind(&self) -> &BufferKind {
        &self.kind
    }

    /// Logical size: the declared size, or the region extent.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.declared_size.unwrap_or(0).max(self.extent)
    }

    /// Size of the device buffer this description produces.
    #[must_use]
    pub fn device_size(&self) -> u64 {
        self.size().next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT)
    }

    #[must_use]
    pub fn usage(&self) -> wgpu::BufferUsages {
        self.kind.default_usage() | wgpu::BufferUsages::COPY_DST | self.extra_usage
    }

    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    #[must_use]
    pub fn region(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.name == name)
    }

    #[must_use]
    pub fn gpu_id(&self) -> Option<GpuBufferId> {
        self.gpu
    }

    #[must_use]
    pub fn is_realized(&self) -> bool {
        self.gpu.is_some()
    }

    /// Work is pending for the next flush.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.needs_create() || !self.dirty.lock().is_empty()
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Block references that carry per-frame dynamic fields.
    pub fn dynamic_blocks(&self) -> impl Iterator<Item = &BlockRef> {
        self.regions
            .iter()
            .filter_map(|r| r.reference.as_block())
            .filter(|b| b.has_dynamic_fields())
    }

    #[inline]
    fn needs_create(&self) -> bool {
        self.gpu.is_none() || self.gpu_size < self.device_size()
    }

    // ========================================================================
    // Device synchronization
    // ========================================================================

    /// Creates the device buffer if needed and writes every dirty region.
    pub fn flush<D: GpuDevice + ?Sized>(&mut self, device: &mut D) -> FlushOutcome {
        let mut outcome = FlushOutcome::default();
        if self.destroyed {
            return outcome;
        }

        if self.needs_create() {
            if let Some(old) = self.gpu.take() {
                device.destroy_buffer(old);
            }
            let size = self.device_size();
            match device.create_buffer(&GpuBufferDesc {
                label: self.label.clone(),
                size,
                usage: self.usage(),
            }) {
                Ok(id) => {
                    log::debug!("Created {} buffer `{}` ({size} bytes)", self.kind.name(), self.label);
                    self.gpu = Some(id);
                    self.gpu_size = size;
                    outcome.created = true;
                    self.dirty.lock().extend(0..self.regions.len());
                }
                Err(err) => {
                    log::error!("Buffer `{}` could not be created: {err}", self.label);
                    return outcome;
                }
            }
        }

        let Some(gpu) = self.gpu else {
            return outcome;
        };

        let mut pending: Vec<usize> = self.dirty.lock().drain().collect();
        pending.sort_unstable();

        for index in pending {
            let Some(region) = self.regions.get_mut(index) else {
                continue;
            };
            // A reference that outgrew its region is left unwritten until it fits again.
            let written = region.reference.array().with_bytes(|bytes| {
                let len = bytes.len() as u64;
                if len > region.size {
                    return Err(len);
                }
                if len > 0 {
                    device.write_buffer(gpu, region.offset, bytes);
                }
                Ok(len > 0)
            });
            match written {
                Ok(Ok(wrote)) => {
                    region.oversize_reported = false;
                    if wrote {
                        outcome.writes += 1;
                    }
                }
                Ok(Err(len)) => {
                    if !region.oversize_reported {
                        log::warn!(
                            "Buffer `{}` skipped region `{}`: {len} bytes do not fit the {} reserved",
                            self.label,
                            region.name,
                            region.size
                        );
                        region.oversize_reported = true;
                    }
                }
                Err(err) => log::warn!("Buffer `{}` skipped region `{}`: {err}", self.label, region.name),
            }
        }
        outcome
    }

    /// Forgets the device buffer without touching the device (after device
    /// loss). The next flush recreates and rewrites everything.
    pub(crate) fn reset_device(&mut self) {
        self.gpu = None;
        self.gpu_size = 0;
    }

    /// Frees the device buffer, unsubscribes and releases every reference.
    /// Returns the device size that was accounted.
    pub fn destroy<D: GpuDevice + ?Sized>(&mut self, device: &mut D) -> u64 {
        if self.destroyed {
            return 0;
        }
        self.destroyed = true;
        if let Some(id) = self.gpu.take() {
            device.destroy_buffer(id);
        }
        let attached = self.notifier.take().is_some();
        for region in &mut self.regions {
            if let Some(slot) = region.slot.take() {
                region.reference.array().remove_callback(slot);
            }
            if attached {
                let remaining = region.reference.array().release();
                log::trace!("Reference `{}` use count now {remaining}", region.name);
            }
        }
        self.dirty.lock().clear();
        log::debug!("Destroyed buffer `{}`", self.label);
        self.device_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(name: &str, len: usize) -> ArrayRef {
        ArrayRef::from_bytes(name, &vec![1u8; len], 1).unwrap()
    }

    #[test]
    fn default_offsets_follow_alignment() {
        let desc = BufferDescriptor::new("b", BufferKind::Uniform)
            .with_region(RegionDescriptor::new(bytes("a", 20)))
            .with_region(RegionDescriptor::new(bytes("b", 8)).with_alignment(16));
        let buffer = Buffer::new(desc).unwrap();
        assert_eq!(buffer.regions()[0].offset, 0);
        assert_eq!(buffer.regions()[1].offset, 32);
        assert_eq!(buffer.size(), 40);
    }

    #[test]
    fn explicit_overlap_rejected() {
        let desc = BufferDescriptor::new("b", BufferKind::Uniform)
            .with_region(RegionDescriptor::new(bytes("a", 16)))
            .with_region(RegionDescriptor::new(bytes("b", 8)).with_offset(8));
        assert!(matches!(Buffer::new(desc), Err(Error::InvalidOffset { .. })));
    }

    #[test]
    fn non_power_of_two_alignment_rejected() {
        let desc = BufferDescriptor::new("b", BufferKind::Uniform)
            .with_region(RegionDescriptor::new(bytes("a", 4)).with_alignment(3));
        assert_eq!(Buffer::new(desc).unwrap_err(), Error::InvalidAlignment(3));
    }

    #[test]
    fn construction_failure_does_not_claim_references() {
        let shared = bytes("a", 8);
        let desc = BufferDescriptor::new("b", BufferKind::Uniform)
            .with_size(4)
            .with_region(RegionDescriptor::new(shared.clone()));
        assert!(matches!(Buffer::new(desc), Err(Error::RegionOverflow { .. })));
        assert_eq!(shared.use_count(), 0);
    }

    #[test]
    fn usage_combines_kind_and_copy_dst() {
        let desc = BufferDescriptor::new("b", BufferKind::Storage { read_only: true }).with_size(64);
        let buffer = Buffer::new(desc).unwrap();
        assert_eq!(
            buffer.usage(),
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST
        );
    }
}
