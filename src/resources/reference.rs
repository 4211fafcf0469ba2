//! Observable Byte References
//!
//! [`ArrayRef`] is the CPU-side source of truth for data that ends up in GPU
//! buffers. It is a cheap `Arc` handle: clones observe the same bytes.
//!
//! # Invariants
//!
//! - Stored bytes are always padded with zeros to a multiple of 4.
//! - Every mutation synchronously fires all registered callbacks in
//!   registration order, after the internal lock is released.
//! - Removing a callback nulls its slot; other [`CallbackSlot`]s stay valid.
//! - `retain` / `release` count the buffers sharing the reference. When the
//!   count returns to zero the bytes are dropped and every accessor fails with
//!   [`Error::Destroyed`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytemuck::Pod;
use parking_lot::RwLock;

use crate::errors::{Error, Result};

static NEXT_REFERENCE_ID: AtomicU64 = AtomicU64::new(0);

/// Callback fired after every mutation.
pub type RefCallback = Arc<dyn Fn(&ArrayRef) + Send + Sync>;

/// Stable id of a registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackSlot(usize);

impl CallbackSlot {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

#[inline]
pub(crate) fn padded_len(len: usize) -> usize {
    len.next_multiple_of(4)
}

struct RefState {
    /// `None` once the last holder released the reference.
    bytes: Option<Vec<u8>>,
    logical_len: usize,
    use_count: u32,
    callbacks: Vec<Option<RefCallback>>,
}

struct RefShared {
    id: u64,
    name: String,
    element_size: usize,
    state: RwLock<RefState>,
}

/// Use-counted, observable container of raw bytes.
#[derive(Clone)]
pub struct ArrayRef(Arc<RefShared>);

impl std::fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.0.state.read();
        f.debug_struct("ArrayRef")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("element_size", &self.0.element_size)
            .field("byte_len", &state.bytes.as_ref().map(Vec::len))
            .field("use_count", &state.use_count)
            .finish()
    }
}

impl PartialEq for ArrayRef {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for ArrayRef {}

impl std::hash::Hash for ArrayRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl ArrayRef {
    /// Creates a reference from a typed slice. The element size is
    /// `size_of::<T>()`.
    pub fn new<T: Pod>(name: &str, data: &[T]) -> Result<Self> {
        let element_size = std::mem::size_of::<T>();
        if element_size == 0 {
            return Err(Error::UnsupportedElementType(
                std::any::type_name::<T>().to_string(),
            ));
        }
        Ok(Self::build(name, bytemuck::cast_slice(data), element_size))
    }

    /// Creates a reference from raw bytes split into `element_size` chunks.
    pub fn from_bytes(name: &str, bytes: &[u8], element_size: usize) -> Result<Self> {
        if element_size == 0 {
            return Err(Error::UnsupportedElementType(format!(
                "zero-sized element in `{name}`"
            )));
        }
        Ok(Self::build(name, bytes, element_size))
    }

    /// Zero-filled reference holding `count` elements.
    pub fn zeroed(name: &str, count: usize, element_size: usize) -> Result<Self> {
        Self::from_bytes(name, &vec![0u8; count * element_size], element_size)
    }

    fn build(name: &str, bytes: &[u8], element_size: usize) -> Self {
        let mut stored = bytes.to_vec();
        stored.resize(padded_len(bytes.len()), 0);
        Self(Arc::new(RefShared {
            id: NEXT_REFERENCE_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            element_size,
            state: RwLock::new(RefState {
                bytes: Some(stored),
                logical_len: bytes.len(),
                use_count: 0,
                callbacks: Vec::new(),
            }),
        }))
    }

    // ========================================================================
    // Identity
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    #[inline]
    #[must_use]
    pub fn element_size(&self) -> usize {
        self.0.element_size
    }

    // ========================================================================
    // Access
    // ========================================================================

    /// Padded byte contents.
    pub fn value(&self) -> Result<Vec<u8>> {
        self.with_bytes(<[u8]>::to_vec)
    }

    /// Runs `f` over the padded bytes without copying them.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        let state = self.0.state.read();
        let bytes = state.bytes.as_deref().ok_or_else(|| self.destroyed())?;
        Ok(f(bytes))
    }

    /// Padded byte length (a multiple of 4). Zero once destroyed.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.0.state.read().bytes.as_ref().map_or(0, Vec::len)
    }

    /// Byte length as supplied, before padding.
    #[must_use]
    pub fn logical_len(&self) -> usize {
        self.0.state.read().logical_len
    }

    /// Number of whole elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.logical_len() / self.0.element_size
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.0.state.read().bytes.is_none()
    }

    /// Bytes of element `index`.
    pub fn element(&self, index: usize) -> Result<Vec<u8>> {
        let size = self.0.element_size;
        let state = self.0.state.read();
        let bytes = state.bytes.as_deref().ok_or_else(|| self.destroyed())?;
        let len = state.logical_len / size;
        if index >= len {
            return Err(Error::OutOfRange { index, len });
        }
        Ok(bytes[index * size..(index + 1) * size].to_vec())
    }

    /// Element `index` reinterpreted as `T`.
    pub fn element_as<T: Pod>(&self, index: usize) -> Result<T> {
        let bytes = self.element(index)?;
        if bytes.len() != std::mem::size_of::<T>() {
            return Err(Error::ElementSize {
                expected: bytes.len(),
                actual: std::mem::size_of::<T>(),
            });
        }
        Ok(bytemuck::pod_read_unaligned(&bytes))
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Replaces the contents and fires callbacks.
    pub fn set_value(&self, bytes: &[u8]) -> Result<()> {
        {
            let mut state = self.0.state.write();
            let stored = state.bytes.as_mut().ok_or_else(|| self.destroyed())?;
            stored.clear();
            stored.extend_from_slice(bytes);
            stored.resize(padded_len(bytes.len()), 0);
            state.logical_len = bytes.len();
        }
        self.notify();
        Ok(())
    }

    /// Typed variant of [`set_value`](Self::set_value).
    pub fn set_data<T: Pod>(&self, data: &[T]) -> Result<()> {
        self.set_value(bytemuck::cast_slice(data))
    }

    /// Overwrites element `index` and fires callbacks.
    pub fn set_element(&self, index: usize, data: &[u8]) -> Result<()> {
        let size = self.0.element_size;
        if data.len() != size {
            return Err(Error::ElementSize {
                expected: size,
                actual: data.len(),
            });
        }
        {
            let mut state = self.0.state.write();
            let len = state.logical_len / size;
            let bytes = state.bytes.as_mut().ok_or_else(|| self.destroyed())?;
            if index >= len {
                return Err(Error::OutOfRange { index, len });
            }
            bytes[index * size..(index + 1) * size].copy_from_slice(data);
        }
        self.notify();
        Ok(())
    }

    pub fn set_element_as<T: Pod>(&self, index: usize, value: &T) -> Result<()> {
        self.set_element(index, bytemuck::bytes_of(value))
    }

    /// Writes `element` into every slot and fires callbacks once.
    pub fn fill(&self, element: &[u8]) -> Result<()> {
        let size = self.0.element_size;
        if element.len() != size {
            return Err(Error::ElementSize {
                expected: size,
                actual: element.len(),
            });
        }
        {
            let mut state = self.0.state.write();
            let len = state.logical_len / size;
            let bytes = state.bytes.as_mut().ok_or_else(|| self.destroyed())?;
            for chunk in bytes[..len * size].chunks_exact_mut(size) {
                chunk.copy_from_slice(element);
            }
        }
        self.notify();
        Ok(())
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    pub fn register_callback(&self, callback: RefCallback) -> CallbackSlot {
        let mut state = self.0.state.write();
        state.callbacks.push(Some(callback));
        CallbackSlot(state.callbacks.len() - 1)
    }

    /// Nulls the slot. Returns `false` when it was already empty.
    pub fn remove_callback(&self, slot: CallbackSlot) -> bool {
        let mut state = self.0.state.write();
        state
            .callbacks
            .get_mut(slot.0)
            .and_then(Option::take)
            .is_some()
    }

    /// Number of occupied callback slots.
    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.0.state.read().callbacks.iter().flatten().count()
    }

    fn notify(&self) {
        let callbacks: Vec<RefCallback> = self
            .0
            .state
            .read()
            .callbacks
            .iter()
            .flatten()
            .cloned()
            .collect();
        for callback in callbacks {
            callback(self);
        }
    }

    // ========================================================================
    // Use counting
    // ========================================================================

    /// Claims the reference for one more holder.
    pub fn retain(&self) -> Result<u32> {
        let mut state = self.0.state.write();
        if state.bytes.is_none() {
            return Err(self.destroyed());
        }
        state.use_count += 1;
        Ok(state.use_count)
    }

    /// Gives up one claim. At zero the bytes are dropped. Returns the
    /// remaining count.
    pub fn release(&self) -> u32 {
        let mut state = self.0.state.write();
        if state.use_count == 0 {
            log::warn!("Reference `{}` released more often than retained", self.0.name);
            return 0;
        }
        state.use_count -= 1;
        if state.use_count == 0 {
            log::debug!("Reference `{}` destroyed", self.0.name);
            state.bytes = None;
            state.callbacks.clear();
        }
        state.use_count
    }

    #[must_use]
    pub fn use_count(&self) -> u32 {
        self.0.state.read().use_count
    }

    fn destroyed(&self) -> Error {
        Error::Destroyed(self.0.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn pads_to_four_bytes() {
        let r = ArrayRef::from_bytes("r", &[1, 2, 3, 4, 5], 1).unwrap();
        assert_eq!(r.value().unwrap(), vec![1, 2, 3, 4, 5, 0, 0, 0]);
        assert_eq!(r.logical_len(), 5);
        assert_eq!(r.len(), 5);
    }

    #[test]
    fn zero_sized_element_rejected() {
        let err = ArrayRef::new::<()>("unit", &[(), ()]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedElementType(_)));
    }

    #[test]
    fn callbacks_fire_in_registration_order() {
        let r = ArrayRef::new("r", &[0u32; 2]).unwrap();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for tag in 0..3 {
            let order = Arc::clone(&order);
            r.register_callback(Arc::new(move |_| order.lock().push(tag)));
        }
        r.set_element_as(1, &9u32).unwrap();
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn callback_may_read_the_reference() {
        let r = ArrayRef::new("r", &[1u32]).unwrap();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&seen);
        r.register_callback(Arc::new(move |r: &ArrayRef| {
            let v: u32 = r.element_as(0).unwrap();
            s.store(v as usize, Ordering::SeqCst);
        }));
        r.set_element_as(0, &42u32).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }
}
