//! Director events
//!
//! Informational notifications emitted after the director has done the
//! corresponding work. Creation is always driven by the update queue; a
//! listener cannot influence it.

use crate::handles::{
    BindingHandle, BufferHandle, PassHandle, PipelineHandle, SamplerHandle, ShaderHandle,
    TextureHandle,
};

#[derive(Debug, Clone, PartialEq)]
pub enum DirectorEvent {
    BufferCreated { handle: BufferHandle, size: u64 },
    BufferWritten { handle: BufferHandle, writes: u32 },
    TextureCreated { handle: TextureHandle, width: u32, height: u32 },
    TextureFailed { handle: TextureHandle, message: String },
    SamplerCreated { handle: SamplerHandle },
    ShaderCompiled { handle: ShaderHandle },
    ShaderFailed { handle: ShaderHandle, message: String },
    PipelineCreated { handle: PipelineHandle },
    BindingComplete { handle: BindingHandle },
    PassExecutable { handle: PassHandle },
    StageAdded { name: String },
    StageRemoved { name: String },
    Resized { width: u32, height: u32 },
    DeviceRecovered,
}

/// Stable listener slot returned by
/// [`Director::add_listener`](crate::Director::add_listener).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

type Listener = Box<dyn FnMut(&DirectorEvent) + Send>;

/// Listener slots plus the events queued since the last dispatch. Removed
/// slots are nulled so outstanding ids stay valid.
#[derive(Default)]
pub(crate) struct EventTable {
    listeners: Vec<Option<Listener>>,
    queued: Vec<DirectorEvent>,
}

impl EventTable {
    pub fn add(&mut self, listener: Listener) -> ListenerId {
        self.listeners.push(Some(listener));
        ListenerId(self.listeners.len() - 1)
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        self.listeners
            .get_mut(id.0)
            .is_some_and(|slot| slot.take().is_some())
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.iter().flatten().count()
    }

    pub fn push(&mut self, event: DirectorEvent) {
        // Nobody to tell: skip the allocation.
        if self.listeners.iter().any(Option::is_some) {
            self.queued.push(event);
        }
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = DirectorEvent>) {
        for event in events {
            self.push(event);
        }
    }

    /// Delivers queued events in emission order.
    pub fn dispatch(&mut self) {
        if self.queued.is_empty() {
            return;
        }
        let queued = std::mem::take(&mut self.queued);
        for event in &queued {
            for listener in self.listeners.iter_mut().flatten() {
                listener(event);
            }
        }
    }
}

impl std::fmt::Debug for EventTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventTable")
            .field("listeners", &self.listener_count())
            .field("queued", &self.queued.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn removed_listener_keeps_other_ids_valid() {
        let mut table = EventTable::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let first = table.add(Box::new(|_| {}));
        let h = Arc::clone(&hits);
        let second = table.add(Box::new(move |_| {
            h.fetch_add(1, Ordering::Relaxed);
        }));

        assert!(table.remove(first));
        assert!(!table.remove(first));
        table.push(DirectorEvent::DeviceRecovered);
        table.dispatch();

        assert_eq!(hits.load(Ordering::Relaxed), 1);
        assert!(table.remove(second));
        assert_eq!(table.listener_count(), 0);
    }

    #[test]
    fn events_without_listeners_are_dropped() {
        let mut table = EventTable::default();
        table.push(DirectorEvent::Resized { width: 1, height: 1 });
        assert!(table.queued.is_empty());
    }
}
