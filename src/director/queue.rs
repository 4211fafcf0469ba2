//! Update queue
//!
//! The set of objects awaiting device work. Insertion is idempotent, so any
//! number of mutations between two ticks costs one drain entry. Buffers are
//! also notified through a `flume` channel by their reference callbacks,
//! which may fire from any thread holding the reference.

use rustc_hash::FxHashSet;

use crate::handles::{BufferHandle, ResourceKey};

#[derive(Debug)]
pub(crate) struct UpdateQueue {
    pending: FxHashSet<ResourceKey>,
    /// Insertion order; drained in rank order, stable within a rank.
    order: Vec<ResourceKey>,
    sender: flume::Sender<ResourceKey>,
    receiver: flume::Receiver<ResourceKey>,
}

impl Default for UpdateQueue {
    fn default() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            pending: FxHashSet::default(),
            order: Vec::new(),
            sender,
            receiver,
        }
    }
}

impl UpdateQueue {
    /// Channel handed to buffers for change notifications.
    pub fn sender(&self) -> flume::Sender<ResourceKey> {
        self.sender.clone()
    }

    /// Returns `false` when the key was already pending.
    pub fn enqueue(&mut self, key: ResourceKey) -> bool {
        if self.pending.insert(key) {
            self.order.push(key);
            true
        } else {
            false
        }
    }

    /// Moves channel notifications into the pending set.
    pub fn collect_notifications(&mut self) -> usize {
        let mut received = 0;
        while let Ok(key) = self.receiver.try_recv() {
            received += 1;
            self.enqueue(key);
        }
        received
    }

    /// Takes every pending key, dependencies first.
    pub fn drain(&mut self) -> Vec<ResourceKey> {
        self.collect_notifications();
        self.pending.clear();
        let mut keys = std::mem::take(&mut self.order);
        keys.sort_by_key(|k| k.rank());
        keys
    }

    /// Takes only the pending buffers, leaving everything else queued.
    pub fn drain_buffers(&mut self) -> Vec<BufferHandle> {
        self.collect_notifications();
        let mut buffers = Vec::new();
        self.order.retain(|key| match key {
            ResourceKey::Buffer(h) => {
                buffers.push(*h);
                false
            }
            _ => true,
        });
        for &h in &buffers {
            self.pending.remove(&ResourceKey::Buffer(h));
        }
        buffers
    }

    pub fn remove(&mut self, key: ResourceKey) {
        if self.pending.remove(&key) {
            self.order.retain(|k| *k != key);
        }
    }

    pub fn contains(&self, key: ResourceKey) -> bool {
        self.pending.contains(&key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use slotmap::SlotMap;

    use super::*;
    use crate::handles::{ShaderHandle, TextureHandle};

    #[test]
    fn enqueue_is_idempotent() {
        let mut buffers: SlotMap<BufferHandle, ()> = SlotMap::with_key();
        let b = buffers.insert(());

        let mut queue = UpdateQueue::default();
        assert!(queue.enqueue(b.into()));
        assert!(!queue.enqueue(b.into()));
        queue.sender().send(b.into()).unwrap();
        assert_eq!(queue.drain(), vec![ResourceKey::Buffer(b)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_orders_dependencies_first() {
        let mut shaders: SlotMap<ShaderHandle, ()> = SlotMap::with_key();
        let mut textures: SlotMap<TextureHandle, ()> = SlotMap::with_key();
        let mut buffers: SlotMap<BufferHandle, ()> = SlotMap::with_key();
        let s = shaders.insert(());
        let t = textures.insert(());
        let b1 = buffers.insert(());
        let b2 = buffers.insert(());

        let mut queue = UpdateQueue::default();
        queue.enqueue(s.into());
        queue.enqueue(b2.into());
        queue.enqueue(t.into());
        queue.enqueue(b1.into());

        assert_eq!(
            queue.drain(),
            vec![
                ResourceKey::Buffer(b2),
                ResourceKey::Buffer(b1),
                ResourceKey::Texture(t),
                ResourceKey::Shader(s)
            ]
        );
    }

    #[test]
    fn drain_buffers_leaves_other_keys() {
        let mut shaders: SlotMap<ShaderHandle, ()> = SlotMap::with_key();
        let mut buffers: SlotMap<BufferHandle, ()> = SlotMap::with_key();
        let s = shaders.insert(());
        let b = buffers.insert(());

        let mut queue = UpdateQueue::default();
        queue.enqueue(s.into());
        queue.sender().send(b.into()).unwrap();

        assert_eq!(queue.drain_buffers(), vec![b]);
        assert!(queue.contains(s.into()));
        assert_eq!(queue.len(), 1);
    }
}
