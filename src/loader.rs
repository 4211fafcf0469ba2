//! Asynchronous Load Hand-off
//!
//! Background producers (file reads, decoders, network fetches) deliver their
//! result through a [`PendingLoad`] handle. The consumer never blocks: the
//! [`Director`](crate::Director) polls the handle once per tick while the
//! owning shader or texture waits for its data.
//!
//! A handle is strongly owned by exactly one resource. Replacing the source
//! of that resource cancels the old handle, and producers can observe the
//! cancellation through [`LoadSender::is_cancelled`] to stop early.
//!
//! ```rust,ignore
//! let pending = tessera::loader::load_text_file("shaders/triangle.wgsl");
//! let shader = director.create_shader(ShaderDescriptor {
//!     label: "triangle".into(),
//!     source: ShaderSource::Pending(pending),
//!     vertex_inputs: None,
//! })?;
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::errors::{Error, Result};

/// Result of one poll on a [`PendingLoad`].
#[derive(Debug)]
pub enum LoadState<T> {
    /// Still in flight.
    Pending,
    Ready(T),
    Failed(Error),
    /// Cancelled by the consumer, or the value was already taken.
    Cancelled,
    /// The producer went away without a result (dropped, or its job
    /// panicked).
    Abandoned,
}

/// Consumer side of a background load.
#[derive(Debug)]
pub struct PendingLoad<T> {
    receiver: flume::Receiver<Result<T>>,
    cancelled: Arc<AtomicBool>,
    finished: bool,
}

/// Producer side of a background load.
#[derive(Debug)]
pub struct LoadSender<T> {
    sender: flume::Sender<Result<T>>,
    cancelled: Arc<AtomicBool>,
}

/// Creates a connected producer / consumer pair.
#[must_use]
pub fn pending<T>() -> (LoadSender<T>, PendingLoad<T>) {
    let (sender, receiver) = flume::bounded(1);
    let cancelled = Arc::new(AtomicBool::new(false));
    (
        LoadSender {
            sender,
            cancelled: Arc::clone(&cancelled),
        },
        PendingLoad {
            receiver,
            cancelled,
            finished: false,
        },
    )
}

impl<T> PendingLoad<T> {
    /// A handle that is already resolved with `value`.
    #[must_use]
    pub fn ready(value: T) -> Self {
        let (tx, rx) = pending();
        tx.complete(value);
        rx
    }

    /// Non-blocking poll. Returns the value exactly once; later polls report
    /// [`LoadState::Cancelled`].
    pub fn poll(&mut self) -> LoadState<T> {
        if self.finished || self.cancelled.load(Ordering::Acquire) {
            return LoadState::Cancelled;
        }
        match self.receiver.try_recv() {
            Ok(Ok(value)) => {
                self.finished = true;
                LoadState::Ready(value)
            }
            Ok(Err(err)) => {
                self.finished = true;
                LoadState::Failed(err)
            }
            Err(flume::TryRecvError::Empty) => LoadState::Pending,
            Err(flume::TryRecvError::Disconnected) => {
                self.finished = true;
                LoadState::Abandoned
            }
        }
    }

    /// Tells the producer its result is no longer wanted.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl<T> LoadSender<T> {
    pub fn complete(self, value: T) {
        self.finish(Ok(value));
    }

    pub fn fail(self, error: Error) {
        self.finish(Err(error));
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn finish(self, result: Result<T>) {
        if self.is_cancelled() {
            log::trace!("Dropping result of a cancelled load");
            return;
        }
        // Receiver gone means the consumer was destroyed; nothing to do.
        let _ = self.sender.send(result);
    }
}

// ============================================================================
// Background loaders
// ============================================================================

/// Runs `job` on a background thread and returns its pending result.
pub fn spawn_load<T, F>(job: F) -> PendingLoad<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (sender, pending) = pending();
    std::thread::spawn(move || {
        if sender.is_cancelled() {
            return;
        }
        match job() {
            Ok(value) => sender.complete(value),
            Err(err) => sender.fail(err),
        }
    });
    pending
}

/// Reads a UTF-8 text file (typically WGSL source) in the background.
pub fn load_text_file(path: impl Into<PathBuf>) -> PendingLoad<String> {
    let path = path.into();
    spawn_load(move || {
        log::debug!("Loading text file {}", path.display());
        Ok(std::fs::read_to_string(&path)?)
    })
}

/// Reads a binary file (typically raw texel data) in the background.
pub fn load_bytes_file(path: impl Into<PathBuf>) -> PendingLoad<Vec<u8>> {
    let path = path.into();
    spawn_load(move || {
        log::debug!("Loading binary file {}", path.display());
        Ok(std::fs::read(&path)?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_reports_pending_until_completed() {
        let (tx, mut rx) = pending::<u32>();
        assert!(matches!(rx.poll(), LoadState::Pending));
        tx.complete(7);
        assert!(matches!(rx.poll(), LoadState::Ready(7)));
        assert!(matches!(rx.poll(), LoadState::Cancelled));
    }

    #[test]
    fn cancelled_handle_never_yields() {
        let (tx, mut rx) = pending::<u32>();
        rx.cancel();
        assert!(tx.is_cancelled());
        tx.complete(1);
        assert!(matches!(rx.poll(), LoadState::Cancelled));
    }

    #[test]
    fn dropped_producer_reads_as_abandoned() {
        let (tx, mut rx) = pending::<u32>();
        drop(tx);
        assert!(matches!(rx.poll(), LoadState::Abandoned));
        assert!(matches!(rx.poll(), LoadState::Cancelled));
    }

    #[test]
    fn consumer_cancel_wins_over_dropped_producer() {
        let (tx, mut rx) = pending::<u32>();
        rx.cancel();
        drop(tx);
        assert!(matches!(rx.poll(), LoadState::Cancelled));
    }

    #[test]
    fn failure_is_forwarded() {
        let (tx, mut rx) = pending::<u32>();
        tx.fail(Error::LoadFailed("missing".into()));
        assert!(matches!(rx.poll(), LoadState::Failed(Error::LoadFailed(_))));
    }

    #[test]
    fn missing_file_fails() {
        let mut rx = load_bytes_file("/definitely/not/here.bin");
        let state = loop {
            match rx.poll() {
                LoadState::Pending => std::thread::yield_now(),
                other => break other,
            }
        };
        assert!(matches!(state, LoadState::Failed(Error::LoadFailed(_))));
    }
}
