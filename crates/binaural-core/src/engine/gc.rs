//! Deferred deallocation for the audio thread
//!
//! A retired [`RendererState`](crate::render::RendererState) owns dozens of
//! partition spectra and delay lines. Freeing them inside a device callback
//! would put the allocator on the real-time path, so snapshots travel as
//! `basedrop::Owned<T>`: dropping one on the audio thread only pushes a
//! pointer onto the collector's queue, and the memory is released on the
//! `audio-gc` thread.
//!
//! ```ignore
//! use basedrop::Owned;
//! use crate::engine::gc::gc_handle;
//!
//! let snapshot = Owned::new(&gc_handle(), renderer);
//! drop(snapshot); // queued, freed later on audio-gc
//! ```

use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use basedrop::{Collector, Handle};

/// Collection interval; reclamation latency does not matter here
const COLLECT_INTERVAL: Duration = Duration::from_millis(50);

static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

fn spawn_collector() -> Handle {
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("audio-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it is created on and never leaves this thread
            let mut collector = Collector::new();
            tx.send(collector.handle()).expect("Failed to send GC handle");
            log::info!("[GC] Audio GC thread started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        })
        .expect("Failed to spawn audio GC thread");

    rx.recv().expect("Failed to receive GC handle")
}

/// Handle for allocating `Owned<T>` / `Shared<T>` values on the global
/// collector; starts the collector thread on first use
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(spawn_collector).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::Owned;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_drop_is_deferred_to_collector() {
        let dropped = Arc::new(AtomicBool::new(false));
        let owned = Owned::new(&gc_handle(), DropFlag(dropped.clone()));
        drop(owned);

        // The collector thread frees it on one of its next passes
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !dropped.load(Ordering::SeqCst) {
            assert!(std::time::Instant::now() < deadline, "value never collected");
            thread::sleep(Duration::from_millis(10));
        }
    }
}
