//! Version-counted snapshot hand-over
//!
//! One writer publishes fully built values; one real-time reader picks up the
//! newest at its next callback boundary.
//!
//! ```text
//! writer                                   reader (audio thread)
//! ──────                                   ─────────────────────
//! Owned::new(value) ──push──▶ rtrb queue
//! version += 1 (Release)                    version == seen? ── yes ──▶ keep current
//!                                            │ no (Acquire)
//!                                            └▶ pop all, keep newest,
//!                                               drop the rest (deferred)
//! ```
//!
//! The steady-state cost on the reader side is one atomic load. Superseded
//! values are `basedrop::Owned`, so dropping them on the audio thread never
//! frees memory there; see [`super::gc`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use basedrop::{Handle, Owned};

use super::error::SnapshotFull;
use super::gc::gc_handle;

/// Create a connected publisher/subscriber pair
///
/// `depth` is how many unread snapshots may be in flight before
/// [`SnapshotPublisher::publish`] starts refusing.
pub fn snapshot_channel<T: Send + 'static>(
    depth: usize,
) -> (SnapshotPublisher<T>, SnapshotSubscriber<T>) {
    let (producer, consumer) = rtrb::RingBuffer::new(depth.max(1));
    let version = Arc::new(AtomicU64::new(0));
    (
        SnapshotPublisher {
            producer,
            version: version.clone(),
            handle: gc_handle(),
        },
        SnapshotSubscriber {
            consumer,
            version,
            seen: 0,
            current: None,
        },
    )
}

/// Writing side; lives on a non-real-time thread
pub struct SnapshotPublisher<T: Send + 'static> {
    producer: rtrb::Producer<Owned<T>>,
    version: Arc<AtomicU64>,
    handle: Handle,
}

impl<T: Send + 'static> SnapshotPublisher<T> {
    /// Hand a complete value to the reader
    ///
    /// Returns the new version, or [`SnapshotFull`] if the reader has not
    /// drained earlier snapshots (it is not running). The value is dropped in
    /// that case.
    pub fn publish(&mut self, value: T) -> Result<u64, SnapshotFull> {
        if self.producer.slots() == 0 {
            return Err(SnapshotFull);
        }
        let owned = Owned::new(&self.handle, value);
        self.producer.push(owned).map_err(|_| SnapshotFull)?;
        Ok(self.version.fetch_add(1, Ordering::Release) + 1)
    }

    /// Number of snapshots published so far
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Whether the subscriber has been dropped
    pub fn is_abandoned(&self) -> bool {
        self.producer.is_abandoned()
    }
}

/// Reading side; owned by the audio callback
pub struct SnapshotSubscriber<T: Send + 'static> {
    consumer: rtrb::Consumer<Owned<T>>,
    version: Arc<AtomicU64>,
    seen: u64,
    current: Option<Owned<T>>,
}

impl<T: Send + 'static> SnapshotSubscriber<T> {
    /// Pick up the newest snapshot, if the version moved
    ///
    /// Returns true when the current value was replaced. Real-time safe.
    #[inline]
    pub fn poll(&mut self) -> bool {
        let version = self.version.load(Ordering::Acquire);
        if version == self.seen {
            return false;
        }
        self.seen = version;

        let mut newest = None;
        while let Ok(value) = self.consumer.pop() {
            // Replacing drops the older one into the collector queue
            newest = Some(value);
        }
        match newest {
            Some(value) => {
                self.current = Some(value);
                true
            }
            None => false,
        }
    }

    /// Value in effect for the current callback
    #[inline]
    pub fn current(&self) -> Option<&T> {
        self.current.as_deref()
    }

    /// Mutable access to the current value (DSP history only)
    #[inline]
    pub fn current_mut(&mut self) -> Option<&mut T> {
        self.current.as_deref_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_before_first_publish() {
        let (_publisher, mut subscriber) = snapshot_channel::<u32>(2);
        assert!(!subscriber.poll());
        assert_eq!(subscriber.current(), None);
    }

    #[test]
    fn test_newest_snapshot_wins() {
        let (mut publisher, mut subscriber) = snapshot_channel::<u32>(4);
        assert_eq!(publisher.publish(1), Ok(1));
        assert_eq!(publisher.publish(2), Ok(2));
        assert_eq!(publisher.publish(3), Ok(3));

        assert!(subscriber.poll());
        assert_eq!(subscriber.current(), Some(&3));

        // Unchanged version keeps the current value without touching the queue
        assert!(!subscriber.poll());
        assert_eq!(subscriber.current(), Some(&3));
    }

    #[test]
    fn test_full_queue_is_reported() {
        let (mut publisher, mut subscriber) = snapshot_channel::<u32>(1);
        assert!(publisher.publish(1).is_ok());
        assert_eq!(publisher.publish(2), Err(SnapshotFull));

        assert!(subscriber.poll());
        assert_eq!(subscriber.current(), Some(&1));
        assert!(publisher.publish(3).is_ok());
        assert!(subscriber.poll());
        assert_eq!(subscriber.current(), Some(&3));
    }

    #[test]
    fn test_swap_across_threads() {
        let (mut publisher, mut subscriber) = snapshot_channel::<Vec<u32>>(2);
        let writer = std::thread::spawn(move || {
            for i in 0..100u32 {
                while publisher.publish(vec![i; 16]).is_err() {
                    std::thread::yield_now();
                }
            }
            publisher
        });

        let mut last = 0;
        while last != 99 {
            subscriber.poll();
            if let Some(value) = subscriber.current() {
                // Never a torn value: every element agrees
                assert!(value.iter().all(|&v| v == value[0]));
                assert!(value[0] >= last);
                last = value[0];
            }
        }
        let publisher = writer.join().unwrap();
        assert_eq!(publisher.version(), 100);
    }

    #[test]
    fn test_mutation_stays_with_current_value() {
        let (mut publisher, mut subscriber) = snapshot_channel::<u32>(2);
        publisher.publish(10).unwrap();
        subscriber.poll();
        if let Some(v) = subscriber.current_mut() {
            *v += 1;
        }
        assert_eq!(subscriber.current(), Some(&11));
        assert!(!publisher.is_abandoned());
        drop(subscriber);
        assert!(publisher.is_abandoned());
    }
}
