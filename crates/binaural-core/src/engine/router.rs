//! Stereo output placement
//!
//! The binaural mix always lands on exactly two adjacent physical outputs.
//! [`ChannelRouter`] owns the selection on the control side and republishes
//! it to the running bridge, where a [`RouteReader`] keeps a cached copy.

use super::error::{RouterError, RouterResult};
use super::snapshot::{SnapshotPublisher, SnapshotSubscriber};
use crate::types::STEREO_CHANNELS;

/// Window of output channels receiving the stereo mix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelRange {
    start: usize,
    count: usize,
}

impl ChannelRange {
    /// Validate a window against the device's output count
    pub fn new(start: usize, count: usize, total_output_channels: usize) -> RouterResult<Self> {
        let fits = start
            .checked_add(count)
            .is_some_and(|end| end <= total_output_channels);
        if count != STEREO_CHANNELS || !fits {
            return Err(RouterError::InvalidChannelRange {
                start,
                count,
                total: total_output_channels,
            });
        }
        Ok(Self { start, count })
    }

    /// First two outputs
    pub const fn default_stereo() -> Self {
        Self {
            start: 0,
            count: STEREO_CHANNELS,
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// One past the last channel
    pub fn end(&self) -> usize {
        self.start + self.count
    }

    /// Whether the window fits a device with `total` outputs
    pub fn fits(&self, total: usize) -> bool {
        self.end() <= total
    }
}

impl Default for ChannelRange {
    fn default() -> Self {
        Self::default_stereo()
    }
}

impl std::fmt::Display for ChannelRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "outputs {}-{}", self.start + 1, self.end())
    }
}

/// Control-side owner of the output selection
pub struct ChannelRouter {
    range: ChannelRange,
    total_output_channels: usize,
    publisher: Option<SnapshotPublisher<ChannelRange>>,
}

impl ChannelRouter {
    pub fn new(total_output_channels: usize) -> Self {
        Self {
            range: ChannelRange::default_stereo(),
            total_output_channels,
            publisher: None,
        }
    }

    /// Select the output window
    ///
    /// On failure the previous range stays in effect.
    pub fn set_range(&mut self, start: usize, count: usize) -> RouterResult<ChannelRange> {
        let range = ChannelRange::new(start, count, self.total_output_channels)?;
        self.range = range;
        log::info!("[ROUTER] Routing binaural mix to {}", range);
        self.republish();
        Ok(range)
    }

    /// Update the output count after a device change
    ///
    /// A range that no longer fits falls back to the first two outputs.
    pub fn set_total_output_channels(&mut self, total: usize) {
        self.total_output_channels = total;
        if !self.range.fits(total) {
            log::warn!(
                "[ROUTER] {} does not fit a {}-output device, falling back to outputs 1-2",
                self.range,
                total
            );
            self.range = ChannelRange::default_stereo();
        }
        self.republish();
    }

    /// Connect to the bridge of a newly started stream
    pub fn attach(&mut self, publisher: SnapshotPublisher<ChannelRange>) {
        self.publisher = Some(publisher);
        self.republish();
    }

    /// Disconnect from a stopped stream
    pub fn detach(&mut self) {
        self.publisher = None;
    }

    pub fn range(&self) -> ChannelRange {
        self.range
    }

    pub fn total_output_channels(&self) -> usize {
        self.total_output_channels
    }

    fn republish(&mut self) {
        if let Some(publisher) = &mut self.publisher {
            if publisher.publish(self.range).is_err() {
                log::warn!("[ROUTER] Route queue full, {} will apply late", self.range);
            }
        }
    }
}

/// Audio-thread view of the output selection
pub struct RouteReader {
    subscriber: SnapshotSubscriber<ChannelRange>,
    range: ChannelRange,
}

impl RouteReader {
    pub fn new(subscriber: SnapshotSubscriber<ChannelRange>) -> Self {
        Self {
            subscriber,
            range: ChannelRange::default_stereo(),
        }
    }

    /// Range for this callback; one atomic load unless it changed
    #[inline]
    pub fn poll(&mut self) -> ChannelRange {
        if self.subscriber.poll() {
            if let Some(&range) = self.subscriber.current() {
                self.range = range;
            }
        }
        self.range
    }
}
