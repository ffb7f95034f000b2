//! Common types for the binaural renderer
//!
//! Holds the sample type, buffer sizing constants and [`ChannelBuffers`], the
//! fixed-capacity planar arena used everywhere audio crosses a real-time
//! boundary.

use std::ops::Range;

/// Audio sample type (32-bit float throughout the signal path)
pub type Sample = f32;

/// Default convolution block size in frames
/// 512 frames @ 48kHz = ~10.7ms per block
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// Maximum callback size to pre-allocate (covers typical configurations)
/// Common values: 64, 128, 256, 512, 1024, 2048, 4096 frames
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Number of channels carrying the binaural mix
pub const STEREO_CHANNELS: usize = 2;

/// Planar multi-channel buffer with a fixed capacity per channel
///
/// All channels live in one contiguous allocation made at construction time;
/// channel `i` occupies `[i * capacity, (i + 1) * capacity)`. Nothing here
/// allocates after `new`, so the arena is safe to use on the audio thread.
#[derive(Debug, Clone, Default)]
pub struct ChannelBuffers {
    data: Vec<Sample>,
    channels: usize,
    capacity: usize,
}

impl ChannelBuffers {
    /// Create a silent arena of `channels × capacity` samples
    pub fn new(channels: usize, capacity: usize) -> Self {
        Self {
            data: vec![0.0; channels * capacity],
            channels,
            capacity,
        }
    }

    /// Create an arena holding copies of the given channels
    ///
    /// Capacity is the length of the longest channel; shorter channels are
    /// zero-padded.
    pub fn from_channels<C: AsRef<[Sample]>>(channels: &[C]) -> Self {
        let capacity = channels.iter().map(|c| c.as_ref().len()).max().unwrap_or(0);
        let mut buffers = Self::new(channels.len(), capacity);
        for (i, channel) in channels.iter().enumerate() {
            let src = channel.as_ref();
            buffers.channel_mut(i)[..src.len()].copy_from_slice(src);
        }
        buffers
    }

    /// Number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Frames per channel
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Full-capacity view of one channel
    #[inline]
    pub fn channel(&self, index: usize) -> &[Sample] {
        let start = index * self.capacity;
        &self.data[start..start + self.capacity]
    }

    /// Full-capacity mutable view of one channel
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [Sample] {
        let start = index * self.capacity;
        &mut self.data[start..start + self.capacity]
    }

    /// Mutable views of two distinct channels at once
    pub fn pair_mut(&mut self, a: usize, b: usize) -> (&mut [Sample], &mut [Sample]) {
        assert!(a != b, "pair_mut needs two distinct channels");
        let cap = self.capacity;
        if a < b {
            let (head, tail) = self.data.split_at_mut(b * cap);
            (&mut head[a * cap..(a + 1) * cap], &mut tail[..cap])
        } else {
            let (head, tail) = self.data.split_at_mut(a * cap);
            (&mut tail[..cap], &mut head[b * cap..(b + 1) * cap])
        }
    }

    /// Fill every channel with silence
    pub fn fill_silence(&mut self) {
        self.data.fill(0.0);
    }

    /// Silence the first `frames` frames of every channel
    pub fn silence_frames(&mut self, frames: usize) {
        let frames = frames.min(self.capacity);
        for ch in 0..self.channels {
            self.channel_mut(ch)[..frames].fill(0.0);
        }
    }

    /// Check that `frames` of every channel are finite
    pub fn is_finite(&self, frames: Range<usize>) -> bool {
        let end = frames.end.min(self.capacity);
        let start = frames.start.min(end);
        (0..self.channels).all(|ch| self.channel(ch)[start..end].iter().all(|s| s.is_finite()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels_are_disjoint() {
        let mut buffers = ChannelBuffers::new(3, 4);
        buffers.channel_mut(1).fill(1.0);

        assert_eq!(buffers.channel(0), &[0.0; 4]);
        assert_eq!(buffers.channel(1), &[1.0; 4]);
        assert_eq!(buffers.channel(2), &[0.0; 4]);
    }

    #[test]
    fn test_from_channels_pads_short_channels() {
        let buffers = ChannelBuffers::from_channels(&[vec![1.0, 2.0, 3.0], vec![4.0]]);
        assert_eq!(buffers.channels(), 2);
        assert_eq!(buffers.capacity(), 3);
        assert_eq!(buffers.channel(1), &[4.0, 0.0, 0.0]);
    }

    #[test]
    fn test_pair_mut_either_order() {
        let mut buffers = ChannelBuffers::new(3, 2);
        {
            let (a, b) = buffers.pair_mut(2, 0);
            a.fill(2.0);
            b.fill(5.0);
        }
        assert_eq!(buffers.channel(0), &[5.0, 5.0]);
        assert_eq!(buffers.channel(2), &[2.0, 2.0]);
    }

    #[test]
    fn test_is_finite_only_checks_requested_frames() {
        let mut buffers = ChannelBuffers::new(1, 4);
        buffers.channel_mut(0)[3] = f32::NAN;
        assert!(buffers.is_finite(0..3));
        assert!(buffers.is_finite(4..8));
        assert!(!buffers.is_finite(0..4));
        assert!(!buffers.is_finite(3..4));
    }
}
