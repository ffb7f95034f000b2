//! Uniformly partitioned overlap-save convolution
//!
//! One engine convolves one input stream with one impulse response. The
//! filter is cut into `P = ceil(L / B)` partitions of the block size `B`,
//! each zero-padded to the transform size `N = 2B` and transformed once at
//! construction. Every block then costs one forward and one inverse FFT plus
//! `P` complex multiply-adds, independent of the filter length.
//!
//! ```text
//!  window  = [ previous block | current block ]        (N = 2B real samples)
//!  S       = FFT(window)
//!  Y       = Σp FDL[(head + p) mod P] · H[p]           (history, newest first)
//!  head    = head - 1 (mod P);  FDL[head] = S          (only the index moves)
//!  output  = IFFT(Y)[B..2B] / N                        (first half is aliased)
//! ```
//!
//! The sum is formed from the delay line *before* the new spectrum is
//! inserted, so the engine emits the exact linear convolution one block late.
//! That fixed one-block latency is what downstream code compensates for.

use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealToComplex};

use super::error::{ConvolutionError, ConvolutionResult};
use super::plan_cache::{TransformCache, TransformPlan};
use crate::types::Sample;

const ZERO: Complex<Sample> = Complex { re: 0.0, im: 0.0 };

/// Partitioned overlap-save convolver for one (input channel, ear) pair
pub struct ConvolutionEngine {
    block_size: usize,
    transform_size: usize,
    bins: usize,
    partition_count: usize,
    filter_length: usize,
    forward: Arc<dyn RealToComplex<Sample>>,
    inverse: Arc<dyn ComplexToReal<Sample>>,
    /// Filter partition spectra, partition `p` at `[p * bins, (p + 1) * bins)`
    partitions: Vec<Complex<Sample>>,
    /// Frequency-domain delay line, same layout as `partitions`
    fdl: Vec<Complex<Sample>>,
    /// Slot holding the newest input spectrum
    head: usize,
    /// Previous input block
    overlap: Vec<Sample>,
    /// Time-domain window; the forward transform uses it as scratch
    window: Vec<Sample>,
    /// Spectrum of the current window
    spectrum: Vec<Complex<Sample>>,
    /// Frequency-domain accumulator
    accumulator: Vec<Complex<Sample>>,
    /// Inverse transform output
    time: Vec<Sample>,
    scratch: Vec<Complex<Sample>>,
    scale: Sample,
}

impl ConvolutionEngine {
    /// Build an engine using the process-wide plan cache
    pub fn new(filter: &[Sample], block_size: usize) -> ConvolutionResult<Self> {
        Self::with_cache(filter, block_size, TransformCache::global())
    }

    /// Build an engine using the given plan cache
    ///
    /// All memory the engine will ever use is reserved here; a failed
    /// reservation returns [`ConvolutionError::Allocation`] and nothing is
    /// kept.
    pub fn with_cache(
        filter: &[Sample],
        block_size: usize,
        cache: &TransformCache,
    ) -> ConvolutionResult<Self> {
        if block_size == 0 {
            return Err(ConvolutionError::InvalidBlockSize(block_size));
        }
        if filter.is_empty() {
            return Err(ConvolutionError::EmptyFilter);
        }
        if let Some(index) = filter.iter().position(|s| !s.is_finite()) {
            return Err(ConvolutionError::NonFiniteFilter(index));
        }

        let transform_size = block_size * 2;
        let plan: TransformPlan = cache.plan(transform_size);
        let bins = plan.bins();
        let partition_count = filter.len().div_ceil(block_size);
        let spectrum_len = partition_count
            .checked_mul(bins)
            .ok_or(ConvolutionError::Allocation(usize::MAX))?;

        let mut partitions = zeroed_spectra(spectrum_len)?;
        let fdl = zeroed_spectra(spectrum_len)?;
        let mut window = vec![0.0; transform_size];
        let mut scratch = vec![ZERO; plan.scratch_len()];

        for (p, chunk) in filter.chunks(block_size).enumerate() {
            window.fill(0.0);
            window[..chunk.len()].copy_from_slice(chunk);
            plan.forward()
                .process_with_scratch(
                    &mut window,
                    &mut partitions[p * bins..(p + 1) * bins],
                    &mut scratch,
                )
                .map_err(|_| ConvolutionError::TransformFailed)?;
        }
        window.fill(0.0);

        Ok(Self {
            block_size,
            transform_size,
            bins,
            partition_count,
            filter_length: filter.len(),
            forward: plan.forward().clone(),
            inverse: plan.inverse().clone(),
            partitions,
            fdl,
            head: 0,
            overlap: vec![0.0; block_size],
            window,
            spectrum: vec![ZERO; bins],
            accumulator: vec![ZERO; bins],
            time: vec![0.0; transform_size],
            scratch,
            // realfft leaves both directions unnormalized: IFFT(FFT(x)) = N·x
            scale: 1.0 / transform_size as Sample,
        })
    }

    /// Convolve one block
    ///
    /// `input` and `output` must both be exactly `block_size` long. Real-time
    /// safe: no allocation, no locking.
    pub fn process(&mut self, input: &[Sample], output: &mut [Sample]) -> ConvolutionResult<()> {
        let b = self.block_size;
        if input.len() != b || output.len() != b {
            return Err(ConvolutionError::BlockSizeMismatch);
        }

        self.window[..b].copy_from_slice(&self.overlap);
        self.window[b..].copy_from_slice(input);
        self.overlap.copy_from_slice(input);

        self.forward
            .process_with_scratch(&mut self.window, &mut self.spectrum, &mut self.scratch)
            .map_err(|_| ConvolutionError::TransformFailed)?;

        let bins = self.bins;
        let count = self.partition_count;
        self.accumulator.fill(ZERO);
        for p in 0..count {
            let slot = (self.head + p) % count;
            let history = &self.fdl[slot * bins..(slot + 1) * bins];
            let filter = &self.partitions[p * bins..(p + 1) * bins];
            for ((acc, x), h) in self.accumulator.iter_mut().zip(history).zip(filter) {
                *acc += x * h;
            }
        }

        self.head = (self.head + count - 1) % count;
        self.fdl[self.head * bins..(self.head + 1) * bins].copy_from_slice(&self.spectrum);

        // DC and Nyquist bins of a real signal's spectrum are real
        self.accumulator[0].im = 0.0;
        self.accumulator[bins - 1].im = 0.0;

        self.inverse
            .process_with_scratch(&mut self.accumulator, &mut self.time, &mut self.scratch)
            .map_err(|_| ConvolutionError::TransformFailed)?;

        for (out, &y) in output.iter_mut().zip(&self.time[b..]) {
            *out = y * self.scale;
        }
        Ok(())
    }

    /// Clear all signal history without reallocating
    pub fn reset(&mut self) {
        self.fdl.fill(ZERO);
        self.overlap.fill(0.0);
        self.head = 0;
    }

    /// Frames per processed block
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// FFT length (always twice the block size)
    #[inline]
    pub fn transform_size(&self) -> usize {
        self.transform_size
    }

    /// Number of filter partitions (and delay-line slots)
    #[inline]
    pub fn partition_count(&self) -> usize {
        self.partition_count
    }

    /// Length of the impulse response in samples
    #[inline]
    pub fn filter_length(&self) -> usize {
        self.filter_length
    }

    /// Output delay relative to the input, in frames
    #[inline]
    pub fn latency_frames(&self) -> usize {
        self.block_size
    }
}

impl std::fmt::Debug for ConvolutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvolutionEngine")
            .field("block_size", &self.block_size)
            .field("partition_count", &self.partition_count)
            .field("filter_length", &self.filter_length)
            .finish()
    }
}

fn zeroed_spectra(len: usize) -> ConvolutionResult<Vec<Complex<Sample>>> {
    let mut spectra = Vec::new();
    spectra
        .try_reserve_exact(len)
        .map_err(|_| ConvolutionError::Allocation(len))?;
    spectra.resize(len, ZERO);
    Ok(spectra)
}

/// Direct time-domain convolution (full length `signal + kernel - 1`)
///
/// Reference implementation for offline checks; O(n·m).
pub fn direct_convolve(signal: &[Sample], kernel: &[Sample]) -> Vec<Sample> {
    if signal.is_empty() || kernel.is_empty() {
        return Vec::new();
    }
    let mut out = vec![0.0; signal.len() + kernel.len() - 1];
    for (i, &x) in signal.iter().enumerate() {
        if x == 0.0 {
            continue;
        }
        for (j, &h) in kernel.iter().enumerate() {
            out[i + j] += x * h;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Small deterministic noise source (no rand dependency needed)
    fn noise(len: usize, seed: u32) -> Vec<Sample> {
        let mut state = seed.wrapping_mul(2_654_435_761).max(1);
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32) * 2.0 - 1.0
            })
            .collect()
    }

    /// Run `signal` through the engine block by block, padded with enough
    /// zero blocks to flush the tail plus the one-block latency
    fn run_engine(engine: &mut ConvolutionEngine, signal: &[Sample], blocks: usize) -> Vec<Sample> {
        let b = engine.block_size();
        let mut padded = signal.to_vec();
        padded.resize(blocks * b, 0.0);
        let mut out = vec![0.0; blocks * b];
        for (input, output) in padded.chunks(b).zip(out.chunks_mut(b)) {
            engine.process(input, output).unwrap();
        }
        out
    }

    fn assert_matches_direct(filter_len: usize, block_size: usize) {
        let filter = noise(filter_len, filter_len as u32 + 7);
        let signal = noise(block_size * 3 + 5, 99);
        let cache = TransformCache::new();
        let mut engine = ConvolutionEngine::with_cache(&filter, block_size, &cache).unwrap();

        let expected = direct_convolve(&signal, &filter);
        let blocks = (expected.len() + block_size).div_ceil(block_size) + 1;
        let output = run_engine(&mut engine, &signal, blocks);

        let peak = expected.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        // Output is delayed by exactly one block
        assert!(output[..block_size].iter().all(|s| s.abs() < 1e-6));
        for (i, &want) in expected.iter().enumerate() {
            let got = output[i + block_size];
            assert!(
                (got - want).abs() <= 1e-4 * peak.max(1.0),
                "L={} sample {}: got {} want {}",
                filter_len,
                i,
                got,
                want
            );
        }
    }

    #[test]
    fn test_matches_direct_convolution_for_filter_lengths() {
        let b = 64;
        for len in [1, b, b + 1, 5 * b, 5 * b + 7] {
            assert_matches_direct(len, b);
        }
    }

    #[test]
    fn test_partition_count() {
        let cache = TransformCache::new();
        let engine = ConvolutionEngine::with_cache(&[0.0; 129], 64, &cache).unwrap();
        assert_eq!(engine.partition_count(), 3);
        assert_eq!(engine.transform_size(), 128);
        assert_eq!(engine.latency_frames(), 64);
    }

    #[test]
    fn test_impulse_reproduces_filter_one_block_late() {
        let b = 32;
        for partitions in [1usize, 2, 4] {
            let filter = noise(partitions * b - 3, partitions as u32);
            let mut engine = ConvolutionEngine::new(&filter, b).unwrap();
            assert_eq!(engine.partition_count(), partitions);

            let mut impulse = vec![0.0; b];
            impulse[0] = 1.0;
            let output = run_engine(&mut engine, &impulse, partitions + 2);

            assert!(output[..b].iter().all(|s| s.abs() < 1e-6));
            for (i, &h) in filter.iter().enumerate() {
                assert!((output[b + i] - h).abs() < 1e-5, "P={} i={}", partitions, i);
            }
            assert!(output[b + filter.len()..].iter().all(|s| s.abs() < 1e-5));
        }
    }

    #[test]
    fn test_reset_flushes_history() {
        let b = 16;
        let filter = noise(5 * b, 3);
        let mut engine = ConvolutionEngine::new(&filter, b).unwrap();
        let input = noise(b, 11);
        let mut out = vec![0.0; b];
        for _ in 0..3 {
            engine.process(&input, &mut out).unwrap();
        }
        assert!(out.iter().any(|s| s.abs() > 1e-3));

        engine.reset();
        let zeros = vec![0.0; b];
        for _ in 0..engine.partition_count() {
            engine.process(&zeros, &mut out).unwrap();
            assert!(out.iter().all(|&s| s == 0.0));
        }
    }

    #[test]
    fn test_concrete_scenario_block_512() {
        let b = 512;
        let mut engine = ConvolutionEngine::new(&[1.0, 0.5, 0.0, 0.0], b).unwrap();
        let mut block0 = vec![0.0; b];
        block0[0] = 1.0;
        let zeros = vec![0.0; b];
        let mut out = vec![0.0; b];

        engine.process(&block0, &mut out).unwrap();
        assert!(out.iter().all(|s| s.abs() < 1e-6));

        engine.process(&zeros, &mut out).unwrap();
        assert!((out[0] - 1.0).abs() < 1e-5);
        assert!((out[1] - 0.5).abs() < 1e-5);
        assert!(out[2..].iter().all(|s| s.abs() < 1e-5));
    }

    #[test]
    fn test_construction_errors() {
        assert_eq!(
            ConvolutionEngine::new(&[], 64).unwrap_err(),
            ConvolutionError::EmptyFilter
        );
        assert_eq!(
            ConvolutionEngine::new(&[1.0], 0).unwrap_err(),
            ConvolutionError::InvalidBlockSize(0)
        );
        assert_eq!(
            ConvolutionEngine::new(&[1.0, f32::NAN], 64).unwrap_err(),
            ConvolutionError::NonFiniteFilter(1)
        );
    }

    #[test]
    fn test_process_rejects_wrong_block_length() {
        let mut engine = ConvolutionEngine::new(&[1.0], 8).unwrap();
        let mut out = vec![0.0; 8];
        assert_eq!(
            engine.process(&[0.0; 4], &mut out),
            Err(ConvolutionError::BlockSizeMismatch)
        );
    }

    #[test]
    fn test_direct_convolve() {
        assert_eq!(direct_convolve(&[1.0, 2.0], &[1.0, 0.5]), vec![1.0, 2.5, 1.0]);
        assert!(direct_convolve(&[], &[1.0]).is_empty());
    }
}
