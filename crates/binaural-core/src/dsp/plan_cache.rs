//! Shared real-FFT plan cache
//!
//! Every convolution engine of a renderer uses the same transform size, and a
//! 7.1 preset builds sixteen of them. Plans (twiddle tables, scratch sizing)
//! are therefore built once per size and shared through `Arc`s.
//!
//! The table is read-mostly: lookups take a shared read lock, and the write
//! lock is only held while a missing plan is constructed. Plans are requested
//! while a renderer is being built on the activator thread, never from
//! `process`, so the audio thread never touches this lock.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::types::Sample;

/// Forward/inverse plan pair for one transform size
#[derive(Clone)]
pub struct TransformPlan {
    size: usize,
    forward: Arc<dyn RealToComplex<Sample>>,
    inverse: Arc<dyn ComplexToReal<Sample>>,
}

impl TransformPlan {
    /// Transform length in real samples
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of complex bins produced by the forward transform
    #[inline]
    pub fn bins(&self) -> usize {
        self.size / 2 + 1
    }

    /// Real-to-complex plan
    #[inline]
    pub fn forward(&self) -> &Arc<dyn RealToComplex<Sample>> {
        &self.forward
    }

    /// Complex-to-real plan
    #[inline]
    pub fn inverse(&self) -> &Arc<dyn ComplexToReal<Sample>> {
        &self.inverse
    }

    /// Scratch length large enough for both directions
    pub fn scratch_len(&self) -> usize {
        self.forward
            .get_scratch_len()
            .max(self.inverse.get_scratch_len())
    }
}

impl std::fmt::Debug for TransformPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformPlan").field("size", &self.size).finish()
    }
}

/// Cache of transform plans keyed by transform size
pub struct TransformCache {
    plans: RwLock<HashMap<usize, TransformPlan>>,
}

static GLOBAL_CACHE: OnceLock<TransformCache> = OnceLock::new();

impl TransformCache {
    /// Create an empty, private cache
    pub fn new() -> Self {
        Self {
            plans: RwLock::new(HashMap::new()),
        }
    }

    /// The process-wide cache
    pub fn global() -> &'static TransformCache {
        GLOBAL_CACHE.get_or_init(TransformCache::new)
    }

    /// Get the plan for `size`, building it on first use
    pub fn plan(&self, size: usize) -> TransformPlan {
        if let Some(plan) = self.plans.read().get(&size) {
            return plan.clone();
        }

        let mut plans = self.plans.write();
        // Another builder may have won the race between the two locks
        if let Some(plan) = plans.get(&size) {
            return plan.clone();
        }

        // The planner keeps non-Send recipe caches, so it lives only for the miss
        let mut planner = RealFftPlanner::<Sample>::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let plan = TransformPlan {
            size,
            forward,
            inverse,
        };
        plans.insert(size, plan.clone());
        log::debug!("[FFT] Planned transform of size {}", size);
        plan
    }

    /// Number of cached transform sizes
    pub fn len(&self) -> usize {
        self.plans.read().len()
    }

    /// Check whether no plan has been built yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TransformCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plans_are_shared_per_size() {
        let cache = TransformCache::new();
        let a = cache.plan(1024);
        let b = cache.plan(1024);

        assert_eq!(cache.len(), 1);
        assert!(Arc::ptr_eq(a.forward(), b.forward()));
        assert!(Arc::ptr_eq(a.inverse(), b.inverse()));
    }

    #[test]
    fn test_distinct_sizes_get_distinct_plans() {
        let cache = TransformCache::new();
        let small = cache.plan(256);
        let large = cache.plan(2048);

        assert_eq!(cache.len(), 2);
        assert_eq!(small.bins(), 129);
        assert_eq!(large.size(), 2048);
    }

    #[test]
    fn test_concurrent_misses_build_one_plan() {
        let cache = Arc::new(TransformCache::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.plan(512))
            })
            .collect();
        let plans: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(cache.len(), 1);
        for plan in &plans[1..] {
            assert!(Arc::ptr_eq(plans[0].forward(), plan.forward()));
        }
    }
}
