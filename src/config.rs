use std::sync::atomic::{AtomicUsize, Ordering};

// Below these sizes the rayon fan-out costs more than it saves.
const DEFAULT_PARALLEL_THRESHOLD: usize = 64;
const DEFAULT_PATTERN_PARALLEL_THRESHOLD: usize = 8;

static PARALLEL_THRESHOLD: AtomicUsize = AtomicUsize::new(DEFAULT_PARALLEL_THRESHOLD);
static PATTERN_PARALLEL_THRESHOLD: AtomicUsize =
    AtomicUsize::new(DEFAULT_PATTERN_PARALLEL_THRESHOLD);

/// Minimum number of sites before the neighbor search runs in parallel.
pub fn get_parallel_threshold() -> usize {
    PARALLEL_THRESHOLD.load(Ordering::Relaxed)
}

pub fn set_parallel_threshold(val: usize) {
    PARALLEL_THRESHOLD.store(val, Ordering::Relaxed);
}

/// Minimum number of magnetic patterns before aggregation runs in parallel.
pub fn get_pattern_parallel_threshold() -> usize {
    PATTERN_PARALLEL_THRESHOLD.load(Ordering::Relaxed)
}

pub fn set_pattern_parallel_threshold(val: usize) {
    PATTERN_PARALLEL_THRESHOLD.store(val, Ordering::Relaxed);
}
