//! Endpoint and payload selection strategies

use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Picks an index into a pool of `len` entries
pub trait Selector: Send + Sync {
    /// `len` is never zero
    fn pick(&self, len: usize) -> usize;
}

/// Uniform random choice, spreading load across the pool
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSelector;

impl Selector for RandomSelector {
    fn pick(&self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        rand::thread_rng().gen_range(0..len)
    }
}

/// Cycles through the pool in order
#[derive(Debug, Default)]
pub struct RoundRobinSelector {
    next: AtomicUsize,
}

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Selector for RoundRobinSelector {
    fn pick(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        self.next.fetch_add(1, Ordering::Relaxed) % len
    }
}
