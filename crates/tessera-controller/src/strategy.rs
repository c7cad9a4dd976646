use std::sync::atomic::{AtomicU64, Ordering};

use tessera_common::NodeRecord;

/// Trait for pluggable node selection strategies.
/// The balancer narrows the registry to healthy nodes (in registration order),
/// then delegates the pick to the strategy.
pub trait SelectionStrategy: Send + Sync {
    /// Select one candidate from the list. Returns the index into `candidates`.
    fn select(&self, candidates: &[NodeRecord]) -> Option<usize>;

    /// Human-readable name for logging.
    fn name(&self) -> &'static str;
}

/// Index of the first candidate whose score beats every earlier one under
/// `better`. Ties keep the earliest candidate.
fn first_best(
    candidates: &[NodeRecord],
    score: impl Fn(&NodeRecord) -> f64,
    better: impl Fn(f64, f64) -> bool,
) -> Option<usize> {
    let mut iter = candidates.iter().enumerate();
    let (mut best_idx, first) = iter.next()?;
    let mut best = score(first);

    for (i, c) in iter {
        let s = score(c);
        if better(s, best) {
            best = s;
            best_idx = i;
        }
    }

    Some(best_idx)
}

/// Active requests per CPU core.
///
/// A zero-core node yields `inf` when busy or `NaN` when idle. Neither ever
/// compares lower than another score, so such a node is never picked over
/// an earlier one. An idle zero-core node in first position stays the pick,
/// since nothing compares lower than `NaN` either.
pub fn load(node: &NodeRecord) -> f64 {
    f64::from(node.metrics.active_requests) / f64::from(node.capabilities.cpu_cores)
}

/// Raw capacity discounted by CPU usage and in-flight requests (saturating
/// at 10).
pub fn capacity_score(node: &NodeRecord) -> f64 {
    let caps = &node.capabilities;
    let mut raw = f64::from(caps.cpu_cores) * 10.0;
    if caps.gpu_available {
        if let Some(bytes) = caps.gpu_memory_bytes {
            raw += bytes as f64 / (1u64 << 30) as f64;
        }
    }
    let cpu_headroom = 1.0 - node.metrics.cpu_usage_pct / 100.0;
    let busy = f64::from(node.metrics.active_requests.min(10)) / 10.0;
    raw * cpu_headroom * (1.0 - busy)
}

// ---------------------------------------------------------------------------
// LeastLoaded: lowest activeRequests / cpuCores (default)
// ---------------------------------------------------------------------------

pub struct LeastLoaded;

impl SelectionStrategy for LeastLoaded {
    fn select(&self, candidates: &[NodeRecord]) -> Option<usize> {
        first_best(candidates, load, |s, best| s < best)
    }

    fn name(&self) -> &'static str {
        "least_loaded"
    }
}

// ---------------------------------------------------------------------------
// RoundRobin: rotate through the healthy set
// ---------------------------------------------------------------------------

/// The cursor is never reset, so when the healthy set changes size the
/// rotation continues from wherever `cursor % len` lands.
#[derive(Default)]
pub struct RoundRobin {
    cursor: AtomicU64,
}

impl SelectionStrategy for RoundRobin {
    fn select(&self, candidates: &[NodeRecord]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        let prev = self.cursor.fetch_add(1, Ordering::Relaxed);
        Some((prev % candidates.len() as u64) as usize)
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

// ---------------------------------------------------------------------------
// CapacityBased: highest discounted capacity score
// ---------------------------------------------------------------------------

pub struct CapacityBased;

impl SelectionStrategy for CapacityBased {
    fn select(&self, candidates: &[NodeRecord]) -> Option<usize> {
        first_best(candidates, capacity_score, |s, best| s > best)
    }

    fn name(&self) -> &'static str {
        "capacity_based"
    }
}

// ---------------------------------------------------------------------------
// LatencyOptimized: lowest average response time
// ---------------------------------------------------------------------------

pub struct LatencyOptimized;

impl SelectionStrategy for LatencyOptimized {
    fn select(&self, candidates: &[NodeRecord]) -> Option<usize> {
        first_best(
            candidates,
            |n| n.metrics.avg_response_time_ms,
            |s, best| s < best,
        )
    }

    fn name(&self) -> &'static str {
        "latency_optimized"
    }
}

pub const STRATEGY_NAMES: &[&str] = &[
    "least_loaded",
    "round_robin",
    "capacity_based",
    "latency_optimized",
];

/// Parse a strategy name string into a boxed strategy.
pub fn parse_strategy(name: &str) -> Result<Box<dyn SelectionStrategy>, String> {
    match name {
        "least_loaded" => Ok(Box::new(LeastLoaded)),
        "round_robin" => Ok(Box::new(RoundRobin::default())),
        "capacity_based" => Ok(Box::new(CapacityBased)),
        "latency_optimized" => Ok(Box::new(LatencyOptimized)),
        other => Err(format!(
            "unknown selection strategy '{}', available: {}",
            other,
            STRATEGY_NAMES.join(", ")
        )),
    }
}
