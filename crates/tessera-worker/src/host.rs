use std::sync::Mutex;

use sysinfo::System;

use tessera_common::{NodeCapabilities, NodeMetrics};

/// Host utilisation at one point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostSample {
    pub cpu_usage_pct: f64,
    pub mem_usage_pct: f64,
    pub ram_total_bytes: u64,
    pub ram_available_bytes: u64,
}

impl HostSample {
    pub fn from_memory(cpu_usage_pct: f64, total: u64, available: u64) -> Self {
        let used = total.saturating_sub(available);
        let mem_usage_pct = if total > 0 {
            used as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Self {
            cpu_usage_pct: cpu_usage_pct.clamp(0.0, 100.0),
            mem_usage_pct,
            ram_total_bytes: total,
            ram_available_bytes: available.min(total),
        }
    }

    /// Overwrites the usage figures, leaving request counters alone.
    pub fn apply_metrics(&self, metrics: &mut NodeMetrics) {
        metrics.cpu_usage_pct = self.cpu_usage_pct;
        metrics.mem_usage_pct = self.mem_usage_pct;
    }

    pub fn apply_capabilities(&self, caps: &mut NodeCapabilities) {
        caps.ram_total_bytes = self.ram_total_bytes;
        caps.ram_available_bytes = self.ram_available_bytes;
    }
}

/// Samples CPU and memory usage of the machine the worker runs on.
///
/// CPU usage is measured between consecutive refreshes, so the first
/// sample after startup reads close to zero.
pub struct HostMonitor {
    sys: Mutex<System>,
}

impl std::fmt::Debug for HostMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostMonitor").finish_non_exhaustive()
    }
}

impl Default for HostMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HostMonitor {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu();
        Self {
            sys: Mutex::new(sys),
        }
    }

    pub fn cpu_cores(&self) -> u32 {
        let sys = self.sys.lock().unwrap_or_else(|e| e.into_inner());
        sys.cpus().len() as u32
    }

    pub fn sample(&self) -> HostSample {
        let mut sys = self.sys.lock().unwrap_or_else(|e| e.into_inner());
        sys.refresh_memory();
        sys.refresh_cpu();
        HostSample::from_memory(
            f64::from(sys.global_cpu_info().cpu_usage()),
            sys.total_memory(),
            sys.available_memory(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_usage_is_used_over_total() {
        let s = HostSample::from_memory(37.5, 16 << 30, 4 << 30);
        assert_eq!(s.mem_usage_pct, 75.0);
        assert_eq!(s.cpu_usage_pct, 37.5);
        assert_eq!(s.ram_available_bytes, 4 << 30);
    }

    #[test]
    fn degenerate_readings_stay_in_range() {
        let s = HostSample::from_memory(140.0, 0, 10);
        assert_eq!(s.mem_usage_pct, 0.0);
        assert_eq!(s.cpu_usage_pct, 100.0);
        assert_eq!(s.ram_available_bytes, 0);
    }

    #[test]
    fn apply_keeps_request_counters() {
        let s = HostSample::from_memory(20.0, 100, 50);
        let mut m = NodeMetrics {
            active_requests: 3,
            total_requests: 9,
            ..NodeMetrics::default()
        };
        s.apply_metrics(&mut m);
        assert_eq!(m.cpu_usage_pct, 20.0);
        assert_eq!(m.mem_usage_pct, 50.0);
        assert_eq!(m.active_requests, 3);
        assert_eq!(m.total_requests, 9);

        let mut caps = NodeCapabilities::default();
        s.apply_capabilities(&mut caps);
        assert_eq!((caps.ram_total_bytes, caps.ram_available_bytes), (100, 50));
    }

    #[test]
    fn live_sample_reads_this_machine() {
        let host = HostMonitor::new();
        let s = host.sample();
        assert!(host.cpu_cores() > 0);
        assert!(s.ram_total_bytes > 0);
        assert!(s.ram_available_bytes <= s.ram_total_bytes);
        assert!((0.0..=100.0).contains(&s.mem_usage_pct));
        assert!((0.0..=100.0).contains(&s.cpu_usage_pct));
    }
}
