use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Controller,
    Worker,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Healthy,
    Degraded,
    Offline,
}

/// Outcome of the most recent active health probe.
///
/// This is one of the two inputs `NodeStatus` is derived from; the other is
/// the registry's passive liveness flag. A probe can never report `Offline`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProbeVerdict {
    Healthy,
    Degraded,
}

impl NodeStatus {
    pub fn derive(live: bool, verdict: ProbeVerdict) -> Self {
        match (live, verdict) {
            (false, _) => NodeStatus::Offline,
            (true, ProbeVerdict::Healthy) => NodeStatus::Healthy,
            (true, ProbeVerdict::Degraded) => NodeStatus::Degraded,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeCapabilities {
    pub cpu_cores: u32,
    pub ram_total_bytes: u64,
    pub ram_available_bytes: u64,
    pub gpu_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_memory_bytes: Option<u64>,
    pub max_context_length: u32,
    #[serde(default)]
    pub supported_models: BTreeSet<String>,
}

/// Load figures reported by a worker, either on registration or in a
/// health-probe response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeMetrics {
    pub active_requests: u32,
    pub total_requests: u64,
    pub avg_response_time_ms: f64,
    pub tokens_per_second: f64,
    pub cpu_usage_pct: f64,
    pub mem_usage_pct: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_usage_pct: Option<f64>,
}

/// Body of `POST /cluster/register`: a node record without a status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeRegistration {
    pub id: String,
    #[serde(alias = "type")]
    pub role: NodeRole,
    #[serde(flatten)]
    pub address: NodeAddress,
    pub capabilities: NodeCapabilities,
    #[serde(default)]
    pub metrics: NodeMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub id: String,
    pub role: NodeRole,
    #[serde(flatten)]
    pub address: NodeAddress,
    pub status: NodeStatus,
    pub capabilities: NodeCapabilities,
    pub metrics: NodeMetrics,
    /// Unix milliseconds of the last register/update call.
    pub last_seen: u64,
}

impl NodeRecord {
    pub fn from_registration(reg: NodeRegistration, status: NodeStatus, last_seen: u64) -> Self {
        Self {
            id: reg.id,
            role: reg.role,
            address: reg.address,
            status,
            capabilities: reg.capabilities,
            metrics: reg.metrics,
            last_seen,
        }
    }

    pub fn is_worker(&self) -> bool {
        self.role == NodeRole::Worker
    }
}

/// Partial update merged into an existing record by `NodeRegistry::update`.
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodePatch {
    pub verdict: Option<ProbeVerdict>,
    pub metrics: Option<NodeMetrics>,
}

impl NodePatch {
    pub fn healthy(metrics: Option<NodeMetrics>) -> Self {
        Self {
            verdict: Some(ProbeVerdict::Healthy),
            metrics,
        }
    }

    pub fn degraded() -> Self {
        Self {
            verdict: Some(ProbeVerdict::Degraded),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_accepts_legacy_type_key_and_flat_address() {
        let body = serde_json::json!({
            "id": "worker_a",
            "type": "worker",
            "host": "10.0.0.4",
            "port": 8081,
            "capabilities": {
                "cpuCores": 8,
                "ramTotalBytes": 17179869184u64,
                "ramAvailableBytes": 8589934592u64,
                "gpuAvailable": false,
                "maxContextLength": 2048,
                "supportedModels": ["mistral-7b", "llama-2-7b", "mistral-7b"]
            }
        });

        let reg: NodeRegistration = serde_json::from_value(body).unwrap();
        assert_eq!(reg.role, NodeRole::Worker);
        assert_eq!(reg.address.base_url(), "http://10.0.0.4:8081");
        assert_eq!(reg.capabilities.supported_models.len(), 2);
        assert_eq!(reg.metrics, NodeMetrics::default());
    }

    #[test]
    fn record_serializes_camel_case_with_status() {
        let reg = NodeRegistration {
            id: "n1".to_string(),
            role: NodeRole::Worker,
            address: NodeAddress {
                host: "localhost".to_string(),
                port: 9000,
            },
            capabilities: NodeCapabilities {
                cpu_cores: 4,
                ..NodeCapabilities::default()
            },
            metrics: NodeMetrics::default(),
        };
        let record = NodeRecord::from_registration(reg, NodeStatus::Healthy, 42);
        let v = serde_json::to_value(&record).unwrap();

        assert_eq!(v["status"], "healthy");
        assert_eq!(v["host"], "localhost");
        assert_eq!(v["lastSeen"], 42);
        assert_eq!(v["capabilities"]["cpuCores"], 4);
        assert!(v["capabilities"].get("gpuMemoryBytes").is_none());
        assert_eq!(v["metrics"]["activeRequests"], 0);
    }

    #[test]
    fn status_is_derived_from_liveness_and_verdict() {
        assert_eq!(NodeStatus::derive(true, ProbeVerdict::Healthy), NodeStatus::Healthy);
        assert_eq!(NodeStatus::derive(true, ProbeVerdict::Degraded), NodeStatus::Degraded);
        assert_eq!(NodeStatus::derive(false, ProbeVerdict::Healthy), NodeStatus::Offline);
        assert_eq!(NodeStatus::derive(false, ProbeVerdict::Degraded), NodeStatus::Offline);
    }
}
