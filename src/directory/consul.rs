//! Consul-backed worker discovery.
//!
//! Queries the Consul health endpoint for the configured service and turns
//! the result into an ordered worker list. The query is read-only and
//! idempotent; Consul pre-sorts entries by proximity to the local agent and
//! that order is preserved, healthy entries first.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::types::{CourierError, Result};
use crate::worker::{Endpoint, Worker};

/// Tag marking a worker as OCR-capable.
const OCR_TAG: &str = "ocr";

/// Check status required for an entry to count as healthy.
const PASSING: &str = "passing";

/// Read-only source of the current worker set.
///
/// Implementations must be side-effect free; the directory may issue
/// redundant queries under concurrency.
#[async_trait]
pub trait DiscoveryBackend: Send + Sync {
    async fn fetch_workers(&self) -> Result<Vec<Worker>>;
}

/// Discovery backend querying a Consul agent over HTTP.
pub struct ConsulBackend {
    http: reqwest::Client,
    url: String,
}

impl ConsulBackend {
    pub fn new(address: &str, service: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CourierError::Discovery(format!("could not build http client: {e}")))?;
        // '?near=_agent' asks Consul to sort the entries by proximity.
        let url = format!("http://{address}/v1/health/service/{service}?near=_agent");
        Ok(Self { http, url })
    }
}

#[async_trait]
impl DiscoveryBackend for ConsulBackend {
    async fn fetch_workers(&self) -> Result<Vec<Worker>> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| CourierError::Discovery(format!("consul query failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CourierError::Discovery(format!(
                "consul returned status {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CourierError::Discovery(format!("consul response unreadable: {e}")))?;
        let entries: Vec<HealthEntry> = serde_json::from_str(&body)
            .map_err(|e| CourierError::Discovery(format!("malformed consul payload: {e}")))?;

        Ok(workers_from_entries(entries))
    }
}

#[derive(Debug, Deserialize)]
struct HealthEntry {
    #[serde(rename = "Node")]
    node: NodeInfo,
    #[serde(rename = "Service")]
    service: ServiceInfo,
    #[serde(rename = "Checks", default)]
    checks: Vec<CheckInfo>,
}

#[derive(Debug, Deserialize)]
struct NodeInfo {
    #[serde(rename = "Address", default)]
    address: String,
}

#[derive(Debug, Deserialize)]
struct ServiceInfo {
    #[serde(rename = "Address", default)]
    address: String,
    #[serde(rename = "Port")]
    port: u16,
    #[serde(rename = "Tags", default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CheckInfo {
    #[serde(rename = "Status", default)]
    status: String,
}

/// Build the worker list from Consul health entries: healthy workers first,
/// then unhealthy, each group keeping Consul's proximity order. An entry is
/// healthy only if every one of its checks is passing.
fn workers_from_entries(entries: Vec<HealthEntry>) -> Vec<Worker> {
    let mut healthy = Vec::new();
    let mut unhealthy = Vec::new();

    for entry in entries {
        // Services registered without their own address fall back to the
        // node's address.
        let host = if entry.service.address.is_empty() {
            entry.node.address
        } else {
            entry.service.address
        };
        let supports_ocr = entry.service.tags.iter().any(|tag| tag == OCR_TAG);
        let is_healthy = entry.checks.iter().all(|check| check.status == PASSING);

        let worker = Worker {
            endpoint: Endpoint {
                host,
                port: entry.service.port,
            },
            supports_ocr,
            healthy: is_healthy,
        };
        if is_healthy {
            healthy.push(worker);
        } else {
            unhealthy.push(worker);
        }
    }

    healthy.append(&mut unhealthy);
    healthy
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Vec<Worker> {
        workers_from_entries(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn parses_a_typical_health_payload() {
        let workers = parse(
            r#"[
                {
                    "Node": {"Address": "10.0.0.1", "Node": "node-1"},
                    "Service": {"Address": "10.0.0.1", "Port": 8732, "Tags": [], "ID": "conv-1"},
                    "Checks": [{"Status": "passing"}, {"Status": "passing"}]
                },
                {
                    "Node": {"Address": "10.0.0.2"},
                    "Service": {"Address": "10.0.0.2", "Port": 8732, "Tags": ["ocr", "v2"]},
                    "Checks": [{"Status": "passing"}]
                }
            ]"#,
        );

        assert_eq!(workers.len(), 2);
        assert_eq!(workers[0].endpoint.to_string(), "10.0.0.1:8732");
        assert!(!workers[0].supports_ocr);
        assert!(workers[0].healthy);
        assert!(workers[1].supports_ocr);
    }

    #[test]
    fn all_checks_must_pass_for_health() {
        let workers = parse(
            r#"[
                {
                    "Node": {"Address": "10.0.0.1"},
                    "Service": {"Address": "10.0.0.1", "Port": 8732, "Tags": []},
                    "Checks": [{"Status": "passing"}, {"Status": "critical"}]
                }
            ]"#,
        );

        assert!(!workers[0].healthy);
    }

    #[test]
    fn entries_without_checks_count_as_healthy() {
        let workers = parse(
            r#"[
                {
                    "Node": {"Address": "10.0.0.1"},
                    "Service": {"Address": "10.0.0.1", "Port": 8732, "Tags": []}
                }
            ]"#,
        );

        assert!(workers[0].healthy);
    }

    #[test]
    fn blank_service_address_falls_back_to_the_node() {
        let workers = parse(
            r#"[
                {
                    "Node": {"Address": "10.0.0.9"},
                    "Service": {"Address": "", "Port": 8732, "Tags": []},
                    "Checks": [{"Status": "passing"}]
                }
            ]"#,
        );

        assert_eq!(workers[0].endpoint.host, "10.0.0.9");
    }

    #[test]
    fn healthy_workers_come_first_keeping_proximity_order() {
        let workers = parse(
            r#"[
                {
                    "Node": {"Address": "10.0.0.1"},
                    "Service": {"Address": "10.0.0.1", "Port": 8732, "Tags": []},
                    "Checks": [{"Status": "critical"}]
                },
                {
                    "Node": {"Address": "10.0.0.2"},
                    "Service": {"Address": "10.0.0.2", "Port": 8732, "Tags": []},
                    "Checks": [{"Status": "passing"}]
                },
                {
                    "Node": {"Address": "10.0.0.3"},
                    "Service": {"Address": "10.0.0.3", "Port": 8732, "Tags": []},
                    "Checks": [{"Status": "warning"}]
                },
                {
                    "Node": {"Address": "10.0.0.4"},
                    "Service": {"Address": "10.0.0.4", "Port": 8732, "Tags": []},
                    "Checks": [{"Status": "passing"}]
                }
            ]"#,
        );

        let hosts: Vec<&str> = workers.iter().map(|w| w.endpoint.host.as_str()).collect();
        assert_eq!(hosts, ["10.0.0.2", "10.0.0.4", "10.0.0.1", "10.0.0.3"]);
    }

    #[test]
    fn non_array_payloads_are_rejected() {
        let result: std::result::Result<Vec<HealthEntry>, _> =
            serde_json::from_str(r#"{"unexpected": "object"}"#);
        assert!(result.is_err());
    }
}
