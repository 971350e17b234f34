//! Configuration for courier
//!
//! CLI arguments and environment variable handling using clap. Workers come
//! either from a static endpoint list or from Consul discovery; setting both
//! Consul options switches discovery on and the static list is ignored.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::format::Format;
use crate::types::Result;
use crate::worker::{Endpoint, Timeouts, Worker};

/// Courier - remote conversion delegation
///
/// Hands a document to a remote conversion worker and writes the converted
/// file next to the input.
#[derive(Parser, Debug, Clone)]
#[command(name = "courier")]
#[command(about = "Delegates document conversions to remote conversion workers")]
pub struct Args {
    /// File to convert
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Target format (defaults to the per-format mapping, e.g. doc -> docx)
    #[arg(long, value_name = "FORMAT")]
    pub to: Option<String>,

    /// Comma-separated host:port list of general conversion workers
    #[arg(long, env = "WORKERS")]
    pub workers: Option<String>,

    /// Comma-separated host:port list of OCR-capable conversion workers
    #[arg(long, env = "OCR_WORKERS")]
    pub ocr_workers: Option<String>,

    /// Consul agent address (host:port) for worker discovery
    #[arg(long, env = "CONSUL_ADDRESS")]
    pub consul_address: Option<String>,

    /// Consul service name the workers register under
    #[arg(long, env = "CONSUL_SERVICE")]
    pub consul_service: Option<String>,

    /// Minimum time between two discovery queries
    #[arg(long, env = "REFRESH_INTERVAL_MS", default_value = "1000")]
    pub refresh_interval_ms: u64,

    /// Timeout for opening a worker connection
    #[arg(long, env = "CONNECT_TIMEOUT_MS", default_value = "5000")]
    pub connect_timeout_ms: u64,

    /// Timeout for the liveness probe
    #[arg(long, env = "PROBE_TIMEOUT_MS", default_value = "250")]
    pub probe_timeout_ms: u64,

    /// Timeout for the conversion itself; conversions can take minutes
    #[arg(long, env = "CONVERSION_TIMEOUT_MS", default_value = "900000")]
    pub conversion_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Whether worker discovery is configured. Discovery takes precedence
    /// over the static worker list.
    pub fn use_discovery(&self) -> bool {
        self.consul_address.is_some() && self.consul_service.is_some()
    }

    /// The statically configured workers: general workers first, OCR-capable
    /// workers after them. An endpoint listed in both lists counts once, as
    /// OCR-capable.
    pub fn static_workers(&self) -> Result<Vec<Worker>> {
        let ocr = parse_endpoint_list(self.ocr_workers.as_deref())?;
        let general = parse_endpoint_list(self.workers.as_deref())?;

        let ocr_set: HashSet<&Endpoint> = ocr.iter().collect();
        let mut workers: Vec<Worker> = general
            .iter()
            .filter(|endpoint| !ocr_set.contains(endpoint))
            .map(|endpoint| Worker::new(endpoint.clone(), false))
            .collect();
        workers.extend(ocr.iter().map(|endpoint| Worker::new(endpoint.clone(), true)));
        Ok(workers)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_millis(self.connect_timeout_ms),
            probe: Duration::from_millis(self.probe_timeout_ms),
            conversion: Duration::from_millis(self.conversion_timeout_ms),
        }
    }

    /// Requested target format, if any.
    pub fn output_format(&self) -> Result<Option<Format>> {
        self.to.as_deref().map(Format::from_extension).transpose()
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        match (&self.consul_address, &self.consul_service) {
            (Some(_), None) | (None, Some(_)) => {
                return Err(
                    "CONSUL_ADDRESS and CONSUL_SERVICE must be set together".to_string()
                );
            }
            _ => {}
        }

        if !self.use_discovery() {
            let workers = self.static_workers().map_err(|e| e.to_string())?;
            if workers.is_empty() {
                return Err(
                    "no conversion workers configured (set WORKERS/OCR_WORKERS, or CONSUL_ADDRESS and CONSUL_SERVICE)"
                        .to_string(),
                );
            }
        }

        if self.conversion_timeout_ms <= self.connect_timeout_ms {
            return Err("CONVERSION_TIMEOUT_MS must exceed CONNECT_TIMEOUT_MS".to_string());
        }

        if let Err(e) = self.output_format() {
            return Err(e.to_string());
        }

        Ok(())
    }
}

fn parse_endpoint_list(value: Option<&str>) -> Result<Vec<Endpoint>> {
    let mut endpoints = Vec::new();
    for entry in value.unwrap_or_default().split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        endpoints.push(entry.parse()?);
    }
    Ok(endpoints)
}
