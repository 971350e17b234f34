//! Worker module - the conversion worker pool's building blocks
//!
//! A worker is a remote process reachable over TCP that performs the actual
//! document conversion. Workers are immutable values identified by their
//! endpoint; the directory rebuilds the surrounding snapshot instead of
//! mutating workers in place.

pub mod client;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::types::CourierError;

pub use client::{probe, ConversionClient};

/// Network address of a conversion worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = CourierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| CourierError::InvalidEndpoint(s.to_string()))?;
        if host.is_empty() {
            return Err(CourierError::InvalidEndpoint(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| CourierError::InvalidEndpoint(s.to_string()))?;
        Ok(Endpoint {
            host: host.to_string(),
            port,
        })
    }
}

/// A conversion worker as last observed.
///
/// `healthy` is what the discovery backend reported, not a live measurement;
/// the router still probes before converting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worker {
    pub endpoint: Endpoint,
    pub supports_ocr: bool,
    pub healthy: bool,
}

impl Worker {
    pub fn new(endpoint: Endpoint, supports_ocr: bool) -> Self {
        Self {
            endpoint,
            supports_ocr,
            healthy: true,
        }
    }
}

/// Socket timeouts for one conversion job.
///
/// `conversion` bounds the wait for the worker to produce a result and is
/// orders of magnitude larger than the other two.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub connect: Duration,
    pub probe: Duration,
    pub conversion: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_millis(5000),
            probe: Duration::from_millis(250),
            conversion: Duration::from_secs(15 * 60),
        }
    }
}

/// A worker paired with its protocol client.
///
/// Clients are reused across directory refreshes for endpoints that stay
/// registered, so the pairing travels together.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    pub worker: Worker,
    pub client: Arc<ConversionClient>,
}

/// An immutable, point-in-time ordered list of known workers.
///
/// The directory swaps whole snapshots atomically; a routing decision always
/// works off one consistent snapshot even while a refresh is underway.
#[derive(Debug, Default)]
pub struct WorkerSnapshot {
    entries: Vec<WorkerHandle>,
}

impl WorkerSnapshot {
    pub fn new(entries: Vec<WorkerHandle>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// First registered worker, the target of the final unconditional
    /// attempt after every candidate has failed.
    pub fn first(&self) -> Option<&WorkerHandle> {
        self.entries.first()
    }

    /// Workers eligible for a job, in the order they should be tried.
    ///
    /// OCR jobs can only go to OCR-capable workers. For everything else the
    /// whole pool is eligible, ordered so that workers last seen healthy come
    /// first and, within each health group, general workers come before the
    /// OCR-capable ones (those carry the OCR load and tend to be slower).
    /// Unhealthy workers are kept at the tail rather than dropped; the probe
    /// is the final say on liveness.
    pub fn candidates(&self, requires_ocr: bool) -> Vec<WorkerHandle> {
        if requires_ocr {
            self.entries
                .iter()
                .filter(|handle| handle.worker.supports_ocr)
                .cloned()
                .collect()
        } else {
            let mut candidates = self.entries.to_vec();
            candidates.sort_by_key(|handle| (!handle.worker.healthy, handle.worker.supports_ocr));
            candidates
        }
    }

    pub fn workers(&self) -> impl Iterator<Item = &Worker> {
        self.entries.iter().map(|handle| &handle.worker)
    }
}
