//! Worker directory - the current set of known conversion workers.
//!
//! The directory hands out immutable snapshots of the pool. In static mode
//! the snapshot is built once from configuration and never changes. In
//! dynamic mode it is rebuilt from the discovery backend at most once per
//! refresh interval and swapped atomically, so readers always see a complete
//! list. A failed or empty discovery query keeps the previous snapshot;
//! staleness is preferred over unavailability.

pub mod consul;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::worker::{ConversionClient, Endpoint, Timeouts, Worker, WorkerHandle, WorkerSnapshot};

pub use consul::{ConsulBackend, DiscoveryBackend};

pub struct WorkerDirectory {
    backend: Option<Arc<dyn DiscoveryBackend>>,
    refresh_interval: Duration,
    timeouts: Timeouts,
    snapshot: RwLock<Arc<WorkerSnapshot>>,
    /// Clients built so far, keyed by endpoint. Reused across refreshes so a
    /// worker that stays registered keeps its client instance.
    clients: DashMap<Endpoint, Arc<ConversionClient>>,
    /// When the last refresh attempt completed. Also serializes refreshes:
    /// concurrent callers wait here instead of issuing duplicate queries.
    last_refresh: Mutex<Option<Instant>>,
}

impl WorkerDirectory {
    /// Directory over a fixed worker list. Never queries anything.
    pub fn fixed(workers: Vec<Worker>, timeouts: Timeouts) -> Self {
        let entries = workers
            .into_iter()
            .map(|worker| WorkerHandle {
                client: Arc::new(ConversionClient::new(worker.endpoint.clone(), timeouts)),
                worker,
            })
            .collect();

        Self {
            backend: None,
            refresh_interval: Duration::ZERO,
            timeouts,
            snapshot: RwLock::new(Arc::new(WorkerSnapshot::new(entries))),
            clients: DashMap::new(),
            last_refresh: Mutex::new(None),
        }
    }

    /// Directory fed by a discovery backend. Starts empty; the first
    /// `refresh_if_needed` call populates it.
    pub fn with_discovery(
        backend: Arc<dyn DiscoveryBackend>,
        refresh_interval: Duration,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            backend: Some(backend),
            refresh_interval,
            timeouts,
            snapshot: RwLock::new(Arc::new(WorkerSnapshot::default())),
            clients: DashMap::new(),
            last_refresh: Mutex::new(None),
        }
    }

    /// Current snapshot. The returned list never changes under the caller;
    /// refreshes swap in a new one instead.
    pub async fn snapshot(&self) -> Arc<WorkerSnapshot> {
        self.snapshot.read().await.clone()
    }

    /// Re-query the discovery backend unless the pool was refreshed within
    /// the refresh interval. A no-op in static mode.
    pub async fn refresh_if_needed(&self) {
        let Some(backend) = &self.backend else {
            return;
        };

        let mut last_refresh = self.last_refresh.lock().await;
        if let Some(at) = *last_refresh {
            if at.elapsed() < self.refresh_interval {
                return;
            }
        }

        let workers = match backend.fetch_workers().await {
            Ok(workers) => workers,
            Err(e) => {
                // The timer is not advanced, so the next call retries
                // instead of sitting on a stale list for a full interval.
                warn!("worker discovery failed, keeping the previous worker list: {e}");
                return;
            }
        };

        if workers.is_empty() {
            warn!("discovery returned no worker instances, keeping the previous worker list");
            *last_refresh = Some(Instant::now());
            return;
        }

        let live: HashSet<Endpoint> = workers.iter().map(|w| w.endpoint.clone()).collect();
        let entries: Vec<WorkerHandle> = workers
            .into_iter()
            .map(|worker| {
                let client = self
                    .clients
                    .entry(worker.endpoint.clone())
                    .or_insert_with(|| {
                        Arc::new(ConversionClient::new(worker.endpoint.clone(), self.timeouts))
                    })
                    .value()
                    .clone();
                WorkerHandle { worker, client }
            })
            .collect();
        self.clients.retain(|endpoint, _| live.contains(endpoint));

        debug!("refreshed worker directory: {} workers", entries.len());
        *self.snapshot.write().await = Arc::new(WorkerSnapshot::new(entries));
        *last_refresh = Some(Instant::now());
    }
}
