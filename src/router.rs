//! Routing with failover across the worker pool.
//!
//! One conversion job walks a fixed sequence: resolve the output format,
//! take a snapshot of the pool, filter candidates by capability, then try
//! candidates in priority order behind a cheap liveness probe. The first
//! success wins; once every candidate has failed, one last unconditional
//! attempt goes to the first registered worker in case the health signal was
//! a false negative. There is no retry of a job after that.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::directory::WorkerDirectory;
use crate::format::Format;
use crate::types::{CourierError, Result};
use crate::worker::probe;

pub struct Router {
    directory: Arc<WorkerDirectory>,
    probe_timeout: Duration,
}

impl Router {
    pub fn new(directory: Arc<WorkerDirectory>, probe_timeout: Duration) -> Self {
        Self {
            directory,
            probe_timeout,
        }
    }

    /// Convert a file on the best available worker.
    ///
    /// With no explicit `output_format` the per-format default target is
    /// used. Individual worker failures are logged and skipped; the caller
    /// only sees a configuration error, the terminal exhaustion error, or a
    /// protocol error from the final unconditional attempt.
    pub async fn convert(
        &self,
        file: &Path,
        output_format: Option<Format>,
    ) -> Result<PathBuf> {
        let input_format = Format::from_path(file)?;
        let output_format = match output_format {
            Some(format) => format,
            None => input_format
                .default_output()
                .ok_or(CourierError::NoOutputFormat(input_format))?,
        };

        // Catch an unreadable input before any worker is contacted.
        tokio::fs::metadata(file).await?;

        self.directory.refresh_if_needed().await;
        let snapshot = self.directory.snapshot().await;
        if snapshot.is_empty() {
            return Err(CourierError::NoWorkersRegistered);
        }

        info!(
            "delegating conversion of {} from {} to {}",
            file.display(),
            input_format,
            output_format
        );

        for handle in snapshot.candidates(input_format.requires_ocr()) {
            let endpoint = &handle.worker.endpoint;
            if !probe(endpoint, self.probe_timeout).await {
                warn!(
                    "worker {} did not answer the probe within {:?}, trying next in list",
                    endpoint, self.probe_timeout
                );
                continue;
            }
            match handle.client.convert(file, input_format, output_format).await {
                Ok(output) => return Ok(output),
                Err(e) => {
                    error!("conversion via worker {} failed, trying next in list: {e}", endpoint);
                }
            }
        }

        // Every candidate failed, possibly on a stale or flaky health
        // signal. Try the first registered worker once more, without the
        // probe; this failure is terminal.
        let Some(first) = snapshot.first() else {
            return Err(CourierError::NoReachableWorkers);
        };
        warn!(
            "all candidates failed, making a final attempt against worker {} without probing",
            first.worker.endpoint
        );
        match first.client.convert(file, input_format, output_format).await {
            Ok(output) => Ok(output),
            Err(e @ CourierError::Protocol { .. }) => Err(e),
            Err(e) => {
                error!(
                    "final attempt against worker {} failed: {e}",
                    first.worker.endpoint
                );
                Err(CourierError::NoReachableWorkers)
            }
        }
    }
}
