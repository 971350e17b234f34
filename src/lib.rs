//! Courier - remote conversion delegation for the document gateway
//!
//! The surrounding gateway converts documents to XLIFF with a local filter
//! pipeline. Formats the pipeline cannot open natively (legacy office
//! binaries, scanned images that need OCR) are handed to external conversion
//! workers over a private socket protocol. Courier is that hand-off: it keeps
//! track of the worker pool, picks a worker for each job, and carries the
//! file there and back.
//!
//! ## Modules
//!
//! - **format**: closed catalog of wire formats, codes and default targets
//! - **worker**: one-shot protocol client and the liveness probe
//! - **directory**: the worker pool, static or discovery-backed with caching
//! - **router**: capability filtering, probing and failover across the pool

pub mod config;
pub mod directory;
pub mod format;
pub mod router;
pub mod types;
pub mod worker;

pub use config::Args;
pub use format::Format;
pub use router::Router;
pub use types::{CourierError, Result};
