//! Crate-wide error type and result alias.

use std::io;

use crate::format::Format;
use crate::worker::Endpoint;

pub type Result<T> = std::result::Result<T, CourierError>;

/// Errors surfaced by the conversion subsystem.
///
/// Configuration problems (`NoOutputFormat`, `NoWorkersRegistered`,
/// `InvalidEndpoint`) are raised before any network traffic. `Protocol` and
/// `Transport` describe a single worker failing a single job; the router
/// treats both the same way and moves on to the next candidate. `Discovery`
/// never fails a conversion, it only degrades the pool to its last good
/// state. `NoReachableWorkers` is the terminal failure after every candidate
/// and the final unconditional attempt have been exhausted.
#[derive(Debug, thiserror::Error)]
pub enum CourierError {
    #[error("format \"{0}\" is not supported for remote conversion")]
    UnsupportedFormat(String),

    #[error("format catalog is inconsistent: {0}")]
    Catalog(String),

    #[error("no output format requested and no default mapping for {0}")]
    NoOutputFormat(Format),

    #[error("no conversion workers registered")]
    NoWorkersRegistered,

    #[error("invalid worker endpoint \"{0}\" (expected host:port)")]
    InvalidEndpoint(String),

    #[error("worker {worker} failed with status {status} ({reason}) while converting {input} to {output}")]
    Protocol {
        worker: Endpoint,
        status: i32,
        reason: &'static str,
        input: Format,
        output: Format,
    },

    #[error("could not talk to worker {worker}: {source}")]
    Transport {
        worker: Endpoint,
        #[source]
        source: io::Error,
    },

    #[error("worker discovery failed: {0}")]
    Discovery(String),

    #[error("all registered conversion workers failed, including the final unconditional attempt")]
    NoReachableWorkers,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl CourierError {
    /// A non-zero status code received from a worker.
    pub fn protocol(worker: Endpoint, status: i32, input: Format, output: Format) -> Self {
        Self::Protocol {
            worker,
            status,
            reason: status_reason(status),
            input,
            output,
        }
    }

    pub(crate) fn transport(worker: Endpoint, source: io::Error) -> Self {
        Self::Transport { worker, source }
    }
}

/// Human-readable meaning of a worker status code.
fn status_reason(status: i32) -> &'static str {
    match status {
        1 => "unsupported format pair",
        2 => "source file size mismatch",
        3 => "source file unreadable",
        4 => "converted file exceeds size limit",
        5 => "worker internal error",
        6 => "conversion not supported",
        _ => "unknown error",
    }
}
