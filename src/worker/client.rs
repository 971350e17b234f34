//! One-shot binary protocol client for a single conversion worker.
//!
//! Each job opens a fresh TCP connection, sends the request, waits for the
//! result and closes. There is no connection pooling across jobs; a hung
//! worker is bounded by the connect and conversion timeouts.
//!
//! All integers on the wire are 4 bytes, big-endian:
//!
//! ```text
//! client -> server: conversionId:i32, inputCode:i32, outputCode:i32,
//!                   fileLength:i32, fileBytes[fileLength]
//! server -> client: status:i32
//!   if status == 0:
//!     server -> client: resultLength:i32, resultBytes[resultLength]
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use super::{Endpoint, Timeouts};
use crate::format::{self, Format};
use crate::types::{CourierError, Result};

/// Protocol client bound to one worker endpoint.
#[derive(Debug)]
pub struct ConversionClient {
    endpoint: Endpoint,
    timeouts: Timeouts,
}

impl ConversionClient {
    pub fn new(endpoint: Endpoint, timeouts: Timeouts) -> Self {
        Self { endpoint, timeouts }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Run one conversion job against this worker.
    ///
    /// On success the converted bytes are streamed to a new file next to the
    /// input, named after the input with its extension replaced by the output
    /// format's. The input file is left in place. The connection is torn down
    /// on every exit path; it is never reused.
    pub async fn convert(
        &self,
        input: &Path,
        input_format: Format,
        output_format: Format,
    ) -> Result<PathBuf> {
        let source_len = tokio::fs::metadata(input).await?.len();
        let source_len = i32::try_from(source_len).map_err(|_| {
            CourierError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is too large for the conversion protocol", input.display()),
            ))
        })?;

        // Non-zero id correlating this job across the gateway's and the
        // worker's logs. Never part of the protocol semantics.
        let conversion_id = rand::thread_rng().gen_range(1..i32::MAX);
        info!(
            "using conversion worker at {} (conversion id: {})",
            self.endpoint, conversion_id
        );

        let mut stream = self.connect().await?;

        stream
            .write_i32(conversion_id)
            .await
            .map_err(|e| self.transport(e))?;
        stream
            .write_i32(format::code_of(input_format)?)
            .await
            .map_err(|e| self.transport(e))?;
        stream
            .write_i32(format::code_of(output_format)?)
            .await
            .map_err(|e| self.transport(e))?;
        stream
            .write_i32(source_len)
            .await
            .map_err(|e| self.transport(e))?;

        let mut source = File::open(input).await?;
        tokio::io::copy(&mut source, &mut stream)
            .await
            .map_err(|e| self.transport(e))?;
        stream.flush().await.map_err(|e| self.transport(e))?;

        // The worker only answers once the conversion is done, which can
        // take minutes; wait for the status under the long timeout.
        let status = self
            .read_i32_within(self.timeouts.conversion, &mut stream)
            .await?;
        if status != 0 {
            return Err(CourierError::protocol(
                self.endpoint.clone(),
                status,
                input_format,
                output_format,
            ));
        }

        let result_len = self
            .read_i32_within(self.timeouts.conversion, &mut stream)
            .await?;
        let result_len = u64::try_from(result_len).map_err(|_| {
            self.transport(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("worker announced a negative result length ({result_len})"),
            ))
        })?;

        let output_path = input.with_extension(output_format.extension());
        let mut output = File::create(&output_path).await?;
        let mut body = (&mut stream).take(result_len);
        let copied = match tokio::time::timeout(
            self.timeouts.conversion,
            tokio::io::copy(&mut body, &mut output),
        )
        .await
        {
            Ok(Ok(copied)) => copied,
            Ok(Err(e)) => return Err(self.transport(e)),
            Err(_) => return Err(self.timed_out("receiving the converted file")),
        };
        if copied != result_len {
            return Err(self.transport(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("worker sent {copied} of {result_len} result bytes"),
            )));
        }
        output.flush().await?;

        debug!(
            "conversion {} finished, wrote {} bytes to {}",
            conversion_id,
            copied,
            output_path.display()
        );
        Ok(output_path)
    }

    async fn connect(&self) -> Result<TcpStream> {
        let address = (self.endpoint.host.as_str(), self.endpoint.port);
        match tokio::time::timeout(self.timeouts.connect, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(self.transport(e)),
            Err(_) => Err(self.timed_out("connecting")),
        }
    }

    async fn read_i32_within(&self, limit: Duration, stream: &mut TcpStream) -> Result<i32> {
        match tokio::time::timeout(limit, stream.read_i32()).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(self.transport(e)),
            Err(_) => Err(self.timed_out("waiting for the worker")),
        }
    }

    fn transport(&self, source: io::Error) -> CourierError {
        CourierError::transport(self.endpoint.clone(), source)
    }

    fn timed_out(&self, what: &str) -> CourierError {
        self.transport(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("timed out {what}"),
        ))
    }
}

/// Cheap liveness check: open a TCP connection and drop it immediately.
///
/// Distinct from the conversion itself; the router uses it to skip workers
/// that stopped answering without paying a full conversion timeout.
pub async fn probe(endpoint: &Endpoint, timeout: Duration) -> bool {
    let address = (endpoint.host.as_str(), endpoint.port);
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(address)).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    struct SeenRequest {
        conversion_id: i32,
        input_code: i32,
        output_code: i32,
        body: Vec<u8>,
    }

    fn test_timeouts() -> Timeouts {
        Timeouts {
            connect: Duration::from_millis(500),
            probe: Duration::from_millis(100),
            conversion: Duration::from_millis(1000),
        }
    }

    /// A worker that serves exactly one conversion and reports what it saw.
    async fn spawn_worker(status: i32, reply: Vec<u8>) -> (Endpoint, JoinHandle<SeenRequest>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let conversion_id = socket.read_i32().await.unwrap();
            let input_code = socket.read_i32().await.unwrap();
            let output_code = socket.read_i32().await.unwrap();
            let len = socket.read_i32().await.unwrap();
            let mut body = vec![0u8; len as usize];
            socket.read_exact(&mut body).await.unwrap();
            socket.write_i32(status).await.unwrap();
            if status == 0 {
                socket.write_i32(reply.len() as i32).await.unwrap();
                socket.write_all(&reply).await.unwrap();
            }
            socket.flush().await.unwrap();
            SeenRequest {
                conversion_id,
                input_code,
                output_code,
                body,
            }
        });
        (
            Endpoint {
                host: "127.0.0.1".to_string(),
                port,
            },
            server,
        )
    }

    /// An endpoint nothing is listening on.
    async fn dead_endpoint() -> Endpoint {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        Endpoint {
            host: "127.0.0.1".to_string(),
            port,
        }
    }

    #[tokio::test]
    async fn converts_and_writes_the_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("report.doc");
        std::fs::write(&input, b"source-bytes").unwrap();

        let (endpoint, server) = spawn_worker(0, b"converted-bytes".to_vec()).await;
        let client = ConversionClient::new(endpoint, test_timeouts());

        let output = client
            .convert(&input, Format::Doc, Format::Docx)
            .await
            .unwrap();

        assert_eq!(output, dir.path().join("report.docx"));
        assert_eq!(std::fs::read(&output).unwrap(), b"converted-bytes");
        // The input file stays in place.
        assert!(input.exists());

        let seen = server.await.unwrap();
        assert!(seen.conversion_id > 0);
        assert_eq!(seen.input_code, format::code_of(Format::Doc).unwrap());
        assert_eq!(seen.output_code, format::code_of(Format::Docx).unwrap());
        assert_eq!(seen.body, b"source-bytes");
    }

    #[tokio::test]
    async fn non_zero_status_is_a_protocol_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("slides.docx");
        std::fs::write(&input, b"doc").unwrap();

        let (endpoint, _server) = spawn_worker(6, Vec::new()).await;
        let client = ConversionClient::new(endpoint, test_timeouts());

        let err = client
            .convert(&input, Format::Docx, Format::Jpeg)
            .await
            .unwrap_err();

        match &err {
            CourierError::Protocol { status, .. } => assert_eq!(*status, 6),
            other => panic!("expected protocol error, got {other:?}"),
        }
        let message = err.to_string();
        assert!(message.contains("docx"), "{message}");
        assert!(message.contains("jpeg"), "{message}");
        // No output file appears for a failed conversion.
        assert!(!dir.path().join("slides.jpeg").exists());
    }

    #[tokio::test]
    async fn refused_connection_is_a_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("report.doc");
        std::fs::write(&input, b"doc").unwrap();

        let client = ConversionClient::new(dead_endpoint().await, test_timeouts());
        let err = client
            .convert(&input, Format::Doc, Format::Docx)
            .await
            .unwrap_err();

        assert!(matches!(err, CourierError::Transport { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn hung_worker_hits_the_conversion_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("report.doc");
        std::fs::write(&input, b"doc").unwrap();

        // Accepts and reads the request but never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut sink = Vec::new();
            let _ = socket.read_to_end(&mut sink).await;
        });

        let endpoint = Endpoint {
            host: "127.0.0.1".to_string(),
            port,
        };
        let client = ConversionClient::new(
            endpoint,
            Timeouts {
                conversion: Duration::from_millis(100),
                ..test_timeouts()
            },
        );

        let err = client
            .convert(&input, Format::Doc, Format::Docx)
            .await
            .unwrap_err();
        match err {
            CourierError::Transport { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::TimedOut);
            }
            other => panic!("expected transport timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn truncated_result_is_a_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("report.doc");
        std::fs::write(&input, b"doc").unwrap();

        // Announces more result bytes than it sends, then closes.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _ = socket.read_i32().await.unwrap();
            let _ = socket.read_i32().await.unwrap();
            let _ = socket.read_i32().await.unwrap();
            let len = socket.read_i32().await.unwrap();
            let mut body = vec![0u8; len as usize];
            socket.read_exact(&mut body).await.unwrap();
            socket.write_i32(0).await.unwrap();
            socket.write_i32(100).await.unwrap();
            socket.write_all(b"short").await.unwrap();
            socket.flush().await.unwrap();
        });

        let endpoint = Endpoint {
            host: "127.0.0.1".to_string(),
            port,
        };
        let client = ConversionClient::new(endpoint, test_timeouts());
        let err = client
            .convert(&input, Format::Doc, Format::Docx)
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::Transport { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn probe_reports_liveness() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let up = Endpoint {
            host: "127.0.0.1".to_string(),
            port: listener.local_addr().unwrap().port(),
        };
        assert!(probe(&up, Duration::from_millis(250)).await);

        let down = dead_endpoint().await;
        assert!(!probe(&down, Duration::from_millis(250)).await);
    }
}
