use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Failures of the listeners themselves. Request-level problems never surface
/// here; handlers log them and answer the caller.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind listener on {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read TLS file {}", .path.display())]
    TlsFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TLS material in {}: {reason}", .path.display())]
    Tls { path: PathBuf, reason: String },

    #[error("both the HTTP and the HTTPS listener are disabled")]
    NothingToServe,

    #[error("HTTP server failed")]
    Serve(#[source] std::io::Error),
}
