//! Listener configuration and shared handler state.

use std::net::SocketAddr;
use std::path::PathBuf;

use coordinator::Coordinator;

/// Default plain HTTP listen address.
pub const DEFAULT_ADDR: &str = "0.0.0.0:80";

/// Default HTTPS listen address.
pub const DEFAULT_TLS_ADDR: &str = "0.0.0.0:443";

/// The HTTPS listener: where it binds and the PEM files it presents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    pub addr: SocketAddr,
    /// Certificate chain, leaf first.
    pub cert_path: PathBuf,
    /// PKCS#8, PKCS#1 or SEC1 private key matching the leaf certificate.
    pub key_path: PathBuf,
}

/// Where the listeners bind and which files they serve.
///
/// Plain HTTP and HTTPS are independent; either may be disabled, but not both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Plain HTTP listen address, or `None` to disable plain HTTP.
    pub addr: Option<SocketAddr>,

    /// HTTPS listener settings, or `None` to disable HTTPS.
    pub tls: Option<TlsConfig>,

    /// The configuration document served at `GET /config`.
    pub config_path: PathBuf,

    /// The build tool's output directory, served for every other `GET`.
    pub output_dir: PathBuf,
}

/// State shared by all request handlers.
#[derive(Debug, Clone)]
pub struct ListenerState {
    pub coordinator: Coordinator,
    pub config_path: PathBuf,
    pub output_dir: PathBuf,
}

impl ListenerState {
    pub fn new(coordinator: Coordinator, config: &ListenerConfig) -> Self {
        Self {
            coordinator,
            config_path: config.config_path.clone(),
            output_dir: config.output_dir.clone(),
        }
    }
}
