//! HTTPS listener: rustls over `axum-server`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use rustls::crypto::ring;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::ListenerError;

/// How long open HTTPS connections may finish after shutdown begins.
pub const TLS_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Reads a PEM certificate chain and private key into a server configuration.
///
/// The ring provider is selected explicitly, so the result does not depend on
/// which rustls providers other crates in the binary compile in.
pub async fn load_tls(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, ListenerError> {
    let cert_pem = read(cert_path).await?;
    let key_pem = read(key_path).await?;
    let invalid = |path: &Path, reason: String| ListenerError::Tls {
        path: path.to_path_buf(),
        reason,
    };

    let certs = CertificateDer::pem_slice_iter(&cert_pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| invalid(cert_path, e.to_string()))?;
    if certs.is_empty() {
        return Err(invalid(cert_path, "no certificates found".to_string()));
    }
    let key =
        PrivateKeyDer::from_pem_slice(&key_pem).map_err(|e| invalid(key_path, e.to_string()))?;

    let mut config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .and_then(|builder| builder.with_no_client_auth().with_single_cert(certs, key))
        .map_err(|e| invalid(cert_path, e.to_string()))?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    debug!(cert = %cert_path.display(), key = %key_path.display(), "loaded TLS material");
    Ok(RustlsConfig::from_config(Arc::new(config)))
}

async fn read(path: &Path) -> Result<Vec<u8>, ListenerError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| ListenerError::TlsFile {
            path: path.to_path_buf(),
            source,
        })
}

/// Serves `app` over TLS until `cancel` fires, then gives open connections
/// [`TLS_SHUTDOWN_GRACE`] to finish.
pub async fn serve_tls(
    listener: TcpListener,
    tls: RustlsConfig,
    app: Router,
    cancel: CancellationToken,
) -> Result<(), ListenerError> {
    let addr = listener.local_addr().map_err(ListenerError::Serve)?;
    let listener = listener.into_std().map_err(ListenerError::Serve)?;

    let handle = Handle::new();
    let shutdown = tokio::spawn({
        let handle = handle.clone();
        async move {
            cancel.cancelled().await;
            handle.graceful_shutdown(Some(TLS_SHUTDOWN_GRACE));
        }
    });

    info!(%addr, "HTTPS listener started");
    let served = axum_server::from_tcp_rustls(listener, tls)
        .handle(handle)
        .serve(app.into_make_service())
        .await;
    shutdown.abort();

    served.map_err(ListenerError::Serve)?;
    info!("HTTPS listener stopped");
    Ok(())
}
