//! IndexHub event ingestion boundary.
//!
//! An axum HTTP server that turns inbound events into build requests and serves
//! the build tool's output:
//!
//! | Route | Behaviour |
//! |-------|-----------|
//! | `POST /webhook/gitlab?name=&version=` | Partial update of the pushed repository. Always `200 "OK"`. |
//! | `POST /rebuild` | Full rebuild. `202 {"accepted":true}`. |
//! | `GET /config` | The raw configuration document. |
//! | `GET /health` | Liveness probe. |
//! | any other `GET` | Static files from the output directory (`index.html` for directories). |
//!
//! The same router is served over plain HTTP, over HTTPS (rustls), or both
//! side by side. Both listeners stop together on the shared cancellation
//! token.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Handlers only translate HTTP into
//! [`coordinator::Coordinator`] submissions; they never wait for a build.

pub mod config;
pub mod error;
pub mod routes;
pub mod tls;

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use config::{ListenerConfig, ListenerState, TlsConfig, DEFAULT_ADDR, DEFAULT_TLS_ADDR};
pub use error::ListenerError;
pub use tls::{load_tls, serve_tls};

/// Builds the listener's router.
pub fn router(state: ListenerState) -> Router {
    let config_file = ServeFile::new(&state.config_path);
    let output_dir = ServeDir::new(&state.output_dir).append_index_html_on_directories(true);

    Router::new()
        .route("/webhook/gitlab", post(routes::gitlab_webhook))
        .route("/rebuild", post(routes::rebuild))
        .route("/health", get(routes::health))
        .route_service("/config", config_file)
        .fallback_service(output_dir)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds the listen address.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ListenerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ListenerError::Bind { addr, source })
}

/// Serves `app` until `cancel` fires, then drains in-flight requests.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    cancel: CancellationToken,
) -> Result<(), ListenerError> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "HTTP listener started");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(ListenerError::Serve)?;
    info!("HTTP listener stopped");
    Ok(())
}

/// The bound sockets of every enabled listener, ready to serve.
///
/// Binding happens up front so address and certificate problems surface before
/// anything else starts.
pub struct Listeners {
    http: Option<TcpListener>,
    https: Option<(TcpListener, RustlsConfig)>,
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("http", &self.http_addr())
            .field("https", &self.https_addr())
            .finish()
    }
}

impl Listeners {
    /// Loads the TLS material and binds every enabled address.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        if config.addr.is_none() && config.tls.is_none() {
            return Err(ListenerError::NothingToServe);
        }

        let https = match &config.tls {
            Some(tls) => {
                let rustls = load_tls(&tls.cert_path, &tls.key_path).await?;
                Some((bind(tls.addr).await?, rustls))
            }
            None => None,
        };
        let http = match config.addr {
            Some(addr) => Some(bind(addr).await?),
            None => None,
        };
        Ok(Self { http, https })
    }

    /// Local address of the plain HTTP listener.
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Local address of the HTTPS listener.
    pub fn https_addr(&self) -> Option<SocketAddr> {
        self.https.as_ref().and_then(|(l, _)| l.local_addr().ok())
    }

    /// Serves `app` on every bound listener until `cancel` fires.
    ///
    /// Returns the first listener failure; the remaining listeners are dropped
    /// with it.
    pub async fn serve(self, app: Router, cancel: CancellationToken) -> Result<(), ListenerError> {
        let Self { http, https } = self;

        let plain = async {
            match http {
                Some(listener) => serve(listener, app.clone(), cancel.clone()).await,
                None => Ok(()),
            }
        };
        let secure = async {
            match https {
                Some((listener, rustls)) => {
                    serve_tls(listener, rustls, app.clone(), cancel.clone()).await
                }
                None => Ok(()),
            }
        };

        tokio::try_join!(plain, secure).map(|_| ())
    }
}
