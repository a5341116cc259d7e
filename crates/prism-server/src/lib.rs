mod health;
mod request_context;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use prism_config::Config;
use tower_http::trace::TraceLayer;

use crate::request_context::IdentityHeaders;

pub use prism_media::MediaService;

/// Assembled server with all routes and middleware
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
    media: Arc<MediaService>,
}

impl Server {
    /// Build the server from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the media service cannot be initialized
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let listen_address = config
            .server
            .listen_address
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

        let media = prism_media::build_service(config)?;

        let mut app = Router::new();

        if config.server.health.enabled {
            app = app.route(&config.server.health.path, axum::routing::get(health::health_handler));
        }

        app = app.merge(prism_media::endpoint_router().with_state(Arc::clone(&media)));

        // Innermost: runs just before handlers
        let identity = Arc::new(IdentityHeaders {
            client: config.access.client_header.clone(),
            group: config.access.group_header.clone(),
        });
        app = app.layer(axum::middleware::from_fn(move |req, next| {
            let identity = Arc::clone(&identity);
            async move { request_context::request_context_middleware(identity, req, next).await }
        }));

        app = app.layer(DefaultBodyLimit::max(config.server.body_limit_bytes));

        app = app.layer(TraceLayer::new_for_http());

        Ok(Self {
            router: app,
            listen_address,
            media,
        })
    }

    /// Get the configured listen address
    #[must_use]
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Handle to the media service, for reloading configuration
    #[must_use]
    pub fn media(&self) -> Arc<MediaService> {
        Arc::clone(&self.media)
    }

    /// Consume the server and return the inner router
    ///
    /// Useful for testing when the caller manages the listener
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Start serving requests
    ///
    /// Blocks until the cancellation token is triggered.
    ///
    /// # Errors
    ///
    /// Returns an error if binding the TCP listener or serving fails
    pub async fn serve(self, shutdown: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("graceful shutdown initiated");
            })
            .await?;

        Ok(())
    }
}
