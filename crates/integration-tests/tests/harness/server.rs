//! Test server wrapper that starts Prism on a random port

use std::net::SocketAddr;
use std::sync::Arc;

use prism_config::Config;
use prism_server::{MediaService, Server};
use tokio_util::sync::CancellationToken;

/// A running test server instance
pub struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    client: reqwest::Client,
    media: Arc<MediaService>,
}

impl TestServer {
    /// Start a test server with the given configuration
    ///
    /// Binds to port 0 for automatic port assignment
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        let server = Server::new(&config)?;
        let media = server.media();
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        tokio::spawn(async move {
            axum::serve(listener, server.into_router())
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            addr,
            shutdown,
            client: reqwest::Client::new(),
            media,
        })
    }

    /// Base URL of the running test server
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Media service behind the routes, for reload tests
    pub fn media(&self) -> &MediaService {
        &self.media
    }

    /// Post a generation request as the given client id
    pub async fn generate(&self, client_id: Option<&str>, body: serde_json::Value) -> reqwest::Response {
        let mut request = self.client.post(self.url("/v1/media/generations")).json(&body);

        if let Some(id) = client_id {
            request = request.header("x-client-id", id);
        }

        request.send().await.unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
