use std::time::Duration;

use http::{HeaderMap, HeaderValue};
use reqwest::Client;

use crate::error::{MediaError, Result};

/// Overall limit for one provider call; video submissions answer slowly
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Pooled client shared by every adapter of one service
pub fn build_http_client() -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(http::header::CONNECTION, HeaderValue::from_static("keep-alive"));

    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .pool_idle_timeout(Some(Duration::from_secs(5)))
        .tcp_nodelay(true)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .default_headers(headers)
        .build()
        .map_err(|e| MediaError::ConfigError(format!("failed to build HTTP client: {e}")))
}
