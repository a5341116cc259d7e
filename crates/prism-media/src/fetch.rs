use http::{HeaderMap, Method};
use reqwest::Client;
use secrecy::SecretString;
use serde_json::Value;
use url::Url;

use crate::adapter::ProviderAdapter;
use crate::catalog::ProviderDescriptor;
use crate::error::{MediaError, Result};
use crate::media;
use crate::request::{OutboundRequest, RequestBody};
use crate::types::Media;

/// Follow-up requests an adapter makes while processing a reply
///
/// Status and result lookups go back to the provider with its credential;
/// media downloads go to whatever URL the provider handed out, without one.
#[derive(Clone, Copy)]
pub struct MediaFetcher<'a> {
    client: &'a Client,
    adapter: &'a dyn ProviderAdapter,
    provider: &'a ProviderDescriptor,
    credential: &'a SecretString,
}

impl<'a> MediaFetcher<'a> {
    pub fn new(
        client: &'a Client,
        adapter: &'a dyn ProviderAdapter,
        provider: &'a ProviderDescriptor,
        credential: &'a SecretString,
    ) -> Self {
        Self {
            client,
            adapter,
            provider,
            credential,
        }
    }

    /// Authorized GET returning the JSON body
    pub async fn get_json(&self, url: &Url) -> Result<Value> {
        let mut headers = HeaderMap::new();
        self.adapter
            .add_auth_headers(&mut headers, self.credential, self.provider)?;

        let reply = OutboundRequest {
            method: Method::GET,
            url: url.clone(),
            headers,
            body: RequestBody::Empty,
        }
        .send(self.client)
        .await?
        .error_for_status()?;

        reply.json()
    }

    /// Fetch media bytes from a URL, or decode them from a data URI
    pub async fn download(&self, location: &str) -> Result<Media> {
        if location.trim_start().starts_with("data:") {
            return media::decode_media(location, None)
                .map_err(|e| MediaError::UnrecognizedReplyShape(format!("invalid inline media: {e}")));
        }

        let url = Url::parse(location)
            .map_err(|e| MediaError::UnrecognizedReplyShape(format!("invalid media URL '{location}': {e}")))?;

        tracing::debug!(provider = %self.provider.id, host = url.host_str().unwrap_or_default(), "downloading media");

        let reply = OutboundRequest {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
        .send(self.client)
        .await?
        .error_for_status()?;

        let declared = reply
            .content_type()
            .and_then(|v| v.split(';').next())
            .map(str::trim)
            .filter(|v| !v.is_empty() && *v != media::OCTET_STREAM)
            .map(str::to_string);

        let content_type = declared
            .or_else(|| media::sniff_content_type(&reply.body).map(str::to_string))
            .unwrap_or_else(|| media::OCTET_STREAM.to_string());

        Ok(Media {
            bytes: reply.body,
            content_type,
        })
    }
}
