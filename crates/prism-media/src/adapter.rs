pub(crate) mod bfl;
pub(crate) mod fal;
pub(crate) mod google;
pub(crate) mod ideogram;
pub(crate) mod openai;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use http::HeaderMap;
use prism_config::ProviderType;
use secrecy::SecretString;
use serde_json::Value;
use url::Url;

use crate::auth::AuthScheme;
use crate::catalog::{ModelDescriptor, ModelFeatures, ProviderDescriptor};
use crate::error::{MediaError, Result};
use crate::fetch::MediaFetcher;
use crate::poller::PollConfig;
use crate::request::{ProviderReply, RequestBody};
use crate::types::{GeneratedMedia, GenerationRequest};

/// Values a provider record falls back to when its config leaves them out
#[derive(Debug, Clone)]
pub struct AdapterDefaults {
    pub base_url: Option<Url>,
    pub auth: AuthScheme,
    pub polling: PollConfig,
    /// Features assumed for models the catalog does not list
    pub unlisted_features: ModelFeatures,
}

/// Everything a response processor may consult
pub struct ReplyContext<'a> {
    pub request: &'a GenerationRequest,
    pub model: &'a ModelDescriptor,
    pub provider: &'a ProviderDescriptor,
    pub fetcher: MediaFetcher<'a>,
}

/// Translation between the neutral request and one provider API family
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderType;

    fn defaults(&self) -> AdapterDefaults;

    /// Endpoint derived from the model and request, if the API has one
    fn computed_endpoint(
        &self,
        request: &GenerationRequest,
        model: &ModelDescriptor,
        provider: &ProviderDescriptor,
    ) -> Result<Option<Url>>;

    /// URL the request is sent to
    ///
    /// A model endpoint override wins over the computed path, which wins
    /// over the bare provider base URL.
    fn endpoint_url(
        &self,
        request: &GenerationRequest,
        model: &ModelDescriptor,
        provider: &ProviderDescriptor,
    ) -> Result<Url> {
        if let Some(endpoint) = &model.endpoint {
            return Ok(endpoint.clone());
        }

        Ok(self
            .computed_endpoint(request, model, provider)?
            .unwrap_or_else(|| provider.base_url.clone()))
    }

    /// Provider wire body, without I/O
    fn build_body(
        &self,
        request: &GenerationRequest,
        model: &ModelDescriptor,
        provider: &ProviderDescriptor,
    ) -> Result<RequestBody>;

    /// Attach the credential the way this provider expects
    fn add_auth_headers(
        &self,
        headers: &mut HeaderMap,
        credential: &SecretString,
        provider: &ProviderDescriptor,
    ) -> Result<()>;

    /// Turn a successful reply into media, polling or downloading as needed
    async fn process_response(&self, reply: ProviderReply, context: &ReplyContext<'_>) -> Result<GeneratedMedia>;
}

/// Adapters keyed by provider type
#[derive(Clone)]
pub struct AdapterRegistry {
    adapters: Arc<HashMap<ProviderType, Arc<dyn ProviderAdapter>>>,
}

impl AdapterRegistry {
    /// Registry with every adapter shipped in this crate
    pub fn builtin() -> Self {
        let adapters: [Arc<dyn ProviderAdapter>; 5] = [
            Arc::new(openai::OpenAiAdapter),
            Arc::new(ideogram::IdeogramAdapter),
            Arc::new(bfl::BflAdapter),
            Arc::new(google::GoogleAdapter),
            Arc::new(fal::FalAdapter),
        ];

        Self {
            adapters: Arc::new(adapters.into_iter().map(|a| (a.kind(), a)).collect()),
        }
    }

    pub fn get(&self, kind: ProviderType) -> Result<&dyn ProviderAdapter> {
        self.adapters
            .get(&kind)
            .map(AsRef::as_ref)
            .ok_or_else(|| MediaError::ConfigError(format!("no adapter registered for '{}'", kind.as_str())))
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.adapters.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("AdapterRegistry").field("adapters", &kinds).finish()
    }
}

/// Append a path to a base URL, keeping the base path
pub(crate) fn join_url(base: &Url, path: &str) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );

    Url::parse(&joined).map_err(|e| MediaError::RequestBuildFailure(format!("invalid endpoint '{joined}': {e}")))
}

/// Static URL baked into an adapter
fn default_url(raw: &str) -> Option<Url> {
    Url::parse(raw).ok()
}

/// Non-empty string at a JSON pointer
pub(crate) fn str_at<'v>(value: &'v Value, pointer: &str) -> Option<&'v str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Absolute URL at a JSON pointer
pub(crate) fn url_at(value: &Value, pointer: &str) -> Option<Url> {
    str_at(value, pointer).and_then(|s| Url::parse(s).ok())
}

/// Short excerpt of a reply for error messages
pub(crate) fn excerpt(value: &Value) -> String {
    let text = value.to_string();
    match text.char_indices().nth(200) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text,
    }
}
