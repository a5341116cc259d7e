use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Configuration for a single generation provider
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Adapter that speaks this provider's API
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Base URL for queued (job) submissions, where the provider splits them out
    #[serde(default)]
    pub queue_base_url: Option<Url>,
    /// API key
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Auth header name override
    #[serde(default)]
    pub auth_header: Option<String>,
    /// Auth header value prefix override (e.g. "Key")
    #[serde(default)]
    pub auth_prefix: Option<String>,
    /// Accept model ids that are not listed under `models`
    #[serde(default)]
    pub allow_unlisted_models: Option<bool>,
    /// Job polling cadence
    #[serde(default)]
    pub polling: Option<PollingConfig>,
    /// Known models
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

impl ProviderConfig {
    /// Lay a user-supplied record over this one
    ///
    /// Scalar fields set in `user` win. A non-empty `models` list in
    /// `user` replaces ours. A record of a different type replaces ours
    /// wholesale.
    #[must_use]
    pub fn overlay(self, user: Self) -> Self {
        if self.provider_type != user.provider_type {
            return user;
        }

        Self {
            provider_type: user.provider_type,
            name: user.name.or(self.name),
            base_url: user.base_url.or(self.base_url),
            queue_base_url: user.queue_base_url.or(self.queue_base_url),
            api_key: user.api_key.or(self.api_key),
            auth_header: user.auth_header.or(self.auth_header),
            auth_prefix: user.auth_prefix.or(self.auth_prefix),
            allow_unlisted_models: user.allow_unlisted_models.or(self.allow_unlisted_models),
            polling: user.polling.or(self.polling),
            models: if user.models.is_empty() { self.models } else { user.models },
        }
    }
}

/// Supported provider adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    /// `OpenAI` images API
    Openai,
    /// Ideogram generate/edit API
    Ideogram,
    /// Black Forest Labs job API
    Bfl,
    /// Google Generative Language API (Gemini and Imagen)
    Google,
    /// fal.ai model gateway
    Fal,
}

impl ProviderType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Ideogram => "ideogram",
            Self::Bfl => "bfl",
            Self::Google => "google",
            Self::Fal => "fal",
        }
    }
}

/// Job polling cadence for asynchronous providers
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollingConfig {
    /// Delay between status requests (e.g. "1s", "500ms")
    #[serde(default)]
    pub interval: Option<String>,
    /// Maximum number of status requests before timing out
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl PollingConfig {
    /// Parse the configured interval
    ///
    /// # Errors
    ///
    /// Returns an error if the interval is not a valid duration
    pub fn interval(&self) -> anyhow::Result<Option<Duration>> {
        self.interval
            .as_deref()
            .map(|s| duration_str::parse(s).map_err(|e| anyhow::anyhow!("invalid polling interval '{s}': {e}")))
            .transpose()
    }
}

/// Catalog record for a single model
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Model identifier, unique within its provider
    pub id: String,
    /// Endpoint that replaces the computed one
    #[serde(default)]
    pub endpoint: Option<Url>,
    /// How the model takes output geometry
    #[serde(default)]
    pub geometry: GeometryStyle,
    /// Whether the model accepts a reference image
    #[serde(default)]
    pub edit: bool,
    /// Kind of media the model produces
    #[serde(default)]
    pub media: MediaKind,
    /// Whether generation runs as a queued job
    #[serde(default)]
    pub queue: bool,
    /// Default output width in pixels
    #[serde(default)]
    pub default_width: Option<u32>,
    /// Default output height in pixels
    #[serde(default)]
    pub default_height: Option<u32>,
}

/// Geometry parameterization accepted by a model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryStyle {
    /// Named aspect ratio only
    AspectRatio,
    /// Explicit width and height
    #[default]
    Dimensions,
}

/// Output media kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    #[default]
    Image,
    Video,
}
