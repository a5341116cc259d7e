use http::HeaderMap;
use secrecy::SecretString;

/// Header name for caller-provided provider API keys (BYOK)
pub const PROVIDER_API_KEY_HEADER: &str = "x-provider-api-key";

/// Per-request caller context
///
/// Built once by the HTTP layer and read by the dispatcher; never
/// mutated while a generation is in flight.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Headers of the incoming request
    pub headers: HeaderMap,
    /// Caller-provided API key that takes precedence over the configured key
    pub api_key: Option<SecretString>,
    /// Caller identity used for provider grants
    pub client_identity: Option<ClientIdentity>,
}

impl RequestContext {
    /// Create a context for embedded (non-HTTP) use
    ///
    /// No headers, no API key and no identity, so only grants for `*`
    /// or an open access policy admit it.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a context from incoming headers
    ///
    /// `client_header` and `group_header` name the headers carrying the
    /// caller id and group. Empty values count as absent.
    pub fn from_headers(headers: HeaderMap, client_header: &str, group_header: Option<&str>) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let api_key = read(PROVIDER_API_KEY_HEADER).map(SecretString::from);
        let client_identity = read(client_header).map(|client_id| ClientIdentity {
            client_id,
            group: group_header.and_then(read),
        });

        Self {
            headers,
            api_key,
            client_identity,
        }
    }

    /// Attach an identity, for embedded callers
    #[must_use]
    pub fn with_identity(mut self, client_id: impl Into<String>, group: Option<String>) -> Self {
        self.client_identity = Some(ClientIdentity {
            client_id: client_id.into(),
            group,
        });
        self
    }

    /// Access request headers
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// Identified client and its group membership
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Client identifier (e.g. user ID, API key ID)
    pub client_id: String,
    /// Group the client belongs to (e.g. "free", "studio")
    pub group: Option<String>,
}
