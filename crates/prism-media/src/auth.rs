use http::{HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};

use crate::error::{MediaError, Result};

/// How a provider expects its credential to be presented
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `<name>: [<prefix> ]<key>`
    Header { name: HeaderName, prefix: Option<String> },
}

impl AuthScheme {
    /// Custom header carrying the bare key
    pub const fn header(name: &'static str) -> Self {
        Self::Header {
            name: HeaderName::from_static(name),
            prefix: None,
        }
    }

    /// Custom header carrying `<prefix> <key>`
    pub fn prefixed(name: &'static str, prefix: &str) -> Self {
        Self::Header {
            name: HeaderName::from_static(name),
            prefix: Some(prefix.to_string()),
        }
    }

    /// Apply configured overrides on top of an adapter's scheme
    ///
    /// A header name override always selects the custom-header form; a
    /// prefix override alone keeps the adapter's header name.
    pub fn with_overrides(self, header: Option<&str>, prefix: Option<&str>) -> Result<Self> {
        let prefix = prefix.map(str::to_string);

        match (header, self) {
            (Some(name), current) => {
                let name = HeaderName::try_from(name.to_ascii_lowercase())
                    .map_err(|e| MediaError::ConfigError(format!("invalid auth header '{name}': {e}")))?;
                let prefix = prefix.or(match current {
                    Self::Header { prefix, .. } => prefix,
                    Self::Bearer => None,
                });
                Ok(Self::Header { name, prefix })
            }
            (None, Self::Header { name, prefix: current }) => Ok(Self::Header {
                name,
                prefix: prefix.or(current),
            }),
            (None, Self::Bearer) => match prefix {
                Some(prefix) => Ok(Self::Header {
                    name: http::header::AUTHORIZATION,
                    prefix: Some(prefix),
                }),
                None => Ok(Self::Bearer),
            },
        }
    }

    /// Attach the credential to `headers`
    ///
    /// The header value is marked sensitive so it never shows up in debug
    /// output.
    pub fn apply(&self, headers: &mut HeaderMap, credential: &SecretString) -> Result<()> {
        let (name, value) = match self {
            Self::Bearer => (
                http::header::AUTHORIZATION,
                format!("Bearer {}", credential.expose_secret()),
            ),
            Self::Header { name, prefix: Some(prefix) } => {
                (name.clone(), format!("{prefix} {}", credential.expose_secret()))
            }
            Self::Header { name, prefix: None } => (name.clone(), credential.expose_secret().to_string()),
        };

        let mut value = HeaderValue::try_from(value)
            .map_err(|_| MediaError::MissingCredential("credential contains characters not allowed in a header".to_string()))?;
        value.set_sensitive(true);

        headers.insert(name, value);
        Ok(())
    }
}
