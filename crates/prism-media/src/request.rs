use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use reqwest::Client;
use serde_json::Value;
use url::Url;

use crate::error::{MediaError, Result};

/// Fully described HTTP call to a provider
///
/// Built fresh for every dispatch and consumed by [`OutboundRequest::send`].
#[derive(Debug)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl OutboundRequest {
    /// Send once, without retry
    pub async fn send(self, client: &Client) -> Result<ProviderReply> {
        let builder = client.request(self.method, self.url).headers(self.headers);

        let builder = match self.body {
            RequestBody::Json(value) => {
                let body = serde_json::to_vec(&value)
                    .map_err(|e| MediaError::RequestBuildFailure(format!("failed to encode JSON body: {e}")))?;
                builder.header(http::header::CONTENT_TYPE, "application/json").body(body)
            }
            RequestBody::Multipart(form) => builder.multipart(form.into_reqwest()?),
            RequestBody::Empty => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|e| MediaError::TransportFailure(format!("request failed: {e}")))?;

        ProviderReply::read(response).await
    }
}

/// Request payload, JSON or multipart as chosen by the adapter
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Multipart(MultipartForm),
    Empty,
}

impl RequestBody {
    pub const fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub const fn as_multipart(&self) -> Option<&MultipartForm> {
        match self {
            Self::Multipart(form) => Some(form),
            _ => None,
        }
    }
}

/// Pure description of a multipart form
///
/// Kept independent of `reqwest` so builders stay free of I/O and their
/// output can be inspected in tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartForm {
    parts: Vec<FormPart>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormPart {
    pub name: String,
    pub value: PartValue,
}

#[derive(Clone, PartialEq, Eq)]
pub enum PartValue {
    Text(String),
    Binary { bytes: Bytes, file_name: String, mime: String },
}

impl std::fmt::Debug for PartValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Binary { bytes, file_name, mime } => f
                .debug_struct("Binary")
                .field("len", &bytes.len())
                .field("file_name", file_name)
                .field("mime", mime)
                .finish(),
        }
    }
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text part
    pub fn text(&mut self, name: impl Into<String>, value: impl ToString) -> &mut Self {
        self.parts.push(FormPart {
            name: name.into(),
            value: PartValue::Text(value.to_string()),
        });
        self
    }

    /// Append a text part when the value is set
    pub fn text_opt<T: ToString>(&mut self, name: &str, value: Option<T>) -> &mut Self {
        if let Some(value) = value {
            self.text(name, value);
        }
        self
    }

    /// Append a binary part with an explicit content type
    pub fn binary(
        &mut self,
        name: impl Into<String>,
        bytes: Bytes,
        file_name: impl Into<String>,
        mime: impl Into<String>,
    ) -> &mut Self {
        self.parts.push(FormPart {
            name: name.into(),
            value: PartValue::Binary {
                bytes,
                file_name: file_name.into(),
                mime: mime.into(),
            },
        });
        self
    }

    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }

    /// First part with the given name
    pub fn get(&self, name: &str) -> Option<&PartValue> {
        self.parts.iter().find(|p| p.name == name).map(|p| &p.value)
    }

    /// Text value of the first part with the given name
    pub fn get_text(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(PartValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.parts.iter().map(|p| p.name.as_str()).collect()
    }

    fn into_reqwest(self) -> Result<reqwest::multipart::Form> {
        let mut form = reqwest::multipart::Form::new();

        for part in self.parts {
            form = match part.value {
                PartValue::Text(text) => form.text(part.name, text),
                PartValue::Binary { bytes, file_name, mime } => {
                    let body = reqwest::multipart::Part::bytes(bytes.to_vec())
                        .file_name(file_name)
                        .mime_str(&mime)
                        .map_err(|e| {
                            MediaError::RequestBuildFailure(format!("invalid content type '{mime}' for part: {e}"))
                        })?;
                    form.part(part.name, body)
                }
            };
        }

        Ok(form)
    }
}

/// Raw provider reply
#[derive(Debug, Clone)]
pub struct ProviderReply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProviderReply {
    pub(crate) async fn read(response: reqwest::Response) -> Result<Self> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| MediaError::TransportFailure(format!("failed to read reply body: {e}")))?;

        Ok(Self { status, headers, body })
    }

    /// Build a successful JSON reply, for tests and embedded replay
    pub fn json_ok(value: &Value) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from(value.to_string()),
        }
    }

    /// Parse the body as JSON
    pub fn json(&self) -> Result<Value> {
        serde_json::from_slice(&self.body)
            .map_err(|e| MediaError::UnrecognizedReplyShape(format!("reply is not JSON: {e}")))
    }

    /// Body as lossy UTF-8, for error details
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Fail with the body as detail unless the status is a success
    pub fn error_for_status(self) -> Result<Self> {
        if self.status.is_success() {
            return Ok(self);
        }

        let message = match self.text() {
            text if text.trim().is_empty() => self
                .status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string(),
            text => text,
        };

        Err(MediaError::ProviderRejected {
            status: self.status.as_u16(),
            message,
        })
    }
}
