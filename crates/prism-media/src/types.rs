use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{MediaError, Result};
use crate::media;

/// Largest accepted width or height in pixels
pub const MAX_DIMENSION: u32 = 16_384;

/// Provider-neutral generation request
///
/// Optional fields left unset are never sent, so the provider applies its
/// own defaults for them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationRequest {
    /// Full model name, "provider/model" (e.g. "bfl/flux-pro-1.1")
    pub model: String,
    /// Text description of the desired output
    pub prompt: String,
    /// What the output should avoid
    pub negative_prompt: Option<String>,
    /// Sampling seed
    pub seed: Option<u64>,
    /// Number of outputs
    pub count: Option<u32>,
    /// Explicit output dimensions
    pub size: Option<Size>,
    /// Named aspect ratio (e.g. "16:9")
    pub aspect_ratio: Option<AspectRatio>,
    /// Image to edit or condition on (base64 or data URI on the wire)
    pub reference_image: Option<ImageInput>,
    /// Edit mask for `reference_image`
    pub mask: Option<ImageInput>,
    /// Influence of the reference image, 0 to 1
    pub strength: Option<f32>,
    /// Prompt adherence (classifier-free guidance scale)
    pub guidance: Option<f32>,
    /// Inference steps
    pub steps: Option<u32>,
    /// Quality tier, provider vocabulary (e.g. "hd", "high", "TURBO")
    pub quality: Option<String>,
    /// Style preset, provider vocabulary
    pub style: Option<String>,
    /// Encoded output format
    pub output_format: Option<OutputFormat>,
    /// Moderation permissiveness, 0 (strict) to 1 (permissive)
    pub safety_tolerance: Option<f32>,
    /// Video length in seconds
    pub duration_seconds: Option<u32>,
    /// Model-specific knobs forwarded verbatim
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Check values that do not depend on the target model
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(MediaError::RequestBuildFailure("prompt must not be empty".to_string()));
        }

        for (name, value) in [("strength", self.strength), ("safety_tolerance", self.safety_tolerance)] {
            if let Some(value) = value
                && !(0.0..=1.0).contains(&value)
            {
                return Err(MediaError::RequestBuildFailure(format!(
                    "{name} must be between 0 and 1, got {value}"
                )));
            }
        }

        if let Some(guidance) = self.guidance
            && !(guidance.is_finite() && guidance >= 0.0)
        {
            return Err(MediaError::RequestBuildFailure(format!(
                "guidance must be a non-negative number, got {guidance}"
            )));
        }

        if self.count == Some(0) {
            return Err(MediaError::RequestBuildFailure("count must be at least 1".to_string()));
        }

        if let Some(size) = self.size
            && (size.width == 0 || size.height == 0)
        {
            return Err(MediaError::RequestBuildFailure(format!("size {size} has a zero dimension")));
        }

        if let Some(size) = self.size
            && (size.width > MAX_DIMENSION || size.height > MAX_DIMENSION)
        {
            return Err(MediaError::RequestBuildFailure(format!(
                "size {size} exceeds {MAX_DIMENSION} pixels per side"
            )));
        }

        if self.mask.is_some() && self.reference_image.is_none() {
            return Err(MediaError::RequestBuildFailure(
                "mask requires a reference_image".to_string(),
            ));
        }

        Ok(())
    }
}

/// Output dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Aspect ratio as a reduced integer pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    /// Build a ratio, reducing it to lowest terms
    pub fn new(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }

        let divisor = gcd(width, height);
        Some(Self {
            width: width / divisor,
            height: height / divisor,
        })
    }

    /// Ratio of explicit dimensions
    pub fn of(size: Size) -> Option<Self> {
        Self::new(size.width, size.height)
    }

    /// Render with a provider-specific separator (":" or "x")
    pub fn join(&self, separator: &str) -> String {
        format!("{}{separator}{}", self.width, self.height)
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

impl TryFrom<String> for AspectRatio {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        let (w, h) = value
            .split_once(':')
            .or_else(|| value.split_once('x'))
            .ok_or_else(|| format!("aspect ratio '{value}' must look like '16:9'"))?;

        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| format!("aspect ratio '{value}' must use whole numbers"))
        };

        Self::new(parse(w)?, parse(h)?).ok_or_else(|| format!("aspect ratio '{value}' has a zero side"))
    }
}

const fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Encoded image format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    #[serde(alias = "jpg")]
    Jpeg,
    Webp,
}

impl OutputFormat {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
        }
    }

    pub const fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
        }
    }
}

/// Binary image supplied by the caller
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct ImageInput {
    pub bytes: Bytes,
    pub mime: String,
}

impl ImageInput {
    pub fn new(bytes: impl Into<Bytes>, mime: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime: mime.into(),
        }
    }

    /// File name for multipart uploads, derived from the MIME type
    pub fn file_name(&self, stem: &str) -> String {
        format!("{stem}.{}", media::extension_for(&self.mime))
    }

    pub fn to_base64(&self) -> String {
        media::encode_base64(&self.bytes)
    }

    pub fn to_data_uri(&self) -> String {
        media::data_uri(&self.mime, &self.bytes)
    }
}

impl fmt::Debug for ImageInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageInput")
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl TryFrom<String> for ImageInput {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        let decoded = media::decode_media(&value, None).map_err(|e| format!("image is not valid base64: {e}"))?;

        if decoded.bytes.is_empty() {
            return Err("image must not be empty".to_string());
        }

        let mime = if decoded.content_type == media::OCTET_STREAM {
            "image/png".to_string()
        } else {
            decoded.content_type
        };

        Ok(Self {
            bytes: decoded.bytes,
            mime,
        })
    }
}

/// One generated media file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    /// Raw media bytes
    pub bytes: Bytes,
    /// Content type (e.g. "image/png", "video/mp4")
    pub content_type: String,
}

/// Media produced by a single generation request
#[derive(Debug, Clone)]
pub struct GeneratedMedia {
    pub items: Vec<Media>,
}

impl GeneratedMedia {
    /// Wrap items, rejecting an empty result
    pub fn new(items: Vec<Media>, context: &str) -> Result<Self> {
        if items.is_empty() {
            return Err(MediaError::UnrecognizedReplyShape(format!("{context}: reply contained no media")));
        }
        Ok(Self { items })
    }

    pub fn single(media: Media) -> Self {
        Self { items: vec![media] }
    }

    /// Convert into an HTTP response
    ///
    /// A single item is returned as raw bytes with its own content type;
    /// several items are returned as a JSON list of base64 payloads.
    pub fn into_response(mut self) -> axum::response::Response {
        use axum::response::IntoResponse;

        if self.items.len() == 1 {
            let media = self.items.remove(0);
            return ([(http::header::CONTENT_TYPE, media.content_type)], media.bytes).into_response();
        }

        let data: Vec<_> = self
            .items
            .iter()
            .map(|media| {
                serde_json::json!({
                    "b64_json": media::encode_base64(&media.bytes),
                    "content_type": media.content_type,
                })
            })
            .collect();

        axum::Json(serde_json::json!({ "data": data })).into_response()
    }
}
