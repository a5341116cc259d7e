use async_trait::async_trait;
use http::HeaderMap;
use prism_config::{GeometryStyle, ProviderType};
use secrecy::SecretString;
use serde_json::{Map, Value, json};
use url::Url;

use super::{AdapterDefaults, ProviderAdapter, ReplyContext, default_url, excerpt, join_url, str_at};
use crate::auth::AuthScheme;
use crate::catalog::{ModelDescriptor, ModelFeatures, ProviderDescriptor};
use crate::error::{MediaError, Result};
use crate::media;
use crate::params::{self, Geometry};
use crate::poller::PollConfig;
use crate::request::{ProviderReply, RequestBody};
use crate::types::{AspectRatio, GeneratedMedia, GenerationRequest, Media};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Generative Language API
///
/// Gemini image models answer `generateContent` with inline parts;
/// Imagen models answer `predict` with base64 predictions.
pub(crate) struct GoogleAdapter;

impl GoogleAdapter {
    fn is_imagen(model: &ModelDescriptor) -> bool {
        model.id.starts_with("imagen")
    }

    fn aspect(request: &GenerationRequest, model: &ModelDescriptor) -> Option<String> {
        let ratio = match params::geometry(request, model, 1)? {
            Geometry::Aspect(ratio) => ratio,
            Geometry::Dimensions(size) => AspectRatio::of(size)?,
        };
        Some(ratio.to_string())
    }

    fn predict_body(request: &GenerationRequest, model: &ModelDescriptor) -> Value {
        let mut parameters = Map::new();
        params::put(&mut parameters, "sampleCount", request.count);
        params::put(&mut parameters, "aspectRatio", Self::aspect(request, model));
        params::put(&mut parameters, "negativePrompt", request.negative_prompt.as_deref());
        params::put(&mut parameters, "seed", request.seed);
        if let Some(format) = request.output_format {
            parameters.insert("outputOptions".to_string(), json!({ "mimeType": format.mime() }));
        }
        params::merge_extra(&mut parameters, &request.extra);

        json!({
            "instances": [{ "prompt": request.prompt }],
            "parameters": parameters,
        })
    }

    fn content_body(request: &GenerationRequest, model: &ModelDescriptor) -> Value {
        let mut parts = vec![json!({ "text": request.prompt })];
        if let Some(image) = &request.reference_image {
            parts.push(json!({
                "inlineData": { "mimeType": image.mime, "data": image.to_base64() }
            }));
        }

        let mut generation = Map::new();
        generation.insert("responseModalities".to_string(), json!(["TEXT", "IMAGE"]));
        params::put(&mut generation, "seed", request.seed);
        params::put(&mut generation, "candidateCount", request.count);
        if let Some(ratio) = Self::aspect(request, model) {
            generation.insert("imageConfig".to_string(), json!({ "aspectRatio": ratio }));
        }
        params::merge_extra(&mut generation, &request.extra);

        json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": generation,
        })
    }

    fn predictions(value: &Value) -> Result<Vec<Media>> {
        let predictions = value.get("predictions").and_then(Value::as_array).ok_or_else(|| {
            MediaError::UnrecognizedReplyShape(format!(
                "no predictions in {} (prompt may have been filtered)",
                excerpt(value)
            ))
        })?;

        predictions
            .iter()
            .map(|prediction| match str_at(prediction, "/bytesBase64Encoded") {
                Some(data) => decode(data, str_at(prediction, "/mimeType")),
                None => match str_at(prediction, "/raiFilteredReason") {
                    Some(reason) => Err(MediaError::ProviderRejected {
                        status: 422,
                        message: format!("imagen filtered an image: {reason}"),
                    }),
                    None => Err(MediaError::UnrecognizedReplyShape(format!(
                        "prediction without image bytes: {}",
                        excerpt(prediction)
                    ))),
                },
            })
            .collect()
    }

    fn inline_parts(value: &Value) -> Result<Vec<Media>> {
        let mut items = Vec::new();

        let candidates = value.get("candidates").and_then(Value::as_array);
        for candidate in candidates.into_iter().flatten() {
            let parts = candidate.pointer("/content/parts").and_then(Value::as_array);
            for part in parts.into_iter().flatten() {
                let Some(inline) = part.get("inlineData").or_else(|| part.get("inline_data")) else {
                    continue;
                };
                let data = str_at(inline, "/data").ok_or_else(|| {
                    MediaError::UnrecognizedReplyShape(format!("inline part without data: {}", excerpt(part)))
                })?;
                let mime = str_at(inline, "/mimeType").or_else(|| str_at(inline, "/mime_type"));
                items.push(decode(data, mime)?);
            }
        }

        if items.is_empty() {
            let reason = str_at(value, "/promptFeedback/blockReason")
                .or_else(|| str_at(value, "/candidates/0/finishReason"))
                .map_or_else(|| excerpt(value), |r| format!("finish reason {r}"));
            return Err(MediaError::UnrecognizedReplyShape(format!("no image parts: {reason}")));
        }

        Ok(items)
    }
}

fn decode(data: &str, mime: Option<&str>) -> Result<Media> {
    media::decode_media(data, mime).map_err(|e| MediaError::UnrecognizedReplyShape(format!("invalid inline data: {e}")))
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
    fn kind(&self) -> ProviderType {
        ProviderType::Google
    }

    fn defaults(&self) -> AdapterDefaults {
        AdapterDefaults {
            base_url: default_url(DEFAULT_BASE_URL),
            auth: AuthScheme::header("x-goog-api-key"),
            polling: PollConfig::default(),
            unlisted_features: ModelFeatures {
                geometry: GeometryStyle::AspectRatio,
                ..ModelFeatures::default()
            },
        }
    }

    fn computed_endpoint(
        &self,
        _request: &GenerationRequest,
        model: &ModelDescriptor,
        provider: &ProviderDescriptor,
    ) -> Result<Option<Url>> {
        let method = if Self::is_imagen(model) { "predict" } else { "generateContent" };
        join_url(&provider.base_url, &format!("models/{}:{method}", model.id)).map(Some)
    }

    fn build_body(
        &self,
        request: &GenerationRequest,
        model: &ModelDescriptor,
        _provider: &ProviderDescriptor,
    ) -> Result<RequestBody> {
        if request.mask.is_some() {
            return Err(MediaError::RequestBuildFailure(format!(
                "model '{}' does not accept a mask",
                model.id
            )));
        }

        if Self::is_imagen(model) {
            if request.reference_image.is_some() {
                return Err(MediaError::RequestBuildFailure(format!(
                    "model '{}' does not accept a reference_image",
                    model.id
                )));
            }
            return Ok(RequestBody::Json(Self::predict_body(request, model)));
        }

        Ok(RequestBody::Json(Self::content_body(request, model)))
    }

    fn add_auth_headers(
        &self,
        headers: &mut HeaderMap,
        credential: &SecretString,
        provider: &ProviderDescriptor,
    ) -> Result<()> {
        provider.auth.apply(headers, credential)
    }

    async fn process_response(&self, reply: ProviderReply, context: &ReplyContext<'_>) -> Result<GeneratedMedia> {
        let value = reply.json()?;

        let items = if Self::is_imagen(context.model) {
            Self::predictions(&value)?
        } else {
            Self::inline_parts(&value)?
        };

        GeneratedMedia::new(items, "google")
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::adapter::testing::{catalog, resolve};
    use crate::fetch::MediaFetcher;
    use crate::types::{ImageInput, OutputFormat};

    fn descriptors(model: &str) -> (ProviderDescriptor, ModelDescriptor) {
        let catalog = catalog(indoc::indoc! {r#"
            [google]
            type = "google"

            [[google.models]]
            id = "gemini-2.5-flash-image"
            geometry = "aspect_ratio"
            edit = true

            [[google.models]]
            id = "imagen-4.0-generate-001"
            geometry = "aspect_ratio"
        "#});
        resolve(&catalog, model)
    }

    #[test]
    fn gemini_body_carries_inline_image() {
        let (provider, model) = descriptors("google/gemini-2.5-flash-image");

        let mut request = GenerationRequest::new("google/gemini-2.5-flash-image", "add a moon");
        request.reference_image = Some(ImageInput::new(Bytes::from_static(b"hi"), "image/jpeg"));
        request.aspect_ratio = AspectRatio::new(4, 3);

        let endpoint = GoogleAdapter.endpoint_url(&request, &model, &provider).unwrap();
        assert_eq!(
            endpoint.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash-image:generateContent"
        );

        let body = GoogleAdapter.build_body(&request, &model, &provider).unwrap();
        assert_eq!(
            body.as_json().unwrap(),
            &json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        { "text": "add a moon" },
                        { "inlineData": { "mimeType": "image/jpeg", "data": "aGk=" } }
                    ]
                }],
                "generationConfig": {
                    "responseModalities": ["TEXT", "IMAGE"],
                    "imageConfig": { "aspectRatio": "4:3" }
                }
            })
        );
    }

    #[test]
    fn imagen_body() {
        let (provider, model) = descriptors("google/imagen-4.0-generate-001");

        let mut request = GenerationRequest::new("google/imagen-4.0-generate-001", "a harbor");
        request.count = Some(2);
        request.output_format = Some(OutputFormat::Jpeg);

        let endpoint = GoogleAdapter.endpoint_url(&request, &model, &provider).unwrap();
        assert!(endpoint.as_str().ends_with("/models/imagen-4.0-generate-001:predict"));

        let body = GoogleAdapter.build_body(&request, &model, &provider).unwrap();
        assert_eq!(
            body.as_json().unwrap(),
            &json!({
                "instances": [{ "prompt": "a harbor" }],
                "parameters": {
                    "sampleCount": 2,
                    "outputOptions": { "mimeType": "image/jpeg" }
                }
            })
        );
    }

    #[test]
    fn mask_is_rejected() {
        let (provider, model) = descriptors("google/gemini-2.5-flash-image");

        let mut request = GenerationRequest::new("google/gemini-2.5-flash-image", "x");
        request.reference_image = Some(ImageInput::new(Bytes::from_static(b"a"), "image/png"));
        request.mask = Some(ImageInput::new(Bytes::from_static(b"b"), "image/png"));

        assert!(matches!(
            GoogleAdapter.build_body(&request, &model, &provider),
            Err(MediaError::RequestBuildFailure(_))
        ));
    }

    #[tokio::test]
    async fn extracts_both_inline_spellings() {
        let (provider, model) = descriptors("google/gemini-2.5-flash-image");
        let request = GenerationRequest::new("google/gemini-2.5-flash-image", "x");
        let client = reqwest::Client::new();
        let key = SecretString::from("k");
        let context = ReplyContext {
            request: &request,
            model: &model,
            provider: &provider,
            fetcher: MediaFetcher::new(&client, &GoogleAdapter, &provider, &key),
        };

        let reply = ProviderReply::json_ok(&json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "here you go" },
                        { "inlineData": { "mimeType": "image/png", "data": media::encode_base64(b"one") } },
                        { "inline_data": { "mime_type": "image/webp", "data": media::encode_base64(b"two") } }
                    ]
                }
            }]
        }));

        let output = GoogleAdapter.process_response(reply, &context).await.unwrap();
        assert_eq!(output.items.len(), 2);
        assert_eq!(output.items[0].content_type, "image/png");
        assert_eq!(output.items[1].content_type, "image/webp");
        assert_eq!(output.items[1].bytes.as_ref(), b"two");
    }

    #[tokio::test]
    async fn blocked_prompt_is_reported() {
        let (provider, model) = descriptors("google/gemini-2.5-flash-image");
        let request = GenerationRequest::new("google/gemini-2.5-flash-image", "x");
        let client = reqwest::Client::new();
        let key = SecretString::from("k");
        let context = ReplyContext {
            request: &request,
            model: &model,
            provider: &provider,
            fetcher: MediaFetcher::new(&client, &GoogleAdapter, &provider, &key),
        };

        let reply = ProviderReply::json_ok(&json!({ "promptFeedback": { "blockReason": "SAFETY" } }));

        let err = GoogleAdapter.process_response(reply, &context).await.unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn every_prediction_must_carry_bytes() {
        let filtered = json!({
            "predictions": [
                { "bytesBase64Encoded": "aGk=", "mimeType": "image/png" },
                { "raiFilteredReason": "violates policy" }
            ]
        });
        assert!(matches!(
            GoogleAdapter::predictions(&filtered),
            Err(MediaError::ProviderRejected { status: 422, message }) if message.contains("violates policy")
        ));

        let empty = json!({
            "predictions": [{ "bytesBase64Encoded": "aGk=", "mimeType": "image/png" }, {}]
        });
        assert!(matches!(
            GoogleAdapter::predictions(&empty),
            Err(MediaError::UnrecognizedReplyShape(_))
        ));
    }

    #[test]
    fn bearer_override_replaces_api_key_header() {
        let catalog = catalog(indoc::indoc! {r#"
            [google]
            type = "google"
            auth_header = "authorization"
            auth_prefix = "Bearer"

            [[google.models]]
            id = "imagen-4.0-generate-001"
        "#});
        let (provider, _) = resolve(&catalog, "google/imagen-4.0-generate-001");

        let mut headers = HeaderMap::new();
        GoogleAdapter
            .add_auth_headers(&mut headers, &SecretString::from("k"), &provider)
            .unwrap();

        assert_eq!(headers.get("authorization").unwrap(), "Bearer k");
        assert!(headers.get("x-goog-api-key").is_none());
    }
}
