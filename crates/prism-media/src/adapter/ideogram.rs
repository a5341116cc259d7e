use async_trait::async_trait;
use http::{HeaderMap, HeaderValue};
use prism_config::{GeometryStyle, ProviderType};
use secrecy::SecretString;
use serde_json::{Map, Value};
use url::Url;

use super::{AdapterDefaults, ProviderAdapter, ReplyContext, default_url, excerpt, join_url, str_at};
use crate::auth::AuthScheme;
use crate::catalog::{ModelDescriptor, ModelFeatures, ProviderDescriptor};
use crate::error::{MediaError, Result};
use crate::params::{self, Geometry};
use crate::poller::PollConfig;
use crate::request::{MultipartForm, ProviderReply, RequestBody};
use crate::types::{AspectRatio, GeneratedMedia, GenerationRequest};

const DEFAULT_BASE_URL: &str = "https://api.ideogram.ai";

/// Ideogram generate and edit APIs
///
/// V_3 models live under their own path and take a flat body; earlier
/// models wrap their fields in `image_request`.
pub(crate) struct IdeogramAdapter;

impl IdeogramAdapter {
    fn is_v3(model: &ModelDescriptor) -> bool {
        model.id.starts_with("V_3")
    }

    fn aspect(request: &GenerationRequest, model: &ModelDescriptor) -> Option<AspectRatio> {
        match params::geometry(request, model, 1)? {
            Geometry::Aspect(ratio) => Some(ratio),
            Geometry::Dimensions(size) => AspectRatio::of(size),
        }
    }

    /// Aspect ratio in the vocabulary of the model generation
    fn aspect_value(ratio: AspectRatio, v3: bool) -> String {
        if v3 {
            ratio.join("x")
        } else {
            format!("ASPECT_{}", ratio.join("_"))
        }
    }

    fn fields(request: &GenerationRequest, model: &ModelDescriptor, v3: bool) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("prompt".to_string(), Value::from(request.prompt.as_str()));
        if !v3 {
            fields.insert("model".to_string(), Value::from(model.id.as_str()));
        }
        params::put(
            &mut fields,
            "aspect_ratio",
            Self::aspect(request, model).map(|r| Self::aspect_value(r, v3)),
        );
        params::put(&mut fields, "negative_prompt", request.negative_prompt.as_deref());
        params::put(&mut fields, "seed", request.seed);
        params::put(&mut fields, "num_images", request.count);
        params::put(&mut fields, "style_type", request.style.as_deref());
        params::put(
            &mut fields,
            if v3 { "rendering_speed" } else { "speed" },
            request.quality.as_deref(),
        );
        params::put(&mut fields, "image_weight", request.strength.map(params::percent));
        params::merge_extra(&mut fields, &request.extra);
        fields
    }

    fn edit_form(request: &GenerationRequest, model: &ModelDescriptor, v3: bool) -> Result<MultipartForm> {
        let image = request
            .reference_image
            .as_ref()
            .ok_or_else(|| MediaError::RequestBuildFailure("edits require a reference_image".to_string()))?;

        let mut form = MultipartForm::new();
        let image_field = if v3 { "image" } else { "image_file" };
        form.binary(image_field, image.bytes.clone(), image.file_name("image"), &image.mime);

        if let Some(mask) = &request.mask {
            form.binary("mask", mask.bytes.clone(), mask.file_name("mask"), &mask.mime);
        }

        for (key, value) in Self::fields(request, model, v3) {
            form.text_opt(&key, params::scalar_text(&value));
        }

        Ok(form)
    }
}

#[async_trait]
impl ProviderAdapter for IdeogramAdapter {
    fn kind(&self) -> ProviderType {
        ProviderType::Ideogram
    }

    fn defaults(&self) -> AdapterDefaults {
        AdapterDefaults {
            base_url: default_url(DEFAULT_BASE_URL),
            auth: AuthScheme::header("api-key"),
            polling: PollConfig::default(),
            unlisted_features: ModelFeatures {
                geometry: GeometryStyle::AspectRatio,
                edit: true,
                ..ModelFeatures::default()
            },
        }
    }

    fn computed_endpoint(
        &self,
        request: &GenerationRequest,
        model: &ModelDescriptor,
        provider: &ProviderDescriptor,
    ) -> Result<Option<Url>> {
        let action = if request.reference_image.is_some() { "edit" } else { "generate" };
        let path = if Self::is_v3(model) {
            format!("v1/ideogram-v3/{action}")
        } else {
            action.to_string()
        };
        join_url(&provider.base_url, &path).map(Some)
    }

    fn build_body(
        &self,
        request: &GenerationRequest,
        model: &ModelDescriptor,
        _provider: &ProviderDescriptor,
    ) -> Result<RequestBody> {
        let v3 = Self::is_v3(model);

        if request.reference_image.is_some() {
            return Self::edit_form(request, model, v3).map(RequestBody::Multipart);
        }

        let fields = Self::fields(request, model, v3);
        let body = if v3 {
            Value::Object(fields)
        } else {
            serde_json::json!({ "image_request": fields })
        };

        Ok(RequestBody::Json(body))
    }

    fn add_auth_headers(
        &self,
        headers: &mut HeaderMap,
        credential: &SecretString,
        provider: &ProviderDescriptor,
    ) -> Result<()> {
        headers.insert(http::header::ACCEPT, HeaderValue::from_static("application/json"));
        provider.auth.apply(headers, credential)
    }

    async fn process_response(&self, reply: ProviderReply, context: &ReplyContext<'_>) -> Result<GeneratedMedia> {
        let value = reply.json()?;

        let data = value
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| MediaError::UnrecognizedReplyShape(format!("no data array in {}", excerpt(&value))))?;

        let mut items = Vec::with_capacity(data.len());
        for item in data {
            match str_at(item, "/url") {
                Some(url) => items.push(context.fetcher.download(url).await?),
                None if item.get("is_image_safe") == Some(&Value::Bool(false)) => {
                    return Err(MediaError::ProviderRejected {
                        status: 422,
                        message: "ideogram withheld an image that failed its safety check".to_string(),
                    });
                }
                None => {
                    return Err(MediaError::UnrecognizedReplyShape(format!(
                        "data item without url: {}",
                        excerpt(item)
                    )));
                }
            }
        }

        GeneratedMedia::new(items, "ideogram")
    }
}
