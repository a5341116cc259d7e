use async_trait::async_trait;
use http::HeaderMap;
use prism_config::ProviderType;
use secrecy::SecretString;
use serde_json::{Map, Value};
use url::Url;

use super::{AdapterDefaults, ProviderAdapter, ReplyContext, default_url, excerpt, join_url, str_at};
use crate::catalog::{ModelDescriptor, ModelFeatures, ProviderDescriptor};
use crate::error::{MediaError, Result};
use crate::media;
use crate::params::{self, Geometry};
use crate::poller::PollConfig;
use crate::request::{MultipartForm, ProviderReply, RequestBody};
use crate::types::{GeneratedMedia, GenerationRequest, OutputFormat};

/// Default `OpenAI` API base URL
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// `OpenAI` images API (`DALL-E` and `gpt-image`)
pub(crate) struct OpenAiAdapter;

impl OpenAiAdapter {
    /// `gpt-image` models always answer in base64 and take a list of images
    fn is_gpt_image(model: &ModelDescriptor) -> bool {
        model.id.starts_with("gpt-image")
    }

    fn json_body(request: &GenerationRequest, model: &ModelDescriptor) -> Value {
        let mut body = Map::new();
        body.insert("model".to_string(), Value::from(model.id.as_str()));
        body.insert("prompt".to_string(), Value::from(request.prompt.as_str()));
        params::put(&mut body, "n", request.count);
        params::put(&mut body, "size", Self::size(request, model));
        params::put(&mut body, "quality", request.quality.as_deref());
        params::put(&mut body, "style", request.style.as_deref());

        if Self::is_gpt_image(model) {
            params::put(&mut body, "output_format", request.output_format.map(OutputFormat::as_str));
        } else {
            body.insert("response_format".to_string(), Value::from("b64_json"));
        }

        params::merge_extra(&mut body, &request.extra);
        Value::Object(body)
    }

    fn edit_form(request: &GenerationRequest, model: &ModelDescriptor) -> Result<MultipartForm> {
        let image = request.reference_image.as_ref().ok_or_else(|| {
            MediaError::RequestBuildFailure("image edits require a reference_image".to_string())
        })?;

        let mut form = MultipartForm::new();
        form.text("model", &model.id).text("prompt", &request.prompt);

        let image_field = if Self::is_gpt_image(model) { "image[]" } else { "image" };
        form.binary(image_field, image.bytes.clone(), image.file_name("image"), &image.mime);

        if let Some(mask) = &request.mask {
            form.binary("mask", mask.bytes.clone(), mask.file_name("mask"), &mask.mime);
        }

        form.text_opt("n", request.count)
            .text_opt("size", Self::size(request, model))
            .text_opt("quality", request.quality.as_deref());

        if Self::is_gpt_image(model) {
            form.text_opt("output_format", request.output_format.map(OutputFormat::as_str));
        } else {
            form.text("response_format", "b64_json");
        }

        for (key, value) in &request.extra {
            if form.get(key).is_none() {
                form.text_opt(key, params::scalar_text(value));
            }
        }

        Ok(form)
    }

    fn size(request: &GenerationRequest, model: &ModelDescriptor) -> Option<String> {
        match params::geometry(request, model, 1)? {
            Geometry::Dimensions(size) => Some(size.to_string()),
            Geometry::Aspect(_) => None,
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn kind(&self) -> ProviderType {
        ProviderType::Openai
    }

    fn defaults(&self) -> AdapterDefaults {
        AdapterDefaults {
            base_url: default_url(DEFAULT_BASE_URL),
            auth: crate::auth::AuthScheme::Bearer,
            polling: PollConfig::default(),
            unlisted_features: ModelFeatures::default(),
        }
    }

    fn computed_endpoint(
        &self,
        request: &GenerationRequest,
        _model: &ModelDescriptor,
        provider: &ProviderDescriptor,
    ) -> Result<Option<Url>> {
        let path = if request.reference_image.is_some() {
            "images/edits"
        } else {
            "images/generations"
        };
        join_url(&provider.base_url, path).map(Some)
    }

    fn build_body(
        &self,
        request: &GenerationRequest,
        model: &ModelDescriptor,
        _provider: &ProviderDescriptor,
    ) -> Result<RequestBody> {
        if request.reference_image.is_some() {
            return Self::edit_form(request, model).map(RequestBody::Multipart);
        }
        Ok(RequestBody::Json(Self::json_body(request, model)))
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

        let data = value
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| MediaError::UnrecognizedReplyShape(format!("no data array in {}", excerpt(&value))))?;

        let declared = context.request.output_format.map(OutputFormat::mime);
        let mut items = Vec::with_capacity(data.len());

        for item in data {
            if let Some(b64) = str_at(item, "/b64_json") {
                let media = media::decode_media(b64, declared)
                    .map_err(|e| MediaError::UnrecognizedReplyShape(format!("invalid b64_json: {e}")))?;
                items.push(media);
            } else if let Some(url) = str_at(item, "/url") {
                items.push(context.fetcher.download(url).await?);
            } else {
                return Err(MediaError::UnrecognizedReplyShape(format!(
                    "data item without b64_json or url: {}",
                    excerpt(item)
                )));
            }
        }

        GeneratedMedia::new(items, "openai")
    }
}
