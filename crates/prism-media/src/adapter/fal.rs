use std::time::Duration;

use async_trait::async_trait;
use http::HeaderMap;
use prism_config::ProviderType;
use secrecy::SecretString;
use serde_json::{Map, Value, json};
use url::Url;

use super::{AdapterDefaults, ProviderAdapter, ReplyContext, default_url, excerpt, join_url, str_at, url_at};
use crate::auth::AuthScheme;
use crate::catalog::{ModelDescriptor, ModelFeatures, ProviderDescriptor};
use crate::error::{MediaError, Result};
use crate::fetch::MediaFetcher;
use crate::params::{self, Geometry};
use crate::poller::{self, JobSnapshot, JobSource, JobStatus, PollConfig, PollState};
use crate::request::{ProviderReply, RequestBody};
use crate::types::{GeneratedMedia, GenerationRequest, ImageInput, OutputFormat};

const DEFAULT_BASE_URL: &str = "https://fal.run";
const DEFAULT_QUEUE_URL: &str = "https://queue.fal.run";

/// fal.ai model gateway
///
/// Synchronous models answer on `fal.run`; queue models are submitted to
/// the queue host and polled through the URLs the submission returns.
pub(crate) struct FalAdapter;

impl FalAdapter {
    fn queue_base(provider: &ProviderDescriptor) -> Result<Url> {
        match &provider.queue_base_url {
            Some(url) => Ok(url.clone()),
            None => Url::parse(DEFAULT_QUEUE_URL)
                .map_err(|e| MediaError::ConfigError(format!("invalid queue URL: {e}"))),
        }
    }

    /// Every media URL in a result payload
    ///
    /// An entry of a media list without a URL fails the whole reply.
    fn media_locations(value: &Value) -> Result<Vec<&str>> {
        let mut locations = Vec::new();

        if let Some(images) = value.get("images").and_then(Value::as_array) {
            for image in images {
                let url = str_at(image, "/url").ok_or_else(|| {
                    MediaError::UnrecognizedReplyShape(format!("image entry without url: {}", excerpt(image)))
                })?;
                locations.push(url);
            }
        }

        for pointer in ["/image/url", "/video/url"] {
            if let Some(url) = str_at(value, pointer) {
                locations.push(url);
            }
        }

        match value.get("output") {
            Some(Value::String(url)) if !url.is_empty() => locations.push(url),
            Some(Value::Array(urls)) => {
                for url in urls {
                    let url = url.as_str().filter(|url| !url.is_empty()).ok_or_else(|| {
                        MediaError::UnrecognizedReplyShape(format!("output entry is not a url: {}", excerpt(url)))
                    })?;
                    locations.push(url);
                }
            }
            _ => {}
        }

        Ok(locations)
    }

    /// Path of a queued request, keyed by the model's owner and app
    fn request_path(model_id: &str, request_id: &str) -> String {
        let app = model_id.splitn(3, '/').take(2).collect::<Vec<_>>().join("/");
        format!("{app}/requests/{request_id}")
    }

    async fn download_all(value: &Value, fetcher: &MediaFetcher<'_>) -> Result<GeneratedMedia> {
        let mut items = Vec::new();
        for location in Self::media_locations(value)? {
            items.push(fetcher.download(location).await?);
        }
        GeneratedMedia::new(items, "fal")
    }
}

/// Status requests for one queued fal request
struct FalJob<'a> {
    fetcher: MediaFetcher<'a>,
    status_url: Url,
}

#[async_trait]
impl JobSource for FalJob<'_> {
    async fn fetch_status(&self, _state: &PollState) -> Result<JobSnapshot> {
        let payload = self.fetcher.get_json(&self.status_url).await?;
        let status = str_at(&payload, "/status").map_or(JobStatus::InProgress, JobStatus::parse);
        let failure = (status == JobStatus::Failed).then(|| {
            str_at(&payload, "/error")
                .or_else(|| str_at(&payload, "/detail"))
                .map_or_else(|| excerpt(&payload), str::to_string)
        });

        Ok(JobSnapshot {
            status,
            payload,
            failure,
        })
    }
}

#[async_trait]
impl ProviderAdapter for FalAdapter {
    fn kind(&self) -> ProviderType {
        ProviderType::Fal
    }

    fn defaults(&self) -> AdapterDefaults {
        AdapterDefaults {
            base_url: default_url(DEFAULT_BASE_URL),
            auth: AuthScheme::prefixed("authorization", "Key"),
            polling: PollConfig {
                interval: Duration::from_secs(5),
                ..PollConfig::default()
            },
            unlisted_features: ModelFeatures {
                edit: true,
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
        let base = if model.features.queue {
            Self::queue_base(provider)?
        } else {
            provider.base_url.clone()
        };
        join_url(&base, &model.id).map(Some)
    }

    fn build_body(
        &self,
        request: &GenerationRequest,
        model: &ModelDescriptor,
        _provider: &ProviderDescriptor,
    ) -> Result<RequestBody> {
        let mut body = Map::new();
        body.insert("prompt".to_string(), Value::from(request.prompt.as_str()));
        params::put(&mut body, "negative_prompt", request.negative_prompt.as_deref());
        params::put(&mut body, "seed", request.seed);
        params::put(&mut body, "num_images", request.count);

        match params::geometry(request, model, 1) {
            Some(Geometry::Dimensions(size)) => {
                body.insert(
                    "image_size".to_string(),
                    json!({ "width": size.width, "height": size.height }),
                );
            }
            Some(Geometry::Aspect(ratio)) => {
                body.insert("aspect_ratio".to_string(), Value::from(ratio.to_string()));
            }
            None => {}
        }

        params::put(&mut body, "guidance_scale", request.guidance);
        params::put(&mut body, "num_inference_steps", request.steps);
        params::put(&mut body, "strength", request.strength);
        params::put(&mut body, "image_url", request.reference_image.as_ref().map(ImageInput::to_data_uri));
        params::put(&mut body, "mask_url", request.mask.as_ref().map(ImageInput::to_data_uri));
        params::put(&mut body, "output_format", request.output_format.map(OutputFormat::as_str));
        params::put(&mut body, "duration", request.duration_seconds.map(|d| d.to_string()));
        params::put(
            &mut body,
            "safety_tolerance",
            request.safety_tolerance.map(|t| params::scale(t, 1, 6).to_string()),
        );

        params::merge_extra(&mut body, &request.extra);
        Ok(RequestBody::Json(Value::Object(body)))
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

        let has_media = !Self::media_locations(&value)?.is_empty();
        let Some(request_id) = str_at(&value, "/request_id").filter(|_| !has_media) else {
            return Self::download_all(&value, &context.fetcher).await;
        };

        let queue = Self::queue_base(context.provider)?;
        let request_base = join_url(&queue, &Self::request_path(&context.model.id, request_id))?;

        let status_url = match url_at(&value, "/status_url") {
            Some(url) => url,
            None => join_url(&request_base, "status")?,
        };

        let mut state = PollState::new(
            request_id,
            str_at(&value, "/status").map_or(JobStatus::Queued, JobStatus::parse),
        );
        state.polling_url = Some(status_url.clone());
        state.response_url = url_at(&value, "/response_url");

        tracing::debug!(
            provider = %context.provider.id,
            model = %context.model.id,
            request_id = %state.job_id,
            "polling queued request"
        );

        let source = FalJob {
            fetcher: context.fetcher,
            status_url,
        };

        let outcome = poller::run(&context.provider.polling, state, &source).await?;

        if !Self::media_locations(&outcome.payload)?.is_empty() {
            return Self::download_all(&outcome.payload, &context.fetcher).await;
        }

        let response_url = outcome.state.response_url.unwrap_or(request_base);
        let result = context.fetcher.get_json(&response_url).await?;
        Self::download_all(&result, &context.fetcher).await
    }
}
