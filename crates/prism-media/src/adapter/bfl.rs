use async_trait::async_trait;
use http::{HeaderMap, HeaderValue};
use prism_config::ProviderType;
use secrecy::SecretString;
use serde_json::{Map, Value};
use url::Url;

use super::{AdapterDefaults, ProviderAdapter, ReplyContext, default_url, excerpt, join_url, str_at, url_at};
use crate::auth::AuthScheme;
use crate::catalog::{ModelDescriptor, ModelFeatures, ProviderDescriptor};
use crate::error::{MediaError, Result};
use crate::fetch::MediaFetcher;
use crate::params::{self, Geometry};
use crate::poller::{self, JobSnapshot, JobSource, JobStatus, PollConfig, PollState};
use crate::request::{ProviderReply, RequestBody};
use crate::types::{GeneratedMedia, GenerationRequest, OutputFormat};

const DEFAULT_BASE_URL: &str = "https://api.bfl.ai";

/// Output dimensions must be multiples of this
const DIMENSION_MULTIPLE: u32 = 32;

/// Upper end of the moderation tolerance scale
const MAX_SAFETY_TOLERANCE: u32 = 6;

/// Black Forest Labs FLUX API
///
/// Submissions return a job reference that is polled until the result
/// URL appears.
pub(crate) struct BflAdapter;

impl BflAdapter {
    /// Media location of a finished job, in any of the shapes the API uses
    fn result_location(value: &Value) -> Option<&str> {
        str_at(value, "/result/sample")
            .or_else(|| str_at(value, "/result/url"))
            .or_else(|| str_at(value, "/sample"))
    }

    fn status_url(state: &PollState, provider: &ProviderDescriptor) -> Result<Url> {
        if let Some(url) = &state.polling_url {
            return Ok(url.clone());
        }

        let mut url = join_url(&provider.base_url, "v1/get_result")?;
        url.query_pairs_mut().append_pair("id", &state.job_id);
        Ok(url)
    }
}

/// Status requests for one BFL job
struct BflJob<'a> {
    fetcher: MediaFetcher<'a>,
    provider: &'a ProviderDescriptor,
}

#[async_trait]
impl JobSource for BflJob<'_> {
    async fn fetch_status(&self, state: &PollState) -> Result<JobSnapshot> {
        let url = BflAdapter::status_url(state, self.provider)?;
        let payload = self.fetcher.get_json(&url).await?;

        let status = match str_at(&payload, "/status") {
            Some(raw) => JobStatus::parse(raw),
            None if BflAdapter::result_location(&payload).is_some() => JobStatus::Completed,
            None => JobStatus::InProgress,
        };

        let failure = (status == JobStatus::Failed).then(|| {
            let raw = str_at(&payload, "/status").unwrap_or("failed");
            match payload.get("details").filter(|d| !d.is_null()) {
                Some(details) => format!("{raw}: {details}"),
                None => raw.to_string(),
            }
        });

        Ok(JobSnapshot {
            status,
            payload,
            failure,
        })
    }
}

#[async_trait]
impl ProviderAdapter for BflAdapter {
    fn kind(&self) -> ProviderType {
        ProviderType::Bfl
    }

    fn defaults(&self) -> AdapterDefaults {
        AdapterDefaults {
            base_url: default_url(DEFAULT_BASE_URL),
            auth: AuthScheme::header("x-key"),
            polling: PollConfig::default(),
            unlisted_features: ModelFeatures::default(),
        }
    }

    fn computed_endpoint(
        &self,
        _request: &GenerationRequest,
        model: &ModelDescriptor,
        provider: &ProviderDescriptor,
    ) -> Result<Option<Url>> {
        join_url(&provider.base_url, &format!("v1/{}", model.id)).map(Some)
    }

    fn build_body(
        &self,
        request: &GenerationRequest,
        model: &ModelDescriptor,
        _provider: &ProviderDescriptor,
    ) -> Result<RequestBody> {
        let mut body = Map::new();
        body.insert("prompt".to_string(), Value::from(request.prompt.as_str()));

        match params::geometry(request, model, DIMENSION_MULTIPLE) {
            Some(Geometry::Dimensions(size)) => {
                body.insert("width".to_string(), Value::from(size.width));
                body.insert("height".to_string(), Value::from(size.height));
            }
            Some(Geometry::Aspect(ratio)) => {
                body.insert("aspect_ratio".to_string(), Value::from(ratio.to_string()));
            }
            None => {}
        }

        params::put(&mut body, "guidance", request.guidance);
        params::put(&mut body, "steps", request.steps);
        params::put(&mut body, "seed", request.seed);
        params::put(
            &mut body,
            "safety_tolerance",
            request
                .safety_tolerance
                .map(|t| params::scale(t, 0, MAX_SAFETY_TOLERANCE)),
        );
        params::put(&mut body, "output_format", request.output_format.map(OutputFormat::as_str));

        if let Some(image) = &request.reference_image {
            body.insert("input_image".to_string(), Value::from(image.to_base64()));
            params::put(&mut body, "image_prompt_strength", request.strength);
        }

        params::merge_extra(&mut body, &request.extra);
        Ok(RequestBody::Json(Value::Object(body)))
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

        if let Some(location) = Self::result_location(&value) {
            tracing::debug!(provider = %context.provider.id, "job finished at submission");
            let media = context.fetcher.download(location).await?;
            return Ok(GeneratedMedia::single(media));
        }

        let job_id = str_at(&value, "/id")
            .or_else(|| str_at(&value, "/job_id"))
            .ok_or_else(|| MediaError::UnrecognizedReplyShape(format!("no job id or result in {}", excerpt(&value))))?;

        let mut state = PollState::new(
            job_id,
            str_at(&value, "/status").map_or(JobStatus::Queued, JobStatus::parse),
        );
        state.polling_url = url_at(&value, "/polling_url");

        tracing::debug!(
            provider = %context.provider.id,
            job_id = %state.job_id,
            "polling submitted job"
        );

        let source = BflJob {
            fetcher: context.fetcher,
            provider: context.provider,
        };

        let outcome = if state.status == JobStatus::Completed {
            poller::JobOutcome { state, payload: value.clone() }
        } else {
            poller::run(&context.provider.polling, state, &source).await?
        };

        let location = Self::result_location(&outcome.payload).ok_or_else(|| {
            MediaError::UnrecognizedReplyShape(format!("finished job has no result in {}", excerpt(&outcome.payload)))
        })?;

        let media = context.fetcher.download(location).await?;
        Ok(GeneratedMedia::single(media))
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::adapter::testing::{catalog, resolve};
    use crate::types::{AspectRatio, ImageInput};

    fn descriptors(base_url: &str, model: &str) -> (ProviderDescriptor, ModelDescriptor) {
        let catalog = catalog(&indoc::formatdoc! {r#"
            [bfl]
            type = "bfl"
            base_url = "{base_url}"

            [bfl.polling]
            interval = "1ms"
            max_attempts = 5

            [[bfl.models]]
            id = "flux-pro-1.1"
            default_width = 1024
            default_height = 768

            [[bfl.models]]
            id = "flux-kontext-pro"
            geometry = "aspect_ratio"
            edit = true
        "#});
        resolve(&catalog, model)
    }

    #[test]
    fn dimensions_body() {
        let (provider, model) = descriptors("https://api.bfl.ai", "bfl/flux-pro-1.1");

        let mut request = GenerationRequest::new("bfl/flux-pro-1.1", "a red fox");
        request.aspect_ratio = AspectRatio::new(1, 1);
        request.safety_tolerance = Some(0.5);
        request.guidance = Some(3.0);

        let endpoint = BflAdapter.endpoint_url(&request, &model, &provider).unwrap();
        assert_eq!(endpoint.as_str(), "https://api.bfl.ai/v1/flux-pro-1.1");

        let body = BflAdapter.build_body(&request, &model, &provider).unwrap();
        assert_eq!(
            body.as_json().unwrap(),
            &json!({
                "prompt": "a red fox",
                "width": 1024,
                "height": 1024,
                "guidance": 3.0,
                "safety_tolerance": 3
            })
        );
    }

    #[test]
    fn kontext_edit_stays_json() {
        let (provider, model) = descriptors("https://api.bfl.ai", "bfl/flux-kontext-pro");

        let mut request = GenerationRequest::new("bfl/flux-kontext-pro", "make it night");
        request.reference_image = Some(ImageInput::new(Bytes::from_static(b"hi"), "image/png"));
        request.aspect_ratio = AspectRatio::new(16, 9);

        let body = BflAdapter.build_body(&request, &model, &provider).unwrap();
        assert_eq!(
            body.as_json().unwrap(),
            &json!({
                "prompt": "make it night",
                "aspect_ratio": "16:9",
                "input_image": "aGk="
            })
        );
    }

    #[tokio::test]
    async fn polls_returned_url_until_ready() {
        let server = MockServer::start().await;
        let (provider, model) = descriptors(&server.uri(), "bfl/flux-pro-1.1");
        let request = GenerationRequest::new("bfl/flux-pro-1.1", "a red fox");

        Mock::given(method("GET"))
            .and(path("/poll/abc"))
            .and(header("x-key", "bfl-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "Pending" })))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/poll/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "Ready",
                "result": { "sample": format!("{}/files/fox.png", server.uri()) }
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/files/fox.png"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"fox-bytes".to_vec(), "image/png"))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let key = SecretString::from("bfl-key");
        let context = ReplyContext {
            request: &request,
            model: &model,
            provider: &provider,
            fetcher: MediaFetcher::new(&client, &BflAdapter, &provider, &key),
        };

        let reply = ProviderReply::json_ok(&json!({
            "id": "abc",
            "polling_url": format!("{}/poll/abc", server.uri())
        }));

        let output = BflAdapter.process_response(reply, &context).await.unwrap();
        assert_eq!(output.items[0].bytes.as_ref(), b"fox-bytes");
        assert_eq!(output.items[0].content_type, "image/png");
    }

    #[tokio::test]
    async fn falls_back_to_get_result() {
        let server = MockServer::start().await;
        let (provider, model) = descriptors(&server.uri(), "bfl/flux-pro-1.1");
        let request = GenerationRequest::new("bfl/flux-pro-1.1", "a red fox");

        Mock::given(method("GET"))
            .and(path("/v1/get_result"))
            .and(query_param("id", "job-7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "Content Moderated",
                "details": { "reason": "nsfw" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let key = SecretString::from("bfl-key");
        let context = ReplyContext {
            request: &request,
            model: &model,
            provider: &provider,
            fetcher: MediaFetcher::new(&client, &BflAdapter, &provider, &key),
        };

        let err = BflAdapter
            .process_response(ProviderReply::json_ok(&json!({ "job_id": "job-7", "status": "queued" })), &context)
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::PollFailed { ref reason } if reason.contains("Content Moderated")));
    }
}
