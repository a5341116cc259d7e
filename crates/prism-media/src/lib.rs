#![allow(
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_const_for_fn,
    clippy::module_name_repetitions
)]

mod access;
mod adapter;
mod auth;
mod catalog;
mod credentials;
mod dispatcher;
mod error;
mod fetch;
mod http_client;
pub mod media;
mod params;
pub mod poller;
mod request;
mod service;
mod types;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    response::Response,
    routing::{get, post},
};
use prism_core::RequestContext;

pub use access::AccessPolicy;
pub use adapter::{AdapterDefaults, AdapterRegistry, ProviderAdapter, ReplyContext};
pub use auth::AuthScheme;
pub use catalog::{
    Catalog, CatalogHandle, CatalogSnapshot, ModelDescriptor, ModelFeatures, ProviderDescriptor, Resolved,
};
pub use credentials::{ConfiguredCredentials, CredentialSource};
pub use dispatcher::{Dispatcher, MediaContext, build_outbound};
pub use error::{MediaError, Result};
pub use fetch::MediaFetcher;
pub use http_client::build_http_client;
pub use request::{FormPart, MultipartForm, OutboundRequest, PartValue, ProviderReply, RequestBody};
pub use service::{MediaService, ModelEntry, ModelList};
pub use types::{AspectRatio, GeneratedMedia, GenerationRequest, ImageInput, Media, OutputFormat, Size};

/// Build the media service from configuration
///
/// # Errors
///
/// Returns an error if the catalog or HTTP client cannot be built
pub fn build_service(config: &prism_config::Config) -> anyhow::Result<Arc<MediaService>> {
    let service = MediaService::from_config(config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize media service: {e}"))?;
    Ok(Arc::new(service))
}

/// Create the endpoint router for media generation
pub fn endpoint_router() -> Router<Arc<MediaService>> {
    Router::new()
        .route("/v1/media/generations", post(generate))
        .route("/v1/media/models", get(list_models))
}

/// Handle generation requests
async fn generate(
    State(service): State<Arc<MediaService>>,
    axum::Extension(context): axum::Extension<RequestContext>,
    Json(request): Json<GenerationRequest>,
) -> Result<Response> {
    tracing::debug!("Media generation handler called for model: {}", request.model);

    let media = service.generate(&request, &context).await?;

    Ok(media.into_response())
}

/// List every model the catalog resolves
async fn list_models(State(service): State<Arc<MediaService>>) -> Json<ModelList> {
    Json(service.models())
}
