use http::{HeaderMap, Method};
use prism_core::RequestContext;
use reqwest::Client;
use secrecy::SecretString;

use crate::access::AccessPolicy;
use crate::adapter::{AdapterRegistry, ProviderAdapter, ReplyContext};
use crate::catalog::{CatalogHandle, CatalogSnapshot, ModelDescriptor, ProviderDescriptor};
use crate::error::{MediaError, Result};
use crate::fetch::MediaFetcher;
use crate::request::OutboundRequest;
use crate::types::{GeneratedMedia, GenerationRequest};

/// Collaborators a dispatcher works with
#[derive(Clone)]
pub struct MediaContext {
    pub catalog: CatalogHandle,
    pub adapters: AdapterRegistry,
    pub http: Client,
    pub access: AccessPolicy,
}

/// Runs one generation request end to end
pub struct Dispatcher {
    context: MediaContext,
}

impl Dispatcher {
    pub const fn new(context: MediaContext) -> Self {
        Self { context }
    }

    pub const fn context(&self) -> &MediaContext {
        &self.context
    }

    /// Resolve, authorize, build, send once, and process the reply
    ///
    /// The snapshot taken at the start is used throughout, so a concurrent
    /// reload never mixes two catalogs or a catalog with another's keys.
    pub async fn dispatch(&self, request: &GenerationRequest, caller: &RequestContext) -> Result<GeneratedMedia> {
        let snapshot = self.context.catalog.snapshot();
        let resolved = snapshot.catalog.resolve(&request.model)?;
        let provider = resolved.provider;
        let model: &ModelDescriptor = &resolved.model;

        self.context
            .access
            .check(caller.client_identity.as_ref(), &provider.id)?;

        let credential = Self::credential(&snapshot, provider, caller)?;
        let adapter = self.context.adapters.get(provider.kind)?;

        let outbound = build_outbound(adapter, request, model, provider, &credential)?;

        tracing::debug!(
            provider = %provider.id,
            model = %model.id,
            url = %outbound.url,
            "sending generation request"
        );

        let reply = outbound
            .send(&self.context.http)
            .await
            .inspect_err(|e| tracing::error!(provider = %provider.id, error = %e, "generation request failed"))?
            .error_for_status()
            .inspect_err(|e| {
                tracing::warn!(provider = %provider.id, model = %model.id, error = %e, "provider rejected request");
            })?;

        let reply_context = ReplyContext {
            request,
            model,
            provider,
            fetcher: MediaFetcher::new(&self.context.http, adapter, provider, &credential),
        };

        let media = adapter.process_response(reply, &reply_context).await?;

        tracing::info!(
            provider = %provider.id,
            model = %model.id,
            items = media.items.len(),
            "generation complete"
        );

        Ok(media)
    }

    /// Caller-supplied key first, then the configured one
    fn credential(
        snapshot: &CatalogSnapshot,
        provider: &ProviderDescriptor,
        caller: &RequestContext,
    ) -> Result<SecretString> {
        if let Some(key) = &caller.api_key {
            return Ok(key.clone());
        }

        snapshot
            .credentials
            .credential(&provider.id)
            .ok_or_else(|| MediaError::MissingCredential(provider.id.clone()))
    }
}

/// Build the outbound call for a resolved model
///
/// Checks the request against the model before asking the adapter for a
/// body, so unsupported inputs never reach the provider.
pub fn build_outbound(
    adapter: &dyn ProviderAdapter,
    request: &GenerationRequest,
    model: &ModelDescriptor,
    provider: &ProviderDescriptor,
    credential: &SecretString,
) -> Result<OutboundRequest> {
    request.validate()?;

    if request.reference_image.is_some() && !model.features.edit {
        return Err(MediaError::RequestBuildFailure(format!(
            "model '{}' does not accept a reference_image",
            model.full_name()
        )));
    }

    let url = adapter.endpoint_url(request, model, provider)?;
    let body = adapter.build_body(request, model, provider)?;

    let mut headers = HeaderMap::new();
    adapter.add_auth_headers(&mut headers, credential, provider)?;

    Ok(OutboundRequest {
        method: Method::POST,
        url,
        headers,
        body,
    })
}
