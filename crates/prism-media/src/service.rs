use std::sync::Arc;

use prism_config::{Config, GeometryStyle, MediaKind};
use prism_core::RequestContext;
use serde::Serialize;

use crate::access::AccessPolicy;
use crate::adapter::AdapterRegistry;
use crate::catalog::{Catalog, CatalogHandle};
use crate::credentials::ConfiguredCredentials;
use crate::dispatcher::{Dispatcher, MediaContext};
use crate::error::Result;
use crate::http_client::build_http_client;
use crate::types::{GeneratedMedia, GenerationRequest};

/// Media generation service behind the HTTP endpoints
pub struct MediaService {
    dispatcher: Dispatcher,
}

impl MediaService {
    pub fn from_config(config: &Config) -> Result<Self> {
        let adapters = AdapterRegistry::builtin();
        let catalog = Catalog::from_config(&config.providers, &adapters)?;
        let credentials = Arc::new(ConfiguredCredentials::from_config(&config.providers));

        if config.access.open {
            tracing::warn!("provider access is open to every caller");
        }

        tracing::debug!(
            "Media service initialized with {} provider(s)",
            catalog.providers().len()
        );

        let context = MediaContext {
            catalog: CatalogHandle::new(catalog, credentials),
            adapters,
            http: build_http_client()?,
            access: AccessPolicy::from_config(&config.access),
        };

        Ok(Self {
            dispatcher: Dispatcher::new(context),
        })
    }

    /// Swap in the catalog and keys of a reloaded configuration
    ///
    /// Catalog and keys change in one swap. Requests already in flight
    /// finish against the snapshot they started with. Grants are not
    /// reloaded.
    pub fn reload(&self, config: &Config) -> Result<()> {
        let context = self.dispatcher.context();
        let catalog = Catalog::from_config(&config.providers, &context.adapters)?;
        let credentials = Arc::new(ConfiguredCredentials::from_config(&config.providers));
        let providers = catalog.providers().len();

        context.catalog.replace(catalog, credentials);

        tracing::info!(providers, "catalog reloaded");
        Ok(())
    }

    pub async fn generate(&self, request: &GenerationRequest, context: &RequestContext) -> Result<GeneratedMedia> {
        self.dispatcher.dispatch(request, context).await
    }

    /// Catalog listing
    pub fn models(&self) -> ModelList {
        let snapshot = self.dispatcher.context().catalog.snapshot();

        let data = snapshot
            .catalog
            .providers()
            .iter()
            .flat_map(|provider| {
                provider.models.iter().map(|model| ModelEntry {
                    id: model.full_name(),
                    provider: provider.id.clone(),
                    media: match model.features.media {
                        MediaKind::Image => "image",
                        MediaKind::Video => "video",
                    },
                    geometry: match model.features.geometry {
                        GeometryStyle::AspectRatio => "aspect_ratio",
                        GeometryStyle::Dimensions => "dimensions",
                    },
                    edit: model.features.edit,
                })
            })
            .collect();

        ModelList { data }
    }
}

/// Response body of the model listing
#[derive(Debug, Serialize)]
pub struct ModelList {
    pub data: Vec<ModelEntry>,
}

#[derive(Debug, Serialize)]
pub struct ModelEntry {
    /// Full model name callers send
    pub id: String,
    pub provider: String,
    pub media: &'static str,
    pub geometry: &'static str,
    pub edit: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(raw: &str) -> Config {
        Config::from_toml(raw).unwrap()
    }

    #[test]
    fn lists_full_names() {
        let service = MediaService::from_config(&config(indoc::indoc! {r#"
            [catalog]
            builtin = false

            [providers.bfl]
            type = "bfl"

            [[providers.bfl.models]]
            id = "flux-pro-1.1"

            [[providers.bfl.models]]
            id = "flux-kontext-pro"
            geometry = "aspect_ratio"
            edit = true
        "#}))
        .unwrap();

        let models = service.models();
        let ids: Vec<_> = models.data.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["bfl/flux-pro-1.1", "bfl/flux-kontext-pro"]);
        assert!(models.data[1].edit);
        assert_eq!(models.data[1].geometry, "aspect_ratio");
    }

    #[test]
    fn reload_replaces_catalog() {
        let service = MediaService::from_config(&config(indoc::indoc! {r#"
            [catalog]
            builtin = false

            [providers.bfl]
            type = "bfl"

            [[providers.bfl.models]]
            id = "flux-pro-1.1"
        "#}))
        .unwrap();

        service
            .reload(&config(indoc::indoc! {r#"
                [catalog]
                builtin = false

                [providers.fal]
                type = "fal"

                [[providers.fal.models]]
                id = "fal-ai/flux/dev"
            "#}))
            .unwrap();

        let ids: Vec<_> = service.models().data.into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["fal/fal-ai/flux/dev".to_string()]);
    }
}
