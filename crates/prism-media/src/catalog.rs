use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;
use prism_config::{GeometryStyle, MediaKind, ModelConfig, ProviderConfig, ProviderType};
use url::Url;

use crate::adapter::AdapterRegistry;
use crate::auth::AuthScheme;
use crate::credentials::CredentialSource;
use crate::error::{MediaError, Result};
use crate::poller::PollConfig;
use crate::types::Size;

/// What a model accepts and produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelFeatures {
    pub geometry: GeometryStyle,
    pub edit: bool,
    pub media: MediaKind,
    pub queue: bool,
}

impl Default for ModelFeatures {
    fn default() -> Self {
        Self {
            geometry: GeometryStyle::Dimensions,
            edit: false,
            media: MediaKind::Image,
            queue: false,
        }
    }
}

/// One model offered by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub id: String,
    pub provider_id: String,
    /// Endpoint that replaces the adapter's computed one
    pub endpoint: Option<Url>,
    pub features: ModelFeatures,
    pub default_size: Option<Size>,
}

impl ModelDescriptor {
    /// Name callers use to select this model, "provider/model"
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.provider_id, self.id)
    }

    fn from_config(provider_id: &str, config: &ModelConfig) -> Self {
        Self {
            id: config.id.clone(),
            provider_id: provider_id.to_string(),
            endpoint: config.endpoint.clone(),
            features: ModelFeatures {
                geometry: config.geometry,
                edit: config.edit,
                media: config.media,
                queue: config.queue,
            },
            default_size: config
                .default_width
                .zip(config.default_height)
                .map(|(width, height)| Size::new(width, height)),
        }
    }
}

/// One configured provider
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    /// Unique id, also the model-name prefix
    pub id: String,
    pub name: String,
    pub kind: ProviderType,
    pub base_url: Url,
    pub queue_base_url: Option<Url>,
    pub auth: AuthScheme,
    pub polling: PollConfig,
    pub models: Vec<ModelDescriptor>,
    /// Accept model ids missing from `models`
    pub allow_unlisted_models: bool,
    /// Features assumed for unlisted models
    pub unlisted_features: ModelFeatures,
}

impl ProviderDescriptor {
    fn from_config(id: &str, config: &ProviderConfig, adapters: &AdapterRegistry) -> Result<Self> {
        let adapter = adapters.get(config.provider_type)?;
        let defaults = adapter.defaults();

        let base_url = config
            .base_url
            .clone()
            .or(defaults.base_url)
            .ok_or_else(|| MediaError::ConfigError(format!("provider '{id}' has no base_url")))?;

        let auth = defaults
            .auth
            .with_overrides(config.auth_header.as_deref(), config.auth_prefix.as_deref())?;

        let mut polling = defaults.polling;
        if let Some(cfg) = &config.polling {
            if let Some(interval) = cfg
                .interval()
                .map_err(|e| MediaError::ConfigError(format!("provider '{id}': {e}")))?
            {
                polling.interval = interval;
            }
            if let Some(max_attempts) = cfg.max_attempts {
                polling.max_attempts = max_attempts;
            }
        }

        let mut seen = HashSet::new();
        let mut models = Vec::with_capacity(config.models.len());
        for model in &config.models {
            if !seen.insert(model.id.as_str()) {
                return Err(MediaError::ConfigError(format!(
                    "provider '{id}' lists model '{}' twice",
                    model.id
                )));
            }
            models.push(ModelDescriptor::from_config(id, model));
        }

        Ok(Self {
            id: id.to_string(),
            name: config.name.clone().unwrap_or_else(|| id.to_string()),
            kind: config.provider_type,
            base_url,
            queue_base_url: config.queue_base_url.clone(),
            auth,
            polling,
            models,
            allow_unlisted_models: config.allow_unlisted_models.unwrap_or(false),
            unlisted_features: defaults.unlisted_features,
        })
    }

    fn unlisted(&self, model_id: &str) -> ModelDescriptor {
        ModelDescriptor {
            id: model_id.to_string(),
            provider_id: self.id.clone(),
            endpoint: None,
            features: self.unlisted_features,
            default_size: None,
        }
    }
}

/// Provider and model a request name resolved to
#[derive(Debug, Clone)]
pub struct Resolved<'a> {
    pub provider: &'a ProviderDescriptor,
    pub model: Cow<'a, ModelDescriptor>,
}

/// Immutable set of providers and their models
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    providers: Vec<ProviderDescriptor>,
}

impl Catalog {
    /// Build from configuration records
    ///
    /// Every record must name a registered adapter.
    pub fn from_config(providers: &IndexMap<String, ProviderConfig>, adapters: &AdapterRegistry) -> Result<Self> {
        let providers = providers
            .iter()
            .map(|(id, config)| {
                if id.is_empty() || id.starts_with('/') || id.ends_with('/') {
                    return Err(MediaError::ConfigError(format!("invalid provider id '{id}'")));
                }
                ProviderDescriptor::from_config(id, config, adapters)
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            providers = providers.len(),
            models = providers.iter().map(|p| p.models.len()).sum::<usize>(),
            "catalog built"
        );

        Ok(Self { providers })
    }

    pub fn providers(&self) -> &[ProviderDescriptor] {
        &self.providers
    }

    pub fn provider(&self, id: &str) -> Option<&ProviderDescriptor> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// Resolve a "provider/model" name
    ///
    /// The provider is the one whose id is the longest `"<id>/"` prefix of
    /// `name`. The rest must match a model id, or the whole name must match
    /// a model recorded under its full name. A miss is an error unless the
    /// provider accepts unlisted models.
    pub fn resolve(&self, name: &str) -> Result<Resolved<'_>> {
        let provider = self
            .providers
            .iter()
            .filter(|p| {
                name.strip_prefix(p.id.as_str())
                    .is_some_and(|rest| rest.len() > 1 && rest.starts_with('/'))
            })
            .max_by_key(|p| p.id.len())
            .ok_or_else(|| MediaError::UnknownProvider(name.to_string()))?;

        let model_id = &name[provider.id.len() + 1..];

        if let Some(model) = provider
            .models
            .iter()
            .find(|m| m.id == model_id)
            .or_else(|| provider.models.iter().find(|m| m.id == name))
        {
            return Ok(Resolved {
                provider,
                model: Cow::Borrowed(model),
            });
        }

        if provider.allow_unlisted_models {
            tracing::debug!(provider = %provider.id, model = %model_id, "resolving unlisted model");
            return Ok(Resolved {
                provider,
                model: Cow::Owned(provider.unlisted(model_id)),
            });
        }

        Err(MediaError::UnknownModel {
            provider: provider.id.clone(),
            model: model_id.to_string(),
        })
    }
}

/// Catalog paired with the keys configured alongside it
///
/// Both come from one configuration and are only ever swapped together.
#[derive(Clone)]
pub struct CatalogSnapshot {
    pub catalog: Catalog,
    pub credentials: Arc<dyn CredentialSource>,
}

impl fmt::Debug for CatalogSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogSnapshot")
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

/// Shared, atomically replaceable catalog and keys
///
/// Readers take a snapshot and keep it for the whole request, so a reload
/// never changes the catalog or its keys under an in-flight dispatch.
#[derive(Debug, Clone)]
pub struct CatalogHandle {
    current: Arc<RwLock<Arc<CatalogSnapshot>>>,
}

impl CatalogHandle {
    pub fn new(catalog: Catalog, credentials: Arc<dyn CredentialSource>) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(CatalogSnapshot { catalog, credentials }))),
        }
    }

    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, catalog: Catalog, credentials: Arc<dyn CredentialSource>) {
        let next = Arc::new(CatalogSnapshot { catalog, credentials });
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next;
    }
}
