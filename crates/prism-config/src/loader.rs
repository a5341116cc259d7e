use std::collections::HashSet;
use std::path::Path;

use crate::{ANY_PRINCIPAL, Config, catalog};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, merges the
    /// builtin catalog, then validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Build configuration from raw TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, catalog merging, or
    /// validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let mut config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        if config.catalog.builtin {
            let user = std::mem::take(&mut config.providers);
            config.providers = catalog::merge_providers(catalog::builtin_providers()?, user);
        }

        config.validate()?;

        tracing::debug!(providers = config.providers.len(), "configuration loaded");

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if no provider is configured, a provider record is
    /// malformed, or an access grant names an unknown provider
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.providers.is_empty() {
            anyhow::bail!("at least one provider must be configured");
        }

        self.validate_providers()?;
        self.validate_access()?;

        Ok(())
    }

    fn validate_providers(&self) -> anyhow::Result<()> {
        for (id, provider) in &self.providers {
            if id.is_empty() || id.starts_with('/') || id.ends_with('/') {
                anyhow::bail!("provider id '{id}' must be non-empty and must not start or end with '/'");
            }

            if let Some(ref polling) = provider.polling {
                polling.interval().map_err(|e| anyhow::anyhow!("provider '{id}': {e}"))?;

                if polling.max_attempts == Some(0) {
                    anyhow::bail!("provider '{id}': polling.max_attempts must be greater than 0");
                }
            }

            let mut seen = HashSet::new();
            for model in &provider.models {
                if model.id.is_empty() {
                    anyhow::bail!("provider '{id}' has a model with an empty id");
                }
                if !seen.insert(model.id.as_str()) {
                    anyhow::bail!("provider '{id}' lists model '{}' more than once", model.id);
                }
            }
        }

        Ok(())
    }

    fn validate_access(&self) -> anyhow::Result<()> {
        for (principal, providers) in &self.access.grants {
            for provider in providers {
                if provider != ANY_PRINCIPAL && !self.providers.contains_key(provider) {
                    anyhow::bail!("access grant for '{principal}' names unknown provider '{provider}'");
                }
            }
        }

        Ok(())
    }
}
