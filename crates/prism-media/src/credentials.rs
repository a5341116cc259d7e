use std::collections::HashMap;

use indexmap::IndexMap;
use prism_config::ProviderConfig;
use secrecy::SecretString;

/// Supplies the configured API key for a provider
///
/// Storage is up to the implementation; the dispatcher only asks once per
/// request and never caches the answer.
pub trait CredentialSource: Send + Sync {
    fn credential(&self, provider_id: &str) -> Option<SecretString>;
}

/// Keys taken from the `api_key` of each provider record
///
/// Fixed once built; a reload builds a new set next to its catalog.
#[derive(Debug, Default)]
pub struct ConfiguredCredentials {
    keys: HashMap<String, SecretString>,
}

impl ConfiguredCredentials {
    pub fn from_config(providers: &IndexMap<String, ProviderConfig>) -> Self {
        let keys = providers
            .iter()
            .filter_map(|(id, config)| config.api_key.clone().map(|key| (id.clone(), key)))
            .collect();

        Self { keys }
    }
}

impl CredentialSource for ConfiguredCredentials {
    fn credential(&self, provider_id: &str) -> Option<SecretString> {
        self.keys.get(provider_id).cloned()
    }
}
