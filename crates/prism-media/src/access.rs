use std::collections::HashMap;

use prism_config::{ANY_PRINCIPAL, AccessConfig};
use prism_core::ClientIdentity;

use crate::error::{MediaError, Result};

/// Provider grants per caller principal
///
/// Fails closed: a caller without a matching grant is denied, and so is
/// a request with no identity unless a `*` grant covers it.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    open: bool,
    grants: HashMap<String, Vec<String>>,
}

impl AccessPolicy {
    pub fn from_config(config: &AccessConfig) -> Self {
        Self {
            open: config.open,
            grants: config
                .grants
                .iter()
                .map(|(principal, providers)| (principal.clone(), providers.clone()))
                .collect(),
        }
    }

    /// Policy that admits every caller to every provider
    pub fn open() -> Self {
        Self {
            open: true,
            grants: HashMap::new(),
        }
    }

    pub fn check(&self, identity: Option<&ClientIdentity>, provider_id: &str) -> Result<()> {
        if self.open {
            return Ok(());
        }

        let principals = std::iter::once(ANY_PRINCIPAL)
            .chain(identity.map(|id| id.client_id.as_str()))
            .chain(identity.and_then(|id| id.group.as_deref()));

        let granted = principals
            .filter_map(|principal| self.grants.get(principal))
            .flatten()
            .any(|provider| provider == provider_id || provider == ANY_PRINCIPAL);

        if granted {
            return Ok(());
        }

        tracing::debug!(
            client_id = identity.map_or("<anonymous>", |id| id.client_id.as_str()),
            provider = %provider_id,
            "provider access denied"
        );

        Err(MediaError::AuthorizationDenied {
            provider: provider_id.to_string(),
        })
    }
}
