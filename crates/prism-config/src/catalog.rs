use indexmap::IndexMap;
use serde::Deserialize;

use crate::ProviderConfig;

/// Catalog records shipped with the binary
const BUILTIN_CATALOG: &str = include_str!("../catalog/builtin.toml");

/// Catalog source configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogConfig {
    /// Load the builtin provider and model records
    #[serde(default = "default_builtin")]
    pub builtin: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self { builtin: true }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_builtin() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    providers: IndexMap<String, ProviderConfig>,
}

/// Parse the builtin catalog
///
/// # Errors
///
/// Returns an error if the embedded catalog is malformed
pub fn builtin_providers() -> anyhow::Result<IndexMap<String, ProviderConfig>> {
    let file: CatalogFile =
        toml::from_str(BUILTIN_CATALOG).map_err(|e| anyhow::anyhow!("failed to parse builtin catalog: {e}"))?;
    Ok(file.providers)
}

/// Combine builtin records with user records
///
/// User records overlay builtin ones with the same id; new ids are
/// appended in user order after the builtin set.
pub fn merge_providers(
    builtin: IndexMap<String, ProviderConfig>,
    user: IndexMap<String, ProviderConfig>,
) -> IndexMap<String, ProviderConfig> {
    let mut merged = builtin;

    for (id, record) in user {
        let record = match merged.shift_remove(&id) {
            Some(base) => base.overlay(record),
            None => record,
        };
        merged.insert(id, record);
    }

    merged
}
