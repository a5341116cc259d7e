#![allow(clippy::must_use_candidate)]

pub mod access;
pub mod catalog;
mod env;
pub mod logging;
mod loader;
pub mod providers;
pub mod server;

use indexmap::IndexMap;
use serde::Deserialize;

pub use access::*;
pub use catalog::*;
pub use logging::*;
pub use providers::*;
pub use server::*;

/// Top-level Prism configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Log output configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Per-caller provider grants
    #[serde(default)]
    pub access: AccessConfig,
    /// Builtin catalog toggle
    #[serde(default)]
    pub catalog: CatalogConfig,
    /// Provider records keyed by provider id
    #[serde(default)]
    pub providers: IndexMap<String, ProviderConfig>,
}
