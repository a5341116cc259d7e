//! TOML configuration builder for integration tests

use std::fmt::Write;

use prism_config::Config;

/// Builder for constructing test configurations
///
/// Starts with the builtin catalog disabled and access closed, so every
/// test names exactly the providers and grants it relies on.
pub struct ConfigBuilder {
    server: String,
    access: String,
    grants: String,
    providers: String,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            server: String::new(),
            access: String::new(),
            grants: String::new(),
            providers: String::new(),
        }
    }

    /// Add a provider record with the given models
    ///
    /// `api_key` of `None` leaves the provider without a configured key.
    pub fn with_provider(mut self, id: &str, kind: &str, base_url: &str, api_key: Option<&str>, models: &[&str]) -> Self {
        writeln!(self.providers, "[providers.\"{id}\"]").unwrap();
        writeln!(self.providers, "type = \"{kind}\"").unwrap();
        writeln!(self.providers, "base_url = \"{base_url}\"").unwrap();
        if let Some(key) = api_key {
            writeln!(self.providers, "api_key = \"{key}\"").unwrap();
        }
        writeln!(self.providers, "[providers.\"{id}\".polling]").unwrap();
        writeln!(self.providers, "interval = \"5ms\"").unwrap();
        writeln!(self.providers, "max_attempts = 5").unwrap();
        for model in models {
            writeln!(self.providers, "[[providers.\"{id}\".models]]").unwrap();
            writeln!(self.providers, "id = \"{model}\"").unwrap();
        }
        self
    }

    /// Add raw TOML to the provider section
    pub fn with_raw(mut self, raw: &str) -> Self {
        self.providers.push_str(raw);
        self.providers.push('\n');
        self
    }

    /// Grant a principal access to the listed providers
    pub fn with_grant(mut self, principal: &str, providers: &[&str]) -> Self {
        let list: Vec<String> = providers.iter().map(|p| format!("\"{p}\"")).collect();
        writeln!(self.grants, "\"{principal}\" = [{}]", list.join(", ")).unwrap();
        self
    }

    /// Admit every caller to every provider
    pub fn open_access(mut self) -> Self {
        self.access.push_str("open = true\n");
        self
    }

    pub fn without_health(mut self) -> Self {
        self.server.push_str("[server.health]\nenabled = false\n");
        self
    }

    pub fn toml(&self) -> String {
        format!(
            "{}[catalog]\nbuiltin = false\n\n[access]\n{}\n[access.grants]\n{}\n{}",
            self.server, self.access, self.grants, self.providers
        )
    }

    /// Build the final config
    pub fn build(self) -> Config {
        Config::from_toml(&self.toml()).unwrap()
    }
}
