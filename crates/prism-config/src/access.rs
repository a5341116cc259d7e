use indexmap::IndexMap;
use serde::Deserialize;

/// Principal that matches every caller in a grant table
pub const ANY_PRINCIPAL: &str = "*";

/// Provider access grants
///
/// Callers are identified by the `client_header` value, optionally
/// widened by the `group_header` value. A caller reaches a provider only
/// when a grant for its id, its group, or `*` lists that provider (or `*`).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessConfig {
    /// Grant every caller access to every provider
    #[serde(default)]
    pub open: bool,
    /// Header carrying the client id
    #[serde(default = "default_client_header")]
    pub client_header: String,
    /// Header carrying the client group
    #[serde(default)]
    pub group_header: Option<String>,
    /// Principal (client id, group or `*`) to provider ids
    #[serde(default)]
    pub grants: IndexMap<String, Vec<String>>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            open: false,
            client_header: default_client_header(),
            group_header: None,
            grants: IndexMap::new(),
        }
    }
}

fn default_client_header() -> String {
    "x-client-id".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_closed() {
        let config: AccessConfig = toml::from_str("").unwrap();
        assert!(!config.open);
        assert!(config.grants.is_empty());
        assert_eq!(config.client_header, "x-client-id");
    }

    #[test]
    fn deserialize_grants() {
        let config: AccessConfig = toml::from_str(indoc::indoc! {r#"
            group_header = "x-client-group"

            [grants]
            "*" = ["openai"]
            studio = ["fal", "bfl"]
        "#})
        .unwrap();

        assert_eq!(config.group_header.as_deref(), Some("x-client-group"));
        assert_eq!(config.grants[ANY_PRINCIPAL], vec!["openai"]);
        assert_eq!(config.grants["studio"], vec!["fal", "bfl"]);
    }
}
