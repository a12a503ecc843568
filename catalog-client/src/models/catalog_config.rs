use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Response of `GET v1/config`. The server merges `defaults` under and `overrides` over the
/// client's own properties.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub defaults: HashMap<String, String>,
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

impl CatalogConfig {
    /// The path prefix every table and namespace route lives under, if the catalog uses one.
    pub fn prefix(&self) -> Option<&str> {
        self.overrides
            .get("prefix")
            .or_else(|| self.defaults.get("prefix"))
            .map(String::as_str)
            .filter(|prefix| !prefix.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_prefers_overrides() {
        let config: CatalogConfig = serde_json::from_str(
            r#"{"defaults":{"prefix":"default-prefix"},"overrides":{"prefix":"0192c0ad-warehouse"}}"#,
        )
        .unwrap();
        assert_eq!(config.prefix(), Some("0192c0ad-warehouse"));
    }

    #[test]
    fn test_prefix_missing_or_empty() {
        let config: CatalogConfig = serde_json::from_str(r#"{"defaults":{}}"#).unwrap();
        assert_eq!(config.prefix(), None);

        let config: CatalogConfig =
            serde_json::from_str(r#"{"overrides":{"prefix":""}}"#).unwrap();
        assert_eq!(config.prefix(), None);
    }
}
