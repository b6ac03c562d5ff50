use std::fmt;

use anyhow::Context;

use crate::ids::parse_database_id;

pub const DEFAULT_SOURCE_DATABASE_ID: &str = "373f0ed0-4d5b-4e8a-9e90-9bc8d7b5a16a";
pub const DEFAULT_DESTINATION_DATABASE_ID: &str = "9e04bcc9-471d-4372-9e0f-5f0a9111e87b";
pub const DEFAULT_API_BASE: &str = "https://api.notion.com/v1";

#[derive(Clone)]
pub struct RunConfig {
    pub api_key: String,
    pub source_database_id: String,
    pub destination_database_id: String,
    pub api_base: String,
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("api_key", &"<redacted>")
            .field("source_database_id", &self.source_database_id)
            .field("destination_database_id", &self.destination_database_id)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl RunConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_key = non_empty("API_KEY")
            .context("API_KEY must be set to a Notion integration secret")?;
        let source = non_empty("SOURCE_DATABASE_ID")
            .unwrap_or_else(|| DEFAULT_SOURCE_DATABASE_ID.to_string());
        let destination = non_empty("DESTINATION_DATABASE_ID")
            .unwrap_or_else(|| DEFAULT_DESTINATION_DATABASE_ID.to_string());
        let api_base =
            non_empty("NOTION_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let config = RunConfig {
            api_key: api_key.trim().to_string(),
            source_database_id: parse_database_id(&source)
                .with_context(|| format!("SOURCE_DATABASE_ID is not a Notion id: {source}"))?,
            destination_database_id: parse_database_id(&destination).with_context(|| {
                format!("DESTINATION_DATABASE_ID is not a Notion id: {destination}")
            })?,
            api_base: api_base.trim_end_matches('/').to_string(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.source_database_id != self.destination_database_id,
            "SOURCE_DATABASE_ID and DESTINATION_DATABASE_ID must differ, both are {}",
            self.source_database_id
        );
        anyhow::ensure!(
            self.api_base.starts_with("http://") || self.api_base.starts_with("https://"),
            "NOTION_API_BASE must be an http(s) URL, got {}",
            self.api_base
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<RunConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RunConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_key_is_set() {
        let config = load(&[("API_KEY", "secret_abc")]).unwrap();
        assert_eq!(config.api_key, "secret_abc");
        assert_eq!(config.source_database_id, DEFAULT_SOURCE_DATABASE_ID);
        assert_eq!(config.destination_database_id, DEFAULT_DESTINATION_DATABASE_ID);
        assert_eq!(config.api_base, DEFAULT_API_BASE);
    }

    #[test]
    fn missing_key_is_rejected() {
        let err = load(&[]).unwrap_err();
        assert!(err.to_string().contains("API_KEY"));
        let err = load(&[("API_KEY", "  ")]).unwrap_err();
        assert!(err.to_string().contains("API_KEY"));
    }

    #[test]
    fn ids_are_normalised() {
        let config = load(&[
            ("API_KEY", "secret_abc"),
            ("SOURCE_DATABASE_ID", "0123456789abcdef0123456789abcdef"),
            (
                "DESTINATION_DATABASE_ID",
                "https://www.notion.so/team/fedcba9876543210fedcba9876543210?v=1",
            ),
        ])
        .unwrap();
        assert_eq!(config.source_database_id, "01234567-89ab-cdef-0123-456789abcdef");
        assert_eq!(
            config.destination_database_id,
            "fedcba98-7654-3210-fedc-ba9876543210"
        );
    }

    #[test]
    fn rejects_same_database_twice() {
        let err = load(&[
            ("API_KEY", "secret_abc"),
            ("DESTINATION_DATABASE_ID", DEFAULT_SOURCE_DATABASE_ID),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn rejects_bad_id() {
        let err = load(&[("API_KEY", "secret_abc"), ("SOURCE_DATABASE_ID", "nope")])
            .unwrap_err();
        assert!(err.to_string().contains("SOURCE_DATABASE_ID"));
    }

    #[test]
    fn debug_hides_key() {
        let config = load(&[("API_KEY", "secret_abc")]).unwrap();
        assert!(!format!("{config:?}").contains("secret_abc"));
    }
}
