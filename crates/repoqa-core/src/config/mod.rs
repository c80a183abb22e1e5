mod env;
mod types;


pub use types::*;

use std::path::Path;

use anyhow::Context;

use crate::vault::{Secret, VaultProvider};

pub const OPENAI_API_KEY: &str = "REPOQA_OPENAI_API_KEY";
pub const GITHUB_TOKEN: &str = "REPOQA_GITHUB_TOKEN";
pub const QDRANT_API_KEY: &str = "REPOQA_QDRANT_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn is_blank(secret: Option<&Secret>) -> bool {
    secret.is_none_or(Secret::is_blank)
}

/// Look up `key`, then its unprefixed form (`REPOQA_GITHUB_TOKEN` -> `GITHUB_TOKEN`).
async fn lookup_secret(vault: &dyn VaultProvider, key: &str) -> anyhow::Result<Option<Secret>> {
    if let Some(val) = vault.get_secret(key).await? {
        return Ok(Some(Secret::new(val)));
    }
    let Some(plain) = key.strip_prefix("REPOQA_") else {
        return Ok(None);
    };
    let val = vault.get_secret(plain).await?;
    if val.is_some() {
        tracing::debug!(key = plain, "secret resolved from unprefixed name");
    }
    Ok(val.map(Secret::new))
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str::<Self>(&content)
                .with_context(|| format!("failed to parse config file {}", path.display()))?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Resolve credentials through the vault.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault backend fails.
    pub async fn resolve_secrets(&mut self, vault: &dyn VaultProvider) -> anyhow::Result<()> {
        if let Some(val) = lookup_secret(vault, OPENAI_API_KEY).await? {
            self.secrets.openai_api_key = Some(val);
        }
        if let Some(val) = lookup_secret(vault, GITHUB_TOKEN).await? {
            self.secrets.github_token = Some(val);
        }
        if let Some(val) = lookup_secret(vault, QDRANT_API_KEY).await? {
            self.secrets.qdrant_api_key = Some(val);
        }
        Ok(())
    }

    /// Check that every setting the pipeline needs is present and consistent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] naming every absent setting at once, or
    /// [`ConfigError::Invalid`] for the first inconsistent value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        if is_blank(self.secrets.openai_api_key.as_ref()) {
            missing.push(OPENAI_API_KEY);
        }
        if is_blank(self.secrets.github_token.as_ref()) {
            missing.push(GITHUB_TOKEN);
        }
        if self.qdrant.url.trim().is_empty() {
            missing.push("qdrant.url");
        }
        if is_blank(self.secrets.qdrant_api_key.as_ref()) {
            missing.push(QDRANT_API_KEY);
        }
        if self.qdrant.collection.trim().is_empty() {
            missing.push("qdrant.collection");
        }
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let index = &self.index;
        if index.chunk_size == 0 {
            return Err(ConfigError::Invalid("index.chunk_size must be positive".into()));
        }
        if index.chunk_overlap >= index.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "index.chunk_overlap ({}) must be smaller than index.chunk_size ({})",
                index.chunk_overlap, index.chunk_size
            )));
        }
        if index.batch_size == 0 {
            return Err(ConfigError::Invalid("index.batch_size must be positive".into()));
        }
        if self.qdrant.vector_size == 0 {
            return Err(ConfigError::Invalid("qdrant.vector_size must be positive".into()));
        }
        if self.http.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "http.request_timeout_secs must be positive".into(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Invalid("retrieval.top_k must be positive".into()));
        }
        Ok(())
    }
}
