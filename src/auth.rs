use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Stored pilot credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Credentials {
    api_key: String,
}

/// On-disk store for the pilot's crew-center API key.
///
/// The key survives restarts so the pilot logs in once; logout removes the
/// file entirely.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Store at the default location (see [`credentials_path`])
    pub fn default_location() -> Self {
        Self::new(credentials_path())
    }

    /// Persist the API key (atomic: write to .tmp then rename)
    pub fn save(&self, api_key: &str) -> Result<()> {
        let credentials = Credentials {
            api_key: api_key.to_string(),
        };
        let contents =
            toml::to_string_pretty(&credentials).context("Failed to serialize credentials")?;
        let tmp_path = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp_path, &contents)
            .with_context(|| format!("Failed to write {:?}", tmp_path))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to rename {:?} to {:?}", tmp_path, self.path))?;
        info!("API key saved to {:?}", self.path);
        Ok(())
    }

    /// Load the stored API key, `None` when the pilot never logged in
    pub fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {:?}", self.path))?;
        let credentials: Credentials = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {:?}", self.path))?;
        Ok(Some(credentials.api_key))
    }

    /// Remove the stored key (logout)
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove {:?}", self.path))?;
            info!("API key removed");
        }
        Ok(())
    }
}

/// Resolve the credentials file path.
///
/// Priority:
/// 1. `VACARS_CREDENTIALS` env var
/// 2. `./vacars-credentials.toml`
pub fn credentials_path() -> PathBuf {
    if let Ok(path) = std::env::var("VACARS_CREDENTIALS") {
        return PathBuf::from(path);
    }
    PathBuf::from("./vacars-credentials.toml")
}
