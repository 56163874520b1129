use anyhow::Result;
use tracing::info;

use crate::api_client::ApiClient;
use crate::auth::CredentialStore;
use crate::config::AppConfig;

/// Verify an API key against the crew center and store it on success
pub async fn handle_login(config: &AppConfig, store: &CredentialStore, api_key: &str) -> Result<()> {
    let api = ApiClient::new(&config.api_base_url, api_key);
    let pilot = api.verify_key().await?;
    store.save(api_key)?;
    info!("Logged in as {} (pilot id {})", pilot.display_name(), pilot.id);
    Ok(())
}

/// Drop the stored API key
pub fn handle_logout(store: &CredentialStore) -> Result<()> {
    store.clear()?;
    info!("Logged out");
    Ok(())
}
