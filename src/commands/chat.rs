use anyhow::{Context, Result};
use tracing::info;

use crate::api_client::ApiClient;
use crate::auth::CredentialStore;
use crate::config::AppConfig;

/// Send a message to the crew chat and echo the latest traffic back
pub async fn handle_chat(config: &AppConfig, store: &CredentialStore, text: &str) -> Result<()> {
    let api_key = store
        .load()?
        .context("No stored API key; run `vacars login <api-key>` first")?;
    let api = ApiClient::new(&config.api_base_url, &api_key);

    api.chat_send(text).await?;
    info!("Message sent");

    let messages = api.chat_list().await.unwrap_or_default();
    for message in messages.iter().skip(messages.len().saturating_sub(10)) {
        let tag = if message.is_admin { " [admin]" } else { "" };
        info!("{}{}: {}", message.user, tag, message.text);
    }
    Ok(())
}
