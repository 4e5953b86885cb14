//! CLI command implementations.

pub mod account;
pub mod consumptions;
pub mod refresh;
pub mod run;
pub mod setup;
pub mod stats;

use aigues_fetch::AiguesClient;
use aigues_store::{default_settings_path, default_statistics_path, Settings, SettingsStore};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, OutputFormat};

/// Settings file selected on the command line.
pub fn settings_path(cli: &Cli) -> PathBuf {
    cli.config.clone().unwrap_or_else(default_settings_path)
}

/// Statistics file selected on the command line.
pub fn statistics_path(cli: &Cli) -> PathBuf {
    cli.stats_file.clone().unwrap_or_else(default_statistics_path)
}

/// Loads the settings store.
pub async fn open_settings(cli: &Cli) -> Result<SettingsStore> {
    let store = SettingsStore::load(settings_path(cli)).await?;
    Ok(store)
}

/// Builds a client for the account, installing the stored token if any.
pub fn client_for(settings: &Settings) -> Result<AiguesClient> {
    let credentials = settings.credentials();
    let mut client = match &settings.api_host {
        Some(host) => AiguesClient::with_base_url(credentials, host),
        None => AiguesClient::new(credentials),
    }
    .context("Failed to create API client")?;

    if let Some(token) = &settings.token {
        client.set_token(token.clone());
    }
    Ok(client)
}

/// Builds a client with a usable session, logging in if the stored token
/// is missing or expired.
pub async fn authenticated_client(settings: &Settings) -> Result<AiguesClient> {
    let mut client = client_for(settings)?;
    if client.is_token_expired() {
        info!("Stored token unusable, logging in");
        client.login(None, None, None).await?;
    } else {
        debug!("Using stored token");
    }
    Ok(client)
}

/// Prints a value as JSON or, in text mode, through `text`.
pub fn emit<T, F>(cli: &Cli, value: &T, text: F) -> Result<()>
where
    T: Serialize + ?Sized,
    F: FnOnce(&TextFormatter) -> String,
{
    match cli.format {
        OutputFormat::Json => {
            println!("{}", JsonFormatter::new(cli.pretty).format(value)?);
        }
        OutputFormat::Text => {
            let rendered = text(&TextFormatter::new(!cli.no_color));
            if !rendered.is_empty() {
                println!("{rendered}");
            }
        }
    }
    Ok(())
}
