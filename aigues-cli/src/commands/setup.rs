//! Setup and token commands.

use aigues_core::is_valid_username;
use aigues_fetch::{reauthenticate, validate_credentials, ApiError};
use aigues_store::{Settings, SettingsStore, StoreError, DEFAULT_SCAN_INTERVAL_SECS};
use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;

use super::{client_for, emit, open_settings, settings_path};
use crate::Cli;

/// Arguments for `aigues setup`.
#[derive(Args)]
pub struct SetupArgs {
    /// NIF/NIE used to log in.
    #[arg(long, short)]
    pub username: String,

    /// Account password.
    #[arg(long, short)]
    pub password: String,

    /// Company identifier, if the account acts for a company.
    #[arg(long)]
    pub company: Option<String>,

    /// Session token copied from the customer area, skipping the login.
    #[arg(long)]
    pub token: Option<String>,

    /// Polling interval in seconds.
    #[arg(long, default_value_t = DEFAULT_SCAN_INTERVAL_SECS)]
    pub scan_interval: u64,

    /// API base URL override.
    #[arg(long, hide = true)]
    pub api_host: Option<String>,
}

/// Arguments for `aigues token`.
#[derive(Args)]
pub struct TokenArgs {
    /// New session token.
    pub token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SetupOutput<'a> {
    account: String,
    contracts: &'a [String],
    settings_path: String,
}

/// Validates the account and writes the settings file.
pub async fn run_setup(args: &SetupArgs, cli: &Cli) -> Result<()> {
    if !is_valid_username(&args.username) {
        bail!(StoreError::Config(format!(
            "invalid username '{}': expected a NIF/NIE",
            args.username
        )));
    }

    let mut settings = Settings::new(&args.username, &args.password);
    settings.company_identification = args.company.clone().filter(|c| !c.is_empty());
    settings.scan_interval_secs = args.scan_interval;
    settings.api_host.clone_from(&args.api_host);

    let mut client = client_for(&settings)?;
    let contracts = validate_credentials(&mut client, args.token.as_deref())
        .await
        .map_err(captcha_hint)?;

    settings.contracts = contracts;
    settings.token = client.token().map(str::to_string);
    settings.validate()?;

    let store = SettingsStore::new(settings_path(cli), settings);
    store.save().await.context("Failed to save settings")?;
    let settings = store.get().await;

    let output = SetupOutput {
        account: settings.masked_identifier(),
        contracts: &settings.contracts,
        settings_path: store.path().display().to_string(),
    };
    emit(cli, &output, |f| {
        format!(
            "{}\nContracts: {}\nSettings:  {}",
            f.format_success(&format!("Account {} configured", output.account)),
            output.contracts.join(", "),
            output.settings_path,
        )
    })
}

/// Replaces the stored token after checking it grants the same contracts.
pub async fn run_token(args: &TokenArgs, cli: &Cli) -> Result<()> {
    let store = open_settings(cli).await?;
    let settings = store.get().await;

    let mut client = client_for(&settings)?;
    let contracts = reauthenticate(&mut client, &args.token, &settings.contracts).await?;

    let token = args.token.trim().to_string();
    store
        .update(|s| {
            s.token = Some(token);
            s.contracts = contracts;
        })
        .await;
    let settings = store.get().await;
    settings.validate()?;
    store.save().await.context("Failed to save settings")?;

    let output = SetupOutput {
        account: settings.masked_identifier(),
        contracts: &settings.contracts,
        settings_path: store.path().display().to_string(),
    };
    emit(cli, &output, |f| {
        f.format_success(&format!("Token updated for {}", output.account))
    })
}

/// Points the user at the token command when the login wants a captcha.
fn captcha_hint(err: ApiError) -> anyhow::Error {
    match err {
        ApiError::CaptchaRequired => anyhow::Error::new(err).context(
            "Login requires a captcha: log in on the website and pass the token with --token",
        ),
        other => other.into(),
    }
}

