//! One polling cycle per contract.

use aigues_fetch::AiguesClient;
use aigues_store::{
    ContractCoordinator, ContractRegistry, CoordinatorError, JsonStatistics, SettingsStore,
    StatisticsSink, StoreError,
};
use anyhow::{bail, Context, Result};
use clap::Args;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{authenticated_client, client_for, emit, open_settings, statistics_path};
use crate::output::RefreshOutput;
use crate::{Cli, OutputFormat};

/// Arguments for `aigues refresh`.
#[derive(Args)]
pub struct RefreshArgs {
    /// Only refresh this contract.
    #[arg(long, short)]
    pub contract: Option<String>,
}

/// Runs one cycle for each configured contract and prints the readings.
pub async fn run(args: &RefreshArgs, cli: &Cli) -> Result<()> {
    let store = open_settings(cli).await?;
    let settings = store.get().await;

    let contracts: Vec<String> = match &args.contract {
        Some(contract) => vec![contract.to_uppercase()],
        None => settings.contracts.clone(),
    };

    if contracts.is_empty() {
        bail!(StoreError::Config("no contracts configured".to_string()));
    }

    let registry = ContractRegistry::new();
    let sink: Arc<dyn StatisticsSink> = Arc::new(JsonStatistics::new(statistics_path(cli)));
    let clients = session_clients(&store, contracts.len()).await?;

    let text_mode = cli.format == OutputFormat::Text;
    let mut outputs = Vec::with_capacity(contracts.len());
    let mut auth_error = None;

    for (contract, client) in contracts.iter().zip(clients) {
        let mut coordinator =
            ContractCoordinator::new(client, contract, registry.clone(), sink.clone());
        registry.register(coordinator.contract()).await;

        match coordinator.update().await {
            Ok(outcome) => {
                let output =
                    RefreshOutput::new(coordinator.contract(), &outcome, coordinator.reading().await);
                if text_mode {
                    emit(cli, &output, |f| {
                        let mut text = f.format_outcome(&output.contract, &outcome);
                        if let Some(reading) = &output.reading {
                            text.push_str("\n  ");
                            text.push_str(&f.format_reading(reading));
                        }
                        text
                    })?;
                }
                outputs.push(output);
            }
            Err(e) => {
                let CoordinatorError::AuthFailed { contract, reason } = &e;
                if text_mode {
                    emit(cli, &(), |f| f.format_auth_required(contract, reason))?;
                }
                auth_error = Some(e);
            }
        }
    }

    if !text_mode {
        emit(cli, &outputs, |_| String::new())?;
    }

    match auth_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// One client per contract sharing a single session. A token obtained by a
/// fresh login is written back to the settings.
async fn session_clients(store: &SettingsStore, count: usize) -> Result<Vec<AiguesClient>> {
    let settings = store.get().await;
    let first = authenticated_client(&settings).await?;

    let token = first.token().map(str::to_string);
    if token.is_some() && token != settings.token {
        debug!("Saving the session token");
        store.update(|s| s.token.clone_from(&token)).await;
        if let Err(e) = store.save().await {
            warn!(error = %e, "Could not save the session token");
        }
    }

    let mut clients = Vec::with_capacity(count);
    clients.push(first);
    for _ in 1..count {
        let mut client = client_for(&settings).context("Failed to create API client")?;
        if let Some(token) = &token {
            client.set_token(token.clone());
        }
        clients.push(client);
    }
    Ok(clients)
}
