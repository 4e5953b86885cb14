//! Long-running poller.
//!
//! Spawns one coordinator task per contract and prints readings as they
//! change. When the API rejects the session, a new token can be pasted on
//! standard input; it is validated against the configured contracts, saved,
//! and handed to every coordinator.

use aigues_core::StatisticSummary;
use aigues_fetch::reauthenticate;
use aigues_store::{
    spawn_coordinator, ContractCoordinator, ContractRegistry, CoordinatorHandle, JsonStatistics,
    MeterReading, ReauthRequest, SettingsStore, StatisticsSink,
};
use anyhow::Result;
use chrono::NaiveDateTime;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::{client_for, emit, open_settings, statistics_path};
use crate::Cli;

/// Runs every configured contract until interrupted.
pub async fn run(cli: &Cli) -> Result<()> {
    let store = open_settings(cli).await?;
    let settings = store.get().await;
    settings.validate()?;

    let registry = ContractRegistry::new();
    let sink: Arc<dyn StatisticsSink> = Arc::new(JsonStatistics::new(statistics_path(cli)));
    log_stored_series(sink.as_ref()).await;

    let (reauth_tx, mut reauth_rx) = mpsc::channel(settings.contracts.len().max(1));
    let mut handles = Vec::with_capacity(settings.contracts.len());

    let mut client = client_for(&settings)?;
    if client.is_token_expired() {
        // A captcha-protected login fails here; the coordinators then ask
        // for a token.
        if let Err(e) = client.login(None, None, None).await {
            warn!(error = %e, "Login failed, waiting for a token");
        }
    }
    let token = client.token().map(str::to_string);

    for contract in &settings.contracts {
        let mut client = client_for(&settings)?;
        if let Some(token) = &token {
            client.set_token(token.clone());
        }
        let coordinator = ContractCoordinator::new(client, contract, registry.clone(), sink.clone())
            .with_scan_interval(settings.scan_interval());
        handles.push(spawn_coordinator(coordinator, reauth_tx.clone()));
    }
    drop(reauth_tx);

    info!(
        contracts = handles.len(),
        every = ?settings.scan_interval(),
        "Polling started"
    );

    let mut tokens = spawn_token_reader();
    let mut changes = registry.subscribe();
    let mut printed: HashMap<String, Option<NaiveDateTime>> = HashMap::new();
    let mut awaiting: HashSet<String> = HashSet::new();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Interrupted, stopping coordinators");
                break;
            }
            Some(request) = reauth_rx.recv() => {
                let account = store.get().await.masked_identifier();
                on_reauth_request(cli, &account, &request, &mut awaiting);
            }
            Some(line) = tokens.recv() => {
                let token = line.trim();
                if token.is_empty() {
                    continue;
                }
                if apply_token(&store, &handles, token).await {
                    awaiting.clear();
                }
            }
            Ok(()) = changes.changed() => {
                print_new_readings(cli, &registry, &mut printed).await?;
            }
        }
    }

    for handle in handles {
        handle.shutdown().await;
    }
    Ok(())
}

async fn log_stored_series(sink: &dyn StatisticsSink) {
    match sink.list_statistic_ids().await {
        Ok(series) => {
            for StatisticSummary {
                statistic_id,
                points,
                last_start,
                ..
            } in series
            {
                info!(series = %statistic_id, points, last = ?last_start, "Stored statistics");
            }
        }
        Err(e) => warn!(error = %e, "Could not read stored statistics"),
    }
}

/// Forwards non-empty lines of standard input.
fn spawn_token_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Could not read standard input");
                    break;
                }
            }
        }
    });
    rx
}

fn on_reauth_request(
    cli: &Cli,
    account: &str,
    request: &ReauthRequest,
    awaiting: &mut HashSet<String>,
) {
    let first = awaiting.is_empty();
    awaiting.insert(request.contract.clone());
    if first && !cli.quiet {
        eprintln!(
            "Session for account {account} rejected on {} ({}).\nPaste a new token and press Enter.",
            request.contract, request.reason
        );
    }
}

/// Validates `token` against the configured contracts, saves it and hands it
/// to every coordinator. Returns true on success.
async fn apply_token(store: &SettingsStore, handles: &[CoordinatorHandle], token: &str) -> bool {
    let settings = store.get().await;
    let mut client = match client_for(&settings) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Could not create API client");
            return false;
        }
    };

    if let Err(e) = reauthenticate(&mut client, token, &settings.contracts).await {
        error!(error = %e, "Token rejected");
        return false;
    }

    let token = token.to_string();
    store.update(|s| s.token = Some(token.clone())).await;
    if let Err(e) = store.save().await {
        warn!(error = %e, "Could not save the new token");
    }

    for handle in handles {
        if !handle.set_token(token.clone()).await {
            warn!(contract = %handle.contract(), "Coordinator is gone");
        }
    }
    info!("Token updated");
    true
}

async fn print_new_readings(
    cli: &Cli,
    registry: &ContractRegistry,
    printed: &mut HashMap<String, Option<NaiveDateTime>>,
) -> Result<()> {
    for contract in registry.contracts().await {
        let Some(reading) = registry.reading(&contract).await else {
            continue;
        };
        if reading.value.is_none() || printed.get(&contract) == Some(&reading.last_measure) {
            continue;
        }
        printed.insert(contract, reading.last_measure);
        print_reading(cli, &reading)?;
    }
    Ok(())
}

fn print_reading(cli: &Cli, reading: &MeterReading) -> Result<()> {
    emit(cli, reading, |f| f.format_reading(reading))
}
