//! Stored statistics commands.

use aigues_store::{
    ContractCoordinator, ContractRegistry, JsonStatistics, Settings, SettingsStore, StatisticsSink,
};
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::sync::Arc;

use super::{client_for, emit, settings_path, statistics_path};
use crate::Cli;

/// Arguments for `aigues clear`.
#[derive(Args)]
pub struct ClearArgs {
    /// Contract whose series are deleted.
    #[arg(long, short)]
    pub contract: String,
}

#[derive(Serialize)]
struct ClearOutput {
    contract: String,
    cleared: usize,
}

/// Lists stored series.
pub async fn run_stats(cli: &Cli) -> Result<()> {
    let sink = JsonStatistics::new(statistics_path(cli));
    let summaries = sink.list_statistic_ids().await?;
    emit(cli, &summaries, |f| f.format_stats(&summaries))
}

/// Deletes every stored series of a contract.
pub async fn run_clear(args: &ClearArgs, cli: &Cli) -> Result<()> {
    // Works offline; missing settings are fine.
    let settings = match SettingsStore::load(settings_path(cli)).await {
        Ok(store) => store.get().await,
        Err(_) => Settings::new("", ""),
    };

    let sink: Arc<dyn StatisticsSink> = Arc::new(JsonStatistics::new(statistics_path(cli)));
    let coordinator = ContractCoordinator::new(
        client_for(&settings)?,
        &args.contract,
        ContractRegistry::new(),
        sink,
    );

    let cleared = coordinator.clear_all_stored_data().await?;
    let output = ClearOutput {
        contract: coordinator.contract().to_string(),
        cleared,
    };
    emit(cli, &output, |f| {
        f.format_success(&format!(
            "Deleted {} series of {}",
            output.cleared, output.contract
        ))
    })
}
