//! Consumption commands.

use aigues_core::{ConsumptionRecord, Frequency};
use aigues_fetch::AiguesClient;
use anyhow::{bail, Result};
use chrono::{Local, NaiveDate};
use clap::Args;

use super::{authenticated_client, emit, open_settings};
use crate::Cli;

/// Arguments for `aigues consumptions`.
#[derive(Args)]
pub struct RangeArgs {
    /// First day (YYYY-MM-DD).
    #[arg(long)]
    pub from: NaiveDate,

    /// Last day, inclusive (YYYY-MM-DD).
    #[arg(long)]
    pub to: NaiveDate,

    /// Contract to query (the only contract of the account by default).
    #[arg(long, short)]
    pub contract: Option<String>,

    /// Reading granularity (hourly or daily).
    #[arg(long, default_value = "hourly")]
    pub frequency: Frequency,
}

/// Arguments for `aigues week` and `aigues month`.
#[derive(Args)]
pub struct DateArgs {
    /// Any day of the period (YYYY-MM-DD, today by default).
    #[arg(long, short)]
    pub date: Option<NaiveDate>,

    /// Contract to query (the only contract of the account by default).
    #[arg(long, short)]
    pub contract: Option<String>,
}

impl DateArgs {
    fn date(&self) -> NaiveDate {
        self.date.unwrap_or_else(|| Local::now().date_naive())
    }
}

/// Fetches readings for a date range.
pub async fn run_range(args: &RangeArgs, cli: &Cli) -> Result<()> {
    if args.from > args.to {
        bail!("--from ({}) is after --to ({})", args.from, args.to);
    }

    let mut client = client(cli).await?;
    let records = client
        .consumptions(args.from, args.to, args.contract.as_deref(), None, args.frequency)
        .await?;
    print_records(cli, &records)
}

/// Fetches daily readings for the week containing a date.
pub async fn run_week(args: &DateArgs, cli: &Cli) -> Result<()> {
    let mut client = client(cli).await?;
    let records = client
        .consumptions_week(args.date(), args.contract.as_deref(), None)
        .await?;
    print_records(cli, &records)
}

/// Fetches daily readings for the month containing a date.
pub async fn run_month(args: &DateArgs, cli: &Cli) -> Result<()> {
    let mut client = client(cli).await?;
    let records = client
        .consumptions_month(args.date(), args.contract.as_deref(), None)
        .await?;
    print_records(cli, &records)
}

async fn client(cli: &Cli) -> Result<AiguesClient> {
    let settings = open_settings(cli).await?.get().await;
    let mut client = authenticated_client(&settings).await?;
    // Prefer the configured contract when the account has exactly one.
    if let [contract] = settings.contracts.as_slice() {
        client = client.with_contract(contract.clone());
    }
    Ok(client)
}

fn print_records(cli: &Cli, records: &[ConsumptionRecord]) -> Result<()> {
    emit(cli, records, |f| f.format_consumptions(records))
}
