//! Account commands: contracts, profile and invoices.

use aigues_core::{ContractStatus, InvoiceMode};
use aigues_fetch::DEFAULT_INVOICE_MONTHS;
use anyhow::Result;
use clap::Args;

use super::{authenticated_client, emit, open_settings};
use crate::Cli;

/// Arguments for `aigues contracts`.
#[derive(Args)]
pub struct ContractsArgs {
    /// Assignation status to include (repeatable; assigned and pending by default).
    #[arg(long = "status", short)]
    pub statuses: Vec<ContractStatus>,
}

/// Arguments for `aigues invoices`.
#[derive(Args)]
pub struct InvoicesArgs {
    /// Contract to query (the only contract of the account by default).
    #[arg(long, short)]
    pub contract: Option<String>,

    /// How many months back to list.
    #[arg(long, default_value_t = DEFAULT_INVOICE_MONTHS)]
    pub months: u32,

    /// Only list unpaid invoices.
    #[arg(long)]
    pub debt: bool,
}

/// Lists the account's contracts.
pub async fn run_contracts(args: &ContractsArgs, cli: &Cli) -> Result<()> {
    let settings = open_settings(cli).await?.get().await;
    let mut client = authenticated_client(&settings).await?;

    let contracts = client.contracts(None, &args.statuses).await?;
    emit(cli, &contracts, |f| f.format_contracts(&contracts))
}

/// Shows the account profile.
pub async fn run_profile(cli: &Cli) -> Result<()> {
    let settings = open_settings(cli).await?.get().await;
    let mut client = authenticated_client(&settings).await?;

    let profile = client.profile(None).await?;
    emit(cli, &profile, |f| f.format_profile(&profile))
}

/// Lists invoices of a contract.
pub async fn run_invoices(args: &InvoicesArgs, cli: &Cli) -> Result<()> {
    let settings = open_settings(cli).await?.get().await;
    let mut client = authenticated_client(&settings).await?;

    let invoices = if args.debt {
        client.invoices_debt(args.contract.as_deref(), None).await?
    } else {
        client
            .invoices(args.contract.as_deref(), None, args.months, InvoiceMode::All)
            .await?
    };
    emit(cli, &invoices, |f| f.format_invoices(&invoices))
}
