// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # Aigues Core
//!
//! Core types and models for the Aigues water consumption integration.
//!
//! This crate provides the foundational abstractions used across all other
//! Aigues crates, including:
//!
//! - Domain models (credentials, contracts, consumption records)
//! - Statistic series types consumed by the statistics sinks
//! - Username validation
//! - Error types
//!
//! ## Key Types
//!
//! ### Account
//! - [`Credentials`] - Username, password and optional company identifier
//! - [`Contract`] - One metered water connection
//! - [`ContractStatus`] - Assignation status filter for contract listings
//! - [`Profile`] - Account profile payload
//!
//! ### Consumption
//! - [`ConsumptionRecord`] - A cumulative reading at a point in time
//! - [`Frequency`] - Hourly or daily granularity
//! - [`InvoiceMode`] - Invoice listing mode
//!
//! ### Statistics
//! - [`StatisticMetadata`] - Series description (unit, sum/mean flags)
//! - [`StatisticPoint`] - Hour-aligned point with state and sum
//! - [`StatisticSummary`] - Catalog entry for a stored series

pub mod error;
pub mod models;
pub mod validation;

// Re-export error types
pub use error::CoreError;

// Re-export all model types
pub use models::{
    // Account types
    Contract,
    ContractDetail,
    ContractStatus,
    Credentials,
    Profile,
    // Consumption types
    ConsumptionRecord,
    Frequency,
    InvoiceMode,
    parse_consumptions,
    parse_datetime,
    // Statistics
    StatisticMetadata,
    StatisticPoint,
    StatisticSummary,
    UNIT_CUBIC_METERS,
    round_volume,
    truncate_to_hour,
};

pub use validation::{is_valid_username, mask_identifier};
