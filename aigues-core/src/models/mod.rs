//! Domain models for Aigues.
//!
//! ## Submodules
//!
//! - [`account`] - Credentials, contracts and profile payloads
//! - [`consumption`] - Consumption records and request parameters
//! - [`statistics`] - Statistic series metadata and points

mod account;
mod consumption;
mod statistics;

// Re-export everything at the models level
pub use account::{Contract, ContractDetail, ContractStatus, Credentials, Profile};
pub use consumption::{
    parse_consumptions, parse_datetime, ConsumptionRecord, Frequency, InvoiceMode,
};
pub use statistics::{
    round_volume, truncate_to_hour, StatisticMetadata, StatisticPoint, StatisticSummary,
    UNIT_CUBIC_METERS,
};
