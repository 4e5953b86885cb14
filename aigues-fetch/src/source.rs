//! Consumption source trait.
//!
//! The polling coordinator only needs a narrow slice of the client: token
//! state and the consumption endpoints. Keeping it behind a trait lets the
//! coordinator be driven by a scripted source in tests.

use aigues_core::{ConsumptionRecord, Frequency};
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::client::AiguesClient;
use crate::error::ApiError;

/// A source of meter readings for one account.
#[async_trait]
pub trait ConsumptionSource: Send + Sync {
    /// Returns true if there is no usable session token.
    fn is_token_expired(&self) -> bool;

    /// Installs a new session token.
    fn set_token(&mut self, token: String);

    /// Fetches readings between two dates, both inclusive.
    async fn consumptions(
        &mut self,
        date_from: NaiveDate,
        date_to: NaiveDate,
        contract: &str,
        frequency: Frequency,
    ) -> Result<Vec<ConsumptionRecord>, ApiError>;

    /// Fetches daily readings for the week containing `date`.
    async fn consumptions_week(
        &mut self,
        date: NaiveDate,
        contract: &str,
    ) -> Result<Vec<ConsumptionRecord>, ApiError>;
}

#[async_trait]
impl ConsumptionSource for AiguesClient {
    fn is_token_expired(&self) -> bool {
        AiguesClient::is_token_expired(self)
    }

    fn set_token(&mut self, token: String) {
        AiguesClient::set_token(self, token);
    }

    async fn consumptions(
        &mut self,
        date_from: NaiveDate,
        date_to: NaiveDate,
        contract: &str,
        frequency: Frequency,
    ) -> Result<Vec<ConsumptionRecord>, ApiError> {
        AiguesClient::consumptions(self, date_from, date_to, Some(contract), None, frequency).await
    }

    async fn consumptions_week(
        &mut self,
        date: NaiveDate,
        contract: &str,
    ) -> Result<Vec<ConsumptionRecord>, ApiError> {
        AiguesClient::consumptions_week(self, date, Some(contract), None).await
    }
}
