// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # Aigues Fetch
//!
//! HTTP client for the Aigues de Barcelona customer-area API.
//!
//! - [`client::AiguesClient`] - Login, profile, contracts, invoices and
//!   consumption queries
//! - [`token`] - Session token claims and expiry
//! - [`auth`] - Credential validation for setup and reauthentication
//! - [`source::ConsumptionSource`] - The slice of the client the polling
//!   coordinator depends on
//!
//! ## Example
//!
//! ```ignore
//! use aigues_core::Credentials;
//! use aigues_fetch::AiguesClient;
//!
//! let mut client = AiguesClient::new(Credentials::new("12345678Z", "secret"))?;
//! client.login(None, None, None).await?;
//! let week = client.consumptions_week(today, None, None).await?;
//! ```

pub mod auth;
pub mod client;
pub mod dates;
pub mod error;
pub mod source;
pub mod token;

// Re-export key types at crate root

pub use auth::{reauthenticate, validate_credentials};
pub use client::{AiguesClient, ResponseBody, API_HOST, DEFAULT_INVOICE_MONTHS, TOKEN_COOKIE};
pub use dates::{month_bounds, week_bounds};
pub use error::{ApiError, RECAPTCHA_MARKER, TOKEN_REVOKED_MARKER};
pub use source::ConsumptionSource;
pub use token::{decode_token_claims, TokenClaims};
