//! Account types: credentials, contracts and profile.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

// ============================================================================
// Credentials
// ============================================================================

/// Login credentials for the customer area.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// NIF/NIE of the account holder.
    pub username: String,
    /// Account password.
    pub password: String,
    /// Company identifier, for accounts managed on behalf of a company.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_identification: Option<String>,
}

impl Credentials {
    /// Creates credentials without a company identifier.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            company_identification: None,
        }
    }

    /// Sets the company identifier. Empty strings are treated as absent.
    #[must_use]
    pub fn with_company(mut self, company: Option<String>) -> Self {
        self.company_identification = company.filter(|c| !c.is_empty());
        self
    }

    /// The `clientId` the API expects: the company identifier when set,
    /// otherwise the given user.
    pub fn client_id<'a>(&'a self, user: &'a str) -> &'a str {
        self.company_identification.as_deref().unwrap_or(user)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("company_identification", &self.company_identification)
            .finish()
    }
}

// ============================================================================
// Contract Status
// ============================================================================

/// Assignation status used to filter contract listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractStatus {
    /// Contract is assigned to the user.
    Assigned,
    /// Assignation is pending.
    Pending,
}

impl ContractStatus {
    /// Statuses requested when none are given.
    pub const DEFAULT: [ContractStatus; 2] = [ContractStatus::Assigned, ContractStatus::Pending];

    /// Query parameter value.
    pub fn as_str(self) -> &'static str {
        match self {
            ContractStatus::Assigned => "ASSIGNED",
            ContractStatus::Pending => "PENDING",
        }
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ASSIGNED" => Ok(ContractStatus::Assigned),
            "PENDING" => Ok(ContractStatus::Pending),
            other => Err(CoreError::InvalidData(format!(
                "unknown contract status: {other}"
            ))),
        }
    }
}

// ============================================================================
// Contract
// ============================================================================

/// A contract record as returned by the contracts endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    /// Contract details. Required.
    #[serde(rename = "contractDetail")]
    pub detail: ContractDetail,

    /// Remaining fields, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Contract {
    /// The contract identifier.
    pub fn number(&self) -> &str {
        &self.detail.contract_number
    }
}

/// Contract detail block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractDetail {
    /// Alphanumeric contract identifier.
    pub contract_number: String,

    /// Remaining fields, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Profile
// ============================================================================

/// Account profile payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// User data block. The API always sends it for a valid session.
    #[serde(default)]
    pub user_data: Option<Value>,

    /// Remaining fields, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Profile {
    /// Returns true if the user data block is present and truthy: not null,
    /// `false`, zero or empty.
    pub fn has_user_data(&self) -> bool {
        match &self.user_data {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            Some(Value::Object(map)) => !map.is_empty(),
            Some(Value::Array(list)) => !list.is_empty(),
            Some(Value::String(s)) => !s.is_empty(),
        }
    }
}
