//! Credential validation for setup and reauthentication.

use tracing::{info, instrument, warn};

use crate::client::AiguesClient;
use crate::error::{ApiError, RECAPTCHA_MARKER};

/// Validates credentials (or a supplied token) and returns the contract ids
/// available to the account.
///
/// With a token, it is installed and rejected if already expired. Without
/// one, a login is performed; a failure asking for a captcha becomes
/// [`ApiError::CaptchaRequired`] and any other login failure
/// [`ApiError::Unauthenticated`]. An account with no contracts is treated
/// as invalid authentication.
#[instrument(skip(client, token), fields(user = %client.credentials().username))]
pub async fn validate_credentials(
    client: &mut AiguesClient,
    token: Option<&str>,
) -> Result<Vec<String>, ApiError> {
    match token.map(str::trim).filter(|t| !t.is_empty()) {
        Some(token) => {
            client.set_token(token);
            if client.is_token_expired() {
                warn!("Supplied token is expired");
                return Err(ApiError::TokenExpired);
            }
        }
        None => client.login(None, None, None).await.map_err(|e| match e {
            ApiError::CaptchaRequired => ApiError::CaptchaRequired,
            e if e.to_string().contains(RECAPTCHA_MARKER) => ApiError::CaptchaRequired,
            ApiError::Unauthenticated(msg) => ApiError::Unauthenticated(msg),
            e => ApiError::Unauthenticated(e.to_string()),
        })?,
    }

    let contracts = client.contract_ids().await?;
    if contracts.is_empty() {
        return Err(ApiError::Unauthenticated(
            "no contracts available for this account".to_string(),
        ));
    }

    info!(count = contracts.len(), "Credentials validated");
    Ok(contracts)
}

/// Validates a new token and checks it grants the same contracts as before.
///
/// Order does not matter; the sets must be equal.
#[instrument(skip(client, token, expected))]
pub async fn reauthenticate(
    client: &mut AiguesClient,
    token: &str,
    expected: &[String],
) -> Result<Vec<String>, ApiError> {
    let found = validate_credentials(client, Some(token)).await?;

    if !same_contracts(expected, &found) {
        warn!("Token grants a different set of contracts");
        return Err(ApiError::ContractMismatch {
            expected: expected.to_vec(),
            found,
        });
    }

    Ok(found)
}

fn same_contracts(a: &[String], b: &[String]) -> bool {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort();
    b.sort();
    a == b
}
