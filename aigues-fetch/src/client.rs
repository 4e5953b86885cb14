//! Aigues de Barcelona API client.
//!
//! Every call goes through [`AiguesClient::query`], which builds the URL,
//! merges the product headers with per-call overrides, attaches the session
//! cookie, keeps the last response body and maps HTTP statuses onto
//! [`ApiError`]. Nothing is retried here.

use aigues_core::{
    ConsumptionRecord, Contract, ContractStatus, Credentials, Frequency, InvoiceMode, Profile,
};
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, COOKIE, USER_AGENT};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use url::Url;

use crate::dates::{month_bounds, week_bounds};
use crate::error::{ApiError, RECAPTCHA_MARKER};
use crate::token::{decode_token_claims, TokenClaims};

// ============================================================================
// Constants
// ============================================================================

/// Production API host.
pub const API_HOST: &str = "api.aiguesdebarcelona.cat";

/// Cookie carrying the session token.
pub const TOKEN_COOKIE: &str = "ofexTokenJwt";

/// Request timeout in seconds.
const TIMEOUT_SECS: u64 = 60;

/// User agent string.
const CLIENT_USER_AGENT: &str = concat!("aigues/", env!("CARGO_PKG_VERSION"));

/// Subscription key for the data endpoints.
const SUBSCRIPTION_KEY: &str = "3cca6060fee14bffa3450b19941bd954";

/// Subscription key for the login product (token and profile).
const LOGIN_SUBSCRIPTION_KEY: &str = "6a98b8b8c7b243cda682a43f09e6588b;product=portlet-login-ofex";

const SUBSCRIPTION_HEADER: &str = "ocp-apim-subscription-key";
const TRACE_HEADER: &str = "ocp-apim-trace";

/// Language requested on every call.
const LANG: &str = "ca";

/// Date format for consumption ranges.
const DATE_FORMAT: &str = "%d-%m-%Y";

/// Invoice window used when none is given.
pub const DEFAULT_INVOICE_MONTHS: u32 = 36;

const LOGIN_PATH: &str = "/ofex-login-api/auth/getToken";
const PROFILE_PATH: &str = "/ofex-login-api/auth/getProfile";
const CONTRACTS_PATH: &str = "/ofex-contracts-api/contracts";
const INVOICES_PATH: &str = "/ofex-invoices-api/invoices";
const CONSUMPTIONS_PATH: &str = "/ofex-water-consumptions-api/meter/consumptions";

// ============================================================================
// Response Body
// ============================================================================

/// Body of the last response, kept for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// Parsed JSON. A single-element list is collapsed to its element.
    Json(Value),
    /// Raw text when the body is empty or not JSON.
    Text(String),
}

impl ResponseBody {
    fn parse(text: String) -> Self {
        if text.is_empty() {
            return ResponseBody::Text(text);
        }
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Array(mut items)) if items.len() == 1 => ResponseBody::Json(items.remove(0)),
            Ok(value) => ResponseBody::Json(value),
            Err(_) => {
                debug!("Response is not JSON");
                ResponseBody::Text(text)
            }
        }
    }

    /// Returns the JSON value, if any.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            ResponseBody::Text(_) => None,
        }
    }

    /// Returns true if the body mentions `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        match self {
            ResponseBody::Json(value) => value.to_string().contains(needle),
            ResponseBody::Text(text) => text.contains(needle),
        }
    }

    fn into_json(self) -> Result<Value, ApiError> {
        match self {
            ResponseBody::Json(value) => Ok(value),
            ResponseBody::Text(text) => Err(ApiError::InvalidResponse(format!(
                "expected JSON, got: {}",
                truncate(&text, 200)
            ))),
        }
    }
}

/// Maps a status code onto the error taxonomy.
fn classify_status(status: StatusCode, message: &str) -> Result<(), ApiError> {
    let message = message.to_string();
    match status {
        StatusCode::SERVICE_UNAVAILABLE => Err(ApiError::ServiceUnavailable),
        StatusCode::INTERNAL_SERVER_ERROR => Err(ApiError::Server(message)),
        StatusCode::NOT_FOUND => Err(ApiError::NotFound(message)),
        StatusCode::UNAUTHORIZED => Err(ApiError::Denied(message)),
        StatusCode::BAD_REQUEST => Err(ApiError::BadRequest(message)),
        StatusCode::TOO_MANY_REQUESTS => Err(ApiError::RateLimited(message)),
        s if s.is_success() => Ok(()),
        s => Err(ApiError::UnexpectedStatus {
            status: s.as_u16(),
            message,
        }),
    }
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Pulls the `data` field out of a response envelope.
fn take_data<T: DeserializeOwned>(mut body: Value) -> Result<Option<T>, ApiError> {
    match body.get_mut("data").map(Value::take) {
        None | Some(Value::Null) => Ok(None),
        Some(data) => Ok(Some(serde_json::from_value(data)?)),
    }
}

// ============================================================================
// API Client
// ============================================================================

/// Client for the customer-area API.
///
/// Holds the credentials and the session token for one account. Methods
/// take `&mut self` because every call records the last response.
#[derive(Debug)]
pub struct AiguesClient {
    http: Client,
    base_url: Url,
    credentials: Credentials,
    contract: Option<String>,
    token: Option<String>,
    last_response: Option<ResponseBody>,
}

impl AiguesClient {
    /// Creates a client against the production host.
    pub fn new(credentials: Credentials) -> Result<Self, ApiError> {
        Self::with_base_url(credentials, &format!("https://{API_HOST}"))
    }

    /// Creates a client against a custom base URL. A path in the base, as
    /// behind a reverse proxy, prefixes every endpoint.
    pub fn with_base_url(credentials: Credentials, base_url: &str) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()?;

        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            http,
            base_url,
            credentials,
            contract: None,
            token: None,
            last_response: None,
        })
    }

    /// Sets the default contract for consumption calls.
    #[must_use]
    pub fn with_contract(mut self, contract: impl Into<String>) -> Self {
        self.contract = Some(contract.into());
        self
    }

    /// The configured credentials.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// The last response body, successful or not.
    pub fn last_response(&self) -> Option<&ResponseBody> {
        self.last_response.as_ref()
    }

    // ========================================================================
    // Token Handling
    // ========================================================================

    /// Installs an externally obtained token, bypassing login.
    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into().trim().to_string());
        debug!("Session token installed");
    }

    /// The installed token.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Decodes the claims of the installed token.
    pub fn token_claims(&self) -> Result<TokenClaims, ApiError> {
        let token = self.token.as_deref().ok_or(ApiError::TokenMissing)?;
        decode_token_claims(token)
    }

    /// Returns true if there is no usable token or it has expired.
    pub fn is_token_expired(&self) -> bool {
        self.is_token_expired_at(Utc::now())
    }

    /// [`Self::is_token_expired`] against a given clock.
    pub fn is_token_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.token_claims() {
            Ok(claims) => claims.is_expired_at(now),
            Err(e) => {
                debug!(error = %e, "Token unusable, treating as expired");
                true
            }
        }
    }

    /// The user a call acts for: the given one, else the token subject.
    fn token_user(&self, user: Option<&str>) -> Result<String, ApiError> {
        if let Some(user) = user {
            return Ok(user.to_string());
        }
        self.token_claims()?
            .subject
            .ok_or_else(|| ApiError::MissingField("token subject".to_string()))
    }

    // ========================================================================
    // Request Plumbing
    // ========================================================================

    fn build_url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, ApiError> {
        // Endpoint paths are absolute; joining them as-is would drop the
        // base path.
        let mut url = self.base_url.join(path.trim_start_matches('/'))?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    fn build_headers(&self, overrides: &[(&'static str, &'static str)]) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(SUBSCRIPTION_HEADER, HeaderValue::from_static(SUBSCRIPTION_KEY));
        headers.insert(TRACE_HEADER, HeaderValue::from_static("false"));
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=UTF-8"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

        for (name, value) in overrides {
            headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }

        if let Some(token) = &self.token {
            let cookie = HeaderValue::from_str(&format!("{TOKEN_COOKIE}={token}"))
                .map_err(|e| ApiError::TokenDecode(format!("token not usable in a cookie: {e}")))?;
            headers.insert(COOKIE, cookie);
        }

        Ok(headers)
    }

    /// Performs one exchange and classifies the outcome.
    #[instrument(skip(self, query, body, headers))]
    async fn query(
        &mut self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        headers: &[(&'static str, &'static str)],
    ) -> Result<ResponseBody, ApiError> {
        let url = self.build_url(path, query)?;
        let headers = self.build_headers(headers)?;

        let mut request = self.http.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            error!(error = %e, "Request failed");
            ApiError::from(e)
        })?;

        let status = response.status();
        debug!(status = %status, "Query done");

        let text = response.text().await?;
        let parsed = ResponseBody::parse(text.clone());
        self.last_response = Some(parsed.clone());

        classify_status(status, &text)?;
        Ok(parsed)
    }

    // ========================================================================
    // Authentication
    // ========================================================================

    /// Logs in with the configured (or given) credentials.
    ///
    /// A 200 response carrying an error message or no access token is
    /// [`ApiError::Unauthenticated`]; one that asks for a captcha is
    /// [`ApiError::CaptchaRequired`]. On success the access token becomes
    /// the session token.
    #[instrument(skip(self, password, recaptcha))]
    pub async fn login(
        &mut self,
        user: Option<&str>,
        password: Option<&str>,
        recaptcha: Option<&str>,
    ) -> Result<(), ApiError> {
        let user = user.unwrap_or(&self.credentials.username).to_string();
        let password = password.unwrap_or(&self.credentials.password).to_string();

        let query = [
            ("lang", LANG.to_string()),
            ("recaptchaClientResponse", recaptcha.unwrap_or_default().to_string()),
        ];
        let body = json!({
            "scope": "ofex",
            "companyIdentification": self.credentials.company_identification.clone().unwrap_or_default(),
            "userIdentification": user,
            "password": password,
        });
        let headers = [
            ("content-type", "application/json"),
            (SUBSCRIPTION_HEADER, LOGIN_SUBSCRIPTION_KEY),
        ];

        let response = match self
            .query(Method::POST, LOGIN_PATH, &query, Some(&body), &headers)
            .await
        {
            Ok(response) => response,
            Err(e) if e.to_string().contains(RECAPTCHA_MARKER) => {
                return Err(ApiError::CaptchaRequired);
            }
            Err(e) => return Err(e),
        };

        let payload = response.into_json()?;

        if let Some(message) = payload
            .get("errorMessage")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
        {
            if message.contains(RECAPTCHA_MARKER) {
                return Err(ApiError::CaptchaRequired);
            }
            return Err(ApiError::Unauthenticated(message.to_string()));
        }

        let access_token = payload
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Unauthenticated("no access token in response".to_string()))?;

        self.set_token(access_token);
        info!("Logged in");
        Ok(())
    }

    // ========================================================================
    // Account
    // ========================================================================

    /// Fetches the account profile. Fails if `user_data` is missing.
    #[instrument(skip(self))]
    pub async fn profile(&mut self, user: Option<&str>) -> Result<Profile, ApiError> {
        let user = self.token_user(user)?;
        let query = [
            ("lang", LANG.to_string()),
            ("userId", user.clone()),
            ("clientId", user),
        ];
        let headers = [(SUBSCRIPTION_HEADER, LOGIN_SUBSCRIPTION_KEY)];

        let body = self
            .query(Method::POST, PROFILE_PATH, &query, None, &headers)
            .await?
            .into_json()?;

        let profile: Profile = serde_json::from_value(body)?;
        if !profile.has_user_data() {
            return Err(ApiError::MissingField("user_data".to_string()));
        }
        Ok(profile)
    }

    /// Lists contracts with any of the given statuses (assigned and pending
    /// when empty). Each status is sent as its own query parameter.
    #[instrument(skip(self))]
    pub async fn contracts(
        &mut self,
        user: Option<&str>,
        statuses: &[ContractStatus],
    ) -> Result<Vec<Contract>, ApiError> {
        let user = self.token_user(user)?;
        let statuses: &[ContractStatus] = if statuses.is_empty() {
            &ContractStatus::DEFAULT
        } else {
            statuses
        };

        let mut query = vec![
            ("userId", user.clone()),
            ("clientId", self.credentials.client_id(&user).to_string()),
            ("lang", LANG.to_string()),
        ];
        query.extend(
            statuses
                .iter()
                .map(|s| ("assignationStatus", s.as_str().to_string())),
        );

        let body = self
            .query(Method::GET, CONTRACTS_PATH, &query, None, &[])
            .await?
            .into_json()?;

        take_data(body)?.ok_or_else(|| ApiError::MissingField("data".to_string()))
    }

    /// Identifiers of all assigned or pending contracts.
    pub async fn contract_ids(&mut self) -> Result<Vec<String>, ApiError> {
        let contracts = self.contracts(None, &[]).await?;
        Ok(contracts.iter().map(|c| c.number().to_string()).collect())
    }

    /// The only contract of the account. Fails unless there is exactly one.
    pub async fn first_contract(&mut self) -> Result<String, ApiError> {
        let mut ids = self.contract_ids().await?;
        if ids.len() != 1 {
            return Err(ApiError::AmbiguousContract(ids.len()));
        }
        Ok(ids.remove(0))
    }

    /// Resolves a contract: explicit, configured, or the only one.
    async fn resolve_contract(&mut self, contract: Option<&str>) -> Result<String, ApiError> {
        match contract.or(self.contract.as_deref()) {
            Some(contract) => Ok(contract.to_string()),
            None => self.first_contract().await,
        }
    }

    // ========================================================================
    // Invoices
    // ========================================================================

    /// Lists invoices of the last `last_months` months.
    #[instrument(skip(self))]
    pub async fn invoices(
        &mut self,
        contract: Option<&str>,
        user: Option<&str>,
        last_months: u32,
        mode: InvoiceMode,
    ) -> Result<Vec<Value>, ApiError> {
        let user = self.token_user(user)?;
        let contract = match contract {
            Some(contract) => contract.to_string(),
            None => self.first_contract().await?,
        };

        let query = [
            ("contractNumber", contract),
            ("userId", user.clone()),
            ("clientId", user),
            ("lang", LANG.to_string()),
            ("lastMonths", last_months.to_string()),
            ("mode", mode.as_str().to_string()),
        ];

        let body = self
            .query(Method::GET, INVOICES_PATH, &query, None, &[])
            .await?
            .into_json()?;

        Ok(take_data(body)?.unwrap_or_default())
    }

    /// Lists unpaid invoices.
    pub async fn invoices_debt(
        &mut self,
        contract: Option<&str>,
        user: Option<&str>,
    ) -> Result<Vec<Value>, ApiError> {
        self.invoices(contract, user, 0, InvoiceMode::Debt).await
    }

    // ========================================================================
    // Consumptions
    // ========================================================================

    /// Fetches readings between two dates, both inclusive.
    #[instrument(skip(self))]
    pub async fn consumptions(
        &mut self,
        date_from: NaiveDate,
        date_to: NaiveDate,
        contract: Option<&str>,
        user: Option<&str>,
        frequency: Frequency,
    ) -> Result<Vec<ConsumptionRecord>, ApiError> {
        let user = user.unwrap_or(&self.credentials.username).to_string();
        let contract = self.resolve_contract(contract).await?;

        let query = [
            ("consumptionFrequency", frequency.as_str().to_string()),
            ("contractNumber", contract),
            ("clientId", self.credentials.client_id(&user).to_string()),
            ("userId", user),
            ("lang", LANG.to_string()),
            ("fromDate", date_from.format(DATE_FORMAT).to_string()),
            ("toDate", date_to.format(DATE_FORMAT).to_string()),
            ("showNegativeValues", "false".to_string()),
        ];

        let body = self
            .query(Method::GET, CONSUMPTIONS_PATH, &query, None, &[])
            .await?
            .into_json()?;

        let records: Vec<ConsumptionRecord> = take_data(body)?.unwrap_or_default();
        debug!(count = records.len(), "Consumptions fetched");
        Ok(records)
    }

    /// Daily readings for the Monday-to-Sunday week containing `date`.
    pub async fn consumptions_week(
        &mut self,
        date: NaiveDate,
        contract: Option<&str>,
        user: Option<&str>,
    ) -> Result<Vec<ConsumptionRecord>, ApiError> {
        let (monday, sunday) = week_bounds(date);
        self.consumptions(monday, sunday, contract, user, Frequency::Daily)
            .await
    }

    /// Daily readings for the calendar month containing `date`.
    pub async fn consumptions_month(
        &mut self,
        date: NaiveDate,
        contract: Option<&str>,
        user: Option<&str>,
    ) -> Result<Vec<ConsumptionRecord>, ApiError> {
        let (first, last) = month_bounds(date);
        self.consumptions(first, last, contract, user, Frequency::Daily)
            .await
    }
}

// ============================================================================
// Tests
// ============================================================================
