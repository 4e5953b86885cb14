//! Per-contract state registry.
//!
//! One registry is created by the host and handed to every coordinator.
//! Each coordinator only writes its own contract's entry; the registry is
//! the shared namespace and the change feed for whoever displays readings.

use aigues_core::{ConsumptionRecord, UNIT_CUBIC_METERS};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{debug, warn};

use crate::error::StoreError;

// ============================================================================
// Contract State
// ============================================================================

/// Latest known data for one contract.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContractState {
    /// Timestamp of the latest reading.
    pub state_time: Option<NaiveDateTime>,
    /// Cumulative value of the latest reading.
    pub value: Option<f64>,
    /// Records of the last successful fetch.
    pub consumptions: Vec<ConsumptionRecord>,
    /// Error of the last failed cycle, cleared on success.
    pub last_error: Option<String>,
    /// When the state was last written.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Display view of a contract's meter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeterReading {
    /// Display name.
    pub name: String,
    /// Stable identifier (lower-case contract).
    pub unique_id: String,
    /// Current cumulative value.
    pub value: Option<f64>,
    /// Unit of `value`.
    pub unit: &'static str,
    /// Timestamp of the reading behind `value`.
    pub last_measure: Option<NaiveDateTime>,
}

impl MeterReading {
    /// Builds the view for `contract` from its state.
    pub fn from_state(contract: &str, state: &ContractState) -> Self {
        let id = contract.to_lowercase();
        Self {
            name: format!("Contador {id}"),
            unique_id: id,
            value: state.value,
            unit: UNIT_CUBIC_METERS,
            last_measure: state.state_time,
        }
    }
}

/// Normalizes a contract key.
fn key(contract: &str) -> String {
    contract.to_uppercase()
}

// ============================================================================
// Inner State
// ============================================================================

#[derive(Default)]
struct RegistryInner {
    states: HashMap<String, ContractState>,
    refresh_in_progress: HashSet<String>,
}

// ============================================================================
// Contract Registry
// ============================================================================

/// Keyed store of contract states.
///
/// Cheap to clone; clones share the same state. Observable via a watch
/// channel carrying a version counter.
#[derive(Clone)]
pub struct ContractRegistry {
    inner: Arc<RwLock<RegistryInner>>,
    notify: Arc<watch::Sender<u64>>,
}

impl Default for ContractRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ContractRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractRegistry")
            .field("version", &*self.notify.borrow())
            .finish_non_exhaustive()
    }
}

impl ContractRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            inner: Arc::new(RwLock::new(RegistryInner::default())),
            notify: Arc::new(notify),
        }
    }

    // ========================================================================
    // State Access
    // ========================================================================

    /// Creates an empty entry for `contract` if it has none.
    pub async fn register(&self, contract: &str) {
        self.inner
            .write()
            .await
            .states
            .entry(key(contract))
            .or_default();
    }

    /// Gets the state of a contract.
    pub async fn get(&self, contract: &str) -> Option<ContractState> {
        self.inner.read().await.states.get(&key(contract)).cloned()
    }

    /// Gets the timestamp of the latest reading of a contract.
    pub async fn state_time(&self, contract: &str) -> Option<NaiveDateTime> {
        self.inner
            .read()
            .await
            .states
            .get(&key(contract))
            .and_then(|s| s.state_time)
    }

    /// Registered contracts, sorted.
    pub async fn contracts(&self) -> Vec<String> {
        let mut contracts: Vec<String> = self.inner.read().await.states.keys().cloned().collect();
        contracts.sort();
        contracts
    }

    /// Records a successful fetch: the latest reading and the records
    /// behind it. Clears any previous error.
    pub async fn set_reading(
        &self,
        contract: &str,
        at: NaiveDateTime,
        value: f64,
        consumptions: Vec<ConsumptionRecord>,
    ) {
        {
            let mut inner = self.inner.write().await;
            let state = inner.states.entry(key(contract)).or_default();
            state.state_time = Some(at);
            state.value = Some(value);
            state.consumptions = consumptions;
            state.last_error = None;
            state.updated_at = Some(Utc::now());
        }
        self.notify_change();
        debug!(contract = %contract, value, at = %at, "Reading updated");
    }

    /// Removes a contract and its state.
    pub async fn remove(&self, contract: &str) -> Option<ContractState> {
        let removed = {
            let mut inner = self.inner.write().await;
            inner.refresh_in_progress.remove(&key(contract));
            inner.states.remove(&key(contract))
        };
        if removed.is_some() {
            self.notify_change();
            debug!(contract = %contract, "Contract state removed");
        }
        removed
    }

    /// Display view of a contract's meter.
    pub async fn reading(&self, contract: &str) -> Option<MeterReading> {
        self.inner
            .read()
            .await
            .states
            .get(&key(contract))
            .map(|state| MeterReading::from_state(contract, state))
    }

    /// Display views of all contracts, sorted by contract.
    pub async fn readings(&self) -> Vec<MeterReading> {
        let inner = self.inner.read().await;
        let mut readings: Vec<MeterReading> = inner
            .states
            .iter()
            .map(|(contract, state)| MeterReading::from_state(contract, state))
            .collect();
        readings.sort_by(|a, b| a.unique_id.cmp(&b.unique_id));
        readings
    }

    // ========================================================================
    // Refresh Management
    // ========================================================================

    /// Marks a contract as refreshing. Fails if a refresh is running.
    pub async fn start_refresh(&self, contract: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.refresh_in_progress.insert(key(contract)) {
            return Err(StoreError::RefreshInProgress(key(contract)));
        }
        Ok(())
    }

    /// Marks a contract as done refreshing.
    pub async fn end_refresh(&self, contract: &str) {
        self.inner
            .write()
            .await
            .refresh_in_progress
            .remove(&key(contract));
    }

    /// Checks if a contract is currently refreshing.
    pub async fn is_refreshing(&self, contract: &str) -> bool {
        self.inner
            .read()
            .await
            .refresh_in_progress
            .contains(&key(contract))
    }

    // ========================================================================
    // Errors
    // ========================================================================

    /// Gets the last error of a contract.
    pub async fn get_error(&self, contract: &str) -> Option<String> {
        self.inner
            .read()
            .await
            .states
            .get(&key(contract))
            .and_then(|s| s.last_error.clone())
    }

    /// Records the error of a failed cycle. The previous reading is kept.
    pub async fn set_error(&self, contract: &str, error: String) {
        {
            let mut inner = self.inner.write().await;
            inner.states.entry(key(contract)).or_default().last_error = Some(error);
        }
        self.notify_change();
        warn!(contract = %contract, "Error set for contract");
    }

    // ========================================================================
    // Observable
    // ========================================================================

    /// Subscribes to registry changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }

    fn notify_change(&self) {
        self.notify.send_modify(|version| *version += 1);
    }

    // ========================================================================
    // Staleness
    // ========================================================================

    /// Checks if a contract's state is older than `threshold`.
    pub async fn is_stale(&self, contract: &str, threshold: Duration) -> bool {
        let inner = self.inner.read().await;
        match inner.states.get(&key(contract)).and_then(|s| s.updated_at) {
            Some(time) => {
                let age = Utc::now().signed_duration_since(time);
                age > chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::MAX)
            }
            None => true,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
