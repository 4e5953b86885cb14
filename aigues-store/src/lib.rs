// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # Aigues Store
//!
//! State, statistics and polling for the Aigues water meters.
//!
//! This crate provides:
//!
//! - **ContractRegistry**: Latest reading per contract, with a watch channel
//! - **ContractCoordinator**: One polling cycle per contract (too-early guard,
//!   token checks, statistics import, backfill)
//! - **StatisticsSink**: Hour-aligned series, in memory or in a JSON file
//! - **Scheduler**: Background task per coordinator with reauth pausing
//! - **Settings**: Account configuration with persistence
//!
//! ## Usage
//!
//! ```ignore
//! use aigues_store::{spawn_coordinator, ContractCoordinator, ContractRegistry, JsonStatistics};
//!
//! let registry = ContractRegistry::new();
//! let sink = Arc::new(JsonStatistics::default_location());
//! let coordinator = ContractCoordinator::new(client, "W1234567", registry.clone(), sink);
//!
//! let (reauth_tx, mut reauth_rx) = tokio::sync::mpsc::channel(4);
//! let handle = spawn_coordinator(coordinator, reauth_tx);
//!
//! // Subscribe to changes
//! let mut rx = registry.subscribe();
//! while rx.changed().await.is_ok() {
//!     println!("{:?}", registry.readings().await);
//! }
//! ```

pub mod coordinator;
pub mod error;
pub mod persistence;
pub mod registry;
pub mod scheduler;
pub mod settings;
pub mod statistics;

pub use coordinator::{
    ContractCoordinator, CoordinatorError, SkipReason, UpdateOutcome, BACKFILL_THRESHOLD_DAYS,
    FETCH_WINDOW_DAYS, MIN_REFRESH_MINUTES,
};
pub use error::StoreError;
pub use persistence::{
    default_config_dir, default_data_dir, default_settings_path, load_json, load_json_or_default,
    save_json,
};
pub use registry::{ContractRegistry, ContractState, MeterReading};
pub use scheduler::{spawn_coordinator, CoordinatorHandle, ReauthRequest, SchedulerCommand};
pub use settings::{Settings, SettingsStore, DEFAULT_SCAN_INTERVAL_SECS};
pub use statistics::{default_statistics_path, JsonStatistics, MemoryStatistics, StatisticsSink};
