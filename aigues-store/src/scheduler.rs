//! Background scheduling of coordinators.
//!
//! Each coordinator runs in its own task. Interval ticks and manual refresh
//! requests go through the same cycle, so they never overlap. When a cycle
//! reports an authentication failure the task asks the host for a new token
//! and ignores ticks until one arrives.

use aigues_fetch::ConsumptionSource;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::coordinator::{ContractCoordinator, CoordinatorError, UpdateOutcome};

/// Capacity of each command channel.
const COMMAND_BUFFER: usize = 8;

/// Command sent to a running coordinator task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Run a cycle now.
    Refresh,
    /// Install a new token and resume polling.
    SetToken(String),
    /// Stop the task and drop the contract's state.
    Shutdown,
}

/// Request for a new token, sent when a cycle fails authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReauthRequest {
    /// Contract whose cycle failed.
    pub contract: String,
    /// What was detected.
    pub reason: String,
}

/// Handle to a running coordinator task.
#[derive(Debug)]
pub struct CoordinatorHandle {
    contract: String,
    commands: mpsc::Sender<SchedulerCommand>,
    task: JoinHandle<()>,
}

impl CoordinatorHandle {
    /// Contract driven by the task.
    pub fn contract(&self) -> &str {
        &self.contract
    }

    /// Requests an immediate cycle.
    pub async fn refresh(&self) -> bool {
        self.send(SchedulerCommand::Refresh).await
    }

    /// Hands a new token to the coordinator.
    pub async fn set_token(&self, token: String) -> bool {
        self.send(SchedulerCommand::SetToken(token)).await
    }

    /// Stops the task and waits for it to finish.
    pub async fn shutdown(self) {
        if self.send(SchedulerCommand::Shutdown).await {
            if let Err(e) = self.task.await {
                warn!(contract = %self.contract, error = %e, "Coordinator task ended abnormally");
            }
        } else {
            self.task.abort();
        }
    }

    async fn send(&self, command: SchedulerCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }
}

/// Spawns a task driving `coordinator` on its scan interval.
///
/// The first cycle runs immediately.
pub fn spawn_coordinator<C>(
    coordinator: ContractCoordinator<C>,
    reauth: mpsc::Sender<ReauthRequest>,
) -> CoordinatorHandle
where
    C: ConsumptionSource + 'static,
{
    let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
    let contract = coordinator.contract().to_string();

    let task = tokio::spawn(run_coordinator(coordinator, rx, reauth));

    CoordinatorHandle {
        contract,
        commands,
        task,
    }
}

async fn run_coordinator<C: ConsumptionSource>(
    mut coordinator: ContractCoordinator<C>,
    mut commands: mpsc::Receiver<SchedulerCommand>,
    reauth: mpsc::Sender<ReauthRequest>,
) {
    let contract = coordinator.contract().to_string();
    coordinator.registry().register(&contract).await;

    let mut ticker = interval(coordinator.scan_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut paused = false;
    info!(contract = %contract, every = ?coordinator.scan_interval(), "Coordinator started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if paused {
                    debug!(contract = %contract, "Waiting for a new token, tick ignored");
                    continue;
                }
                paused = run_cycle(&mut coordinator, &reauth).await;
            }
            command = commands.recv() => match command {
                Some(SchedulerCommand::Refresh) => {
                    if paused {
                        debug!(contract = %contract, "Waiting for a new token, refresh ignored");
                        continue;
                    }
                    paused = run_cycle(&mut coordinator, &reauth).await;
                }
                Some(SchedulerCommand::SetToken(token)) => {
                    coordinator.set_token(token);
                    paused = run_cycle(&mut coordinator, &reauth).await;
                    ticker.reset();
                }
                Some(SchedulerCommand::Shutdown) | None => break,
            },
        }
    }

    coordinator.registry().remove(&contract).await;
    info!(contract = %contract, "Coordinator stopped");
}

/// Runs one cycle. Returns true if the coordinator must pause for a token.
async fn run_cycle<C: ConsumptionSource>(
    coordinator: &mut ContractCoordinator<C>,
    reauth: &mpsc::Sender<ReauthRequest>,
) -> bool {
    match coordinator.update().await {
        Ok(UpdateOutcome::Updated { at, value, .. }) => {
            info!(contract = %coordinator.contract(), value, at = %at, "Reading updated");
            false
        }
        Ok(outcome) => {
            debug!(contract = %coordinator.contract(), outcome = ?outcome, "Cycle finished");
            false
        }
        Err(CoordinatorError::AuthFailed { contract, reason }) => {
            error!(contract = %contract, reason = %reason, "Reauthentication required");
            if reauth.send(ReauthRequest { contract, reason }).await.is_err() {
                warn!("Nobody is listening for reauthentication requests");
            }
            true
        }
    }
}
