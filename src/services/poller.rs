use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU32, Ordering},
};

use anyhow::{Error, Result, anyhow};
use dashmap::DashMap;
use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, error, info, warn};

use crate::{
    clients::gateway::QueueGateway,
    config::{PollerConfig, StatusQueueConfig},
    models::status::{PollerState, QueuePollerStatus},
    services::{correlation::CorrelationStore, status_parser},
};

struct QueueSlot {
    enabled: bool,
    running: AtomicBool,
    failures: AtomicU32,
}

/// Run state and consecutive-failure counter for every configured status queue.
///
/// Shared between the per-queue polling tasks and operational start/stop calls.
#[derive(Default)]
pub struct QueueStateRegistry {
    slots: DashMap<String, Arc<QueueSlot>>,
}

impl QueueStateRegistry {
    pub fn new(queues: &[StatusQueueConfig]) -> Self {
        let registry = Self::default();
        for queue in queues {
            registry.register(queue);
        }
        registry
    }

    pub fn register(&self, queue: &StatusQueueConfig) {
        self.slots.insert(
            queue.name.clone(),
            Arc::new(QueueSlot {
                enabled: queue.enabled,
                running: AtomicBool::new(queue.enabled),
                failures: AtomicU32::new(0),
            }),
        );
    }

    fn slot(&self, queue_name: &str) -> Result<Arc<QueueSlot>, Error> {
        self.slots
            .get(queue_name)
            .map(|slot| Arc::clone(slot.value()))
            .ok_or_else(|| anyhow!("Unknown status queue '{}'", queue_name))
    }

    /// STOPPED -> RUNNING with the failure counter reset. Returns `false` if already running.
    pub fn start(&self, queue_name: &str) -> Result<bool, Error> {
        let slot = self.slot(queue_name)?;
        slot.failures.store(0, Ordering::SeqCst);
        let started = !slot.running.swap(true, Ordering::SeqCst);

        if started {
            info!(queue = queue_name, "Status poller started");
        }

        Ok(started)
    }

    /// RUNNING -> STOPPED. Returns `false` if already stopped.
    pub fn stop(&self, queue_name: &str) -> Result<bool, Error> {
        let slot = self.slot(queue_name)?;
        let stopped = slot.running.swap(false, Ordering::SeqCst);

        if stopped {
            info!(queue = queue_name, "Status poller stopped");
        }

        Ok(stopped)
    }

    pub fn stop_all(&self) {
        for slot in self.slots.iter() {
            slot.value().running.store(false, Ordering::SeqCst);
        }
    }

    pub fn state(&self, queue_name: &str) -> Result<PollerState, Error> {
        let slot = self.slot(queue_name)?;
        Ok(if slot.running.load(Ordering::SeqCst) {
            PollerState::Running
        } else {
            PollerState::Stopped
        })
    }

    pub fn is_running(&self, queue_name: &str) -> bool {
        self.slot(queue_name)
            .map(|slot| slot.running.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    pub fn failures(&self, queue_name: &str) -> u32 {
        self.slot(queue_name)
            .map(|slot| slot.failures.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    fn record_failure(&self, queue_name: &str) -> Result<u32, Error> {
        let slot = self.slot(queue_name)?;
        Ok(slot.failures.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn reset_failures(&self, queue_name: &str) {
        if let Ok(slot) = self.slot(queue_name) {
            slot.failures.store(0, Ordering::SeqCst);
        }
    }

    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.slots.iter().map(|slot| slot.key().clone()).collect();
        names.sort();
        names
    }

    pub fn snapshot(&self) -> Vec<QueuePollerStatus> {
        let mut statuses: Vec<QueuePollerStatus> = self
            .slots
            .iter()
            .map(|slot| QueuePollerStatus {
                queue_name: slot.key().clone(),
                enabled: slot.value().enabled,
                state: if slot.value().running.load(Ordering::SeqCst) {
                    PollerState::Running
                } else {
                    PollerState::Stopped
                },
                consecutive_failures: slot.value().failures.load(Ordering::SeqCst),
            })
            .collect();
        statuses.sort_by(|a, b| a.queue_name.cmp(&b.queue_name));
        statuses
    }
}

/// What one poll of one queue did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Skipped,
    Empty,
    Unparseable,
    Unmatched,
    Applied { updated: usize },
    Failed { consecutive_failures: u32 },
    AutoStopped,
}

pub struct StatusPoller {
    gateway: Arc<dyn QueueGateway>,
    store: Arc<CorrelationStore>,
    registry: Arc<QueueStateRegistry>,
    config: PollerConfig,
}

impl StatusPoller {
    pub fn new(
        gateway: Arc<dyn QueueGateway>,
        store: Arc<CorrelationStore>,
        registry: Arc<QueueStateRegistry>,
        config: PollerConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            registry,
            config,
        }
    }

    pub fn registry(&self) -> Arc<QueueStateRegistry> {
        Arc::clone(&self.registry)
    }

    /// Polls `queue_name` once, if it is RUNNING.
    pub async fn tick(&self, queue_name: &str) -> TickOutcome {
        if !self.registry.is_running(queue_name) {
            return TickOutcome::Skipped;
        }

        match self.poll_once(queue_name).await {
            Ok(outcome) => {
                self.registry.reset_failures(queue_name);
                outcome
            }
            Err(e) => self.handle_failure(queue_name, e),
        }
    }

    async fn poll_once(&self, queue_name: &str) -> Result<TickOutcome, Error> {
        let Some(body) = self
            .gateway
            .receive(queue_name, self.config.receive_timeout)
            .await?
        else {
            debug!(queue = queue_name, "No status message");
            return Ok(TickOutcome::Empty);
        };

        let Some(record) = status_parser::parse(&body, queue_name) else {
            return Ok(TickOutcome::Unparseable);
        };

        let applied = self.store.apply_record(&record).await?;

        Ok(if applied.is_unmatched() {
            TickOutcome::Unmatched
        } else {
            TickOutcome::Applied {
                updated: applied.updated,
            }
        })
    }

    fn handle_failure(&self, queue_name: &str, e: Error) -> TickOutcome {
        let failures = match self.registry.record_failure(queue_name) {
            Ok(failures) => failures,
            Err(e) => {
                error!(queue = queue_name, error = %e, "Failure counter unavailable");
                return TickOutcome::Skipped;
            }
        };

        warn!(
            queue = queue_name,
            consecutive_failures = failures,
            max_failures = self.config.max_consecutive_failures,
            error = %e,
            "Status poll failed"
        );

        if failures >= self.config.max_consecutive_failures {
            if let Err(e) = self.registry.stop(queue_name) {
                error!(queue = queue_name, error = %e, "Failed to stop poller");
            }
            error!(
                queue = queue_name,
                consecutive_failures = failures,
                "Status poller stopped after consecutive failures, manual restart required"
            );
            return TickOutcome::AutoStopped;
        }

        TickOutcome::Failed {
            consecutive_failures: failures,
        }
    }

    /// Spawns one polling task per registered queue.
    pub fn spawn(self: Arc<Self>) -> PollerHandle {
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut handles = Vec::new();

        for queue_name in self.registry.queue_names() {
            let poller = Arc::clone(&self);
            let mut shutdown_rx = shutdown_tx.subscribe();

            handles.push(tokio::spawn(async move {
                let mut ticker = interval(poller.config.poll_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                info!(queue = %queue_name, "Status polling task started");

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            poller.tick(&queue_name).await;
                        }
                        _ = shutdown_rx.recv() => {
                            info!(queue = %queue_name, "Status polling task shutting down");
                            break;
                        }
                    }
                }
            }));
        }

        PollerHandle {
            registry: Arc::clone(&self.registry),
            shutdown_tx,
            handles,
        }
    }
}

pub struct PollerHandle {
    registry: Arc<QueueStateRegistry>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

impl PollerHandle {
    /// Stops every queue and waits for in-flight ticks to finish.
    pub async fn shutdown(self) {
        self.registry.stop_all();
        let _ = self.shutdown_tx.send(());

        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Status polling task ended abnormally");
            }
        }

        info!("Status pollers drained");
    }
}
