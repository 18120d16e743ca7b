//! Stream worker lifecycle across connections.
//!
//! [`Supervisor`] keeps at most one worker per exchange connection. Each runs
//! under a keeper task that restarts it with backoff when it fails, and
//! immediately when its session lifetime runs out. START and STOP commands
//! arrive from a [`CommandSource`]; if the source itself fails, every worker
//! is stopped after [`EMERGENCY_GRACE`].

use crate::bus::CommandSource;
use crate::command::{CommandAction, StreamCommand};
use crate::error::SupervisorError;
use crate::worker::{StreamWorker, WorkerExit, WorkerSettings};
use common::ExponentialBackoff;
use connector_core::ConnectionRegistry;
use execution_core::LifecycleEngine;
use model::ConnectionId;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Pause between a control-loop failure and stopping every worker.
pub const EMERGENCY_GRACE: Duration = Duration::from_secs(3);

struct Keeper {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Starts, restarts and stops stream workers, one per connection.
pub struct Supervisor {
    connections: ConnectionRegistry,
    engine: LifecycleEngine,
    settings: WorkerSettings,
    backoff: ExponentialBackoff,
    grace: Duration,
    keepers: HashMap<ConnectionId, Keeper>,
}

impl Supervisor {
    pub fn new(
        connections: ConnectionRegistry,
        engine: LifecycleEngine,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            connections,
            engine,
            settings,
            backoff: ExponentialBackoff::default().with_stable_after(Duration::from_secs(300)),
            grace: EMERGENCY_GRACE,
            keepers: HashMap::new(),
        }
    }

    /// Restart delays for failed workers. Each keeper gets its own copy.
    pub fn with_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn is_running(&self, id: ConnectionId) -> bool {
        self.keepers
            .get(&id)
            .is_some_and(|keeper| !keeper.handle.is_finished())
    }

    pub fn running(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self
            .keepers
            .iter()
            .filter(|(_, keeper)| !keeper.handle.is_finished())
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Start a keeper for `id`. Returns false if one is already running.
    pub fn start(&mut self, id: ConnectionId) -> Result<bool, SupervisorError> {
        if self.is_running(id) {
            info!(connection_id = %id, "already running");
            return Ok(false);
        }
        // Fail fast on unknown connections and unsupported venues.
        self.connections.adapter(id)?;

        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(keep(
            id,
            self.connections.clone(),
            self.engine.clone(),
            self.settings.clone(),
            self.backoff.clone(),
            stop_rx,
        ));
        self.keepers.insert(id, Keeper { stop, handle });
        info!(connection_id = %id, "connection started");
        Ok(true)
    }

    /// Stop the keeper for `id`, wait for it, and drop the adapter. Returns
    /// false if nothing was running.
    pub async fn stop(&mut self, id: ConnectionId) -> bool {
        let Some(keeper) = self.keepers.remove(&id) else {
            info!(connection_id = %id, "not running");
            return false;
        };
        let _ = keeper.stop.send(true);
        if let Err(e) = keeper.handle.await {
            error!(connection_id = %id, error = %e, "keeper task failed");
        }
        self.connections.evict(id);
        info!(connection_id = %id, "connection stopped");
        true
    }

    pub async fn stop_all(&mut self) {
        let ids: Vec<_> = self.keepers.keys().copied().collect();
        for id in ids {
            self.stop(id).await;
        }
    }

    pub async fn handle(&mut self, command: StreamCommand) -> Result<(), SupervisorError> {
        info!(connection_id = %command.connection_id, command = %command.action, "command");
        match command.action {
            CommandAction::Start => {
                self.start(command.connection_id)?;
            }
            CommandAction::Stop => {
                self.stop(command.connection_id).await;
            }
            CommandAction::Unknown(raw) => {
                warn!(connection_id = %command.connection_id, command = %raw, "unknown command ignored");
            }
        }
        Ok(())
    }

    /// START every connection that has open orders.
    pub fn start_open_interest(&mut self) -> Result<usize, SupervisorError> {
        let mut started = 0;
        for id in self.engine.store().connections_with_open_interest()? {
            match self.start(id) {
                Ok(true) => started += 1,
                Ok(false) => {}
                Err(e) => error!(connection_id = %id, error = %e, "startup start failed"),
            }
        }
        info!(started, "open connections started");
        Ok(started)
    }

    /// Start connections with open interest, then follow `source` until it
    /// ends or `shutdown` flips. If the control loop fails, workers get
    /// [`EMERGENCY_GRACE`] before everything is stopped and the error
    /// returned.
    pub async fn run<S: CommandSource>(
        mut self,
        mut source: S,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), SupervisorError> {
        let result = match self.start_open_interest() {
            Ok(_) => self.control_loop(&mut source, &mut shutdown).await,
            Err(e) => Err(e),
        };
        if let Err(e) = source.release().await {
            warn!(error = %e, "command source release failed");
        }

        if let Err(e) = &result {
            error!(error = %e, grace_ms = self.grace.as_millis() as u64, "control loop failed, emergency shutdown");
            tokio::time::sleep(self.grace).await;
        }
        self.stop_all().await;
        info!("supervisor stopped");
        result
    }

    async fn control_loop<S: CommandSource>(
        &mut self,
        source: &mut S,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), SupervisorError> {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(());
                    }
                }
                next = source.next() => match next {
                    None => {
                        info!("command source closed");
                        return Ok(());
                    }
                    Some(Ok(command)) => {
                        if let Err(e) = self.handle(command).await {
                            error!(error = %e, "command failed");
                        }
                    }
                    Some(Err(e)) if !e.is_fatal() => warn!(error = %e, "command dropped"),
                    Some(Err(e)) => return Err(e.into()),
                },
            }
        }
    }
}

/// Keeps one connection's worker alive until `stop` flips.
async fn keep(
    id: ConnectionId,
    connections: ConnectionRegistry,
    engine: LifecycleEngine,
    settings: WorkerSettings,
    mut backoff: ExponentialBackoff,
    mut stop: watch::Receiver<bool>,
) {
    let metrics = engine.metrics().clone();
    loop {
        if *stop.borrow() {
            break;
        }

        let started = Instant::now();
        let outcome = match connections.adapter(id) {
            Ok(adapter) => {
                let worker = StreamWorker::new(id, adapter, engine.clone(), settings.clone());
                match tokio::spawn(worker.run(stop.clone())).await {
                    Ok(result) => result,
                    Err(join) => Err(SupervisorError::StreamPanicked(join.to_string())),
                }
            }
            Err(e) => Err(e.into()),
        };

        let delay = match outcome {
            Ok(WorkerExit::Shutdown) => break,
            Ok(WorkerExit::LifetimeElapsed) => {
                backoff.reset();
                Duration::ZERO
            }
            Err(e) => {
                let delay = backoff.delay_after_run(started.elapsed());
                error!(
                    connection_id = %id,
                    error = %e,
                    attempt = backoff.attempt(),
                    delay_ms = delay.as_millis() as u64,
                    "worker failed, restarting"
                );
                delay
            }
        };
        metrics.inc_worker_restarts();

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }
    info!(connection_id = %id, "keeper exited");
}
