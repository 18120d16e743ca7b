//! One connection's push stream plus periodic reconciliation.
//!
//! Stream events and reconcile results are both submitted to the same
//! [`LifecycleEngine`], so whichever carries the newer exchange time wins.

use crate::error::SupervisorError;
use common::EngineConfig;
use connector_core::{create_event_channel, ConnectorError, SharedAdapter};
use execution_core::{ExchangeEvent, LifecycleEngine, OrderUpdate, UpdateSource};
use model::ConnectionId;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub reconcile_interval: Duration,
    pub keepalive_interval: Duration,
    pub max_session_lifetime: Duration,
    pub event_channel_capacity: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(10 * 60),
            keepalive_interval: Duration::from_secs(30 * 60),
            max_session_lifetime: Duration::from_secs(23 * 60 * 60),
            event_channel_capacity: 1024,
        }
    }
}

impl From<&EngineConfig> for WorkerSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            reconcile_interval: config.reconcile_interval,
            keepalive_interval: config.keepalive_interval,
            max_session_lifetime: config.max_session_lifetime,
            event_channel_capacity: config.event_channel_capacity,
        }
    }
}

/// Why a worker returned without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    Shutdown,
    /// The session ran for `max_session_lifetime`; start a fresh one.
    LifetimeElapsed,
}

/// One streaming session for one exchange connection.
pub struct StreamWorker {
    connection_id: ConnectionId,
    adapter: SharedAdapter,
    engine: LifecycleEngine,
    settings: WorkerSettings,
}

impl StreamWorker {
    pub fn new(
        connection_id: ConnectionId,
        adapter: SharedAdapter,
        engine: LifecycleEngine,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            connection_id,
            adapter,
            engine,
            settings,
        }
    }

    /// Run until shutdown, lifetime expiry, or a stream/keep-alive failure.
    pub async fn run(
        self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<WorkerExit, SupervisorError> {
        let metrics = self.engine.metrics().clone();
        metrics.inc_worker_starts();
        info!(connection_id = %self.connection_id, exchange = %self.adapter.exchange(), "worker started");

        let (sender, mut events) = create_event_channel(self.settings.event_channel_capacity);
        let adapter = self.adapter.clone();
        let stream_shutdown = shutdown.clone();
        let mut stream =
            tokio::spawn(async move { adapter.stream_events(sender, stream_shutdown).await });

        self.reconcile().await;

        let now = Instant::now();
        let mut reconcile = interval_at(
            now + self.settings.reconcile_interval,
            self.settings.reconcile_interval,
        );
        reconcile.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut keepalive = interval_at(
            now + self.settings.keepalive_interval,
            self.settings.keepalive_interval,
        );
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let lifetime = tokio::time::sleep(self.settings.max_session_lifetime);
        tokio::pin!(lifetime);

        let exit = loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break Ok(WorkerExit::Shutdown);
                    }
                }

                _ = &mut lifetime => {
                    info!(connection_id = %self.connection_id, "session lifetime elapsed");
                    break Ok(WorkerExit::LifetimeElapsed);
                }

                _ = reconcile.tick() => self.reconcile().await,

                _ = keepalive.tick() => {
                    if let Err(e) = self.adapter.keep_alive().await {
                        metrics.inc_stream_errors();
                        error!(connection_id = %self.connection_id, error = %e, "keep-alive failed");
                        break Err(e.into());
                    }
                    debug!(connection_id = %self.connection_id, "keep-alive sent");
                }

                Some(event) = events.recv() => self.handle_event(event).await,

                result = &mut stream => {
                    while let Ok(event) = events.try_recv() {
                        self.handle_event(event).await;
                    }
                    break match result {
                        Ok(Ok(())) if *shutdown.borrow() => Ok(WorkerExit::Shutdown),
                        Ok(Ok(())) => Err(SupervisorError::StreamEnded),
                        Ok(Err(e)) => {
                            metrics.inc_stream_errors();
                            Err(e.into())
                        }
                        Err(join) => {
                            metrics.inc_stream_errors();
                            Err(SupervisorError::StreamPanicked(join.to_string()))
                        }
                    };
                }
            }
        };

        stream.abort();
        match &exit {
            Ok(reason) => info!(connection_id = %self.connection_id, exit = ?reason, "worker stopped"),
            Err(e) => warn!(connection_id = %self.connection_id, error = %e, "worker failed"),
        }
        exit
    }

    async fn handle_event(&self, event: ExchangeEvent) {
        self.engine.metrics().inc_events_received();
        let Some(order_id) = self.adapter.client_ids().decode(&event.client_order_id) else {
            debug!(
                connection_id = %self.connection_id,
                client_order_id = %event.client_order_id,
                "event for foreign order ignored"
            );
            return;
        };
        self.submit(event.into_update(order_id, UpdateSource::Stream)).await;
    }

    async fn submit(&self, update: OrderUpdate) {
        let order_id = update.order_id;
        let source = update.source;
        match self.engine.submit(update).await {
            Ok(outcome) if outcome.was_applied() => {
                debug!(order_id = %order_id, source = %source, outcome = ?outcome, "order update applied");
            }
            Ok(_) => {}
            Err(e) => {
                self.engine.metrics().inc_stream_errors();
                error!(
                    connection_id = %self.connection_id,
                    order_id = %order_id,
                    source = %source,
                    error = %e,
                    "order update failed"
                );
            }
        }
    }

    /// Poll the venue for every symbol traded on this connection.
    async fn reconcile(&self) {
        let symbols = match self.symbols() {
            Ok(symbols) => symbols,
            Err(e) => {
                error!(connection_id = %self.connection_id, error = %e, "reconcile skipped");
                return;
            }
        };

        self.engine.metrics().inc_reconcile_runs();
        for symbol in symbols {
            match self.adapter.reconcile(&symbol).await {
                Ok(updates) => {
                    debug!(connection_id = %self.connection_id, symbol = %symbol, count = updates.len(), "reconciled");
                    for update in updates {
                        self.submit(update).await;
                    }
                }
                Err(e) => {
                    warn!(connection_id = %self.connection_id, symbol = %symbol, error = %e, "reconcile failed");
                }
            }
        }
    }

    fn symbols(&self) -> Result<BTreeSet<String>, ConnectorError> {
        Ok(self
            .engine
            .store()
            .bots_for_connection(self.connection_id)?
            .into_iter()
            .map(|bot| bot.symbol)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{active_order, seeded, ScriptedAdapter, StreamEnd, TAG};
    use execution_core::ExchangeOrderStatus;
    use model::OrderStatus;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    const CONN: ConnectionId = ConnectionId(1);

    fn settings() -> WorkerSettings {
        WorkerSettings {
            reconcile_interval: Duration::from_secs(600),
            keepalive_interval: Duration::from_secs(600),
            max_session_lifetime: Duration::from_secs(600),
            event_channel_capacity: 16,
        }
    }

    #[tokio::test]
    async fn test_reconciled_cancel_beats_older_stream_fill() {
        let s = seeded(&[CONN]);
        let order = active_order(&s.store, CONN);

        let adapter = Arc::new(ScriptedAdapter::new(StreamEnd::Idle));
        adapter.reconcile_updates.lock().push(OrderUpdate::new(
            order.id,
            ExchangeOrderStatus::Canceled,
            5,
            UpdateSource::Reconcile,
        ));
        adapter.stream_events.lock().extend([
            ExchangeEvent::new(format!("{TAG}-{}", order.id), "BTCUSDT", ExchangeOrderStatus::Filled, 3)
                .with_fills(rust_decimal_macros::dec!(1), rust_decimal_macros::dec!(100)),
            ExchangeEvent::new("web_abcdef123", "BTCUSDT", ExchangeOrderStatus::Filled, 4),
        ]);

        let (stop, stop_rx) = watch::channel(false);
        let worker = StreamWorker::new(CONN, adapter, s.engine.clone(), settings());
        let handle = tokio::spawn(worker.run(stop_rx));

        let metrics = s.engine.metrics().clone();
        crate::testing::eventually(|| metrics.events_received() == 2).await;
        stop.send(true).unwrap();

        assert_eq!(handle.await.unwrap().unwrap(), WorkerExit::Shutdown);
        let order = s.store.order(order.id).unwrap();
        assert_eq!(order.status, OrderStatus::Canceled);
        assert_eq!(order.updated_at_ms, Some(5));
        assert_eq!(metrics.stale_rejected(), 1);
        assert_eq!(metrics.reconcile_runs(), 1);
    }

    #[tokio::test]
    async fn test_lifetime_ends_session() {
        let s = seeded(&[CONN]);
        let adapter = Arc::new(ScriptedAdapter::new(StreamEnd::Idle));
        let mut settings = settings();
        settings.max_session_lifetime = Duration::from_millis(20);

        let (_stop, stop_rx) = watch::channel(false);
        let exit = StreamWorker::new(CONN, adapter, s.engine.clone(), settings)
            .run(stop_rx)
            .await
            .unwrap();
        assert_eq!(exit, WorkerExit::LifetimeElapsed);
    }

    #[tokio::test]
    async fn test_stream_failure_is_an_error() {
        let s = seeded(&[CONN]);
        let adapter = Arc::new(ScriptedAdapter::new(StreamEnd::Fail));

        let (_stop, stop_rx) = watch::channel(false);
        let result = StreamWorker::new(CONN, adapter, s.engine.clone(), settings())
            .run(stop_rx)
            .await;
        assert!(matches!(
            result,
            Err(SupervisorError::Connector(ConnectorError::ConnectionClosed))
        ));
        assert_eq!(s.engine.metrics().stream_errors(), 1);
    }

    #[tokio::test]
    async fn test_periodic_keep_alive_and_reconcile() {
        let s = seeded(&[CONN]);
        let adapter = Arc::new(ScriptedAdapter::new(StreamEnd::Idle));
        let mut settings = settings();
        settings.keepalive_interval = Duration::from_millis(10);
        settings.reconcile_interval = Duration::from_millis(10);
        settings.max_session_lifetime = Duration::from_millis(100);

        let (_stop, stop_rx) = watch::channel(false);
        StreamWorker::new(CONN, adapter.clone(), s.engine.clone(), settings)
            .run(stop_rx)
            .await
            .unwrap();

        assert!(adapter.keep_alives.load(Ordering::SeqCst) >= 2);
        assert!(s.engine.metrics().reconcile_runs() >= 3);
        assert_eq!(adapter.sessions.load(Ordering::SeqCst), 1);
    }
}
