//! Wiring shared by every subcommand.

use crate::error::RunnerError;
use algorithm::{AlgorithmRegistry, StepTest};
use common::EngineConfig;
use connector_binance::BinanceAdapter;
use connector_core::{AdapterFactory, ClientIdCodec, ConnectionRegistry, ConnectorError, SharedAdapter};
use connector_fake::{FakeAdapter, FakeInjector};
use execution_core::LifecycleEngine;
use metrics::{create_metrics, SharedMetrics};
use model::{ExchangeConnection, ExchangeName};
use order_store::{SharedOrderStore, SqliteOrderStore};
use rust_decimal::Decimal;
use std::sync::Arc;
use supervisor::{RedisCommandQueue, Supervisor, WorkerSettings};
use tracing::info;

/// Everything one process needs, wired once.
pub struct App {
    pub config: EngineConfig,
    pub store: SharedOrderStore,
    pub metrics: SharedMetrics,
    pub connections: ConnectionRegistry,
    pub engine: LifecycleEngine,
}

impl App {
    pub fn build(config: EngineConfig) -> Result<Self, RunnerError> {
        let store: SharedOrderStore = Arc::new(SqliteOrderStore::open(&config.database_path)?);
        let metrics = create_metrics();
        let connections = ConnectionRegistry::new(store.clone(), adapter_factory(&config, &metrics));
        let algorithms = AlgorithmRegistry::new(connections.clone()).with(StepTest);
        let engine = LifecycleEngine::with_metrics(store.clone(), Arc::new(algorithms), metrics.clone());

        info!(database = %config.database_path, tag = %config.client_id_tag, "engine wired");
        Ok(Self {
            config,
            store,
            metrics,
            connections,
            engine,
        })
    }

    pub fn supervisor(&self) -> Supervisor {
        Supervisor::new(
            self.connections.clone(),
            self.engine.clone(),
            WorkerSettings::from(&self.config),
        )
    }

    pub fn command_queue(&self) -> Result<RedisCommandQueue, RunnerError> {
        Ok(RedisCommandQueue::new(
            &self.config.redis_url,
            self.config.command_queue.clone(),
        )?)
    }

    pub fn injector(&self) -> FakeInjector {
        FakeInjector::new(self.connections.clone(), self.engine.sink())
    }
}

fn adapter_factory(config: &EngineConfig, metrics: &SharedMetrics) -> AdapterFactory {
    let binance = {
        let tag = config.client_id_tag.clone();
        let metrics = metrics.clone();
        move |connection: &ExchangeConnection| -> Result<SharedAdapter, ConnectorError> {
            let codec = ClientIdCodec::new(tag.clone())?;
            Ok(Arc::new(BinanceAdapter::new(connection, codec, metrics.clone())?) as SharedAdapter)
        }
    };
    let fake = {
        let tag = config.client_id_tag.clone();
        let balance = Decimal::from(config.fake_balance);
        move |_: &ExchangeConnection| -> Result<SharedAdapter, ConnectorError> {
            Ok(Arc::new(FakeAdapter::new(ClientIdCodec::new(tag.clone())?, balance)) as SharedAdapter)
        }
    };

    AdapterFactory::new()
        .with(ExchangeName::Binance, binance.clone())
        .with(ExchangeName::BinanceTest, binance)
        .with(ExchangeName::Fake, fake)
}
