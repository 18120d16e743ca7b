//! Adapter construction and per-connection caching.

use crate::adapter::SharedAdapter;
use crate::gateway::OrderGateway;
use crate::ConnectorError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use execution_core::SharedEventSink;
use model::{ConnectionId, ExchangeConnection, ExchangeName};
use order_store::SharedOrderStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub type AdapterConstructor =
    Arc<dyn Fn(&ExchangeConnection) -> Result<SharedAdapter, ConnectorError> + Send + Sync>;

/// Explicit table of adapter constructors, keyed by venue.
#[derive(Clone, Default)]
pub struct AdapterFactory {
    constructors: HashMap<ExchangeName, AdapterConstructor>,
}

impl AdapterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F>(mut self, exchange: ExchangeName, constructor: F) -> Self
    where
        F: Fn(&ExchangeConnection) -> Result<SharedAdapter, ConnectorError> + Send + Sync + 'static,
    {
        self.constructors.insert(exchange, Arc::new(constructor));
        self
    }

    pub fn create(&self, connection: &ExchangeConnection) -> Result<SharedAdapter, ConnectorError> {
        let constructor = self
            .constructors
            .get(&connection.exchange)
            .ok_or(ConnectorError::UnsupportedExchange(connection.exchange))?;
        constructor(connection)
    }
}

/// One live adapter per exchange connection, created on first use.
#[derive(Clone)]
pub struct ConnectionRegistry {
    store: SharedOrderStore,
    factory: AdapterFactory,
    adapters: Arc<DashMap<ConnectionId, SharedAdapter>>,
}

impl ConnectionRegistry {
    pub fn new(store: SharedOrderStore, factory: AdapterFactory) -> Self {
        Self {
            store,
            factory,
            adapters: Arc::new(DashMap::new()),
        }
    }

    pub fn store(&self) -> &SharedOrderStore {
        &self.store
    }

    pub fn adapter(&self, id: ConnectionId) -> Result<SharedAdapter, ConnectorError> {
        if let Some(adapter) = self.adapters.get(&id) {
            return Ok(adapter.clone());
        }

        let connection = self.store.connection(id)?;
        match self.adapters.entry(id) {
            Entry::Occupied(existing) => Ok(existing.get().clone()),
            Entry::Vacant(slot) => {
                let adapter = self.factory.create(&connection)?;
                info!(connection_id = %id, exchange = %connection.exchange, "adapter created");
                Ok(slot.insert(adapter).clone())
            }
        }
    }

    /// Drop the cached adapter; the next use builds a fresh one.
    pub fn evict(&self, id: ConnectionId) -> Option<SharedAdapter> {
        let evicted = self.adapters.remove(&id).map(|(_, adapter)| adapter);
        if evicted.is_some() {
            info!(connection_id = %id, "adapter evicted");
        }
        evicted
    }

    pub fn is_live(&self, id: ConnectionId) -> bool {
        self.adapters.contains_key(&id)
    }

    pub fn gateway(
        &self,
        id: ConnectionId,
        sink: SharedEventSink,
    ) -> Result<OrderGateway, ConnectorError> {
        Ok(OrderGateway::new(self.store.clone(), self.adapter(id)?, sink))
    }
}
