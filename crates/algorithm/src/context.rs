//! What a running callback can reach.

use crate::error::AlgorithmError;
use crate::stop::cancel_active_orders;
use connector_core::{ConnectionRegistry, OrderGateway};
use execution_core::SharedEventSink;
use model::{Bot, BotStatus, Round};
use order_store::SharedOrderStore;
use tracing::info;

/// What a callback can reach: its bot, the store, and a gateway on the
/// bot's connection whose acknowledgements go back to the calling engine.
pub struct AlgorithmContext {
    bot: Bot,
    connections: ConnectionRegistry,
    sink: SharedEventSink,
}

impl AlgorithmContext {
    pub fn new(bot: Bot, connections: ConnectionRegistry, sink: SharedEventSink) -> Self {
        Self {
            bot,
            connections,
            sink,
        }
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    pub fn store(&self) -> &SharedOrderStore {
        self.connections.store()
    }

    pub fn gateway(&self) -> Result<OrderGateway, AlgorithmError> {
        Ok(self
            .connections
            .gateway(self.bot.connection_id, self.sink.clone())?)
    }

    pub fn latest_round(&self) -> Result<Option<Round>, AlgorithmError> {
        Ok(self.store().latest_round(self.bot.id)?)
    }

    pub fn new_round(&self) -> Result<Round, AlgorithmError> {
        Ok(self.store().create_round(self.bot.id)?)
    }

    /// Switch the bot off (or to CANCELED) and cancel its open orders.
    ///
    /// A failed cancel is logged and the rest are still attempted.
    pub async fn stop(&self, canceled: bool) -> Result<(), AlgorithmError> {
        let status = if canceled {
            BotStatus::Canceled
        } else {
            BotStatus::Off
        };
        self.store().set_bot_status(self.bot.id, status)?;
        info!(bot_id = %self.bot.id, status = %status, "bot stopped");

        cancel_active_orders(&self.bot, &self.connections, self.sink.clone()).await?;
        Ok(())
    }
}
