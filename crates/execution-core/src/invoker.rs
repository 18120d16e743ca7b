//! Seam between the dispatcher and algorithm code.

use crate::engine::SharedEventSink;
use crate::error::InvocationError;
use async_trait::async_trait;
use model::{Bot, CallbackDescriptor, Order};
use serde_json::{Map, Value};
use std::sync::Arc;

/// One callback to run.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub bot: Bot,
    /// The order as stored after the transition that triggered it.
    pub order: Order,
    pub callback: CallbackDescriptor,
}

impl Invocation {
    /// Descriptor parameters with the triggering order added under `order`.
    pub fn arguments(&self) -> Map<String, Value> {
        let mut args = self.callback.params.clone();
        let order = serde_json::to_value(&self.order).unwrap_or(Value::Null);
        args.insert("order".to_string(), order);
        args
    }
}

/// Runs `(bot.algorithm, method, params)` callbacks.
///
/// `sink` is the engine that dispatched this call. Orders placed by the
/// callback report their acknowledgements back through it.
#[async_trait]
pub trait AlgorithmInvoker: Send + Sync {
    async fn invoke(
        &self,
        invocation: Invocation,
        sink: SharedEventSink,
    ) -> Result<(), InvocationError>;
}

pub type SharedInvoker = Arc<dyn AlgorithmInvoker>;
