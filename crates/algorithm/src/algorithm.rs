use crate::context::AlgorithmContext;
use crate::error::AlgorithmError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Callback arguments: the descriptor's params with the order under `order`.
pub type Arguments = Map<String, Value>;

/// A named strategy whose methods run as order callbacks.
///
/// The registry answers the base methods (`step_test`) itself; `call` only
/// sees the algorithm's own.
#[async_trait]
pub trait Algorithm: Send + Sync {
    /// Registration tag, matched against `Bot::algorithm`.
    fn tag(&self) -> &str;

    async fn call(
        &self,
        method: &str,
        args: Arguments,
        ctx: &AlgorithmContext,
    ) -> Result<(), AlgorithmError> {
        let _ = (args, ctx);
        Err(AlgorithmError::unknown_method(self.tag(), method))
    }
}

pub type SharedAlgorithm = Arc<dyn Algorithm>;

/// Knows only the base methods. Useful for driving FAKE bots by hand.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepTest;

impl StepTest {
    pub const TAG: &'static str = "TEST";
}

#[async_trait]
impl Algorithm for StepTest {
    fn tag(&self) -> &str {
        Self::TAG
    }
}
