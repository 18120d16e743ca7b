//! Algorithm callbacks.
//!
//! Orders carry a [`CallbackDescriptor`](model::CallbackDescriptor) naming a
//! method. When the order settles, the dispatcher hands it to
//! [`AlgorithmRegistry`], which looks up the bot's algorithm by tag and calls
//! the method with the descriptor's parameters plus the triggering order.
//!
//! # Example
//!
//! ```rust,ignore
//! use algorithm::{Algorithm, AlgorithmContext, AlgorithmError, Arguments};
//! use async_trait::async_trait;
//!
//! struct Ladder;
//!
//! #[async_trait]
//! impl Algorithm for Ladder {
//!     fn tag(&self) -> &str {
//!         "LADDER"
//!     }
//!
//!     async fn call(
//!         &self,
//!         method: &str,
//!         args: Arguments,
//!         ctx: &AlgorithmContext,
//!     ) -> Result<(), AlgorithmError> {
//!         match method {
//!             "bought" => ctx.stop(false).await,
//!             _ => Err(AlgorithmError::unknown_method(self.tag(), method)),
//!         }
//!     }
//! }
//! ```

mod algorithm;
mod context;
mod error;
mod registry;
mod stop;

pub use algorithm::{Algorithm, Arguments, SharedAlgorithm, StepTest};
pub use context::AlgorithmContext;
pub use error::AlgorithmError;
pub use registry::AlgorithmRegistry;
pub use stop::{stop_bot, StopMode, StopReport};
