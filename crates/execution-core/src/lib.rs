//! Order state machine and callback dispatch.
//!
//! Every exchange-sourced status report, whether pushed by a stream,
//! returned by a placement call or found by reconciliation, enters through
//! [`LifecycleEngine::submit`]:
//!
//! 1. The exchange status is mapped to an internal one (`NEW` becomes ACTIVE;
//!    partial fills and pending states are ignored)
//! 2. The store applies it only if the event is strictly newer than the last
//!    applied one and the move is forward
//! 3. ACTIVE is recorded; an expiring OCO leg is suppressed
//! 4. Other terminal statuses on an ON bot go to the [`CallbackDispatcher`]
//!
//! # OCO pairs
//!
//! Exactly one leg of a pair runs its callback. A leg that did not fill waits
//! while its sibling is still resting and yields to a sibling that filled.

mod dispatcher;
mod engine;
mod error;
mod execution;
mod invoker;
mod order;
mod transition;

pub use dispatcher::{CallbackDispatcher, DispatchOutcome};
pub use engine::{LifecycleEngine, OrderEventSink, SharedEventSink};
pub use error::{EngineError, InvocationError};
pub use execution::{ExchangeEvent, OrderUpdate, UpdateSource};
pub use invoker::{AlgorithmInvoker, Invocation, SharedInvoker};
pub use order::{ExchangeOrderStatus, TimeInForce};
pub use transition::TransitionOutcome;
