//! Keeps one streaming worker alive per exchange connection.
//!
//! A [`StreamWorker`] owns a connection's push stream and periodic
//! reconciliation for one session. The [`Supervisor`] runs a keeper task
//! per started connection that restarts the worker when it fails or its
//! session lifetime runs out, and takes START/STOP orders from a
//! [`CommandSource`].

mod bus;
mod command;
mod error;
mod supervisor;
mod worker;

#[cfg(test)]
mod testing;

pub use bus::{ChannelCommandBus, CommandSource, RedisCommandQueue};
pub use command::{CommandAction, StreamCommand};
pub use error::{CommandError, SupervisorError};
pub use supervisor::{Supervisor, EMERGENCY_GRACE};
pub use worker::{StreamWorker, WorkerExit, WorkerSettings};
