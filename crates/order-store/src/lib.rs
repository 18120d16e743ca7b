//! Persistent registry of connections, bots, rounds, positions and orders.
//!
//! Two backends share one contract: [`MemoryOrderStore`] for tests and the
//! fake venue, [`SqliteOrderStore`] for deployments.

mod error;
mod store;

mod memory;
mod sqlite;

pub use error::StoreError;
pub use memory::MemoryOrderStore;
pub use sqlite::SqliteOrderStore;
pub use store::{ApplyOutcome, OrderStore, SharedOrderStore, StatusChange};
