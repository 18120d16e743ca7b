//! Shared plumbing for the order engine crates: restart backoff, logging
//! setup, environment configuration and the millisecond clock.

mod backoff;
mod clock;
mod config;
mod logging;

pub use backoff::ExponentialBackoff;
pub use clock::now_ms;
pub use config::{is_client_id_tag, ConfigError, EngineConfig, CLIENT_ID_TAG_LEN};
pub use logging::init_logging;
