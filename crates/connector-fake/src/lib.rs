//! In-process venue for driving the engine without an exchange.
//!
//! [`FakeAdapter`] acknowledges every placement as resting and every cancel
//! as done; nothing ever fills on its own. Fills, cancels and expiries are
//! pushed by hand through [`FakeInjector`], which feeds the engine exactly
//! as a stream event would.

mod adapter;
mod clock;
mod injector;

pub use adapter::{FakeAdapter, DEFAULT_FAKE_BALANCE};
pub use clock::next_event_time;
pub use injector::{FakeInjector, FillOverrides};
