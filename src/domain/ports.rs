//! Callback-style ports that don't fit the store/cache repository shape.

use crate::domain::signal::signal::{Outcome, Signal};
use async_trait::async_trait;

/// Notified when a tracked signal resolves to TP or SL. Registered on the
/// position tracker; a failing listener never aborts outcome persistence,
/// it is only logged (see `application::position_tracker`).
#[async_trait]
pub trait OutcomeListener: Send + Sync {
    async fn on_outcome(&self, signal: &Signal, outcome: Outcome);
}

/// Notified when the strategy emits a new signal. A failing listener is
/// logged and never blocks the others or the save path that already
/// completed (see `application::strategies::msr_retest::MsrStrategy`).
#[async_trait]
pub trait SignalListener: Send + Sync {
    async fn on_signal(&self, signal: &Signal);
}
