pub mod liveness;
pub mod notifier;
pub mod pattern_sync;
