//! Core engine — the acquire → score → dispatch pipeline.

pub mod acquisition;
pub mod cycle;
pub mod dispatcher;
pub mod signal;

pub use acquisition::{AcquisitionManager, AcquisitionSettings, RetryState};
pub use cycle::{CycleOrchestrator, TradingHours};
pub use dispatcher::{AlertDispatcher, DispatchSettings};
pub use signal::{SignalEngine, SignalSettings};
