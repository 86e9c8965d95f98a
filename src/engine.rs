//! The generic driver that runs every resource strategy over a batch of events.

mod dispatch;
pub mod driver;
pub mod services;

pub use driver::{Resolution, ResolutionEngine, StrategyResolution};
pub use services::EngineServices;
