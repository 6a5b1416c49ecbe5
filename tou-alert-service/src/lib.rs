pub mod app;
pub mod clock;
pub mod config;
pub mod engine;
pub mod metrics_server;
pub mod notify;
pub mod observability;
pub mod scheduler;
pub mod store;
pub mod tariff;
pub mod variation;

pub use engine::{RateComputation, RateEngine};
pub use scheduler::{Scheduler, TickOutcome, TickRunner};
