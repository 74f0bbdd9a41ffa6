//! Infrastructure: breakers, the analyzer HTTP client, response adapters,
//! the policy fallback, and the fan-out executor.

pub mod adapters;
pub mod analyzer_client;
pub mod executor;
pub mod fallback;
pub mod resilience;

pub use analyzer_client::{AnalyzerClient, CallError};
pub use executor::FanOutExecutor;
pub use resilience::{BreakerRegistry, BreakerState, Ticket};
