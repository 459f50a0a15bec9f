//! FigBridge Relay
//!
//! Queues tool calls for a polling Figma plugin and relays its results
//! back to callers.

pub mod config;
pub mod figma;
pub mod metrics;
pub mod push;
pub mod queue;
pub mod results;
pub mod routes;
pub mod state;
pub mod status;
pub mod tools;

pub use routes::create_router;
pub use state::AppState;
