//! FigBridge Shared Library
//!
//! Wire types and errors used by the bridge relay and its clients.

pub mod protocol;
pub mod error;

pub use error::{Error, Result};
