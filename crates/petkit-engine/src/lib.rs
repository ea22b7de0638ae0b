//! Petkit Fountain protocol engine.
//!
//! Drives a fountain over any [`Transport`]: connects, runs the key-derivation
//! handshake, correlates requests with their notifications, and assembles
//! telemetry once per polling cycle.
//!
//! # Layers
//!
//! - [`Correlator`]: sequence numbers, one wait slot per response code, timeouts and retries
//! - [`Session`]: one connection plus its handshake state
//! - [`fetch_telemetry`]: the state, config and battery requests of one cycle
//! - [`PetkitFountain`]: reconnects on demand and exposes fetch and controls
//!   through [`DeviceProtocol`]
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use petkit_engine::{DeviceProtocol, EngineConfig, PetkitFountain};
//!
//! let mut fountain = PetkitFountain::new("kitchen", Arc::new(transport), EngineConfig::default());
//! let telemetry = fountain.fetch_telemetry().await?;
//! println!("{}", serde_json::to_string(&telemetry)?);
//! ```

mod config;
mod correlator;
mod device;
mod error;
mod fetch;
mod registry;
mod session;
mod transport;

pub mod testing;

pub use config::*;
pub use correlator::*;
pub use device::*;
pub use error::*;
pub use fetch::*;
pub use registry::*;
pub use session::*;
pub use transport::*;
