//! Petkit Fountain BLE Protocol
//!
//! This crate provides types and utilities for talking to Petkit smart
//! fountains over their vendor GATT service. Every exchange is a framed,
//! checksummed, sequenced message written to one characteristic and answered
//! by a notification on another.
//!
//! # Protocol Overview
//!
//! ```text
//! +------+------+-----+-----+-----+------+-------------+----------+
//! | 0x55 | 0xAA | len | seq | cmd | type | payload ... | checksum |
//! +------+------+-----+-----+-----+------+-------------+----------+
//! ```
//!
//! - **Requests** (host → fountain): a command code and a small payload
//! - **Responses** (fountain → host): a frame carrying the same command code
//! - **Pushes** (fountain → host): frames nobody asked for, decoded the same way
//!
//! # Example
//!
//! ```rust,ignore
//! use petkit_protocol::{Frame, Request, decode_response};
//!
//! // Build a request
//! let bytes = Request::GetDeviceState.to_frame(sequence).encode();
//!
//! // Parse a notification
//! let frame = Frame::decode(&received)?;
//! let telemetry = decode_response(frame.command, &frame.payload);
//! ```

mod commands;
mod constants;
mod error;
mod frame;
mod model;
mod telemetry;
mod types;

pub use commands::*;
pub use constants::*;
pub use error::*;
pub use frame::*;
pub use model::*;
pub use telemetry::*;
pub use types::*;
