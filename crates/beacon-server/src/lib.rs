//! # beacon-server
//!
//! HTTP server library for beacon, the BLE advertising and scanning session
//! manager.
//!
//! This library provides the API handlers and state management for beacon.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;
