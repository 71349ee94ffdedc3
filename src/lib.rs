//! Travel Match client
//!
//! Client-side core for the Travel Match trip-matching service: the
//! authentication session, polling chat sync for trip conversations, and
//! the emergency SOS alert lifecycle, over the service's REST API.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod model;
pub mod session;
pub mod sos;
pub mod storage;
pub mod sync;
pub mod timer;

#[cfg(test)]
mod fake;

pub use error::{Error, Result};
