//! HTTP surface
//!
//! A thin adapter over the core: handlers validate inputs, stamp telemetry,
//! and never mutate the projected store except through the dedicated state
//! and layout endpoints.

pub mod error;
pub mod handlers;
pub mod routes;

pub use routes::create_router;
