//! HTTP boundary of the convertino conversion service.

pub mod api;
pub mod metrics;
pub mod state;
