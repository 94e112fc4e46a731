//! Client-side driver for long-running generation jobs.
//!
//! A job is submitted, polled until the backend finishes it, and may pause
//! along the way for human feedback. [`session::JobSession`] is the entry
//! point; the lower layers ([`backend`], [`status`], [`polling`]) can be
//! used on their own.

pub mod backend;
pub mod config;
pub mod error;
pub mod polling;
pub mod session;
pub mod status;
pub mod telemetry;

#[cfg(test)]
mod testing;
