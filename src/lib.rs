//! # didlist
//!
//! Watches a live event stream for account identifiers and adds each new
//! one to a remote moderation list, within the service's rate limit and
//! without losing or repeating work across restarts.
//!
//! The [`engine::Lister`] owns the deduplicating [`queue::WorkQueue`], the
//! [`rate_limit::RateLimiter`] and the [`storage`] snapshots; the
//! [`engine::Supervisor`] drives it on timers.

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod queue;
pub mod rate_limit;
pub mod remote;
pub mod storage;
pub mod stream;
pub mod telemetry;
