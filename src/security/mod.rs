//! Request admission control.
//!
//! - [`RateLimitMiddleware`] — per-client quota over a rolling window.

mod rate_limit;

pub use rate_limit::{Decision, RateLimitConfig, RateLimitMiddleware};
