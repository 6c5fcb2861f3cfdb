//! Step combinators used by [`crate::chain::ChainOps`]. Each function returns
//! a [`crate::chain::Step`] and can be used on its own.

pub mod breaker;
pub mod bulkhead;
pub mod chat;
pub mod control;
pub mod memo;
pub mod memory_ops;
pub mod parallel;
pub mod rate_limit;
pub mod resilience;
pub mod strategies;

pub use breaker::{Breaker, BreakerOptions};
pub use bulkhead::{Bulkhead, WorkQueue};
pub use control::{case, MatchCase, LAST_DURATION_KEY};
pub use memory_ops::Source;
pub use parallel::ParallelOptions;
pub use rate_limit::{RateLimiter, Throttle};
pub use resilience::RetryPolicy;
pub use strategies::{check, phase, text_of, Check, Paoa, Phase, ReactLoop, Reflexion};
