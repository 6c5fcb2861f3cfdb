//! Chains: ordered steps followed by a named-state machine over shared memory.

pub mod context;
pub mod memory;
pub mod ops;
pub mod runtime;
pub mod step;

pub use context::{ChainContext, NextOptions, Transition};
pub use memory::Memory;
pub use ops::{seq, ChainOps, Steps};
pub use runtime::{Chain, ChainSnapshot};
pub use step::{state_fn, step, IntoNext, Prompt, StateFn, Step};
