//! Refresh scheduler: leader-elected, lock-guarded selection and enqueue of
//! stale codebases for re-analysis.

pub mod decay;
pub mod error;
pub mod scheduler;

pub use decay::{decay, is_eligible, DecayDecision};
pub use error::{SchedulerError, SchedulerResult};
pub use scheduler::{RefreshScheduler, TickReport};
