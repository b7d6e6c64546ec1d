//! Ordered compilation passes and values that become available at a pass.
//!
//! The [`Scheduler`] runs queued tasks pass by pass. A [`Deferred`] cell is
//! bound to one pass: it is written while that pass runs and may only be read
//! once the pass is over. Violations are bugs in the compiler and panic.

mod deferred;
mod executor;
mod pass;

pub use deferred::{Deferred, Getter};
pub use executor::{Executor, Scheduler};
pub use pass::Pass;
