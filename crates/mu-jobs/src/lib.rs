//! mu-jobs: Job tracking for the Melody Unmix client
//!
//! - Job board shared between the upload gate and the pollers
//! - One status poller per job with additive backoff
//! - Single-upload gate with client-side file checks
//! - Best-effort duration probing

mod backend;
mod backoff;
mod board;
mod gate;
mod poller;
mod probe;
mod tracker;
mod validation;
mod visibility;

pub use backend::*;
pub use backoff::*;
pub use board::*;
pub use gate::*;
pub use poller::*;
pub use probe::*;
pub use tracker::*;
pub use validation::*;
pub use visibility::*;
