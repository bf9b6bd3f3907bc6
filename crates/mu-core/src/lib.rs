//! mu-core: Shared types and seams for the Melody Unmix client
//!
//! Everything the session, API and job crates agree on lives here: the error
//! taxonomy, the job/user data model, configuration, the key-value storage
//! abstraction and the transport abstraction.

mod config;
mod error;
mod model;
mod storage;
mod transport;

pub mod endpoints;

pub use config::*;
pub use error::*;
pub use model::*;
pub use storage::*;
pub use transport::*;
