//! mu-session: Session Manager for the Melody Unmix client
//!
//! Chooses the storage scope for tokens, attaches credentials to outgoing
//! requests, coordinates a single refresh shared by every request that hit an
//! expired token, and broadcasts login/logout to whoever subscribed.

mod events;
mod interceptor;
mod manager;
mod refresh;
mod theme;
mod tokens;

pub use events::*;
pub use manager::*;
pub use refresh::*;
pub use theme::*;
pub use tokens::*;
