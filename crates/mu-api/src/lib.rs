//! mu-api: HTTP side of the Melody Unmix client
//!
//! `HttpTransport` moves requests over reqwest; `ApiClient` wraps every
//! backend endpoint on top of the session interceptor.

mod client;
mod download;
mod http;

pub mod forms;

pub use client::*;
pub use download::*;
pub use http::*;
