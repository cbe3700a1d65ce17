//! SHM billing API adapter.
//!
//! Implements the core [`vpnbot_core::backend::BackendApi`] port over HTTP with a
//! cookie-based session, plus the [`vpnbot_core::session::SessionAuthenticator`]
//! used by the background refresher.

mod client;
mod envelope;

pub use client::BackendSession;
