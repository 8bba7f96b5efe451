//! Usage: Authentication (OAuth redirect capture, session persistence, flow control).
//!
//! The controller depends only on the `IdentityBackend` and `AuthRuntime`
//! traits; `supabase` and `web_auth` hold the concrete implementations.

mod browser;
pub(crate) mod callback_server;
pub mod controller;
pub mod events;
pub mod identity;
pub mod session;
pub mod session_store;
pub mod supabase;
pub mod token_extractor;
pub mod web_auth;
