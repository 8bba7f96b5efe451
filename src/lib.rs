//! Quick Notes: personal notes stored in a Supabase project, with OAuth
//! sign-in captured from the provider redirect.

pub mod app;
pub mod auth;
pub mod domain;
pub mod infra;
pub mod shared;

pub use infra::{app_paths, settings, storage};
pub use shared::blocking;
pub use shared::error::{AppError, AppResult};
