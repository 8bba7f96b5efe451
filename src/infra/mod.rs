//! Usage: Infrastructure adapters (filesystem paths, settings, storage, Supabase HTTP).

pub mod app_paths;
pub mod settings;
pub mod storage;
pub mod supabase_http;
