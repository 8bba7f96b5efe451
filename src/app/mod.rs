//! Usage: Application layer (wiring, logging, popup protocol).

pub mod app_state;
pub mod logging;
pub mod messages;
pub mod popup;
