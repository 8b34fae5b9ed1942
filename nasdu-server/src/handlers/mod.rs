//! HTTP request handlers organized by functionality

pub mod handle_health;
pub mod history;
pub mod scan;
