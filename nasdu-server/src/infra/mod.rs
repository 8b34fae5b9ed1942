pub mod app_state;
pub mod config;
pub mod errors;
pub mod history;
pub mod remote;
pub mod scan;
pub mod startup;
