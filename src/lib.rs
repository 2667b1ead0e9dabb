pub mod adapters;
pub mod app;
pub mod commands;
pub mod config;
pub mod doctor;
pub mod error;
pub mod fs_utils;
pub mod mask;
pub mod paths;
pub mod providers;
pub mod snapshot;
pub mod store;
pub mod switch;
pub mod ui;

pub use error::{HubError, Result};

#[cfg(test)]
pub mod test_utils;
