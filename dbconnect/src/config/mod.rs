//! Configuration for dbconnect

pub mod defaults;
mod settings;

pub use settings::Settings;
