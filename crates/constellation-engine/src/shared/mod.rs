pub mod config;
pub mod error;
pub mod registries;
pub mod types;
