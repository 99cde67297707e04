pub mod config;
pub mod error;
pub mod keys;
pub mod registry;
pub mod store;
pub mod types;
