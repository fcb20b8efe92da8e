// ABOUTME: Library root for stevedore - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod health;
pub mod hooks;
pub mod notify;
pub mod output;
pub mod policy;
pub mod process;
pub mod source;
pub mod store;
pub mod strategy;
pub mod types;
