//! CLI command implementations for rdma-exporter.
//!
//! - `check`: list RDMA devices and ports as seen through sysfs
//! - `config`: configuration file generation
//! - `test`: one-shot scrapes without starting the server

pub mod check;
pub mod config;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
pub use test::command_test;
