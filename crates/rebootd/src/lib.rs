//! rebootd - conditional reboot daemon
//!
//! Configuration, the concrete checkers and system adapters, and metrics
//! exposition around the `reboot_common` core.

pub mod checkers;
pub mod cli;
pub mod client_pool;
pub mod config;
pub mod journal;
pub mod metrics_server;
pub mod reboot;
pub mod uptime;
pub mod wiring;

pub use cli::Cli;
pub use config::Config;
