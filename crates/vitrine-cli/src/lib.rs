//! Build tooling for Vitrine sites.
//!
//! # Key Abstractions
//!
//! - [`VitrineConfig`](config::VitrineConfig): file/env/default configuration
//! - [`VitrineCli`](app::VitrineCli): command dispatch and logging setup
//! - [`CliArgs`](cli::CliArgs): clap argument definitions

pub mod app;
pub mod cli;
pub mod config;
pub mod config_handlers;
pub mod handlers;

pub use app::VitrineCli;
pub use cli::CliArgs;
pub use config::VitrineConfig;
