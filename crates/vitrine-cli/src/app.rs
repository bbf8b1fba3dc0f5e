//! CLI application: logging setup and command dispatch.

use std::sync::Arc;

use chrono::Utc;
use tracing_subscriber::EnvFilter;

use vitrine_core::Result;

use crate::cli::{CliArgs, Command};
use crate::config::VitrineConfig;
use crate::{config_handlers, handlers};

// ============================================================================
// VitrineCli
// ============================================================================

/// The `vitrine` application.
pub struct VitrineCli {
    name: String,
    config: Arc<VitrineConfig>,
    version: String,
}

impl VitrineCli {
    /// Create from CLI args, loading config from file/env.
    pub fn from_args(name: impl Into<String>, args: &CliArgs) -> Result<Self> {
        let config = VitrineConfig::load(args.config.as_deref())?;
        Ok(Self::new(name, config))
    }

    /// Create a new CLI application.
    pub fn new(name: impl Into<String>, config: VitrineConfig) -> Self {
        Self {
            name: name.into(),
            config: Arc::new(config),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Override the version string.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Get a reference to the loaded config.
    pub fn config(&self) -> &VitrineConfig {
        &self.config
    }

    /// Initialise tracing-based logging.
    ///
    /// Uses `RUST_LOG` env var if set, otherwise defaults based on verbosity flags.
    pub fn init_logging(&self, verbose: bool, quiet: bool) {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else if quiet {
            EnvFilter::new("warn")
        } else if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        };

        // Ignore error if a subscriber is already set (e.g. in tests).
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }

    /// Run the CLI with the given arguments.
    pub async fn run(&self, args: CliArgs) -> Result<()> {
        self.init_logging(args.verbose, args.quiet);

        match args.command {
            Some(Command::Version) => {
                println!("{} {}", self.name, self.version);
                Ok(())
            }
            Some(Command::Slugs { document_type }) => {
                let store = handlers::content_store(&self.config)?;
                let mut out = std::io::stdout().lock();
                handlers::handle_slugs(store, &document_type, &mut out).await?;
                Ok(())
            }
            Some(Command::Fetch {
                name,
                params,
                draft,
            }) => {
                let store = handlers::content_store(&self.config)?;
                let mut out = std::io::stdout().lock();
                handlers::handle_fetch(store, &name, &params, draft, &mut out).await
            }
            Some(Command::PreviewCookie { clear }) => {
                let mut out = std::io::stdout().lock();
                handlers::handle_preview_cookie(&self.config, clear, Utc::now(), &mut out)
            }
            Some(Command::Config(config_cmd)) => {
                config_handlers::handle_config_command(args.config.as_deref(), config_cmd.command)
            }
            None => {
                println!("{} {} (use --help for usage)", self.name, self.version);
                Ok(())
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
