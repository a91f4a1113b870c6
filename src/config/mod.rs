//! Site configuration management for `kubeblog.toml`.
//!
//! # Sections
//!
//! | Section     | Purpose                                         |
//! |-------------|-------------------------------------------------|
//! | `[base]`    | Blog metadata (title, description, url)         |
//! | `[source]`  | Namespace, manifest directory, sync timeout     |
//! | `[serve]`   | HTTP server (interface, port, shutdown grace)   |
//!
//! # Example
//!
//! ```toml
//! [base]
//! title = "Bloggernetes"
//! url = "https://blog.example.com"
//!
//! [source]
//! namespace = "blog"
//! manifests = "deploy/content"
//!
//! [serve]
//! port = 8080
//! ```
//!
//! A missing config file is not an error: every field has a default, and
//! CLI flags override whatever the file sets.

mod base;
pub mod defaults;
mod error;
mod handle;
mod serve;
mod source;

pub use handle::{cfg, init_config};

use base::BaseConfig;
use error::ConfigError;
use serve::ServeConfig;
use source::SourceConfig;

use crate::cli::{Cli, Commands};
use anyhow::Result;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Longest initial sync a deployment may ask for (one day).
const MAX_SYNC_TIMEOUT_SECS: u64 = 86_400;

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing kubeblog.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Blog identity
    #[serde(default)]
    pub base: BaseConfig,

    /// Resource source settings
    #[serde(default)]
    pub source: SourceConfig,

    /// HTTP server settings
    #[serde(default)]
    pub serve: ServeConfig,
}

impl SiteConfig {
    /// Parse configuration from TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: SiteConfig = toml::from_str(content).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_str(&content)
    }

    /// Load the config named by the CLI, apply flag overrides and validate.
    ///
    /// Paths from the file resolve against the file's directory; paths from
    /// flags resolve against the working directory.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut config = if cli.config.exists() {
            let mut config = Self::from_path(&cli.config)?;
            let root = cli.config.parent().unwrap_or(Path::new("./"));
            config.source.manifests = root.join(&config.source.manifests);
            config
        } else {
            Self::default()
        };

        config.config_path = Self::normalize_path(&cli.config);
        config.update_with_cli(cli);
        config.source.manifests = Self::normalize_path(&config.source.manifests);
        config.validate()?;
        Ok(config)
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &Cli) {
        let source = cli.source_args();
        Self::update_option(&mut self.source.namespace, source.namespace.as_ref());
        Self::update_option(&mut self.source.manifests, source.manifests.as_ref());

        if let Commands::Serve {
            interface,
            port,
            blog_name,
            ..
        } = &cli.command
        {
            Self::update_option(&mut self.serve.interface, interface.as_ref());
            Self::update_option(&mut self.serve.port, port.as_ref());
            Self::update_option(&mut self.base.title, blog_name.as_ref());
        }
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Normalize a path to absolute, using canonicalize if the path exists
    fn normalize_path(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            }
        })
    }

    /// Validate field values that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base.title.trim().is_empty() {
            return Err(ConfigError::invalid("base.title", "must not be empty"));
        }

        if let Some(url) = &self.base.url
            && !url.starts_with("http")
        {
            return Err(ConfigError::invalid(
                "base.url",
                "must start with http:// or https://",
            ));
        }

        if self.source.namespace.is_empty() {
            return Err(ConfigError::invalid("source.namespace", "must not be empty"));
        }

        if !(1..=MAX_SYNC_TIMEOUT_SECS).contains(&self.source.sync_timeout_secs) {
            return Err(ConfigError::invalid(
                "source.sync_timeout_secs",
                "must be between 1 and 86400",
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
