//! Configuration error types.

use std::{io, path::PathBuf};
use thiserror::Error;

/// Why `kubeblog.toml` could not be turned into a usable [`super::SiteConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("config file is not valid TOML")]
    Toml(#[from] toml::de::Error),

    /// A field parsed but holds a value the server cannot run with.
    #[error("[{key}] {reason}")]
    Validation {
        key: &'static str,
        reason: &'static str,
    },
}

impl ConfigError {
    pub(super) const fn invalid(key: &'static str, reason: &'static str) -> Self {
        Self::Validation { key, reason }
    }
}
