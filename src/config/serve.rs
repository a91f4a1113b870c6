//! `[serve]` section configuration.
//!
//! Contains HTTP server settings.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[serve]` section in kubeblog.toml - HTTP server settings.
///
/// # Example
/// ```toml
/// [serve]
/// interface = "127.0.0.1"  # localhost only
/// port = 3000
/// shutdown_grace_secs = 5
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct ServeConfig {
    /// Network interface to bind.
    /// - `0.0.0.0` (default): all interfaces, as inside a pod
    /// - `127.0.0.1`: localhost only
    #[serde(default = "defaults::serve::interface")]
    #[educe(Default = defaults::serve::interface())]
    pub interface: String,

    /// HTTP port number (default: 8080).
    #[serde(default = "defaults::serve::port")]
    #[educe(Default = defaults::serve::port())]
    pub port: u16,

    /// Seconds the controller gets to wind down after the server stops.
    #[serde(default = "defaults::serve::shutdown_grace_secs")]
    #[educe(Default = defaults::serve::shutdown_grace_secs())]
    pub shutdown_grace_secs: u64,
}
