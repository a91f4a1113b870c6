//! `[source]` section configuration.
//!
//! Where resources come from and how long to wait for the first full sync.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[source]` section in kubeblog.toml - watch transport settings.
///
/// # Example
/// ```toml
/// [source]
/// namespace = "blog"
/// manifests = "deploy/content"
/// sync_timeout_secs = 60
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Namespace whose `BlogPost`/`BlogPage` resources are mirrored.
    #[serde(default = "defaults::source::namespace")]
    #[educe(Default = defaults::source::namespace())]
    pub namespace: String,

    /// Directory of resource manifests served as the watch transport.
    #[serde(default = "defaults::source::manifests")]
    #[educe(Default = defaults::source::manifests())]
    pub manifests: PathBuf,

    /// Give up if the initial listing is not delivered within this many seconds.
    #[serde(default = "defaults::source::sync_timeout_secs")]
    #[educe(Default = defaults::source::sync_timeout_secs())]
    pub sync_timeout_secs: u64,
}
