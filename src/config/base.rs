//! `[base]` section configuration.
//!
//! Site identity used by page headers and the RSS channel.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[base]` section in kubeblog.toml - blog metadata.
///
/// # Example
/// ```toml
/// [base]
/// title = "Bloggernetes"
/// description = "A Kubernetes-native blog"
/// url = "https://blog.example.com"
/// language = "en-us"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct BaseConfig {
    /// Blog name shown in headers and as the feed title.
    #[serde(default = "defaults::base::title")]
    #[educe(Default = defaults::base::title())]
    pub title: String,

    /// One-line description for the feed channel.
    #[serde(default = "defaults::base::description")]
    #[educe(Default = defaults::base::description())]
    pub description: String,

    /// Public base URL for absolute feed links.
    /// When unset, links are built from the request's `Host` header.
    #[serde(default = "defaults::base::url")]
    #[educe(Default = defaults::base::url())]
    pub url: Option<String>,

    /// Feed language code (e.g., "en-us").
    #[serde(default = "defaults::base::language")]
    #[educe(Default = defaults::base::language())]
    pub language: String,
}
