//! Global config handle.
//!
//! Uses `arc-swap` for lock-free reads from the HTTP and sync threads.
//!
//! # Usage
//!
//! ```ignore
//! use crate::config::cfg;
//!
//! let c = cfg();
//! render_feed(&store, &c, host)?;  // Arc auto-derefs to &SiteConfig
//! ```

use super::SiteConfig;
use arc_swap::ArcSwap;
use std::sync::{Arc, LazyLock};

/// Global config storage.
///
/// Initialized with default config, then replaced with loaded config in main.
static CONFIG: LazyLock<ArcSwap<SiteConfig>> =
    LazyLock::new(|| ArcSwap::from_pointee(SiteConfig::default()));

/// Get current config as `Arc<SiteConfig>`.
///
/// Thread-safe and wait-free.
#[inline]
pub fn cfg() -> Arc<SiteConfig> {
    CONFIG.load_full()
}

/// Initialize global config (called once at startup).
#[inline]
pub fn init_config(config: SiteConfig) {
    CONFIG.store(Arc::new(config));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_replaces_default() {
        let mut config = SiteConfig::default();
        config.base.title = "Handle Test".into();
        init_config(config);

        assert_eq!(cfg().base.title, "Handle Test");
    }
}
