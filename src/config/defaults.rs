//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

// ============================================================================
// [base] Section Defaults
// ============================================================================

pub mod base {
    pub fn title() -> String {
        "Bloggernetes".into()
    }

    pub fn description() -> String {
        "A Kubernetes-native blog".into()
    }

    pub fn url() -> Option<String> {
        None
    }

    pub fn language() -> String {
        "en-us".into()
    }
}

// ============================================================================
// [source] Section Defaults
// ============================================================================

pub mod source {
    use std::path::PathBuf;

    pub fn namespace() -> String {
        crate::sync::manifest::DEFAULT_NAMESPACE.into()
    }

    pub fn manifests() -> PathBuf {
        "manifests".into()
    }

    pub fn sync_timeout_secs() -> u64 {
        30
    }
}

// ============================================================================
// [serve] Section Defaults
// ============================================================================

pub mod serve {
    pub fn interface() -> String {
        "0.0.0.0".into()
    }

    pub fn port() -> u16 {
        8080
    }

    pub fn shutdown_grace_secs() -> u64 {
        5
    }
}
