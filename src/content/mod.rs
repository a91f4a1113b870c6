//! Blog content: domain records, conversion from custom-resource objects,
//! and the shared in-memory index.
//!
//! # Data Flow
//!
//! ```text
//! ┌──────────────────┐     ┌─────────────┐     ┌──────────────┐
//! │ generic record   │ ──► │  convert    │ ──► │ ContentStore │ ◄── readers
//! │ (serde_json)     │     │ Post / Page │     │ (RwLock)     │     (serve, feed)
//! └──────────────────┘     └─────────────┘     └──────────────┘
//! ```
//!
//! The store is the only shared mutable state. Everything upstream of it is
//! pure, everything downstream only reads.

pub mod convert;
mod store;
mod types;

pub use convert::{ConvertError, page_from_record, post_from_record};
pub use store::ContentStore;
pub use types::{Page, Post};
