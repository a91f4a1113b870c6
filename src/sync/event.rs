//! Notifications delivered by a watch transport.

use std::fmt;

use serde_json::Value;

/// API group of the blog custom resources.
pub const API_GROUP: &str = "alpha.bloggernetes.davies.me.uk";

/// Served version of the blog custom resources.
pub const API_VERSION: &str = "v1";

/// The two watched resource kinds. Each gets its own stream and worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Post,
    Page,
}

impl ResourceKind {
    pub const ALL: [Self; 2] = [Self::Post, Self::Page];

    /// `kind` field of the resource object.
    pub const fn kind_name(self) -> &'static str {
        match self {
            Self::Post => "BlogPost",
            Self::Page => "BlogPage",
        }
    }

    /// Plural resource name, as used in API paths.
    pub const fn plural(self) -> &'static str {
        match self {
            Self::Post => "blogposts",
            Self::Page => "blogpages",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Post => "post",
            Self::Page => "page",
        })
    }
}

/// One change to one object, carrying the object's generic record.
///
/// For `Delete` the record is the last state the transport knew about.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Add(Value),
    Update(Value),
    Delete(Value),
}

impl WatchEvent {
    pub fn record(&self) -> &Value {
        match self {
            Self::Add(record) | Self::Update(record) | Self::Delete(record) => record,
        }
    }

    /// Past-tense verb for log lines.
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Add(_) => "added",
            Self::Update(_) => "updated",
            Self::Delete(_) => "deleted",
        }
    }
}

/// Items on a watch stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Event(WatchEvent),
    /// Every object that existed when the watch started has been delivered.
    Synced,
}
