use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use uuid::Uuid;

/// Process-unique job identifier, rendered as a hyphenated UUID on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// What a job archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Messenger,
    Topic,
    Forum,
    Blog,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::Messenger,
        JobKind::Topic,
        JobKind::Forum,
        JobKind::Blog,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            JobKind::Messenger => "MESSENGER_WORKER",
            JobKind::Topic => "TOPIC_WORKER",
            JobKind::Forum => "FORUM_WORKER",
            JobKind::Blog => "BLOG_WORKER",
        }
    }

    /// Accepts both `MESSENGER_WORKER` and the short `MESSENGER` form.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        let short = tag.strip_suffix("_WORKER").unwrap_or(tag);
        match short {
            "MESSENGER" => Some(JobKind::Messenger),
            "TOPIC" => Some(JobKind::Topic),
            "FORUM" => Some(JobKind::Forum),
            "BLOG" => Some(JobKind::Blog),
            _ => None,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// `ic` block of a `DISPATCH_WORKER` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TargetDescriptor {
    pub version: i64,
    #[serde(alias = "root")]
    pub root_url: String,
}

/// Typed `DISPATCH_WORKER` payload. The worker type stays a string so an
/// unknown type can be reported as unsupported rather than malformed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DispatchRequest {
    pub ic: TargetDescriptor,
    pub worker_type: String,
}

impl DispatchRequest {
    pub fn new(version: i64, root_url: impl Into<String>, kind: JobKind) -> Self {
        Self {
            ic: TargetDescriptor {
                version,
                root_url: root_url.into(),
            },
            worker_type: kind.tag().to_string(),
        }
    }
}
