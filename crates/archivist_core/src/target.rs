use std::fmt;

use url::Url;

/// Supported Invision Community major versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ForumVersion {
    V4,
    V5,
}

impl ForumVersion {
    pub fn from_number(number: i64) -> Option<Self> {
        match number {
            4 => Some(ForumVersion::V4),
            5 => Some(ForumVersion::V5),
            _ => None,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            ForumVersion::V4 => 4,
            ForumVersion::V5 => 5,
        }
    }
}

impl fmt::Display for ForumVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.number())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("invalid root url '{url}': {message}")]
    InvalidRootUrl { url: String, message: String },
    #[error("root url must use http or https: {0}")]
    UnsupportedScheme(String),
}

/// The community a job talks to: its version and root address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForumTarget {
    version: ForumVersion,
    root_url: String,
}

impl ForumTarget {
    /// The stored root never ends with `/`.
    pub fn new(version: ForumVersion, root_url: &str) -> Result<Self, TargetError> {
        let trimmed = root_url.trim();
        let parsed = Url::parse(trimmed).map_err(|err| TargetError::InvalidRootUrl {
            url: trimmed.to_string(),
            message: err.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(TargetError::UnsupportedScheme(trimmed.to_string()));
        }
        Ok(Self {
            version,
            root_url: trimmed.trim_end_matches('/').to_string(),
        })
    }

    pub fn version(&self) -> ForumVersion {
        self.version
    }

    pub fn root_url(&self) -> &str {
        &self.root_url
    }

    pub fn auth_url(&self) -> String {
        format!("{}/login", self.root_url)
    }

    pub fn messenger_url(&self) -> String {
        format!("{}/messenger", self.root_url)
    }

    /// Profile slugs are lowercased on v4 communities and kept verbatim on v5.
    pub fn profile_url(&self, user_id: &str, username: &str) -> String {
        let slug = match self.version {
            ForumVersion::V4 => username.to_lowercase(),
            ForumVersion::V5 => username.to_string(),
        };
        format!("{}/profile/{}-{}", self.root_url, user_id, slug)
    }
}
