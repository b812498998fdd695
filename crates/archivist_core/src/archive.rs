use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    Messenger,
    Topic,
}

/// One normalized post. `content` is the rewritten HTML fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub author: String,
    pub datetime: String,
    pub link: String,
    pub content: String,
}

/// Per-author metadata gathered while archiving.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    pub profile_url: String,
    pub avatar_url: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub group_icon_url: String,
}

/// Terminal output of an archival job.
///
/// Pages keep pagination order and posts keep document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveResult {
    pub title: String,
    pub content_type: ContentType,
    pub user_data: BTreeMap<String, UserData>,
    pub pages: Vec<Vec<Post>>,
}

impl ArchiveResult {
    pub fn new(title: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            title: title.into(),
            content_type,
            user_data: BTreeMap::new(),
            pages: Vec::new(),
        }
    }

    pub fn push_page(&mut self, posts: Vec<Post>) {
        self.pages.push(posts);
    }

    /// Keeps the first record seen for an author.
    pub fn record_user(&mut self, author: &str, data: UserData) {
        self.user_data.entry(author.to_string()).or_insert(data);
    }

    pub fn knows_user(&self, author: &str) -> bool {
        self.user_data.contains_key(author)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn post_count(&self) -> usize {
        self.pages.iter().map(Vec::len).sum()
    }
}
