use std::collections::HashMap;
use std::sync::Arc;

use archivist_core::{ArchiveResult, ForumVersion, JobKind};

use crate::context::{JobContext, JobError};
use crate::workers::{MessengerWorker, TopicWorker};

/// The part of a job that differs per kind: runs after sign-in and returns
/// the archive, or `None` when there is nothing to export.
pub trait JobHandler: Send {
    fn execute(&self, ctx: &mut JobContext) -> Result<Option<ArchiveResult>, JobError>;
}

pub type HandlerFactory = Arc<dyn Fn() -> Box<dyn JobHandler> + Send + Sync>;

#[derive(Clone)]
pub enum HandlerEntry {
    Implemented(HandlerFactory),
    Unsupported,
}

impl HandlerEntry {
    pub fn implemented<F>(factory: F) -> Self
    where
        F: Fn() -> Box<dyn JobHandler> + Send + Sync + 'static,
    {
        HandlerEntry::Implemented(Arc::new(factory))
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, HandlerEntry::Implemented(_))
    }
}

/// Which job kinds are available for which forum version.
#[derive(Clone)]
pub struct HandlerTable {
    entries: HashMap<(JobKind, ForumVersion), HandlerEntry>,
}

impl HandlerTable {
    /// Every combination, all of them unsupported.
    pub fn empty() -> Self {
        let mut entries = HashMap::new();
        for kind in JobKind::ALL {
            for version in [ForumVersion::V4, ForumVersion::V5] {
                entries.insert((kind, version), HandlerEntry::Unsupported);
            }
        }
        Self { entries }
    }

    pub fn standard() -> Self {
        Self::empty()
            .with(
                JobKind::Messenger,
                ForumVersion::V4,
                HandlerEntry::implemented(|| Box::new(MessengerWorker::v4())),
            )
            .with(
                JobKind::Topic,
                ForumVersion::V4,
                HandlerEntry::implemented(|| Box::new(TopicWorker::v4())),
            )
    }

    pub fn with(mut self, kind: JobKind, version: ForumVersion, entry: HandlerEntry) -> Self {
        self.entries.insert((kind, version), entry);
        self
    }

    pub fn lookup(&self, kind: JobKind, version: ForumVersion) -> HandlerEntry {
        self.entries
            .get(&(kind, version))
            .cloned()
            .unwrap_or(HandlerEntry::Unsupported)
    }
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::standard()
    }
}
