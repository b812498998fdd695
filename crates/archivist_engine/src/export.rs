use std::collections::BTreeMap;
use std::path::PathBuf;

use archivist_core::{ArchiveResult, ContentType, JobId, Post, UserData};
use chrono::Utc;
use engine_logging::engine_info;
use serde::Serialize;
use thiserror::Error;

use crate::filename::export_file_name;
use crate::persist::{AtomicFileWriter, PersistError};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("could not serialize archive: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Persists a finished job's result and returns where it went.
pub trait ExportWriter: Send + Sync {
    fn write(&self, job_id: JobId, result: &ArchiveResult) -> Result<PathBuf, ExportError>;
}

#[derive(Serialize)]
struct HeaderLine<'a> {
    title: &'a str,
    #[serde(rename = "type")]
    content_type: ContentType,
    user_data: &'a BTreeMap<String, UserData>,
}

#[derive(Serialize)]
struct PageLine<'a> {
    page: usize,
    posts: &'a [Post],
}

/// Newline-delimited JSON: one header line, then one line per page
/// (numbered from 1).
#[derive(Debug, Clone)]
pub struct JsonExportWriter {
    files: AtomicFileWriter,
}

impl JsonExportWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            files: AtomicFileWriter::new(dir),
        }
    }

    pub fn render(result: &ArchiveResult) -> Result<Vec<String>, serde_json::Error> {
        let mut lines = Vec::with_capacity(result.pages.len() + 1);
        lines.push(serde_json::to_string(&HeaderLine {
            title: &result.title,
            content_type: result.content_type,
            user_data: &result.user_data,
        })?);
        for (index, posts) in result.pages.iter().enumerate() {
            lines.push(serde_json::to_string(&PageLine {
                page: index + 1,
                posts,
            })?);
        }
        Ok(lines)
    }
}

impl ExportWriter for JsonExportWriter {
    fn write(&self, job_id: JobId, result: &ArchiveResult) -> Result<PathBuf, ExportError> {
        let lines = Self::render(result)?;
        let path = self
            .files
            .write_lines(&export_file_name(job_id, Utc::now()), &lines)?;
        engine_info!(
            "exported {} pages ({} posts) to {}",
            result.page_count(),
            result.post_count(),
            path.display()
        );
        Ok(path)
    }
}
