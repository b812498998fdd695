use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("export directory {path} is unusable: {message}")]
    OutputDir { path: PathBuf, message: String },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl PersistError {
    fn output_dir(dir: &Path, message: impl ToString) -> Self {
        PersistError::OutputDir {
            path: dir.to_path_buf(),
            message: message.to_string(),
        }
    }
}

/// Creates `dir` when missing and checks that files can be created in it.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    match fs::metadata(dir) {
        Ok(meta) if !meta.is_dir() => {
            return Err(PersistError::output_dir(dir, "not a directory"));
        }
        Ok(_) => {}
        Err(_) => fs::create_dir_all(dir).map_err(|e| PersistError::output_dir(dir, e))?,
    }
    NamedTempFile::new_in(dir).map_err(|e| PersistError::output_dir(dir, e))?;
    Ok(())
}

/// Writes whole files under one directory. Content goes to a temporary file
/// that is synced and then renamed, so readers never see a partial file.
#[derive(Debug, Clone)]
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Writes each item of `lines` followed by `\n` into `{dir}/{filename}`.
    pub fn write_lines<I, S>(&self, filename: &str, lines: I) -> Result<PathBuf, PersistError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ensure_output_dir(&self.dir)?;

        let target = self.dir.join(filename);
        let tmp = NamedTempFile::new_in(&self.dir)?;
        let mut out = BufWriter::new(tmp);
        for line in lines {
            out.write_all(line.as_ref().as_bytes())?;
            out.write_all(b"\n")?;
        }
        let mut tmp = out.into_inner().map_err(|e| e.into_error())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;

        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }
}
