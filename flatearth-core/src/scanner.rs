use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::FileExt;
use crate::error::{Error, Result};

/// Finds source files under a search path.
#[derive(Debug, Clone)]
pub struct SourceScanner {
    search_path: PathBuf,
    file_ext: FileExt,
}

impl SourceScanner {
    pub fn new<P: AsRef<Path>>(path: P, file_ext: FileExt) -> Self {
        Self {
            search_path: path.as_ref().to_path_buf(),
            file_ext,
        }
    }

    /// Every matching file, recursively, ordered by path. A search path that
    /// is not a directory yields no files.
    pub fn scan(&self) -> Result<Vec<PathBuf>> {
        if !self.search_path.is_dir() {
            tracing::warn!(path = %self.search_path.display(), "search path is not a directory");
            return Ok(Vec::new());
        }
        tracing::debug!(path = %self.search_path.display(), "scanning sources");

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.search_path).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() && self.file_ext.matches(entry.path()) {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    /// Path of `file` relative to the search path.
    pub fn relative<'a>(&self, file: &'a Path) -> Result<&'a Path> {
        file.strip_prefix(&self.search_path)
            .map_err(|_| Error::InvalidPath(file.to_path_buf()))
    }
}
