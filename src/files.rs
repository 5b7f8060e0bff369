//! Data-set file listing and delete-then-regenerate helpers.

use std::path::{Path, PathBuf};

use glob::MatchOptions;

use crate::error::{EsysError, Result};
use crate::layout::slash_path;

pub const FWL_SUFFIX: &str = ".fwl";
pub const NCD_SUFFIX: &str = ".ncd";
pub const XML_SUFFIX: &str = ".xml";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Regular files in `dir` ending in `suffix`, sorted by name.
///
/// A missing directory lists as empty.
pub fn list_files(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let pattern = format!(
        "{}/*{}",
        glob::Pattern::escape(&slash_path(dir)),
        glob::Pattern::escape(suffix)
    );
    let entries = glob::glob_with(&pattern, MATCH_OPTIONS).map_err(|e| {
        EsysError::io(
            dir,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()),
        )
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| {
            let path = e.path().to_path_buf();
            EsysError::io(path, e.into_error())
        })?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Delete every `suffix` file in `dir`, returning how many went
pub fn remove_files(dir: &Path, suffix: &str) -> Result<usize> {
    let files = list_files(dir, suffix)?;
    for file in &files {
        std::fs::remove_file(file).map_err(|e| EsysError::io(file, e))?;
    }
    if !files.is_empty() {
        tracing::debug!(dir = %dir.display(), suffix, count = files.len(), "Removed stale files");
    }
    Ok(files.len())
}

/// Copy every `suffix` file from `src` into `dest`
pub fn copy_files(src: &Path, suffix: &str, dest: &Path) -> Result<usize> {
    std::fs::create_dir_all(dest).map_err(|e| EsysError::io(dest, e))?;
    let files = list_files(src, suffix)?;
    for file in &files {
        let Some(name) = file.file_name() else {
            continue;
        };
        let target = dest.join(name);
        std::fs::copy(file, &target).map_err(|e| EsysError::io(&target, e))?;
    }
    Ok(files.len())
}

/// `;`-joined forward-slash paths, without a leading separator
pub fn join_listing(files: &[PathBuf]) -> String {
    files
        .iter()
        .map(|f| slash_path(f))
        .collect::<Vec<_>>()
        .join(";")
}

/// `;`-joined listing of the `suffix` files in `dir`
pub fn listing_string(dir: &Path, suffix: &str) -> Result<String> {
    Ok(join_listing(&list_files(dir, suffix)?))
}
