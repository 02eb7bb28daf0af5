use std::fs;

use camino::Utf8Path;

use crate::error::PipelineError;

pub fn create_parent_dirs(path: &Utf8Path) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    }
    Ok(())
}

/// Creates `directory` empty, wiping any previous contents. A plain file at
/// that path is removed first.
pub fn create_or_cleanup_dir(directory: &Utf8Path) -> Result<(), PipelineError> {
    let std_path = directory.as_std_path();
    if std_path.is_dir() {
        fs::remove_dir_all(std_path).map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    } else if std_path.exists() {
        fs::remove_file(std_path).map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    }
    fs::create_dir_all(std_path).map_err(|err| PipelineError::Filesystem(err.to_string()))
}

/// Rename with a copy-and-remove fallback for cross-device moves.
pub fn move_file(source: &Utf8Path, dest: &Utf8Path) -> Result<(), PipelineError> {
    create_parent_dirs(dest)?;
    if fs::rename(source.as_std_path(), dest.as_std_path()).is_ok() {
        return Ok(());
    }
    fs::copy(source.as_std_path(), dest.as_std_path())
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    fs::remove_file(source.as_std_path())
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    Ok(())
}
