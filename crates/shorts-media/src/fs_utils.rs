//! Filesystem utilities for moving outputs and writing FFmpeg side files.
//!
//! Outputs are rendered inside per-job temp directories and then moved into
//! place, which may cross filesystems (EXDEV).

use std::path::Path;
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Move a file from `src` to `dst`, handling cross-device moves.
///
/// A plain rename is tried first. On EXDEV the file is copied next to `dst`
/// and renamed into place, then the source is removed.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            tracing::debug!(
                "Cross-device rename, falling back to copy+delete: {} -> {}",
                src.display(),
                dst.display()
            );
            copy_and_delete(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// Check if an IO error is EXDEV (cross-device link).
fn is_cross_device_error(e: &std::io::Error) -> bool {
    // EXDEV is error code 18 on Linux/macOS
    e.raw_os_error() == Some(18)
}

async fn copy_and_delete(src: &Path, dst: &Path) -> MediaResult<()> {
    // Same directory as dst, so the final rename stays on one filesystem
    let tmp_dst = dst.with_extension("partial");

    fs::copy(src, &tmp_dst).await.map_err(|e| {
        tracing::error!(
            "Failed to copy {} -> {}: {}",
            src.display(),
            tmp_dst.display(),
            e
        );
        MediaError::from(e)
    })?;

    if let Err(e) = fs::rename(&tmp_dst, dst).await {
        let _ = fs::remove_file(&tmp_dst).await;
        return Err(MediaError::from(e));
    }

    if let Err(e) = fs::remove_file(src).await {
        tracing::warn!(
            "Failed to remove source after cross-device move: {}: {}",
            src.display(),
            e
        );
    }

    Ok(())
}

/// True if `path` is a regular file with at least one byte.
pub async fn is_nonempty_file(path: impl AsRef<Path>) -> bool {
    match fs::metadata(path.as_ref()).await {
        Ok(meta) => meta.is_file() && meta.len() > 0,
        Err(_) => false,
    }
}

/// Size of a file in bytes, 0 if it cannot be read.
pub async fn file_size(path: impl AsRef<Path>) -> u64 {
    fs::metadata(path.as_ref())
        .await
        .map(|m| m.len())
        .unwrap_or(0)
}

/// One line of an FFmpeg concat-demuxer list.
///
/// Single quotes inside the path are closed, escaped and reopened.
pub fn concat_list_entry(path: &Path) -> String {
    let escaped = path.to_string_lossy().replace('\'', r"'\''");
    format!("file '{}'", escaped)
}

/// Write a concat-demuxer list file for `paths`.
pub async fn write_concat_list(list_path: &Path, paths: &[impl AsRef<Path>]) -> MediaResult<()> {
    let mut body = String::new();
    for p in paths {
        body.push_str(&concat_list_entry(p.as_ref()));
        body.push('\n');
    }
    fs::write(list_path, body).await?;
    Ok(())
}
