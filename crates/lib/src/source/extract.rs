//! Archive extraction.
//!
//! Supports:
//! - `.tar.gz` / `.tgz`
//! - `.tar`
//!
//! The archive's top-level directory is stripped, so `zlib-1.2.11/configure`
//! lands at `<dest>/configure`.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::info;

use crate::source::SourceError;

fn extract_err(archive: &Path, message: impl ToString) -> SourceError {
  SourceError::Extraction {
    archive: archive.to_path_buf(),
    message: message.to_string(),
  }
}

/// Unpack `archive_path` into `dest`, creating it if needed.
pub fn unpack_archive(archive_path: &Path, dest: &Path) -> Result<(), SourceError> {
  let name = archive_path
    .file_name()
    .and_then(|n| n.to_str())
    .ok_or_else(|| extract_err(archive_path, "invalid archive path"))?;

  fs::create_dir_all(dest).map_err(|e| extract_err(archive_path, e))?;
  let file = File::open(archive_path).map_err(|e| extract_err(archive_path, e))?;

  if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
    unpack_tar(archive_path, GzDecoder::new(BufReader::new(file)), dest)?;
  } else if name.ends_with(".tar") {
    unpack_tar(archive_path, BufReader::new(file), dest)?;
  } else {
    return Err(extract_err(archive_path, "unsupported archive format"));
  }

  info!(archive = ?archive_path, dest = ?dest, "unpacked");
  Ok(())
}

fn unpack_tar<R: Read>(archive_path: &Path, reader: R, dest: &Path) -> Result<(), SourceError> {
  let mut archive = Archive::new(reader);
  let mut unpacked = 0usize;

  for entry in archive.entries().map_err(|e| extract_err(archive_path, e))? {
    let mut entry = entry.map_err(|e| extract_err(archive_path, e))?;
    let path = entry.path().map_err(|e| extract_err(archive_path, e))?;

    // Strip the first component (e.g., zlib-1.2.11/)
    let stripped: PathBuf = path.components().skip(1).collect();

    if stripped.as_os_str().is_empty() {
      continue;
    }
    if stripped.components().any(|c| !matches!(c, Component::Normal(_))) {
      return Err(extract_err(
        archive_path,
        format!("entry escapes the source tree: {}", stripped.display()),
      ));
    }

    let dest_path = dest.join(&stripped);

    if let Some(parent) = dest_path.parent() {
      fs::create_dir_all(parent).map_err(|e| extract_err(archive_path, e))?;
    }

    entry.unpack(&dest_path).map_err(|e| extract_err(archive_path, e))?;
    unpacked += 1;
  }

  if unpacked == 0 {
    return Err(extract_err(archive_path, "archive is empty"));
  }

  Ok(())
}
