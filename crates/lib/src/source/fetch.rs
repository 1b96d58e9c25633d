//! Archive download.
//!
//! Files are streamed to `<dest>.part` and renamed into place only once the
//! transfer completes, so a file at `dest` is always a whole download.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::consts::APP_NAME;
use crate::source::SourceError;
use crate::util::hash::hash_bytes;

fn fetch_err(url: &str, message: impl ToString) -> SourceError {
  SourceError::Fetch {
    url: url.to_string(),
    message: message.to_string(),
  }
}

/// HTTP client used for every download, identifying itself as droidforge.
pub fn http_client() -> Result<reqwest::Client, SourceError> {
  reqwest::Client::builder()
    .user_agent(format!("{}/{}", APP_NAME, env!("CARGO_PKG_VERSION")))
    .build()
    .map_err(|e| SourceError::Client(e.to_string()))
}

/// Download `url` to `dest`. No retries; any transport or HTTP error is a fetch error.
///
/// Returns the number of bytes written.
pub async fn fetch_url(client: &reqwest::Client, url: &str, dest: &Path) -> Result<u64, SourceError> {
  info!(url = %url, "fetching");

  if let Some(parent) = dest.parent() {
    fs::create_dir_all(parent).await.map_err(|e| fetch_err(url, e))?;
  }

  let mut response = client.get(url).send().await.map_err(|e| fetch_err(url, e))?;
  if !response.status().is_success() {
    return Err(fetch_err(url, format!("HTTP {}", response.status())));
  }

  let partial = part_path(dest);
  let mut file = fs::File::create(&partial).await.map_err(|e| fetch_err(url, e))?;
  let mut written = 0u64;

  loop {
    let chunk = match response.chunk().await {
      Ok(Some(chunk)) => chunk,
      Ok(None) => break,
      Err(e) => {
        drop(file);
        let _ = fs::remove_file(&partial).await;
        return Err(fetch_err(url, e));
      }
    };
    file.write_all(&chunk).await.map_err(|e| fetch_err(url, e))?;
    written += chunk.len() as u64;
  }

  file.flush().await.map_err(|e| fetch_err(url, e))?;
  drop(file);
  fs::rename(&partial, dest).await.map_err(|e| fetch_err(url, e))?;

  info!(path = ?dest, size = written, "download complete");
  Ok(written)
}

fn part_path(dest: &Path) -> PathBuf {
  let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
  name.push(".part");
  dest.with_file_name(name)
}

/// Convert a URL to a safe filename.
///
/// Takes the last path component and sanitizes it. Falls back to a hash of the
/// URL if no suitable filename can be extracted.
pub fn url_to_filename(url: &str) -> String {
  if let Some(filename) = url.rsplit('/').next() {
    let filename = filename.split('?').next().unwrap_or(filename);

    let sanitized: String = filename
      .chars()
      .map(|c| {
        if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
          c
        } else {
          '_'
        }
      })
      .collect();

    if !sanitized.is_empty() && sanitized != "." && sanitized != ".." {
      return sanitized;
    }
  }

  format!("download_{}", &hash_bytes(url.as_bytes())[..16])
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn http_client_builds_with_user_agent() {
    assert!(http_client().is_ok());
  }

  #[test]
  fn url_to_filename_simple() {
    assert_eq!(url_to_filename("https://example.com/file.tar.gz"), "file.tar.gz");
  }

  #[test]
  fn url_to_filename_with_query() {
    assert_eq!(url_to_filename("https://example.com/file.tar.gz?token=abc"), "file.tar.gz");
  }

  #[test]
  fn url_to_filename_fallback_for_empty() {
    assert!(url_to_filename("https://example.com/").starts_with("download_"));
  }

  #[test]
  fn part_path_appends_suffix() {
    assert_eq!(
      part_path(Path::new("/cache/ncurses-6.1.tar.gz")),
      PathBuf::from("/cache/ncurses-6.1.tar.gz.part")
    );
  }

  #[tokio::test]
  async fn fetch_writes_body_and_removes_part_file() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("GET", "/zlib.tar.gz")
      .with_status(200)
      .with_body("archive-bytes")
      .create_async()
      .await;

    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("downloads").join("zlib.tar.gz");
    let url = format!("{}/zlib.tar.gz", server.url());

    let written = fetch_url(&reqwest::Client::new(), &url, &dest).await.unwrap();

    mock.assert_async().await;
    assert_eq!(written, 13);
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), "archive-bytes");
    assert!(!part_path(&dest).exists());
  }

  #[tokio::test]
  async fn http_error_status_is_a_fetch_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server.mock("GET", "/missing.tar.gz").with_status(404).create_async().await;

    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("missing.tar.gz");
    let url = format!("{}/missing.tar.gz", server.url());

    let err = fetch_url(&reqwest::Client::new(), &url, &dest).await.unwrap_err();
    assert!(matches!(err, SourceError::Fetch { ref message, .. } if message.contains("404")));
    assert!(!dest.exists());
  }
}
