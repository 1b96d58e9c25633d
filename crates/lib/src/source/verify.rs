//! Archive verification: pinned SHA-256 digests and detached PGP signatures.
//!
//! Signature checking is delegated to `gpg`; only its machine-readable status
//! output is interpreted here. A signature counts only if gpg reports it valid
//! *and* its fingerprint belongs to the package's trust set.

use std::path::Path;

use tracing::debug;

use crate::runner::{ToolCommand, ToolRunner};
use crate::source::SourceError;
use crate::toolchain::EnvironmentMap;
use crate::util::hash::hash_file;

/// Check that the archive matches a pinned SHA-256 digest.
pub fn check_sha256(archive: &Path, expected: &str) -> Result<(), SourceError> {
  let actual = hash_file(archive).map_err(|e| SourceError::Verification {
    archive: archive.to_path_buf(),
    message: format!("cannot hash archive: {}", e),
  })?;

  if !actual.eq_ignore_ascii_case(expected) {
    return Err(SourceError::Verification {
      archive: archive.to_path_buf(),
      message: format!("sha256 mismatch: expected {}, got {}", expected, actual),
    });
  }

  debug!(archive = ?archive, sha256 = %actual, "digest verified");
  Ok(())
}

/// Fingerprints from `VALIDSIG` lines of gpg's `--status-fd` output.
pub fn valid_signature_fingerprints(status: &str) -> Vec<String> {
  status
    .lines()
    .filter_map(|line| {
      let mut fields = line.split_whitespace();
      match (fields.next(), fields.next(), fields.next()) {
        (Some("[GNUPG:]"), Some("VALIDSIG"), Some(fingerprint)) => Some(fingerprint.to_uppercase()),
        _ => None,
      }
    })
    .collect()
}

/// Verify a detached signature over `archive` against the trusted `keys`.
///
/// Returns the fingerprint of the accepted key.
pub async fn verify_signature<R: ToolRunner>(
  runner: &R,
  archive: &Path,
  signature: &Path,
  keys: &[String],
  env: &EnvironmentMap,
) -> Result<String, SourceError> {
  let failure = |message: String| SourceError::Verification {
    archive: archive.to_path_buf(),
    message,
  };

  let command = ToolCommand::new("gpg")
    .args(["--batch", "--status-fd", "1", "--verify"])
    .arg(signature.to_string_lossy())
    .arg(archive.to_string_lossy())
    .capture();

  let cwd = archive.parent().unwrap_or(Path::new("."));
  let output = runner
    .run(&command, cwd, env)
    .await
    .map_err(|e| failure(e.to_string()))?;

  if !output.success() {
    return Err(failure(format!(
      "gpg exited with {:?}: {}",
      output.code,
      output.stderr.trim()
    )));
  }

  let trusted: Vec<String> = keys.iter().map(|k| k.replace(' ', "").to_uppercase()).collect();
  let accepted = valid_signature_fingerprints(&output.stdout)
    .into_iter()
    .find(|fpr| trusted.iter().any(|key| key == fpr));

  match accepted {
    Some(fingerprint) => {
      debug!(archive = ?archive, key = %fingerprint, "signature verified");
      Ok(fingerprint)
    }
    None => Err(failure("no valid signature from a trusted key".to_string())),
  }
}
