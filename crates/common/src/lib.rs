//! Common types for the Peerlink session workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;

use std::path::Path;

/// Resolve a secret from an environment variable, falling back to a file.
///
/// The variable wins when set. File contents are trimmed; an empty file
/// yields `None`.
pub fn resolve_secret(env_var: &str, file: Option<&Path>) -> Result<Option<Secret<String>>> {
    if let Ok(value) = std::env::var(env_var) {
        return Ok(Some(Secret::new(value)));
    }
    let Some(path) = file else {
        return Ok(None);
    };
    let contents = std::fs::read_to_string(path).map_err(|source| Error::SecretFile {
        path: path.to_path_buf(),
        source,
    })?;
    let value = contents.trim().to_owned();
    if value.is_empty() {
        return Ok(None);
    }
    Ok(Some(Secret::new(value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_secret_reads_trimmed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("password");
        std::fs::write(&path, "s3cret\n").unwrap();

        let secret = resolve_secret("PEERLINK_COMMON_TEST_UNSET_VAR", Some(&path))
            .unwrap()
            .unwrap();
        assert_eq!(secret.expose(), "s3cret");
    }

    #[test]
    fn resolve_secret_empty_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("password");
        std::fs::write(&path, "  \n").unwrap();

        let secret = resolve_secret("PEERLINK_COMMON_TEST_UNSET_VAR", Some(&path)).unwrap();
        assert!(secret.is_none());
    }

    #[test]
    fn resolve_secret_missing_file_names_the_path() {
        let result = resolve_secret(
            "PEERLINK_COMMON_TEST_UNSET_VAR",
            Some(Path::new("/nonexistent/peerlink/password")),
        );
        match result {
            Err(err @ Error::SecretFile { .. }) => {
                assert!(err.to_string().contains("/nonexistent/peerlink/password"));
            }
            other => panic!("expected SecretFile, got {other:?}"),
        }
    }

    #[test]
    fn resolve_secret_without_sources_is_none() {
        let secret = resolve_secret("PEERLINK_COMMON_TEST_UNSET_VAR", None).unwrap();
        assert!(secret.is_none());
    }
}
