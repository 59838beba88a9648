//! SHA-256 helpers for declared-checksum verification.

use eyre::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

const READ_BUF_SIZE: usize = 64 * 1024;

/// Compute the lowercase hex SHA-256 digest of a file, streaming in 64 KiB
/// reads so large payloads never sit in memory whole.
pub async fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .await
        .with_context(|| format!("opening {} for checksum", path.display()))?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        let read = file
            .read(&mut buf)
            .await
            .with_context(|| format!("reading {} for checksum", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Case-insensitive digest comparison, tolerating dash separators some
/// producers insert between hex bytes.
pub fn checksums_match(declared: &str, actual: &str) -> bool {
    let normalize = |s: &str| s.replace('-', "").to_ascii_lowercase();
    normalize(declared) == normalize(actual)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn digest_matches_known_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.bin");
        tokio::fs::write(&path, b"hello world").await.unwrap();

        let digest = sha256_file(&path).await.unwrap();
        assert_eq!(
            digest,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(sha256_file(&dir.path().join("absent")).await.is_err());
    }

    #[test]
    fn comparison_ignores_case_and_dashes() {
        assert!(checksums_match("AB-CD-12", "abcd12"));
        assert!(checksums_match("abcd12", "ABCD12"));
        assert!(!checksums_match("abcd12", "abcd13"));
    }
}
