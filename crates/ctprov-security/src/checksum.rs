use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

pub fn sha256_hex(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

pub fn verify_sha256(payload: &[u8], expected_hex: &str) -> bool {
    sha256_hex(payload).eq_ignore_ascii_case(expected_hex.trim())
}

pub fn verify_sha256_reader<R: Read>(reader: &mut R, expected_hex: &str) -> Result<bool> {
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 64 * 1024];
    loop {
        let read = reader
            .read(&mut buffer)
            .context("failed to read payload for sha256")?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    let actual = hex::encode(hasher.finalize());
    Ok(actual.eq_ignore_ascii_case(expected_hex.trim()))
}

pub fn verify_sha256_file(path: &Path, expected_hex: &str) -> Result<bool> {
    let file = File::open(path)
        .with_context(|| format!("failed to open {} for sha256", path.display()))?;
    let mut reader = BufReader::new(file);
    verify_sha256_reader(&mut reader, expected_hex)
        .with_context(|| format!("failed to hash {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn sha256_hex_of_empty_payload() {
        assert_eq!(sha256_hex(b""), EMPTY_SHA256);
    }

    #[test]
    fn verify_sha256_is_case_insensitive() {
        assert!(verify_sha256(b"", &EMPTY_SHA256.to_ascii_uppercase()));
        assert!(!verify_sha256(b"tampered", EMPTY_SHA256));
    }

    #[test]
    fn verify_sha256_reader_matches_in_memory_digest() {
        let payload = vec![7_u8; 200_000];
        let expected = sha256_hex(&payload);
        let mut reader = Cursor::new(payload);
        assert!(verify_sha256_reader(&mut reader, &expected).expect("must hash"));
    }

    #[test]
    fn verify_sha256_file_reports_missing_file() {
        let missing = std::env::temp_dir().join(format!(
            "ctprov-security-missing-{}",
            std::process::id()
        ));
        let err = verify_sha256_file(&missing, EMPTY_SHA256).expect_err("must fail");
        assert!(err.to_string().contains("failed to open"));
    }
}
