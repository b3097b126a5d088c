use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::errors::{Result, UpdaterError};

pub fn compute_sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

pub fn compute_sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0_u8; 1024 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Case-insensitive comparison of an expected hex digest against the digest
/// of the file at `path`.
pub fn verify_file_hash(path: &Path, expected: &str) -> Result<()> {
    let actual = compute_sha256_file(path)?;
    let expected = expected.trim();
    if actual.eq_ignore_ascii_case(expected) {
        return Ok(());
    }
    Err(UpdaterError::HashMismatch {
        expected: expected.to_string(),
        actual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        assert_eq!(
            compute_sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn file_hash_is_case_insensitive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("payload.bin");
        std::fs::write(&path, b"abc").expect("write");

        verify_file_hash(
            &path,
            " BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD ",
        )
        .expect("upper-case digest matches");
        let err = verify_file_hash(&path, "ABCD").expect_err("mismatch");
        assert!(matches!(err, UpdaterError::HashMismatch { .. }));
    }
}
