//! Test input files for I/O benchmark families

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::Result;

const CHUNK: usize = 1 << 20;

/// A zero-filled file a plan needs before its first invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    /// Where the file lives; relative paths are resolved against the
    /// working directory the subjects run in.
    pub path: PathBuf,
    /// Size in bytes.
    pub size_bytes: u64,
}

impl Fixture {
    /// Create the file unless it already exists.
    ///
    /// # Errors
    ///
    /// See [`ensure_test_file`].
    pub fn ensure(&self) -> Result<bool> {
        ensure_test_file(&self.path, self.size_bytes)
    }
}

/// Create `path` as `size_bytes` of zeros. An existing file is left as is,
/// whatever its size. Returns whether the file was created.
///
/// # Errors
///
/// Returns [`crate::Error::Io`] if the file or its parent directory cannot
/// be written.
pub fn ensure_test_file(path: &Path, size_bytes: u64) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    info!(path = %path.display(), size_bytes, "generating test file");
    let mut writer = BufWriter::new(File::create(path)?);
    let zeros = vec![0_u8; CHUNK];
    let mut remaining = size_bytes;
    while remaining > 0 {
        let n = usize::try_from(remaining).map_or(CHUNK, |r| r.min(CHUNK));
        writer.write_all(&zeros[..n])?;
        remaining -= n as u64;
    }
    writer.flush()?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_zero_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/test_file.bin");
        let size = (CHUNK as u64) * 2 + 17;

        assert!(ensure_test_file(&path, size).unwrap());
        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len() as u64, size);
        assert!(bytes.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_existing_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_file.bin");
        fs::write(&path, b"keep").unwrap();

        let fixture = Fixture {
            path: path.clone(),
            size_bytes: 4096,
        };
        assert!(!fixture.ensure().unwrap());
        assert_eq!(fs::read(&path).unwrap(), b"keep");
    }
}
