//! Filesystem concerns owned by the receiver: filename sanitization, the
//! hidden-temp-file write path, and atomic finalization.

use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::error::{Error, Result};

/// Sanitizes a sender-supplied filename into a safe basename.
///
/// Rejects outright (returns `None`) any name containing the substring
/// `".."`, starting with `/` or `\`, or beginning with a drive-letter form
/// (`X:` for `X` in `A..=Z` or `a..=z`). Otherwise, path separators `/` and
/// `\` are rewritten to `_`, every other character outside
/// `[A-Za-z0-9._-]` is dropped, and the result must be non-empty.
#[must_use]
pub fn sanitize_filename(raw: &str) -> Option<String> {
    if raw.contains("..") {
        return None;
    }
    if raw.starts_with('/') || raw.starts_with('\\') {
        return None;
    }
    let mut chars = raw.chars();
    if let (Some(first), Some(':')) = (chars.next(), chars.next()) {
        if first.is_ascii_alphabetic() {
            return None;
        }
    }

    let sanitized: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' => c,
            _ => '\0',
        })
        .filter(|&c| c != '\0')
        .collect();

    if sanitized.is_empty() {
        None
    } else {
        Some(sanitized)
    }
}

/// Builds the hidden temp-file path `.<sanitized>.tmp` inside `output_dir`.
#[must_use]
pub fn temp_path(output_dir: &Path, sanitized: &str) -> PathBuf {
    output_dir.join(format!(".{sanitized}.tmp"))
}

/// Builds the final destination path `<output_dir>/<sanitized>`.
#[must_use]
pub fn final_path(output_dir: &Path, sanitized: &str) -> PathBuf {
    output_dir.join(sanitized)
}

/// Returns the bytes of free space available on the filesystem backing
/// `dir`, or `None` if the platform has no way to query it (non-Unix, or the
/// `statvfs` call itself failed).
pub async fn free_space(dir: &Path) -> Option<u64> {
    cfg_free_space(dir).await
}

#[cfg(unix)]
async fn cfg_free_space(dir: &Path) -> Option<u64> {
    let path = dir.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let c_path = std::ffi::CString::new(path.as_os_str().as_encoded_bytes()).ok()?;
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        // SAFETY: `c_path` is a valid NUL-terminated C string for the
        // duration of the call, and `stat` is a plain-data struct libc
        // fills in completely on success.
        let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if rc == 0 {
            Some(stat.f_bavail as u64 * stat.f_frsize as u64)
        } else {
            None
        }
    })
    .await
    .ok()
    .flatten()
}

#[cfg(not(unix))]
async fn cfg_free_space(_dir: &Path) -> Option<u64> {
    None
}

/// Moves `temp` to `target`, replacing any existing file at `target`.
#[cfg(unix)]
async fn cfg_replace(temp: &Path, target: &Path) -> Result<()> {
    fs::rename(temp, target).await.map_err(Error::FileWrite)
}

#[cfg(not(unix))]
async fn cfg_replace(temp: &Path, target: &Path) -> Result<()> {
    if fs::metadata(target).await.is_ok() {
        let _ = fs::remove_file(target).await;
    }
    fs::rename(temp, target).await.map_err(Error::FileWrite)
}

/// Owns the receiver's in-progress write path: a hidden temp file, written
/// to at absolute chunk offsets, finalized by atomic rename.
pub struct FileWriter {
    file: File,
    temp_path: PathBuf,
    final_path: PathBuf,
}

impl FileWriter {
    /// Creates the hidden temp file for a fresh (non-resuming) write.
    ///
    /// # Errors
    /// Returns `Error::FileOpen` if the temp file cannot be created.
    pub async fn create(output_dir: &Path, sanitized: &str) -> Result<Self> {
        let temp_path = temp_path(output_dir, sanitized);
        let file = File::create(&temp_path).await.map_err(Error::FileOpen)?;
        Ok(Self {
            file,
            temp_path,
            final_path: final_path(output_dir, sanitized),
        })
    }

    /// Writes `bytes` at absolute `offset` and flushes.
    ///
    /// # Errors
    /// Returns `Error::FileSeek` if seeking fails, `Error::FileWrite` if the
    /// write or flush fails.
    pub async fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        self.file
            .seek(std::io::SeekFrom::Start(offset))
            .await
            .map_err(Error::FileSeek)?;
        self.file.write_all(bytes).await.map_err(Error::FileWrite)?;
        self.file.flush().await.map_err(Error::FileWrite)?;
        Ok(())
    }

    /// Closes the temp file and atomically renames it to its final path.
    ///
    /// On Unix, `rename` already atomically replaces an existing target, so
    /// that's the whole story. On platforms where `rename` refuses to
    /// overwrite an existing target, the existing target is removed first —
    /// a known non-atomic window.
    ///
    /// # Errors
    /// Returns `Error::FileWrite` if the rename (or preceding removal)
    /// fails.
    pub async fn finalize(self) -> Result<PathBuf> {
        drop(self.file);
        cfg_replace(&self.temp_path, &self.final_path).await?;
        Ok(self.final_path)
    }

    /// Removes the temp file after an aborted transfer. Errors are ignored:
    /// this runs on the failure path and a missing temp file is not itself a
    /// new failure.
    pub async fn abort(self) {
        drop(self.file);
        let _ = fs::remove_file(&self.temp_path).await;
    }
}

#[cfg(test)]
mod tests {
    use super::{final_path, sanitize_filename, temp_path, FileWriter};

    #[test]
    fn accepts_ordinary_filenames() {
        assert_eq!(sanitize_filename("report.pdf"), Some("report.pdf".to_string()));
        assert_eq!(sanitize_filename("my_file-v2.txt"), Some("my_file-v2.txt".to_string()));
    }

    #[test]
    fn rejects_path_traversal() {
        assert_eq!(sanitize_filename("../etc/passwd"), None);
        assert_eq!(sanitize_filename("a/../../b"), None);
    }

    #[test]
    fn rejects_absolute_paths() {
        assert_eq!(sanitize_filename("/etc/passwd"), None);
        assert_eq!(sanitize_filename("\\Windows\\System32"), None);
    }

    #[test]
    fn rejects_drive_letter_forms() {
        assert_eq!(sanitize_filename("C:\\Windows\\System32\\cmd.exe"), None);
    }

    #[test]
    fn rewrites_separators_and_drops_other_characters() {
        assert_eq!(sanitize_filename("a/b c!.txt"), Some("a_b_c.txt".to_string()));
    }

    #[test]
    fn empty_result_is_rejected() {
        assert_eq!(sanitize_filename("***"), None);
    }

    #[test]
    fn temp_and_final_paths_are_siblings() {
        let dir = std::path::Path::new("/tmp/out");
        assert_eq!(temp_path(dir, "a.txt"), dir.join(".a.txt.tmp"));
        assert_eq!(final_path(dir, "a.txt"), dir.join("a.txt"));
    }

    #[tokio::test]
    async fn write_then_finalize_produces_final_file_with_expected_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FileWriter::create(dir.path(), "out.bin").await.unwrap();
        writer.write_at(0, b"hello").await.unwrap();
        writer.write_at(5, b"world").await.unwrap();
        let final_path = writer.finalize().await.unwrap();
        let contents = tokio::fs::read(&final_path).await.unwrap();
        assert_eq!(contents, b"helloworld");
        assert!(!tokio::fs::try_exists(dir.path().join(".out.bin.tmp")).await.unwrap());
    }

    #[tokio::test]
    async fn abort_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FileWriter::create(dir.path(), "out.bin").await.unwrap();
        let temp = temp_path(dir.path(), "out.bin");
        assert!(tokio::fs::try_exists(&temp).await.unwrap());
        writer.abort().await;
        assert!(!tokio::fs::try_exists(&temp).await.unwrap());
    }
}
