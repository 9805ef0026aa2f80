//! Atomic file operations for crash-safe persistence.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{PersistenceError, Result};

/// Ensures a directory exists, creating it and its parents if needed.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|source| PersistenceError::DirectoryError {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

/// Writes `data` into a temp file next to `path` and syncs it.
///
/// The temp file lives in the target directory so the final rename stays on
/// one filesystem. Its name starts with `.tmp` and has no `.json` extension,
/// so directory scanners never pick it up.
fn write_temp(path: &Path, data: &[u8]) -> Result<NamedTempFile> {
    let dir = path.parent().unwrap_or(Path::new("."));
    ensure_dir(dir)?;

    let mut temp_file = NamedTempFile::new_in(dir).map_err(|source| PersistenceError::WriteError {
        path: path.to_path_buf(),
        source,
    })?;

    temp_file
        .write_all(data)
        .map_err(|source| PersistenceError::WriteError {
            path: path.to_path_buf(),
            source,
        })?;

    temp_file
        .as_file()
        .sync_all()
        .map_err(|source| PersistenceError::WriteError {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(temp_file)
}

/// Writes data to a file atomically, replacing any existing file.
///
/// This function writes to a temporary file first, then renames it to the
/// target path. The file is never visible in a partially written state,
/// even if the process crashes.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let temp_file = write_temp(path, data)?;

    temp_file
        .persist(path)
        .map_err(|e| PersistenceError::WriteError {
            path: path.to_path_buf(),
            source: e.error,
        })?;

    Ok(())
}

/// Writes JSON data to a file atomically.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    atomic_write(path, json.as_bytes())
}

/// Creates a new file atomically, failing if the target already exists.
///
/// Readers either see no file or the complete content.
pub fn atomic_create(path: &Path, data: &[u8]) -> Result<()> {
    let temp_file = write_temp(path, data)?;

    temp_file.persist_noclobber(path).map_err(|e| {
        if e.error.kind() == ErrorKind::AlreadyExists {
            PersistenceError::AlreadyExists {
                path: path.to_path_buf(),
            }
        } else {
            PersistenceError::WriteError {
                path: path.to_path_buf(),
                source: e.error,
            }
        }
    })?;

    Ok(())
}

/// Creates a new JSON file atomically, failing if the target already exists.
pub fn atomic_create_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    atomic_create(path, json.as_bytes())
}

/// Moves a file with a single rename.
///
/// Returns `Ok(false)` when `from` does not exist, so callers can treat a
/// repeated move as a no-op.
pub fn move_file(from: &Path, to: &Path) -> Result<bool> {
    if let Some(parent) = to.parent() {
        ensure_dir(parent)?;
    }

    match fs::rename(from, to) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(source) => Err(PersistenceError::WriteError {
            path: to.to_path_buf(),
            source,
        }),
    }
}

/// Appends one line to a file with a single `O_APPEND` write.
///
/// Each call issues exactly one write of the full line, so concurrent
/// appenders interleave whole records rather than fragments.
pub fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let mut record = String::with_capacity(line.len() + 1);
    record.push_str(line);
    record.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| PersistenceError::WriteError {
            path: path.to_path_buf(),
            source,
        })?;

    file.write_all(record.as_bytes())
        .and_then(|_| file.sync_data())
        .map_err(|source| PersistenceError::WriteError {
            path: path.to_path_buf(),
            source,
        })
}

/// Reads and deserializes JSON from a file.
///
/// Content that is not valid UTF-8 JSON is a `SerializeError`, not an I/O
/// failure.
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read(path).map_err(|source| PersistenceError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    let value = serde_json::from_slice(&data)?;
    Ok(value)
}

/// Reads JSON from a file, returning None if the file doesn't exist.
pub fn read_json_optional<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    read_json(path).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestData {
        name: String,
        value: i32,
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/dir/test.txt");

        atomic_write(&path, b"nested content").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "nested content");
    }

    #[test]
    fn test_atomic_write_replaces() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");

        atomic_write_json(&path, &TestData { name: "a".into(), value: 1 }).unwrap();
        atomic_write_json(&path, &TestData { name: "b".into(), value: 2 }).unwrap();

        let loaded: TestData = read_json(&path).unwrap();
        assert_eq!(loaded.value, 2);
    }

    #[test]
    fn test_atomic_create_refuses_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("once.json");

        atomic_create(&path, b"first").unwrap();
        let second = atomic_create(&path, b"second");

        assert!(matches!(second, Err(PersistenceError::AlreadyExists { .. })));
        assert_eq!(fs::read_to_string(&path).unwrap(), "first");
    }

    #[test]
    fn test_atomic_create_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        atomic_create(&dir.path().join("a.json"), b"{}").unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.json".to_string()]);
    }

    #[test]
    fn test_move_file() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("pending/x.json");
        let to = dir.path().join("processed/x.json");
        atomic_create(&from, b"payload").unwrap();

        assert!(move_file(&from, &to).unwrap());
        assert!(!from.exists());
        assert_eq!(fs::read_to_string(&to).unwrap(), "payload");

        // Second move is a no-op
        assert!(!move_file(&from, &to).unwrap());
    }

    #[test]
    fn test_append_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log/a.jsonl");

        append_line(&path, "one").unwrap();
        append_line(&path, "two").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn test_read_json_invalid_utf8_is_serialize_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();

        let result: Result<TestData> = read_json(&path);
        assert!(matches!(result, Err(PersistenceError::SerializeError(_))));
    }

    #[test]
    fn test_read_json_optional_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.json");

        let result: Option<TestData> = read_json_optional(&path).unwrap();
        assert!(result.is_none());
    }
}
