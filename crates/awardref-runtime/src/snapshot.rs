// SPDX-License-Identifier: Apache-2.0

//! Per-dataset snapshot files: `<cache_root>/snapshots/<key>.json`.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use awardref_core::SnapshotError;
use awardref_model::DatasetSnapshot;

#[must_use]
pub fn snapshot_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

pub fn write_snapshot(path: &Path, snapshot: &DatasetSnapshot) -> Result<(), SnapshotError> {
    let bytes =
        serde_json::to_vec_pretty(snapshot).map_err(|e| SnapshotError(e.to_string()))?;
    write_atomic_file(path, &bytes)
}

/// Reads a snapshot and the modification time of its file. `Ok(None)` when
/// the file does not exist.
pub fn read_snapshot(path: &Path) -> Result<Option<(DatasetSnapshot, SystemTime)>, SnapshotError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SnapshotError(format!("{}: {e}", path.display()))),
    };
    let snapshot: DatasetSnapshot = serde_json::from_slice(&bytes)
        .map_err(|e| SnapshotError(format!("{}: {e}", path.display())))?;
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| SnapshotError(format!("{}: {e}", path.display())))?;
    Ok(Some((snapshot, modified)))
}

pub fn remove_snapshot(path: &Path) -> Result<bool, SnapshotError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SnapshotError(format!("{}: {e}", path.display()))),
    }
}

fn write_atomic_file(path: &Path, bytes: &[u8]) -> Result<(), SnapshotError> {
    let parent = path
        .parent()
        .ok_or_else(|| SnapshotError("atomic write missing parent".to_string()))?;
    std::fs::create_dir_all(parent).map_err(|e| SnapshotError(e.to_string()))?;
    let tmp = parent.join(format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|s| s.to_str()).unwrap_or("snapshot"),
        std::process::id()
    ));
    {
        let mut f = std::fs::File::create(&tmp).map_err(|e| SnapshotError(e.to_string()))?;
        f.write_all(bytes).map_err(|e| SnapshotError(e.to_string()))?;
        f.sync_all().map_err(|e| SnapshotError(e.to_string()))?;
    }
    std::fs::rename(&tmp, path).map_err(|e| SnapshotError(e.to_string()))?;
    if let Ok(dir) = std::fs::File::open(parent) {
        let _ = dir.sync_all();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> DatasetSnapshot {
        DatasetSnapshot {
            key: "pota".to_string(),
            name: "Parks on the Air".to_string(),
            version: "2024-05-01".to_string(),
            count: 81_234,
            refreshed_at: 1_714_521_600,
        }
    }

    #[test]
    fn written_snapshot_reads_back_with_mtime() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = snapshot_path(&dir.path().join("snapshots"), "pota");
        write_snapshot(&path, &snapshot()).expect("write");

        let (read, modified) = read_snapshot(&path).expect("read").expect("present");
        assert_eq!(read, snapshot());
        assert!(modified <= SystemTime::now());
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().expect("parent"))
            .expect("list")
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn missing_snapshot_is_none_and_corrupt_one_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = snapshot_path(dir.path(), "sota");
        assert!(read_snapshot(&path).expect("read").is_none());
        assert!(!remove_snapshot(&path).expect("remove"));

        std::fs::write(&path, b"{\"key\":").expect("write");
        let err = read_snapshot(&path).expect_err("corrupt");
        assert!(err.0.contains("sota.json"));
        assert!(remove_snapshot(&path).expect("remove"));
    }
}
