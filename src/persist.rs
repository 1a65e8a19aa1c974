//! Atomic file persistence helpers
//!
//! Every on-disk artifact in the crate is a snapshot written as
//! write-temp, fsync, rename. Live files are never edited in place.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Write bytes to `<path>.tmp`, fsync, then rename over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)
}

/// Serialize a value as JSON and write it atomically.
pub(crate) fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), SaveError> {
    let bytes = serde_json::to_vec(value)?;
    write_atomic(path, &bytes)?;
    Ok(())
}

/// Load a JSON file, returning the default when the file does not exist.
pub(crate) fn load_json_or_default<T: DeserializeOwned + Default>(
    path: &Path,
) -> Result<T, SaveError> {
    if !path.exists() {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(&fs::read(path)?)?)
}

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn tmp_path(path: &Path) -> std::path::PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    std::path::PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("table.json");

        let mut table: HashMap<String, u32> = HashMap::new();
        table.insert("a".into(), 1);
        save_json(&path, &table).unwrap();

        let loaded: HashMap<String, u32> = load_json_or_default(&path).unwrap();
        assert_eq!(loaded, table);
        // No temp file left behind
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn missing_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: HashMap<String, u32> =
            load_json_or_default(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_empty());
    }
}
