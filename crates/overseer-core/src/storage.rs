//! JSON document persistence shared by every component that writes state.
//!
//! Documents are written to `<file>.tmp` and renamed into place so a reader
//! never observes a half-written file.

use crate::error::{OverseerError, OverseerResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> OverseerResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(value)?;
    let tmp = temp_path(path);
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Read and parse a JSON document. Returns `Ok(None)` when the file does not exist.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> OverseerResult<Option<T>> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(OverseerError::Io(e)),
    };
    let value = serde_json::from_slice(&data)?;
    Ok(Some(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        name: String,
        count: u32,
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.json");
        let doc = Doc {
            name: "alpha".into(),
            count: 3,
        };

        write_json_atomic(&path, &doc).await.unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("nested").join("doc.json.tmp").exists());

        let loaded: Option<Doc> = read_json(&path).await.unwrap();
        assert_eq!(loaded, Some(doc));
    }

    #[tokio::test]
    async fn test_read_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: Option<Doc> = read_json(&dir.path().join("absent.json")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_read_corrupt_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, b"{\"name\": ").await.unwrap();
        let result: OverseerResult<Option<Doc>> = read_json(&path).await;
        assert!(matches!(result, Err(OverseerError::Json(_))));
    }
}
