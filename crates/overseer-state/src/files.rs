//! Filesystem helpers over a tree of JSON state documents.

use crate::version::Version;
use overseer_core::OverseerResult;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Every `*.json` file under `root`, keyed by its path relative to `root`
/// and sorted by that path. A missing root yields an empty map.
pub async fn collect_json_files(root: &Path) -> OverseerResult<BTreeMap<PathBuf, PathBuf>> {
    let mut files = BTreeMap::new();
    if !root.exists() {
        return Ok(files);
    }

    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() && path.extension().is_some_and(|e| e == "json") {
                if let Ok(rel) = path.strip_prefix(root) {
                    files.insert(rel.to_path_buf(), path.clone());
                }
            }
        }
    }
    Ok(files)
}

/// SHA-256 over the concatenated bytes of `files`, in map (path) order.
pub async fn hash_files(files: &BTreeMap<PathBuf, PathBuf>) -> OverseerResult<String> {
    let mut hasher = Sha256::new();
    for path in files.values() {
        hasher.update(tokio::fs::read(path).await?);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Copy `files` under `dest`, preserving relative paths.
pub async fn copy_files(files: &BTreeMap<PathBuf, PathBuf>, dest: &Path) -> OverseerResult<()> {
    tokio::fs::create_dir_all(dest).await?;
    for (rel, src) in files {
        let target = dest.join(rel);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(src, &target).await?;
    }
    Ok(())
}

/// Versions of the `v<major>.<minor>.<patch>` directories directly under
/// `dir`. Other entries are ignored.
pub async fn snapshot_dir_versions(dir: &Path) -> OverseerResult<Vec<Version>> {
    let mut versions = Vec::new();
    if !dir.exists() {
        return Ok(versions);
    }
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if let Some(version) = name
            .to_str()
            .and_then(|n| n.strip_prefix('v'))
            .and_then(|n| n.parse::<Version>().ok())
        {
            versions.push(version);
        }
    }
    versions.sort();
    Ok(versions)
}

/// Remove a directory tree, treating "already gone" as success.
pub async fn remove_dir_if_exists(dir: &Path) -> OverseerResult<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collect_is_recursive_and_json_only() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        tokio::fs::create_dir_all(root.join("agent_1")).await.unwrap();
        tokio::fs::write(root.join("b.json"), b"{}").await.unwrap();
        tokio::fs::write(root.join("agent_1/current_state.json"), b"{}").await.unwrap();
        tokio::fs::write(root.join("notes.txt"), b"x").await.unwrap();
        tokio::fs::write(root.join("a.json.tmp"), b"x").await.unwrap();

        let files = collect_json_files(root).await.unwrap();
        let rels: Vec<_> = files.keys().cloned().collect();
        assert_eq!(
            rels,
            vec![PathBuf::from("agent_1/current_state.json"), PathBuf::from("b.json")]
        );
    }

    #[tokio::test]
    async fn test_hash_depends_on_content_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        tokio::fs::write(root.join("a.json"), b"1").await.unwrap();
        tokio::fs::write(root.join("b.json"), b"2").await.unwrap();
        let first = hash_files(&collect_json_files(root).await.unwrap()).await.unwrap();
        assert_eq!(first.len(), 64);

        let again = hash_files(&collect_json_files(root).await.unwrap()).await.unwrap();
        assert_eq!(first, again);

        tokio::fs::write(root.join("b.json"), b"3").await.unwrap();
        let changed = hash_files(&collect_json_files(root).await.unwrap()).await.unwrap();
        assert_ne!(first, changed);
    }

    #[tokio::test]
    async fn test_snapshot_dir_versions() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["v1.0.2", "v1.0.10", "v2.0.0", "restore-staging", "vx.y.z"] {
            tokio::fs::create_dir_all(dir.path().join(name)).await.unwrap();
        }
        tokio::fs::write(dir.path().join("v3.0.0"), b"not a dir").await.unwrap();

        let versions = snapshot_dir_versions(dir.path()).await.unwrap();
        assert_eq!(
            versions,
            vec![Version::new(1, 0, 2), Version::new(1, 0, 10), Version::new(2, 0, 0)]
        );
        assert!(snapshot_dir_versions(&dir.path().join("none")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let files = collect_json_files(&dir.path().join("nope")).await.unwrap();
        assert!(files.is_empty());
        remove_dir_if_exists(&dir.path().join("nope")).await.unwrap();
    }
}
