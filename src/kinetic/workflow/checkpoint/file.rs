// SPDX-License-Identifier: MIT

//! Filesystem checkpoint storage
//!
//! Layout: `<root>/<workflow>/<checkpoint id>.json`. Ids start with a UTC
//! timestamp so a lexical sort lists checkpoints oldest first.

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::CheckpointStorage;
use crate::adk::error::CheckpointError;

pub struct FileCheckpointStorage {
    root: PathBuf,
}

impl FileCheckpointStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn workflow_dir(&self, workflow_id: &str) -> PathBuf {
        let sanitized: String = workflow_id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.root.join(sanitized)
    }

    /// Locate a checkpoint file by id across workflow directories
    async fn find(&self, checkpoint_id: &str) -> Result<Option<PathBuf>, CheckpointError> {
        if checkpoint_id.is_empty()
            || !checkpoint_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Ok(None);
        }

        let file_name = format!("{}.json", checkpoint_id);
        let mut dirs = match tokio::fs::read_dir(&self.root).await {
            Ok(dirs) => dirs,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = dirs.next_entry().await? {
            let candidate = entry.path().join(&file_name);
            if tokio::fs::try_exists(&candidate).await? {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl CheckpointStorage for FileCheckpointStorage {
    async fn save(&self, workflow_id: &str, data: Vec<u8>) -> Result<String, CheckpointError> {
        let dir = self.workflow_dir(workflow_id);
        tokio::fs::create_dir_all(&dir).await?;

        let suffix = Uuid::new_v4().simple().to_string();
        let id = format!("{}-{}", Utc::now().format("%Y%m%d%H%M%S%6f"), &suffix[..8]);
        let path = dir.join(format!("{}.json", id));
        tokio::fs::write(&path, data).await?;

        log::debug!("Saved checkpoint {} to {}", id, path.display());
        Ok(id)
    }

    async fn load(&self, checkpoint_id: &str) -> Result<Vec<u8>, CheckpointError> {
        let path = self
            .find(checkpoint_id)
            .await?
            .ok_or_else(|| CheckpointError::NotFound(checkpoint_id.to_string()))?;
        Ok(tokio::fs::read(path).await?)
    }

    async fn list(&self, workflow_id: &str) -> Result<Vec<String>, CheckpointError> {
        let mut entries = match tokio::fs::read_dir(self.workflow_dir(workflow_id)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn delete(&self, checkpoint_id: &str) -> Result<bool, CheckpointError> {
        match self.find(checkpoint_id).await? {
            Some(path) => {
                tokio::fs::remove_file(path).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_load_list_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileCheckpointStorage::new(dir.path());

        let first = storage.save("review flow", b"{\"n\":1}".to_vec()).await.unwrap();
        let second = storage.save("review flow", b"{\"n\":2}".to_vec()).await.unwrap();

        assert!(dir.path().join("review_flow").join(format!("{}.json", first)).exists());
        assert_eq!(storage.load(&second).await.unwrap(), b"{\"n\":2}".to_vec());
        assert_eq!(storage.list("review flow").await.unwrap(), vec![first.clone(), second]);

        assert!(storage.delete(&first).await.unwrap());
        assert!(!storage.delete(&first).await.unwrap());
        assert_eq!(storage.list("review flow").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_root_and_bad_ids() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileCheckpointStorage::new(dir.path().join("absent"));

        assert!(storage.list("wf").await.unwrap().is_empty());
        assert!(matches!(
            storage.load("../etc/passwd").await,
            Err(CheckpointError::NotFound(_))
        ));
        assert!(!storage.delete("nope").await.unwrap());
    }
}
