// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::CheckpointStorage;
use crate::adk::error::CheckpointError;

struct StoredCheckpoint {
    id: String,
    workflow_id: String,
    data: Vec<u8>,
}

/// Process-local checkpoint storage
#[derive(Default)]
pub struct InMemoryCheckpointStorage {
    entries: RwLock<Vec<StoredCheckpoint>>,
}

impl InMemoryCheckpointStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStorage for InMemoryCheckpointStorage {
    async fn save(&self, workflow_id: &str, data: Vec<u8>) -> Result<String, CheckpointError> {
        let id = Uuid::new_v4().to_string();
        self.entries.write().await.push(StoredCheckpoint {
            id: id.clone(),
            workflow_id: workflow_id.to_string(),
            data,
        });
        Ok(id)
    }

    async fn load(&self, checkpoint_id: &str) -> Result<Vec<u8>, CheckpointError> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.id == checkpoint_id)
            .map(|e| e.data.clone())
            .ok_or_else(|| CheckpointError::NotFound(checkpoint_id.to_string()))
    }

    async fn list(&self, workflow_id: &str) -> Result<Vec<String>, CheckpointError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| e.workflow_id == workflow_id)
            .map(|e| e.id.clone())
            .collect())
    }

    async fn delete(&self, checkpoint_id: &str) -> Result<bool, CheckpointError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.id != checkpoint_id);
        Ok(entries.len() < before)
    }
}
