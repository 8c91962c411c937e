use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::StormError;
use crate::storage::lock::acquire_memory;
use crate::storage::{
    OpportunityRecord, RecordPatch, RecordPredicate, RecordStore, RunLease,
};

/// 进程内记录存储，用于测试和一次性运行
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, OpportunityRecord>>,
    held: Arc<std::sync::Mutex<HashSet<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<OpportunityRecord>> {
        Ok(self.records.lock().await.get(id).cloned())
    }

    async fn upsert(&self, mut record: OpportunityRecord) -> Result<()> {
        record.updated_at = Utc::now();
        self.records.lock().await.insert(record.id.clone(), record);
        Ok(())
    }

    async fn modify(&self, id: &str, patch: RecordPatch) -> Result<OpportunityRecord> {
        let mut records = self.records.lock().await;
        let stored = records
            .get_mut(id)
            .ok_or_else(|| StormError::OpportunityNotFound(id.to_string()))?;
        // 失败的修改不落地
        let mut record = stored.clone();
        patch(&mut record)?;
        record.updated_at = Utc::now();
        *stored = record.clone();
        Ok(record)
    }

    async fn list(&self, predicate: RecordPredicate<'_>) -> Result<Vec<OpportunityRecord>> {
        Ok(self
            .records
            .lock()
            .await
            .values()
            .filter(|record| predicate(record))
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.records.lock().await.remove(id).is_some())
    }

    async fn acquire_run_lock(&self, id: &str) -> Result<RunLease> {
        Ok(acquire_memory(&self.held, id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RecordField;
    use crate::types::opportunity::{Opportunity, PipelineStatus};

    #[tokio::test]
    async fn test_failed_patch_leaves_record_untouched() {
        let store = MemoryStore::new();
        store
            .upsert(OpportunityRecord::new(&Opportunity::new("Acme").unwrap()))
            .await
            .unwrap();
        store
            .set_status("acme", PipelineStatus::Complete)
            .await
            .unwrap();

        assert!(store
            .set_status("acme", PipelineStatus::Initiated)
            .await
            .is_err());
        store
            .update("acme", vec![(RecordField::RunConfig, "{}".to_string())])
            .await
            .unwrap();

        let record = store.get("acme").await.unwrap().unwrap();
        assert_eq!(record.status, PipelineStatus::Complete);
        assert_eq!(record.run_config.as_deref(), Some("{}"));
        assert_eq!(store.list(&|_| true).await.unwrap().len(), 1);
        assert!(store.delete("acme").await.unwrap());
        assert!(store.get("acme").await.unwrap().is_none());
    }
}
