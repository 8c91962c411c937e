use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::error::StormError;
use crate::storage::lock::acquire_file;
use crate::storage::{
    OpportunityRecord, RecordPatch, RecordPredicate, RecordStore, RunLease,
};

/// 每个机会一个 JSON 文件的记录存储
///
/// 写入先落到临时文件再 rename，进程崩溃不会留下半截记录。
pub struct JsonFileStore {
    dir: PathBuf,
    lock_stale_after: Duration,
    /// 串行化本进程内的读改写
    write_guard: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>, lock_stale_minutes: u64) -> Self {
        Self {
            dir: dir.into(),
            lock_stale_after: Duration::minutes(lock_stale_minutes as i64),
            write_guard: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.dir.join(format!("{}.json", id)))
    }

    fn lock_path(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.dir.join(format!("{}.lock", id)))
    }

    async fn read_record(&self, path: &Path) -> Result<Option<OpportunityRecord>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read record {:?}", path))?;
        let record = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse record {:?}", path))?;
        Ok(Some(record))
    }

    async fn write_record(&self, record: &OpportunityRecord) -> Result<()> {
        let path = self.record_path(&record.id)?;
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create record dir {:?}", self.dir))?;

        let tmp_path = self
            .dir
            .join(format!(".{}.json.{}.tmp", record.id, Uuid::new_v4()));
        let content = serde_json::to_string_pretty(record)?;
        fs::write(&tmp_path, content)
            .await
            .with_context(|| format!("Failed to write {:?}", tmp_path))?;
        if let Err(e) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e).with_context(|| format!("Failed to replace record {:?}", path));
        }
        Ok(())
    }
}

/// 机会ID直接用作文件名，只允许 ASCII 字母数字
fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        bail!("非法的机会ID: {:?}", id);
    }
    Ok(())
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn get(&self, id: &str) -> Result<Option<OpportunityRecord>> {
        let path = self.record_path(id)?;
        self.read_record(&path).await
    }

    async fn upsert(&self, mut record: OpportunityRecord) -> Result<()> {
        let _guard = self.write_guard.lock().await;
        record.updated_at = Utc::now();
        self.write_record(&record).await
    }

    async fn modify(&self, id: &str, patch: RecordPatch) -> Result<OpportunityRecord> {
        let _guard = self.write_guard.lock().await;
        let path = self.record_path(id)?;
        let mut record = self
            .read_record(&path)
            .await?
            .ok_or_else(|| StormError::OpportunityNotFound(id.to_string()))?;
        patch(&mut record)?;
        record.updated_at = Utc::now();
        self.write_record(&record).await?;
        Ok(record)
    }

    async fn list(&self, predicate: RecordPredicate<'_>) -> Result<Vec<OpportunityRecord>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        let mut entries = fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("Failed to list {:?}", self.dir))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_record = path.extension().is_some_and(|ext| ext == "json")
                && !path
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy().starts_with('.'));
            if !is_record {
                continue;
            }
            match self.read_record(&path).await {
                Ok(Some(record)) if predicate(&record) => records.push(record),
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "跳过无法读取的记录"),
            }
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let _guard = self.write_guard.lock().await;
        let path = self.record_path(id)?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)
            .await
            .with_context(|| format!("Failed to delete record {:?}", path))?;
        Ok(true)
    }

    async fn acquire_run_lock(&self, id: &str) -> Result<RunLease> {
        let lock_path = self.lock_path(id)?;
        acquire_file(&lock_path, id, self.lock_stale_after)
    }
}
