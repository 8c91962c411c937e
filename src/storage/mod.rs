//! 按机会ID存放流水线产物的记录存储
//!
//! 记录是断点续跑的唯一依据：每个阶段完成后立即写入产物，状态只在阶段成功后推进。

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StormError;
use crate::types::opportunity::{Opportunity, PipelineStatus};

pub mod file;
pub mod lock;
pub mod memory;

pub use file::JsonFileStore;
pub use lock::RunLease;
pub use memory::MemoryStore;

/// 记录中由各阶段写入的字符串字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordField {
    ConversationLog,
    RawSearchResults,
    DirectGenOutline,
    StormGenOutline,
    StormGenArticle,
    UrlToInfo,
    StormGenArticlePolished,
    RunConfig,
    LlmCallHistory,
}

impl RecordField {
    pub fn key(&self) -> &'static str {
        match self {
            RecordField::ConversationLog => "conversation_log",
            RecordField::RawSearchResults => "raw_search_results",
            RecordField::DirectGenOutline => "direct_gen_outline",
            RecordField::StormGenOutline => "storm_gen_outline",
            RecordField::StormGenArticle => "storm_gen_article",
            RecordField::UrlToInfo => "url_to_info",
            RecordField::StormGenArticlePolished => "storm_gen_article_polished",
            RecordField::RunConfig => "run_config",
            RecordField::LlmCallHistory => "llm_call_history",
        }
    }
}

/// 单个机会的持久化记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityRecord {
    pub id: String,
    pub name: String,
    pub status: PipelineStatus,
    #[serde(default)]
    pub conversation_log: Option<String>,
    #[serde(default)]
    pub raw_search_results: Option<String>,
    #[serde(default)]
    pub direct_gen_outline: Option<String>,
    #[serde(default)]
    pub storm_gen_outline: Option<String>,
    #[serde(default)]
    pub storm_gen_article: Option<String>,
    #[serde(default)]
    pub url_to_info: Option<String>,
    #[serde(default)]
    pub storm_gen_article_polished: Option<String>,
    #[serde(default)]
    pub run_config: Option<String>,
    #[serde(default)]
    pub llm_call_history: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OpportunityRecord {
    pub fn new(opportunity: &Opportunity) -> Self {
        let now = Utc::now();
        Self {
            id: opportunity.id.clone(),
            name: opportunity.name.clone(),
            status: PipelineStatus::Initiated,
            conversation_log: None,
            raw_search_results: None,
            direct_gen_outline: None,
            storm_gen_outline: None,
            storm_gen_article: None,
            url_to_info: None,
            storm_gen_article_polished: None,
            run_config: None,
            llm_call_history: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn slot(&mut self, field: RecordField) -> &mut Option<String> {
        match field {
            RecordField::ConversationLog => &mut self.conversation_log,
            RecordField::RawSearchResults => &mut self.raw_search_results,
            RecordField::DirectGenOutline => &mut self.direct_gen_outline,
            RecordField::StormGenOutline => &mut self.storm_gen_outline,
            RecordField::StormGenArticle => &mut self.storm_gen_article,
            RecordField::UrlToInfo => &mut self.url_to_info,
            RecordField::StormGenArticlePolished => &mut self.storm_gen_article_polished,
            RecordField::RunConfig => &mut self.run_config,
            RecordField::LlmCallHistory => &mut self.llm_call_history,
        }
    }

    pub fn field(&self, field: RecordField) -> Option<&str> {
        let value = match field {
            RecordField::ConversationLog => &self.conversation_log,
            RecordField::RawSearchResults => &self.raw_search_results,
            RecordField::DirectGenOutline => &self.direct_gen_outline,
            RecordField::StormGenOutline => &self.storm_gen_outline,
            RecordField::StormGenArticle => &self.storm_gen_article,
            RecordField::UrlToInfo => &self.url_to_info,
            RecordField::StormGenArticlePolished => &self.storm_gen_article_polished,
            RecordField::RunConfig => &self.run_config,
            RecordField::LlmCallHistory => &self.llm_call_history,
        };
        value.as_deref()
    }

    pub fn set_field(&mut self, field: RecordField, value: String) {
        *self.slot(field) = Some(value);
    }

    /// 读取续跑所需的上游产物，缺失即报错
    pub fn require(&self, field: RecordField) -> Result<&str, StormError> {
        self.field(field)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| self.missing(field))
    }

    /// 只要求字段已写入，允许空值
    pub fn require_persisted(&self, field: RecordField) -> Result<&str, StormError> {
        self.field(field).ok_or_else(|| self.missing(field))
    }

    fn missing(&self, field: RecordField) -> StormError {
        StormError::MissingArtifact {
            opportunity_id: self.id.clone(),
            field: field.key().to_string(),
        }
    }
}

/// 对记录的原地修改
pub type RecordPatch = Box<dyn FnOnce(&mut OpportunityRecord) -> Result<()> + Send>;

/// 记录过滤条件
pub type RecordPredicate<'a> = &'a (dyn Fn(&OpportunityRecord) -> bool + Send + Sync);

/// 以机会ID为键的持久化记录存储
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<OpportunityRecord>>;

    async fn upsert(&self, record: OpportunityRecord) -> Result<()>;

    /// 在存储内部串行地读改写一条记录，记录不存在时报 OpportunityNotFound
    async fn modify(&self, id: &str, patch: RecordPatch) -> Result<OpportunityRecord>;

    async fn list(&self, predicate: RecordPredicate<'_>) -> Result<Vec<OpportunityRecord>>;

    /// 删除记录，返回记录此前是否存在
    async fn delete(&self, id: &str) -> Result<bool>;

    /// 获取该机会的运行租约，已被占用时立即返回 RunInProgress
    async fn acquire_run_lock(&self, id: &str) -> Result<RunLease>;

    /// 写入若干产物字段
    async fn update(&self, id: &str, fields: Vec<(RecordField, String)>) -> Result<OpportunityRecord> {
        self.modify(
            id,
            Box::new(move |record| {
                for (field, value) in fields {
                    record.set_field(field, value);
                }
                Ok(())
            }),
        )
        .await
    }

    /// 推进状态，拒绝回退
    async fn set_status(&self, id: &str, status: PipelineStatus) -> Result<OpportunityRecord> {
        self.modify(
            id,
            Box::new(move |record| {
                record.status = record.status.advance_to(status)?;
                Ok(())
            }),
        )
        .await
    }
}
