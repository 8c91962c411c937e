use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use std::time::Instant;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::llm::{LanguageModel, PromptFields};
use crate::utils::token_estimator::TokenEstimator;

static TOKEN_ESTIMATOR: LazyLock<TokenEstimator> = LazyLock::new(TokenEstimator::new);

/// 一次模型调用的元数据，不含提示原文和任何密钥
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmCallRecord {
    pub id: Uuid,
    pub task: String,
    pub model: String,
    pub prompt_chars: usize,
    pub response_chars: usize,
    /// 按字符估算的 token 数
    pub prompt_tokens: usize,
    pub response_tokens: usize,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub type CallHistory = Arc<Mutex<Vec<LlmCallRecord>>>;

/// 记录每次调用的模型装饰器
pub struct RecordingModel {
    inner: Arc<dyn LanguageModel>,
    history: CallHistory,
}

impl RecordingModel {
    pub fn new(inner: Arc<dyn LanguageModel>, history: CallHistory) -> Self {
        Self { inner, history }
    }
}

#[async_trait]
impl LanguageModel for RecordingModel {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn max_tokens(&self) -> Option<u32> {
        self.inner.max_tokens()
    }

    async fn generate(&self, prompt: &PromptFields) -> Result<String> {
        let (system, user) = prompt.render();
        let prompt_text = format!("{}\n{}", system, user);
        let started_at = Utc::now();
        let timer = Instant::now();

        let result = self.inner.generate(prompt).await;

        let (response_chars, response_tokens, error) = match &result {
            Ok(text) => (
                text.chars().count(),
                TOKEN_ESTIMATOR.estimate_tokens(text),
                None,
            ),
            Err(e) => (0, 0, Some(e.to_string())),
        };
        let record = LlmCallRecord {
            id: Uuid::new_v4(),
            task: prompt.task.clone(),
            model: self.inner.model_name().to_string(),
            prompt_chars: prompt_text.chars().count(),
            response_chars,
            prompt_tokens: TOKEN_ESTIMATOR.estimate_tokens(&prompt_text),
            response_tokens,
            started_at,
            duration_ms: timer.elapsed().as_millis() as u64,
            error,
        };
        self.history.lock().await.push(record);

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl LanguageModel for Echo {
        fn model_name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, prompt: &PromptFields) -> Result<String> {
            if prompt.task == "fail" {
                anyhow::bail!("boom");
            }
            Ok(prompt.render().1)
        }
    }

    #[tokio::test]
    async fn test_records_success_and_failure() {
        let history: CallHistory = Arc::new(Mutex::new(Vec::new()));
        let model = RecordingModel::new(Arc::new(Echo), history.clone());

        let ok = model
            .generate(&PromptFields::new("ask", "sys").input("Q", "hello"))
            .await
            .unwrap();
        assert_eq!(ok, "Q: hello");
        assert!(model.generate(&PromptFields::new("fail", "sys")).await.is_err());

        let records = history.lock().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].task, "ask");
        assert_eq!(records[0].model, "echo");
        assert_eq!(records[0].response_chars, 8);
        assert!(records[0].error.is_none());
        assert_eq!(records[1].error.as_deref(), Some("boom"));
        assert_ne!(records[0].id, records[1].id);
    }
}
