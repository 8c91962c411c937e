//! LLM客户端 - 基于 rig 的 [`LanguageModel`] 实现

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::CacheManager;
use crate::config::{LLMConfig, ModelSpec};
use crate::llm::{LanguageModel, PromptFields};

pub mod providers;

use providers::{AgentSettings, ProviderClient};

const CACHE_CATEGORY: &str = "llm";

/// 绑定到某个模型的LLM客户端，带超时、重试和响应缓存
pub struct RigLanguageModel {
    client: ProviderClient,
    llm: LLMConfig,
    spec: ModelSpec,
    cache: Arc<CacheManager>,
}

impl RigLanguageModel {
    pub fn new(
        client: ProviderClient,
        llm: &LLMConfig,
        spec: ModelSpec,
        cache: Arc<CacheManager>,
    ) -> Self {
        Self {
            client,
            llm: llm.clone(),
            spec,
            cache,
        }
    }

    /// 通用重试逻辑，用于处理异步操作的重试机制
    async fn retry_with_backoff<T, F, Fut>(&self, task: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, anyhow::Error>>,
    {
        let max_retries = self.llm.retry_attempts.max(1);
        let retry_delay_ms = self.llm.retry_delay_ms;
        let mut retries = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    retries += 1;
                    warn!(
                        task,
                        model = %self.spec.name,
                        attempt = retries,
                        max_retries,
                        error = %err,
                        "调用模型服务出错"
                    );
                    if retries >= max_retries {
                        return Err(err);
                    }
                    tokio::time::sleep(Duration::from_millis(retry_delay_ms)).await;
                }
            }
        }
    }
}

#[async_trait]
impl LanguageModel for RigLanguageModel {
    fn model_name(&self) -> &str {
        &self.spec.name
    }

    fn max_tokens(&self) -> Option<u32> {
        Some(self.spec.max_tokens)
    }

    async fn generate(&self, prompt: &PromptFields) -> Result<String> {
        let (system_prompt, user_prompt) = prompt.render();
        let cache_key = format!("{}\n{}\n{}", self.spec.name, system_prompt, user_prompt);

        if let Some(cached) = self.cache.get::<String>(CACHE_CATEGORY, &cache_key).await? {
            debug!(task = %prompt.task, model = %self.spec.name, "使用缓存的模型响应");
            return Ok(cached);
        }

        let agent = self.client.agent(AgentSettings {
            model: &self.spec.name,
            preamble: &system_prompt,
            max_tokens: self.spec.max_tokens,
            temperature: self.llm.temperature,
        });
        let timeout = Duration::from_secs(self.llm.timeout_seconds);

        let response = self
            .retry_with_backoff(&prompt.task, || async {
                tokio::time::timeout(timeout, agent.complete(&user_prompt))
                    .await
                    .map_err(|_| anyhow!("模型调用超时（{}秒）", timeout.as_secs()))?
            })
            .await?;

        if let Err(e) = self
            .cache
            .set(CACHE_CATEGORY, &cache_key, response.clone(), &self.spec.name)
            .await
        {
            warn!(error = %e, "写入模型响应缓存失败");
        }
        Ok(response)
    }
}
