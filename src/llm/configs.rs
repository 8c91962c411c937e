use anyhow::Result;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::cache::CacheManager;
use crate::config::{Config, ModelSpec};
use crate::error::StormError;
use crate::llm::client::RigLanguageModel;
use crate::llm::client::providers::ProviderClient;
use crate::llm::history::{CallHistory, LlmCallRecord, RecordingModel};
use crate::llm::LanguageModel;

/// 流水线中使用模型的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LmRole {
    ConvSimulator,
    QuestionAsker,
    OutlineGen,
    ArticleGen,
    ArticlePolish,
}

impl LmRole {
    pub const ALL: [LmRole; 5] = [
        LmRole::ConvSimulator,
        LmRole::QuestionAsker,
        LmRole::OutlineGen,
        LmRole::ArticleGen,
        LmRole::ArticlePolish,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            LmRole::ConvSimulator => "conv_simulator_lm",
            LmRole::QuestionAsker => "question_asker_lm",
            LmRole::OutlineGen => "outline_gen_lm",
            LmRole::ArticleGen => "article_gen_lm",
            LmRole::ArticlePolish => "article_polish_lm",
        }
    }

    fn spec(&self, config: &Config) -> Option<ModelSpec> {
        let models = &config.models;
        match self {
            LmRole::ConvSimulator => models.conv_simulator.clone(),
            LmRole::QuestionAsker => models.question_asker.clone(),
            LmRole::OutlineGen => models.outline_gen.clone(),
            LmRole::ArticleGen => models.article_gen.clone(),
            LmRole::ArticlePolish => models.article_polish.clone(),
        }
    }
}

/// 每个角色一个可选的模型，所有调用记入同一份历史
#[derive(Clone, Default)]
pub struct LmConfigs {
    models: BTreeMap<LmRole, Arc<dyn LanguageModel>>,
    history: CallHistory,
}

impl LmConfigs {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按配置为每个已配置的角色创建模型
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = ProviderClient::new(&config.llm)?;
        let cache = Arc::new(CacheManager::new(config.cache.clone()));

        let mut lm_configs = Self::new();
        for role in LmRole::ALL {
            if let Some(spec) = role.spec(config) {
                let model =
                    RigLanguageModel::new(client.clone(), &config.llm, spec, cache.clone());
                lm_configs.set(role, Arc::new(model));
            }
        }
        Ok(lm_configs)
    }

    /// 设置某个角色的模型，调用会被记录
    pub fn set(&mut self, role: LmRole, model: Arc<dyn LanguageModel>) {
        let recording = RecordingModel::new(model, self.history.clone());
        self.models.insert(role, Arc::new(recording));
    }

    pub fn get(&self, role: LmRole) -> Result<Arc<dyn LanguageModel>, StormError> {
        self.models
            .get(&role)
            .cloned()
            .ok_or_else(|| StormError::MissingModel {
                stage: role.key().to_string(),
            })
    }

    /// 在任何工作开始前确认所有角色都已配置模型
    pub fn init_check(&self) -> Result<(), StormError> {
        for role in LmRole::ALL {
            self.get(role)?;
        }
        Ok(())
    }

    /// 导出模型配置，用于 run_config
    pub fn log(&self) -> Value {
        let mut map = Map::new();
        for (role, model) in &self.models {
            map.insert(
                role.key().to_string(),
                json!({
                    "model": model.model_name(),
                    "max_tokens": model.max_tokens(),
                }),
            );
        }
        let models = Value::Object(map);
        info!(models = %models, "模型配置");
        models
    }

    /// 取出并清空调用历史
    pub async fn collect_and_reset_history(&self) -> Vec<LlmCallRecord> {
        let mut history = self.history.lock().await;
        std::mem::take(&mut *history)
    }

    pub fn history(&self) -> CallHistory {
        self.history.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::PromptFields;
    use async_trait::async_trait;

    struct Fixed(&'static str);

    #[async_trait]
    impl LanguageModel for Fixed {
        fn model_name(&self) -> &str {
            self.0
        }

        fn max_tokens(&self) -> Option<u32> {
            Some(42)
        }

        async fn generate(&self, _prompt: &PromptFields) -> Result<String> {
            Ok("ok".to_string())
        }
    }

    fn full() -> LmConfigs {
        let mut lm_configs = LmConfigs::new();
        for role in LmRole::ALL {
            lm_configs.set(role, Arc::new(Fixed("m")));
        }
        lm_configs
    }

    #[test]
    fn test_init_check_names_missing_role() {
        let mut lm_configs = LmConfigs::new();
        lm_configs.set(LmRole::ConvSimulator, Arc::new(Fixed("m")));

        let err = lm_configs.init_check().unwrap_err();
        assert!(matches!(
            err,
            StormError::MissingModel { ref stage } if stage == "question_asker_lm"
        ));
        assert!(full().init_check().is_ok());
    }

    #[test]
    fn test_log_lists_models() {
        let value = full().log();
        assert_eq!(value["outline_gen_lm"]["model"], "m");
        assert_eq!(value["article_polish_lm"]["max_tokens"], 42);
    }

    #[tokio::test]
    async fn test_history_is_shared_and_drained() {
        let lm_configs = full();
        let prompt = PromptFields::new("t", "sys");
        lm_configs
            .get(LmRole::ArticleGen)
            .unwrap()
            .generate(&prompt)
            .await
            .unwrap();
        lm_configs
            .get(LmRole::OutlineGen)
            .unwrap()
            .generate(&prompt)
            .await
            .unwrap();

        assert_eq!(lm_configs.collect_and_reset_history().await.len(), 2);
        assert!(lm_configs.collect_and_reset_history().await.is_empty());
    }
}
