//! 语言模型能力接口
//!
//! 流水线只依赖 [`LanguageModel`]，具体实现在配置阶段选定：
//! 线上为基于 rig 的 [`client::RigLanguageModel`]，测试中为脚本化的替身。

use anyhow::Result;
use async_trait::async_trait;

pub mod client;
pub mod configs;
pub mod history;
pub mod prompt;

pub use configs::{LmConfigs, LmRole};
pub use history::{LlmCallRecord, RecordingModel};
pub use prompt::PromptFields;

/// 按提示字段生成文本的模型
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// 模型名称，写入运行配置和调用记录
    fn model_name(&self) -> &str;

    /// 单次生成的 token 上限，未知时为 None
    fn max_tokens(&self) -> Option<u32> {
        None
    }

    async fn generate(&self, prompt: &PromptFields) -> Result<String>;
}
