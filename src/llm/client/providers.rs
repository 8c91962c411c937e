//! 各模型服务商的 rig 客户端

use anyhow::Result;
use rig::{agent::Agent, client::CompletionClient, completion::Prompt};

use crate::config::{LLMConfig, LLMProvider};

/// 单次调用的 Agent 参数
#[derive(Debug, Clone, Copy)]
pub struct AgentSettings<'a> {
    pub model: &'a str,
    pub preamble: &'a str,
    pub max_tokens: u32,
    pub temperature: f64,
}

/// 常规 builder 流程：preamble、token 上限、温度
macro_rules! build_agent {
    ($builder:expr, $settings:expr) => {
        $builder
            .preamble($settings.preamble)
            .max_tokens($settings.max_tokens.into())
            .temperature($settings.temperature)
            .build()
    };
}

#[derive(Clone)]
pub enum ProviderClient {
    OpenAI(rig::providers::openai::Client),
    Anthropic(rig::providers::anthropic::Client),
    DeepSeek(rig::providers::deepseek::Client),
    Moonshot(rig::providers::moonshot::Client),
    OpenRouter(rig::providers::openrouter::Client),
    Ollama(rig::providers::ollama::Client),
}

impl ProviderClient {
    pub fn new(config: &LLMConfig) -> Result<Self> {
        let key = config.api_key.as_str();
        let base_url = config.api_base_url.as_str();
        let client = match config.provider {
            LLMProvider::OpenAI => Self::OpenAI(
                rig::providers::openai::Client::builder(key)
                    .base_url(base_url)
                    .build(),
            ),
            LLMProvider::Anthropic => {
                Self::Anthropic(rig::providers::anthropic::ClientBuilder::new(key).build()?)
            }
            LLMProvider::DeepSeek => Self::DeepSeek(
                rig::providers::deepseek::Client::builder(key)
                    .base_url(base_url)
                    .build(),
            ),
            LLMProvider::Moonshot => Self::Moonshot(
                rig::providers::moonshot::Client::builder(key)
                    .base_url(base_url)
                    .build(),
            ),
            LLMProvider::OpenRouter => {
                Self::OpenRouter(rig::providers::openrouter::Client::builder(key).build())
            }
            LLMProvider::Ollama => Self::Ollama(rig::providers::ollama::Client::builder().build()),
        };
        Ok(client)
    }

    pub fn agent(&self, settings: AgentSettings<'_>) -> ProviderAgent {
        match self {
            // OpenAI 兼容服务不一定支持 responses 接口，统一走 completions
            Self::OpenAI(client) => ProviderAgent::OpenAI(build_agent!(
                client
                    .completion_model(settings.model)
                    .completions_api()
                    .into_agent_builder(),
                settings
            )),
            Self::Anthropic(client) => {
                ProviderAgent::Anthropic(build_agent!(client.agent(settings.model), settings))
            }
            Self::DeepSeek(client) => {
                ProviderAgent::DeepSeek(build_agent!(client.agent(settings.model), settings))
            }
            Self::Moonshot(client) => {
                ProviderAgent::Moonshot(build_agent!(client.agent(settings.model), settings))
            }
            Self::OpenRouter(client) => {
                ProviderAgent::OpenRouter(build_agent!(client.agent(settings.model), settings))
            }
            Self::Ollama(client) => {
                ProviderAgent::Ollama(build_agent!(client.agent(settings.model), settings))
            }
        }
    }
}

pub enum ProviderAgent {
    OpenAI(Agent<rig::providers::openai::CompletionModel>),
    Anthropic(Agent<rig::providers::anthropic::completion::CompletionModel>),
    DeepSeek(Agent<rig::providers::deepseek::CompletionModel>),
    Moonshot(Agent<rig::providers::moonshot::CompletionModel>),
    OpenRouter(Agent<rig::providers::openrouter::CompletionModel>),
    Ollama(Agent<rig::providers::ollama::CompletionModel<reqwest::Client>>),
}

impl ProviderAgent {
    /// 单轮调用，返回模型的原始文本
    pub async fn complete(&self, user_prompt: &str) -> Result<String> {
        let response = match self {
            Self::OpenAI(agent) => agent.prompt(user_prompt).await?,
            Self::Anthropic(agent) => agent.prompt(user_prompt).await?,
            Self::DeepSeek(agent) => agent.prompt(user_prompt).await?,
            Self::Moonshot(agent) => agent.prompt(user_prompt).await?,
            Self::OpenRouter(agent) => agent.prompt(user_prompt).await?,
            Self::Ollama(agent) => agent.prompt(user_prompt).await?,
        };
        Ok(response)
    }
}
