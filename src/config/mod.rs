use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// LLM Provider类型
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub enum LLMProvider {
    #[serde(rename = "openai")]
    #[default]
    OpenAI,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "moonshot")]
    Moonshot,
    #[serde(rename = "openrouter")]
    OpenRouter,
    #[serde(rename = "ollama")]
    Ollama,
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
            LLMProvider::DeepSeek => write!(f, "deepseek"),
            LLMProvider::Moonshot => write!(f, "moonshot"),
            LLMProvider::OpenRouter => write!(f, "openrouter"),
            LLMProvider::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for LLMProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LLMProvider::OpenAI),
            "anthropic" => Ok(LLMProvider::Anthropic),
            "deepseek" => Ok(LLMProvider::DeepSeek),
            "moonshot" => Ok(LLMProvider::Moonshot),
            "openrouter" => Ok(LLMProvider::OpenRouter),
            "ollama" => Ok(LLMProvider::Ollama),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// 应用程序配置
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// 是否启用详细日志
    pub verbose: bool,

    /// LLM服务配置
    pub llm: LLMConfig,

    /// 各流水线角色使用的模型
    pub models: ModelsConfig,

    /// 流水线运行参数
    pub runner: RunnerConfig,

    /// 检索服务配置
    pub search: SearchConfig,

    /// 记录存储配置
    pub storage: StorageConfig,

    /// 缓存配置
    pub cache: CacheConfig,
}

/// LLM服务配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LLMConfig {
    /// LLM Provider类型
    pub provider: LLMProvider,

    /// LLM API KEY
    #[serde(skip_serializing)]
    pub api_key: String,

    /// LLM API基地址
    pub api_base_url: String,

    /// 温度
    pub temperature: f64,

    /// 重试次数
    pub retry_attempts: u32,

    /// 重试间隔（毫秒）
    pub retry_delay_ms: u64,

    /// 超时时间（秒）
    pub timeout_seconds: u64,
}

/// 单个角色的模型设定
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ModelSpec {
    pub name: String,
    pub max_tokens: u32,
}

impl ModelSpec {
    pub fn new(name: &str, max_tokens: u32) -> Self {
        Self {
            name: name.to_string(),
            max_tokens,
        }
    }
}

/// 每个流水线角色一个模型，允许不同角色使用不同模型
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ModelsConfig {
    /// 专家对话模拟
    pub conv_simulator: Option<ModelSpec>,

    /// 写作者提问与角色生成
    pub question_asker: Option<ModelSpec>,

    /// 大纲生成
    pub outline_gen: Option<ModelSpec>,

    /// 章节写作
    pub article_gen: Option<ModelSpec>,

    /// 润色
    pub article_polish: Option<ModelSpec>,
}

/// 流水线运行参数
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    /// 每个角色的最大对话轮数
    pub max_conv_turn: usize,

    /// 除通用角色外最多生成的角色数
    pub max_perspective: usize,

    /// 每轮对话最多生成的检索查询数
    pub max_search_queries_per_turn: usize,

    /// 每个检索查询保留的结果数
    pub search_top_k: usize,

    /// 每个章节从信息表中取用的片段数
    pub retrieve_top_k: usize,

    /// 并发任务上限
    pub max_thread_num: usize,

    /// 只使用通用角色
    pub disable_perspective: bool,

    /// 润色时是否去除重复内容
    pub remove_duplicate: bool,

    /// 生成角色前是否抓取相关主题页面的目录作为参考
    pub fetch_related_outlines: bool,
}

/// 检索服务配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    /// 检索服务API KEY
    #[serde(skip_serializing)]
    pub api_key: String,

    /// 检索服务地址
    pub endpoint: String,

    /// 超时时间（秒）
    pub timeout_seconds: u64,
}

/// 记录存储配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// 记录目录
    pub dir: PathBuf,

    /// 运行锁超过该时长（分钟）视为遗留，可被回收
    pub lock_stale_minutes: u64,
}

/// 缓存配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    /// 是否启用缓存
    pub enabled: bool,

    /// 缓存目录
    pub cache_dir: PathBuf,

    /// 缓存过期时间（小时）
    pub expire_hours: u64,
}

impl Config {
    /// 从文件加载配置
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut file =
            File::open(path).context(format!("Failed to open config file: {:?}", path))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::default(),
            api_key: std::env::var("STORM_LLM_API_KEY").unwrap_or_default(),
            api_base_url: String::from("https://api.openai.com/v1"),
            temperature: 1.0,
            retry_attempts: 3,
            retry_delay_ms: 2000,
            timeout_seconds: 120,
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            conv_simulator: Some(ModelSpec::new("gpt-4o-mini-2024-07-18", 500)),
            question_asker: Some(ModelSpec::new("gpt-4o-mini-2024-07-18", 500)),
            outline_gen: Some(ModelSpec::new("gpt-4-0125-preview", 400)),
            article_gen: Some(ModelSpec::new("gpt-4o-2024-05-13", 700)),
            article_polish: Some(ModelSpec::new("gpt-4o-2024-05-13", 4000)),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_conv_turn: 3,
            max_perspective: 3,
            max_search_queries_per_turn: 3,
            search_top_k: 3,
            retrieve_top_k: 5,
            max_thread_num: 10,
            disable_perspective: false,
            remove_duplicate: false,
            fetch_related_outlines: true,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("STORM_SEARCH_API_KEY").unwrap_or_default(),
            endpoint: String::from("https://api.ydc-index.io/search"),
            timeout_seconds: 30,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".storm/records"),
            lock_stale_minutes: 120,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_dir: PathBuf::from(".storm/cache"),
            expire_hours: 24 * 7,
        }
    }
}
