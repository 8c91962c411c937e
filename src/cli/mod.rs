use crate::config::{Config, LLMProvider, ModelSpec};
use crate::generator::workflow::{Command, RunOptions};
use anyhow::{Result, bail};
use clap::Parser;
use std::path::PathBuf;
use tracing::warn;

/// 默认配置文件名，位于当前目录
const DEFAULT_CONFIG_FILE: &str = "storm.toml";

/// Investor-STORM - 基于多角色调研的投资报告生成引擎
#[derive(Parser, Debug)]
#[command(name = "investor-storm")]
#[command(
    about = "Generates long-form investment reports through simulated expert interviews, outline synthesis, parallel section drafting and polishing. Every stage is persisted so an interrupted run can be resumed."
)]
#[command(version)]
pub struct Args {
    /// 投资机会名称，通常是公司名
    #[arg(short, long)]
    pub name: Option<String>,

    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 列出已有的机会及其状态
    #[arg(long, conflicts_with = "delete")]
    pub list: bool,

    /// 删除指定机会的记录
    #[arg(long)]
    pub delete: bool,

    /// 跳过调研，从存储加载对话记录
    #[arg(long)]
    pub skip_research: bool,

    /// 跳过大纲生成，从存储加载大纲
    #[arg(long)]
    pub skip_outline: bool,

    /// 跳过成文，从存储加载草稿
    #[arg(long)]
    pub skip_article: bool,

    /// 跳过润色
    #[arg(long)]
    pub skip_polish: bool,

    /// 润色时去除重复内容
    #[arg(long)]
    pub remove_duplicate: bool,

    /// 调研时排除的参考文章地址
    #[arg(long)]
    pub ground_truth_url: Option<String>,

    /// 是否启用详细日志
    #[arg(short, long)]
    pub verbose: bool,

    /// LLM Provider (openai, anthropic, deepseek, moonshot, openrouter, ollama)
    #[arg(long)]
    pub llm_provider: Option<String>,

    /// LLM API基地址
    #[arg(long)]
    pub llm_api_base_url: Option<String>,

    /// LLM API KEY
    #[arg(long)]
    pub llm_api_key: Option<String>,

    /// 所有角色统一使用的模型
    #[arg(long)]
    pub model: Option<String>,

    /// 温度参数
    #[arg(long)]
    pub temperature: Option<f64>,

    /// 每个并行阶段的最大并发数
    #[arg(long)]
    pub max_thread_num: Option<usize>,

    /// 每个角色的最大对话轮数
    #[arg(long)]
    pub max_conv_turn: Option<usize>,

    /// 生成角色数上限（不含通用角色）
    #[arg(long)]
    pub max_perspective: Option<usize>,

    /// 每个查询保留的检索结果数
    #[arg(long)]
    pub search_top_k: Option<usize>,

    /// 每个章节引用的来源数
    #[arg(long)]
    pub retrieve_top_k: Option<usize>,

    /// 只使用通用角色
    #[arg(long)]
    pub disable_perspective: bool,

    /// 检索服务 API KEY
    #[arg(long)]
    pub search_api_key: Option<String>,

    /// 记录存储目录
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,

    /// 是否禁用缓存
    #[arg(long)]
    pub no_cache: bool,
}

impl Args {
    /// 加载配置文件并用命令行参数覆盖
    pub fn to_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            // 显式指定的配置文件必须可读
            Some(config_path) => Config::from_file(config_path)?,
            None => {
                let default_config_path = std::env::current_dir()
                    .unwrap_or_else(|_| PathBuf::from("."))
                    .join(DEFAULT_CONFIG_FILE);
                if default_config_path.exists() {
                    Config::from_file(&default_config_path)?
                } else {
                    Config::default()
                }
            }
        };

        // 覆盖LLM配置
        if let Some(provider_str) = &self.llm_provider {
            match provider_str.parse::<LLMProvider>() {
                Ok(provider) => config.llm.provider = provider,
                Err(_) => warn!(provider = %provider_str, "未知的provider，使用配置中的provider"),
            }
        }
        if let Some(llm_api_base_url) = &self.llm_api_base_url {
            config.llm.api_base_url = llm_api_base_url.clone();
        }
        if let Some(llm_api_key) = &self.llm_api_key {
            config.llm.api_key = llm_api_key.clone();
        }
        if let Some(temperature) = self.temperature {
            config.llm.temperature = temperature;
        }
        if let Some(model) = &self.model {
            let models = &mut config.models;
            for slot in [
                &mut models.conv_simulator,
                &mut models.question_asker,
                &mut models.outline_gen,
                &mut models.article_gen,
                &mut models.article_polish,
            ] {
                slot.get_or_insert_with(|| ModelSpec::new(model, 1000)).name = model.clone();
            }
        }

        // 覆盖运行参数
        let runner = &mut config.runner;
        if let Some(max_thread_num) = self.max_thread_num {
            runner.max_thread_num = max_thread_num;
        }
        if let Some(max_conv_turn) = self.max_conv_turn {
            runner.max_conv_turn = max_conv_turn;
        }
        if let Some(max_perspective) = self.max_perspective {
            runner.max_perspective = max_perspective;
        }
        if let Some(search_top_k) = self.search_top_k {
            runner.search_top_k = search_top_k;
        }
        if let Some(retrieve_top_k) = self.retrieve_top_k {
            runner.retrieve_top_k = retrieve_top_k;
        }
        if self.disable_perspective {
            runner.disable_perspective = true;
        }
        if self.remove_duplicate {
            runner.remove_duplicate = true;
        }

        if let Some(search_api_key) = &self.search_api_key {
            config.search.api_key = search_api_key.clone();
        }
        if let Some(storage_dir) = &self.storage_dir {
            config.storage.dir = storage_dir.clone();
        }
        if self.no_cache {
            config.cache.enabled = false;
        }
        config.verbose = config.verbose || self.verbose;

        Ok(config)
    }

    /// 解析要执行的操作
    ///
    /// 任何 `--skip-*` 都会切换到手动分阶段执行，否则按状态机生成。
    pub fn command(&self, config: &Config) -> Result<Command> {
        if self.list {
            return Ok(Command::List);
        }
        let Some(name) = self.name.clone() else {
            bail!("请通过 --name 指定投资机会");
        };
        if self.delete {
            return Ok(Command::Delete { name });
        }

        let remove_duplicate = config.runner.remove_duplicate;
        if self.skip_research || self.skip_outline || self.skip_article || self.skip_polish {
            return Ok(Command::Run {
                name,
                options: RunOptions {
                    do_research: !self.skip_research,
                    do_generate_outline: !self.skip_outline,
                    do_generate_article: !self.skip_article,
                    do_polish_article: !self.skip_polish,
                    remove_duplicate,
                    ground_truth_url: self.ground_truth_url.clone(),
                },
            });
        }

        Ok(Command::Generate {
            name,
            remove_duplicate,
            ground_truth_url: self.ground_truth_url.clone(),
        })
    }
}

// Include tests
#[cfg(test)]
mod tests;
