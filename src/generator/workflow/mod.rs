use anyhow::{Context, Result};
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{error, info};

use crate::config::Config;
use crate::error::StormError;
use crate::generator::article::ArticleGenerationModule;
use crate::generator::context::GeneratorContext;
use crate::generator::curation::{CurationOutput, KnowledgeCurationModule};
use crate::generator::outline::OutlineGenerationModule;
use crate::generator::polish::ArticlePolishingModule;
use crate::llm::LlmCallRecord;
use crate::storage::{JsonFileStore, OpportunityRecord, RecordField, RecordStore};
use crate::types::article::Article;
use crate::types::conversation::Conversation;
use crate::types::opportunity::{Opportunity, PipelineStatus};

/// 时间跟踪作用域
pub struct TimingScope {
    start_time: Instant,
    phase_start_times: Vec<(String, Instant)>,
    /// 按结束顺序记录
    phase_durations: Vec<(String, Duration)>,
}

impl Default for TimingScope {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingScope {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            phase_start_times: Vec::new(),
            phase_durations: Vec::new(),
        }
    }

    /// 开始一个新的阶段计时
    pub fn start_phase(&mut self, phase_name: &str) {
        self.phase_start_times
            .retain(|(name, _)| name != phase_name);
        self.phase_start_times
            .push((phase_name.to_string(), Instant::now()));
    }

    /// 结束一个阶段的计时
    pub fn end_phase(&mut self, phase_name: &str) -> Option<Duration> {
        let position = self
            .phase_start_times
            .iter()
            .position(|(name, _)| name == phase_name)?;
        let (name, start_time) = self.phase_start_times.remove(position);
        let duration = start_time.elapsed();
        self.phase_durations.push((name, duration));
        Some(duration)
    }

    /// 获取总执行时间
    pub fn get_total_duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 获取所有阶段的执行时间
    pub fn get_phase_durations(&self) -> &[(String, Duration)] {
        &self.phase_durations
    }

    /// 获取格式化的执行时间报告
    pub fn generate_timing_report(&self) -> String {
        let mut report = format!(
            "总执行时间: {:.2}秒\n",
            self.get_total_duration().as_secs_f64()
        );

        if !self.phase_durations.is_empty() {
            report.push_str("\n各阶段执行时间:\n");
            for (phase, duration) in &self.phase_durations {
                report.push_str(&format!("- {}: {:.3}秒\n", phase, duration.as_secs_f64()));
            }
        }

        report
    }
}

/// 时间跟踪常量
pub struct TimingKeys;

impl TimingKeys {
    pub const KNOWLEDGE_CURATION: &'static str = "knowledge_curation";
    pub const OUTLINE_GENERATION: &'static str = "outline_generation";
    pub const ARTICLE_GENERATION: &'static str = "article_generation";
    pub const ARTICLE_POLISHING: &'static str = "article_polishing";
}

/// 一次运行要执行的阶段
///
/// 跳过的阶段如果是后续阶段的输入，会从存储中加载。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOptions {
    pub do_research: bool,
    pub do_generate_outline: bool,
    pub do_generate_article: bool,
    pub do_polish_article: bool,
    /// 润色时是否再调用一次模型去除重复内容
    pub remove_duplicate: bool,
    /// 调研时排除的参考文章地址
    pub ground_truth_url: Option<String>,
}

impl RunOptions {
    /// 执行全部阶段
    pub fn all() -> Self {
        Self {
            do_research: true,
            do_generate_outline: true,
            do_generate_article: true,
            do_polish_article: true,
            ..Default::default()
        }
    }

    pub fn has_action(&self) -> bool {
        self.do_research || self.do_generate_outline || self.do_generate_article || self.do_polish_article
    }
}

/// 流水线编排：按阶段执行、逐阶段持久化、可从任一阶段恢复
pub struct StormRunner {
    context: GeneratorContext,
    timing: TimingScope,
}

impl StormRunner {
    pub fn new(context: GeneratorContext) -> Self {
        Self {
            context,
            timing: TimingScope::new(),
        }
    }

    pub fn context(&self) -> &GeneratorContext {
        &self.context
    }

    pub fn timing(&self) -> &TimingScope {
        &self.timing
    }

    fn store(&self) -> &dyn RecordStore {
        self.context.store.as_ref()
    }

    /// 按选项执行各阶段，不推进状态
    pub async fn run(&mut self, opportunity: &Opportunity, options: &RunOptions) -> Result<()> {
        if !options.has_action() {
            return Err(StormError::NoActionRequested.into());
        }
        self.context.lm_configs.init_check()?;
        self.ensure_record(opportunity).await?;

        let mut curation: Option<CurationOutput> = None;
        if options.do_research {
            curation = Some(
                self.run_knowledge_curation_module(opportunity, options.ground_truth_url.as_deref())
                    .await?,
            );
        }

        let mut outline: Option<Article> = None;
        if options.do_generate_outline {
            let loaded = match curation.take() {
                Some(curation) => curation,
                None => self.load_curation(opportunity).await?,
            };
            outline = Some(self.run_outline_generation_module(opportunity, &loaded).await?);
            curation = Some(loaded);
        }

        let mut draft_article: Option<Article> = None;
        if options.do_generate_article {
            let loaded = match curation.take() {
                Some(curation) => curation,
                None => self.load_curation(opportunity).await?,
            };
            let outline = match outline.take() {
                Some(outline) => outline,
                None => self.load_outline(opportunity).await?,
            };
            draft_article = Some(
                self.run_article_generation_module(opportunity, &outline, &loaded)
                    .await?,
            );
        }

        if options.do_polish_article {
            let draft = match draft_article.take() {
                Some(draft) => draft,
                None => self.load_draft_article(opportunity).await?,
            };
            self.run_article_polishing_module(opportunity, &draft, options.remove_duplicate)
                .await?;
        }

        Ok(())
    }

    /// 按记录中的状态推进整条流水线，持有该机会的运行锁
    ///
    /// 阶段失败时状态保持不变，再次调用会从同一阶段重试，已持久化的产物不会重算。
    pub async fn generate_report(
        &mut self,
        name: &str,
        remove_duplicate: bool,
        ground_truth_url: Option<&str>,
    ) -> Result<OpportunityRecord> {
        let opportunity = Opportunity::new(name)?;
        self.context.lm_configs.init_check()?;
        let _lease = self.store().acquire_run_lock(&opportunity.id).await?;

        let mut record = self.ensure_record(&opportunity).await?;
        info!(opportunity = %opportunity.id, status = %record.status, "{}", record.status.describe());

        if record.status == PipelineStatus::Initiated {
            record = self
                .store()
                .set_status(&opportunity.id, PipelineStatus::PreWriting)
                .await?;
        }

        if record.status == PipelineStatus::PreWriting {
            let options = RunOptions {
                do_research: record.require(RecordField::ConversationLog).is_err(),
                do_generate_outline: true,
                ground_truth_url: ground_truth_url.map(str::to_string),
                ..Default::default()
            };
            if let Err(e) = self.run(&opportunity, &options).await {
                error!(opportunity = %opportunity.id, error = %e, "预写作阶段失败");
                return Err(e);
            }
            self.persist_call_history(&opportunity).await?;
            record = self
                .store()
                .set_status(&opportunity.id, PipelineStatus::FinalWriting)
                .await?;
            info!(opportunity = %opportunity.id, "{}", record.status.describe());
        }

        if record.status == PipelineStatus::FinalWriting {
            let article_persisted = record.require(RecordField::StormGenArticle).is_ok()
                && record.require(RecordField::UrlToInfo).is_ok();
            let options = RunOptions {
                do_generate_article: !article_persisted,
                do_polish_article: true,
                remove_duplicate,
                ..Default::default()
            };
            if let Err(e) = self.run(&opportunity, &options).await {
                error!(opportunity = %opportunity.id, error = %e, "成文阶段失败");
                return Err(e);
            }
            self.post_run(&opportunity).await?;
            record = self
                .store()
                .set_status(&opportunity.id, PipelineStatus::Complete)
                .await?;
            info!(opportunity = %opportunity.id, "{}", record.status.describe());
        }

        info!("\n{}", self.timing.generate_timing_report());
        Ok(record)
    }

    /// 记录不存在时以 initiated 状态创建
    pub async fn ensure_record(&self, opportunity: &Opportunity) -> Result<OpportunityRecord> {
        if let Some(record) = self.store().get(&opportunity.id).await? {
            return Ok(record);
        }
        let record = OpportunityRecord::new(opportunity);
        self.store().upsert(record.clone()).await?;
        info!(opportunity = %opportunity.id, name = %opportunity.name, "创建机会记录");
        Ok(record)
    }

    pub async fn run_knowledge_curation_module(
        &mut self,
        opportunity: &Opportunity,
        ground_truth_url: Option<&str>,
    ) -> Result<CurationOutput> {
        self.timing.start_phase(TimingKeys::KNOWLEDGE_CURATION);
        let retriever = self.context.retriever(ground_truth_url);
        let curation = KnowledgeCurationModule::new(&self.context, retriever)
            .research(&opportunity.name)
            .await?;

        let conversation_log = serde_json::to_string(&curation.conversations)?;
        let raw_search_results =
            serde_json::to_string(&curation.information_table.to_raw_search_results())?;
        self.store()
            .update(
                &opportunity.id,
                vec![
                    (RecordField::ConversationLog, conversation_log),
                    (RecordField::RawSearchResults, raw_search_results),
                ],
            )
            .await?;
        self.end_phase(TimingKeys::KNOWLEDGE_CURATION);
        Ok(curation)
    }

    pub async fn run_outline_generation_module(
        &mut self,
        opportunity: &Opportunity,
        curation: &CurationOutput,
    ) -> Result<Article> {
        self.timing.start_phase(TimingKeys::OUTLINE_GENERATION);
        let output = OutlineGenerationModule::new(&self.context)
            .generate_outline(&opportunity.name, &curation.conversations)
            .await?;

        self.store()
            .update(
                &opportunity.id,
                vec![
                    (RecordField::StormGenOutline, output.outline.outline_to_string()),
                    (
                        RecordField::DirectGenOutline,
                        output.draft_outline.outline_to_string(),
                    ),
                ],
            )
            .await?;
        self.end_phase(TimingKeys::OUTLINE_GENERATION);
        Ok(output.outline)
    }

    pub async fn run_article_generation_module(
        &mut self,
        opportunity: &Opportunity,
        outline: &Article,
        curation: &CurationOutput,
    ) -> Result<Article> {
        self.timing.start_phase(TimingKeys::ARTICLE_GENERATION);
        let article = ArticleGenerationModule::new(&self.context)
            .generate_article(&opportunity.name, outline, &curation.information_table)
            .await?;

        self.store()
            .update(
                &opportunity.id,
                vec![
                    (RecordField::StormGenArticle, article.to_text()),
                    (RecordField::UrlToInfo, article.references_to_json()?),
                ],
            )
            .await?;
        self.end_phase(TimingKeys::ARTICLE_GENERATION);
        Ok(article)
    }

    pub async fn run_article_polishing_module(
        &mut self,
        opportunity: &Opportunity,
        draft_article: &Article,
        remove_duplicate: bool,
    ) -> Result<Article> {
        self.timing.start_phase(TimingKeys::ARTICLE_POLISHING);
        let polished = ArticlePolishingModule::new(&self.context)
            .polish_article(&opportunity.name, draft_article, remove_duplicate)
            .await?;

        self.store()
            .update(
                &opportunity.id,
                vec![(RecordField::StormGenArticlePolished, polished.to_text())],
            )
            .await?;
        self.end_phase(TimingKeys::ARTICLE_POLISHING);
        Ok(polished)
    }

    /// 持久化运行配置和本次剩余的调用记录
    pub async fn post_run(&self, opportunity: &Opportunity) -> Result<()> {
        let config = &self.context.config;
        let run_config = json!({
            "opportunity": opportunity.name,
            "provider": config.llm.provider.to_string(),
            "temperature": config.llm.temperature,
            "models": self.context.lm_configs.log(),
            "runner": config.runner,
        });

        self.store()
            .update(
                &opportunity.id,
                vec![(RecordField::RunConfig, serde_json::to_string(&run_config)?)],
            )
            .await?;
        self.persist_call_history(opportunity).await
    }

    /// 把内存中的调用记录追加到已持久化的历史，并清空内存
    pub async fn persist_call_history(&self, opportunity: &Opportunity) -> Result<()> {
        let calls = self.context.lm_configs.collect_and_reset_history().await;
        if calls.is_empty() {
            return Ok(());
        }

        let record = self.load_record(opportunity).await?;
        let mut history: Vec<LlmCallRecord> = match record.field(RecordField::LlmCallHistory) {
            Some(existing) => serde_json::from_str(existing)
                .context("Failed to parse persisted llm_call_history")?,
            None => Vec::new(),
        };
        history.extend(calls);
        info!(opportunity = %opportunity.id, calls = history.len(), "保存调用记录");

        self.store()
            .update(
                &opportunity.id,
                vec![(RecordField::LlmCallHistory, serde_json::to_string(&history)?)],
            )
            .await?;
        Ok(())
    }

    async fn load_record(&self, opportunity: &Opportunity) -> Result<OpportunityRecord> {
        self.store()
            .get(&opportunity.id)
            .await?
            .ok_or_else(|| StormError::OpportunityNotFound(opportunity.id.clone()).into())
    }

    /// 由 conversation_log 重建对话和信息表
    pub async fn load_curation(&self, opportunity: &Opportunity) -> Result<CurationOutput> {
        let record = self.load_record(opportunity).await?;
        let conversation_log = record.require(RecordField::ConversationLog)?;
        let conversations: Vec<Conversation> = serde_json::from_str(conversation_log)
            .context("Failed to parse persisted conversation_log")?;
        Ok(CurationOutput::from_conversations(conversations))
    }

    pub async fn load_outline(&self, opportunity: &Opportunity) -> Result<Article> {
        let record = self.load_record(opportunity).await?;
        // 清理后为空的大纲也是有效产物，成文阶段会退化为单一章节
        let outline = record.require_persisted(RecordField::StormGenOutline)?;
        Ok(Article::from_outline_str(&opportunity.name, outline))
    }

    pub async fn load_draft_article(&self, opportunity: &Opportunity) -> Result<Article> {
        let record = self.load_record(opportunity).await?;
        let text = record.require(RecordField::StormGenArticle)?;
        let references = Article::references_from_json(record.require(RecordField::UrlToInfo)?)
            .context("Failed to parse persisted url_to_info")?;
        Ok(Article::from_string(&opportunity.name, text, references))
    }

    fn end_phase(&mut self, phase: &str) {
        if let Some(duration) = self.timing.end_phase(phase) {
            info!(phase, seconds = duration.as_secs_f64(), "阶段完成");
        }
    }
}

/// 命令行可执行的操作
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// 按状态机生成（或继续生成）报告
    Generate {
        name: String,
        remove_duplicate: bool,
        ground_truth_url: Option<String>,
    },
    /// 手动执行指定阶段，不推进状态
    Run { name: String, options: RunOptions },
    List,
    Delete { name: String },
}

/// 启动命令
pub async fn launch(config: &Config, command: Command) -> Result<()> {
    match command {
        Command::List => {
            let store = JsonFileStore::new(config.storage.dir.clone(), config.storage.lock_stale_minutes);
            for record in store.list(&|_: &OpportunityRecord| true).await? {
                println!("{}\t{}\t{}", record.id, record.status, record.name);
            }
            Ok(())
        }
        Command::Delete { name } => {
            let opportunity = Opportunity::new(&name)?;
            let store = JsonFileStore::new(config.storage.dir.clone(), config.storage.lock_stale_minutes);
            let _lease = store.acquire_run_lock(&opportunity.id).await?;
            if store.delete(&opportunity.id).await? {
                println!("已删除 {}", opportunity.id);
            } else {
                println!("未找到 {}", opportunity.id);
            }
            Ok(())
        }
        Command::Generate {
            name,
            remove_duplicate,
            ground_truth_url,
        } => {
            let mut runner = StormRunner::new(GeneratorContext::new(config.clone())?);
            let record = runner
                .generate_report(&name, remove_duplicate, ground_truth_url.as_deref())
                .await?;
            println!("{}\t{}", record.id, record.status.describe());
            Ok(())
        }
        Command::Run { name, options } => {
            let opportunity = Opportunity::new(&name)?;
            let mut runner = StormRunner::new(GeneratorContext::new(config.clone())?);
            let _lease = runner.store().acquire_run_lock(&opportunity.id).await?;
            runner.run(&opportunity, &options).await?;
            runner.post_run(&opportunity).await?;
            info!("\n{}", runner.timing().generate_timing_report());
            Ok(())
        }
    }
}
