use std::sync::Arc;

use anyhow::{Result, bail};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::error::StormError;
use crate::generator::context::GeneratorContext;
use crate::generator::prompts;
use crate::llm::{LanguageModel, LmRole};
use crate::types::article::Article;
use crate::types::information::{InformationTable, Source};
use crate::utils::text::{ArticleTextProcessing, ParsedSection, title_matches};

const SECTION_INFO_WORD_LIMIT: usize = 1500;

/// 单个章节的生成结果，正文中的引用编号相对于 `info`
#[derive(Debug, Clone)]
pub struct SectionOutput {
    pub section_name: String,
    pub content: String,
    pub info: Vec<Source>,
}

/// 引言和结论不在这里写，摘要在润色阶段生成
pub fn is_skipped_section(section_name: &str) -> bool {
    let name = section_name.trim().to_lowercase();
    name == "introduction" || name.starts_with("conclusion") || name.starts_with("summary")
}

/// 需要逐节生成的一级章节
pub fn sections_to_write(outline: &Article) -> Vec<String> {
    outline
        .first_level_section_names()
        .into_iter()
        .filter(|name| !is_skipped_section(name))
        .collect()
}

/// 按大纲并行撰写各章节并合并成文
pub struct ArticleGenerationModule<'a> {
    context: &'a GeneratorContext,
}

/// 一个待写章节：名称、带 # 的章节大纲、检索用查询
struct SectionTask {
    name: String,
    outline: String,
    queries: Vec<String>,
}

impl<'a> ArticleGenerationModule<'a> {
    pub fn new(context: &'a GeneratorContext) -> Self {
        Self { context }
    }

    pub async fn generate_article(
        &self,
        opportunity: &str,
        outline: &Article,
        information_table: &InformationTable,
    ) -> Result<Article> {
        let model = self.context.lm_configs.get(LmRole::ArticleGen)?;
        let runner = &self.context.config.runner;

        let mut table = information_table.clone();
        table.prepare_table_for_retrieval();

        let tasks = plan_sections(opportunity, outline);
        let attempted = tasks.len();
        info!(opportunity, sections = attempted, "开始撰写章节");

        let table = &table;
        let futures = tasks.into_iter().map(|task| {
            let model = model.clone();
            async move {
                let result = self
                    .generate_section(model, opportunity, &task, table)
                    .await;
                (task.name, result)
            }
        });
        let mut results = stream::iter(futures).buffer_unordered(runner.max_thread_num.max(1));

        // 按完成顺序逐个并入，引用编号在收尾时统一重排
        let mut article = outline.clone();
        let mut failed = 0;
        while let Some((name, result)) = results.next().await {
            match result {
                Ok(section) => {
                    debug!(section = %name, sources = section.info.len(), "章节完成");
                    article.update_section(None, &section.content, &section.info);
                }
                Err(e) => {
                    failed += 1;
                    warn!(section = %name, error = %e, "章节生成失败");
                }
            }
        }

        if attempted > 0 && failed == attempted {
            return Err(StormError::AllSectionsFailed(attempted).into());
        }

        article.post_processing();
        info!(
            opportunity,
            written = attempted - failed,
            failed,
            references = article.references().len(),
            "成文完成"
        );
        Ok(article)
    }

    async fn generate_section(
        &self,
        model: Arc<dyn LanguageModel>,
        opportunity: &str,
        task: &SectionTask,
        table: &InformationTable,
    ) -> Result<SectionOutput> {
        let info = table.retrieve(&task.queries, self.context.config.runner.retrieve_top_k);
        let collected = format_collected_info(&info);

        let output = model
            .generate(&prompts::write_section(&collected, opportunity, &task.outline))
            .await?;
        let content = ArticleTextProcessing::clean_up_section(&output);
        let content = normalize_section_heading(&task.name, &content);
        if !has_body(&ArticleTextProcessing::parse_article_into_sections(&content)) {
            bail!("章节 {} 的生成结果没有正文", task.name);
        }

        Ok(SectionOutput {
            section_name: task.name.clone(),
            content,
            info,
        })
    }
}

fn plan_sections(opportunity: &str, outline: &Article) -> Vec<SectionTask> {
    // 大纲为空时把整个机会当作一个章节
    if outline.first_level_section_names().is_empty() {
        return vec![SectionTask {
            name: opportunity.to_string(),
            outline: String::new(),
            queries: vec![opportunity.to_string()],
        }];
    }

    sections_to_write(outline)
        .into_iter()
        .map(|name| SectionTask {
            outline: outline.outline_as_list(Some(&name), true, false).join("\n"),
            queries: outline.outline_as_list(Some(&name), false, false),
            name,
        })
        .collect()
}

fn has_body(sections: &[ParsedSection]) -> bool {
    sections
        .iter()
        .any(|s| !s.content.is_empty() || has_body(&s.subsections))
}

/// `[i]` 加上该来源的全部片段，整体限制词数
fn format_collected_info(info: &[Source]) -> String {
    let collected: String = info
        .iter()
        .enumerate()
        .map(|(i, source)| format!("[{}]\n{}\n\n", i + 1, source.snippets.join("\n")))
        .collect();
    ArticleTextProcessing::limit_word_count_preserve_newline(&collected, SECTION_INFO_WORD_LIMIT)
}

/// 确保正文以该章节的一级标题开头，合并时才能按标题落到大纲节点上
fn normalize_section_heading(section_name: &str, content: &str) -> String {
    let mut lines = content.lines().skip_while(|line| line.trim().is_empty());
    let Some(first) = lines.next() else {
        return String::new();
    };

    match ArticleTextProcessing::parse_heading(first) {
        Some((_, title)) if title_matches(&title, section_name) => content.trim().to_string(),
        Some((1, _)) => {
            let rest: Vec<&str> = lines.collect();
            format!("# {}\n{}", section_name, rest.join("\n")).trim().to_string()
        }
        _ => format!("# {}\n\n{}", section_name, content.trim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_to_write_skips_intro_and_conclusion() {
        let outline = Article::from_outline_str(
            "Acme",
            "# Introduction\n# Overview\n# Financials\n# Conclusion and outlook\n# Summary",
        );
        assert_eq!(sections_to_write(&outline), vec!["Overview", "Financials"]);
        assert!(!is_skipped_section("Introduction to products"));
    }

    #[test]
    fn test_plan_sections_uses_subsection_titles() {
        let outline =
            Article::from_outline_str("Acme", "# Overview\n## History\n## Products\n# Financials");
        let tasks = plan_sections("Acme", &outline);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].outline, "# Overview\n## History\n## Products");
        assert_eq!(tasks[0].queries, vec!["Overview", "History", "Products"]);
        assert_eq!(tasks[1].queries, vec!["Financials"]);
    }

    #[test]
    fn test_plan_sections_falls_back_to_opportunity() {
        let tasks = plan_sections("Acme", &Article::new("Acme"));
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "Acme");
        assert_eq!(tasks[0].queries, vec!["Acme"]);
        assert!(tasks[0].outline.is_empty());
    }

    #[test]
    fn test_format_collected_info() {
        let source = |url: &str, snippets: &[&str]| Source {
            url: url.to_string(),
            title: url.to_string(),
            snippets: snippets.iter().map(|s| s.to_string()).collect(),
            citation_index: 9,
        };
        let info = vec![source("u1", &["a", "b"]), source("u2", &["c"])];
        assert_eq!(format_collected_info(&info), "[1]\na\nb\n\n[2]\nc");
    }

    #[test]
    fn test_normalize_section_heading() {
        assert_eq!(
            normalize_section_heading("Financials", "# financials\nText."),
            "# financials\nText."
        );
        assert_eq!(
            normalize_section_heading("Financials", "# Financial Results\nText."),
            "# Financials\nText."
        );
        assert_eq!(
            normalize_section_heading("Financials", "## Revenue\nText."),
            "# Financials\n\n## Revenue\nText."
        );
        assert_eq!(
            normalize_section_heading("Financials", "Text only."),
            "# Financials\n\nText only."
        );
        assert_eq!(normalize_section_heading("Financials", "  \n"), "");
    }
}
