use anyhow::Result;
use tracing::{info, warn};

use crate::generator::context::GeneratorContext;
use crate::generator::prompts;
use crate::llm::LmRole;
use crate::types::article::Article;
use crate::utils::text::ArticleTextProcessing;

/// 摘要章节的标题
pub const LEAD_SECTION_TITLE: &str = "summary";

const LEAD_ECHO: &str = "The lead section:";

/// 生成摘要并可选地去除重复内容
pub struct ArticlePolishingModule<'a> {
    context: &'a GeneratorContext,
}

impl<'a> ArticlePolishingModule<'a> {
    pub fn new(context: &'a GeneratorContext) -> Self {
        Self { context }
    }

    /// 摘要或去重调用失败时只记录日志，对应部分保持原样
    pub async fn polish_article(
        &self,
        opportunity: &str,
        draft_article: &Article,
        remove_duplicate: bool,
    ) -> Result<Article> {
        let lead_model = self.context.lm_configs.get(LmRole::ArticleGen)?;
        let polish_model = self.context.lm_configs.get(LmRole::ArticlePolish)?;

        let draft_page = draft_article.to_text();

        let lead = match lead_model
            .generate(&prompts::write_lead_section(opportunity, &draft_page))
            .await
        {
            Ok(lead) => Some(extract_lead(&lead)),
            Err(e) => {
                warn!(opportunity, error = %e, "摘要生成失败，跳过摘要");
                None
            }
        };

        let page = if remove_duplicate {
            match polish_model.generate(&prompts::polish_page(&draft_page)).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(opportunity, error = %e, "去重失败，保留原文");
                    draft_page
                }
            }
        } else {
            draft_page
        };

        let polished_text = match lead.filter(|lead| !lead.is_empty()) {
            Some(lead) => format!("# {}\n{}\n\n{}", LEAD_SECTION_TITLE, lead, page),
            None => page,
        };

        let sections = ArticleTextProcessing::parse_article_into_sections(&polished_text);
        let mut polished = draft_article.clone();
        polished.insert_or_create_section(&sections, None, false);
        polished.promote_section(LEAD_SECTION_TITLE);
        polished.post_processing();

        info!(
            opportunity,
            remove_duplicate,
            sections = polished.first_level_section_names().len(),
            "润色完成"
        );
        Ok(polished)
    }
}

/// 去掉模型回显的 "The lead section:" 及其之前的内容
fn extract_lead(lead: &str) -> String {
    match lead.split_once(LEAD_ECHO) {
        Some((_, rest)) => rest.trim().to_string(),
        None => lead.trim().to_string(),
    }
}
