use anyhow::Result;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::generator::context::GeneratorContext;
use crate::generator::prompts;
use crate::llm::LmRole;

static PERSONA_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.\s*(.*)").expect("persona pattern is valid"));

/// 始终排在第一位的通用角色
pub const DEFAULT_PERSONA: &str = "Basic Fact Writer: Basic Fact Writer focusing on broadly covering the basic facts about the investment opportunity.";

/// 为机会生成一组研究视角
pub struct PersonaGenerator<'a> {
    context: &'a GeneratorContext,
}

impl<'a> PersonaGenerator<'a> {
    pub fn new(context: &'a GeneratorContext) -> Self {
        Self { context }
    }

    /// 返回通用角色加上至多 `max_num_persona` 个生成的角色
    ///
    /// 生成或解析失败时只返回通用角色，不会让流水线失败。
    pub async fn generate_persona(&self, opportunity: &str, max_num_persona: usize) -> Result<Vec<String>> {
        let mut personas = vec![DEFAULT_PERSONA.to_string()];
        if max_num_persona == 0 {
            return Ok(personas);
        }

        // 缺少模型属于配置错误，直接上抛
        let model = self.context.lm_configs.get(LmRole::QuestionAsker)?;

        let examples = self.related_examples(opportunity).await;
        let output = match model
            .generate(&prompts::gen_persona(opportunity, &examples))
            .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!(opportunity, error = %e, "角色生成失败，仅使用通用角色");
                return Ok(personas);
            }
        };

        let generated = parse_personas(&output);
        debug!(opportunity, count = generated.len(), "解析出角色");
        personas.extend(generated.into_iter().take(max_num_persona));
        Ok(personas)
    }

    /// 参考页面的标题与目录，没有可用页面时为 "N/A"
    async fn related_examples(&self, opportunity: &str) -> String {
        let Some(fetcher) = &self.context.page_fetcher else {
            return "N/A".to_string();
        };
        let Ok(model) = self.context.lm_configs.get(LmRole::QuestionAsker) else {
            return "N/A".to_string();
        };

        let related = match model
            .generate(&prompts::find_related_opportunity(opportunity))
            .await
        {
            Ok(related) => related,
            Err(e) => {
                warn!(opportunity, error = %e, "查找相关页面失败");
                return "N/A".to_string();
            }
        };

        let mut examples = Vec::new();
        for url in extract_urls(&related) {
            match fetcher.fetch_outline(&url).await {
                Ok(outline) => {
                    examples.push(format!("Title: {}\nTable of Contents: {}", outline.title, outline.toc))
                }
                Err(e) => warn!(url = %url, error = %e, "抓取参考页面失败"),
            }
        }

        if examples.is_empty() {
            "N/A".to_string()
        } else {
            examples.join("\n----------\n")
        }
    }
}

/// 从模型回答中提取 URL：含 "http" 的行从该处截取到行尾
pub fn extract_urls(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.find("http").map(|start| line[start..].trim().to_string()))
        .collect()
}

/// 解析 "1. 名称: 描述" 形式的编号列表
pub fn parse_personas(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| PERSONA_LINE_RE.captures(line))
        .map(|caps| caps[1].trim().to_string())
        .filter(|persona| !persona.is_empty())
        .collect()
}
