use anyhow::Result;
use tracing::{info, warn};

use crate::generator::context::GeneratorContext;
use crate::generator::prompts;
use crate::llm::LmRole;
use crate::types::article::Article;
use crate::types::conversation::Conversation;
use crate::utils::text::ArticleTextProcessing;

const CONVERSATION_WORD_LIMIT: usize = 5000;

/// 大纲阶段的产物
#[derive(Debug, Clone)]
pub struct OutlineOutput {
    /// 结合调研对话改进后的大纲
    pub outline: Article,
    /// 只依据机会名称直接生成的草稿大纲
    pub draft_outline: Article,
}

pub struct OutlineGenerationModule<'a> {
    context: &'a GeneratorContext,
}

impl<'a> OutlineGenerationModule<'a> {
    pub fn new(context: &'a GeneratorContext) -> Self {
        Self { context }
    }

    pub async fn generate_outline(
        &self,
        opportunity: &str,
        conversations: &[Conversation],
    ) -> Result<OutlineOutput> {
        let model = self.context.lm_configs.get(LmRole::OutlineGen)?;

        let draft = model
            .generate(&prompts::write_page_outline(opportunity))
            .await?;
        let draft = ArticleTextProcessing::clean_up_outline(&draft);
        let draft_outline = Article::from_outline_str(opportunity, &draft);

        let conversation = format_conversations(conversations);
        let outline = if conversation.is_empty() {
            warn!(opportunity, "没有调研对话，直接使用草稿大纲");
            draft_outline.clone()
        } else {
            let refined = model
                .generate(&prompts::write_page_outline_from_conv(
                    opportunity,
                    &conversation,
                    &draft,
                ))
                .await?;
            let refined = ArticleTextProcessing::clean_up_outline(&refined);
            Article::from_outline_str(opportunity, &refined)
        };

        info!(
            opportunity,
            sections = outline.first_level_section_names().len(),
            "大纲生成完成"
        );
        Ok(OutlineOutput {
            outline,
            draft_outline,
        })
    }
}

/// 所有角色的对话拼成一段，去掉引用标记并限制词数
fn format_conversations(conversations: &[Conversation]) -> String {
    let turns: Vec<String> = conversations
        .iter()
        .flat_map(|c| c.turns.iter())
        .map(|turn| format!("Writer: {}\nExpert: {}", turn.user_utterance, turn.agent_utterance))
        .collect();
    if turns.is_empty() {
        return String::new();
    }
    let text = ArticleTextProcessing::remove_citations(&turns.join("\n"));
    ArticleTextProcessing::limit_word_count_preserve_newline(&text, CONVERSATION_WORD_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::conversation::DialogueTurn;

    #[test]
    fn test_format_conversations_strips_citations() {
        let mut first = Conversation::for_persona("A: a");
        first.turns.push(DialogueTurn {
            user_utterance: "Revenue?".to_string(),
            agent_utterance: "It grew 10%[1][2].".to_string(),
            search_queries: vec![],
            search_results: vec![],
        });
        let empty = Conversation::for_persona("B: b");

        assert_eq!(format_conversations(&[empty.clone()]), "");
        assert_eq!(
            format_conversations(&[first, empty]),
            "Writer: Revenue?\nExpert: It grew 10%."
        );
    }
}
