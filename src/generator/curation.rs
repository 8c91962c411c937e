use std::sync::{Arc, LazyLock};

use anyhow::Result;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::generator::context::GeneratorContext;
use crate::generator::persona::PersonaGenerator;
use crate::generator::prompts::{self, CONVERSATION_STOP_PHRASE, NO_INFORMATION_ANSWER};
use crate::llm::{LanguageModel, LmRole};
use crate::search::Retriever;
use crate::types::conversation::{Conversation, DialogueTurn};
use crate::types::information::{InformationTable, QueryResult};
use crate::utils::text::ArticleTextProcessing;
use crate::utils::threads::do_parallel_with_limit;

static LIST_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*]|\d+[.)])\s*").expect("list marker pattern is valid"));

/// 对话历史保留完整回答的最近轮数
const FULL_HISTORY_TURNS: usize = 4;
const HISTORY_WORD_LIMIT: usize = 2500;
const ANSWER_INFO_WORD_LIMIT: usize = 1000;

/// 调研阶段的产物
#[derive(Debug, Clone)]
pub struct CurationOutput {
    pub conversations: Vec<Conversation>,
    pub information_table: InformationTable,
}

impl CurationOutput {
    /// 由对话记录重建，信息表编号与采集时一致
    pub fn from_conversations(conversations: Vec<Conversation>) -> Self {
        let information_table = InformationTable::from_conversations(&conversations);
        Self {
            conversations,
            information_table,
        }
    }
}

/// 模拟写作者与专家的多轮对话，收集资料
pub struct KnowledgeCurationModule<'a> {
    context: &'a GeneratorContext,
    retriever: Retriever,
}

impl<'a> KnowledgeCurationModule<'a> {
    pub fn new(context: &'a GeneratorContext, retriever: Retriever) -> Self {
        Self { context, retriever }
    }

    pub async fn research(&self, opportunity: &str) -> Result<CurationOutput> {
        let runner = &self.context.config.runner;
        let simulator = ConvSimulator {
            question_asker: self.context.lm_configs.get(LmRole::QuestionAsker)?,
            conv_simulator: self.context.lm_configs.get(LmRole::ConvSimulator)?,
            retriever: &self.retriever,
            max_turn: runner.max_conv_turn,
            max_search_queries: runner.max_search_queries_per_turn,
            search_top_k: runner.search_top_k,
        };

        let max_num_persona = if runner.disable_perspective {
            0
        } else {
            runner.max_perspective
        };
        let personas = PersonaGenerator::new(self.context)
            .generate_persona(opportunity, max_num_persona)
            .await?;
        info!(opportunity, personas = personas.len(), "开始模拟对话");

        let futures: Vec<_> = personas
            .iter()
            .map(|persona| simulator.run(opportunity, persona))
            .collect();
        let conversations = do_parallel_with_limit(futures, runner.max_thread_num).await;

        let output = CurationOutput::from_conversations(conversations);
        info!(
            opportunity,
            sources = output.information_table.len(),
            "调研完成"
        );
        Ok(output)
    }
}

/// 单个角色的对话模拟
struct ConvSimulator<'r> {
    question_asker: Arc<dyn LanguageModel>,
    conv_simulator: Arc<dyn LanguageModel>,
    retriever: &'r Retriever,
    max_turn: usize,
    max_search_queries: usize,
    search_top_k: usize,
}

impl ConvSimulator<'_> {
    /// 运行对话；中途失败会记录错误并保留已完成的轮次
    async fn run(&self, opportunity: &str, persona: &str) -> Conversation {
        let mut conversation = Conversation::for_persona(persona);

        for _ in 0..self.max_turn {
            let question = match self.ask(opportunity, persona, &conversation.turns).await {
                Ok(question) => question,
                Err(e) => {
                    warn!(persona = %conversation.persona, error = %e, "写作者提问失败");
                    conversation.error = Some(e.to_string());
                    break;
                }
            };
            if question.is_empty() || question.starts_with(CONVERSATION_STOP_PHRASE) {
                debug!(persona = %conversation.persona, "写作者结束对话");
                break;
            }

            match self.answer(opportunity, question).await {
                Ok(turn) => conversation.turns.push(turn),
                Err(e) => {
                    warn!(persona = %conversation.persona, error = %e, "专家回答失败");
                    conversation.error = Some(e.to_string());
                    break;
                }
            }
        }

        conversation
    }

    async fn ask(&self, opportunity: &str, persona: &str, turns: &[DialogueTurn]) -> Result<String> {
        let history = format_history(turns);
        let question = self
            .question_asker
            .generate(&prompts::ask_question(opportunity, persona, &history))
            .await?;
        Ok(question.trim().to_string())
    }

    async fn answer(&self, opportunity: &str, question: String) -> Result<DialogueTurn> {
        let output = self
            .conv_simulator
            .generate(&prompts::question_to_query(opportunity, &question))
            .await?;
        let queries = parse_queries(&output, self.max_search_queries);
        let search_results = self.retriever.retrieve(&queries, self.search_top_k).await;

        let info = format_search_results(&search_results);
        let answer = if info.is_empty() {
            NO_INFORMATION_ANSWER.to_string()
        } else {
            let info = ArticleTextProcessing::limit_word_count_preserve_newline(&info, ANSWER_INFO_WORD_LIMIT);
            let answer = self
                .conv_simulator
                .generate(&prompts::answer_question(opportunity, &question, &info))
                .await?;
            ArticleTextProcessing::remove_uncompleted_sentence(answer.trim())
        };

        Ok(DialogueTurn {
            user_utterance: question,
            agent_utterance: answer,
            search_queries: queries,
            search_results,
        })
    }
}

/// 对话历史，较早的轮次省略回答
fn format_history(turns: &[DialogueTurn]) -> String {
    let full_from = turns.len().saturating_sub(FULL_HISTORY_TURNS);
    let history: Vec<String> = turns
        .iter()
        .enumerate()
        .map(|(i, turn)| {
            let answer = if i >= full_from {
                turn.agent_utterance.as_str()
            } else {
                "Omit the answer here due to space limit."
            };
            format!("You: {}\nExpert: {}", turn.user_utterance, answer)
        })
        .collect();

    let history = history.join("\n");
    if history.trim().is_empty() {
        return "N/A".to_string();
    }
    ArticleTextProcessing::limit_word_count_preserve_newline(&history, HISTORY_WORD_LIMIT)
}

/// 解析 "- query" 列表，去重并截取前 `max` 个
fn parse_queries(output: &str, max: usize) -> Vec<String> {
    let mut queries: Vec<String> = Vec::new();
    for line in output.lines() {
        let stripped = LIST_MARKER_RE.replace(line, "");
        let query = stripped.trim().trim_matches('"').trim();
        if !query.is_empty() && !queries.iter().any(|q| q == query) {
            queries.push(query.to_string());
        }
    }
    queries.truncate(max);
    queries
}

/// 按结果出现顺序编号，每条结果取首个片段
fn format_search_results(results: &[QueryResult]) -> String {
    let mut info = String::new();
    let hits = results.iter().flat_map(|r| r.hits.iter());
    for (n, hit) in hits.enumerate() {
        if let Some(snippet) = hit.effective_snippets().first() {
            info.push_str(&format!("[{}]: {}\n\n", n + 1, snippet));
        }
    }
    info
}
