use serde::{Deserialize, Serialize};

use crate::types::information::QueryResult;

/// 对话中发言的一方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// 提问的写作者
    Writer,
    /// 作答的专家
    Expert,
}

/// 一轮问答
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueTurn {
    /// 写作者的问题
    pub user_utterance: String,
    /// 专家的回答
    pub agent_utterance: String,
    #[serde(default)]
    pub search_queries: Vec<String>,
    #[serde(default)]
    pub search_results: Vec<QueryResult>,
}

impl DialogueTurn {
    /// 以角色标注的两条发言
    pub fn utterances(&self) -> [(Role, &str); 2] {
        [
            (Role::Writer, self.user_utterance.as_str()),
            (Role::Expert, self.agent_utterance.as_str()),
        ]
    }
}

/// 与某个角色的完整对话，调研阶段结束后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub persona: String,
    pub role_description: String,
    #[serde(rename = "dlg_turns")]
    pub turns: Vec<DialogueTurn>,
    /// 对话中途失败时记录的错误，已完成的轮次仍保留
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Conversation {
    /// 由 "名称: 描述" 形式的角色文本创建空对话
    pub fn for_persona(persona: &str) -> Self {
        let (name, description) = split_persona(persona);
        Self {
            persona: name,
            role_description: description,
            turns: Vec::new(),
            error: None,
        }
    }

    /// 还原完整的角色文本
    pub fn perspective(&self) -> String {
        if self.role_description.is_empty() {
            return self.persona.clone();
        }
        format!("{}: {}", self.persona, self.role_description)
    }
}

/// 拆分 "名称: 描述"，没有冒号时整体作为名称
pub fn split_persona(persona: &str) -> (String, String) {
    match persona.split_once(':') {
        Some((name, description)) => (name.trim().to_string(), description.trim().to_string()),
        None => (persona.trim().to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_persona() {
        let (name, description) = split_persona("Credit Analyst: focuses on debt covenants");
        assert_eq!(name, "Credit Analyst");
        assert_eq!(description, "focuses on debt covenants");
        assert_eq!(split_persona("Generalist").1, "");
    }

    #[test]
    fn test_conversation_log_shape() {
        let mut conversation = Conversation::for_persona("Analyst: numbers");
        conversation.turns.push(DialogueTurn {
            user_utterance: "How big?".to_string(),
            agent_utterance: "Big[1].".to_string(),
            search_queries: vec!["size".to_string()],
            search_results: vec![],
        });
        let value = serde_json::to_value(&conversation).unwrap();
        assert_eq!(value["persona"], "Analyst");
        assert_eq!(value["role_description"], "numbers");
        assert_eq!(value["dlg_turns"][0]["user_utterance"], "How big?");
        assert!(value.get("error").is_none());

        let restored: Conversation = serde_json::from_value(value).unwrap();
        assert_eq!(restored, conversation);
        assert_eq!(restored.perspective(), "Analyst: numbers");
        assert_eq!(restored.turns[0].utterances()[1], (Role::Expert, "Big[1]."));
    }
}
