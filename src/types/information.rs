use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::types::conversation::Conversation;

/// 检索后端返回的一条结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub snippets: Vec<String>,
}

impl SearchHit {
    /// 后端没给片段时用描述兜底
    pub fn effective_snippets(&self) -> Vec<String> {
        if self.snippets.is_empty() && !self.description.trim().is_empty() {
            return vec![self.description.clone()];
        }
        self.snippets.clone()
    }
}

/// 一个查询及其结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub query: String,
    pub hits: Vec<SearchHit>,
}

/// 按 URL 去重后的来源
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    pub title: String,
    pub snippets: Vec<String>,
    #[serde(default)]
    pub citation_index: usize,
}

/// 持久化到 raw_search_results 的单条记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSource {
    pub title: String,
    pub snippets: Vec<String>,
    pub citation_index: usize,
}

/// (角色, 查询) 到返回 URL 的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTrace {
    pub persona: String,
    pub query: String,
    pub urls: Vec<String>,
}

/// 检索用的片段索引
#[derive(Debug, Clone, Default)]
struct SnippetIndex {
    /// (来源下标, 片段下标, 词集合)
    entries: Vec<(usize, usize, HashSet<String>)>,
}

/// 信息表：URL -> 来源，引用编号按首次发现顺序分配
#[derive(Debug, Clone, Default)]
pub struct InformationTable {
    sources: Vec<Source>,
    url_to_position: HashMap<String, usize>,
    query_traces: Vec<QueryTrace>,
    index: Option<SnippetIndex>,
}

impl InformationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 并入一个片段，URL 首次出现时分配引用编号
    pub fn add(&mut self, url: &str, title: &str, snippet: &str) -> usize {
        let position = match self.url_to_position.get(url) {
            Some(position) => *position,
            None => {
                let position = self.sources.len();
                self.sources.push(Source {
                    url: url.to_string(),
                    title: title.to_string(),
                    snippets: Vec::new(),
                    citation_index: position + 1,
                });
                self.url_to_position.insert(url.to_string(), position);
                position
            }
        };

        let source = &mut self.sources[position];
        if source.title.is_empty() && !title.is_empty() {
            source.title = title.to_string();
        }
        if !snippet.trim().is_empty() && !source.snippets.iter().any(|s| s == snippet) {
            source.snippets.push(snippet.to_string());
        }
        self.index = None;
        source.citation_index
    }

    /// 并入一条检索结果
    pub fn add_hit(&mut self, hit: &SearchHit) -> usize {
        let snippets = hit.effective_snippets();
        if snippets.is_empty() {
            return self.add(&hit.url, &hit.title, "");
        }
        let mut index = 0;
        for snippet in &snippets {
            index = self.add(&hit.url, &hit.title, snippet);
        }
        index
    }

    /// 记录某角色的某个查询返回了哪些 URL
    pub fn record_query(&mut self, persona: &str, query: &str, urls: Vec<String>) {
        self.query_traces.push(QueryTrace {
            persona: persona.to_string(),
            query: query.to_string(),
            urls,
        });
    }

    pub fn urls_for(&self, persona: &str, query: &str) -> Vec<String> {
        self.query_traces
            .iter()
            .filter(|t| t.persona == persona && t.query == query)
            .flat_map(|t| t.urls.iter().cloned())
            .collect()
    }

    pub fn query_traces(&self) -> &[QueryTrace] {
        &self.query_traces
    }

    /// 单线程地从全部对话重建信息表
    ///
    /// 按角色顺序、轮次顺序、查询顺序、结果顺序依次并入，编号与采集时的并发交错无关。
    pub fn from_conversations(conversations: &[Conversation]) -> Self {
        let mut table = Self::new();
        for conversation in conversations {
            for turn in &conversation.turns {
                for result in &turn.search_results {
                    let mut urls = Vec::new();
                    for hit in &result.hits {
                        table.add_hit(hit);
                        urls.push(hit.url.clone());
                    }
                    table.record_query(&conversation.persona, &result.query, urls);
                }
            }
        }
        table
    }

    pub fn get(&self, url: &str) -> Option<&Source> {
        self.url_to_position.get(url).map(|p| &self.sources[*p])
    }

    /// 按引用编号顺序返回全部来源
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// 导出为 raw_search_results 的结构
    pub fn to_raw_search_results(&self) -> BTreeMap<String, RawSource> {
        self.sources
            .iter()
            .map(|s| {
                (
                    s.url.clone(),
                    RawSource {
                        title: s.title.clone(),
                        snippets: s.snippets.clone(),
                        citation_index: s.citation_index,
                    },
                )
            })
            .collect()
    }

    /// 从 raw_search_results 还原，按已持久化的编号排序
    pub fn from_raw_search_results(raw: BTreeMap<String, RawSource>) -> Self {
        let mut entries: Vec<(String, RawSource)> = raw.into_iter().collect();
        entries.sort_by(|a, b| a.1.citation_index.cmp(&b.1.citation_index).then(a.0.cmp(&b.0)));

        let mut table = Self::new();
        for (url, raw_source) in entries {
            table.add(&url, &raw_source.title, "");
            for snippet in &raw_source.snippets {
                table.add(&url, &raw_source.title, snippet);
            }
        }
        table
    }

    /// 预先建立片段索引，之后的检索只读
    pub fn prepare_table_for_retrieval(&mut self) {
        let mut entries = Vec::new();
        for (source_idx, source) in self.sources.iter().enumerate() {
            for (snippet_idx, snippet) in source.snippets.iter().enumerate() {
                entries.push((source_idx, snippet_idx, tokenize(snippet)));
            }
        }
        self.index = Some(SnippetIndex { entries });
    }

    /// 为一组章节查询挑选最相关的来源
    ///
    /// 每个查询取得分最高的 top_k 个片段，同分时按引用编号、片段下标排序；
    /// 命中的片段按 URL 聚合，来源按首次命中顺序返回。
    pub fn retrieve(&self, queries: &[String], top_k: usize) -> Vec<Source> {
        if self.sources.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let built;
        let index = match &self.index {
            Some(index) => index,
            None => {
                let mut copy = Self {
                    sources: self.sources.clone(),
                    ..Default::default()
                };
                copy.prepare_table_for_retrieval();
                built = copy.index.unwrap_or_default();
                &built
            }
        };

        let mut selected: Vec<Source> = Vec::new();
        let mut selected_pos: HashMap<usize, usize> = HashMap::new();

        for query in queries {
            let query_tokens = tokenize(query);
            if query_tokens.is_empty() {
                continue;
            }
            let mut scored: Vec<(f64, usize, usize)> = index
                .entries
                .iter()
                .map(|(source_idx, snippet_idx, tokens)| {
                    (similarity(&query_tokens, tokens), *source_idx, *snippet_idx)
                })
                .filter(|(score, _, _)| *score > 0.0)
                .collect();
            scored.sort_by(|a, b| {
                b.0.total_cmp(&a.0)
                    .then(a.1.cmp(&b.1))
                    .then(a.2.cmp(&b.2))
            });

            for (_, source_idx, snippet_idx) in scored.into_iter().take(top_k) {
                let source = &self.sources[source_idx];
                let snippet = &source.snippets[snippet_idx];
                let position = *selected_pos.entry(source_idx).or_insert_with(|| {
                    selected.push(Source {
                        url: source.url.clone(),
                        title: source.title.clone(),
                        snippets: Vec::new(),
                        citation_index: source.citation_index,
                    });
                    selected.len() - 1
                });
                let chosen = &mut selected[position];
                if !chosen.snippets.contains(snippet) {
                    chosen.snippets.push(snippet.clone());
                }
            }
        }

        selected
    }
}

const STOP_WORDS: [&str; 24] = [
    "the", "a", "an", "and", "or", "of", "to", "in", "on", "for", "with", "by", "is", "are",
    "was", "were", "be", "as", "at", "it", "its", "this", "that", "from",
];

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

/// 二值词袋上的余弦相似度
fn similarity(query: &HashSet<String>, snippet: &HashSet<String>) -> f64 {
    if query.is_empty() || snippet.is_empty() {
        return 0.0;
    }
    let overlap = query.intersection(snippet).count() as f64;
    overlap / ((query.len() as f64).sqrt() * (snippet.len() as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::conversation::{Conversation, DialogueTurn};

    fn hit(url: &str, snippets: &[&str]) -> SearchHit {
        SearchHit {
            url: url.to_string(),
            title: format!("title of {}", url),
            description: String::new(),
            snippets: snippets.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_add_assigns_indices_by_first_sight() {
        let mut table = InformationTable::new();
        assert_eq!(table.add("https://b", "B", "b one"), 1);
        assert_eq!(table.add("https://a", "A", "a one"), 2);
        assert_eq!(table.add("https://b", "B", "b two"), 1);
        assert_eq!(table.add("https://b", "B", "b two"), 1);

        let b = table.get("https://b").unwrap();
        assert_eq!(b.snippets, vec!["b one", "b two"]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_from_conversations_is_order_deterministic() {
        let turn = |q: &str, hits: Vec<SearchHit>| DialogueTurn {
            user_utterance: "q".to_string(),
            agent_utterance: "a".to_string(),
            search_queries: vec![q.to_string()],
            search_results: vec![QueryResult {
                query: q.to_string(),
                hits,
            }],
        };
        let conversations = vec![
            Conversation {
                persona: "Analyst".to_string(),
                role_description: String::new(),
                turns: vec![turn("revenue", vec![hit("https://x", &["x"]), hit("https://y", &["y"])])],
                error: None,
            },
            Conversation {
                persona: "Lawyer".to_string(),
                role_description: String::new(),
                turns: vec![turn("lawsuits", vec![hit("https://y", &["y2"]), hit("https://z", &["z"])])],
                error: None,
            },
        ];

        let first = InformationTable::from_conversations(&conversations);
        let second = InformationTable::from_conversations(&conversations);
        let indices: Vec<(String, usize)> = first
            .sources()
            .iter()
            .map(|s| (s.url.clone(), s.citation_index))
            .collect();
        assert_eq!(
            indices,
            vec![
                ("https://x".to_string(), 1),
                ("https://y".to_string(), 2),
                ("https://z".to_string(), 3)
            ]
        );
        assert_eq!(first.sources(), second.sources());
        assert_eq!(
            first.urls_for("Lawyer", "lawsuits"),
            vec!["https://y".to_string(), "https://z".to_string()]
        );
    }

    #[test]
    fn test_raw_search_results_restore_numbering() {
        let mut table = InformationTable::new();
        table.add("https://zeta", "Z", "z");
        table.add("https://alpha", "A", "a");
        let restored = InformationTable::from_raw_search_results(table.to_raw_search_results());
        assert_eq!(restored.sources(), table.sources());
    }

    #[test]
    fn test_retrieve_ranks_and_breaks_ties_by_citation_index() {
        let mut table = InformationTable::new();
        table.add("https://1", "one", "revenue growth accelerated");
        table.add("https://2", "two", "revenue growth accelerated");
        table.add("https://3", "three", "unrelated weather report");
        table.prepare_table_for_retrieval();

        let hits = table.retrieve(&["revenue growth".to_string()], 1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://1");

        let hits = table.retrieve(&["revenue growth".to_string()], 5);
        let urls: Vec<&str> = hits.iter().map(|h| h.url.as_str()).collect();
        assert_eq!(urls, vec!["https://1", "https://2"]);
    }

    #[test]
    fn test_retrieve_without_prepared_index() {
        let mut table = InformationTable::new();
        table.add("https://1", "one", "cloud margins");
        let hits = table.retrieve(&["margins".to_string()], 3);
        assert_eq!(hits.len(), 1);
        assert!(table.retrieve(&[], 3).is_empty());
    }
}
