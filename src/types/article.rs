use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::types::information::Source;
use crate::utils::text::{ArticleTextProcessing, ParsedSection, title_matches};

/// 文档树节点
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OutlineNode {
    pub section_name: String,
    pub content: String,
    pub children: Vec<OutlineNode>,
    /// 本节正文引用到的全局引用编号
    #[serde(default)]
    pub cited: BTreeSet<usize>,
}

impl OutlineNode {
    pub fn new(section_name: &str) -> Self {
        Self {
            section_name: section_name.to_string(),
            ..Default::default()
        }
    }

    pub fn child(&self, name: &str) -> Option<&OutlineNode> {
        self.children.iter().find(|c| title_matches(&c.section_name, name))
    }

    fn child_mut(&mut self, name: &str) -> Option<&mut OutlineNode> {
        self.children
            .iter_mut()
            .find(|c| title_matches(&c.section_name, name))
    }

    /// 深度优先查找章节
    pub fn find(&self, name: &str) -> Option<&OutlineNode> {
        if title_matches(&self.section_name, name) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut OutlineNode> {
        if title_matches(&self.section_name, name) {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(name))
    }

    fn has_content(&self) -> bool {
        !self.content.trim().is_empty()
    }

    /// 按标题合并章节：已存在则更新正文，否则追加新节点
    fn insert_or_create(&mut self, sections: &[ParsedSection], trim_children: bool) {
        for section in sections {
            match self.child_mut(&section.title) {
                Some(node) => {
                    node.content = section.content.trim().to_string();
                    node.insert_or_create(&section.subsections, trim_children);
                }
                None => {
                    let mut node = OutlineNode::new(&section.title);
                    node.content = section.content.trim().to_string();
                    node.insert_or_create(&section.subsections, trim_children);
                    self.children.push(node);
                }
            }
        }
        if trim_children {
            self.children.retain(|c| {
                sections
                    .iter()
                    .any(|s| title_matches(&s.title, &c.section_name))
            });
        }
    }

    /// 删除没有正文且没有非空子节点的节点，返回自身是否保留
    fn prune_empty(&mut self) -> bool {
        self.children.retain_mut(|c| c.prune_empty());
        self.has_content() || !self.children.is_empty()
    }

    fn collect_outline(&self, level: usize, add_hashtags: bool, out: &mut Vec<String>) {
        if add_hashtags {
            out.push(format!("{} {}", "#".repeat(level), self.section_name));
        } else {
            out.push(self.section_name.clone());
        }
        for child in &self.children {
            child.collect_outline(level + 1, add_hashtags, out);
        }
    }

    fn collect_text(&self, level: usize, out: &mut Vec<String>) {
        out.push(format!("{} {}", "#".repeat(level), self.section_name));
        out.push(self.content.clone());
        for child in &self.children {
            child.collect_text(level + 1, out);
        }
    }

    fn visit<'a>(&'a self, f: &mut impl FnMut(&'a OutlineNode)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }

    fn visit_mut(&mut self, f: &mut impl FnMut(&mut OutlineNode)) {
        f(self);
        for child in &mut self.children {
            child.visit_mut(f);
        }
    }
}

/// 文章：大纲树加上累积的引用表
#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    pub root: OutlineNode,
    /// 全局引用编号 -> 来源
    references: BTreeMap<usize, Source>,
    url_to_index: HashMap<String, usize>,
}

impl Article {
    pub fn new(opportunity_name: &str) -> Self {
        Self {
            root: OutlineNode::new(opportunity_name),
            references: BTreeMap::new(),
            url_to_index: HashMap::new(),
        }
    }

    pub fn opportunity_name(&self) -> &str {
        &self.root.section_name
    }

    /// 由 `#` 深度编码的扁平大纲重建树，无法解析的行被丢弃
    pub fn from_outline_str(opportunity_name: &str, outline_str: &str) -> Self {
        let mut article = Self::new(opportunity_name);

        let mut lines: Vec<(usize, String)> = outline_str
            .lines()
            .filter_map(ArticleTextProcessing::parse_heading)
            .collect();
        // 模型有时把主题本身写成一级标题
        if lines
            .first()
            .is_some_and(|(_, title)| title_matches(title, opportunity_name))
        {
            lines.remove(0);
        }
        let Some(min_level) = lines.iter().map(|(level, _)| *level).min() else {
            return article;
        };

        // 当前路径上每层节点在父节点中的下标
        let mut path: Vec<usize> = Vec::new();
        for (level, title) in lines {
            let depth = (level - min_level).min(path.len());
            path.truncate(depth);

            let mut parent = &mut article.root;
            for index in &path {
                parent = &mut parent.children[*index];
            }
            let index = match parent
                .children
                .iter()
                .position(|c| title_matches(&c.section_name, &title))
            {
                Some(index) => index,
                None => {
                    parent.children.push(OutlineNode::new(&title));
                    parent.children.len() - 1
                }
            };
            path.push(index);
        }

        article
    }

    /// 由持久化的文章正文和引用表还原
    pub fn from_string(
        opportunity_name: &str,
        article_text: &str,
        references: BTreeMap<usize, Source>,
    ) -> Self {
        let mut article = Self::new(opportunity_name);
        let sections = ArticleTextProcessing::parse_article_into_sections(article_text);
        article.root.insert_or_create(&sections, false);
        for (index, mut source) in references {
            source.citation_index = index;
            article.url_to_index.insert(source.url.clone(), index);
            article.references.insert(index, source);
        }
        article.refresh_cited();
        article
    }

    pub fn first_level_section_names(&self) -> Vec<String> {
        self.root
            .children
            .iter()
            .map(|c| c.section_name.clone())
            .collect()
    }

    pub fn find_section(&self, name: &str) -> Option<&OutlineNode> {
        self.root.find(name)
    }

    /// 以列表形式返回大纲
    ///
    /// 指定 `root_section_name` 时只返回该章节子树，且包含该章节本身。
    pub fn outline_as_list(
        &self,
        root_section_name: Option<&str>,
        add_hashtags: bool,
        include_root: bool,
    ) -> Vec<String> {
        let (node, include_root) = match root_section_name {
            None => (&self.root, include_root),
            Some(name) => match self.root.find(name) {
                Some(node) => (node, include_root || !std::ptr::eq(node, &self.root)),
                None => return Vec::new(),
            },
        };

        let mut out = Vec::new();
        if include_root {
            node.collect_outline(1, add_hashtags, &mut out);
        } else {
            for child in &node.children {
                child.collect_outline(1, add_hashtags, &mut out);
            }
        }
        out
    }

    /// 序列化为 storm_gen_outline 的扁平文本
    pub fn outline_to_string(&self) -> String {
        self.outline_as_list(None, true, false).join("\n")
    }

    /// 合并一个章节的生成结果
    ///
    /// 正文中的 `[i]` 是相对于 `info_list` 的局部编号，这里先映射成全局编号，
    /// 越界的引用直接删除，然后按标题并入 `parent_section_name` 下（None 为根）。
    pub fn update_section(
        &mut self,
        parent_section_name: Option<&str>,
        current_section_content: &str,
        current_section_info_list: &[Source],
    ) {
        let content = ArticleTextProcessing::rewrite_citations(current_section_content, |local| {
            if local == 0 || local > current_section_info_list.len() {
                return None;
            }
            Some(self.register_source(&current_section_info_list[local - 1]))
        });

        let sections = ArticleTextProcessing::parse_article_into_sections(&content);
        self.insert_or_create_section(&sections, parent_section_name, false);
    }

    /// 按标题把章节树并入指定父节点；重复插入同名章节只会更新
    pub fn insert_or_create_section(
        &mut self,
        sections: &[ParsedSection],
        parent_section_name: Option<&str>,
        trim_children: bool,
    ) {
        let parent_name = parent_section_name.filter(|name| self.root.find(name).is_some());
        let parent = match parent_name {
            Some(name) => self.root.find_mut(name),
            None => None,
        };
        match parent {
            Some(node) => node.insert_or_create(sections, trim_children),
            None => self.root.insert_or_create(sections, trim_children),
        }
    }

    /// 把指定一级章节移到最前
    pub fn promote_section(&mut self, name: &str) {
        if let Some(position) = self
            .root
            .children
            .iter()
            .position(|c| title_matches(&c.section_name, name))
        {
            let node = self.root.children.remove(position);
            self.root.children.insert(0, node);
        }
    }

    fn register_source(&mut self, source: &Source) -> usize {
        if let Some(index) = self.url_to_index.get(&source.url) {
            if let Some(existing) = self.references.get_mut(index) {
                for snippet in &source.snippets {
                    if !existing.snippets.contains(snippet) {
                        existing.snippets.push(snippet.clone());
                    }
                }
            }
            return *index;
        }
        let index = self.references.keys().next_back().copied().unwrap_or(0) + 1;
        let mut source = source.clone();
        source.citation_index = index;
        self.url_to_index.insert(source.url.clone(), index);
        self.references.insert(index, source);
        index
    }

    /// 合并后的收尾：删除空节点，按首次出现顺序重排引用编号，并裁掉未被引用的来源
    pub fn post_processing(&mut self) {
        self.root.children.retain_mut(|c| c.prune_empty());
        self.reorder_reference_index();
    }

    fn reorder_reference_index(&mut self) {
        let mut mapping: HashMap<usize, usize> = HashMap::new();
        let references = &self.references;
        self.root.visit(&mut |node| {
            for index in ArticleTextProcessing::find_citations(&node.content) {
                if references.contains_key(&index) && !mapping.contains_key(&index) {
                    let next = mapping.len() + 1;
                    mapping.insert(index, next);
                }
            }
        });

        self.root.visit_mut(&mut |node| {
            node.content =
                ArticleTextProcessing::rewrite_citations(&node.content, |i| mapping.get(&i).copied());
        });

        let old = std::mem::take(&mut self.references);
        self.url_to_index.clear();
        for (old_index, mut source) in old {
            if let Some(new_index) = mapping.get(&old_index) {
                // 多个章节并入同一来源时片段顺序取决于完成顺序，这里固定下来
                source.snippets.sort();
                source.citation_index = *new_index;
                self.url_to_index.insert(source.url.clone(), *new_index);
                self.references.insert(*new_index, source);
            }
        }
        self.refresh_cited();
    }

    fn refresh_cited(&mut self) {
        self.root.visit_mut(&mut |node| {
            node.cited = ArticleTextProcessing::find_citations(&node.content)
                .into_iter()
                .collect();
        });
    }

    /// 最终引用表
    pub fn references(&self) -> &BTreeMap<usize, Source> {
        &self.references
    }

    /// 序列化为 url_to_info 的 JSON
    pub fn references_to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.references)
    }

    pub fn references_from_json(json: &str) -> serde_json::Result<BTreeMap<usize, Source>> {
        serde_json::from_str(json)
    }

    /// 不含根标题的扁平正文
    pub fn to_text(&self) -> String {
        let mut out = Vec::new();
        for child in &self.root.children {
            child.collect_text(1, &mut out);
        }
        out.into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(url: &str) -> Source {
        Source {
            url: url.to_string(),
            title: url.to_string(),
            snippets: vec![format!("snippet from {}", url)],
            citation_index: 0,
        }
    }

    fn outline() -> Article {
        Article::from_outline_str(
            "Acme",
            "# Overview\n## History\n## Products\n# Financials\n### Revenue\n# Conclusion",
        )
    }

    #[test]
    fn test_from_outline_str_builds_tree() {
        let article = outline();
        assert_eq!(
            article.first_level_section_names(),
            vec!["Overview", "Financials", "Conclusion"]
        );
        // 跳级的标题挂到最近的祖先下
        let financials = article.find_section("Financials").unwrap();
        assert_eq!(financials.children[0].section_name, "Revenue");
        assert_eq!(
            article.outline_to_string(),
            "# Overview\n## History\n## Products\n# Financials\n## Revenue\n# Conclusion"
        );
    }

    #[test]
    fn test_from_outline_str_skips_topic_heading_and_garbage() {
        let article = Article::from_outline_str("Acme", "# Acme\n## Overview\nnot a heading\n## Risks");
        assert_eq!(article.first_level_section_names(), vec!["Overview", "Risks"]);
        assert!(Article::from_outline_str("Acme", "garbage only").root.children.is_empty());
    }

    #[test]
    fn test_outline_as_list_for_section() {
        let article = outline();
        assert_eq!(
            article.outline_as_list(Some("Overview"), false, false),
            vec!["Overview", "History", "Products"]
        );
        assert_eq!(
            article.outline_as_list(Some("Overview"), true, false),
            vec!["# Overview", "## History", "## Products"]
        );
        assert!(article.outline_as_list(Some("Missing"), true, false).is_empty());
    }

    #[test]
    fn test_update_section_remaps_local_citations() {
        let mut article = outline();
        article.update_section(
            None,
            "# Financials\nRevenue doubled[2]. Costs fell[1]. Bogus[7].",
            &[source("https://a"), source("https://b")],
        );
        article.update_section(
            None,
            "# Overview\nFounded long ago[1].",
            &[source("https://b")],
        );

        let financials = article.find_section("Financials").unwrap();
        assert_eq!(financials.content, "Revenue doubled[1]. Costs fell[2]. Bogus.");
        let overview = article.find_section("Overview").unwrap();
        assert_eq!(overview.content, "Founded long ago[1].");
        assert_eq!(article.references()[&1].url, "https://b");
        assert_eq!(article.references()[&2].url, "https://a");
    }

    #[test]
    fn test_update_section_is_idempotent() {
        let mut article = outline();
        let content = "# Financials\nSteady[1].\n## Revenue\nUp[1].";
        article.update_section(None, content, &[source("https://a")]);
        let once = article.clone();
        article.update_section(None, content, &[source("https://a")]);
        assert_eq!(article, once);
        assert_eq!(
            article
                .root
                .children
                .iter()
                .filter(|c| c.section_name == "Financials")
                .count(),
            1
        );
    }

    #[test]
    fn test_shared_source_snippets_do_not_depend_on_merge_order() {
        let with_snippet = |snippet: &str| Source {
            snippets: vec![snippet.to_string()],
            ..source("https://a")
        };
        let merge = |first: &str, second: &str| {
            let mut article = outline();
            article.update_section(None, &format!("# {}\nUp[1].", first), &[with_snippet(first)]);
            article.update_section(None, &format!("# {}\nUp[1].", second), &[with_snippet(second)]);
            article.post_processing();
            article
        };

        let forward = merge("Overview", "Financials");
        let backward = merge("Financials", "Overview");
        assert_eq!(forward.references(), backward.references());
        assert_eq!(forward.references()[&1].snippets, vec!["Financials", "Overview"]);
    }

    #[test]
    fn test_post_processing_prunes_and_renumbers() {
        let mut article = outline();
        article.update_section(
            None,
            "# Financials\nA[1][2].",
            &[source("https://a"), source("https://b")],
        );
        article.update_section(None, "# Overview\nB[2].", &[source("https://x"), source("https://c")]);
        article.post_processing();

        // 空的 Conclusion 和 Overview 下的空子节点被删除
        assert_eq!(article.first_level_section_names(), vec!["Overview", "Financials"]);
        assert!(article.find_section("History").is_none());
        assert_eq!(article.find_section("Overview").unwrap().content, "B[1].");
        assert_eq!(article.find_section("Financials").unwrap().content, "A[2][3].");

        let urls: Vec<&str> = article.references().values().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["https://c", "https://a", "https://b"]);
        assert!(article.references().values().all(|s| s.url != "https://x"));

        let text = article.to_text();
        let cited: BTreeSet<usize> = ArticleTextProcessing::find_citations(&text).into_iter().collect();
        let referenced: BTreeSet<usize> = article.references().keys().copied().collect();
        assert_eq!(cited, referenced);
        assert_eq!(
            article.find_section("Financials").unwrap().cited,
            BTreeSet::from([2, 3])
        );
    }

    #[test]
    fn test_text_and_references_round_trip() {
        let mut article = outline();
        article.update_section(None, "# Financials\nA[1].\n## Revenue\nR[1].", &[source("https://a")]);
        article.post_processing();

        let json = article.references_to_json().unwrap();
        let restored = Article::from_string(
            "Acme",
            &article.to_text(),
            Article::references_from_json(&json).unwrap(),
        );
        assert_eq!(restored.to_text(), article.to_text());
        assert_eq!(restored.references(), article.references());
        assert_eq!(
            article.to_text(),
            "# Financials\n\nA[1].\n\n## Revenue\n\nR[1]."
        );
    }

    #[test]
    fn test_promote_section() {
        let mut article = outline();
        article.promote_section("conclusion");
        assert_eq!(article.first_level_section_names()[0], "Conclusion");
    }
}
