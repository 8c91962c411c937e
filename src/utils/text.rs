use regex::Regex;
use std::sync::LazyLock;

static CITATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+)\]").expect("citation pattern is valid"));

static CITATION_GROUP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*\[\d+(?:\s*,\s*\d+)*\]").expect("citation group pattern is valid")
});

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#+)\s+(.*?)[\s#]*$").expect("heading pattern is valid"));

/// 大纲和章节清理时剔除的参考类章节
const REFERENCE_LIKE_SECTIONS: [&str; 8] = [
    "references",
    "see also",
    "external links",
    "notes",
    "further reading",
    "bibliography",
    "sources",
    "citations",
];

/// 按标题解析出的章节
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedSection {
    pub title: String,
    pub content: String,
    pub subsections: Vec<ParsedSection>,
}

/// 文章文本处理工具
pub struct ArticleTextProcessing;

impl ArticleTextProcessing {
    /// 按词数截断文本，保留原有换行
    pub fn limit_word_count_preserve_newline(text: &str, max_word_count: usize) -> String {
        let mut word_count = 0;
        let mut lines = Vec::new();

        for line in text.lines() {
            let words: Vec<&str> = line.split_whitespace().collect();
            if word_count + words.len() <= max_word_count {
                word_count += words.len();
                lines.push(line.to_string());
                continue;
            }
            let remaining = max_word_count - word_count;
            if remaining > 0 {
                lines.push(words[..remaining].join(" "));
            }
            break;
        }

        lines.join("\n").trim().to_string()
    }

    /// 删除所有形如 [1] 或 [1, 2] 的引用标记
    pub fn remove_citations(text: &str) -> String {
        CITATION_GROUP_RE.replace_all(text, "").to_string()
    }

    /// 按出现顺序列出文本中的引用编号（可重复）
    pub fn find_citations(text: &str) -> Vec<usize> {
        CITATION_RE
            .captures_iter(text)
            .filter_map(|caps| caps[1].parse::<usize>().ok())
            .collect()
    }

    /// 逐个改写引用编号，映射为 None 的引用会被删除
    pub fn rewrite_citations<F>(text: &str, mut mapping: F) -> String
    where
        F: FnMut(usize) -> Option<usize>,
    {
        CITATION_RE
            .replace_all(text, |caps: &regex::Captures| {
                match caps[1].parse::<usize>().ok().and_then(&mut mapping) {
                    Some(index) => format!("[{}]", index),
                    None => String::new(),
                }
            })
            .to_string()
    }

    /// 解析标题行，返回 (层级, 标题)
    pub fn parse_heading(line: &str) -> Option<(usize, String)> {
        let caps = HEADING_RE.captures(line.trim())?;
        let level = caps[1].len();
        let title = caps[2].trim().to_string();
        if title.is_empty() {
            return None;
        }
        Some((level, title))
    }

    fn is_reference_like(title: &str) -> bool {
        let title = title.trim().to_lowercase();
        REFERENCE_LIKE_SECTIONS.contains(&title.as_str())
    }

    /// 清理模型生成的大纲：只保留标题行，剔除参考类章节及其下属
    pub fn clean_up_outline(outline: &str) -> String {
        let mut output = Vec::new();
        let mut skip_below: Option<usize> = None;

        for line in outline.lines() {
            let Some((level, title)) = Self::parse_heading(line) else {
                continue;
            };
            if let Some(skip_level) = skip_below {
                if level > skip_level {
                    continue;
                }
                skip_below = None;
            }
            if Self::is_reference_like(&title) {
                skip_below = Some(level);
                continue;
            }
            let title = Self::remove_citations(&title);
            output.push(format!("{} {}", "#".repeat(level), title.trim()));
        }

        output.join("\n")
    }

    /// 清理模型生成的章节正文
    pub fn clean_up_section(text: &str) -> String {
        let mut output = Vec::new();
        let mut skipping_summary = false;

        for paragraph in text.lines() {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }

            if let Some((_, title)) = Self::parse_heading(paragraph) {
                if Self::is_reference_like(&title) {
                    break;
                }
                let lowered = title.to_lowercase();
                if lowered.starts_with("summary") || lowered.starts_with("conclusion") {
                    skipping_summary = true;
                    continue;
                }
                skipping_summary = false;
                output.push(paragraph.to_string());
                continue;
            }

            if skipping_summary {
                continue;
            }
            if paragraph.starts_with("Overall")
                || paragraph.starts_with("In summary")
                || paragraph.starts_with("In conclusion")
            {
                continue;
            }
            let paragraph = Self::remove_uncompleted_sentence(paragraph);
            if !paragraph.is_empty() {
                output.push(paragraph);
            }
        }

        output.join("\n\n")
    }

    /// 截掉段落末尾未写完的句子（句末引用标记会被保留）
    pub fn remove_uncompleted_sentence(paragraph: &str) -> String {
        let trimmed = paragraph.trim_end();
        let stripped_citations = CITATION_GROUP_RE.replace_all(trimmed, "");
        if stripped_citations
            .trim_end()
            .ends_with(['.', '!', '?', '"', ':', ')'])
        {
            return trimmed.to_string();
        }

        let Some(last_stop) = trimmed.rfind(['.', '!', '?']) else {
            return trimmed.to_string();
        };
        let mut end = last_stop + 1;
        let rest = &trimmed[end..];
        if let Some(m) = CITATION_GROUP_RE.find(rest)
            && m.start() == 0
        {
            end += m.end();
            let mut tail = &trimmed[end..];
            while let Some(m) = CITATION_GROUP_RE.find(tail) {
                if m.start() != 0 {
                    break;
                }
                end += m.end();
                tail = &trimmed[end..];
            }
        }
        trimmed[..end].trim_end().to_string()
    }

    /// 按标题把文章切分为章节树，首个标题之前的文字被丢弃
    pub fn parse_article_into_sections(text: &str) -> Vec<ParsedSection> {
        let mut root = ParsedSection::default();
        // 当前路径：每一层的 (标题层级, 在父节点中的下标)
        let mut path: Vec<(usize, usize)> = Vec::new();

        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match Self::parse_heading(line) {
                Some((level, title)) => {
                    while path.last().is_some_and(|(l, _)| *l >= level) {
                        path.pop();
                    }
                    let parent = Self::section_at(&mut root, &path);
                    // 同一父节点下重复的标题合并为一个节点
                    let index = match parent
                        .subsections
                        .iter()
                        .position(|s| title_matches(&s.title, &title))
                    {
                        Some(index) => index,
                        None => {
                            parent.subsections.push(ParsedSection {
                                title,
                                ..Default::default()
                            });
                            parent.subsections.len() - 1
                        }
                    };
                    path.push((level, index));
                }
                None => {
                    if path.is_empty() {
                        continue;
                    }
                    let current = Self::section_at(&mut root, &path);
                    current.content.push_str(line.trim());
                    current.content.push('\n');
                }
            }
        }

        Self::trim_contents(&mut root.subsections);
        root.subsections
    }

    fn section_at<'a>(root: &'a mut ParsedSection, path: &[(usize, usize)]) -> &'a mut ParsedSection {
        let mut node = root;
        for (_, index) in path {
            node = &mut node.subsections[*index];
        }
        node
    }

    fn trim_contents(sections: &mut [ParsedSection]) {
        for section in sections {
            section.content = section.content.trim().to_string();
            Self::trim_contents(&mut section.subsections);
        }
    }
}

/// 章节标题作为合并键时的比较规则
pub fn title_matches(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_word_count_preserves_newlines() {
        let text = "one two three\nfour five\nsix seven eight";
        assert_eq!(
            ArticleTextProcessing::limit_word_count_preserve_newline(text, 4),
            "one two three\nfour"
        );
        assert_eq!(
            ArticleTextProcessing::limit_word_count_preserve_newline(text, 100),
            text
        );
    }

    #[test]
    fn test_find_and_rewrite_citations() {
        let text = "Revenue grew[2][1]. Margins fell[3].";
        assert_eq!(ArticleTextProcessing::find_citations(text), vec![2, 1, 3]);
        let rewritten =
            ArticleTextProcessing::rewrite_citations(text, |n| if n == 3 { None } else { Some(n * 10) });
        assert_eq!(rewritten, "Revenue grew[20][10]. Margins fell.");
    }

    #[test]
    fn test_remove_citations() {
        assert_eq!(
            ArticleTextProcessing::remove_citations("A fact [1] and [2, 3] more."),
            "A fact and more."
        );
    }

    #[test]
    fn test_clean_up_outline_drops_malformed_and_reference_sections() {
        let raw = "Here is the outline:\n# Overview\n## History[1]\n- bullet\n# References\n## Books\n# Financials\n#\n";
        assert_eq!(
            ArticleTextProcessing::clean_up_outline(raw),
            "# Overview\n## History\n# Financials"
        );
    }

    #[test]
    fn test_clean_up_section() {
        let raw = "# Financials\nRevenue was $5B[1].\n\nIt grew quickly and\n## Conclusion\nAll good.\n# References\n[1] http://x";
        assert_eq!(
            ArticleTextProcessing::clean_up_section(raw),
            "# Financials\n\nRevenue was $5B[1].\n\nIt grew quickly and"
        );
    }

    #[test]
    fn test_remove_uncompleted_sentence_keeps_trailing_citations() {
        assert_eq!(
            ArticleTextProcessing::remove_uncompleted_sentence("Done.[1][2] Not done"),
            "Done.[1][2]"
        );
        assert_eq!(
            ArticleTextProcessing::remove_uncompleted_sentence("All complete[4]."),
            "All complete[4]."
        );
    }

    #[test]
    fn test_parse_article_into_sections() {
        let text = "preamble dropped\n# A\nalpha\n## A1\nalpha one\n# B\nbeta\n### B deep\ndeep text\n## B1\n";
        let sections = ArticleTextProcessing::parse_article_into_sections(text);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].title, "A");
        assert_eq!(sections[0].content, "alpha");
        assert_eq!(sections[0].subsections[0].title, "A1");
        assert_eq!(sections[0].subsections[0].content, "alpha one");
        assert_eq!(sections[1].subsections.len(), 2);
        assert_eq!(sections[1].subsections[0].title, "B deep");
        assert_eq!(sections[1].subsections[1].title, "B1");
    }

    #[test]
    fn test_parse_article_merges_repeated_titles() {
        let text = "# A\nfirst\n# a\nsecond\n";
        let sections = ArticleTextProcessing::parse_article_into_sections(text);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].content, "first\nsecond");
    }
}
