/// Token估算器，按字符类别粗略估算文本的token数量
///
/// 只用于调用记录里的规模统计，不参与任何截断决策。
pub struct TokenEstimator {
    /// 英文字符的平均token比例（字符数/token数）
    english_char_per_token: f64,
    /// 中日韩字符的平均token比例
    cjk_char_per_token: f64,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenEstimator {
    pub fn new() -> Self {
        Self {
            english_char_per_token: 4.0,
            cjk_char_per_token: 1.5,
        }
    }

    /// 估算文本的token数量
    pub fn estimate_tokens(&self, text: &str) -> usize {
        let (cjk, other) = text.chars().fold((0usize, 0usize), |(cjk, other), c| {
            if Self::is_cjk_char(c) {
                (cjk + 1, other)
            } else {
                (cjk, other + 1)
            }
        });

        let cjk_tokens = (cjk as f64 / self.cjk_char_per_token).ceil() as usize;
        let other_tokens = (other as f64 / self.english_char_per_token).ceil() as usize;
        cjk_tokens + other_tokens
    }

    fn is_cjk_char(c: char) -> bool {
        matches!(c as u32,
            0x4E00..=0x9FFF |  // CJK统一汉字
            0x3400..=0x4DBF |  // CJK扩展A
            0x3040..=0x30FF |  // 假名
            0xAC00..=0xD7AF |  // 谚文
            0x20000..=0x2A6DF  // CJK扩展B
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        let estimator = TokenEstimator::new();
        assert_eq!(estimator.estimate_tokens(""), 0);
        assert_eq!(estimator.estimate_tokens("abcdefgh"), 2);
        assert_eq!(estimator.estimate_tokens("投资报告"), 3);
    }
}
