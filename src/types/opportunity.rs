use serde::{Deserialize, Serialize};
use std::fmt::Display;
use unicode_normalization::UnicodeNormalization;

use crate::error::StormError;

/// 由自由文本名称推导稳定的机会ID
///
/// NFKD 分解后只保留 ASCII 字母数字并转为小写，因此结果确定、纯 ASCII，且重复应用不变。
pub fn name_to_id(name: &str) -> String {
    name.nfkd()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// 报告生成的主体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub name: String,
}

impl Opportunity {
    pub fn new(name: &str) -> Result<Self, StormError> {
        let trimmed = name.trim();
        let id = name_to_id(trimmed);
        if id.is_empty() {
            return Err(StormError::EmptyOpportunityName(name.to_string()));
        }
        Ok(Self {
            id,
            name: trimmed.to_string(),
        })
    }
}

/// 流水线状态机：单调推进，没有失败终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Initiated,
    PreWriting,
    FinalWriting,
    Complete,
}

impl PipelineStatus {
    /// 校验状态迁移，只允许原地或向前
    pub fn advance_to(self, next: PipelineStatus) -> Result<PipelineStatus, StormError> {
        if next < self {
            return Err(StormError::StatusRegression {
                from: self,
                to: next,
            });
        }
        Ok(next)
    }

    /// 面向用户的进度描述
    pub fn describe(&self) -> &'static str {
        match self {
            PipelineStatus::Initiated => "Initiated: report generation is being initiated ...",
            PipelineStatus::PreWriting => {
                "Pre-writing: data is collected and outline is being generated ..."
            }
            PipelineStatus::FinalWriting => "Final writing: article is being written ...",
            PipelineStatus::Complete => "Report generation done!",
        }
    }
}

impl Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let str = match self {
            PipelineStatus::Initiated => "initiated",
            PipelineStatus::PreWriting => "pre_writing",
            PipelineStatus::FinalWriting => "final_writing",
            PipelineStatus::Complete => "complete",
        };
        write!(f, "{}", str)
    }
}

impl std::str::FromStr for PipelineStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "initiated" => Ok(PipelineStatus::Initiated),
            "pre_writing" => Ok(PipelineStatus::PreWriting),
            "final_writing" => Ok(PipelineStatus::FinalWriting),
            "complete" => Ok(PipelineStatus::Complete),
            _ => Err(format!("Unknown pipeline status: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_to_id_normalizes() {
        assert_eq!(name_to_id("Acme Corp."), "acmecorp");
        assert_eq!(name_to_id("Société Générale"), "societegenerale");
        assert_eq!(name_to_id("  AT&T / Wireless  "), "attwireless");
        assert_eq!(name_to_id("日本"), "");
    }

    #[test]
    fn test_name_to_id_is_idempotent_and_ascii() {
        for name in ["Crème Brûlée Ltd", "NVIDIA", "x-AI 2.0", "Ωmega Øre"] {
            let id = name_to_id(name);
            assert!(id.is_ascii());
            assert_eq!(id, id.to_lowercase());
            assert_eq!(name_to_id(&id), id);
            assert_eq!(name_to_id(name), id);
        }
    }

    #[test]
    fn test_opportunity_rejects_empty_id() {
        assert!(Opportunity::new("   ").is_err());
        assert!(Opportunity::new("!!!").is_err());
        let opportunity = Opportunity::new("  Stripe Inc ").unwrap();
        assert_eq!(opportunity.id, "stripeinc");
        assert_eq!(opportunity.name, "Stripe Inc");
    }

    #[test]
    fn test_status_is_monotonic() {
        let status = PipelineStatus::Initiated;
        let status = status.advance_to(PipelineStatus::PreWriting).unwrap();
        let status = status.advance_to(PipelineStatus::FinalWriting).unwrap();
        assert!(status.advance_to(PipelineStatus::PreWriting).is_err());
        assert_eq!(
            status.advance_to(PipelineStatus::FinalWriting).unwrap(),
            PipelineStatus::FinalWriting
        );
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            PipelineStatus::Initiated,
            PipelineStatus::PreWriting,
            PipelineStatus::FinalWriting,
            PipelineStatus::Complete,
        ] {
            assert_eq!(status.to_string().parse::<PipelineStatus>().unwrap(), status);
        }
        assert_eq!(
            serde_json::to_string(&PipelineStatus::PreWriting).unwrap(),
            "\"pre_writing\""
        );
    }
}
