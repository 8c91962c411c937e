use thiserror::Error;

use crate::types::opportunity::PipelineStatus;

/// 调用方可见的致命错误
///
/// 上游的瞬时错误（单次检索、单个章节、单个角色）不会走到这里，它们在最小工作单元内被吞掉并记录日志。
#[derive(Debug, Error)]
pub enum StormError {
    /// 某个流水线角色没有配置模型，任何工作开始前即失败
    #[error("未配置 {stage} 阶段所需的模型")]
    MissingModel { stage: String },

    /// 恢复某阶段时缺少其上游持久化产物
    #[error("机会 {opportunity_id} 缺少已持久化的字段 {field}，无法从该阶段恢复")]
    MissingArtifact {
        opportunity_id: String,
        field: String,
    },

    #[error("未找到机会记录 {0}")]
    OpportunityNotFound(String),

    #[error("未指定任何动作，请至少启用调研、大纲、成文、润色中的一项")]
    NoActionRequested,

    #[error("机会名称规范化后为空: {0:?}")]
    EmptyOpportunityName(String),

    /// 同一个机会已有流水线在运行
    #[error("机会 {0} 已有流水线正在运行")]
    RunInProgress(String),

    #[error("流水线状态不允许回退: {from} -> {to}")]
    StatusRegression {
        from: PipelineStatus,
        to: PipelineStatus,
    },

    #[error("全部 {0} 个章节生成失败")]
    AllSectionsFailed(usize),
}
