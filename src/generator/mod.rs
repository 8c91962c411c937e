//! 报告生成流水线：调研、大纲、成文、润色，以及负责编排和续跑的 [`workflow`]

pub mod article;
pub mod context;
pub mod curation;
pub mod outline;
pub mod persona;
pub mod polish;
pub mod prompts;
pub mod workflow;
