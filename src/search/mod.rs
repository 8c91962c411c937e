//! 检索能力接口与实现

use anyhow::Result;
use async_trait::async_trait;

use crate::types::information::SearchHit;

pub mod page;
pub mod retriever;
pub mod you;

pub use page::{HttpPageFetcher, PageOutline, RelatedPageFetcher};
pub use retriever::Retriever;
pub use you::YouSearch;

/// 按查询返回排序后结果的检索后端
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>>;
}
