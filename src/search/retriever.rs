use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

use crate::search::SearchBackend;
use crate::types::information::QueryResult;
use crate::utils::threads::do_parallel_with_limit;

/// 对检索后端的批量封装
///
/// 单个查询失败只会得到空结果，不会中断整批。
#[derive(Clone)]
pub struct Retriever {
    backend: Arc<dyn SearchBackend>,
    excluded_urls: HashSet<String>,
    max_concurrency: usize,
}

impl Retriever {
    pub fn new(backend: Arc<dyn SearchBackend>, max_concurrency: usize) -> Self {
        Self {
            backend,
            excluded_urls: HashSet::new(),
            max_concurrency,
        }
    }

    /// 这些 URL 不会出现在任何检索结果中
    pub fn with_excluded_urls<I>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.excluded_urls.extend(urls);
        self
    }

    /// 并发执行一批查询，结果与查询顺序一致，每个查询最多 k 条且 URL 不重复
    pub async fn retrieve(&self, queries: &[String], k: usize) -> Vec<QueryResult> {
        let futures: Vec<_> = queries
            .iter()
            .map(|query| async move {
                let hits = match self.backend.search(query, k).await {
                    Ok(hits) => hits,
                    Err(e) => {
                        warn!(query = %query, error = %e, "检索失败，按空结果处理");
                        Vec::new()
                    }
                };

                let mut seen = HashSet::new();
                let hits = hits
                    .into_iter()
                    .filter(|hit| !self.excluded_urls.contains(&hit.url))
                    .filter(|hit| seen.insert(hit.url.clone()))
                    .take(k)
                    .collect();
                QueryResult {
                    query: query.clone(),
                    hits,
                }
            })
            .collect();

        do_parallel_with_limit(futures, self.max_concurrency).await
    }
}
