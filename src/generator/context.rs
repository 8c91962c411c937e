use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::llm::LmConfigs;
use crate::search::{HttpPageFetcher, RelatedPageFetcher, Retriever, SearchBackend, YouSearch};
use crate::storage::{JsonFileStore, RecordStore};

/// 流水线各阶段共享的运行环境
#[derive(Clone)]
pub struct GeneratorContext {
    /// 配置
    pub config: Config,
    /// 每个角色对应的模型
    pub lm_configs: LmConfigs,
    /// 检索后端
    pub search: Arc<dyn SearchBackend>,
    /// 机会记录存储
    pub store: Arc<dyn RecordStore>,
    /// 参考页面抓取，为 None 时不抓取
    pub page_fetcher: Option<Arc<dyn RelatedPageFetcher>>,
}

impl GeneratorContext {
    /// 按配置创建线上使用的上下文
    pub fn new(config: Config) -> Result<Self> {
        let lm_configs = LmConfigs::from_config(&config)?;
        let search = Arc::new(YouSearch::new(&config.search)?);
        let store = Arc::new(JsonFileStore::new(
            config.storage.dir.clone(),
            config.storage.lock_stale_minutes,
        ));
        let page_fetcher: Option<Arc<dyn RelatedPageFetcher>> =
            if config.runner.fetch_related_outlines {
                Some(Arc::new(HttpPageFetcher::new(config.search.timeout_seconds)?))
            } else {
                None
            };

        Ok(Self {
            config,
            lm_configs,
            search,
            store,
            page_fetcher,
        })
    }

    /// 由现成的组件组装上下文
    pub fn with_parts(
        config: Config,
        lm_configs: LmConfigs,
        search: Arc<dyn SearchBackend>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            config,
            lm_configs,
            search,
            store,
            page_fetcher: None,
        }
    }

    pub fn with_page_fetcher(mut self, fetcher: Arc<dyn RelatedPageFetcher>) -> Self {
        self.page_fetcher = Some(fetcher);
        self
    }

    /// 创建检索器，`excluded_url` 不会出现在结果中
    pub fn retriever(&self, excluded_url: Option<&str>) -> Retriever {
        Retriever::new(self.search.clone(), self.config.runner.max_thread_num)
            .with_excluded_urls(excluded_url.map(str::to_string))
    }
}
