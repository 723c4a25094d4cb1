use crate::services::crawler::MetadataCrawler;
use crate::utils::error::{AppError, Result};
use futures::future;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// 一次刷新专用的抓取池：并发上限由信号量控制
pub struct CrawlPool {
    crawler: Arc<dyn MetadataCrawler>,
    permits: Arc<Semaphore>,
    call_timeout: Option<Duration>,
}

impl CrawlPool {
    pub fn new(
        crawler: Arc<dyn MetadataCrawler>,
        concurrency: usize,
        call_timeout: Option<Duration>,
    ) -> Self {
        Self {
            crawler,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            call_timeout,
        }
    }

    pub fn crawler(&self) -> &Arc<dyn MetadataCrawler> {
        &self.crawler
    }

    /// 每个输入一个任务，全部结束后按提交顺序返回结果
    ///
    /// 有任务失败时仍然等其余已提交的任务跑完，然后返回顺序上第一个错误。
    pub async fn fan_out<I, T, F, Fut>(&self, inputs: Vec<I>, f: F) -> Result<Vec<T>>
    where
        F: Fn(Arc<dyn MetadataCrawler>, I) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let handles: Vec<_> = inputs
            .into_iter()
            .map(|input| {
                let permits = self.permits.clone();
                let call = f(self.crawler.clone(), input);
                let call_timeout = self.call_timeout;

                tokio::spawn(async move {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|e| AppError::Crawl(format!("Crawl pool closed: {}", e)))?;

                    match call_timeout {
                        Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                            AppError::Crawl(format!("Metadata call timed out after {:?}", limit))
                        })?,
                        None => call.await,
                    }
                })
            })
            .collect();

        let results = future::join_all(handles).await;

        let mut values = Vec::with_capacity(results.len());
        for result in results {
            values.push(result??);
        }
        Ok(values)
    }

    /// 刷新结束时关闭，之后提交的任务会直接失败
    pub fn shutdown(&self) {
        self.permits.close();
    }
}
