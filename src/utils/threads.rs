use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// 以最大并发数执行一组 future，返回结果与输入顺序一致
pub async fn do_parallel_with_limit<F, T>(futures: Vec<F>, max_concurrent: usize) -> Vec<T>
where
    F: Future<Output = T> + Send,
    T: Send,
{
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));

    let controlled_futures: Vec<_> = futures
        .into_iter()
        .map(|fut| {
            let permit = Arc::clone(&semaphore);
            async move {
                // Semaphore 不会被关闭，acquire 只在关闭后失败
                let _permit = permit.acquire().await;
                fut.await
            }
        })
        .collect();

    join_all(controlled_futures).await
}
