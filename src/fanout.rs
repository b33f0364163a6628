use crate::errors::{AppError, AppResult};
use futures::stream::{self, StreamExt};
use std::future::Future;

/// Outcome of a fan-out, split by result. Both halves keep input order.
#[derive(Debug)]
pub struct FanOut<T, R> {
    pub succeeded: Vec<(T, R)>,
    pub failed: Vec<(T, AppError)>,
}

/// Runs `op` for every item with at most `limit` calls in flight (`None`
/// means all at once), awaits all of them and partitions the results.
/// Nothing is spawned: the calls interleave on the caller's task.
pub async fn fan_out<T, R, F, Fut>(items: Vec<T>, limit: Option<usize>, op: F) -> FanOut<T, R>
where
    T: Clone,
    F: Fn(T) -> Fut,
    Fut: Future<Output = AppResult<R>>,
{
    let limit = limit.unwrap_or(items.len()).max(1);
    let results: Vec<(T, AppResult<R>)> = stream::iter(items.into_iter().map(|item| {
        let call = op(item.clone());
        async move { (item, call.await) }
    }))
    .buffered(limit)
    .collect()
    .await;

    let mut outcome = FanOut {
        succeeded: Vec::with_capacity(results.len()),
        failed: Vec::new(),
    };
    for (item, result) in results {
        match result {
            Ok(value) => outcome.succeeded.push((item, value)),
            Err(error) => outcome.failed.push((item, error)),
        }
    }
    outcome
}
