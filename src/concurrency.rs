//! Bounded concurrency executor.
//!
//! Runs an async operation over a list of items with at most `limit`
//! operations in flight. Results are placed by input index, so the output is
//! aligned with the input regardless of completion order.
//!
//! Two flavours:
//!
//! - [`process_concurrently`]: fail-fast, the first error abandons the batch.
//! - [`process_concurrently_settled`]: every item runs, each outcome is captured.
//!
//! Futures are polled on the calling task, so operations need not be `Send`
//! beyond what the caller already requires.

use futures::stream::{self, StreamExt, TryStreamExt};
use std::future::Future;

/// Outcome of a settled batch.
///
/// For every index exactly one of `results[i]` and `errors[i]` is `Some`.
#[derive(Debug)]
pub struct SettledBatch<R, E> {
    pub results: Vec<Option<R>>,
    pub errors: Vec<Option<E>>,
    pub success_count: usize,
    pub error_count: usize,
}

impl<R, E> SettledBatch<R, E> {
    /// Successful results in input order.
    pub fn successes(self) -> impl Iterator<Item = R> {
        self.results.into_iter().flatten()
    }

    /// `(index, error)` pairs for the failed items.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &E)> {
        self.errors
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (i, e)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Run `op` over `items` with at most `limit` in flight, stopping at the first error.
///
/// A `limit` of zero behaves as one. Outstanding operations are dropped
/// when an error surfaces.
///
/// # Errors
///
/// Returns the first error produced by `op`.
pub async fn process_concurrently<T, R, E, F, Fut>(
    items: Vec<T>,
    limit: usize,
    op: F,
) -> Result<Vec<R>, E>
where
    F: Fn(T, usize) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let total = items.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let op = &op;
    let mut placed: Vec<Option<R>> = std::iter::repeat_with(|| None).take(total).collect();

    let mut in_flight = stream::iter(items.into_iter().enumerate())
        .map(|(index, item)| async move { op(item, index).await.map(|r| (index, r)) })
        .buffer_unordered(limit.max(1));

    while let Some((index, result)) = in_flight.try_next().await? {
        placed[index] = Some(result);
    }

    Ok(placed.into_iter().flatten().collect())
}

/// Run `op` over every item with at most `limit` in flight, capturing each outcome.
///
/// A `limit` of zero behaves as one. Never short-circuits.
pub async fn process_concurrently_settled<T, R, E, F, Fut>(
    items: Vec<T>,
    limit: usize,
    op: F,
) -> SettledBatch<R, E>
where
    F: Fn(T, usize) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let total = items.len();
    let mut batch = SettledBatch {
        results: std::iter::repeat_with(|| None).take(total).collect(),
        errors: std::iter::repeat_with(|| None).take(total).collect(),
        success_count: 0,
        error_count: 0,
    };
    if total == 0 {
        return batch;
    }

    let op = &op;
    let mut in_flight = stream::iter(items.into_iter().enumerate())
        .map(|(index, item)| async move { (index, op(item, index).await) })
        .buffer_unordered(limit.max(1));

    while let Some((index, outcome)) = in_flight.next().await {
        match outcome {
            Ok(r) => {
                batch.results[index] = Some(r);
                batch.success_count += 1;
            }
            Err(e) => {
                batch.errors[index] = Some(e);
                batch.error_count += 1;
            }
        }
    }

    batch
}
