//! Fixed-collection helpers: spread a known set of items over N lanes.
//!
//! Unlike the pools these have no queue bound, no admission and no
//! monitoring. Lanes are plain futures polled by the calling task, so the
//! closure does not need to be `'static` or `Send`.

use std::future::Future;
use std::sync::{Mutex as StdMutex, PoisonError};

use futures::future::join_all;

use crate::error::PoolError;

/// Run `f(item, index)` over `items` with at most `lane_count` calls in flight.
///
/// Results come back in input order regardless of completion order.
pub async fn map_concurrent<I, T, R, F, Fut>(
    items: I,
    lane_count: usize,
    f: F,
) -> Result<Vec<R>, PoolError>
where
    I: IntoIterator<Item = T>,
    F: Fn(T, usize) -> Fut,
    Fut: Future<Output = R>,
{
    let lane_count = PoolError::check_lane_count(lane_count)?;
    let source = &StdMutex::new(items.into_iter().enumerate());
    let f = &f;

    let lanes = (0..lane_count).map(|_| async move {
        let mut done = Vec::new();
        loop {
            let next = source
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .next();
            let Some((index, item)) = next else {
                break;
            };
            done.push((index, f(item, index).await));
        }
        done
    });

    let mut results: Vec<(usize, R)> = join_all(lanes).await.into_iter().flatten().collect();
    results.sort_unstable_by_key(|(index, _)| *index);
    Ok(results.into_iter().map(|(_, result)| result).collect())
}

/// Like [`map_concurrent`] for side effects only.
pub async fn for_each_concurrent<I, T, F, Fut>(
    items: I,
    lane_count: usize,
    f: F,
) -> Result<(), PoolError>
where
    I: IntoIterator<Item = T>,
    F: Fn(T, usize) -> Fut,
    Fut: Future<Output = ()>,
{
    map_concurrent(items, lane_count, f).await.map(|_| ())
}
