//! Bounded queue pool.
//!
//! Callers push items into a FIFO bounded by `queue_capacity`. Lanes are
//! started on demand (up to `lane_count`) and drain the queue; a lane that
//! finds the queue empty exits. Admission and the lane's "queue empty, exit"
//! decision happen under the same lock, so a non-empty queue always has at
//! least one running lane.
//!
//! Items offered through [`QueuePool::submit`] get a [`Completion`] keyed by a
//! per-submission [`Ticket`]; submitting equal item values twice yields two
//! independent completions.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Instant;

use dashmap::DashMap;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio_util::task::TaskTracker;

use crate::error::{PoolError, SubmitError, panic_message};
use crate::handler::Processor;
use crate::lane::{LaneId, LaneIds};

/// Default queue capacity when none is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePoolConfig {
    /// Maximum number of queued (not yet started) items. Zero rejects everything.
    pub queue_capacity: usize,
}

impl QueuePoolConfig {
    pub fn new(queue_capacity: usize) -> Self {
        Self { queue_capacity }
    }
}

impl Default for QueuePoolConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Identifies one `submit` call's completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(u64);

impl std::fmt::Display for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ticket-{}", self.0)
    }
}

type Outcome<R, E> = Result<R, SubmitError<E>>;
type CompletionTx<R, E> = oneshot::Sender<Outcome<R, E>>;

/// Future resolving to the processor's result for one submitted item.
///
/// Rejected submissions resolve immediately.
#[must_use = "completions do nothing unless awaited"]
pub struct Completion<R, E> {
    ticket: Option<Ticket>,
    inner: CompletionInner<R, E>,
}

enum CompletionInner<R, E> {
    Rejected(Option<SubmitError<E>>),
    Waiting(oneshot::Receiver<Outcome<R, E>>),
}

impl<R, E> Completion<R, E> {
    fn rejected(error: SubmitError<E>) -> Self {
        Self {
            ticket: None,
            inner: CompletionInner::Rejected(Some(error)),
        }
    }

    fn waiting(ticket: Ticket, rx: oneshot::Receiver<Outcome<R, E>>) -> Self {
        Self {
            ticket: Some(ticket),
            inner: CompletionInner::Waiting(rx),
        }
    }

    /// Ticket of an admitted submission; `None` if admission was refused.
    pub fn ticket(&self) -> Option<Ticket> {
        self.ticket
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.inner, CompletionInner::Rejected(_))
    }
}

// No field is structurally pinned; the receiver is Unpin on its own.
impl<R, E> Unpin for Completion<R, E> {}

impl<R, E> Future for Completion<R, E> {
    type Output = Outcome<R, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            CompletionInner::Rejected(error) => {
                Poll::Ready(Err(error.take().unwrap_or(SubmitError::Abandoned)))
            }
            CompletionInner::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(SubmitError::Abandoned))),
        }
    }
}

/// Point-in-time view of a queue pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueuePoolStats {
    pub lane_count: usize,
    pub active_lanes: usize,
    pub queue_capacity: usize,
    pub queued: usize,
    pub pending_completions: usize,
    pub processed: u64,
    pub failed: u64,
    pub closed: bool,
}

struct Entry<T> {
    item: T,
    ticket: Option<Ticket>,
}

struct QueueState<T> {
    queue: VecDeque<Entry<T>>,
    active_lanes: usize,
    lane_ids: LaneIds,
    next_ticket: u64,
    closed: bool,
}

struct Shared<T, P: Processor<T>> {
    processor: P,
    lane_count: usize,
    queue_capacity: usize,
    state: StdMutex<QueueState<T>>,
    pending: DashMap<Ticket, CompletionTx<P::Output, P::Error>>,
    processed: AtomicU64,
    failed: AtomicU64,
}

impl<T, P: Processor<T>> Shared<T, P> {
    /// Lock the state. Nothing panics while holding the lock, so a poisoned
    /// mutex still holds consistent state.
    fn state(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pop the head entry, or retire the calling lane if the queue is empty.
    fn next_entry(&self) -> Option<Entry<T>> {
        let mut state = self.state();
        let entry = state.queue.pop_front();
        if entry.is_none() {
            state.active_lanes -= 1;
        }
        entry
    }
}

/// Push-queue pool with bounded buffer and per-item completions.
pub struct QueuePool<T, P: Processor<T>> {
    shared: Arc<Shared<T, P>>,
    lanes: TaskTracker,
}

impl<T, P: Processor<T>> Clone for QueuePool<T, P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            lanes: self.lanes.clone(),
        }
    }
}

impl<T, P> QueuePool<T, P>
where
    T: Send + 'static,
    P: Processor<T>,
{
    /// Create a pool running at most `lane_count` lanes.
    ///
    /// Lanes are tokio tasks, spawned lazily on admission, so admission must
    /// happen inside a tokio runtime.
    pub fn new(processor: P, lane_count: usize, config: QueuePoolConfig) -> Result<Self, PoolError> {
        let lane_count = PoolError::check_lane_count(lane_count)?;

        Ok(Self {
            shared: Arc::new(Shared {
                processor,
                lane_count,
                queue_capacity: config.queue_capacity,
                state: StdMutex::new(QueueState {
                    queue: VecDeque::new(),
                    active_lanes: 0,
                    lane_ids: LaneIds::default(),
                    next_ticket: 0,
                    closed: false,
                }),
                pending: DashMap::new(),
                processed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }),
            lanes: TaskTracker::new(),
        })
    }

    /// Offer an item without asking for its result.
    ///
    /// Returns `false` (and drops the item) if the queue is full or the pool
    /// is shut down.
    pub fn try_enqueue(&self, item: T) -> bool {
        self.admit(item, None).is_ok()
    }

    /// Offer an item and get a future for its result.
    ///
    /// A full queue yields an already-failed completion
    /// ([`SubmitError::QueueFull`]), never a pending one.
    pub fn submit(&self, item: T) -> Completion<P::Output, P::Error> {
        let (tx, rx) = oneshot::channel();
        match self.admit(item, Some(tx)) {
            Ok(Some(ticket)) => Completion::waiting(ticket, rx),
            Ok(None) => Completion::rejected(SubmitError::Abandoned),
            Err(error) => Completion::rejected(error),
        }
    }

    fn admit(
        &self,
        item: T,
        completion: Option<CompletionTx<P::Output, P::Error>>,
    ) -> Result<Option<Ticket>, SubmitError<P::Error>> {
        let mut state = self.shared.state();
        if state.closed {
            return Err(SubmitError::Closed);
        }
        if state.queue.len() >= self.shared.queue_capacity {
            tracing::trace!(
                queued = state.queue.len(),
                capacity = self.shared.queue_capacity,
                "Queue full, rejecting item"
            );
            return Err(SubmitError::QueueFull);
        }

        // Registered before the entry becomes visible to lanes.
        let ticket = completion.map(|tx| {
            let ticket = Ticket(state.next_ticket);
            state.next_ticket += 1;
            self.shared.pending.insert(ticket, tx);
            ticket
        });
        state.queue.push_back(Entry { item, ticket });

        let lane = if state.active_lanes < self.shared.lane_count {
            state.active_lanes += 1;
            Some(state.lane_ids.allocate())
        } else {
            None
        };
        drop(state);

        if let Some(lane) = lane {
            self.lanes.spawn(run_lane(Arc::clone(&self.shared), lane));
        }
        Ok(ticket)
    }

    /// Stop admitting items, let lanes drain the queue, and wait for them.
    pub async fn shutdown(&self) {
        let queued = {
            let mut state = self.shared.state();
            state.closed = true;
            state.queue.len()
        };
        tracing::debug!(queued, "Queue pool shutting down");
        self.lanes.close();
        self.lanes.wait().await;
    }

    pub fn lane_count(&self) -> usize {
        self.shared.lane_count
    }

    pub fn queue_capacity(&self) -> usize {
        self.shared.queue_capacity
    }

    pub fn queue_len(&self) -> usize {
        self.shared.state().queue.len()
    }

    pub fn active_lanes(&self) -> usize {
        self.shared.state().active_lanes
    }

    /// Completions registered but not yet picked up by a lane.
    pub fn pending_completions(&self) -> usize {
        self.shared.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state().closed
    }

    pub fn stats(&self) -> QueuePoolStats {
        let (active_lanes, queued, closed) = {
            let state = self.shared.state();
            (state.active_lanes, state.queue.len(), state.closed)
        };
        QueuePoolStats {
            lane_count: self.shared.lane_count,
            active_lanes,
            queue_capacity: self.shared.queue_capacity,
            queued,
            pending_completions: self.shared.pending.len(),
            processed: self.shared.processed.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            closed,
        }
    }
}

async fn run_lane<T, P>(shared: Arc<Shared<T, P>>, lane: LaneId)
where
    T: Send + 'static,
    P: Processor<T>,
{
    let started = Instant::now();
    let mut processed = 0u64;
    let mut failed = 0u64;
    tracing::debug!(%lane, "Lane started");

    while let Some(entry) = shared.next_entry() {
        let completion = entry
            .ticket
            .and_then(|ticket| shared.pending.remove(&ticket))
            .map(|(_, tx)| tx);

        let outcome = match AssertUnwindSafe(shared.processor.process(entry.item, lane))
            .catch_unwind()
            .await
        {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(SubmitError::Processing(e)),
            Err(payload) => Err(SubmitError::Panicked(panic_message(payload))),
        };

        processed += 1;
        shared.processed.fetch_add(1, Ordering::Relaxed);
        if outcome.is_err() {
            failed += 1;
            shared.failed.fetch_add(1, Ordering::Relaxed);
        }

        match completion {
            Some(tx) => {
                if tx.send(outcome).is_err() {
                    tracing::debug!(%lane, "Completion dropped by submitter before it settled");
                }
            }
            None => {
                if let Err(e) = outcome {
                    tracing::debug!(%lane, error = %e, "Discarding failed result of unsubmitted item");
                }
            }
        }
    }

    tracing::debug!(
        %lane,
        processed,
        failed,
        elapsed = ?started.elapsed(),
        "Lane drained queue"
    );
}
