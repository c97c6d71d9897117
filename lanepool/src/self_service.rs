//! Self-service pool.
//!
//! Lanes own no queue: each lane asks the [`Supplier`] for its next item,
//! processes it, and loops until the supplier returns `None`. Every processing
//! step runs under a [`StallMonitor`] that warns (without aborting) when the
//! step exceeds `too_long_time`.
//!
//! A supplier error ends the asking lane the same way exhaustion does: the
//! lane is retired, its report records [`LaneExit::SupplierFailed`], and the
//! remaining lanes keep pulling. Lanes are never restarted automatically; call
//! [`SelfServicePool::start`] again to top the pool back up.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::Serialize;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::error::{PoolError, StepError, panic_message};
use crate::handler::{Processor, Supplier};
use crate::lane::{LaneExit, LaneId, LaneIds, LaneReport, PoolId};
use crate::monitor::{StallMonitor, StallThresholds};

const DEFAULT_TOO_LONG_TIME: Duration = Duration::from_secs(10 * 60);
const DEFAULT_TOO_LONG_WARN_INTERVAL: Duration = Duration::from_secs(60);

/// Called with the item and the failure whenever a processing step fails.
pub type ErrorHook<T, E> = Arc<dyn Fn(&T, &StepError<E>) + Send + Sync>;

/// Error hook plus the copy of the item it needs once the processor has
/// consumed the original. Only a configured hook requires `T: Clone`.
struct OnError<T, E> {
    retain: fn(&T) -> T,
    hook: ErrorHook<T, E>,
}

pub struct SelfServiceConfig<T, E> {
    pub lane_count: usize,
    on_error: Option<OnError<T, E>>,
    pub too_long_time: Duration,
    pub too_long_warn_interval: Duration,
    /// Parent span for lane events.
    pub span: Option<tracing::Span>,
}

/// Defaults, with `LANEPOOL_TOO_LONG_TIME` and `LANEPOOL_TOO_LONG_WARN_INTERVAL`
/// (seconds) overriding the stall thresholds.
impl<T, E> Default for SelfServiceConfig<T, E> {
    fn default() -> Self {
        Self::with_overrides(
            std::env::var("LANEPOOL_TOO_LONG_TIME").ok().as_deref(),
            std::env::var("LANEPOOL_TOO_LONG_WARN_INTERVAL").ok().as_deref(),
        )
    }
}

impl<T, E> SelfServiceConfig<T, E> {
    fn with_overrides(too_long_time: Option<&str>, too_long_warn_interval: Option<&str>) -> Self {
        Self {
            lane_count: 1,
            on_error: None,
            too_long_time: seconds_from(too_long_time, DEFAULT_TOO_LONG_TIME),
            too_long_warn_interval: seconds_from(
                too_long_warn_interval,
                DEFAULT_TOO_LONG_WARN_INTERVAL,
            ),
            span: None,
        }
    }

    pub fn with_lane_count(mut self, lane_count: usize) -> Self {
        self.lane_count = lane_count;
        self
    }

    pub fn with_on_error<F>(mut self, hook: F) -> Self
    where
        T: Clone,
        F: Fn(&T, &StepError<E>) + Send + Sync + 'static,
    {
        self.on_error = Some(OnError {
            retain: T::clone,
            hook: Arc::new(hook),
        });
        self
    }

    pub fn on_error(&self) -> Option<&ErrorHook<T, E>> {
        self.on_error.as_ref().map(|on_error| &on_error.hook)
    }

    pub fn with_too_long_time(mut self, too_long_time: Duration) -> Self {
        self.too_long_time = too_long_time;
        self
    }

    pub fn with_too_long_warn_interval(mut self, interval: Duration) -> Self {
        self.too_long_warn_interval = interval;
        self
    }

    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = Some(span);
        self
    }
}

/// Parse a positive number of seconds, falling back to `default`.
fn seconds_from(value: Option<&str>, default: Duration) -> Duration {
    value
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or(default)
}

/// Point-in-time view of a self-service pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelfServiceStats {
    pub pool: PoolId,
    pub lane_count: usize,
    pub active_lanes: usize,
    pub finished_lanes: usize,
    pub processed: u64,
    pub failed: u64,
    pub stall_warnings: u64,
}

struct LaneState {
    active_lanes: usize,
    lane_ids: LaneIds,
    reports: Vec<LaneReport>,
}

struct Shared<T, P: Processor<T>, S> {
    id: PoolId,
    processor: P,
    supplier: S,
    lane_count: usize,
    thresholds: StallThresholds,
    on_error: Option<OnError<T, P::Error>>,
    span: Option<tracing::Span>,
    state: StdMutex<LaneState>,
    processed: AtomicU64,
    failed: AtomicU64,
    stall_warnings: Arc<AtomicU64>,
}

impl<T, P: Processor<T>, S> Shared<T, P, S> {
    fn state(&self) -> MutexGuard<'_, LaneState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn retire(&self, report: LaneReport) {
        // Lanes only exist once counted, so this never underflows.
        let mut state = self.state();
        state.active_lanes -= 1;
        state.reports.push(report);
    }
}

/// Pull-based pool whose lanes fetch their own work.
pub struct SelfServicePool<T, P: Processor<T>, S> {
    shared: Arc<Shared<T, P, S>>,
    lanes: TaskTracker,
}

impl<T, P: Processor<T>, S> Clone for SelfServicePool<T, P, S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            lanes: self.lanes.clone(),
        }
    }
}

impl<T, P, S> SelfServicePool<T, P, S>
where
    T: Send + 'static,
    P: Processor<T>,
    S: Supplier<T>,
{
    /// Create a pool. No lane runs until [`start`](Self::start) is called.
    pub fn new(
        id: PoolId,
        processor: P,
        supplier: S,
        config: SelfServiceConfig<T, P::Error>,
    ) -> Result<Self, PoolError> {
        let lane_count = PoolError::check_lane_count(config.lane_count)?;
        if config.too_long_warn_interval.is_zero() {
            return Err(PoolError::invalid_argument(
                "too_long_warn_interval must be greater than zero",
            ));
        }

        Ok(Self {
            shared: Arc::new(Shared {
                id,
                processor,
                supplier,
                lane_count,
                thresholds: StallThresholds {
                    too_long_time: config.too_long_time,
                    warn_interval: config.too_long_warn_interval,
                },
                on_error: config.on_error,
                span: config.span,
                state: StdMutex::new(LaneState {
                    active_lanes: 0,
                    lane_ids: LaneIds::default(),
                    reports: Vec::new(),
                }),
                processed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                stall_warnings: Arc::new(AtomicU64::new(0)),
            }),
            lanes: TaskTracker::new(),
        })
    }

    /// Bring the number of running lanes up to `lane_count`.
    ///
    /// Returns how many lanes were launched; zero when already at capacity.
    /// Must be called inside a tokio runtime.
    pub fn start(&self) -> usize {
        let mut launched = 0;
        {
            // Held across the spawns so concurrent callers cannot over-launch.
            // A lane is counted only after its spawn succeeded.
            let mut state = self.shared.state();
            while state.active_lanes < self.shared.lane_count {
                let lane = state.lane_ids.allocate();
                let lane_future = run_lane(Arc::clone(&self.shared), lane);
                match &self.shared.span {
                    Some(span) => self.lanes.spawn(lane_future.instrument(span.clone())),
                    None => self.lanes.spawn(lane_future),
                };
                state.active_lanes += 1;
                launched += 1;
            }
        }

        if launched > 0 {
            tracing::debug!(pool = %self.shared.id, launched, "Started lanes");
        }
        launched
    }

    /// Wait until every launched lane has terminated.
    pub async fn join(&self) {
        self.lanes.close();
        self.lanes.wait().await;
        self.lanes.reopen();
    }

    pub fn id(&self) -> PoolId {
        self.shared.id
    }

    pub fn lane_count(&self) -> usize {
        self.shared.lane_count
    }

    pub fn active_lanes(&self) -> usize {
        self.shared.state().active_lanes
    }

    /// Reports of lanes that have finished, in completion order.
    pub fn lane_reports(&self) -> Vec<LaneReport> {
        self.shared.state().reports.clone()
    }

    pub fn stats(&self) -> SelfServiceStats {
        let (active_lanes, finished_lanes) = {
            let state = self.shared.state();
            (state.active_lanes, state.reports.len())
        };
        SelfServiceStats {
            pool: self.shared.id,
            lane_count: self.shared.lane_count,
            active_lanes,
            finished_lanes,
            processed: self.shared.processed.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            stall_warnings: self.shared.stall_warnings.load(Ordering::Relaxed),
        }
    }
}

async fn run_lane<T, P, S>(shared: Arc<Shared<T, P, S>>, lane: LaneId)
where
    T: Send + 'static,
    P: Processor<T>,
    S: Supplier<T>,
{
    let pool = shared.id;
    let started = Instant::now();
    let started_at = chrono::Utc::now();
    let (mut processed, mut failed) = (0u64, 0u64);
    tracing::debug!(%pool, %lane, "Lane started");

    let exit = loop {
        let item = match AssertUnwindSafe(shared.supplier.next(lane))
            .catch_unwind()
            .await
        {
            Ok(Ok(Some(item))) => item,
            Ok(Ok(None)) => break LaneExit::Exhausted,
            Ok(Err(e)) => {
                tracing::error!(%pool, %lane, error = %e, "Supplier failed, stopping lane");
                break LaneExit::SupplierFailed;
            }
            Err(payload) => {
                tracing::error!(
                    %pool,
                    %lane,
                    error = %panic_message(payload),
                    "Supplier panicked, stopping lane"
                );
                break LaneExit::SupplierFailed;
            }
        };

        let retained = shared.on_error.as_ref().map(|on_error| (on_error.retain)(&item));
        let monitor = StallMonitor::arm(
            pool,
            lane,
            shared.thresholds,
            Arc::clone(&shared.stall_warnings),
        );
        let outcome = AssertUnwindSafe(shared.processor.process(item, lane))
            .catch_unwind()
            .await;
        let took = monitor.disarm();

        processed += 1;
        shared.processed.fetch_add(1, Ordering::Relaxed);

        let failure = match outcome {
            Ok(Ok(_)) => None,
            Ok(Err(e)) => Some(StepError::Failed(e)),
            Err(payload) => Some(StepError::Panicked(panic_message(payload))),
        };
        if let Some(error) = failure {
            failed += 1;
            shared.failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!(%pool, %lane, error = %error, took = ?took, "Processing step failed");
            if let (Some(on_error), Some(item)) = (&shared.on_error, &retained) {
                (on_error.hook)(item, &error);
            }
        }
    };

    let report = LaneReport {
        lane,
        exit,
        processed,
        failed,
        started_at: started_at.to_rfc3339(),
        elapsed: started.elapsed(),
    };
    tracing::info!(
        %pool,
        %lane,
        exit = ?report.exit,
        processed = report.processed,
        failed = report.failed,
        elapsed = ?report.elapsed,
        "Lane finished"
    );
    shared.retire(report);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{processor_fn, supplier_fn};
    use std::sync::atomic::AtomicUsize;

    /// Supplier handing out `0..limit`, then `None` forever. Counts calls.
    fn counting_supplier(
        limit: u32,
        calls: Arc<AtomicUsize>,
    ) -> impl Supplier<u32, Error = String> {
        let next = Arc::new(AtomicU64::new(0));
        supplier_fn(move |_lane| {
            let next = Arc::clone(&next);
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let n = next.fetch_add(1, Ordering::SeqCst) as u32;
                Ok::<_, String>((n < limit).then_some(n))
            }
        })
    }

    fn config(lane_count: usize) -> SelfServiceConfig<u32, String> {
        SelfServiceConfig::default()
            .with_lane_count(lane_count)
            .with_too_long_time(Duration::from_secs(10))
            .with_too_long_warn_interval(Duration::from_secs(5))
    }

    #[test]
    fn seconds_parsing() {
        let fallback = Duration::from_secs(7);
        assert_eq!(seconds_from(Some("1.5"), fallback), Duration::from_millis(1500));
        assert_eq!(seconds_from(Some(" 30 "), fallback), Duration::from_secs(30));
        assert_eq!(seconds_from(Some("-1"), fallback), fallback);
        assert_eq!(seconds_from(Some("soon"), fallback), fallback);
        assert_eq!(seconds_from(None, fallback), fallback);
    }

    #[test]
    fn default_config() {
        let config = SelfServiceConfig::<u32, String>::with_overrides(None, None);
        assert_eq!(config.lane_count, 1);
        assert!(config.on_error().is_none());
        assert!(config.span.is_none());
        assert_eq!(config.too_long_time, Duration::from_secs(600));
        assert_eq!(config.too_long_warn_interval, Duration::from_secs(60));
    }

    #[test]
    fn stall_thresholds_overridable() {
        let config = SelfServiceConfig::<u32, String>::with_overrides(Some("30"), Some("0.5"));
        assert_eq!(config.too_long_time, Duration::from_secs(30));
        assert_eq!(config.too_long_warn_interval, Duration::from_millis(500));

        let garbage = SelfServiceConfig::<u32, String>::with_overrides(Some("0"), Some("later"));
        assert_eq!(garbage.too_long_time, Duration::from_secs(600));
        assert_eq!(garbage.too_long_warn_interval, Duration::from_secs(60));
    }

    #[test]
    fn start_outside_runtime_launches_nothing() {
        let processor = processor_fn(|_n: u32, _lane| async { Ok::<_, String>(()) });
        let calls = Arc::new(AtomicUsize::new(0));
        let pool = SelfServicePool::new(
            PoolId::new(8),
            processor,
            counting_supplier(3, Arc::clone(&calls)),
            config(2),
        )
        .unwrap();

        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| pool.start()));
        assert!(outcome.is_err());
        assert_eq!(pool.active_lanes(), 0);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            assert_eq!(pool.start(), 2);
            pool.join().await;
        });
        assert_eq!(pool.active_lanes(), 0);
        assert_eq!(pool.stats().processed, 3);
    }

    #[test]
    fn invalid_configs_rejected() {
        let processor = || processor_fn(|_n: u32, _lane| async { Ok::<_, String>(()) });
        let supplier = || supplier_fn(|_lane| async { Ok::<Option<u32>, String>(None) });

        let zero_lanes = SelfServicePool::new(
            PoolId::new(0),
            processor(),
            supplier(),
            config(0),
        );
        assert!(matches!(zero_lanes, Err(PoolError::InvalidArgument(_))));

        let zero_interval = SelfServicePool::new(
            PoolId::new(1),
            processor(),
            supplier(),
            config(1).with_too_long_warn_interval(Duration::ZERO),
        );
        assert!(matches!(zero_interval, Err(PoolError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn five_items_across_three_lanes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let invocations = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&invocations);
        let processor = processor_fn(move |_n: u32, _lane| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Ok::<_, String>(())
            }
        });
        let pool = SelfServicePool::new(
            PoolId::new(1),
            processor,
            counting_supplier(5, Arc::clone(&calls)),
            config(3),
        )
        .unwrap();

        assert_eq!(pool.start(), 3);
        pool.join().await;

        assert_eq!(invocations.load(Ordering::SeqCst), 5);
        assert_eq!(pool.active_lanes(), 0);
        // One exhausting call per lane, nothing after it.
        assert_eq!(calls.load(Ordering::SeqCst), 5 + 3);

        let reports = pool.lane_reports();
        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.exit == LaneExit::Exhausted));
        assert_eq!(reports.iter().map(|r| r.processed).sum::<u64>(), 5);
    }

    #[tokio::test]
    async fn start_tops_up_without_over_launching() {
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let held = Arc::clone(&gate);
        let processor = processor_fn(move |_n: u32, _lane| {
            let gate = Arc::clone(&held);
            async move {
                let _permit = gate.acquire().await.map_err(|e| e.to_string())?;
                Ok::<_, String>(())
            }
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let pool = SelfServicePool::new(
            PoolId::new(2),
            processor,
            counting_supplier(2, calls),
            config(2),
        )
        .unwrap();

        assert_eq!(pool.start(), 2);
        assert_eq!(pool.start(), 0);
        assert_eq!(pool.active_lanes(), 2);

        gate.add_permits(2);
        pool.join().await;
        assert_eq!(pool.active_lanes(), 0);

        // Supplier is exhausted, so relaunched lanes exit immediately.
        assert_eq!(pool.start(), 2);
        pool.join().await;
        let lanes: Vec<u64> = pool.lane_reports().iter().map(|r| r.lane.as_u64()).collect();
        assert_eq!(lanes.len(), 4);
        assert!(lanes.contains(&2) && lanes.contains(&3));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_starts_launch_lane_count_lanes() {
        let processor = processor_fn(|_n: u32, _lane| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, String>(())
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let pool = SelfServicePool::new(
            PoolId::new(3),
            processor,
            counting_supplier(40, calls),
            config(4),
        )
        .unwrap();

        let starters: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.start() })
            })
            .collect();
        let mut launched = 0;
        for starter in starters {
            launched += starter.await.unwrap();
        }
        assert_eq!(launched, 4);
        assert!(pool.active_lanes() <= 4);

        pool.join().await;
        assert_eq!(pool.stats().processed, 40);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_step_is_reported_until_it_finishes() {
        let processor = processor_fn(|n: u32, _lane| async move {
            // Item 0 runs 22s: warnings at 10s, 15s, 20s.
            if n == 0 {
                tokio::time::sleep(Duration::from_secs(22)).await;
            }
            Ok::<_, String>(())
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let pool = SelfServicePool::new(
            PoolId::new(4),
            processor,
            counting_supplier(3, calls),
            config(1),
        )
        .unwrap();

        pool.start();
        pool.join().await;
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(pool.stats().stall_warnings, 3);
        assert_eq!(pool.stats().processed, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn quick_steps_are_never_reported() {
        let processor = processor_fn(|_n: u32, _lane| async {
            tokio::time::sleep(Duration::from_secs(9)).await;
            Ok::<_, String>(())
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let pool = SelfServicePool::new(
            PoolId::new(5),
            processor,
            counting_supplier(4, calls),
            config(2),
        )
        .unwrap();

        pool.start();
        pool.join().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(pool.stats().stall_warnings, 0);
    }

    #[tokio::test]
    async fn failures_reach_hook_and_lane_keeps_pulling() {
        let failures = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&failures);
        let processor = processor_fn(|n: u32, _lane| async move {
            match n {
                1 => Err(format!("bad item {n}")),
                3 => panic!("item three exploded"),
                _ => Ok(()),
            }
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let pool = SelfServicePool::new(
            PoolId::new(6),
            processor,
            counting_supplier(5, calls),
            config(1).with_on_error(move |item: &u32, error: &StepError<String>| {
                sink.lock().unwrap().push((*item, error.to_string()));
            }),
        )
        .unwrap();

        pool.start();
        pool.join().await;

        let failures = failures.lock().unwrap().clone();
        assert_eq!(
            failures,
            vec![
                (1, "processing failed: bad item 1".to_string()),
                (3, "processor panicked: item three exploded".to_string()),
            ]
        );
        let stats = pool.stats();
        assert_eq!(stats.processed, 5);
        assert_eq!(stats.failed, 2);
        assert_eq!(pool.lane_reports()[0].exit, LaneExit::Exhausted);
    }

    #[tokio::test]
    async fn supplier_failure_retires_only_that_lane() {
        let processor = processor_fn(|_n: u32, _lane| async { Ok::<_, String>(()) });
        let served = Arc::new(AtomicU64::new(0));
        let supplier = supplier_fn(move |lane: LaneId| {
            let served = Arc::clone(&served);
            async move {
                if lane.as_u64() == 0 {
                    return Err("upstream unavailable".to_string());
                }
                let n = served.fetch_add(1, Ordering::SeqCst);
                Ok((n < 3).then_some(n as u32))
            }
        });
        let pool =
            SelfServicePool::new(PoolId::new(7), processor, supplier, config(2)).unwrap();

        pool.start();
        pool.join().await;

        assert_eq!(pool.active_lanes(), 0);
        let mut reports = pool.lane_reports();
        reports.sort_by_key(|r| r.lane);
        assert_eq!(reports[0].exit, LaneExit::SupplierFailed);
        assert_eq!(reports[0].processed, 0);
        assert_eq!(reports[1].exit, LaneExit::Exhausted);
        assert_eq!(reports[1].processed, 3);
    }

    #[tokio::test]
    async fn items_need_not_be_clone_without_hook() {
        struct Job(u32);

        let total = Arc::new(AtomicU64::new(0));
        let sum = Arc::clone(&total);
        let processor = processor_fn(move |job: Job, _lane| {
            let sum = Arc::clone(&sum);
            async move {
                sum.fetch_add(u64::from(job.0), Ordering::SeqCst);
                Ok::<_, String>(())
            }
        });
        let next = Arc::new(AtomicU64::new(1));
        let supplier = supplier_fn(move |_lane| {
            let next = Arc::clone(&next);
            async move {
                let n = next.fetch_add(1, Ordering::SeqCst) as u32;
                Ok::<_, String>((n <= 4).then_some(Job(n)))
            }
        });
        let config = SelfServiceConfig::<Job, String>::default().with_lane_count(2);
        let pool = SelfServicePool::new(PoolId::new(9), processor, supplier, config).unwrap();

        pool.start();
        pool.join().await;
        assert_eq!(total.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn stall_warnings_stay_inside_configured_span() {
        use tracing_subscriber::layer::{Context, SubscriberExt};
        use tracing_subscriber::registry::LookupSpan;

        /// Records each event's level and whether it sits under `my_pool`.
        struct Capture(Arc<StdMutex<Vec<(tracing::Level, bool)>>>);

        impl<S> tracing_subscriber::Layer<S> for Capture
        where
            S: tracing::Subscriber + for<'a> LookupSpan<'a>,
        {
            fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
                let in_pool = ctx
                    .event_scope(event)
                    .is_some_and(|mut scope| scope.any(|span| span.name() == "my_pool"));
                self.0
                    .lock()
                    .unwrap()
                    .push((*event.metadata().level(), in_pool));
            }
        }

        let events = Arc::new(StdMutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(Capture(Arc::clone(&events)));
        let _guard = tracing::subscriber::set_default(subscriber);

        let processor = processor_fn(|_n: u32, _lane| async {
            tokio::time::sleep(Duration::from_secs(12)).await;
            Ok::<_, String>(())
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let pool = SelfServicePool::new(
            PoolId::new(10),
            processor,
            counting_supplier(1, calls),
            config(1).with_span(tracing::info_span!("my_pool")),
        )
        .unwrap();

        pool.start();
        pool.join().await;

        let events = events.lock().unwrap().clone();
        let warnings: Vec<_> = events
            .iter()
            .filter(|(level, _)| *level == tracing::Level::WARN)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings.iter().all(|(_, in_pool)| *in_pool));
        assert!(events.contains(&(tracing::Level::INFO, true)));
    }

    #[tokio::test]
    async fn stats_snapshot() {
        let processor = processor_fn(|n: u32, _lane| async move {
            if n % 2 == 0 {
                Ok(())
            } else {
                Err(format!("odd {n}"))
            }
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let pool = SelfServicePool::new(
            PoolId::new(42),
            processor,
            counting_supplier(6, calls),
            config(2),
        )
        .unwrap();

        pool.start();
        pool.join().await;
        insta::assert_json_snapshot!("self_service_stats", pool.stats());
    }
}
