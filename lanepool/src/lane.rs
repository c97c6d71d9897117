//! Lane and pool identifiers, plus the record a lane leaves behind when it exits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Identifier of a lane within one pool.
///
/// Lane ids are assigned sequentially per pool and never reused, so a lane
/// launched by a later `start()` gets a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LaneId(u64);

impl LaneId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for LaneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lane-{}", self.0)
    }
}

/// Diagnostic identifier of a pool. Has no functional effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolId(u64);

impl PoolId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for PoolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pool-{}", self.0)
    }
}

/// Monotonic source of [`PoolId`]s.
///
/// Owned by the caller (typically one per application) instead of a hidden
/// process-wide counter.
#[derive(Debug, Default)]
pub struct PoolIdSource {
    next: AtomicU64,
}

impl PoolIdSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start numbering at `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    pub fn next_id(&self) -> PoolId {
        PoolId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Sequential lane id allocator, one per pool.
#[derive(Debug, Default)]
pub(crate) struct LaneIds {
    next: u64,
}

impl LaneIds {
    pub(crate) fn allocate(&mut self) -> LaneId {
        let id = LaneId(self.next);
        self.next += 1;
        id
    }
}

/// Why a lane stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneExit {
    /// The supplier returned no item.
    Exhausted,
    /// The supplier returned an error; the lane stopped without retrying.
    SupplierFailed,
}

/// Lifetime summary of a finished lane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneReport {
    pub lane: LaneId,
    pub exit: LaneExit,
    /// Items handed to the processor, successful or not.
    pub processed: u64,
    pub failed: u64,
    /// When the lane started (RFC 3339).
    pub started_at: String,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl LaneReport {
    pub fn succeeded(&self) -> u64 {
        self.processed - self.failed
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
