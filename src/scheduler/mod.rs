//! Deferred Broadcast Scheduler
//!
//! Arms one-shot timers that, on expiry, ask a [`RefreshTarget`] to notify
//! the current members of a room. Membership is resolved by the target at
//! fire time, never captured when the timer is armed.
//!
//! Every pending broadcast owns a child of the scheduler's root
//! `CancellationToken`, so a single broadcast can be cancelled by id and
//! `cancel_all` tears everything down at shutdown.
//!
//! A firing broadcast holds the shared side of the `firing` lock while it
//! delivers; the pending set itself is only locked long enough to remove the
//! entry. `cancel_all` takes the exclusive side after clearing the set, so it
//! returns only once in-flight deliveries have finished.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::types::{RelayError, RelayResult};
use crate::utils::duration_ms;

/// Default delay between a join and the resulting refresh broadcast
pub const DEFAULT_BROADCAST_DELAY: Duration = Duration::from_millis(5000);

/// Default limit on simultaneously pending broadcasts
pub const DEFAULT_MAX_PENDING_BROADCASTS: usize = 100_000;

/// Identifier of a pending broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BroadcastId(pub u64);

impl fmt::Display for BroadcastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bcast-{}", self.0)
    }
}

/// Outcome of delivering one room broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    /// Members whose transport accepted the event
    pub delivered: usize,
    /// Members whose transport refused the event
    pub failed: usize,
}

/// Receiver of fired broadcasts
pub trait RefreshTarget: Send + Sync + 'static {
    /// Notify every current member of `room`
    fn refresh_room(&self, room: &str) -> DeliveryReport;
}

/// How joins to a room with an already-pending broadcast are handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastPolicy {
    /// Every join arms its own timer, even if one is pending for the room
    #[default]
    PerJoin,
    /// A join to a room with a pending timer reuses that timer
    Coalesce,
}

impl FromStr for BroadcastPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per_join" | "per-join" => Ok(BroadcastPolicy::PerJoin),
            "coalesce" => Ok(BroadcastPolicy::Coalesce),
            other => Err(format!("unknown broadcast policy: {}", other)),
        }
    }
}

/// Result of a `schedule` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// A new timer was armed
    Scheduled(BroadcastId),
    /// An existing timer for the room will cover this join
    Coalesced(BroadcastId),
}

impl ScheduleOutcome {
    pub fn id(&self) -> BroadcastId {
        match self {
            ScheduleOutcome::Scheduled(id) | ScheduleOutcome::Coalesced(id) => *id,
        }
    }
}

/// A scheduled unit of work: a room and the instant it fires
#[derive(Debug, Clone)]
pub struct PendingBroadcast {
    pub id: BroadcastId,
    pub room: String,
    pub fire_at: Instant,
    cancel: CancellationToken,
}

/// Pending broadcasts, indexed by id and by room
#[derive(Default)]
struct PendingSet {
    entries: HashMap<BroadcastId, PendingBroadcast>,
    /// Most recently armed broadcast per room
    by_room: HashMap<String, BroadcastId>,
}

impl PendingSet {
    fn insert(&mut self, entry: PendingBroadcast) {
        self.by_room.insert(entry.room.clone(), entry.id);
        self.entries.insert(entry.id, entry);
    }

    fn remove(&mut self, id: BroadcastId) -> Option<PendingBroadcast> {
        let entry = self.entries.remove(&id)?;
        if self.by_room.get(&entry.room) == Some(&id) {
            self.by_room.remove(&entry.room);
        }
        Some(entry)
    }

    fn latest_for(&self, room: &str) -> Option<BroadcastId> {
        self.by_room.get(room).copied()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.by_room.clear();
    }
}

/// Shared between the scheduler and its timer tasks
struct SchedulerInner {
    pending: Mutex<PendingSet>,
    firing: RwLock<()>,
    next_id: AtomicU64,
    root: CancellationToken,
}

/// Deferred broadcast scheduler
pub struct BroadcastScheduler {
    target: Arc<dyn RefreshTarget>,
    inner: Arc<SchedulerInner>,
    policy: BroadcastPolicy,
    max_pending: usize,
}

impl BroadcastScheduler {
    /// Create a scheduler with the default policy and limits
    pub fn new(target: Arc<dyn RefreshTarget>) -> Self {
        Self::with_config(
            target,
            BroadcastPolicy::default(),
            DEFAULT_MAX_PENDING_BROADCASTS,
        )
    }

    /// Create a scheduler with a custom policy and pending limit
    pub fn with_config(
        target: Arc<dyn RefreshTarget>,
        policy: BroadcastPolicy,
        max_pending: usize,
    ) -> Self {
        Self {
            target,
            inner: Arc::new(SchedulerInner {
                pending: Mutex::new(PendingSet::default()),
                firing: RwLock::new(()),
                next_id: AtomicU64::new(1),
                root: CancellationToken::new(),
            }),
            policy,
            max_pending,
        }
    }

    /// Arm a one-shot broadcast for `room` firing after `delay`.
    ///
    /// Must be called from within a tokio runtime. Returns immediately; the
    /// caller is never blocked for the delay.
    pub fn schedule(&self, room: &str, delay: Duration) -> RelayResult<ScheduleOutcome> {
        let runtime = Handle::try_current().map_err(|e| RelayError::TimerUnavailable {
            reason: e.to_string(),
        })?;

        let mut pending = self.inner.pending.lock();
        // cancel_all cancels the root while holding this lock
        if self.inner.root.is_cancelled() {
            return Err(RelayError::SchedulerClosed);
        }

        if self.policy == BroadcastPolicy::Coalesce {
            if let Some(existing) = pending.latest_for(room) {
                debug!(room, broadcast = %existing, "Join coalesced into pending broadcast");
                return Ok(ScheduleOutcome::Coalesced(existing));
            }
        }

        if pending.len() >= self.max_pending {
            return Err(RelayError::TooManyPendingBroadcasts {
                limit: self.max_pending,
            });
        }

        let id = BroadcastId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let fire_at = Instant::now() + delay;
        let cancel = self.inner.root.child_token();
        pending.insert(PendingBroadcast {
            id,
            room: room.to_string(),
            fire_at,
            cancel: cancel.clone(),
        });
        drop(pending);

        debug!(room, broadcast = %id, delay_ms = duration_ms(delay), "Broadcast scheduled");

        let inner = Arc::clone(&self.inner);
        let target = Arc::clone(&self.target);
        let task_room = room.to_string();
        runtime.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(room = %task_room, broadcast = %id, "Broadcast cancelled");
                }
                _ = tokio::time::sleep_until(fire_at) => {
                    fire(&inner, target.as_ref(), id, &task_room);
                }
            }
        });

        Ok(ScheduleOutcome::Scheduled(id))
    }

    /// Cancel one pending broadcast. Returns `false` if it already fired or
    /// was cancelled.
    pub fn cancel(&self, id: BroadcastId) -> bool {
        match self.inner.pending.lock().remove(id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending broadcast without firing it and close the
    /// scheduler. Returns the number of broadcasts cancelled.
    ///
    /// Blocks until any broadcast already delivering has finished, so no
    /// `refresh` is emitted after this returns.
    pub fn cancel_all(&self) -> usize {
        let cancelled = {
            let mut pending = self.inner.pending.lock();
            self.inner.root.cancel();
            let cancelled = pending.len();
            pending.clear();
            cancelled
        };
        drop(self.inner.firing.write());
        cancelled
    }

    pub fn is_closed(&self) -> bool {
        self.inner.root.is_cancelled()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Pending broadcasts for `room`, ordered by fire time
    pub fn pending_for(&self, room: &str) -> Vec<PendingBroadcast> {
        let mut found: Vec<_> = self
            .inner
            .pending
            .lock()
            .entries
            .values()
            .filter(|p| p.room == room)
            .cloned()
            .collect();
        found.sort_by_key(|p| (p.fire_at, p.id));
        found
    }
}

impl Drop for BroadcastScheduler {
    fn drop(&mut self) {
        self.inner.root.cancel();
    }
}

/// Timer expiry. Delivery runs outside the pending lock but inside the
/// shared side of `firing`.
fn fire(inner: &SchedulerInner, target: &dyn RefreshTarget, id: BroadcastId, room: &str) {
    let _firing = inner.firing.read();
    if inner.pending.lock().remove(id).is_none() {
        return;
    }
    let report = target.refresh_room(room);

    info!(
        room,
        broadcast = %id,
        delivered = report.delivered,
        failed = report.failed,
        "Refresh broadcast fired"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{OnceLock, Weak};

    /// Records every room it was asked to refresh
    #[derive(Default)]
    struct RecordingTarget {
        fired: Mutex<Vec<String>>,
    }

    impl RecordingTarget {
        fn fired(&self) -> Vec<String> {
            self.fired.lock().clone()
        }
    }

    impl RefreshTarget for RecordingTarget {
        fn refresh_room(&self, room: &str) -> DeliveryReport {
            self.fired.lock().push(room.to_string());
            DeliveryReport {
                delivered: 1,
                failed: 0,
            }
        }
    }

    fn scheduler(policy: BroadcastPolicy) -> (BroadcastScheduler, Arc<RecordingTarget>) {
        let target = Arc::new(RecordingTarget::default());
        let scheduler = BroadcastScheduler::with_config(target.clone(), policy, 100);
        (scheduler, target)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let (scheduler, target) = scheduler(BroadcastPolicy::PerJoin);
        scheduler.schedule("doc-1", Duration::from_secs(5)).unwrap();

        tokio::time::sleep(Duration::from_millis(4900)).await;
        assert!(target.fired().is_empty());
        assert_eq!(scheduler.pending_count(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(target.fired(), vec!["doc-1".to_string()]);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_join_stacks_timers() {
        let (scheduler, target) = scheduler(BroadcastPolicy::PerJoin);
        let first = scheduler.schedule("doc-1", Duration::from_secs(5)).unwrap();
        let second = scheduler.schedule("doc-1", Duration::from_secs(5)).unwrap();

        assert!(matches!(first, ScheduleOutcome::Scheduled(_)));
        assert!(matches!(second, ScheduleOutcome::Scheduled(_)));
        assert_ne!(first.id(), second.id());
        assert_eq!(scheduler.pending_for("doc-1").len(), 2);

        tokio::time::sleep(Duration::from_millis(5100)).await;
        assert_eq!(target.fired().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalesce_reuses_pending_timer() {
        let (scheduler, target) = scheduler(BroadcastPolicy::Coalesce);
        let first = scheduler.schedule("doc-1", Duration::from_secs(5)).unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        let second = scheduler.schedule("doc-1", Duration::from_secs(5)).unwrap();

        assert_eq!(second, ScheduleOutcome::Coalesced(first.id()));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(target.fired(), vec!["doc-1".to_string()]);

        // Once fired, the next join arms a fresh timer
        let third = scheduler.schedule("doc-1", Duration::from_secs(5)).unwrap();
        assert!(matches!(third, ScheduleOutcome::Scheduled(id) if id != first.id()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalesce_after_cancel_arms_new_timer() {
        let (scheduler, target) = scheduler(BroadcastPolicy::Coalesce);
        let first = scheduler.schedule("doc-1", Duration::from_secs(5)).unwrap();
        let other = scheduler.schedule("doc-2", Duration::from_secs(5)).unwrap();
        assert!(matches!(other, ScheduleOutcome::Scheduled(_)));

        assert!(scheduler.cancel(first.id()));
        let second = scheduler.schedule("doc-1", Duration::from_secs(5)).unwrap();
        assert!(matches!(second, ScheduleOutcome::Scheduled(id) if id != first.id()));
        assert_eq!(
            scheduler.schedule("doc-2", Duration::from_secs(5)).unwrap(),
            ScheduleOutcome::Coalesced(other.id())
        );

        tokio::time::sleep(Duration::from_secs(6)).await;
        let mut fired = target.fired();
        fired.sort();
        assert_eq!(fired, vec!["doc-1".to_string(), "doc-2".to_string()]);
    }

    /// Reads the scheduler back while a broadcast is being delivered
    #[derive(Default)]
    struct InspectingTarget {
        scheduler: OnceLock<Weak<BroadcastScheduler>>,
        seen_pending: Mutex<Vec<usize>>,
    }

    impl RefreshTarget for InspectingTarget {
        fn refresh_room(&self, _room: &str) -> DeliveryReport {
            if let Some(scheduler) = self.scheduler.get().and_then(Weak::upgrade) {
                self.seen_pending.lock().push(scheduler.pending_count());
            }
            DeliveryReport::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_target_can_query_scheduler_while_firing() {
        let target = Arc::new(InspectingTarget::default());
        let scheduler = Arc::new(BroadcastScheduler::new(target.clone()));
        target.scheduler.set(Arc::downgrade(&scheduler)).unwrap();

        scheduler.schedule("doc-1", Duration::from_secs(1)).unwrap();
        scheduler.schedule("doc-2", Duration::from_secs(5)).unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(*target.seen_pending.lock(), vec![1]);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(*target.seen_pending.lock(), vec![1, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_single_broadcast() {
        let (scheduler, target) = scheduler(BroadcastPolicy::PerJoin);
        let keep = scheduler.schedule("doc-1", Duration::from_secs(5)).unwrap();
        let drop_me = scheduler.schedule("doc-2", Duration::from_secs(5)).unwrap();

        assert!(scheduler.cancel(drop_me.id()));
        assert!(!scheduler.cancel(drop_me.id()));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(target.fired(), vec!["doc-1".to_string()]);
        assert!(!scheduler.cancel(keep.id()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_prevents_firing_and_closes() {
        let (scheduler, target) = scheduler(BroadcastPolicy::PerJoin);
        scheduler.schedule("doc-1", Duration::from_secs(5)).unwrap();
        scheduler.schedule("doc-2", Duration::from_secs(1)).unwrap();

        assert_eq!(scheduler.cancel_all(), 2);
        assert!(scheduler.is_closed());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(target.fired().is_empty());

        let err = scheduler.schedule("doc-1", Duration::from_secs(5)).unwrap_err();
        assert_eq!(err, RelayError::SchedulerClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_limit() {
        let target = Arc::new(RecordingTarget::default());
        let scheduler = BroadcastScheduler::with_config(target, BroadcastPolicy::PerJoin, 1);
        scheduler.schedule("doc-1", Duration::from_secs(5)).unwrap();

        let err = scheduler.schedule("doc-2", Duration::from_secs(5)).unwrap_err();
        assert_eq!(err, RelayError::TooManyPendingBroadcasts { limit: 1 });
    }

    #[test]
    fn test_schedule_without_runtime_fails() {
        let (scheduler, _target) = scheduler(BroadcastPolicy::PerJoin);
        let err = scheduler.schedule("doc-1", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, RelayError::TimerUnavailable { .. }));
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("per_join".parse::<BroadcastPolicy>(), Ok(BroadcastPolicy::PerJoin));
        assert_eq!("Coalesce".parse::<BroadcastPolicy>(), Ok(BroadcastPolicy::Coalesce));
        assert!("sometimes".parse::<BroadcastPolicy>().is_err());
    }
}
