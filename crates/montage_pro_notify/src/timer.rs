// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deferred one-shot callbacks used to deliver notifies.
//!
//! Timers are owner-scoped: each one holds a weak link to its session's
//! [`TimerOwner`]. Dropping the owner invalidates every timer it armed, so a
//! destroyed session can never receive a callback.

use crate::event::EventId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// Identifier of a notify session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque handle to an armed timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    /// Get the raw handle value
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Liveness token owned by a session
#[derive(Debug)]
pub struct TimerOwner {
    id: SessionId,
    alive: Arc<()>,
}

impl TimerOwner {
    /// Create a token for a new session
    pub fn new() -> Self {
        Self {
            id: SessionId::new(),
            alive: Arc::new(()),
        }
    }

    /// Session this token belongs to
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Weak link stored by timers
    pub fn liveness(&self) -> Weak<()> {
        Arc::downgrade(&self.alive)
    }
}

impl Default for TimerOwner {
    fn default() -> Self {
        Self::new()
    }
}

/// A timer that reached its duration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    /// Session that armed the timer
    pub owner: SessionId,
    /// Event the timer delivers
    pub event: EventId,
    /// Handle of the expired timer
    pub handle: TimerHandle,
}

/// Deferred callback facility provided by the host
pub trait TimerService {
    /// Arm a one-shot timer for `event`.
    ///
    /// The timer fires once its elapsed time reaches `duration`. `elapsed`
    /// seeds the elapsed time, letting a rearmed timer keep counting from
    /// where the cancelled one stopped.
    fn set_timer(&mut self, owner: &TimerOwner, event: EventId, duration: f32, elapsed: f32) -> TimerHandle;

    /// Elapsed seconds of an active timer, `None` once fired or cleared
    fn timer_elapsed(&self, handle: TimerHandle) -> Option<f32>;

    /// Cancel a timer. Clearing an unknown handle is a no-op.
    fn clear_timer(&mut self, handle: TimerHandle);

    /// Whether the timer is still armed
    fn is_timer_active(&self, handle: TimerHandle) -> bool {
        self.timer_elapsed(handle).is_some()
    }
}

#[derive(Debug)]
struct TimerEntry {
    owner_id: SessionId,
    owner: Weak<()>,
    event: EventId,
    duration: f32,
    elapsed: f32,
}

/// World timer manager advanced by the frame loop
#[derive(Debug, Default)]
pub struct TimerManager {
    timers: IndexMap<TimerHandle, TimerEntry>,
    next_handle: u64,
}

impl TimerManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance every timer by `delta` seconds and return the ones that fired,
    /// earliest first.
    ///
    /// Timers whose owner was dropped are discarded without firing.
    pub fn advance(&mut self, delta: f32) -> Vec<TimerFired> {
        self.discard_orphans();

        let mut due: Vec<(f32, TimerHandle)> = Vec::new();
        for (handle, timer) in self.timers.iter_mut() {
            let remaining = timer.duration - timer.elapsed;
            timer.elapsed += delta;
            if timer.elapsed >= timer.duration {
                due.push((remaining, *handle));
            }
        }

        due.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        due.into_iter()
            .filter_map(|(_, handle)| {
                self.timers.shift_remove(&handle).map(|timer| TimerFired {
                    owner: timer.owner_id,
                    event: timer.event,
                    handle,
                })
            })
            .collect()
    }

    /// Number of armed timers, including orphans not yet discarded
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Whether no timer is armed
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Number of armed timers belonging to a session
    pub fn active_for(&self, owner: SessionId) -> usize {
        self.timers
            .values()
            .filter(|t| t.owner_id == owner && t.owner.strong_count() > 0)
            .count()
    }

    /// Seconds until the timer fires
    pub fn remaining(&self, handle: TimerHandle) -> Option<f32> {
        self.timers
            .get(&handle)
            .map(|t| (t.duration - t.elapsed).max(0.0))
    }

    fn discard_orphans(&mut self) {
        let before = self.timers.len();
        self.timers.retain(|_, t| t.owner.strong_count() > 0);
        let dropped = before - self.timers.len();
        if dropped > 0 {
            tracing::trace!("Discarded {} timers of destroyed sessions", dropped);
        }
    }
}

impl TimerService for TimerManager {
    fn set_timer(&mut self, owner: &TimerOwner, event: EventId, duration: f32, elapsed: f32) -> TimerHandle {
        self.next_handle += 1;
        let handle = TimerHandle(self.next_handle);
        self.timers.insert(
            handle,
            TimerEntry {
                owner_id: owner.id(),
                owner: owner.liveness(),
                event,
                duration: duration.max(0.0),
                elapsed: elapsed.max(0.0),
            },
        );
        handle
    }

    fn timer_elapsed(&self, handle: TimerHandle) -> Option<f32> {
        self.timers
            .get(&handle)
            .filter(|t| t.owner.strong_count() > 0)
            .map(|t| t.elapsed)
    }

    fn clear_timer(&mut self, handle: TimerHandle) {
        self.timers.shift_remove(&handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_fires_once_at_duration() {
        let owner = TimerOwner::new();
        let mut timers = TimerManager::new();
        let handle = timers.set_timer(&owner, EventId(1), 1.0, 0.0);

        assert!(timers.advance(0.5).is_empty());
        assert_eq!(timers.timer_elapsed(handle), Some(0.5));

        let fired = timers.advance(0.5);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].event, EventId(1));
        assert_eq!(fired[0].owner, owner.id());
        assert!(!timers.is_timer_active(handle));
        assert!(timers.advance(1.0).is_empty());
    }

    #[test]
    fn test_fired_in_due_order() {
        let owner = TimerOwner::new();
        let mut timers = TimerManager::new();
        timers.set_timer(&owner, EventId(1), 0.9, 0.0);
        timers.set_timer(&owner, EventId(2), 0.2, 0.0);
        timers.set_timer(&owner, EventId(3), 0.5, 0.0);

        let order: Vec<EventId> = timers.advance(1.0).into_iter().map(|f| f.event).collect();
        assert_eq!(order, vec![EventId(2), EventId(3), EventId(1)]);
    }

    #[test]
    fn test_seeded_elapsed_shortens_wait() {
        let owner = TimerOwner::new();
        let mut timers = TimerManager::new();
        let handle = timers.set_timer(&owner, EventId(1), 2.0, 1.5);

        assert_eq!(timers.remaining(handle), Some(0.5));
        assert_eq!(timers.advance(0.5).len(), 1);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let owner = TimerOwner::new();
        let mut timers = TimerManager::new();
        let handle = timers.set_timer(&owner, EventId(1), 1.0, 0.0);

        timers.clear_timer(handle);
        timers.clear_timer(handle);
        assert!(timers.is_empty());
        assert!(timers.advance(2.0).is_empty());
    }

    #[test]
    fn test_dropped_owner_never_fires() {
        let owner = TimerOwner::new();
        let id = owner.id();
        let mut timers = TimerManager::new();
        let handle = timers.set_timer(&owner, EventId(1), 0.1, 0.0);
        assert_eq!(timers.active_for(id), 1);

        drop(owner);
        assert_eq!(timers.timer_elapsed(handle), None);
        assert!(timers.advance(1.0).is_empty());
        assert!(timers.is_empty());
    }
}
