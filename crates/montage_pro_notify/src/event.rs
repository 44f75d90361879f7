// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scheduled notify events and the per-session event list.

use crate::definition::{IntervalNotify, NotifyContext, PointNotify};
use crate::timer::{TimerHandle, TimerService};
use bitflags::bitflags;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Weak;

bitflags! {
    /// Abort reasons for which a notify must still be delivered
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AbortReasons: u8 {
        /// Montage finished without interruption
        const COMPLETED = 1 << 0;
        /// Montage started blending out
        const BLEND_OUT = 1 << 1;
        /// Montage was interrupted by another montage
        const INTERRUPTED = 1 << 2;
        /// Task or ability was cancelled
        const CANCELLED = 1 << 3;
    }
}

// Text form is the flag names joined by `|`, e.g. "INTERRUPTED | CANCELLED"
impl Serialize for AbortReasons {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        bitflags::serde::serialize(self, serializer)
    }
}

impl<'de> Deserialize<'de> for AbortReasons {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        bitflags::serde::deserialize(deserializer)
    }
}

/// Why a playback ended before every notify was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbortReason {
    /// Montage finished without interruption
    Completed,
    /// Montage started blending out
    BlendOut,
    /// Montage was interrupted
    Interrupted,
    /// Task or ability was cancelled
    Cancelled,
}

impl AbortReason {
    /// Flag matching this reason
    pub fn flag(self) -> AbortReasons {
        match self {
            Self::Completed => AbortReasons::COMPLETED,
            Self::BlendOut => AbortReasons::BLEND_OUT,
            Self::Interrupted => AbortReasons::INTERRUPTED,
            Self::Cancelled => AbortReasons::CANCELLED,
        }
    }

    /// Display name
    pub fn name(self) -> &'static str {
        match self {
            Self::Completed => "Completed",
            Self::BlendOut => "BlendOut",
            Self::Interrupted => "Interrupted",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl From<AbortReason> for AbortReasons {
    fn from(reason: AbortReason) -> Self {
        reason.flag()
    }
}

/// Unique event ID within one playback session (0 is never assigned)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub u32);

impl EventId {
    /// Get the raw ID value
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Whether this ID was assigned by a session
    pub fn is_assigned(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which callback an event fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotifyEventKind {
    /// Point notify
    Notify,
    /// Interval begin
    IntervalBegin,
    /// Interval end
    IntervalEnd,
}

impl NotifyEventKind {
    /// Get the display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Notify => "Notify",
            Self::IntervalBegin => "IntervalBegin",
            Self::IntervalEnd => "IntervalEnd",
        }
    }
}

/// Weak link back to the definition that produced an event
#[derive(Clone)]
pub enum NotifySource {
    /// Point definition
    Point(Weak<dyn PointNotify>),
    /// Interval definition, shared by begin and end
    Interval(Weak<dyn IntervalNotify>),
}

impl NotifySource {
    /// Whether the definition is still loaded
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Point(w) => w.strong_count() > 0,
            Self::Interval(w) => w.strong_count() > 0,
        }
    }

    /// Run the definition callback matching `kind`.
    ///
    /// Returns false when the definition has been unloaded or does not
    /// match the kind.
    pub(crate) fn invoke(&self, kind: NotifyEventKind, ctx: &NotifyContext) -> bool {
        match (self, kind) {
            (Self::Point(w), NotifyEventKind::Notify) => match w.upgrade() {
                Some(notify) => {
                    notify.notify_callback(ctx);
                    true
                }
                None => false,
            },
            (Self::Interval(w), NotifyEventKind::IntervalBegin) => match w.upgrade() {
                Some(notify) => {
                    notify.notify_begin_callback(ctx);
                    true
                }
                None => false,
            },
            (Self::Interval(w), NotifyEventKind::IntervalEnd) => match w.upgrade() {
                Some(notify) => {
                    notify.notify_end_callback(ctx);
                    true
                }
                None => false,
            },
            _ => false,
        }
    }
}

impl fmt::Debug for NotifySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (variant, valid) = match self {
            Self::Point(_) => ("Point", self.is_valid()),
            Self::Interval(_) => ("Interval", self.is_valid()),
        };
        f.debug_struct(variant).field("valid", &valid).finish()
    }
}

/// One deliverable notification.
///
/// `delivered` and `skipped` are terminal and mutually exclusive; once either
/// is set the event never fires again.
#[derive(Debug, Clone)]
pub struct NotifyEvent {
    /// Unique event ID
    pub id: EventId,
    /// Callback kind
    pub kind: NotifyEventKind,
    /// Seconds from session start, already rate/dilation scaled; negative when historic
    pub fire_offset: f32,
    /// Authored montage time this event was gathered from
    pub authored_time: f32,
    /// Abort reasons for which this event is force-delivered
    pub ensure_on_abort: AbortReasons,
    /// Close this interval end on abort whenever its begin fired
    pub ensure_end_if_begun: bool,
    /// Definition name, kept after the definition unloads
    pub name: String,
    delivered: bool,
    skipped: bool,
    paired: Option<EventId>,
    timer: Option<TimerHandle>,
    source: NotifySource,
}

impl NotifyEvent {
    /// Create a pending event
    pub fn new(
        id: EventId,
        kind: NotifyEventKind,
        fire_offset: f32,
        name: impl Into<String>,
        source: NotifySource,
    ) -> Self {
        Self {
            id,
            kind,
            fire_offset,
            authored_time: 0.0,
            ensure_on_abort: AbortReasons::empty(),
            ensure_end_if_begun: true,
            name: name.into(),
            delivered: false,
            skipped: false,
            paired: None,
            timer: None,
            source,
        }
    }

    /// Set the authored time
    pub fn with_authored_time(mut self, time: f32) -> Self {
        self.authored_time = time;
        self
    }

    /// Set the abort reasons
    pub fn with_ensure_on_abort(mut self, reasons: AbortReasons) -> Self {
        self.ensure_on_abort = reasons;
        self
    }

    /// Whether the event has an assigned ID and a loaded definition
    pub fn is_valid(&self) -> bool {
        self.id.is_assigned() && self.source.is_valid()
    }

    /// Whether the event has been delivered
    pub fn is_delivered(&self) -> bool {
        self.delivered
    }

    /// Whether the event was dropped as historic
    pub fn is_skipped(&self) -> bool {
        self.skipped
    }

    /// Whether the event can still be delivered
    pub fn is_pending(&self) -> bool {
        !self.delivered && !self.skipped
    }

    /// Whether this is an interval end
    pub fn is_end_state(&self) -> bool {
        self.kind == NotifyEventKind::IntervalEnd
    }

    /// Paired begin/end event
    pub fn paired(&self) -> Option<EventId> {
        self.paired
    }

    /// Active timer, if armed
    pub fn timer(&self) -> Option<TimerHandle> {
        self.timer
    }

    /// Definition link
    pub fn source(&self) -> &NotifySource {
        &self.source
    }

    pub(crate) fn set_paired(&mut self, paired: EventId) {
        self.paired = Some(paired);
    }

    pub(crate) fn set_timer(&mut self, handle: TimerHandle) {
        self.timer = Some(handle);
    }

    /// Mark delivered. Returns false if the event was already terminal.
    pub(crate) fn mark_delivered(&mut self) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.delivered = true;
        true
    }

    /// Mark skipped. Returns false if the event was already terminal.
    pub(crate) fn mark_skipped(&mut self) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.skipped = true;
        true
    }

    /// Cancel the active timer, if any
    pub fn clear_timer(&mut self, timers: &mut dyn TimerService) {
        if let Some(handle) = self.timer.take() {
            timers.clear_timer(handle);
        }
    }
}

/// The ordered event list of one session, keyed by ID
#[derive(Debug, Default)]
pub struct NotifyEvents {
    events: IndexMap<EventId, NotifyEvent>,
}

impl NotifyEvents {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event
    pub fn push(&mut self, event: NotifyEvent) {
        self.events.insert(event.id, event);
    }

    /// Link an interval begin and end both ways
    pub fn pair(&mut self, begin: EventId, end: EventId) {
        if let Some(event) = self.events.get_mut(&begin) {
            event.set_paired(end);
        }
        if let Some(event) = self.events.get_mut(&end) {
            event.set_paired(begin);
        }
    }

    /// Discard every event. Timers must already be cleared.
    pub fn reset(&mut self) {
        self.events.clear();
    }

    /// Get an event
    pub fn get(&self, id: EventId) -> Option<&NotifyEvent> {
        self.events.get(&id)
    }

    /// Get a mutable event
    pub fn get_mut(&mut self, id: EventId) -> Option<&mut NotifyEvent> {
        self.events.get_mut(&id)
    }

    /// Events in gather order
    pub fn iter(&self) -> impl Iterator<Item = &NotifyEvent> {
        self.events.values()
    }

    /// Mutable events in gather order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut NotifyEvent> {
        self.events.values_mut()
    }

    /// IDs in gather order
    pub fn ids(&self) -> Vec<EventId> {
        self.events.keys().copied().collect()
    }

    /// Event count
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events that can still fire
    pub fn pending_count(&self) -> usize {
        self.events.values().filter(|e| e.is_pending()).count()
    }

    /// Number of delivered events
    pub fn delivered_count(&self) -> usize {
        self.events.values().filter(|e| e.is_delivered()).count()
    }

    /// Number of skipped events
    pub fn skipped_count(&self) -> usize {
        self.events.values().filter(|e| e.is_skipped()).count()
    }
}
