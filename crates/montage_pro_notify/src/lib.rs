// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reliable notify delivery for montage playback.
//!
//! Engine notifies embedded in a montage are normally fired by the pose
//! evaluation loop, which drops them when playback starts mid-sequence, is
//! interrupted, or runs at a custom time dilation. This crate schedules every
//! notify on a timer instead and guarantees:
//! - Exactly-once delivery per event
//! - Interval begin is always delivered before its end
//! - Interval end is never delivered when its begin was skipped
//! - Flagged notifies still fire when playback aborts early
//!
//! ## Architecture
//!
//! The engine is built on:
//! - A montage asset model with sections and an authored notify track
//! - Notify definitions held weakly by the scheduled events
//! - Free functions that gather, resolve, arm, broadcast and sweep events
//! - A [`NotifySession`] that owns one playback's event list

pub mod broadcast;
pub mod definition;
pub mod event;
pub mod gather;
pub mod montage;
pub mod params;
pub mod schedule;
pub mod session;
pub mod timer;

pub use broadcast::{broadcast_notify_event, ensure_broadcast_notify_events, NotifySink};
pub use definition::{
    IntervalNotify, MeshId, NetMode, NotifyContext, NotifyDefinition, PointNotify,
};
pub use event::{AbortReason, AbortReasons, EventId, NotifyEvent, NotifyEventKind, NotifyEvents};
pub use gather::{gather_notifies, GatherParams};
pub use montage::{Montage, MontageError, MontageId, MontageSection, NotifyTrackEntry};
pub use params::NotifyParams;
pub use schedule::{
    clear_notify_timers, handle_historic_notifies, handle_time_dilation, setup_notify_timers,
    DILATION_TOLERANCE,
};
pub use session::NotifySession;
pub use timer::{SessionId, TimerFired, TimerHandle, TimerManager, TimerOwner, TimerService};
