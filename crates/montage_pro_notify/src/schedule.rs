// SPDX-License-Identifier: MIT OR Apache-2.0
//! Historic resolution, timer arming and dilation rescheduling.

use crate::broadcast::{broadcast_notify_event, NotifySink};
use crate::event::{EventId, NotifyEvent, NotifyEvents};
use crate::timer::{TimerOwner, TimerService};

/// Smallest dilation change that triggers a reschedule
pub const DILATION_TOLERANCE: f32 = 1.0e-4;

/// Resolve events that are already due at the start position.
///
/// Events with `fire_offset <= 0` are delivered immediately when
/// `trigger_before_start` is set, otherwise they are marked skipped. Both
/// happen in ascending offset order, ties by ID, so a historic interval
/// begin is handled before its end. Returns how many events were resolved.
pub fn handle_historic_notifies(
    events: &mut NotifyEvents,
    trigger_before_start: bool,
    timers: &mut dyn TimerService,
    sink: &mut dyn NotifySink,
) -> usize {
    let mut historic: Vec<(f32, EventId)> = events
        .iter()
        .filter(|e| e.is_pending() && e.fire_offset <= 0.0)
        .map(|e| (e.fire_offset, e.id))
        .collect();
    historic.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    for &(_, id) in &historic {
        if trigger_before_start {
            broadcast_notify_event(events, id, timers, sink);
        } else if let Some(event) = events.get_mut(id) {
            event.mark_skipped();
            event.clear_timer(timers);
        }
    }

    if !historic.is_empty() {
        tracing::debug!(
            "{} {} historic notify events",
            if trigger_before_start { "Delivered" } else { "Skipped" },
            historic.len()
        );
    }
    historic.len()
}

fn arm(owner: &TimerOwner, timers: &mut dyn TimerService, event: &mut NotifyEvent, duration: f32, elapsed: f32) {
    event.clear_timer(timers);
    let handle = timers.set_timer(owner, event.id, duration, elapsed);
    event.set_timer(handle);
}

/// Arm a timer for every pending event that has none.
///
/// Each timer fires `max(fire_offset, 0)` seconds from now. Events whose
/// timer is still active are left alone. Returns the number of timers armed.
pub fn setup_notify_timers(owner: &TimerOwner, timers: &mut dyn TimerService, events: &mut NotifyEvents) -> usize {
    let mut armed = 0;
    for event in events.iter_mut() {
        if !event.is_pending() {
            continue;
        }
        if event.timer().is_some_and(|handle| timers.is_timer_active(handle)) {
            continue;
        }
        let duration = event.fire_offset.max(0.0);
        arm(owner, timers, event, duration, 0.0);
        armed += 1;
    }
    tracing::debug!("Armed {} notify timers", armed);
    armed
}

/// Cancel every timer of the list. Delivery state is untouched.
pub fn clear_notify_timers(timers: &mut dyn TimerService, events: &mut NotifyEvents) {
    for event in events.iter_mut() {
        event.clear_timer(timers);
    }
}

/// Reschedule pending timers after a time dilation change.
///
/// Nothing happens unless `new_dilation` differs from `cached_dilation` by
/// more than [`DILATION_TOLERANCE`]. For each valid pending event with an
/// active timer, the remaining time `R = fire_offset - elapsed` becomes
/// `R / new_dilation`; the rearmed timer keeps its elapsed time so it fires
/// `R / new_dilation` seconds from now. Events already due are left to
/// their timer. The cache always ends up holding `new_dilation`.
///
/// Returns true when timers were rescheduled.
pub fn handle_time_dilation(
    owner: &TimerOwner,
    timers: &mut dyn TimerService,
    events: &mut NotifyEvents,
    cached_dilation: &mut f32,
    new_dilation: f32,
) -> bool {
    if (new_dilation - *cached_dilation).abs() <= DILATION_TOLERANCE {
        return false;
    }

    let previous = std::mem::replace(cached_dilation, new_dilation);

    if !new_dilation.is_finite() || new_dilation <= 0.0 {
        tracing::warn!("Time dilation changed to {}, leaving notify timers as they are", new_dilation);
        return false;
    }

    let mut rescheduled = 0;
    for event in events.iter_mut() {
        if !event.is_valid() || !event.is_pending() {
            continue;
        }
        let Some(elapsed) = event.timer().and_then(|handle| timers.timer_elapsed(handle)) else {
            continue;
        };

        let remaining = event.fire_offset - elapsed;
        if remaining <= 0.0 {
            continue;
        }

        event.fire_offset = elapsed + remaining / new_dilation;
        let duration = event.fire_offset;
        arm(owner, timers, event, duration, elapsed);
        rescheduled += 1;
    }

    tracing::debug!(
        "Time dilation {:.3} -> {:.3}, rescheduled {} notify timers",
        previous,
        new_dilation,
        rescheduled
    );
    true
}
