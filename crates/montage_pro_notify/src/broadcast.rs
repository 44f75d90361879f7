// SPDX-License-Identifier: MIT OR Apache-2.0
//! Delivery of scheduled events and the abort sweep.
//!
//! [`broadcast_notify_event`] is the only path that invokes a notify
//! callback. It is idempotent, orders interval begin before end, and never
//! delivers the end of an interval whose begin was skipped.

use crate::definition::NotifyContext;
use crate::event::{AbortReason, EventId, NotifyEvent, NotifyEventKind, NotifyEvents};
use crate::timer::TimerService;

/// Host side receiver of delivered events
pub trait NotifySink {
    /// Context passed to definition callbacks
    fn context(&self) -> NotifyContext;

    /// A point notify was delivered
    fn on_notify(&mut self, event: &NotifyEvent);

    /// An interval began
    fn on_notify_begin(&mut self, event: &NotifyEvent);

    /// An interval ended
    fn on_notify_end(&mut self, event: &NotifyEvent);
}

/// Deliver one event.
///
/// Does nothing for delivered, skipped or unknown events. An interval end
/// delivers its begin first when needed. The definition callback is skipped
/// when the definition has unloaded, but the sink is always told.
pub fn broadcast_notify_event(
    events: &mut NotifyEvents,
    id: EventId,
    timers: &mut dyn TimerService,
    sink: &mut dyn NotifySink,
) {
    let Some(event) = events.get(id) else {
        return;
    };
    if !event.is_pending() {
        return;
    }

    if let Some(begin_id) = event.paired().filter(|_| event.is_end_state()) {
        let begin_state = events.get(begin_id).map(|b| (b.is_skipped(), b.is_delivered()));
        match begin_state {
            Some((true, _)) => {
                tracing::trace!("Not ending {}: begin {} was skipped", id, begin_id);
                return;
            }
            Some((false, false)) => broadcast_notify_event(events, begin_id, timers, sink),
            _ => {}
        }
    }

    let Some(event) = events.get_mut(id) else {
        return;
    };
    if !event.mark_delivered() {
        return;
    }
    event.clear_timer(timers);

    let ctx = sink.context();
    if !event.source().invoke(event.kind, &ctx) {
        tracing::trace!("Definition of {} '{}' is gone, notifying sink only", id, event.name);
    }

    tracing::trace!("Delivered {} {} '{}'", event.kind.name(), id, event.name);

    match event.kind {
        NotifyEventKind::Notify => sink.on_notify(event),
        NotifyEventKind::IntervalBegin => sink.on_notify_begin(event),
        NotifyEventKind::IntervalEnd => sink.on_notify_end(event),
    }
}

/// Force-deliver what must survive an abort.
///
/// Every undelivered event flagged for `reason` is delivered. An interval
/// end whose begin was delivered is also closed when it has
/// `ensure_end_if_begun` set, except on blend-out unless
/// `close_intervals_on_blend_out` is true. Timers are left to the caller.
/// Returns the number of events delivered by the sweep.
pub fn ensure_broadcast_notify_events(
    reason: AbortReason,
    events: &mut NotifyEvents,
    timers: &mut dyn TimerService,
    sink: &mut dyn NotifySink,
    close_intervals_on_blend_out: bool,
) -> usize {
    let flag = reason.flag();
    let close_open = reason != AbortReason::BlendOut || close_intervals_on_blend_out;
    let before = events.delivered_count();

    for id in events.ids() {
        let Some(event) = events.get(id) else {
            continue;
        };
        if event.is_delivered() {
            continue;
        }

        let flagged = event.ensure_on_abort.contains(flag);
        let open_interval = close_open
            && event.is_end_state()
            && event.ensure_end_if_begun
            && event
                .paired()
                .and_then(|begin| events.get(begin))
                .is_some_and(NotifyEvent::is_delivered);

        if flagged || open_interval {
            broadcast_notify_event(events, id, timers, sink);
        }
    }

    let forced = events.delivered_count() - before;
    tracing::debug!("Abort sweep for {} delivered {} events", reason.name(), forced);
    forced
}
