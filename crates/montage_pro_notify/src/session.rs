// SPDX-License-Identifier: MIT OR Apache-2.0
//! One playback's notify events and the operations that drive them.

use crate::broadcast::{broadcast_notify_event, ensure_broadcast_notify_events, NotifySink};
use crate::event::{AbortReason, NotifyEvent, NotifyEvents};
use crate::gather::{gather_notifies, GatherParams};
use crate::montage::Montage;
use crate::params::NotifyParams;
use crate::schedule::{clear_notify_timers, handle_historic_notifies, handle_time_dilation, setup_notify_timers};
use crate::timer::{SessionId, TimerFired, TimerOwner, TimerService};

/// Notify state owned by a single playback task.
///
/// The session owns the timer liveness token, so dropping it invalidates
/// every timer it armed.
#[derive(Debug)]
pub struct NotifySession {
    owner: TimerOwner,
    params: NotifyParams,
    events: NotifyEvents,
    next_id: u32,
    time_dilation: f32,
    play_rate: f32,
    active: bool,
}

impl NotifySession {
    /// Create an idle session
    pub fn new(params: NotifyParams) -> Self {
        Self {
            owner: TimerOwner::new(),
            params,
            events: NotifyEvents::new(),
            next_id: 0,
            time_dilation: 1.0,
            play_rate: 1.0,
            active: false,
        }
    }

    /// Session ID carried by every timer it arms
    pub fn id(&self) -> SessionId {
        self.owner.id()
    }

    /// Settings the session was created with
    pub fn params(&self) -> &NotifyParams {
        &self.params
    }

    /// Whether the session is scheduling events
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Cached time dilation
    pub fn time_dilation(&self) -> f32 {
        self.time_dilation
    }

    /// Play rate used for extraction
    pub fn play_rate(&self) -> f32 {
        self.play_rate
    }

    /// Current event list
    pub fn events(&self) -> &NotifyEvents {
        &self.events
    }

    /// Events that can still be delivered
    pub fn pending_count(&self) -> usize {
        self.events.pending_count()
    }

    /// Events already delivered
    pub fn delivered_count(&self) -> usize {
        self.events.delivered_count()
    }

    /// Start scheduling for a playback beginning at `start_time`.
    ///
    /// `time_dilation` is the avatar's dilation; it is only honoured when
    /// custom time dilation is enabled. Does nothing when pro notifies are
    /// disabled.
    pub fn start(
        &mut self,
        montage: Option<&Montage>,
        section: Option<&str>,
        start_time: f32,
        time_dilation: f32,
        play_rate: f32,
        timers: &mut dyn TimerService,
        sink: &mut dyn NotifySink,
    ) {
        if !self.params.enable_pro_notifies {
            tracing::debug!("Pro notifies disabled, session {:?} stays idle", self.id());
            return;
        }

        self.time_dilation = if self.params.enable_custom_time_dilation {
            time_dilation
        } else {
            1.0
        };
        self.play_rate = play_rate;
        self.active = true;
        self.rebuild(montage, section, start_time, timers, sink);
    }

    /// Throw away the current events and gather them again for `section`
    /// starting at montage position `position`.
    ///
    /// Old timers are cancelled first, so nothing armed for the previous
    /// list can fire into the new one.
    pub fn rebuild(
        &mut self,
        montage: Option<&Montage>,
        section: Option<&str>,
        position: f32,
        timers: &mut dyn TimerService,
        sink: &mut dyn NotifySink,
    ) {
        if !self.active {
            return;
        }

        clear_notify_timers(timers, &mut self.events);

        let params = GatherParams::new(position)
            .with_section(section)
            .with_time_dilation(self.time_dilation)
            .with_play_rate(self.play_rate);
        gather_notifies(montage, &mut self.next_id, &mut self.events, &params);

        handle_historic_notifies(
            &mut self.events,
            self.params.trigger_notifies_before_start_time,
            timers,
            sink,
        );
        setup_notify_timers(&self.owner, timers, &mut self.events);
    }

    /// Deliver the event of a fired timer.
    ///
    /// Returns false when the timer belongs to another session, is stale,
    /// or the session has ended.
    pub fn on_timer(&mut self, fired: &TimerFired, timers: &mut dyn TimerService, sink: &mut dyn NotifySink) -> bool {
        if !self.active || fired.owner != self.id() {
            return false;
        }
        let current = self.events.get(fired.event).and_then(NotifyEvent::timer);
        if current != Some(fired.handle) {
            tracing::trace!("Ignoring stale timer for event {}", fired.event);
            return false;
        }
        broadcast_notify_event(&mut self.events, fired.event, timers, sink);
        true
    }

    /// Follow a change of the avatar's time dilation.
    ///
    /// Only acts when custom time dilation is enabled.
    pub fn handle_time_dilation(&mut self, new_dilation: f32, timers: &mut dyn TimerService) -> bool {
        if !self.active || !self.params.enable_custom_time_dilation {
            return false;
        }
        handle_time_dilation(
            &self.owner,
            timers,
            &mut self.events,
            &mut self.time_dilation,
            new_dilation,
        )
    }

    /// Force-deliver the events that must survive `reason`
    pub fn ensure_delivered(
        &mut self,
        reason: AbortReason,
        timers: &mut dyn TimerService,
        sink: &mut dyn NotifySink,
    ) -> usize {
        if !self.active {
            return 0;
        }
        ensure_broadcast_notify_events(
            reason,
            &mut self.events,
            timers,
            sink,
            self.params.close_intervals_on_blend_out,
        )
    }

    /// Cancel every armed timer without ending the session
    pub fn clear_timers(&mut self, timers: &mut dyn TimerService) {
        clear_notify_timers(timers, &mut self.events);
    }

    /// Clear all timers and stop delivering. The event list is kept for
    /// inspection.
    pub fn teardown(&mut self, timers: &mut dyn TimerService) {
        clear_notify_timers(timers, &mut self.events);
        if self.active {
            tracing::debug!(
                "Session {:?} ended with {} delivered, {} pending",
                self.id(),
                self.events.delivered_count(),
                self.events.pending_count()
            );
        }
        self.active = false;
    }
}
