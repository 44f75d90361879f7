// SPDX-License-Identifier: MIT OR Apache-2.0
//! Gathering scheduled events from a montage's notify track.

use crate::definition::NotifyDefinition;
use crate::event::{EventId, NotifyEvent, NotifyEventKind, NotifyEvents, NotifySource};
use crate::montage::Montage;
use std::sync::Arc;

/// Where and how fast the playback the events are gathered for starts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GatherParams<'a> {
    /// Only gather notifies inside this section; `None` gathers the whole montage
    pub section: Option<&'a str>,
    /// Montage position the session starts from
    pub start_time: f32,
    /// Custom time dilation of the avatar
    pub time_dilation: f32,
    /// Montage play rate
    pub play_rate: f32,
}

impl<'a> GatherParams<'a> {
    /// Gather the whole montage from `start_time` at rate and dilation 1
    pub fn new(start_time: f32) -> Self {
        Self {
            section: None,
            start_time,
            time_dilation: 1.0,
            play_rate: 1.0,
        }
    }

    /// Restrict to a section
    pub fn with_section(mut self, section: Option<&'a str>) -> Self {
        self.section = section;
        self
    }

    /// Set the time dilation
    pub fn with_time_dilation(mut self, time_dilation: f32) -> Self {
        self.time_dilation = time_dilation;
        self
    }

    /// Set the play rate
    pub fn with_play_rate(mut self, play_rate: f32) -> Self {
        self.play_rate = play_rate;
        self
    }

    /// Factor converting authored seconds into timer seconds.
    ///
    /// Rate and dilation both speed playback up, so a notify `t` seconds
    /// ahead fires after `t / (dilation * rate)` seconds.
    pub fn time_scale(&self) -> f32 {
        let rate = if self.play_rate.is_finite() && self.play_rate > 0.0 {
            self.play_rate
        } else {
            tracing::warn!("Ignoring non-positive play rate {}", self.play_rate);
            1.0
        };
        let dilation = if self.time_dilation.is_finite() && self.time_dilation > 0.0 {
            self.time_dilation
        } else {
            tracing::warn!("Ignoring non-positive time dilation {}", self.time_dilation);
            1.0
        };
        1.0 / (dilation * rate)
    }
}

impl Default for GatherParams<'_> {
    fn default() -> Self {
        Self::new(0.0)
    }
}

fn next_event_id(next_id: &mut u32) -> EventId {
    *next_id += 1;
    EventId(*next_id)
}

/// Replace `events` with the events authored in `montage`.
///
/// `next_id` is the session-wide ID counter; it is never reset so IDs stay
/// unique across rebuilds. Notifies outside the requested section produce no
/// event at all. Section membership comes from the montage's section ranges.
/// A missing montage yields an empty list. Timers of the previous events
/// must be cleared by the caller.
pub fn gather_notifies(
    montage: Option<&Montage>,
    next_id: &mut u32,
    events: &mut NotifyEvents,
    params: &GatherParams<'_>,
) {
    events.reset();

    let Some(montage) = montage else {
        tracing::debug!("No montage to gather notifies from");
        return;
    };

    let section_filter = match params.section {
        Some(name) => {
            let index = montage.section_index(name);
            if index.is_none() {
                tracing::warn!(
                    "Montage '{}' has no section '{}', gathering the whole montage",
                    montage.name,
                    name
                );
            }
            index
        }
        None => None,
    };

    let scale = params.time_scale();

    for entry in montage.notifies() {
        if let Some(target) = section_filter {
            if montage.section_index_from_position(entry.time) != Some(target) {
                continue;
            }
        }

        let fire_offset = (entry.time - params.start_time) * scale;

        match &entry.definition {
            NotifyDefinition::Point(notify) => {
                let event = NotifyEvent::new(
                    next_event_id(next_id),
                    NotifyEventKind::Notify,
                    fire_offset,
                    notify.name(),
                    NotifySource::Point(Arc::downgrade(notify)),
                )
                .with_authored_time(entry.time)
                .with_ensure_on_abort(notify.ensure_on_abort());
                events.push(event);
            }
            NotifyDefinition::Interval(notify) => {
                let end_offset = fire_offset + entry.duration * scale;
                let source = NotifySource::Interval(Arc::downgrade(notify));

                let begin = NotifyEvent::new(
                    next_event_id(next_id),
                    NotifyEventKind::IntervalBegin,
                    fire_offset,
                    notify.name(),
                    source.clone(),
                )
                .with_authored_time(entry.time)
                .with_ensure_on_abort(notify.ensure_on_abort());

                let mut end = NotifyEvent::new(
                    next_event_id(next_id),
                    NotifyEventKind::IntervalEnd,
                    end_offset,
                    notify.name(),
                    source,
                )
                .with_authored_time(entry.end_time())
                .with_ensure_on_abort(notify.ensure_on_abort());
                end.ensure_end_if_begun = notify.ensure_end_if_begun();

                let (begin_id, end_id) = (begin.id, end.id);
                events.push(begin);
                events.push(end);
                events.pair(begin_id, end_id);
            }
        }
    }

    tracing::debug!(
        "Gathered {} notify events from '{}' (section {:?}, start {:.3}s, scale {:.3})",
        events.len(),
        montage.name,
        params.section,
        params.start_time,
        scale
    );
}
