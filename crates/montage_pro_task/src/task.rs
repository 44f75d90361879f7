// SPDX-License-Identifier: MIT OR Apache-2.0
//! The montage playback task.
//!
//! This module handles:
//! - Playing the driver and driven montages
//! - Starting, rebuilding and tearing down the notify session
//! - Running the abort sweep before each lifecycle event
//! - Section jumps and next-section links

use crate::config::{PlayMontageOptions, TaskConfig};
use crate::host::{AnimationHost, MontageToPlay, PlayRequest};
use montage_pro_notify::{
    AbortReason, EventId, MeshId, MontageId, NotifyContext, NotifyEvent, NotifySession, NotifySink,
    TimerFired,
};
use serde::Serialize;
use std::sync::Arc;

/// Lifecycle and notify events reported by a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum TaskEvent {
    /// Montage finished blending in
    BlendedIn,
    /// Montage started blending out without interruption
    BlendOut,
    /// Montage or ability was interrupted
    Interrupted,
    /// Task was cancelled or failed to play
    Cancelled,
    /// Montage ended without interruption
    Completed,
    /// Point notify delivered
    Notify {
        /// Event ID
        id: EventId,
        /// Notify name
        name: String,
    },
    /// Interval notify began
    NotifyBegin {
        /// Event ID
        id: EventId,
        /// Notify name
        name: String,
    },
    /// Interval notify ended
    NotifyEnd {
        /// Event ID
        id: EventId,
        /// Notify name
        name: String,
    },
}

impl TaskEvent {
    /// Get the display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::BlendedIn => "BlendedIn",
            Self::BlendOut => "BlendOut",
            Self::Interrupted => "Interrupted",
            Self::Cancelled => "Cancelled",
            Self::Completed => "Completed",
            Self::Notify { .. } => "Notify",
            Self::NotifyBegin { .. } => "NotifyBegin",
            Self::NotifyEnd { .. } => "NotifyEnd",
        }
    }

    /// Whether this is a notify rather than a lifecycle event
    pub fn is_notify(&self) -> bool {
        matches!(
            self,
            Self::Notify { .. } | Self::NotifyBegin { .. } | Self::NotifyEnd { .. }
        )
    }
}

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum TaskState {
    /// Created, not activated yet
    #[default]
    Idle,
    /// Activated and reporting events
    Playing,
    /// Ended; nothing is reported anymore
    Ended,
}

/// Notify sink collecting events until the host drains them
#[derive(Debug, Default)]
struct EventQueue {
    context: NotifyContext,
    events: Vec<TaskEvent>,
}

impl EventQueue {
    fn push(&mut self, event: TaskEvent) {
        self.events.push(event);
    }
}

impl NotifySink for EventQueue {
    fn context(&self) -> NotifyContext {
        self.context
    }

    fn on_notify(&mut self, event: &NotifyEvent) {
        self.push(TaskEvent::Notify {
            id: event.id,
            name: event.name.clone(),
        });
    }

    fn on_notify_begin(&mut self, event: &NotifyEvent) {
        self.push(TaskEvent::NotifyBegin {
            id: event.id,
            name: event.name.clone(),
        });
    }

    fn on_notify_end(&mut self, event: &NotifyEvent) {
        self.push(TaskEvent::NotifyEnd {
            id: event.id,
            name: event.name.clone(),
        });
    }
}

/// Plays a montage and delivers its notifies reliably
#[derive(Debug)]
pub struct PlayMontageTask {
    name: String,
    montage: MontageToPlay,
    options: PlayMontageOptions,
    config: TaskConfig,
    session: NotifySession,
    queue: EventQueue,
    state: TaskState,
    mesh: Option<MeshId>,
    /// Montage callbacks are ignored once the task stopped the montage itself
    callbacks_bound: bool,
    allow_interrupt_after_blend_out: bool,
    start_time: f32,
}

impl PlayMontageTask {
    /// Create a task; nothing plays until [`PlayMontageTask::activate`]
    pub fn new(
        name: impl Into<String>,
        montage: MontageToPlay,
        options: PlayMontageOptions,
        config: TaskConfig,
    ) -> Self {
        let session = NotifySession::new(options.notify);
        let allow_interrupt_after_blend_out = options.allow_interrupt_after_blend_out;
        let start_time = options.start_time;
        Self {
            name: name.into(),
            montage,
            options,
            config,
            session,
            queue: EventQueue::default(),
            state: TaskState::Idle,
            mesh: None,
            callbacks_bound: false,
            allow_interrupt_after_blend_out,
            start_time,
        }
    }

    /// Task instance name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Montages this task plays
    pub fn montage(&self) -> &MontageToPlay {
        &self.montage
    }

    /// Play options
    pub fn options(&self) -> &PlayMontageOptions {
        &self.options
    }

    /// Notify session of the driver montage
    pub fn session(&self) -> &NotifySession {
        &self.session
    }

    /// Montage position notifies were gathered from at activation
    pub fn start_time(&self) -> f32 {
        self.start_time
    }

    /// Drain queued events
    pub fn take_events(&mut self) -> Vec<TaskEvent> {
        std::mem::take(&mut self.queue.events)
    }

    fn is_running(&self) -> bool {
        self.state == TaskState::Playing
    }

    fn is_driver(&self, montage: MontageId) -> bool {
        montage == self.montage.driver.id
    }

    fn sweep(&mut self, reason: AbortReason, host: &mut dyn AnimationHost) {
        self.session.ensure_delivered(reason, host.timers(), &mut self.queue);
    }

    /// Play the driver montage and start scheduling its notifies.
    ///
    /// Returns false when the montage could not be played; a
    /// [`TaskEvent::Cancelled`] is queued and the task ends.
    pub fn activate(&mut self, host: &mut dyn AnimationHost) -> bool {
        if self.state != TaskState::Idle {
            tracing::warn!("Task '{}' is already active", self.name);
            return false;
        }
        self.state = TaskState::Playing;

        let driver = Arc::clone(&self.montage.driver);
        let mesh = host.avatar_mesh();
        let request = PlayRequest {
            rate: self.options.rate,
            start_section: self.options.start_section.as_deref(),
            start_time: self.options.start_time,
            blend_in: self.options.blend_in_override,
        };
        let duration = match mesh {
            Some(mesh) => host.play_montage(mesh, &driver, &request),
            None => 0.0,
        };

        let Some(mesh) = mesh.filter(|_| duration > 0.0) else {
            tracing::warn!("Task '{}' failed to play montage '{}'", self.name, driver.name);
            self.sweep(AbortReason::Cancelled, host);
            self.queue.push(TaskEvent::Cancelled);
            self.end_task(host);
            return false;
        };

        self.mesh = Some(mesh);
        self.play_driven(host, duration);
        self.callbacks_bound = true;
        self.queue.context = NotifyContext::new(Some(mesh), Some(driver.id)).with_net_mode(host.net_mode());

        if self.options.notify.enable_pro_notifies {
            // A start section moves the actual start position
            if self.options.start_section.is_some() {
                if let Some(position) = host.montage_position(mesh) {
                    self.start_time = position;
                }
            }

            let section = host.current_section(mesh);
            let dilation = host.time_dilation();
            self.session.start(
                Some(&*driver),
                section.as_deref(),
                self.start_time,
                dilation,
                self.options.rate,
                host.timers(),
                &mut self.queue,
            );
        }

        tracing::debug!(
            "Task '{}' playing '{}' from {:.3}s with {} pending notifies",
            self.name,
            driver.name,
            self.start_time,
            self.session.pending_count()
        );
        true
    }

    fn play_driven(&self, host: &mut dyn AnimationHost, driver_duration: f32) {
        for driven in &self.montage.driven {
            let rate = if self.options.driven_match_driver_duration {
                self.options.rate * driven.montage.length / driver_duration
            } else {
                self.options.rate
            };
            let request = PlayRequest {
                rate,
                start_section: self.options.start_section.as_deref(),
                start_time: self.options.start_time,
                blend_in: self.options.blend_in_override,
            };
            if host.play_montage(driven.mesh, &driven.montage, &request) <= 0.0 {
                tracing::warn!("Task '{}' failed to play driven montage '{}'", self.name, driven.montage.name);
            }
        }
    }

    /// Deliver a fired notify timer. Returns false if it was not ours.
    pub fn on_timer(&mut self, fired: &TimerFired, host: &mut dyn AnimationHost) -> bool {
        if !self.is_running() {
            return false;
        }
        self.session.on_timer(fired, host.timers(), &mut self.queue)
    }

    /// Host callback: the montage finished blending in
    pub fn on_blended_in(&mut self, montage: MontageId) {
        if self.callbacks_bound && self.is_driver(montage) && self.is_running() {
            self.queue.push(TaskEvent::BlendedIn);
        }
    }

    /// Host callback: the montage started blending out
    pub fn on_blending_out(&mut self, montage: MontageId, interrupted: bool, host: &mut dyn AnimationHost) {
        if !self.callbacks_bound || !self.is_driver(montage) || !self.is_running() {
            return;
        }

        if interrupted {
            self.sweep(AbortReason::Interrupted, host);
            self.allow_interrupt_after_blend_out = false;
            self.queue.push(TaskEvent::Interrupted);

            if self.config.aggressive_end_task {
                self.end_task(host);
            }
        } else {
            self.sweep(AbortReason::BlendOut, host);
            self.queue.push(TaskEvent::BlendOut);
        }
    }

    /// Host callback: the montage ended
    pub fn on_montage_ended(&mut self, montage: MontageId, interrupted: bool, host: &mut dyn AnimationHost) {
        if !self.callbacks_bound || !self.is_driver(montage) {
            return;
        }

        if !interrupted {
            if self.is_running() {
                self.sweep(AbortReason::Completed, host);
                self.queue.push(TaskEvent::Completed);
            }
        } else if self.allow_interrupt_after_blend_out && self.config.fire_interrupt_on_anim_end_interrupt {
            if self.is_running() {
                self.sweep(AbortReason::Interrupted, host);
                self.queue.push(TaskEvent::Interrupted);
            }
        }

        self.end_task(host);
    }

    /// The owning ability was cancelled
    pub fn on_ability_cancelled(&mut self, host: &mut dyn AnimationHost) {
        let stopped = self.stop_playing_montage(host, self.options.blend_out_on_cancel);
        if (stopped || self.allow_interrupt_after_blend_out) && self.is_running() {
            self.sweep(AbortReason::Interrupted, host);
            self.allow_interrupt_after_blend_out = false;
            self.queue.push(TaskEvent::Interrupted);
        }

        if self.config.aggressive_end_task {
            self.end_task(host);
        }
    }

    /// Cancel the task from outside the ability
    pub fn external_cancel(&mut self, host: &mut dyn AnimationHost) {
        if self.is_running() {
            self.sweep(AbortReason::Cancelled, host);
            self.queue.push(TaskEvent::Cancelled);
        }
        self.end_task(host);
    }

    /// End the task without ending the ability
    pub fn end_task(&mut self, host: &mut dyn AnimationHost) {
        self.on_destroy(false, host);
    }

    /// Tear the task down. Stops the montage when the ability ended and
    /// `stop_when_ability_ends` is set. Safe to call more than once.
    pub fn on_destroy(&mut self, ability_ended: bool, host: &mut dyn AnimationHost) {
        if self.state == TaskState::Ended {
            return;
        }

        if ability_ended && self.options.stop_when_ability_ends {
            self.stop_playing_montage(host, self.options.blend_out_on_end);
        }

        self.session.teardown(host.timers());
        self.state = TaskState::Ended;
        tracing::debug!("Task '{}' ended", self.name);
    }

    /// Host callback: the montage entered a new section.
    ///
    /// The notify session is rebuilt from the montage's current position.
    pub fn on_section_changed(&mut self, montage: MontageId, section: &str, host: &mut dyn AnimationHost) {
        if !self.is_running() || !self.is_driver(montage) {
            return;
        }
        let Some(position) = self.mesh.and_then(|mesh| host.montage_position(mesh)) else {
            return;
        };

        tracing::debug!("Task '{}' entered section '{}' at {:.3}s", self.name, section, position);
        self.session.rebuild(
            Some(&*self.montage.driver),
            Some(section),
            position,
            host.timers(),
            &mut self.queue,
        );
    }

    /// Host callback: the avatar mesh ticked its pose.
    ///
    /// Reschedules notify timers when the avatar's time dilation changed.
    pub fn on_tick_pose(&mut self, host: &mut dyn AnimationHost) -> bool {
        if !self.is_running() {
            return false;
        }
        let dilation = host.time_dilation();
        self.session.handle_time_dilation(dilation, host.timers())
    }

    /// Jump to a section on the driver and, unless `only_driver`, the driven meshes
    pub fn jump_to_section(&mut self, section: &str, only_driver: bool, host: &mut dyn AnimationHost) -> bool {
        if !self.is_playing_montage(host) {
            return false;
        }
        let Some(mesh) = self.mesh else {
            return false;
        };

        host.jump_to_section(mesh, section);
        if !only_driver {
            for driven in &self.montage.driven {
                host.jump_to_section(driven.mesh, section);
            }
        }
        true
    }

    /// Relink the section after `from` on the driver and, unless
    /// `only_driver`, the driven meshes
    pub fn set_next_section(&mut self, from: &str, to: &str, only_driver: bool, host: &mut dyn AnimationHost) -> bool {
        if !self.is_playing_montage(host) {
            return false;
        }
        let Some(mesh) = self.mesh else {
            return false;
        };

        host.set_next_section(mesh, from, to);
        if !only_driver {
            for driven in &self.montage.driven {
                host.set_next_section(driven.mesh, from, to);
            }
        }
        true
    }

    /// Stop the driver and driven montages if the driver is still playing.
    ///
    /// Montage callbacks are ignored afterwards.
    pub fn stop_playing_montage(&mut self, host: &mut dyn AnimationHost, blend_out: Option<f32>) -> bool {
        if !self.is_playing_montage(host) {
            return false;
        }
        let Some(mesh) = self.mesh else {
            return false;
        };

        self.callbacks_bound = false;
        host.stop_montage(mesh, blend_out);
        for driven in &self.montage.driven {
            host.stop_montage(driven.mesh, blend_out);
        }
        true
    }

    /// Whether the driver montage is the avatar mesh's current montage
    pub fn is_playing_montage(&self, host: &dyn AnimationHost) -> bool {
        self.mesh
            .and_then(|mesh| host.current_montage(mesh))
            .is_some_and(|current| self.is_driver(current.id))
    }

    /// One-line description for debugging
    pub fn debug_string(&self, host: &dyn AnimationHost) -> String {
        let playing = self
            .mesh
            .and_then(|mesh| host.current_montage(mesh))
            .map_or_else(|| "None".to_string(), |montage| montage.name.clone());
        format!(
            "PlayMontageTask '{}'. MontageToPlay: {}  (Currently Playing): {}",
            self.name, self.montage.driver.name, playing
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use montage_pro_notify::{
        AbortReasons, IntervalNotify, Montage, MontageSection, NotifyParams, PointNotify, TimerManager,
        TimerService,
    };
    use parking_lot::Mutex;
    use std::collections::HashMap;

    struct Point {
        name: &'static str,
        flags: AbortReasons,
        contexts: Mutex<Vec<NotifyContext>>,
    }

    impl PointNotify for Point {
        fn name(&self) -> &str {
            self.name
        }

        fn ensure_on_abort(&self) -> AbortReasons {
            self.flags
        }

        fn on_notify(&self, ctx: &NotifyContext) {
            self.contexts.lock().push(*ctx);
        }
    }

    struct Window;

    impl IntervalNotify for Window {
        fn name(&self) -> &str {
            "Trail"
        }

        fn on_notify_begin(&self, _ctx: &NotifyContext) {}

        fn on_notify_end(&self, _ctx: &NotifyContext) {}
    }

    struct Playing {
        montage: Arc<Montage>,
        position: f32,
        section: Option<String>,
    }

    #[derive(Default)]
    struct FakeHost {
        avatar: Option<MeshId>,
        dilation: f32,
        timers: TimerManager,
        playing: HashMap<MeshId, Playing>,
        plays: Vec<(MeshId, String, f32)>,
        jumps: Vec<(MeshId, String)>,
        links: Vec<(MeshId, String, String)>,
        stops: Vec<(MeshId, Option<f32>)>,
    }

    impl FakeHost {
        fn new() -> Self {
            Self {
                avatar: Some(MeshId::new()),
                dilation: 1.0,
                ..Self::default()
            }
        }
    }

    impl AnimationHost for FakeHost {
        fn avatar_mesh(&self) -> Option<MeshId> {
            self.avatar
        }

        fn time_dilation(&self) -> f32 {
            self.dilation
        }

        fn timers(&mut self) -> &mut dyn TimerService {
            &mut self.timers
        }

        fn play_montage(&mut self, mesh: MeshId, montage: &Arc<Montage>, request: &PlayRequest<'_>) -> f32 {
            if montage.length <= 0.0 {
                return 0.0;
            }
            let mut position = request.start_time;
            let mut section = montage.section_name_from_position(position).map(str::to_string);
            if let Some(start) = request.start_section.and_then(|name| montage.section(name)) {
                position = start.start_time;
                section = Some(start.name.clone());
            }
            self.plays.push((mesh, montage.name.clone(), request.rate));
            self.playing.insert(
                mesh,
                Playing {
                    montage: Arc::clone(montage),
                    position,
                    section,
                },
            );
            montage.length
        }

        fn current_montage(&self, mesh: MeshId) -> Option<Arc<Montage>> {
            self.playing.get(&mesh).map(|p| Arc::clone(&p.montage))
        }

        fn montage_position(&self, mesh: MeshId) -> Option<f32> {
            self.playing.get(&mesh).map(|p| p.position)
        }

        fn current_section(&self, mesh: MeshId) -> Option<String> {
            self.playing.get(&mesh).and_then(|p| p.section.clone())
        }

        fn jump_to_section(&mut self, mesh: MeshId, section: &str) {
            if let Some(playing) = self.playing.get_mut(&mesh) {
                if let Some(start) = playing.montage.section(section).map(|s| s.start_time) {
                    playing.position = start;
                    playing.section = Some(section.to_string());
                }
            }
            self.jumps.push((mesh, section.to_string()));
        }

        fn set_next_section(&mut self, mesh: MeshId, from: &str, to: &str) {
            self.links.push((mesh, from.to_string(), to.to_string()));
        }

        fn stop_montage(&mut self, mesh: MeshId, blend_out: Option<f32>) {
            self.playing.remove(&mesh);
            self.stops.push((mesh, blend_out));
        }
    }

    fn attack() -> Arc<Montage> {
        let mut montage = Montage::new("Attack", 2.0)
            .with_section(MontageSection::new("Windup", 0.0).with_next("Strike"))
            .with_section(MontageSection::new("Strike", 1.0));
        montage.add_point(
            0.5,
            Arc::new(Point {
                name: "Swing",
                flags: AbortReasons::INTERRUPTED | AbortReasons::CANCELLED,
                contexts: Mutex::new(Vec::new()),
            }),
        );
        montage.add_interval(0.8, 0.8, Arc::new(Window));
        montage.add_point(
            1.2,
            Arc::new(Point {
                name: "Impact",
                flags: AbortReasons::empty(),
                contexts: Mutex::new(Vec::new()),
            }),
        );
        Arc::new(montage)
    }

    fn task_with(options: PlayMontageOptions, config: TaskConfig) -> PlayMontageTask {
        PlayMontageTask::new("Attack", MontageToPlay::new(attack()), options, config)
    }

    fn task() -> PlayMontageTask {
        task_with(PlayMontageOptions::default(), TaskConfig::default())
    }

    fn pump(task: &mut PlayMontageTask, host: &mut FakeHost, delta: f32) {
        for fired in host.timers.advance(delta) {
            task.on_timer(&fired, host);
        }
    }

    fn names(events: &[TaskEvent]) -> Vec<String> {
        events
            .iter()
            .map(|event| match event {
                TaskEvent::Notify { name, .. } => format!("Notify:{name}"),
                TaskEvent::NotifyBegin { name, .. } => format!("NotifyBegin:{name}"),
                TaskEvent::NotifyEnd { name, .. } => format!("NotifyEnd:{name}"),
                other => other.name().to_string(),
            })
            .collect()
    }

    #[test]
    fn test_activate_schedules_and_delivers() {
        let mut host = FakeHost::new();
        let mut task = task();

        assert!(task.activate(&mut host));
        assert_eq!(task.state(), TaskState::Playing);
        assert_eq!(task.session().pending_count(), 3);

        pump(&mut task, &mut host, 0.6);
        assert_eq!(names(&task.take_events()), vec!["Notify:Swing"]);

        pump(&mut task, &mut host, 1.1);
        assert_eq!(names(&task.take_events()), vec!["NotifyBegin:Trail", "NotifyEnd:Trail"]);
    }

    #[test]
    fn test_failed_activation_cancels() {
        let mut host = FakeHost::new();
        host.avatar = None;
        let mut task = task();

        assert!(!task.activate(&mut host));
        assert_eq!(task.take_events(), vec![TaskEvent::Cancelled]);
        assert_eq!(task.state(), TaskState::Ended);
        assert!(host.timers.is_empty());
        assert!(!task.activate(&mut host));
    }

    #[test]
    fn test_interrupt_runs_sweep_before_event() {
        let mut host = FakeHost::new();
        let mut task = task();
        let driver = task.montage().driver.id;
        task.activate(&mut host);
        pump(&mut task, &mut host, 0.2);

        task.on_blending_out(driver, true, &mut host);
        assert_eq!(names(&task.take_events()), vec!["Notify:Swing", "Interrupted"]);
        assert_eq!(task.state(), TaskState::Ended);
        assert!(host.timers.is_empty());

        task.on_montage_ended(driver, true, &mut host);
        pump(&mut task, &mut host, 5.0);
        assert!(task.take_events().is_empty());
    }

    #[test]
    fn test_non_aggressive_interrupt_waits_for_end() {
        let config = TaskConfig {
            aggressive_end_task: false,
            ..TaskConfig::default()
        };
        let mut host = FakeHost::new();
        let mut task = task_with(PlayMontageOptions::default(), config);
        let driver = task.montage().driver.id;
        task.activate(&mut host);

        task.on_blending_out(driver, true, &mut host);
        assert_eq!(names(&task.take_events()), vec!["Notify:Swing", "Interrupted"]);
        assert_eq!(task.state(), TaskState::Playing);

        task.on_montage_ended(driver, true, &mut host);
        assert!(task.take_events().is_empty());
        assert_eq!(task.state(), TaskState::Ended);
    }

    #[test]
    fn test_blend_out_then_complete_closes_interval() {
        let mut host = FakeHost::new();
        let mut task = task();
        let driver = task.montage().driver.id;
        task.activate(&mut host);
        pump(&mut task, &mut host, 1.0);
        assert_eq!(names(&task.take_events()), vec!["Notify:Swing", "NotifyBegin:Trail"]);

        task.on_blending_out(driver, false, &mut host);
        assert_eq!(names(&task.take_events()), vec!["BlendOut"]);

        task.on_montage_ended(driver, false, &mut host);
        assert_eq!(names(&task.take_events()), vec!["NotifyEnd:Trail", "Completed"]);
        assert_eq!(task.state(), TaskState::Ended);
    }

    #[test]
    fn test_interrupt_after_blend_out() {
        let options = PlayMontageOptions {
            allow_interrupt_after_blend_out: true,
            ..PlayMontageOptions::default()
        };
        let mut host = FakeHost::new();
        let mut task = task_with(options.clone(), TaskConfig::default());
        let driver = task.montage().driver.id;
        task.activate(&mut host);
        task.on_blending_out(driver, false, &mut host);
        task.on_montage_ended(driver, true, &mut host);
        assert_eq!(names(&task.take_events()), vec!["BlendOut", "Notify:Swing", "Interrupted"]);

        let config = TaskConfig {
            fire_interrupt_on_anim_end_interrupt: false,
            ..TaskConfig::default()
        };
        let mut host = FakeHost::new();
        let mut task = task_with(options, config);
        let driver = task.montage().driver.id;
        task.activate(&mut host);
        task.on_blending_out(driver, false, &mut host);
        task.on_montage_ended(driver, true, &mut host);
        assert_eq!(names(&task.take_events()), vec!["BlendOut"]);
    }

    #[test]
    fn test_ability_cancel_stops_montage() {
        let options = PlayMontageOptions {
            blend_out_on_cancel: Some(0.1),
            ..PlayMontageOptions::default()
        };
        let mut host = FakeHost::new();
        let mut task = task_with(options, TaskConfig::default());
        let driver = task.montage().driver.id;
        task.activate(&mut host);

        task.on_ability_cancelled(&mut host);
        assert_eq!(names(&task.take_events()), vec!["Notify:Swing", "Interrupted"]);
        assert_eq!(host.stops, vec![(host.avatar.unwrap(), Some(0.1))]);
        assert_eq!(task.state(), TaskState::Ended);

        task.on_blending_out(driver, true, &mut host);
        assert!(task.take_events().is_empty());
    }

    #[test]
    fn test_external_cancel() {
        let mut host = FakeHost::new();
        let mut task = task();
        task.activate(&mut host);

        task.external_cancel(&mut host);
        assert_eq!(names(&task.take_events()), vec!["Notify:Swing", "Cancelled"]);
        assert_eq!(task.state(), TaskState::Ended);
        assert!(host.timers.is_empty());
    }

    #[test]
    fn test_start_section_uses_actual_position() {
        let options = PlayMontageOptions::default().with_start_section("Strike");
        let mut host = FakeHost::new();
        let mut task = task_with(options, TaskConfig::default());
        task.activate(&mut host);

        assert_eq!(task.start_time(), 1.0);
        let gathered: Vec<&str> = task.session().events().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(gathered, vec!["Impact"]);

        pump(&mut task, &mut host, 0.25);
        assert_eq!(names(&task.take_events()), vec!["Notify:Impact"]);
    }

    #[test]
    fn test_section_change_rebuilds() {
        let mut host = FakeHost::new();
        let driven_mesh = MeshId::new();
        let montage = MontageToPlay::new(attack()).with_driven(driven_mesh, attack());
        let mut task = PlayMontageTask::new("Attack", montage, PlayMontageOptions::default(), TaskConfig::default());
        let driver = task.montage().driver.id;
        task.activate(&mut host);
        pump(&mut task, &mut host, 0.9);
        assert_eq!(names(&task.take_events()), vec!["Notify:Swing", "NotifyBegin:Trail"]);

        assert!(task.jump_to_section("Strike", false, &mut host));
        assert_eq!(host.jumps.len(), 2);
        task.on_section_changed(driver, "Strike", &mut host);
        assert_eq!(host.timers.active_for(task.session().id()), 1);

        pump(&mut task, &mut host, 1.0);
        assert_eq!(names(&task.take_events()), vec!["Notify:Impact"]);
    }

    #[test]
    fn test_section_control_requires_playing_driver() {
        let mut host = FakeHost::new();
        let driven_mesh = MeshId::new();
        let montage = MontageToPlay::new(attack()).with_driven(driven_mesh, attack());
        let mut task = PlayMontageTask::new("Attack", montage, PlayMontageOptions::default(), TaskConfig::default());

        assert!(!task.jump_to_section("Strike", false, &mut host));
        task.activate(&mut host);

        assert!(task.set_next_section("Windup", "Windup", true, &mut host));
        assert_eq!(host.links.len(), 1);

        let avatar = host.avatar.unwrap();
        host.stop_montage(avatar, None);
        assert!(!task.set_next_section("Windup", "Strike", false, &mut host));
        assert_eq!(host.links.len(), 1);
    }

    #[test]
    fn test_driven_rate_matches_driver_duration() {
        let mut short = Montage::new("Short", 1.0);
        short.add_section(MontageSection::new("Default", 0.0));
        let short = Arc::new(short);
        let driven_mesh = MeshId::new();

        let mut host = FakeHost::new();
        let options = PlayMontageOptions::default().with_rate(1.5);
        let montage = MontageToPlay::new(attack()).with_driven(driven_mesh, Arc::clone(&short));
        let mut task = PlayMontageTask::new("Attack", montage.clone(), options.clone(), TaskConfig::default());
        task.activate(&mut host);
        assert_eq!(host.plays[1], (driven_mesh, "Short".to_string(), 0.75));

        let mut host = FakeHost::new();
        let options = PlayMontageOptions {
            driven_match_driver_duration: false,
            ..options
        };
        let mut task = PlayMontageTask::new("Attack", montage, options, TaskConfig::default());
        task.activate(&mut host);
        assert_eq!(host.plays[1].2, 1.5);
    }

    #[test]
    fn test_tick_pose_follows_dilation() {
        let notify = NotifyParams {
            enable_custom_time_dilation: true,
            ..NotifyParams::default()
        };
        let options = PlayMontageOptions::default().with_notify(notify);
        let mut host = FakeHost::new();
        let mut task = task_with(options, TaskConfig::default());
        task.activate(&mut host);

        pump(&mut task, &mut host, 0.25);
        assert!(!task.on_tick_pose(&mut host));

        host.dilation = 0.5;
        assert!(task.on_tick_pose(&mut host));
        pump(&mut task, &mut host, 0.45);
        assert!(task.take_events().is_empty());
        pump(&mut task, &mut host, 0.1);
        assert_eq!(names(&task.take_events()), vec!["Notify:Swing"]);
    }

    #[test]
    fn test_ability_end_stops_montage() {
        let options = PlayMontageOptions {
            blend_out_on_end: Some(0.3),
            ..PlayMontageOptions::default()
        };
        let mut host = FakeHost::new();
        let mut task = task_with(options.clone(), TaskConfig::default());
        task.activate(&mut host);
        task.on_destroy(true, &mut host);
        assert_eq!(host.stops.len(), 1);
        assert_eq!(host.stops[0].1, Some(0.3));
        assert!(host.timers.is_empty());

        let options = PlayMontageOptions {
            stop_when_ability_ends: false,
            ..options
        };
        let mut host = FakeHost::new();
        let mut task = task_with(options, TaskConfig::default());
        task.activate(&mut host);
        task.on_destroy(true, &mut host);
        assert!(host.stops.is_empty());
        assert!(task.is_playing_montage(&host));
    }

    #[test]
    fn test_disabled_notifies_only_play() {
        let notify = NotifyParams {
            enable_pro_notifies: false,
            ..NotifyParams::default()
        };
        let mut host = FakeHost::new();
        let mut task = task_with(PlayMontageOptions::default().with_notify(notify), TaskConfig::default());

        assert!(task.activate(&mut host));
        assert!(host.timers.is_empty());
        task.external_cancel(&mut host);
        assert_eq!(task.take_events(), vec![TaskEvent::Cancelled]);
    }

    #[test]
    fn test_definitions_receive_context() {
        let point = Arc::new(Point {
            name: "Ping",
            flags: AbortReasons::empty(),
            contexts: Mutex::new(Vec::new()),
        });
        let mut montage = Montage::new("Ping", 1.0);
        montage.add_point(0.1, point.clone());
        let montage = Arc::new(montage);
        let montage_id = montage.id;

        let mut host = FakeHost::new();
        let mut task = PlayMontageTask::new(
            "Ping",
            MontageToPlay::new(montage),
            PlayMontageOptions::default(),
            TaskConfig::default(),
        );
        task.activate(&mut host);
        pump(&mut task, &mut host, 0.2);

        let contexts = point.contexts.lock();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].mesh, host.avatar);
        assert_eq!(contexts[0].montage, Some(montage_id));
    }

    #[test]
    fn test_blended_in_and_debug_string() {
        let mut host = FakeHost::new();
        let mut task = task();
        let driver = task.montage().driver.id;
        task.on_blended_in(driver);
        assert!(task.take_events().is_empty());

        task.activate(&mut host);
        task.on_blended_in(driver);
        assert_eq!(task.take_events(), vec![TaskEvent::BlendedIn]);
        assert_eq!(
            task.debug_string(&host),
            "PlayMontageTask 'Attack'. MontageToPlay: Attack  (Currently Playing): Attack"
        );
    }

    #[test]
    fn test_task_event_json() {
        let event = TaskEvent::Notify {
            id: EventId(3),
            name: "Swing".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"type":"Notify","id":3,"name":"Swing"}"#
        );
        assert_eq!(serde_json::to_string(&TaskEvent::Completed).unwrap(), r#"{"type":"Completed"}"#);
        assert!(event.is_notify());
    }
}
