// SPDX-License-Identifier: MIT OR Apache-2.0
//! Task configuration and per-playback options.

use montage_pro_notify::NotifyParams;
use serde::{Deserialize, Serialize};

/// Behaviour switches shared by every task of a host
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// End the task right after an interrupt or cancel so no second
    /// lifecycle event is sent
    pub aggressive_end_task: bool,
    /// Report an interrupt when the montage ends interrupted after a
    /// non-interrupted blend-out
    pub fire_interrupt_on_anim_end_interrupt: bool,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            aggressive_end_task: true,
            fire_interrupt_on_anim_end_interrupt: true,
        }
    }
}

/// How a montage is played
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayMontageOptions {
    /// Play rate
    pub rate: f32,
    /// Section to start in
    pub start_section: Option<String>,
    /// Montage position to start from, in seconds
    pub start_time: f32,
    /// Reliable notify settings
    pub notify: NotifyParams,
    /// Blend-in time replacing the montage's own
    pub blend_in_override: Option<f32>,
    /// Stop the montage when the ability ends
    pub stop_when_ability_ends: bool,
    /// Still report an interrupt after the montage started blending out
    pub allow_interrupt_after_blend_out: bool,
    /// Blend-out time used when the ability is cancelled
    pub blend_out_on_cancel: Option<f32>,
    /// Blend-out time used when the ability ends
    pub blend_out_on_end: Option<f32>,
    /// Scale driven montage rates so they last as long as the driver
    pub driven_match_driver_duration: bool,
}

impl Default for PlayMontageOptions {
    fn default() -> Self {
        Self {
            rate: 1.0,
            start_section: None,
            start_time: 0.0,
            notify: NotifyParams::default(),
            blend_in_override: None,
            stop_when_ability_ends: true,
            allow_interrupt_after_blend_out: false,
            blend_out_on_cancel: None,
            blend_out_on_end: None,
            driven_match_driver_duration: true,
        }
    }
}

impl PlayMontageOptions {
    /// Set the play rate
    pub fn with_rate(mut self, rate: f32) -> Self {
        self.rate = rate;
        self
    }

    /// Start in a section
    pub fn with_start_section(mut self, section: impl Into<String>) -> Self {
        self.start_section = Some(section.into());
        self
    }

    /// Start at a montage position
    pub fn with_start_time(mut self, start_time: f32) -> Self {
        self.start_time = start_time;
        self
    }

    /// Replace the notify settings
    pub fn with_notify(mut self, notify: NotifyParams) -> Self {
        self.notify = notify;
        self
    }
}
