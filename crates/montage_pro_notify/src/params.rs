// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-playback notify settings.

use serde::{Deserialize, Serialize};

/// Settings for reliable notifies, passed to a session at construction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyParams {
    /// Schedule notifies at all; when false the task plays the montage only
    pub enable_pro_notifies: bool,
    /// Deliver notifies that lie before the start position instead of skipping them
    pub trigger_notifies_before_start_time: bool,
    /// Follow the avatar's custom time dilation while playing
    pub enable_custom_time_dilation: bool,
    /// Close begun intervals when blend-out starts, not only on end/interrupt/cancel
    pub close_intervals_on_blend_out: bool,
}

impl Default for NotifyParams {
    fn default() -> Self {
        Self {
            enable_pro_notifies: true,
            trigger_notifies_before_start_time: false,
            enable_custom_time_dilation: false,
            close_intervals_on_blend_out: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_ron_uses_defaults() {
        let params: NotifyParams = ron::from_str("(trigger_notifies_before_start_time: true)").unwrap();
        assert!(params.enable_pro_notifies);
        assert!(params.trigger_notifies_before_start_time);
        assert!(!params.close_intervals_on_blend_out);
    }
}
