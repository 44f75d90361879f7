// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scenario files: the montages to play and the script that drives them.

use crate::error::{PreviewError, Result};
use montage_pro_notify::{
    AbortReasons, IntervalNotify, Montage, MontageSection, NetMode, NotifyContext, PointNotify,
};
use montage_pro_task::{PlayMontageOptions, TaskConfig};
use parking_lot::Mutex;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

fn default_true() -> bool {
    true
}

/// A notify authored on a scenario montage.
///
/// A `duration` makes it an interval notify.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NotifySpec {
    /// Notify name
    pub name: String,
    /// Trigger time in seconds
    pub time: f32,
    /// Interval length in seconds
    #[serde(default)]
    pub duration: Option<f32>,
    /// Abort reasons for which the notify still fires
    #[serde(default)]
    pub ensure_on_abort: AbortReasons,
    /// Close the interval on abort once it has begun
    #[serde(default = "default_true")]
    pub ensure_end_if_begun: bool,
    /// Fire on dedicated servers
    #[serde(default = "default_true")]
    pub trigger_on_dedicated_server: bool,
}

/// A montage described by a scenario
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MontageSpec {
    /// Montage name
    pub name: String,
    /// Length in seconds
    pub length: f32,
    /// Sections
    #[serde(default)]
    pub sections: Vec<MontageSection>,
    /// Notify track
    #[serde(default)]
    pub notifies: Vec<NotifySpec>,
}

impl MontageSpec {
    /// Build and validate the montage. Its notifies log through `tracing`
    /// and append to `log`.
    pub fn build(&self, log: &CallbackLog) -> Result<Montage> {
        let mut montage = Montage::new(self.name.clone(), self.length);
        for section in &self.sections {
            montage.add_section(section.clone());
        }

        for notify in &self.notifies {
            let scripted = ScriptedNotify {
                name: notify.name.clone(),
                ensure_on_abort: notify.ensure_on_abort,
                ensure_end_if_begun: notify.ensure_end_if_begun,
                trigger_on_dedicated_server: notify.trigger_on_dedicated_server,
                log: log.clone(),
            };
            match notify.duration {
                Some(duration) => {
                    montage.add_interval(notify.time, duration, Arc::new(scripted));
                }
                None => {
                    montage.add_point(notify.time, Arc::new(scripted));
                }
            }
        }

        montage.validate().map_err(|source| PreviewError::Montage {
            name: self.name.clone(),
            source,
        })?;
        Ok(montage)
    }
}

/// Shared record of definition callbacks, in call order
#[derive(Debug, Clone, Default)]
pub struct CallbackLog(Arc<Mutex<Vec<String>>>);

impl CallbackLog {
    /// Append an entry
    pub fn record(&self, entry: String) {
        self.0.lock().push(entry);
    }

    /// Snapshot of every entry so far
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }
}

/// Notify definition built from a [`NotifySpec`]
struct ScriptedNotify {
    name: String,
    ensure_on_abort: AbortReasons,
    ensure_end_if_begun: bool,
    trigger_on_dedicated_server: bool,
    log: CallbackLog,
}

impl ScriptedNotify {
    fn fire(&self, callback: &str) {
        tracing::info!(notify = %self.name, "{}", callback);
        self.log.record(format!("{}:{}", callback, self.name));
    }
}

impl PointNotify for ScriptedNotify {
    fn name(&self) -> &str {
        &self.name
    }

    fn ensure_on_abort(&self) -> AbortReasons {
        self.ensure_on_abort
    }

    fn trigger_on_dedicated_server(&self) -> bool {
        self.trigger_on_dedicated_server
    }

    fn on_notify(&self, _ctx: &NotifyContext) {
        self.fire("Notify");
    }
}

impl IntervalNotify for ScriptedNotify {
    fn name(&self) -> &str {
        &self.name
    }

    fn ensure_on_abort(&self) -> AbortReasons {
        self.ensure_on_abort
    }

    fn ensure_end_if_begun(&self) -> bool {
        self.ensure_end_if_begun
    }

    fn trigger_on_dedicated_server(&self) -> bool {
        self.trigger_on_dedicated_server
    }

    fn on_notify_begin(&self, _ctx: &NotifyContext) {
        self.fire("NotifyBegin");
    }

    fn on_notify_end(&self, _ctx: &NotifyContext) {
        self.fire("NotifyEnd");
    }
}

/// Behaviour of the simulated animation system
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnimatorSettings {
    /// Default blend-in time in seconds
    pub blend_in: f32,
    /// Default blend-out time in seconds
    pub blend_out: f32,
    /// Initial custom time dilation of the avatar
    pub time_dilation: f32,
    /// Net mode of the world
    pub net_mode: NetMode,
}

impl Default for AnimatorSettings {
    fn default() -> Self {
        Self {
            blend_in: 0.25,
            blend_out: 0.25,
            time_dilation: 1.0,
            net_mode: NetMode::Standalone,
        }
    }
}

/// One scripted action
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum Step {
    /// Run the simulation for a number of seconds
    Advance(f32),
    /// Change the avatar's custom time dilation
    SetDilation(f32),
    /// Jump to a section through the task
    JumpToSection {
        /// Target section
        section: String,
        /// Leave driven meshes alone
        #[serde(default)]
        only_driver: bool,
    },
    /// Relink a section through the task
    SetNextSection {
        /// Section to relink
        from: String,
        /// Section played after it
        to: String,
        /// Leave driven meshes alone
        #[serde(default)]
        only_driver: bool,
    },
    /// Another montage takes over the avatar mesh
    Interrupt,
    /// The owning ability is cancelled
    CancelAbility,
    /// The task is cancelled from outside the ability
    ExternalCancel,
    /// The owning ability ends
    Stop,
}

/// A preview scenario
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Scenario {
    /// Driver montage
    pub montage: MontageSpec,
    /// Montages played on extra meshes
    #[serde(default)]
    pub driven: Vec<MontageSpec>,
    /// Playback options
    #[serde(default)]
    pub options: PlayMontageOptions,
    /// Task switches
    #[serde(default)]
    pub config: TaskConfig,
    /// Simulated animator settings
    #[serde(default)]
    pub animator: AnimatorSettings,
    /// Actions run after activation
    #[serde(default)]
    pub script: Vec<Step>,
}

impl Scenario {
    /// Parse a scenario from RON text
    pub fn from_ron(text: &str) -> Result<Self> {
        Ok(ron::from_str(text)?)
    }

    /// Load a scenario file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let scenario = Self::from_ron(&text)?;
        tracing::debug!("Loaded scenario '{}' from {}", scenario.montage.name, path.display());
        Ok(scenario)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use montage_pro_notify::{MontageError, NotifyDefinition};

    const ATTACK: &str = include_str!("../scenarios/attack.ron");

    #[test]
    fn test_parse_bundled_scenario() {
        let scenario = Scenario::from_ron(ATTACK).unwrap();
        assert_eq!(scenario.montage.name, "Attack");
        assert_eq!(scenario.montage.sections.len(), 2);
        assert_eq!(scenario.driven.len(), 1);
        assert!(!scenario.script.is_empty());

        let trail = scenario
            .montage
            .notifies
            .iter()
            .find(|n| n.name == "WeaponTrail")
            .unwrap();
        assert_eq!(trail.duration, Some(0.6));
        assert_eq!(
            trail.ensure_on_abort,
            AbortReasons::INTERRUPTED | AbortReasons::CANCELLED
        );
        assert!(trail.ensure_end_if_begun);
    }

    #[test]
    fn test_minimal_scenario_defaults() {
        let scenario = Scenario::from_ron(r#"(montage: (name: "Idle", length: 1.0))"#).unwrap();
        assert!(scenario.script.is_empty());
        assert_eq!(scenario.options, PlayMontageOptions::default());
        assert_eq!(scenario.animator, AnimatorSettings::default());
    }

    #[test]
    fn test_parse_steps() {
        let text = r#"[
            Advance(0.5),
            SetDilation(2.0),
            JumpToSection(section: "Strike"),
            SetNextSection(from: "Windup", to: "Windup", only_driver: true),
            Interrupt,
            Stop,
        ]"#;
        let steps: Vec<Step> = ron::from_str(text).unwrap();
        assert_eq!(steps[0], Step::Advance(0.5));
        assert_eq!(
            steps[2],
            Step::JumpToSection {
                section: "Strike".to_string(),
                only_driver: false
            }
        );
        assert_eq!(
            steps[3],
            Step::SetNextSection {
                from: "Windup".to_string(),
                to: "Windup".to_string(),
                only_driver: true
            }
        );
        assert_eq!(steps[5], Step::Stop);
    }

    #[test]
    fn test_build_montage() {
        let scenario = Scenario::from_ron(ATTACK).unwrap();
        let log = CallbackLog::default();
        let montage = scenario.montage.build(&log).unwrap();

        assert_eq!(montage.notifies().len(), scenario.montage.notifies.len());
        let trail = montage
            .notifies()
            .iter()
            .find(|n| n.definition.name() == "WeaponTrail")
            .unwrap();
        assert!(matches!(trail.definition, NotifyDefinition::Interval(_)));
        assert_eq!(
            trail.definition.ensure_on_abort(),
            AbortReasons::INTERRUPTED | AbortReasons::CANCELLED
        );

        if let NotifyDefinition::Interval(notify) = &trail.definition {
            notify.notify_begin_callback(&NotifyContext::default());
        }
        assert_eq!(log.entries(), vec!["NotifyBegin:WeaponTrail".to_string()]);
    }

    #[test]
    fn test_build_rejects_bad_notify() {
        let spec = MontageSpec {
            name: "Short".to_string(),
            length: 1.0,
            sections: Vec::new(),
            notifies: vec![NotifySpec {
                name: "Late".to_string(),
                time: 2.0,
                duration: None,
                ensure_on_abort: AbortReasons::empty(),
                ensure_end_if_begun: true,
                trigger_on_dedicated_server: true,
            }],
        };
        let err = spec.build(&CallbackLog::default()).unwrap_err();
        assert!(matches!(
            err,
            PreviewError::Montage {
                source: MontageError::NotifyBeyondLength { .. },
                ..
            }
        ));
    }
}
