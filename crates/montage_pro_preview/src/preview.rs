// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runs a scenario against the simulated animator.
//!
//! Each frame runs in a fixed order:
//! 1. The task checks the avatar's time dilation
//! 2. Expired notify timers are delivered
//! 3. The animator advances and its events reach the task

use crate::error::{PreviewError, Result};
use crate::scenario::{CallbackLog, Scenario, Step};
use crate::sim_host::{AnimatorEvent, SimulatedAnimator};
use montage_pro_notify::MeshId;
use montage_pro_task::{MontageToPlay, PlayMontageTask, TaskEvent, TaskState};
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;

/// A task event stamped with the simulation time it was reported at
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// Simulation time in seconds
    pub time: f32,
    /// Event
    #[serde(flatten)]
    pub event: TaskEvent,
}

/// Outcome of a preview run
#[derive(Debug, Clone)]
pub struct PreviewRun {
    /// Task events in report order
    pub records: Vec<Record>,
    /// Definition callbacks in call order
    pub callbacks: Vec<String>,
    /// Task state after the script
    pub final_state: TaskState,
    /// Scheduled notifies never delivered
    pub pending: usize,
}

impl PreviewRun {
    /// Write the records as text lines or JSON lines
    pub fn write_to(&self, out: &mut dyn Write, json: bool) -> Result<()> {
        for record in &self.records {
            if json {
                writeln!(out, "{}", serde_json::to_string(record)?)?;
            } else {
                writeln!(out, "{:>8.3}s  {}", record.time, label(&record.event))?;
            }
        }
        Ok(())
    }
}

fn label(event: &TaskEvent) -> String {
    match event {
        TaskEvent::Notify { name, .. }
        | TaskEvent::NotifyBegin { name, .. }
        | TaskEvent::NotifyEnd { name, .. } => format!("{} {}", event.name(), name),
        other => other.name().to_string(),
    }
}

struct Runner {
    task: PlayMontageTask,
    animator: SimulatedAnimator,
    records: Vec<Record>,
    tick: f32,
}

impl Runner {
    fn collect(&mut self) {
        let time = self.animator.clock();
        self.records
            .extend(self.task.take_events().into_iter().map(|event| Record { time, event }));
    }

    fn dispatch(&mut self) {
        let avatar = self.animator.avatar();
        for event in self.animator.take_events() {
            match event {
                AnimatorEvent::BlendedIn { mesh, montage } if mesh == avatar => {
                    self.task.on_blended_in(montage);
                }
                AnimatorEvent::SectionChanged {
                    mesh,
                    montage,
                    section,
                } if mesh == avatar => {
                    self.task.on_section_changed(montage, &section, &mut self.animator);
                }
                AnimatorEvent::BlendingOut {
                    mesh,
                    montage,
                    interrupted,
                } if mesh == avatar => {
                    self.task.on_blending_out(montage, interrupted, &mut self.animator);
                }
                AnimatorEvent::Ended {
                    mesh,
                    montage,
                    interrupted,
                } if mesh == avatar => {
                    self.task.on_montage_ended(montage, interrupted, &mut self.animator);
                }
                _ => {}
            }
        }
        self.collect();
    }

    fn frame(&mut self, dt: f32) {
        self.task.on_tick_pose(&mut self.animator);

        for fired in self.animator.advance_timers(dt) {
            self.task.on_timer(&fired, &mut self.animator);
        }

        self.animator.tick(dt);
        self.dispatch();
    }

    fn advance(&mut self, seconds: f32) {
        let mut left = seconds;
        while left > f32::EPSILON {
            let dt = left.min(self.tick);
            left -= dt;
            self.frame(dt);
        }
    }

    fn step(&mut self, step: &Step) {
        tracing::debug!("{:?}", step);
        match step {
            Step::Advance(seconds) => self.advance(*seconds),
            Step::SetDilation(dilation) => self.animator.set_time_dilation(*dilation),
            Step::JumpToSection {
                section,
                only_driver,
            } => {
                if !self.task.jump_to_section(section, *only_driver, &mut self.animator) {
                    tracing::warn!("Jump to '{}' ignored, montage is not playing", section);
                }
            }
            Step::SetNextSection {
                from,
                to,
                only_driver,
            } => {
                if !self.task.set_next_section(from, to, *only_driver, &mut self.animator) {
                    tracing::warn!("Link '{}' -> '{}' ignored, montage is not playing", from, to);
                }
            }
            Step::Interrupt => {
                let avatar = self.animator.avatar();
                self.animator.interrupt(avatar);
            }
            Step::CancelAbility => self.task.on_ability_cancelled(&mut self.animator),
            Step::ExternalCancel => self.task.external_cancel(&mut self.animator),
            Step::Stop => self.task.on_destroy(true, &mut self.animator),
        }
        self.dispatch();
    }
}

/// Play a scenario with a fixed simulation step of `tick` seconds
pub fn run_scenario(scenario: &Scenario, tick: f32) -> Result<PreviewRun> {
    if !tick.is_finite() || tick <= 0.0 {
        return Err(PreviewError::InvalidTick(tick));
    }

    let log = CallbackLog::default();
    let driver = Arc::new(scenario.montage.build(&log)?);
    let mut montage = MontageToPlay::new(driver);
    for spec in &scenario.driven {
        montage = montage.with_driven(MeshId::new(), Arc::new(spec.build(&log)?));
    }

    let task = PlayMontageTask::new(
        scenario.montage.name.clone(),
        montage,
        scenario.options.clone(),
        scenario.config,
    );
    let animator = SimulatedAnimator::new(MeshId::new(), scenario.animator.clone());
    let mut runner = Runner {
        task,
        animator,
        records: Vec::new(),
        tick,
    };

    tracing::info!("Playing '{}' ({} steps)", scenario.montage.name, scenario.script.len());
    runner.task.activate(&mut runner.animator);
    runner.dispatch();
    tracing::debug!("{}", runner.task.debug_string(&runner.animator));

    for step in &scenario.script {
        runner.step(step);
    }

    let pending = runner.task.session().pending_count();
    tracing::info!(
        "Finished at {:.3}s: {} events, {} callbacks, {} timers armed",
        runner.animator.clock(),
        runner.records.len(),
        log.len(),
        runner.animator.timer_manager().len()
    );

    Ok(PreviewRun {
        records: runner.records,
        callbacks: log.entries(),
        final_state: runner.task.state(),
        pending,
    })
}
