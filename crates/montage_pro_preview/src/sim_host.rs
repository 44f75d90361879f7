// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory animation system driving montage playback.
//!
//! Montages advance by `dt * rate * time dilation`, follow section links,
//! blend out shortly before they run out and report what happened as
//! [`AnimatorEvent`]s.

use crate::scenario::AnimatorSettings;
use montage_pro_notify::{MeshId, Montage, MontageId, NetMode, TimerFired, TimerManager, TimerService};
use montage_pro_task::{AnimationHost, PlayRequest};
use std::collections::HashMap;
use std::sync::Arc;

/// Something the animator reports to montage listeners
#[derive(Debug, Clone, PartialEq)]
pub enum AnimatorEvent {
    /// Montage finished blending in
    BlendedIn {
        /// Mesh it plays on
        mesh: MeshId,
        /// Montage
        montage: MontageId,
    },
    /// Montage entered a section
    SectionChanged {
        /// Mesh it plays on
        mesh: MeshId,
        /// Montage
        montage: MontageId,
        /// Section entered
        section: String,
    },
    /// Montage started blending out
    BlendingOut {
        /// Mesh it plays on
        mesh: MeshId,
        /// Montage
        montage: MontageId,
        /// Whether it was stopped or replaced
        interrupted: bool,
    },
    /// Montage finished blending out
    Ended {
        /// Mesh it played on
        mesh: MeshId,
        /// Montage
        montage: MontageId,
        /// Whether it was stopped or replaced
        interrupted: bool,
    },
}

#[derive(Debug)]
struct Instance {
    montage: Arc<Montage>,
    position: f32,
    rate: f32,
    section: Option<usize>,
    next_sections: HashMap<String, String>,
    blend_in_left: f32,
    blend_out_left: f32,
    interrupted: bool,
}

impl Instance {
    /// End of the playable range from the current section onwards
    fn end_point(&self) -> f32 {
        let Some(index) = self.section else {
            return self.montage.length;
        };
        match self.next_section() {
            Some(_) => self.montage.length,
            None => self
                .montage
                .section_time_range(index)
                .map_or(self.montage.length, |(_, end)| end),
        }
    }

    fn section_name(&self) -> Option<&str> {
        self.section
            .and_then(|index| self.montage.sections().get(index))
            .map(|s| s.name.as_str())
    }

    fn next_section(&self) -> Option<usize> {
        let name = self.section_name()?;
        let next = match self.next_sections.get(name) {
            Some(next) => next.as_str(),
            None => self.montage.section(name)?.next_section.as_deref()?,
        };
        self.montage.section_index(next)
    }
}

#[derive(Debug, Default)]
struct MeshSlot {
    current: Option<Instance>,
    fading: Vec<Instance>,
}

/// Headless [`AnimationHost`] with its own timer manager
#[derive(Debug)]
pub struct SimulatedAnimator {
    avatar: MeshId,
    settings: AnimatorSettings,
    time_dilation: f32,
    timers: TimerManager,
    meshes: HashMap<MeshId, MeshSlot>,
    events: Vec<AnimatorEvent>,
    clock: f32,
}

impl SimulatedAnimator {
    /// Create an animator whose avatar is `avatar`
    pub fn new(avatar: MeshId, settings: AnimatorSettings) -> Self {
        Self {
            avatar,
            time_dilation: settings.time_dilation,
            settings,
            timers: TimerManager::new(),
            meshes: HashMap::new(),
            events: Vec::new(),
            clock: 0.0,
        }
    }

    /// The avatar mesh
    pub fn avatar(&self) -> MeshId {
        self.avatar
    }

    /// Seconds simulated so far
    pub fn clock(&self) -> f32 {
        self.clock
    }

    /// Change the avatar's custom time dilation
    pub fn set_time_dilation(&mut self, dilation: f32) {
        self.time_dilation = dilation;
    }

    /// Armed timers
    pub fn timer_manager(&self) -> &TimerManager {
        &self.timers
    }

    /// Advance the world timers
    pub fn advance_timers(&mut self, dt: f32) -> Vec<TimerFired> {
        self.timers.advance(dt)
    }

    /// Drain reported events
    pub fn take_events(&mut self) -> Vec<AnimatorEvent> {
        std::mem::take(&mut self.events)
    }

    /// Another montage takes over `mesh`; the current one blends out interrupted
    pub fn interrupt(&mut self, mesh: MeshId) {
        let blend_out = self.settings.blend_out;
        self.begin_blend_out(mesh, blend_out, true);
    }

    /// Advance every montage by `dt` seconds of world time
    pub fn tick(&mut self, dt: f32) {
        self.clock += dt;
        let mut meshes: Vec<MeshId> = self.meshes.keys().copied().collect();
        meshes.sort_by_key(|mesh| *mesh != self.avatar);
        for mesh in meshes {
            self.tick_mesh(mesh, dt);
        }
    }

    fn dilation_for(&self, mesh: MeshId) -> f32 {
        if mesh == self.avatar {
            self.time_dilation
        } else {
            1.0
        }
    }

    fn tick_mesh(&mut self, mesh: MeshId, dt: f32) {
        let dilation = self.dilation_for(mesh);
        let blend_out = self.settings.blend_out;
        let Some(slot) = self.meshes.get_mut(&mesh) else {
            return;
        };

        // Instances already blending out
        let mut index = 0;
        while index < slot.fading.len() {
            let instance = &mut slot.fading[index];
            instance.position = (instance.position + dt * instance.rate * dilation).min(instance.montage.length);
            instance.blend_out_left -= dt;
            if instance.blend_out_left <= 0.0 {
                let finished = slot.fading.remove(index);
                self.events.push(AnimatorEvent::Ended {
                    mesh,
                    montage: finished.montage.id,
                    interrupted: finished.interrupted,
                });
            } else {
                index += 1;
            }
        }

        let mut start_blend_out = false;
        if let Some(instance) = slot.current.as_mut() {
            let montage = instance.montage.id;
            if instance.blend_in_left > 0.0 {
                instance.blend_in_left -= dt;
                if instance.blend_in_left <= 0.0 {
                    self.events.push(AnimatorEvent::BlendedIn { mesh, montage });
                }
            }

            let speed = instance.rate * dilation;
            instance.position += dt * speed;

            if let Some(index) = instance.section {
                let end = instance
                    .montage
                    .section_time_range(index)
                    .map_or(instance.montage.length, |(_, end)| end);
                if instance.position >= end {
                    if let Some(next) = instance.next_section() {
                        let overflow = instance.position - end;
                        let start = instance
                            .montage
                            .section_time_range(next)
                            .map_or(0.0, |(start, _)| start);
                        instance.position = start + overflow;
                        instance.section = Some(next);
                        if let Some(section) = instance.section_name() {
                            self.events.push(AnimatorEvent::SectionChanged {
                                mesh,
                                montage,
                                section: section.to_string(),
                            });
                        }
                    }
                }
            }

            let end = instance.end_point();
            instance.position = instance.position.min(end);
            let remaining = if speed > 0.0 {
                (end - instance.position) / speed
            } else {
                f32::INFINITY
            };
            start_blend_out = remaining <= blend_out;
        }

        if start_blend_out {
            self.begin_blend_out(mesh, blend_out, false);
        }
    }

    fn begin_blend_out(&mut self, mesh: MeshId, blend_out: f32, interrupted: bool) {
        let Some(slot) = self.meshes.get_mut(&mesh) else {
            return;
        };
        let Some(mut instance) = slot.current.take() else {
            return;
        };

        let montage = instance.montage.id;
        instance.blend_out_left = blend_out;
        instance.interrupted = interrupted;
        self.events.push(AnimatorEvent::BlendingOut {
            mesh,
            montage,
            interrupted,
        });

        if blend_out <= 0.0 {
            self.events.push(AnimatorEvent::Ended {
                mesh,
                montage,
                interrupted,
            });
        } else {
            slot.fading.push(instance);
        }
    }

    fn current(&self, mesh: MeshId) -> Option<&Instance> {
        self.meshes.get(&mesh)?.current.as_ref()
    }

    fn current_mut(&mut self, mesh: MeshId) -> Option<&mut Instance> {
        self.meshes.get_mut(&mesh)?.current.as_mut()
    }
}

impl AnimationHost for SimulatedAnimator {
    fn avatar_mesh(&self) -> Option<MeshId> {
        Some(self.avatar)
    }

    fn net_mode(&self) -> NetMode {
        self.settings.net_mode
    }

    fn time_dilation(&self) -> f32 {
        self.time_dilation
    }

    fn timers(&mut self) -> &mut dyn TimerService {
        &mut self.timers
    }

    fn play_montage(&mut self, mesh: MeshId, montage: &Arc<Montage>, request: &PlayRequest<'_>) -> f32 {
        if montage.length <= 0.0 || request.rate <= 0.0 || !request.rate.is_finite() {
            tracing::warn!("Cannot play '{}' at rate {}", montage.name, request.rate);
            return 0.0;
        }

        // A new montage replaces whatever is playing
        self.interrupt(mesh);

        let mut position = request.start_time.clamp(0.0, montage.length);
        let mut section = montage.section_index_from_position(position);
        if let Some(name) = request.start_section {
            match montage.section_index(name) {
                Some(index) => {
                    section = Some(index);
                    position = montage.section_time_range(index).map_or(position, |(start, _)| start);
                }
                None => tracing::warn!("Montage '{}' has no section '{}'", montage.name, name),
            }
        }

        let blend_in = request.blend_in.unwrap_or(self.settings.blend_in);
        if blend_in <= 0.0 {
            self.events.push(AnimatorEvent::BlendedIn {
                mesh,
                montage: montage.id,
            });
        }

        self.meshes.entry(mesh).or_default().current = Some(Instance {
            montage: Arc::clone(montage),
            position,
            rate: request.rate,
            section,
            next_sections: HashMap::new(),
            blend_in_left: blend_in,
            blend_out_left: 0.0,
            interrupted: false,
        });
        montage.length
    }

    fn current_montage(&self, mesh: MeshId) -> Option<Arc<Montage>> {
        self.current(mesh).map(|instance| Arc::clone(&instance.montage))
    }

    fn montage_position(&self, mesh: MeshId) -> Option<f32> {
        self.current(mesh).map(|instance| instance.position)
    }

    fn current_section(&self, mesh: MeshId) -> Option<String> {
        self.current(mesh)?.section_name().map(str::to_string)
    }

    fn jump_to_section(&mut self, mesh: MeshId, section: &str) {
        let Some(instance) = self.current_mut(mesh) else {
            return;
        };
        let Some(index) = instance.montage.section_index(section) else {
            tracing::warn!("Montage '{}' has no section '{}'", instance.montage.name, section);
            return;
        };

        if let Some((start, _)) = instance.montage.section_time_range(index) {
            instance.position = start;
        }
        instance.section = Some(index);
        let montage = instance.montage.id;
        self.events.push(AnimatorEvent::SectionChanged {
            mesh,
            montage,
            section: section.to_string(),
        });
    }

    fn set_next_section(&mut self, mesh: MeshId, from: &str, to: &str) {
        if let Some(instance) = self.current_mut(mesh) {
            instance.next_sections.insert(from.to_string(), to.to_string());
        }
    }

    fn stop_montage(&mut self, mesh: MeshId, blend_out: Option<f32>) {
        let blend_out = blend_out.unwrap_or(self.settings.blend_out);
        self.begin_blend_out(mesh, blend_out, true);
    }
}
