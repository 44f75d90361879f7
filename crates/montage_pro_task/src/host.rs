// SPDX-License-Identifier: MIT OR Apache-2.0
//! Host collaborators of a playback task.

use montage_pro_notify::{MeshId, Montage, NetMode, TimerService};
use std::sync::Arc;

/// A montage played on a secondary mesh alongside the driver
#[derive(Debug, Clone)]
pub struct DrivenMontage {
    /// Mesh to play on
    pub mesh: MeshId,
    /// Montage to play
    pub montage: Arc<Montage>,
}

/// Driver montage for the avatar mesh plus its driven montages
#[derive(Debug, Clone)]
pub struct MontageToPlay {
    /// Montage played on the avatar mesh; its notifies are scheduled
    pub driver: Arc<Montage>,
    /// Montages played on other meshes with the driver's parameters
    pub driven: Vec<DrivenMontage>,
}

impl MontageToPlay {
    /// Play a single montage
    pub fn new(driver: Arc<Montage>) -> Self {
        Self {
            driver,
            driven: Vec::new(),
        }
    }

    /// Add a driven montage
    pub fn with_driven(mut self, mesh: MeshId, montage: Arc<Montage>) -> Self {
        self.driven.push(DrivenMontage { mesh, montage });
        self
    }
}

/// Parameters of one play call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayRequest<'a> {
    /// Play rate
    pub rate: f32,
    /// Section to jump to after starting
    pub start_section: Option<&'a str>,
    /// Start position in seconds
    pub start_time: f32,
    /// Blend-in time override
    pub blend_in: Option<f32>,
}

/// Animation system the task plays montages through.
///
/// Every query is about the montage currently playing on a mesh.
pub trait AnimationHost {
    /// Mesh of the avatar, if it still exists
    fn avatar_mesh(&self) -> Option<MeshId>;

    /// Net mode of the world
    fn net_mode(&self) -> NetMode {
        NetMode::Standalone
    }

    /// Custom time dilation of the avatar
    fn time_dilation(&self) -> f32 {
        1.0
    }

    /// Deferred callback facility of the world
    fn timers(&mut self) -> &mut dyn TimerService;

    /// Play a montage, returning its play length at rate 1 or 0 on failure
    fn play_montage(&mut self, mesh: MeshId, montage: &Arc<Montage>, request: &PlayRequest<'_>) -> f32;

    /// Montage currently playing on the mesh
    fn current_montage(&self, mesh: MeshId) -> Option<Arc<Montage>>;

    /// Position of the current montage
    fn montage_position(&self, mesh: MeshId) -> Option<f32>;

    /// Section of the current montage
    fn current_section(&self, mesh: MeshId) -> Option<String>;

    /// Jump the current montage to a section
    fn jump_to_section(&mut self, mesh: MeshId, section: &str);

    /// Relink the section played after `from`
    fn set_next_section(&mut self, mesh: MeshId, from: &str, to: &str);

    /// Stop the current montage, blending out over `blend_out` seconds or
    /// the montage default
    fn stop_montage(&mut self, mesh: MeshId, blend_out: Option<f32>);
}
