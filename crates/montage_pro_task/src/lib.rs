// SPDX-License-Identifier: MIT OR Apache-2.0
//! Playback task for montages with reliable notifies.
//!
//! A [`PlayMontageTask`] plays a driver montage on the avatar mesh, plays any
//! driven montages on secondary meshes with matching parameters, and owns
//! the [`NotifySession`](montage_pro_notify::NotifySession) that schedules
//! the driver's notifies. Host animation callbacks are forwarded to the
//! task, which runs the abort sweep before queuing each lifecycle event.

pub mod config;
pub mod host;
pub mod task;

pub use config::{PlayMontageOptions, TaskConfig};
pub use host::{AnimationHost, DrivenMontage, MontageToPlay, PlayRequest};
pub use task::{PlayMontageTask, TaskEvent, TaskState};
