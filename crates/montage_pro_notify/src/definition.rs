// SPDX-License-Identifier: MIT OR Apache-2.0
//! Authored notify definitions and the context they are invoked with.

use crate::event::AbortReasons;
use crate::montage::MontageId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Identifier of an animated mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeshId(pub Uuid);

impl MeshId {
    /// Create a new random mesh ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MeshId {
    fn default() -> Self {
        Self::new()
    }
}

/// Network role of the world the mesh lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum NetMode {
    /// Single player
    #[default]
    Standalone,
    /// Server without a local player
    DedicatedServer,
    /// Server with a local player
    ListenServer,
    /// Connected client
    Client,
}

/// Playback context handed to definition callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NotifyContext {
    /// Mesh the montage plays on, if still alive
    pub mesh: Option<MeshId>,
    /// Montage being played, if still loaded
    pub montage: Option<MontageId>,
    /// Net mode of the owning world
    pub net_mode: NetMode,
}

impl NotifyContext {
    /// Create a context for a mesh/montage pair
    pub fn new(mesh: Option<MeshId>, montage: Option<MontageId>) -> Self {
        Self {
            mesh,
            montage,
            net_mode: NetMode::Standalone,
        }
    }

    /// Set the net mode
    pub fn with_net_mode(mut self, net_mode: NetMode) -> Self {
        self.net_mode = net_mode;
        self
    }

    /// Whether callbacks are running on a dedicated server.
    ///
    /// A context without a mesh is never treated as a dedicated server.
    pub fn is_dedicated_server(&self) -> bool {
        self.mesh.is_some() && self.net_mode == NetMode::DedicatedServer
    }
}

/// An instantaneous notify authored at a single timestamp.
///
/// Implementors only need [`PointNotify::name`] and [`PointNotify::on_notify`];
/// the scheduler calls [`PointNotify::notify_callback`], which applies the
/// dedicated server gate first.
pub trait PointNotify: Send + Sync {
    /// Display name, cached on every scheduled event
    fn name(&self) -> &str;

    /// Abort reasons for which this notify must still fire
    fn ensure_on_abort(&self) -> AbortReasons {
        AbortReasons::empty()
    }

    /// If false this notify is skipped on dedicated servers
    fn trigger_on_dedicated_server(&self) -> bool {
        true
    }

    /// Whether the notify should run in this context
    fn should_trigger(&self, ctx: &NotifyContext) -> bool {
        !ctx.is_dedicated_server() || self.trigger_on_dedicated_server()
    }

    /// Entry point used by the broadcast engine
    fn notify_callback(&self, ctx: &NotifyContext) {
        if self.should_trigger(ctx) {
            self.on_notify(ctx);
        }
    }

    /// User behavior
    fn on_notify(&self, ctx: &NotifyContext);
}

/// A notify with a begin and an end timestamp.
pub trait IntervalNotify: Send + Sync {
    /// Display name, cached on every scheduled event
    fn name(&self) -> &str;

    /// Abort reasons for which begin/end must still fire
    fn ensure_on_abort(&self) -> AbortReasons {
        AbortReasons::empty()
    }

    /// Whether an end whose begin fired is closed on abort regardless of flags
    fn ensure_end_if_begun(&self) -> bool {
        true
    }

    /// If false this notify is skipped on dedicated servers
    fn trigger_on_dedicated_server(&self) -> bool {
        true
    }

    /// Whether the notify should run in this context
    fn should_trigger(&self, ctx: &NotifyContext) -> bool {
        !ctx.is_dedicated_server() || self.trigger_on_dedicated_server()
    }

    /// Entry point used by the broadcast engine for the begin event
    fn notify_begin_callback(&self, ctx: &NotifyContext) {
        if self.should_trigger(ctx) {
            self.on_notify_begin(ctx);
        }
    }

    /// Entry point used by the broadcast engine for the end event
    fn notify_end_callback(&self, ctx: &NotifyContext) {
        if self.should_trigger(ctx) {
            self.on_notify_end(ctx);
        }
    }

    /// User behavior on begin
    fn on_notify_begin(&self, ctx: &NotifyContext);

    /// User behavior on end
    fn on_notify_end(&self, ctx: &NotifyContext);
}

/// Definition attached to an entry of a montage's notify track
#[derive(Clone)]
pub enum NotifyDefinition {
    /// Point notify
    Point(Arc<dyn PointNotify>),
    /// Interval notify
    Interval(Arc<dyn IntervalNotify>),
}

impl NotifyDefinition {
    /// Wrap a point notify
    pub fn point(notify: impl PointNotify + 'static) -> Self {
        Self::Point(Arc::new(notify))
    }

    /// Wrap an interval notify
    pub fn interval(notify: impl IntervalNotify + 'static) -> Self {
        Self::Interval(Arc::new(notify))
    }

    /// Display name
    pub fn name(&self) -> &str {
        match self {
            Self::Point(n) => n.name(),
            Self::Interval(n) => n.name(),
        }
    }

    /// Abort reasons copied onto every event this definition produces
    pub fn ensure_on_abort(&self) -> AbortReasons {
        match self {
            Self::Point(n) => n.ensure_on_abort(),
            Self::Interval(n) => n.ensure_on_abort(),
        }
    }

    /// Whether this is an interval definition
    pub fn is_interval(&self) -> bool {
        matches!(self, Self::Interval(_))
    }
}

impl fmt::Debug for NotifyDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Point(n) => f.debug_tuple("Point").field(&n.name()).finish(),
            Self::Interval(n) => f.debug_tuple("Interval").field(&n.name()).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Counter {
        server: bool,
        hits: Mutex<u32>,
    }

    impl PointNotify for Counter {
        fn name(&self) -> &str {
            "Counter"
        }

        fn trigger_on_dedicated_server(&self) -> bool {
            self.server
        }

        fn on_notify(&self, _ctx: &NotifyContext) {
            *self.hits.lock() += 1;
        }
    }

    #[test]
    fn test_dedicated_server_gate() {
        let notify = Counter { server: false, hits: Mutex::new(0) };
        let server = NotifyContext::new(Some(MeshId::new()), None)
            .with_net_mode(NetMode::DedicatedServer);
        let client = server.with_net_mode(NetMode::Client);

        notify.notify_callback(&server);
        assert_eq!(*notify.hits.lock(), 0);

        notify.notify_callback(&client);
        assert_eq!(*notify.hits.lock(), 1);
    }

    #[test]
    fn test_missing_mesh_always_triggers() {
        let notify = Counter { server: false, hits: Mutex::new(0) };
        let ctx = NotifyContext::new(None, None).with_net_mode(NetMode::DedicatedServer);
        notify.notify_callback(&ctx);
        assert_eq!(*notify.hits.lock(), 1);
    }

    #[test]
    fn test_definition_flags() {
        let def = NotifyDefinition::point(Counter { server: true, hits: Mutex::new(0) });
        assert_eq!(def.name(), "Counter");
        assert!(!def.is_interval());
        assert!(def.ensure_on_abort().is_empty());
    }
}
