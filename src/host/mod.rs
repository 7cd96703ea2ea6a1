// Host seams: the embedding engine runtime and its channel primitive
//
// The engine factory, the engine instance lifecycle, and the named-channel
// transport are owned by the host platform. They show up here as traits so
// the binding layer can be exercised against an in-memory host in tests and
// against the real embedder in production.

pub mod mock;

use std::sync::Arc;

use serde_json::Value;

use crate::channel::{MessageReply, MethodCall, DEFAULT_CHANNEL};

/// Handler installed on a channel for inbound (embedded -> host) calls.
pub type InboundHandler = Arc<dyn Fn(MethodCall) -> MessageReply + Send + Sync>;

/// Configuration for spawning one engine instance
///
/// Describes the entrypoint the engine runs, an optional initial route,
/// optional initial arguments (as a JSON value, the channel codec's value
/// type), and the name of the counter channel to wire over the instance.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EngineDescriptor {
    /// Entrypoint identifier the engine instance executes
    pub entrypoint: String,

    /// Optional initial route pushed to the instance at startup
    pub initial_route: Option<String>,

    /// Optional initial arguments handed to the entrypoint
    pub initial_arguments: Option<Value>,

    /// Name of the message channel wired over this instance
    pub channel_name: String,
}

impl EngineDescriptor {
    /// Create a descriptor for the given entrypoint with no route, no
    /// arguments, and the default channel name.
    pub fn new(entrypoint: impl Into<String>) -> Self {
        Self {
            entrypoint: entrypoint.into(),
            initial_route: None,
            initial_arguments: None,
            channel_name: DEFAULT_CHANNEL.to_string(),
        }
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.initial_route = Some(route.into());
        self
    }

    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.initial_arguments = Some(arguments);
        self
    }

    pub fn with_channel_name(mut self, name: impl Into<String>) -> Self {
        self.channel_name = name.into();
        self
    }
}

/// Factory for isolated engine instances
///
/// One runtime exists per process; it can spawn any number of independently
/// addressable engine instances. Spawn failures are host-defined and opaque,
/// so the seam reports them as `anyhow::Error`; the binding maps them to
/// [`crate::error::BindingError::EngineSpawnFailed`].
pub trait EngineRuntime: Send + Sync {
    /// Create and run a new engine instance bound to the descriptor's
    /// entrypoint and route.
    fn spawn_engine(&self, descriptor: &EngineDescriptor) -> anyhow::Result<Arc<dyn EngineInstance>>;
}

/// One isolated execution instance of the embedded engine
pub trait EngineInstance: Send + Sync {
    /// Open (or look up) the named bidirectional channel over this
    /// instance's messenger.
    fn open_channel(&self, name: &str) -> Arc<dyn MessageChannel>;

    /// Stop the instance and release its execution resources.
    ///
    /// Idempotent from the binding's point of view; the host may ignore
    /// repeated calls.
    fn shut_down(&self);
}

/// Named bidirectional message channel over one engine instance
pub trait MessageChannel: Send + Sync {
    /// Send an outbound message to the embedded side. Fire-and-forget: the
    /// embedded side does not reply on this path.
    fn invoke(&self, tag: &str, payload: Option<Value>);

    /// Install or clear the handler for inbound calls. `None` clears the
    /// handler; subsequent inbound calls are not delivered.
    fn set_handler(&self, handler: Option<InboundHandler>);
}
