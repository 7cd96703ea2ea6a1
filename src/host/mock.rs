// In-memory host runtime
//
// Stand-in for the platform embedder so bindings can be exercised in tests
// and host-less development. Records every spawned engine, opened channel,
// and outbound message, and lets callers dispatch inbound calls as the
// embedded side would.
//
// Unlike the production paths, lock acquisitions here panic on poisoning: a
// poisoned mock lock means a test already failed, so there is no caller to
// hand a typed error to.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::channel::{MessageReply, MethodCall};
use crate::host::{EngineDescriptor, EngineInstance, EngineRuntime, InboundHandler, MessageChannel};

/// Recording engine factory.
#[derive(Default)]
pub struct MockEngineRuntime {
    engines: Mutex<Vec<Arc<MockEngineInstance>>>,
    fail_next_spawn: AtomicBool,
}

impl MockEngineRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `spawn_engine` call fail with a host-side error.
    pub fn fail_next_spawn(&self) {
        self.fail_next_spawn.store(true, Ordering::SeqCst);
    }

    /// Engines spawned so far, in spawn order.
    pub fn engines(&self) -> Vec<Arc<MockEngineInstance>> {
        self.engines.lock().expect("mock engines lock").clone()
    }

    /// Most recently spawned engine, if any.
    pub fn last_engine(&self) -> Option<Arc<MockEngineInstance>> {
        self.engines.lock().expect("mock engines lock").last().cloned()
    }
}

impl EngineRuntime for MockEngineRuntime {
    fn spawn_engine(
        &self,
        descriptor: &EngineDescriptor,
    ) -> anyhow::Result<Arc<dyn EngineInstance>> {
        if self.fail_next_spawn.swap(false, Ordering::SeqCst) {
            anyhow::bail!("mock host refused to spawn entrypoint {}", descriptor.entrypoint);
        }
        let engine = Arc::new(MockEngineInstance {
            descriptor: descriptor.clone(),
            channels: Mutex::new(HashMap::new()),
            shut_down: AtomicBool::new(false),
        });
        self.engines.lock().expect("mock engines lock").push(Arc::clone(&engine));
        Ok(engine)
    }
}

/// Recording engine instance.
pub struct MockEngineInstance {
    descriptor: EngineDescriptor,
    channels: Mutex<HashMap<String, Arc<MockMessageChannel>>>,
    shut_down: AtomicBool,
}

impl MockEngineInstance {
    /// Descriptor this instance was spawned with.
    pub fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    /// Channel previously opened under `name`, if any. A `None` here means
    /// no binding has attached over this instance yet.
    pub fn channel(&self, name: &str) -> Option<Arc<MockMessageChannel>> {
        self.channels.lock().expect("mock channels lock").get(name).cloned()
    }

    /// Whether `shut_down` has been called on this instance.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

impl EngineInstance for MockEngineInstance {
    fn open_channel(&self, name: &str) -> Arc<dyn MessageChannel> {
        let mut channels = self.channels.lock().expect("mock channels lock");
        let channel = channels
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(MockMessageChannel {
                    name: name.to_string(),
                    sent: Mutex::new(Vec::new()),
                    handler: Mutex::new(None),
                })
            })
            .clone();
        channel
    }

    fn shut_down(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }
}

/// Recording message channel.
pub struct MockMessageChannel {
    name: String,
    sent: Mutex<Vec<(String, Option<Value>)>>,
    handler: Mutex<Option<InboundHandler>>,
}

impl MockMessageChannel {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every outbound message sent over this channel, in order.
    pub fn sent_messages(&self) -> Vec<(String, Option<Value>)> {
        self.sent.lock().expect("mock sent lock").clone()
    }

    /// The integer payloads of every `setCount` sent over this channel.
    pub fn set_count_values(&self) -> Vec<i64> {
        self.sent_messages()
            .iter()
            .filter(|(tag, _)| tag == crate::channel::tags::SET_COUNT)
            .filter_map(|(_, payload)| payload.as_ref().and_then(Value::as_i64))
            .collect()
    }

    /// Whether an inbound handler is currently installed.
    pub fn has_handler(&self) -> bool {
        self.handler.lock().expect("mock handler lock").is_some()
    }

    /// Dispatch an inbound call as the embedded side would.
    ///
    /// Returns `None` if no handler is installed (the call is dropped, as a
    /// real channel drops inbound traffic after the handler is cleared).
    pub fn dispatch(&self, tag: &str, payload: Option<Value>) -> Option<MessageReply> {
        let handler = self.handler.lock().expect("mock handler lock").clone();
        handler.map(|handler| handler(MethodCall::new(tag, payload)))
    }
}

impl MessageChannel for MockMessageChannel {
    fn invoke(&self, tag: &str, payload: Option<Value>) {
        self.sent
            .lock()
            .expect("mock sent lock")
            .push((tag.to_string(), payload));
    }

    fn set_handler(&self, handler: Option<InboundHandler>) {
        *self.handler.lock().expect("mock handler lock") = handler;
    }
}
