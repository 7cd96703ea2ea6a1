// EngineBindings: binds one engine instance to the shared counter store
//
// One binding exists per UI surface. It translates inbound channel messages
// into store mutations or delegate calls, and forwards store change
// notifications back to its own engine instance as `setCount` pushes.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{InboundMessage, MessageReply, MethodCall, OutboundMessage};
use crate::error::{log_binding_error, BindingError, ErrorCode};
use crate::host::{EngineDescriptor, EngineInstance, EngineRuntime, InboundHandler, MessageChannel};
use crate::store::{CounterObserver, CounterStore, ObserverId};

/// How long to wait for host-side readiness before completing attachment.
///
/// Workaround for host startup ordering: the embedded side needs a moment
/// before the channel is usable. Hosts with a real readiness signal should
/// use [`EngineBindings::attach_on`] instead of this timer.
pub const ENGINE_READY_DELAY: Duration = Duration::from_millis(100);

/// Notifications a binding forwards to its host surface
///
/// Messages that interact with the counter store are handled by the binding
/// itself; everything else in the channel vocabulary lands here.
pub trait BindingDelegate: Send + Sync {
    /// The embedded side requested the host advance to its next surface.
    fn on_next(&self);
}

/// Binding lifecycle phase
///
/// `Unattached` (engine spawned, channel not live) moves to `Attached` via
/// `attach()`. `Detached` is terminal and reachable from both, so teardown
/// before the deferred attach completes simply cancels it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unattached,
    Attached,
    Detached,
}

struct BindingState {
    phase: Phase,
    channel: Option<Arc<dyn MessageChannel>>,
    observer_id: Option<ObserverId>,
}

/// Binding between one engine instance and the shared counter store
///
/// Lock ordering: the store notifies observers while holding its own lock
/// and `on_count_update` takes the binding's state lock, so the binding must
/// never call into the store while holding that lock. Every method below
/// drops the state guard before touching the store.
pub struct EngineBindings {
    store: Arc<CounterStore>,
    delegate: Arc<dyn BindingDelegate>,
    engine: Arc<dyn EngineInstance>,
    channel_name: String,
    state: Mutex<BindingState>,
}

impl EngineBindings {
    /// Spawn a new engine instance and wrap it in an unattached binding
    ///
    /// The engine starts executing the descriptor's entrypoint immediately;
    /// the channel is not wired until [`attach`](Self::attach) (usually via
    /// the deferred forms below, after host readiness).
    ///
    /// # Errors
    /// - `BindingError::EngineSpawnFailed` if the host runtime rejects the
    ///   descriptor
    pub fn spawn(
        runtime: &dyn EngineRuntime,
        store: Arc<CounterStore>,
        delegate: Arc<dyn BindingDelegate>,
        descriptor: &EngineDescriptor,
    ) -> Result<Arc<Self>, BindingError> {
        let engine = runtime.spawn_engine(descriptor).map_err(|err| {
            let err = BindingError::EngineSpawnFailed {
                reason: err.to_string(),
            };
            log_binding_error(&err, "spawn");
            err
        })?;
        debug!(entrypoint = %descriptor.entrypoint, "engine instance spawned");
        Ok(Arc::new(Self {
            store,
            delegate,
            engine,
            channel_name: descriptor.channel_name.clone(),
            state: Mutex::new(BindingState {
                phase: Phase::Unattached,
                channel: None,
                observer_id: None,
            }),
        }))
    }

    /// Safely acquire the binding state lock
    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, BindingState>, BindingError> {
        self.state.lock().map_err(|_| BindingError::LockPoisoned {
            component: "binding_state".to_string(),
        })
    }

    /// Wire the channel and start observing the store
    ///
    /// Registers the binding with the store, pushes the current counter
    /// value to the engine as `setCount`, and installs the inbound handler.
    /// Expected to run on the host's main execution context once the engine
    /// is ready.
    ///
    /// # Errors
    /// - `BindingError::AlreadyAttached` if called twice
    /// - `BindingError::Detached` if the binding was torn down first (the
    ///   deferred-attach path treats this as a no-op)
    pub fn attach(self: &Arc<Self>) -> Result<(), BindingError> {
        let channel = {
            let mut state = self.lock_state().map_err(|err| {
                log_binding_error(&err, "attach");
                err
            })?;
            match state.phase {
                Phase::Attached => {
                    let err = BindingError::AlreadyAttached;
                    log_binding_error(&err, "attach");
                    return Err(err);
                }
                Phase::Detached => return Err(BindingError::Detached),
                Phase::Unattached => {}
            }
            let channel = self.engine.open_channel(&self.channel_name);
            state.channel = Some(Arc::clone(&channel));
            state.phase = Phase::Attached;
            channel
        };

        // Observer registration happens outside the state lock; from here on
        // store notifications flow through on_count_update.
        let observer_id = match self
            .store
            .add_observer(Arc::clone(self) as Arc<dyn CounterObserver>)
        {
            Ok(id) => id,
            Err(err) => {
                let err = BindingError::from(err);
                log_binding_error(&err, "attach");
                self.roll_back_attach(None);
                return Err(err);
            }
        };

        {
            let mut state = self.lock_state()?;
            if state.phase == Phase::Detached {
                // Torn down while registering; undo and report.
                drop(state);
                let _ = self.store.remove_observer(observer_id);
                return Err(BindingError::Detached);
            }
            state.observer_id = Some(observer_id);
        }

        let current = match self.store.counter() {
            Ok(value) => value,
            Err(err) => {
                let err = BindingError::from(err);
                log_binding_error(&err, "attach");
                self.roll_back_attach(Some(observer_id));
                return Err(err);
            }
        };
        let push = OutboundMessage::SetCount(current);
        channel.invoke(push.tag(), push.payload());

        let weak = Arc::downgrade(self);
        let handler: InboundHandler = Arc::new(move |call| Self::dispatch(&weak, call));
        channel.set_handler(Some(handler));

        info!(channel = %self.channel_name, counter = current, "binding attached");
        Ok(())
    }

    /// Undo a partial attach so a later retry is possible
    ///
    /// Leaves a concurrent detach alone: `Detached` is terminal, so the
    /// rollback only applies while the phase is still `Attached`.
    fn roll_back_attach(&self, observer_id: Option<ObserverId>) {
        if let Ok(mut state) = self.lock_state() {
            if state.phase == Phase::Attached {
                state.phase = Phase::Unattached;
                state.channel = None;
                state.observer_id = None;
            }
        }
        if let Some(id) = observer_id {
            let _ = self.store.remove_observer(id);
        }
    }

    /// Attach once the given readiness signal resolves
    ///
    /// If the binding is detached before the signal resolves, the attach is
    /// skipped (logged, no channel handler, no store registration). Returns
    /// the task handle so callers can await completion.
    pub fn attach_on(
        self: &Arc<Self>,
        ready: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> JoinHandle<()> {
        let binding = Arc::clone(self);
        tokio::spawn(async move {
            ready.await;
            match binding.attach() {
                Ok(()) => {}
                Err(BindingError::Detached) => {
                    debug!("binding detached before setup completed; skipping attach");
                }
                Err(err) => log_binding_error(&err, "attach_on"),
            }
        })
    }

    /// Attach after a fixed delay
    ///
    /// Timer form of [`attach_on`](Self::attach_on) for hosts without an
    /// explicit readiness signal; see [`ENGINE_READY_DELAY`].
    pub fn attach_when_ready(self: &Arc<Self>, delay: Duration) -> JoinHandle<()> {
        self.attach_on(tokio::time::sleep(delay))
    }

    /// Tear the binding down
    ///
    /// Deregisters the store observer, clears the inbound handler so no
    /// further inbound messages are processed, and shuts the engine instance
    /// down. Detaching an unattached binding marks it detached and releases
    /// the engine, which also cancels any pending deferred attach.
    ///
    /// # Errors
    /// - `BindingError::Detached` if the binding was already detached
    pub fn detach(&self) -> Result<(), BindingError> {
        let (channel, observer_id) = {
            let mut state = self.lock_state().map_err(|err| {
                log_binding_error(&err, "detach");
                err
            })?;
            match state.phase {
                Phase::Detached => {
                    let err = BindingError::Detached;
                    log_binding_error(&err, "detach");
                    return Err(err);
                }
                Phase::Unattached => {
                    state.phase = Phase::Detached;
                    drop(state);
                    debug!("binding detached before attach; pending setup cancelled");
                    self.engine.shut_down();
                    return Ok(());
                }
                Phase::Attached => {}
            }
            state.phase = Phase::Detached;
            (state.channel.take(), state.observer_id.take())
        };

        if let Some(id) = observer_id {
            if let Err(err) = self.store.remove_observer(id) {
                crate::error::log_store_error(&err, "detach");
            }
        }
        if let Some(channel) = channel {
            channel.set_handler(None);
        }
        self.engine.shut_down();

        info!(channel = %self.channel_name, "binding detached");
        Ok(())
    }

    /// Handle one inbound call from the embedded side.
    fn dispatch(weak: &Weak<Self>, call: MethodCall) -> MessageReply {
        let Some(binding) = weak.upgrade() else {
            return MessageReply::NotImplemented;
        };
        match InboundMessage::from_tag(&call.tag) {
            Some(InboundMessage::IncrementCount) => match binding.store.increment() {
                Ok(_) => MessageReply::Success(None),
                Err(err) => {
                    crate::error::log_store_error(&err, "dispatch");
                    MessageReply::Error {
                        code: err.code(),
                        message: err.message(),
                    }
                }
            },
            Some(InboundMessage::Next) => {
                binding.delegate.on_next();
                MessageReply::Success(None)
            }
            Some(InboundMessage::Test) => {
                info!(channel = %binding.channel_name, "diagnostic probe received");
                MessageReply::Success(None)
            }
            None => {
                warn!(tag = %call.tag, "unrecognized message tag");
                MessageReply::NotImplemented
            }
        }
    }
}

impl CounterObserver for EngineBindings {
    /// Forward a counter change to this binding's engine instance
    ///
    /// Called synchronously by the store for changes from any binding, not
    /// only this one. Dropped silently if the binding is no longer attached.
    fn on_count_update(&self, new_count: i64) {
        let channel = match self.lock_state() {
            Ok(state) if state.phase == Phase::Attached => state.channel.clone(),
            Ok(_) => None,
            Err(err) => {
                log_binding_error(&err, "on_count_update");
                None
            }
        };
        if let Some(channel) = channel {
            let push = OutboundMessage::SetCount(new_count);
            channel.invoke(push.tag(), push.payload());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mock::{MockEngineRuntime, MockMessageChannel};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDelegate {
        next_calls: AtomicUsize,
    }

    impl CountingDelegate {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                next_calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.next_calls.load(Ordering::SeqCst)
        }
    }

    impl BindingDelegate for CountingDelegate {
        fn on_next(&self) {
            self.next_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn attached_binding(
        runtime: &MockEngineRuntime,
        store: &Arc<CounterStore>,
        delegate: &Arc<CountingDelegate>,
    ) -> (Arc<EngineBindings>, Arc<MockMessageChannel>) {
        let binding = EngineBindings::spawn(
            runtime,
            Arc::clone(store),
            delegate.clone(),
            &EngineDescriptor::new("main"),
        )
        .unwrap();
        binding.attach().unwrap();
        let channel = runtime
            .last_engine()
            .unwrap()
            .channel(crate::channel::DEFAULT_CHANNEL)
            .unwrap();
        (binding, channel)
    }

    #[test]
    fn test_spawn_failure_maps_to_engine_spawn_failed() {
        let runtime = MockEngineRuntime::new();
        runtime.fail_next_spawn();
        let result = EngineBindings::spawn(
            &runtime,
            Arc::new(CounterStore::new()),
            CountingDelegate::new(),
            &EngineDescriptor::new("main"),
        );
        match result {
            Err(BindingError::EngineSpawnFailed { reason }) => {
                assert!(reason.contains("main"));
            }
            other => panic!("Expected EngineSpawnFailed, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_attach_pushes_current_count_and_installs_handler() {
        let runtime = MockEngineRuntime::new();
        let store = Arc::new(CounterStore::new());
        store.set_counter(5).unwrap();
        let (_binding, channel) = attached_binding(&runtime, &store, &CountingDelegate::new());

        assert_eq!(channel.set_count_values(), vec![5]);
        assert!(channel.has_handler());
        assert_eq!(store.observer_count().unwrap(), 1);
    }

    #[test]
    fn test_double_attach_reports_already_attached() {
        let runtime = MockEngineRuntime::new();
        let store = Arc::new(CounterStore::new());
        let (binding, _) = attached_binding(&runtime, &store, &CountingDelegate::new());
        assert_eq!(binding.attach(), Err(BindingError::AlreadyAttached));
    }

    #[test]
    fn test_increment_count_mutates_store_and_acknowledges() {
        let runtime = MockEngineRuntime::new();
        let store = Arc::new(CounterStore::new());
        let (_binding, channel) = attached_binding(&runtime, &store, &CountingDelegate::new());

        let reply = channel.dispatch(crate::channel::tags::INCREMENT_COUNT, None);
        assert_eq!(reply, Some(MessageReply::Success(None)));
        assert_eq!(store.counter().unwrap(), 1);
        assert_eq!(channel.set_count_values(), vec![0, 1]);
    }

    #[test]
    fn test_next_invokes_delegate_without_store_mutation() {
        let runtime = MockEngineRuntime::new();
        let store = Arc::new(CounterStore::new());
        let delegate = CountingDelegate::new();
        let (_binding, channel) = attached_binding(&runtime, &store, &delegate);

        let reply = channel.dispatch(crate::channel::tags::NEXT, None);
        assert_eq!(reply, Some(MessageReply::Success(None)));
        assert_eq!(delegate.calls(), 1);
        assert_eq!(store.counter().unwrap(), 0);
    }

    #[test]
    fn test_diagnostic_probe_acknowledges_with_no_side_effects() {
        let runtime = MockEngineRuntime::new();
        let store = Arc::new(CounterStore::new());
        let delegate = CountingDelegate::new();
        let (_binding, channel) = attached_binding(&runtime, &store, &delegate);

        let reply = channel.dispatch(crate::channel::tags::TEST, None);
        assert_eq!(reply, Some(MessageReply::Success(None)));
        assert_eq!(delegate.calls(), 0);
        assert_eq!(store.counter().unwrap(), 0);
        assert_eq!(channel.set_count_values(), vec![0]);
    }

    #[test]
    fn test_unknown_tag_is_not_implemented() {
        let runtime = MockEngineRuntime::new();
        let store = Arc::new(CounterStore::new());
        let delegate = CountingDelegate::new();
        let (_binding, channel) = attached_binding(&runtime, &store, &delegate);

        let reply = channel.dispatch("resetCount", Some(serde_json::json!(0)));
        assert_eq!(reply, Some(MessageReply::NotImplemented));
        assert_eq!(delegate.calls(), 0);
        assert_eq!(store.counter().unwrap(), 0);
        assert_eq!(channel.set_count_values(), vec![0]);
    }

    #[test]
    fn test_failed_attach_rolls_back_for_retry() {
        use crate::error::StoreError;

        struct PanickingObserver;

        impl CounterObserver for PanickingObserver {
            fn on_count_update(&self, _new_count: i64) {
                panic!("observer failure");
            }
        }

        let runtime = MockEngineRuntime::new();
        let store = Arc::new(CounterStore::new());
        store.add_observer(Arc::new(PanickingObserver)).unwrap();
        // Poison the store lock: the observer panics mid-notification.
        let poisoner = Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _ = poisoner.increment();
        })
        .join();

        let binding = EngineBindings::spawn(
            &runtime,
            Arc::clone(&store),
            CountingDelegate::new(),
            &EngineDescriptor::new("main"),
        )
        .unwrap();

        assert_eq!(
            binding.attach(),
            Err(BindingError::StoreFailure {
                source: StoreError::LockPoisoned
            })
        );
        // The phase rolled back, so the retry reports the store failure
        // again instead of AlreadyAttached.
        assert_eq!(
            binding.attach(),
            Err(BindingError::StoreFailure {
                source: StoreError::LockPoisoned
            })
        );
    }

    #[test]
    fn test_detach_clears_handler_observer_and_engine() {
        let runtime = MockEngineRuntime::new();
        let store = Arc::new(CounterStore::new());
        let (binding, channel) = attached_binding(&runtime, &store, &CountingDelegate::new());

        binding.detach().unwrap();

        assert!(!channel.has_handler());
        assert_eq!(store.observer_count().unwrap(), 0);
        assert!(runtime.last_engine().unwrap().is_shut_down());
        assert!(channel.dispatch(crate::channel::tags::INCREMENT_COUNT, None).is_none());
    }

    #[test]
    fn test_detach_twice_reports_detached() {
        let runtime = MockEngineRuntime::new();
        let store = Arc::new(CounterStore::new());
        let (binding, _) = attached_binding(&runtime, &store, &CountingDelegate::new());
        binding.detach().unwrap();
        assert_eq!(binding.detach(), Err(BindingError::Detached));
    }

    #[test]
    fn test_attach_after_detach_reports_detached() {
        let runtime = MockEngineRuntime::new();
        let store = Arc::new(CounterStore::new());
        let binding = EngineBindings::spawn(
            &runtime,
            Arc::clone(&store),
            CountingDelegate::new(),
            &EngineDescriptor::new("main"),
        )
        .unwrap();
        binding.detach().unwrap();

        assert_eq!(binding.attach(), Err(BindingError::Detached));
        assert!(runtime
            .last_engine()
            .unwrap()
            .channel(crate::channel::DEFAULT_CHANNEL)
            .is_none());
        assert_eq!(store.observer_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_deferred_attach_completes_after_delay() {
        let runtime = MockEngineRuntime::new();
        let store = Arc::new(CounterStore::new());
        let binding = EngineBindings::spawn(
            &runtime,
            Arc::clone(&store),
            CountingDelegate::new(),
            &EngineDescriptor::new("main"),
        )
        .unwrap();

        let handle = binding.attach_when_ready(Duration::from_millis(10));
        handle.await.unwrap();

        let channel = runtime
            .last_engine()
            .unwrap()
            .channel(crate::channel::DEFAULT_CHANNEL)
            .unwrap();
        assert!(channel.has_handler());
        assert_eq!(channel.set_count_values(), vec![0]);
    }

    #[tokio::test]
    async fn test_detach_before_deferred_attach_cancels_setup() {
        let runtime = MockEngineRuntime::new();
        let store = Arc::new(CounterStore::new());
        let binding = EngineBindings::spawn(
            &runtime,
            Arc::clone(&store),
            CountingDelegate::new(),
            &EngineDescriptor::new("main"),
        )
        .unwrap();

        let handle = binding.attach_when_ready(Duration::from_millis(10));
        binding.detach().unwrap();
        handle.await.unwrap();

        assert!(runtime
            .last_engine()
            .unwrap()
            .channel(crate::channel::DEFAULT_CHANNEL)
            .is_none());
        assert_eq!(store.observer_count().unwrap(), 0);
        assert!(runtime.last_engine().unwrap().is_shut_down());
    }

    #[tokio::test]
    async fn test_attach_on_explicit_readiness_signal() {
        let runtime = MockEngineRuntime::new();
        let store = Arc::new(CounterStore::new());
        let binding = EngineBindings::spawn(
            &runtime,
            Arc::clone(&store),
            CountingDelegate::new(),
            &EngineDescriptor::new("main"),
        )
        .unwrap();

        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = binding.attach_on(async move {
            let _ = ready_rx.await;
        });
        ready_tx.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(store.observer_count().unwrap(), 1);
    }
}
