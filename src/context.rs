// AppContext: Dependency Injection Container
//
// Owns the host engine runtime, the shared counter store, and the set of
// live bindings (one per UI surface). Replaces the global-singleton store
// with a single, testable ownership root.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::binding::{BindingDelegate, EngineBindings, ENGINE_READY_DELAY};
use crate::error::{log_binding_error, BindingError};
use crate::host::{EngineDescriptor, EngineRuntime};
use crate::store::CounterStore;

/// Application context for the counter binding layer
///
/// One context exists per process (or per surface group under test). It
/// wires each new binding to the shared store and schedules its deferred
/// attachment, and it tears every remaining binding down on shutdown.
///
/// `create_binding` schedules the deferred attach on the ambient tokio
/// runtime, so the context must be used from within one.
pub struct AppContext {
    runtime: Arc<dyn EngineRuntime>,
    store: Arc<CounterStore>,
    bindings: Mutex<Vec<Arc<EngineBindings>>>,
}

impl AppContext {
    /// Create a context with a fresh counter store.
    pub fn new(runtime: Arc<dyn EngineRuntime>) -> Self {
        Self::with_store(runtime, Arc::new(CounterStore::new()))
    }

    /// Create a context around an existing store.
    pub fn with_store(runtime: Arc<dyn EngineRuntime>, store: Arc<CounterStore>) -> Self {
        Self {
            runtime,
            store,
            bindings: Mutex::new(Vec::new()),
        }
    }

    /// The shared counter store.
    pub fn store(&self) -> &Arc<CounterStore> {
        &self.store
    }

    /// Safely acquire the bindings list lock
    fn lock_bindings(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, Vec<Arc<EngineBindings>>>, BindingError> {
        self.bindings.lock().map_err(|_| BindingError::LockPoisoned {
            component: "bindings".to_string(),
        })
    }

    /// Spawn a binding for a new UI surface
    ///
    /// Spawns the engine instance, schedules attachment after
    /// [`ENGINE_READY_DELAY`], and tracks the binding for shutdown. The
    /// returned binding is usually still unattached when this returns.
    ///
    /// # Errors
    /// - `BindingError::EngineSpawnFailed` if the host runtime rejects the
    ///   descriptor
    /// - `BindingError::LockPoisoned` on the bindings list
    pub fn create_binding(
        &self,
        delegate: Arc<dyn BindingDelegate>,
        descriptor: &EngineDescriptor,
    ) -> Result<Arc<EngineBindings>, BindingError> {
        let binding = EngineBindings::spawn(
            self.runtime.as_ref(),
            Arc::clone(&self.store),
            delegate,
            descriptor,
        )?;
        let _ = binding.attach_when_ready(ENGINE_READY_DELAY);
        self.lock_bindings()
            .map_err(|err| {
                log_binding_error(&err, "create_binding");
                err
            })?
            .push(Arc::clone(&binding));
        debug!(entrypoint = %descriptor.entrypoint, "binding created");
        Ok(binding)
    }

    /// Detach a binding and drop it from the tracked set
    ///
    /// # Errors
    /// - `BindingError::Detached` if the binding was already detached
    /// - `BindingError::LockPoisoned` on the bindings list
    pub fn detach_binding(&self, binding: &Arc<EngineBindings>) -> Result<(), BindingError> {
        binding.detach()?;
        self.lock_bindings()?
            .retain(|tracked| !Arc::ptr_eq(tracked, binding));
        Ok(())
    }

    /// Number of currently tracked bindings.
    pub fn binding_count(&self) -> Result<usize, BindingError> {
        Ok(self.lock_bindings()?.len())
    }

    /// Detach every remaining binding
    ///
    /// Application teardown path. Individual detach failures are logged and
    /// do not stop the sweep.
    pub fn shutdown(&self) -> Result<(), BindingError> {
        let bindings = {
            let mut guard = self.lock_bindings().map_err(|err| {
                log_binding_error(&err, "shutdown");
                err
            })?;
            std::mem::take(&mut *guard)
        };
        for binding in bindings {
            if let Err(err) = binding.detach() {
                log_binding_error(&err, "shutdown");
            }
        }
        Ok(())
    }
}
