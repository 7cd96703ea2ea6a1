// Counter Bindings - embedded-engine binding layer
// Binds isolated UI-engine instances to a shared counter data model over a
// named message channel.

// Module declarations
pub mod binding;
pub mod channel;
pub mod context;
pub mod error;
pub mod host;
pub mod store;

// Re-exports for convenience
pub use binding::{BindingDelegate, EngineBindings, ENGINE_READY_DELAY};
pub use channel::{InboundMessage, MessageReply, MethodCall, OutboundMessage};
pub use context::AppContext;
pub use error::{BindingError, ErrorCode, StoreError};
pub use host::{EngineDescriptor, EngineInstance, EngineRuntime, MessageChannel};
pub use store::{CounterObserver, CounterStore, ObserverId};

use log::info;
use once_cell::sync::OnceCell;

cfg_if::cfg_if! {
    if #[cfg(target_os = "android")] {
        fn init_subscriber() {
            use tracing_subscriber::layer::SubscriberExt;
            use tracing_subscriber::util::SubscriberInitExt;

            if let Ok(layer) = tracing_android::layer("CounterBindings") {
                let _ = tracing_subscriber::registry().with(layer).try_init();
            }
        }
    } else {
        fn init_subscriber() {
            let _ = tracing_subscriber::fmt()
                .with_max_level(tracing::Level::DEBUG)
                .try_init();
        }
    }
}

/// Initialize logging for the crate
///
/// Android logs through the platform log buffer (logcat); everywhere else a
/// fmt subscriber writes to stderr. Safe to call more than once.
pub fn init_logging() {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_init(|| {
        init_subscriber();
        info!("counter bindings logging initialized");
    });
}

/// JNI_OnLoad is called when the native library is loaded by Android.
/// Logging has to be live before any binding is constructed, so it is
/// initialized here rather than lazily.
#[cfg(target_os = "android")]
#[no_mangle]
pub extern "system" fn JNI_OnLoad(
    _vm: jni::JavaVM,
    _reserved: *mut std::ffi::c_void,
) -> jni::sys::jint {
    init_logging();
    info!("counter bindings library loaded");
    jni::sys::JNI_VERSION_1_6
}
