//! `PhoneEngine`: top-level lifecycle orchestrator.
//!
//! ## Lifecycle
//!
//! ```text
//! PhoneEngine::new()
//!     └─► start()      → hardware, call provider, recognizer initialized,
//!         │              hook sampler + ring loop running, state = OnHook
//!         └─► shutdown() → threads joined, provider shut down
//! ```
//!
//! ## Threading
//!
//! ```text
//! hook sampler ─► hook dispatch ─┐
//! provider callbacks ────────────┼─► crossbeam channel ─► rotary-lifecycle worker
//! ring loop (tick / expired) ────┤                              │   │
//! rotary-dialog worker ──────────┘ ◄── dialog requests ─────────┘   ▼
//!                                             StatusHub ─► observers + broadcast
//! ```
//!
//! The worker is the only thread that changes lifecycle state, so transitions
//! never interleave.

mod status;
mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use self::status::StatusHub;
use self::worker::{DialogRunner, LifecycleEvent, Worker};
use crate::dialog::{DialogConfig, DialogEngine};
use crate::directory::Directory;
use crate::error::{PhoneError, Result};
use crate::events::{LifecycleState, StatusEvent, StatusObserver};
use crate::hardware::{HardwareProvider, HookState, PowerControl, RingConfig, RingCoordinator};
use crate::observer::SubscriptionId;
use crate::phone::{Call, CallCoordinator, CallListener, CallProvider};
use crate::prompt::PromptPlayer;
use crate::speech::SpeechRecognizer;

/// Configuration for `PhoneEngine`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub ring: RingConfig,
    pub dialog: DialogConfig,
    /// Pause between lifting the receiver and the greeting, so the handset
    /// reaches the ear first. Default: 1 s.
    pub settle_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ring: RingConfig::default(),
            dialog: DialogConfig::default(),
            settle_delay: Duration::from_secs(1),
        }
    }
}

/// External collaborators the engine drives.
#[derive(Clone)]
pub struct Collaborators {
    pub hardware: Arc<dyn HardwareProvider>,
    pub provider: Arc<dyn CallProvider>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub prompts: Arc<dyn PromptPlayer>,
    pub power: Arc<dyn PowerControl>,
    pub directory: Arc<Directory>,
}

/// State shared between the engine handle and its worker.
pub(crate) struct EngineShared {
    pub(crate) config: EngineConfig,
    pub(crate) ring: RingCoordinator,
    pub(crate) calls: CallCoordinator,
    pub(crate) dialog: Arc<DialogEngine>,
    pub(crate) power: Arc<dyn PowerControl>,
    pub(crate) status: StatusHub,
}

/// Forwards provider callbacks onto the worker queue.
struct CallEventForwarder {
    tx: Sender<LifecycleEvent>,
}

impl CallListener for CallEventForwarder {
    fn incoming_call_received(&self, call: &Call) {
        let _ = self.tx.send(LifecycleEvent::IncomingCall(call.clone()));
    }

    fn call_status_changed(&self, call: &Call) {
        let _ = self.tx.send(LifecycleEvent::CallStatus(call.clone()));
    }
}

/// The top-level engine handle.
///
/// `PhoneEngine` is `Send + Sync`; wrap it in `Arc` to share it with status
/// forwarding tasks.
pub struct PhoneEngine {
    shared: Arc<EngineShared>,
    hardware: Arc<dyn HardwareProvider>,
    tx: Sender<LifecycleEvent>,
    worker: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    call_subscription: Mutex<Option<SubscriptionId>>,
}

impl PhoneEngine {
    /// Build the engine and spawn its lifecycle worker. Nothing touches the
    /// hardware or the network until [`PhoneEngine::start`].
    ///
    /// # Errors
    /// `PhoneError::Io` if the worker threads cannot be spawned.
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Result<Self> {
        let Collaborators {
            hardware,
            provider,
            recognizer,
            prompts,
            power,
            directory,
        } = collaborators;

        let dialog = Arc::new(DialogEngine::new(
            config.dialog.clone(),
            recognizer,
            prompts,
            directory,
        ));
        let shared = Arc::new(EngineShared {
            ring: RingCoordinator::new(config.ring.clone()),
            calls: CallCoordinator::new(provider),
            dialog,
            power,
            status: StatusHub::new(),
            config,
        });

        let (tx, rx) = crossbeam_channel::unbounded();
        let dialogs = DialogRunner::spawn(
            Arc::clone(&shared.dialog),
            shared.config.settle_delay,
            tx.clone(),
        )?;
        let worker = Worker::new(Arc::clone(&shared), tx.clone(), dialogs);
        let handle = thread::Builder::new()
            .name("rotary-lifecycle".into())
            .spawn(move || worker.run(rx))?;

        Ok(Self {
            shared,
            hardware,
            tx,
            worker: Mutex::new(Some(handle)),
            started: AtomicBool::new(false),
            call_subscription: Mutex::new(None),
        })
    }

    /// Initialize every collaborator and begin watching the hook.
    ///
    /// # Errors
    /// - `PhoneError::AlreadyRunning` if called twice.
    /// - `PhoneError::ProviderInit` if any collaborator fails to initialize;
    ///   the engine then stays in [`LifecycleState::Failed`].
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(PhoneError::AlreadyRunning);
        }
        self.shared
            .status
            .publish("Initializing phone...", LifecycleState::Initializing);

        if let Err(e) = self.initialize_collaborators() {
            error!(error = %e, "initialization failed");
            self.shared
                .status
                .publish("Initialization failed", LifecycleState::Failed);
            return Err(match e {
                PhoneError::ProviderInit(reason) => PhoneError::ProviderInit(reason),
                other => PhoneError::ProviderInit(other.to_string()),
            });
        }

        let forwarder = Arc::new(CallEventForwarder {
            tx: self.tx.clone(),
        });
        *self.call_subscription.lock() = Some(self.shared.calls.add_listener(forwarder));

        let hook_tx = self.tx.clone();
        self.shared.ring.set_hook_listener(Arc::new(move |state: HookState| {
            let _ = hook_tx.send(LifecycleEvent::Hook(state));
        }));
        // Published before sampling starts so a lifted handset's first edge
        // lands after it.
        self.shared
            .status
            .publish("Phone On Hook", LifecycleState::OnHook);
        self.shared.ring.start(Arc::clone(&self.hardware))?;
        info!("phone engine started");
        Ok(())
    }

    fn initialize_collaborators(&self) -> Result<()> {
        self.hardware.initialize()?;
        self.shared.calls.initialize()?;
        self.shared.dialog.initialize()?;
        Ok(())
    }

    /// Stop sampling and ringing, end any dialog, join all threads and shut
    /// the call provider down. Idempotent.
    pub fn shutdown(&self) {
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        debug!("phone engine shutting down");

        self.shared.ring.shutdown();
        if let Some(id) = self.call_subscription.lock().take() {
            self.shared.calls.remove_listener(id);
        }
        self.shared.dialog.stop_talking();

        let _ = self.tx.send(LifecycleEvent::Shutdown);
        if handle.join().is_err() {
            warn!("lifecycle worker panicked");
        }

        if self.started.load(Ordering::SeqCst) && self.state() != LifecycleState::Failed {
            self.shared.calls.terminate_active_call();
            self.shared.calls.shutdown();
            self.shared.power.release_foreground();
        }
        info!("phone engine stopped");
    }

    /// Current lifecycle state (snapshot).
    pub fn state(&self) -> LifecycleState {
        self.shared.status.state()
    }

    /// Most recently published status, if any.
    pub fn latest_status(&self) -> Option<StatusEvent> {
        self.shared.status.latest()
    }

    /// Subscribe to status events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.shared.status.subscribe()
    }

    /// Register an observer. It immediately receives the latest status.
    pub fn add_status_observer(&self, observer: Arc<dyn StatusObserver>) -> SubscriptionId {
        self.shared.status.add_observer(observer)
    }

    pub fn remove_status_observer(&self, id: SubscriptionId) -> bool {
        self.shared.status.remove_observer(id)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn calls(&self) -> &CallCoordinator {
        &self.shared.calls
    }

    pub fn ring(&self) -> &RingCoordinator {
        &self.shared.ring
    }

    pub fn dialog(&self) -> &DialogEngine {
        &self.shared.dialog
    }
}

impl Drop for PhoneEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
