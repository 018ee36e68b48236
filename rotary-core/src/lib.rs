//! # rotary-core
//!
//! Orchestration engine for a vintage rotary handset converted to a VoIP
//! phone with voice dialing.
//!
//! ## Architecture
//!
//! ```text
//! HardwareProvider ─► RingCoordinator ──(hook edges, ring ticks)──┐
//!                                                                 │
//! CallProvider ─────► CallCoordinator ──(incoming, status)────────┼─► PhoneEngine worker
//!                                                                 │        │
//! SpeechRecognizer ─► DialogEngine ◄──(dialog thread)─────────────┘        │
//! PromptPlayer ─────┘                                                      ▼
//!                                                         StatusEvent ─► observers / broadcast
//! ```
//!
//! Lift the handset with no incoming call and the operator voice asks who to
//! call ("call alice", "dial five five five one two"). Lift it while the bell
//! rings and the pending call is answered. Hang up and everything stops.
//!
//! Every collaborator is a trait; simulated implementations ship in the
//! `stub` submodules for tests and the console bench.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod dialog;
pub mod directory;
pub mod engine;
pub mod error;
pub mod events;
pub mod hardware;
pub mod observer;
pub mod phone;
pub mod prompt;
pub mod speech;
pub mod sync;

// Convenience re-exports for downstream crates
pub use dialog::{DialogConfig, DialogEngine, DialogOutcome};
pub use directory::Directory;
pub use engine::{Collaborators, EngineConfig, PhoneEngine};
pub use error::{PhoneError, Result};
pub use events::{LifecycleState, StatusEvent, StatusObserver};
pub use hardware::{
    HardwareProvider, HookState, NoopPower, PowerControl, RingConfig, RingCoordinator,
    SimulatedHardware,
};
pub use observer::{ObserverRegistry, SubscriptionId};
pub use phone::{
    Call, CallAnswer, CallCoordinator, CallId, CallListener, CallProvider, CallStatus,
    LoopbackProvider,
};
pub use prompt::{Prompt, PromptPlayer, RecordingPrompter};
pub use speech::{RecognitionListener, Scripted, ScriptedRecognizer, SpeechRecognizer};
pub use sync::CancelToken;
