//! Call provider abstraction.
//!
//! The `CallProvider` trait decouples the lifecycle from any specific SIP stack.
//! Providers report events through a single [`CallListener`]; the
//! [`coordinator::CallCoordinator`] installs itself as that listener, keeps the
//! active/pending slots, and re-broadcasts to its own subscribers.

pub mod coordinator;
pub mod stub;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

pub use coordinator::CallCoordinator;
pub use stub::LoopbackProvider;

/// Unique call identifier, generated when the call object is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(Uuid);

impl CallId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CallStatus {
    /// Ringing up the remote number.
    Ringing,
    /// Conversation in progress.
    Active,
    /// Incoming call not yet picked up.
    Pending,
    /// Remote line busy.
    Busy,
    Failed,
    Finished,
}

impl CallStatus {
    /// `Failed` and `Finished` end a call; its slot is released.
    pub fn is_terminal(self) -> bool {
        matches!(self, CallStatus::Failed | CallStatus::Finished)
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CallStatus::Ringing => "RINGING",
            CallStatus::Active => "ACTIVE",
            CallStatus::Pending => "PENDING",
            CallStatus::Busy => "BUSY",
            CallStatus::Failed => "FAILED",
            CallStatus::Finished => "FINISHED",
        };
        f.write_str(s)
    }
}

/// Snapshot of a placed or received call.
///
/// Providers hand out a fresh snapshot with every status change; identity is
/// carried by `id`, never by the snapshot itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub id: CallId,
    /// Party that started the call.
    pub caller: String,
    /// Party being called.
    pub callee: String,
    pub status: CallStatus,
}

impl Call {
    pub fn new(caller: impl Into<String>, callee: impl Into<String>, status: CallStatus) -> Self {
        Self {
            id: CallId::new(),
            caller: caller.into(),
            callee: callee.into(),
            status,
        }
    }

    /// Same call, new status.
    pub fn with_status(&self, status: CallStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    pub fn same_call(&self, other: &Call) -> bool {
        self.id == other.id
    }
}

/// Response published to an incoming call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallAnswer {
    /// Pick up.
    Accept,
    /// Provisional "ringing" indication to the caller.
    Provisional,
    /// Decline; the caller hears busy.
    Reject,
}

/// Receives provider events. Called on the provider's callback thread.
pub trait CallListener: Send + Sync {
    fn incoming_call_received(&self, call: &Call);
    fn call_status_changed(&self, call: &Call);
}

/// Contract for SIP call backends.
pub trait CallProvider: Send + Sync + 'static {
    /// Register with the service and bring up the media stack.
    fn initialize(&self) -> Result<()>;

    fn shutdown(&self);

    /// Request an outbound call. Number format is `+CountryRegionLocal`.
    fn place_call(&self, number: &str) -> Result<Call>;

    fn hangup_call(&self, call: &Call) -> Result<()>;

    fn answer_call(&self, call: &Call, answer: CallAnswer) -> Result<()>;

    /// Install the (single) event listener.
    fn set_listener(&self, listener: std::sync::Arc<dyn CallListener>);
}
