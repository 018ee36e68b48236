//! Spoken prompts played by the operator voice.

pub mod stub;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use stub::RecordingPrompter;

/// Every phrase the operator can say.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum Prompt {
    Greeting,
    Apology,
    /// "Dialing <number>".
    Dialing(String),
    /// "Call placed".
    Placed,
    /// "Call terminated" / "call finished".
    Terminated,
    /// "Calling <name>".
    Calling(String),
}

impl std::fmt::Display for Prompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Prompt::Greeting => f.write_str("greeting"),
            Prompt::Apology => f.write_str("apology"),
            Prompt::Dialing(number) => write!(f, "dialing {number}"),
            Prompt::Placed => f.write_str("call placed"),
            Prompt::Terminated => f.write_str("call terminated"),
            Prompt::Calling(name) => write!(f, "calling {name}"),
        }
    }
}

/// Contract for prompt playback.
pub trait PromptPlayer: Send + Sync + 'static {
    /// Start playing `prompt`. With `wait = Some(limit)` block until playback
    /// completes, [`PromptPlayer::stop`] is called, or `limit` elapses.
    fn play(&self, prompt: &Prompt, wait: Option<Duration>) -> Result<()>;

    /// Cut off current playback and release any waiter.
    fn stop(&self);
}
