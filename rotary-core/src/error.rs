use thiserror::Error;

/// All errors produced by rotary-core.
#[derive(Debug, Error)]
pub enum PhoneError {
    #[error("provider initialization failed: {0}")]
    ProviderInit(String),

    #[error("call operation failed: {0}")]
    CallOperation(String),

    #[error("hook sensor read failed: {0}")]
    HardwareRead(String),

    #[error("ringer actuation failed: {0}")]
    Ringer(String),

    #[error("speech recognition error: {0}")]
    Recognition(String),

    #[error("prompt playback error: {0}")]
    Playback(String),

    #[error("directory line {line}: {reason}")]
    Directory { line: usize, reason: String },

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PhoneError>;
