//! Speech recognition abstraction.
//!
//! The `SpeechRecognizer` trait decouples the dialog from any specific decoder
//! (PocketSphinx, a cloud service, a console feed). Recognizers push hypotheses
//! into a [`RecognitionListener`] from their own threads.

pub mod stub;

use std::sync::Arc;

use crate::error::Result;

pub use stub::{Scripted, ScriptedRecognizer};

/// Receives hypotheses. Implementations must be cheap and non-blocking.
pub trait RecognitionListener: Send + Sync {
    /// Streaming hypothesis; may be refined later.
    fn partial_result(&self, text: &str);
    /// Committed hypothesis for the utterance.
    fn final_result(&self, text: &str);
    fn error(&self, code: &str);
}

/// Contract for speech-to-text backends.
pub trait SpeechRecognizer: Send + Sync + 'static {
    /// Load models and open the capture device.
    fn initialize(&self) -> Result<()>;

    /// Begin an utterance. Idempotent while already listening.
    fn start_listening(&self) -> Result<()>;

    /// End the utterance. With `finalize` the decoder flushes a final
    /// hypothesis to the listener before returning.
    fn stop_listening(&self, finalize: bool);

    fn set_listener(&self, listener: Arc<dyn RecognitionListener>);
}
