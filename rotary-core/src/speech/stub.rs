//! `ScriptedRecognizer`: deterministic recognizer for tests and the bench.
//!
//! Each `start_listening()` consumes one [`Scripted`] line. A `Say` line is
//! delivered to the listener as a final hypothesis immediately; `Silence`
//! delivers nothing so the caller's listening window runs out. Text can also
//! be injected at any time with [`ScriptedRecognizer::say`], which is how the
//! console bench feeds typed utterances.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::{RecognitionListener, SpeechRecognizer};
use crate::error::{PhoneError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    Say(String),
    Silence,
    Error(String),
}

impl Scripted {
    pub fn say(text: &str) -> Self {
        Scripted::Say(text.to_string())
    }
}

#[derive(Default)]
pub struct ScriptedRecognizer {
    listener: RwLock<Option<Arc<dyn RecognitionListener>>>,
    script: Mutex<VecDeque<Scripted>>,
    listening: AtomicBool,
    sessions: AtomicUsize,
    fail_start: AtomicBool,
}

impl ScriptedRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(lines: impl IntoIterator<Item = Scripted>) -> Self {
        let recognizer = Self::new();
        recognizer.script.lock().extend(lines);
        recognizer
    }

    pub fn push(&self, line: Scripted) {
        self.script.lock().push_back(line);
    }

    /// Deliver `text` as a final hypothesis if a listening session is open.
    /// Returns `false` (and drops the text) otherwise.
    pub fn say(&self, text: &str) -> bool {
        if !self.is_listening() {
            debug!(text, "utterance dropped, not listening");
            return false;
        }
        self.deliver(&Scripted::Say(text.to_string()));
        true
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Listening sessions opened so far.
    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    pub fn fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    fn deliver(&self, line: &Scripted) {
        let Some(listener) = self.listener.read().clone() else {
            return;
        };
        match line {
            Scripted::Say(text) => {
                listener.partial_result(text);
                listener.final_result(text);
            }
            Scripted::Error(code) => listener.error(code),
            Scripted::Silence => {}
        }
    }
}

impl SpeechRecognizer for ScriptedRecognizer {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    fn start_listening(&self) -> Result<()> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(PhoneError::Recognition("capture device unavailable".into()));
        }
        if self.listening.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.sessions.fetch_add(1, Ordering::SeqCst);
        let line = self.script.lock().pop_front();
        if let Some(line) = line {
            self.deliver(&line);
        }
        Ok(())
    }

    fn stop_listening(&self, _finalize: bool) {
        self.listening.store(false, Ordering::SeqCst);
    }

    fn set_listener(&self, listener: Arc<dyn RecognitionListener>) {
        *self.listener.write() = Some(listener);
    }
}
