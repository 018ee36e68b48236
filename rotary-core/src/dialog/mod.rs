//! Voice dialog: turn-taking loop that turns speech into a number to dial.
//!
//! ```text
//!   ┌──────────► greeting (waited) / apology ──► listen (listen_window)
//!   │                                               │
//!   │          unrecognized / unknown contact ◄─────┤
//!   │                                               │ dial … / call …
//!   │                                               ▼
//!   └── declined ◄── "dialing …" / "calling …" ──► listen (confirm_window)
//!                                                   │ silence
//!                                                   ▼
//!                                            "call placed" → number
//! ```
//!
//! "stop" at any point ends the dialog without a number. The loop runs on the
//! caller's thread; [`DialogEngine::stop_talking`] may be called from any
//! other thread to cut it short.

pub mod gate;
pub mod grammar;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::directory::Directory;
use crate::error::Result;
use crate::prompt::{Prompt, PromptPlayer};
use crate::speech::{RecognitionListener, SpeechRecognizer};
use crate::sync::CancelToken;

pub use gate::UtteranceGate;
pub use grammar::{DialogOutcome, Heard};

#[derive(Debug, Clone)]
pub struct DialogConfig {
    /// How long to listen for a command each turn.
    pub listen_window: Duration,
    /// How long to listen for "no" after reading the target back.
    pub confirm_window: Duration,
    /// Upper bound on a waited prompt.
    pub playback_timeout: Duration,
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            listen_window: Duration::from_secs(3),
            confirm_window: Duration::from_secs(2),
            playback_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Confirmation {
    Confirmed,
    Declined,
    Aborted,
}

pub struct DialogEngine {
    config: DialogConfig,
    recognizer: Arc<dyn SpeechRecognizer>,
    prompts: Arc<dyn PromptPlayer>,
    directory: Arc<Directory>,
    gate: Arc<UtteranceGate>,
    active: Mutex<Option<CancelToken>>,
    run_lock: Mutex<()>,
}

impl DialogEngine {
    /// Installs the utterance gate as the recognizer's listener.
    pub fn new(
        config: DialogConfig,
        recognizer: Arc<dyn SpeechRecognizer>,
        prompts: Arc<dyn PromptPlayer>,
        directory: Arc<Directory>,
    ) -> Self {
        let gate = Arc::new(UtteranceGate::new());
        recognizer.set_listener(Arc::clone(&gate) as Arc<dyn RecognitionListener>);
        Self {
            config,
            recognizer,
            prompts,
            directory,
            gate,
            active: Mutex::new(None),
            run_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &DialogConfig {
        &self.config
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// # Errors
    /// Propagates the recognizer's initialization failure.
    pub fn initialize(&self) -> Result<()> {
        self.recognizer.initialize()
    }

    pub fn is_talking(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Run the dialog until a number is resolved, "stop" is heard, or
    /// `cancel` fires. Only one dialog runs at a time; a second caller blocks
    /// until the first returns.
    pub fn ask_phone_number(&self, cancel: &CancelToken) -> Option<String> {
        let _running = self.run_lock.lock();
        *self.active.lock() = Some(cancel.clone());

        let result = self.run_turns(cancel);

        self.active.lock().take();
        self.recognizer.stop_listening(false);

        match result {
            Ok(number) => number,
            Err(e) => {
                error!(error = %e, "dialog aborted");
                None
            }
        }
    }

    /// Cancel the running dialog and silence microphone and speaker.
    pub fn stop_talking(&self) {
        let token = self.active.lock().clone();
        if let Some(token) = token {
            debug!("stopping dialog");
            token.cancel();
        }
        self.gate.interrupt();
        self.recognizer.stop_listening(false);
        self.prompts.stop();
    }

    pub fn announce_call_finished(&self) {
        self.say(&Prompt::Terminated, false);
    }

    fn run_turns(&self, cancel: &CancelToken) -> Result<Option<String>> {
        let mut apologize = false;
        let mut turn = 0u32;

        while !cancel.is_cancelled() {
            turn += 1;
            if apologize {
                self.say(&Prompt::Apology, false);
            } else {
                self.say(&Prompt::Greeting, true);
            }
            apologize = false;

            let heard = self.listen(self.config.listen_window, cancel)?;
            if cancel.is_cancelled() {
                break;
            }
            let outcome = heard.outcome();
            debug!(turn, ?outcome, "dialog turn");

            match outcome {
                DialogOutcome::Stop => {
                    info!("dialog stopped by caller");
                    return Ok(None);
                }
                DialogOutcome::Number(digits) => {
                    match self.confirm(Prompt::Dialing(digits.clone()), cancel)? {
                        Confirmation::Confirmed => {
                            self.say(&Prompt::Placed, true);
                            info!(number = %digits, "number resolved");
                            return Ok(Some(digits));
                        }
                        Confirmation::Declined => self.say(&Prompt::Terminated, true),
                        Confirmation::Aborted => return Ok(None),
                    }
                }
                DialogOutcome::Person(name) => {
                    let Some(number) = self.directory.lookup(&name).map(str::to_string) else {
                        info!(%name, "unknown contact");
                        apologize = true;
                        self.end_turn();
                        continue;
                    };
                    match self.confirm(Prompt::Calling(name.clone()), cancel)? {
                        Confirmation::Confirmed => {
                            self.say(&Prompt::Placed, true);
                            info!(%name, number = %number, "contact resolved");
                            return Ok(Some(number));
                        }
                        Confirmation::Declined => self.say(&Prompt::Terminated, true),
                        Confirmation::Aborted => return Ok(None),
                    }
                }
                DialogOutcome::None => apologize = true,
            }
            self.end_turn();
        }

        debug!("dialog cancelled");
        Ok(None)
    }

    /// Read the target back and listen for an objection. Silence confirms.
    fn confirm(&self, readback: Prompt, cancel: &CancelToken) -> Result<Confirmation> {
        self.say(&readback, true);
        let heard = self.listen(self.config.confirm_window, cancel)?;
        if cancel.is_cancelled() || heard.stop {
            return Ok(Confirmation::Aborted);
        }
        if heard.negative {
            info!(%readback, "confirmation declined");
            return Ok(Confirmation::Declined);
        }
        Ok(Confirmation::Confirmed)
    }

    fn listen(&self, window: Duration, cancel: &CancelToken) -> Result<Heard> {
        self.gate.arm();
        self.recognizer.start_listening()?;
        self.gate.wait(window, cancel);
        // Finalizing may deliver one more hypothesis; the gate is still armed.
        self.recognizer.stop_listening(true);
        Ok(self.gate.take())
    }

    fn end_turn(&self) {
        self.prompts.stop();
        self.recognizer.stop_listening(false);
    }

    fn say(&self, prompt: &Prompt, wait: bool) {
        let limit = wait.then_some(self.config.playback_timeout);
        if let Err(e) = self.prompts.play(prompt, limit) {
            warn!(%prompt, error = %e, "prompt playback failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::RecordingPrompter;
    use crate::speech::{Scripted, ScriptedRecognizer};
    use std::thread;
    use std::time::Instant;

    fn fast_config() -> DialogConfig {
        DialogConfig {
            listen_window: Duration::from_millis(80),
            confirm_window: Duration::from_millis(40),
            playback_timeout: Duration::from_millis(10),
        }
    }

    fn engine(
        script: Vec<Scripted>,
        directory: Directory,
    ) -> (DialogEngine, Arc<ScriptedRecognizer>, Arc<RecordingPrompter>) {
        let recognizer = Arc::new(ScriptedRecognizer::with_script(script));
        let prompts = Arc::new(RecordingPrompter::new());
        let engine = DialogEngine::new(
            fast_config(),
            Arc::clone(&recognizer) as Arc<dyn SpeechRecognizer>,
            Arc::clone(&prompts) as Arc<dyn PromptPlayer>,
            Arc::new(directory),
        );
        (engine, recognizer, prompts)
    }

    fn alice() -> Directory {
        Directory::from_entries([("alice", "+15551234")])
    }

    #[test]
    fn known_contact_with_silent_confirmation_resolves() {
        let (engine, _, prompts) = engine(
            vec![Scripted::say("call alice"), Scripted::Silence],
            alice(),
        );
        let number = engine.ask_phone_number(&CancelToken::new());
        assert_eq!(number.as_deref(), Some("+15551234"));
        assert_eq!(
            prompts.played(),
            vec![
                Prompt::Greeting,
                Prompt::Calling("alice".into()),
                Prompt::Placed
            ]
        );
    }

    #[test]
    fn declined_number_retries_with_greeting() {
        let (engine, _, prompts) = engine(
            vec![
                Scripted::say("dial one two three"),
                Scripted::say("no"),
                Scripted::say("stop"),
            ],
            Directory::new(),
        );
        assert_eq!(engine.ask_phone_number(&CancelToken::new()), None);
        assert_eq!(
            prompts.played(),
            vec![
                Prompt::Greeting,
                Prompt::Dialing("123".into()),
                Prompt::Terminated,
                Prompt::Greeting,
            ]
        );
        assert_eq!(prompts.count(&Prompt::Placed), 0);
    }

    #[test]
    fn declined_then_second_number_resolves() {
        let (engine, _, _) = engine(
            vec![
                Scripted::say("dial one two three"),
                Scripted::say("no"),
                Scripted::say("dial four five"),
                Scripted::Silence,
            ],
            Directory::new(),
        );
        assert_eq!(
            engine.ask_phone_number(&CancelToken::new()).as_deref(),
            Some("45")
        );
    }

    #[test]
    fn unknown_contact_apologizes() {
        let (engine, _, prompts) = engine(
            vec![Scripted::say("call bob"), Scripted::say("stop")],
            alice(),
        );
        assert_eq!(engine.ask_phone_number(&CancelToken::new()), None);
        assert_eq!(prompts.played(), vec![Prompt::Greeting, Prompt::Apology]);
    }

    #[test]
    fn silence_and_recognizer_errors_apologize() {
        let (engine, _, prompts) = engine(
            vec![
                Scripted::Silence,
                Scripted::Error("decoder-overrun".into()),
                Scripted::say("stop"),
            ],
            Directory::new(),
        );
        assert_eq!(engine.ask_phone_number(&CancelToken::new()), None);
        assert_eq!(
            prompts.played(),
            vec![Prompt::Greeting, Prompt::Apology, Prompt::Apology]
        );
    }

    #[test]
    fn stop_during_confirmation_aborts() {
        let (engine, _, prompts) = engine(
            vec![Scripted::say("dial nine"), Scripted::say("stop")],
            Directory::new(),
        );
        assert_eq!(engine.ask_phone_number(&CancelToken::new()), None);
        assert_eq!(prompts.count(&Prompt::Placed), 0);
    }

    #[test]
    fn failed_microphone_ends_dialog() {
        let (engine, recognizer, _) = engine(vec![], Directory::new());
        recognizer.fail_start(true);
        assert_eq!(engine.ask_phone_number(&CancelToken::new()), None);
        assert!(!engine.is_talking());
    }

    #[test]
    fn pre_cancelled_token_returns_immediately() {
        let (engine, recognizer, prompts) = engine(vec![], Directory::new());
        let token = CancelToken::new();
        token.cancel();
        assert_eq!(engine.ask_phone_number(&token), None);
        assert_eq!(recognizer.sessions(), 0);
        assert!(prompts.played().is_empty());
    }

    #[test]
    fn stop_talking_unblocks_a_listening_dialog() {
        let recognizer = Arc::new(ScriptedRecognizer::new());
        let prompts = Arc::new(RecordingPrompter::new());
        let engine = Arc::new(DialogEngine::new(
            DialogConfig {
                listen_window: Duration::from_secs(10),
                ..fast_config()
            },
            recognizer as Arc<dyn SpeechRecognizer>,
            Arc::clone(&prompts) as Arc<dyn PromptPlayer>,
            Arc::new(Directory::new()),
        ));

        let stopper = Arc::clone(&engine);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(60));
            stopper.stop_talking();
        });

        let started = Instant::now();
        assert_eq!(engine.ask_phone_number(&CancelToken::new()), None);
        assert!(started.elapsed() < Duration::from_secs(2));
        handle.join().unwrap();
        assert!(prompts.stops() >= 1);
    }

    #[test]
    fn announce_does_not_need_a_running_dialog() {
        let (engine, _, prompts) = engine(vec![], Directory::new());
        engine.announce_call_finished();
        assert_eq!(prompts.played(), vec![Prompt::Terminated]);
    }
}
