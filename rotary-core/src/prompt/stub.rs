//! `RecordingPrompter`: remembers every prompt instead of playing audio.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use super::{Prompt, PromptPlayer};
use crate::error::Result;

#[derive(Debug, Default)]
pub struct RecordingPrompter {
    played: Mutex<Vec<Prompt>>,
    stops: AtomicUsize,
}

impl RecordingPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn played(&self) -> Vec<Prompt> {
        self.played.lock().clone()
    }

    pub fn count(&self, prompt: &Prompt) -> usize {
        self.played.lock().iter().filter(|p| *p == prompt).count()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl PromptPlayer for RecordingPrompter {
    fn play(&self, prompt: &Prompt, wait: Option<Duration>) -> Result<()> {
        debug!(%prompt, waited = wait.is_some(), "prompt recorded");
        self.played.lock().push(prompt.clone());
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}
