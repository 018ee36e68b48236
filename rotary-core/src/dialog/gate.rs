//! One-shot gate between recognizer callbacks and the dialog thread.
//!
//! The dialog arms the gate, opens the microphone and blocks in
//! [`UtteranceGate::wait`]. The first hypothesis that matches a phrase
//! releases the waiter. Results arriving while the gate is disarmed are
//! dropped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use super::grammar::Heard;
use crate::speech::RecognitionListener;
use crate::sync::CancelToken;

#[derive(Debug, Default)]
struct GateState {
    armed: bool,
    released: bool,
    interrupted: bool,
    heard: Heard,
}

#[derive(Debug, Default)]
struct GateInner {
    state: Mutex<GateState>,
    cv: Condvar,
}

#[derive(Debug, Default)]
pub struct UtteranceGate {
    inner: Arc<GateInner>,
}

impl UtteranceGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear previous results and start accepting hypotheses.
    pub fn arm(&self) {
        let mut state = self.inner.state.lock();
        *state = GateState {
            armed: true,
            ..GateState::default()
        };
    }

    /// Release any waiter without a result.
    pub fn interrupt(&self) {
        let mut state = self.inner.state.lock();
        state.interrupted = true;
        self.inner.cv.notify_all();
    }

    /// Block until a phrase is recognized, the gate is interrupted, `cancel`
    /// fires, or `timeout` elapses. Returns `true` only for a recognized phrase.
    pub fn wait(&self, timeout: Duration, cancel: &CancelToken) -> bool {
        let deadline = Instant::now() + timeout;
        let waker = Arc::downgrade(&self.inner);
        cancel.on_cancel(move || {
            if let Some(inner) = waker.upgrade() {
                let _state = inner.state.lock();
                inner.cv.notify_all();
            }
        });

        let mut state = self.inner.state.lock();
        loop {
            if state.released {
                return true;
            }
            if state.interrupted || cancel.is_cancelled() {
                return false;
            }
            if self.inner.cv.wait_until(&mut state, deadline).timed_out() {
                return state.released;
            }
        }
    }

    /// Disarm and hand back everything heard since [`UtteranceGate::arm`].
    pub fn take(&self) -> Heard {
        let mut state = self.inner.state.lock();
        state.armed = false;
        std::mem::take(&mut state.heard)
    }

    fn absorb(&self, text: &str) {
        let mut state = self.inner.state.lock();
        if !state.armed {
            debug!(text, "hypothesis ignored, gate disarmed");
            return;
        }
        if state.heard.absorb(text) {
            debug!(text, "phrase recognized");
            state.released = true;
            self.inner.cv.notify_all();
        }
    }
}

impl RecognitionListener for UtteranceGate {
    fn partial_result(&self, text: &str) {
        self.absorb(text);
    }

    fn final_result(&self, text: &str) {
        self.absorb(text);
    }

    fn error(&self, code: &str) {
        warn!(code, "recognizer reported an error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn recognized_phrase_releases_waiter() {
        let gate = Arc::new(UtteranceGate::new());
        gate.arm();
        let feeder = Arc::clone(&gate);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            feeder.final_result("dial four two");
        });
        let started = Instant::now();
        assert!(gate.wait(Duration::from_secs(5), &CancelToken::new()));
        assert!(started.elapsed() < Duration::from_secs(2));
        handle.join().unwrap();
        assert_eq!(gate.take().number.as_deref(), Some("42"));
    }

    #[test]
    fn unmatched_text_does_not_release() {
        let gate = UtteranceGate::new();
        gate.arm();
        gate.final_result("good morning");
        assert!(!gate.wait(Duration::from_millis(60), &CancelToken::new()));
        assert!(gate.take().is_empty());
    }

    #[test]
    fn disarmed_gate_drops_results() {
        let gate = UtteranceGate::new();
        gate.final_result("stop");
        gate.arm();
        assert!(gate.take().is_empty());
        gate.final_result("stop");
        assert!(gate.take().is_empty());
    }

    #[test]
    fn cancel_token_ends_wait_early() {
        let gate = UtteranceGate::new();
        gate.arm();
        let token = CancelToken::new();
        let canceller = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            canceller.cancel();
        });
        let started = Instant::now();
        assert!(!gate.wait(Duration::from_secs(5), &token));
        assert!(started.elapsed() < Duration::from_secs(1));
        handle.join().unwrap();
    }

    #[test]
    fn already_cancelled_token_skips_the_wait() {
        let gate = UtteranceGate::new();
        gate.arm();
        let token = CancelToken::new();
        token.cancel();
        let started = Instant::now();
        assert!(!gate.wait(Duration::from_secs(5), &token));
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn cancel_wakes_a_long_wait_promptly() {
        let gate = Arc::new(UtteranceGate::new());
        gate.arm();
        let token = CancelToken::new();
        let canceller = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            let cancelled_at = Instant::now();
            canceller.cancel();
            cancelled_at
        });
        assert!(!gate.wait(Duration::from_secs(30), &token));
        let released_at = Instant::now();
        let cancelled_at = handle.join().unwrap();
        assert!(released_at.duration_since(cancelled_at) < Duration::from_millis(40));
    }
}
