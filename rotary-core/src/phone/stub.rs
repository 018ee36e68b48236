//! `LoopbackProvider`: in-process call backend without any SIP traffic.
//!
//! Records every request it receives so tests can assert on the exact
//! provider traffic, and lets the caller inject remote events (incoming call,
//! remote hang-up) the way a real stack would report them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::{Call, CallAnswer, CallId, CallListener, CallProvider, CallStatus};
use crate::error::{PhoneError, Result};

/// One request made to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderAction {
    Initialized,
    Placed(String),
    Hangup(CallId),
    Answered(CallId, CallAnswer),
    Shutdown,
}

pub struct LoopbackProvider {
    local_number: String,
    listener: RwLock<Option<Arc<dyn CallListener>>>,
    actions: Mutex<Vec<ProviderAction>>,
    live: Mutex<HashMap<CallId, Call>>,
    fail_init: AtomicBool,
    fail_place: AtomicBool,
    fail_answer: AtomicBool,
}

impl LoopbackProvider {
    pub fn new(local_number: impl Into<String>) -> Self {
        Self {
            local_number: local_number.into(),
            listener: RwLock::new(None),
            actions: Mutex::new(Vec::new()),
            live: Mutex::new(HashMap::new()),
            fail_init: AtomicBool::new(false),
            fail_place: AtomicBool::new(false),
            fail_answer: AtomicBool::new(false),
        }
    }

    pub fn actions(&self) -> Vec<ProviderAction> {
        self.actions.lock().clone()
    }

    /// Answers published so far, in order.
    pub fn answers(&self) -> Vec<CallAnswer> {
        self.actions
            .lock()
            .iter()
            .filter_map(|a| match a {
                ProviderAction::Answered(_, answer) => Some(*answer),
                _ => None,
            })
            .collect()
    }

    pub fn count_answers(&self, answer: CallAnswer) -> usize {
        self.answers().into_iter().filter(|a| *a == answer).count()
    }

    pub fn placed_numbers(&self) -> Vec<String> {
        self.actions
            .lock()
            .iter()
            .filter_map(|a| match a {
                ProviderAction::Placed(n) => Some(n.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn hangups(&self) -> Vec<CallId> {
        self.actions
            .lock()
            .iter()
            .filter_map(|a| match a {
                ProviderAction::Hangup(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn fail_initialize(&self, fail: bool) {
        self.fail_init.store(fail, Ordering::SeqCst);
    }

    pub fn fail_placement(&self, fail: bool) {
        self.fail_place.store(fail, Ordering::SeqCst);
    }

    pub fn fail_answers(&self, fail: bool) {
        self.fail_answer.store(fail, Ordering::SeqCst);
    }

    /// Simulate an inbound INVITE from `caller`.
    pub fn simulate_incoming(&self, caller: &str) -> Call {
        let call = Call::new(caller, self.local_number.clone(), CallStatus::Pending);
        self.live.lock().insert(call.id, call.clone());
        debug!(call_id = %call.id, caller, "loopback incoming call");
        if let Some(listener) = self.listener() {
            listener.incoming_call_received(&call);
        }
        call
    }

    /// Simulate a remote-side status change (e.g. the far end hanging up).
    /// Returns `None` for calls the provider no longer tracks.
    pub fn simulate_status(&self, id: CallId, status: CallStatus) -> Option<Call> {
        let updated = {
            let mut live = self.live.lock();
            let call = live.get_mut(&id)?;
            call.status = status;
            let updated = call.clone();
            if status.is_terminal() {
                live.remove(&id);
            }
            updated
        };
        self.emit_status(&updated);
        Some(updated)
    }

    /// Calls that have not reached a terminal status.
    pub fn live_calls(&self) -> Vec<Call> {
        self.live.lock().values().cloned().collect()
    }

    fn listener(&self) -> Option<Arc<dyn CallListener>> {
        self.listener.read().clone()
    }

    fn record(&self, action: ProviderAction) {
        self.actions.lock().push(action);
    }

    fn emit_status(&self, call: &Call) {
        if let Some(listener) = self.listener() {
            listener.call_status_changed(call);
        }
    }
}

impl CallProvider for LoopbackProvider {
    fn initialize(&self) -> Result<()> {
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(PhoneError::ProviderInit("loopback registration refused".into()));
        }
        self.record(ProviderAction::Initialized);
        Ok(())
    }

    fn shutdown(&self) {
        self.record(ProviderAction::Shutdown);
        self.live.lock().clear();
    }

    fn place_call(&self, number: &str) -> Result<Call> {
        self.record(ProviderAction::Placed(number.to_string()));
        if self.fail_place.load(Ordering::SeqCst) {
            return Err(PhoneError::CallOperation(format!("unable to call {number}")));
        }
        let call = Call::new(self.local_number.clone(), number, CallStatus::Ringing);
        self.live.lock().insert(call.id, call.clone());
        Ok(call)
    }

    fn hangup_call(&self, call: &Call) -> Result<()> {
        self.record(ProviderAction::Hangup(call.id));
        let ended = self.live.lock().remove(&call.id);
        if let Some(ended) = ended {
            self.emit_status(&ended.with_status(CallStatus::Finished));
        }
        Ok(())
    }

    fn answer_call(&self, call: &Call, answer: CallAnswer) -> Result<()> {
        self.record(ProviderAction::Answered(call.id, answer));
        if self.fail_answer.load(Ordering::SeqCst) {
            return Err(PhoneError::CallOperation(format!(
                "answer {answer:?} refused for {}",
                call.id
            )));
        }
        match answer {
            CallAnswer::Provisional => {}
            CallAnswer::Accept => {
                self.simulate_status(call.id, CallStatus::Active);
            }
            CallAnswer::Reject => {
                self.simulate_status(call.id, CallStatus::Finished);
            }
        }
        Ok(())
    }

    fn set_listener(&self, listener: Arc<dyn CallListener>) {
        *self.listener.write() = Some(listener);
    }
}
