//! `CallCoordinator`: the single active / pending call slot.
//!
//! ## Slots
//!
//! ```text
//! pending : inbound call not yet answered   (set by provider, cleared by answer / busy / terminal status)
//! active  : call in conversation            (set by call() or respond_to_call())
//! ```
//!
//! The slot mutex is never held across a provider call: providers may report
//! status changes synchronously from inside `hangup_call` / `answer_call`,
//! and those reports re-enter the slot tracker.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::{Call, CallAnswer, CallListener, CallProvider, CallStatus};
use crate::error::Result;
use crate::observer::{ObserverRegistry, SubscriptionId};

#[derive(Debug, Default)]
struct CallSlots {
    active: Option<Call>,
    pending: Option<Call>,
}

/// Installed as the provider's listener. Updates slots, then fans out.
struct SlotTracker {
    slots: Arc<Mutex<CallSlots>>,
    listeners: Arc<ObserverRegistry<dyn CallListener>>,
}

impl CallListener for SlotTracker {
    fn incoming_call_received(&self, call: &Call) {
        {
            let mut slots = self.slots.lock();
            if let Some(previous) = slots.pending.as_ref().filter(|p| !p.same_call(call)) {
                warn!(replaced = %previous.id, call_id = %call.id, "pending call replaced");
            }
            slots.pending = Some(call.clone());
        }
        debug!(call_id = %call.id, caller = %call.caller, "incoming call stored as pending");
        self.listeners.for_each(|l| l.incoming_call_received(call));
    }

    fn call_status_changed(&self, call: &Call) {
        {
            let mut guard = self.slots.lock();
            let slots = &mut *guard;
            for slot in [&mut slots.pending, &mut slots.active] {
                if slot.as_ref().is_some_and(|c| c.same_call(call)) {
                    if call.status.is_terminal() {
                        *slot = None;
                    } else {
                        *slot = Some(call.clone());
                    }
                }
            }
        }
        debug!(call_id = %call.id, status = %call.status, "call status changed");
        self.listeners.for_each(|l| l.call_status_changed(call));
    }
}

pub struct CallCoordinator {
    provider: Arc<dyn CallProvider>,
    slots: Arc<Mutex<CallSlots>>,
    listeners: Arc<ObserverRegistry<dyn CallListener>>,
}

impl CallCoordinator {
    /// Wrap `provider` and install the slot tracker as its listener.
    pub fn new(provider: Arc<dyn CallProvider>) -> Self {
        let slots = Arc::new(Mutex::new(CallSlots::default()));
        let listeners: Arc<ObserverRegistry<dyn CallListener>> = Arc::new(ObserverRegistry::new());
        provider.set_listener(Arc::new(SlotTracker {
            slots: Arc::clone(&slots),
            listeners: Arc::clone(&listeners),
        }));
        Self {
            provider,
            slots,
            listeners,
        }
    }

    pub fn initialize(&self) -> Result<()> {
        self.provider.initialize()
    }

    pub fn shutdown(&self) {
        *self.slots.lock() = CallSlots::default();
        self.provider.shutdown();
    }

    /// Subscribe to re-broadcast provider events (registration order).
    pub fn add_listener(&self, listener: Arc<dyn CallListener>) -> SubscriptionId {
        self.listeners.subscribe(listener)
    }

    pub fn remove_listener(&self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }

    pub fn active_call(&self) -> Option<Call> {
        self.slots.lock().active.clone()
    }

    pub fn pending_call(&self) -> Option<Call> {
        self.slots.lock().pending.clone()
    }

    pub fn has_pending(&self) -> bool {
        self.slots.lock().pending.is_some()
    }

    /// Place an outbound call.
    ///
    /// Any pending inbound call is hung up first. An existing active call is
    /// replaced without being terminated.
    ///
    /// # Errors
    /// `PhoneError::CallOperation` if the provider refuses; the active slot is
    /// left empty.
    pub fn call(&self, number: &str) -> Result<Call> {
        let pending = self.slots.lock().pending.take();
        if let Some(pending) = pending {
            info!(call_id = %pending.id, "dropping pending call before dialing out");
            self.hangup(&pending);
        }

        match self.provider.place_call(number) {
            Ok(call) => {
                info!(call_id = %call.id, callee = %call.callee, "outbound call placed");
                let replaced = self.slots.lock().active.replace(call.clone());
                if let Some(replaced) = replaced {
                    warn!(replaced = %replaced.id, "active call replaced without hang-up");
                }
                Ok(call)
            }
            Err(e) => {
                error!(number, "unable to place call: {e}");
                self.slots.lock().active = None;
                Err(e)
            }
        }
    }

    /// Accept the pending call and promote it to active.
    ///
    /// Returns `Ok(None)` when there is nothing to answer.
    ///
    /// # Errors
    /// Provider refusal; the pending slot is cleared.
    pub fn respond_to_call(&self) -> Result<Option<Call>> {
        let Some(pending) = self.pending_call() else {
            debug!("respond_to_call with no pending call");
            return Ok(None);
        };

        match self.provider.answer_call(&pending, CallAnswer::Accept) {
            Ok(()) => {
                let mut slots = self.slots.lock();
                if slots.pending.as_ref().is_some_and(|p| p.same_call(&pending)) {
                    slots.pending = None;
                } else if slots.active.as_ref().is_some_and(|a| a.same_call(&pending)) {
                    // Provider already reported the call live.
                } else {
                    warn!(call_id = %pending.id, "pending call ended while answering");
                    return Ok(None);
                }
                let active = pending.with_status(CallStatus::Active);
                slots.active = Some(active.clone());
                info!(call_id = %active.id, caller = %active.caller, "pending call answered");
                Ok(Some(active))
            }
            Err(e) => {
                error!(call_id = %pending.id, "unable to answer pending call: {e}");
                let mut slots = self.slots.lock();
                if slots.pending.as_ref().is_some_and(|p| p.same_call(&pending)) {
                    slots.pending = None;
                }
                Err(e)
            }
        }
    }

    /// Send a provisional "ringing" indication to the pending caller.
    pub fn signal_ringing(&self) -> Result<()> {
        match self.pending_call() {
            Some(pending) => self.provider.answer_call(&pending, CallAnswer::Provisional),
            None => Ok(()),
        }
    }

    /// Reject the pending call, if any. The slot is cleared even when the
    /// provider refuses. Returns whether a pending call existed.
    pub fn signal_busy(&self) -> bool {
        let pending = self.slots.lock().pending.take();
        match pending {
            Some(pending) => {
                if let Err(e) = self.provider.answer_call(&pending, CallAnswer::Reject) {
                    error!(call_id = %pending.id, "unable to signal busy: {e}");
                } else {
                    info!(call_id = %pending.id, "pending call rejected");
                }
                true
            }
            None => false,
        }
    }

    /// Hang up both slots independently and clear them.
    pub fn terminate_active_call(&self) {
        let (active, pending) = {
            let mut slots = self.slots.lock();
            (slots.active.take(), slots.pending.take())
        };
        if let Some(active) = active {
            self.hangup(&active);
        }
        if let Some(pending) = pending {
            self.hangup(&pending);
        }
    }

    fn hangup(&self, call: &Call) {
        if let Err(e) = self.provider.hangup_call(call) {
            error!(call_id = %call.id, "unable to terminate call: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phone::stub::{LoopbackProvider, ProviderAction};

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(&'static str, Call)>>,
    }

    impl CallListener for Recorder {
        fn incoming_call_received(&self, call: &Call) {
            self.events.lock().push(("incoming", call.clone()));
        }

        fn call_status_changed(&self, call: &Call) {
            self.events.lock().push(("status", call.clone()));
        }
    }

    fn setup() -> (Arc<LoopbackProvider>, CallCoordinator) {
        let provider = Arc::new(LoopbackProvider::new("+15550000"));
        let calls = CallCoordinator::new(provider.clone());
        (provider, calls)
    }

    #[test]
    fn call_hangs_up_pending_before_placing() {
        let (provider, calls) = setup();
        let incoming = provider.simulate_incoming("+15559999");
        assert!(calls.has_pending());

        let placed = calls.call("+15551234").expect("place call");

        let actions = provider.actions();
        let hangup_at = actions
            .iter()
            .position(|a| *a == ProviderAction::Hangup(incoming.id))
            .expect("pending call hung up");
        let placed_at = actions
            .iter()
            .position(|a| *a == ProviderAction::Placed("+15551234".into()))
            .expect("call placed");
        assert!(hangup_at < placed_at);
        assert!(!calls.has_pending());
        assert_eq!(calls.active_call().map(|c| c.id), Some(placed.id));
    }

    #[test]
    fn existing_active_call_is_replaced_without_hangup() {
        let (provider, calls) = setup();
        let first = calls.call("+1111").expect("first call");
        let second = calls.call("+2222").expect("second call");

        assert!(provider.hangups().is_empty());
        assert_eq!(calls.active_call().map(|c| c.id), Some(second.id));
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn failed_placement_clears_active_slot() {
        let (provider, calls) = setup();
        calls.call("+1111").expect("first call");
        provider.fail_placement(true);

        assert!(calls.call("+2222").is_err());
        assert!(calls.active_call().is_none());
    }

    #[test]
    fn respond_promotes_pending_to_active() {
        let (provider, calls) = setup();
        let incoming = provider.simulate_incoming("+15559999");

        let answered = calls
            .respond_to_call()
            .expect("answer")
            .expect("pending call present");
        assert_eq!(answered.id, incoming.id);
        assert_eq!(answered.status, CallStatus::Active);
        assert!(!calls.has_pending());
        assert_eq!(provider.answers(), vec![CallAnswer::Accept]);
    }

    #[test]
    fn respond_without_pending_is_a_no_op() {
        let (provider, calls) = setup();
        assert!(calls.respond_to_call().expect("no error").is_none());
        assert!(provider.answers().is_empty());
    }

    #[test]
    fn refused_answer_clears_pending() {
        let (provider, calls) = setup();
        provider.simulate_incoming("+15559999");
        provider.fail_answers(true);

        assert!(calls.respond_to_call().is_err());
        assert!(!calls.has_pending());
        assert!(calls.active_call().is_none());
    }

    #[test]
    fn signal_busy_rejects_and_clears_pending() {
        let (provider, calls) = setup();
        assert!(!calls.signal_busy(), "nothing pending yet");

        provider.simulate_incoming("+15559999");
        calls.signal_ringing().expect("provisional");
        assert!(calls.signal_busy());
        assert!(!calls.has_pending());
        assert_eq!(
            provider.answers(),
            vec![CallAnswer::Provisional, CallAnswer::Reject]
        );
    }

    #[test]
    fn terminate_hangs_up_both_slots() {
        let (provider, calls) = setup();
        let active = calls.call("+1111").expect("active call");
        let pending = provider.simulate_incoming("+2222");

        calls.terminate_active_call();

        let hangups = provider.hangups();
        assert!(hangups.contains(&active.id));
        assert!(hangups.contains(&pending.id));
        assert!(calls.active_call().is_none());
        assert!(!calls.has_pending());

        // Tolerates empty slots.
        calls.terminate_active_call();
        assert_eq!(provider.hangups().len(), 2);
    }

    #[test]
    fn terminal_status_clears_pending_and_is_rebroadcast() {
        let (provider, calls) = setup();
        let recorder = Arc::new(Recorder::default());
        calls.add_listener(recorder.clone());

        let incoming = provider.simulate_incoming("+15559999");
        provider.simulate_status(incoming.id, CallStatus::Failed);

        assert!(!calls.has_pending());
        let events = recorder.events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, "incoming");
        assert_eq!(events[1].0, "status");
        assert_eq!(events[1].1.status, CallStatus::Failed);
    }

    #[test]
    fn listeners_receive_status_until_removed() {
        let (provider, calls) = setup();
        let recorder = Arc::new(Recorder::default());
        let id = calls.add_listener(recorder.clone());

        let placed = calls.call("+1111").expect("call");
        provider.simulate_status(placed.id, CallStatus::Active);
        assert_eq!(calls.active_call().map(|c| c.status), Some(CallStatus::Active));
        assert_eq!(recorder.events.lock().len(), 1);

        assert!(calls.remove_listener(id));
        provider.simulate_status(placed.id, CallStatus::Finished);
        assert_eq!(recorder.events.lock().len(), 1);
        assert!(calls.active_call().is_none());
    }
}
