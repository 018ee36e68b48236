//! The lifecycle worker: sole owner of orchestration state.
//!
//! Hook edges, provider callbacks, ring timer callbacks and finished dialogs
//! all arrive as [`LifecycleEvent`]s on one channel and are handled strictly
//! in arrival order on the `rotary-lifecycle` thread. Handlers never block on
//! the dialog: sessions are queued to the long-lived `rotary-dialog` worker,
//! which reports back with [`LifecycleEvent::DialogFinished`].

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info, warn};

use super::EngineShared;
use crate::dialog::DialogEngine;
use crate::events::LifecycleState;
use crate::hardware::ring::RingCallback;
use crate::hardware::HookState;
use crate::phone::{Call, CallId, CallStatus};
use crate::sync::CancelToken;

#[derive(Debug, Clone)]
pub(crate) enum LifecycleEvent {
    Hook(HookState),
    IncomingCall(Call),
    CallStatus(Call),
    DialogFinished { session: u64, number: Option<String> },
    RingTick,
    RingExpired,
    Shutdown,
}

struct DialogSession {
    id: u64,
    cancel: CancelToken,
}

// ── Dialog worker ───────────────────────────────────────────────────────────

struct DialogRequest {
    session: u64,
    cancel: CancelToken,
}

/// Runs queued dialog sessions one at a time on a single `rotary-dialog`
/// thread. A superseded session is cancelled before its successor is queued,
/// so the queue never holds more than one live request.
pub(crate) struct DialogRunner {
    requests: Option<Sender<DialogRequest>>,
    handle: Option<JoinHandle<()>>,
}

impl DialogRunner {
    pub(crate) fn spawn(
        dialog: Arc<DialogEngine>,
        settle: Duration,
        events: Sender<LifecycleEvent>,
    ) -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded::<DialogRequest>();
        let handle = thread::Builder::new()
            .name("rotary-dialog".into())
            .spawn(move || {
                debug!("dialog worker started");
                for DialogRequest { session, cancel } in rx.iter() {
                    let number = if cancel.sleep(settle) {
                        None
                    } else {
                        dialog.ask_phone_number(&cancel)
                    };
                    let _ = events.send(LifecycleEvent::DialogFinished { session, number });
                }
                debug!("dialog worker stopped");
            })?;
        Ok(Self {
            requests: Some(tx),
            handle: Some(handle),
        })
    }

    fn submit(&self, session: u64, cancel: CancelToken) -> bool {
        self.requests
            .as_ref()
            .is_some_and(|tx| tx.send(DialogRequest { session, cancel }).is_ok())
    }

    /// Close the queue and join the thread. Queued sessions must already be
    /// cancelled.
    fn shutdown(&mut self) {
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("dialog worker panicked");
            }
        }
    }
}

impl Drop for DialogRunner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Lifecycle worker ────────────────────────────────────────────────────────

pub(crate) struct Worker {
    shared: Arc<EngineShared>,
    tx: Sender<LifecycleEvent>,
    dialogs: DialogRunner,
    on_hook: bool,
    /// Incoming call currently ringing the bell.
    pending: Option<CallId>,
    /// Call answered or placed from this handset.
    active: Option<CallId>,
    next_session: u64,
    dialog: Option<DialogSession>,
}

impl Worker {
    pub(crate) fn new(
        shared: Arc<EngineShared>,
        tx: Sender<LifecycleEvent>,
        dialogs: DialogRunner,
    ) -> Self {
        Self {
            shared,
            tx,
            dialogs,
            on_hook: true,
            pending: None,
            active: None,
            next_session: 0,
            dialog: None,
        }
    }

    pub(crate) fn run(mut self, rx: Receiver<LifecycleEvent>) {
        debug!("lifecycle worker started");
        for event in rx.iter() {
            debug!(?event, state = %self.state(), "lifecycle event");
            match event {
                LifecycleEvent::Hook(HookState::OnHook) => self.on_hook(),
                LifecycleEvent::Hook(HookState::OffHook) => self.off_hook(),
                LifecycleEvent::IncomingCall(call) => self.incoming_call(call),
                LifecycleEvent::CallStatus(call) => self.call_status(call),
                LifecycleEvent::DialogFinished { session, number } => {
                    self.dialog_finished(session, number)
                }
                LifecycleEvent::RingTick => self.ring_tick(),
                LifecycleEvent::RingExpired => self.ring_expired(),
                LifecycleEvent::Shutdown => break,
            }
        }

        self.cancel_dialog();
        self.dialogs.shutdown();
        debug!("lifecycle worker stopped");
    }

    fn state(&self) -> LifecycleState {
        self.shared.status.state()
    }

    fn publish(&self, status: impl Into<String>, state: LifecycleState) {
        self.shared.status.publish(status, state);
    }

    /// State to settle in once nothing else is going on.
    fn idle_state(&self) -> LifecycleState {
        if self.on_hook {
            LifecycleState::OnHook
        } else {
            LifecycleState::OffHookIdle
        }
    }

    // ── Hook edges ──────────────────────────────────────────────────────────

    fn on_hook(&mut self) {
        if self.on_hook {
            return;
        }
        self.on_hook = true;

        self.cancel_dialog();
        let shared = &self.shared;
        if shared.calls.has_pending() {
            shared.calls.signal_busy();
        }
        self.pending = None;
        self.active = None;
        shared.calls.terminate_active_call();
        shared.ring.stop_ringing();
        shared.power.release_foreground();

        self.publish("Phone On Hook", LifecycleState::OnHook);
    }

    fn off_hook(&mut self) {
        if !self.on_hook {
            return;
        }
        self.on_hook = false;
        self.shared.power.acquire_foreground();
        self.publish("Phone Off Hook", LifecycleState::OffHookIdle);

        if self.pending.is_some() {
            self.answer_pending();
        } else {
            self.start_dialog();
        }
    }

    fn answer_pending(&mut self) {
        self.shared.ring.stop_ringing();
        self.pending = None;

        match self.shared.calls.respond_to_call() {
            Ok(Some(call)) => {
                info!(caller = %call.caller, "pending call answered");
                self.active = Some(call.id);
                self.publish("Answering Pending Call...", LifecycleState::CallActive);
            }
            Ok(None) => {
                warn!("pending call vanished before it could be answered");
                self.publish("Phone Off Hook", LifecycleState::OffHookIdle);
            }
            Err(e) => {
                error!(error = %e, "failed to answer pending call");
                self.publish("Phone Off Hook", LifecycleState::OffHookIdle);
            }
        }
    }

    // ── Dialog sessions ─────────────────────────────────────────────────────

    fn start_dialog(&mut self) {
        self.next_session += 1;
        let session = self.next_session;
        let cancel = CancelToken::new();

        if self.dialogs.submit(session, cancel.clone()) {
            self.dialog = Some(DialogSession { id: session, cancel });
            self.publish("Asking Phone Number...", LifecycleState::DialogInProgress);
        } else {
            error!(session, "dialog worker is gone, no dialog started");
        }
    }

    fn cancel_dialog(&mut self) {
        if let Some(session) = self.dialog.take() {
            debug!(session = session.id, "cancelling dialog");
            session.cancel.cancel();
            self.shared.dialog.stop_talking();
        }
    }

    fn dialog_finished(&mut self, session: u64, number: Option<String>) {
        let current = self.dialog.as_ref().map(|s| s.id);
        if current != Some(session) {
            debug!(session, ?current, "stale dialog result ignored");
            return;
        }
        self.dialog = None;

        if self.on_hook {
            return;
        }
        let Some(number) = number else {
            self.publish("Phone Off Hook", LifecycleState::OffHookIdle);
            return;
        };

        match self.shared.calls.call(&number) {
            Ok(call) => {
                info!(%number, call = %call.id, "outbound call placed");
                self.active = Some(call.id);
                self.publish(format!("Dialing {number}"), LifecycleState::CallActive);
            }
            Err(e) => {
                error!(%number, error = %e, "failed to place call");
                self.publish("Phone Off Hook", LifecycleState::OffHookIdle);
            }
        }
    }

    // ── Provider events ─────────────────────────────────────────────────────

    fn incoming_call(&mut self, call: Call) {
        let status = format!("Incoming call from {}", call.caller);
        if !self.on_hook {
            info!(caller = %call.caller, "busy, rejecting incoming call");
            self.shared.calls.signal_busy();
            self.publish(status, self.state());
            return;
        }

        self.pending = Some(call.id);
        let tick_tx = self.tx.clone();
        let expired_tx = self.tx.clone();
        let on_tick: RingCallback = Arc::new(move || {
            let _ = tick_tx.send(LifecycleEvent::RingTick);
        });
        let on_expired: RingCallback = Arc::new(move || {
            let _ = expired_tx.send(LifecycleEvent::RingExpired);
        });
        self.shared.ring.start_ringing(on_tick, on_expired);
        self.publish(status, LifecycleState::RingingPending);
    }

    fn call_status(&mut self, call: Call) {
        let status = format!("Call to {} is now {}", call.callee, call.status);
        let state = self.state();
        let was_active = self.active == Some(call.id);
        let was_pending = self.pending == Some(call.id);

        if !was_active && !was_pending {
            // Rejected callers and calls already torn down.
            debug!(call_id = %call.id, status = %call.status, "status for an untracked call");
            self.publish(status, state);
            return;
        }

        if !call.status.is_terminal() {
            let next = if was_active
                && call.status == CallStatus::Active
                && state == LifecycleState::OffHookIdle
            {
                LifecycleState::CallActive
            } else {
                state
            };
            self.publish(status, next);
            return;
        }

        if was_pending {
            self.pending = None;
            self.shared.ring.stop_ringing();
        }
        if was_active {
            self.active = None;
            if !self.on_hook && self.dialog.is_none() {
                self.shared.dialog.announce_call_finished();
            }
        }

        let next = if self.dialog.is_some() {
            state
        } else {
            self.idle_state()
        };
        self.publish(status, next);
    }

    // ── Ring timer ──────────────────────────────────────────────────────────

    fn ring_tick(&self) {
        if self.pending.is_none() {
            return;
        }
        if let Err(e) = self.shared.calls.signal_ringing() {
            error!(error = %e, "unable to signal ringing");
        }
    }

    fn ring_expired(&mut self) {
        if self.pending.is_none() {
            return;
        }
        info!("incoming call not answered, rejecting");
        self.pending = None;
        self.shared.calls.signal_busy();
        self.publish("Missed call", self.idle_state());
    }
}
