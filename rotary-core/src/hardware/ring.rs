//! `RingCoordinator`: ring-cycle timing and hook-edge detection.
//!
//! ## Threads
//!
//! ```text
//! ring loop    : idle ──start_ringing──► [tick, ON ring_interval, OFF ring_interval/2] × max_ring_cycles ──► expired
//! hook sampler : read_hook every hook_poll_interval ──edge──► channel
//! dispatcher   : channel ──► hook listener
//! ```
//!
//! Every wait in the ring loop is a `Condvar` wait with a deadline, so
//! `stop_ringing()` wakes the loop immediately. Callbacks and hardware calls
//! are always made with the session lock released.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::{HardwareProvider, HookState};
use crate::error::{PhoneError, Result};

/// Invoked at the start of each ring cycle, or once when the session expires.
pub type RingCallback = Arc<dyn Fn() + Send + Sync>;

/// Receives debounced hook edges on the dispatcher thread.
pub type HookListener = Arc<dyn Fn(HookState) + Send + Sync>;

/// Timing for the ring loop and hook sampler.
#[derive(Debug, Clone)]
pub struct RingConfig {
    /// Ringer ON time per cycle. OFF time is half of this. Default: 1 s.
    pub ring_interval: Duration,
    /// Cycles before the session expires on its own. Default: 12.
    pub max_ring_cycles: u32,
    /// Hook sensor sampling period. Default: 100 ms.
    pub hook_poll_interval: Duration,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            ring_interval: Duration::from_millis(1_000),
            max_ring_cycles: 12,
            hook_poll_interval: Duration::from_millis(100),
        }
    }
}

struct RingSession {
    generation: u64,
    cycle_count: u32,
    on_tick: RingCallback,
    on_expired: RingCallback,
}

#[derive(Default)]
struct RingState {
    session: Option<RingSession>,
    next_generation: u64,
    shutdown: bool,
}

struct Shared {
    config: RingConfig,
    state: Mutex<RingState>,
    cv: Condvar,
    hook_listener: RwLock<Option<HookListener>>,
    sampling: AtomicBool,
}

impl Shared {
    /// Park until `duration` elapses. Returns `false` early if the session
    /// with `generation` was stopped or replaced, or on shutdown.
    fn hold_session(&self, generation: u64, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut state = self.state.lock();
        loop {
            let current = !state.shutdown
                && state
                    .session
                    .as_ref()
                    .is_some_and(|s| s.generation == generation);
            if !current {
                return false;
            }
            if self.cv.wait_until(&mut state, deadline).timed_out() {
                return !state.shutdown
                    && state
                        .session
                        .as_ref()
                        .is_some_and(|s| s.generation == generation);
            }
        }
    }
}

/// Owns the ring session and the hook sampler. See module docs.
pub struct RingCoordinator {
    shared: Arc<Shared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl RingCoordinator {
    pub fn new(config: RingConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(RingState::default()),
                cv: Condvar::new(),
                hook_listener: RwLock::new(None),
                sampling: AtomicBool::new(false),
            }),
            threads: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &RingConfig {
        &self.shared.config
    }

    /// Spawn the ring loop, hook sampler and hook dispatcher threads.
    ///
    /// # Errors
    /// - `PhoneError::AlreadyRunning` if called twice.
    /// - `PhoneError::Io` if a thread cannot be spawned.
    pub fn start(&self, hardware: Arc<dyn HardwareProvider>) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(PhoneError::AlreadyRunning);
        }
        self.shared.sampling.store(true, Ordering::SeqCst);

        let (hook_tx, hook_rx) = crossbeam_channel::unbounded::<HookState>();
        let mut threads = self.threads.lock();

        let shared = Arc::clone(&self.shared);
        let ringer = Arc::clone(&hardware);
        threads.push(
            thread::Builder::new()
                .name("rotary-ring".into())
                .spawn(move || ring_loop(shared, ringer))?,
        );

        let shared = Arc::clone(&self.shared);
        threads.push(
            thread::Builder::new()
                .name("rotary-hook-sampler".into())
                .spawn(move || sample_loop(shared, hardware, hook_tx))?,
        );

        let shared = Arc::clone(&self.shared);
        threads.push(
            thread::Builder::new()
                .name("rotary-hook-dispatch".into())
                .spawn(move || dispatch_loop(shared, hook_rx))?,
        );

        info!(
            ring_interval_ms = self.shared.config.ring_interval.as_millis() as u64,
            max_ring_cycles = self.shared.config.max_ring_cycles,
            hook_poll_ms = self.shared.config.hook_poll_interval.as_millis() as u64,
            "ring coordinator started"
        );
        Ok(())
    }

    /// Begin a new ring session, replacing any session in progress.
    pub fn start_ringing(&self, on_tick: RingCallback, on_expired: RingCallback) {
        let mut state = self.shared.state.lock();
        let generation = state.next_generation;
        state.next_generation += 1;
        state.session = Some(RingSession {
            generation,
            cycle_count: 0,
            on_tick,
            on_expired,
        });
        self.shared.cv.notify_all();
        debug!(generation, "ring session started");
    }

    /// End the current session. Its expiry callback will never fire.
    /// Returns `false` if nothing was ringing.
    pub fn stop_ringing(&self) -> bool {
        let mut state = self.shared.state.lock();
        match state.session.take() {
            Some(session) => {
                self.shared.cv.notify_all();
                debug!(
                    generation = session.generation,
                    cycles = session.cycle_count,
                    "ring session stopped"
                );
                true
            }
            None => false,
        }
    }

    pub fn is_ringing(&self) -> bool {
        self.shared.state.lock().session.is_some()
    }

    /// Cycles started in the current session (0 when idle).
    pub fn cycle_count(&self) -> u32 {
        self.shared
            .state
            .lock()
            .session
            .as_ref()
            .map_or(0, |s| s.cycle_count)
    }

    /// Replace the hook edge listener. Takes effect for the next edge.
    pub fn set_hook_listener(&self, listener: HookListener) {
        *self.shared.hook_listener.write() = Some(listener);
    }

    /// Stop all threads and wait for them to exit. Idempotent.
    pub fn shutdown(&self) {
        self.shared.sampling.store(false, Ordering::SeqCst);
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            state.session = None;
            self.shared.cv.notify_all();
        }
        let threads: Vec<_> = self.threads.lock().drain(..).collect();
        for handle in threads {
            if handle.join().is_err() {
                error!("ring coordinator thread panicked");
            }
        }
    }
}

impl Drop for RingCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn actuate(hardware: &dyn HardwareProvider, ringing: bool) {
    if let Err(e) = hardware.set_ringing(ringing) {
        warn!(ringing, "ringer actuation failed: {e}");
    }
}

fn ring_loop(shared: Arc<Shared>, hardware: Arc<dyn HardwareProvider>) {
    let on_time = shared.config.ring_interval;
    let off_time = shared.config.ring_interval / 2;
    let max_cycles = shared.config.max_ring_cycles.max(1);

    loop {
        // ── Wait for a session and open the next cycle ───────────────────
        let (generation, cycle, on_tick) = {
            let mut state = shared.state.lock();
            loop {
                if state.shutdown {
                    return;
                }
                if let Some(session) = state.session.as_mut() {
                    session.cycle_count += 1;
                    break (
                        session.generation,
                        session.cycle_count,
                        Arc::clone(&session.on_tick),
                    );
                }
                shared.cv.wait(&mut state);
            }
        };

        debug!(generation, cycle, "ring cycle");
        on_tick();

        actuate(hardware.as_ref(), true);
        let held = shared.hold_session(generation, on_time);
        actuate(hardware.as_ref(), false);
        if !held || !shared.hold_session(generation, off_time) {
            continue;
        }

        // ── Expire after the last cycle ──────────────────────────────────
        let expired = {
            let mut state = shared.state.lock();
            let done = state
                .session
                .as_ref()
                .is_some_and(|s| s.generation == generation && s.cycle_count >= max_cycles);
            if done {
                state.session.take()
            } else {
                None
            }
        };
        if let Some(session) = expired {
            info!(generation, cycles = session.cycle_count, "ring session expired");
            (session.on_expired)();
        }
    }
}

fn sample_loop(shared: Arc<Shared>, hardware: Arc<dyn HardwareProvider>, tx: Sender<HookState>) {
    let mut last = HookState::OnHook;
    while shared.sampling.load(Ordering::SeqCst) {
        match hardware.read_hook() {
            Ok(now) if now != last => {
                debug!(from = %last, to = %now, "hook edge");
                last = now;
                if tx.send(now).is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => warn!(retained = %last, "hook read failed: {e}"),
        }
        thread::sleep(shared.config.hook_poll_interval);
    }
}

fn dispatch_loop(shared: Arc<Shared>, rx: Receiver<HookState>) {
    for state in rx.iter() {
        let listener = shared.hook_listener.read().clone();
        match listener {
            Some(listener) => listener(state),
            None => debug!(%state, "hook edge dropped, no listener"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::SimulatedHardware;
    use std::sync::atomic::AtomicUsize;

    fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    fn fast_config(ring_ms: u64) -> RingConfig {
        RingConfig {
            ring_interval: Duration::from_millis(ring_ms),
            max_ring_cycles: 12,
            hook_poll_interval: Duration::from_millis(5),
        }
    }

    fn counter() -> (Arc<AtomicUsize>, RingCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let callback: RingCallback = Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (count, callback)
    }

    #[test]
    fn expires_once_after_cycle_cap() {
        let hw = Arc::new(SimulatedHardware::new());
        let ring = RingCoordinator::new(fast_config(6));
        ring.start(hw.clone()).expect("start");

        let (ticks, on_tick) = counter();
        let (expired, on_expired) = counter();
        ring.start_ringing(on_tick, on_expired);

        assert!(wait_for(Duration::from_secs(5), || expired.load(Ordering::SeqCst) == 1));
        assert_eq!(ticks.load(Ordering::SeqCst), 12);
        assert!(!ring.is_ringing());

        thread::sleep(Duration::from_millis(60));
        assert_eq!(expired.load(Ordering::SeqCst), 1, "expiry must fire at most once");
        assert_eq!(ticks.load(Ordering::SeqCst), 12);
        assert!(wait_for(Duration::from_millis(200), || !hw.is_ringing()));
        ring.shutdown();
    }

    #[test]
    fn ringer_faults_do_not_end_the_session() {
        let hw = Arc::new(SimulatedHardware::new());
        hw.fail_ringer(true);
        let ring = RingCoordinator::new(fast_config(5));
        ring.start(hw.clone()).expect("start");

        let (ticks, on_tick) = counter();
        let (expired, on_expired) = counter();
        ring.start_ringing(on_tick, on_expired);

        assert!(wait_for(Duration::from_secs(5), || expired.load(Ordering::SeqCst) == 1));
        assert_eq!(ticks.load(Ordering::SeqCst), 12);
        assert_eq!(hw.ring_pulses(), 0);
        ring.shutdown();
    }

    #[test]
    fn stop_before_expiry_suppresses_expired_callback() {
        let hw = Arc::new(SimulatedHardware::new());
        let ring = RingCoordinator::new(fast_config(10));
        ring.start(hw).expect("start");

        let (ticks, on_tick) = counter();
        let (expired, on_expired) = counter();
        ring.start_ringing(on_tick, on_expired);
        assert!(wait_for(Duration::from_secs(2), || ticks.load(Ordering::SeqCst) >= 2));
        assert!(ring.stop_ringing());

        // Longer than a full 12-cycle session at this interval.
        thread::sleep(Duration::from_millis(400));
        assert_eq!(expired.load(Ordering::SeqCst), 0);
        assert!(ticks.load(Ordering::SeqCst) <= 3);
        ring.shutdown();
    }

    #[test]
    fn stop_wakes_loop_within_half_interval() {
        let hw = Arc::new(SimulatedHardware::new());
        let ring = RingCoordinator::new(fast_config(1_000));
        ring.start(hw.clone()).expect("start");

        let (_ticks, on_tick) = counter();
        let (_expired, on_expired) = counter();
        ring.start_ringing(on_tick, on_expired);
        assert!(wait_for(Duration::from_secs(1), || hw.is_ringing()));

        let stopped_at = Instant::now();
        ring.stop_ringing();
        assert!(wait_for(Duration::from_millis(500), || !hw.is_ringing()));
        assert!(stopped_at.elapsed() < Duration::from_millis(500));
        ring.shutdown();
    }

    #[test]
    fn new_session_resets_cycle_count() {
        let hw = Arc::new(SimulatedHardware::new());
        let ring = RingCoordinator::new(fast_config(20));
        ring.start(hw).expect("start");

        let (first_ticks, on_tick) = counter();
        let (_e, on_expired) = counter();
        ring.start_ringing(on_tick, on_expired);
        assert!(wait_for(Duration::from_secs(2), || ring.cycle_count() >= 3));

        let (second_ticks, on_tick) = counter();
        let (_e2, on_expired) = counter();
        ring.start_ringing(on_tick, on_expired);
        assert!(wait_for(Duration::from_secs(1), || second_ticks.load(Ordering::SeqCst) >= 1));
        assert!(ring.cycle_count() <= 2);
        assert!(first_ticks.load(Ordering::SeqCst) >= 3);
        ring.shutdown();
    }

    #[test]
    fn hook_listener_sees_each_edge_once() {
        let hw = Arc::new(SimulatedHardware::new());
        let ring = RingCoordinator::new(fast_config(20));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        ring.set_hook_listener(Arc::new(move |s| sink.lock().push(s)));
        ring.start(hw.clone()).expect("start");

        thread::sleep(Duration::from_millis(30));
        assert!(seen.lock().is_empty(), "initial on-hook is not an edge");

        hw.set_hook(HookState::OffHook);
        assert!(wait_for(Duration::from_secs(1), || seen.lock().len() == 1));
        hw.set_hook(HookState::OnHook);
        assert!(wait_for(Duration::from_secs(1), || seen.lock().len() == 2));

        thread::sleep(Duration::from_millis(40));
        assert_eq!(*seen.lock(), vec![HookState::OffHook, HookState::OnHook]);
        ring.shutdown();
    }

    #[test]
    fn read_failures_keep_previous_state() {
        let hw = Arc::new(SimulatedHardware::new());
        hw.fail_next_reads(8);
        let ring = RingCoordinator::new(fast_config(20));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        ring.set_hook_listener(Arc::new(move |s| sink.lock().push(s)));
        ring.start(hw.clone()).expect("start");

        thread::sleep(Duration::from_millis(80));
        assert!(seen.lock().is_empty());

        hw.set_hook(HookState::OffHook);
        assert!(wait_for(Duration::from_secs(1), || seen.lock().len() == 1));
        assert_eq!(seen.lock()[0], HookState::OffHook);
        ring.shutdown();
    }

    #[test]
    fn start_twice_is_rejected() {
        let hw = Arc::new(SimulatedHardware::new());
        let ring = RingCoordinator::new(fast_config(20));
        ring.start(hw.clone()).expect("first start");
        assert!(matches!(ring.start(hw), Err(PhoneError::AlreadyRunning)));
        ring.shutdown();
    }
}
