//! Shared rig for lifecycle scenario tests: a started engine wired to
//! simulated collaborators with shortened timings.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rotary_core::{
    Collaborators, DialogConfig, Directory, EngineConfig, HookState, LifecycleState,
    LoopbackProvider, PhoneEngine, PowerControl, RecordingPrompter, RingConfig, Scripted,
    ScriptedRecognizer, SimulatedHardware, StatusEvent, StatusObserver,
};

pub const PATIENCE: Duration = Duration::from_secs(5);

/// Poll `cond` every 5 ms until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

#[derive(Default)]
pub struct CountingPower {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl CountingPower {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl PowerControl for CountingPower {
    fn acquire_foreground(&self) {
        self.acquired.fetch_add(1, Ordering::SeqCst);
    }

    fn release_foreground(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct StatusLog(Mutex<Vec<StatusEvent>>);

impl StatusLog {
    pub fn statuses(&self) -> Vec<String> {
        self.0.lock().iter().map(|e| e.status.clone()).collect()
    }

    pub fn states(&self) -> Vec<LifecycleState> {
        self.0.lock().iter().map(|e| e.state).collect()
    }

    pub fn saw(&self, status: &str) -> bool {
        self.0.lock().iter().any(|e| e.status == status)
    }
}

impl StatusObserver for StatusLog {
    fn status_updated(&self, event: &StatusEvent) {
        self.0.lock().push(event.clone());
    }
}

pub fn fast_config() -> EngineConfig {
    EngineConfig {
        ring: RingConfig {
            ring_interval: Duration::from_millis(20),
            max_ring_cycles: 12,
            hook_poll_interval: Duration::from_millis(5),
        },
        dialog: DialogConfig {
            listen_window: Duration::from_millis(80),
            confirm_window: Duration::from_millis(40),
            playback_timeout: Duration::from_millis(10),
        },
        settle_delay: Duration::from_millis(10),
    }
}

pub struct Rig {
    pub engine: PhoneEngine,
    pub hardware: Arc<SimulatedHardware>,
    pub provider: Arc<LoopbackProvider>,
    pub recognizer: Arc<ScriptedRecognizer>,
    pub prompts: Arc<RecordingPrompter>,
    pub power: Arc<CountingPower>,
    pub log: Arc<StatusLog>,
}

impl Rig {
    /// Engine built but not started.
    pub fn new(config: EngineConfig, script: Vec<Scripted>, directory: Directory) -> Self {
        let hardware = Arc::new(SimulatedHardware::new());
        let provider = Arc::new(LoopbackProvider::new("+15550000"));
        let recognizer = Arc::new(ScriptedRecognizer::with_script(script));
        let prompts = Arc::new(RecordingPrompter::new());
        let power = Arc::new(CountingPower::default());
        let log = Arc::new(StatusLog::default());

        let engine = PhoneEngine::new(
            config,
            Collaborators {
                hardware: hardware.clone(),
                provider: provider.clone(),
                recognizer: recognizer.clone(),
                prompts: prompts.clone(),
                power: power.clone(),
                directory: Arc::new(directory),
            },
        )
        .expect("engine should build");
        engine.add_status_observer(log.clone());

        Self {
            engine,
            hardware,
            provider,
            recognizer,
            prompts,
            power,
            log,
        }
    }

    /// Engine started with the fast timings.
    pub fn started(script: Vec<Scripted>, directory: Directory) -> Self {
        let rig = Self::new(fast_config(), script, directory);
        rig.engine.start().expect("engine should start");
        rig
    }

    pub fn lift(&self) {
        self.hardware.set_hook(HookState::OffHook);
    }

    pub fn hang_up(&self) {
        self.hardware.set_hook(HookState::OnHook);
    }

    pub fn wait_for_state(&self, state: LifecycleState) -> bool {
        wait_for(PATIENCE, || self.engine.state() == state)
    }
}
