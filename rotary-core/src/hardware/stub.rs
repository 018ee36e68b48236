//! `SimulatedHardware`: in-memory hook switch and ringer.
//!
//! Used by the test-suite and by the console bench in `rotary-app`. The hook
//! level is flipped with [`SimulatedHardware::set_hook`]; sensor and ringer
//! failures can be injected to exercise the error paths.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tracing::debug;

use super::{HardwareProvider, HookState};
use crate::error::{PhoneError, Result};

#[derive(Debug)]
pub struct SimulatedHardware {
    on_hook: AtomicBool,
    ringing: AtomicBool,
    initialized: AtomicBool,
    fail_init: AtomicBool,
    fail_ringer: AtomicBool,
    /// Number of upcoming `read_hook` calls that should fail.
    failing_reads: AtomicUsize,
    ring_edges: AtomicUsize,
}

impl SimulatedHardware {
    pub fn new() -> Self {
        Self {
            on_hook: AtomicBool::new(true),
            ringing: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            fail_init: AtomicBool::new(false),
            fail_ringer: AtomicBool::new(false),
            failing_reads: AtomicUsize::new(0),
            ring_edges: AtomicUsize::new(0),
        }
    }

    pub fn set_hook(&self, state: HookState) {
        debug!(%state, "simulated hook moved");
        self.on_hook.store(state.is_on_hook(), Ordering::SeqCst);
    }

    pub fn is_ringing(&self) -> bool {
        self.ringing.load(Ordering::SeqCst)
    }

    /// Number of off→on ringer transitions seen so far.
    pub fn ring_pulses(&self) -> usize {
        self.ring_edges.load(Ordering::SeqCst)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn fail_next_reads(&self, count: usize) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    pub fn fail_initialize(&self, fail: bool) {
        self.fail_init.store(fail, Ordering::SeqCst);
    }

    /// Make every ringer actuation fail until cleared.
    pub fn fail_ringer(&self, fail: bool) {
        self.fail_ringer.store(fail, Ordering::SeqCst);
    }
}

impl Default for SimulatedHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareProvider for SimulatedHardware {
    fn initialize(&self) -> Result<()> {
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(PhoneError::ProviderInit("simulated hardware offline".into()));
        }
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn set_ringing(&self, ringing: bool) -> Result<()> {
        if self.fail_ringer.load(Ordering::SeqCst) {
            return Err(PhoneError::Ringer("simulated coil fault".into()));
        }
        let was = self.ringing.swap(ringing, Ordering::SeqCst);
        if ringing && !was {
            self.ring_edges.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn read_hook(&self) -> Result<HookState> {
        let pending_failures = self.failing_reads.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.failing_reads
                .store(pending_failures - 1, Ordering::SeqCst);
            return Err(PhoneError::HardwareRead("simulated sensor glitch".into()));
        }
        Ok(HookState::from_sensor(self.on_hook.load(Ordering::SeqCst)))
    }
}
