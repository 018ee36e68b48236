//! Handset hardware abstraction.
//!
//! The `HardwareProvider` trait is a thin driver seam: it reports the raw hook
//! sensor level and actuates the ringer. Edge detection and ring timing live
//! in [`ring::RingCoordinator`], never in the driver.

pub mod ring;
pub mod stub;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use ring::{RingConfig, RingCoordinator};
pub use stub::SimulatedHardware;

/// Position of the handset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookState {
    /// Handset resting in the cradle.
    OnHook,
    /// Handset lifted.
    OffHook,
}

impl HookState {
    pub fn is_on_hook(self) -> bool {
        self == HookState::OnHook
    }

    /// Map a raw sensor level (`true` = switch closed by the cradle).
    pub fn from_sensor(on_hook: bool) -> Self {
        if on_hook {
            HookState::OnHook
        } else {
            HookState::OffHook
        }
    }
}

impl std::fmt::Display for HookState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookState::OnHook => f.write_str("on hook"),
            HookState::OffHook => f.write_str("off hook"),
        }
    }
}

/// Contract for the hook sensor / ringer driver.
pub trait HardwareProvider: Send + Sync + 'static {
    /// Open the device. Called once from `PhoneEngine::start`.
    fn initialize(&self) -> Result<()>;

    /// Drive the ringer coil.
    fn set_ringing(&self, ringing: bool) -> Result<()>;

    /// Sample the hook switch. Un-debounced; may fail transiently.
    fn read_hook(&self) -> Result<HookState>;
}

/// Foreground / wake resources held while the handset is in use.
pub trait PowerControl: Send + Sync + 'static {
    fn acquire_foreground(&self);
    fn release_foreground(&self);
}

/// `PowerControl` for hosts that have nothing to keep awake.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPower;

impl PowerControl for NoopPower {
    fn acquire_foreground(&self) {}

    fn release_foreground(&self) {}
}
