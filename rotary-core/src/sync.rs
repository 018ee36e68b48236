//! Cooperative cancellation shared by the dialog worker and the lifecycle worker.
//!
//! A `CancelToken` is a one-shot flag paired with a condition variable, so a
//! thread parked in [`CancelToken::sleep`] wakes as soon as another thread
//! calls [`CancelToken::cancel`] instead of waiting out its timeout. Waiters
//! parked on their own condition variable hook in with
//! [`CancelToken::on_cancel`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

type CancelHook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct TokenState {
    cancelled: bool,
    hooks: Vec<CancelHook>,
}

#[derive(Default)]
struct TokenInner {
    state: Mutex<TokenState>,
    cv: Condvar,
}

/// Cloneable cancellation handle. All clones observe the same flag.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag, wake every sleeper and run the registered hooks.
    /// Idempotent.
    pub fn cancel(&self) {
        let hooks = {
            let mut state = self.inner.state.lock();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            self.inner.cv.notify_all();
            std::mem::take(&mut state.hooks)
        };
        for hook in hooks {
            hook();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.state.lock().cancelled
    }

    /// Run `hook` once when the token is cancelled, or right away if it
    /// already is. Hooks run on the cancelling thread with no token lock held.
    pub fn on_cancel(&self, hook: impl FnOnce() + Send + 'static) {
        {
            let mut state = self.inner.state.lock();
            if !state.cancelled {
                state.hooks.push(Box::new(hook));
                return;
            }
        }
        hook();
    }

    /// Block for up to `timeout`. Returns `true` if the token was (or became)
    /// cancelled, `false` if the full timeout elapsed.
    pub fn sleep(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while !state.cancelled {
            if self.inner.cv.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.cancelled
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
