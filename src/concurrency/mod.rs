//! Cancellation for guest runs
//!
//! The bridge itself is confined to one thread. A [`CancellationToken`] is the
//! only object other threads touch: they cancel it, and whoever runs the guest
//! waits on it or registers a callback that interrupts the engine.
//!
//! # Example
//! ```
//! use gowasm::CancellationToken;
//!
//! let token = CancellationToken::new();
//! let child = token.child_token();
//! token.cancel();
//! assert!(child.is_cancelled());
//! ```

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

type Callback = Box<dyn FnOnce() + Send>;

struct TokenState {
    cancelled: bool,
    callbacks: Vec<Callback>,
}

struct TokenInner {
    state: Mutex<TokenState>,
    cancelled: Condvar,
}

impl TokenInner {
    fn lock(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A cloneable, thread-safe cancellation signal
///
/// Clones share the signal. Child tokens are cancelled with their parent but
/// can also be cancelled on their own.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                state: Mutex::new(TokenState {
                    cancelled: false,
                    callbacks: Vec::new(),
                }),
                cancelled: Condvar::new(),
            }),
        }
    }

    /// Signal cancellation; only the first call has any effect
    pub fn cancel(&self) {
        let callbacks = {
            let mut state = self.inner.lock();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            std::mem::take(&mut state.callbacks)
        };
        self.inner.cancelled.notify_all();
        // Run outside the lock: a callback may cancel a child token.
        for callback in callbacks {
            callback();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().cancelled
    }

    /// Run `callback` once the token is cancelled, immediately if it already is
    pub fn on_cancel(&self, callback: impl FnOnce() + Send + 'static) {
        {
            let mut state = self.inner.lock();
            if !state.cancelled {
                state.callbacks.push(Box::new(callback));
                return;
            }
        }
        callback();
    }

    /// A token that is cancelled together with this one
    pub fn child_token(&self) -> Self {
        let child = Self::new();
        let handle = child.clone();
        self.on_cancel(move || handle.cancel());
        child
    }

    /// Block until cancelled
    pub fn wait(&self) {
        let mut state = self.inner.lock();
        while !state.cancelled {
            state = self
                .inner
                .cancelled
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until cancelled or `timeout` elapses; returns whether cancelled
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.lock();
        while !state.cancelled {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .inner
                .cancelled
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
