//! Shared test support.
//!
//! The pool module is process-wide state, so tests that init/finalize it
//! serialize through this lock. Every test balances its `init` calls with
//! `finalize` before releasing the guard.

use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

pub fn module_guard() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}
