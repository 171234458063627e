pub mod auth;
pub mod config;
pub mod error;
pub mod expenses;
pub mod state;
pub mod storage;
pub mod subscription;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks without propagating poisoning. No critical section panics halfway
/// through a mutation.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
