// scanline_core/src/utils.rs

//! Small numeric and locking helpers shared across the crate.

use num_traits::Float;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Divides `numerator` by `denominator`, yielding zero when the denominator is
/// not strictly positive.
pub fn ratio_or_zero<T: Float>(numerator: T, denominator: T) -> T {
    if denominator > T::zero() {
        numerator / denominator
    } else {
        T::zero()
    }
}

/// Rounds a non-negative value to the nearest count. Negative and NaN inputs map to zero.
pub fn round_to_count<T: Float>(value: T) -> usize {
    value.round().to_usize().unwrap_or(0)
}

/// Locks a mutex, recovering the guard if a previous holder panicked.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
