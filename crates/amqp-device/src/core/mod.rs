pub(crate) mod c2d;
pub mod device;
pub(crate) mod disposition;
pub mod router;
pub(crate) mod send_task;

use std::sync::{Mutex, MutexGuard};

// Single-threaded cooperative use cannot poison these mutexes; recover the
// guard instead of propagating a panic.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	match mutex.lock() {
		Ok(guard) => guard,
		Err(poisoned) => poisoned.into_inner(),
	}
}
