//! Process-wide cooperative shutdown flag.
//!
//! A single SIGINT sets the exit flag; any `fill` blocked on the sample
//! source notices it within one wait quantum and returns
//! [`Cancelled`](crate::error::Error::Cancelled). A second SIGINT terminates
//! the process immediately.
//!
//! The handler restricts itself to async-signal-safe operations: a `write`
//! to stderr and a store to an atomic flag.

use std::sync::atomic::{AtomicBool, Ordering};

static EXIT_REQUESTED: AtomicBool = AtomicBool::new(false);

/// True once shutdown has been requested.
pub fn exit_requested() -> bool {
    EXIT_REQUESTED.load(Ordering::Relaxed)
}

/// Request shutdown. Safe to call from any thread (the signal handler uses
/// it) — blocked consumers wake at their next flag poll.
pub fn request_exit() {
    EXIT_REQUESTED.store(true, Ordering::Relaxed);
}

/// Install the SIGINT handler.
pub fn install_signal_handler() {
    // SAFETY: sa_handler points to an async-signal-safe function and the
    // sigaction struct is fully initialised.
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handle_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
        libc::sigemptyset(&mut action.sa_mask);
        libc::sigaction(libc::SIGINT, &action, std::ptr::null_mut());
    }
}

extern "C" fn handle_signal(_signum: libc::c_int) {
    if EXIT_REQUESTED.load(Ordering::Relaxed) {
        // Second signal: give up on the cooperative path.
        let msg = b"\nForcing exit.\n";
        unsafe {
            libc::write(2, msg.as_ptr() as *const libc::c_void, msg.len());
            libc::_exit(1);
        }
    }

    let msg = b"\nSignal received, stopping...\n";
    unsafe {
        libc::write(2, msg.as_ptr() as *const libc::c_void, msg.len());
    }
    EXIT_REQUESTED.store(true, Ordering::Relaxed);
}

#[cfg(test)]
pub(crate) fn clear_exit_for_tests() {
    EXIT_REQUESTED.store(false, Ordering::Relaxed);
}

/// Serialises tests that toggle the process-wide flag.
#[cfg(test)]
pub(crate) static FLAG_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_and_clear() {
        let _serial = FLAG_LOCK.lock().unwrap();
        clear_exit_for_tests();
        assert!(!exit_requested());
        request_exit();
        assert!(exit_requested());
        clear_exit_for_tests();
        assert!(!exit_requested());
    }
}
