use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

/// Cancellation signal shared between the registry and the owning connection.
///
/// The registry side sets the flag when a cancel request arrives with the
/// right `(pid, secret)` pair; the connection consumes it at its next frame
/// boundary. Taking the flag resets it, so each cancel request interrupts at
/// most one query.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of the query in flight, if any.
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Consumes a pending cancellation request.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// A registry of active backend connections.
///
/// Cancel requests arrive on their own short-lived connections carrying a
/// `(pid, secret)` pair; the registry routes them to the flag of the live
/// connection they name.
pub struct Registry {
    // pid -> ConnectionHandle
    connections: Mutex<HashMap<i32, ConnectionHandle>>,
}

struct ConnectionHandle {
    secret_key: i32,
    cancel: CancelFlag,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a new connection and returns its cancel flag.
    pub fn register(&self, pid: i32, secret_key: i32) -> CancelFlag {
        let cancel = CancelFlag::new();
        self.connections.lock().insert(
            pid,
            ConnectionHandle {
                secret_key,
                cancel: cancel.clone(),
            },
        );
        cancel
    }

    /// Unregisters a connection when it terminates.
    pub fn unregister(&self, pid: i32) {
        self.connections.lock().remove(&pid);
    }

    /// Whether a connection with this pid is currently registered.
    pub fn contains(&self, pid: i32) -> bool {
        self.connections.lock().contains_key(&pid)
    }

    /// Attempts to cancel a connection identified by its pid and secret key.
    /// Unknown pids and mismatched secrets are ignored; cancellation is fire
    /// and forget, with no delivery signal back to the requester.
    pub fn cancel(&self, pid: i32, secret_key: i32) {
        let conns = self.connections.lock();
        if let Some(handle) = conns.get(&pid)
            && handle.secret_key == secret_key
        {
            handle.cancel.set();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_is_one_shot() {
        let flag = CancelFlag::new();
        assert!(!flag.take());
        flag.set();
        assert!(flag.take());
        assert!(!flag.take());
    }

    #[test]
    fn test_cancel_with_matching_secret() {
        let registry = Registry::new();
        let cancel = registry.register(7, 1234);

        registry.cancel(7, 1234);
        assert!(cancel.take());
    }

    #[test]
    fn test_cancel_with_wrong_secret_is_ignored() {
        let registry = Registry::new();
        let cancel = registry.register(7, 1234);

        registry.cancel(7, 9999);
        assert!(!cancel.take());
    }

    #[test]
    fn test_cancel_unknown_pid_is_ignored() {
        let registry = Registry::new();
        registry.cancel(42, 1234);
    }

    #[test]
    fn test_register_unregister() {
        let registry = Registry::new();
        registry.register(3, 99);
        assert!(registry.contains(3));
        registry.unregister(3);
        assert!(!registry.contains(3));

        // Cancel after unregister is a no-op
        registry.cancel(3, 99);
    }
}
