use crate::driver::{NativeError, NativeResult, SystemDriver, ZfsDriver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::debug;
use zetta_core::ErrorCode;

/// Description string reported when the error slot is clear.
const NO_ERROR: &str = "no error";

/// Capability object wrapping one native library context.
///
/// Every pool and dataset object is bound to a Handle and funnels its native
/// calls through it. The Handle owns the per-context last-error slot: each
/// call overwrites it: success clears it, failure stores the (code, action,
/// description) triple. Callers that care about a failure must read the slot
/// before issuing another call on the same Handle; when several objects share
/// one Handle, only one call-then-read sequence may be in flight at a time
/// (use one Handle per thread for concurrent work).
pub struct Handle {
    driver: Arc<dyn ZfsDriver>,
    error: Mutex<Option<NativeError>>,
    print_on_error: AtomicBool,
}

impl Handle {
    /// Open a handle backed by the platform zfs/zpool tooling. Never fails;
    /// a broken native environment surfaces through the error slot on first
    /// use instead.
    pub fn open() -> Arc<Handle> {
        Self::with_driver(Arc::new(SystemDriver::new()))
    }

    /// Open a handle over an explicit driver (injection seam for tests).
    pub fn with_driver(driver: Arc<dyn ZfsDriver>) -> Arc<Handle> {
        Arc::new(Handle {
            driver,
            error: Mutex::new(None),
            print_on_error: AtomicBool::new(false),
        })
    }

    /// The process-wide default handle, lazily created on first use and
    /// reused, never recreated, on repeated lookups.
    pub fn shared() -> Arc<Handle> {
        static SHARED: OnceLock<Arc<Handle>> = OnceLock::new();
        SHARED.get_or_init(Handle::open).clone()
    }

    /// Errno of the last native call; 0 when it succeeded.
    pub fn errno(&self) -> i32 {
        self.error
            .lock()
            .expect("error slot poisoned")
            .as_ref()
            .map_or(0, |e| e.code.as_raw())
    }

    /// Typed code of the last failure, if any.
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error
            .lock()
            .expect("error slot poisoned")
            .as_ref()
            .map(|e| e.code)
    }

    /// The failing operation, e.g. `cannot open 'tpool/home'`; empty when
    /// the last call succeeded.
    pub fn error_action(&self) -> String {
        self.error
            .lock()
            .expect("error slot poisoned")
            .as_ref()
            .map_or_else(String::new, |e| e.action.clone())
    }

    /// The failure cause, e.g. `dataset does not exist`; `"no error"` when
    /// the last call succeeded.
    pub fn error_description(&self) -> String {
        self.error
            .lock()
            .expect("error slot poisoned")
            .as_ref()
            .map_or_else(|| NO_ERROR.to_string(), |e| e.description.clone())
    }

    /// The full last-error triple for wrapping layers that prefer a typed
    /// value over polling the individual accessors.
    pub fn last_error(&self) -> Option<NativeError> {
        self.error.lock().expect("error slot poisoned").clone()
    }

    /// Toggle echoing of native failures to stderr.
    pub fn print_on_error(&self, enabled: bool) {
        self.print_on_error.store(enabled, Ordering::Relaxed);
    }

    /// Whether the underlying driver supports iSCSI share operations.
    pub fn iscsi_supported(&self) -> bool {
        self.driver.iscsi_supported()
    }

    pub(crate) fn driver(&self) -> &Arc<dyn ZfsDriver> {
        &self.driver
    }

    /// Route a driver result through the error slot: success clears it and
    /// yields the value, failure stores the triple and yields `None`.
    pub(crate) fn record<T>(&self, result: NativeResult<T>) -> Option<T> {
        let mut slot = self.error.lock().expect("error slot poisoned");
        match result {
            Ok(value) => {
                *slot = None;
                Some(value)
            }
            Err(err) => {
                debug!("native call failed: {}", err);
                if self.print_on_error.load(Ordering::Relaxed) {
                    eprintln!("{}", err);
                }
                *slot = Some(err);
                None
            }
        }
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle").field("errno", &self.errno()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MockDriver;

    fn make_handle() -> Arc<Handle> {
        Handle::with_driver(Arc::new(MockDriver::new()))
    }

    #[test]
    fn test_fresh_handle_reports_no_error() {
        let handle = make_handle();
        assert_eq!(handle.errno(), 0);
        assert_eq!(handle.error_action(), "");
        assert_eq!(handle.error_description(), "no error");
        assert!(handle.error_code().is_none());
    }

    #[test]
    fn test_failure_populates_slot_and_success_clears_it() {
        let handle = make_handle();

        let missing: NativeResult<()> = Err(NativeError::new(
            ErrorCode::NoEntity,
            "cannot open 'tpool/home'",
            "dataset does not exist",
        ));
        assert!(handle.record(missing).is_none());
        assert_eq!(handle.errno(), 2009);
        assert_eq!(handle.error_action(), "cannot open 'tpool/home'");
        assert_eq!(handle.error_description(), "dataset does not exist");

        assert_eq!(handle.record(Ok(7)), Some(7));
        assert_eq!(handle.errno(), 0);
        assert_eq!(handle.error_description(), "no error");
    }

    #[test]
    fn test_shared_handle_is_cached() {
        let first = Handle::shared();
        let second = Handle::shared();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
