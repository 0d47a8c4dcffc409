use crate::driver::{NativeError, PoolHandle};
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::iter::PoolIter;
use std::sync::Arc;
use tracing::debug;
use zetta_core::{pool_prop, ErrorCode, PoolState, PoolStatus, PropertyKind, PropertyValue};

/// A storage pool bound to a [`Handle`].
///
/// Opening never fails: a missing pool still yields a `Pool` object whose
/// native side is absent, with the failure parked in the handle's error slot.
/// Accessors on such an object keep reporting the open failure and return
/// neutral defaults, so callers that skip the errno check degrade gracefully
/// instead of crashing.
pub struct Pool {
    handle: Arc<Handle>,
    native: Option<PoolHandle>,
    name: String,
}

impl Pool {
    /// Open a pool by name. Check [`Handle::errno`] (or [`Pool::is_open`])
    /// afterwards; a missing pool reports `NoEntity` there.
    pub fn open(name: &str, handle: &Arc<Handle>) -> Pool {
        debug!("opening pool '{}'", name);
        let native = handle.record(handle.driver().pool_open(name));
        Pool {
            handle: handle.clone(),
            native,
            name: name.to_string(),
        }
    }

    /// [`Pool::open`] on the process-wide default handle.
    pub fn open_default(name: &str) -> Pool {
        Self::open(name, &Handle::shared())
    }

    /// All pools currently visible through the handle.
    pub fn iter(handle: &Arc<Handle>) -> PoolIter {
        match handle.record(handle.driver().pool_names()) {
            Some(names) => PoolIter::new(handle.clone(), names),
            None => PoolIter::empty(handle.clone()),
        }
    }

    /// [`Pool::iter`] on the process-wide default handle.
    pub fn iter_default() -> PoolIter {
        Self::iter(&Handle::shared())
    }

    /// Whether the native pool was actually found at open time.
    pub fn is_open(&self) -> bool {
        self.native.is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> &Arc<Handle> {
        &self.handle
    }

    fn missing(&self) -> NativeError {
        NativeError::new(
            ErrorCode::NoEntity,
            format!("cannot open '{}'", self.name),
            "no such pool",
        )
    }

    /// Run `op` against the native pool, or re-report the open failure and
    /// fall back to `default` when there is none.
    fn with_native<T>(
        &self,
        default: T,
        op: impl FnOnce(PoolHandle) -> crate::driver::NativeResult<T>,
    ) -> T {
        match self.native {
            Some(native) => self.handle.record(op(native)).unwrap_or(default),
            None => {
                self.handle.record::<()>(Err(self.missing()));
                default
            }
        }
    }

    pub fn state(&self) -> PoolState {
        self.with_native(PoolState::Unknown, |h| self.handle.driver().pool_state(h))
    }

    pub fn health_status(&self) -> PoolStatus {
        self.with_native(PoolStatus::Unknown, |h| self.handle.driver().pool_status(h))
    }

    pub fn healthy(&self) -> bool {
        self.health_status().is_healthy()
    }

    pub fn guid(&self) -> u64 {
        self.with_native(0, |h| self.handle.driver().pool_get_num(h, "guid"))
    }

    pub fn version(&self) -> u64 {
        self.with_native(0, |h| self.handle.driver().pool_get_num(h, "version"))
    }

    /// Bytes allocated in the pool.
    pub fn space_used(&self) -> u64 {
        self.with_native(0, |h| self.handle.driver().pool_get_num(h, "used"))
    }

    /// Total pool capacity in bytes.
    pub fn space_total(&self) -> u64 {
        self.with_native(0, |h| self.handle.driver().pool_get_num(h, "size"))
    }

    /// Read a native pool property.
    ///
    /// Unknown names are a caller error and fail eagerly; native failures
    /// land in the handle's error slot with a `None` return. Numeric
    /// properties come back as [`PropertyValue::Number`], everything else as
    /// text.
    pub fn get(&self, prop: &str) -> Result<Option<PropertyValue>> {
        let def = pool_prop(prop).ok_or_else(|| Error::unknown_property(prop))?;
        let value = match def.kind {
            PropertyKind::Number => self
                .with_native(None, |h| {
                    self.handle.driver().pool_get_num(h, prop).map(Some)
                })
                .map(PropertyValue::Number),
            _ => self
                .with_native(None, |h| self.handle.driver().pool_get(h, prop))
                .map(PropertyValue::Text),
        };
        Ok(value)
    }

    /// Set a writable pool property. Returns whether the native call
    /// succeeded; failures (including read-only targets) report through the
    /// handle's error slot.
    pub fn set(&self, prop: &str, value: &str) -> Result<bool> {
        let def = pool_prop(prop).ok_or_else(|| Error::unknown_property(prop))?;
        if def.readonly {
            self.handle.record::<()>(Err(NativeError::new(
                ErrorCode::ReadOnlyProperty,
                format!("cannot set property for '{}'", self.name),
                format!("'{}' is readonly", prop),
            )));
            return Ok(false);
        }
        let ok = self
            .with_native(None, |h| {
                self.handle.driver().pool_set(h, prop, value).map(Some)
            })
            .is_some();
        Ok(ok)
    }

    /// Release the native pool handle. Also happens on drop; calling twice
    /// is harmless.
    pub fn close(&mut self) {
        if let Some(native) = self.native.take() {
            self.handle.driver().pool_close(native);
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.name)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MockDriver;

    fn fixture() -> (Arc<MockDriver>, Arc<Handle>) {
        let driver = Arc::new(MockDriver::new());
        driver.add_pool("tpool");
        let handle = Handle::with_driver(driver.clone());
        (driver, handle)
    }

    #[test]
    fn test_open_existing_pool() {
        let (_, handle) = fixture();
        let pool = Pool::open("tpool", &handle);
        assert!(pool.is_open());
        assert_eq!(handle.errno(), 0);
        assert_eq!(pool.name(), "tpool");
        assert_eq!(pool.state(), PoolState::Active);
        assert_eq!(pool.health_status(), PoolStatus::Ok);
        assert!(pool.healthy());
        assert!(pool.guid() > 0);
        assert_eq!(pool.version(), 22);
        assert!(pool.space_total() > pool.space_used());
    }

    #[test]
    fn test_open_missing_pool_defers_error() {
        let (_, handle) = fixture();
        let pool = Pool::open("fakepool", &handle);
        assert!(!pool.is_open());
        assert_eq!(handle.errno(), 2009);
        assert_eq!(handle.error_action(), "cannot open 'fakepool'");
        assert_eq!(handle.error_description(), "no such pool");

        // Accessors keep reporting the failure and return defaults.
        let good = Pool::open("tpool", &handle);
        assert_eq!(handle.errno(), 0);
        let _ = good;
        assert_eq!(pool.state(), PoolState::Unknown);
        assert_eq!(handle.errno(), 2009);
        assert_eq!(pool.guid(), 0);
        assert_eq!(pool.health_status(), PoolStatus::Unknown);
    }

    #[test]
    fn test_get_typed_properties() {
        let (_, handle) = fixture();
        let pool = Pool::open("tpool", &handle);

        let guid = pool.get("guid").unwrap().unwrap();
        assert!(guid.as_number().is_some());

        let health = pool.get("health").unwrap().unwrap();
        assert_eq!(health.as_text(), Some("ONLINE"));

        assert!(matches!(
            pool.get("nosuchprop"),
            Err(Error::UnknownProperty { .. })
        ));
    }

    #[test]
    fn test_set_writable_and_readonly() {
        let (_, handle) = fixture();
        let pool = Pool::open("tpool", &handle);

        assert!(pool.set("bootfs", "tpool").unwrap());
        assert_eq!(handle.errno(), 0);
        assert_eq!(
            pool.get("bootfs").unwrap().unwrap().as_text(),
            Some("tpool")
        );

        assert!(!pool.set("guid", "12345").unwrap());
        assert_eq!(handle.errno(), 2002);
        assert!(matches!(
            pool.set("nosuchprop", "x"),
            Err(Error::UnknownProperty { .. })
        ));
    }

    #[test]
    fn test_iteration_and_handle_release() {
        let (driver, handle) = fixture();
        driver.add_pool("upool");

        let names: Vec<String> = Pool::iter(&handle).map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["tpool", "upool"]);
        assert_eq!(driver.open_handle_count(), 0);

        // Breaking early still releases whatever was opened.
        for pool in Pool::iter(&handle) {
            assert!(pool.is_open());
            break;
        }
        assert_eq!(driver.open_handle_count(), 0);
    }
}
