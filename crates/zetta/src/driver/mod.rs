mod mock;
mod system;

pub use mock::MockDriver;
pub use system::SystemDriver;

use zetta_core::{DatasetKind, ErrorCode, PoolState, PoolStatus, TypeMask};

/// Error produced by a failing native call.
///
/// Carries the errno code plus the human-readable (action, description) pair
/// the native tooling prints, e.g. `cannot open 'tpool/home'` /
/// `dataset does not exist`. The owning [`Handle`](crate::Handle) stores the
/// last one of these per context.
#[derive(Debug, Clone)]
pub struct NativeError {
    pub code: ErrorCode,
    pub action: String,
    pub description: String,
}

impl NativeError {
    pub fn new(
        code: ErrorCode,
        action: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            code,
            action: action.into(),
            description: description.into(),
        }
    }
}

impl std::fmt::Display for NativeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.action, self.description)
    }
}

/// Per-call result from a driver operation
pub type NativeResult<T> = Result<T, NativeError>;

/// Opaque id of an open native pool handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolHandle(pub(crate) u64);

/// Opaque id of an open native dataset handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DatasetHandle(pub(crate) u64);

/// Which related datasets a child enumeration yields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Children {
    /// Direct child filesystems
    Filesystems,
    /// Snapshots of the dataset itself
    Snapshots,
    /// Everything whose existence depends on the dataset: descendants,
    /// snapshots, and clones of those snapshots, transitively
    Dependents,
}

/// Trait for native ZFS administration backends
///
/// This is the boundary with the native library: open/close of pool and
/// dataset handles, property primitives, lifecycle operations, and child
/// enumeration. `SystemDriver` drives the platform zfs/zpool tooling;
/// `MockDriver` is an in-memory implementation for testing.
///
/// Handles returned by the open calls are exclusively owned by the wrapping
/// object and must be closed exactly once; `*_close` on an unknown id is a
/// no-op so RAII release stays idempotent. Every fallible operation reports
/// through [`NativeResult`]; the `Handle` layer folds these into its
/// per-context error slot.
pub trait ZfsDriver: Send + Sync {
    // --- Pools ---

    fn pool_open(&self, name: &str) -> NativeResult<PoolHandle>;
    fn pool_close(&self, handle: PoolHandle);
    /// Names of all pools currently visible, fresh on every call.
    fn pool_names(&self) -> NativeResult<Vec<String>>;
    fn pool_state(&self, handle: PoolHandle) -> NativeResult<PoolState>;
    fn pool_status(&self, handle: PoolHandle) -> NativeResult<PoolStatus>;
    /// Numeric pool property (guid, version, size, used, capacity).
    fn pool_get_num(&self, handle: PoolHandle, prop: &str) -> NativeResult<u64>;
    /// String pool property; `None` when unset/inapplicable.
    fn pool_get(&self, handle: PoolHandle, prop: &str) -> NativeResult<Option<String>>;
    fn pool_set(&self, handle: PoolHandle, prop: &str, value: &str) -> NativeResult<()>;

    // --- Dataset lifecycle ---

    /// Open a dataset by name when its kind matches the mask.
    fn dataset_open(&self, name: &str, mask: TypeMask)
        -> NativeResult<(DatasetHandle, DatasetKind)>;
    fn dataset_close(&self, handle: DatasetHandle);
    fn dataset_exists(&self, name: &str, mask: TypeMask) -> NativeResult<bool>;
    fn dataset_create(&self, name: &str, kind: DatasetKind) -> NativeResult<()>;
    /// Destroy the dataset behind the handle. On success the handle is
    /// invalid and must not be passed to any further call.
    fn dataset_destroy(&self, handle: DatasetHandle) -> NativeResult<()>;
    fn dataset_rename(
        &self,
        handle: DatasetHandle,
        new_name: &str,
        recursive: bool,
    ) -> NativeResult<()>;
    /// Create a snapshot named `dataset@suffix`.
    fn snapshot_create(&self, full_name: &str) -> NativeResult<()>;
    /// Clone the snapshot behind `handle` into a new dataset `target`.
    fn clone_create(&self, handle: DatasetHandle, target: &str) -> NativeResult<()>;
    fn promote(&self, handle: DatasetHandle) -> NativeResult<()>;
    fn rollback(
        &self,
        handle: DatasetHandle,
        snapshot: DatasetHandle,
        force: bool,
    ) -> NativeResult<()>;

    // --- Properties ---

    /// Native property value; nice-formatted unless `literal`. `None` when
    /// unset/inapplicable.
    fn dataset_get(
        &self,
        handle: DatasetHandle,
        prop: &str,
        literal: bool,
    ) -> NativeResult<Option<String>>;
    /// User-defined (`module:key`) property value; `None` when never set.
    fn dataset_get_user(&self, handle: DatasetHandle, prop: &str)
        -> NativeResult<Option<String>>;
    fn dataset_set(&self, handle: DatasetHandle, prop: &str, value: &str) -> NativeResult<()>;

    // --- Mount and share ---

    fn mount(&self, handle: DatasetHandle) -> NativeResult<()>;
    fn unmount(&self, handle: DatasetHandle) -> NativeResult<()>;
    fn is_mounted(&self, handle: DatasetHandle) -> NativeResult<bool>;
    /// Share per whichever share property is enabled; success when none is.
    fn share(&self, handle: DatasetHandle) -> NativeResult<()>;
    fn unshare(&self, handle: DatasetHandle) -> NativeResult<()>;
    fn is_shared(&self, handle: DatasetHandle) -> NativeResult<bool>;
    fn share_nfs(&self, handle: DatasetHandle) -> NativeResult<()>;
    fn unshare_nfs(&self, handle: DatasetHandle) -> NativeResult<()>;
    /// Share path when NFS-shared, else `None`.
    fn nfs_share_path(&self, handle: DatasetHandle) -> NativeResult<Option<String>>;
    fn share_smb(&self, handle: DatasetHandle) -> NativeResult<()>;
    fn unshare_smb(&self, handle: DatasetHandle) -> NativeResult<()>;
    fn smb_share_path(&self, handle: DatasetHandle) -> NativeResult<Option<String>>;
    /// Whether this driver supports iSCSI shares at all. Callers must probe
    /// before invoking the iSCSI operations.
    fn iscsi_supported(&self) -> bool;
    fn share_iscsi(&self, handle: DatasetHandle) -> NativeResult<()>;
    fn unshare_iscsi(&self, handle: DatasetHandle) -> NativeResult<()>;
    fn is_shared_iscsi(&self, handle: DatasetHandle) -> NativeResult<bool>;

    // --- Enumeration ---

    /// Names of all root filesystems (one per visible pool).
    fn root_datasets(&self) -> NativeResult<Vec<String>>;
    /// Names of datasets related to the handle per `which`.
    fn children(&self, handle: DatasetHandle, which: Children) -> NativeResult<Vec<String>>;
}
