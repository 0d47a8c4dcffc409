use crate::driver::{Children, DatasetHandle, NativeError, NativeResult};
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::iter::DatasetIter;
use std::sync::Arc;
use tracing::debug;
use zetta_core::{dataset_prop, is_user_prop, DatasetKind, ErrorCode, TypeMask};

/// A filesystem, snapshot or volume bound to a [`Handle`].
///
/// Operations come in two failure tiers. Contract violations, like asking for
/// a property that does not exist or cloning something that is not a
/// snapshot, fail eagerly with [`Error`]. Native failures never do: the
/// operation stores the (errno, action, description) triple in the handle's
/// error slot and returns a sentinel, `-1` for the int-returning calls,
/// `false` or `None` elsewhere. Success clears the slot.
pub struct Dataset {
    handle: Arc<Handle>,
    native: Option<DatasetHandle>,
    name: String,
    kind: DatasetKind,
}

impl Dataset {
    /// Open a dataset whose kind matches `mask`. `None` means it does not
    /// exist (or has the wrong kind); the handle's error slot holds the
    /// details.
    pub fn open(name: &str, mask: TypeMask, handle: &Arc<Handle>) -> Option<Dataset> {
        debug!("opening dataset '{}'", name);
        let (native, kind) = handle.record(handle.driver().dataset_open(name, mask))?;
        Some(Dataset {
            handle: handle.clone(),
            native: Some(native),
            name: name.to_string(),
            kind,
        })
    }

    /// [`Dataset::open`] accepting any dataset kind.
    pub fn open_any(name: &str, handle: &Arc<Handle>) -> Option<Dataset> {
        Self::open(name, TypeMask::ANY, handle)
    }

    /// [`Dataset::open_any`] on the process-wide default handle.
    pub fn open_default(name: &str) -> Option<Dataset> {
        Self::open_any(name, &Handle::shared())
    }

    /// Whether a dataset of a matching kind exists.
    pub fn exists(name: &str, mask: TypeMask, handle: &Arc<Handle>) -> bool {
        handle
            .record(handle.driver().dataset_exists(name, mask))
            .unwrap_or(false)
    }

    pub fn exists_default(name: &str) -> bool {
        Self::exists(name, TypeMask::ANY, &Handle::shared())
    }

    /// Create a filesystem or volume and open it. `None` on native failure
    /// (missing parent, name collision, invalid name).
    pub fn create(name: &str, kind: DatasetKind, handle: &Arc<Handle>) -> Option<Dataset> {
        handle.record(handle.driver().dataset_create(name, kind))?;
        Self::open(name, kind.as_mask(), handle)
    }

    pub fn create_default(name: &str, kind: DatasetKind) -> Option<Dataset> {
        Self::create(name, kind, &Handle::shared())
    }

    /// The root filesystem of every visible pool.
    pub fn roots(handle: &Arc<Handle>) -> DatasetIter {
        match handle.record(handle.driver().root_datasets()) {
            Some(names) => DatasetIter::new(handle.clone(), names, TypeMask::FILESYSTEM),
            None => DatasetIter::empty(handle.clone(), TypeMask::FILESYSTEM),
        }
    }

    pub fn roots_default() -> DatasetIter {
        Self::roots(&Handle::shared())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DatasetKind {
        self.kind
    }

    pub fn handle(&self) -> &Arc<Handle> {
        &self.handle
    }

    fn native(&self) -> NativeResult<DatasetHandle> {
        self.native.ok_or_else(|| {
            NativeError::new(
                ErrorCode::NoEntity,
                format!("cannot open '{}'", self.name),
                "dataset does not exist",
            )
        })
    }

    /// Fold a unit-returning native call into the 0/-1 convention.
    fn run_int(&self, result: NativeResult<()>) -> i32 {
        match self.handle.record(result) {
            Some(()) => 0,
            None => -1,
        }
    }

    fn run_unit(&self, op: impl FnOnce(DatasetHandle) -> NativeResult<()>) -> i32 {
        match self.native() {
            Ok(native) => self.run_int(op(native)),
            Err(err) => self.run_int(Err(err)),
        }
    }

    fn run_query<T>(&self, op: impl FnOnce(DatasetHandle) -> NativeResult<T>) -> Option<T> {
        match self.native() {
            Ok(native) => self.handle.record(op(native)),
            Err(err) => self.handle.record(Err(err)),
        }
    }

    // --- Lifecycle ---

    /// Create the snapshot `full_name` (`dataset@suffix`) and open it.
    /// `None` on native failure.
    pub fn snapshot_named(full_name: &str, handle: &Arc<Handle>) -> Option<Dataset> {
        handle.record(handle.driver().snapshot_create(full_name))?;
        Dataset::open(full_name, TypeMask::SNAPSHOT, handle)
    }

    pub fn snapshot_named_default(full_name: &str) -> Option<Dataset> {
        Self::snapshot_named(full_name, &Handle::shared())
    }

    /// Create a snapshot of this dataset named `<name>@<suffix>` and open
    /// it. `None` on native failure.
    pub fn snapshot(&self, suffix: &str) -> Option<Dataset> {
        Self::snapshot_named(&format!("{}@{}", self.name, suffix), &self.handle)
    }

    /// Rename the dataset, keeping this object bound to the new name.
    /// Recursive mode renames a snapshot suffix across all descendants.
    pub fn rename(&mut self, new_name: &str, recursive: bool) -> i32 {
        let rc = self.run_unit(|native| {
            self.handle
                .driver()
                .dataset_rename(native, new_name, recursive)
        });
        if rc == 0 {
            self.name = new_name.to_string();
        }
        rc
    }

    /// Destroy the dataset. After a `0` return the object is stale and only
    /// fit for dropping.
    pub fn destroy(&self) -> i32 {
        self.run_unit(|native| self.handle.driver().dataset_destroy(native))
    }

    /// Clone this snapshot into a new dataset at `target`.
    pub fn clone_to(&self, target: &str) -> Result<Option<Dataset>> {
        if self.kind != DatasetKind::Snapshot {
            return Err(Error::unsupported_capability(
                "clone",
                format!("'{}' is a {}, only snapshots can be cloned", self.name, self.kind),
            ));
        }
        let created = self
            .run_query(|native| self.handle.driver().clone_create(native, target))
            .is_some();
        if !created {
            return Ok(None);
        }
        Ok(Dataset::open(
            target,
            TypeMask::FILESYSTEM | TypeMask::VOLUME,
            &self.handle,
        ))
    }

    /// Promote this clone, reversing its dependency on the origin snapshot.
    pub fn promote(&self) -> Result<bool> {
        if self.kind == DatasetKind::Snapshot {
            return Err(Error::unsupported_capability(
                "promote",
                "snapshots cannot be promoted",
            ));
        }
        Ok(self
            .run_query(|native| self.handle.driver().promote(native))
            .is_some())
    }

    /// Roll this dataset back to `snapshot`. Without `force` the snapshot
    /// must be the most recent one; with it, intermediate snapshots are
    /// destroyed. The target snapshot itself survives.
    pub fn rollback(&self, snapshot: &Dataset, force: bool) -> Result<bool> {
        if self.kind == DatasetKind::Snapshot {
            return Err(Error::unsupported_capability(
                "rollback",
                "snapshots cannot be rolled back",
            ));
        }
        if snapshot.kind != DatasetKind::Snapshot {
            return Err(Error::unsupported_capability(
                "rollback",
                format!("'{}' is not a snapshot", snapshot.name),
            ));
        }
        let snap_native = match self.handle.record(snapshot.native()) {
            Some(native) => native,
            None => return Ok(false),
        };
        Ok(self
            .run_query(|native| self.handle.driver().rollback(native, snap_native, force))
            .is_some())
    }

    // --- Properties ---

    /// Native property value, nice-formatted. Unknown names and user
    /// property names are caller errors.
    pub fn get(&self, prop: &str) -> Result<Option<String>> {
        self.get_impl(prop, false)
    }

    /// Native property value in literal (machine) form.
    pub fn get_literal(&self, prop: &str) -> Result<Option<String>> {
        self.get_impl(prop, true)
    }

    fn get_impl(&self, prop: &str, literal: bool) -> Result<Option<String>> {
        if is_user_prop(prop) {
            return Err(Error::user_property(prop));
        }
        if dataset_prop(prop).is_none() {
            return Err(Error::unknown_property(prop));
        }
        Ok(self
            .run_query(|native| self.handle.driver().dataset_get(native, prop, literal))
            .flatten())
    }

    /// User-defined (`module:key`) property value; `None` when never set.
    pub fn get_user_prop(&self, prop: &str) -> Result<Option<String>> {
        if !is_user_prop(prop) {
            return Err(Error::unknown_property(prop));
        }
        Ok(self
            .run_query(|native| self.handle.driver().dataset_get_user(native, prop))
            .flatten())
    }

    /// Set a native or user property. Returns `0` on success, `-1` with the
    /// failure in the error slot otherwise; read-only and unknown names are
    /// reported there too rather than eagerly.
    pub fn set(&self, prop: &str, value: &str) -> i32 {
        if !is_user_prop(prop) {
            let action = format!("cannot set property for '{}'", self.name);
            match dataset_prop(prop) {
                None => {
                    return self.run_int(Err(NativeError::new(
                        ErrorCode::InvalidProperty,
                        action,
                        format!("invalid property '{}'", prop),
                    )));
                }
                Some(def) if def.readonly => {
                    return self.run_int(Err(NativeError::new(
                        ErrorCode::ReadOnlyProperty,
                        action,
                        format!("'{}' is readonly", prop),
                    )));
                }
                Some(_) => {}
            }
        }
        self.run_unit(|native| self.handle.driver().dataset_set(native, prop, value))
    }

    // --- Mount and share ---

    pub fn mount(&self) -> i32 {
        self.run_unit(|native| self.handle.driver().mount(native))
    }

    pub fn unmount(&self) -> i32 {
        self.run_unit(|native| self.handle.driver().unmount(native))
    }

    pub fn is_mounted(&self) -> bool {
        self.run_query(|native| self.handle.driver().is_mounted(native))
            .unwrap_or(false)
    }

    /// Share over whichever protocols the share properties enable.
    pub fn share(&self) -> i32 {
        self.run_unit(|native| self.handle.driver().share(native))
    }

    pub fn unshare(&self) -> i32 {
        self.run_unit(|native| self.handle.driver().unshare(native))
    }

    pub fn is_shared(&self) -> bool {
        self.run_query(|native| self.handle.driver().is_shared(native))
            .unwrap_or(false)
    }

    pub fn share_nfs(&self) -> i32 {
        self.run_unit(|native| self.handle.driver().share_nfs(native))
    }

    pub fn unshare_nfs(&self) -> i32 {
        self.run_unit(|native| self.handle.driver().unshare_nfs(native))
    }

    /// The NFS export path when shared, else `None`.
    pub fn nfs_share_name(&self) -> Option<String> {
        self.run_query(|native| self.handle.driver().nfs_share_path(native))
            .flatten()
    }

    pub fn is_shared_nfs(&self) -> bool {
        self.nfs_share_name().is_some()
    }

    pub fn share_smb(&self) -> i32 {
        self.run_unit(|native| self.handle.driver().share_smb(native))
    }

    pub fn unshare_smb(&self) -> i32 {
        self.run_unit(|native| self.handle.driver().unshare_smb(native))
    }

    pub fn smb_share_name(&self) -> Option<String> {
        self.run_query(|native| self.handle.driver().smb_share_path(native))
            .flatten()
    }

    pub fn is_shared_smb(&self) -> bool {
        self.smb_share_name().is_some()
    }

    fn require_iscsi(&self, operation: &str) -> Result<()> {
        if self.handle.iscsi_supported() {
            Ok(())
        } else {
            Err(Error::unsupported_capability(
                operation,
                "iSCSI shares are not supported on this platform",
            ))
        }
    }

    pub fn share_iscsi(&self) -> Result<i32> {
        self.require_iscsi("share_iscsi")?;
        Ok(self.run_unit(|native| self.handle.driver().share_iscsi(native)))
    }

    pub fn unshare_iscsi(&self) -> Result<i32> {
        self.require_iscsi("unshare_iscsi")?;
        Ok(self.run_unit(|native| self.handle.driver().unshare_iscsi(native)))
    }

    pub fn is_shared_iscsi(&self) -> Result<bool> {
        self.require_iscsi("is_shared_iscsi")?;
        Ok(self
            .run_query(|native| self.handle.driver().is_shared_iscsi(native))
            .unwrap_or(false))
    }

    // --- Traversal ---

    fn iter_children(&self, which: Children, mask: TypeMask) -> DatasetIter {
        match self.run_query(|native| self.handle.driver().children(native, which)) {
            Some(names) => DatasetIter::new(self.handle.clone(), names, mask),
            None => DatasetIter::empty(self.handle.clone(), mask),
        }
    }

    /// Direct child filesystems and volumes.
    pub fn filesystems(&self) -> DatasetIter {
        self.iter_children(Children::Filesystems, TypeMask::FILESYSTEM | TypeMask::VOLUME)
    }

    /// Snapshots of this dataset.
    pub fn snapshots(&self) -> DatasetIter {
        self.iter_children(Children::Snapshots, TypeMask::SNAPSHOT)
    }

    /// Everything whose existence depends on this dataset, transitively:
    /// descendants, snapshots, and clones of those snapshots.
    pub fn dependents(&self) -> DatasetIter {
        self.iter_children(Children::Dependents, TypeMask::ANY)
    }

    /// Release the native handle. Also happens on drop; calling twice is
    /// harmless.
    pub fn close(&mut self) {
        if let Some(native) = self.native.take() {
            self.handle.driver().dataset_close(native);
        }
    }
}

impl Drop for Dataset {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}
