use super::{Children, DatasetHandle, NativeError, NativeResult, PoolHandle, ZfsDriver};
use crate::command::{exec_unchecked, CommandOutput};
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use tracing::{debug, info};
use zetta_core::{DatasetKind, ErrorCode, PoolState, PoolStatus, TypeMask};

#[derive(Debug, Clone)]
enum Target {
    Pool(String),
    Dataset(String),
}

#[derive(Debug, Default)]
struct HandleTable {
    entries: HashMap<u64, Target>,
    next: u64,
}

impl HandleTable {
    fn alloc(&mut self, target: Target) -> u64 {
        self.next += 1;
        self.entries.insert(self.next, target);
        self.next
    }
}

/// Driver over the platform `zfs` and `zpool` tooling.
///
/// Handles are entries in a process-local table mapping back to entity names;
/// every operation resolves the name and shells out. Failures are classified
/// from the tooling's stderr, which consistently prints
/// `cannot <action>: <description>` on its first line.
pub struct SystemDriver {
    handles: Mutex<HandleTable>,
}

impl Default for SystemDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemDriver {
    pub fn new() -> Self {
        Self {
            handles: Mutex::new(HandleTable::default()),
        }
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HandleTable> {
        self.handles.lock().expect("handle table poisoned")
    }

    fn pool_name(&self, handle: PoolHandle) -> NativeResult<String> {
        match self.table().entries.get(&handle.0) {
            Some(Target::Pool(name)) => Ok(name.clone()),
            _ => Err(stale_handle()),
        }
    }

    fn dataset_name(&self, handle: DatasetHandle) -> NativeResult<String> {
        match self.table().entries.get(&handle.0) {
            Some(Target::Dataset(name)) => Ok(name.clone()),
            _ => Err(stale_handle()),
        }
    }

    fn run(&self, program: &str, args: &[&str]) -> NativeResult<CommandOutput> {
        let output = exec_unchecked(program, args).map_err(|err| {
            NativeError::new(
                ErrorCode::Io,
                format!("cannot run '{}'", program),
                err.to_string(),
            )
        })?;
        if output.success() {
            Ok(output)
        } else {
            let err = parse_native_error(&output.stderr);
            debug!("{} failed: {}", program, err);
            Err(err)
        }
    }

    fn zfs(&self, args: &[&str]) -> NativeResult<CommandOutput> {
        self.run("zfs", args)
    }

    fn zpool(&self, args: &[&str]) -> NativeResult<CommandOutput> {
        self.run("zpool", args)
    }

    /// Kind of the named dataset; `Ok(None)` when it does not exist.
    fn query_kind(&self, name: &str) -> NativeResult<Option<DatasetKind>> {
        match self.zfs(&["get", "-H", "-o", "value", "type", name]) {
            Ok(out) => Ok(DatasetKind::parse(out.stdout.trim())),
            Err(err) if err.code == ErrorCode::NoEntity => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn get_value(&self, name: &str, prop: &str, literal: bool) -> NativeResult<Option<String>> {
        let out = if literal {
            self.zfs(&["get", "-H", "-p", "-o", "value", prop, name])?
        } else {
            self.zfs(&["get", "-H", "-o", "value", prop, name])?
        };
        let value = out.stdout.trim().to_string();
        if value.is_empty() || value == "-" {
            Ok(None)
        } else {
            Ok(Some(value))
        }
    }

    fn list_names(&self, args: &[&str]) -> NativeResult<Vec<String>> {
        let out = self.zfs(args)?;
        Ok(out
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

fn stale_handle() -> NativeError {
    NativeError::new(ErrorCode::Unknown, "internal error", "stale handle")
}

/// Classify a failing command from its stderr.
///
/// The tooling's first line is `<action>: <description>`; the description
/// text determines the errno code.
fn parse_native_error(stderr: &str) -> NativeError {
    let line = stderr
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    let (action, description) = match line.split_once(": ") {
        Some((a, d)) => (a.to_string(), d.to_string()),
        None => (line.to_string(), String::new()),
    };
    let code = classify(&description);
    NativeError::new(code, action, description)
}

fn classify(description: &str) -> ErrorCode {
    let d = description.to_ascii_lowercase();
    if d.contains("does not exist") || d.contains("no such pool") || d.contains("no datasets") {
        ErrorCode::NoEntity
    } else if d.contains("already exists") {
        ErrorCode::Exists
    } else if d.contains("dependent clones")
        || d.contains("has children")
        || d.contains("more recent snapshots")
        || d.contains("busy")
    {
        ErrorCode::Busy
    } else if d.contains("permission denied") {
        ErrorCode::Permission
    } else if d.contains("read-only") || d.contains("readonly") {
        ErrorCode::ReadOnlyProperty
    } else if d.contains("invalid property") || d.contains("bad property") {
        ErrorCode::InvalidProperty
    } else if d.contains("must be") {
        ErrorCode::InvalidPropertyType
    } else if d.contains("invalid character") || d.contains("invalid name") {
        ErrorCode::InvalidName
    } else if d.contains("name is too long") {
        ErrorCode::NameTooLong
    } else if d.contains("out of space") || d.contains("quota") {
        ErrorCode::NoSpace
    } else if d.contains("mounted") {
        ErrorCode::MountFailed
    } else if d.contains("i/o error") || d.contains("suspended") {
        ErrorCode::Io
    } else if d.contains("unsupported") || d.contains("not supported") {
        ErrorCode::PoolNotSupported
    } else {
        ErrorCode::Unknown
    }
}

impl ZfsDriver for SystemDriver {
    fn pool_open(&self, name: &str) -> NativeResult<PoolHandle> {
        self.zpool(&["list", "-H", "-o", "name", name])?;
        let id = self.table().alloc(Target::Pool(name.to_string()));
        Ok(PoolHandle(id))
    }

    fn pool_close(&self, handle: PoolHandle) {
        self.table().entries.remove(&handle.0);
    }

    fn pool_names(&self) -> NativeResult<Vec<String>> {
        let out = self.zpool(&["list", "-H", "-o", "name"])?;
        Ok(out
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn pool_state(&self, handle: PoolHandle) -> NativeResult<PoolState> {
        let name = self.pool_name(handle)?;
        let out = self.zpool(&["list", "-H", "-o", "health", &name])?;
        Ok(match out.stdout.trim() {
            "ONLINE" | "DEGRADED" | "FAULTED" => PoolState::Active,
            "OFFLINE" => PoolState::Exported,
            "UNAVAIL" | "REMOVED" => PoolState::Unavailable,
            _ => PoolState::Unknown,
        })
    }

    fn pool_status(&self, handle: PoolHandle) -> NativeResult<PoolStatus> {
        let name = self.pool_name(handle)?;
        let out = self.zpool(&["list", "-H", "-o", "health", &name])?;
        Ok(match out.stdout.trim() {
            "ONLINE" => PoolStatus::Ok,
            "DEGRADED" => PoolStatus::MissingDevNr,
            "FAULTED" => PoolStatus::FaultedDevNr,
            "OFFLINE" => PoolStatus::OfflineDev,
            "REMOVED" => PoolStatus::RemovedDev,
            "UNAVAIL" => PoolStatus::MissingDevNr,
            _ => PoolStatus::Unknown,
        })
    }

    fn pool_get_num(&self, handle: PoolHandle, prop: &str) -> NativeResult<u64> {
        let name = self.pool_name(handle)?;
        let out = self.zpool(&["get", "-H", "-p", "-o", "value", prop, &name])?;
        let raw = out.stdout.trim().trim_end_matches(['%', 'x']);
        raw.parse::<u64>().map_err(|_| {
            NativeError::new(
                ErrorCode::InvalidProperty,
                format!("cannot get property for '{}'", name),
                format!("'{}' is not a numeric pool property", prop),
            )
        })
    }

    fn pool_get(&self, handle: PoolHandle, prop: &str) -> NativeResult<Option<String>> {
        let name = self.pool_name(handle)?;
        let out = self.zpool(&["get", "-H", "-o", "value", prop, &name])?;
        let value = out.stdout.trim().to_string();
        if value.is_empty() || value == "-" {
            Ok(None)
        } else {
            Ok(Some(value))
        }
    }

    fn pool_set(&self, handle: PoolHandle, prop: &str, value: &str) -> NativeResult<()> {
        let name = self.pool_name(handle)?;
        info!("setting {}={} on pool '{}'", prop, value, name);
        let assignment = format!("{}={}", prop, value);
        self.zpool(&["set", &assignment, &name])?;
        Ok(())
    }

    fn dataset_open(
        &self,
        name: &str,
        mask: TypeMask,
    ) -> NativeResult<(DatasetHandle, DatasetKind)> {
        let kind = self.query_kind(name)?.filter(|k| mask.contains(*k));
        let Some(kind) = kind else {
            return Err(NativeError::new(
                ErrorCode::NoEntity,
                format!("cannot open '{}'", name),
                "dataset does not exist",
            ));
        };
        let id = self.table().alloc(Target::Dataset(name.to_string()));
        Ok((DatasetHandle(id), kind))
    }

    fn dataset_close(&self, handle: DatasetHandle) {
        self.table().entries.remove(&handle.0);
    }

    fn dataset_exists(&self, name: &str, mask: TypeMask) -> NativeResult<bool> {
        Ok(self.query_kind(name)?.is_some_and(|k| mask.contains(k)))
    }

    fn dataset_create(&self, name: &str, kind: DatasetKind) -> NativeResult<()> {
        info!("creating {} '{}'", kind, name);
        match kind {
            DatasetKind::Filesystem => self.zfs(&["create", name])?,
            // Volumes are created sparse at a nominal size; callers size them
            // through the volsize property.
            DatasetKind::Volume => self.zfs(&["create", "-s", "-V", "1G", name])?,
            DatasetKind::Snapshot => {
                return Err(NativeError::new(
                    ErrorCode::InvalidDatasetType,
                    format!("cannot create '{}'", name),
                    "snapshots must be created through the snapshot operation",
                ));
            }
        };
        Ok(())
    }

    fn dataset_destroy(&self, handle: DatasetHandle) -> NativeResult<()> {
        let name = self.dataset_name(handle)?;
        info!("destroying '{}'", name);
        self.zfs(&["destroy", &name])?;
        Ok(())
    }

    fn dataset_rename(
        &self,
        handle: DatasetHandle,
        new_name: &str,
        recursive: bool,
    ) -> NativeResult<()> {
        let name = self.dataset_name(handle)?;
        info!("renaming '{}' to '{}'", name, new_name);
        if recursive {
            self.zfs(&["rename", "-r", &name, new_name])?;
        } else {
            self.zfs(&["rename", &name, new_name])?;
        }
        let mut table = self.table();
        for target in table.entries.values_mut() {
            if let Target::Dataset(n) = target {
                if *n == name {
                    *n = new_name.to_string();
                }
            }
        }
        Ok(())
    }

    fn snapshot_create(&self, full_name: &str) -> NativeResult<()> {
        info!("creating snapshot '{}'", full_name);
        self.zfs(&["snapshot", full_name])?;
        Ok(())
    }

    fn clone_create(&self, handle: DatasetHandle, target: &str) -> NativeResult<()> {
        let name = self.dataset_name(handle)?;
        info!("cloning '{}' to '{}'", name, target);
        self.zfs(&["clone", &name, target])?;
        Ok(())
    }

    fn promote(&self, handle: DatasetHandle) -> NativeResult<()> {
        let name = self.dataset_name(handle)?;
        info!("promoting '{}'", name);
        self.zfs(&["promote", &name])?;
        Ok(())
    }

    fn rollback(
        &self,
        handle: DatasetHandle,
        snapshot: DatasetHandle,
        force: bool,
    ) -> NativeResult<()> {
        let _ = self.dataset_name(handle)?;
        let snap_name = self.dataset_name(snapshot)?;
        info!("rolling back to '{}'", snap_name);
        if force {
            self.zfs(&["rollback", "-r", &snap_name])?;
        } else {
            self.zfs(&["rollback", &snap_name])?;
        }
        Ok(())
    }

    fn dataset_get(
        &self,
        handle: DatasetHandle,
        prop: &str,
        literal: bool,
    ) -> NativeResult<Option<String>> {
        let name = self.dataset_name(handle)?;
        self.get_value(&name, prop, literal)
    }

    fn dataset_get_user(
        &self,
        handle: DatasetHandle,
        prop: &str,
    ) -> NativeResult<Option<String>> {
        let name = self.dataset_name(handle)?;
        self.get_value(&name, prop, false)
    }

    fn dataset_set(&self, handle: DatasetHandle, prop: &str, value: &str) -> NativeResult<()> {
        let name = self.dataset_name(handle)?;
        info!("setting {}={} on '{}'", prop, value, name);
        let assignment = format!("{}={}", prop, value);
        self.zfs(&["set", &assignment, &name])?;
        Ok(())
    }

    fn mount(&self, handle: DatasetHandle) -> NativeResult<()> {
        let name = self.dataset_name(handle)?;
        info!("mounting '{}'", name);
        self.zfs(&["mount", &name])?;
        Ok(())
    }

    fn unmount(&self, handle: DatasetHandle) -> NativeResult<()> {
        let name = self.dataset_name(handle)?;
        info!("unmounting '{}'", name);
        self.zfs(&["unmount", &name])?;
        Ok(())
    }

    fn is_mounted(&self, handle: DatasetHandle) -> NativeResult<bool> {
        let name = self.dataset_name(handle)?;
        Ok(self.get_value(&name, "mounted", false)?.as_deref() == Some("yes"))
    }

    fn share(&self, handle: DatasetHandle) -> NativeResult<()> {
        let name = self.dataset_name(handle)?;
        match self.zfs(&["share", &name]) {
            Ok(_) => Ok(()),
            // Sharing with every share property off is a successful no-op.
            Err(err) if err.description.contains("set to 'off'") => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn unshare(&self, handle: DatasetHandle) -> NativeResult<()> {
        let name = self.dataset_name(handle)?;
        match self.zfs(&["unshare", &name]) {
            Ok(_) => Ok(()),
            Err(err) if err.description.contains("not currently shared") => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn is_shared(&self, handle: DatasetHandle) -> NativeResult<bool> {
        let name = self.dataset_name(handle)?;
        let mounted = self.get_value(&name, "mounted", false)?.as_deref() == Some("yes");
        if !mounted {
            return Ok(false);
        }
        let nfs = self.get_value(&name, "sharenfs", false)?;
        let smb = self.get_value(&name, "sharesmb", false)?;
        Ok(nfs.is_some_and(|v| v != "off") || smb.is_some_and(|v| v != "off"))
    }

    fn share_nfs(&self, handle: DatasetHandle) -> NativeResult<()> {
        let name = self.dataset_name(handle)?;
        self.zfs(&["share", &name])?;
        Ok(())
    }

    fn unshare_nfs(&self, handle: DatasetHandle) -> NativeResult<()> {
        let name = self.dataset_name(handle)?;
        self.zfs(&["unshare", &name])?;
        Ok(())
    }

    fn nfs_share_path(&self, handle: DatasetHandle) -> NativeResult<Option<String>> {
        let name = self.dataset_name(handle)?;
        let nfs = self.get_value(&name, "sharenfs", false)?;
        if nfs.is_some_and(|v| v != "off") {
            self.get_value(&name, "mountpoint", false)
        } else {
            Ok(None)
        }
    }

    fn share_smb(&self, handle: DatasetHandle) -> NativeResult<()> {
        let name = self.dataset_name(handle)?;
        self.zfs(&["share", &name])?;
        Ok(())
    }

    fn unshare_smb(&self, handle: DatasetHandle) -> NativeResult<()> {
        let name = self.dataset_name(handle)?;
        self.zfs(&["unshare", &name])?;
        Ok(())
    }

    fn smb_share_path(&self, handle: DatasetHandle) -> NativeResult<Option<String>> {
        let name = self.dataset_name(handle)?;
        let smb = self.get_value(&name, "sharesmb", false)?;
        if smb.is_some_and(|v| v != "off") {
            // SMB share names replace the dataset path separator.
            Ok(Some(name.replace('/', "_")))
        } else {
            Ok(None)
        }
    }

    fn iscsi_supported(&self) -> bool {
        false
    }

    fn share_iscsi(&self, handle: DatasetHandle) -> NativeResult<()> {
        let name = self.dataset_name(handle)?;
        Err(NativeError::new(
            ErrorCode::ShareIscsiFailed,
            format!("cannot share '{}'", name),
            "iSCSI is not supported on this platform",
        ))
    }

    fn unshare_iscsi(&self, handle: DatasetHandle) -> NativeResult<()> {
        let name = self.dataset_name(handle)?;
        Err(NativeError::new(
            ErrorCode::UnshareIscsiFailed,
            format!("cannot unshare '{}'", name),
            "iSCSI is not supported on this platform",
        ))
    }

    fn is_shared_iscsi(&self, handle: DatasetHandle) -> NativeResult<bool> {
        let _ = self.dataset_name(handle)?;
        Ok(false)
    }

    fn root_datasets(&self) -> NativeResult<Vec<String>> {
        self.pool_names()
    }

    fn children(&self, handle: DatasetHandle, which: Children) -> NativeResult<Vec<String>> {
        let name = self.dataset_name(handle)?;
        match which {
            Children::Filesystems => {
                let names = self.list_names(&[
                    "list", "-H", "-r", "-d", "1", "-o", "name", "-t", "filesystem,volume", &name,
                ])?;
                Ok(names.into_iter().filter(|n| *n != name).collect())
            }
            Children::Snapshots => {
                let names = self.list_names(&[
                    "list", "-H", "-d", "1", "-o", "name", "-t", "snapshot", &name,
                ])?;
                Ok(names.into_iter().filter(|n| *n != name).collect())
            }
            Children::Dependents => {
                // Descendants and their snapshots come from a recursive
                // listing; clones are chased through origin properties to a
                // fixpoint so indirect dependents are included.
                let mut set: BTreeSet<String> = self
                    .list_names(&["list", "-H", "-r", "-o", "name", "-t", "all", &name])?
                    .into_iter()
                    .collect();
                set.insert(name.clone());
                let out = self.zfs(&[
                    "list", "-H", "-o", "name,origin", "-t", "filesystem,volume",
                ])?;
                let origins: Vec<(String, String)> = out
                    .stdout
                    .lines()
                    .filter_map(|line| {
                        let mut parts = line.split_whitespace();
                        let ds = parts.next()?.to_string();
                        let origin = parts.next()?.to_string();
                        (origin != "-").then_some((ds, origin))
                    })
                    .collect();
                loop {
                    let mut added = false;
                    for (ds, origin) in &origins {
                        if set.contains(origin) && set.insert(ds.clone()) {
                            added = true;
                        }
                    }
                    if !added {
                        break;
                    }
                }
                set.remove(&name);
                Ok(set.into_iter().collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_classification() {
        let err = parse_native_error("cannot open 'tpool/home': dataset does not exist\n");
        assert_eq!(err.code, ErrorCode::NoEntity);
        assert_eq!(err.action, "cannot open 'tpool/home'");
        assert_eq!(err.description, "dataset does not exist");

        let err = parse_native_error("cannot create 'tpool/fs': dataset already exists");
        assert_eq!(err.code, ErrorCode::Exists);

        let err = parse_native_error("cannot destroy 'tpool/fs@s': snapshot has dependent clones");
        assert_eq!(err.code, ErrorCode::Busy);

        let err = parse_native_error("cannot mount 'tpool/fs': permission denied");
        assert_eq!(err.code, ErrorCode::Permission);

        let err = parse_native_error("something inscrutable happened");
        assert_eq!(err.code, ErrorCode::Unknown);
    }

    #[test]
    fn test_handle_table_release() {
        let driver = SystemDriver::new();
        let id = driver.table().alloc(Target::Dataset("tpool".to_string()));
        assert_eq!(driver.dataset_name(DatasetHandle(id)).unwrap(), "tpool");
        driver.dataset_close(DatasetHandle(id));
        assert!(driver.dataset_name(DatasetHandle(id)).is_err());
    }
}
