use super::{Children, DatasetHandle, NativeError, NativeResult, PoolHandle, ZfsDriver};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;
use tracing::debug;
use zetta_core::{
    dataset_prop, nicenum, pool_prop, DatasetKind, ErrorCode, PoolState, PoolStatus, PropertyKind,
    TypeMask,
};

const DEFAULT_POOL_SIZE: u64 = 100 * 1024 * 1024 * 1024;
const DEFAULT_POOL_USED: u64 = 2 * 1024 * 1024 * 1024;
const DEFAULT_POOL_VERSION: u64 = 22;
const DEFAULT_DATASET_USED: u64 = 24 * 1024;
const DEFAULT_VOLSIZE: u64 = 1024 * 1024 * 1024;
const DEFAULT_VOLBLOCKSIZE: u64 = 8 * 1024;

#[derive(Debug, Clone)]
struct MockPool {
    guid: u64,
    version: u64,
    state: PoolState,
    status: PoolStatus,
    size: u64,
    used: u64,
    props: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
struct MockDataset {
    kind: DatasetKind,
    guid: u64,
    /// Logical transaction group at creation; orders snapshots in time.
    created: u64,
    /// Full snapshot name this dataset was cloned from.
    origin: Option<String>,
    mounted: bool,
    shared_nfs: bool,
    shared_smb: bool,
    shared_iscsi: bool,
    props: BTreeMap<String, String>,
    user_props: BTreeMap<String, String>,
    /// Simulated content, captured by snapshots and restored by rollback.
    files: BTreeSet<String>,
}

impl MockDataset {
    fn new(kind: DatasetKind, guid: u64, created: u64) -> Self {
        Self {
            kind,
            guid,
            created,
            origin: None,
            mounted: false,
            shared_nfs: false,
            shared_smb: false,
            shared_iscsi: false,
            props: BTreeMap::new(),
            user_props: BTreeMap::new(),
            files: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone)]
enum Target {
    Pool(String),
    Dataset(String),
}

#[derive(Debug, Default)]
struct State {
    pools: BTreeMap<String, MockPool>,
    datasets: BTreeMap<String, MockDataset>,
    handles: HashMap<u64, Target>,
    next_handle: u64,
    next_guid: u64,
    txg: u64,
}

impl State {
    fn alloc(&mut self, target: Target) -> u64 {
        self.next_handle += 1;
        self.handles.insert(self.next_handle, target);
        self.next_handle
    }

    fn next_txg(&mut self) -> u64 {
        self.txg += 1;
        self.txg
    }

    fn next_guid(&mut self) -> u64 {
        self.next_guid += 1;
        0x9000 + self.next_guid
    }

    fn pool_name(&self, handle: PoolHandle) -> NativeResult<String> {
        match self.handles.get(&handle.0) {
            Some(Target::Pool(name)) => Ok(name.clone()),
            _ => Err(stale_handle()),
        }
    }

    fn dataset_name(&self, handle: DatasetHandle) -> NativeResult<String> {
        match self.handles.get(&handle.0) {
            Some(Target::Dataset(name)) => Ok(name.clone()),
            _ => Err(stale_handle()),
        }
    }

    /// Resolve a dataset handle to its name, verifying the entry still exists.
    fn live_dataset(&self, handle: DatasetHandle) -> NativeResult<String> {
        let name = self.dataset_name(handle)?;
        if self.datasets.contains_key(&name) {
            Ok(name)
        } else {
            Err(no_dataset("open", &name))
        }
    }

    fn direct_children(&self, name: &str) -> Vec<String> {
        let prefix = format!("{}/", name);
        self.datasets
            .keys()
            .filter(|k| {
                k.starts_with(&prefix) && !k[prefix.len()..].contains('/') && !k.contains('@')
            })
            .cloned()
            .collect()
    }

    fn snapshots_of(&self, name: &str) -> Vec<String> {
        let prefix = format!("{}@", name);
        self.datasets
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect()
    }

    /// Everything whose existence depends on `name`: descendants, snapshots,
    /// and clones of any of those snapshots, computed to a fixpoint.
    fn dependents_of(&self, name: &str) -> Vec<String> {
        let mut set: BTreeSet<String> = BTreeSet::new();
        set.insert(name.to_string());
        loop {
            let mut added = false;
            for (key, ds) in &self.datasets {
                if set.contains(key) {
                    continue;
                }
                let covered = set.iter().any(|base| {
                    key.starts_with(&format!("{}/", base)) || key.starts_with(&format!("{}@", base))
                }) || ds
                    .origin
                    .as_ref()
                    .is_some_and(|origin| set.contains(origin));
                if covered {
                    set.insert(key.clone());
                    added = true;
                }
            }
            if !added {
                break;
            }
        }
        set.remove(name);
        set.into_iter().collect()
    }

    /// Rewrite every name derived from `old` after a rename or a promote.
    fn retarget(&mut self, old: &str, new: &str) {
        let moved: Vec<String> = self
            .datasets
            .keys()
            .filter(|k| {
                k.as_str() == old
                    || k.starts_with(&format!("{}/", old))
                    || k.starts_with(&format!("{}@", old))
            })
            .cloned()
            .collect();
        for key in moved {
            let renamed = format!("{}{}", new, &key[old.len()..]);
            if let Some(ds) = self.datasets.remove(&key) {
                self.datasets.insert(renamed.clone(), ds);
            }
            for target in self.handles.values_mut() {
                if let Target::Dataset(name) = target {
                    if *name == key {
                        *name = renamed.clone();
                    }
                }
            }
            for ds in self.datasets.values_mut() {
                if ds.origin.as_deref() == Some(key.as_str()) {
                    ds.origin = Some(renamed.clone());
                }
            }
        }
    }
}

fn stale_handle() -> NativeError {
    NativeError::new(ErrorCode::Unknown, "internal error", "stale handle")
}

fn no_dataset(verb: &str, name: &str) -> NativeError {
    NativeError::new(
        ErrorCode::NoEntity,
        format!("cannot {} '{}'", verb, name),
        "dataset does not exist",
    )
}

fn no_pool(name: &str) -> NativeError {
    NativeError::new(
        ErrorCode::NoEntity,
        format!("cannot open '{}'", name),
        "no such pool",
    )
}

/// In-memory driver modelling a small pool-and-dataset universe.
///
/// Keeps datasets in a flat name-keyed map; hierarchy and snapshot
/// relationships are derived from the `/` and `@` name structure the way the
/// real namespace works. Dataset content is modelled as a set of file names
/// so snapshot, clone and rollback effects are observable from tests.
pub struct MockDriver {
    state: Mutex<State>,
    iscsi: bool,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            iscsi: true,
        }
    }

    /// A driver whose platform lacks iSCSI share support.
    pub fn without_iscsi() -> Self {
        Self {
            state: Mutex::new(State::default()),
            iscsi: false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("mock state poisoned")
    }

    /// Create a pool together with its root filesystem.
    pub fn add_pool(&self, name: &str) {
        let mut state = self.lock();
        let guid = state.next_guid();
        state.pools.insert(
            name.to_string(),
            MockPool {
                guid,
                version: DEFAULT_POOL_VERSION,
                state: PoolState::Active,
                status: PoolStatus::Ok,
                size: DEFAULT_POOL_SIZE,
                used: DEFAULT_POOL_USED,
                props: BTreeMap::new(),
            },
        );
        let guid = state.next_guid();
        let txg = state.next_txg();
        state
            .datasets
            .insert(name.to_string(), MockDataset::new(DatasetKind::Filesystem, guid, txg));
    }

    /// Number of native handles currently open, for leak checks.
    pub fn open_handle_count(&self) -> usize {
        self.lock().handles.len()
    }

    /// Add a file to a dataset's simulated content.
    pub fn write_file(&self, dataset: &str, file: &str) -> bool {
        let mut state = self.lock();
        match state.datasets.get_mut(dataset) {
            Some(ds) => {
                ds.files.insert(file.to_string());
                true
            }
            None => false,
        }
    }

    /// Whether a dataset's simulated content holds the file.
    pub fn file_exists(&self, dataset: &str, file: &str) -> bool {
        self.lock()
            .datasets
            .get(dataset)
            .is_some_and(|ds| ds.files.contains(file))
    }
}

/// Default value of a native dataset property when nothing was stored.
fn dataset_default(name: &str, ds: &MockDataset) -> Option<String> {
    let value = match name {
        "type" => ds.kind.as_str().to_string(),
        "creation" => ds.created.to_string(),
        "guid" => ds.guid.to_string(),
        "used" | "referenced" | "usedbydataset" => DEFAULT_DATASET_USED.to_string(),
        "available" => (DEFAULT_POOL_SIZE - DEFAULT_POOL_USED).to_string(),
        "usedbysnapshots" | "usedbychildren" => "0".to_string(),
        "compressratio" => "1.00x".to_string(),
        "mounted" => {
            if ds.mounted {
                "yes".to_string()
            } else {
                "no".to_string()
            }
        }
        "origin" => return ds.origin.clone(),
        "quota" | "reservation" => "0".to_string(),
        "volsize" => match ds.kind {
            DatasetKind::Volume => DEFAULT_VOLSIZE.to_string(),
            _ => return None,
        },
        "volblocksize" => match ds.kind {
            DatasetKind::Volume => DEFAULT_VOLBLOCKSIZE.to_string(),
            _ => return None,
        },
        "recordsize" => (128 * 1024).to_string(),
        "sharenfs" | "sharesmb" | "shareiscsi" => "off".to_string(),
        "checksum" => "on".to_string(),
        "compression" => "off".to_string(),
        "atime" | "devices" | "exec" | "setuid" | "xattr" => "on".to_string(),
        "readonly" | "zoned" => "off".to_string(),
        "snapdir" => "hidden".to_string(),
        "canmount" => "on".to_string(),
        "copies" => "1".to_string(),
        "version" => "4".to_string(),
        _ => return None,
    };
    Some(value)
}

impl ZfsDriver for MockDriver {
    fn pool_open(&self, name: &str) -> NativeResult<PoolHandle> {
        debug!("mock: pool_open '{}'", name);
        let mut state = self.lock();
        if !state.pools.contains_key(name) {
            return Err(no_pool(name));
        }
        let id = state.alloc(Target::Pool(name.to_string()));
        Ok(PoolHandle(id))
    }

    fn pool_close(&self, handle: PoolHandle) {
        self.lock().handles.remove(&handle.0);
    }

    fn pool_names(&self) -> NativeResult<Vec<String>> {
        Ok(self.lock().pools.keys().cloned().collect())
    }

    fn pool_state(&self, handle: PoolHandle) -> NativeResult<PoolState> {
        let state = self.lock();
        let name = state.pool_name(handle)?;
        state
            .pools
            .get(&name)
            .map(|p| p.state)
            .ok_or_else(|| no_pool(&name))
    }

    fn pool_status(&self, handle: PoolHandle) -> NativeResult<PoolStatus> {
        let state = self.lock();
        let name = state.pool_name(handle)?;
        state
            .pools
            .get(&name)
            .map(|p| p.status)
            .ok_or_else(|| no_pool(&name))
    }

    fn pool_get_num(&self, handle: PoolHandle, prop: &str) -> NativeResult<u64> {
        let state = self.lock();
        let name = state.pool_name(handle)?;
        let pool = state.pools.get(&name).ok_or_else(|| no_pool(&name))?;
        match prop {
            "guid" => Ok(pool.guid),
            "version" => Ok(pool.version),
            "size" => Ok(pool.size),
            "used" | "allocated" => Ok(pool.used),
            "free" | "available" => Ok(pool.size - pool.used),
            "capacity" => Ok(pool.used * 100 / pool.size),
            _ => Err(NativeError::new(
                ErrorCode::InvalidProperty,
                format!("cannot get property for '{}'", name),
                format!("'{}' is not a numeric pool property", prop),
            )),
        }
    }

    fn pool_get(&self, handle: PoolHandle, prop: &str) -> NativeResult<Option<String>> {
        let state = self.lock();
        let name = state.pool_name(handle)?;
        let pool = state.pools.get(&name).ok_or_else(|| no_pool(&name))?;
        if let Some(value) = pool.props.get(prop) {
            return Ok(Some(value.clone()));
        }
        let value = match prop {
            "name" => name,
            "health" => {
                if pool.status.is_healthy() {
                    "ONLINE".to_string()
                } else {
                    "DEGRADED".to_string()
                }
            }
            "size" => nicenum(pool.size),
            "used" | "allocated" => nicenum(pool.used),
            "free" | "available" => nicenum(pool.size - pool.used),
            "capacity" => format!("{}%", pool.used * 100 / pool.size),
            "version" => pool.version.to_string(),
            "guid" => pool.guid.to_string(),
            "delegation" | "autoreplace" | "listsnapshots" => "off".to_string(),
            "failmode" => "wait".to_string(),
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    fn pool_set(&self, handle: PoolHandle, prop: &str, value: &str) -> NativeResult<()> {
        let mut state = self.lock();
        let name = state.pool_name(handle)?;
        debug!("mock: pool_set '{}' {}={}", name, prop, value);
        let def = pool_prop(prop).ok_or_else(|| {
            NativeError::new(
                ErrorCode::InvalidProperty,
                format!("cannot set property for '{}'", name),
                format!("invalid property '{}'", prop),
            )
        })?;
        if def.readonly {
            return Err(NativeError::new(
                ErrorCode::ReadOnlyProperty,
                format!("cannot set property for '{}'", name),
                format!("'{}' is readonly", prop),
            ));
        }
        if def.kind == PropertyKind::Boolean && value != "on" && value != "off" {
            return Err(NativeError::new(
                ErrorCode::InvalidPropertyType,
                format!("cannot set property for '{}'", name),
                format!("'{}' must be one of 'on | off'", prop),
            ));
        }
        let pool = state.pools.get_mut(&name).ok_or_else(|| no_pool(&name))?;
        pool.props.insert(prop.to_string(), value.to_string());
        Ok(())
    }

    fn dataset_open(
        &self,
        name: &str,
        mask: TypeMask,
    ) -> NativeResult<(DatasetHandle, DatasetKind)> {
        debug!("mock: dataset_open '{}'", name);
        let mut state = self.lock();
        let kind = match state.datasets.get(name) {
            Some(ds) if mask.contains(ds.kind) => ds.kind,
            _ => return Err(no_dataset("open", name)),
        };
        let id = state.alloc(Target::Dataset(name.to_string()));
        Ok((DatasetHandle(id), kind))
    }

    fn dataset_close(&self, handle: DatasetHandle) {
        self.lock().handles.remove(&handle.0);
    }

    fn dataset_exists(&self, name: &str, mask: TypeMask) -> NativeResult<bool> {
        Ok(self
            .lock()
            .datasets
            .get(name)
            .is_some_and(|ds| mask.contains(ds.kind)))
    }

    fn dataset_create(&self, name: &str, kind: DatasetKind) -> NativeResult<()> {
        debug!("mock: dataset_create '{}' as {}", name, kind);
        let mut state = self.lock();
        let action = format!("cannot create '{}'", name);
        if kind == DatasetKind::Snapshot {
            return Err(NativeError::new(
                ErrorCode::InvalidDatasetType,
                action,
                "snapshots must be created through the snapshot operation",
            ));
        }
        if name.contains('@') {
            return Err(NativeError::new(
                ErrorCode::InvalidName,
                action,
                "snapshot delimiter '@' in filesystem name",
            ));
        }
        if state.datasets.contains_key(name) {
            return Err(NativeError::new(
                ErrorCode::Exists,
                action,
                "dataset already exists",
            ));
        }
        match name.rsplit_once('/') {
            Some((parent, _)) => {
                let ok = state
                    .datasets
                    .get(parent)
                    .is_some_and(|ds| ds.kind == DatasetKind::Filesystem);
                if !ok {
                    return Err(NativeError::new(
                        ErrorCode::NoEntity,
                        action,
                        "parent does not exist",
                    ));
                }
            }
            None => {
                return Err(NativeError::new(
                    ErrorCode::NoEntity,
                    action,
                    format!("no such pool '{}'", name),
                ));
            }
        }
        let guid = state.next_guid();
        let txg = state.next_txg();
        state
            .datasets
            .insert(name.to_string(), MockDataset::new(kind, guid, txg));
        Ok(())
    }

    fn dataset_destroy(&self, handle: DatasetHandle) -> NativeResult<()> {
        let mut state = self.lock();
        let name = state.live_dataset(handle)?;
        debug!("mock: dataset_destroy '{}'", name);
        let action = format!("cannot destroy '{}'", name);
        if !state.direct_children(&name).is_empty() {
            return Err(NativeError::new(
                ErrorCode::Busy,
                action,
                "filesystem has children",
            ));
        }
        if !state.snapshots_of(&name).is_empty() {
            return Err(NativeError::new(
                ErrorCode::Busy,
                action,
                "filesystem has snapshots",
            ));
        }
        let has_clones = state
            .datasets
            .values()
            .any(|ds| ds.origin.as_deref() == Some(name.as_str()));
        if has_clones {
            return Err(NativeError::new(
                ErrorCode::Busy,
                action,
                "snapshot has dependent clones",
            ));
        }
        state.datasets.remove(&name);
        Ok(())
    }

    fn dataset_rename(
        &self,
        handle: DatasetHandle,
        new_name: &str,
        recursive: bool,
    ) -> NativeResult<()> {
        let mut state = self.lock();
        let name = state.live_dataset(handle)?;
        debug!("mock: dataset_rename '{}' -> '{}'", name, new_name);
        let action = format!("cannot rename '{}'", name);
        if state.datasets.contains_key(new_name) {
            return Err(NativeError::new(
                ErrorCode::Exists,
                action,
                "dataset already exists",
            ));
        }
        if name.contains('@') != new_name.contains('@') {
            return Err(NativeError::new(
                ErrorCode::InvalidName,
                action,
                "snapshots may only be renamed to snapshots",
            ));
        }
        if recursive {
            // Recursive rename applies one snapshot suffix change across all
            // descendants of the snapshotted filesystem.
            let (Some((base, old_suffix)), Some((new_base, new_suffix))) =
                (name.split_once('@'), new_name.split_once('@'))
            else {
                return Err(NativeError::new(
                    ErrorCode::InvalidName,
                    action,
                    "recursive rename applies to snapshots only",
                ));
            };
            if base != new_base {
                return Err(NativeError::new(
                    ErrorCode::CrossTarget,
                    action,
                    "recursive rename must stay within the same filesystem",
                ));
            }
            let descendants: Vec<String> = state
                .datasets
                .keys()
                .filter(|k| k.starts_with(&format!("{}/", base)))
                .filter(|k| !k.contains('@'))
                .cloned()
                .collect();
            for fs in std::iter::once(base.to_string()).chain(descendants) {
                let from = format!("{}@{}", fs, old_suffix);
                if state.datasets.contains_key(&from) {
                    state.retarget(&from, &format!("{}@{}", fs, new_suffix));
                }
            }
        } else {
            state.retarget(&name, new_name);
        }
        Ok(())
    }

    fn snapshot_create(&self, full_name: &str) -> NativeResult<()> {
        debug!("mock: snapshot_create '{}'", full_name);
        let mut state = self.lock();
        let action = format!("cannot snapshot '{}'", full_name);
        let Some((base, suffix)) = full_name.split_once('@') else {
            return Err(NativeError::new(
                ErrorCode::InvalidName,
                action,
                "missing '@' delimiter in snapshot name",
            ));
        };
        if suffix.is_empty() {
            return Err(NativeError::new(
                ErrorCode::InvalidName,
                action,
                "empty snapshot name",
            ));
        }
        if !suffix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_.:".contains(c))
        {
            return Err(NativeError::new(
                ErrorCode::InvalidName,
                action,
                "invalid character in snapshot name",
            ));
        }
        let files = match state.datasets.get(base) {
            Some(ds) if ds.kind != DatasetKind::Snapshot => ds.files.clone(),
            _ => return Err(no_dataset("snapshot", full_name)),
        };
        if state.datasets.contains_key(full_name) {
            return Err(NativeError::new(
                ErrorCode::Exists,
                action,
                "snapshot already exists",
            ));
        }
        let guid = state.next_guid();
        let txg = state.next_txg();
        let mut snap = MockDataset::new(DatasetKind::Snapshot, guid, txg);
        snap.files = files;
        state.datasets.insert(full_name.to_string(), snap);
        Ok(())
    }

    fn clone_create(&self, handle: DatasetHandle, target: &str) -> NativeResult<()> {
        let mut state = self.lock();
        let name = state.live_dataset(handle)?;
        debug!("mock: clone_create '{}' -> '{}'", name, target);
        let action = format!("cannot create '{}'", target);
        let files = match state.datasets.get(&name) {
            Some(ds) if ds.kind == DatasetKind::Snapshot => ds.files.clone(),
            _ => {
                return Err(NativeError::new(
                    ErrorCode::InvalidDatasetType,
                    action,
                    "clone source must be a snapshot",
                ));
            }
        };
        if state.datasets.contains_key(target) {
            return Err(NativeError::new(
                ErrorCode::Exists,
                action,
                "dataset already exists",
            ));
        }
        if let Some((parent, _)) = target.rsplit_once('/') {
            if !state.datasets.contains_key(parent) {
                return Err(NativeError::new(
                    ErrorCode::NoEntity,
                    action,
                    "parent does not exist",
                ));
            }
        } else {
            return Err(NativeError::new(
                ErrorCode::InvalidName,
                action,
                "clone target must live under a pool",
            ));
        }
        let guid = state.next_guid();
        let txg = state.next_txg();
        let mut clone = MockDataset::new(DatasetKind::Filesystem, guid, txg);
        clone.origin = Some(name);
        clone.files = files;
        state.datasets.insert(target.to_string(), clone);
        Ok(())
    }

    fn promote(&self, handle: DatasetHandle) -> NativeResult<()> {
        let mut state = self.lock();
        let clone_name = state.live_dataset(handle)?;
        debug!("mock: promote '{}'", clone_name);
        let action = format!("cannot promote '{}'", clone_name);
        let Some(origin) = state
            .datasets
            .get(&clone_name)
            .and_then(|ds| ds.origin.clone())
        else {
            return Err(NativeError::new(
                ErrorCode::BadTarget,
                action,
                "not a cloned filesystem",
            ));
        };
        let (origin_base, origin_suffix) = origin
            .split_once('@')
            .map(|(b, s)| (b.to_string(), s.to_string()))
            .expect("origin is a snapshot name");
        let origin_txg = state
            .datasets
            .get(&origin)
            .map(|ds| ds.created)
            .ok_or_else(|| no_dataset("open", &origin))?;

        // Snapshots up to and including the origin move from the origin
        // filesystem to the promoted clone; later ones stay behind.
        let moving: Vec<(String, String)> = state
            .snapshots_of(&origin_base)
            .into_iter()
            .filter(|snap| state.datasets[snap].created <= origin_txg)
            .map(|snap| {
                let suffix = snap.split_once('@').expect("snapshot name").1.to_string();
                (snap, format!("{}@{}", clone_name, suffix))
            })
            .collect();
        // A same-suffix snapshot already on the clone would be clobbered by
        // the migration; the native library refuses instead.
        for (_, to) in &moving {
            if state.datasets.contains_key(to) {
                return Err(NativeError::new(
                    ErrorCode::Exists,
                    action.clone(),
                    "conflicting snapshot name",
                ));
            }
        }
        for (from, to) in &moving {
            state.retarget(from, to);
        }
        if let Some(ds) = state.datasets.get_mut(&clone_name) {
            ds.origin = None;
        }
        if let Some(ds) = state.datasets.get_mut(&origin_base) {
            ds.origin = Some(format!("{}@{}", clone_name, origin_suffix));
        }
        Ok(())
    }

    fn rollback(
        &self,
        handle: DatasetHandle,
        snapshot: DatasetHandle,
        force: bool,
    ) -> NativeResult<()> {
        let mut state = self.lock();
        let name = state.live_dataset(handle)?;
        let snap_name = state.live_dataset(snapshot)?;
        debug!("mock: rollback '{}' to '{}' force={}", name, snap_name, force);
        let action = format!("cannot rollback '{}'", name);
        if !snap_name.starts_with(&format!("{}@", name)) {
            return Err(NativeError::new(
                ErrorCode::BadTarget,
                action,
                "snapshot belongs to a different filesystem",
            ));
        }
        let snap_txg = state.datasets[&snap_name].created;
        let newer: Vec<String> = state
            .snapshots_of(&name)
            .into_iter()
            .filter(|s| state.datasets[s].created > snap_txg)
            .collect();
        if !newer.is_empty() && !force {
            return Err(NativeError::new(
                ErrorCode::Busy,
                action,
                "more recent snapshots exist",
            ));
        }
        for snap in &newer {
            let has_clones = state
                .datasets
                .values()
                .any(|ds| ds.origin.as_deref() == Some(snap.as_str()));
            if has_clones {
                return Err(NativeError::new(
                    ErrorCode::Busy,
                    action,
                    "snapshot has dependent clones",
                ));
            }
        }
        for snap in newer {
            state.datasets.remove(&snap);
        }
        let files = state.datasets[&snap_name].files.clone();
        if let Some(ds) = state.datasets.get_mut(&name) {
            ds.files = files;
        }
        Ok(())
    }

    fn dataset_get(
        &self,
        handle: DatasetHandle,
        prop: &str,
        literal: bool,
    ) -> NativeResult<Option<String>> {
        let state = self.lock();
        let name = state.live_dataset(handle)?;
        let ds = &state.datasets[&name];
        let raw = if prop == "mountpoint" {
            Some(
                ds.props
                    .get(prop)
                    .cloned()
                    .unwrap_or_else(|| format!("/{}", name)),
            )
        } else {
            ds.props
                .get(prop)
                .cloned()
                .or_else(|| dataset_default(prop, ds))
        };
        let Some(raw) = raw else {
            return Ok(None);
        };
        let nice = dataset_prop(prop).is_some_and(|def| def.kind == PropertyKind::Size);
        if nice && !literal {
            if let Ok(n) = raw.parse::<u64>() {
                return Ok(Some(nicenum(n)));
            }
        }
        Ok(Some(raw))
    }

    fn dataset_get_user(
        &self,
        handle: DatasetHandle,
        prop: &str,
    ) -> NativeResult<Option<String>> {
        let state = self.lock();
        let name = state.live_dataset(handle)?;
        Ok(state.datasets[&name].user_props.get(prop).cloned())
    }

    fn dataset_set(&self, handle: DatasetHandle, prop: &str, value: &str) -> NativeResult<()> {
        let mut state = self.lock();
        let name = state.live_dataset(handle)?;
        debug!("mock: dataset_set '{}' {}={}", name, prop, value);
        let action = format!("cannot set property for '{}'", name);
        if prop.contains(':') {
            let ds = state.datasets.get_mut(&name).expect("dataset resolved");
            ds.user_props.insert(prop.to_string(), value.to_string());
            return Ok(());
        }
        let def = dataset_prop(prop).ok_or_else(|| {
            NativeError::new(
                ErrorCode::InvalidProperty,
                action.clone(),
                format!("invalid property '{}'", prop),
            )
        })?;
        if def.readonly {
            return Err(NativeError::new(
                ErrorCode::ReadOnlyProperty,
                action,
                format!("'{}' is readonly", prop),
            ));
        }
        if def.kind == PropertyKind::Boolean && value != "on" && value != "off" {
            return Err(NativeError::new(
                ErrorCode::InvalidPropertyType,
                action,
                format!("'{}' must be one of 'on | off'", prop),
            ));
        }
        let ds = state.datasets.get_mut(&name).expect("dataset resolved");
        ds.props.insert(prop.to_string(), value.to_string());
        Ok(())
    }

    fn mount(&self, handle: DatasetHandle) -> NativeResult<()> {
        let mut state = self.lock();
        let name = state.live_dataset(handle)?;
        debug!("mock: mount '{}'", name);
        let ds = state.datasets.get_mut(&name).expect("dataset resolved");
        if ds.kind != DatasetKind::Filesystem {
            return Err(NativeError::new(
                ErrorCode::MountFailed,
                format!("cannot mount '{}'", name),
                "only filesystems can be mounted",
            ));
        }
        ds.mounted = true;
        Ok(())
    }

    fn unmount(&self, handle: DatasetHandle) -> NativeResult<()> {
        let mut state = self.lock();
        let name = state.live_dataset(handle)?;
        debug!("mock: unmount '{}'", name);
        let ds = state.datasets.get_mut(&name).expect("dataset resolved");
        ds.mounted = false;
        Ok(())
    }

    fn is_mounted(&self, handle: DatasetHandle) -> NativeResult<bool> {
        let state = self.lock();
        let name = state.live_dataset(handle)?;
        Ok(state.datasets[&name].mounted)
    }

    fn share(&self, handle: DatasetHandle) -> NativeResult<()> {
        let mut state = self.lock();
        let name = state.live_dataset(handle)?;
        debug!("mock: share '{}'", name);
        let ds = state.datasets.get_mut(&name).expect("dataset resolved");
        if ds.props.get("sharenfs").is_some_and(|v| v != "off") {
            ds.shared_nfs = true;
        }
        if ds.props.get("sharesmb").is_some_and(|v| v != "off") {
            ds.shared_smb = true;
        }
        Ok(())
    }

    fn unshare(&self, handle: DatasetHandle) -> NativeResult<()> {
        let mut state = self.lock();
        let name = state.live_dataset(handle)?;
        debug!("mock: unshare '{}'", name);
        let ds = state.datasets.get_mut(&name).expect("dataset resolved");
        ds.shared_nfs = false;
        ds.shared_smb = false;
        Ok(())
    }

    fn is_shared(&self, handle: DatasetHandle) -> NativeResult<bool> {
        let state = self.lock();
        let name = state.live_dataset(handle)?;
        let ds = &state.datasets[&name];
        Ok(ds.shared_nfs || ds.shared_smb)
    }

    fn share_nfs(&self, handle: DatasetHandle) -> NativeResult<()> {
        let mut state = self.lock();
        let name = state.live_dataset(handle)?;
        debug!("mock: share_nfs '{}'", name);
        let ds = state.datasets.get_mut(&name).expect("dataset resolved");
        ds.shared_nfs = true;
        Ok(())
    }

    fn unshare_nfs(&self, handle: DatasetHandle) -> NativeResult<()> {
        let mut state = self.lock();
        let name = state.live_dataset(handle)?;
        let ds = state.datasets.get_mut(&name).expect("dataset resolved");
        ds.shared_nfs = false;
        Ok(())
    }

    fn nfs_share_path(&self, handle: DatasetHandle) -> NativeResult<Option<String>> {
        let state = self.lock();
        let name = state.live_dataset(handle)?;
        let ds = &state.datasets[&name];
        if ds.shared_nfs {
            Ok(Some(
                ds.props
                    .get("mountpoint")
                    .cloned()
                    .unwrap_or_else(|| format!("/{}", name)),
            ))
        } else {
            Ok(None)
        }
    }

    fn share_smb(&self, handle: DatasetHandle) -> NativeResult<()> {
        let mut state = self.lock();
        let name = state.live_dataset(handle)?;
        debug!("mock: share_smb '{}'", name);
        let ds = state.datasets.get_mut(&name).expect("dataset resolved");
        ds.shared_smb = true;
        Ok(())
    }

    fn unshare_smb(&self, handle: DatasetHandle) -> NativeResult<()> {
        let mut state = self.lock();
        let name = state.live_dataset(handle)?;
        let ds = state.datasets.get_mut(&name).expect("dataset resolved");
        ds.shared_smb = false;
        Ok(())
    }

    fn smb_share_path(&self, handle: DatasetHandle) -> NativeResult<Option<String>> {
        let state = self.lock();
        let name = state.live_dataset(handle)?;
        let ds = &state.datasets[&name];
        if ds.shared_smb {
            Ok(Some(name.replace('/', "_")))
        } else {
            Ok(None)
        }
    }

    fn iscsi_supported(&self) -> bool {
        self.iscsi
    }

    fn share_iscsi(&self, handle: DatasetHandle) -> NativeResult<()> {
        let mut state = self.lock();
        let name = state.live_dataset(handle)?;
        if !self.iscsi {
            return Err(NativeError::new(
                ErrorCode::ShareIscsiFailed,
                format!("cannot share '{}'", name),
                "iSCSI is not supported on this platform",
            ));
        }
        debug!("mock: share_iscsi '{}'", name);
        let ds = state.datasets.get_mut(&name).expect("dataset resolved");
        ds.shared_iscsi = true;
        Ok(())
    }

    fn unshare_iscsi(&self, handle: DatasetHandle) -> NativeResult<()> {
        let mut state = self.lock();
        let name = state.live_dataset(handle)?;
        if !self.iscsi {
            return Err(NativeError::new(
                ErrorCode::UnshareIscsiFailed,
                format!("cannot unshare '{}'", name),
                "iSCSI is not supported on this platform",
            ));
        }
        let ds = state.datasets.get_mut(&name).expect("dataset resolved");
        ds.shared_iscsi = false;
        Ok(())
    }

    fn is_shared_iscsi(&self, handle: DatasetHandle) -> NativeResult<bool> {
        let state = self.lock();
        let name = state.live_dataset(handle)?;
        Ok(state.datasets[&name].shared_iscsi)
    }

    fn root_datasets(&self) -> NativeResult<Vec<String>> {
        let state = self.lock();
        Ok(state
            .pools
            .keys()
            .filter(|name| state.datasets.contains_key(*name))
            .cloned()
            .collect())
    }

    fn children(&self, handle: DatasetHandle, which: Children) -> NativeResult<Vec<String>> {
        let state = self.lock();
        let name = state.live_dataset(handle)?;
        Ok(match which {
            Children::Filesystems => state.direct_children(&name),
            Children::Snapshots => state.snapshots_of(&name),
            Children::Dependents => state.dependents_of(&name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver_with_pool() -> MockDriver {
        let driver = MockDriver::new();
        driver.add_pool("tpool");
        driver
    }

    fn open(driver: &MockDriver, name: &str) -> DatasetHandle {
        driver
            .dataset_open(name, TypeMask::ANY)
            .expect("dataset should open")
            .0
    }

    #[test]
    fn test_open_missing_dataset_reports_noent() {
        let driver = driver_with_pool();
        let err = driver
            .dataset_open("tpool/nope", TypeMask::ANY)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NoEntity);
        assert_eq!(err.action, "cannot open 'tpool/nope'");
        assert_eq!(err.description, "dataset does not exist");
    }

    #[test]
    fn test_open_respects_type_mask() {
        let driver = driver_with_pool();
        driver
            .dataset_create("tpool/fs", DatasetKind::Filesystem)
            .unwrap();
        assert!(driver
            .dataset_open("tpool/fs", TypeMask::SNAPSHOT)
            .is_err());
        assert_eq!(
            driver
                .dataset_open("tpool/fs", TypeMask::FILESYSTEM)
                .unwrap()
                .1,
            DatasetKind::Filesystem
        );
    }

    #[test]
    fn test_create_requires_parent() {
        let driver = driver_with_pool();
        let err = driver
            .dataset_create("tpool/a/b", DatasetKind::Filesystem)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NoEntity);

        let err = driver
            .dataset_create("nopool/fs", DatasetKind::Filesystem)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NoEntity);
    }

    #[test]
    fn test_destroy_with_children_is_busy() {
        let driver = driver_with_pool();
        driver
            .dataset_create("tpool/fs", DatasetKind::Filesystem)
            .unwrap();
        driver
            .dataset_create("tpool/fs/inner", DatasetKind::Filesystem)
            .unwrap();
        let handle = open(&driver, "tpool/fs");
        let err = driver.dataset_destroy(handle).unwrap_err();
        assert_eq!(err.code, ErrorCode::Busy);
        assert_eq!(err.description, "filesystem has children");
    }

    #[test]
    fn test_destroy_cloned_snapshot_is_busy() {
        let driver = driver_with_pool();
        driver
            .dataset_create("tpool/fs", DatasetKind::Filesystem)
            .unwrap();
        driver.snapshot_create("tpool/fs@snap").unwrap();
        let snap = open(&driver, "tpool/fs@snap");
        driver.clone_create(snap, "tpool/clone").unwrap();
        let err = driver.dataset_destroy(snap).unwrap_err();
        assert_eq!(err.code, ErrorCode::Busy);
        assert_eq!(err.description, "snapshot has dependent clones");
    }

    #[test]
    fn test_promote_moves_earlier_snapshots_and_swaps_origin() {
        let driver = driver_with_pool();
        driver
            .dataset_create("tpool/fs", DatasetKind::Filesystem)
            .unwrap();
        driver.snapshot_create("tpool/fs@first").unwrap();
        driver.snapshot_create("tpool/fs@second").unwrap();
        let snap = open(&driver, "tpool/fs@second");
        driver.clone_create(snap, "tpool/clone").unwrap();
        driver.snapshot_create("tpool/fs@later").unwrap();

        let clone = open(&driver, "tpool/clone");
        driver.promote(clone).unwrap();

        assert!(driver
            .dataset_exists("tpool/clone@first", TypeMask::SNAPSHOT)
            .unwrap());
        assert!(driver
            .dataset_exists("tpool/clone@second", TypeMask::SNAPSHOT)
            .unwrap());
        assert!(!driver
            .dataset_exists("tpool/fs@second", TypeMask::SNAPSHOT)
            .unwrap());
        assert!(driver
            .dataset_exists("tpool/fs@later", TypeMask::SNAPSHOT)
            .unwrap());

        let fs = open(&driver, "tpool/fs");
        assert_eq!(
            driver.dataset_get(fs, "origin", false).unwrap().as_deref(),
            Some("tpool/clone@second")
        );
        let clone = open(&driver, "tpool/clone");
        assert_eq!(driver.dataset_get(clone, "origin", false).unwrap(), None);
    }

    #[test]
    fn test_promote_with_conflicting_snapshot_name_fails() {
        let driver = driver_with_pool();
        driver
            .dataset_create("tpool/fs", DatasetKind::Filesystem)
            .unwrap();
        driver.snapshot_create("tpool/fs@base").unwrap();
        let snap = open(&driver, "tpool/fs@base");
        driver.clone_create(snap, "tpool/clone").unwrap();
        // The clone takes its own snapshot under the same suffix the
        // migration would use.
        driver.snapshot_create("tpool/clone@base").unwrap();

        let clone = open(&driver, "tpool/clone");
        let err = driver.promote(clone).unwrap_err();
        assert_eq!(err.code, ErrorCode::Exists);
        assert_eq!(err.description, "conflicting snapshot name");

        // Nothing moved: both snapshots survive and the origin is intact.
        assert!(driver
            .dataset_exists("tpool/fs@base", TypeMask::SNAPSHOT)
            .unwrap());
        assert!(driver
            .dataset_exists("tpool/clone@base", TypeMask::SNAPSHOT)
            .unwrap());
        assert_eq!(
            driver
                .dataset_get(clone, "origin", false)
                .unwrap()
                .as_deref(),
            Some("tpool/fs@base")
        );
    }

    #[test]
    fn test_snapshot_rejects_invalid_suffix() {
        let driver = driver_with_pool();
        driver
            .dataset_create("tpool/fs", DatasetKind::Filesystem)
            .unwrap();

        let err = driver.snapshot_create("tpool/fs@a@b").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidName);
        assert!(!driver
            .dataset_exists("tpool/fs@a@b", TypeMask::SNAPSHOT)
            .unwrap());

        let err = driver.snapshot_create("tpool/fs@bad name").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidName);

        driver.snapshot_create("tpool/fs@ok-1.2:x").unwrap();
    }

    #[test]
    fn test_rollback_restores_content_and_keeps_snapshot() {
        let driver = driver_with_pool();
        driver
            .dataset_create("tpool/fs", DatasetKind::Filesystem)
            .unwrap();
        driver.write_file("tpool/fs", "kept.txt");
        driver.snapshot_create("tpool/fs@snap").unwrap();
        driver.write_file("tpool/fs", "late.txt");

        let fs = open(&driver, "tpool/fs");
        let snap = open(&driver, "tpool/fs@snap");
        driver.rollback(fs, snap, false).unwrap();

        assert!(driver.file_exists("tpool/fs", "kept.txt"));
        assert!(!driver.file_exists("tpool/fs", "late.txt"));
        assert!(driver
            .dataset_exists("tpool/fs@snap", TypeMask::SNAPSHOT)
            .unwrap());
    }

    #[test]
    fn test_rollback_to_older_snapshot_needs_force() {
        let driver = driver_with_pool();
        driver
            .dataset_create("tpool/fs", DatasetKind::Filesystem)
            .unwrap();
        driver.snapshot_create("tpool/fs@old").unwrap();
        driver.snapshot_create("tpool/fs@new").unwrap();

        let fs = open(&driver, "tpool/fs");
        let old = open(&driver, "tpool/fs@old");
        let err = driver.rollback(fs, old, false).unwrap_err();
        assert_eq!(err.code, ErrorCode::Busy);

        driver.rollback(fs, old, true).unwrap();
        assert!(!driver
            .dataset_exists("tpool/fs@new", TypeMask::SNAPSHOT)
            .unwrap());
        assert!(driver
            .dataset_exists("tpool/fs@old", TypeMask::SNAPSHOT)
            .unwrap());
    }

    #[test]
    fn test_rename_moves_descendants_and_handles() {
        let driver = driver_with_pool();
        driver
            .dataset_create("tpool/fs", DatasetKind::Filesystem)
            .unwrap();
        driver
            .dataset_create("tpool/fs/inner", DatasetKind::Filesystem)
            .unwrap();
        driver.snapshot_create("tpool/fs@snap").unwrap();

        let inner = open(&driver, "tpool/fs/inner");
        let fs = open(&driver, "tpool/fs");
        driver.dataset_rename(fs, "tpool/renamed", false).unwrap();

        assert!(driver
            .dataset_exists("tpool/renamed/inner", TypeMask::FILESYSTEM)
            .unwrap());
        assert!(driver
            .dataset_exists("tpool/renamed@snap", TypeMask::SNAPSHOT)
            .unwrap());
        assert!(!driver
            .dataset_exists("tpool/fs", TypeMask::ANY)
            .unwrap());
        // Open handles follow the rename.
        assert!(driver.dataset_get(inner, "type", false).is_ok());
    }

    #[test]
    fn test_children_listing() {
        let driver = driver_with_pool();
        driver
            .dataset_create("tpool/a", DatasetKind::Filesystem)
            .unwrap();
        driver
            .dataset_create("tpool/b", DatasetKind::Filesystem)
            .unwrap();
        driver
            .dataset_create("tpool/a/deep", DatasetKind::Filesystem)
            .unwrap();
        driver.snapshot_create("tpool/a@s1").unwrap();
        let s1 = open(&driver, "tpool/a@s1");
        driver.clone_create(s1, "tpool/c").unwrap();

        let root = open(&driver, "tpool");
        let mut fs = driver.children(root, Children::Filesystems).unwrap();
        fs.sort();
        assert_eq!(fs, vec!["tpool/a", "tpool/b", "tpool/c"]);

        let a = open(&driver, "tpool/a");
        assert_eq!(
            driver.children(a, Children::Snapshots).unwrap(),
            vec!["tpool/a@s1"]
        );
        let deps = driver.children(a, Children::Dependents).unwrap();
        assert!(deps.contains(&"tpool/a/deep".to_string()));
        assert!(deps.contains(&"tpool/a@s1".to_string()));
        assert!(deps.contains(&"tpool/c".to_string()));
    }

    #[test]
    fn test_property_defaults_and_literal_form() {
        let driver = driver_with_pool();
        driver
            .dataset_create("tpool/fs", DatasetKind::Filesystem)
            .unwrap();
        let fs = open(&driver, "tpool/fs");

        assert_eq!(
            driver.dataset_get(fs, "type", false).unwrap().as_deref(),
            Some("filesystem")
        );
        assert_eq!(
            driver
                .dataset_get(fs, "mountpoint", false)
                .unwrap()
                .as_deref(),
            Some("/tpool/fs")
        );
        assert_eq!(
            driver.dataset_get(fs, "used", false).unwrap().as_deref(),
            Some("24K")
        );
        assert_eq!(
            driver.dataset_get(fs, "used", true).unwrap().as_deref(),
            Some("24576")
        );

        driver.dataset_set(fs, "quota", "1073741824").unwrap();
        assert_eq!(
            driver.dataset_get(fs, "quota", false).unwrap().as_deref(),
            Some("1G")
        );
    }

    #[test]
    fn test_set_rejects_readonly_and_bad_boolean() {
        let driver = driver_with_pool();
        driver
            .dataset_create("tpool/fs", DatasetKind::Filesystem)
            .unwrap();
        let fs = open(&driver, "tpool/fs");

        let err = driver.dataset_set(fs, "creation", "1").unwrap_err();
        assert_eq!(err.code, ErrorCode::ReadOnlyProperty);

        let err = driver.dataset_set(fs, "atime", "sometimes").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidPropertyType);

        driver.dataset_set(fs, "atime", "off").unwrap();
        assert_eq!(
            driver.dataset_get(fs, "atime", false).unwrap().as_deref(),
            Some("off")
        );
    }

    #[test]
    fn test_handles_are_released_on_close() {
        let driver = driver_with_pool();
        let fs = open(&driver, "tpool");
        assert_eq!(driver.open_handle_count(), 1);
        driver.dataset_close(fs);
        assert_eq!(driver.open_handle_count(), 0);
        // Closing again is a no-op.
        driver.dataset_close(fs);
    }

    #[test]
    fn test_pool_numeric_properties() {
        let driver = driver_with_pool();
        let pool = driver.pool_open("tpool").unwrap();
        assert_eq!(
            driver.pool_get_num(pool, "size").unwrap(),
            DEFAULT_POOL_SIZE
        );
        assert_eq!(driver.pool_get_num(pool, "capacity").unwrap(), 2);
        assert_eq!(
            driver.pool_get_num(pool, "version").unwrap(),
            DEFAULT_POOL_VERSION
        );
        assert!(driver.pool_open("fakepool").is_err());
    }
}
