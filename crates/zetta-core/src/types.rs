use serde::{Deserialize, Serialize};

/// Kind of a ZFS dataset.
///
/// The raw values are single bits so they compose into a [`TypeMask`] for
/// open-by-name lookups, matching the native library's type constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatasetKind {
    Filesystem,
    Snapshot,
    Volume,
}

impl DatasetKind {
    /// The native bitmask value for this kind.
    pub fn as_raw(self) -> u32 {
        match self {
            DatasetKind::Filesystem => 0x1,
            DatasetKind::Snapshot => 0x2,
            DatasetKind::Volume => 0x4,
        }
    }

    /// Map a single-bit raw value back to a kind.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0x1 => Some(DatasetKind::Filesystem),
            0x2 => Some(DatasetKind::Snapshot),
            0x4 => Some(DatasetKind::Volume),
            _ => None,
        }
    }

    /// Canonical name as printed by the `type` property.
    pub fn as_str(self) -> &'static str {
        match self {
            DatasetKind::Filesystem => "filesystem",
            DatasetKind::Snapshot => "snapshot",
            DatasetKind::Volume => "volume",
        }
    }

    /// Parse the `type` property representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "filesystem" => Some(DatasetKind::Filesystem),
            "snapshot" => Some(DatasetKind::Snapshot),
            "volume" => Some(DatasetKind::Volume),
            _ => None,
        }
    }

    /// A mask matching exactly this kind.
    pub fn as_mask(self) -> TypeMask {
        TypeMask(self.as_raw())
    }
}

impl std::fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bitmask filter for open-by-name and existence probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeMask(u32);

impl TypeMask {
    pub const FILESYSTEM: TypeMask = TypeMask(0x1);
    pub const SNAPSHOT: TypeMask = TypeMask(0x2);
    pub const VOLUME: TypeMask = TypeMask(0x4);
    pub const POOL: TypeMask = TypeMask(0x8);
    /// Any filesystem, snapshot or volume.
    pub const DATASET: TypeMask = TypeMask(0x1 | 0x2 | 0x4);
    /// Alias for [`TypeMask::DATASET`].
    pub const ANY: TypeMask = TypeMask::DATASET;

    pub fn as_raw(self) -> u32 {
        self.0
    }

    /// Whether this mask accepts the given kind.
    pub fn contains(self, kind: DatasetKind) -> bool {
        self.0 & kind.as_raw() != 0
    }
}

impl std::ops::BitOr for TypeMask {
    type Output = TypeMask;

    fn bitor(self, rhs: TypeMask) -> TypeMask {
        TypeMask(self.0 | rhs.0)
    }
}

/// Storage pool state.
///
/// Raw values mirror the native pool_state_t constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolState {
    Active,
    Exported,
    Destroyed,
    Spare,
    Uninitialized,
    Unavailable,
    PotentiallyActive,
    Unknown,
    L2Cache,
}

impl PoolState {
    pub fn as_raw(self) -> u32 {
        match self {
            PoolState::Active => 0,
            PoolState::Exported => 1,
            PoolState::Destroyed => 2,
            PoolState::Spare => 3,
            PoolState::Uninitialized => 4,
            PoolState::Unavailable => 5,
            PoolState::PotentiallyActive => 6,
            PoolState::Unknown => 7,
            PoolState::L2Cache => 8,
        }
    }

    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => PoolState::Active,
            1 => PoolState::Exported,
            2 => PoolState::Destroyed,
            3 => PoolState::Spare,
            4 => PoolState::Uninitialized,
            5 => PoolState::Unavailable,
            6 => PoolState::PotentiallyActive,
            8 => PoolState::L2Cache,
            _ => PoolState::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PoolState::Active => "active",
            PoolState::Exported => "exported",
            PoolState::Destroyed => "destroyed",
            PoolState::Spare => "spare",
            PoolState::Uninitialized => "uninitialized",
            PoolState::Unavailable => "unavail",
            PoolState::PotentiallyActive => "potentially_active",
            PoolState::Unknown => "unknown",
            PoolState::L2Cache => "l2cache",
        }
    }
}

impl std::fmt::Display for PoolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Storage pool health status.
///
/// Raw values mirror the native zpool_status_t constants; `Ok` and `Unknown`
/// close the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolStatus {
    CorruptCache,
    MissingDevR,
    MissingDevNr,
    CorruptLabelR,
    CorruptLabelNr,
    BadGuidSum,
    CorruptPool,
    CorruptData,
    FailingDev,
    VersionNewer,
    HostidMismatch,
    IoFailureWait,
    IoFailureContinue,
    BadLog,
    FaultedDevR,
    FaultedDevNr,
    VersionOlder,
    Resilvering,
    OfflineDev,
    RemovedDev,
    Ok,
    Unknown,
}

impl PoolStatus {
    pub fn as_raw(self) -> u32 {
        match self {
            PoolStatus::CorruptCache => 0,
            PoolStatus::MissingDevR => 1,
            PoolStatus::MissingDevNr => 2,
            PoolStatus::CorruptLabelR => 3,
            PoolStatus::CorruptLabelNr => 4,
            PoolStatus::BadGuidSum => 5,
            PoolStatus::CorruptPool => 6,
            PoolStatus::CorruptData => 7,
            PoolStatus::FailingDev => 8,
            PoolStatus::VersionNewer => 9,
            PoolStatus::HostidMismatch => 10,
            PoolStatus::IoFailureWait => 11,
            PoolStatus::IoFailureContinue => 12,
            PoolStatus::BadLog => 13,
            PoolStatus::FaultedDevR => 14,
            PoolStatus::FaultedDevNr => 15,
            PoolStatus::VersionOlder => 16,
            PoolStatus::Resilvering => 17,
            PoolStatus::OfflineDev => 18,
            PoolStatus::RemovedDev => 19,
            PoolStatus::Ok => 20,
            PoolStatus::Unknown => 21,
        }
    }

    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => PoolStatus::CorruptCache,
            1 => PoolStatus::MissingDevR,
            2 => PoolStatus::MissingDevNr,
            3 => PoolStatus::CorruptLabelR,
            4 => PoolStatus::CorruptLabelNr,
            5 => PoolStatus::BadGuidSum,
            6 => PoolStatus::CorruptPool,
            7 => PoolStatus::CorruptData,
            8 => PoolStatus::FailingDev,
            9 => PoolStatus::VersionNewer,
            10 => PoolStatus::HostidMismatch,
            11 => PoolStatus::IoFailureWait,
            12 => PoolStatus::IoFailureContinue,
            13 => PoolStatus::BadLog,
            14 => PoolStatus::FaultedDevR,
            15 => PoolStatus::FaultedDevNr,
            16 => PoolStatus::VersionOlder,
            17 => PoolStatus::Resilvering,
            18 => PoolStatus::OfflineDev,
            19 => PoolStatus::RemovedDev,
            20 => PoolStatus::Ok,
            _ => PoolStatus::Unknown,
        }
    }

    /// Whether the pool is usable despite the reported status.
    pub fn is_healthy(self) -> bool {
        self == PoolStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_bitmask_values() {
        assert_eq!(DatasetKind::Filesystem.as_raw(), 1);
        assert_eq!(DatasetKind::Snapshot.as_raw(), 2);
        assert_eq!(DatasetKind::Volume.as_raw(), 4);
        assert_eq!(TypeMask::POOL.as_raw(), 8);
        assert_eq!(TypeMask::DATASET.as_raw(), 7);
        assert_eq!(TypeMask::ANY, TypeMask::DATASET);
        assert_eq!(
            (TypeMask::FILESYSTEM | TypeMask::SNAPSHOT | TypeMask::VOLUME),
            TypeMask::DATASET
        );
    }

    #[test]
    fn test_mask_contains() {
        assert!(TypeMask::FILESYSTEM.contains(DatasetKind::Filesystem));
        assert!(!TypeMask::FILESYSTEM.contains(DatasetKind::Snapshot));
        assert!(TypeMask::ANY.contains(DatasetKind::Volume));
        assert!((TypeMask::FILESYSTEM | TypeMask::VOLUME).contains(DatasetKind::Volume));
    }

    #[test]
    fn test_kind_parse_round_trip() {
        for kind in [
            DatasetKind::Filesystem,
            DatasetKind::Snapshot,
            DatasetKind::Volume,
        ] {
            assert_eq!(DatasetKind::parse(kind.as_str()), Some(kind));
            assert_eq!(DatasetKind::from_raw(kind.as_raw()), Some(kind));
        }
        assert_eq!(DatasetKind::parse("bogus"), None);
        assert_eq!(DatasetKind::from_raw(3), None);
    }

    #[test]
    fn test_pool_state_values() {
        assert_eq!(PoolState::Active.as_raw(), 0);
        assert_eq!(PoolState::Exported.as_raw(), 1);
        assert_eq!(PoolState::Destroyed.as_raw(), 2);
        assert_eq!(PoolState::Spare.as_raw(), 3);
        assert_eq!(PoolState::Uninitialized.as_raw(), 4);
        assert_eq!(PoolState::Unavailable.as_raw(), 5);
        assert_eq!(PoolState::PotentiallyActive.as_raw(), 6);
        assert_eq!(PoolState::Unknown.as_raw(), 7);
        assert_eq!(PoolState::L2Cache.as_raw(), 8);
        assert_eq!(PoolState::from_raw(5), PoolState::Unavailable);
        assert_eq!(PoolState::from_raw(99), PoolState::Unknown);
    }

    #[test]
    fn test_pool_status_values() {
        assert_eq!(PoolStatus::CorruptCache.as_raw(), 0);
        assert_eq!(PoolStatus::HostidMismatch.as_raw(), 10);
        assert_eq!(PoolStatus::Ok.as_raw(), 20);
        assert_eq!(PoolStatus::Unknown.as_raw(), 21);
        assert!(PoolStatus::Ok.is_healthy());
        assert!(!PoolStatus::Resilvering.is_healthy());
        assert_eq!(PoolStatus::from_raw(17), PoolStatus::Resilvering);
        assert_eq!(PoolStatus::from_raw(99), PoolStatus::Unknown);
    }
}
