use serde::{Deserialize, Serialize};

/// Native operation error codes.
///
/// These are the libzfs errno values surfaced through a handle's error slot
/// after a failing native call. The numeric values are part of the ABI that
/// downstream administrative tooling matches on, so they are pinned here and
/// must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ErrorCode {
    NoMemory = 2000,
    InvalidProperty = 2001,
    ReadOnlyProperty = 2002,
    InvalidPropertyType = 2003,
    NonInheritableProperty = 2004,
    PropertySpace = 2005,
    InvalidDatasetType = 2006,
    Busy = 2007,
    Exists = 2008,
    NoEntity = 2009,
    BadStream = 2010,
    DatasetReadOnly = 2011,
    VolumeTooBig = 2012,
    VolumeHasData = 2013,
    InvalidName = 2014,
    BadRestore = 2015,
    BadBackup = 2016,
    BadTarget = 2017,
    NoDevice = 2018,
    BadDevice = 2019,
    NoReplicas = 2020,
    Resilvering = 2021,
    BadVersion = 2022,
    PoolUnavailable = 2023,
    DeviceOverflow = 2024,
    BadPath = 2025,
    CrossTarget = 2026,
    Zoned = 2027,
    MountFailed = 2028,
    UnmountFailed = 2029,
    UnshareNfsFailed = 2030,
    ShareNfsFailed = 2031,
    DevLinks = 2032,
    Permission = 2033,
    NoSpace = 2034,
    Io = 2035,
    Interrupted = 2036,
    IsSpare = 2037,
    InvalidConfig = 2038,
    Recursive = 2039,
    NoHistory = 2040,
    UnshareIscsiFailed = 2041,
    ShareIscsiFailed = 2042,
    PoolProps = 2043,
    PoolNotSupported = 2044,
    PoolInvalidArg = 2045,
    NameTooLong = 2046,
    Unknown = 2047,
}

impl ErrorCode {
    /// The numeric errno value.
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    /// Map a raw errno back to a code. Out-of-range values become `Unknown`.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            2000 => ErrorCode::NoMemory,
            2001 => ErrorCode::InvalidProperty,
            2002 => ErrorCode::ReadOnlyProperty,
            2003 => ErrorCode::InvalidPropertyType,
            2004 => ErrorCode::NonInheritableProperty,
            2005 => ErrorCode::PropertySpace,
            2006 => ErrorCode::InvalidDatasetType,
            2007 => ErrorCode::Busy,
            2008 => ErrorCode::Exists,
            2009 => ErrorCode::NoEntity,
            2010 => ErrorCode::BadStream,
            2011 => ErrorCode::DatasetReadOnly,
            2012 => ErrorCode::VolumeTooBig,
            2013 => ErrorCode::VolumeHasData,
            2014 => ErrorCode::InvalidName,
            2015 => ErrorCode::BadRestore,
            2016 => ErrorCode::BadBackup,
            2017 => ErrorCode::BadTarget,
            2018 => ErrorCode::NoDevice,
            2019 => ErrorCode::BadDevice,
            2020 => ErrorCode::NoReplicas,
            2021 => ErrorCode::Resilvering,
            2022 => ErrorCode::BadVersion,
            2023 => ErrorCode::PoolUnavailable,
            2024 => ErrorCode::DeviceOverflow,
            2025 => ErrorCode::BadPath,
            2026 => ErrorCode::CrossTarget,
            2027 => ErrorCode::Zoned,
            2028 => ErrorCode::MountFailed,
            2029 => ErrorCode::UnmountFailed,
            2030 => ErrorCode::UnshareNfsFailed,
            2031 => ErrorCode::ShareNfsFailed,
            2032 => ErrorCode::DevLinks,
            2033 => ErrorCode::Permission,
            2034 => ErrorCode::NoSpace,
            2035 => ErrorCode::Io,
            2036 => ErrorCode::Interrupted,
            2037 => ErrorCode::IsSpare,
            2038 => ErrorCode::InvalidConfig,
            2039 => ErrorCode::Recursive,
            2040 => ErrorCode::NoHistory,
            2041 => ErrorCode::UnshareIscsiFailed,
            2042 => ErrorCode::ShareIscsiFailed,
            2043 => ErrorCode::PoolProps,
            2044 => ErrorCode::PoolNotSupported,
            2045 => ErrorCode::PoolInvalidArg,
            2046 => ErrorCode::NameTooLong,
            _ => ErrorCode::Unknown,
        }
    }

    /// Canonical short name, matching the libzfs EZFS_* suffix in lowercase.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NoMemory => "nomem",
            ErrorCode::InvalidProperty => "badprop",
            ErrorCode::ReadOnlyProperty => "propreadonly",
            ErrorCode::InvalidPropertyType => "proptype",
            ErrorCode::NonInheritableProperty => "propnoninherit",
            ErrorCode::PropertySpace => "propspace",
            ErrorCode::InvalidDatasetType => "badtype",
            ErrorCode::Busy => "busy",
            ErrorCode::Exists => "exists",
            ErrorCode::NoEntity => "noent",
            ErrorCode::BadStream => "badstream",
            ErrorCode::DatasetReadOnly => "dsreadonly",
            ErrorCode::VolumeTooBig => "voltoobig",
            ErrorCode::VolumeHasData => "volhasdata",
            ErrorCode::InvalidName => "invalidname",
            ErrorCode::BadRestore => "badrestore",
            ErrorCode::BadBackup => "badbackup",
            ErrorCode::BadTarget => "badtarget",
            ErrorCode::NoDevice => "nodevice",
            ErrorCode::BadDevice => "baddev",
            ErrorCode::NoReplicas => "noreplicas",
            ErrorCode::Resilvering => "resilvering",
            ErrorCode::BadVersion => "badversion",
            ErrorCode::PoolUnavailable => "poolunavail",
            ErrorCode::DeviceOverflow => "devoverflow",
            ErrorCode::BadPath => "badpath",
            ErrorCode::CrossTarget => "crosstarget",
            ErrorCode::Zoned => "zoned",
            ErrorCode::MountFailed => "mountfailed",
            ErrorCode::UnmountFailed => "umountfailed",
            ErrorCode::UnshareNfsFailed => "unsharenfsfailed",
            ErrorCode::ShareNfsFailed => "sharenfsfailed",
            ErrorCode::DevLinks => "devlinks",
            ErrorCode::Permission => "perm",
            ErrorCode::NoSpace => "nospc",
            ErrorCode::Io => "io",
            ErrorCode::Interrupted => "intr",
            ErrorCode::IsSpare => "isspare",
            ErrorCode::InvalidConfig => "invalconfig",
            ErrorCode::Recursive => "recursive",
            ErrorCode::NoHistory => "nohistory",
            ErrorCode::UnshareIscsiFailed => "unshareiscsifailed",
            ErrorCode::ShareIscsiFailed => "shareiscsifailed",
            ErrorCode::PoolProps => "poolprops",
            ErrorCode::PoolNotSupported => "pool_notsup",
            ErrorCode::PoolInvalidArg => "pool_invalarg",
            ErrorCode::NameTooLong => "nametoolong",
            ErrorCode::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_pinned() {
        assert_eq!(ErrorCode::NoMemory.as_raw(), 2000);
        assert_eq!(ErrorCode::InvalidProperty.as_raw(), 2001);
        assert_eq!(ErrorCode::ReadOnlyProperty.as_raw(), 2002);
        assert_eq!(ErrorCode::Busy.as_raw(), 2007);
        assert_eq!(ErrorCode::Exists.as_raw(), 2008);
        assert_eq!(ErrorCode::NoEntity.as_raw(), 2009);
        assert_eq!(ErrorCode::InvalidName.as_raw(), 2014);
        assert_eq!(ErrorCode::MountFailed.as_raw(), 2028);
        assert_eq!(ErrorCode::DevLinks.as_raw(), 2032);
        assert_eq!(ErrorCode::UnshareIscsiFailed.as_raw(), 2041);
        assert_eq!(ErrorCode::NameTooLong.as_raw(), 2046);
        assert_eq!(ErrorCode::Unknown.as_raw(), 2047);
    }

    #[test]
    fn test_raw_round_trip() {
        for raw in 2000..=2047 {
            assert_eq!(ErrorCode::from_raw(raw).as_raw(), raw);
        }
    }

    #[test]
    fn test_out_of_range_is_unknown() {
        assert_eq!(ErrorCode::from_raw(0), ErrorCode::Unknown);
        assert_eq!(ErrorCode::from_raw(1999), ErrorCode::Unknown);
        assert_eq!(ErrorCode::from_raw(2048), ErrorCode::Unknown);
    }
}
