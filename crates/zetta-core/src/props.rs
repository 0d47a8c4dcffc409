use serde::{Deserialize, Serialize};

/// Semantic type of a native property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyKind {
    /// Free-form string (mountpoint, sharenfs, ...).
    String,
    /// Plain number (creation, version, guid, ...).
    Number,
    /// Byte count, nice-formatted on display (used, quota, ...).
    Size,
    /// on/off toggle.
    Boolean,
    /// One value out of a fixed set (compression, checksum, ...).
    Index,
}

/// One entry of the native property catalog.
#[derive(Debug, Clone, Copy)]
pub struct PropertyDef {
    pub name: &'static str,
    pub kind: PropertyKind,
    pub readonly: bool,
}

const fn prop(name: &'static str, kind: PropertyKind, readonly: bool) -> PropertyDef {
    PropertyDef {
        name,
        kind,
        readonly,
    }
}

/// Native dataset properties.
///
/// A subset of the full libzfs catalog covering the properties this layer
/// exposes; read-only entries are rejected by `set` before the native call.
static DATASET_PROPS: &[PropertyDef] = &[
    prop("type", PropertyKind::Index, true),
    prop("creation", PropertyKind::Number, true),
    prop("used", PropertyKind::Size, true),
    prop("available", PropertyKind::Size, true),
    prop("referenced", PropertyKind::Size, true),
    prop("compressratio", PropertyKind::String, true),
    prop("mounted", PropertyKind::Boolean, true),
    prop("origin", PropertyKind::String, true),
    prop("guid", PropertyKind::Number, true),
    prop("usedbysnapshots", PropertyKind::Size, true),
    prop("usedbydataset", PropertyKind::Size, true),
    prop("usedbychildren", PropertyKind::Size, true),
    prop("quota", PropertyKind::Size, false),
    prop("reservation", PropertyKind::Size, false),
    prop("volsize", PropertyKind::Size, false),
    prop("volblocksize", PropertyKind::Size, true),
    prop("recordsize", PropertyKind::Size, false),
    prop("mountpoint", PropertyKind::String, false),
    prop("sharenfs", PropertyKind::String, false),
    prop("sharesmb", PropertyKind::String, false),
    prop("shareiscsi", PropertyKind::String, false),
    prop("checksum", PropertyKind::Index, false),
    prop("compression", PropertyKind::Index, false),
    prop("atime", PropertyKind::Boolean, false),
    prop("devices", PropertyKind::Boolean, false),
    prop("exec", PropertyKind::Boolean, false),
    prop("setuid", PropertyKind::Boolean, false),
    prop("readonly", PropertyKind::Boolean, false),
    prop("zoned", PropertyKind::Boolean, false),
    prop("snapdir", PropertyKind::Index, false),
    prop("canmount", PropertyKind::Index, false),
    prop("xattr", PropertyKind::Boolean, false),
    prop("copies", PropertyKind::Index, false),
    prop("version", PropertyKind::Number, false),
];

/// Native pool properties.
static POOL_PROPS: &[PropertyDef] = &[
    prop("name", PropertyKind::String, true),
    prop("size", PropertyKind::Size, true),
    prop("used", PropertyKind::Size, true),
    prop("available", PropertyKind::Size, true),
    prop("allocated", PropertyKind::Size, true),
    prop("free", PropertyKind::Size, true),
    prop("capacity", PropertyKind::Number, true),
    prop("guid", PropertyKind::Number, true),
    prop("health", PropertyKind::String, true),
    prop("altroot", PropertyKind::String, false),
    prop("version", PropertyKind::Number, false),
    prop("bootfs", PropertyKind::String, false),
    prop("delegation", PropertyKind::Boolean, false),
    prop("autoreplace", PropertyKind::Boolean, false),
    prop("cachefile", PropertyKind::String, false),
    prop("failmode", PropertyKind::Index, false),
    prop("listsnapshots", PropertyKind::Boolean, false),
];

/// Look up a native dataset property by name.
pub fn dataset_prop(name: &str) -> Option<&'static PropertyDef> {
    DATASET_PROPS.iter().find(|p| p.name == name)
}

/// Look up a native pool property by name.
pub fn pool_prop(name: &str) -> Option<&'static PropertyDef> {
    POOL_PROPS.iter().find(|p| p.name == name)
}

/// Whether a name is syntactically a user-defined property (`module:key`).
///
/// User properties must contain a colon and use only lowercase letters,
/// digits, and `:._-`, with non-empty module and key parts.
pub fn is_user_prop(name: &str) -> bool {
    let Some(idx) = name.find(':') else {
        return false;
    };
    if idx == 0 || idx == name.len() - 1 {
        return false;
    }
    name.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || ":._-".contains(c))
}

/// A property value as returned from a handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyValue {
    Text(String),
    Number(u64),
}

impl PropertyValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            PropertyValue::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<u64> {
        match self {
            PropertyValue::Text(_) => None,
            PropertyValue::Number(n) => Some(*n),
        }
    }
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::Text(s) => write!(f, "{}", s),
            PropertyValue::Number(n) => write!(f, "{}", n),
        }
    }
}

/// Format a byte count the way the native tooling does ("123M", "1.50G").
///
/// Exact multiples of a unit print without decimals; everything else prints
/// with up to two decimals, trailing zeros trimmed.
pub fn nicenum(n: u64) -> String {
    const UNITS: &[char] = &['K', 'M', 'G', 'T', 'P', 'E'];

    if n < 1024 {
        return n.to_string();
    }

    let mut index = 0usize;
    let mut scaled = n;
    while scaled >= 1024 && index < UNITS.len() {
        scaled /= 1024;
        index += 1;
    }
    let unit = UNITS[index - 1];
    let divisor = 1024u64.pow(index as u32);

    if n % divisor == 0 {
        return format!("{}{}", n / divisor, unit);
    }

    let value = n as f64 / divisor as f64;
    let mut s = format!("{:.2}", value);
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    format!("{}{}", s, unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_lookup() {
        assert!(dataset_prop("mountpoint").is_some());
        assert!(dataset_prop("creation").unwrap().readonly);
        assert!(!dataset_prop("quota").unwrap().readonly);
        assert_eq!(dataset_prop("used").unwrap().kind, PropertyKind::Size);
        assert!(dataset_prop("nosuchprop").is_none());

        assert!(pool_prop("guid").unwrap().readonly);
        assert_eq!(pool_prop("delegation").unwrap().kind, PropertyKind::Boolean);
        assert!(pool_prop("nosuchprop").is_none());
    }

    #[test]
    fn test_user_prop_syntax() {
        assert!(is_user_prop("com.example:backup"));
        assert!(is_user_prop("org:retention-days"));
        assert!(!is_user_prop("mountpoint"));
        assert!(!is_user_prop(":nokey"));
        assert!(!is_user_prop("nomodule:"));
        assert!(!is_user_prop("Bad:Case"));
        assert!(!is_user_prop("com.example:a+b"));
    }

    #[test]
    fn test_nicenum() {
        assert_eq!(nicenum(0), "0");
        assert_eq!(nicenum(512), "512");
        assert_eq!(nicenum(1024), "1K");
        assert_eq!(nicenum(123 * 1024 * 1024), "123M");
        assert_eq!(nicenum(1024 * 1024 * 1024), "1G");
        assert_eq!(nicenum(1536), "1.5K");
        assert_eq!(nicenum(1024 + 256), "1.25K");
    }

    #[test]
    fn test_property_value_accessors() {
        let v = PropertyValue::Number(42);
        assert_eq!(v.as_number(), Some(42));
        assert_eq!(v.as_text(), None);
        assert_eq!(v.to_string(), "42");

        let v = PropertyValue::Text("on".to_string());
        assert_eq!(v.as_text(), Some("on"));
        assert_eq!(v.to_string(), "on");
    }
}
