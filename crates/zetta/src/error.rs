use miette::Diagnostic;
use thiserror::Error;

/// Contract-violation errors, reported at the call boundary.
///
/// These are the tier-1 failures: the caller asked for something the API
/// cannot express, independent of what the native library would say. Native
/// operation failures (missing entity, busy, permission, ...) are never
/// surfaced here; they land in the owning [`Handle`](crate::Handle)'s error
/// slot and the operation yields an absent value or a sentinel return.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Property name is neither a native property nor a user property
    #[error("Unknown property: {name}")]
    #[diagnostic(
        code(zetta::unknown_property),
        help("Native property names are fixed; user properties must be namespaced as 'module:key'")
    )]
    UnknownProperty {
        #[allow(unused)]
        name: String,
    },

    /// Native get was invoked with a user property name
    #[error("'{name}' is a user-defined property")]
    #[diagnostic(
        code(zetta::user_property),
        help("Use `get_user_prop` in order to access user defined properties")
    )]
    UserProperty {
        #[allow(unused)]
        name: String,
    },

    /// Operation is not legal for this dataset kind or driver
    #[error("Operation '{operation}' is not supported here: {reason}")]
    #[diagnostic(
        code(zetta::unsupported_capability),
        help("Check the dataset kind with `kind()` before invoking kind-specific operations")
    )]
    UnsupportedCapability {
        #[allow(unused)]
        operation: String,
        #[allow(unused)]
        reason: String,
    },
}

/// Result type alias for call-boundary checks
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn unknown_property(name: impl Into<String>) -> Self {
        Self::UnknownProperty { name: name.into() }
    }

    pub fn user_property(name: impl Into<String>) -> Self {
        Self::UserProperty { name: name.into() }
    }

    pub fn unsupported_capability(
        operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::UnsupportedCapability {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}
