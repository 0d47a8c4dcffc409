//! Administration layer for ZFS pools and datasets.
//!
//! The entry point is a [`Handle`], a capability object wrapping one native
//! library context. [`Pool`] and [`Dataset`] objects are bound to a handle
//! and expose pool inspection, the dataset lifecycle (create, destroy,
//! rename, snapshot, clone, promote, rollback), typed properties, mount and
//! share control, and lazy traversal of the dataset namespace.
//!
//! Native failures follow the library's deferred-error convention: the
//! failing call stores an (errno, action, description) triple in the
//! handle's error slot and returns a sentinel value, while contract
//! violations fail eagerly with [`Error`]. The [`driver::ZfsDriver`] trait
//! is the seam to the native side; production code drives the platform
//! tooling, tests inject [`driver::MockDriver`].

pub mod command;
pub mod dataset;
pub mod driver;
pub mod error;
pub mod handle;
pub mod iter;
pub mod pool;

pub use dataset::Dataset;
pub use error::{Error, Result};
pub use handle::Handle;
pub use iter::{DatasetIter, PoolIter};
pub use pool::Pool;

pub use zetta_core::{
    dataset_prop, is_user_prop, nicenum, pool_prop, DatasetKind, ErrorCode, PoolState, PoolStatus,
    PropertyDef, PropertyKind, PropertyValue, TypeMask,
};
