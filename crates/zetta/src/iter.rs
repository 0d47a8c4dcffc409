use crate::dataset::Dataset;
use crate::handle::Handle;
use crate::pool::Pool;
use std::sync::Arc;
use zetta_core::TypeMask;

/// Lazy sequence of datasets produced by a traversal operation.
///
/// The name list is fixed when the iterator is created (one native
/// enumeration call); each `next()` issues one native open and skips entries
/// that vanished in between. The sequence is finite and non-restartable;
/// re-invoke the traversal operation for a fresh view. Yielded datasets own
/// their native handles, so dropping the iterator early releases everything
/// that was acquired.
pub struct DatasetIter {
    handle: Arc<Handle>,
    names: std::vec::IntoIter<String>,
    mask: TypeMask,
}

impl DatasetIter {
    pub(crate) fn new(handle: Arc<Handle>, names: Vec<String>, mask: TypeMask) -> Self {
        Self {
            handle,
            names: names.into_iter(),
            mask,
        }
    }

    /// An already-exhausted sequence, used when enumeration itself failed
    /// (the failure is left in the handle's error slot).
    pub(crate) fn empty(handle: Arc<Handle>, mask: TypeMask) -> Self {
        Self::new(handle, Vec::new(), mask)
    }
}

impl Iterator for DatasetIter {
    type Item = Dataset;

    fn next(&mut self) -> Option<Dataset> {
        for name in self.names.by_ref() {
            if let Some(dataset) = Dataset::open(&name, self.mask, &self.handle) {
                return Some(dataset);
            }
        }
        None
    }
}

/// Lazy sequence of all pools visible to the native library.
///
/// Same contract as [`DatasetIter`]: fixed name list, one native open per
/// step, finite, non-restartable, fresh per `Pool::iter` call.
pub struct PoolIter {
    handle: Arc<Handle>,
    names: std::vec::IntoIter<String>,
}

impl PoolIter {
    pub(crate) fn new(handle: Arc<Handle>, names: Vec<String>) -> Self {
        Self {
            handle,
            names: names.into_iter(),
        }
    }

    pub(crate) fn empty(handle: Arc<Handle>) -> Self {
        Self::new(handle, Vec::new())
    }
}

impl Iterator for PoolIter {
    type Item = Pool;

    fn next(&mut self) -> Option<Pool> {
        for name in self.names.by_ref() {
            let pool = Pool::open(&name, &self.handle);
            if pool.is_open() {
                return Some(pool);
            }
        }
        None
    }
}
