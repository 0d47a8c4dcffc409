//! Zetta Core - Fundamental types for the Zetta ZFS management layer
//!
//! This crate provides:
//! - The libzfs errno taxonomy with its wire-stable numeric codes
//! - Dataset kind and open-mask types
//! - Pool state and health enumerations
//! - The native property catalog and value formatting helpers

pub mod error;
pub mod props;
pub mod types;

// Re-export commonly used types
pub use error::ErrorCode;
pub use props::{
    dataset_prop, is_user_prop, nicenum, pool_prop, PropertyDef, PropertyKind, PropertyValue,
};
pub use types::{DatasetKind, PoolState, PoolStatus, TypeMask};
