//! Models module
//!
//! Validated value objects describing a load: columns, tables and the
//! manifests that say where the staged data lives.

pub mod column;
pub mod manifest;
pub mod table;

pub use column::{Column, ForeignKey, RawColumn};
pub use manifest::{
    AbsCredentials, AbsManifest, S3Credentials, S3Manifest, SliceEntry, SlicedManifest,
    StagingManifest, TableManifest,
};
pub use table::{RawTableConfig, TableLoadSpec};
