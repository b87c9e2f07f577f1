//! Slice definition files, slice references, and target architectures for splitter.
//!
//! This crate defines the schema layer: YAML slice definition file parsing
//! (`SliceManifest`), the typed `Slice` / `SliceExtra` records owned by a
//! manifest, the `{package}_{slice}` reference type (`SliceRef`), and the
//! canonical set of supported architectures (`Arch`).

pub mod manifest;
pub mod types;

pub use manifest::{
    parse_manifest_file, parse_manifest_str, ManifestError, Slice, SliceExtra, SliceManifest,
    MANIFEST_EXTENSION,
};
pub use types::{Arch, ReleaseId, SliceRef};
