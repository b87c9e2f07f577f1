//! Core engine for splitter.
//!
//! This crate ties slice definition files and host backends together: the
//! `ManifestCache` loads every slice definition file of a release, the
//! `Resolver` computes transitive slice dependencies, `aggregate` groups the
//! resolved slices' file patterns and extras by package, and the `Splitter`
//! drives download, extraction, extra artifacts, and RPM database
//! registration per package inside a scoped `Session`.

pub mod aggregate;
pub mod cache;
pub mod concurrency;
pub mod config;
pub mod extra;
pub mod resolve;
pub mod session;
pub mod splitter;

pub use aggregate::{aggregate, Aggregation, PackagePlan};
pub use cache::{LoadFailure, ManifestCache};
pub use concurrency::{install_signal_handler, shutdown_requested};
pub use config::SplitterConfig;
pub use extra::{apply_extra, ExtraTarget};
pub use resolve::Resolver;
pub use session::{Session, SessionLayout, SessionLock};
pub use splitter::{
    validate_arch, validate_slices, CutReport, CutRequest, PackageReport, SkippedPackage,
    Splitter, ValidatedRequest,
};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("manifest error: {0}")]
    Manifest(#[from] splitter_schema::ManifestError),
    #[error("runtime error: {0}")]
    Runtime(#[from] splitter_runtime::RuntimeError),
    #[error("invalid slice name: '{0}', expected '<package>_<slice>'")]
    InvalidSliceName(String),
    #[error("invalid release: '{0}' does not exist in the slice repository")]
    InvalidRelease(String),
    #[error("invalid architecture: '{0}' (supported: x86_64, amd64, linux/amd64, aarch64, arm64, linux/arm64)")]
    InvalidArchitecture(String),
    #[error("slice definition file not found for '{slice}': {}", path.display())]
    UnresolvedManifest { slice: String, path: PathBuf },
    #[error("extraction failed for package '{package}': {source}")]
    Extraction {
        package: String,
        #[source]
        source: splitter_runtime::RuntimeError,
    },
    #[error("certification failed: {0}")]
    Certification(#[source] splitter_runtime::RuntimeError),
    #[error("unsafe path '{0}': escapes the output directory")]
    UnsafePath(String),
    #[error("session lock: {0}")]
    SessionBusy(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("interrupted before '{0}'")]
    Interrupted(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
