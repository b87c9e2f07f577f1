use crate::RuntimeError;
use serde::{Deserialize, Serialize};
use splitter_schema::{Arch, ReleaseId};
use std::path::{Path, PathBuf};

/// Everything a package provider needs to know about the active session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderSpec {
    pub release: ReleaseId,
    pub arch: Arch,
    /// Repository configuration template shipped with the slice release.
    pub template: PathBuf,
    /// Directory the rendered repository configuration is written to.
    pub repo_dir: PathBuf,
    /// Package metadata and download cache.
    pub cache_dir: PathBuf,
}

/// Where slice definition files come from.
pub trait ReleaseSource: Send + Sync {
    fn name(&self) -> &str;

    /// Whether `release` exists upstream.
    fn validate(&self, release: &ReleaseId) -> Result<bool, RuntimeError>;

    /// Materialize the release's slice repository at `dest`.
    fn checkout(&self, release: &ReleaseId, dest: &Path) -> Result<(), RuntimeError>;
}

pub trait PackageProvider: Send + Sync {
    fn name(&self) -> &str;

    /// One-time setup before the first fetch (repository configuration, caches).
    fn prepare(&self, _spec: &ProviderSpec) -> Result<(), RuntimeError> {
        Ok(())
    }

    /// Download the newest build of `package`.
    /// `Ok(None)` means the repositories do not carry it.
    fn fetch(&self, spec: &ProviderSpec, package: &str) -> Result<Option<PathBuf>, RuntimeError>;
}

pub trait ContentExtractor: Send + Sync {
    fn name(&self) -> &str;

    /// Extract every archive entry matching one of `patterns` into `output`.
    /// Returns the extracted entry paths.
    fn extract(
        &self,
        archive: &Path,
        output: &Path,
        patterns: &[String],
    ) -> Result<Vec<String>, RuntimeError>;
}

pub trait CertPacker: Send + Sync {
    fn name(&self) -> &str;

    /// Prepare the package database under `output`. Failure is fatal.
    fn initialize(&self, output: &Path) -> Result<(), RuntimeError>;

    /// Record `archive` as installed under `output`. `Ok(false)` when the
    /// package could not be registered or verified.
    fn register(&self, output: &Path, archive: &Path) -> Result<bool, RuntimeError>;
}

/// The full set of collaborators one cut runs against.
pub struct Backends {
    pub source: Box<dyn ReleaseSource>,
    pub provider: Box<dyn PackageProvider>,
    pub extractor: Box<dyn ContentExtractor>,
    pub certifier: Box<dyn CertPacker>,
}

#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    pub slice_repo: String,
    pub mock_root: Option<PathBuf>,
}

pub fn select_backends(name: &str, options: &BackendOptions) -> Result<Backends, RuntimeError> {
    match name {
        "rpm" => Ok(Backends {
            source: Box::new(crate::git::GitReleaseSource::new(&options.slice_repo)),
            provider: Box::new(crate::dnf::DnfProvider::new()),
            extractor: Box::new(crate::extract::RpmExtractor::new()),
            certifier: Box::new(crate::cert::RpmCertPacker::new()),
        }),
        "mock" => {
            let root = options.mock_root.clone().ok_or_else(|| {
                RuntimeError::BackendUnavailable("mock (no mock_root configured)".to_owned())
            })?;
            Ok(Backends {
                source: Box::new(crate::mock::MockReleaseSource::new(root)),
                provider: Box::new(crate::mock::MockProvider::new()),
                extractor: Box::new(crate::mock::MockExtractor::new()),
                certifier: Box::new(crate::mock::MockCertPacker::new()),
            })
        }
        other => Err(RuntimeError::BackendUnavailable(other.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_valid_backends() {
        let options = BackendOptions {
            slice_repo: "https://example.com/slices.git".to_owned(),
            mock_root: Some(PathBuf::from("/tmp/splitter-mock")),
        };
        let rpm = select_backends("rpm", &options).unwrap();
        assert_eq!(rpm.source.name(), "git");
        assert_eq!(rpm.provider.name(), "dnf");
        let mock = select_backends("mock", &options).unwrap();
        assert_eq!(mock.extractor.name(), "mock");
    }

    #[test]
    fn mock_requires_root() {
        assert!(select_backends("mock", &BackendOptions::default()).is_err());
    }

    #[test]
    fn select_invalid_backend_fails() {
        assert!(select_backends("apt", &BackendOptions::default()).is_err());
    }
}
