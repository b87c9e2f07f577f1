//! In-process backends for tests and dry runs.
//!
//! `MockReleaseSource` serves releases from `<root>/<release>/` directories,
//! `MockProvider` fabricates archives in the cache directory, and
//! `MockExtractor` writes one placeholder file per literal (non-glob) pattern.

use crate::backend::{CertPacker, ContentExtractor, PackageProvider, ProviderSpec, ReleaseSource};
use crate::extract::archive_relative;
use crate::RuntimeError;
use splitter_schema::ReleaseId;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, RuntimeError> {
    m.lock()
        .map_err(|e| RuntimeError::ExecFailed(format!("mutex poisoned: {e}")))
}

fn copy_tree(src: &Path, dest: &Path) -> Result<(), RuntimeError> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

pub struct MockReleaseSource {
    root: PathBuf,
}

impl MockReleaseSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ReleaseSource for MockReleaseSource {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn validate(&self, release: &ReleaseId) -> Result<bool, RuntimeError> {
        Ok(self.root.join(release.as_str()).is_dir())
    }

    fn checkout(&self, release: &ReleaseId, dest: &Path) -> Result<(), RuntimeError> {
        let src = self.root.join(release.as_str());
        if !src.is_dir() {
            return Err(RuntimeError::Checkout {
                release: release.to_string(),
                reason: format!("{} does not exist", src.display()),
            });
        }
        copy_tree(&src, dest)
    }
}

/// Hands out empty `<cache>/<package>.rpm` files; packages marked missing
/// report "not found", packages marked broken fail to download.
#[derive(Default)]
pub struct MockProvider {
    missing: BTreeSet<String>,
    broken: BTreeSet<String>,
    fetched: Arc<Mutex<Vec<String>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_missing(mut self, package: &str) -> Self {
        self.missing.insert(package.to_owned());
        self
    }

    #[must_use]
    pub fn with_broken(mut self, package: &str) -> Self {
        self.broken.insert(package.to_owned());
        self
    }

    /// Shared log of every package a fetch was attempted for.
    pub fn fetched(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.fetched)
    }
}

impl PackageProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn prepare(&self, spec: &ProviderSpec) -> Result<(), RuntimeError> {
        std::fs::create_dir_all(&spec.cache_dir)?;
        Ok(())
    }

    fn fetch(&self, spec: &ProviderSpec, package: &str) -> Result<Option<PathBuf>, RuntimeError> {
        lock(&self.fetched)?.push(package.to_owned());
        if self.missing.contains(package) {
            return Ok(None);
        }
        if self.broken.contains(package) {
            return Err(RuntimeError::Download {
                package: package.to_owned(),
                reason: "mock download failure".to_owned(),
            });
        }
        let archive = spec.cache_dir.join(format!("{package}.rpm"));
        std::fs::write(&archive, format!("mock-rpm:{package}:{}", spec.arch))?;
        Ok(Some(archive))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractCall {
    pub archive: PathBuf,
    pub patterns: Vec<String>,
}

#[derive(Default)]
pub struct MockExtractor {
    calls: Arc<Mutex<Vec<ExtractCall>>>,
    fail_on: BTreeSet<String>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail extraction for archives whose file stem is `package`.
    #[must_use]
    pub fn failing_on(mut self, package: &str) -> Self {
        self.fail_on.insert(package.to_owned());
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<ExtractCall>>> {
        Arc::clone(&self.calls)
    }
}

fn is_literal(pattern: &str) -> bool {
    !pattern.contains(['*', '?', '['])
}

impl ContentExtractor for MockExtractor {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn extract(
        &self,
        archive: &Path,
        output: &Path,
        patterns: &[String],
    ) -> Result<Vec<String>, RuntimeError> {
        lock(&self.calls)?.push(ExtractCall {
            archive: archive.to_path_buf(),
            patterns: patterns.to_vec(),
        });
        let stem = archive
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.fail_on.contains(&stem) {
            return Err(RuntimeError::Extract {
                archive: archive.to_path_buf(),
                reason: "mock extraction failure".to_owned(),
            });
        }

        let mut written = Vec::new();
        for pattern in patterns.iter().filter(|p| is_literal(p)) {
            let target = output.join(pattern.trim_start_matches('/'));
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, format!("mock:{stem}:{pattern}"))?;
            written.push(archive_relative(pattern));
        }
        Ok(written)
    }
}

#[derive(Default)]
pub struct MockCertPacker {
    registered: Arc<Mutex<Vec<PathBuf>>>,
}

impl MockCertPacker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registered(&self) -> Arc<Mutex<Vec<PathBuf>>> {
        Arc::clone(&self.registered)
    }
}

impl CertPacker for MockCertPacker {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn initialize(&self, output: &Path) -> Result<(), RuntimeError> {
        std::fs::create_dir_all(crate::cert::db_path(output))?;
        Ok(())
    }

    fn register(&self, _output: &Path, archive: &Path) -> Result<bool, RuntimeError> {
        lock(&self.registered)?.push(archive.to_path_buf());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splitter_schema::Arch;

    fn spec(dir: &Path) -> ProviderSpec {
        ProviderSpec {
            release: ReleaseId::new("openEuler-24.03-LTS"),
            arch: Arch::X86_64,
            template: dir.join("repo/openEuler.template"),
            repo_dir: dir.join("repo-out"),
            cache_dir: dir.join("cache"),
        }
    }

    #[test]
    fn release_source_validates_and_copies() {
        let root = tempfile::tempdir().unwrap();
        let release = root.path().join("openEuler-24.03-LTS/slices");
        std::fs::create_dir_all(&release).unwrap();
        std::fs::write(release.join("bash.yaml"), "package: bash\nslices: {}\n").unwrap();

        let source = MockReleaseSource::new(root.path());
        assert!(source
            .validate(&ReleaseId::new("openEuler-24.03-LTS"))
            .unwrap());
        assert!(!source.validate(&ReleaseId::new("openEuler-99")).unwrap());

        let dest = tempfile::tempdir().unwrap();
        let checkout = dest.path().join("slice-releases");
        source
            .checkout(&ReleaseId::new("openEuler-24.03-LTS"), &checkout)
            .unwrap();
        assert!(checkout.join("slices/bash.yaml").is_file());
    }

    #[test]
    fn provider_reports_missing_and_broken() {
        let dir = tempfile::tempdir().unwrap();
        let spec = spec(dir.path());
        let provider = MockProvider::new().with_missing("gone").with_broken("bad");
        provider.prepare(&spec).unwrap();

        assert!(provider.fetch(&spec, "bash").unwrap().unwrap().is_file());
        assert!(provider.fetch(&spec, "gone").unwrap().is_none());
        assert!(provider.fetch(&spec, "bad").is_err());
        assert_eq!(*provider.fetched().lock().unwrap(), vec!["bash", "gone", "bad"]);
    }

    #[test]
    fn extractor_writes_literal_patterns_only() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = MockExtractor::new();
        let written = extractor
            .extract(
                Path::new("/cache/bash.rpm"),
                dir.path(),
                &["/usr/bin/bash".to_owned(), "/usr/lib64/*.so".to_owned()],
            )
            .unwrap();
        assert_eq!(written, vec!["./usr/bin/bash"]);
        assert!(dir.path().join("usr/bin/bash").is_file());
        assert_eq!(extractor.calls().lock().unwrap().len(), 1);
    }

    #[test]
    fn extractor_reports_paths_like_cpio() {
        let dir = tempfile::tempdir().unwrap();
        let written = MockExtractor::new()
            .extract(
                Path::new("/cache/bash.rpm"),
                dir.path(),
                &["usr/bin/sh".to_owned(), "./etc/bashrc".to_owned()],
            )
            .unwrap();
        assert_eq!(written, vec!["./usr/bin/sh", "./etc/bashrc"]);
        assert!(dir.path().join("usr/bin/sh").is_file());
        assert!(dir.path().join("etc/bashrc").is_file());
    }

    #[test]
    fn extractor_can_fail() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = MockExtractor::new().failing_on("bash");
        assert!(extractor
            .extract(Path::new("/cache/bash.rpm"), dir.path(), &[])
            .is_err());
    }
}
