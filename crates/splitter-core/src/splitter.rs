use crate::aggregate::{aggregate, PackagePlan};
use crate::cache::{LoadFailure, ManifestCache};
use crate::concurrency::shutdown_requested;
use crate::config::SplitterConfig;
use crate::extra::{apply_extra, ExtraTarget};
use crate::resolve::Resolver;
use crate::session::{Session, SessionLayout};
use crate::CoreError;
use serde::Serialize;
use splitter_runtime::Backends;
use splitter_schema::{Arch, ReleaseId, SliceRef};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One `cut` invocation as the user typed it.
#[derive(Debug, Clone, Default)]
pub struct CutRequest {
    pub release: String,
    pub arch: String,
    pub output: PathBuf,
    pub slices: Vec<String>,
    /// Resolve and aggregate only; nothing is downloaded or written.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PackageReport {
    pub package: String,
    pub archive: PathBuf,
    pub extracted: Vec<String>,
    pub extra_files: Vec<String>,
    pub certified: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedPackage {
    pub package: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CutReport {
    pub release: ReleaseId,
    pub arch: Arch,
    pub output: PathBuf,
    pub dry_run: bool,
    /// Requested slices plus everything they depend on.
    pub slices: Vec<SliceRef>,
    pub plan: Vec<PackagePlan>,
    pub packages: Vec<PackageReport>,
    pub skipped: Vec<SkippedPackage>,
    /// Packages whose slices declare extras but no common patterns.
    pub extras_only: Vec<String>,
    pub manifest_failures: Vec<LoadFailure>,
}

/// A request that passed input validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub release: ReleaseId,
    pub arch: Arch,
    pub output: PathBuf,
    pub slices: Vec<SliceRef>,
}

pub fn validate_slices(slices: &[String]) -> Result<Vec<SliceRef>, CoreError> {
    slices
        .iter()
        .map(|s| SliceRef::parse(s).map_err(|_| CoreError::InvalidSliceName(s.clone())))
        .collect()
}

pub fn validate_arch(arch: &str) -> Result<Arch, CoreError> {
    Arch::from_alias(arch).ok_or_else(|| CoreError::InvalidArchitecture(arch.to_owned()))
}

fn absolute(path: &Path) -> Result<PathBuf, CoreError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Drives one cut: validation, checkout, resolution, aggregation, and the
/// per-package fetch / extract / extras / register loop.
pub struct Splitter<'a> {
    config: &'a SplitterConfig,
    backends: &'a Backends,
    layout: SessionLayout,
    interrupted: Box<dyn Fn() -> bool + 'a>,
}

impl<'a> Splitter<'a> {
    pub fn new(config: &'a SplitterConfig, backends: &'a Backends) -> Self {
        Self {
            config,
            backends,
            layout: config.layout(),
            interrupted: Box::new(shutdown_requested),
        }
    }

    #[must_use]
    pub fn with_layout(mut self, layout: SessionLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Replace the Ctrl-C check consulted before each package.
    #[must_use]
    pub fn with_interrupt_check(mut self, check: impl Fn() -> bool + 'a) -> Self {
        self.interrupted = Box::new(check);
        self
    }

    pub fn layout(&self) -> &SessionLayout {
        &self.layout
    }

    /// Check slice names, then the release upstream, then the architecture.
    pub fn validate(&self, request: &CutRequest) -> Result<ValidatedRequest, CoreError> {
        let slices = validate_slices(&request.slices)?;
        let release = self.config.release_id(&request.release)?;
        if !self.backends.source.validate(&release)? {
            return Err(CoreError::InvalidRelease(release.into_inner()));
        }
        let arch = validate_arch(&request.arch)?;
        let output = absolute(&request.output)?;
        Ok(ValidatedRequest {
            release,
            arch,
            output,
            slices,
        })
    }

    pub fn cut(&self, request: &CutRequest) -> Result<CutReport, CoreError> {
        self.cut_with_progress(request, &|_| {})
    }

    /// Like [`cut`](Self::cut), calling `progress` with each package name
    /// before it is fetched.
    pub fn cut_with_progress(
        &self,
        request: &CutRequest,
        progress: &dyn Fn(&str),
    ) -> Result<CutReport, CoreError> {
        let ValidatedRequest {
            release,
            arch,
            output,
            slices,
        } = self.validate(request)?;
        info!(
            "splitting packages from {release} ({arch}) to {}",
            output.display()
        );

        let session = Session::acquire(self.layout.clone())?;
        let layout = session.layout();
        self.backends
            .source
            .checkout(&release, &layout.checkout_dir())?;

        let cache = ManifestCache::load(&layout.slices_dir())?;
        let resolved = Resolver::new(&cache).resolve_all(&slices)?;
        info!("total: {} slices", resolved.len());
        info!(
            "{}",
            serde_json::to_string_pretty(&resolved).unwrap_or_default()
        );

        let agg = aggregate(&cache, &resolved)?;
        let extras_only: Vec<String> = agg.extras_only().into_iter().map(str::to_owned).collect();
        for package in &extras_only {
            warn!("{package}: slices declare extras but no common patterns, not extracting it");
        }

        let mut report = CutReport {
            release: release.clone(),
            arch,
            output: output.clone(),
            dry_run: request.dry_run,
            slices: resolved.into_iter().collect(),
            plan: agg.plan(),
            packages: Vec::new(),
            skipped: Vec::new(),
            extras_only,
            manifest_failures: cache.failures().to_vec(),
        };
        if request.dry_run {
            debug!("dry run, stopping before download");
            return Ok(report);
        }

        std::fs::create_dir_all(&output)?;
        self.backends
            .certifier
            .initialize(&output)
            .map_err(CoreError::Certification)?;
        let spec = layout.provider_spec(&release, arch);
        self.backends.provider.prepare(&spec)?;

        for (package, patterns) in agg.packages() {
            if (self.interrupted)() {
                return Err(CoreError::Interrupted(package.to_owned()));
            }
            progress(package);

            let archive = match self.backends.provider.fetch(&spec, package) {
                Ok(Some(archive)) => archive,
                Ok(None) => {
                    warn!("skipping {package}: not found in the {release} repositories");
                    report.skipped.push(SkippedPackage {
                        package: package.to_owned(),
                        reason: "not found".to_owned(),
                    });
                    continue;
                }
                Err(e) => {
                    warn!("skipping {package} due to download failure: {e}");
                    report.skipped.push(SkippedPackage {
                        package: package.to_owned(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let extracted = self
                .backends
                .extractor
                .extract(&archive, &output, patterns)
                .map_err(|source| CoreError::Extraction {
                    package: package.to_owned(),
                    source,
                })?;
            debug!("{package}: extracted {} entries", extracted.len());

            let target = ExtraTarget {
                package,
                archive: &archive,
                output: &output,
                arch,
                extractor: self.backends.extractor.as_ref(),
            };
            let mut extra_files = Vec::new();
            for extra in agg.extras_for(package) {
                extra_files.extend(apply_extra(extra, &target)?);
            }

            let certified = self
                .backends
                .certifier
                .register(&output, &archive)
                .map_err(CoreError::Certification)?;
            if !certified {
                warn!("{package} was not recorded in the package database");
            }

            report.packages.push(PackageReport {
                package: package.to_owned(),
                archive,
                extracted,
                extra_files,
                certified,
            });
        }

        info!("files extracted to: {}", output.display());
        session.release();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splitter_runtime::{select_backends, BackendOptions};

    fn mock_backends(root: &Path) -> Backends {
        select_backends(
            "mock",
            &BackendOptions {
                slice_repo: String::new(),
                mock_root: Some(root.to_path_buf()),
            },
        )
        .unwrap()
    }

    #[test]
    fn slice_names_need_separator() {
        assert!(matches!(
            validate_slices(&["foo".to_owned()]),
            Err(CoreError::InvalidSliceName(ref s)) if s == "foo"
        ));
        let refs = validate_slices(&["foo_bar_baz".to_owned()]).unwrap();
        assert_eq!(refs[0].package(), "foo_bar");
        assert_eq!(refs[0].slice(), "baz");
    }

    #[test]
    fn architecture_aliases() {
        assert_eq!(validate_arch("amd64").unwrap(), Arch::X86_64);
        assert_eq!(validate_arch("linux/arm64").unwrap(), Arch::Aarch64);
        assert!(matches!(
            validate_arch("riscv64"),
            Err(CoreError::InvalidArchitecture(_))
        ));
    }

    #[test]
    fn validation_checks_slices_before_release() {
        let root = tempfile::tempdir().unwrap();
        let backends = mock_backends(root.path());
        let config = SplitterConfig::default();
        let splitter = Splitter::new(&config, &backends);
        let request = CutRequest {
            release: "99.99".to_owned(),
            arch: "x86_64".to_owned(),
            output: PathBuf::from("/tmp/out"),
            slices: vec!["nounderscore".to_owned()],
            dry_run: false,
        };
        assert!(matches!(
            splitter.validate(&request),
            Err(CoreError::InvalidSliceName(_))
        ));
    }

    #[test]
    fn unknown_release_is_rejected_before_arch() {
        let root = tempfile::tempdir().unwrap();
        let backends = mock_backends(root.path());
        let config = SplitterConfig::default();
        let splitter = Splitter::new(&config, &backends);
        let request = CutRequest {
            release: "99.99".to_owned(),
            arch: "sparc".to_owned(),
            output: PathBuf::from("/tmp/out"),
            slices: vec!["a_b".to_owned()],
            dry_run: false,
        };
        match splitter.validate(&request) {
            Err(CoreError::InvalidRelease(r)) => assert_eq!(r, "openEuler-99.99"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn relative_output_becomes_absolute() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("openEuler-24.03-LTS")).unwrap();
        let backends = mock_backends(root.path());
        let config = SplitterConfig::default();
        let splitter = Splitter::new(&config, &backends);
        let validated = splitter
            .validate(&CutRequest {
                release: "24.03-lts".to_owned(),
                arch: "arm64".to_owned(),
                output: PathBuf::from("rootfs"),
                slices: vec!["a_b".to_owned()],
                dry_run: false,
            })
            .unwrap();
        assert!(validated.output.is_absolute());
        assert!(validated.output.ends_with("rootfs"));
        assert_eq!(validated.arch, Arch::Aarch64);
        assert_eq!(validated.release.as_str(), "openEuler-24.03-LTS");
    }
}
