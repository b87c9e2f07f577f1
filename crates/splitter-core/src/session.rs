use crate::CoreError;
use fs2::FileExt;
use splitter_runtime::ProviderSpec;
use splitter_schema::{Arch, ReleaseId};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Working paths of one splitter home.
///
/// Everything a cut creates outside its output directory lives below
/// `root`: the slice release checkout, the package download cache, and the
/// rendered repository configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLayout {
    root: PathBuf,
}

impl SessionLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Checkout of the slice release repository.
    #[inline]
    pub fn checkout_dir(&self) -> PathBuf {
        self.root.join("slice-releases")
    }

    /// Slice definition files inside the checkout.
    #[inline]
    pub fn slices_dir(&self) -> PathBuf {
        self.checkout_dir().join("slices")
    }

    /// Repository configuration template shipped with the release.
    #[inline]
    pub fn repo_template(&self) -> PathBuf {
        self.checkout_dir().join("repo").join("openEuler.template")
    }

    #[inline]
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    #[inline]
    pub fn repo_root(&self) -> PathBuf {
        self.root.join("repo")
    }

    #[inline]
    pub fn repo_dir(&self, release: &ReleaseId) -> PathBuf {
        self.repo_root().join(release.as_str())
    }

    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.root.join(".lock")
    }

    /// Directories owned by a session and removed when it ends.
    pub fn scratch_dirs(&self) -> [PathBuf; 3] {
        [self.cache_dir(), self.repo_root(), self.checkout_dir()]
    }

    pub fn provider_spec(&self, release: &ReleaseId, arch: Arch) -> ProviderSpec {
        ProviderSpec {
            release: release.clone(),
            arch,
            template: self.repo_template(),
            repo_dir: self.repo_dir(release),
            cache_dir: self.cache_dir(),
        }
    }
}

/// Exclusive advisory lock on a splitter home.
pub struct SessionLock {
    lock_file: File,
}

impl SessionLock {
    fn open(lock_path: &Path) -> Result<File, CoreError> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)?)
    }

    /// Block until the lock is available.
    pub fn acquire(lock_path: &Path) -> Result<Self, CoreError> {
        let file = Self::open(lock_path)?;
        file.lock_exclusive()
            .map_err(|e| CoreError::SessionBusy(format!("{}: {e}", lock_path.display())))?;
        Ok(Self { lock_file: file })
    }

    /// `None` when another process holds the lock.
    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, CoreError> {
        let file = Self::open(lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { lock_file: file })),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}

fn remove_dir_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// A locked splitter home with fresh scratch directories.
///
/// Dropping the session removes the checkout, the download cache, and the
/// rendered repository configuration, whichever way the cut ended.
pub struct Session {
    layout: SessionLayout,
    _lock: SessionLock,
}

impl Session {
    pub fn acquire(layout: SessionLayout) -> Result<Self, CoreError> {
        let lock = SessionLock::try_acquire(&layout.lock_file())?.ok_or_else(|| {
            CoreError::SessionBusy(format!(
                "{} is in use by another splitter process",
                layout.root().display()
            ))
        })?;

        for dir in layout.scratch_dirs() {
            if dir.exists() {
                debug!("removing stale {}", dir.display());
            }
            remove_dir_if_exists(&dir)?;
        }
        fs::create_dir_all(layout.cache_dir())?;
        fs::create_dir_all(layout.repo_root())?;

        Ok(Self {
            layout,
            _lock: lock,
        })
    }

    pub fn layout(&self) -> &SessionLayout {
        &self.layout
    }

    /// End the session now rather than at drop.
    pub fn release(self) {}
}

impl Drop for Session {
    fn drop(&mut self) {
        for dir in self.layout.scratch_dirs() {
            if let Err(e) = remove_dir_if_exists(&dir) {
                warn!("failed to clean up {}: {e}", dir.display());
            }
        }
        debug!("session at {} released", self.layout.root().display());
    }
}
