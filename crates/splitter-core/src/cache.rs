use crate::CoreError;
use serde::Serialize;
use splitter_schema::{parse_manifest_file, SliceManifest, SliceRef, MANIFEST_EXTENSION};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A slice definition file that failed to parse and was left out of the cache.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Every slice definition file of one release, parsed once and read-only afterwards.
#[derive(Debug)]
pub struct ManifestCache {
    dir: PathBuf,
    manifests: BTreeMap<PathBuf, SliceManifest>,
    failures: Vec<LoadFailure>,
}

impl ManifestCache {
    /// Load every `*.yaml` directly inside `dir`.
    ///
    /// A file that fails to parse is logged and recorded in [`failures`](Self::failures);
    /// it does not stop the remaining files from loading.
    pub fn load(dir: &Path) -> Result<Self, CoreError> {
        let dir = std::fs::canonicalize(dir)?;
        debug!("loading slice definition files from {}", dir.display());

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            // Follows symlinks.
            if path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(MANIFEST_EXTENSION)
            {
                paths.push(path);
            }
        }
        paths.sort();

        let mut manifests = BTreeMap::new();
        let mut failures = Vec::new();
        for path in paths {
            match parse_manifest_file(&path) {
                Ok(manifest) => {
                    debug!("loaded {} ({})", path.display(), manifest.package);
                    manifests.insert(path, manifest);
                }
                Err(e) => {
                    warn!("skipping slice definition file: {e}");
                    failures.push(LoadFailure {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "loaded {} slice definition files from {} ({} failed)",
            manifests.len(),
            dir.display(),
            failures.len()
        );
        Ok(Self {
            dir,
            manifests,
            failures,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file that defines the slices of `package`.
    pub fn manifest_path(&self, package: &str) -> PathBuf {
        self.dir.join(format!("{package}.{MANIFEST_EXTENSION}"))
    }

    pub fn get(&self, package: &str) -> Option<&SliceManifest> {
        self.manifests.get(&self.manifest_path(package))
    }

    /// The manifest owning `slice`, or `UnresolvedManifest`.
    pub fn lookup(&self, slice: &SliceRef) -> Result<&SliceManifest, CoreError> {
        self.get(slice.package())
            .ok_or_else(|| CoreError::UnresolvedManifest {
                slice: slice.to_string(),
                path: self.manifest_path(slice.package()),
            })
    }

    pub fn failures(&self) -> &[LoadFailure] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &SliceManifest)> {
        self.manifests.iter().map(|(p, m)| (p.as_path(), m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn loads_yaml_files_and_indexes_by_path() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bash.yaml", "package: bash\nslices:\n  bins:\n");
        write(dir.path(), "glibc.yaml", "package: glibc\nslices:\n  libs:\n");
        write(dir.path(), "README.md", "not a manifest");

        let cache = ManifestCache::load(dir.path()).unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.failures().is_empty());
        assert_eq!(cache.get("bash").unwrap().package, "bash");
        assert!(cache.get("README").is_none());

        let key = std::fs::canonicalize(dir.path()).unwrap().join("glibc.yaml");
        assert!(cache.iter().any(|(p, _)| p == key));
    }

    #[test]
    fn broken_file_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..49 {
            write(
                dir.path(),
                &format!("pkg{i}.yaml"),
                &format!("package: pkg{i}\nslices:\n  bins:\n"),
            );
        }
        write(dir.path(), "broken.yaml", "package: broken\nslices: [oops\n");

        let cache = ManifestCache::load(dir.path()).unwrap();
        assert_eq!(cache.len(), 49);
        assert_eq!(cache.failures().len(), 1);
        assert!(cache.failures()[0].path.ends_with("broken.yaml"));
        assert!(cache.failures()[0].error.contains("broken.yaml"));
    }

    #[test]
    fn does_not_recurse() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        write(
            &dir.path().join("nested"),
            "bash.yaml",
            "package: bash\nslices:\n  bins:\n",
        );
        let cache = ManifestCache::load(dir.path()).unwrap();
        assert!(cache.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_manifest_is_loaded() {
        let store = tempfile::tempdir().unwrap();
        write(store.path(), "bash.yaml", "package: bash\nslices:\n  bins:\n");
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(store.path().join("bash.yaml"), dir.path().join("bash.yaml"))
            .unwrap();

        let cache = ManifestCache::load(dir.path()).unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.failures().is_empty());
        assert_eq!(cache.get("bash").unwrap().package, "bash");
    }

    #[test]
    fn lookup_of_unknown_package_is_unresolved() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ManifestCache::load(dir.path()).unwrap();
        let err = cache
            .lookup(&SliceRef::parse("nope_bins").unwrap())
            .unwrap_err();
        match err {
            CoreError::UnresolvedManifest { slice, path } => {
                assert_eq!(slice, "nope_bins");
                assert!(path.ends_with("nope.yaml"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ManifestCache::load(&dir.path().join("absent")).is_err());
    }
}
