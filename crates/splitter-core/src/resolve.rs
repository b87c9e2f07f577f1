use crate::cache::ManifestCache;
use crate::CoreError;
use splitter_schema::SliceRef;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Computes transitive slice dependencies over a [`ManifestCache`].
pub struct Resolver<'a> {
    cache: &'a ManifestCache,
}

impl<'a> Resolver<'a> {
    pub fn new(cache: &'a ManifestCache) -> Self {
        Self { cache }
    }

    /// Every slice `slice` transitively depends on.
    ///
    /// `visited` is shared by the whole recursion: a slice already in it
    /// contributes nothing, which keeps cycles and diamonds finite. `slice`
    /// itself is only part of the result when a cycle leads back to it.
    /// Dependency entries that are not `<package>_<slice>` references are
    /// ignored.
    pub fn resolve(
        &self,
        slice: &SliceRef,
        visited: &mut BTreeSet<SliceRef>,
    ) -> Result<BTreeSet<SliceRef>, CoreError> {
        if !visited.insert(slice.clone()) {
            return Ok(BTreeSet::new());
        }

        let manifest = self.cache.lookup(slice)?;
        let direct: BTreeSet<SliceRef> = match manifest.slice(slice.slice()) {
            Some(def) => def
                .deps
                .iter()
                // Entries that are not slice references are annotations.
                .filter_map(|dep| SliceRef::parse(dep).ok())
                .collect(),
            None => {
                warn!(
                    "slice '{}' is not defined in {}",
                    slice.slice(),
                    self.cache.manifest_path(slice.package()).display()
                );
                BTreeSet::new()
            }
        };
        debug!("{slice} -> {} direct deps", direct.len());

        let mut resolved = direct.clone();
        for dep in &direct {
            resolved.extend(self.resolve(dep, visited)?);
        }
        Ok(resolved)
    }

    /// Union of every requested slice and its dependencies. Each request
    /// starts from an empty `visited` set.
    pub fn resolve_all(&self, requested: &[SliceRef]) -> Result<BTreeSet<SliceRef>, CoreError> {
        let mut all = BTreeSet::new();
        for slice in requested {
            let deps = self.resolve(slice, &mut BTreeSet::new())?;
            all.extend(deps);
            all.insert(slice.clone());
        }
        Ok(all)
    }
}
