use crate::cache::ManifestCache;
use crate::CoreError;
use serde::Serialize;
use splitter_schema::{SliceExtra, SliceRef};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Per-package file patterns and extra artifacts of a resolved slice set.
///
/// Keys are distribution package names (the manifest's `package` field),
/// not manifest file stems. Both value lists are deduplicated and sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregation {
    pub contents: BTreeMap<String, Vec<String>>,
    pub extras: BTreeMap<String, Vec<SliceExtra>>,
}

impl Aggregation {
    pub fn patterns(&self, package: &str) -> &[String] {
        self.contents.get(package).map_or(&[], Vec::as_slice)
    }

    pub fn extras_for(&self, package: &str) -> &[SliceExtra] {
        self.extras.get(package).map_or(&[], Vec::as_slice)
    }

    /// Packages that only carry extras. They have no pattern list and are
    /// never fetched.
    pub fn extras_only(&self) -> Vec<&str> {
        self.extras
            .keys()
            .filter(|p| !self.contents.contains_key(*p))
            .map(String::as_str)
            .collect()
    }

    pub fn packages(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.contents.iter().map(|(p, c)| (p.as_str(), c.as_slice()))
    }

    pub fn plan(&self) -> Vec<PackagePlan> {
        self.packages()
            .map(|(package, patterns)| PackagePlan {
                package: package.to_owned(),
                patterns: patterns.to_vec(),
                extras: self.extras_for(package).len(),
            })
            .collect()
    }
}

/// Summary of one package's share of an [`Aggregation`], for reports.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PackagePlan {
    pub package: String,
    pub patterns: Vec<String>,
    pub extras: usize,
}

/// Group the `common` patterns and non-empty extras of `slices` by package.
pub fn aggregate(
    cache: &ManifestCache,
    slices: &BTreeSet<SliceRef>,
) -> Result<Aggregation, CoreError> {
    let mut contents: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut extras: BTreeMap<String, BTreeSet<SliceExtra>> = BTreeMap::new();

    for slice in slices {
        let manifest = cache.lookup(slice)?;
        let Some(def) = manifest.slice(slice.slice()) else {
            warn!(
                "slice '{}' is not defined in {}, nothing to extract for it",
                slice.slice(),
                cache.manifest_path(slice.package()).display()
            );
            continue;
        };
        if !def.common.is_empty() {
            contents
                .entry(manifest.package.clone())
                .or_default()
                .extend(def.common.iter().cloned());
        }
        if !def.extra.is_empty() {
            extras
                .entry(manifest.package.clone())
                .or_default()
                .insert(def.extra.clone());
        }
    }

    let agg = Aggregation {
        contents: contents
            .into_iter()
            .map(|(p, set)| (p, set.into_iter().collect()))
            .collect(),
        extras: extras
            .into_iter()
            .map(|(p, set)| (p, set.into_iter().collect()))
            .collect(),
    };
    debug!(
        "aggregated {} packages with patterns, {} with extras",
        agg.contents.len(),
        agg.extras.len()
    );
    Ok(agg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn r(s: &str) -> SliceRef {
        SliceRef::parse(s).unwrap()
    }

    fn load(dir: &Path, files: &[(&str, &str)]) -> ManifestCache {
        for (name, body) in files {
            std::fs::write(dir.join(name), body).unwrap();
        }
        ManifestCache::load(dir).unwrap()
    }

    #[test]
    fn shared_pattern_appears_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = load(
            dir.path(),
            &[(
                "libfoo.yaml",
                "package: libfoo\nslices:\n  a:\n    contents:\n      common: ['*.so', /usr/lib/a]\n  b:\n    contents:\n      common: ['*.so']\n",
            )],
        );
        let agg = aggregate(&cache, &[r("libfoo_a"), r("libfoo_b")].into()).unwrap();
        assert_eq!(agg.patterns("libfoo"), ["*.so", "/usr/lib/a"]);
    }

    #[test]
    fn groups_by_package_field() {
        let dir = tempfile::tempdir().unwrap();
        let cache = load(
            dir.path(),
            &[(
                "python3.yaml",
                "package: python3-libs\nslices:\n  core:\n    contents:\n      common: [/usr/lib64/libpython3.so]\n",
            )],
        );
        let agg = aggregate(&cache, &[r("python3_core")].into()).unwrap();
        assert_eq!(agg.patterns("python3-libs"), ["/usr/lib64/libpython3.so"]);
        assert!(agg.patterns("python3").is_empty());
    }

    #[test]
    fn identical_extras_are_merged_and_empty_ones_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let extra = "    contents:\n      common: [/etc/a]\n      extra:\n        text:\n          /etc/motd: hello\n";
        let cache = load(
            dir.path(),
            &[(
                "base.yaml",
                &format!("package: base\nslices:\n  one:\n{extra}  two:\n{extra}  three:\n    contents:\n      common: [/etc/b]\n"),
            )],
        );
        let agg = aggregate(&cache, &[r("base_one"), r("base_two"), r("base_three")].into()).unwrap();
        assert_eq!(agg.extras_for("base").len(), 1);
        assert_eq!(agg.extras_for("base")[0].text["/etc/motd"], "hello");
    }

    #[test]
    fn extras_without_common_are_reported_separately() {
        let dir = tempfile::tempdir().unwrap();
        let cache = load(
            dir.path(),
            &[(
                "conf.yaml",
                "package: conf\nslices:\n  motd:\n    contents:\n      extra:\n        text:\n          /etc/motd: hi\n",
            )],
        );
        let agg = aggregate(&cache, &[r("conf_motd")].into()).unwrap();
        assert!(agg.contents.is_empty());
        assert_eq!(agg.extras_only(), vec!["conf"]);
    }

    #[test]
    fn unknown_package_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cache = load(dir.path(), &[]);
        let err = aggregate(&cache, &[r("ghost_bins")].into()).unwrap_err();
        assert!(matches!(err, CoreError::UnresolvedManifest { .. }));
    }

    #[test]
    fn undefined_slice_contributes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = load(
            dir.path(),
            &[("a.yaml", "package: a\nslices:\n  bins:\n    contents:\n      common: [/usr/bin/a]\n")],
        );
        let agg = aggregate(&cache, &[r("a_nope")].into()).unwrap();
        assert_eq!(agg, Aggregation::default());
    }

    #[test]
    fn plan_summarizes_packages() {
        let dir = tempfile::tempdir().unwrap();
        let cache = load(
            dir.path(),
            &[("a.yaml", "package: a\nslices:\n  bins:\n    contents:\n      common: [/usr/bin/a]\n      extra:\n        linux-x86_64: [/usr/lib64/x]\n")],
        );
        let agg = aggregate(&cache, &[r("a_bins")].into()).unwrap();
        assert_eq!(
            agg.plan(),
            vec![PackagePlan {
                package: "a".to_owned(),
                patterns: vec!["/usr/bin/a".to_owned()],
                extras: 1,
            }]
        );
    }
}
