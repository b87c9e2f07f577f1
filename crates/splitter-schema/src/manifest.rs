use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File extension of slice definition files.
pub const MANIFEST_EXTENSION: &str = "yaml";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read slice definition file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse slice definition file: {0}")]
    ParseYaml(#[from] serde_yaml::Error),
    #[error("slice definition file is empty")]
    Empty,
    #[error("`package` must not be empty")]
    EmptyPackage,
    #[error("invalid slice name '{0}', expected '<package>_<slice>'")]
    InvalidSliceRef(String),
    #[error("{}: {source}", path.display())]
    InFile {
        path: PathBuf,
        #[source]
        source: Box<ManifestError>,
    },
}

impl ManifestError {
    /// Path of the offending file, when the error came from one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ManifestError::InFile { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// One parsed slice definition file.
///
/// The file stem addresses the manifest (`glibc.yaml` answers `glibc_*`
/// references) while `package` names the distribution package the slices
/// are cut from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceManifest {
    pub package: String,
    /// Package-level prerequisites. Parsed but not consulted by resolution.
    pub deps: Vec<String>,
    pub slices: BTreeMap<String, Slice>,
}

impl SliceManifest {
    pub fn slice(&self, name: &str) -> Option<&Slice> {
        self.slices.get(name)
    }
}

/// A named grouping of file patterns and extra artifacts drawn from one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice {
    pub name: String,
    pub common: Vec<String>,
    pub extra: SliceExtra,
    pub deps: Vec<String>,
}

/// Architecture-gated patterns and literal artifacts attached to a slice.
///
/// Maps are ordered so two extras compare and hash structurally.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SliceExtra {
    pub arm64: Vec<String>,
    pub amd64: Vec<String>,
    /// destination -> source
    pub copy: BTreeMap<String, String>,
    /// destination -> literal content
    pub text: BTreeMap<String, String>,
    /// Reserved for CVE-scan manifest generation.
    pub manifest: Vec<String>,
}

impl SliceExtra {
    pub fn is_empty(&self) -> bool {
        self.arm64.is_empty()
            && self.amd64.is_empty()
            && self.copy.is_empty()
            && self.text.is_empty()
            && self.manifest.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    package: String,
    #[serde(default, deserialize_with = "null_as_default")]
    deps: Vec<String>,
    slices: BTreeMap<String, Option<RawSlice>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSlice {
    #[serde(default, deserialize_with = "null_as_default")]
    contents: RawContents,
    #[serde(default, deserialize_with = "null_as_default")]
    deps: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawContents {
    #[serde(default, deserialize_with = "null_as_default")]
    common: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    extra: RawExtra,
}

#[derive(Debug, Default, Deserialize)]
struct RawExtra {
    #[serde(default, deserialize_with = "null_as_default")]
    text: BTreeMap<String, String>,
    #[serde(rename = "linux-x86_64", default, deserialize_with = "null_as_default")]
    amd64: Vec<String>,
    #[serde(rename = "linux-aarch64", default, deserialize_with = "null_as_default")]
    arm64: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    copy: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    manifest: Vec<String>,
}

/// YAML keys present with no value (`common:`) mean "empty", not an error.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl From<RawExtra> for SliceExtra {
    fn from(raw: RawExtra) -> Self {
        Self {
            arm64: raw.arm64,
            amd64: raw.amd64,
            copy: raw.copy,
            text: raw.text,
            manifest: raw.manifest,
        }
    }
}

impl RawManifest {
    fn into_manifest(self) -> Result<SliceManifest, ManifestError> {
        let package = self.package.trim().to_owned();
        if package.is_empty() {
            return Err(ManifestError::EmptyPackage);
        }

        let slices = self
            .slices
            .into_iter()
            .filter(|(name, _)| !name.trim().is_empty())
            .map(|(name, body)| {
                let body = body.unwrap_or_default();
                let slice = Slice {
                    name: name.clone(),
                    common: body.contents.common,
                    extra: body.contents.extra.into(),
                    deps: body.deps,
                };
                (name, slice)
            })
            .collect();

        Ok(SliceManifest {
            package,
            deps: self.deps,
            slices,
        })
    }
}

pub fn parse_manifest_str(input: &str) -> Result<SliceManifest, ManifestError> {
    if input.trim().is_empty() {
        return Err(ManifestError::Empty);
    }
    let raw: RawManifest = serde_yaml::from_str(input)?;
    raw.into_manifest()
}

/// Parse a slice definition file; any failure names the file.
pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<SliceManifest, ManifestError> {
    let path = path.as_ref();
    let in_file = |e: ManifestError| ManifestError::InFile {
        path: path.to_path_buf(),
        source: Box::new(e),
    };
    let content = fs::read_to_string(path).map_err(|e| in_file(e.into()))?;
    parse_manifest_str(&content).map_err(in_file)
}
