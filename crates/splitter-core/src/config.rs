use crate::session::SessionLayout;
use crate::CoreError;
use serde::{Deserialize, Serialize};
use splitter_runtime::BackendOptions;
use splitter_schema::ReleaseId;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILE: &str = "splitter.toml";
pub const DEFAULT_SLICE_REPO: &str = "https://gitee.com/openeuler/slice-releases.git";
pub const DEFAULT_RELEASE_PREFIX: &str = "openEuler-";
pub const DEFAULT_BACKEND: &str = "rpm";

/// Searched in order when neither the config nor `SPLITTER_HOME` names a home.
pub const HOME_CANDIDATES: &[&str] = &[
    "/usr/local/etc/splitter",
    "/usr/etc/splitter",
    "/etc/splitter",
];
const FALLBACK_HOME: &str = "/etc/splitter";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SplitterConfig {
    /// Working root for checkouts, caches and the session lock.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home: Option<PathBuf>,
    /// Git URL of the slice release repository.
    pub slice_repo: String,
    /// Prepended to the release given on the command line.
    pub release_prefix: String,
    /// `rpm` or `mock`.
    pub backend: String,
    /// Per-release manifest trees served by the mock backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mock_root: Option<PathBuf>,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            home: None,
            slice_repo: DEFAULT_SLICE_REPO.to_owned(),
            release_prefix: DEFAULT_RELEASE_PREFIX.to_owned(),
            backend: DEFAULT_BACKEND.to_owned(),
            mock_root: None,
        }
    }
}

/// `env_home` if set, else the first existing candidate, else `/etc/splitter`.
pub fn discover_home(env_home: Option<&str>, candidates: &[&str]) -> PathBuf {
    if let Some(home) = env_home.filter(|h| !h.trim().is_empty()) {
        return PathBuf::from(home);
    }
    candidates
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_dir())
        .unwrap_or_else(|| PathBuf::from(FALLBACK_HOME))
}

impl SplitterConfig {
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))?;
        debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `explicit`, or `<home>/splitter.toml` when it exists, or the
    /// defaults; then apply `SPLITTER_HOME` / `SPLITTER_BACKEND`.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, CoreError> {
        let env = |key: &str| std::env::var(key).ok();
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => {
                let home = discover_home(env("SPLITTER_HOME").as_deref(), HOME_CANDIDATES);
                let path = home.join(CONFIG_FILE);
                if path.is_file() {
                    Self::load(&path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(env);
        Ok(config)
    }

    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(home) = var("SPLITTER_HOME").filter(|h| !h.trim().is_empty()) {
            self.home = Some(PathBuf::from(home));
        }
        if let Some(backend) = var("SPLITTER_BACKEND").filter(|b| !b.trim().is_empty()) {
            self.backend = backend.trim().to_owned();
        }
    }

    pub fn home_dir(&self) -> PathBuf {
        self.home
            .clone()
            .unwrap_or_else(|| discover_home(None, HOME_CANDIDATES))
    }

    pub fn layout(&self) -> SessionLayout {
        SessionLayout::new(self.home_dir())
    }

    /// Full release branch name for a user-supplied release.
    ///
    /// `24.03-lts-sp1` becomes `openEuler-24.03-LTS-SP1`; an identifier that
    /// already starts with the prefix keeps a single copy of it.
    pub fn release_id(&self, input: &str) -> Result<ReleaseId, CoreError> {
        let input = input.trim();
        let rest = input.strip_prefix(&self.release_prefix).unwrap_or(input);
        if rest.is_empty() || rest.contains(char::is_whitespace) {
            return Err(CoreError::InvalidRelease(input.to_owned()));
        }
        Ok(ReleaseId::new(format!(
            "{}{}",
            self.release_prefix,
            rest.to_uppercase()
        )))
    }

    pub fn backend_options(&self) -> BackendOptions {
        BackendOptions {
            slice_repo: self.slice_repo.clone(),
            mock_root: self.mock_root.clone(),
        }
    }

    pub fn to_toml(&self) -> Result<String, CoreError> {
        toml::to_string_pretty(self).map_err(|e| CoreError::Config(e.to_string()))
    }
}
