use crate::backend::ReleaseSource;
use crate::{run_command, spawn_error, RuntimeError};
use splitter_schema::ReleaseId;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

/// Slice releases published as branches of a git repository.
pub struct GitReleaseSource {
    url: String,
}

impl GitReleaseSource {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_owned(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ReleaseSource for GitReleaseSource {
    fn name(&self) -> &'static str {
        "git"
    }

    fn validate(&self, release: &ReleaseId) -> Result<bool, RuntimeError> {
        debug!("checking {} for branch {release}", self.url);
        let output = Command::new("git")
            .args(["ls-remote", "--heads", &self.url, release.as_str()])
            .output()
            .map_err(|e| spawn_error("git", e))?;
        if !output.status.success() {
            debug!(
                "git ls-remote failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Ok(false);
        }
        Ok(!String::from_utf8_lossy(&output.stdout).trim().is_empty())
    }

    fn checkout(&self, release: &ReleaseId, dest: &Path) -> Result<(), RuntimeError> {
        info!("cloning {} ({release}) into {}", self.url, dest.display());
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        run_command(Command::new("git").args([
            "clone",
            "--quiet",
            "--depth",
            "1",
            "--branch",
            release.as_str(),
            &self.url,
            &dest.to_string_lossy(),
        ]))
        .map(|_| ())
        .map_err(|e| RuntimeError::Checkout {
            release: release.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_strips_trailing_slash() {
        let source = GitReleaseSource::new("https://gitee.com/openeuler/slice-releases.git/");
        assert_eq!(source.url(), "https://gitee.com/openeuler/slice-releases.git");
    }

    #[test]
    fn unreachable_repository_is_not_a_valid_release() {
        let dir = tempfile::tempdir().unwrap();
        let source = GitReleaseSource::new(&dir.path().join("missing").to_string_lossy());
        // Without git installed the command is missing; either way no release is confirmed.
        match source.validate(&ReleaseId::new("openEuler-24.03-LTS")) {
            Ok(valid) => assert!(!valid),
            Err(e) => assert!(matches!(e, RuntimeError::CommandNotFound(_))),
        }
    }
}
