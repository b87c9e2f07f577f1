use crate::backend::{PackageProvider, ProviderSpec};
use crate::{spawn_error, RuntimeError};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// File name of the rendered repository configuration.
pub const REPO_FILE: &str = "openEuler.repo";

/// Downloads RPMs with `dnf download` against an isolated repository set.
pub struct DnfProvider;

impl Default for DnfProvider {
    fn default() -> Self {
        Self
    }
}

impl DnfProvider {
    pub fn new() -> Self {
        Self
    }
}

/// Substitute `{{ release }}` and `{{ basearch }}` in a repository template.
pub fn render_repo_template(template: &str, release: &str, basearch: &str) -> String {
    let mut out = template.to_owned();
    for (key, value) in [("release", release), ("basearch", basearch)] {
        out = out
            .replace(&format!("{{{{ {key} }}}}"), value)
            .replace(&format!("{{{{{key}}}}}"), value);
    }
    out
}

fn download_dir(spec: &ProviderSpec) -> PathBuf {
    spec.cache_dir.join("packages")
}

/// Newest `<package>-<version>...rpm` in `dir`.
///
/// `python3-3.11.6-1.oe2403.x86_64.rpm` belongs to `python3`;
/// `python3-libs-3.11.6-1.oe2403.x86_64.rpm` does not.
pub fn find_downloaded(dir: &Path, package: &str) -> Result<Option<PathBuf>, RuntimeError> {
    if !dir.exists() {
        return Ok(None);
    }
    let prefix = format!("{package}-");
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let Some(rest) = name.strip_prefix(&prefix) else {
            continue;
        };
        if !name.ends_with(".rpm") || !rest.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        match &newest {
            Some((t, _)) if modified < *t => {}
            _ => newest = Some((modified, entry.path())),
        }
    }
    Ok(newest.map(|(_, path)| path))
}

impl PackageProvider for DnfProvider {
    fn name(&self) -> &'static str {
        "dnf"
    }

    fn prepare(&self, spec: &ProviderSpec) -> Result<(), RuntimeError> {
        let template = std::fs::read_to_string(&spec.template).map_err(|e| {
            RuntimeError::ExecFailed(format!(
                "failed to read repository template {}: {e}",
                spec.template.display()
            ))
        })?;
        let rendered = render_repo_template(&template, spec.release.as_str(), spec.arch.as_str());
        std::fs::create_dir_all(&spec.repo_dir)?;
        std::fs::create_dir_all(download_dir(spec))?;
        let repo_file = spec.repo_dir.join(REPO_FILE);
        std::fs::write(&repo_file, rendered)?;
        debug!("wrote repository configuration {}", repo_file.display());
        Ok(())
    }

    fn fetch(&self, spec: &ProviderSpec, package: &str) -> Result<Option<PathBuf>, RuntimeError> {
        let dest = download_dir(spec);
        info!("downloading {package} ({})", spec.arch);
        let output = Command::new("dnf")
            .args([
                "download",
                "--quiet",
                "--assumeyes",
                "--forcearch",
                spec.arch.as_str(),
                "--arch",
                spec.arch.as_str(),
                "--arch",
                "noarch",
            ])
            .arg(format!("--setopt=reposdir={}", spec.repo_dir.display()))
            .arg(format!("--setopt=cachedir={}", spec.cache_dir.display()))
            .arg(format!("--destdir={}", dest.display()))
            .arg(package)
            .output()
            .map_err(|e| spawn_error("dnf", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("No package") || stderr.contains("No match") {
                warn!("package not found: {package}");
                return Ok(None);
            }
            return Err(RuntimeError::Download {
                package: package.to_owned(),
                reason: stderr.trim().to_owned(),
            });
        }

        let found = find_downloaded(&dest, package)?;
        if found.is_none() {
            warn!("dnf reported success but no archive for {package} in {}", dest.display());
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splitter_schema::{Arch, ReleaseId};

    #[test]
    fn renders_both_placeholder_spellings() {
        let template = "[everything]\nbaseurl=https://repo.openeuler.org/{{ release }}/everything/{{basearch}}/\n";
        let out = render_repo_template(template, "openEuler-24.03-LTS", "aarch64");
        assert_eq!(
            out,
            "[everything]\nbaseurl=https://repo.openeuler.org/openEuler-24.03-LTS/everything/aarch64/\n"
        );
    }

    #[test]
    fn find_downloaded_skips_similarly_named_packages() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("python3-libs-3.11.6-1.oe2403.x86_64.rpm"), b"").unwrap();
        std::fs::write(dir.path().join("python3-3.11.6-1.oe2403.x86_64.rpm"), b"").unwrap();
        std::fs::write(dir.path().join("python3-notes.txt"), b"").unwrap();

        let found = find_downloaded(dir.path(), "python3").unwrap().unwrap();
        assert_eq!(
            found.file_name().unwrap().to_string_lossy(),
            "python3-3.11.6-1.oe2403.x86_64.rpm"
        );
        assert!(find_downloaded(dir.path(), "bash").unwrap().is_none());
    }

    #[test]
    fn find_downloaded_missing_dir_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_downloaded(&dir.path().join("nope"), "bash")
            .unwrap()
            .is_none());
    }

    #[test]
    fn prepare_writes_rendered_repo_file() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("openEuler.template");
        std::fs::write(&template, "baseurl=http://x/{{ release }}/{{ basearch }}\n").unwrap();
        let spec = ProviderSpec {
            release: ReleaseId::new("openEuler-22.03-LTS"),
            arch: Arch::X86_64,
            template,
            repo_dir: dir.path().join("repo"),
            cache_dir: dir.path().join("cache"),
        };
        DnfProvider::new().prepare(&spec).unwrap();
        let written = std::fs::read_to_string(dir.path().join("repo").join(REPO_FILE)).unwrap();
        assert_eq!(written, "baseurl=http://x/openEuler-22.03-LTS/x86_64\n");
        assert!(dir.path().join("cache/packages").is_dir());
    }

    #[test]
    fn prepare_without_template_fails() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ProviderSpec {
            release: ReleaseId::new("r"),
            arch: Arch::X86_64,
            template: dir.path().join("absent.template"),
            repo_dir: dir.path().join("repo"),
            cache_dir: dir.path().join("cache"),
        };
        assert!(DnfProvider::new().prepare(&spec).is_err());
    }
}
