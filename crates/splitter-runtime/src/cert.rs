use crate::backend::CertPacker;
use crate::{run_command, RuntimeError};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{error, info, warn};

/// RPM database location relative to the output root.
pub const RPMDB_PATH: &str = "var/lib/rpm";

/// Records extracted packages in an RPM database inside the output tree so
/// SBOM generators and vulnerability scanners can see what was installed.
pub struct RpmCertPacker;

impl Default for RpmCertPacker {
    fn default() -> Self {
        Self
    }
}

impl RpmCertPacker {
    pub fn new() -> Self {
        Self
    }
}

pub fn db_path(output: &Path) -> PathBuf {
    output.join(RPMDB_PATH)
}

/// Safe wrapper around libc::geteuid().
#[allow(unsafe_code)]
fn effective_uid() -> u32 {
    // SAFETY: geteuid() is always safe: no arguments, no side effects, cannot fail.
    unsafe { libc::geteuid() }
}

pub fn running_as_root() -> bool {
    effective_uid() == 0
}

fn query_archive_name(archive: &Path) -> Result<String, RuntimeError> {
    let output = run_command(
        Command::new("rpm")
            .args(["-qp", "--nosignature", "--qf", "%{NAME}"])
            .arg(archive),
    )?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
}

impl CertPacker for RpmCertPacker {
    fn name(&self) -> &'static str {
        "rpmdb"
    }

    fn initialize(&self, output: &Path) -> Result<(), RuntimeError> {
        if !running_as_root() {
            return Err(RuntimeError::PrivilegeRequired(
                "registering packages in the RPM database".to_owned(),
            ));
        }
        let db = db_path(output);
        info!("initializing RPM database at {}", db.display());
        std::fs::create_dir_all(&db)?;
        run_command(Command::new("rpmdb").arg("--initdb").arg("--dbpath").arg(&db)).map_err(
            |e| {
                error!("rpmdb --initdb failed: {e}");
                RuntimeError::DatabaseInit(db.clone())
            },
        )?;
        Ok(())
    }

    fn register(&self, output: &Path, archive: &Path) -> Result<bool, RuntimeError> {
        if !archive.is_file() {
            error!("RPM file not found: {}", archive.display());
            return Ok(false);
        }
        let db = db_path(output);
        info!("adding {} to RPM database", archive.display());
        let added = run_command(
            Command::new("rpm")
                .args(["-i", "--ignorearch", "--force", "--nodeps", "--justdb", "--dbpath"])
                .arg(&db)
                .arg(archive),
        );
        if let Err(e) = added {
            warn!("failed to register {}: {e}", archive.display());
            return Ok(false);
        }

        Ok(verify_registered(&db, archive))
    }
}

/// Query `db` for the package `archive` contains. Any failure is a warning.
fn verify_registered(db: &Path, archive: &Path) -> bool {
    let name = match query_archive_name(archive) {
        Ok(name) => name,
        Err(e) => {
            warn!("cannot read package name from {}: {e}", archive.display());
            return false;
        }
    };
    let verified = Command::new("rpm")
        .arg("--dbpath")
        .arg(db)
        .args(["-q", &name])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !verified {
        warn!("{name} not found in RPM database after registration");
    }
    verified
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_path_is_under_output() {
        assert_eq!(
            db_path(Path::new("/tmp/rootfs")),
            PathBuf::from("/tmp/rootfs/var/lib/rpm")
        );
    }

    #[test]
    fn register_missing_archive_is_false() {
        let dir = tempfile::tempdir().unwrap();
        let ok = RpmCertPacker::new()
            .register(dir.path(), &dir.path().join("absent.rpm"))
            .unwrap();
        assert!(!ok);
    }

    #[test]
    fn unreadable_package_name_is_not_verified() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("garbage.rpm");
        std::fs::write(&archive, "not an rpm").unwrap();
        assert!(!verify_registered(&db_path(dir.path()), &archive));
    }

    #[test]
    fn initialize_requires_root() {
        if running_as_root() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let err = RpmCertPacker::new().initialize(dir.path()).unwrap_err();
        assert!(matches!(err, RuntimeError::PrivilegeRequired(_)));
    }
}
