//! External collaborators for splitter.
//!
//! This crate implements everything splitter delegates to the host system:
//! the `ReleaseSource` that validates and checks out slice-release branches
//! (git), the `PackageProvider` that downloads RPMs (dnf), the
//! `ContentExtractor` that pulls matching paths out of an RPM payload
//! (rpm2cpio + cpio), and the `CertPacker` that records installed packages
//! in an RPM database for SBOM and vulnerability tooling. Mock backends and
//! host prerequisite checks live here as well.

pub mod backend;
pub mod cert;
pub mod dnf;
pub mod extract;
pub mod git;
pub mod mock;
pub mod prereq;

pub use backend::{
    select_backends, BackendOptions, Backends, CertPacker, ContentExtractor, PackageProvider,
    ProviderSpec, ReleaseSource,
};
pub use prereq::{check_prereqs, format_missing, MissingPrereq};

use std::io;
use std::path::PathBuf;
use std::process::{Command, Output};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend '{0}' is not available")]
    BackendUnavailable(String),
    #[error("command not found: {0}")]
    CommandNotFound(String),
    #[error("command failed: {0}")]
    ExecFailed(String),
    #[error("failed to check out release '{release}': {reason}")]
    Checkout { release: String, reason: String },
    #[error("failed to download package '{package}': {reason}")]
    Download { package: String, reason: String },
    #[error("failed to extract files from '{}': {reason}", archive.display())]
    Extract { archive: PathBuf, reason: String },
    #[error("invalid file pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("failed to initialize RPM database at '{}'", .0.display())]
    DatabaseInit(PathBuf),
    #[error("{0} must be run as root")]
    PrivilegeRequired(String),
}

/// Run a command to completion, turning a non-zero exit into `ExecFailed`.
pub(crate) fn run_command(cmd: &mut Command) -> Result<Output, RuntimeError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let output = cmd.output().map_err(|e| spawn_error(&program, e))?;
    if !output.status.success() {
        return Err(RuntimeError::ExecFailed(format!(
            "{program}: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(output)
}

pub(crate) fn spawn_error(program: &str, err: io::Error) -> RuntimeError {
    if err.kind() == io::ErrorKind::NotFound {
        RuntimeError::CommandNotFound(program.to_owned())
    } else {
        RuntimeError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_reported_by_name() {
        let err = run_command(&mut Command::new("splitter-no-such-program")).unwrap_err();
        assert!(matches!(err, RuntimeError::CommandNotFound(ref p) if p == "splitter-no-such-program"));
    }

    #[test]
    fn failing_command_is_exec_failed() {
        let err = run_command(Command::new("sh").args(["-c", "echo boom >&2; exit 3"])).unwrap_err();
        match err {
            RuntimeError::ExecFailed(msg) => assert!(msg.contains("boom")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn successful_command_returns_output() {
        let out = run_command(Command::new("sh").args(["-c", "printf ok"])).unwrap();
        assert_eq!(out.stdout, b"ok");
    }
}
