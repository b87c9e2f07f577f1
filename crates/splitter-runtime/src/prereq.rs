use std::fmt;
use std::process::Command;

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: &'static str,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

const REQUIRED_TOOLS: &[(&str, &str, &str)] = &[
    ("git", "checking out slice releases", "dnf install git"),
    (
        "dnf",
        "downloading packages",
        "dnf install dnf dnf-plugins-core",
    ),
    ("rpm2cpio", "reading RPM payloads", "dnf install rpm"),
    ("cpio", "extracting RPM payloads", "dnf install cpio"),
    ("rpm", "registering packages for SBOM", "dnf install rpm"),
    ("rpmdb", "initializing the RPM database", "dnf install rpm"),
];

fn command_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check every host tool the rpm backend shells out to.
/// Returns a list of missing items. Empty list means all prerequisites are met.
pub fn check_prereqs() -> Vec<MissingPrereq> {
    REQUIRED_TOOLS
        .iter()
        .filter(|(name, _, _)| !command_exists(name))
        .map(|&(name, purpose, install_hint)| MissingPrereq {
            name,
            purpose,
            install_hint,
        })
        .collect()
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nsplitter requires these tools to cut slices from RPM packages.");
    msg
}
