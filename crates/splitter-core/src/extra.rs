//! Extra-artifact handlers.
//!
//! Each handler takes one [`SliceExtra`] and materializes its share of it
//! inside the output tree, returning the paths it produced. [`apply_extra`]
//! runs them in fixed order: aarch64 patterns, x86_64 patterns, copies,
//! text files, manifest placeholder.

use crate::CoreError;
use splitter_runtime::ContentExtractor;
use splitter_schema::{Arch, SliceExtra};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What the handlers of one package operate on.
pub struct ExtraTarget<'a> {
    pub package: &'a str,
    pub archive: &'a Path,
    pub output: &'a Path,
    pub arch: Arch,
    pub extractor: &'a dyn ContentExtractor,
}

/// Resolve `rel` beneath `output`.
///
/// Leading slashes are ignored so `/etc/motd` lands at `<output>/etc/motd`.
/// `.` components are dropped and `..` pops one level; popping past
/// `output` is `UnsafePath`.
pub fn output_path(output: &Path, rel: &str) -> Result<PathBuf, CoreError> {
    let mut parts: Vec<&str> = Vec::new();
    for component in rel.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(CoreError::UnsafePath(rel.to_owned()));
                }
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return Err(CoreError::UnsafePath(rel.to_owned()));
    }
    let mut path = output.to_path_buf();
    path.extend(parts);
    Ok(path)
}

fn ensure_parent(path: &Path) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn extract_arch(
    target: &ExtraTarget<'_>,
    wanted: Arch,
    patterns: &[String],
) -> Result<Vec<String>, CoreError> {
    if patterns.is_empty() || target.arch != wanted {
        return Ok(Vec::new());
    }
    debug!(
        "{}: extracting {} {wanted} patterns",
        target.package,
        patterns.len()
    );
    target
        .extractor
        .extract(target.archive, target.output, patterns)
        .map_err(|source| CoreError::Extraction {
            package: target.package.to_owned(),
            source,
        })
}

pub fn arm64_handler(extra: &SliceExtra, target: &ExtraTarget<'_>) -> Result<Vec<String>, CoreError> {
    extract_arch(target, Arch::Aarch64, &extra.arm64)
}

pub fn amd64_handler(extra: &SliceExtra, target: &ExtraTarget<'_>) -> Result<Vec<String>, CoreError> {
    extract_arch(target, Arch::X86_64, &extra.amd64)
}

/// Copy host files into the output. Keys are destinations beneath `output`;
/// values are host paths, taken as written.
pub fn copy_handler(extra: &SliceExtra, output: &Path) -> Result<Vec<String>, CoreError> {
    let mut produced = Vec::new();
    for (dest, src) in &extra.copy {
        let from = Path::new(src);
        let to = output_path(output, dest)?;
        ensure_parent(&to)?;
        std::fs::copy(&from, &to)?;
        info!("copied {} -> {}", from.display(), to.display());
        produced.push(dest.clone());
    }
    Ok(produced)
}

pub fn text_handler(extra: &SliceExtra, output: &Path) -> Result<Vec<String>, CoreError> {
    let mut produced = Vec::new();
    for (dest, content) in &extra.text {
        let to = output_path(output, dest)?;
        ensure_parent(&to)?;
        std::fs::write(&to, content)?;
        info!("wrote {}", to.display());
        produced.push(dest.clone());
    }
    Ok(produced)
}

/// CVE-scan manifest generation. Declared entries are accepted and ignored.
pub fn manifest_handler(extra: &SliceExtra, _output: &Path) -> Vec<String> {
    if !extra.manifest.is_empty() {
        debug!("ignoring {} manifest entries", extra.manifest.len());
    }
    Vec::new()
}

/// Run every handler over `extra`, in order, and collect what they produced.
pub fn apply_extra(extra: &SliceExtra, target: &ExtraTarget<'_>) -> Result<Vec<String>, CoreError> {
    let mut produced = arm64_handler(extra, target)?;
    produced.extend(amd64_handler(extra, target)?);
    produced.extend(copy_handler(extra, target.output)?);
    produced.extend(text_handler(extra, target.output)?);
    produced.extend(manifest_handler(extra, target.output));
    Ok(produced)
}
