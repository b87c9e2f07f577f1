use crate::backend::ContentExtractor;
use crate::{spawn_error, RuntimeError};
use glob::Pattern;
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use tempfile::NamedTempFile;
use tracing::debug;

/// Extracts RPM payload entries by piping `rpm2cpio` into `cpio`.
pub struct RpmExtractor;

impl Default for RpmExtractor {
    fn default() -> Self {
        Self
    }
}

impl RpmExtractor {
    pub fn new() -> Self {
        Self
    }
}

/// cpio lists payload entries as `./usr/bin/x`; slice patterns are absolute.
pub(crate) fn archive_relative(pattern: &str) -> String {
    if pattern.starts_with('/') {
        format!(".{pattern}")
    } else if pattern.starts_with("./") {
        pattern.to_owned()
    } else {
        format!("./{pattern}")
    }
}

pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>, RuntimeError> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(&archive_relative(p)).map_err(|e| RuntimeError::InvalidPattern {
                pattern: p.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Entries of `files` matched by at least one pattern, in archive order.
/// `*` also matches `/`.
pub fn match_files(files: &[String], patterns: &[Pattern]) -> Vec<String> {
    files
        .iter()
        .filter(|f| patterns.iter().any(|p| p.matches(f)))
        .cloned()
        .collect()
}

/// Run `rpm2cpio <archive> | cpio <cpio_args>`.
fn rpm2cpio_pipe(archive: &Path, cpio_args: &[&str]) -> Result<Output, RuntimeError> {
    let extract_err = |reason: String| RuntimeError::Extract {
        archive: archive.to_path_buf(),
        reason,
    };

    let mut rpm2cpio = Command::new("rpm2cpio")
        .arg(archive)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| spawn_error("rpm2cpio", e))?;
    if rpm2cpio.stdout.is_none() {
        let _ = rpm2cpio.kill();
        let _ = rpm2cpio.wait();
        return Err(extract_err("rpm2cpio produced no output stream".to_owned()));
    }
    let (status, cpio) = pipe_into(&mut rpm2cpio, Command::new("cpio").args(cpio_args))?;

    if !status.success() {
        return Err(extract_err(format!("rpm2cpio exited with {status}")));
    }
    if !cpio.status.success() {
        return Err(extract_err(format!(
            "cpio: {}",
            String::from_utf8_lossy(&cpio.stderr).trim()
        )));
    }
    Ok(cpio)
}

/// Feed `producer`'s stdout into `consumer`. The producer is reaped on
/// every path, including a consumer that fails to start.
fn pipe_into(
    producer: &mut Child,
    consumer: &mut Command,
) -> Result<(ExitStatus, Output), RuntimeError> {
    let program = consumer.get_program().to_string_lossy().into_owned();
    let consumed = match producer.stdout.take() {
        Some(payload) => consumer.stdin(Stdio::from(payload)).output(),
        None => consumer.stdin(Stdio::null()).output(),
    };
    match consumed {
        Ok(output) => Ok((producer.wait()?, output)),
        Err(e) => {
            let _ = producer.kill();
            let _ = producer.wait();
            Err(spawn_error(&program, e))
        }
    }
}

/// List every entry in the RPM payload.
pub fn list_archive(archive: &Path) -> Result<Vec<String>, RuntimeError> {
    let output = rpm2cpio_pipe(archive, &["-t", "--quiet"])?;
    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_owned)
        .collect())
}

fn write_files(archive: &Path, output: &Path, matched: &[String]) -> Result<(), RuntimeError> {
    let mut list = NamedTempFile::new()?;
    list.write_all(matched.join("\n").as_bytes())?;
    list.flush()?;
    debug!("file list for {} at {}", archive.display(), list.path().display());

    let out = output.to_string_lossy();
    let list_path = list.path().to_string_lossy();
    rpm2cpio_pipe(
        archive,
        &["-idm", "--quiet", "-D", &out, "-E", &list_path],
    )?;
    Ok(())
}

impl ContentExtractor for RpmExtractor {
    fn name(&self) -> &'static str {
        "rpm2cpio"
    }

    fn extract(
        &self,
        archive: &Path,
        output: &Path,
        patterns: &[String],
    ) -> Result<Vec<String>, RuntimeError> {
        std::fs::create_dir_all(output)?;
        let compiled = compile_patterns(patterns)?;
        let entries = list_archive(archive)?;
        let matched = match_files(&entries, &compiled);
        debug!(
            "{} of {} entries in {} match {} patterns",
            matched.len(),
            entries.len(),
            archive.display(),
            patterns.len()
        );
        if matched.is_empty() {
            return Ok(matched);
        }
        write_files(archive, output, &matched)?;
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn producer_is_reaped_when_consumer_cannot_start() {
        let mut producer = Command::new("sh")
            .args(["-c", "sleep 30"])
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        let err = pipe_into(
            &mut producer,
            &mut Command::new("splitter-no-such-consumer"),
        )
        .unwrap_err();
        assert!(matches!(err, RuntimeError::CommandNotFound(ref p) if p == "splitter-no-such-consumer"));
        assert!(producer.try_wait().unwrap().is_some());
    }

    #[test]
    fn pipe_feeds_consumer() {
        let mut producer = Command::new("sh")
            .args(["-c", "printf 'a\\nb\\n'"])
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        let (status, output) =
            pipe_into(&mut producer, Command::new("wc").arg("-l")).unwrap();
        assert!(status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "2");
    }

    fn entries() -> Vec<String> {
        [
            "./usr/bin/python3",
            "./usr/bin/python3.11",
            "./usr/lib64/libpython3.11.so.1.0",
            "./usr/share/doc/python3/README",
        ]
        .iter()
        .map(|s| (*s).to_owned())
        .collect()
    }

    #[test]
    fn absolute_patterns_match_payload_entries() {
        let patterns = compile_patterns(&["/usr/bin/python3*".to_owned()]).unwrap();
        assert_eq!(
            match_files(&entries(), &patterns),
            vec!["./usr/bin/python3", "./usr/bin/python3.11"]
        );
    }

    #[test]
    fn star_crosses_directories() {
        let patterns = compile_patterns(&["/usr/share/*".to_owned()]).unwrap();
        assert_eq!(
            match_files(&entries(), &patterns),
            vec!["./usr/share/doc/python3/README"]
        );
    }

    #[test]
    fn entry_matched_once_by_overlapping_patterns() {
        let patterns = compile_patterns(&[
            "/usr/lib64/*.so.*".to_owned(),
            "/usr/lib64/libpython*".to_owned(),
        ])
        .unwrap();
        assert_eq!(match_files(&entries(), &patterns).len(), 1);
    }

    #[test]
    fn relative_patterns_are_anchored() {
        assert_eq!(archive_relative("usr/bin/x"), "./usr/bin/x");
        assert_eq!(archive_relative("./usr/bin/x"), "./usr/bin/x");
        assert_eq!(archive_relative("/usr/bin/x"), "./usr/bin/x");
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = compile_patterns(&["/usr/[bin".to_owned()]).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidPattern { .. }));
    }
}
