//! Runs an approved command through the shell and captures the result.

use std::path::Path;
use std::time::Instant;

use tokio::process::Command;

/// Captured output is truncated past this many bytes.
pub const MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// The result of running one approved command.
#[derive(Debug)]
pub struct ExecutionReport {
    /// None when the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr, truncated at [`MAX_OUTPUT_BYTES`].
    pub output: String,
    pub duration_ms: u64,
}

/// Run the command via `sh -c` in the given directory and wait for it.
pub async fn run(command: &str, cwd: &Path) -> std::io::Result<ExecutionReport> {
    let start = Instant::now();
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .output()
        .await?;
    let duration_ms = start.elapsed().as_millis() as u64;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
        if !combined.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(&stderr);
    }

    Ok(ExecutionReport {
        exit_code: output.status.code(),
        output: truncate_output(combined),
        duration_ms,
    })
}

fn truncate_output(s: String) -> String {
    if s.len() <= MAX_OUTPUT_BYTES {
        return s;
    }
    // Cut on a char boundary at or below the limit.
    let mut end = MAX_OUTPUT_BYTES;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    let dropped = s.len() - end;
    format!("{}... (+{dropped} more bytes)", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let report = run("echo hello", dir.path()).await.unwrap();
        assert_eq!(report.exit_code, Some(0));
        assert_eq!(report.output.trim(), "hello");
    }

    #[tokio::test]
    async fn captures_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let report = run("echo oops >&2", dir.path()).await.unwrap();
        assert_eq!(report.output.trim(), "oops");
    }

    #[tokio::test]
    async fn nonzero_exit_code_reported() {
        let dir = tempfile::tempdir().unwrap();
        let report = run("exit 3", dir.path()).await.unwrap();
        assert_eq!(report.exit_code, Some(3));
    }

    #[tokio::test]
    async fn runs_in_given_directory() {
        let dir = tempfile::tempdir().unwrap();
        let report = run("pwd", dir.path()).await.unwrap();
        let printed = std::path::PathBuf::from(report.output.trim());
        assert_eq!(
            printed.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn truncation_marks_dropped_bytes() {
        let big = "a".repeat(MAX_OUTPUT_BYTES + 10);
        let out = truncate_output(big);
        assert!(out.ends_with("... (+10 more bytes)"));
    }

    #[test]
    fn short_output_untouched() {
        assert_eq!(truncate_output("ok".to_string()), "ok");
    }
}
