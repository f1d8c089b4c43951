//! Child-process driving and build-diagnostic extraction.
//!
//! Toolchain processes run with their stdout/stderr piped; each chunk read
//! from a pipe is packaged straight into an `AppendStdout`/`AppendStderr`
//! frame so output streams to the client instead of accumulating. Stderr
//! is additionally captured so a failed build can be scanned for offending
//! line numbers.

use std::collections::HashMap;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::LazyLock;

use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::frame::{Action, FrameSender};

/// Run `argv` in `dir`, streaming output as frames.
///
/// Returns whether the process ran to a successful exit. Failures (spawn
/// errors, non-zero exits, and kills triggered by `cancel`) are reported
/// to the client as an `Unexpected error` status update. When `capture`
/// is given, stderr bytes are appended to it as well.
pub(crate) async fn run_streamed(
    frames: &FrameSender,
    cancel: &CancellationToken,
    dir: &Path,
    env: &HashMap<String, String>,
    argv: &[String],
    capture: Option<&mut Vec<u8>>,
) -> bool {
    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..])
        .current_dir(dir)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            frames.send(Action::StatusUpdate, format!("Unexpected error: {e}\n"));
            return false;
        }
    };

    let stdout = child.stdout.take().expect("stdout was piped");
    let stderr = child.stderr.take().expect("stderr was piped");
    let out_task = tokio::spawn(stream_pipe(
        stdout,
        frames.clone(),
        Action::AppendStdout,
        false,
    ));
    let err_task = tokio::spawn(stream_pipe(stderr, frames.clone(), Action::AppendStderr, true));

    let status = tokio::select! {
        status = child.wait() => status,
        _ = cancel.cancelled() => {
            let _ = child.start_kill();
            child.wait().await
        }
    };

    // Drain both pipes before reporting, so no output frame can trail the
    // exit status of its own process.
    let _ = out_task.await;
    let captured = err_task.await.unwrap_or_default();
    if let Some(buf) = capture {
        buf.extend_from_slice(&captured);
    }

    match status {
        Ok(status) if status.success() => true,
        Ok(status) => {
            frames.send(
                Action::StatusUpdate,
                format!("Unexpected error: {}\n", describe_exit(&status)),
            );
            false
        }
        Err(e) => {
            frames.send(Action::StatusUpdate, format!("Unexpected error: {e}\n"));
            false
        }
    }
}

/// Run `argv` in `dir` with all output discarded.
///
/// Used for helper invocations whose console output is noise (the profile
/// renderer in particular). Returns a failure description on error.
pub(crate) async fn run_quiet(
    cancel: &CancellationToken,
    dir: &Path,
    env: &HashMap<String, String>,
    extra_env: &[(String, String)],
    argv: &[String],
) -> Result<(), String> {
    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..])
        .current_dir(dir)
        .envs(env)
        .envs(extra_env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| e.to_string())?;
    let status = tokio::select! {
        status = child.wait() => status,
        _ = cancel.cancelled() => {
            let _ = child.start_kill();
            child.wait().await
        }
    };
    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(describe_exit(&status)),
        Err(e) => Err(e.to_string()),
    }
}

async fn stream_pipe<R: AsyncRead + Unpin>(
    mut pipe: R,
    frames: FrameSender,
    action: Action,
    keep: bool,
) -> Vec<u8> {
    let mut captured = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match pipe.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let chunk = &buf[..n];
                frames.send(action, String::from_utf8_lossy(chunk).into_owned());
                if keep {
                    captured.extend_from_slice(chunk);
                }
            }
        }
    }
    captured
}

fn describe_exit(status: &ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit status {code}"),
        None => "signal: killed".to_string(),
    }
}

/// Pattern of a compiler diagnostic carrying a line number for one of the
/// snippet file names.
static DIAG_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\./)?main(_test)?\.go:(\d+)").expect("diagnostic pattern compiles")
});

/// Scan captured build stderr for offending 1-based line numbers, in
/// encounter order with duplicates preserved.
pub(crate) fn offending_lines(stderr: &[u8]) -> Vec<i64> {
    let text = String::from_utf8_lossy(stderr);
    let mut lines = Vec::new();
    for line in text.split('\n') {
        if let Some(caps) = DIAG_LINE.captures(line) {
            if let Ok(n) = caps[3].parse::<i64>() {
                lines.push(n);
            }
        }
    }
    lines
}
