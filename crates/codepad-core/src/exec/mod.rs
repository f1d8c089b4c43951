//! One-job-at-a-time action runner for snippet builds.
//!
//! Each websocket session owns one [`Executor`]. The executor owns a
//! scratch directory for source files, built binaries, and profile
//! intermediates, and runs at most one action at a time: starting a new
//! action preempts whatever is in flight. Frames stream back to the
//! session through the executor's [`FrameSender`].

mod command;
mod profile;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::blob::BlobStore;
use crate::directives::{self, Directives};
use crate::error::Result;
use crate::frame::{Action, FrameSender};
use crate::toolchain::Toolchain;

/// Name the source file carries while it is being classified.
const TMP_NAME: &str = "temp.go";

/// The two actions an executor can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartAction {
    /// Rewrite the source through the configured formatter.
    Format,
    /// Build and execute the source.
    Run,
}

/// Per-action scheduling state.
struct ActionState {
    closed: bool,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

/// Runs Format and Run actions against the Go toolchain, one at a time.
pub struct Executor {
    toolchain: Toolchain,
    blobs: Arc<BlobStore>,
    /// Blob ids this executor inserted; reclaimed on the next run and at
    /// close.
    owned_blobs: StdMutex<Vec<String>>,
    scratch: StdMutex<Option<TempDir>>,
    scratch_path: PathBuf,
    frames: FrameSender,
    state: Mutex<ActionState>,
}

impl Executor {
    /// Create an executor with a fresh scratch directory.
    pub fn new(
        toolchain: Toolchain,
        blobs: Arc<BlobStore>,
        frames: FrameSender,
    ) -> Result<Arc<Self>> {
        let scratch = tempfile::Builder::new().prefix("playground-").tempdir()?;
        let scratch_path = scratch.path().to_path_buf();
        Ok(Arc::new(Self {
            toolchain,
            blobs,
            owned_blobs: StdMutex::new(Vec::new()),
            scratch: StdMutex::new(Some(scratch)),
            scratch_path,
            frames,
            state: Mutex::new(ActionState {
                closed: false,
                cancel: CancellationToken::new(),
                task: None,
            }),
        }))
    }

    /// The scratch directory this executor works in.
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_path
    }

    /// Start an action, preempting any in-flight one.
    ///
    /// The previous action is cancelled and awaited before the new one is
    /// dispatched, so frames of two actions never interleave. Emits
    /// `StatusStarted` immediately and returns once the action task is
    /// spawned; the task always ends with `StatusStopped`.
    pub async fn start(self: &Arc<Self>, action: StartAction, code: String) {
        let mut state = self.state.lock().await;
        state.cancel.cancel();
        if let Some(task) = state.task.take() {
            let _ = task.await;
        }
        if state.closed {
            self.frames
                .send(Action::StatusUpdate, "Unexpected error: server is shut down\n");
            return;
        }
        let cancel = CancellationToken::new();
        state.cancel = cancel.clone();

        self.frames.send(Action::StatusStarted, "");
        let ex = Arc::clone(self);
        state.task = Some(tokio::spawn(async move {
            match action {
                StartAction::Format => ex.handle_format(&code, &cancel).await,
                StartAction::Run => ex.handle_run(&code, &cancel).await,
            }
            ex.frames.send(Action::StatusStopped, "");
        }));
    }

    /// Cancel any in-flight action and wait for its terminal frame.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        state.cancel.cancel();
        if let Some(task) = state.task.take() {
            let _ = task.await;
        }
    }

    /// Stop, reclaim produced blobs, and remove the scratch directory.
    /// Further starts fail with a status error.
    pub async fn close(&self) {
        {
            let mut state = self.state.lock().await;
            state.closed = true;
        }
        self.stop().await;
        self.delete_blobs();
        let scratch = self.scratch.lock().unwrap().take();
        if let Some(dir) = scratch {
            if let Err(e) = dir.close() {
                tracing::warn!("failed to remove scratch directory: {e}");
            }
        }
    }

    /// Delete every blob this executor inserted.
    fn delete_blobs(&self) {
        let ids = std::mem::take(&mut *self.owned_blobs.lock().unwrap());
        for id in ids {
            self.blobs.delete(&id);
        }
    }

    fn write_file(&self, name: &str, data: &str) -> bool {
        if let Err(e) = fs::write(self.scratch_path.join(name), data) {
            self.frames
                .send(Action::StatusUpdate, format!("Unexpected error: {e}\n"));
            return false;
        }
        true
    }

    fn read_file(&self, name: &str) -> Option<String> {
        match fs::read(self.scratch_path.join(name)) {
            Ok(raw) => Some(String::from_utf8_lossy(&raw).into_owned()),
            Err(e) => {
                self.frames
                    .send(Action::StatusUpdate, format!("Unexpected error: {e}\n"));
                None
            }
        }
    }

    async fn run_command(
        &self,
        cancel: &CancellationToken,
        argv: &[String],
        capture: Option<&mut Vec<u8>>,
    ) -> bool {
        command::run_streamed(
            &self.frames,
            cancel,
            &self.scratch_path,
            &self.toolchain.environment,
            argv,
            capture,
        )
        .await
    }

    /// Scan build stderr for line diagnostics and emit a `MarkLines` frame
    /// when any were found.
    fn mark_offending_lines(&self, stderr: &[u8]) {
        let lines = command::offending_lines(stderr);
        if lines.is_empty() {
            return;
        }
        if let Ok(json) = serde_json::to_string(&lines) {
            self.frames.send(Action::MarkLines, json);
        }
    }

    async fn handle_format(&self, code: &str, cancel: &CancellationToken) {
        self.frames.send(Action::ClearOutput, "");
        self.frames
            .send(Action::StatusUpdate, "Formatting source...\n");
        if !self.write_file("main.go", code) {
            return;
        }
        let argv = vec![
            self.toolchain.fmt_binary.clone(),
            "-w".to_string(),
            "main.go".to_string(),
        ];
        let mut stderr_buf = Vec::new();
        if !self.run_command(cancel, &argv, Some(&mut stderr_buf)).await {
            self.mark_offending_lines(&stderr_buf);
            return;
        }

        let Some(code) = self.read_file("main.go") else {
            return;
        };
        self.frames.send(Action::Format, code);
        self.frames.send(Action::ClearOutput, "");
        self.frames.send(Action::StatusUpdate, "Source formatted.\n");
    }

    async fn handle_run(&self, code: &str, cancel: &CancellationToken) {
        self.frames.send(Action::ClearOutput, "");

        // Best effort at clearing out the scratch directory and stale
        // profile blobs from the previous run.
        if let Ok(entries) = fs::read_dir(&self.scratch_path) {
            for entry in entries.flatten() {
                let path = entry.path();
                let _ = if path.is_dir() {
                    fs::remove_dir_all(&path)
                } else {
                    fs::remove_file(&path)
                };
            }
        }
        self.delete_blobs();

        if !self.write_file(TMP_NAME, code) {
            return;
        }
        let directives = match directives::parse_file(&self.scratch_path.join(TMP_NAME)) {
            Ok(Ok(directives)) => directives,
            Ok(Err(rejection)) => {
                self.frames.send(Action::StatusUpdate, rejection.to_string());
                return;
            }
            Err(e) => {
                self.frames
                    .send(Action::StatusUpdate, format!("Unexpected error: {e}\n"));
                return;
            }
        };
        let verbose = directives.any();

        let Some(compilers) = self.resolve_compilers(&directives) else {
            return;
        };
        let Some(plan) = self.build_plan(&directives) else {
            return;
        };

        if let Err(e) = fs::rename(
            self.scratch_path.join(TMP_NAME),
            self.scratch_path.join(plan.src_name),
        ) {
            self.frames
                .send(Action::StatusUpdate, format!("Unexpected error: {e}\n"));
            return;
        }

        for compiler in &compilers {
            if cancel.is_cancelled() {
                return;
            }

            if verbose {
                let cmd: Vec<&str> = std::iter::once(compiler.as_str())
                    .chain(plan.build_args.iter().map(String::as_str))
                    .collect();
                self.frames.send(
                    Action::StatusUpdate,
                    format!("Compiling program... (command: {})\n", cmd.join(" ")),
                );
            } else {
                self.frames
                    .send(Action::StatusUpdate, "Compiling program...\n");
            }
            let mut argv = vec![compiler.clone()];
            argv.extend(plan.build_args.iter().cloned());
            let mut stderr_buf = Vec::new();
            if !self.run_command(cancel, &argv, Some(&mut stderr_buf)).await {
                self.mark_offending_lines(&stderr_buf);
                continue;
            }

            // Very old toolchains name the test binary after the package
            // argument list; normalize before executing.
            let _ = fs::rename(
                self.scratch_path.join("command-line-arguments.test"),
                self.scratch_path.join("main.test"),
            );

            if verbose {
                self.frames.send(
                    Action::StatusUpdate,
                    format!("Starting program... (command: {})\n", plan.exec_args.join(" ")),
                );
            } else {
                self.frames.send(Action::ClearOutput, "");
            }
            if !self.run_command(cancel, &plan.exec_args, None).await {
                self.frames.send(Action::StatusUpdate, "\n");
                continue;
            }
            self.frames.send(Action::StatusUpdate, "Program exited.\n");

            if !directives.profile_modes.is_empty() {
                self.generate_profiles(cancel, &directives.profile_modes)
                    .await;
            }
            self.frames.send(Action::StatusUpdate, "\n");
        }
    }

    /// Map requested version aliases to compiler binaries, defaulting to
    /// the configured toolchain. `None` means the run was rejected.
    fn resolve_compilers(&self, directives: &Directives) -> Option<Vec<String>> {
        if directives.versions.is_empty() {
            return Some(vec![self.toolchain.go_binary.clone()]);
        }
        if !directives.profile_modes.is_empty() {
            self.frames.send(
                Action::StatusUpdate,
                "WARNING: Support for profiling earlier Go versions is flaky!\n\n",
            );
        }
        let mut compilers = Vec::with_capacity(directives.versions.len());
        for alias in &directives.versions {
            match self.toolchain.resolve(alias) {
                Some(bin) => compilers.push(bin.to_string()),
                None => {
                    self.frames
                        .send(Action::StatusUpdate, format!("Unknown Go version: {alias}\n"));
                    return None;
                }
            }
        }
        Some(compilers)
    }

    /// Assemble the source file name plus build and exec argument lists.
    /// `None` means the run was rejected.
    fn build_plan(&self, directives: &Directives) -> Option<RunPlan> {
        let mut exec_args = directives.exec_args.clone();
        if !directives.profile_modes.is_empty() {
            if exec_args.is_empty() {
                // Benchmarks only; running the tests would pollute the
                // profile.
                exec_args = vec![
                    "-test.v".to_string(),
                    "-test.run=-".to_string(),
                    "-test.bench=.".to_string(),
                ];
            }
            for mode in &directives.profile_modes {
                match mode.as_str() {
                    "cpu" => exec_args.push("-test.cpuprofile=cpu.prof".to_string()),
                    "mem" => exec_args.push("-test.memprofile=mem.prof".to_string()),
                    other => {
                        self.frames.send(
                            Action::StatusUpdate,
                            format!("Unknown profiling argument: {other}\n"),
                        );
                        return None;
                    }
                }
            }
        }

        if directives.has_main {
            let mut build_args = vec!["build".to_string()];
            build_args.extend(directives.build_args.iter().cloned());
            build_args.push("main.go".to_string());
            let mut exec = vec!["./main".to_string()];
            exec.extend(exec_args);
            Some(RunPlan {
                src_name: "main.go",
                build_args,
                exec_args: exec,
            })
        } else {
            let mut build_args = vec!["test".to_string(), "-c".to_string()];
            build_args.extend(directives.build_args.iter().cloned());
            build_args.push("main_test.go".to_string());
            let exec = if exec_args.is_empty() {
                vec![
                    "./main.test".to_string(),
                    "-test.v".to_string(),
                    "-test.run=.".to_string(),
                    "-test.bench=.".to_string(),
                ]
            } else {
                let mut exec = vec!["./main.test".to_string()];
                exec.extend(exec_args);
                exec
            };
            Some(RunPlan {
                src_name: "main_test.go",
                build_args,
                exec_args: exec,
            })
        }
    }
}

/// Argument lists for one run, shared by every selected toolchain.
struct RunPlan {
    src_name: &'static str,
    build_args: Vec<String>,
    exec_args: Vec<String>,
}

impl Drop for Executor {
    fn drop(&mut self) {
        // Close is the normal path; this reclaims blob ids when a session
        // is torn down abnormally. The scratch TempDir removes itself.
        self.delete_blobs();
    }
}
