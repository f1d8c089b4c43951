//! Profile report generation.
//!
//! The profiler cannot reliably write rendered reports straight to a file
//! across toolchain versions, so rendering is routed through a tiny helper
//! program registered as the profiler's browser: the profiler hands the
//! helper a temporary file, and the helper copies it to the requested
//! output path named through its command line. Reports land in the blob
//! store and are announced to the client by id.

use super::{command, Executor};
use crate::blob::Blob;
use crate::frame::Action;

use tokio_util::sync::CancellationToken;

/// Reports larger than this are dropped rather than cached.
const MAX_REPORT_BYTES: usize = 16 << 20;

/// Source of the copy helper standing in for a browser.
const COPY_HELPER_SRC: &str = r#"package main

import "io"
import "os"

func main() {
	src, _ := os.Open(os.Args[2])
	defer src.Close()
	dst, _ := os.Create(os.Args[1])
	defer dst.Close()
	io.Copy(dst, src)
}
"#;

/// The rendered views of each profile mode: output file name plus the
/// renderer flags that produce it.
const CPU_VIEWS: &[(&str, &[&str])] = &[
    ("cpu_graph.svg", &["-web"]),
    ("cpu_list.html", &["-weblist=."]),
];
const MEM_VIEWS: &[(&str, &[&str])] = &[
    ("mem_objects_graph.svg", &["-alloc_objects", "-web"]),
    ("mem_objects_list.html", &["-alloc_objects", "-weblist=."]),
    ("mem_space_graph.svg", &["-alloc_space", "-web"]),
    ("mem_space_list.html", &["-alloc_space", "-weblist=."]),
];

impl Executor {
    /// Render viewable reports for the profiles the test run wrote, store
    /// them as blobs, and announce each with a `ReportProfile` frame.
    pub(super) async fn generate_profiles(&self, cancel: &CancellationToken, modes: &[String]) {
        self.frames
            .send(Action::StatusUpdate, "Generating performance reports...\n");
        self.generate_all_views(cancel, modes).await;
        self.frames
            .send(Action::StatusUpdate, "Report generation done.\n");
    }

    async fn generate_all_views(&self, cancel: &CancellationToken, modes: &[String]) {
        if !self.write_file("prof_copy.go", COPY_HELPER_SRC) {
            return;
        }
        let build = vec![
            self.toolchain.go_binary.clone(),
            "build".to_string(),
            "prof_copy.go".to_string(),
        ];
        if !self.run_command(cancel, &build, None).await {
            return;
        }

        for mode in modes {
            let (views, profile) = match mode.as_str() {
                "cpu" => (CPU_VIEWS, "cpu.prof"),
                "mem" => (MEM_VIEWS, "mem.prof"),
                _ => continue,
            };
            for &(output, flags) in views {
                self.render_view(cancel, output, flags, profile).await;
            }
        }
    }

    /// Render one view of one profile into `output` and publish it.
    ///
    /// Empty outputs are dropped silently: short benchmarks legitimately
    /// produce no samples.
    async fn render_view(
        &self,
        cancel: &CancellationToken,
        output: &str,
        flags: &[&str],
        profile: &str,
    ) {
        // The default toolchain renders profiles for every binary here,
        // regardless of which version compiled it; a per-version flag set
        // does not exist.
        let mut argv = vec![
            self.toolchain.go_binary.clone(),
            "tool".to_string(),
            "pprof".to_string(),
        ];
        argv.extend(flags.iter().map(|f| f.to_string()));
        argv.push("main.test".to_string());
        argv.push(profile.to_string());

        let helper = self.scratch_path.join("prof_copy");
        let extra_env = [
            (
                "PPROF_TMPDIR".to_string(),
                self.scratch_path.display().to_string(),
            ),
            (
                "BROWSER".to_string(),
                format!("{} {}", helper.display(), output),
            ),
        ];
        if let Err(e) = command::run_quiet(
            cancel,
            &self.scratch_path,
            &self.toolchain.environment,
            &extra_env,
            &argv,
        )
        .await
        {
            self.frames.send(
                Action::StatusUpdate,
                format!("\tDropped report: {output} (unexpected error: {e})\n"),
            );
            return;
        }

        let data = std::fs::read(self.scratch_path.join(output)).unwrap_or_default();
        if data.len() > MAX_REPORT_BYTES {
            self.frames.send(
                Action::StatusUpdate,
                format!("\tDropped report: {output} (file too large: {} bytes)\n", data.len()),
            );
            return;
        }
        if data.is_empty() {
            return;
        }

        let mime = if output.ends_with(".svg") {
            "image/svg+xml"
        } else if output.ends_with(".html") {
            "text/html"
        } else {
            ""
        };
        let id = self.blobs.insert(Blob {
            data,
            mime: mime.to_string(),
        });
        self.owned_blobs.lock().unwrap().push(id.clone());
        let payload = serde_json::json!({ "name": output, "id": id });
        self.frames.send(Action::ReportProfile, payload.to_string());
    }
}
