//! Toolchain configuration for snippet builds.

use std::collections::HashMap;

/// Binaries and environment used to build, format, and profile snippets.
///
/// `versions` maps symbolic aliases (e.g. `go1.6`) to alternate compiler
/// binaries so a snippet can request runs across several releases.
#[derive(Debug, Clone, Default)]
pub struct Toolchain {
    /// Default `go` binary, as a path or a name resolved via `$PATH`.
    pub go_binary: String,
    /// Source formatter binary (`goimports` or `gofmt`).
    pub fmt_binary: String,
    /// Alias table of additional compiler binaries.
    pub versions: HashMap<String, String>,
    /// Extra environment applied to every toolchain child process.
    pub environment: HashMap<String, String>,
}

impl Toolchain {
    pub fn new(go_binary: impl Into<String>, fmt_binary: impl Into<String>) -> Self {
        Self {
            go_binary: go_binary.into(),
            fmt_binary: fmt_binary.into(),
            versions: HashMap::new(),
            environment: HashMap::new(),
        }
    }

    /// Resolve a version alias to its binary, if configured.
    pub fn resolve(&self, alias: &str) -> Option<&str> {
        self.versions.get(alias).map(String::as_str)
    }
}
