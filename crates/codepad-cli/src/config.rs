//! JSON configuration and interactive bootstrap.
//!
//! The configuration file stores no password, only a salted SHA-256 hash
//! of it. Started without a configuration file, the binary prompts for a
//! fresh password and derives a salt and hash on the spot.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// On-disk JSON configuration. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Config {
    /// Socket address to serve on; defaults to `localhost:8080`.
    pub serve_address: String,
    /// Log destination; defaults to stderr.
    pub log_file: String,
    /// Hex-encoded 32-byte salt; must be set together with the hash.
    pub password_salt: String,
    /// Hex-encoded SHA-256 of salt ++ password.
    pub password_hash: String,
    #[serde(rename = "TLSCertFile")]
    pub tls_cert_file: String,
    #[serde(rename = "TLSKeyFile")]
    pub tls_key_file: String,
    /// Directory for persistent data; defaults to `$HOME/.codepad`.
    pub data_path: String,
    /// Default compiler binary; defaults to `go`.
    pub go_binary: String,
    /// Formatter binary; defaults to `goimports` when available,
    /// otherwise `gofmt`.
    pub fmt_binary: String,
    /// Alias table of additional compiler binaries.
    pub go_versions: HashMap<String, String>,
    /// Environment variables applied to toolchain processes.
    pub environment: HashMap<String, String>,
}

impl Config {
    /// Load the configuration from `path`, or bootstrap one interactively
    /// when no path is given. Defaults are applied and validated either
    /// way.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
        let mut config = match path {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("unable to read config {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("unable to decode config {}", path.display()))?
            }
            None => Self::bootstrap_password()?,
        };
        config.apply_defaults();
        config.validate()?;
        Ok(config)
    }

    /// Prompt for a password and derive fresh credentials.
    fn bootstrap_password() -> anyhow::Result<Config> {
        let password = rpassword::prompt_password("Enter a new playground login password: ")
            .context("unable to read password")?;
        if password.trim().len() < 8 {
            bail!("insecure password: need at least 8 non-whitespace bytes");
        }
        let mut salt = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut salt);

        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(password.as_bytes());
        let hash = hasher.finalize();

        Ok(Config {
            password_salt: hex_encode(&salt),
            password_hash: hex_encode(&hash),
            ..Config::default()
        })
    }

    fn apply_defaults(&mut self) {
        if self.serve_address.is_empty() {
            self.serve_address = "localhost:8080".to_string();
        }
        if self.data_path.is_empty() {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            self.data_path = Path::new(&home).join(".codepad").display().to_string();
        }
        if self.go_binary.is_empty() {
            self.go_binary = "go".to_string();
        }
        if self.fmt_binary.is_empty() {
            self.fmt_binary = if which::which("goimports").is_ok() {
                "goimports".to_string()
            } else {
                "gofmt".to_string()
            };
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        let has_password = !self.password_salt.is_empty() || !self.password_hash.is_empty();
        if has_password
            && !(is_hex_digest(&self.password_salt) && is_hex_digest(&self.password_hash))
        {
            bail!("PasswordSalt and PasswordHash must be 32 byte long hex-strings");
        }
        if self.tls_cert_file.is_empty() != self.tls_key_file.is_empty() {
            bail!("TLSCertFile and TLSKeyFile must be set together");
        }
        Ok(())
    }

    /// Decoded password hash and salt, when configured.
    pub fn password_keys(&self) -> anyhow::Result<Option<([u8; 32], [u8; 32])>> {
        if self.password_hash.is_empty() && self.password_salt.is_empty() {
            return Ok(None);
        }
        let hash = decode_hex_digest(&self.password_hash).context("invalid PasswordHash")?;
        let salt = decode_hex_digest(&self.password_salt).context("invalid PasswordSalt")?;
        Ok(Some((hash, salt)))
    }

    /// Ensure the data directory exists and return it.
    pub fn ensure_data_dir(&self) -> anyhow::Result<PathBuf> {
        let path = PathBuf::from(&self.data_path);
        fs::create_dir_all(&path)
            .with_context(|| format!("unable to create data directory {}", path.display()))?;
        Ok(path)
    }
}

fn is_hex_digest(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn decode_hex_digest(s: &str) -> Option<[u8; 32]> {
    if !is_hex_digest(s) {
        return None;
    }
    let mut out = [0u8; 32];
    for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
        let hi = (chunk[0] as char).to_digit(16)?;
        let lo = (chunk[1] as char).to_digit(16)?;
        out[i] = (hi * 16 + lo) as u8;
    }
    Some(out)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
