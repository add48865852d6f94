//! Review service credential
//!
//! The Gemini API key is kept out of `config.toml` in its own
//! `~/.config/tandem/secrets.toml`, which must be private to its owner on
//! Unix. `GOOGLE_API_KEY` in the environment takes precedence over the file.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Environment variable holding the review service credential
pub const GOOGLE_API_KEY_ENV: &str = "GOOGLE_API_KEY";

const TEMPLATE: &str = r#"# Tandem secrets (keep this file private: chmod 600)

[google]
# Gemini API key for the review and debugging steps
# Create one at https://aistudio.google.com/app/apikey
api_key = ""
"#;

/// Contents of `secrets.toml`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Secrets {
    pub google: GoogleSecrets,
}

/// The `[google]` table
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GoogleSecrets {
    pub api_key: Option<String>,
}

impl Secrets {
    /// Read the default secrets file, or return empty secrets when there is none
    pub fn load() -> Result<Self> {
        match Self::default_secrets_path() {
            Some(path) if path.is_file() => Self::load_from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Read `path`, refusing it when other users could read the key
    pub fn load_from_file(path: &Path) -> Result<Self> {
        ensure_private(path)?;

        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| {
            Error::Config(format!("Invalid secrets file {}: {}", path.display(), e))
        })
    }

    /// `~/.config/tandem/secrets.toml`
    pub fn default_secrets_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tandem").join("secrets.toml"))
    }

    /// The Gemini key from `GOOGLE_API_KEY` or, failing that, the file
    pub fn google_api_key(&self) -> Option<String> {
        self.google_api_key_with_env(std::env::var(GOOGLE_API_KEY_ENV).ok())
    }

    /// Resolve the key given an already-read environment value
    ///
    /// Blank values count as unset at either source.
    pub fn google_api_key_with_env(&self, env_value: Option<String>) -> Option<String> {
        if let Some(key) = non_blank(env_value) {
            debug!(source = GOOGLE_API_KEY_ENV, "Resolved Gemini API key");
            return Some(key);
        }
        let key = non_blank(self.google.api_key.clone())?;
        debug!(source = "secrets file", "Resolved Gemini API key");
        Some(key)
    }

    /// Write an empty owner-only template to the default location
    pub fn create_template() -> Result<PathBuf> {
        let path = Self::default_secrets_path()
            .ok_or_else(|| Error::Config("Could not determine secrets path".to_string()))?;
        write_template(&path)?;
        warn!(path = %path.display(), "Created secrets template; add the Gemini API key");
        Ok(path)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(unix)]
fn ensure_private(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path)?.permissions().mode() & 0o777;
    if mode & 0o077 != 0 {
        return Err(Error::Config(format!(
            "Secrets file {} has insecure permissions {:o}; run: chmod 600 {}",
            path.display(),
            mode,
            path.display()
        )));
    }
    Ok(())
}

#[cfg(not(unix))]
fn ensure_private(_path: &Path) -> Result<()> {
    Ok(())
}

/// Create `path` with the template, never replacing an existing file
fn write_template(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::AlreadyExists => {
            Error::Config(format!("Secrets file already exists at {}", path.display()))
        }
        _ => Error::Io(e),
    })?;
    file.write_all(TEMPLATE.as_bytes())?;
    Ok(())
}
