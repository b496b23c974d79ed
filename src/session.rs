//! Locally cached access token.
//!
//! The token is the only state that survives between runs. It lives in a single
//! file under the user's config directory and is injected into the wizard as a
//! [`Session`] rather than read from ambient storage.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "tablecrm-order";
const TOKEN_FILE: &str = "token";

/// Default location of the token file.
pub fn default_token_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("no config directory for this platform")?;
    Ok(base.join(APP_DIR).join(TOKEN_FILE))
}

#[derive(Debug, Clone)]
pub struct Session {
    path: PathBuf,
    token: Option<String>,
}

impl Session {
    pub fn new(path: PathBuf) -> Self {
        Self { path, token: None }
    }

    /// Load a previously stored token, if any.
    pub fn init(&mut self) -> Result<Option<&str>> {
        self.token = match std::fs::read_to_string(&self.path) {
            Ok(raw) => Some(raw.trim().to_string()).filter(|t| !t.is_empty()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(e).with_context(|| format!("read {}", self.path.display()));
            }
        };
        Ok(self.token.as_deref())
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Hold `token` in memory and persist it.
    ///
    /// The in-memory token is updated even when writing the file fails, so the
    /// current run keeps working.
    pub fn store(&mut self, token: &str) -> Result<()> {
        self.token = Some(token.to_string());
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        }
        std::fs::write(&self.path, token)
            .with_context(|| format!("write {}", self.path.display()))?;
        restrict_permissions(&self.path)?;
        tracing::info!(path = %self.path.display(), "stored access token");
        Ok(())
    }

    /// Forget the token in memory and on disk.
    pub fn clear(&mut self) -> Result<()> {
        self.token = None;
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "removed stored access token");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {}", self.path.display())),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .with_context(|| format!("chmod {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
