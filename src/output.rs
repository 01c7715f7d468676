//! The generated Caddyfile on disk

use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Output document location
#[derive(Debug, Clone)]
pub struct OutputFile {
    path: PathBuf,
}

impl OutputFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current contents, empty when the file does not exist or is unreadable
    pub fn read(&self) -> String {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read output file");
                String::new()
            }
        }
    }

    /// Replace the file atomically with `content`
    ///
    /// Writes a temporary file next to the target and renames it over, so a
    /// reloading Caddy never sees a half-written document.
    pub fn write(&self, content: &str) -> anyhow::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
            anyhow::anyhow!("Failed to create temporary file in '{}': {}", dir.display(), e)
        })?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o644))?;
        }

        tmp.persist(&self.path).map_err(|e| {
            anyhow::anyhow!("Failed to replace '{}': {}", self.path.display(), e.error)
        })?;
        Ok(())
    }
}
