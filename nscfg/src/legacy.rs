//! Reading and atomically replacing the flat configuration files.

use std::fs::{self, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::{Error, Outcome, Result};

/// Marker identifying files written by this tool.
pub const AUTOGEN_MARKER: &str = "_AUTOGENERATED_FROM_SMF_V1_";

/// Comment block placed at the top of generated files.
pub fn header(manpage: &str) -> String {
    format!(
        "#\n\
         # {AUTOGEN_MARKER}\n\
         #\n\
         # WARNING: THIS FILE GENERATED FROM SMF DATA.\n\
         #   DO NOT EDIT THIS FILE.  EDITS WILL BE LOST.\n\
         # See {manpage} for details.\n\
         #\n"
    )
}

/// One legacy file under the alternate root.
#[derive(Debug, Clone)]
pub struct LegacyFile {
    path: PathBuf,
    manpage: &'static str,
    mode: u32,
}

impl LegacyFile {
    pub fn new(path: PathBuf, manpage: &'static str) -> Self {
        Self {
            path,
            manpage,
            mode: 0o644,
        }
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn io_error(&self, source: io::Error) -> Error {
        Error::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Lines of the file, or `None` when it does not exist.
    pub fn load_lines(&self) -> Result<Option<Vec<String>>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text.lines().map(str::to_string).collect())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    /// Whether the file exists and carries the generated-file marker.
    pub fn is_autogenerated(&self) -> bool {
        match self.load_lines() {
            Ok(Some(lines)) => lines.iter().any(|l| l.contains(AUTOGEN_MARKER)),
            _ => false,
        }
    }

    /// Replace the file with `body`, optionally prefixed with the header.
    ///
    /// The new content is written to a temporary file in the same directory
    /// and renamed over the target, so readers never observe a partial file.
    pub fn write(&self, body: &str, include_header: bool, dry_run: bool) -> Result<Outcome> {
        let mut content = String::new();
        if include_header {
            content.push_str(&header(self.manpage));
        }
        content.push_str(body);

        match fs::read(&self.path) {
            Ok(existing) if existing == content.as_bytes() => return self.sync_mode(dry_run),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(self.io_error(e)),
        }

        if dry_run {
            info!("DRY-RUN: Would write {}", self.path.display());
            return Ok(Outcome::Success);
        }

        let dir = self
            .path
            .parent()
            .ok_or_else(|| self.io_error(io::Error::other("path has no parent directory")))?;
        fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.io_error(e))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| self.io_error(e))?;
        tmp.as_file()
            .set_permissions(Permissions::from_mode(self.mode))
            .map_err(|e| self.io_error(e))?;
        tmp.as_file().sync_all().map_err(|e| self.io_error(e))?;

        if let Err(e) = tmp.persist(&self.path) {
            if e.error.raw_os_error() != Some(libc::EXDEV) {
                return Err(self.io_error(e.error));
            }
            warn!(
                "Cannot rename across devices, copying into {}",
                self.path.display()
            );
            fs::copy(e.file.path(), &self.path).map_err(|e| self.io_error(e))?;
            fs::set_permissions(&self.path, Permissions::from_mode(self.mode))
                .map_err(|e| self.io_error(e))?;
        }
        info!("Wrote {}", self.path.display());
        Ok(Outcome::Success)
    }

    /// The content already matches; only the mode may be off.
    fn sync_mode(&self, dry_run: bool) -> Result<Outcome> {
        let current = fs::metadata(&self.path)
            .map_err(|e| self.io_error(e))?
            .permissions()
            .mode()
            & 0o7777;
        if current == self.mode {
            debug!("{} is up to date", self.path.display());
            return Ok(Outcome::NoChange);
        }
        if dry_run {
            info!(
                "DRY-RUN: Would change mode of {} to {:o}",
                self.path.display(),
                self.mode
            );
            return Ok(Outcome::Success);
        }
        fs::set_permissions(&self.path, Permissions::from_mode(self.mode))
            .map_err(|e| self.io_error(e))?;
        info!(
            "Changed mode of {} from {:o} to {:o}",
            self.path.display(),
            current,
            self.mode
        );
        Ok(Outcome::Success)
    }

    /// Remove the file. Already absent is `NoChange`.
    pub fn remove(&self, dry_run: bool) -> Result<Outcome> {
        if !self.exists() {
            return Ok(Outcome::NoChange);
        }
        if dry_run {
            info!("DRY-RUN: Would remove {}", self.path.display());
            return Ok(Outcome::Success);
        }
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Removed {}", self.path.display());
                Ok(Outcome::Success)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Outcome::NoChange),
            Err(e) => Err(self.io_error(e)),
        }
    }
}
