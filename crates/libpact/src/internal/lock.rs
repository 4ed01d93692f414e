use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::error::{Error, Fallible};

/// The database lock file, guaranteeing at most one concurrent transaction
/// per install root. Acquired when a transaction is initialized, released
/// when it is, or the session is, dropped.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    pub fn acquire(path: PathBuf) -> Fallible<LockFile> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = write!(file, "{}", std::process::id());
                debug!("acquired lock {}", path.display());
                Ok(LockFile { path })
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(Error::HandleLock(path))
            }
            Err(source) => Err(Error::Io {
                message: format!("failed to create lock file {}", path.display()),
                source,
            }),
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            warn!("failed to release lock {}: {}", self.path.display(), err);
        } else {
            debug!("released lock {}", self.path.display());
        }
    }
}

#[cfg(test)]
mod test {
    use super::LockFile;
    use crate::error::Error;

    #[test]
    fn test_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.lck");
        let lock = LockFile::acquire(path.clone()).unwrap();
        assert!(matches!(
            LockFile::acquire(path.clone()),
            Err(Error::HandleLock(_))
        ));
        drop(lock);
        assert!(!path.exists());
        let _relock = LockFile::acquire(path).unwrap();
    }
}
