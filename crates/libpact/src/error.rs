use std::path::PathBuf;

use crate::conflict::{Conflict, FileConflict};
use crate::deps::DepMissing;

pub type Fallible<T> = Result<T, Error>;

/// Error that may occur during performing operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("{0}")]
    Custom(String),

    /// Thrown when trying to mutate the config while it is borrowed elsewhere.
    #[error("config is in use")]
    ConfigInUse,

    #[error("invalid config key '{0}'")]
    InvalidConfigKey(String),
    #[error("invalid config value '{0}'")]
    InvalidConfigValue(String),

    /// Thrown when a sync database failed to parse.
    #[error("repo '{0}' is invalid or corrupted")]
    DbInvalid(String),

    /// Thrown when a sync database has never been fetched but targets from
    /// it are requested.
    #[error("repo '{0}' could not be found, try refreshing it")]
    DbNotFound(String),

    /// Thrown when the database lock file is already held by another
    /// process (or left behind by a crashed one).
    #[error("unable to lock database ({0} exists)")]
    HandleLock(PathBuf),

    #[error("could not find package(s): {0}", queries.join(" "))]
    PackageNotFound { queries: Vec<String> },

    /// Dependency check failure. Carries one record per unmet dependency
    /// expression for the frontend to render.
    #[error("could not satisfy dependencies")]
    UnsatisfiedDeps(Vec<DepMissing>),

    /// Unresolvable package conflicts.
    #[error("conflicting dependencies")]
    ConflictingDeps(Vec<Conflict>),

    /// File ownership conflicts found while preparing the commit.
    #[error("conflicting files")]
    FileConflicts(Vec<FileConflict>),

    /// Thrown when package archives failed to load or validate. Carries the
    /// offending archive filenames.
    #[error("invalid or corrupted package(s): {}", .0.join(" "))]
    InvalidPackages(Vec<String>),

    #[error("checksum mismatch for '{0}'")]
    ChecksumMismatch(String),

    #[error("missing detached signature for '{0}'")]
    MissingSignature(String),

    /// Thrown by the removability precheck when a package owns files the
    /// process cannot delete.
    #[error("cannot remove all files of package '{0}'")]
    PackageCantRemove(String),

    #[error("no servers configured for repo '{0}'")]
    ServerNone(String),

    #[error("transaction not initialized")]
    TransNotInitialized,

    #[error("transaction not prepared")]
    TransNotPrepared,

    #[error("duplicate target: {0}")]
    TransDupTarget(String),

    /// Set when the commit failed partway. The on-disk state is whatever
    /// the partial commit achieved; no rollback is attempted.
    #[error("transaction aborted")]
    TransAbort,

    #[error("not enough free disk space (need {needed} bytes, {available} available)")]
    DiskSpace { needed: u64, available: u64 },

    /// Wrapped [std I/O error][1]. Thrown when doing I/O operations, such
    /// as reading or writing files or directories.
    ///
    /// [1]: std::io::Error
    #[error("{message}")]
    Io {
        message: String,
        source: std::io::Error,
    },

    #[error("http {message}")]
    Http {
        message: String,
        source: Option<Box<ureq::Error>>,
    },

    #[error("bad regular expression, {0}")]
    Regex(regex::Error),

    #[error("bad glob pattern, {0}")]
    Glob(glob::PatternError),

    /// Wrapped possible [serde_json Error][1]. Thrown when (de)serializing
    /// JSON files.
    ///
    /// [1]: https://docs.serde.rs/serde_json/struct.Error.html
    #[error("{message}")]
    Serde {
        message: String,
        source: serde_json::Error,
    },
}

pub(crate) trait Context<T> {
    fn with_context<F>(self, f: F) -> Fallible<T>
    where
        F: FnOnce() -> String;
}

impl<T> Context<T> for std::io::Result<T> {
    fn with_context<F>(self, f: F) -> Fallible<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|source| Error::Io {
            message: f(),
            source,
        })
    }
}

impl<T> Context<T> for Result<T, ureq::Error> {
    fn with_context<F>(self, f: F) -> Fallible<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|source| Error::Http {
            message: f(),
            source: Some(Box::new(source)),
        })
    }
}

impl<T> Context<T> for serde_json::Result<T> {
    fn with_context<F>(self, f: F) -> Fallible<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|source| Error::Serde {
            message: f(),
            source,
        })
    }
}

impl From<regex::Error> for Error {
    fn from(source: regex::Error) -> Self {
        Error::Regex(source)
    }
}

impl From<glob::PatternError> for Error {
    fn from(source: glob::PatternError) -> Self {
        Error::Glob(source)
    }
}
