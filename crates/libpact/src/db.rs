//! The local database of installed packages and the cached sync repo
//! indexes.
//!
//! On-disk layout, under `<dbpath>`:
//!
//! ```text
//! local/<name>-<version>/desc      package record, JSON
//! local/<name>-<version>/files    sorted file list, one path per line
//! local/<name>-<version>/install  optional scriptlet
//! sync/<repo>.json                repo index, JSON array of records
//! ```

use std::cell::RefCell;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use rayon::prelude::{ParallelBridge, ParallelIterator};
use tracing::{debug, warn};

use crate::config::{RepoConfig, SigLevel};
use crate::error::{Context, Error, Fallible};
use crate::package::{FileEntry, Package, PackageOrigin};

/// Validity of a sync database.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DbStatus {
    Valid,
    Invalid,
    Missing,
}

/// The on-disk record of currently installed packages.
#[derive(Debug)]
pub struct LocalDb {
    path: PathBuf,
    cache: RefCell<Option<Rc<Vec<Package>>>>,
}

impl LocalDb {
    pub(crate) fn new(path: PathBuf) -> LocalDb {
        LocalDb {
            path,
            cache: RefCell::new(None),
        }
    }

    /// A snapshot of all installed packages, sorted by name. The snapshot
    /// stays valid across database mutations; re-query for fresh state.
    pub fn packages(&self) -> Fallible<Rc<Vec<Package>>> {
        if let Some(cache) = self.cache.borrow().as_ref() {
            return Ok(Rc::clone(cache));
        }
        let pkgs = Rc::new(self.load()?);
        *self.cache.borrow_mut() = Some(Rc::clone(&pkgs));
        Ok(pkgs)
    }

    /// Look up one installed package by name.
    pub fn package(&self, name: &str) -> Fallible<Option<Package>> {
        Ok(self
            .packages()?
            .iter()
            .find(|p| p.name == name)
            .cloned())
    }

    fn load(&self) -> Fallible<Vec<Package>> {
        if !self.path.is_dir() {
            return Ok(vec![]);
        }
        let mut pkgs = self
            .path
            .read_dir()
            .with_context(|| format!("failed to read local db {}", self.path.display()))?
            .par_bridge()
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| match read_entry(&entry.path()) {
                Ok(pkg) => Some(pkg),
                Err(err) => {
                    warn!("skipping broken local db entry {:?}: {}", entry.file_name(), err);
                    None
                }
            })
            .collect::<Vec<_>>();
        pkgs.sort_by(|a, b| a.name.cmp(&b.name));
        debug!("loaded {} local package(s)", pkgs.len());
        Ok(pkgs)
    }

    pub(crate) fn entry_path(&self, pkg: &Package) -> PathBuf {
        self.path.join(pkg.ident())
    }

    pub(crate) fn scriptlet_path(&self, pkg: &Package) -> PathBuf {
        self.entry_path(pkg).join("install")
    }

    /// Write the database entry for a freshly installed package.
    pub(crate) fn register(&self, pkg: &Package) -> Fallible<()> {
        let dir = self.entry_path(pkg);
        crate::internal::fs::ensure_dir(&dir)
            .with_context(|| format!("failed to create db entry {}", dir.display()))?;

        let desc = dir.join("desc");
        let record = serde_json::to_vec_pretty(pkg)
            .with_context(|| format!("failed to serialize record for {}", pkg.name))?;
        std::fs::write(&desc, record)
            .with_context(|| format!("failed to write {}", desc.display()))?;

        let files = dir.join("files");
        let mut out = std::io::BufWriter::new(
            std::fs::File::create(&files)
                .with_context(|| format!("failed to write {}", files.display()))?,
        );
        for entry in pkg.files.iter() {
            writeln!(out, "{}\t{:o}\t{}", entry.path, entry.mode, entry.size)
                .with_context(|| format!("failed to write {}", files.display()))?;
        }
        out.flush()
            .with_context(|| format!("failed to write {}", files.display()))?;

        self.invalidate();
        Ok(())
    }

    /// Drop the database entry of a removed package.
    pub(crate) fn unregister(&self, pkg: &Package) -> Fallible<()> {
        let dir = self.entry_path(pkg);
        if dir.is_dir() {
            remove_dir_all::remove_dir_all(&dir)
                .with_context(|| format!("failed to remove db entry {}", dir.display()))?;
        }
        self.invalidate();
        Ok(())
    }

    fn invalidate(&self) {
        *self.cache.borrow_mut() = None;
    }
}

fn read_entry(dir: &Path) -> Fallible<Package> {
    let desc = dir.join("desc");
    let buf = std::fs::read(&desc)
        .with_context(|| format!("failed to read {}", desc.display()))?;
    let mut pkg: Package = serde_json::from_slice(&buf)
        .with_context(|| format!("failed to parse {}", desc.display()))?;
    pkg.origin = PackageOrigin::LocalDb;
    pkg.files = read_files(&dir.join("files"))?;
    Ok(pkg)
}

fn read_files(path: &Path) -> Fallible<Vec<FileEntry>> {
    if !path.is_file() {
        return Ok(vec![]);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut files = content
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| {
            let mut parts = line.splitn(3, '\t');
            let path = parts.next().unwrap_or_default().to_owned();
            let mode = parts
                .next()
                .and_then(|m| u32::from_str_radix(m, 8).ok())
                .unwrap_or(0);
            let size = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
            FileEntry { path, mode, size }
        })
        .collect::<Vec<_>>();
    // the set algebra depends on this invariant
    files.sort_by(|a, b| a.path.cmp(&b.path));
    files.dedup_by(|a, b| a.path == b.path);
    Ok(files)
}

/// A sync repository's package index, fetched and cached locally.
#[derive(Debug)]
pub struct SyncDb {
    path: PathBuf,
    repo: RepoConfig,
    cache: RefCell<Option<Rc<Vec<Package>>>>,
}

impl SyncDb {
    pub(crate) fn new(dir: &Path, repo: RepoConfig) -> SyncDb {
        SyncDb {
            path: dir.join(format!("{}.json", repo.name)),
            repo,
            cache: RefCell::new(None),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.repo.name
    }

    #[inline]
    pub fn servers(&self) -> &[String] {
        &self.repo.servers
    }

    #[inline]
    pub fn sig_level(&self) -> SigLevel {
        self.repo.sig_level
    }

    pub(crate) fn file_path(&self) -> &Path {
        &self.path
    }

    pub fn status(&self) -> DbStatus {
        if !self.path.is_file() {
            return DbStatus::Missing;
        }
        match self.packages() {
            Ok(_) => DbStatus::Valid,
            Err(_) => DbStatus::Invalid,
        }
    }

    /// All packages of the repo, in index order.
    pub fn packages(&self) -> Fallible<Rc<Vec<Package>>> {
        if let Some(cache) = self.cache.borrow().as_ref() {
            return Ok(Rc::clone(cache));
        }
        if !self.path.is_file() {
            return Err(Error::DbNotFound(self.name().to_owned()));
        }
        let buf = std::fs::read(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let mut pkgs: Vec<Package> =
            serde_json::from_slice(&buf).map_err(|_| Error::DbInvalid(self.name().to_owned()))?;
        for pkg in pkgs.iter_mut() {
            pkg.origin = PackageOrigin::SyncDb;
            pkg.repo = Some(self.name().to_owned());
        }
        let pkgs = Rc::new(pkgs);
        *self.cache.borrow_mut() = Some(Rc::clone(&pkgs));
        Ok(pkgs)
    }

    /// Look up a package by literal name.
    pub fn package(&self, name: &str) -> Option<Package> {
        self.packages()
            .ok()?
            .iter()
            .find(|p| p.name == name)
            .cloned()
    }

    /// Member packages of a named group.
    pub fn group(&self, name: &str) -> Vec<Package> {
        self.packages()
            .map(|pkgs| {
                pkgs.iter()
                    .filter(|p| p.groups.iter().any(|g| g == name))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn invalidate(&self) {
        *self.cache.borrow_mut() = None;
    }
}
