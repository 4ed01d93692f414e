//! The transaction: flags, state machine, target registration and the
//! driver tying planner, resolver, conflict detector and executors
//! together.

use std::cmp::Ordering;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{Error, Fallible};
use crate::event::{Event, PackageCtx};
use crate::internal::lock::LockFile;
use crate::package::version::vercmp;
use crate::package::{Package, PackageOrigin};
use crate::{deps, remove, sync, Session};

/// Behavior switches of a transaction.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum TransFlag {
    /// Skip all dependency checks and resolution.
    NoDeps,
    /// Bypass the file conflict scan.
    Force,
    /// Do not preserve modified backup files as `.pacsave` on removal.
    NoSave,
    /// Treat every dependency expression as unversioned.
    NoDepVersion,
    /// Removal pulls in every package depending on a target.
    Cascade,
    /// Removal pulls in target dependencies nothing else requires.
    Recurse,
    /// Touch only the database, never the filesystem.
    DbOnly,
    /// Record every installed package as a dependency.
    AllDeps,
    /// Stop after downloading and caching the archives.
    DownloadOnly,
    /// Do not run install scriptlets.
    NoScriptlet,
    /// Skip package-level conflict checks.
    NoConflicts,
    /// Silently drop sync targets that are already up to date.
    Needed,
    /// Record every installed package as explicitly requested.
    AllExplicit,
    /// Removal drops targets something else still needs.
    Unneeded,
    /// Like `Recurse`, but explicitly installed dependencies are orphan
    /// candidates too.
    RecurseAll,
    /// Do not take the database lock.
    NoLock,
}

/// Transaction lifecycle. Any state may move to `Interrupted`; the commit
/// loops observe it at package boundaries and return early.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransState {
    Idle,
    Initialized,
    Prepared,
    Downloading,
    Committing,
    Committed,
    Interrupted,
}

/// A pending transaction. Owns working copies of every target package;
/// comparisons against db caches are by name.
#[derive(Debug)]
pub struct Transaction {
    flags: Vec<TransFlag>,
    pub(crate) state: TransState,
    /// Candidates to install, topologically ordered after prepare.
    pub(crate) add: Vec<Package>,
    /// Packages to uninstall, dependent-first after prepare.
    pub(crate) remove: Vec<Package>,
    /// Glob list of paths whose removal is suppressed on commit.
    pub(crate) skip_remove: Vec<String>,
    /// Targets set aside during resolution. Kept alive until release so
    /// references held by the frontend stay valid.
    pub(crate) unresolvable: Vec<Package>,
    /// Held for the transaction's whole lifetime unless `NoLock`.
    _lock: Option<LockFile>,
}

impl Transaction {
    pub fn has_flag(&self, flag: TransFlag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn state(&self) -> TransState {
        self.state
    }

    pub(crate) fn dup_target_check(&self, name: &str) -> Fallible<()> {
        if Package::find_by_name(&self.add, name).is_some()
            || Package::find_by_name(&self.remove, name).is_some()
        {
            return Err(Error::TransDupTarget(name.to_owned()));
        }
        Ok(())
    }
}

/// What a prepared transaction will do, for the frontend to render and
/// confirm.
#[derive(Clone, Debug, Default)]
pub struct TransSummary {
    pub install: Vec<InstallSummary>,
    pub remove: Vec<String>,
    pub download_size: u64,
}

#[derive(Clone, Debug)]
pub struct InstallSummary {
    pub name: String,
    pub new_version: String,
    pub old_version: Option<String>,
    pub repo: Option<String>,
    pub download_size: u64,
}

/// Initialize a transaction on the session, acquiring the database lock.
pub(crate) fn init(session: &Session, flags: Vec<TransFlag>) -> Fallible<()> {
    let lock = if flags.contains(&TransFlag::NoLock) {
        None
    } else {
        Some(LockFile::acquire(session.config().lock_path())?)
    };
    let skip_remove = session.config().skip_remove().to_vec();
    session.trans_put(Transaction {
        flags,
        state: TransState::Initialized,
        add: vec![],
        remove: vec![],
        skip_remove,
        unresolvable: vec![],
        _lock: lock,
    })
}

fn with_trans<T>(
    session: &Session,
    f: impl FnOnce(&mut Transaction) -> Fallible<T>,
) -> Fallible<T> {
    let mut trans = session.trans_take()?;
    let ret = f(&mut trans);
    session.trans_restore(trans);
    ret
}

/// Add a sync target by name. The name is looked up as a literal package
/// in repo order first, then as a group, which expands to its members.
pub(crate) fn add_sync_target(session: &Session, name: &str) -> Fallible<()> {
    with_trans(session, |trans| {
        if trans.state != TransState::Initialized {
            return Err(Error::TransNotInitialized);
        }

        for db in session.sync_dbs() {
            if let Some(pkg) = db.package(name) {
                return push_sync_target(session, trans, pkg);
            }
        }

        // group expansion: first repo defining a member wins per member
        let mut members: Vec<Package> = vec![];
        for db in session.sync_dbs() {
            for pkg in db.group(name) {
                if Package::find_by_name(&members, &pkg.name).is_none() {
                    members.push(pkg);
                }
            }
        }
        if members.is_empty() {
            return Err(Error::PackageNotFound {
                queries: vec![name.to_owned()],
            });
        }
        for pkg in members {
            if deps::should_ignore(session, &pkg) {
                let install = session.ask(
                    Event::PromptInstallIgnored(PackageCtx {
                        name: pkg.name.clone(),
                        version: pkg.version.clone(),
                    }),
                    false,
                    |event| match event {
                        Event::PromptInstallIgnoredResult(answer) => Some(answer),
                        _ => None,
                    },
                );
                if !install {
                    continue;
                }
            }
            match push_sync_target(session, trans, pkg) {
                Ok(()) | Err(Error::TransDupTarget(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    })
}

fn push_sync_target(session: &Session, trans: &mut Transaction, pkg: Package) -> Fallible<()> {
    trans.dup_target_check(&pkg.name)?;

    if trans.has_flag(TransFlag::Needed) {
        if let Some(local) = session.local_db().package(&pkg.name)? {
            if vercmp(&pkg.version, &local.version) != Ordering::Greater {
                session.emit(Event::TargetUpToDate(PackageCtx {
                    name: pkg.name.clone(),
                    version: local.version.clone(),
                }));
                debug!("{} is up to date -- skipping", pkg.name);
                return Ok(());
            }
        }
    }

    debug!("adding target {} to the transaction", pkg.ident());
    trans.add.push(pkg);
    Ok(())
}

/// Add a package archive on disk as an install target.
pub(crate) fn add_file_target(session: &Session, path: &Path) -> Fallible<()> {
    with_trans(session, |trans| {
        if trans.state != TransState::Initialized {
            return Err(Error::TransNotInitialized);
        }
        let pkg = crate::package::archive::load(path)?;
        trans.dup_target_check(&pkg.name)?;
        debug!("adding file target {} to the transaction", pkg.ident());
        trans.add.push(pkg);
        Ok(())
    })
}

/// Add an installed package as a removal target.
pub(crate) fn add_remove_target(session: &Session, name: &str) -> Fallible<()> {
    with_trans(session, |trans| {
        if trans.state != TransState::Initialized {
            return Err(Error::TransNotInitialized);
        }
        let pkg = session
            .local_db()
            .package(name)?
            .ok_or_else(|| Error::PackageNotFound {
                queries: vec![name.to_owned()],
            })?;
        trans.dup_target_check(&pkg.name)?;
        debug!("adding {} to the transaction remove list", pkg.ident());
        trans.remove.push(pkg);
        Ok(())
    })
}

/// Plan the transaction: resolve, detect conflicts, order.
pub(crate) fn prepare(session: &Session) -> Fallible<()> {
    with_trans(session, |trans| {
        if trans.state != TransState::Initialized {
            return Err(Error::TransNotInitialized);
        }
        if trans.add.is_empty() {
            remove::prepare(session, trans)?;
        } else {
            sync::prepare(session, trans)?;
        }
        trans.state = TransState::Prepared;
        Ok(())
    })
}

/// Execute the prepared transaction against the filesystem and database.
pub(crate) fn commit(session: &Session) -> Fallible<()> {
    with_trans(session, |trans| {
        if trans.state != TransState::Prepared {
            return Err(Error::TransNotPrepared);
        }
        let ret = if trans.add.is_empty() {
            remove::commit(session, trans)
        } else {
            sync::commit(session, trans)
        };
        if ret.is_ok() && trans.state != TransState::Interrupted {
            trans.state = TransState::Committed;
        }
        ret
    })
}

/// Drop the transaction, releasing the database lock. The `unresolvable`
/// set dies here and not earlier.
pub(crate) fn release(session: &Session) -> Fallible<()> {
    let trans = session.trans_take()?;
    debug!("releasing transaction in state {:?}", trans.state);
    drop(trans);
    Ok(())
}

pub(crate) fn summary(session: &Session) -> Fallible<TransSummary> {
    with_trans(session, |trans| {
        let local = session.local_db().packages()?;
        let install = trans
            .add
            .iter()
            .map(|pkg| InstallSummary {
                name: pkg.name.clone(),
                new_version: pkg.version.clone(),
                old_version: local
                    .iter()
                    .find(|l| l.name == pkg.name)
                    .map(|l| l.version.clone()),
                repo: pkg.repo.clone(),
                download_size: pkg.download_size,
            })
            .collect::<Vec<_>>();
        let remove = trans.remove.iter().map(|p| p.ident()).collect();
        let download_size = install.iter().map(|i| i.download_size).sum();
        Ok(TransSummary {
            install,
            remove,
            download_size,
        })
    })
}

/// Run one scriptlet hook function, if the script defines it.
///
/// The script is sourced by `sh` with the install root as working
/// directory. Hook failures are logged, never fatal: the package state has
/// already been decided by the time hooks run.
pub(crate) fn run_scriptlet(
    session: &Session,
    script: &Path,
    func: &str,
    new_version: Option<&str>,
    old_version: Option<&str>,
) {
    if !script.is_file() {
        return;
    }
    let mut args = String::new();
    if let Some(v) = new_version {
        args.push_str(&format!(" '{}'", v));
    }
    if let Some(v) = old_version {
        args.push_str(&format!(" '{}'", v));
    }
    let cmd = format!(
        ". '{}'; if type {} >/dev/null 2>&1; then {}{}; fi",
        script.display(),
        func,
        func,
        args
    );
    debug!("running scriptlet hook {}", func);
    let status = std::process::Command::new("sh")
        .arg("-c")
        .arg(&cmd)
        .current_dir(session.config().root_path())
        .status();
    match status {
        Ok(status) if status.success() => {}
        Ok(status) => warn!("scriptlet {} exited with {}", func, status),
        Err(err) => warn!("scriptlet {} failed to run: {}", func, err),
    }
}

/// The upgrade/replace predecessor of a target, when one is installed.
pub(crate) fn local_predecessor(session: &Session, pkg: &Package) -> Fallible<Option<Package>> {
    debug_assert!(pkg.origin != PackageOrigin::LocalDb);
    session.local_db().package(&pkg.name)
}
