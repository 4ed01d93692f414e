//! Operations that can be performed on a pact session.
//!
//! This module contains the publicly available surface frontends build
//! on: the transaction lifecycle, package queries and repo refreshing.
//! Certain operations read or write pact's data, hence a session is
//! required to perform these functions.
//!
//! # Transaction lifecycle
//!
//! ```no_run
//! use libpact::{operation, Session, TransFlag};
//! let session = Session::new().expect("failed to create session");
//! operation::trans_init(&session, vec![]).expect("failed to lock db");
//! operation::trans_sync_targets(&session, &["ripgrep"]).expect("unknown target");
//! operation::trans_prepare(&session).expect("failed to plan");
//! operation::trans_commit(&session).expect("failed to commit");
//! operation::trans_release(&session).expect("failed to release");
//! ```

use std::collections::HashSet;
use std::path::Path;

use regex::RegexBuilder;

use crate::error::Fallible;
use crate::package::Package;
use crate::trans::{self, TransFlag, TransSummary};
use crate::{download, sync, Session};

/// Initialize a transaction, acquiring the database lock unless
/// [`TransFlag::NoLock`] is given.
///
/// # Errors
///
/// A [`HandleLock`][1] error will be returned if another transaction
/// holds the lock.
///
/// [1]: crate::Error::HandleLock
pub fn trans_init(session: &Session, flags: Vec<TransFlag>) -> Fallible<()> {
    trans::init(session, flags)
}

/// Add sync targets by name. Group names expand to their members.
pub fn trans_sync_targets(session: &Session, names: &[&str]) -> Fallible<()> {
    // remove possible duplicates, keeping the requested order (planning
    // must stay deterministic)
    let mut seen = HashSet::new();
    for name in names.iter().copied() {
        if seen.insert(name) {
            trans::add_sync_target(session, name)?;
        }
    }
    Ok(())
}

/// Add a package archive on disk as an install target.
pub fn trans_file_target(session: &Session, path: &Path) -> Fallible<()> {
    trans::add_file_target(session, path)
}

/// Add installed packages as removal targets.
pub fn trans_remove_targets(session: &Session, names: &[&str]) -> Fallible<()> {
    let mut seen = HashSet::new();
    for name in names.iter().copied() {
        if seen.insert(name) {
            trans::add_remove_target(session, name)?;
        }
    }
    Ok(())
}

/// Schedule an upgrade (or, when enabled, downgrade/replacement) for
/// every installed package with a newer sync candidate.
pub fn trans_sysupgrade(session: &Session, enable_downgrade: bool) -> Fallible<()> {
    let mut t = session.trans_take()?;
    let ret = sync::sysupgrade(session, &mut t, enable_downgrade);
    session.trans_restore(t);
    ret
}

/// Plan the transaction: resolve dependencies, detect conflicts, compute
/// the execution order and download sizes.
///
/// Plan-phase failures are recoverable; the caller may adjust targets and
/// retry. Structured diagnostics ride in the error variants
/// ([`UnsatisfiedDeps`][1], [`ConflictingDeps`][2]).
///
/// [1]: crate::Error::UnsatisfiedDeps
/// [2]: crate::Error::ConflictingDeps
pub fn trans_prepare(session: &Session) -> Fallible<()> {
    trans::prepare(session)
}

/// What the prepared transaction will do, for rendering a confirmation.
pub fn trans_summary(session: &Session) -> Fallible<TransSummary> {
    trans::summary(session)
}

/// Execute the prepared transaction: download, validate, then mutate the
/// filesystem and the database. Removals strictly precede installs.
pub fn trans_commit(session: &Session) -> Fallible<()> {
    trans::commit(session)
}

/// Drop the transaction and release the database lock.
pub fn trans_release(session: &Session) -> Fallible<()> {
    trans::release(session)
}

/// Options that may be used to tweak the behavior of package queries.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum QueryOption {
    /// Exact name match; regex is disabled.
    Explicit,
    /// Also match against package descriptions.
    Description,
}

/// Query packages by name, against the local db or the sync repos.
///
/// # Returns
///
/// A list of packages that match any query, sorted by name. An empty
/// query list matches everything.
pub fn package_query(
    session: &Session,
    queries: &[&str],
    options: &[QueryOption],
    installed: bool,
) -> Fallible<Vec<Package>> {
    let explicit = options.contains(&QueryOption::Explicit);
    let with_description = options.contains(&QueryOption::Description);

    let mut pool: Vec<Package> = if installed {
        session.local_db().packages()?.as_ref().clone()
    } else {
        let mut pool = vec![];
        for db in session.sync_dbs() {
            for pkg in db.packages()?.iter() {
                // the first repo carrying a name wins
                if Package::find_by_name(&pool, &pkg.name).is_none() {
                    pool.push(pkg.clone());
                }
            }
        }
        pool
    };

    if !queries.is_empty() {
        if explicit {
            pool.retain(|p| queries.contains(&p.name.as_str()));
        } else {
            let mut regexes = vec![];
            for query in queries {
                regexes.push(RegexBuilder::new(query).case_insensitive(true).build()?);
            }
            pool.retain(|p| {
                regexes.iter().any(|re| {
                    re.is_match(&p.name)
                        || (with_description
                            && p.description.as_deref().map(|d| re.is_match(d)).unwrap_or(false))
                })
            });
        }
    }

    pool.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(pool)
}

/// Installed packages with a newer sync candidate, paired with it.
pub fn package_upgradable(session: &Session) -> Fallible<Vec<(Package, Package)>> {
    let local = session.local_db().packages()?;
    let mut ret = vec![];
    for lpkg in local.iter() {
        if let Some(spkg) = sync::newversion(session, lpkg) {
            ret.push((lpkg.clone(), spkg));
        }
    }
    Ok(ret)
}

/// Refresh every configured repo's index from its mirrors.
pub fn repo_refresh(session: &Session) -> Fallible<()> {
    for db in session.sync_dbs() {
        download::fetch_index(session, db)?;
    }
    Ok(())
}

/// Get the configuration list.
///
/// # Returns
///
/// A string of the configuration list in pretty-printed JSON format.
pub fn config_list(session: &Session) -> Fallible<String> {
    session.config().pretty()
}

/// Set a configuration key. *
///
/// # Errors
///
/// A [`ConfigInUse`][1] error will be returned if the config is borrowed
/// elsewhere.
///
/// [1]: crate::Error::ConfigInUse
pub fn config_set(session: &Session, key: &str, value: &str) -> Fallible<()> {
    session.config_mut()?.set(key, value)
}
