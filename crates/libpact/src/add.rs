//! Install executor: ordered installation of loaded packages, database
//! registration, reason propagation and scriptlet wiring. Archive payload
//! handling itself lives in the archive codec.

use tracing::{debug, error, warn};

use crate::error::{Error, Fallible};
use crate::event::{Event, PackageCtx, ProgressCtx, UpgradeCtx};
use crate::package::{archive, Package, PackageReason};
use crate::trans::{self, TransFlag, TransState, Transaction};
use crate::{internal, remove, Session};

/// Install every target in order. All removals have already happened; a
/// same-name predecessor still installed at this point is an upgrade and
/// is taken down inline, without its own events.
pub(crate) fn upgrade_packages(session: &Session, trans: &mut Transaction) -> Fallible<()> {
    let pkg_count = trans.add.len();
    let mut errors = 0usize;

    let targets = trans.add.clone();
    for (idx, newpkg) in targets.iter().enumerate() {
        if session.interrupted() {
            trans.state = TransState::Interrupted;
            return if errors == 0 { Ok(()) } else { Err(Error::TransAbort) };
        }
        if let Err(err) = commit_single(session, trans, newpkg, idx + 1, pkg_count) {
            error!("could not install {}: {}", newpkg.ident(), err);
            errors += 1;
        }
    }

    if errors > 0 {
        // a half-committed install must not refresh the linker cache
        return Err(Error::TransAbort);
    }
    internal::ldconfig(session.config().root_path());
    Ok(())
}

fn commit_single(
    session: &Session,
    trans: &Transaction,
    newpkg: &Package,
    targ_count: usize,
    pkg_count: usize,
) -> Fallible<()> {
    let db = session.local_db();
    let oldpkg = trans::local_predecessor(session, newpkg)?;
    let is_upgrade = oldpkg.is_some();

    if let Some(old) = &oldpkg {
        session.emit(Event::UpgradeStart(UpgradeCtx {
            name: newpkg.name.clone(),
            old_version: old.version.clone(),
            new_version: newpkg.version.clone(),
        }));
        debug!("upgrading package {} ({} => {})", newpkg.name, old.version, newpkg.version);
    } else {
        session.emit(Event::AddStart(PackageCtx {
            name: newpkg.name.clone(),
            version: newpkg.version.clone(),
        }));
        debug!("adding package {}", newpkg.ident());
    }

    let archive_path = newpkg
        .archive_path
        .clone()
        .ok_or_else(|| Error::InvalidPackages(vec![newpkg.name.clone()]))?;

    let mut pkg = newpkg.clone();
    pkg.install_date = Some(chrono::Utc::now().timestamp());
    if trans.has_flag(TransFlag::AllDeps) {
        pkg.reason = PackageReason::Depend;
    } else if trans.has_flag(TransFlag::AllExplicit) {
        pkg.reason = PackageReason::Explicit;
    }

    // the scriptlet lands in the new db entry directory up front so the
    // pre hooks can run from it
    let run_scripts = pkg.scriptlet && !trans.has_flag(TransFlag::NoScriptlet);
    let scriptlet = db.scriptlet_path(&pkg);
    if run_scripts {
        crate::internal::fs::ensure_dir(&db.entry_path(&pkg)).ok();
        if let Err(err) = archive::extract_scriptlet(&archive_path, &scriptlet) {
            warn!("could not extract scriptlet of {}: {}", pkg.name, err);
        }
    }

    let old_backup = oldpkg.as_ref().map(|o| o.backup.clone()).unwrap_or_default();

    // the predecessor goes first; its events and scriptlets are ours
    if let Some(old) = &oldpkg {
        remove::remove_single_package(session, trans, old, Some(&pkg), 0, 0)?;
    }

    if run_scripts {
        if let Some(old) = &oldpkg {
            trans::run_scriptlet(
                session,
                &scriptlet,
                "pre_upgrade",
                Some(&pkg.version),
                Some(&old.version),
            );
        } else {
            trans::run_scriptlet(session, &scriptlet, "pre_install", Some(&pkg.version), None);
        }
    }

    let mut extract_errors = 0;
    if !trans.has_flag(TransFlag::DbOnly) {
        session.emit(Event::AddProgress(ProgressCtx {
            name: pkg.name.clone(),
            percent: 0,
            current: targ_count,
            total: pkg_count,
        }));

        let extracted = archive::extract(session, &pkg, &archive_path, &old_backup)?;
        extract_errors = extracted.errors;
        // record the shipped content hashes for the next upgrade/removal
        for backup in pkg.backup.iter_mut() {
            if let Some(done) = extracted.backup.iter().find(|b| b.path == backup.path) {
                backup.hash = done.hash.clone();
            }
        }

        session.emit(Event::AddProgress(ProgressCtx {
            name: pkg.name.clone(),
            percent: 100,
            current: targ_count,
            total: pkg_count,
        }));
    }

    db.register(&pkg)?;

    if run_scripts {
        if is_upgrade {
            trans::run_scriptlet(
                session,
                &scriptlet,
                "post_upgrade",
                Some(&pkg.version),
                oldpkg.as_ref().map(|o| o.version.as_str()),
            );
        } else {
            trans::run_scriptlet(session, &scriptlet, "post_install", Some(&pkg.version), None);
        }
    }

    if let Some(old) = &oldpkg {
        session.emit(Event::UpgradeDone(UpgradeCtx {
            name: pkg.name.clone(),
            old_version: old.version.clone(),
            new_version: pkg.version.clone(),
        }));
    } else {
        session.emit(Event::AddDone(PackageCtx {
            name: pkg.name.clone(),
            version: pkg.version.clone(),
        }));
    }

    if extract_errors > 0 {
        warn!(
            "{} file(s) of {} could not be extracted",
            extract_errors, pkg.name
        );
        return Err(Error::TransAbort);
    }
    Ok(())
}
