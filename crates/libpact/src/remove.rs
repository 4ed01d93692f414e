//! Remove transactions: prepare (recursion, cascade, keep-needed) and the
//! file-removal executor.

use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::error::{Error, Fallible};
use crate::event::{Event, PackageCtx, ProgressCtx};
use crate::internal::{checksum, fs};
use crate::package::{files, FileEntry, Package};
use crate::trans::{self, TransFlag, TransState, Transaction};
use crate::{constant, deps, internal, Session};

pub(crate) fn prepare(session: &Session, trans: &mut Transaction) -> Fallible<()> {
    let db = session.local_db();

    if trans.has_flag(TransFlag::Recurse) && !trans.has_flag(TransFlag::Cascade) {
        debug!("finding removable dependencies");
        let local = db.packages()?;
        let recurse_all = trans.has_flag(TransFlag::RecurseAll);
        deps::recurse_deps(&local, &mut trans.remove, recurse_all);
    }

    let no_dep_version = trans.has_flag(TransFlag::NoDepVersion);
    if !trans.has_flag(TransFlag::NoDeps) {
        session.emit(Event::CheckDepsStart);
        debug!("looking for unsatisfied dependencies");
        let local = db.packages()?;
        let mut missing = deps::check_deps(&local, &trans.remove, &[], true, no_dep_version);

        if !missing.is_empty() {
            if trans.has_flag(TransFlag::Cascade) {
                // pull every blocking dependent until the set is closed
                while !missing.is_empty() {
                    for miss in missing.iter() {
                        if Package::find_by_name(&trans.remove, &miss.target).is_some() {
                            continue;
                        }
                        match local.iter().find(|l| l.name == miss.target) {
                            Some(info) => {
                                debug!("pulling {} in target list", info.name);
                                trans.remove.push(info.clone());
                            }
                            None => error!(
                                "could not find {} in database -- skipping",
                                miss.target
                            ),
                        }
                    }
                    missing =
                        deps::check_deps(&local, &trans.remove, &[], true, no_dep_version);
                }
            } else if trans.has_flag(TransFlag::Unneeded) {
                // drop the targets something else still needs
                while !missing.is_empty() {
                    for miss in missing.iter() {
                        let causing = match miss.causing_pkg.as_deref() {
                            Some(name) => name,
                            None => continue,
                        };
                        if let Some(pos) =
                            trans.remove.iter().position(|p| p.name == causing)
                        {
                            warn!("removing {} from target list", causing);
                            trans.remove.remove(pos);
                        }
                    }
                    missing =
                        deps::check_deps(&local, &trans.remove, &[], true, no_dep_version);
                }
            } else {
                return Err(Error::UnsatisfiedDeps(missing));
            }
        }
    }

    // dependents first
    debug!("sorting by dependencies");
    trans.remove = deps::sort_by_deps(std::mem::take(&mut trans.remove), true);

    // cascade plus recurse: sweep the orphans the cascade created
    if trans.has_flag(TransFlag::Cascade) && trans.has_flag(TransFlag::Recurse) {
        debug!("finding removable dependencies");
        let local = db.packages()?;
        let recurse_all = trans.has_flag(TransFlag::RecurseAll);
        deps::recurse_deps(&local, &mut trans.remove, recurse_all);
        trans.remove = deps::sort_by_deps(std::mem::take(&mut trans.remove), true);
    }

    if !trans.has_flag(TransFlag::NoDeps) {
        session.emit(Event::CheckDepsDone);
    }

    Ok(())
}

pub(crate) fn commit(session: &Session, trans: &mut Transaction) -> Fallible<()> {
    remove_packages(session, trans, true)
}

/// Apply the ordered removals. Failures mark the transaction aborted but
/// do not stop the loop; `ldconfig` is refused after any failure.
pub(crate) fn remove_packages(
    session: &Session,
    trans: &mut Transaction,
    run_ldconfig: bool,
) -> Fallible<()> {
    let pkg_count = trans.remove.len();
    let mut run_ldconfig = run_ldconfig;
    let mut ret = Ok(());

    let targets = trans.remove.clone();
    for (idx, pkg) in targets.iter().enumerate() {
        if session.interrupted() {
            trans.state = TransState::Interrupted;
            return ret;
        }

        if let Err(err) = remove_single_package(session, trans, pkg, None, idx + 1, pkg_count) {
            error!("could not remove {}: {}", pkg.ident(), err);
            run_ldconfig = false;
            ret = Err(Error::TransAbort);
        }
    }

    if run_ldconfig {
        internal::ldconfig(session.config().root_path());
    }

    ret
}

/// Remove one package from the filesystem and the database.
///
/// When `newpkg` is given this is the remove-half of an upgrade: progress
/// events and scriptlets are owned by the upgrade orchestrator and
/// suppressed here, and the files the new package keeps are protected.
pub(crate) fn remove_single_package(
    session: &Session,
    trans: &Transaction,
    oldpkg: &Package,
    newpkg: Option<&Package>,
    targ_count: usize,
    pkg_count: usize,
) -> Fallible<()> {
    let db = session.local_db();
    let scriptlet = db.scriptlet_path(oldpkg);
    let run_scripts = newpkg.is_none()
        && oldpkg.scriptlet
        && !trans.has_flag(TransFlag::NoScriptlet);

    if newpkg.is_some() {
        debug!("removing old package first ({})", oldpkg.ident());
    } else {
        session.emit(Event::RemoveStart(PackageCtx {
            name: oldpkg.name.clone(),
            version: oldpkg.version.clone(),
        }));
        debug!("removing package {}", oldpkg.ident());
        if run_scripts {
            trans::run_scriptlet(session, &scriptlet, "pre_remove", Some(&oldpkg.version), None);
        }
    }

    if !trans.has_flag(TransFlag::DbOnly) {
        remove_package_files(session, trans, oldpkg, newpkg, targ_count, pkg_count)?;
    }

    if run_scripts {
        trans::run_scriptlet(session, &scriptlet, "post_remove", Some(&oldpkg.version), None);
    }

    if newpkg.is_none() {
        session.emit(Event::RemoveDone(PackageCtx {
            name: oldpkg.name.clone(),
            version: oldpkg.version.clone(),
        }));
    }

    debug!("removing database entry '{}'", oldpkg.name);
    if let Err(err) = db.unregister(oldpkg) {
        error!(
            "could not remove database entry {}: {}",
            oldpkg.ident(),
            err
        );
    }

    Ok(())
}

/// Unlink a package's files in reverse sorted order (children before
/// parents). Per-file failures are warnings; the count of failures is
/// returned for the caller to fold into its partial-success accounting.
fn remove_package_files(
    session: &Session,
    trans: &Transaction,
    oldpkg: &Package,
    newpkg: Option<&Package>,
    targ_count: usize,
    pkg_count: usize,
) -> Fallible<usize> {
    let nosave = trans.has_flag(TransFlag::NoSave);

    let mut skip = trans.skip_remove.clone();
    if let Some(new) = newpkg {
        // files moving ownership to the replacement must survive this
        // removal: its backup paths and everything both packages own
        for backup in new.backup.iter() {
            if files::contains(&new.files, &backup.path).is_some() {
                debug!("adding {} to the skip_remove array", backup.path);
                skip.push(backup.path.clone());
            }
        }
        for entry in files::intersection(&oldpkg.files, &new.files) {
            skip.push(entry.path.clone());
        }
    }
    let patterns = skip
        .iter()
        .filter_map(|s| glob::Pattern::new(s).ok())
        .collect::<Vec<_>>();

    // removability precheck, before the first unlink
    for file in oldpkg.files.iter() {
        if !can_remove_file(session, file, &patterns) {
            debug!(
                "not removing package '{}', can't remove all files",
                oldpkg.name
            );
            return Err(Error::PackageCantRemove(oldpkg.name.clone()));
        }
    }

    debug!("removing {} files", oldpkg.files.len());
    let total = oldpkg.files.len();
    let mut err = 0;

    for (idx, file) in oldpkg.files.iter().enumerate().rev() {
        if unlink_file(session, oldpkg, newpkg, file, &patterns, nosave).is_err() {
            err += 1;
        }
        if newpkg.is_none() && total > 0 {
            session.emit(Event::RemoveProgress(ProgressCtx {
                name: oldpkg.name.clone(),
                percent: (((total - idx) * 100) / total) as u8,
                current: targ_count,
                total: pkg_count,
            }));
        }
    }

    Ok(err)
}

/// Can this file be deleted?
///
/// Plain permission failures (`EACCES`) and busy executables (`ETXTBSY`)
/// are deliberately ignored, as is anything that does not exist; only a
/// real obstruction such as a read-only filesystem fails the precheck.
fn can_remove_file(session: &Session, file: &FileEntry, skip: &[glob::Pattern]) -> bool {
    if skip.iter().any(|p| p.matches(&file.path)) {
        // never actually removed, so always "removable"
        return true;
    }
    let path = session.config().root_path().join(&file.path);
    match fs::writable(&path) {
        Ok(()) => true,
        Err(errno) => {
            if errno != libc::EACCES && errno != libc::ETXTBSY && path.exists() {
                error!("cannot remove file '{}' (errno {})", path.display(), errno);
                false
            } else {
                true
            }
        }
    }
}

fn pacsave_path(file: &Path) -> PathBuf {
    let mut s = file.as_os_str().to_owned();
    s.push(constant::PACSAVE_SUFFIX);
    PathBuf::from(s)
}

/// Unlink one file, backing it up if necessary. `Ok` covers both removal
/// and a legitimate skip; `Err` means the filesystem refused.
fn unlink_file(
    session: &Session,
    oldpkg: &Package,
    newpkg: Option<&Package>,
    fileobj: &FileEntry,
    skip: &[glob::Pattern],
    nosave: bool,
) -> Result<(), ()> {
    let file = session.config().root_path().join(&fileobj.path);

    if skip.iter().any(|p| p.matches(&fileobj.path)) {
        debug!("{} is in skip_remove, skipping removal", file.display());
        return Ok(());
    }

    // lstat: a directory symlink is handled as the link it is
    let meta = match std::fs::symlink_metadata(&file) {
        Ok(meta) => meta,
        Err(_) => {
            debug!("file {} does not exist", file.display());
            return Ok(());
        }
    };

    if meta.is_dir() {
        match fs::count_dir_entries(&file) {
            Some(n) if n > 0 => {
                debug!("keeping directory {} (contains files)", file.display());
            }
            None => {
                debug!("keeping directory {} (could not count files)", file.display());
            }
            Some(_) => {
                if newpkg
                    .map(|new| files::contains(&new.files, &fileobj.path).is_some())
                    .unwrap_or(false)
                {
                    debug!("keeping directory {} (in new package)", file.display());
                } else if directory_owned_elsewhere(session, oldpkg, &fileobj.path) {
                    debug!("keeping directory {} (owned by others)", file.display());
                } else {
                    match std::fs::remove_dir(&file) {
                        Ok(()) => debug!(
                            "removed directory {} (no remaining owners)",
                            file.display()
                        ),
                        Err(err) => {
                            warn!(
                                "directory removal of {} failed: {}",
                                file.display(),
                                err
                            );
                            return Err(());
                        }
                    }
                }
            }
        }
        Ok(())
    } else {
        // a modified backup file is preserved as .pacsave instead
        if let Some(backup) = oldpkg.backup.iter().find(|b| b.path == fileobj.path) {
            if nosave {
                debug!(
                    "transaction is set to NOSAVE, not backing up '{}'",
                    file.display()
                );
            } else if let Ok(hash) = checksum::md5_file(&file) {
                if hash != backup.hash {
                    let newpath = pacsave_path(&file);
                    return match std::fs::rename(&file, &newpath) {
                        Ok(()) => {
                            warn!("{} saved as {}", file.display(), newpath.display());
                            Ok(())
                        }
                        Err(err) => {
                            error!(
                                "could not rename {} to {} ({})",
                                file.display(),
                                newpath.display(),
                                err
                            );
                            Err(())
                        }
                    };
                }
            }
        }

        debug!("unlinking {}", file.display());
        std::fs::remove_file(&file).map_err(|err| {
            error!("cannot remove {} ({})", file.display(), err);
        })
    }
}

/// Does any other installed package own this directory? The removal list
/// holds duplicated records, so the comparison is by name.
fn directory_owned_elsewhere(session: &Session, oldpkg: &Package, path: &str) -> bool {
    match session.local_db().packages() {
        Ok(local) => local.iter().any(|pkg| {
            pkg.name != oldpkg.name && files::contains(&pkg.files, path).is_some()
        }),
        Err(_) => false,
    }
}
