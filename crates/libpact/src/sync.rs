//! Sync transactions: the sysupgrade planner, dependency-resolving
//! prepare, and the downloading/validating/executing commit.

use std::cmp::Ordering;

use tracing::{debug, warn};

use crate::conflict;
use crate::db::{DbStatus, SyncDb};
use crate::deps::{self, DepMissing};
use crate::error::{Error, Fallible};
use crate::event::{ConflictCtx, CorruptedCtx, Event, ReplaceCtx};
use crate::package::version::vercmp;
use crate::package::{archive, Depend, Package, PackageOrigin, PackageReason, Validation};
use crate::trans::{TransFlag, TransState, Transaction};
use crate::{add, download, internal, remove, Session};

/// Check for a newer version of `pkg` in the sync repos; only the first
/// repo carrying the name is considered.
pub(crate) fn newversion(session: &Session, pkg: &Package) -> Option<Package> {
    for db in session.sync_dbs() {
        if let Some(spkg) = db.package(&pkg.name) {
            if vercmp(&spkg.version, &pkg.version) == Ordering::Greater {
                return Some(spkg);
            }
            debug!("no newer version of '{}' in {}", pkg.name, db.name());
            return None;
        }
    }
    None
}

/// Scan every installed package for upgrade, downgrade or replacement
/// candidates and schedule them on the transaction.
pub(crate) fn sysupgrade(
    session: &Session,
    trans: &mut Transaction,
    enable_downgrade: bool,
) -> Fallible<()> {
    if trans.state != TransState::Initialized {
        return Err(Error::TransNotInitialized);
    }

    debug!("checking for package upgrades");
    let local = session.local_db().packages()?;

    for lpkg in local.iter() {
        if Package::find_by_name(&trans.add, &lpkg.name).is_some() {
            debug!("{} is already in the target list -- skipping", lpkg.name);
            continue;
        }

        // literal first, then replacers, in each sync repo in order
        for db in session.sync_dbs() {
            if let Some(spkg) = db.package(&lpkg.name) {
                if check_literal(session, lpkg, &spkg, enable_downgrade) {
                    trans.add.push(spkg);
                }
                // the first repo carrying the literal settles the matter
                break;
            }
            if check_replacers(session, &mut trans.add, lpkg, db)? {
                break;
            }
        }
    }

    Ok(())
}

fn check_literal(
    session: &Session,
    lpkg: &Package,
    spkg: &Package,
    enable_downgrade: bool,
) -> bool {
    match vercmp(&spkg.version, &lpkg.version) {
        Ordering::Greater => {
            if deps::should_ignore(session, spkg) || deps::should_ignore(session, lpkg) {
                warn!(
                    "{}: ignoring package upgrade ({} => {})",
                    lpkg.name, lpkg.version, spkg.version
                );
                false
            } else {
                debug!("new version of '{}' found ({})", lpkg.name, spkg.version);
                true
            }
        }
        Ordering::Less if enable_downgrade => {
            if deps::should_ignore(session, spkg) || deps::should_ignore(session, lpkg) {
                warn!(
                    "{}: ignoring package downgrade ({} => {})",
                    lpkg.name, lpkg.version, spkg.version
                );
                false
            } else {
                warn!(
                    "{}: downgrading from version {} to version {}",
                    lpkg.name, lpkg.version, spkg.version
                );
                true
            }
        }
        Ordering::Less => {
            warn!(
                "{}: local ({}) is newer than {} ({})",
                lpkg.name,
                lpkg.version,
                spkg.repo.as_deref().unwrap_or("?"),
                spkg.version
            );
            false
        }
        Ordering::Equal => false,
    }
}

/// Search one repo for packages declaring they replace `lpkg`. Returns
/// whether a replacement was accepted; at most one replacer is chosen per
/// local package.
fn check_replacers(
    session: &Session,
    add: &mut Vec<Package>,
    lpkg: &Package,
    db: &SyncDb,
) -> Fallible<bool> {
    let pkgs = match db.packages() {
        Ok(pkgs) => pkgs,
        Err(_) => return Ok(false),
    };

    for spkg in pkgs.iter() {
        // only literal matches count for replacement
        let found = spkg
            .replaces
            .iter()
            .any(|rep| rep.satisfied_literally(lpkg));
        if !found {
            continue;
        }

        if deps::should_ignore(session, spkg) || deps::should_ignore(session, lpkg) {
            warn!(
                "ignoring package replacement ({}-{} => {}-{})",
                lpkg.name, lpkg.version, spkg.name, spkg.version
            );
            continue;
        }

        let doreplace = session.ask(
            Event::PromptReplacePackage(ReplaceCtx {
                oldpkg: lpkg.name.clone(),
                newpkg: spkg.name.clone(),
                repo: db.name().to_owned(),
            }),
            false,
            |event| match event {
                Event::PromptReplacePackageResult(answer) => Some(answer),
                _ => None,
            },
        );
        if !doreplace {
            continue;
        }

        match add.iter_mut().find(|t| t.name == spkg.name) {
            Some(tpkg) => {
                // multiple repos can carry the replacer's name
                if tpkg.repo.as_deref() != Some(db.name()) {
                    warn!("cannot replace {} by {}", lpkg.name, spkg.name);
                    continue;
                }
                debug!("appending {} to the removes list of {}", lpkg.name, tpkg.name);
                tpkg.removes.push(lpkg.clone());
                if lpkg.reason == PackageReason::Explicit {
                    tpkg.reason = PackageReason::Explicit;
                }
            }
            None => {
                let mut replacer = spkg.clone();
                replacer.reason = lpkg.reason;
                replacer.removes = vec![lpkg.clone()];
                debug!("adding replacement target {}", replacer.ident());
                add.push(replacer);
            }
        }
        return Ok(true);
    }

    Ok(false)
}

pub(crate) fn prepare(session: &Session, trans: &mut Transaction) -> Fallible<()> {
    let from_sync = trans
        .add
        .iter()
        .any(|p| p.origin == PackageOrigin::SyncDb);

    // all sync databases must be usable before planning against them
    for db in session.sync_dbs() {
        match db.status() {
            DbStatus::Valid => {}
            DbStatus::Invalid => return Err(Error::DbInvalid(db.name().to_owned())),
            DbStatus::Missing if from_sync => {
                return Err(Error::DbNotFound(db.name().to_owned()))
            }
            DbStatus::Missing => {}
        }
    }

    let no_dep_version = trans.has_flag(TransFlag::NoDepVersion);

    if !trans.has_flag(TransFlag::NoDeps) {
        session.emit(Event::ResolveDepsStart);
        debug!("resolving target's dependencies");

        let removals = trans
            .add
            .iter()
            .flat_map(|p| p.removes.iter().cloned())
            .collect::<Vec<_>>();

        // the fake local view: installed packages minus those the
        // transaction overwrites
        let local = session.local_db().packages()?;
        let localpkgs = local
            .iter()
            .filter(|l| Package::find_by_name(&trans.add, &l.name).is_none())
            .cloned()
            .collect::<Vec<_>>();

        let mut resolved: Vec<Package> = vec![];
        let mut data: Vec<DepMissing> = vec![];
        let mut unresolvable: Vec<Package> = vec![];

        for pkg in trans.add.iter() {
            let mark = resolved.len();
            if !deps::resolve_deps(
                session,
                &localpkgs,
                pkg,
                &trans.add,
                &mut resolved,
                &removals,
                &mut data,
                no_dep_version,
            ) {
                // roll the partial closure back and set the target aside
                resolved.truncate(mark);
                unresolvable.push(pkg.clone());
            }
        }

        if !unresolvable.is_empty() {
            let drop_them = session.ask(
                Event::PromptRemoveUnresolvable(
                    unresolvable.iter().map(|p| p.name.clone()).collect(),
                ),
                false,
                |event| match event {
                    Event::PromptRemoveUnresolvableResult(answer) => Some(answer),
                    _ => None,
                },
            );
            if !drop_them {
                return Err(Error::UnsatisfiedDeps(data));
            }
        }

        // transitive pulls carry the dependency reason
        for pkg in resolved.iter_mut() {
            if Package::find_by_name(&trans.add, &pkg.name).is_none() {
                pkg.reason = PackageReason::Depend;
            }
        }

        // keep unresolvable targets alive; frontends may hold references
        trans.unresolvable = unresolvable;
        trans.add = deps::sort_by_deps(resolved, false);
        session.emit(Event::ResolveDepsDone);
    }

    if !trans.has_flag(TransFlag::NoConflicts) {
        session.emit(Event::InterConflictsStart);
        debug!("looking for conflicts");
        let local = session.local_db().packages()?;

        // 1. conflicts within the target list
        for conflict in conflict::inner_conflicts(&trans.add) {
            let sync1 = Package::find_by_name(&trans.add, &conflict.package1).cloned();
            let sync2 = Package::find_by_name(&trans.add, &conflict.package2).cloned();
            let (sync1, sync2) = match (sync1, sync2) {
                (Some(a), Some(b)) => (a, b),
                // one of them already left the target list
                _ => continue,
            };

            let dep1 = Depend::new(&conflict.package1);
            let dep2 = Depend::new(&conflict.package2);
            let removee = if dep2.satisfied_by(&sync1) {
                sync2
            } else if dep1.satisfied_by(&sync2) {
                sync1
            } else {
                return Err(Error::ConflictingDeps(vec![conflict]));
            };

            warn!(
                "removing '{}' from target list because it conflicts with '{}'",
                removee.name,
                if removee.name == conflict.package1 {
                    &conflict.package2
                } else {
                    &conflict.package1
                }
            );
            trans.add.retain(|p| p.name != removee.name);
            trans.unresolvable.push(removee);
        }

        // 2. targets vs installed packages
        for conflict in conflict::outer_conflicts(&local, &trans.add) {
            // already elected for removal by some target?
            let elected = trans.add.iter().any(|spkg| {
                Package::find_by_name(&spkg.removes, &conflict.package2).is_some()
            });
            if elected {
                continue;
            }

            debug!(
                "package '{}' conflicts with '{}'",
                conflict.package1, conflict.package2
            );
            let doremove = session.ask(
                Event::PromptConflictRemove(ConflictCtx {
                    target: conflict.package1.clone(),
                    local: conflict.package2.clone(),
                    reason: conflict.reason.to_string(),
                }),
                false,
                |event| match event {
                    Event::PromptConflictRemoveResult(answer) => Some(answer),
                    _ => None,
                },
            );
            if !doremove {
                return Err(Error::ConflictingDeps(vec![conflict]));
            }

            debug!("electing '{}' for removal", conflict.package2);
            let lpkg = local
                .iter()
                .find(|l| l.name == conflict.package2)
                .cloned()
                .expect("outer conflict names an installed package");
            if let Some(spkg) = trans.add.iter_mut().find(|p| p.name == conflict.package1) {
                spkg.removes.push(lpkg);
            }
        }
        session.emit(Event::InterConflictsDone);
    }

    // flatten every target's removes list into the transaction
    for idx in 0..trans.add.len() {
        let removes = trans.add[idx].removes.clone();
        for rpkg in removes {
            if Package::find_by_name(&trans.remove, &rpkg.name).is_none() {
                debug!("adding '{}' to remove list", rpkg.name);
                trans.remove.push(rpkg);
            }
        }
    }

    if !trans.has_flag(TransFlag::NoDeps) {
        debug!("checking dependencies");
        let local = session.local_db().packages()?;
        let missing = deps::check_deps(&local, &trans.remove, &trans.add, true, no_dep_version);
        if !missing.is_empty() {
            return Err(Error::UnsatisfiedDeps(missing));
        }
    }

    for idx in 0..trans.add.len() {
        let size = compute_download_size(session, &trans.add[idx])?;
        trans.add[idx].download_size = size;
    }

    Ok(())
}

/// Bytes still to fetch for a sync package: zero when a finished archive
/// is cached, the remainder when a `.part` file exists, the full archive
/// size otherwise.
fn compute_download_size(session: &Session, pkg: &Package) -> Fallible<u64> {
    if pkg.origin != PackageOrigin::SyncDb {
        return Ok(0);
    }
    let filename = pkg
        .filename
        .as_deref()
        .ok_or_else(|| Error::InvalidPackages(vec![pkg.name.clone()]))?;

    if download::filecache_find(session, filename).is_some() {
        return Ok(0);
    }
    let part = format!("{}{}", filename, crate::constant::PART_SUFFIX);
    if let Some(path) = download::filecache_find(session, &part) {
        let have = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        debug!("using (package - .part) size for {}", pkg.name);
        return Ok(pkg.size.saturating_sub(have));
    }
    Ok(pkg.size)
}

pub(crate) fn commit(session: &Session, trans: &mut Transaction) -> Fallible<()> {
    download_packages(session, trans)?;

    // single retry: corrupted files the user allowed us to delete are
    // fetched and checked once more
    let mut retried = false;
    loop {
        let deleted = check_validity(session, trans)?;
        if deleted.is_empty() {
            break;
        }
        if retried {
            return Err(Error::InvalidPackages(deleted));
        }
        retried = true;
        for name in deleted.iter() {
            let pkg = Package::find_by_name(&trans.add, name)
                .expect("validity reported an unknown target");
            download_single(session, pkg)?;
        }
    }

    if trans.has_flag(TransFlag::DownloadOnly) {
        return Ok(());
    }

    load_packages(session, trans)?;

    trans.state = TransState::Committing;

    if !trans.has_flag(TransFlag::Force) && !trans.has_flag(TransFlag::DbOnly) {
        session.emit(Event::FileConflictsStart);
        debug!("looking for file conflicts");
        let conflicts = conflict::find_file_conflicts(session, &trans.add, &trans.remove)?;
        if !conflicts.is_empty() {
            return Err(Error::FileConflicts(conflicts));
        }
        session.emit(Event::FileConflictsDone);
    }

    if session.config().check_space() && !trans.has_flag(TransFlag::DbOnly) {
        session.emit(Event::DiskSpaceStart);
        debug!("checking available disk space");
        let local = session.local_db().packages()?;
        let mut needed: i64 = 0;
        for pkg in trans.add.iter() {
            needed += pkg.installed_size as i64;
            if let Some(old) = local.iter().find(|l| l.name == pkg.name) {
                needed -= old.installed_size as i64;
            }
        }
        for pkg in trans.remove.iter() {
            needed -= pkg.installed_size as i64;
        }
        internal::diskspace::check(session.config().root_path(), needed)?;
        session.emit(Event::DiskSpaceDone);
    }

    // conflicting and to-be-replaced packages go first, installs second
    if !trans.remove.is_empty() {
        debug!("removing conflicting and to-be-replaced packages");
        remove::remove_packages(session, trans, false)?;
    }

    debug!("installing packages");
    add::upgrade_packages(session, trans)
}

fn download_packages(session: &Session, trans: &mut Transaction) -> Fallible<()> {
    trans.state = TransState::Downloading;
    let mut errors = vec![];

    for db in session.sync_dbs() {
        let wanted = trans
            .add
            .iter()
            .filter(|p| {
                p.origin == PackageOrigin::SyncDb
                    && p.repo.as_deref() == Some(db.name())
                    && p.download_size > 0
            })
            .collect::<Vec<_>>();
        if wanted.is_empty() {
            continue;
        }
        if db.servers().is_empty() {
            return Err(Error::ServerNone(db.name().to_owned()));
        }

        session.emit(Event::RetrieveStart(db.name().to_owned()));
        for pkg in wanted {
            if let Err(err) = download_single(session, pkg) {
                warn!("failed to retrieve {}: {}", pkg.ident(), err);
                errors.push(pkg.filename.clone().unwrap_or_else(|| pkg.name.clone()));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidPackages(errors))
    }
}

fn download_single(session: &Session, pkg: &Package) -> Fallible<()> {
    let db = pkg
        .repo
        .as_deref()
        .and_then(|name| session.sync_db(name))
        .ok_or_else(|| Error::InvalidPackages(vec![pkg.name.clone()]))?;
    let filename = pkg
        .filename
        .as_deref()
        .ok_or_else(|| Error::InvalidPackages(vec![pkg.name.clone()]))?;
    download::fetch_from_servers(session, db.servers(), filename)
}

/// Validate the integrity of every cached archive the transaction will
/// install. Returns the names of packages whose corrupted archives were
/// deleted with the frontend's consent; an empty list means all good.
fn check_validity(session: &Session, trans: &Transaction) -> Fallible<Vec<String>> {
    session.emit(Event::IntegrityStart);
    debug!("checking package integrity");

    let mut corrupted: Vec<(String, String, std::path::PathBuf)> = vec![];
    for pkg in trans.add.iter() {
        if pkg.origin != PackageOrigin::SyncDb {
            // loaded straight from a file target, validated at load time
            continue;
        }
        let filename = pkg
            .filename
            .as_deref()
            .ok_or_else(|| Error::InvalidPackages(vec![pkg.name.clone()]))?;
        let path = match download::filecache_find(session, filename) {
            Some(path) => path,
            None => {
                corrupted.push((pkg.name.clone(), "missing archive".into(), Default::default()));
                continue;
            }
        };

        let sig_required = pkg
            .repo
            .as_deref()
            .and_then(|name| session.sync_db(name))
            .map(|db| db.sig_level() == crate::config::SigLevel::Required)
            .unwrap_or(false);
        if sig_required && !path.with_file_name(format!("{}.sig", filename)).is_file() {
            return Err(Error::MissingSignature(filename.to_owned()));
        }

        if let Err(reason) = verify_checksums(pkg, &path) {
            corrupted.push((pkg.name.clone(), reason.to_string(), path));
        }
    }

    session.emit(Event::IntegrityDone);

    if corrupted.is_empty() {
        return Ok(vec![]);
    }

    let mut deleted = vec![];
    let mut kept = vec![];
    for (name, reason, path) in corrupted {
        let doremove = session.ask(
            Event::PromptCorruptedDelete(CorruptedCtx {
                filename: path.display().to_string(),
                reason: reason.clone(),
            }),
            false,
            |event| match event {
                Event::PromptCorruptedDeleteResult(answer) => Some(answer),
                _ => None,
            },
        );
        if doremove && path.as_os_str().len() > 0 {
            let _ = std::fs::remove_file(&path);
            deleted.push(name);
        } else {
            kept.push(name);
        }
    }

    if kept.is_empty() {
        Ok(deleted)
    } else {
        Err(Error::InvalidPackages(kept))
    }
}

fn verify_checksums(pkg: &Package, path: &std::path::Path) -> Fallible<()> {
    let filename = || {
        pkg.filename
            .clone()
            .unwrap_or_else(|| pkg.name.clone())
    };
    if pkg.validation.contains(&Validation::Sha256) {
        if let Some(want) = pkg.sha256sum.as_deref() {
            if internal::checksum::sha256_file(path)? != want {
                return Err(Error::ChecksumMismatch(filename()));
            }
        }
    }
    if pkg.validation.contains(&Validation::Md5) {
        if let Some(want) = pkg.md5sum.as_deref() {
            if internal::checksum::md5_file(path)? != want {
                return Err(Error::ChecksumMismatch(filename()));
            }
        }
    }
    Ok(())
}

/// Replace every sync record in the target list with its archive, loaded
/// from the cache, carrying over the planned reason and removes list.
fn load_packages(session: &Session, trans: &mut Transaction) -> Fallible<()> {
    session.emit(Event::LoadStart);
    let mut errors = vec![];

    for pkg in trans.add.iter_mut() {
        if pkg.origin != PackageOrigin::SyncDb {
            continue;
        }
        let filename = match pkg.filename.as_deref() {
            Some(f) => f.to_owned(),
            None => {
                errors.push(pkg.name.clone());
                continue;
            }
        };
        let path = match download::filecache_find(session, &filename) {
            Some(path) => path,
            None => {
                errors.push(filename);
                continue;
            }
        };

        debug!("replacing index record with package file for target {}", pkg.name);
        match archive::load(&path) {
            Ok(mut loaded) => {
                loaded.reason = pkg.reason;
                loaded.removes = std::mem::take(&mut pkg.removes);
                loaded.repo = pkg.repo.clone();
                loaded.validation = pkg.validation.clone();
                *pkg = loaded;
            }
            Err(err) => {
                warn!("failed to load {}: {}", filename, err);
                errors.push(filename);
            }
        }
    }

    session.emit(Event::LoadDone);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidPackages(errors))
    }
}
