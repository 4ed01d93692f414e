//! Conflict detection: target vs target, target vs installed, and the
//! file ownership scan run right before commit.

use std::fmt;

use tracing::debug;

use crate::package::files;
use crate::package::{Depend, Package};
use crate::Session;

/// A package-level conflict between two named packages, carrying the
/// conflict expression that matched.
#[derive(Clone, Debug)]
pub struct Conflict {
    pub package1: String,
    pub package2: String,
    pub reason: Depend,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} conflicts with {} ({})",
            self.package1, self.package2, self.reason
        )
    }
}

/// Kind of a file conflict record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileConflictKind {
    /// Two transaction targets claim the same path.
    Target,
    /// A target clashes with the filesystem: the path is owned by an
    /// installed package that stays, or exists on disk unowned.
    Filesystem,
}

#[derive(Clone, Debug)]
pub struct FileConflict {
    /// The target at fault.
    pub target: String,
    pub kind: FileConflictKind,
    pub path: String,
    /// The other owner, when there is one.
    pub conflicting_target: Option<String>,
}

impl fmt::Display for FileConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, self.conflicting_target.as_deref()) {
            (FileConflictKind::Target, Some(other)) => write!(
                f,
                "{}: /{} exists in both '{}' and '{}'",
                self.target, self.path, self.target, other
            ),
            (_, Some(owner)) => write!(
                f,
                "{}: /{} exists in filesystem (owned by {})",
                self.target, self.path, owner
            ),
            (_, None) => write!(f, "{}: /{} exists in filesystem", self.target, self.path),
        }
    }
}

fn conflicts_between(a: &Package, b: &Package) -> Option<Depend> {
    a.conflicts
        .iter()
        .find(|dep| dep.satisfied_by(b))
        .or_else(|| b.conflicts.iter().find(|dep| dep.satisfied_by(a)))
        .cloned()
}

/// Conflicts among the target list itself, one record per unordered pair.
pub(crate) fn inner_conflicts(add: &[Package]) -> Vec<Conflict> {
    let mut ret = vec![];
    for (idx, p1) in add.iter().enumerate() {
        for p2 in add.iter().skip(idx + 1) {
            if let Some(reason) = conflicts_between(p1, p2) {
                debug!("inner conflict: {} <-> {}", p1.name, p2.name);
                ret.push(Conflict {
                    package1: p1.name.clone(),
                    package2: p2.name.clone(),
                    reason,
                });
            }
        }
    }
    ret
}

/// Conflicts between targets and installed packages that are neither being
/// upgraded away nor already elected for removal. `package1` is always the
/// target, `package2` the installed package.
pub(crate) fn outer_conflicts(local: &[Package], add: &[Package]) -> Vec<Conflict> {
    let mut ret = vec![];
    for spkg in add.iter() {
        for lpkg in local.iter() {
            if lpkg.name == spkg.name || Package::find_by_name(add, &lpkg.name).is_some() {
                continue;
            }
            if let Some(reason) = conflicts_between(spkg, lpkg) {
                debug!("outer conflict: {} <-> {}", spkg.name, lpkg.name);
                ret.push(Conflict {
                    package1: spkg.name.clone(),
                    package2: lpkg.name.clone(),
                    reason,
                });
            }
        }
    }
    ret
}

/// Scan for file ownership conflicts.
///
/// Phase one compares targets pairwise; phase two compares each target's
/// incoming files (for upgrades: only the files its installed predecessor
/// does not already own) against the local database and the live
/// filesystem. Directories are shared namespace and never conflict.
pub(crate) fn find_file_conflicts(
    session: &Session,
    add: &[Package],
    remove: &[Package],
) -> crate::Fallible<Vec<FileConflict>> {
    let mut ret = vec![];
    let config = session.config();
    let root = config.root_path().to_owned();
    drop(config);
    let local = session.local_db().packages()?;

    for (idx, p1) in add.iter().enumerate() {
        for p2 in add.iter().skip(idx + 1) {
            for entry in files::intersection(&p1.files, &p2.files) {
                ret.push(FileConflict {
                    target: p1.name.clone(),
                    kind: FileConflictKind::Target,
                    path: entry.path.clone(),
                    conflicting_target: Some(p2.name.clone()),
                });
            }
        }
    }

    for p1 in add.iter() {
        let oldpkg = local.iter().find(|l| l.name == p1.name);
        let incoming = match oldpkg {
            Some(old) => files::difference(&p1.files, &old.files),
            None => p1.files.iter().filter(|f| !f.is_dir()).collect(),
        };

        for entry in incoming {
            let full = root.join(&entry.path);
            let meta = match std::fs::symlink_metadata(&full) {
                Ok(meta) => meta,
                Err(_) => continue,
            };
            if meta.is_dir() {
                continue;
            }

            let owner = local.iter().find(|l| {
                l.name != p1.name
                    && Package::find_by_name(remove, &l.name).is_none()
                    // an owner being upgraded either still owns the path in
                    // its new version (phase one caught that) or cedes it
                    && Package::find_by_name(add, &l.name).is_none()
                    && files::contains(&l.files, &entry.path).is_some()
            });

            match owner {
                Some(owner) => {
                    // replacement victims of this very target are fine
                    if Package::find_by_name(&p1.removes, &owner.name).is_some() {
                        continue;
                    }
                    ret.push(FileConflict {
                        target: p1.name.clone(),
                        kind: FileConflictKind::Filesystem,
                        path: entry.path.clone(),
                        conflicting_target: Some(owner.name.clone()),
                    });
                }
                None => ret.push(FileConflict {
                    target: p1.name.clone(),
                    kind: FileConflictKind::Filesystem,
                    path: entry.path.clone(),
                    conflicting_target: None,
                }),
            }
        }
    }

    Ok(ret)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::package::Package;

    fn pkg(name: &str, version: &str, conflicts: &[&str], provides: &[&str]) -> Package {
        let mut p = Package::synthetic(name, version);
        p.conflicts = conflicts.iter().map(|c| c.parse().unwrap()).collect();
        p.provides = provides.iter().map(|c| c.parse().unwrap()).collect();
        p
    }

    #[test]
    fn test_inner_conflicts() {
        let add = vec![
            pkg("iptables", "1.8-1", &["iptables-nft"], &[]),
            pkg("iptables-nft", "1.8-1", &[], &[]),
            pkg("bash", "5.0-1", &[], &[]),
        ];
        let found = inner_conflicts(&add);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].package1, "iptables");
        assert_eq!(found[0].package2, "iptables-nft");
    }

    #[test]
    fn test_inner_conflicts_versioned() {
        let add = vec![
            pkg("a", "1.0-1", &["b<2"], &[]),
            pkg("b", "2.0-1", &[], &[]),
        ];
        assert!(inner_conflicts(&add).is_empty());
    }

    #[test]
    fn test_outer_conflicts() {
        let local = vec![
            pkg("sysvinit", "2.88-1", &[], &[]),
            pkg("unrelated", "1.0-1", &[], &[]),
        ];
        let add = vec![pkg("systemd", "230-1", &["sysvinit"], &[])];
        let found = outer_conflicts(&local, &add);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].package1, "systemd");
        assert_eq!(found[0].package2, "sysvinit");
    }

    #[test]
    fn test_outer_skips_upgraded_self() {
        // the installed version declaring a conflict with its own upgrade
        // must not fire
        let local = vec![pkg("foo", "1.0-1", &["foo<2"], &[])];
        let add = vec![pkg("foo", "2.0-1", &[], &[])];
        assert!(outer_conflicts(&local, &add).is_empty());
    }
}
