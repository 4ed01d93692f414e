//! Closed-world dependency resolution, dependency checking and the
//! dependency-respecting execution order.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};

use crate::event::{Event, ProviderCtx};
use crate::internal::dag::DepGraph;
use crate::package::{Depend, Package};
use crate::Session;

/// One unmet dependency expression, surfaced to the frontend.
#[derive(Clone, Debug)]
pub struct DepMissing {
    /// The package whose dependency is unmet.
    pub target: String,
    /// The unmet expression.
    pub depend: Depend,
    /// The package whose removal or upgrade breaks the dependency, when
    /// known.
    pub causing_pkg: Option<String>,
}

impl fmt::Display for DepMissing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.causing_pkg.as_deref() {
            Some(cause) => write!(
                f,
                "{}: requires {} (broken by {})",
                self.target, self.depend, cause
            ),
            None => write!(f, "{}: requires {}", self.target, self.depend),
        }
    }
}

/// First package of `pkgs` satisfying `dep`, literal name matches
/// preferred over providers.
pub(crate) fn find_satisfier<'a>(pkgs: &'a [Package], dep: &Depend) -> Option<&'a Package> {
    pkgs.iter()
        .find(|p| dep.satisfied_literally(p))
        .or_else(|| pkgs.iter().find(|p| dep.satisfied_by(p)))
}

fn removed(remove: &[Package], name: &str) -> bool {
    Package::find_by_name(remove, name).is_some()
}

/// Find dependency problems of a hypothetical future state: `local` with
/// `remove` gone and `upgrade` present instead of their same-name
/// predecessors.
///
/// With `reverse_deps`, dependencies of untouched installed packages that
/// the transaction would break are reported too, carrying the causing
/// package.
pub(crate) fn check_deps(
    local: &[Package],
    remove: &[Package],
    upgrade: &[Package],
    reverse_deps: bool,
    no_dep_version: bool,
) -> Vec<DepMissing> {
    let mut missing = vec![];

    // partition the installed set into the untouched remainder and the
    // packages the transaction modifies
    let (modified, dblist): (Vec<&Package>, Vec<&Package>) = local.iter().partition(|p| {
        removed(remove, &p.name) || Package::find_by_name(upgrade, &p.name).is_some()
    });
    let dblist = dblist.into_iter().cloned().collect::<Vec<_>>();

    let norm = |dep: &Depend| {
        if no_dep_version {
            dep.any_version()
        } else {
            dep.clone()
        }
    };

    // unsatisfied dependencies of the incoming packages
    for pkg in upgrade.iter() {
        for dep in pkg.depends.iter() {
            let dep = norm(dep);
            if find_satisfier(upgrade, &dep).is_none() && find_satisfier(&dblist, &dep).is_none() {
                missing.push(DepMissing {
                    target: pkg.name.clone(),
                    depend: dep,
                    causing_pkg: None,
                });
            }
        }
    }

    if reverse_deps {
        // dependencies of untouched packages this transaction would break
        for pkg in dblist.iter() {
            for dep in pkg.depends.iter() {
                let dep = norm(dep);
                let causing = modified.iter().find(|p| dep.satisfied_by(p));
                if let Some(causing) = causing {
                    if find_satisfier(upgrade, &dep).is_none()
                        && find_satisfier(&dblist, &dep).is_none()
                    {
                        missing.push(DepMissing {
                            target: pkg.name.clone(),
                            depend: dep,
                            causing_pkg: Some(causing.name.clone()),
                        });
                    }
                }
            }
        }
    }

    missing
}

pub(crate) fn should_ignore(session: &Session, pkg: &Package) -> bool {
    session.config().ignored().iter().any(|n| n == &pkg.name)
}

/// Recursively resolve the dependencies of `pkg` against the fake local
/// view, appending every package that must be pulled to `resolved`.
///
/// Returns `false` when some dependency could not be satisfied; diagnostics
/// accumulate in `data` and `resolved` keeps the partial closure (the
/// caller decides whether to drop the whole target).
#[allow(clippy::too_many_arguments)]
pub(crate) fn resolve_deps(
    session: &Session,
    localpkgs: &[Package],
    pkg: &Package,
    add: &[Package],
    resolved: &mut Vec<Package>,
    remove: &[Package],
    data: &mut Vec<DepMissing>,
    no_dep_version: bool,
) -> bool {
    // already handled, or already present and staying
    if Package::find_by_name(resolved, &pkg.name).is_some() {
        return true;
    }
    if localpkgs
        .iter()
        .any(|l| l.name == pkg.name && !removed(remove, &l.name))
    {
        return true;
    }

    resolved.push(pkg.clone());
    let mut ok = true;

    for dep in pkg.depends.iter() {
        let dep = if no_dep_version {
            dep.any_version()
        } else {
            dep.clone()
        };

        // satisfied by something installed and staying?
        if localpkgs
            .iter()
            .any(|l| dep.satisfied_by(l) && !removed(remove, &l.name))
        {
            continue;
        }
        // satisfied by something already selected?
        if find_satisfier(resolved, &dep).is_some() || find_satisfier(add, &dep).is_some() {
            continue;
        }

        match resolve_dep(session, &dep, add, resolved) {
            Some(candidate) => {
                debug!(
                    "pulling dependency {} (needed by {})",
                    candidate.ident(),
                    pkg.name
                );
                if !resolve_deps(
                    session, localpkgs, &candidate, add, resolved, remove, data, no_dep_version,
                ) {
                    ok = false;
                }
            }
            None => {
                warn!("cannot resolve \"{}\", a dependency of \"{}\"", dep, pkg.name);
                data.push(DepMissing {
                    target: pkg.name.clone(),
                    depend: dep.clone(),
                    causing_pkg: None,
                });
                ok = false;
            }
        }
    }

    ok
}

/// Select a package able to satisfy `dep`.
///
/// Candidate order: the current `add` list first, then each sync repo in
/// configured order. Within a repo a literal name match wins; otherwise
/// the providers are collected and, when more than one matches, the
/// frontend picks via the `SelectProvider` question (default: the first).
/// The local database contributes no candidates here: an installed,
/// not-being-removed satisfier short-circuits in [`resolve_deps`] before
/// any selection happens.
fn resolve_dep(
    session: &Session,
    dep: &Depend,
    add: &[Package],
    resolved: &[Package],
) -> Option<Package> {
    if let Some(pkg) = find_satisfier(add, dep) {
        return Some(pkg.clone());
    }

    for db in session.sync_dbs() {
        let pkgs = match db.packages() {
            Ok(pkgs) => pkgs,
            Err(_) => continue,
        };

        // name-duplicate targets are never allowed, skip candidates whose
        // name is already scheduled
        let usable = |p: &Package| Package::find_by_name(resolved, &p.name).is_none();

        if let Some(pkg) = pkgs
            .iter()
            .find(|p| dep.satisfied_literally(p) && usable(p))
        {
            if should_ignore(session, pkg) {
                let install = session.ask(
                    Event::PromptInstallIgnored(crate::event::PackageCtx {
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
            return Some(pkg.clone());
        }

        let providers = pkgs
            .iter()
            .filter(|p| p.satisfies(dep) && usable(p) && !should_ignore(session, p))
            .collect::<Vec<_>>();
        match providers.len() {
            0 => continue,
            1 => return Some(providers[0].clone()),
            _ => {
                let index = session.ask(
                    Event::PromptSelectProvider(ProviderCtx {
                        depend: dep.to_string(),
                        providers: providers.iter().map(|p| p.ident()).collect(),
                    }),
                    0,
                    |event| match event {
                        Event::PromptSelectProviderResult(index) => Some(index),
                        _ => None,
                    },
                );
                let chosen = providers.get(index).copied().unwrap_or(providers[0]);
                return Some(chosen.clone());
            }
        }
    }

    None
}

/// Stable dependency-respecting order of a target set.
///
/// Installation order: for every pair where x depends on y and both are in
/// the set, y comes first. `reverse` flips the result for removal
/// ordering (dependents before dependencies). Cycles are tolerated: a
/// warning is logged and the cycle members keep their input order.
pub(crate) fn sort_by_deps(pkgs: Vec<Package>, reverse: bool) -> Vec<Package> {
    let mut graph = DepGraph::<String>::new();
    for pkg in pkgs.iter() {
        graph.register_node(pkg.name.clone());
        for other in pkgs.iter() {
            if pkg.name != other.name && pkg.depends_on(other) {
                graph.register_dep(pkg.name.clone(), other.name.clone());
            }
        }
    }

    let (order, cyclic) = graph.walk_tolerant();
    if cyclic {
        warn!("dependency cycle detected; cycle members keep their input order");
    }

    let mut by_name: HashMap<String, Package> =
        pkgs.into_iter().map(|p| (p.name.clone(), p)).collect();
    let mut sorted = order
        .into_iter()
        .filter_map(|name| by_name.remove(&name))
        .collect::<Vec<_>>();
    if reverse {
        sorted.reverse();
    }
    sorted
}

/// Extend a removal target list with its orphaned dependencies: installed
/// packages only required by packages already on the list. With
/// `include_explicit`, explicitly installed orphans are pulled too.
pub(crate) fn recurse_deps(local: &[Package], targets: &mut Vec<Package>, include_explicit: bool) {
    loop {
        let mut pulled = vec![];
        for lpkg in local.iter() {
            if Package::find_by_name(targets, &lpkg.name).is_some() {
                continue;
            }
            if !include_explicit && lpkg.reason == crate::package::PackageReason::Explicit {
                continue;
            }
            // must be a dependency of something being removed
            if !targets.iter().any(|t| t.depends_on(lpkg)) {
                continue;
            }
            // and required by nothing that stays
            let needed = local.iter().any(|other| {
                other.name != lpkg.name
                    && Package::find_by_name(targets, &other.name).is_none()
                    && other.depends_on(lpkg)
            });
            if !needed {
                debug!("pulling removable dependency {}", lpkg.ident());
                pulled.push(lpkg.clone());
            }
        }
        if pulled.is_empty() {
            break;
        }
        targets.extend(pulled);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::package::{Package, PackageReason};

    fn pkg(name: &str, version: &str, depends: &[&str]) -> Package {
        let mut p = Package::synthetic(name, version);
        p.depends = depends.iter().map(|d| d.parse().unwrap()).collect();
        p
    }

    #[test]
    fn test_check_deps_remove_breakage() {
        let local = vec![pkg("a", "1.0-1", &["b"]), pkg("b", "1.0-1", &[])];
        let remove = vec![pkg("b", "1.0-1", &[])];
        let missing = check_deps(&local, &remove, &[], true, false);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].target, "a");
        assert_eq!(missing[0].causing_pkg.as_deref(), Some("b"));
    }

    #[test]
    fn test_check_deps_upgrade_satisfies() {
        let local = vec![pkg("a", "1.0-1", &["b>=2"]), pkg("b", "1.0-1", &[])];
        let upgrade = vec![pkg("b", "2.0-1", &[])];
        let missing = check_deps(&local, &[], &upgrade, true, false);
        assert!(missing.is_empty(), "{:?}", missing);
    }

    #[test]
    fn test_check_deps_incoming_unsatisfied() {
        let upgrade = vec![pkg("a", "1.0-1", &["nonexistent>=5"])];
        let missing = check_deps(&[], &[], &upgrade, false, false);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].depend.name, "nonexistent");
    }

    #[test]
    fn test_check_deps_no_dep_version() {
        let local = vec![pkg("b", "1.0-1", &[])];
        let upgrade = vec![pkg("a", "1.0-1", &["b>=9"])];
        assert_eq!(check_deps(&local, &[], &upgrade, false, false).len(), 1);
        assert!(check_deps(&local, &[], &upgrade, false, true).is_empty());
    }

    #[test]
    fn test_sort_by_deps() {
        let pkgs = vec![
            pkg("app", "1-1", &["libfoo", "libbar"]),
            pkg("libfoo", "1-1", &["libbar"]),
            pkg("libbar", "1-1", &[]),
        ];
        let order = sort_by_deps(pkgs.clone(), false)
            .into_iter()
            .map(|p| p.name)
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["libbar", "libfoo", "app"]);

        let reversed = sort_by_deps(pkgs, true)
            .into_iter()
            .map(|p| p.name)
            .collect::<Vec<_>>();
        assert_eq!(reversed, vec!["app", "libfoo", "libbar"]);
    }

    #[test]
    fn test_sort_by_deps_cycle_keeps_input_order() {
        let pkgs = vec![
            pkg("x", "1-1", &["y"]),
            pkg("y", "1-1", &["x"]),
        ];
        let order = sort_by_deps(pkgs, false)
            .into_iter()
            .map(|p| p.name)
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["x", "y"]);
    }

    #[test]
    fn test_recurse_deps_orphans() {
        let mut dep = pkg("leafdep", "1-1", &[]);
        dep.reason = PackageReason::Depend;
        let mut shared = pkg("shareddep", "1-1", &[]);
        shared.reason = PackageReason::Depend;
        let local = vec![
            pkg("target", "1-1", &["leafdep", "shareddep"]),
            pkg("other", "1-1", &["shareddep"]),
            dep,
            shared,
        ];

        let mut targets = vec![local[0].clone()];
        recurse_deps(&local, &mut targets, false);
        let names = targets.iter().map(|p| p.name.as_str()).collect::<Vec<_>>();
        // leafdep is orphaned, shareddep is still required by `other`
        assert!(names.contains(&"leafdep"));
        assert!(!names.contains(&"shareddep"));
    }

    #[test]
    fn test_recurse_deps_explicit_kept() {
        let explicit = pkg("explicitdep", "1-1", &[]);
        let local = vec![pkg("target", "1-1", &["explicitdep"]), explicit];
        let mut targets = vec![local[0].clone()];

        recurse_deps(&local, &mut targets, false);
        assert_eq!(targets.len(), 1);

        recurse_deps(&local, &mut targets, true);
        assert_eq!(targets.len(), 2);
    }
}
