use anyhow::{anyhow, Result};
use clap::ArgMatches;
use libpact::operation::QueryOption;
use libpact::{operation, PackageReason, Session};

use crate::util;

pub fn cmd_info(matches: &ArgMatches, session: &Session) -> Result<()> {
    let name = matches
        .get_one::<String>("package")
        .map(|s| s.as_str())
        .unwrap_or_default();
    let installed = !matches.get_flag("sync");

    let found =
        operation::package_query(session, &[name], &[QueryOption::Explicit], installed)?;
    let pkg = found
        .first()
        .ok_or_else(|| anyhow!("could not find package '{}'", name))?;

    let joined = |deps: &[libpact::Depend]| {
        if deps.is_empty() {
            "None".to_owned()
        } else {
            deps.iter().map(|d| d.to_string()).collect::<Vec<_>>().join("  ")
        }
    };

    println!("Name            : {}", pkg.name);
    println!("Version         : {}", pkg.version);
    if let Some(repo) = &pkg.repo {
        println!("Repository      : {}", repo);
    }
    println!(
        "Description     : {}",
        pkg.description.as_deref().unwrap_or("None")
    );
    println!("URL             : {}", pkg.url.as_deref().unwrap_or("None"));
    if !pkg.groups.is_empty() {
        println!("Groups          : {}", pkg.groups.join("  "));
    }
    println!("Provides        : {}", joined(&pkg.provides));
    println!("Depends On      : {}", joined(&pkg.depends));
    println!("Optional Deps   : {}", joined(&pkg.optdepends));
    println!("Conflicts With  : {}", joined(&pkg.conflicts));
    println!("Replaces        : {}", joined(&pkg.replaces));
    if installed {
        println!(
            "Install Reason  : {}",
            match pkg.reason {
                PackageReason::Explicit => "Explicitly installed",
                PackageReason::Depend => "Installed as a dependency",
            }
        );
        println!("Installed Size  : {}", util::humansize(pkg.installed_size));
    } else {
        println!("Download Size   : {}", util::humansize(pkg.size));
    }
    println!("Has Scriptlet   : {}", if pkg.scriptlet { "Yes" } else { "No" });
    Ok(())
}
