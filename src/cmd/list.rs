use anyhow::Result;
use clap::ArgMatches;
use crossterm::style::Stylize;
use libpact::{operation, PackageReason, Session};

pub fn cmd_list(matches: &ArgMatches, session: &Session) -> Result<()> {
    if matches.get_flag("upgradable") {
        for (local, sync) in operation::package_upgradable(session)? {
            println!(
                "{} {} {}",
                local.name,
                local.version.clone().dark_grey(),
                format!("=> {}", sync.version).green()
            );
        }
        return Ok(());
    }

    for pkg in operation::package_query(session, &[], &[], true)? {
        let mut line = format!("{} {}", pkg.name, pkg.version.clone().dark_grey());
        if pkg.reason == PackageReason::Depend {
            line.push_str(&format!(" {}", "(dependency)".dark_grey()));
        }
        println!("{}", line);
    }
    Ok(())
}
