use anyhow::Result;
use clap::ArgMatches;
use crossterm::style::Stylize;
use libpact::operation::QueryOption;
use libpact::{operation, Session};

pub fn cmd_search(matches: &ArgMatches, session: &Session) -> Result<()> {
    let queries = matches
        .get_many::<String>("query")
        .map(|v| v.map(|s| s.as_str()).collect::<Vec<_>>())
        .unwrap_or_default();

    let found =
        operation::package_query(session, &queries, &[QueryOption::Description], false)?;
    if found.is_empty() {
        println!("No matching packages.");
        return Ok(());
    }

    for pkg in found {
        println!(
            "{}/{} {}",
            pkg.repo.as_deref().unwrap_or("local").dark_grey(),
            pkg.name,
            pkg.version.clone().green()
        );
        if let Some(description) = &pkg.description {
            println!("    {}", description);
        }
    }
    Ok(())
}
