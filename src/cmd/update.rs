use anyhow::Result;
use clap::ArgMatches;
use libpact::{operation, Session};

pub fn cmd_update(_: &ArgMatches, session: &Session) -> Result<()> {
    println!("Refreshing repo indexes...");
    operation::repo_refresh(session)?;
    println!("Done.");
    Ok(())
}
