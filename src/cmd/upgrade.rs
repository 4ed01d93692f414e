use anyhow::Result;
use clap::ArgMatches;
use libpact::{operation, Session, TransFlag};

use crate::cmd::confirm_and_commit;

pub fn cmd_upgrade(matches: &ArgMatches, session: &Session) -> Result<()> {
    if matches.get_flag("refresh") {
        println!("Refreshing repo indexes...");
        operation::repo_refresh(session)?;
    }

    let mut flags = vec![];
    if matches.get_flag("download-only") {
        flags.push(TransFlag::DownloadOnly);
    }

    operation::trans_init(session, flags)?;
    if let Err(err) = operation::trans_sysupgrade(session, matches.get_flag("downgrade")) {
        let _ = operation::trans_release(session);
        return Err(err.into());
    }

    confirm_and_commit(
        session,
        matches.get_flag("yes"),
        "Proceed with system upgrade?",
    )
}
