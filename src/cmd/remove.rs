use anyhow::Result;
use clap::ArgMatches;
use libpact::{operation, Session, TransFlag};

use crate::cmd::confirm_and_commit;

pub fn cmd_remove(matches: &ArgMatches, session: &Session) -> Result<()> {
    let targets = matches
        .get_many::<String>("package")
        .map(|v| v.map(|s| s.as_str()).collect::<Vec<_>>())
        .unwrap_or_default();

    let mut flags = vec![];
    if matches.get_flag("cascade") {
        flags.push(TransFlag::Cascade);
    }
    if matches.get_flag("recursive") {
        flags.push(TransFlag::Recurse);
    }
    if matches.get_flag("unneeded") {
        flags.push(TransFlag::Unneeded);
    }
    if matches.get_flag("no-save") {
        flags.push(TransFlag::NoSave);
    }
    if matches.get_flag("no-deps") {
        flags.push(TransFlag::NoDeps);
    }
    if matches.get_flag("db-only") {
        flags.push(TransFlag::DbOnly);
    }
    if matches.get_flag("no-scriptlet") {
        flags.push(TransFlag::NoScriptlet);
    }

    operation::trans_init(session, flags)?;
    if let Err(err) = operation::trans_remove_targets(session, &targets) {
        let _ = operation::trans_release(session);
        return Err(err.into());
    }

    confirm_and_commit(session, matches.get_flag("yes"), "Proceed with removal?")
}
