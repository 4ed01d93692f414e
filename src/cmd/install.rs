use std::path::Path;

use anyhow::Result;
use clap::ArgMatches;
use libpact::{operation, Session, TransFlag};

use crate::cmd::confirm_and_commit;

pub fn cmd_install(matches: &ArgMatches, session: &Session) -> Result<()> {
    let targets = matches
        .get_many::<String>("package")
        .map(|v| v.map(|s| s.as_str()).collect::<Vec<_>>())
        .unwrap_or_default();

    let mut flags = vec![];
    if matches.get_flag("download-only") {
        flags.push(TransFlag::DownloadOnly);
    }
    if matches.get_flag("needed") {
        flags.push(TransFlag::Needed);
    }
    if matches.get_flag("as-deps") {
        flags.push(TransFlag::AllDeps);
    }
    if matches.get_flag("as-explicit") {
        flags.push(TransFlag::AllExplicit);
    }
    if matches.get_flag("no-deps") {
        flags.push(TransFlag::NoDeps);
    }
    if matches.get_flag("force") {
        flags.push(TransFlag::Force);
    }
    if matches.get_flag("db-only") {
        flags.push(TransFlag::DbOnly);
    }
    if matches.get_flag("no-scriptlet") {
        flags.push(TransFlag::NoScriptlet);
    }

    operation::trans_init(session, flags)?;

    let ret = if matches.get_flag("file") {
        targets
            .iter()
            .try_for_each(|t| operation::trans_file_target(session, Path::new(t)))
    } else {
        operation::trans_sync_targets(session, &targets)
    };
    if let Err(err) = ret {
        let _ = operation::trans_release(session);
        return Err(err.into());
    }

    confirm_and_commit(
        session,
        matches.get_flag("yes"),
        "Proceed with installation?",
    )
}
