mod completions;
mod info;
mod install;
mod list;
mod remove;
mod search;
mod update;
mod upgrade;

pub use completions::cmd_completions;
pub use info::cmd_info;
pub use install::cmd_install;
pub use list::cmd_list;
pub use remove::cmd_remove;
pub use search::cmd_search;
pub use update::cmd_update;
pub use upgrade::cmd_upgrade;

use anyhow::Result;
use crossterm::style::Stylize;
use libpact::{operation, Error, Session, TransSummary};

use crate::{cui, util};

/// Render a prepared transaction and ask for the go-ahead, then commit.
/// The transaction is always released, whatever happens.
pub(crate) fn confirm_and_commit(
    session: &Session,
    assume_yes: bool,
    question: &str,
) -> Result<()> {
    let ret = (|| -> Result<()> {
        operation::trans_prepare(session).map_err(render_plan_error)?;
        let summary = operation::trans_summary(session)?;

        if summary.install.is_empty() && summary.remove.is_empty() {
            println!("Nothing to do.");
            return Ok(());
        }

        print_summary(&summary);
        if !assume_yes && !cui::prompt_yes_no(question) {
            return Ok(());
        }

        operation::trans_commit(session).map_err(render_plan_error)?;
        Ok(())
    })();

    let _ = operation::trans_release(session);
    ret
}

fn print_summary(summary: &TransSummary) {
    if !summary.install.is_empty() {
        println!("The following packages will be INSTALLED:");
        let line = summary
            .install
            .iter()
            .map(|pkg| match pkg.old_version.as_deref() {
                Some(old) => format!(
                    "{} {}",
                    pkg.name,
                    format!("({} => {})", old, pkg.new_version).dark_grey()
                ),
                None => format!("{}{}", pkg.name, format!("-{}", pkg.new_version).dark_grey()),
            })
            .collect::<Vec<_>>()
            .join("  ");
        println!("  {}", line);
    }
    if !summary.remove.is_empty() {
        println!("The following packages will be REMOVED:");
        println!(
            "  {}",
            summary
                .remove
                .iter()
                .map(|ident| ident.clone().red().to_string())
                .collect::<Vec<_>>()
                .join("  ")
        );
    }
    if summary.download_size > 0 {
        println!("\nTotal download size: {}", util::humansize(summary.download_size));
    }
}

/// Turn the engine's structured plan errors into printable diagnostics.
fn render_plan_error(err: Error) -> anyhow::Error {
    match &err {
        Error::UnsatisfiedDeps(missing) => {
            eprintln!("{} unresolved dependencies:", "error:".red());
            for miss in missing {
                eprintln!("  {}", miss);
            }
        }
        Error::ConflictingDeps(conflicts) => {
            eprintln!("{} unresolvable package conflicts:", "error:".red());
            for conflict in conflicts {
                eprintln!("  {}", conflict);
            }
        }
        Error::FileConflicts(conflicts) => {
            eprintln!("{} conflicting files:", "error:".red());
            for conflict in conflicts {
                eprintln!("  {}", conflict);
            }
        }
        Error::InvalidPackages(names) => {
            eprintln!("{} invalid or corrupted packages:", "error:".red());
            for name in names {
                eprintln!("  {}", name);
            }
        }
        _ => {}
    }
    err.into()
}
