use anyhow::Result;
use clap::ArgMatches;
use clap_complete::{generate, Shell};

use crate::clap_app;

pub fn cmd_completions(matches: &ArgMatches) -> Result<()> {
    let shell = match matches.get_one::<String>("shell").map(|s| s.as_str()) {
        Some("bash") => Shell::Bash,
        Some("zsh") => Shell::Zsh,
        Some("fish") => Shell::Fish,
        Some("elvish") => Shell::Elvish,
        Some("powershell") => Shell::PowerShell,
        _ => unreachable!(),
    };
    let mut app = clap_app::build();
    let name = app.get_name().to_owned();
    generate(shell, &mut app, name, &mut std::io::stdout());
    Ok(())
}
