use clap::{crate_description, crate_name, crate_version, Arg, ArgAction, Command};

pub fn build() -> Command {
    Command::new(crate_name!())
        .version(crate_version!())
        .about(crate_description!())
        .after_help(format!(
            "Type '{} help <command>' to get help for a specific command.",
            crate_name!()
        ))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .max_term_width(100)
        .arg(
            Arg::new("config")
                .help("Path of the config file")
                .long("config")
                .global(true)
                .num_args(1),
        )
        .arg(
            Arg::new("yes")
                .help("Assume yes on all prompts")
                .short('y')
                .long("yes")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .help("Turn on verbose logging")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("install")
                .about("Install packages from the sync repos or from archives")
                .arg_required_else_help(true)
                .arg(
                    Arg::new("package")
                        .help("The package(s) to be installed")
                        .required(true)
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("file")
                        .help("Targets are package archives on disk")
                        .short('f')
                        .long("file")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("download-only")
                        .help("Download and cache the archives, do not install")
                        .short('w')
                        .long("download-only")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("needed")
                        .help("Skip targets that are already up to date")
                        .long("needed")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("as-deps")
                        .help("Record the installed packages as dependencies")
                        .long("as-deps")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("as-explicit"),
                )
                .arg(
                    Arg::new("as-explicit")
                        .help("Record the installed packages as explicitly requested")
                        .long("as-explicit")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("no-deps")
                        .help("Skip dependency resolution (use with caution!)")
                        .short('d')
                        .long("no-deps")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("force")
                        .help("Bypass the file conflict check (use with caution!)")
                        .long("force")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("db-only")
                        .help("Only touch the database, leave files alone")
                        .long("db-only")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("no-scriptlet")
                        .help("Do not run install scriptlets")
                        .long("no-scriptlet")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove installed packages")
                .alias("uninstall")
                .arg_required_else_help(true)
                .arg(
                    Arg::new("package")
                        .help("The package(s) to be removed")
                        .required(true)
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("cascade")
                        .help("Also remove every package depending on a target")
                        .short('c')
                        .long("cascade")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("recursive")
                        .help("Also remove dependencies nothing else needs")
                        .short('s')
                        .long("recursive")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("unneeded")
                        .help("Keep targets some other package still needs")
                        .short('u')
                        .long("unneeded")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("no-save")
                        .help("Do not preserve modified config files as .pacsave")
                        .short('n')
                        .long("no-save")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("no-deps")
                        .help("Skip the dependency check (use with caution!)")
                        .short('d')
                        .long("no-deps")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("db-only")
                        .help("Only touch the database, leave files alone")
                        .long("db-only")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("no-scriptlet")
                        .help("Do not run remove scriptlets")
                        .long("no-scriptlet")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("upgrade")
                .about("Upgrade every installed package to its sync version")
                .arg(
                    Arg::new("refresh")
                        .help("Refresh the repo indexes first")
                        .short('r')
                        .long("refresh")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("downgrade")
                        .help("Also downgrade packages newer than the repos")
                        .long("downgrade")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("download-only")
                        .help("Download and cache the archives, do not install")
                        .short('w')
                        .long("download-only")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("update").about("Refresh the sync repo indexes"))
        .subcommand(
            Command::new("list")
                .about("List installed packages")
                .alias("ls")
                .arg(
                    Arg::new("upgradable")
                        .help("Only list packages with a newer sync version")
                        .short('u')
                        .long("upgradable")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("search")
                .about("Search for packages available in the sync repos")
                .arg_required_else_help(true)
                .arg(
                    Arg::new("query")
                        .help("The query string, regex supported")
                        .required(true)
                        .action(ArgAction::Append),
                ),
        )
        .subcommand(
            Command::new("info")
                .about("Display information about a package")
                .arg_required_else_help(true)
                .arg(Arg::new("package").help("The package name").required(true))
                .arg(
                    Arg::new("sync")
                        .help("Query the sync repos instead of the local db")
                        .short('s')
                        .long("sync")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions")
                .arg_required_else_help(true)
                .arg(
                    Arg::new("shell")
                        .help("The shell to generate completions for")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "elvish", "powershell"]),
                ),
        )
}
